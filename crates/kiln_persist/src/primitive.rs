//! Encodings for scalar values, strings, paths, and time.
//!
//! Fixed-width integers and floats are big-endian. Native-width integers
//! and time values always use 64 bits so files move between platforms.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{PersistError, PersistResult};
use crate::persist::Persist;
use crate::pool::PersistentPool;

macro_rules! persist_fixed_width {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Persist for $ty {
                fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
                    pool.write_raw(&self.to_be_bytes())
                }

                fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
                    Ok(<$ty>::from_be_bytes(
                        pool.read_array::<{ std::mem::size_of::<$ty>() }>()?,
                    ))
                }
            }
        )*
    };
}

persist_fixed_width!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl Persist for bool {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.write_raw(&[u8::from(*self)])
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        match pool.read_array::<1>()? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(pool.corrupt(format!("invalid boolean byte {other}"))),
        }
    }
}

impl Persist for isize {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.store(&(*self as i64))
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let wide: i64 = pool.load()?;
        isize::try_from(wide)
            .map_err(|_| pool.corrupt(format!("{wide} does not fit in a native integer")))
    }
}

impl Persist for usize {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.store(&(*self as u64))
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let wide: u64 = pool.load()?;
        usize::try_from(wide)
            .map_err(|_| pool.corrupt(format!("{wide} does not fit in a native integer")))
    }
}

impl Persist for char {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.store(&u32::from(*self))
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let raw: u32 = pool.load()?;
        char::from_u32(raw).ok_or_else(|| pool.corrupt(format!("invalid char {raw:#x}")))
    }
}

impl Persist for () {
    fn store(&self, _pool: &mut PersistentPool) -> PersistResult<()> {
        Ok(())
    }

    fn load(_pool: &mut PersistentPool) -> PersistResult<Self> {
        Ok(())
    }
}

/// Signed nanoseconds since the Unix epoch.
impl Persist for SystemTime {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        let nanos = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos()),
            Err(before) => i64::try_from(before.duration().as_nanos()).map(|n| -n),
        }
        .map_err(|_| PersistError::unrepresentable("time outside the 64-bit nanosecond range"))?;
        pool.store(&nanos)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        let nanos: i64 = pool.load()?;
        let offset = Duration::from_nanos(nanos.unsigned_abs());
        let time = if nanos >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        time.ok_or_else(|| pool.corrupt(format!("time {nanos}ns is not representable")))
    }
}

impl Persist for Duration {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        let nanos = u64::try_from(self.as_nanos()).map_err(|_| {
            PersistError::unrepresentable("duration outside the 64-bit nanosecond range")
        })?;
        pool.store(&nanos)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        Ok(Duration::from_nanos(pool.load()?))
    }
}

impl Persist for String {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        pool.store_str(self)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        pool.load_string()
    }
}

/// Paths share the string table, so a directory prefix stored as a plain
/// string and as a path is written once.
impl Persist for PathBuf {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        let s = self.to_str().ok_or_else(|| {
            PersistError::unrepresentable(format!("path {} is not UTF-8", self.display()))
        })?;
        pool.store_str(s)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        pool.load_string().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(build: impl FnOnce(&mut PersistentPool)) -> PersistentPool {
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        build(&mut pool);
        let bytes = pool.finalize_to_bytes().unwrap();
        let mut pool = PersistentPool::new();
        pool.open_for_read_bytes(bytes).unwrap();
        pool
    }

    #[test]
    fn integers_and_floats_roundtrip() {
        let mut pool = encode(|pool| {
            pool.store(&-5i8).unwrap();
            pool.store(&0xbeefu16).unwrap();
            pool.store(&i32::MIN).unwrap();
            pool.store(&u64::MAX).unwrap();
            pool.store(&1.5f32).unwrap();
            pool.store(&-0.25f64).unwrap();
        });
        assert_eq!(pool.load::<i8>().unwrap(), -5);
        assert_eq!(pool.load::<u16>().unwrap(), 0xbeef);
        assert_eq!(pool.load::<i32>().unwrap(), i32::MIN);
        assert_eq!(pool.load::<u64>().unwrap(), u64::MAX);
        assert_eq!(pool.load::<f32>().unwrap(), 1.5);
        assert_eq!(pool.load::<f64>().unwrap(), -0.25);
    }

    #[test]
    fn native_width_uses_eight_bytes() {
        let mut writer = PersistentPool::new();
        writer.open_for_write_in_memory().unwrap();
        let head_len = writer.head_data().encode().unwrap().len();
        writer.store(&7usize).unwrap();
        writer.store(&-7isize).unwrap();
        let bytes = writer.finalize_to_bytes().unwrap();
        assert_eq!(bytes.len(), head_len + 16);

        let mut pool = PersistentPool::new();
        pool.open_for_read_bytes(bytes).unwrap();
        assert_eq!(pool.load::<usize>().unwrap(), 7);
        assert_eq!(pool.load::<isize>().unwrap(), -7);
    }

    #[test]
    fn invalid_bool_is_corrupt() {
        let mut pool = encode(|pool| pool.store(&2u8).unwrap());
        assert!(pool.load::<bool>().unwrap_err().is_corrupt());
    }

    #[test]
    fn invalid_char_is_corrupt() {
        let mut pool = encode(|pool| pool.store(&0xD800u32).unwrap());
        assert!(pool.load::<char>().unwrap_err().is_corrupt());
    }

    #[test]
    fn system_time_before_and_after_epoch() {
        let later = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let earlier = UNIX_EPOCH - Duration::from_secs(86_400);
        let mut pool = encode(|pool| {
            pool.store(&later).unwrap();
            pool.store(&earlier).unwrap();
            pool.store(&Duration::from_millis(1500)).unwrap();
        });
        assert_eq!(pool.load::<SystemTime>().unwrap(), later);
        assert_eq!(pool.load::<SystemTime>().unwrap(), earlier);
        assert_eq!(pool.load::<Duration>().unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn path_roundtrip_shares_string_table() {
        let mut pool = encode(|pool| {
            pool.store(&"src/main.cpp".to_string()).unwrap();
            pool.store(&PathBuf::from("src/main.cpp")).unwrap();
            assert_eq!(pool.stored_string_count(), 1);
        });
        assert_eq!(pool.load::<String>().unwrap(), "src/main.cpp");
        assert_eq!(
            pool.load::<PathBuf>().unwrap(),
            PathBuf::from("src/main.cpp")
        );
    }

    #[test]
    fn truncated_integer_is_corrupt() {
        let mut pool = encode(|pool| pool.store(&1u16).unwrap());
        let err = pool.load::<u32>().unwrap_err();
        assert!(err.is_corrupt());
    }
}
