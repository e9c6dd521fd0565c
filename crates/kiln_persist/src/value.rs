//! Dynamically-typed configuration values.
//!
//! A [`Value`] is stored as a one-byte tag followed by its payload. Values
//! never go through the identity or string tables: each occurrence is
//! written in full, which keeps a value readable on its own (the head
//! metadata relies on that).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PersistError, PersistResult};
use crate::persist::Persist;
use crate::pool::PersistentPool;

/// Deepest nesting of lists and maps. Deeper values are rejected when
/// encoding and treated as corruption when decoding.
const MAX_DEPTH: usize = 128;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_LIST: u8 = 5;
pub(crate) const TAG_MAP: u8 = 6;

/// Loosely typed configuration data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A mapping from names to values, ordered by name.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the number as a float, converting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list, if this is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the map, if this is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up `key` if this is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Appends the encoding of this value to `out`.
    ///
    /// Lists and maps nested more than 128 levels deep are
    /// [`Unrepresentable`](PersistError::Unrepresentable).
    pub fn encode_into(&self, out: &mut Vec<u8>) -> PersistResult<()> {
        self.encode_at(out, 0)
    }

    fn encode_at(&self, out: &mut Vec<u8>, depth: usize) -> PersistResult<()> {
        match self {
            Value::Null => out.push(TAG_NULL),
            Value::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_be_bytes());
            }
            Value::Float(f) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&f.to_be_bytes());
            }
            Value::String(s) => {
                out.push(TAG_STRING);
                encode_raw_str(s, out)?;
            }
            Value::List(items) => {
                let depth = nest(depth)?;
                out.push(TAG_LIST);
                encode_len(items.len(), out)?;
                for item in items {
                    item.encode_at(out, depth)?;
                }
            }
            Value::Map(map) => {
                out.push(TAG_MAP);
                encode_map_into(map, out, depth)?;
            }
        }
        Ok(())
    }

    fn decode(pool: &mut PersistentPool, depth: usize) -> PersistResult<Value> {
        let [tag] = pool.read_array::<1>()?;
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_BOOL => Value::Bool(pool.load()?),
            TAG_INT => Value::Int(pool.load()?),
            TAG_FLOAT => Value::Float(pool.load()?),
            TAG_STRING => Value::String(decode_raw_str(pool)?),
            TAG_LIST => {
                let depth = descend(pool, depth)?;
                let count = pool.read_len()?;
                let mut items = Vec::with_capacity(pool.capacity_hint(count));
                for _ in 0..count {
                    items.push(Value::decode(pool, depth)?);
                }
                Value::List(items)
            }
            TAG_MAP => {
                let depth = descend(pool, depth)?;
                Value::Map(decode_map(pool, depth)?)
            }
            other => return Err(pool.corrupt(format!("unknown value tag {other}"))),
        };
        Ok(value)
    }
}

fn descend(pool: &PersistentPool, depth: usize) -> PersistResult<usize> {
    if depth >= MAX_DEPTH {
        return Err(pool.corrupt(format!("values nested deeper than {MAX_DEPTH} levels")));
    }
    Ok(depth + 1)
}

fn nest(depth: usize) -> PersistResult<usize> {
    if depth >= MAX_DEPTH {
        return Err(PersistError::unrepresentable(format!(
            "values nested deeper than {MAX_DEPTH} levels"
        )));
    }
    Ok(depth + 1)
}

fn encode_len(len: usize, out: &mut Vec<u8>) -> PersistResult<()> {
    let len = u32::try_from(len).map_err(|_| {
        PersistError::unrepresentable(format!("length {len} does not fit in 32 bits"))
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn encode_raw_str(s: &str, out: &mut Vec<u8>) -> PersistResult<()> {
    encode_len(s.len(), out)?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn decode_raw_str(pool: &mut PersistentPool) -> PersistResult<String> {
    let len = pool.read_len()?;
    let bytes = pool.read_vec(len)?;
    String::from_utf8(bytes).map_err(|e| pool.corrupt(format!("value string is not UTF-8: {e}")))
}

/// Appends the encoding of a map payload (count, then key/value pairs) for
/// a map found at nesting `depth`.
pub(crate) fn encode_map_into(
    map: &BTreeMap<String, Value>,
    out: &mut Vec<u8>,
    depth: usize,
) -> PersistResult<()> {
    let depth = nest(depth)?;
    encode_len(map.len(), out)?;
    for (key, value) in map {
        encode_raw_str(key, out)?;
        value.encode_at(out, depth)?;
    }
    Ok(())
}

fn decode_map(pool: &mut PersistentPool, depth: usize) -> PersistResult<BTreeMap<String, Value>> {
    let count = pool.read_len()?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let key = decode_raw_str(pool)?;
        let value = Value::decode(pool, depth)?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Reads a value that must be a map, as written for the head metadata.
pub(crate) fn decode_tagged_map(pool: &mut PersistentPool) -> PersistResult<BTreeMap<String, Value>> {
    match Value::decode(pool, 0)? {
        Value::Map(map) => Ok(map),
        other => Err(pool.corrupt(format!(
            "head metadata is not a mapping (found {})",
            other.kind()
        ))),
    }
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl Persist for Value {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        pool.write_raw(&buf)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        Value::decode(pool, 0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Value) -> Value {
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        pool.store(value).unwrap();
        let bytes = pool.finalize_to_bytes().unwrap();
        let mut pool = PersistentPool::new();
        pool.open_for_read_bytes(bytes).unwrap();
        pool.load().unwrap()
    }

    fn sample() -> Value {
        [
            ("profile".to_string(), Value::from("release")),
            ("verbose".to_string(), Value::from(true)),
            ("flags".to_string(), Value::from(vec!["a", "b"])),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn every_variant_roundtrips() {
        for value in [
            Value::Null,
            Value::Bool(false),
            Value::Int(-42),
            Value::Float(2.5),
            Value::from("text"),
            Value::from(vec![Value::Null, Value::Int(1)]),
            sample(),
        ] {
            assert_eq!(roundtrip(&value), value);
        }
    }

    #[test]
    fn nested_map_roundtrip() {
        let mut outer = BTreeMap::new();
        outer.insert("modules".to_string(), sample());
        outer.insert("empty".to_string(), Value::Map(BTreeMap::new()));
        let value = Value::Map(outer);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn value_strings_are_not_interned() {
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        pool.store(&Value::from("same")).unwrap();
        pool.store(&Value::from("same")).unwrap();
        assert_eq!(pool.stored_string_count(), 0);
    }

    #[test]
    fn unknown_tag_is_corrupt() {
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        pool.store(&9u8).unwrap();
        let bytes = pool.finalize_to_bytes().unwrap();
        let mut pool = PersistentPool::new();
        pool.open_for_read_bytes(bytes).unwrap();
        let err = pool.load::<Value>().unwrap_err();
        assert!(err.to_string().contains("unknown value tag 9"));
    }

    #[test]
    fn excessive_nesting_is_corrupt() {
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        for _ in 0..=MAX_DEPTH {
            pool.store(&TAG_LIST).unwrap();
            pool.store(&1u32).unwrap();
        }
        pool.store(&TAG_NULL).unwrap();
        let bytes = pool.finalize_to_bytes().unwrap();
        let mut pool = PersistentPool::new();
        pool.open_for_read_bytes(bytes).unwrap();
        assert!(pool.load::<Value>().unwrap_err().is_corrupt());
    }

    fn nested_lists(levels: usize) -> Value {
        (0..levels).fold(Value::Null, |inner, _| Value::List(vec![inner]))
    }

    #[test]
    fn deepest_allowed_nesting_roundtrips() {
        let value = nested_lists(MAX_DEPTH);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn deeper_nesting_is_rejected_when_storing() {
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        let err = pool.store(&nested_lists(200)).unwrap_err();
        assert!(matches!(err, PersistError::Unrepresentable { .. }), "{err}");

        let mut map = BTreeMap::new();
        map.insert("deep".to_string(), nested_lists(MAX_DEPTH));
        let err = Value::Map(map).encode_into(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, PersistError::Unrepresentable { .. }), "{err}");
    }

    #[test]
    fn accessors() {
        let value = sample();
        assert_eq!(value.get("profile").and_then(Value::as_str), Some("release"));
        assert_eq!(value.get("verbose").and_then(Value::as_bool), Some(true));
        assert_eq!(value.get("flags").and_then(Value::as_list).map(<[_]>::len), Some(2));
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert!(Value::default().is_null());
        assert!(value.get("missing").is_none());
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(
            sample().to_string(),
            r#"{"flags": ["a", "b"], "profile": "release", "verbose": true}"#
        );
    }

    #[test]
    fn json_roundtrip() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"{"flags":["a","b"],"profile":"release","verbose":true}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
        let null: Value = serde_json::from_str("null").unwrap();
        assert!(null.is_null());
    }
}
