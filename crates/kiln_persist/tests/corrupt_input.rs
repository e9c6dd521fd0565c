//! Damaged, missing, and hand-crafted inputs.

use std::collections::BTreeMap;
use std::rc::Rc;

use kiln_persist::{persist_struct, HeadData, PersistError, PersistentPool, Value};

#[derive(Debug, Default, PartialEq)]
struct Artifact {
    file_path: String,
    tags: Vec<String>,
    depends_on: Vec<Rc<Artifact>>,
    properties: Value,
}

persist_struct!(Artifact {
    file_path,
    tags,
    depends_on,
    properties,
});

fn sample_graph() -> Vec<u8> {
    let header = Rc::new(Artifact {
        file_path: "include/config.h".to_string(),
        tags: vec!["hpp".to_string()],
        ..Artifact::default()
    });
    let mut props = BTreeMap::new();
    props.insert("defines".to_string(), Value::from(vec!["NDEBUG"]));
    let object = Artifact {
        file_path: "obj/main.o".to_string(),
        tags: vec!["obj".to_string(), "hpp".to_string()],
        depends_on: vec![Rc::clone(&header), header],
        properties: Value::Map(props),
    };

    let mut head = HeadData::new();
    head.insert("profile", "debug");
    let mut pool = PersistentPool::new();
    pool.set_head_data(head);
    pool.open_for_write_in_memory().unwrap();
    pool.store(&object).unwrap();
    pool.store(&0xfeedu32).unwrap();
    pool.finalize_to_bytes().unwrap()
}

fn load_graph(bytes: Vec<u8>) -> Result<(Artifact, u32), PersistError> {
    let mut pool = PersistentPool::new();
    pool.open_for_read_bytes(bytes)?;
    let artifact = pool.load()?;
    let trailer = pool.load()?;
    pool.close();
    Ok((artifact, trailer))
}

#[test]
fn complete_stream_loads() {
    let (artifact, trailer) = load_graph(sample_graph()).unwrap();
    assert_eq!(trailer, 0xfeed);
    assert_eq!(artifact.depends_on.len(), 2);
    assert!(Rc::ptr_eq(&artifact.depends_on[0], &artifact.depends_on[1]));
}

#[test]
fn every_truncation_is_detected() {
    let bytes = sample_graph();
    for len in 0..bytes.len() {
        let err = load_graph(bytes[..len].to_vec()).unwrap_err();
        if len == 0 {
            assert!(err.is_no_build_graph(), "len 0: {err}");
        } else {
            assert!(err.is_corrupt(), "len {len}: {err}");
        }
    }
}

#[test]
fn missing_and_empty_files_are_cold_starts() {
    let dir = tempfile::tempdir().unwrap();
    let mut pool = PersistentPool::new();

    let err = pool.open_for_read(dir.path().join("absent.bin")).unwrap_err();
    assert!(err.is_no_build_graph());

    let empty = dir.path().join("empty.bin");
    std::fs::write(&empty, b"").unwrap();
    let err = pool.open_for_read(&empty).unwrap_err();
    assert!(matches!(err, PersistError::NoBuildGraph { ref path } if path == &empty));
    assert!(!pool.is_open());
}

#[test]
fn repeated_string_grows_sublinearly() {
    let encoded_len = |copies: usize| {
        let mut pool = PersistentPool::new();
        pool.open_for_write_in_memory().unwrap();
        for _ in 0..copies {
            pool.store(&"/usr/include/c++/13/bits/stl_vector.h".to_string())
                .unwrap();
        }
        assert_eq!(pool.stored_string_count(), 1);
        pool.finalize_to_bytes().unwrap().len()
    };
    let one = encoded_len(1);
    let hundred = encoded_len(100);
    // Each repeat costs only its id.
    assert_eq!(hundred - one, 99 * 4);
    assert!(hundred < 100 * one / 4);
}

#[test]
fn object_id_out_of_sequence_is_corrupt() {
    let mut pool = PersistentPool::new();
    pool.open_for_write_in_memory().unwrap();
    pool.store(&5i32).unwrap();
    pool.store(&1u64).unwrap();
    let bytes = pool.finalize_to_bytes().unwrap();

    let mut pool = PersistentPool::new();
    pool.open_for_read_bytes(bytes).unwrap();
    let err = pool.load::<Rc<u64>>().unwrap_err();
    assert!(matches!(err, PersistError::Corrupt { .. }), "{err}");
}

#[test]
fn shared_id_with_another_type_is_corrupt() {
    let mut pool = PersistentPool::new();
    pool.open_for_write_in_memory().unwrap();
    let n = Rc::new(7u32);
    pool.store(&n).unwrap();
    pool.store(&n).unwrap();
    let bytes = pool.finalize_to_bytes().unwrap();

    let mut pool = PersistentPool::new();
    pool.open_for_read_bytes(bytes).unwrap();
    assert_eq!(*pool.load::<Rc<u32>>().unwrap(), 7);
    let err = pool.load::<Rc<String>>().unwrap_err();
    assert!(err.is_corrupt());
}

#[test]
fn corrupt_offset_points_into_the_stream() {
    let mut head_only = HeadData::new().encode().unwrap();
    let head_len = head_only.len() as u64;
    head_only.push(9);

    let mut pool = PersistentPool::new();
    pool.open_for_read_bytes(head_only).unwrap();
    match pool.load::<Value>().unwrap_err() {
        PersistError::Corrupt { offset, reason } => {
            assert_eq!(offset, head_len + 1);
            assert!(reason.contains("unknown value tag 9"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
