//! End-to-end store scenarios.

use std::path::Path;
use std::sync::Arc;

use crate::memory::reader::Reader;
use crate::memory::writer::Writer;
use crate::{
    Arraymap, Element, Error, Hashmap, Link, MemoryMap, Nomap, Settings, Store, SLAB,
};

/// A header-shaped record: 32-byte key, 16-byte payload.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Header([u8; 16]);

impl Element for Header {
    fn count(&self) -> usize {
        1
    }

    fn to_data(&self, sink: &mut Writer<'_, '_>) -> bool {
        sink.write_bytes(&self.0);
        sink.is_valid()
    }

    fn from_data(source: &mut Reader<'_, '_>) -> Option<Self> {
        let bytes = source.read_array::<16>();
        source.is_valid().then_some(Self(bytes))
    }
}

/// A bare 32-byte hash record for ordinal tables.
#[derive(Clone, Copy, Debug, PartialEq)]
struct HashRecord([u8; 32]);

impl Element for HashRecord {
    fn count(&self) -> usize {
        1
    }

    fn to_data(&self, sink: &mut Writer<'_, '_>) -> bool {
        sink.write_bytes(&self.0);
        sink.is_valid()
    }

    fn from_data(source: &mut Reader<'_, '_>) -> Option<Self> {
        let bytes = source.read_array::<32>();
        source.is_valid().then_some(Self(bytes))
    }
}

/// A length-prefixed slab element.
#[derive(Clone, Debug, PartialEq)]
struct Filter(Vec<u8>);

impl Element for Filter {
    fn count(&self) -> usize {
        4 + self.0.len()
    }

    fn to_data(&self, sink: &mut Writer<'_, '_>) -> bool {
        sink.write_u32(self.0.len() as u32);
        sink.write_bytes(&self.0);
        sink.is_valid()
    }

    fn from_data(source: &mut Reader<'_, '_>) -> Option<Self> {
        let length = source.read_u32() as usize;
        let mut bytes = vec![0u8; length];
        source.read_bytes(&mut bytes);
        source.is_valid().then_some(Self(bytes))
    }
}

fn key(seed: u64) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes
}

type Headers = Hashmap<4, 32, 16>;
type Candidates = Nomap<3, 32>;
type Filters = Arraymap<4, SLAB>;

fn build_store(directory: &Path) -> (Store, Headers, Candidates, Filters) {
    let settings = Settings::new(directory).with_minimum(64).with_expansion(50);
    let mut store = Store::new(settings);
    let headers = store.register("archive_header", |head, body| {
        Headers::new(head, body, 256)
    });
    let candidates = store.register("candidate", Candidates::new);
    let filters = store.register("filter_bk", |head, body| Filters::new(head, body, 16));
    (store, headers, candidates, filters)
}

#[test]
fn create_open_write_close_reopen() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let directory = root.path().join("store");

    let (mut store, headers, candidates, filters) = build_store(&directory);
    store.create()?;
    store.open()?;

    {
        let _writes = store.transactor();
        for seed in 0u64..20 {
            assert!(headers.put(key(seed), &Header([seed as u8; 16])));
            assert!(candidates.put(&HashRecord([seed as u8; 32])));
        }
        assert!(filters.put(0, &Filter(b"genesis".to_vec())));
    }

    store.close()?;
    assert!(!crate::file::is_file(&store.settings().flush_lock()));
    drop((headers, candidates, filters));

    // A clean reopen finds everything without recovery.
    let (mut store, headers, candidates, filters) = build_store(&directory);
    store.open()?;

    for seed in 0u64..20 {
        let link = headers.first(key(seed));
        assert_eq!(headers.get::<Header>(link), Some(Header([seed as u8; 16])));
    }
    assert_eq!(candidates.count(), Link::new(20));
    assert_eq!(
        candidates.get::<HashRecord>(Link::new(7)),
        Some(HashRecord([7; 32]))
    );
    assert_eq!(filters.find::<Filter>(0), Some(Filter(b"genesis".to_vec())));
    assert_eq!(store.get_fault(), None);

    store.close()?;
    Ok(())
}

#[test]
fn second_process_is_locked_out() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let directory = root.path().join("store");

    let (mut store, _headers, _candidates, _filters) = build_store(&directory);
    store.create()?;
    store.open()?;

    let (mut contender, _h, _c, _f) = build_store(&directory);
    assert_eq!(contender.open(), Err(Error::ProcessLock));

    store.close()?;
    Ok(())
}

#[test]
fn open_without_create_is_missing_directory() {
    let root = tempfile::tempdir().unwrap();
    let (mut store, _h, _c, _f) = build_store(&root.path().join("store"));
    assert_eq!(store.open(), Err(Error::MissingDirectory));
}

#[test]
fn dirty_shutdown_recovers_to_the_snapshot() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let directory = root.path().join("store");

    let (mut store, headers, candidates, _filters) = build_store(&directory);
    store.create()?;
    store.open()?;

    for seed in 0u64..100 {
        assert!(headers.put(key(seed), &Header([0x11; 16])));
        assert!(candidates.put(&HashRecord([0x22; 32])));
    }
    store.snapshot()?;

    // Unsnapshotted writes are lost at the crash.
    for seed in 100u64..150 {
        assert!(headers.put(key(seed), &Header([0x33; 16])));
        assert!(candidates.put(&HashRecord([0x44; 32])));
    }
    drop((headers, candidates, _filters));
    store.crash();

    let (mut store, headers, candidates, _filters) = build_store(&directory);
    store.open()?;

    assert_eq!(headers.count(), Link::new(100));
    assert_eq!(candidates.count(), Link::new(100));
    for seed in 0u64..100 {
        assert!(headers.exists(key(seed)));
    }
    for seed in 100u64..150 {
        assert!(!headers.exists(key(seed)));
    }

    // The recovered store keeps working.
    assert!(headers.put(key(500), &Header([0x55; 16])));
    assert!(headers.exists(key(500)));
    store.close()?;
    Ok(())
}

#[test]
fn dirty_shutdown_without_snapshot_cannot_recover() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let directory = root.path().join("store");

    let (mut store, headers, _candidates, _filters) = build_store(&directory);
    store.create()?;
    store.open()?;
    assert!(headers.put(key(1), &Header([1; 16])));
    drop((headers, _candidates, _filters));
    store.crash();

    let (mut store, _h, _c, _f) = build_store(&directory);
    assert_eq!(store.open(), Err(Error::MissingSnapshot));
    Ok(())
}

#[test]
fn snapshot_then_clean_close_reopens_clean() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let directory = root.path().join("store");

    let (mut store, headers, _candidates, _filters) = build_store(&directory);
    store.create()?;
    store.open()?;
    assert!(headers.put(key(1), &Header([1; 16])));
    store.snapshot()?;
    assert!(headers.put(key(2), &Header([2; 16])));
    store.close()?;
    drop((headers, _candidates, _filters));

    // Clean close recorded both writes; the older snapshot is not consulted.
    let (mut store, headers, _candidates, _filters) = build_store(&directory);
    store.open()?;
    assert!(headers.exists(key(1)));
    assert!(headers.exists(key(2)));
    store.close()?;
    Ok(())
}

#[test]
fn disk_full_rejects_writes_and_clears() {
    let root = tempfile::tempdir().unwrap();
    let head = Arc::new(MemoryMap::new(root.path().join("t.head"), 64, 50));
    let body = Arc::new(MemoryMap::new(root.path().join("t.data"), 64, 50));
    for map in [&head, &body] {
        map.open().unwrap();
        map.load().unwrap();
    }
    let table = Hashmap::<4, 8, 4>::new(head, body.clone(), 16);
    assert!(table.create());

    /// Minimal four-byte record.
    #[derive(PartialEq, Debug)]
    struct Word(u32);
    impl Element for Word {
        fn count(&self) -> usize {
            1
        }
        fn to_data(&self, sink: &mut Writer<'_, '_>) -> bool {
            sink.write_u32(self.0);
            sink.is_valid()
        }
        fn from_data(source: &mut Reader<'_, '_>) -> Option<Self> {
            let value = source.read_u32();
            source.is_valid().then_some(Self(value))
        }
    }

    let first = table.put_link(1u64.to_le_bytes(), &Word(1));
    assert!(!first.is_terminal());

    body.force_full();
    assert!(table.is_full());
    assert!(table.put_link(2u64.to_le_bytes(), &Word(2)).is_terminal());
    assert_eq!(
        table.get::<Word>(first),
        Some(Word(1)),
        "a full store still serves reads"
    );
    assert_eq!(table.get_fault(), None, "full is a condition, not a fault");

    table.reset_full();
    assert!(table.put(2u64.to_le_bytes(), &Word(2)));
}

#[test]
fn concurrent_readers_survive_remap() {
    let root = tempfile::tempdir().unwrap();
    // A tiny minimum forces many grow-and-remap cycles under load.
    let head = Arc::new(MemoryMap::new(root.path().join("t.head"), 64, 0));
    let body = Arc::new(MemoryMap::new(root.path().join("t.data"), 64, 0));
    for map in [&head, &body] {
        map.open().unwrap();
        map.load().unwrap();
    }
    let table = Hashmap::<4, 8, 16>::new(head, body, 64);
    assert!(table.create());

    const TOTAL: u64 = 500;

    std::thread::scope(|scope| {
        let writer = &table;
        scope.spawn(move || {
            for seed in 0..TOTAL {
                let payload = Header([seed as u8; 16]);
                assert!(writer.put(seed.to_le_bytes(), &payload));
            }
        });

        for _ in 0..2 {
            let reader = &table;
            scope.spawn(move || loop {
                let mut found = 0;
                for seed in 0..TOTAL {
                    let link = reader.first(seed.to_le_bytes());
                    if link.is_terminal() {
                        continue;
                    }
                    // Published elements are always whole.
                    let element: Header = reader.get(link).expect("published element is readable");
                    assert_eq!(element, Header([seed as u8; 16]));
                    found += 1;
                }
                if found == TOTAL {
                    break;
                }
            });
        }
    });

    assert_eq!(table.count(), Link::new(TOTAL));
    for seed in 0..TOTAL {
        assert!(table.exists(seed.to_le_bytes()));
    }
}

#[test]
fn empty_bucket_search_skips_the_body() {
    let root = tempfile::tempdir().unwrap();
    let head = Arc::new(MemoryMap::new(root.path().join("t.head"), 64, 50));
    let body = Arc::new(MemoryMap::new(root.path().join("t.data"), 64, 50));
    for map in [&head, &body] {
        map.open().unwrap();
        map.load().unwrap();
    }
    let table = Hashmap::<4, 8, 4>::new(head, body, 16);
    assert!(table.create());

    let iter = table.it(3u64.to_le_bytes());
    assert!(iter.link().is_terminal());
    assert!(iter.memory().is_none(), "no body window was taken");
}

#[test]
fn chain_table_names_are_stable() {
    assert_eq!(crate::TABLE_NAMES.len(), 18);
    assert!(crate::TABLE_NAMES.contains(&"archive_header"));
    assert!(crate::TABLE_NAMES.contains(&"prevout"));
}
