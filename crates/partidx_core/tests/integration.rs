//! On-disk behaviour of the collection index.

use partidx_core::{
    Collection, CollectionIndex, CommonsDump, Config, CoreError, ElementLayout, RootReferenceHint,
    SizeClasses,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const PREFIX: &str = "words";

fn small_layout() -> ElementLayout {
    ElementLayout::new(8, 4).unwrap()
}

/// Element `id` of width 8: a 4-byte element key followed by payload.
fn element(id: u32, payload: u8) -> [u8; 8] {
    let [a, b, c, d] = id.to_be_bytes();
    [a, b, c, d, b'r', payload, b'.', b'.']
}

fn refs(ids: impl IntoIterator<Item = u32>) -> Collection {
    Collection::from_elements(small_layout(), ids.into_iter().map(|id| element(id, b'x'))).unwrap()
}

fn small_config() -> Config {
    Config::new(4, small_layout()).max_partitions(3).shrink_seed(9)
}

fn open(dir: &Path, config: Config) -> CollectionIndex {
    CollectionIndex::open(dir, PREFIX, config).unwrap()
}

#[test]
fn classification_matches_capacities() {
    let classes = SizeClasses::new(4, 7).unwrap();
    for size in 0..=classes.top_capacity() {
        let class = classes.classify(size).unwrap();
        assert!(classes.capacity(class) >= size);
        if class > 0 {
            assert!(classes.capacity(class - 1) < size);
        }
    }
    assert!(matches!(
        classes.classify(classes.top_capacity() + 1),
        Err(CoreError::CapacityExceeded { .. })
    ));
}

#[test]
fn documented_relocation_scenario() {
    let dir = TempDir::new().unwrap();
    let layout = ElementLayout::new(90, 12).unwrap();
    let config = Config::new(9, layout);
    let index = open(dir.path(), config);
    let key = b"key-1    ";

    let element = |i: u8| {
        let mut e = [b'-'; 90];
        e[..12].copy_from_slice(format!("ref-{i:08}").as_bytes());
        e
    };
    let batch = |ids: std::ops::Range<u8>| Collection::from_elements(layout, ids.map(element)).unwrap();

    index.put(key, &batch(0..1)).unwrap();
    assert_eq!(index.location(key).unwrap().unwrap().size_class, 0);

    index.put(key, &batch(0..5)).unwrap();
    assert_eq!(index.location(key).unwrap().unwrap().size_class, 1);

    index.merge(key, &batch(5..17)).unwrap();
    let entry = index.location(key).unwrap().unwrap();
    assert_eq!((entry.size_class, entry.element_count), (2, 17));
    assert_eq!(index.get(key).unwrap().unwrap().len(), 17);

    let files = index.files().unwrap();
    assert!(files.partition_path(4, 90, 2, 0).exists());
    assert!(files
        .partition_path(4, 90, 2, 0)
        .ends_with("words.04.005A.02.00.kca"));
}

#[test]
fn put_then_get_round_trips() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config());
    let stored = refs([9, 3, 7, 1, 5]);
    index.put(b"word", &stored).unwrap();
    assert_eq!(index.get(b"word").unwrap().unwrap(), stored);
    assert_eq!(index.get(b"none").unwrap(), None);
}

#[test]
fn relocation_frees_the_old_row() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config());
    index.put(b"word", &refs(0..3)).unwrap();
    let before = index.location(b"word").unwrap().unwrap();
    assert_eq!(before.size_class, 0);

    index.put(b"word", &refs(100..120)).unwrap();
    let after = index.location(b"word").unwrap().unwrap();
    // 20 elements outgrow the 16 of class 1
    assert_eq!(after.size_class, 2);
    assert_eq!(index.get(b"word").unwrap().unwrap(), refs(100..120));

    let summaries = index.partitions().unwrap();
    let class0 = summaries.iter().find(|s| s.size_class == 0).unwrap();
    assert_eq!((class0.live, class0.free), (0, 1));
}

#[test]
fn empty_merge_leaves_collection_alone() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config());
    index.put(b"word", &refs(0..6)).unwrap();
    let before = index.location(b"word").unwrap().unwrap();

    index.merge(b"word", &Collection::new(small_layout())).unwrap();

    assert_eq!(index.location(b"word").unwrap().unwrap(), before);
    assert_eq!(index.get(b"word").unwrap().unwrap(), refs(0..6));
}

#[test]
fn merge_replaces_elements_with_equal_keys() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config());
    index.put(b"word", &refs(0..3)).unwrap();
    let update = Collection::from_elements(small_layout(), [element(1, b'y')]).unwrap();
    index.merge(b"word", &update).unwrap();

    let stored = index.get(b"word").unwrap().unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.get(&1u32.to_be_bytes()).unwrap()[5], b'y');
}

#[test]
fn corrupted_count_is_healed_on_read() {
    let dir = TempDir::new().unwrap();
    let (row, path, record_size) = {
        let index = open(dir.path(), small_config());
        index.put(b"word", &refs(0..3)).unwrap();
        let entry = index.location(b"word").unwrap().unwrap();
        let summary = index.partitions().unwrap().remove(0);
        index.close().unwrap();
        (entry.row, summary.path.unwrap(), summary.record_size)
    };

    // the blob header starts right after the key
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start((row as usize * record_size + 4) as u64))
        .unwrap();
    file.write_all(&2u32.to_be_bytes()).unwrap();
    drop(file);

    let index = open(dir.path(), small_config());
    let stored = index.get(b"word").unwrap().unwrap();
    assert_eq!(stored, refs(0..2));
    assert_eq!(index.location(b"word").unwrap().unwrap().element_count, 2);
    assert_eq!(index.health().unwrap().errors(), 1);
    assert_eq!(index.stats().repairs, 1);
}

#[test]
fn healed_count_relocates_to_smaller_class() {
    let dir = TempDir::new().unwrap();
    let (row, path, record_size) = {
        let index = open(dir.path(), small_config());
        index.put(b"word", &refs(0..10)).unwrap();
        let entry = index.location(b"word").unwrap().unwrap();
        assert_eq!(entry.size_class, 1);
        let summary = index
            .partitions()
            .unwrap()
            .into_iter()
            .find(|p| p.size_class == 1)
            .unwrap();
        index.close().unwrap();
        (entry.row, summary.path.unwrap(), summary.record_size)
    };

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start((row as usize * record_size + 4) as u64))
        .unwrap();
    file.write_all(&3u32.to_be_bytes()).unwrap();
    drop(file);

    let index = open(dir.path(), small_config());
    assert_eq!(index.get(b"word").unwrap().unwrap(), refs(0..3));
    let entry = index.location(b"word").unwrap().unwrap();
    assert_eq!(entry.size_class, 0);
    assert_eq!(entry.element_count, 3);
    assert_eq!(index.health().unwrap().errors(), 1);

    let live: Vec<(u8, usize)> = index
        .partitions()
        .unwrap()
        .into_iter()
        .map(|p| (p.size_class, p.live))
        .collect();
    assert!(live.contains(&(0, 1)));
    assert!(live.contains(&(1, 0)));
}

#[test]
fn all_zero_elements_round_trip() {
    let dir = TempDir::new().unwrap();
    let mixed = Collection::from_elements(small_layout(), [[0u8; 8], element(7, b'z')]).unwrap();
    let lone = Collection::from_elements(small_layout(), [[0u8; 8]]).unwrap();
    {
        let index = open(dir.path(), small_config());
        index.put(b"word", &mixed).unwrap();
        index.put(b"lone", &lone).unwrap();
        assert_eq!(index.get(b"word").unwrap().unwrap(), mixed);
        assert_eq!(index.get(b"lone").unwrap().unwrap(), lone);
        index.close().unwrap();
    }

    let index = open(dir.path(), small_config());
    assert_eq!(index.get(b"word").unwrap().unwrap(), mixed);
    assert_eq!(index.get(b"lone").unwrap().unwrap(), lone);
    assert!(index.has(b"lone").unwrap());
    assert_eq!(index.location(b"word").unwrap().unwrap().element_count, 2);
    assert_eq!(index.health().unwrap().errors(), 0);
}

#[test]
fn shrink_bounds_size_and_dumps_evictions() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config().use_commons(true));
    let top = index.config().size_classes().unwrap().top_capacity();

    let mut next = 0u32;
    for _ in 0..12 {
        index.merge(b"word", &refs(next..next + 10)).unwrap();
        next += 10;
        assert!(index.get(b"word").unwrap().unwrap().len() <= top);
    }

    let stored = index.get(b"word").unwrap().unwrap();
    let commons = index.commons().unwrap();
    let mut dumped = Collection::new(small_layout());
    for path in commons.files().unwrap() {
        dumped = dumped.merge(&CommonsDump::read(&path, small_layout()).unwrap());
    }

    assert!(index.stats().shrinks >= 1);
    assert_eq!(stored.len() + dumped.len(), next as usize);
    for id in 0..next {
        let key = id.to_be_bytes();
        assert!(stored.contains(&key) != dumped.contains(&key), "element {id}");
    }
    assert!(commons
        .dir()
        .ends_with(format!("{PREFIX}.0008.commons")));
}

#[test]
fn retention_hint_keeps_marked_elements() {
    let dir = TempDir::new().unwrap();
    let hint = Arc::new(RootReferenceHint::new(5, *b"R"));
    let index = open(dir.path(), small_config().retention(hint));

    let elements = (0..80u32).map(|id| element(id, if id % 8 == 0 { b'R' } else { b'x' }));
    index
        .merge(b"word", &Collection::from_elements(small_layout(), elements).unwrap())
        .unwrap();

    let stored = index.get(b"word").unwrap().unwrap();
    assert_eq!(stored.len(), 10);
    assert!(stored.iter().all(|e| e[5] == b'R'));
}

#[test]
fn disabled_commons_removes_dump_directory() {
    let dir = TempDir::new().unwrap();
    let commons_dir = {
        let index = open(dir.path(), small_config().use_commons(true));
        index.commons().unwrap().dir().to_path_buf()
    };
    assert!(commons_dir.is_dir());

    let index = open(dir.path(), small_config());
    assert!(index.commons().is_none());
    assert!(!commons_dir.exists());
}

#[test]
fn removing_every_element_deletes_the_key() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config());
    index.put(b"word", &refs(0..4)).unwrap();

    let keys: Vec<[u8; 4]> = (0..4u32).map(u32::to_be_bytes).collect();
    assert_eq!(index.remove(b"word", &keys).unwrap(), 4);

    assert!(!index.has(b"word").unwrap());
    assert_eq!(index.get(b"word").unwrap(), None);
    assert_eq!(index.size().unwrap(), 0);
}

#[test]
fn rotation_visits_every_key_once() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config());
    let keys = ["bbbb", "dddd", "ffff", "hhhh"];
    for key in keys {
        index.put(key.as_bytes(), &refs([1])).unwrap();
    }

    for start in ["aaaa", "cccc", "dddd", "zzzz"] {
        let seen: BTreeSet<Vec<u8>> = index
            .keycollections(Some(start.as_bytes()), None, true)
            .unwrap()
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(seen.len(), keys.len(), "start {start}");
    }
}

#[test]
fn contents_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let index = open(dir.path(), small_config());
        index.put(b"aaaa", &refs(0..2)).unwrap();
        index.merge(b"bbbb", &refs(0..30)).unwrap();
        index.merge(b"cccc", &refs(0..1)).unwrap();
        index.delete(b"cccc").unwrap();
        index.close().unwrap();
    }

    let index = open(dir.path(), small_config());
    assert_eq!(index.size().unwrap(), 2);
    assert_eq!(index.get(b"aaaa").unwrap().unwrap(), refs(0..2));
    assert_eq!(index.get(b"bbbb").unwrap().unwrap(), refs(0..30));
    assert!(!index.has(b"cccc").unwrap());
    assert_eq!(index.health().unwrap().errors(), 0);
}

#[test]
fn missing_location_file_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let index_path = {
        let index = open(dir.path(), small_config());
        index.put(b"aaaa", &refs(0..2)).unwrap();
        index.put(b"bbbb", &refs(0..9)).unwrap();
        index.files().unwrap().index_path()
    };
    fs::remove_file(&index_path).unwrap();

    let index = open(dir.path(), small_config());
    assert_eq!(index.size().unwrap(), 2);
    let entry = index.location(b"bbbb").unwrap().unwrap();
    assert_eq!((entry.size_class, entry.element_count), (1, 9));
    assert_eq!(index.get(b"aaaa").unwrap().unwrap(), refs(0..2));
    assert!(index_path.exists());
}

#[test]
fn scheduled_rebuild_deletes_location_file_on_close() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config());
    index.put(b"aaaa", &refs(0..2)).unwrap();
    let index_path = index.files().unwrap().index_path();

    index.mark_for_rebuild_on_exit().unwrap();
    index.close().unwrap();
    assert!(!index_path.exists());

    let index = open(dir.path(), small_config());
    assert_eq!(index.get(b"aaaa").unwrap().unwrap(), refs(0..2));
}

#[test]
fn second_handle_is_refused() {
    let dir = TempDir::new().unwrap();
    let first = open(dir.path(), small_config());
    assert!(matches!(
        CollectionIndex::open(dir.path(), PREFIX, small_config()),
        Err(CoreError::IndexLocked)
    ));

    first.close().unwrap();
    let second = open(dir.path(), small_config());
    assert!(second.is_open());
}

#[test]
fn clear_empties_every_partition() {
    let dir = TempDir::new().unwrap();
    let index = open(dir.path(), small_config());
    index.put(b"aaaa", &refs(0..2)).unwrap();
    index.put(b"bbbb", &refs(0..20)).unwrap();
    index.clear().unwrap();

    assert_eq!(index.size().unwrap(), 0);
    assert!(index.partitions().unwrap().iter().all(|s| s.live == 0));
    index.put(b"aaaa", &refs(0..1)).unwrap();
    assert_eq!(index.location(b"aaaa").unwrap().unwrap().row, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rotation_covers_any_start(
        keys in prop::collection::btree_set("[a-z]{2}", 1..24),
        start in "[a-z]{2}",
    ) {
        let config = Config::new(2, small_layout());
        let index = CollectionIndex::open_in_memory(config).unwrap();
        for key in &keys {
            index.put(key.as_bytes(), &refs([1])).unwrap();
        }

        let visited: Vec<String> = index
            .keycollections(Some(start.as_bytes()), None, true)
            .unwrap()
            .map(|item| String::from_utf8(item.unwrap().0).unwrap())
            .collect();

        prop_assert_eq!(visited.len(), keys.len());
        let unique: BTreeSet<String> = visited.into_iter().collect();
        prop_assert_eq!(unique, keys);
    }

    #[test]
    fn put_get_round_trip(
        elements in prop::collection::vec(prop::array::uniform8(any::<u8>()), 1..64),
    ) {
        let index = CollectionIndex::open_in_memory(small_config()).unwrap();
        let collection = Collection::from_elements(small_layout(), elements).unwrap();
        index.put(b"word", &collection).unwrap();
        prop_assert_eq!(index.get(b"word").unwrap().unwrap(), collection);
    }
}
