//! Partitioned replay: splitting a stream into disjoint offset ranges
//! assigns every record to exactly one range, keyed by the record's
//! first byte, even when the record's bytes cross the split.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recstream::{append_buf, append_initial, RecordStreamIter};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tempfile::tempdir;

fn open_append(path: &Path) -> File {
    OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)
        .unwrap()
}

#[test]
fn every_split_covers_each_record_exactly_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("records.log");

    let mut rng = StdRng::seed_from_u64(0xD15C);
    let fd = open_append(&path);
    append_initial(&fd).unwrap();
    let mut expected = Vec::new();
    for generation in 1..=12u32 {
        let len = rng.gen_range(0..=96);
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        append_buf(&fd, generation, &payload).unwrap();
        expected.push(generation);
    }

    let bytes = std::fs::read(&path).unwrap();
    for split in 0..=bytes.len() {
        let mut seen = Vec::new();

        let mut low = RecordStreamIter::from_slice(&bytes);
        low.set_stop_at(split);
        seen.extend(low.map(|r| r.generation));

        let mut high = RecordStreamIter::from_slice(&bytes);
        assert!(high.locate_at(split));
        high.set_stop_at(bytes.len());
        seen.extend(high.map(|r| r.generation));

        assert_eq!(seen, expected, "split at {split}");
    }
}

#[test]
fn three_way_split_over_a_mapped_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("records.log");

    let fd = open_append(&path);
    append_initial(&fd).unwrap();
    for generation in 1..=9u32 {
        let payload = vec![generation as u8; 64];
        append_buf(&fd, generation, &payload).unwrap();
    }

    let read_fd = File::open(&path).unwrap();
    let size = RecordStreamIter::from_file(&read_fd).unwrap().size();
    let bounds = [0, size / 3, 2 * size / 3, size];

    let mut seen = Vec::new();
    for window in bounds.windows(2) {
        let mut iter = RecordStreamIter::from_file(&read_fd).unwrap();
        assert!(iter.locate_at(window[0]));
        iter.set_stop_at(window[1]);
        seen.extend(iter.map(|r| (r.generation, r.payload)));
    }

    assert_eq!(seen.len(), 9);
    for (i, (generation, payload)) in seen.iter().enumerate() {
        assert_eq!(*generation, i as u32 + 1);
        assert_eq!(payload, &vec![*generation as u8; 64]);
    }
}

#[test]
fn partitioning_survives_a_corrupt_region() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("records.log");

    let fd = open_append(&path);
    append_initial(&fd).unwrap();
    for generation in 1..=6u32 {
        append_buf(&fd, generation, &[generation as u8; 32]).unwrap();
    }

    // Wreck a byte in the middle of the file.
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;

    let whole: Vec<u32> = RecordStreamIter::from_slice(&bytes)
        .map(|r| r.generation)
        .collect();

    for split in [mid.saturating_sub(40), mid, mid + 40] {
        let split = split.min(bytes.len());
        let mut seen = Vec::new();

        let mut low = RecordStreamIter::from_slice(&bytes);
        low.set_stop_at(split);
        seen.extend(low.map(|r| r.generation));

        let mut high = RecordStreamIter::from_slice(&bytes);
        assert!(high.locate_at(split));
        seen.extend(high.map(|r| r.generation));

        assert_eq!(seen, whole, "split at {split}");
    }
}
