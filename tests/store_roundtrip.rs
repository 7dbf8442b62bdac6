use ngram_events::ingest::ingest_files;
use ngram_events::store::{
    sort_store, Entry, StorePaths, StoreReader, StoreWriter, TimeRecord, ENTRY_RECORD_SIZE,
};
use ngram_events::{EventsError, StoreConfig};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

type Expected = BTreeMap<String, Vec<(u16, u64, u32)>>;

/// Deterministic pseudo-random corpus, grouped by word but not sorted
fn corpus() -> (String, Expected) {
    let words = [
        "zeppelin", "apple", "Zebra", "war", "peace", "warfare", "a", "éclair", "bomb", "atomic",
        "wars", "ab",
    ];
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let mut text = String::new();
    let mut expected = Expected::new();
    for word in words {
        let start = 1500 + (next() % 400) as u16;
        let len = 1 + (next() % 100) as u16;
        let rows = expected.entry(word.to_string()).or_default();
        for year in start..start + len {
            if next() % 4 == 0 {
                continue;
            }
            let matches = 1 + next() % 10_000;
            let volumes = 1 + (next() % 50) as u32;
            text.push_str(&format!("{}\t{}\t{}\t{}\n", word, year, matches, volumes));
            rows.push((year, matches, volumes));
        }
        if rows.is_empty() {
            text.push_str(&format!("{}\t{}\t1\t1\n", word, start));
            rows.push((start, 1, 1));
        }
    }
    (text, expected)
}

fn build_sorted(dir: &Path) -> (std::path::PathBuf, Expected) {
    let (text, expected) = corpus();
    let input = dir.join("googlebooks-eng-1gram.tsv");
    std::fs::write(&input, text).unwrap();

    let raw = dir.join("raw/eng");
    let mut writer =
        StoreWriter::create(&raw, StoreConfig::default().with_min_total_match_count(0)).unwrap();
    ingest_files(&[&input], &mut writer).unwrap();
    writer.finish().unwrap();

    let sorted = dir.join("sort/eng");
    sort_store(&raw, &sorted).unwrap();
    (sorted, expected)
}

#[test]
fn test_write_sort_read_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let (sorted, expected) = build_sorted(temp_dir.path());

    let reader = StoreReader::open(&sorted).unwrap();
    assert_eq!(reader.num_words(), expected.len());
    assert!(reader.is_sorted().unwrap());
    reader.verify().unwrap();

    // BTreeMap iterates in byte order, which is the store order
    for (index, (word, rows)) in expected.iter().enumerate() {
        assert_eq!(reader.word_at(index).unwrap(), word);

        let table = reader.read_time_table(index).unwrap();
        let got: Vec<(u16, u64, u32)> = table
            .iter()
            .map(|r| (r.year, r.match_count, r.volume_count))
            .collect();
        assert_eq!(&got, rows, "time table of '{}'", word);

        let entry = reader.entry(index).unwrap();
        assert_eq!(
            entry.total_match_count,
            rows.iter().map(|r| r.1).sum::<u64>()
        );
        assert_eq!(
            entry.total_volume_count,
            rows.iter().map(|r| r.2).sum::<u32>()
        );
    }
}

#[test]
fn test_offsets_are_cumulative() {
    let temp_dir = TempDir::new().unwrap();
    let (sorted, _) = build_sorted(temp_dir.path());

    let reader = StoreReader::open(&sorted).unwrap();
    let mut word_offset = 0u32;
    let mut time_offset = 0u32;
    for index in 0..reader.num_words() {
        let entry = reader.entry(index).unwrap();
        assert_eq!(entry.word_offset, word_offset);
        assert_eq!(entry.time_offset, time_offset);
        assert!(entry.time_length > 0);
        word_offset += entry.word_length as u32;
        time_offset += entry.time_bytes() as u32;
    }
    assert_eq!(word_offset as usize, reader.word_blob_len());
    assert_eq!(time_offset as u64, reader.time_file_size());
}

#[test]
fn test_binary_search() {
    let temp_dir = TempDir::new().unwrap();
    let (sorted, expected) = build_sorted(temp_dir.path());

    let reader = StoreReader::open(&sorted).unwrap();
    for (index, word) in expected.keys().enumerate() {
        assert_eq!(reader.lookup(word).unwrap(), Some(index), "lookup '{}'", word);
    }
    for missing in ["", "aa", "zzz", "wa", "warz", "apple "] {
        assert_eq!(reader.lookup(missing).unwrap(), None, "lookup '{}'", missing);
    }

    let (index, table) = reader.time_table_for("war").unwrap().unwrap();
    assert_eq!(reader.word_at(index).unwrap(), "war");
    assert_eq!(table.len(), expected["war"].len());
}

#[test]
fn test_adversarial_index_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (sorted, _) = build_sorted(temp_dir.path());
    let paths = StorePaths::new(&sorted);

    let blob_len = std::fs::metadata(&paths.words).unwrap().len() as u32;
    let time_len = std::fs::metadata(&paths.time).unwrap().len() as u32;
    let hostile = [
        Entry {
            word_offset: blob_len,
            word_length: 1,
            time_length: 1,
            ..Default::default()
        },
        Entry {
            word_offset: blob_len - 1,
            word_length: 2,
            time_length: 1,
            ..Default::default()
        },
        Entry {
            word_length: 1,
            time_offset: time_len - 8,
            time_length: 1,
            ..Default::default()
        },
        Entry {
            word_length: 1,
            time_offset: 0,
            time_length: 0,
            ..Default::default()
        },
    ];

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&paths.main)
        .unwrap();
    let mut buf = [0u8; ENTRY_RECORD_SIZE];
    for entry in &hostile {
        entry.write_ne(&mut buf);
        file.write_all(&buf).unwrap();
    }
    drop(file);

    let reader = StoreReader::open(&sorted).unwrap();
    let base = reader.num_words() - hostile.len();

    assert!(matches!(
        reader.word_at(base),
        Err(EventsError::WordOutOfBounds { .. })
    ));
    assert!(matches!(
        reader.word_at(base + 1),
        Err(EventsError::WordOutOfBounds { .. })
    ));
    assert!(matches!(
        reader.read_time_table(base + 2),
        Err(EventsError::TimeTableOutOfBounds { .. })
    ));
    assert!(matches!(
        reader.read_time_table(base + 3),
        Err(EventsError::EmptyTimeTable { .. })
    ));
    assert!(reader.verify().unwrap_err().is_structural());
}

#[test]
fn test_pruning_threshold() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().join("pruned");

    let mut writer = StoreWriter::create(&base, StoreConfig::default()).unwrap();
    writer.update("common", 1900, 1 << 14, 1).unwrap();
    writer.update("rare", 1900, (1 << 14) - 1, 1).unwrap();
    let stats = writer.finish().unwrap();
    assert_eq!(stats.words_written, 1);
    assert_eq!(stats.words_pruned, 1);

    let reader = StoreReader::open(&base).unwrap();
    assert_eq!(reader.word_at(0).unwrap(), "common");
    assert_eq!(
        reader.read_time_table(0).unwrap(),
        vec![TimeRecord::new(1900, 1 << 14, 1)]
    );
}
