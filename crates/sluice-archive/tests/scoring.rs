mod common;

use std::io::{Cursor, Read};
use std::time::Duration;

use common::zip_of;
use sluice_archive::{
    ArchiveEntry, Engine, EntryHeader, EntrySource, ExtractOptions, Result, VerificationScorer,
};
use sluice_fs::MemorySink;

/// Declares one size and delivers another.
struct ShortSource {
    served: bool,
}

impl EntrySource for ShortSource {
    fn next_entry(&mut self) -> Option<Result<ArchiveEntry<'_>>> {
        if self.served {
            return None;
        }
        self.served = true;
        let data: Box<dyn Read> = Box::new(Cursor::new(vec![1u8; 99]));
        Some(Ok(ArchiveEntry::new(EntryHeader::file("short.bin", 100), data)))
    }
}

fn lenient_engine() -> Engine {
    Engine::builder()
        .scorer(VerificationScorer::new().min_budget(Duration::from_secs(60)))
        .build()
}

#[test]
fn clean_run_scores_one() {
    let archive = zip_of(&[("a.txt", b"alpha"), ("b/c.txt", b"charlie"), ("d/", b"")]);
    let mut engine = lenient_engine();
    let result = engine
        .extract(
            Cursor::new(archive),
            &mut MemorySink::new(),
            &ExtractOptions::default(),
        )
        .unwrap();

    let report = engine.score(&result);
    assert!((report.truth_score - 1.0).abs() < 1e-9);
    assert!(report.meets_threshold);
}

#[test]
fn size_mismatch_lowers_integrity() {
    let mut engine = lenient_engine();
    let result = engine
        .extract_with_source(
            &mut ShortSource { served: false },
            &mut MemorySink::new(),
            &ExtractOptions::default(),
        )
        .unwrap();

    assert_eq!(result.extracted_count, 1);
    assert_eq!(result.entry("short.bin").unwrap().bytes_written, 99);
    assert!(result.warnings[0].message.contains("99 of 100"));

    let report = engine.score(&result);
    assert_eq!(report.breakdown.data_integrity, 0.0);
    assert!(report.truth_score < 1.0);
    assert!(!report.meets_threshold);
}

#[test]
fn unsafe_entry_counts_against_accuracy() {
    let archive = zip_of(&[("ok.txt", b"fine"), ("../escape.txt", b"evil")]);
    let mut engine = lenient_engine();
    let result = engine
        .extract(
            Cursor::new(archive),
            &mut MemorySink::new(),
            &ExtractOptions::default(),
        )
        .unwrap();

    assert_eq!(result.extracted_count, 1);
    let report = engine.score(&result);
    assert!((report.breakdown.extraction_accuracy - 0.5).abs() < 1e-9);
    assert!(report.truth_score < 1.0);
}

#[test]
fn report_serializes() {
    let archive = zip_of(&[("a.txt", b"alpha")]);
    let mut engine = lenient_engine();
    let result = engine
        .extract(
            Cursor::new(archive),
            &mut MemorySink::new(),
            &ExtractOptions::default(),
        )
        .unwrap();

    let json = serde_json::to_value(engine.score(&result)).unwrap();
    assert!(json["breakdown"]["performance"].is_number());
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["entries"][0]["name"], "a.txt");
}
