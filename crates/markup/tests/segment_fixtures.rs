use std::path::Path;

use markup::{BufferConfig, StreamConfig, StreamedSource};
use markup_test_support::diff_lines;
use markup_test_support::fixtures::{SegmentCase, load_segment_manifest};
use markup_test_support::segment_snapshot::format_stream;

fn run_case(case: &SegmentCase) -> Result<Vec<String>, String> {
    let buffer = match case.buffer {
        Some(capacity) => BufferConfig::Fixed(vec![0; capacity]),
        None => BufferConfig::default(),
    };
    let config = StreamConfig {
        buffer,
        coalescing: case.coalescing,
        split_character_references: case.split_character_references,
        ..StreamConfig::default()
    };
    let mut source = StreamedSource::with_config(case.input.as_bytes(), config);
    format_stream(&mut source)
}

fn check_manifest(name: &str) {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    let manifest = load_segment_manifest(&path);
    assert!(!manifest.cases.is_empty(), "no cases in {path:?}");

    let mut failures = Vec::new();
    for case in &manifest.cases {
        match run_case(case) {
            Ok(actual) if actual == case.expected => {}
            Ok(actual) => failures.push(format!(
                "case '{}':\n{}",
                case.id,
                diff_lines(&case.expected, &actual)
            )),
            Err(err) => failures.push(format!("case '{}': {err}", case.id)),
        }
    }
    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn golden_segments() {
    check_manifest("segments.toml");
}

#[test]
fn golden_segments_from_json() {
    check_manifest("segments.json");
}
