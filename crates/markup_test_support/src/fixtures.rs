//! Golden segmentation cases described by a TOML or JSON manifest.
//!
//! ```toml
//! format = "markup-segments-v1"
//!
//! [[cases]]
//! id = "charref"
//! input = "a &amp; b"
//! buffer = 4          # optional fixed buffer capacity
//! coalescing = false  # optional
//! expected = ["TEXT 0..2 \"a \"", "CHARREF 2..7 U+0026", "TEXT 7..9 \" b\""]
//! ```

use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const SEGMENT_FIXTURES_FORMAT_V1: &str = "markup-segments-v1";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SegmentManifest {
    pub format: String,
    pub cases: Vec<SegmentCase>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SegmentCase {
    pub id: String,
    pub input: String,
    /// Fixed buffer capacity; an auto-growing buffer when absent.
    #[serde(default)]
    pub buffer: Option<usize>,
    #[serde(default)]
    pub coalescing: bool,
    #[serde(default = "split_by_default")]
    pub split_character_references: bool,
    pub expected: Vec<String>,
}

fn split_by_default() -> bool {
    true
}

/// Read and validate a manifest; `.json` files are parsed as JSON,
/// everything else as TOML. Panics with the path on any problem.
pub fn load_segment_manifest(path: &Path) -> SegmentManifest {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read segment manifest {path:?}: {err}"));
    let manifest: SegmentManifest = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .unwrap_or_else(|err| panic!("failed to parse segment manifest {path:?}: {err}"))
    } else {
        toml::from_str(&content)
            .unwrap_or_else(|err| panic!("failed to parse segment manifest {path:?}: {err}"))
    };
    validate(&manifest, path);
    manifest
}

fn validate(manifest: &SegmentManifest, path: &Path) {
    assert_eq!(
        manifest.format, SEGMENT_FIXTURES_FORMAT_V1,
        "unsupported segment manifest format in {path:?}"
    );
    let mut ids = BTreeSet::new();
    for case in &manifest.cases {
        assert!(
            ids.insert(case.id.as_str()),
            "duplicate segment case id in {path:?}: {}",
            case.id
        );
        assert!(
            case.buffer.is_none_or(|capacity| capacity > 0),
            "case '{}' in {path:?} has a zero-sized buffer",
            case.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_take_defaults() {
        let manifest: SegmentManifest = toml::from_str(
            r#"
            format = "markup-segments-v1"
            [[cases]]
            id = "plain"
            input = "x"
            expected = ["TEXT 0..1 \"x\""]
            "#,
        )
        .unwrap();
        let case = &manifest.cases[0];
        assert_eq!(case.buffer, None);
        assert!(!case.coalescing);
        assert!(case.split_character_references);
        validate(&manifest, Path::new("inline.toml"));
    }

    #[test]
    fn json_and_toml_describe_the_same_case() {
        let from_json: SegmentManifest = serde_json::from_str(
            r#"{"format":"markup-segments-v1","cases":[
                {"id":"plain","input":"x","buffer":2,"expected":["TEXT 0..1 \"x\""]}]}"#,
        )
        .unwrap();
        let from_toml: SegmentManifest = toml::from_str(
            r#"
            format = "markup-segments-v1"
            [[cases]]
            id = "plain"
            input = "x"
            buffer = 2
            expected = ["TEXT 0..1 \"x\""]
            "#,
        )
        .unwrap();
        assert_eq!(from_json, from_toml);
    }

    #[test]
    #[should_panic(expected = "duplicate segment case id")]
    fn duplicate_ids_are_rejected() {
        let manifest: SegmentManifest = toml::from_str(
            r#"
            format = "markup-segments-v1"
            [[cases]]
            id = "a"
            input = ""
            expected = []
            [[cases]]
            id = "a"
            input = ""
            expected = []
            "#,
        )
        .unwrap();
        validate(&manifest, Path::new("inline.toml"));
    }
}
