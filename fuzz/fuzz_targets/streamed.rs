#![no_main]

use libfuzzer_sys::fuzz_target;
use markup::{BufferConfig, DiscardIssues, Source, StreamConfig, StreamedSource};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let text = String::from_utf8_lossy(rest);
    let config = StreamConfig {
        buffer: BufferConfig::Auto {
            initial_capacity: usize::from(selector % 32) + 1,
        },
        coalescing: selector & 0x40 != 0,
        split_character_references: selector & 0x80 != 0,
        ..StreamConfig::default()
    };
    let stream = StreamedSource::with_config(text.as_bytes(), config)
        .with_issue_sink(DiscardIssues);
    let streamed: Vec<_> = stream
        .map(|segment| segment.expect("auto buffer over a slice cannot fail"))
        .filter_map(|segment| segment.as_tag().map(|tag| (tag.span, tag.type_id)))
        .collect();

    let mut source = Source::new(text.as_ref()).with_issue_sink(DiscardIssues);
    let eager: Vec<_> = source
        .all_tags()
        .expect("full pass")
        .iter()
        .map(|tag| (tag.span, tag.type_id))
        .collect();
    assert_eq!(streamed, eager);
});
