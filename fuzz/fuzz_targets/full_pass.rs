#![no_main]

use libfuzzer_sys::fuzz_target;
use markup::{DiscardIssues, Source};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let mut eager = Source::new(text.as_ref()).with_issue_sink(DiscardIssues);
    let tags = eager
        .all_tags()
        .expect("full pass over resident text cannot fail")
        .to_vec();
    for pair in tags.windows(2) {
        assert!(pair[0].begin() < pair[1].begin());
    }

    let mut lazy = Source::new(text.as_ref()).with_issue_sink(DiscardIssues);
    let mut pos = 0;
    while let Some(tag) = lazy.find_next_tag(pos, None).expect("lazy search") {
        assert!(tag.begin() >= pos);
        pos = tag.begin() + 1;
    }
    let attempts = lazy.stats().match_attempts;
    let mut pos = 0;
    while let Some(tag) = lazy.find_next_tag(pos, None).expect("lazy search") {
        pos = tag.begin() + 1;
    }
    assert_eq!(lazy.stats().match_attempts, attempts);
});
