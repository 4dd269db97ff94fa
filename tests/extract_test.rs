//! Unit tests for URL extraction and content fingerprinting

use chattracks::extract::{compute_content_hash, detect_reaction};
use chattracks::UrlExtractor;
use proptest::prelude::*;

#[test]
fn test_three_way_classification() {
    let extractor = UrlExtractor::new().expect("Failed to build extractor");
    let text = "check https://open.spotify.com/track/1 then \
                https://youtube.com/watch?v=2 and https://example.com/3";

    let buckets = extractor.extract_urls_by_type(text);
    assert_eq!(buckets.spotify.len(), 1);
    assert_eq!(buckets.youtube.len(), 1);
    assert_eq!(buckets.other.len(), 1);

    let all = extractor.extract_all_urls(text);
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].kind, "spotify");
    assert_eq!(all[1].kind, "youtube");
    assert_eq!(all[2].kind, "other");
    assert_eq!(all[0].url, "https://open.spotify.com/track/1");
}

#[test]
fn test_empty_text_yields_empty_buckets() {
    let extractor = UrlExtractor::new().expect("Failed to build extractor");
    let buckets = extractor.extract_urls_by_type("");
    assert!(buckets.spotify.is_empty());
    assert!(buckets.youtube.is_empty());
    assert!(buckets.other.is_empty());
}

#[test]
fn test_multiple_urls_preserve_input_order() {
    let extractor = UrlExtractor::new().expect("Failed to build extractor");
    let text = "https://soundcloud.com/a https://tiktok.com/@b https://music.apple.com/c";
    let all = extractor.extract_all_urls(text);
    let kinds: Vec<&str> = all.iter().map(|m| m.kind.as_str()).collect();
    assert_eq!(kinds, vec!["soundcloud", "tiktok", "apple_music"]);
}

#[test]
fn test_hash_changes_when_any_field_changes() {
    let base = compute_content_hash(Some("text"), Some("sender"), Some("date"));
    assert_ne!(
        base,
        compute_content_hash(Some("text2"), Some("sender"), Some("date"))
    );
    assert_ne!(
        base,
        compute_content_hash(Some("text"), Some("sender2"), Some("date"))
    );
    assert_ne!(
        base,
        compute_content_hash(Some("text"), Some("sender"), Some("date2"))
    );
}

#[test]
fn test_identical_triples_collide_by_design() {
    // deduplication identity: equal normalized triples must hash equal
    let a = compute_content_hash(Some("Same Song"), Some("+15551234567"), Some("2024-05-01"));
    let b = compute_content_hash(Some("same song"), Some("+15551234567"), Some("2024-05-01"));
    assert_eq!(a, b);
}

#[test]
fn test_reaction_codes() {
    assert_eq!(detect_reaction(Some(2004)), "emphasized");
    assert_eq!(detect_reaction(Some(-1)), "no-reaction");
    assert_eq!(detect_reaction(None), "no-reaction");
}

proptest! {
    #[test]
    fn hash_is_pure_and_well_formed(text in ".*", sender in ".*", date in ".*") {
        let first = compute_content_hash(Some(&text), Some(&sender), Some(&date));
        let second = compute_content_hash(Some(&text), Some(&sender), Some(&date));
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), 64);
        prop_assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_case_insensitive(text in "[a-zA-Z0-9 ]{0,40}") {
        let lower = compute_content_hash(Some(&text.to_lowercase()), Some("s"), Some("d"));
        let upper = compute_content_hash(Some(&text.to_uppercase()), Some("s"), Some("d"));
        prop_assert_eq!(lower, upper);
    }
}
