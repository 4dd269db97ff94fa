//! URL extraction, reaction detection, and content fingerprinting.
//!
//! Link extraction is regex-based with domain-suffix classification;
//! reaction codes map through a fixed table; the content fingerprint is a
//! SHA-256 digest over the normalized (text, sender, date) triple and
//! defines deduplication identity: two messages with an identical
//! normalized triple collide on purpose.

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::body::{finalize_text, parse_attributed_body};
use crate::cache::MessageBodyCache;
use crate::error::Result;
use crate::models::{EnrichedFields, UrlBuckets, UrlMatch};

/// Delimiter joining the fingerprint fields. Part of the dedup identity;
/// changing it requires a db_version bump.
const HASH_DELIMITER: &str = "|";

/// Map a reaction/tapback type code to its label.
///
/// Returns `"no-reaction"` for `None`, zero, or any unrecognized code;
/// the lookup never fails.
#[must_use]
pub fn detect_reaction(type_code: Option<i64>) -> &'static str {
    match type_code {
        Some(2000) => "loved",
        Some(2001) => "liked",
        Some(2002) => "disliked",
        Some(2003) => "laughed",
        Some(2004) => "emphasized",
        Some(2005) => "questioned",
        Some(3000) => "removed-loved",
        Some(3001) => "removed-liked",
        Some(3002) => "removed-disliked",
        Some(3003) => "removed-laughed",
        Some(3004) => "removed-emphasized",
        Some(3005) => "removed-questioned",
        _ => "no-reaction",
    }
}

/// Compute the 64-hex-char SHA-256 content fingerprint.
///
/// The three fields are lowercased and joined with a delimiter; `None`
/// components count as empty strings. Fully deterministic.
#[must_use]
pub fn compute_content_hash(text: Option<&str>, sender: Option<&str>, date: Option<&str>) -> String {
    let joined = format!(
        "{}{HASH_DELIMITER}{}{HASH_DELIMITER}{}",
        text.unwrap_or_default().to_lowercase(),
        sender.unwrap_or_default().to_lowercase(),
        date.unwrap_or_default().to_lowercase(),
    );
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)
}

/// URL scanner with precompiled patterns.
pub struct UrlExtractor {
    url_regex: Regex,
    spotify_regex: Regex,
}

impl UrlExtractor {
    /// Compile the extraction patterns.
    pub fn new() -> Result<Self> {
        let url_regex = Regex::new(r#"https?://[^\s<>"']+"#)
            .map_err(|e| anyhow::anyhow!("Failed to compile URL regex: {e}"))?;
        let spotify_regex =
            Regex::new(r#"https?://(?:open\.spotify\.com|spotify\.link)/[^\s<>"']+"#)
                .map_err(|e| anyhow::anyhow!("Failed to compile Spotify regex: {e}"))?;
        Ok(Self {
            url_regex,
            spotify_regex,
        })
    }

    /// Extract Spotify URLs (canonical and short-link domains), in order.
    #[must_use]
    pub fn extract_spotify_urls(&self, text: &str) -> Vec<String> {
        self.spotify_regex
            .find_iter(text)
            .map(|m| trim_trailing_punctuation(m.as_str()).to_string())
            .collect()
    }

    /// Extract every URL in the text with its domain classification,
    /// in input order.
    #[must_use]
    pub fn extract_all_urls(&self, text: &str) -> Vec<UrlMatch> {
        self.url_regex
            .find_iter(text)
            .map(|m| {
                let url = trim_trailing_punctuation(m.as_str()).to_string();
                let kind = classify_url(&url).to_string();
                UrlMatch { url, kind }
            })
            .collect()
    }

    /// Coarse three-bucket view of the same scan.
    ///
    /// All three buckets are present even when the text holds no URLs.
    #[must_use]
    pub fn extract_urls_by_type(&self, text: &str) -> UrlBuckets {
        let mut buckets = UrlBuckets::default();
        for url_match in self.extract_all_urls(text) {
            match url_match.kind.as_str() {
                "spotify" => buckets.spotify.push(url_match.url),
                "youtube" => buckets.youtube.push(url_match.url),
                _ => buckets.other.push(url_match.url),
            }
        }
        buckets
    }

    /// Run the full per-message enrichment: body decode (through the cache),
    /// text resolution, URL bucketing, Spotify flags, and fingerprint.
    #[must_use]
    pub fn parse_message_fields(
        &self,
        cache: &mut MessageBodyCache,
        message_rowid: i64,
        text: Option<&str>,
        attributed_body: Option<&[u8]>,
        sender_handle: Option<&str>,
        date_utc: Option<&str>,
    ) -> EnrichedFields {
        let parsed_body =
            cache.get_or_insert_with(message_rowid, || parse_attributed_body(attributed_body));
        let final_text = finalize_text(text, &parsed_body);

        let urls = self.extract_urls_by_type(&final_text);
        let has_spotify = !urls.spotify.is_empty();
        let spotify_url = urls.spotify.first().cloned();

        let content_hash = if final_text.is_empty() {
            None
        } else {
            Some(compute_content_hash(
                Some(&final_text),
                sender_handle,
                date_utc,
            ))
        };

        EnrichedFields {
            final_text,
            content_hash,
            has_spotify,
            spotify_url,
            urls,
            parsed_body,
        }
    }
}

/// Classify a URL by host suffix, ignoring a leading `www.`.
fn classify_url(url: &str) -> &'static str {
    let host = match host_of(url) {
        Some(host) => host,
        None => return "other",
    };
    let host = host.strip_prefix("www.").unwrap_or(host);

    const DOMAIN_KINDS: &[(&str, &str)] = &[
        ("open.spotify.com", "spotify"),
        ("spotify.link", "spotify"),
        ("spotify.com", "spotify"),
        ("youtube.com", "youtube"),
        ("youtu.be", "youtube"),
        ("music.apple.com", "apple_music"),
        ("tiktok.com", "tiktok"),
        ("twitter.com", "twitter"),
        ("x.com", "twitter"),
        ("soundcloud.com", "soundcloud"),
        ("instagram.com", "instagram"),
        ("bandcamp.com", "bandcamp"),
        ("tidal.com", "tidal"),
    ];

    for (suffix, kind) in DOMAIN_KINDS {
        if host == *suffix || host.ends_with(&format!(".{suffix}")) {
            return kind;
        }
    }
    "other"
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split("://").nth(1)?;
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.split('@').next_back()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn trim_trailing_punctuation(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '"', '>'])
}
