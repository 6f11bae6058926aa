//! Primary keys and short aliases.
//!
//! A primary key looks like `<millis>-<random>-<sanitized filename>`, which
//! keeps it unique without coordination while staying readable in bucket
//! listings. Short aliases are 8 alphanumeric characters (~47.6 bits) and
//! are not checked against the store for collisions.

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;

pub const SHORT_ALIAS_LEN: usize = 8;

const KEY_SEPARATOR: char = '-';
const RANDOM_SEGMENT_LEN: usize = 8;
const RANDOM_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Replaces everything outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn generate_primary_key(filename: &str) -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..RANDOM_SEGMENT_LEN)
        .map(|_| RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())] as char)
        .collect();

    format!(
        "{}{sep}{}{sep}{}",
        Utc::now().timestamp_millis(),
        random,
        sanitize_filename(filename),
        sep = KEY_SEPARATOR
    )
}

pub fn generate_short_alias() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SHORT_ALIAS_LEN)
        .map(char::from)
        .collect()
}

/// Whether `identifier` could be a short alias. A primary key of the same
/// shape is still resolvable: alias lookup misses fall through to it.
pub fn looks_like_short_alias(identifier: &str) -> bool {
    identifier.len() == SHORT_ALIAS_LEN && identifier.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Drops the timestamp and random segments of a primary key. Keys that do
/// not have that shape are returned unchanged.
pub fn extract_original_filename(key: &str) -> &str {
    let mut parts = key.splitn(3, KEY_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(rest)) => rest,
        _ => key,
    }
}
