use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{NaiveDateTime, Timelike};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

/// Seconds subtracted from "now" to seed a new tenant's watermark (~6 months).
pub const INITIAL_LOOKBACK_SECS: i64 = 15_811_200;

const PLAYED_AT_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"];

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_code_verifier() -> String {
    random_alphanumeric(128)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Nonce bound to a tenant's pending authorization.
pub fn generate_state() -> String {
    random_alphanumeric(32)
}

/// Converts a `played_at` string into `(unix_seconds, hour_of_day)`.
///
/// The hour is taken from the naive wall-clock time in the string, before the
/// UTC offset is attached, so it is the UTC hour for `Z`-suffixed input.
pub fn convert_timestamp(timestamp: &str) -> Option<(i64, u32)> {
    PLAYED_AT_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(timestamp, format)
            .ok()
            .map(|naive| (naive.and_utc().timestamp(), naive.hour()))
    })
}

/// Extracts an entity id from an API URL (`.../playlists/{id}?fields=x`)
/// or a URI (`spotify:playlist:{id}`).
pub fn id_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    without_query
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Integer percentage of `done` out of `total`, clamped to 100.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.saturating_mul(100) / total).min(100) as u8
}
