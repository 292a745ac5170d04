#![forbid(unsafe_code)]

//! API-key gate for the scrape endpoint.

pub const API_KEY_HEADER: &str = "x-api-key";

/// Accepts `provided` only when a key is configured and the two match.
/// An unconfigured key rejects everything.
pub fn verify_api_key(provided: Option<&str>, expected: Option<&str>) -> bool {
    match (provided, expected) {
        (Some(provided), Some(expected)) => constant_time_eq(provided.as_bytes(), expected.as_bytes()),
        _ => false,
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
