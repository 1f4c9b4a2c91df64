//! Request signature check: SHA-1 over the sorted (token, timestamp, nonce) triple,
//! with optional replay-window enforcement.

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

/// Lowercase hex SHA-1 of the lexicographically sorted and concatenated token, timestamp and nonce.
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Validate a request signature.
///
/// Returns false when `token` is absent. When `window_secs` is non-zero the timestamp must
/// parse as an integer and lie within `[now - window_secs, now]`.
pub fn validate(
    token: Option<&str>,
    signature: &str,
    timestamp: &str,
    nonce: &str,
    now_secs: i64,
    window_secs: u64,
) -> bool {
    let Some(token) = token else {
        return false;
    };

    if window_secs > 0 && !within_window(timestamp, now_secs, window_secs) {
        return false;
    }

    let expected = compute_signature(token, timestamp, nonce);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

fn within_window(timestamp: &str, now_secs: i64, window_secs: u64) -> bool {
    let Ok(ts) = timestamp.trim().parse::<i64>() else {
        log::debug!("signature timestamp is not an integer: {:?}", timestamp);
        return false;
    };
    let delta = i128::from(now_secs) - i128::from(ts);
    if delta < 0 {
        log::debug!("signature timestamp {} is in the future", ts);
        return false;
    }
    if delta > i128::from(window_secs) {
        log::debug!("signature timestamp {} expired ({}s old)", ts, delta);
        return false;
    }
    true
}
