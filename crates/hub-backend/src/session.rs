//! Session and user records, and how a session is stored in cookies.
//!
//! The session is serialized as JSON, base64url-encoded and prefixed with
//! `base64-`. Values longer than [`MAX_CHUNK_SIZE`] are split over
//! `<name>.0`, `<name>.1`, … so each cookie stays under browser limits.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cookies::{Cookie, CookieOptions, SessionCookies};

pub const COOKIE_VALUE_PREFIX: &str = "base64-";
pub const MAX_CHUNK_SIZE: usize = 3180;

/// Highest chunk index probed when reading or clearing a chunked cookie.
const MAX_CHUNKS: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fill `expires_at` from `expires_in` when the backend omitted it.
    pub fn normalized(mut self, now: i64) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(now + self.expires_in);
        }
        self
    }

    /// True when the access token expires within `margin` seconds of `now`.
    /// Sessions without an expiry never expire.
    pub fn expires_within(&self, now: i64, margin: i64) -> bool {
        self.expires_at.is_some_and(|at| at - margin <= now)
    }
}

pub fn encode_session(session: &Session) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(session)?;
    Ok(format!("{COOKIE_VALUE_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
}

/// Decode a cookie value. Plain JSON is accepted for older cookies; anything
/// unreadable is `None`.
pub fn decode_session(value: &str) -> Option<Session> {
    match value.strip_prefix(COOKIE_VALUE_PREFIX) {
        Some(encoded) => {
            let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')).ok()?;
            serde_json::from_slice(&bytes).ok()
        }
        None => serde_json::from_str(value).ok(),
    }
}

/// Split `value` into cookies named `name` (fits in one chunk) or
/// `name.0..name.N`.
pub fn chunk_cookies(name: &str, value: &str, options: &CookieOptions) -> Vec<Cookie> {
    if value.len() <= MAX_CHUNK_SIZE {
        return vec![Cookie::new(name, value, options.clone())];
    }
    // base64url and the prefix are ASCII, so byte chunks are char boundaries.
    value
        .as_bytes()
        .chunks(MAX_CHUNK_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            Cookie::new(
                format!("{name}.{i}"),
                String::from_utf8_lossy(chunk).into_owned(),
                options.clone(),
            )
        })
        .collect()
}

/// Reassemble a possibly chunked cookie.
pub fn read_chunked(cookies: &SessionCookies, name: &str) -> Option<String> {
    if let Some(value) = cookies.get(name) {
        return Some(value);
    }
    let mut out = String::new();
    for i in 0..MAX_CHUNKS {
        match cookies.get(&format!("{name}.{i}")) {
            Some(part) => out.push_str(&part),
            None => break,
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Names currently present for `name`, chunked or not.
pub fn present_cookie_names(cookies: &SessionCookies, name: &str) -> Vec<String> {
    let mut names = Vec::new();
    if cookies.get(name).is_some() {
        names.push(name.to_string());
    }
    for i in 0..MAX_CHUNKS {
        let chunk = format!("{name}.{i}");
        if cookies.get(&chunk).is_none() {
            break;
        }
        names.push(chunk);
    }
    names
}
