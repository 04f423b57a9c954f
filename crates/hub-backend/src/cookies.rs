//! Cookie adapters and the guarded wrapper the client writes through.
//!
//! The caller hands the factory one of two adapter shapes:
//!
//! - [`CookieMethods`]: individual `get` / `set` / `remove`.
//! - [`CookieBatch`]: `get_all` / `set_all`, where `set_all` reports one
//!   outcome per cookie.
//!
//! Adapters may refuse a write (for instance while a read-only page is being
//! rendered and response headers are frozen). [`SessionCookies`] turns every
//! refusal into [`CookieWrite::Skipped`] and logs it; no write error ever
//! reaches the caller of the client.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::CookieError;

/// Default lifetime of session cookies: 400 days, the browser maximum.
pub const DEFAULT_MAX_AGE: i64 = 400 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: String,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: Some(DEFAULT_MAX_AGE),
            http_only: true,
            secure: false,
            same_site: SameSite::Lax,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, options: CookieOptions) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            options,
        }
    }

    /// A cookie that tells the browser to drop `name`.
    pub fn removal(name: impl Into<String>, options: &CookieOptions) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            options: CookieOptions {
                max_age: Some(0),
                ..options.clone()
            },
        }
    }

    pub fn is_removal(&self) -> bool {
        self.options.max_age == Some(0)
    }

    pub fn validate(&self) -> Result<(), CookieError> {
        let invalid = |message: &str| CookieError::Invalid {
            name: self.name.clone(),
            message: message.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("empty name"));
        }
        if self
            .name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "=;,\"\\()<>@:/[]?{}".contains(c))
        {
            return Err(invalid("name contains a separator"));
        }
        if self
            .value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | ',' | '"' | '\\'))
        {
            return Err(invalid("value contains a forbidden character"));
        }
        Ok(())
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        let o = &self.options;
        if !o.path.is_empty() {
            out.push_str("; Path=");
            out.push_str(&o.path);
        }
        if let Some(max_age) = o.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if o.http_only {
            out.push_str("; HttpOnly");
        }
        if o.secure {
            out.push_str("; Secure");
        }
        out.push_str("; SameSite=");
        out.push_str(o.same_site.as_str());
        out
    }
}

/// Adapter shape 1: individual operations.
pub trait CookieMethods: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, cookie: Cookie) -> Result<(), CookieError>;
    fn remove(&self, name: &str, options: &CookieOptions) -> Result<(), CookieError>;
}

/// Adapter shape 2: bulk read and bulk write. `set_all` must apply each
/// cookie on its own and return one result per input, in order.
pub trait CookieBatch: Send + Sync {
    fn get_all(&self) -> Vec<(String, String)>;
    fn set_all(&self, cookies: &[Cookie]) -> Vec<Result<(), CookieError>>;
}

#[derive(Clone)]
pub enum CookieAdapter {
    Methods(Arc<dyn CookieMethods>),
    Batch(Arc<dyn CookieBatch>),
}

impl CookieAdapter {
    pub fn methods(adapter: impl CookieMethods + 'static) -> Self {
        Self::Methods(Arc::new(adapter))
    }

    pub fn batch(adapter: impl CookieBatch + 'static) -> Self {
        Self::Batch(Arc::new(adapter))
    }
}

impl fmt::Debug for CookieAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Methods(_) => f.write_str("CookieAdapter::Methods"),
            Self::Batch(_) => f.write_str("CookieAdapter::Batch"),
        }
    }
}

/// Outcome of a guarded cookie write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieWrite {
    Applied,
    Skipped { name: String, reason: CookieError },
}

impl CookieWrite {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Guarded view over a [`CookieAdapter`]. Writes never fail.
#[derive(Clone, Debug)]
pub struct SessionCookies {
    adapter: CookieAdapter,
}

impl SessionCookies {
    pub fn new(adapter: CookieAdapter) -> Self {
        Self { adapter }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        match &self.adapter {
            CookieAdapter::Methods(a) => a.get(name),
            CookieAdapter::Batch(a) => a
                .get_all()
                .into_iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v),
        }
    }

    pub fn set(&self, cookie: Cookie) -> CookieWrite {
        let name = cookie.name.clone();
        let result = match &self.adapter {
            CookieAdapter::Methods(a) => a.set(cookie),
            CookieAdapter::Batch(a) => first_result(a.set_all(std::slice::from_ref(&cookie))),
        };
        guard(name, result)
    }

    pub fn remove(&self, name: &str, options: &CookieOptions) -> CookieWrite {
        let result = match &self.adapter {
            CookieAdapter::Methods(a) => a.remove(name, options),
            CookieAdapter::Batch(a) => first_result(a.set_all(&[Cookie::removal(name, options)])),
        };
        guard(name.to_string(), result)
    }

    /// Apply every cookie individually; one refused write does not stop the
    /// rest.
    pub fn set_all(&self, cookies: Vec<Cookie>) -> Vec<CookieWrite> {
        match &self.adapter {
            CookieAdapter::Methods(a) => cookies
                .into_iter()
                .map(|cookie| {
                    let name = cookie.name.clone();
                    let result = if cookie.is_removal() {
                        a.remove(&name, &cookie.options)
                    } else {
                        a.set(cookie)
                    };
                    guard(name, result)
                })
                .collect(),
            CookieAdapter::Batch(a) => {
                let mut results = a.set_all(&cookies).into_iter();
                cookies
                    .into_iter()
                    .map(|cookie| {
                        let result = results.next().unwrap_or(Err(CookieError::Unavailable(
                            "adapter returned fewer results than cookies".into(),
                        )));
                        guard(cookie.name, result)
                    })
                    .collect()
            }
        }
    }
}

fn first_result(results: Vec<Result<(), CookieError>>) -> Result<(), CookieError> {
    results
        .into_iter()
        .next()
        .unwrap_or(Err(CookieError::Unavailable("adapter returned no result".into())))
}

fn guard(name: String, result: Result<(), CookieError>) -> CookieWrite {
    match result {
        Ok(()) => CookieWrite::Applied,
        Err(reason) => {
            debug!(cookie = %name, %reason, "cookie write skipped");
            CookieWrite::Skipped { name, reason }
        }
    }
}

/// Whether the current phase of the request may still emit `Set-Cookie`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CookieContext {
    #[default]
    Mutable,
    ReadOnly,
}

/// Cookie jar for a single HTTP request: incoming cookies from the `Cookie`
/// header plus queued writes that become `Set-Cookie` headers.
#[derive(Debug, Default)]
pub struct RequestCookies {
    context: CookieContext,
    incoming: HashMap<String, String>,
    pending: Mutex<Vec<Cookie>>,
}

impl RequestCookies {
    pub fn new(incoming: HashMap<String, String>, context: CookieContext) -> Self {
        Self {
            context,
            incoming,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Build from the raw `Cookie` header values of a request.
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str>, context: CookieContext) -> Self {
        let incoming = headers.into_iter().flat_map(parse_cookie_header).collect();
        Self::new(incoming, context)
    }

    pub fn context(&self) -> CookieContext {
        self.context
    }

    /// Queued writes, oldest first.
    pub fn pending(&self) -> Vec<Cookie> {
        self.pending
            .lock()
            .map(|p| p.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Drain queued writes as `Set-Cookie` header values. Later writes to the
    /// same name replace earlier ones.
    pub fn take_set_cookie_headers(&self) -> Vec<String> {
        let drained = match self.pending.lock() {
            Ok(mut p) => std::mem::take(&mut *p),
            Err(e) => std::mem::take(&mut *e.into_inner()),
        };
        let mut latest: Vec<Cookie> = Vec::with_capacity(drained.len());
        for cookie in drained {
            latest.retain(|c| c.name != cookie.name);
            latest.push(cookie);
        }
        latest.iter().map(Cookie::to_header_value).collect()
    }

    fn queue(&self, cookie: Cookie) -> Result<(), CookieError> {
        if self.context == CookieContext::ReadOnly {
            return Err(CookieError::ReadOnlyContext);
        }
        cookie.validate()?;
        self.pending
            .lock()
            .map_err(|_| CookieError::Unavailable("cookie jar lock poisoned".into()))?
            .push(cookie);
        Ok(())
    }

    fn current(&self) -> HashMap<String, String> {
        let mut view = self.incoming.clone();
        for cookie in self.pending() {
            if cookie.is_removal() {
                view.remove(&cookie.name);
            } else {
                view.insert(cookie.name, cookie.value);
            }
        }
        view
    }
}

impl CookieMethods for RequestCookies {
    fn get(&self, name: &str) -> Option<String> {
        self.current().remove(name)
    }

    fn set(&self, cookie: Cookie) -> Result<(), CookieError> {
        self.queue(cookie)
    }

    fn remove(&self, name: &str, options: &CookieOptions) -> Result<(), CookieError> {
        self.queue(Cookie::removal(name, options))
    }
}

impl CookieBatch for RequestCookies {
    fn get_all(&self) -> Vec<(String, String)> {
        let mut all: Vec<_> = self.current().into_iter().collect();
        all.sort();
        all
    }

    fn set_all(&self, cookies: &[Cookie]) -> Vec<Result<(), CookieError>> {
        cookies.iter().map(|c| self.queue(c.clone())).collect()
    }
}

/// Split a `Cookie` request header into name/value pairs.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Adapter that refuses every write, like a render pass.
    struct FrozenHeaders;

    impl CookieMethods for FrozenHeaders {
        fn get(&self, _name: &str) -> Option<String> {
            None
        }
        fn set(&self, _cookie: Cookie) -> Result<(), CookieError> {
            Err(CookieError::ReadOnlyContext)
        }
        fn remove(&self, _name: &str, _options: &CookieOptions) -> Result<(), CookieError> {
            Err(CookieError::ReadOnlyContext)
        }
    }

    #[test]
    fn parses_cookie_header() {
        let pairs = parse_cookie_header("a=1; b=\"two\";c=; =x; junk");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("c".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn header_value_rendering() {
        let cookie = Cookie::new(
            "sid",
            "abc",
            CookieOptions {
                secure: true,
                same_site: SameSite::Strict,
                ..CookieOptions::default()
            },
        );
        assert_eq!(
            cookie.to_header_value(),
            format!("sid=abc; Path=/; Max-Age={DEFAULT_MAX_AGE}; HttpOnly; Secure; SameSite=Strict")
        );
        let removal = Cookie::removal("sid", &CookieOptions::default());
        assert!(removal.is_removal());
        assert!(removal.to_header_value().starts_with("sid=; Path=/; Max-Age=0"));
    }

    #[test]
    fn validation_rejects_bad_names_and_values() {
        let opts = CookieOptions::default();
        assert!(Cookie::new("", "v", opts.clone()).validate().is_err());
        assert!(Cookie::new("a b", "v", opts.clone()).validate().is_err());
        assert!(Cookie::new("a", "v;w", opts.clone()).validate().is_err());
        assert!(Cookie::new("sb-x-auth-token.0", "base64-abc_-", opts).validate().is_ok());
    }

    #[test]
    fn read_only_writes_are_skipped_not_raised() {
        let cookies = SessionCookies::new(CookieAdapter::methods(FrozenHeaders));
        let write = cookies.set(Cookie::new("a", "1", CookieOptions::default()));
        assert_eq!(
            write,
            CookieWrite::Skipped {
                name: "a".into(),
                reason: CookieError::ReadOnlyContext
            }
        );
        assert!(!cookies.remove("a", &CookieOptions::default()).is_applied());
        let all = cookies.set_all(vec![
            Cookie::new("a", "1", CookieOptions::default()),
            Cookie::removal("b", &CookieOptions::default()),
        ]);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|w| !w.is_applied()));
    }

    #[test]
    fn request_cookies_queue_writes_in_mutable_context() {
        let jar = Arc::new(RequestCookies::from_headers(["a=1; b=2"], CookieContext::Mutable));
        let cookies = SessionCookies::new(CookieAdapter::Methods(jar.clone()));
        assert_eq!(cookies.get("a").as_deref(), Some("1"));

        assert!(cookies.set(Cookie::new("a", "9", CookieOptions::default())).is_applied());
        assert!(cookies.remove("b", &CookieOptions::default()).is_applied());

        // reads see queued writes
        assert_eq!(cookies.get("a").as_deref(), Some("9"));
        assert_eq!(cookies.get("b"), None);

        let headers = jar.take_set_cookie_headers();
        assert_eq!(headers.len(), 2);
        assert!(headers[0].starts_with("a=9;"));
        assert!(headers[1].starts_with("b=;"));
        assert!(jar.take_set_cookie_headers().is_empty());
    }

    #[test]
    fn request_cookies_refuse_writes_when_read_only() {
        let jar = RequestCookies::from_headers(["a=1"], CookieContext::ReadOnly);
        assert_eq!(
            CookieMethods::set(&jar, Cookie::new("a", "2", CookieOptions::default())),
            Err(CookieError::ReadOnlyContext)
        );
        assert_eq!(CookieMethods::get(&jar, "a").as_deref(), Some("1"));
        assert!(jar.pending().is_empty());
    }

    #[test]
    fn batch_set_all_applies_each_cookie_individually() {
        let jar = Arc::new(RequestCookies::default());
        let cookies = SessionCookies::new(CookieAdapter::Batch(jar.clone()));
        let results = cookies.set_all(vec![
            Cookie::new("good", "1", CookieOptions::default()),
            Cookie::new("bad name", "2", CookieOptions::default()),
            Cookie::new("also_good", "3", CookieOptions::default()),
        ]);
        assert!(results[0].is_applied());
        assert!(matches!(
            &results[1],
            CookieWrite::Skipped { reason: CookieError::Invalid { .. }, .. }
        ));
        assert!(results[2].is_applied());
        assert_eq!(cookies.get("also_good").as_deref(), Some("3"));
        assert_eq!(jar.pending().len(), 2);
    }

    #[test]
    fn later_writes_to_same_name_win() {
        let jar = RequestCookies::default();
        CookieMethods::set(&jar, Cookie::new("a", "1", CookieOptions::default())).unwrap();
        CookieMethods::set(&jar, Cookie::new("a", "2", CookieOptions::default())).unwrap();
        let headers = jar.take_set_cookie_headers();
        assert_eq!(headers.len(), 1);
        assert!(headers[0].starts_with("a=2;"));
    }
}
