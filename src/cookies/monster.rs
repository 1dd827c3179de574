use crate::base::neterror::NetError;
use crate::cookies::canonicalcookie::{is_valid_cookie_name, CookieRecord};
use crate::cookies::psl;
use crate::http::response::HttpResponse;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;

/// Maximum cookies per domain.
const MAX_COOKIES_PER_DOMAIN: usize = 50;

/// Maximum total cookies.
const MAX_COOKIES_TOTAL: usize = 3000;

/// A stored cookie plus the order in which it was set.
#[derive(Debug, Clone)]
struct StoredCookie {
    seq: u64,
    record: CookieRecord,
}

/// Thread-safe cookie jar shared by any number of requests.
///
/// Cookies are bucketed by domain in a `DashMap`, so concurrent sends that
/// share one jar only contend on the buckets they touch.
#[derive(Debug, Clone)]
pub struct CookieJar {
    store: Arc<DashMap<String, Vec<StoredCookie>>>,
    next_seq: Arc<AtomicU64>,
    serialize_session_cookies: bool,
    use_public_suffix_list: bool,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieJar {
    pub fn new() -> Self {
        Self::with_options(false, true)
    }

    pub fn with_options(serialize_session_cookies: bool, use_public_suffix_list: bool) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
            serialize_session_cookies,
            use_public_suffix_list,
        }
    }

    /// Whether session cookies are included when the jar is exported.
    pub fn serialize_session_cookies(&self) -> bool {
        self.serialize_session_cookies
    }

    pub fn set_serialize_session_cookies(&mut self, enabled: bool) {
        self.serialize_session_cookies = enabled;
    }

    pub fn use_public_suffix_list(&self) -> bool {
        self.use_public_suffix_list
    }

    pub fn set_use_public_suffix_list(&mut self, enabled: bool) {
        self.use_public_suffix_list = enabled;
    }

    /// Store `record` as set by a response to `request_url`.
    ///
    /// A missing domain becomes the request host (host-only); an explicit
    /// domain must cover the request host. A missing path becomes the
    /// directory of the request path. An already expired record deletes any
    /// matching cookie instead of being stored.
    pub fn store(&self, mut record: CookieRecord, request_url: &Url) -> Result<(), NetError> {
        if !is_valid_cookie_name(&record.name) {
            return Err(NetError::InvalidArgument(format!(
                "Invalid cookie name '{}'",
                record.name
            )));
        }
        let host = request_url
            .host_str()
            .ok_or_else(|| NetError::MissingValue(format!("URL {} has no host", request_url)))?
            .to_ascii_lowercase();

        match record.domain.take() {
            Some(domain) => {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                if !psl::is_valid_cookie_domain(&domain, &host, self.use_public_suffix_list) {
                    return Err(NetError::InvalidArgument(format!(
                        "Domain '{}' does not match host '{}'",
                        domain, host
                    )));
                }
                record.host_only = false;
                record.domain = Some(domain);
            }
            None => {
                record.domain = Some(host);
                record.host_only = true;
            }
        }

        if record.path.is_none() {
            record.path = Some(default_path(request_url.path()));
        }

        self.set_cookie(record);
        Ok(())
    }

    /// Insert an already normalized record.
    pub(crate) fn set_cookie(&self, record: CookieRecord) {
        let domain = record.domain.clone().unwrap_or_default();
        let path = record.path.clone().unwrap_or_default();
        let mut entry = self.store.entry(domain).or_default();

        // Remove existing if name/path match
        entry.retain(|c| {
            c.record.name != record.name || c.record.path.as_deref() != Some(path.as_str())
        });

        if record.is_expired(OffsetDateTime::now_utc()) {
            tracing::debug!(name = %record.name, "expired cookie removes stored one");
            return;
        }

        // Enforce per-domain limit by evicting the oldest cookie
        while entry.len() >= MAX_COOKIES_PER_DOMAIN {
            match entry
                .iter()
                .enumerate()
                .min_by_key(|(_, c)| c.seq)
                .map(|(i, _)| i)
            {
                Some(oldest_idx) => {
                    entry.remove(oldest_idx);
                }
                None => break,
            }
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entry.push(StoredCookie { seq, record });
        drop(entry); // Release lock before checking global count

        self.enforce_global_limit();
    }

    /// Enforce the global cookie limit by evicting oldest cookies.
    fn enforce_global_limit(&self) {
        while self.total_cookie_count() > MAX_COOKIES_TOTAL {
            let mut oldest: Option<(String, u64)> = None;

            for entry in self.store.iter() {
                for cookie in entry.value() {
                    if oldest.as_ref().map_or(true, |(_, seq)| cookie.seq < *seq) {
                        oldest = Some((entry.key().clone(), cookie.seq));
                    }
                }
            }

            match oldest {
                Some((domain, seq)) => {
                    if let Some(mut entry) = self.store.get_mut(&domain) {
                        entry.retain(|c| c.seq != seq);
                    }
                }
                None => break,
            }
        }
    }

    /// Cookies to send with a request to `url`.
    ///
    /// Ordered longest path first, then most recently set first.
    pub fn get_matching(&self, url: &Url) -> Vec<CookieRecord> {
        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let now = OffsetDateTime::now_utc();
        let mut result: Vec<StoredCookie> = Vec::new();

        for domain in Self::get_matching_domains(&host) {
            if let Some(entry) = self.store.get(&domain) {
                for cookie in entry.iter() {
                    let record = &cookie.record;
                    let cookie_domain = record.domain.as_deref().unwrap_or("");
                    if !Self::domain_matches(cookie_domain, &host, record.host_only) {
                        continue;
                    }
                    if !Self::path_matches(record.path.as_deref().unwrap_or("/"), url.path()) {
                        continue;
                    }
                    if record.secure && url.scheme() != "https" {
                        continue;
                    }
                    if record.is_expired(now) {
                        continue;
                    }
                    result.push(cookie.clone());
                }
            }
        }

        result.sort_by(|a, b| {
            let a_len = a.record.path.as_deref().map_or(0, str::len);
            let b_len = b.record.path.as_deref().map_or(0, str::len);
            b_len.cmp(&a_len).then_with(|| b.seq.cmp(&a.seq))
        });

        result.into_iter().map(|c| c.record).collect()
    }

    /// Matching cookies formatted as a `Cookie` header value.
    pub fn get_matching_header(&self, url: &Url) -> Option<String> {
        let cookies = self.get_matching(url);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(CookieRecord::pair)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Store every cookie set by `response`, scoped to its effective URL.
    ///
    /// Cookies the jar refuses are logged and skipped. Returns how many were
    /// accepted.
    pub fn add_cookies_from_response(&self, response: &HttpResponse) -> usize {
        let Some(url) = response.effective_url() else {
            return 0;
        };
        let mut stored = 0;
        for cookie in response.cookies() {
            match self.store(cookie.clone(), url) {
                Ok(()) => stored += 1,
                Err(e) => tracing::warn!(name = %cookie.name, error = %e, "rejected cookie"),
            }
        }
        stored
    }

    /// Every cookie that has not expired.
    pub fn get_all(&self) -> Vec<CookieRecord> {
        let now = OffsetDateTime::now_utc();
        let mut all: Vec<StoredCookie> = self
            .store
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|c| !c.record.is_expired(now))
            .collect();
        all.sort_by_key(|c| c.seq);
        all.into_iter().map(|c| c.record).collect()
    }

    /// Get total cookie count.
    pub fn total_cookie_count(&self) -> usize {
        self.store.iter().map(|e| e.value().len()).sum()
    }

    /// Clear all cookies.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Check if cookie domain matches request host.
    /// Implements RFC 6265 domain matching.
    fn domain_matches(cookie_domain: &str, request_host: &str, host_only: bool) -> bool {
        if host_only {
            return cookie_domain.eq_ignore_ascii_case(request_host);
        }

        let cookie_domain = cookie_domain.trim_start_matches('.');
        if request_host.eq_ignore_ascii_case(cookie_domain) {
            return true;
        }

        request_host.len() > cookie_domain.len()
            && request_host.ends_with(cookie_domain)
            && request_host.as_bytes()[request_host.len() - cookie_domain.len() - 1] == b'.'
    }

    /// Check if request path matches cookie path.
    /// Implements RFC 6265 path matching.
    fn path_matches(cookie_path: &str, request_path: &str) -> bool {
        if request_path == cookie_path {
            return true;
        }

        if let Some(rest) = request_path.strip_prefix(cookie_path) {
            return cookie_path.ends_with('/') || rest.starts_with('/');
        }

        false
    }

    /// The host itself and all parent domains.
    fn get_matching_domains(host: &str) -> Vec<String> {
        let mut domains = vec![host.to_string()];

        // For "foo.bar.example.com" also check "bar.example.com", "example.com"
        let parts: Vec<&str> = host.split('.').collect();
        for i in 1..parts.len().saturating_sub(1) {
            domains.push(parts[i..].join("."));
        }

        domains
    }
}

/// Directory of a request path, with a trailing slash.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(idx) if idx > 0 => request_path[..=idx].to_string(),
        _ => "/".to_string(),
    }
}
