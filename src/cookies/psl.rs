//! Public Suffix List (PSL) validation for cookie domains.
//!
//! Rejects cookies scoped to public suffixes like `.com` or `.co.uk`.
//! Uses Mozilla's Public Suffix List via the `psl` crate.

use psl::{List, Psl};

/// Check if a domain is a public suffix (e.g., "com", "co.uk").
pub fn is_public_suffix(domain: &str) -> bool {
    let domain_lower = domain.to_lowercase();
    let domain_bytes = domain_lower.as_bytes();

    match List.suffix(domain_bytes) {
        Some(suffix) => suffix.is_known() && suffix.as_bytes() == domain_bytes,
        None => false,
    }
}

/// Check whether `url_host` may set a cookie for `cookie_domain`.
///
/// A host may always scope a cookie to itself. Scoping to a parent domain
/// requires the parent to be a suffix of the host on a label boundary and,
/// when `check_public_suffix` is set, not to be a public suffix.
pub fn is_valid_cookie_domain(cookie_domain: &str, url_host: &str, check_public_suffix: bool) -> bool {
    let cookie_domain = cookie_domain.strip_prefix('.').unwrap_or(cookie_domain);
    let cookie_domain_lower = cookie_domain.to_lowercase();
    let url_host_lower = url_host.to_lowercase();

    if cookie_domain_lower.is_empty() {
        return false;
    }

    if url_host_lower == cookie_domain_lower {
        return true;
    }

    if !url_host_lower.ends_with(&format!(".{}", cookie_domain_lower)) {
        return false;
    }

    !(check_public_suffix && is_public_suffix(&cookie_domain_lower))
}
