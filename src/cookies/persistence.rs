//! Cookie persistence - save and load a [`CookieJar`] as JSON.
//!
//! Session cookies are written only when the jar has
//! `serialize_session_cookies` enabled; expired cookies are never written and
//! are dropped again on load.

use crate::base::neterror::NetError;
use crate::cookies::canonicalcookie::CookieRecord;
use crate::cookies::monster::CookieJar;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use time::OffsetDateTime;

/// On-disk form of a jar.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct PersistentJar {
    serialize_session_cookies: bool,
    use_public_suffix_list: bool,
    cookies: Vec<CookieRecord>,
}

/// Serialize `jar` to a JSON string.
pub fn to_json(jar: &CookieJar) -> Result<String, NetError> {
    let cookies = jar
        .get_all()
        .into_iter()
        .filter(|c| jar.serialize_session_cookies() || !c.is_session())
        .collect();

    let persistent = PersistentJar {
        serialize_session_cookies: jar.serialize_session_cookies(),
        use_public_suffix_list: jar.use_public_suffix_list(),
        cookies,
    };
    serde_json::to_string_pretty(&persistent)
        .map_err(|e| NetError::InvalidArgument(format!("cannot serialize cookies: {}", e)))
}

/// Restore a jar from [`to_json`] output.
pub fn from_json(json: &str) -> Result<CookieJar, NetError> {
    let persistent: PersistentJar = serde_json::from_str(json)
        .map_err(|e| NetError::InvalidArgument(format!("cannot parse cookies: {}", e)))?;

    let jar = CookieJar::with_options(
        persistent.serialize_session_cookies,
        persistent.use_public_suffix_list,
    );
    let now = OffsetDateTime::now_utc();

    for cookie in persistent.cookies {
        if cookie.is_expired(now) || cookie.domain.is_none() {
            continue;
        }
        jar.set_cookie(cookie);
    }

    Ok(jar)
}

/// Save cookies from a jar to a file.
///
/// # Example
/// ```ignore
/// persistence::save_cookies(&jar, Path::new("/path/to/cookies.json"))?;
/// ```
pub fn save_cookies(jar: &CookieJar, path: &Path) -> io::Result<()> {
    let json = to_json(jar).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)
}

/// Load cookies from a file into a new jar.
pub fn load_cookies(path: &Path) -> io::Result<CookieJar> {
    let json = fs::read_to_string(path)?;
    from_json(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::Duration;
    use url::Url;

    fn populated(serialize_session: bool) -> CookieJar {
        let jar = CookieJar::with_options(serialize_session, true);
        let url = Url::parse("https://example.com/app/index.html").unwrap();
        jar.store(CookieRecord::new("session", "s1"), &url).unwrap();
        jar.store(
            CookieRecord::new("persistent", "p1")
                .with_expires(OffsetDateTime::now_utc() + Duration::days(1)),
            &url,
        )
        .unwrap();
        jar
    }

    #[test]
    fn test_session_cookies_skipped_by_default() {
        let restored = from_json(&to_json(&populated(false)).unwrap()).unwrap();
        let names: Vec<_> = restored.get_all().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["persistent"]);
    }

    #[test]
    fn test_session_cookies_kept_when_enabled() {
        let restored = from_json(&to_json(&populated(true)).unwrap()).unwrap();
        assert_eq!(restored.total_cookie_count(), 2);
        assert!(restored.serialize_session_cookies());
    }

    #[test]
    fn test_restored_cookies_still_match() {
        let restored = from_json(&to_json(&populated(true)).unwrap()).unwrap();
        let url = Url::parse("https://example.com/app/other").unwrap();
        assert_eq!(
            restored.get_matching_header(&url).as_deref(),
            Some("persistent=p1; session=s1")
        );
    }

    #[test]
    fn test_expired_cookies_dropped_on_load() {
        let json = r#"{
            "serialize_session_cookies": false,
            "use_public_suffix_list": true,
            "cookies": [{
                "name": "old", "value": "x", "domain": "example.com", "path": "/",
                "expires": 1000, "secure": false
            }]
        }"#;
        assert_eq!(from_json(json).unwrap().total_cookie_count(), 0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        save_cookies(&populated(true), &path).unwrap();
        let loaded = load_cookies(&path).unwrap();
        assert_eq!(loaded.total_cookie_count(), 2);
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(
            load_cookies(&path).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }
}
