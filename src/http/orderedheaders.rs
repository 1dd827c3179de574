use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};

/// Ordered, case-insensitive header multimap.
///
/// Names are stored lower-cased and keep the position of their first
/// insertion. A name may carry several values; readers see them joined
/// with `", "`. Canonical `Word-Capitalized` casing is applied only when the
/// map is serialized for the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultimap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMultimap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Store `value` under `name`, replacing existing values when `replace`
    /// is set and appending otherwise.
    pub fn set(&mut self, name: &str, value: &str, replace: bool) -> Result<(), NetError> {
        let key = validate_name(name)?;
        validate_value(value)?;

        match self.entries.iter_mut().find(|(n, _)| *n == key) {
            Some((_, values)) if replace => {
                values.clear();
                values.push(value.to_string());
            }
            Some((_, values)) => values.push(value.to_string()),
            None => self.entries.push((key, vec![value.to_string()])),
        }
        Ok(())
    }

    /// Replace all values of `name`.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        self.set(name, value, true)
    }

    /// Add a value to `name`, keeping the existing ones.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        self.set(name, value, false)
    }

    pub fn remove(&mut self, name: &str) {
        let key = name.to_ascii_lowercase();
        self.entries.retain(|(n, _)| *n != key);
    }

    /// All values of `name` joined with `", "`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.get_all(name).map(|values| values.join(", "))
    }

    /// The individual values of `name` in insertion order.
    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_all(name).is_some()
    }

    /// Every header as `(lower-cased name, joined value)`.
    pub fn all(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.join(", ")))
    }

    /// Append `text` to the most recent value of `name`.
    ///
    /// Used for folded header lines. Returns `false` when `name` is absent.
    pub(crate) fn extend_last(&mut self, name: &str, text: &str) -> bool {
        let last = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.last_mut());
        match last {
            Some(value) => {
                value.push(' ');
                value.push_str(text);
                true
            }
            None => false,
        }
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as `Title-Case: value\r\n` lines.
    pub fn write_wire(&self, out: &mut String) {
        for (name, values) in &self.entries {
            out.push_str(&title_case(name));
            out.push_str(": ");
            out.push_str(&values.join(", "));
            out.push_str("\r\n");
        }
    }
}

fn validate_name(name: &str) -> Result<String, NetError> {
    HeaderName::from_bytes(name.as_bytes())
        .map(|n| n.as_str().to_string())
        .map_err(|_| NetError::InvalidHeaderName(name.to_string()))
}

fn validate_value(value: &str) -> Result<(), NetError> {
    HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|_| NetError::InvalidArgument(format!("invalid header value {:?}", value)))
}

/// Convert to title case (e.g., "content-type" -> "Content-Type").
pub fn title_case(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars: Vec<char> = word.chars().collect();
            if let Some(first) = chars.first_mut() {
                *first = first.to_ascii_uppercase();
            }
            for c in chars.iter_mut().skip(1) {
                *c = c.to_ascii_lowercase();
            }
            chars.into_iter().collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Split a raw `Name: value` line; a line without a colon yields no value.
pub fn split_header_line(line: &str) -> (&str, Option<&str>) {
    match line.split_once(':') {
        Some((name, value)) => (name.trim(), Some(value.trim())),
        None => (line.trim(), None),
    }
}
