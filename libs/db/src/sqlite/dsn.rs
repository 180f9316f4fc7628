//! SQLite DSN parsing and cleaning utilities.

use std::collections::HashMap;

/// Query parameters we translate into PRAGMAs; sqlx would reject them otherwise.
const SQLITE_PRAGMA_PARAMS: &[&str] = &["wal", "synchronous", "busy_timeout", "journal_mode"];

/// Split the whitelisted PRAGMA parameters out of a DSN.
///
/// Returns the DSN with those parameters removed plus the extracted pairs
/// (keys normalized to lowercase). A DSN that does not parse as a URL is
/// returned unchanged with no pairs.
pub(crate) fn extract_sqlite_pragmas(dsn: &str) -> (String, HashMap<String, String>) {
    let Ok(mut url) = url::Url::parse(dsn) else {
        return (dsn.to_string(), HashMap::new());
    };
    if url.query().is_none() {
        return (dsn.to_string(), HashMap::new());
    }

    let mut extracted = HashMap::new();
    let mut remaining = Vec::new();
    for (key, value) in url.query_pairs() {
        let key_lower = key.to_lowercase();
        if SQLITE_PRAGMA_PARAMS.contains(&key_lower.as_str()) {
            extracted.insert(key_lower, value.into_owned());
        } else {
            remaining.push(format!("{key}={value}"));
        }
    }

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&remaining.join("&")));
    }

    (url.to_string(), extracted)
}

/// Check if the DSN represents an in-memory SQLite database.
pub(crate) fn is_memory_dsn(dsn: &str) -> bool {
    if dsn == "sqlite::memory:" || dsn == "sqlite://:memory:" {
        return true;
    }

    if let Ok(url) = url::Url::parse(dsn) {
        return url
            .query_pairs()
            .any(|(k, v)| k.eq_ignore_ascii_case("mode") && v.eq_ignore_ascii_case("memory"));
    }

    false
}
