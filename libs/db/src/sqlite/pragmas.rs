//! SQLite PRAGMA parameter handling with typed enums.

use std::collections::HashMap;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};

/// Busy timeout applied when neither the DSN nor the caller specifies one.
pub(crate) const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// SQLite journal mode options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JournalMode {
    Delete,
    Wal,
    Memory,
    Truncate,
    Persist,
    Off,
}

impl JournalMode {
    fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DELETE" => Some(JournalMode::Delete),
            "WAL" => Some(JournalMode::Wal),
            "MEMORY" => Some(JournalMode::Memory),
            "TRUNCATE" => Some(JournalMode::Truncate),
            "PERSIST" => Some(JournalMode::Persist),
            "OFF" => Some(JournalMode::Off),
            _ => None,
        }
    }

    fn to_sqlx(self) -> SqliteJournalMode {
        match self {
            JournalMode::Delete => SqliteJournalMode::Delete,
            JournalMode::Wal => SqliteJournalMode::Wal,
            JournalMode::Memory => SqliteJournalMode::Memory,
            JournalMode::Truncate => SqliteJournalMode::Truncate,
            JournalMode::Persist => SqliteJournalMode::Persist,
            JournalMode::Off => SqliteJournalMode::Off,
        }
    }
}

/// SQLite synchronous mode options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SyncMode {
    Off,
    Normal,
    Full,
    Extra,
}

impl SyncMode {
    fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OFF" => Some(SyncMode::Off),
            "NORMAL" => Some(SyncMode::Normal),
            "FULL" => Some(SyncMode::Full),
            "EXTRA" => Some(SyncMode::Extra),
            _ => None,
        }
    }

    fn to_sqlx(self) -> SqliteSynchronous {
        match self {
            SyncMode::Off => SqliteSynchronous::Off,
            SyncMode::Normal => SqliteSynchronous::Normal,
            SyncMode::Full => SqliteSynchronous::Full,
            SyncMode::Extra => SqliteSynchronous::Extra,
        }
    }
}

/// Parsed SQLite PRAGMA parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Pragmas {
    pub journal_mode: Option<JournalMode>,
    pub synchronous: Option<SyncMode>,
    pub busy_timeout_ms: Option<u64>,
    /// Legacy `wal=true|false|1|0` toggle.
    pub wal_toggle: Option<bool>,
}

impl Pragmas {
    /// Parse PRAGMA parameters from a key-value map. Invalid values are logged and ignored.
    pub(crate) fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let mut pragmas = Pragmas::default();

        for (key, value) in pairs {
            match key.to_lowercase().as_str() {
                "journal_mode" => match JournalMode::parse(value) {
                    Some(mode) => pragmas.journal_mode = Some(mode),
                    None => tracing::warn!("Invalid 'journal_mode' PRAGMA value '{}', ignoring", value),
                },
                "synchronous" => match SyncMode::parse(value) {
                    Some(mode) => pragmas.synchronous = Some(mode),
                    None => tracing::warn!("Invalid 'synchronous' PRAGMA value '{}', ignoring", value),
                },
                "busy_timeout" => match value.parse::<u64>() {
                    Ok(timeout) => pragmas.busy_timeout_ms = Some(timeout),
                    Err(_) => {
                        tracing::warn!("Invalid 'busy_timeout' PRAGMA value '{}', ignoring", value)
                    }
                },
                "wal" => match value.to_lowercase().as_str() {
                    "true" | "1" => pragmas.wal_toggle = Some(true),
                    "false" | "0" => pragmas.wal_toggle = Some(false),
                    _ => tracing::warn!("Invalid 'wal' PRAGMA value '{}', ignoring", value),
                },
                _ => tracing::debug!("Unknown SQLite PRAGMA parameter: {}", key),
            }
        }

        pragmas
    }

    /// Effective journal mode: explicit `journal_mode` wins over the `wal` toggle.
    /// In-memory databases default to DELETE, files to WAL.
    pub(crate) fn effective_journal_mode(&self, in_memory: bool) -> JournalMode {
        if let Some(mode) = self.journal_mode {
            return mode;
        }
        match self.wal_toggle {
            Some(true) => JournalMode::Wal,
            Some(false) => JournalMode::Delete,
            None if in_memory => JournalMode::Delete,
            None => JournalMode::Wal,
        }
    }

    /// Apply the parsed pragmas onto sqlx connect options.
    pub(crate) fn apply(
        &self,
        opts: SqliteConnectOptions,
        in_memory: bool,
        fallback_busy_timeout: Option<Duration>,
    ) -> SqliteConnectOptions {
        let busy_timeout = self
            .busy_timeout_ms
            .map(Duration::from_millis)
            .or(fallback_busy_timeout)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT);

        opts.journal_mode(self.effective_journal_mode(in_memory).to_sqlx())
            .synchronous(self.synchronous.unwrap_or(SyncMode::Normal).to_sqlx())
            .busy_timeout(busy_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_valid_values() {
        let pragmas = Pragmas::from_pairs(&pairs(&[
            ("journal_mode", "wal"),
            ("synchronous", "full"),
            ("busy_timeout", "7500"),
            ("wal", "1"),
        ]));

        assert_eq!(pragmas.journal_mode, Some(JournalMode::Wal));
        assert_eq!(pragmas.synchronous, Some(SyncMode::Full));
        assert_eq!(pragmas.busy_timeout_ms, Some(7500));
        assert_eq!(pragmas.wal_toggle, Some(true));
    }

    #[test]
    fn ignores_invalid_values() {
        let pragmas = Pragmas::from_pairs(&pairs(&[
            ("journal_mode", "sometimes"),
            ("synchronous", "yes"),
            ("busy_timeout", "-1"),
            ("wal", "maybe"),
        ]));

        assert_eq!(pragmas, Pragmas::default());
    }

    #[test]
    fn journal_mode_precedence() {
        let explicit = Pragmas::from_pairs(&pairs(&[("journal_mode", "TRUNCATE"), ("wal", "true")]));
        assert_eq!(explicit.effective_journal_mode(false), JournalMode::Truncate);

        let toggle_off = Pragmas::from_pairs(&pairs(&[("wal", "false")]));
        assert_eq!(toggle_off.effective_journal_mode(false), JournalMode::Delete);

        let defaults = Pragmas::default();
        assert_eq!(defaults.effective_journal_mode(false), JournalMode::Wal);
        assert_eq!(defaults.effective_journal_mode(true), JournalMode::Delete);
    }
}
