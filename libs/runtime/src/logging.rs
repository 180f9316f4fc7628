use crate::config::{LoggingConfig, Section};
use crate::paths::resolve_under;
use std::{
    io::{IsTerminal, Write},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::Level;
use tracing_subscriber::{filter::FilterFn, fmt};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

const DEFAULT_MAX_SIZE_MB: u64 = 50;
const DEFAULT_MAX_AGE_DAYS: u32 = 7;

// -------- level helpers --------
fn parse_tracing_level(s: &str) -> Option<tracing::Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" | "" => None,
        _ => Some(Level::INFO),
    }
}

/// Returns true if target == name or target starts with "name::"
fn matches_target_prefix(target: &str, name: &str) -> bool {
    target == name || (target.starts_with(name) && target[name.len()..].starts_with("::"))
}

type DefaultFilter = FilterFn<Box<dyn Fn(&tracing::Metadata<'_>) -> bool + Send + Sync + 'static>>;

/// Matches everything that no explicit section claims, up to `max_level`.
fn default_filter(claimed: &[String], max_level: Level) -> DefaultFilter {
    let claimed = claimed.to_vec();
    FilterFn::new(Box::new(move |meta: &tracing::Metadata<'_>| {
        let t = meta.target();
        !claimed.iter().any(|c| matches_target_prefix(t, c)) && meta.level() <= &max_level
    }))
}

// -------- rotating file writers --------

type SharedRotate = Arc<Mutex<FileRotate<AppendTimestamp>>>;

fn lock_rotate(inner: &SharedRotate) -> MutexGuard<'_, FileRotate<AppendTimestamp>> {
    // A panic while writing a log line must not disable logging for good.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write handle that drops output when no file is routed for the target.
#[derive(Clone)]
struct FileHandle(Option<SharedRotate>);

impl Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.0 {
            Some(inner) => lock_rotate(inner).write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &self.0 {
            Some(inner) => lock_rotate(inner).flush(),
            None => Ok(()),
        }
    }
}

/// Routes records to per-section files by target prefix, falling back to the default file.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<SharedRotate>,
    by_prefix: Vec<(String, SharedRotate)>,
}

impl FileRouter {
    fn resolve_for(&self, target: &str) -> Option<SharedRotate> {
        self.by_prefix
            .iter()
            .find(|(name, _)| matches_target_prefix(target, name))
            .map(|(_, w)| w.clone())
            .or_else(|| self.default.clone())
    }

    fn has_prefix(&self, name: &str) -> bool {
        self.by_prefix.iter().any(|(n, _)| n == name)
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = FileHandle;

    fn make_writer(&'a self) -> Self::Writer {
        FileHandle(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        FileHandle(self.resolve_for(meta.target()))
    }
}

/// Create a rotating writer, ensuring the parent directory exists.
fn open_rotating_file(section: &Section, log_path: &Path) -> std::io::Result<SharedRotate> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) * 1024 * 1024;
    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(i64::from(
            section.max_age_days.unwrap_or(DEFAULT_MAX_AGE_DAYS),
        ))),
    };

    let rot = FileRotate::new(
        log_path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes as usize),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    Ok(Arc::new(Mutex::new(rot)))
}

fn section_file(name: &str, section: &Section, base_dir: &Path) -> Option<SharedRotate> {
    if section.file.trim().is_empty() {
        return None;
    }
    let log_path = resolve_under(base_dir, &section.file);
    match open_rotating_file(section, &log_path) {
        Ok(w) => Some(w),
        Err(e) => {
            // No subscriber is installed yet.
            eprintln!(
                "failed to open log file for '{}': {} ({})",
                name,
                log_path.display(),
                e
            );
            None
        }
    }
}

// -------- config split --------

struct Plan<'a> {
    default_section: Option<&'a Section>,
    sections: Vec<(String, &'a Section)>,
    claimed: Vec<String>,
}

fn plan(cfg: &LoggingConfig) -> Plan<'_> {
    let mut sections: Vec<(String, &Section)> = cfg
        .iter()
        .filter(|(k, _)| k.as_str() != "default")
        .map(|(k, v)| (k.clone(), v))
        .collect();
    // Longest prefix first so "scheduling::infra" wins over "scheduling".
    sections.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    let claimed = sections.iter().map(|(n, _)| n.clone()).collect();

    Plan {
        default_section: cfg.get("default"),
        sections,
        claimed,
    }
}

fn targets_for<F>(plan: &Plan<'_>, level_of: F) -> tracing_subscriber::filter::Targets
where
    F: Fn(&str, &Section) -> Option<Level>,
{
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::filter::Targets;

    plan.sections
        .iter()
        .filter_map(|(name, s)| level_of(name, s).map(|l| (name.clone(), LevelFilter::from_level(l))))
        .fold(Targets::new().with_default(LevelFilter::OFF), |t, (name, l)| {
            t.with_target(name, l)
        })
}

// -------- public init --------

/// Install the global subscriber.
///
/// Console output goes to stderr so command output on stdout stays clean.
/// File output is JSON through `file-rotate`; relative file paths are resolved
/// against `base_dir` (the application home). Calling this twice is a no-op.
pub fn init_logging_from_config(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

    // Bridge `log` → `tracing` before installing the subscriber.
    let _ = tracing_log::LogTracer::init();

    let plan = plan(cfg);
    let ansi = std::io::stderr().is_terminal();

    let mut router = FileRouter {
        default: plan
            .default_section
            .and_then(|s| section_file("default", s, base_dir)),
        by_prefix: Vec::new(),
    };
    for (name, section) in &plan.sections {
        if let Some(w) = section_file(name, section, base_dir) {
            router.by_prefix.push((name.clone(), w));
        }
    }

    let console_explicit = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(targets_for(&plan, |_, s| parse_tracing_level(&s.console_level)));

    let console_default = plan
        .default_section
        .and_then(|s| parse_tracing_level(&s.console_level))
        .map(|level| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_filter(default_filter(&plan.claimed, level))
        });

    let file_explicit = (!router.by_prefix.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router.clone())
            .with_filter(targets_for(&plan, |name, s| {
                router
                    .has_prefix(name)
                    .then(|| parse_tracing_level(&s.file_level))
                    .flatten()
            }))
    });

    let file_default = match (plan.default_section, router.default.is_some()) {
        (Some(s), true) => parse_tracing_level(&s.file_level).map(|level| {
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(router.clone())
                .with_filter(default_filter(&plan.claimed, level))
        }),
        _ => None,
    };

    let _ = Registry::default()
        .with(console_explicit)
        .with(console_default)
        .with(file_explicit)
        .with(file_default)
        .try_init();
}

// =================== tests ===================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_logging_config;
    use tempfile::tempdir;

    fn section(file: &str) -> Section {
        Section {
            console_level: "info".into(),
            file: file.into(),
            file_level: "debug".into(),
            max_age_days: Some(7),
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn level_parsing() {
        assert_eq!(parse_tracing_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_tracing_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_tracing_level("Warn"), Some(Level::WARN));
        assert_eq!(parse_tracing_level("off"), None);
        assert_eq!(parse_tracing_level(""), None);
        assert_eq!(parse_tracing_level("loud"), Some(Level::INFO));
    }

    #[test]
    fn target_prefix_matching() {
        assert!(matches_target_prefix("scheduling", "scheduling"));
        assert!(matches_target_prefix("scheduling::domain::service", "scheduling"));
        assert!(!matches_target_prefix("scheduling_extra", "scheduling"));
        assert!(!matches_target_prefix("db", "scheduling"));
    }

    #[test]
    fn plan_orders_longest_prefix_first() {
        let mut cfg = default_logging_config();
        cfg.insert("scheduling".into(), section("logs/s.log"));
        cfg.insert("scheduling::infra".into(), section("logs/i.log"));

        let plan = plan(&cfg);
        assert!(plan.default_section.is_some());
        assert_eq!(plan.claimed, vec!["scheduling::infra", "scheduling"]);
    }

    #[test]
    fn router_prefers_specific_file() {
        let tmp = tempdir().unwrap();
        let s = section("x.log");
        let specific = open_rotating_file(&s, &tmp.path().join("a/specific.log")).unwrap();
        let fallback = open_rotating_file(&s, &tmp.path().join("b/default.log")).unwrap();

        let router = FileRouter {
            default: Some(fallback.clone()),
            by_prefix: vec![("scheduling".into(), specific.clone())],
        };

        let hit = router.resolve_for("scheduling::domain").unwrap();
        assert!(Arc::ptr_eq(&hit, &specific));
        let miss = router.resolve_for("db").unwrap();
        assert!(Arc::ptr_eq(&miss, &fallback));
        assert!(tmp.path().join("a").is_dir());
    }

    #[test]
    fn empty_file_disables_writer() {
        let tmp = tempdir().unwrap();
        assert!(section_file("default", &section("  "), tmp.path()).is_none());
        assert!(section_file("default", &section("logs/app.log"), tmp.path()).is_some());
        assert!(tmp.path().join("logs").is_dir());
    }
}
