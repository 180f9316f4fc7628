use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths::resolve_home_dir;

/// DSN used by `--mock`.
pub const MEMORY_DATABASE_URL: &str = "sqlite::memory:";

const DEFAULT_SUBDIR: &str = ".clinic-scheduler";

/// Application configuration with strongly-typed global sections
/// and a flexible per-module configuration bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base directory for relative database and log paths. Normalized to an
    /// absolute path on load; empty means the platform default.
    #[serde(default)]
    pub home_dir: String,
    /// Database configuration (optional).
    pub database: Option<DatabaseConfig>,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Directory containing per-module YAML files (optional).
    #[serde(default)]
    pub modules_dir: Option<String>,
    /// Per-module configuration bag: module_name → arbitrary JSON/YAML value.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite DSN, e.g. "sqlite://database/schedule.db?wal=true".
    pub url: String,
    /// Maximum number of connections in the pool (defaults to 10).
    pub max_conns: Option<u32>,
    /// Busy timeout in milliseconds (defaults to 5000).
    pub busy_timeout_ms: Option<u32>,
}

/// Logging configuration: subsystem name → settings.
/// Key "default" is the catch-all for targets without their own section.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    pub file: String,          // "logs/scheduler.log"; empty disables the file
    #[serde(default)]
    pub file_level: String,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

/// Default logging: quiet console, detailed rotating file.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "warn".to_string(),
            file: "logs/scheduler.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(50),
        },
    );
    logging
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://database/schedule.db".to_string(),
            max_conns: Some(10),
            busy_timeout_ms: Some(5000),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home_dir: String::new(),
            database: Some(DatabaseConfig::default()),
            logging: Some(default_logging_config()),
            modules_dir: None,
            modules: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Layered loading: defaults → YAML file → `APP__` environment variables.
    /// Normalizes `home_dir` into an absolute path and creates the directory.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let path = config_path.as_ref();
        if !path.is_file() {
            anyhow::bail!("config file not found: {}", path.display());
        }

        // Optional sections stay None unless YAML/ENV provide them.
        let base = AppConfig {
            home_dir: String::new(),
            database: None,
            logging: None,
            modules_dir: None,
            modules: HashMap::new(),
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(path))
            // APP__DATABASE__URL=sqlite://... maps to database.url
            .merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;

        config.normalize_home_dir().context("failed to resolve home_dir")?;

        if let Some(dir) = config.modules_dir.clone() {
            let dir = crate::paths::resolve_under(Path::new(&config.home_dir), &dir);
            merge_module_files(&mut config.modules, &dir)?;
        }

        Ok(config)
    }

    /// Load from file when given, otherwise use defaults. `home_dir` is normalized either way.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                c.normalize_home_dir()
                    .context("failed to resolve home_dir (defaults)")?;
                Ok(c)
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if args.mock {
            let db = self.database.get_or_insert_with(DatabaseConfig::default);
            db.url = MEMORY_DATABASE_URL.to_string();
        }

        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            match args.verbose {
                0 => {}
                1 => default_section.console_level = "debug".to_string(),
                _ => default_section.console_level = "trace".to_string(),
            }
        }
    }

    /// Typed view of `modules.<name>`; a missing entry yields `T::default()`.
    pub fn module_config<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.modules.get(name) {
            Some(raw) => serde_json::from_value(raw.clone())
                .with_context(|| format!("invalid config for module '{name}'")),
            None => Ok(T::default()),
        }
    }

    pub fn home_path(&self) -> PathBuf {
        PathBuf::from(&self.home_dir)
    }

    fn normalize_home_dir(&mut self) -> Result<()> {
        let explicit = if self.home_dir.trim().is_empty() {
            None
        } else {
            Some(self.home_dir.clone())
        };
        let resolved = resolve_home_dir(explicit, DEFAULT_SUBDIR, true)?;
        self.home_dir = resolved.to_string_lossy().to_string();
        Ok(())
    }
}

/// Command line arguments relevant to configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
    pub mock: bool,
}

/// Each `<name>.yaml` in `dir` becomes `modules.<name>`, overriding inline entries.
fn merge_module_files(bag: &mut HashMap<String, serde_json::Value>, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if !path.is_file() || !is_yaml {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = std::fs::read_to_string(&path)?;
        let val: serde_yaml::Value =
            serde_yaml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        bag.insert(name.to_string(), serde_json::to_value(val)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("scheduler.yaml");
        fs::write(&path, body).unwrap();
        path
    }

    fn yaml_path(p: &Path) -> String {
        p.to_string_lossy().replace('\\', "/")
    }

    #[test]
    fn default_config_structure() {
        let config = AppConfig::default();

        assert_eq!(config.home_dir, "");
        let db = config.database.as_ref().unwrap();
        assert_eq!(db.url, "sqlite://database/schedule.db");
        assert_eq!(db.max_conns, Some(10));
        assert_eq!(db.busy_timeout_ms, Some(5000));

        let default_section = &config.logging.as_ref().unwrap()["default"];
        assert_eq!(default_section.console_level, "warn");
        assert_eq!(default_section.file, "logs/scheduler.log");
        assert!(config.modules.is_empty());
    }

    #[test]
    fn load_layered_reads_all_sections() {
        let tmp = tempdir().unwrap();
        let home = tmp.path().join("home");
        let cfg_path = write_config(
            tmp.path(),
            &format!(
                r#"
home_dir: "{}"
database:
  url: "sqlite://db/clinic.db?wal=true"
  max_conns: 4
  busy_timeout_ms: 2500
logging:
  default:
    console_level: info
    file: ""
modules:
  scheduling:
    buffer_minutes: 30
"#,
                yaml_path(&home)
            ),
        );

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert_eq!(config.home_path(), home);
        assert!(home.is_dir());
        let db = config.database.as_ref().unwrap();
        assert_eq!(db.url, "sqlite://db/clinic.db?wal=true");
        assert_eq!(db.max_conns, Some(4));
        assert_eq!(db.busy_timeout_ms, Some(2500));
        assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, "info");
        assert_eq!(config.modules["scheduling"]["buffer_minutes"], 30);
    }

    #[test]
    fn minimal_yaml_leaves_optional_sections_empty() {
        let tmp = tempdir().unwrap();
        let cfg_path = write_config(
            tmp.path(),
            &format!("home_dir: \"{}\"\n", yaml_path(&tmp.path().join("h"))),
        );

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert!(config.database.is_none());
        assert!(config.logging.is_none());
        assert!(config.modules.is_empty());
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let tmp = tempdir().unwrap();
        let cfg_path = write_config(
            tmp.path(),
            &format!(
                "home_dir: \"{}\"\nserver:\n  port: 1\n",
                yaml_path(&tmp.path().join("h"))
            ),
        );

        assert!(AppConfig::load_layered(&cfg_path).is_err());
    }

    #[test]
    fn modules_dir_files_are_merged() {
        let tmp = tempdir().unwrap();
        let modules_dir = tmp.path().join("modules.d");
        fs::create_dir_all(&modules_dir).unwrap();
        fs::write(
            modules_dir.join("scheduling.yaml"),
            "buffer_minutes: 15\nreject_past_slots: false\n",
        )
        .unwrap();
        fs::write(modules_dir.join("notes.txt"), "ignored").unwrap();

        let cfg_path = write_config(
            tmp.path(),
            &format!(
                "home_dir: \"{}\"\nmodules_dir: \"{}\"\nmodules:\n  other:\n    key: value\n",
                yaml_path(&tmp.path().join("h")),
                yaml_path(&modules_dir)
            ),
        );

        let config = AppConfig::load_layered(&cfg_path).unwrap();

        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules["scheduling"]["buffer_minutes"], 15);
        assert_eq!(config.modules["other"]["key"], "value");
    }

    #[test]
    fn cli_overrides_verbose_and_mock() {
        for (verbose, expected) in [(0, "warn"), (1, "debug"), (2, "trace"), (5, "trace")] {
            let mut config = AppConfig::default();
            config.apply_cli_overrides(&CliArgs {
                verbose,
                ..Default::default()
            });
            assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, expected);
        }

        let mut config = AppConfig {
            database: None,
            ..Default::default()
        };
        config.apply_cli_overrides(&CliArgs {
            mock: true,
            ..Default::default()
        });
        assert_eq!(config.database.unwrap().url, MEMORY_DATABASE_URL);
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Probe {
        #[serde(default)]
        level: u32,
    }

    #[test]
    fn module_config_defaults_when_missing() {
        let mut config = AppConfig::default();
        assert_eq!(config.module_config::<Probe>("probe").unwrap(), Probe::default());

        config
            .modules
            .insert("probe".into(), serde_json::json!({ "level": 3 }));
        assert_eq!(config.module_config::<Probe>("probe").unwrap(), Probe { level: 3 });

        config
            .modules
            .insert("probe".into(), serde_json::json!({ "level": "high" }));
        assert!(config.module_config::<Probe>("probe").is_err());
    }

    #[test]
    fn to_yaml_roundtrip() {
        let config = AppConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("database:"));
        assert!(yaml.contains("logging:"));

        let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.database.unwrap().url, "sqlite://database/schedule.db");
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = AppConfig::load_layered(tmp.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
