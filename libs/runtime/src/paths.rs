//! Home directory resolution.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

/// Platform base directory: `%APPDATA%` on Windows, `$HOME` elsewhere.
fn platform_base_dir() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "APPDATA";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";

    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("environment variable {var} is not set"))
}

/// Expand a leading `~` and make the path absolute against the current directory.
fn expand_user_path(raw: &str) -> Result<PathBuf> {
    let expanded = if raw == "~" {
        platform_base_dir()?
    } else if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        platform_base_dir()?.join(rest)
    } else {
        PathBuf::from(raw)
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        let cwd = std::env::current_dir().context("current directory is unavailable")?;
        Ok(cwd.join(expanded))
    }
}

/// Resolve the application home directory.
///
/// `explicit` wins when given (`~` is expanded, relative paths are anchored at
/// the current directory). Otherwise `<platform base>/<default_subdir>` is used.
/// With `create`, the directory is created if missing.
pub fn resolve_home_dir(
    explicit: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf> {
    let dir = match explicit {
        Some(raw) => expand_user_path(raw.trim())?,
        None => platform_base_dir()?.join(default_subdir),
    };

    if create {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create home dir {}", dir.display()))?;
    }
    Ok(dir)
}

/// Join `rel` onto `base` unless it is already absolute.
pub fn resolve_under(base: &Path, rel: &str) -> PathBuf {
    let p = Path::new(rel);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
