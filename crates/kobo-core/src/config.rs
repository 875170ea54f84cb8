use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::events::DEFAULT_LOOKBACK_DAYS;

pub const DEFAULT_LEDGER_PATH: &str = "data/confirmed_log.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct KoboConfig {
    /// Confirmation ledger CSV. Relative paths resolve against the project root.
    pub ledger_path: Option<String>,
    /// Processing log export (TIMESTAMP, PROJECT, PART, PATH, MESSAGE).
    pub log_path: Option<String>,
    pub master_path: Option<String>,
    pub sales_path: Option<String>,
    /// How far back processing-log rows still produce calendar events.
    pub lookback_days: Option<u32>,
}

/// Effective settings after layering project and global config over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub ledger_path: PathBuf,
    pub log_path: Option<PathBuf>,
    pub master_path: Option<PathBuf>,
    pub sales_path: Option<PathBuf>,
    pub lookback_days: u32,
}

pub fn config_filename_candidates() -> [&'static str; 2] {
    [".kobo.toml", ".koborc"]
}

pub fn resolve_user_home_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    if let Ok(profile) = std::env::var("USERPROFILE") {
        let trimmed = profile.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    None
}

pub fn resolve_kobo_home_dir() -> Option<PathBuf> {
    if let Ok(value) = std::env::var("KOBO_HOME") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    resolve_user_home_dir().map(|home| home.join(".kobo"))
}

pub fn global_config_path() -> Option<PathBuf> {
    resolve_kobo_home_dir().map(|home| home.join("config.toml"))
}

pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    for candidate in start.ancestors() {
        for name in config_filename_candidates() {
            if candidate.join(name).is_file() {
                return Some(candidate.to_path_buf());
            }
        }
    }
    None
}

pub fn read_config(path: &Path) -> Result<KoboConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str::<KoboConfig>(&text)?)
}

/// Project config, if present and readable. Broken files are logged and
/// ignored so a typo never blocks the ledger.
pub fn load_config(root: &Path) -> Option<KoboConfig> {
    for name in config_filename_candidates() {
        let path = root.join(name);
        if path.is_file() {
            match read_config(&path) {
                Ok(config) => return Some(config),
                Err(err) => warn!(path = %path.display(), %err, "ignoring unreadable config"),
            }
        }
    }
    None
}

pub fn load_global_config() -> Option<KoboConfig> {
    let path = global_config_path()?;
    if !path.is_file() {
        return None;
    }
    match read_config(&path) {
        Ok(config) => Some(config),
        Err(err) => {
            warn!(path = %path.display(), %err, "ignoring unreadable global config");
            None
        }
    }
}

/// Layers `project` over `global` over built-in defaults.
pub fn resolve_settings(
    root: &Path,
    project: Option<&KoboConfig>,
    global: Option<&KoboConfig>,
) -> Settings {
    let pick = |field: fn(&KoboConfig) -> Option<&String>| {
        project
            .and_then(field)
            .or_else(|| global.and_then(field))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(|value| resolve_against(root, value))
    };
    let lookback_days = project
        .and_then(|config| config.lookback_days)
        .or_else(|| global.and_then(|config| config.lookback_days))
        .unwrap_or(DEFAULT_LOOKBACK_DAYS);

    Settings {
        ledger_path: pick(|config| config.ledger_path.as_ref())
            .unwrap_or_else(|| root.join(DEFAULT_LEDGER_PATH)),
        log_path: pick(|config| config.log_path.as_ref()),
        master_path: pick(|config| config.master_path.as_ref()),
        sales_path: pick(|config| config.sales_path.as_ref()),
        lookback_days,
    }
}

pub fn load_settings(root: &Path) -> Settings {
    resolve_settings(
        root,
        load_config(root).as_ref(),
        load_global_config().as_ref(),
    )
}

fn resolve_against(root: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_any_config() {
        let root = Path::new("/srv/workshop");
        let settings = resolve_settings(root, None, None);
        assert_eq!(settings.ledger_path, root.join(DEFAULT_LEDGER_PATH));
        assert_eq!(settings.lookback_days, DEFAULT_LOOKBACK_DAYS);
        assert!(settings.log_path.is_none());
    }

    #[test]
    fn project_overrides_global() {
        let root = Path::new("/srv/workshop");
        let project = KoboConfig {
            ledger_path: Some("ledger.csv".to_string()),
            ..KoboConfig::default()
        };
        let global = KoboConfig {
            ledger_path: Some("/var/kobo/ledger.csv".to_string()),
            master_path: Some("/var/kobo/master.csv".to_string()),
            lookback_days: Some(30),
            ..KoboConfig::default()
        };
        let settings = resolve_settings(root, Some(&project), Some(&global));
        assert_eq!(settings.ledger_path, root.join("ledger.csv"));
        assert_eq!(settings.master_path, Some(PathBuf::from("/var/kobo/master.csv")));
        assert_eq!(settings.lookback_days, 30);
    }

    #[test]
    fn loads_project_config_and_finds_root() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(
            temp.path().join(".kobo.toml"),
            "log_path = \"exports/atlas.csv\"\nlookback_days = 45\n",
        )
        .expect("write");
        let expected = KoboConfig {
            log_path: Some("exports/atlas.csv".to_string()),
            lookback_days: Some(45),
            ..KoboConfig::default()
        };
        assert_eq!(load_config(temp.path()), Some(expected));
        let nested = temp.path().join("nested").join("deeper");
        fs::create_dir_all(&nested).expect("nested");
        assert_eq!(find_config_root(&nested), temp.path().canonicalize().ok());
    }

    #[test]
    fn broken_config_is_ignored() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join(".kobo.toml"), "lookback_days = \"many\"").expect("write");
        assert!(load_config(temp.path()).is_none());
        assert!(read_config(&temp.path().join(".kobo.toml")).is_err());
    }
}
