use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RANKBOARD_DIR_NAME: &str = ".rankboard";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_COLLATION_LOCALE: &str = "ja";
pub const DEFAULT_DATABASE_FILE: &str = "history.sqlite";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RankboardConfig {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// BCP 47 locale whose collation orders group and member labels.
    #[serde(default = "default_collation_locale")]
    pub collation_locale: String,
    /// Group key -> brand names left out of that group's chart and table.
    #[serde(default)]
    pub exclusions: BTreeMap<String, Vec<String>>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            collation_locale: default_collation_locale(),
            exclusions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file name, relative to the `.rankboard` directory.
    #[serde(default = "default_database_file")]
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn rankboard_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(RANKBOARD_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    rankboard_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn database_path(workspace_root: impl AsRef<Path>, config: &RankboardConfig) -> PathBuf {
    rankboard_dir(workspace_root).join(&config.storage.database)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<RankboardConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(RankboardConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: RankboardConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<RankboardConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(rankboard_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = RankboardConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &RankboardConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    let locale = config.display.collation_locale.as_str();
    if !locale
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        warnings.push(ConfigWarning {
            code: "collation_locale_format",
            message: format!(
                "display.collation_locale '{locale}' does not look like a BCP 47 tag; \
                 labels sort by code point if it fails to load"
            ),
        });
    }

    for (group_key, brands) in &config.display.exclusions {
        if brands.is_empty() {
            warnings.push(ConfigWarning {
                code: "empty_exclusion",
                message: format!("display.exclusions['{group_key}'] lists no brand names"),
            });
        }
    }

    let database = Path::new(&config.storage.database);
    if database.is_absolute() || database.components().count() != 1 {
        warnings.push(ConfigWarning {
            code: "database_outside_rankboard_dir",
            message: format!(
                "storage.database '{}' should be a plain file name inside {RANKBOARD_DIR_NAME}",
                config.storage.database
            ),
        });
    }

    warnings
}

fn default_collation_locale() -> String {
    DEFAULT_COLLATION_LOCALE.to_owned()
}

fn default_database_file() -> String {
    DEFAULT_DATABASE_FILE.to_owned()
}

fn normalize_config(mut config: RankboardConfig) -> RankboardConfig {
    let locale = config.display.collation_locale.trim();
    config.display.collation_locale = if locale.is_empty() {
        default_collation_locale()
    } else {
        locale.to_owned()
    };

    config.display.exclusions = std::mem::take(&mut config.display.exclusions)
        .into_iter()
        .map(|(group_key, brands)| {
            let brands = brands
                .into_iter()
                .map(|brand| brand.trim().to_owned())
                .filter(|brand| !brand.is_empty())
                .collect::<Vec<_>>();
            (group_key.trim().to_owned(), brands)
        })
        .filter(|(group_key, _)| !group_key.is_empty())
        .collect();

    let database = config.storage.database.trim();
    config.storage.database = if database.is_empty() {
        default_database_file()
    } else {
        database.to_owned()
    };

    config
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn ensure_workspace_config_creates_default_file() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();

        let config = ensure_workspace_config(workspace).expect("ensure config");

        assert_eq!(config.display.collation_locale, DEFAULT_COLLATION_LOCALE);
        assert_eq!(config.storage.database, DEFAULT_DATABASE_FILE);
        assert!(config_path(workspace).exists());

        let content = fs::read_to_string(config_path(workspace)).expect("read config file");
        assert!(content.contains("[display]"));
        assert!(content.contains("collation_locale = \"ja\""));
        assert!(content.contains("[storage]"));
    }

    #[test]
    fn load_workspace_config_parses_and_normalizes_values() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        fs::create_dir_all(rankboard_dir(workspace)).expect("create .rankboard");

        let raw = r#"
[display]
collation_locale = "  en  "

[display.exclusions]
"広島市中区でまつげパーマが人気のまつげサロン" = [" elua 横川店 ", "", "elua 緑井店"]

[storage]
database = "  "
"#;
        fs::write(config_path(workspace), raw).expect("write config");

        let config = load_workspace_config(workspace).expect("load config");

        assert_eq!(config.display.collation_locale, "en");
        assert_eq!(
            config
                .display
                .exclusions
                .get("広島市中区でまつげパーマが人気のまつげサロン")
                .cloned(),
            Some(vec!["elua 横川店".to_owned(), "elua 緑井店".to_owned()])
        );
        assert_eq!(config.storage.database, DEFAULT_DATABASE_FILE);
        assert_eq!(
            database_path(workspace, &config),
            rankboard_dir(workspace).join(DEFAULT_DATABASE_FILE)
        );
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_workspace_config(temp.path()).expect("load config");
        assert_eq!(config, RankboardConfig::default());
    }

    #[test]
    fn validate_config_reports_suspicious_values() {
        let mut config = RankboardConfig::default();
        assert!(validate_config(&config).is_empty());

        config.display.collation_locale = "ja JP".to_owned();
        config
            .display
            .exclusions
            .insert("group".to_owned(), Vec::new());
        config.storage.database = "../elsewhere.sqlite".to_owned();

        let warnings = validate_config(&config);
        assert!(warnings[0].message.contains("sort by code point"));
        let codes = warnings
            .into_iter()
            .map(|warning| warning.code)
            .collect::<Vec<_>>();
        assert_eq!(
            codes,
            vec![
                "collation_locale_format",
                "empty_exclusion",
                "database_outside_rankboard_dir"
            ]
        );
    }
}
