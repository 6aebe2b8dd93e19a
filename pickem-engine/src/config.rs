// Configuration loading and parsing (league.toml).

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the file's top-level tables.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
    data: DataSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    /// Shared secret players type in to join a week's draft room.
    pub room_code: String,
    /// Roster of player names; must be even so every week pairs cleanly.
    pub players: Vec<String>,
    #[serde(default = "default_payout_per_point")]
    pub payout_per_point: i64,
}

fn default_payout_per_point() -> i64 {
    crate::engine::DEFAULT_PAYOUT_PER_POINT
}

#[derive(Debug, Clone, Deserialize)]
struct DataSection {
    db_path: String,
    fixtures_csv: String,
}

/// The assembled runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub db_path: String,
    pub fixtures_csv: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` relative to
/// the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy
/// defaults. Prefer `load_config()` which handles default initialization.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let league_path = base_dir.join("config").join("league.toml");
    let league_text = read_file(&league_path)?;
    let file: LeagueFile = toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
        path: league_path.clone(),
        source: e,
    })?;

    let config = Config {
        league: file.league,
        db_path: file.data.db_path,
        fixtures_csv: file.data.fixtures_csv,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // File already exists in config/, keep the user's copy
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying default config files first if needed.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;

    if league.room_code.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "league.room_code".into(),
            message: "must not be empty".into(),
        });
    }

    if league.players.len() < 2 || league.players.len() % 2 != 0 {
        return Err(ConfigError::ValidationError {
            field: "league.players".into(),
            message: format!(
                "need an even number of at least 2 players, got {}",
                league.players.len()
            ),
        });
    }

    let mut seen = HashSet::new();
    for name in &league.players {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: "league.players".into(),
                message: "player names must not be empty".into(),
            });
        }
        if !seen.insert(name.trim()) {
            return Err(ConfigError::ValidationError {
                field: "league.players".into(),
                message: format!("duplicate player name `{}`", name.trim()),
            });
        }
    }

    if league.payout_per_point <= 0 {
        return Err(ConfigError::ValidationError {
            field: "league.payout_per_point".into(),
            message: format!("must be > 0, got {}", league.payout_per_point),
        });
    }

    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "data.db_path".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const VALID_LEAGUE_TOML: &str = r#"
[league]
name = "Test League"
room_code = "SECRET"
players = ["Ada", "Brin", "Cleo", "Dov"]
payout_per_point = 5

[data]
db_path = "pickem.db"
fixtures_csv = "data/fixtures.csv"
"#;

    fn write_config(dir_tag: &str, league_toml: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("pickem_config_{dir_tag}"));
        let config_dir = tmp.join("config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("league.toml"), league_toml).unwrap();
        tmp
    }

    #[test]
    fn load_valid_config() {
        let tmp = write_config("valid", VALID_LEAGUE_TOML);
        let config = load_config_from(&tmp).expect("should load valid config");

        assert_eq!(config.league.name, "Test League");
        assert_eq!(config.league.room_code, "SECRET");
        assert_eq!(config.league.players.len(), 4);
        assert_eq!(config.league.payout_per_point, 5);
        assert_eq!(config.db_path, "pickem.db");
        assert_eq!(config.fixtures_csv, "data/fixtures.csv");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn payout_rate_defaults_when_omitted() {
        let toml = VALID_LEAGUE_TOML.replace("payout_per_point = 5\n", "");
        let tmp = write_config("default_rate", &toml);
        let config = load_config_from(&tmp).unwrap();
        assert_eq!(
            config.league.payout_per_point,
            crate::engine::DEFAULT_PAYOUT_PER_POINT
        );
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_odd_player_count() {
        let toml = VALID_LEAGUE_TOML.replace(
            r#"players = ["Ada", "Brin", "Cleo", "Dov"]"#,
            r#"players = ["Ada", "Brin", "Cleo"]"#,
        );
        let tmp = write_config("odd_players", &toml);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "league.players"),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_duplicate_player_names() {
        let toml = VALID_LEAGUE_TOML.replace(
            r#"players = ["Ada", "Brin", "Cleo", "Dov"]"#,
            r#"players = ["Ada", "Brin", "Ada", "Dov"]"#,
        );
        let tmp = write_config("dup_players", &toml);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "league.players"),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_blank_room_code() {
        let toml = VALID_LEAGUE_TOML.replace(r#"room_code = "SECRET""#, r#"room_code = "  ""#);
        let tmp = write_config("blank_room", &toml);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "league.room_code"),
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_nonpositive_payout_rate() {
        let toml = VALID_LEAGUE_TOML.replace("payout_per_point = 5", "payout_per_point = 0");
        let tmp = write_config("zero_rate", &toml);
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "league.payout_per_point")
            }
            other => panic!("expected ValidationError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_league_toml() {
        let tmp = std::env::temp_dir().join("pickem_config_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("league.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = write_config("invalid_toml", "this is not valid [[[ toml");
        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with("league.toml")),
            other => panic!("expected ParseError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_files() {
        let tmp = std::env::temp_dir().join("pickem_config_ensure_copies");
        let _ = fs::remove_dir_all(&tmp);
        let defaults_dir = tmp.join("defaults");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::write(defaults_dir.join("league.toml"), VALID_LEAGUE_TOML).unwrap();
        fs::write(defaults_dir.join("league.toml.example"), "# template\n").unwrap();

        assert!(!tmp.join("config").exists());
        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert_eq!(copied.len(), 1);
        assert!(tmp.join("config/league.toml").exists());
        assert!(!tmp.join("config/league.toml.example").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_skips_existing() {
        let tmp = std::env::temp_dir().join("pickem_config_ensure_skips");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("defaults/league.toml"), VALID_LEAGUE_TOML).unwrap();
        fs::write(tmp.join("config/league.toml"), "# custom\n").unwrap();

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert!(copied.is_empty());
        let content = fs::read_to_string(tmp.join("config/league.toml")).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("pickem_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        match &err {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("neither defaults/ nor config/"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }
        let _ = fs::remove_dir_all(&tmp);
    }
}
