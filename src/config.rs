//! Configuration file (`permgraph.toml`).
//!
//! ```toml
//! database = "/var/lib/permgraph/dataset.json"
//! refresh_interval_secs = 60
//! rebuild_timeout_secs = 30
//! socket = "/run/permgraph.sock"
//!
//! [[aliases]]
//! permission = "owner"
//! expands_to = [
//!     { permission = "ssh", argument = "owner={arg}" },
//!     { permission = "sudo" },
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aliases::{AliasRule, AliasTable};
use crate::error::{GraphError, Result};

const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;
const DEFAULT_SOCKET: &str = "permgraph.sock";

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_socket() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path of the dataset dump served by the daemon.
    pub database: PathBuf,

    /// Seconds between checkpoint polls.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Upper bound on one refresh. Unset means no bound.
    #[serde(default)]
    pub rebuild_timeout_secs: Option<u64>,

    #[serde(default = "default_socket")]
    pub socket: PathBuf,

    #[serde(default)]
    pub aliases: Vec<AliasRule>,
}

impl Config {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            rebuild_timeout_secs: None,
            socket: default_socket(),
            aliases: Vec::new(),
        }
    }

    /// Read and validate a config file. Relative paths inside it are
    /// resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_str(&text)?;
        if let Some(base) = path.parent() {
            if config.database.is_relative() {
                config.database = base.join(&config.database);
            }
            if config.socket.is_relative() {
                config.socket = base.join(&config.socket);
            }
        }
        Ok(config)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            return Err(GraphError::Config("database path is empty".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(GraphError::Config("refresh_interval_secs must be positive".into()));
        }
        if self.rebuild_timeout_secs == Some(0) {
            return Err(GraphError::Config("rebuild_timeout_secs must be positive".into()));
        }
        for rule in &self.aliases {
            if rule.permission.is_empty() {
                return Err(GraphError::Config("alias with empty permission".into()));
            }
            if rule.expands_to.iter().any(|t| t.permission == rule.permission) {
                return Err(GraphError::Config(format!(
                    "alias {} expands to itself",
                    rule.permission
                )));
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn rebuild_timeout(&self) -> Option<Duration> {
        self.rebuild_timeout_secs.map(Duration::from_secs)
    }

    pub fn alias_table(&self) -> AliasTable {
        AliasTable::new(&self.aliases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aliases::AliasExpander;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::from_str(r#"database = "db.json""#).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.rebuild_timeout(), None);
        assert_eq!(config.socket, PathBuf::from("permgraph.sock"));
        assert!(config.alias_table().is_empty());
    }

    #[test]
    fn test_aliases_table() {
        let config = Config::from_str(
            r#"
            database = "db.json"
            rebuild_timeout_secs = 5

            [[aliases]]
            permission = "owner"
            expands_to = [
                { permission = "ssh", argument = "owner={arg}" },
                { permission = "sudo" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(config.rebuild_timeout(), Some(Duration::from_secs(5)));
        let table = config.alias_table();
        assert_eq!(
            table.aliases("owner", "x"),
            vec![
                ("ssh".to_string(), "owner=x".to_string()),
                ("sudo".to_string(), "x".to_string())
            ]
        );
    }

    #[test]
    fn test_validation_errors() {
        for text in [
            r#"database = """#,
            "database = \"db\"\nrefresh_interval_secs = 0",
            "database = \"db\"\nrebuild_timeout_secs = 0",
            "database = \"db\"\n[[aliases]]\npermission = \"a\"\nexpands_to = [{ permission = \"a\" }]",
            "database = \"db\"\nbogus = 1",
            "refresh_interval_secs = 5",
        ] {
            assert!(
                matches!(Config::from_str(text), Err(GraphError::Config(_))),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("permgraph.toml");
        fs::write(&path, "database = \"data/dump.json\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.database, dir.path().join("data/dump.json"));
        assert_eq!(config.socket, dir.path().join("permgraph.sock"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }
}
