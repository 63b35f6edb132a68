use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Declarative description of a worker, normally loaded from a `worker.toml`
/// sitting next to the crate's `Cargo.toml`.
///
/// The manifest names the worker and declares the bindings the runtime should
/// provision before the first request arrives: plain-text vars, key-value
/// namespaces, SQL databases, and cron triggers.
#[derive(Clone, Debug, Deserialize)]
pub struct WorkerManifest {
    /// Worker name, used in logs and as the default identity of the process.
    pub name: String,
    /// Plain-text configuration values exposed through the env.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Key-value namespaces to provision.
    #[serde(default)]
    pub kv_namespaces: Vec<KvNamespace>,
    /// SQL databases to open (in-memory unless a path is given).
    #[serde(default)]
    pub sql_databases: Vec<SqlDatabaseConfig>,
    /// Time-based triggers.
    #[serde(default)]
    pub triggers: Triggers,
}

/// A named key-value namespace declaration.
#[derive(Clone, Debug, Deserialize)]
pub struct KvNamespace {
    /// Env binding name the namespace is reachable under.
    pub binding: String,
}

/// A named SQL database declaration.
#[derive(Clone, Debug, Deserialize)]
pub struct SqlDatabaseConfig {
    /// Env binding name the database is reachable under.
    pub binding: String,
    /// On-disk database file. When absent the database lives in memory and
    /// resets with the process.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Trigger declarations.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Triggers {
    /// Cron expressions (five fields, UTC) the scheduled handler fires on.
    #[serde(default)]
    pub crons: Vec<String>,
}

impl WorkerManifest {
    /// Parses a manifest from TOML text.
    pub fn from_str(text: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(text)?;
        if manifest.name.trim().is_empty() {
            return Err(ManifestError::EmptyName);
        }
        Ok(manifest)
    }

    /// Reads and parses a manifest file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&text)
    }
}

/// Errors that can occur while loading a [`WorkerManifest`].
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("manifest `name` must not be empty")]
    EmptyName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let manifest = WorkerManifest::from_str(
            r#"
            name = "kv-worker"

            [vars]
            GREETING = "hello"

            [[kv_namespaces]]
            binding = "CACHE"

            [[sql_databases]]
            binding = "DB"
            path = "state/app.sqlite3"

            [triggers]
            crons = ["*/5 * * * *"]
            "#,
        )
        .expect("manifest");

        assert_eq!(manifest.name, "kv-worker");
        assert_eq!(manifest.vars.get("GREETING").map(String::as_str), Some("hello"));
        assert_eq!(manifest.kv_namespaces.len(), 1);
        assert_eq!(manifest.kv_namespaces[0].binding, "CACHE");
        assert_eq!(manifest.sql_databases.len(), 1);
        assert_eq!(
            manifest.sql_databases[0].path.as_deref(),
            Some(Path::new("state/app.sqlite3"))
        );
        assert_eq!(manifest.triggers.crons, vec!["*/5 * * * *"]);
    }

    #[test]
    fn sections_default_to_empty() {
        let manifest = WorkerManifest::from_str(r#"name = "bare""#).expect("manifest");

        assert!(manifest.vars.is_empty());
        assert!(manifest.kv_namespaces.is_empty());
        assert!(manifest.sql_databases.is_empty());
        assert!(manifest.triggers.crons.is_empty());
    }

    #[test]
    fn rejects_blank_name() {
        let err = WorkerManifest::from_str(r#"name = "  ""#).unwrap_err();
        assert!(matches!(err, ManifestError::EmptyName));
    }

    #[test]
    fn rejects_unparseable_toml() {
        let err = WorkerManifest::from_str("name = ").unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }

    #[test]
    fn reads_manifest_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("worker.toml");
        std::fs::write(&path, "name = \"disk-worker\"\n").expect("write");

        let manifest = WorkerManifest::from_path(&path).expect("manifest");
        assert_eq!(manifest.name, "disk-worker");

        let missing = WorkerManifest::from_path(dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ManifestError::Read { .. })));
    }
}
