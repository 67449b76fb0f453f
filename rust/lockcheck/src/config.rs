//! Configuration file parsing for `lockcheck.toml`.
//!
//! Searches the current directory then its ancestors; without a file the
//! defaults below apply.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "lockcheck.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid toml in '{path}': {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Options controlling a check run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckOptions {
    /// Guards whose type is a subtype of one of these are never enforced.
    pub read_write_lock_types: Vec<String>,
    /// Receivers of acquire/release calls must be a subtype of one of these.
    pub lock_types: Vec<String>,
    pub acquire_methods: Vec<String>,
    pub release_methods: Vec<String>,
    /// Worker threads for method analysis; 0 means one per CPU.
    pub jobs: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            read_write_lock_types: vec!["java.util.concurrent.locks.ReadWriteLock".to_string()],
            lock_types: vec!["java.util.concurrent.locks.Lock".to_string()],
            acquire_methods: vec!["lock".to_string(), "lockInterruptibly".to_string()],
            release_methods: vec!["unlock".to_string()],
            jobs: 0,
        }
    }
}

impl CheckOptions {
    /// Load options from the nearest `lockcheck.toml`, or the defaults when
    /// there is none. A file that exists but does not parse is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Path of the nearest `lockcheck.toml` in the current directory or above.
    pub fn find() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a TOML string directly (useful for testing and embedding).
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Worker count with `0` resolved to the number of CPUs.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.jobs
        }
    }

    /// Generate a default `lockcheck.toml` template.
    pub fn default_template() -> &'static str {
        r#"# lockcheck configuration

# Guards of these types (and their subtypes) are not enforced.
read_write_lock_types = ["java.util.concurrent.locks.ReadWriteLock"]

# Explicit lock()/unlock() pairs are only credited on receivers of these types.
lock_types = ["java.util.concurrent.locks.Lock"]
acquire_methods = ["lock", "lockInterruptibly"]
release_methods = ["unlock"]

# Worker threads; 0 = one per CPU.
jobs = 0
"#
    }
}
