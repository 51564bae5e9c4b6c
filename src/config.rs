//! Clone options and how they are loaded.
//!
//! Options come from an optional file (any format the `config` crate
//! understands, chosen by extension) overridden by `DEEPGRAPH_*` environment
//! variables, e.g. `DEEPGRAPH_MAX_DEPTH=64`.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const ENV_PREFIX: &str = "DEEPGRAPH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneOptions {
    /// Round trip through serde when a type has neither a no-arg nor a copy
    /// constructor.
    pub serialization_fallback: bool,
    /// Share the original when every way of instantiating a copy failed.
    pub return_original: bool,
    /// Maximum nesting of objects being copied, unbounded when `None`.
    pub max_depth: Option<usize>,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            serialization_fallback: true,
            return_original: false,
            max_depth: None,
        }
    }
}

impl CloneOptions {
    /// No fallbacks: a type that cannot be constructed is an error.
    pub fn strict() -> Self {
        Self {
            serialization_fallback: false,
            return_original: false,
            max_depth: None,
        }
    }
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn from_env() -> Result<Self> {
        let settings = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_enable_serialization_only() {
        let options = CloneOptions::default();
        assert!(options.serialization_fallback);
        assert!(!options.return_original);
        assert_eq!(options.max_depth, None);
    }

    #[test]
    fn file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("deepgraph-options-{}.toml", std::process::id()));
        fs::write(&path, "return_original = true\nmax_depth = 12\n").unwrap();
        let options = CloneOptions::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(options.serialization_fallback);
        assert!(options.return_original);
        assert_eq!(options.max_depth, Some(12));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("deepgraph-options-that-do-not-exist.toml");
        let options = CloneOptions::load(&path).unwrap();
        assert_eq!(options, CloneOptions::default());
    }
}
