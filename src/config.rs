//! TOML configuration file
//!
//! Every key is optional; command-line flags take precedence over file
//! values.
//!
//! # Example TOML
//! ```toml
//! include = ["com.example"]
//! exclude = ["com.example.generated"]
//! stream = "err"
//! jobs = 4
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::filter::ClassFilter;
use crate::probe::ProbeStream;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Package prefixes to instrument
    #[serde(default)]
    pub include: Vec<String>,
    /// Package prefixes to leave alone
    #[serde(default)]
    pub exclude: Vec<String>,
    pub stream: Option<ProbeStream>,
    /// Worker threads for directory mode
    pub jobs: Option<usize>,
}

impl FileConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FileConfig =
            toml::from_str(content).context("Failed to parse TOML configuration")?;
        if config.jobs == Some(0) {
            anyhow::bail!("jobs must be at least 1");
        }
        Ok(config)
    }

    /// Build the class filter from the file's prefixes followed by `exprs`
    pub fn filter<S: AsRef<str>>(&self, exprs: &[S]) -> Result<ClassFilter> {
        let mut filter = ClassFilter::default();
        if !self.include.is_empty() {
            filter = filter.include(&self.include);
        }
        if !self.exclude.is_empty() {
            filter = filter.exclude(&self.exclude);
        }
        exprs
            .iter()
            .try_fold(filter, |filter, expr| filter.with_expr(expr.as_ref()))
    }
}
