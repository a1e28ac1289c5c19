//! Class filtering for -e include=/exclude= expressions
//!
//! Supports:
//! - Package prefixes to instrument: -e include=com.example,org/acme
//! - Package prefixes to leave alone: -e exclude=com.example.generated
//!
//! Names are matched in internal form (`com/example/Foo`); dotted prefixes are
//! normalized. Explicit exclusions always win over inclusions. The default
//! exclusion of the host runtime's packages is lifted only by an include
//! prefix that lies inside the excluded package, so `include=com.sun.tools`
//! instruments `com/sun/tools` while a broad `include=com` does not reach
//! `com/sun`.

use anyhow::{bail, Result};

/// Packages of the host runtime itself. The probes call into `java/lang` and
/// `java/io`, so instrumenting these would make the probes time themselves.
pub const SYSTEM_PREFIXES: &[&str] = &["java/", "javax/", "jdk/", "sun/", "com/sun/"];

/// Class filter that determines which classes to instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter {
    /// Prefixes to include (None = all classes)
    include: Option<Vec<String>>,
    exclude: Vec<String>,
    /// Runtime packages excluded unless a narrower include names them
    defaults: Vec<String>,
}

impl Default for ClassFilter {
    /// Everything except the host runtime's own packages
    fn default() -> Self {
        Self {
            include: None,
            exclude: Vec::new(),
            defaults: SYSTEM_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ClassFilter {
    /// Create a filter that accepts every class
    pub fn all() -> Self {
        Self {
            include: None,
            exclude: Vec::new(),
            defaults: Vec::new(),
        }
    }

    /// Parse a single expression on top of the default filter
    pub fn from_expr(expr: &str) -> Result<Self> {
        Self::default().with_expr(expr)
    }

    /// Parse several expressions on top of the default filter
    pub fn from_exprs<I, S>(exprs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        exprs
            .into_iter()
            .try_fold(Self::default(), |filter, expr| filter.with_expr(expr.as_ref()))
    }

    /// Add an `include=` or `exclude=` expression
    pub fn with_expr(self, expr: &str) -> Result<Self> {
        if let Some(list) = expr.strip_prefix("include=") {
            Ok(self.include(parse_prefixes(expr, list)?))
        } else if let Some(list) = expr.strip_prefix("exclude=") {
            Ok(self.exclude(parse_prefixes(expr, list)?))
        } else {
            bail!(
                "Invalid filter expression: {}. Expected format: include=PREFIXES or exclude=PREFIXES",
                expr
            );
        }
    }

    pub fn include<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added: Vec<String> = prefixes.into_iter().map(|p| normalize(p.as_ref())).collect();
        for prefix in &added {
            if let Some(default) = self.default_covering(prefix) {
                tracing::warn!(
                    include = %prefix,
                    excluded_by_default = %default,
                    "instrumenting part of a runtime package; probes may time their own calls"
                );
            }
        }
        self.include.get_or_insert_with(Vec::new).extend(added);
        self
    }

    pub fn exclude<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude
            .extend(prefixes.into_iter().map(|p| normalize(p.as_ref())));
        self
    }

    /// Check if a class should be instrumented; accepts dotted or internal names
    pub fn should_instrument(&self, class_name: &str) -> bool {
        let name = normalize(class_name);
        if self.exclude.iter().any(|p| name.starts_with(p.as_str())) {
            return false;
        }
        let matching: Vec<&String> = match &self.include {
            None => Vec::new(),
            Some(prefixes) => prefixes
                .iter()
                .filter(|p| name.starts_with(p.as_str()))
                .collect(),
        };
        if self.include.is_some() && matching.is_empty() {
            return false;
        }
        match self.default_covering(&name) {
            None => true,
            Some(default) => matching.iter().any(|p| p.starts_with(default)),
        }
    }

    /// The default-excluded package containing `name`, if any
    fn default_covering(&self, name: &str) -> Option<&str> {
        self.defaults
            .iter()
            .map(String::as_str)
            .find(|d| name.starts_with(*d))
    }
}

fn parse_prefixes(expr: &str, list: &str) -> Result<Vec<String>> {
    let prefixes: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if prefixes.is_empty() {
        bail!("Filter expression {} names no class prefixes", expr);
    }
    Ok(prefixes)
}

fn normalize(name: &str) -> String {
    name.replace('.', "/")
}
