use std::path::Path;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEMA: &str = "public";

/// Words that can follow a table name without being its alias.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "as",
    "cross",
    "except",
    "fetch",
    "for",
    "from",
    "full",
    "group",
    "having",
    "inner",
    "intersect",
    "join",
    "lateral",
    "left",
    "limit",
    "natural",
    "offset",
    "on",
    "order",
    "outer",
    "pivot",
    "qualify",
    "returning",
    "right",
    "select",
    "set",
    "tablesample",
    "union",
    "unpivot",
    "using",
    "values",
    "where",
    "window",
    "with",
];

/// Settings threaded through every extraction routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Schema assigned to table names written without a schema qualifier.
    pub default_schema: String,
    /// When set, reports only keep references into this schema.
    pub target_schema: Option<String>,
    /// Extra words never taken as a table alias, on top of [`RESERVED_KEYWORDS`].
    pub reserved_keywords: Vec<String>,
    /// Also read table names after `UPDATE` and `INTO`.
    pub scan_dml_targets: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            default_schema: DEFAULT_SCHEMA.to_owned(),
            target_schema: None,
            reserved_keywords: vec![],
            scan_dml_targets: true,
        }
    }
}

impl AnalyzerConfig {
    pub fn with_default_schema(mut self, schema: &str) -> Self {
        self.default_schema = schema.to_owned();
        self
    }

    pub fn with_target_schema(mut self, schema: &str) -> Self {
        self.target_schema = Some(schema.to_owned());
        self
    }

    pub fn is_reserved(&self, word: &str) -> bool {
        let word = word.to_lowercase();
        RESERVED_KEYWORDS.contains(&word.as_str())
            || self
                .reserved_keywords
                .iter()
                .any(|reserved| reserved.eq_ignore_ascii_case(&word))
    }

    pub fn matches_target_schema(&self, schema: &str) -> bool {
        self.target_schema
            .as_ref()
            .is_none_or(|target| target.eq_ignore_ascii_case(schema))
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let config: AnalyzerConfig = toml::from_str(toml_str)
            .map_err(|err| anyhow!("Failed to parse analyzer configuration due to: {}", err))?;
        if config.default_schema.trim().is_empty() {
            return Err(anyhow!("`default_schema` cannot be empty."));
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let toml_str = std::fs::read_to_string(path)
            .map_err(|_| anyhow!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&toml_str)
            .map_err(|err| anyhow!("Invalid config file {}: {}", path.display(), err))
    }
}
