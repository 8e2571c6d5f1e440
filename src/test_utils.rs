use std::fmt::Display;

use serde::Deserialize;

use crate::config::AnalyzerConfig;

pub const LINEAGE_TESTS_FILE: &str = "tests/lineage_tests.toml";

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineage {
    pub sql: String,
    pub default_schema: Option<String>,
    pub target_schema: Option<String>,
    /// `[schema, table, alias, column]` rows in report order.
    #[serde(default)]
    pub column_mappings: Vec<[String; 4]>,
    /// `[schema, table, alias, column]` rows of qualified column references,
    /// checked only when given.
    pub referenced_columns: Option<Vec<[String; 4]>>,
    #[serde(default)]
    pub tables_used: Vec<String>,
    #[serde(default)]
    pub schemas_used: Vec<String>,
    #[serde(default)]
    pub cte_names: Vec<String>,
    #[serde(default)]
    pub cte_dependencies: Vec<String>,
    /// Warning kinds, e.g. `no_projection_found`.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl TestLineage {
    pub fn config(&self) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::default();
        if let Some(default_schema) = &self.default_schema {
            config = config.with_default_schema(default_schema);
        }
        if let Some(target_schema) = &self.target_schema {
            config = config.with_target_schema(target_schema);
        }
        config
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestLineageData {
    pub tests: Vec<TestLineage>,
}

impl Display for TestLineageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
