use serde::Serialize;
use strum_macros::IntoStaticStr;

/// Conditions met while analyzing one scope. None of them aborts the analysis:
/// the affected scope degrades to a best-effort result and the warning is kept
/// in the report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error, Serialize, IntoStaticStr)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineageWarning {
    #[error("no projection found in scope")]
    NoProjectionFound,
    #[error("WITH clause is not followed by a main query, analyzing the whole text as the main query")]
    NoWithClauseTerminator,
    #[error("alias `{alias}` of column `{column}` does not match any table in scope")]
    UnresolvedAlias { alias: String, column: String },
}

impl LineageWarning {
    /// Stable snake_case name of the warning kind.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}
