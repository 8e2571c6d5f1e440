use std::fmt::Display;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::{
    config::AnalyzerConfig,
    cte::CteDefinition,
    error::LineageWarning,
    graph::{CteGraph, DependencyEdge},
    projection::ColumnReference,
    resolver::{ScopeTables, TableReference},
};

/// Self-contained `SELECT` body in which aliases are bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Scope {
    Main,
    Cte(String),
}

impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Main => write!(f, "main query"),
            Scope::Cte(name) => write!(f, "CTE `{}`", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeWarning {
    pub scope: Scope,
    pub warning: LineageWarning,
}

impl Display for ScopeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.scope, self.warning)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QualifiedTable {
    pub schema: String,
    pub table: String,
}

impl Display for QualifiedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Lineage extracted from one SQL text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineageReport {
    column_mappings: Vec<ColumnReference>,
    referenced_columns: Vec<ColumnReference>,
    table_references: Vec<TableReference>,
    schemas_used: IndexSet<String>,
    tables_used: IndexSet<QualifiedTable>,
    cte_names: IndexSet<String>,
    cte_dependencies: Vec<DependencyEdge>,
    warnings: Vec<ScopeWarning>,
}

impl LineageReport {
    /// Distinct `(schema, table, alias, column)` tuples in first-seen order,
    /// CTE scopes first, then the main query.
    pub fn column_mappings(&self) -> &[ColumnReference] {
        &self.column_mappings
    }

    /// Distinct `alias.column` references of every scope, wherever they appear
    /// (projection, join conditions, filters, grouping). The column is the bare
    /// column name.
    pub fn referenced_columns(&self) -> &[ColumnReference] {
        &self.referenced_columns
    }

    /// Distinct table references of every scope, CTE references included.
    pub fn table_references(&self) -> &[TableReference] {
        &self.table_references
    }

    pub fn schemas_used(&self) -> &IndexSet<String> {
        &self.schemas_used
    }

    /// Stored tables read or written by the query. Names of the query's own
    /// CTEs are not tables.
    pub fn tables_used(&self) -> &IndexSet<QualifiedTable> {
        &self.tables_used
    }

    pub fn cte_names(&self) -> &IndexSet<String> {
        &self.cte_names
    }

    pub fn cte_dependencies(&self) -> &[DependencyEdge] {
        &self.cte_dependencies
    }

    pub fn warnings(&self) -> &[ScopeWarning] {
        &self.warnings
    }

    pub fn cte_graph(&self) -> CteGraph {
        CteGraph::new(&self.cte_names, &self.cte_dependencies)
    }

    /// One `"<cte> -> dep1, dep2"` line per CTE in definition order, with
    /// `None` for CTEs without dependencies.
    pub fn dependency_lines(&self) -> Vec<String> {
        let graph = self.cte_graph();
        self.cte_names
            .iter()
            .map(|name| graph.dependency_line(name))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.column_mappings.is_empty()
            && self.referenced_columns.is_empty()
            && self.table_references.is_empty()
            && self.cte_names.is_empty()
            && self.warnings.is_empty()
    }
}

/// Accumulates per-scope results into a [`LineageReport`].
pub(crate) struct ReportBuilder<'a> {
    config: &'a AnalyzerConfig,
    cte_names: Vec<String>,
    column_mappings: IndexSet<ColumnReference>,
    referenced_columns: IndexSet<ColumnReference>,
    table_references: IndexSet<TableReference>,
    tables_used: IndexSet<QualifiedTable>,
    warnings: Vec<ScopeWarning>,
}

impl<'a> ReportBuilder<'a> {
    pub(crate) fn new(config: &'a AnalyzerConfig, ctes: &IndexMap<String, CteDefinition>) -> Self {
        Self {
            config,
            cte_names: ctes.keys().cloned().collect(),
            column_mappings: IndexSet::new(),
            referenced_columns: IndexSet::new(),
            table_references: IndexSet::new(),
            tables_used: IndexSet::new(),
            warnings: vec![],
        }
    }

    pub(crate) fn add_tables(&mut self, tables: &ScopeTables) {
        for reference in tables.references() {
            if self.config.matches_target_schema(&reference.schema) {
                self.table_references.insert(reference.clone());
            }
        }
        for reference in tables.physical_tables(&self.cte_names) {
            if self.config.matches_target_schema(&reference.schema) {
                self.tables_used.insert(QualifiedTable {
                    schema: reference.schema.clone(),
                    table: reference.table.clone(),
                });
            }
        }
    }

    pub(crate) fn add_columns(&mut self, columns: Vec<ColumnReference>) {
        let config = self.config;
        self.column_mappings.extend(
            columns
                .into_iter()
                .filter(|column| config.matches_target_schema(&column.schema)),
        );
    }

    pub(crate) fn add_referenced_columns(&mut self, columns: Vec<ColumnReference>) {
        let config = self.config;
        self.referenced_columns.extend(
            columns
                .into_iter()
                .filter(|column| config.matches_target_schema(&column.schema)),
        );
    }

    pub(crate) fn add_warning(&mut self, scope: &Scope, warning: LineageWarning) {
        log::warn!("{}: {}", scope, warning);
        self.warnings.push(ScopeWarning {
            scope: scope.clone(),
            warning,
        });
    }

    pub(crate) fn finish(self, cte_dependencies: Vec<DependencyEdge>) -> LineageReport {
        let schemas_used = self
            .tables_used
            .iter()
            .map(|table| table.schema.clone())
            .collect();
        LineageReport {
            column_mappings: self.column_mappings.into_iter().collect(),
            referenced_columns: self.referenced_columns.into_iter().collect(),
            table_references: self.table_references.into_iter().collect(),
            schemas_used,
            tables_used: self.tables_used,
            cte_names: self.cte_names.into_iter().collect(),
            cte_dependencies,
            warnings: self.warnings,
        }
    }
}
