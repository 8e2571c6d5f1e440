//! # sqlineage
//!
//! A library for extracting structural lineage from raw SQL text without a
//! parser grammar or a database catalog.
//!
//! # Features
//!
//! - Find the schemas and tables a query reads or writes.
//! - Bind table aliases per scope (the main query and every CTE body).
//! - Map each projected column to the schema, table and alias it comes from.
//! - Collect every qualified column reference, including join keys and filters.
//! - Discover CTEs and the dependencies between them.
//! - Degrade to partial results with per-scope warnings instead of failing.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlineage::{AnalyzerConfig, analyze_sql};
//!
//! fn main() {
//!     env_logger::init();
//!
//!     let sql = r#"
//!         with recent as (
//!             select o.id, o.customer_id from sales.orders o where o.created_at > now() - 7
//!         )
//!         select r.id, c.name
//!         from recent r
//!         join crm.customers c on c.id = r.customer_id
//!     "#;
//!     let config = AnalyzerConfig::default().with_default_schema("sales");
//!     let report = analyze_sql(sql, &config);
//!
//!     for column in report.column_mappings() {
//!         println!("{}.{} ({}) -> {}", column.schema, column.table, column.alias, column.column);
//!     }
//!     for line in report.dependency_lines() {
//!         println!("{}", line);
//!     }
//! }
//! ```
pub mod config;
pub mod cte;
pub mod error;
pub mod graph;
pub mod normalizer;
pub mod output;
mod parser;
pub mod projection;
pub mod report;
pub mod resolver;
pub mod scanner;
pub mod test_utils;

use rayon::prelude::*;

pub use config::AnalyzerConfig;
pub use report::{LineageReport, Scope};

use crate::{
    cte::extract_ctes_from_tokens,
    graph::build_dependency_edges,
    normalizer::normalize,
    projection::{extract_token_column_mappings, referenced_token_columns},
    report::ReportBuilder,
    resolver::resolve_token_tables,
    scanner::tokenize,
};

/// Analyzes one SQL text. Never fails: unusual input yields a partial report
/// whose warnings name the affected scopes.
pub fn analyze_sql(sql: &str, config: &AnalyzerConfig) -> LineageReport {
    let normalized = normalize(sql);
    if normalized.is_empty() {
        return LineageReport::default();
    }
    log::debug!("Analyzing {}", normalized.chars().take(50).collect::<String>());

    let extraction = extract_ctes_from_tokens(&normalized, &tokenize(&normalized));
    let mut builder = ReportBuilder::new(config, &extraction.ctes);
    for warning in extraction.warnings {
        builder.add_warning(&Scope::Main, warning);
    }

    for cte in extraction.ctes.values() {
        analyze_scope(&mut builder, &Scope::Cte(cte.name.clone()), &cte.body, config);
    }
    analyze_scope(&mut builder, &Scope::Main, &extraction.main_query, config);

    let edges = build_dependency_edges(&extraction.ctes);
    builder.finish(edges)
}

/// Analyzes independent SQL texts, across threads when `parallel` is set.
/// Reports are returned in input order.
pub fn analyze_batch(sqls: &[&str], config: &AnalyzerConfig, parallel: bool) -> Vec<LineageReport> {
    if parallel {
        sqls.par_iter().map(|sql| analyze_sql(sql, config)).collect()
    } else {
        sqls.iter().map(|sql| analyze_sql(sql, config)).collect()
    }
}

fn analyze_scope(builder: &mut ReportBuilder, scope: &Scope, sql: &str, config: &AnalyzerConfig) {
    log::debug!("Analyzing scope {}", scope);
    let tokens = tokenize(sql);
    let tables = resolve_token_tables(&tokens, config);
    builder.add_tables(&tables);
    builder.add_referenced_columns(referenced_token_columns(&tokens, &tables));

    match extract_token_column_mappings(sql, &tokens, &tables, config) {
        Ok(mappings) => {
            builder.add_columns(mappings.columns);
            for warning in mappings.warnings {
                builder.add_warning(scope, warning);
            }
        }
        Err(warning) => builder.add_warning(scope, warning),
    }
}
