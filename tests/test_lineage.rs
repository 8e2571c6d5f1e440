use sqlineage::{
    AnalyzerConfig, LineageReport, analyze_batch, analyze_sql,
    projection::ColumnReference,
    test_utils::{LINEAGE_TESTS_FILE, TestLineage, TestLineageData},
};

fn load_tests() -> Vec<TestLineage> {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    let test_lineage_data: TestLineageData =
        toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml");
    test_lineage_data.tests
}

fn sorted(mut entries: Vec<String>) -> Vec<String> {
    entries.sort();
    entries
}

fn rows(columns: &[ColumnReference]) -> Vec<[String; 4]> {
    columns
        .iter()
        .map(|c| {
            [
                c.schema.clone(),
                c.table.clone(),
                c.alias.clone(),
                c.column.clone(),
            ]
        })
        .collect()
}

fn check_report(test: &TestLineage, report: &LineageReport) {
    assert_eq!(rows(report.column_mappings()), test.column_mappings);
    if let Some(referenced_columns) = &test.referenced_columns {
        assert_eq!(&rows(report.referenced_columns()), referenced_columns);
    }

    let tables_used = report.tables_used().iter().map(|t| t.to_string()).collect();
    assert_eq!(sorted(tables_used), sorted(test.tables_used.clone()));

    let schemas_used = report.schemas_used().iter().cloned().collect();
    assert_eq!(sorted(schemas_used), sorted(test.schemas_used.clone()));

    let cte_names: Vec<String> = report.cte_names().iter().cloned().collect();
    assert_eq!(cte_names, test.cte_names);
    assert_eq!(report.dependency_lines(), test.cte_dependencies);

    let warnings: Vec<&str> = report.warnings().iter().map(|w| w.warning.kind()).collect();
    assert_eq!(warnings, test.warnings);
}

#[test]
fn test_lineage() {
    for test in load_tests() {
        println!("Testing lineage for SQL: {}", &test.sql);
        let report = analyze_sql(&test.sql, &test.config());
        check_report(&test, &report);
    }
}

#[test]
fn test_lineage_is_deterministic() {
    for test in load_tests() {
        let config = test.config();
        assert_eq!(analyze_sql(&test.sql, &config), analyze_sql(&test.sql, &config));
    }
}

#[test]
fn test_batch_matches_single_analysis() {
    let tests = load_tests();
    let config = AnalyzerConfig::default();
    let sqls: Vec<&str> = tests.iter().map(|t| t.sql.as_str()).collect();

    let sequential = analyze_batch(&sqls, &config, false);
    let parallel = analyze_batch(&sqls, &config, true);
    assert_eq!(sequential, parallel);
    for (sql, report) in sqls.iter().zip(&sequential) {
        assert_eq!(report, &analyze_sql(sql, &config));
    }
}

#[test]
fn test_empty_input_has_empty_report() {
    let report = analyze_sql("  \n\t ", &AnalyzerConfig::default());
    assert!(report.is_empty());
    assert!(report.dependency_lines().is_empty());
}

#[test]
fn test_scope_warnings_name_their_scope() {
    let report = analyze_sql(
        "with a as (select 1), b as (select q.x from s.t) select * from b",
        &AnalyzerConfig::default(),
    );
    let warnings: Vec<String> = report.warnings().iter().map(|w| w.to_string()).collect();
    assert_eq!(
        warnings,
        vec![
            "CTE `a`: no projection found in scope".to_owned(),
            format!(
                "CTE `b`: {}",
                sqlineage::error::LineageWarning::UnresolvedAlias {
                    alias: "q".to_owned(),
                    column: "x".to_owned(),
                }
            ),
        ]
    );
}

#[test]
fn test_cte_graph_of_report() {
    let report = analyze_sql(
        "with c as (select * from b), b as (select * from a), a as (select * from s.t) select * from c",
        &AnalyzerConfig::default(),
    );
    let graph = report.cte_graph();
    assert_eq!(graph.dependencies_of("c"), ["b".to_owned()]);
    assert_eq!(graph.dependents_of("a"), vec!["b"]);
    assert!(graph.cycles().is_empty());
    assert_eq!(
        graph.topological_order().expect("acyclic"),
        vec!["a", "b", "c"]
    );
    assert_eq!(
        report.tables_used().iter().map(|t| t.to_string()).collect::<Vec<_>>(),
        vec!["s.t"]
    );
}
