use std::io::Write;

use strum_macros::{Display, EnumString};

use crate::report::LineageReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// The whole report as JSON.
    Json,
    /// Column mappings as CSV rows.
    Csv,
    /// One `schema.table` line per stored table.
    Tables,
    /// Human-readable summary of schemas, tables and CTE dependencies.
    Text,
}

pub const CSV_HEADER: [&str; 4] = ["Schema Name", "Table Name", "Alias Name", "Column Name"];

pub fn write_report<W: Write>(
    report: &LineageReport,
    format: OutputFormat,
    writer: W,
    pretty: bool,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => write_json(report, writer, pretty),
        OutputFormat::Csv => write_column_csv(report, writer),
        OutputFormat::Tables => write_table_list(report, writer),
        OutputFormat::Text => write_text_report(report, writer),
    }
}

pub fn write_json<W: Write>(report: &LineageReport, mut writer: W, pretty: bool) -> anyhow::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut writer, report)?;
    } else {
        serde_json::to_writer(&mut writer, report)?;
    }
    writeln!(writer)?;
    Ok(())
}

pub fn write_column_csv<W: Write>(report: &LineageReport, writer: W) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;
    for column in report.column_mappings() {
        csv_writer.write_record([&column.schema, &column.table, &column.alias, &column.column])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_table_list<W: Write>(report: &LineageReport, mut writer: W) -> anyhow::Result<()> {
    let mut tables: Vec<String> = report.tables_used().iter().map(|t| t.to_string()).collect();
    tables.sort();
    for table in tables {
        writeln!(writer, "{}", table)?;
    }
    Ok(())
}

fn write_section<W: Write>(writer: &mut W, title: &str, entries: &[String]) -> std::io::Result<()> {
    writeln!(writer, "{}", title)?;
    writeln!(writer, "{}", "-".repeat(title.len()))?;
    if entries.is_empty() {
        writeln!(writer, "None")?;
    }
    for entry in entries {
        writeln!(writer, "{}", entry)?;
    }
    Ok(())
}

fn sorted<'a>(entries: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut entries: Vec<String> = entries.cloned().collect();
    entries.sort();
    entries
}

pub fn write_text_report<W: Write>(report: &LineageReport, mut writer: W) -> anyhow::Result<()> {
    let mut tables: Vec<String> = report.tables_used().iter().map(|t| t.to_string()).collect();
    tables.sort();

    write_section(&mut writer, "SCHEMAS USED:", &sorted(report.schemas_used().iter()))?;
    writeln!(writer)?;
    write_section(&mut writer, "TABLES USED:", &tables)?;
    writeln!(writer)?;
    write_section(&mut writer, "CTEs FOUND:", &sorted(report.cte_names().iter()))?;
    writeln!(writer)?;
    write_section(&mut writer, "CTE DEPENDENCIES:", &report.dependency_lines())?;

    if !report.warnings().is_empty() {
        let warnings: Vec<String> = report.warnings().iter().map(|w| w.to_string()).collect();
        writeln!(writer)?;
        write_section(&mut writer, "WARNINGS:", &warnings)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnalyzerConfig, analyze_sql};

    fn render(report: &LineageReport, format: OutputFormat) -> String {
        let mut buf = vec![];
        write_report(report, format, &mut buf, false).expect("writing to a buffer");
        String::from_utf8(buf).expect("utf-8 output")
    }

    #[test]
    fn test_format_names() {
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!(OutputFormat::Tables.to_string(), "tables");
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_column_csv() {
        let report = analyze_sql(
            "select o.id, coalesce(o.a, o.b) as v from sales.orders o",
            &AnalyzerConfig::default(),
        );
        assert_eq!(
            render(&report, OutputFormat::Csv),
            "Schema Name,Table Name,Alias Name,Column Name\n\
             sales,orders,o,id\n\
             sales,orders,o,\"coalesce(o.a, o.b) as v\"\n"
        );
    }

    #[test]
    fn test_table_list_is_sorted() {
        let report = analyze_sql(
            "select * from s.zeta z join s.alpha a on a.id = z.id",
            &AnalyzerConfig::default(),
        );
        assert_eq!(render(&report, OutputFormat::Tables), "s.alpha\ns.zeta\n");
    }

    #[test]
    fn test_text_report() {
        let sql = "with a as (select x from s.t), b as (select x from a) select x from b";
        let report = analyze_sql(sql, &AnalyzerConfig::default());
        assert_eq!(
            render(&report, OutputFormat::Text),
            "SCHEMAS USED:\n-------------\ns\n\n\
             TABLES USED:\n------------\ns.t\n\n\
             CTEs FOUND:\n-----------\na\nb\n\n\
             CTE DEPENDENCIES:\n-----------------\na -> None\nb -> a\n"
        );
    }

    #[test]
    fn test_text_report_empty_sections_and_warnings() {
        let report = analyze_sql("select 1", &AnalyzerConfig::default());
        assert_eq!(
            render(&report, OutputFormat::Text),
            "SCHEMAS USED:\n-------------\nNone\n\n\
             TABLES USED:\n------------\nNone\n\n\
             CTEs FOUND:\n-----------\nNone\n\n\
             CTE DEPENDENCIES:\n-----------------\nNone\n\n\
             WARNINGS:\n---------\nmain query: no projection found in scope\n"
        );
    }

    #[test]
    fn test_json_output() {
        let report = analyze_sql("select t.a from s.t", &AnalyzerConfig::default());
        let json: serde_json::Value =
            serde_json::from_str(&render(&report, OutputFormat::Json)).expect("valid json");
        assert_eq!(json["column_mappings"][0]["table"], "t");
        assert_eq!(json["tables_used"][0]["schema"], "s");
        assert_eq!(json["warnings"].as_array().map(|w| w.len()), Some(0));
    }
}
