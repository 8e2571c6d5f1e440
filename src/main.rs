use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::anyhow;
use clap::Parser as ClapParser;
use clap::Subcommand;
use indexmap::IndexMap;
use serde::Serialize;
use sqlineage::output::{OutputFormat, write_report};
use sqlineage::{AnalyzerConfig, LineageReport, analyze_batch};

#[derive(clap::Parser)]
#[command(name = "sqlineage")]
#[command(about = "Catalog-free SQL lineage extractor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract lineage from one or more SQL files.
    Analyze(AnalyzeCommand),
}

#[derive(clap::Args)]
struct AnalyzeCommand {
    /// Path to the SQL file or directory containing SQL files.
    #[arg(value_name = "SQL_[FILE|DIR]")]
    sql: PathBuf,
    /// Path to a TOML analyzer configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Schema assumed for unqualified table names.
    #[arg(long)]
    default_schema: Option<String>,
    /// Keep only tables and columns of this schema.
    #[arg(long)]
    target_schema: Option<String>,
    /// Output format: json, csv, tables or text.
    #[arg(short, long, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,
    /// Analyze the files of a directory in parallel.
    #[arg(long)]
    parallel: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutReport {
    Ok(LineageReport),
    Err { error: String },
}

fn load_config(command: &AnalyzeCommand) -> anyhow::Result<AnalyzerConfig> {
    let mut config = match &command.config {
        Some(path) => AnalyzerConfig::from_file(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(default_schema) = &command.default_schema {
        if default_schema.trim().is_empty() {
            return Err(anyhow!("--default-schema cannot be empty."));
        }
        config = config.with_default_schema(default_schema);
    }
    if let Some(target_schema) = &command.target_schema {
        config = config.with_target_schema(target_schema);
    }
    Ok(config)
}

fn sql_files_in_dir(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut sql_in_dir: Vec<_> = std::fs::read_dir(dir)
        .map_err(|_| anyhow!("Failed to read directory {}", dir.display()))?
        .filter_map(|res| res.ok())
        .map(|entry| entry.path())
        .filter(|file| file.is_file() && file.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    sql_in_dir.sort();
    Ok(sql_in_dir)
}

fn read_sql(sql_file_path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(sql_file_path)
        .map_err(|_| anyhow!("Failed to read sql file {}", sql_file_path.display()))
}

fn analyze_dir(command: &AnalyzeCommand, config: &AnalyzerConfig) -> anyhow::Result<()> {
    let sql_files = sql_files_in_dir(&command.sql)?;
    let mut sqls = Vec::with_capacity(sql_files.len());
    let mut read_errors = IndexMap::new();
    for sql_file in &sql_files {
        match read_sql(sql_file) {
            Ok(sql) => sqls.push(sql),
            Err(err) => {
                log::warn!("{}", err);
                read_errors.insert(sql_file.clone(), err.to_string());
                sqls.push(String::new());
            }
        }
    }

    let sql_refs: Vec<&str> = sqls.iter().map(String::as_str).collect();
    let reports = analyze_batch(&sql_refs, config, command.parallel);

    let mut file_reports: IndexMap<String, OutReport> = IndexMap::new();
    for (sql_file, report) in sql_files.iter().zip(reports) {
        let out_report = match read_errors.shift_remove(sql_file) {
            Some(error) => OutReport::Err { error },
            None => OutReport::Ok(report),
        };
        file_reports.insert(
            std::path::absolute(sql_file)?.display().to_string(),
            out_report,
        );
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match command.format {
        OutputFormat::Json => {
            if command.pretty {
                serde_json::to_writer_pretty(&mut out, &file_reports)?;
            } else {
                serde_json::to_writer(&mut out, &file_reports)?;
            }
            writeln!(out)?;
        }
        format => {
            for (path, out_report) in &file_reports {
                writeln!(out, "== {}", path)?;
                match out_report {
                    OutReport::Ok(report) => write_report(report, format, &mut out, command.pretty)?,
                    OutReport::Err { error } => writeln!(out, "error: {}", error)?,
                }
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Analyze(command) => {
            let config = load_config(command)?;
            if command.sql.is_dir() {
                analyze_dir(command, &config)?;
            } else {
                let sql = read_sql(&command.sql)?;
                let report = sqlineage::analyze_sql(&sql, &config);
                write_report(&report, command.format, std::io::stdout().lock(), command.pretty)?;
            }
        }
    }

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}
