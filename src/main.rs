// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use apptrack_import::{
    db, diagnose_file, spawn_import, DiagnosticReport, ImportConfig, ImportMessage, ImportSummary,
    ReferenceKind,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "apptrack-import")]
#[command(author, version, about = "Bulk CSV import for the application / integration tracker")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite store
    #[arg(long, global = true, env = "APPTRACK_DB", default_value = "apptrack.db")]
    db: PathBuf,

    /// JSON file with import settings (retry policy, progress interval, ...)
    #[arg(long, global = true, env = "APPTRACK_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV file into the store
    Import {
        csv: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Plain progress lines instead of the terminal view
        #[arg(long)]
        plain: bool,
    },

    /// Dry run: report what an import would do without writing
    Diagnose {
        csv: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Table counts and category sets per application
    Summary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The terminal view owns the screen, so keep the log quiet under it
    let default_filter = match &cli.command {
        Commands::Import { plain: false, json: false, .. } if cfg!(feature = "tui") => "error",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = match &cli.config {
        Some(path) => ImportConfig::load(path)?,
        None => ImportConfig::default(),
    };

    match cli.command {
        Commands::Import { csv, json, plain } => run_import(&cli.db, csv, config, json, plain),
        Commands::Diagnose { csv, json } => run_diagnose(&cli.db, &csv, &config, json),
        Commands::Summary => run_summary(&cli.db),
    }
}

fn run_import(db_path: &Path, csv: PathBuf, config: ImportConfig, json: bool, plain: bool) -> Result<()> {
    let source = csv.display().to_string();
    let handle = spawn_import(db_path.to_path_buf(), csv, config).context("Failed to start import worker")?;

    let outcome = if plain || json {
        wait_plain(handle, json)
    } else {
        wait_with_ui(handle, &source)?
    };

    let summary = outcome?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn wait_plain(
    handle: apptrack_import::ImportHandle,
    quiet: bool,
) -> Result<ImportSummary, apptrack_import::ImportError> {
    loop {
        match handle.recv() {
            Some(ImportMessage::Progress { processed, total }) => {
                if !quiet {
                    eprintln!("  {}/{} rows", processed, total);
                }
            }
            Some(ImportMessage::Finished(result)) => return result,
            None => return handle.wait(),
        }
    }
}

#[cfg(feature = "tui")]
fn wait_with_ui(
    handle: apptrack_import::ImportHandle,
    source: &str,
) -> Result<Result<ImportSummary, apptrack_import::ImportError>> {
    ui::run_ui(handle, source)
}

#[cfg(not(feature = "tui"))]
fn wait_with_ui(
    handle: apptrack_import::ImportHandle,
    _source: &str,
) -> Result<Result<ImportSummary, apptrack_import::ImportError>> {
    Ok(wait_plain(handle, false))
}

fn print_summary(summary: &ImportSummary) {
    println!("📥 Imported {} ({} delimited)", summary.source, summary.delimiter);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Rows:          {} total, {} imported, {} skipped, {} failed",
        summary.rows_total, summary.rows_imported, summary.rows_skipped, summary.rows_failed);
    println!("  Applications:  {} created, {} updated",
        summary.applications_created, summary.applications_updated);
    println!("  Integrations:  {} created, {} updated",
        summary.integrations_created, summary.integrations_updated);
    println!("  Business units created: {}", summary.business_units_created);
    println!("  Categories created:     {}", summary.categories_created);
    println!("  {}", summary.reconciliation.summary());

    if !summary.warnings.is_empty() {
        println!("\n⚠️  {} warning(s):", summary.warnings.len());
        for warning in &summary.warnings {
            println!("  - {}", warning);
        }
    }
}

fn run_diagnose(db_path: &Path, csv: &Path, config: &ImportConfig, json: bool) -> Result<()> {
    // Never create the store just to look at it
    let store = if db_path.exists() {
        Some(db::open_readonly(db_path)?)
    } else {
        None
    };

    let report = diagnose_file(store.as_ref(), csv, config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_diagnostic(&report);
    }
    Ok(())
}

fn print_diagnostic(report: &DiagnosticReport) {
    println!("🩺 Dry run ({} delimited, {} rows)", report.delimiter, report.rows_analyzed);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Header mapping:");
    for mapping in &report.header_mapping {
        match &mapping.field {
            Some(field) => println!("  {:<30} → {}", mapping.header, field),
            None => println!("  {:<30} (ignored)", mapping.header),
        }
    }
    println!("\nApplications to create: {}", report.applications_to_create);
    println!("Applications to update: {}", report.applications_to_update);
    println!("Integrations to create: {}", report.integrations_to_create);
    println!("Rows skipped:           {}", report.rows_skipped);

    if report.warnings_total > 0 {
        println!("\n⚠️  {} warning(s):", report.warnings_total);
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
        if report.warnings_total > report.warnings.len() {
            println!("  ... {} more", report.warnings_total - report.warnings.len());
        }
    }
}

fn run_summary(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        eprintln!("❌ Database not found: {}", db_path.display());
        eprintln!("   Run: apptrack-import import <CSV>");
        std::process::exit(1);
    }

    let conn = db::open_readonly(db_path)?;
    if !db::table_exists(&conn, "applications")? {
        println!("Store is empty");
        return Ok(());
    }

    let counts = db::get_table_counts(&conn)?;
    println!("🗄️  {}", db_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  applications:               {}", counts.applications);
    println!("  business_units:             {}", counts.business_units);
    println!("  categories:                 {}", counts.categories);
    println!("  integrations:               {}", counts.integrations);
    println!("  application_business_units: {}", counts.application_business_units);
    println!("  application_categories:     {}", counts.application_categories);
    println!("  integration_categories:     {}", counts.integration_categories);

    println!();
    for app in db::list_applications(&conn)? {
        let categories = db::application_reference_names(&conn, ReferenceKind::Category, app.id)?;
        println!("  {:<30} risk {:>3}  [{}]", app.name, app.risk_score, categories.join(", "));
    }
    Ok(())
}
