use anyhow::{anyhow, bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use disposition_core::config::Config;
use disposition_core::db::{
    count_financial_records, import_financials, load_financials_csv, load_project,
    save_project_financials, setup_database, verify_memberships,
};
use disposition_core::financials::{FinancialAggregator, Recompute};
use disposition_core::forms::{FormContext, FormKind, PropertyType};
use disposition_core::wizard::{ValidationScope, WizardStep};
use disposition_core::workflow::ProjectWorkflow;
use disposition_core::logging;

const USAGE: &str = "\
Usage:
  disposition import <csv> [db]
  disposition recompute <project-id> [db]
  disposition validate <land|subdivision|building|project> <step|full> <json-file>
  disposition check [db]";

fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = env::args().collect();
    let config = Config::load()?;

    match args.get(1).map(String::as_str) {
        Some("import") => run_import(&config, &args[2..])?,
        Some("recompute") => run_recompute(&config, &args[2..])?,
        Some("validate") => run_validate(&config, &args[2..])?,
        Some("check") => run_check(&config, &args[2..])?,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn db_path(config: &Config, arg: Option<&String>) -> PathBuf {
    arg.map(PathBuf::from)
        .unwrap_or_else(|| config.database_path.clone())
}

fn open_store(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {:?}", path))?;
    setup_database(&conn).context("Failed to set up database")?;
    Ok(conn)
}

fn run_import(config: &Config, args: &[String]) -> Result<()> {
    let csv_path = args
        .first()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("import needs a CSV path\n{}", USAGE))?;
    let db = db_path(config, args.get(1));

    println!("📂 Loading CSV...");
    let rows = load_financials_csv(&csv_path)?;
    println!("✓ Loaded {} financial records", rows.len());

    let conn = open_store(&db)?;
    let inserted = import_financials(&conn, &rows)?;
    let total = count_financial_records(&conn)?;

    println!("✓ Inserted: {}", inserted);
    println!("✓ Duplicates skipped: {}", rows.len() - inserted);
    println!("✓ Database contains {} financial records", total);
    info!(db = ?db, inserted, "Import complete");

    Ok(())
}

fn run_recompute(config: &Config, args: &[String]) -> Result<()> {
    let project_id: i64 = args
        .first()
        .ok_or_else(|| anyhow!("recompute needs a project id\n{}", USAGE))?
        .parse()
        .context("Project id must be an integer")?;
    let conn = open_store(&db_path(config, args.get(1)))?;

    let mut project = load_project(&conn, project_id)?;
    let workflow = ProjectWorkflow::new(FinancialAggregator::new(config.aggregator.clone()));

    match workflow.recompute(&mut project) {
        Recompute::Frozen => {
            println!(
                "🔒 Project {} is {}, totals unchanged",
                project.project_number,
                project.status()
            );
        }
        Recompute::Updated(rollup) => {
            save_project_financials(&conn, &project)?;
            println!("💰 {} ({})", project.project_number, project.name);
            println!("   Fiscal year:  {}", project.fiscal_year());
            println!("   Estimated:    {}", rollup.estimated);
            println!("   Net book:     {}", rollup.net_book);
            println!("   Assessed:     {}", rollup.assessed);
            if let Some(date) = project.financial_date() {
                println!("   As of:        {}", date.format("%Y-%m-%d"));
            }
        }
    }

    Ok(())
}

fn run_validate(config: &Config, args: &[String]) -> Result<()> {
    let (form_arg, scope_arg, file) = match args {
        [form, scope, file, ..] => (form, scope, file),
        _ => bail!("validate needs a form, a scope and a JSON file\n{}", USAGE),
    };

    let form: FormKind = form_arg.parse().map_err(|e: String| anyhow!(e))?;
    let mut ctx = FormContext::from_config(&config.validation);
    if let Ok(property_type) = form_arg.parse::<PropertyType>() {
        ctx = ctx.with_property_type(property_type);
    }

    let graph = form.wizard(&ctx)?;
    let scope = if scope_arg.eq_ignore_ascii_case("full") {
        ValidationScope::Full
    } else {
        let step: WizardStep = scope_arg.parse().map_err(|e: String| anyhow!(e))?;
        if !graph.has_step(step) {
            let steps: Vec<String> = graph.steps().iter().map(|s| s.to_string()).collect();
            bail!("{} has no {} step (steps: {})", graph.name(), step, steps.join(", "));
        }
        ValidationScope::Step(step)
    };

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read form file: {:?}", file))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).context("Failed to parse form JSON")?;

    let report = graph.validate(&value, &scope);

    print!("{}", report);
    if !report.is_valid() {
        std::process::exit(1);
    }

    Ok(())
}

fn run_check(config: &Config, args: &[String]) -> Result<()> {
    let conn = open_store(&db_path(config, args.first()))?;

    match verify_memberships(&conn) {
        Ok(checked) => {
            println!("✅ {} project memberships verified", checked);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Integrity check failed");
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
