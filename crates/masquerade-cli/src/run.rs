use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tracing::{error, info};

use masquerade_anonymize::engine::DEFAULT_PAGE_SIZE;
use masquerade_anonymize::{Anonymizer, ExecutionReport, Mode, ProgressFn, RunOptions};
use masquerade_core::{Config, RedactedConnection};
use masquerade_introspect::connect;

use crate::connection::ConnectionArgs;
use crate::error::{CliError, CliResult};
use crate::output::write_json;

/// Rows between two progress events.
const PROGRESS_EVERY: u64 = 1_000;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Anonymization configuration (YAML).
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: PathBuf,
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Only process these entities (repeatable).
    #[arg(long = "table", value_name = "ENTITY")]
    pub tables: Vec<String>,
    /// Build every statement but do not write to the database.
    #[arg(long, default_value_t = false)]
    pub pretend: bool,
    /// Print the statements of each entity to stdout.
    #[arg(long, default_value_t = false)]
    pub sql: bool,
    /// queries (one statement per row) or batch (bulk load per table).
    #[arg(long, default_value = "queries")]
    pub mode: Mode,
    /// Row cap applied to every entity, overriding the configuration.
    #[arg(long)]
    pub limit: Option<u64>,
    /// Seed overriding the configuration's.
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u64,
    /// Directory for batch staging files.
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,
    /// Log a failed entity and carry on with the next one.
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,
    /// Write a JSON summary of the run.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// JSON summary written by `--report`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub connection: RedactedConnection,
    pub mode: Mode,
    pub pretend: bool,
    pub seed: u64,
    pub entities: Vec<ExecutionReport>,
    pub failed: Vec<FailedEntity>,
}

#[derive(Debug, Serialize)]
pub struct FailedEntity {
    pub entity: String,
    pub error: String,
}

pub fn load_config(args: &RunArgs) -> CliResult<Config> {
    let mut config = Config::from_path(&args.config)?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

pub fn run_options(args: &RunArgs) -> CliResult<RunOptions> {
    if args.page_size == 0 {
        return Err(CliError::InvalidArgs("--page-size must be greater than 0".to_string()));
    }
    Ok(RunOptions {
        mode: args.mode,
        page_size: args.page_size,
        limit: args.limit.filter(|limit| *limit > 0),
        staging_dir: args.staging_dir.clone(),
        ..RunOptions::default()
    })
}

pub async fn run(args: RunArgs) -> CliResult<()> {
    let started_at = Utc::now();
    let timer = Instant::now();
    let config = load_config(&args)?;
    let options = run_options(&args)?;
    let settings = args.connection.settings()?;
    let connection = settings.redacted();

    info!(
        event = "run_started",
        connection = %connection.redacted,
        mode = %args.mode,
        pretend = args.pretend,
    );

    let db = connect(&settings).await?;
    let mut anonymizer = Anonymizer::for_database(config, db, options)?;
    let entities = anonymizer.entity_names(&args.tables)?;

    let mut summary = RunSummary {
        started_at: started_at.to_rfc3339(),
        connection,
        mode: args.mode,
        pretend: args.pretend,
        seed: anonymizer.seed(),
        entities: Vec::new(),
        failed: Vec::new(),
    };

    let mut outcome = Ok(());
    for entity in &entities {
        let mut on_row = |rows: u64| {
            if rows % PROGRESS_EVERY == 0 {
                info!(event = "entity_progress", entity = %entity, rows);
            }
        };
        let progress: ProgressFn<'_> = &mut on_row;
        match anonymizer
            .process_entity(entity, Some(progress), args.pretend, args.sql)
            .await
        {
            Ok(report) => {
                if args.sql {
                    print_statements(&mut io::stdout().lock(), &report)?;
                }
                summary.entities.push(report);
            }
            Err(err) => {
                error!(event = "entity_failed", entity = %entity, error = %err);
                summary.failed.push(FailedEntity {
                    entity: entity.clone(),
                    error: err.to_string(),
                });
                if !args.continue_on_error {
                    outcome = Err(CliError::Core(err));
                    break;
                }
            }
        }
    }

    if let Some(path) = &args.report {
        write_json(path, &summary)?;
        info!(event = "report_written", path = %path.display());
    }

    let failed = summary.failed.len();
    info!(
        event = "run_finished",
        status = if failed == 0 { "success" } else { "failed" },
        entities = summary.entities.len(),
        failed,
        duration_ms = timer.elapsed().as_millis() as u64,
    );

    outcome?;
    if failed > 0 {
        return Err(CliError::EntitiesFailed {
            failed,
            total: entities.len(),
        });
    }
    Ok(())
}

fn print_statements(out: &mut impl Write, report: &ExecutionReport) -> io::Result<()> {
    writeln!(out, "-- {}", report.entity)?;
    for statement in &report.statements {
        writeln!(out, "{statement};")?;
    }
    Ok(())
}
