use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Subcommand};
use tracing::info;

use masquerade_anonymize::ConfigGenerator;
use masquerade_core::{Config, EntityAction, Error as CoreError};
use masquerade_generate::{GeneratorRegistry, Guesser, validate_config};
use masquerade_introspect::{CatalogIntrospector, SchemaIntrospector, connect};

use crate::connection::ConnectionArgs;
use crate::error::{CliError, CliResult};
use crate::output::write_atomic;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Propose a configuration from the live schema.
    Generate(GenerateArgs),
    /// Check a configuration file, and against a database when given one.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Existing configuration whose settings are kept.
    #[arg(long, value_name = "FILE")]
    pub base: Option<PathBuf>,
    /// Table name pattern to leave out (repeatable regex).
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Output file; stdout when omitted.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: PathBuf,
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub async fn run(command: ConfigCommand) -> CliResult<()> {
    match command {
        ConfigCommand::Generate(args) => generate(args).await,
        ConfigCommand::Validate(args) => validate(args).await,
    }
}

async fn generate(args: GenerateArgs) -> CliResult<()> {
    let mut base = match &args.base {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    base.entities_to_exclude.extend(args.exclude.iter().cloned());
    if args.seed.is_some() {
        base.seed = args.seed;
    }

    let settings = args.connection.settings()?;
    info!(event = "config_generation_started", connection = %settings.redacted().redacted);
    let db = connect(&settings).await?;
    let introspector = CatalogIntrospector::new(db);
    let generator = ConfigGenerator::new(&introspector, Guesser::with_default_rules()?);
    let config = generator.generate(base).await?;
    validate_config(&config, &GeneratorRegistry::with_defaults())?;

    let yaml = config.to_yaml_string()?;
    match &args.out {
        Some(path) => {
            write_atomic(path, yaml.as_bytes())?;
            info!(
                event = "config_written",
                path = %path.display(),
                entities = config.entities.len(),
            );
        }
        None => io::stdout().lock().write_all(yaml.as_bytes())?,
    }
    Ok(())
}

async fn validate(args: ValidateArgs) -> CliResult<()> {
    let config = Config::from_path(&args.config)?;
    let registry = GeneratorRegistry::with_defaults();
    validate_config(&config, &registry)?;

    if args.connection.is_present() {
        let settings = args.connection.settings()?;
        let db = connect(&settings).await?;
        let introspector = CatalogIntrospector::new(db);
        let problems = schema_problems(&config, &introspector, &registry).await?;
        if !problems.is_empty() {
            return Err(CliError::SchemaMismatch(problems));
        }
    }

    info!(
        event = "config_valid",
        path = %args.config.display(),
        entities = config.entities.len(),
        live = args.connection.is_present(),
    );
    Ok(())
}

/// Every mismatch between `config` and the live schema: missing tables or
/// columns, rewritten primary keys and generators whose values cannot go
/// into their column. Connection failures are returned as errors instead.
pub async fn schema_problems(
    config: &Config,
    introspector: &dyn SchemaIntrospector,
    registry: &GeneratorRegistry,
) -> CliResult<Vec<String>> {
    let mut problems = Vec::new();
    for (entity, entity_config) in config.entities.iter() {
        let schema = match introspector.table_schema(entity).await {
            Ok(schema) => schema,
            Err(err @ CoreError::Schema { .. }) => {
                problems.push(err.to_string());
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        for (column, spec) in entity_config.cols.iter() {
            let Some(info) = schema.column(column) else {
                problems.push(format!("entity '{entity}': column '{column}' does not exist"));
                continue;
            };
            if entity_config.action == EntityAction::Update && *column == schema.primary_key {
                problems.push(format!(
                    "entity '{entity}': primary key column '{column}' cannot be rewritten"
                ));
            }
            if let Some(generator) = registry.get(&spec.generator) {
                if !generator.kind().is_compatible_with(info.family) {
                    problems.push(format!(
                        "entity '{entity}': generator '{}' produces {} values, column '{column}' is {}",
                        spec.generator,
                        generator.kind().as_str(),
                        info.sql_type,
                    ));
                }
            }
        }
    }
    Ok(problems)
}
