use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use masquerade_core::{
    ColumnInfo, ColumnSpec, Config, EntityAction, EntityConfig, Error, GeneratorParam, Result,
    SqlValue, TableSchema,
};
use masquerade_generate::{GeneratorRegistry, ProviderSettings, ScopeKey, ValueProvider};
use masquerade_introspect::{CatalogIntrospector, Database, Row, SchemaIntrospector};

use crate::driver::{BulkLoad, DriverStrategy, LoadMode};
use crate::expression::{ExpressionEvaluator, ServiceRegistry};
use crate::report::ExecutionReport;
use crate::sql::{self, Statement};
use crate::staging::StagingFile;

pub const DEFAULT_PAGE_SIZE: u64 = 1_000;
pub const DEFAULT_INSERT_ROWS: u64 = 100;

/// Execution strategy for row-level work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One statement per row.
    #[default]
    Queries,
    /// Rows staged to a file and bulk-loaded once per entity.
    Batch,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Queries => "queries",
            Mode::Batch => "batch",
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "queries" => Ok(Mode::Queries),
            "batch" => Ok(Mode::Batch),
            other => Err(Error::config(format!(
                "unknown mode '{other}' (expected queries or batch)"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps an entity run performs, as a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actions(u8);

impl Actions {
    pub const NONE: Actions = Actions(0);
    pub const DELETE: Actions = Actions(1);
    pub const MUTATE: Actions = Actions(1 << 1);
    pub const INSERT: Actions = Actions(1 << 2);

    pub fn for_entity(config: &EntityConfig) -> Self {
        let mut actions = Actions::NONE;
        if config.delete {
            actions = actions | Actions::DELETE;
        }
        match config.action {
            EntityAction::Update if !config.cols.is_empty() => actions | Actions::MUTATE,
            EntityAction::Insert => actions | Actions::INSERT,
            EntityAction::Update => actions,
        }
    }

    pub fn contains(self, other: Actions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Actions) -> Actions {
        Actions(self.0 | rhs.0)
    }
}

impl fmt::Display for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Actions::DELETE, "delete"),
            (Actions::MUTATE, "update"),
            (Actions::INSERT, "insert"),
        ]
        .into_iter()
        .filter(|(action, _)| self.contains(*action))
        .map(|(_, name)| name)
        .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("+"))
        }
    }
}

/// Run-wide knobs that are not part of the configuration file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: Mode,
    /// Rows fetched per keyset page.
    pub page_size: u64,
    /// Rows synthesized by an insert entity without a limit.
    pub default_insert_rows: u64,
    /// Overrides every entity's `limit`.
    pub limit: Option<u64>,
    /// Where batch staging files are created; the system temp dir if unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Queries,
            page_size: DEFAULT_PAGE_SIZE,
            default_insert_rows: DEFAULT_INSERT_ROWS,
            limit: None,
            staging_dir: None,
        }
    }
}

/// Row-counter callback, invoked with a 1-based count after each row.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u64) + Send);

/// Column to rewrite, resolved against the live schema.
struct ColumnPlan {
    info: ColumnInfo,
    generator: String,
    scope: ScopeKey,
    params: Vec<JsonValue>,
}

/// State of one `process_entity` call.
struct EntityRun<'a> {
    name: String,
    pretend: bool,
    report: ExecutionReport,
    progress: Option<ProgressFn<'a>>,
    rows: u64,
}

impl EntityRun<'_> {
    fn tick(&mut self) {
        self.rows += 1;
        if let Some(progress) = self.progress.as_mut() {
            progress(self.rows);
        }
    }
}

/// Applies a configuration to one database, entity by entity.
///
/// Entities are processed strictly one after another over a single
/// connection; generator scopes live for the lifetime of the anonymizer.
pub struct Anonymizer {
    config: Config,
    db: Arc<dyn Database>,
    introspector: Arc<dyn SchemaIntrospector>,
    driver: DriverStrategy,
    provider: ValueProvider,
    evaluator: ExpressionEvaluator,
    options: RunOptions,
}

impl Anonymizer {
    pub fn new(
        config: Config,
        db: Arc<dyn Database>,
        introspector: Arc<dyn SchemaIntrospector>,
        provider: ValueProvider,
        evaluator: ExpressionEvaluator,
        options: RunOptions,
    ) -> Self {
        let driver = DriverStrategy::for_engine(db.engine());
        Self {
            config,
            db,
            introspector,
            driver,
            provider,
            evaluator,
            options,
        }
    }

    /// Anonymizer over `db` with the catalog introspector, the default
    /// generators and a `db` expression service.
    pub fn for_database(config: Config, db: Arc<dyn Database>, options: RunOptions) -> Result<Self> {
        let registry = GeneratorRegistry::with_defaults();
        masquerade_generate::validate_config(&config, &registry)?;
        let provider = ValueProvider::new(registry, ProviderSettings::from_config(&config)?);
        let evaluator = ExpressionEvaluator::new(&ServiceRegistry::with_database(db.clone()))?;
        let introspector = Arc::new(CatalogIntrospector::new(db.clone()));
        Ok(Self::new(config, db, introspector, provider, evaluator, options))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn driver(&self) -> DriverStrategy {
        self.driver
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn seed(&self) -> u64 {
        self.provider.settings().seed
    }

    /// Configured entities in file order, narrowed to `only` when given.
    pub fn entity_names(&self, only: &[String]) -> Result<Vec<String>> {
        if only.is_empty() {
            return Ok(self.config.entity_names());
        }
        for name in only {
            self.config.entity(name)?;
        }
        Ok(self
            .config
            .entity_names()
            .into_iter()
            .filter(|name| only.contains(name))
            .collect())
    }

    /// Run every configured action of entity `name`.
    ///
    /// With `pretend`, statements are built and reported but nothing that
    /// writes is sent; pre/post actions are skipped. With `collect_sql`,
    /// the report lists every statement with values inlined.
    pub async fn process_entity(
        &mut self,
        name: &str,
        progress: Option<ProgressFn<'_>>,
        pretend: bool,
        collect_sql: bool,
    ) -> Result<ExecutionReport> {
        let started = Instant::now();
        let entity = self.config.entity(name)?.clone();
        let actions = Actions::for_entity(&entity);
        let limit = self.options.limit.or(entity.effective_limit());
        let mode = self.options.mode;
        info!(
            event = "entity_started",
            entity = name,
            actions = %actions,
            mode = %mode,
            pretend,
        );

        let schema = self.introspector.table_schema(name).await?;
        let mut plans = self.plan_columns(name, &entity, &schema, actions)?;
        if actions.contains(Actions::MUTATE) && mode == Mode::Batch && limit.is_some() {
            return Err(Error::config(format!(
                "entity '{name}': a limit cannot be combined with a batch update, \
                 the table is replaced as a whole"
            )));
        }

        let mut run = EntityRun {
            name: name.to_string(),
            pretend,
            report: ExecutionReport::new(name, mode, pretend, collect_sql),
            progress,
            rows: 0,
        };

        self.evaluator.set_read_only(pretend);
        self.run_actions(&run, &entity.pre_actions, "pre_actions").await?;
        for (plan, (column, spec)) in plans.iter_mut().zip(entity.cols.iter()) {
            plan.params = self.resolve_params(name, column, spec).await?;
        }

        if actions.contains(Actions::DELETE) {
            let statement = sql::delete(self.driver, name, entity.delete_condition());
            let deleted = self.run_statement(&mut run, &statement).await?;
            if !pretend {
                run.report.rows_deleted = Some(deleted);
            }
        }
        if actions.contains(Actions::MUTATE) {
            match mode {
                Mode::Queries => self.update_rows(&mut run, &schema, &plans, limit).await?,
                Mode::Batch => self.replace_rows(&mut run, &schema, &plans).await?,
            }
        }
        if actions.contains(Actions::INSERT) {
            let count = limit.unwrap_or(self.options.default_insert_rows);
            match mode {
                Mode::Queries => self.insert_rows(&mut run, &plans, count).await?,
                Mode::Batch => self.load_rows(&mut run, &schema, &plans, count).await?,
            }
        }

        self.run_actions(&run, &entity.post_actions, "post_actions").await?;

        let mut report = run.report;
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            event = "entity_finished",
            entity = name,
            rows_updated = report.rows_updated,
            rows_inserted = report.rows_inserted,
            rows_deleted = ?report.rows_deleted,
            statements = report.statements.len(),
            duration_ms = report.duration_ms,
        );
        Ok(report)
    }

    /// Cross-check configured columns against the table and the catalog.
    fn plan_columns(
        &self,
        name: &str,
        entity: &EntityConfig,
        schema: &TableSchema,
        actions: Actions,
    ) -> Result<Vec<ColumnPlan>> {
        let mut plans = Vec::with_capacity(entity.cols.len());
        for (column, spec) in entity.cols.iter() {
            let column_error =
                |message: String| Error::config(format!("entity '{name}', column '{column}': {message}"));
            let info = schema.column(column).ok_or_else(|| {
                column_error(format!("column does not exist in table '{}'", schema.table))
            })?;
            if actions.contains(Actions::MUTATE) && info.name.eq_ignore_ascii_case(&schema.primary_key) {
                return Err(column_error("the primary key cannot be rewritten".to_string()));
            }
            let generator = self.provider.registry().get(&spec.generator).ok_or_else(|| {
                column_error(format!("unknown generator '{}'", spec.generator))
            })?;
            if !generator.kind().is_compatible_with(info.family) {
                return Err(column_error(format!(
                    "generator '{}' produces {} values, column type is '{}'",
                    spec.generator,
                    generator.kind().as_str(),
                    info.sql_type
                )));
            }
            if spec.unique && !generator.unique_capable() {
                return Err(column_error(format!(
                    "generator '{}' cannot produce unique values",
                    spec.generator
                )));
            }
            plans.push(ColumnPlan {
                info: info.clone(),
                generator: spec.generator.clone(),
                scope: ScopeKey::new(name, column, spec.unique),
                params: Vec::new(),
            });
        }
        Ok(plans)
    }

    async fn run_actions(&self, run: &EntityRun<'_>, actions: &[String], stage: &str) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        if run.pretend {
            info!(event = "actions_skipped", entity = %run.name, stage, count = actions.len());
            return Ok(());
        }
        self.evaluator
            .evaluate_all(actions)
            .await
            .map(|_| ())
            .map_err(|err| err.in_entity(&run.name, stage))
    }

    async fn resolve_params(&self, name: &str, column: &str, spec: &ColumnSpec) -> Result<Vec<JsonValue>> {
        let mut values = Vec::with_capacity(spec.params.len());
        for param in &spec.params {
            let value = match param {
                GeneratorParam::Literal(value) => value.clone(),
                GeneratorParam::Expression { expr } => self
                    .evaluator
                    .evaluate(expr)
                    .await
                    .map_err(|err| err.in_entity(name, format!("parameters of column '{column}'")))?,
            };
            values.push(value);
        }
        Ok(values)
    }

    fn next_value(&mut self, entity: &str, plan: &ColumnPlan, row: &str) -> Result<SqlValue> {
        self.provider
            .value_for(&plan.scope, &plan.generator, &plan.params, plan.info.max_length)
            .map_err(|err| {
                err.in_entity(
                    entity,
                    format!("{row}, column '{}' (generator '{}')", plan.info.name, plan.generator),
                )
            })
    }

    async fn run_statement(&self, run: &mut EntityRun<'_>, statement: &Statement) -> Result<u64> {
        run.report.record(|| statement.render_literal(self.driver));
        if run.pretend {
            return Ok(0);
        }
        let (sql, params) = statement.render(self.driver);
        debug!(event = "statement_executed", entity = %run.name, sql = %sql);
        self.db
            .execute(&sql, &params)
            .await
            .map_err(|err| err.in_entity(&run.name, format!("statement `{sql}`")))
    }

    async fn fetch_page(
        &self,
        run: &EntityRun<'_>,
        columns: &[String],
        key: &str,
        after: Option<&SqlValue>,
        limit: u64,
    ) -> Result<Vec<Row>> {
        let sql = self
            .driver
            .page_query(&run.name, columns, key, after.is_some(), limit);
        let params: Vec<SqlValue> = after.cloned().into_iter().collect();
        self.db
            .fetch_all(&sql, &params)
            .await
            .map_err(|err| err.in_entity(&run.name, format!("statement `{sql}`")))
    }

    /// One guarded UPDATE per row, walking the key in pages.
    async fn update_rows(
        &mut self,
        run: &mut EntityRun<'_>,
        schema: &TableSchema,
        plans: &[ColumnPlan],
        limit: Option<u64>,
    ) -> Result<()> {
        let key = schema.primary_key.clone();
        let key_columns = vec![key.clone()];
        let mut last: Option<SqlValue> = None;
        let mut processed = 0u64;
        loop {
            let page_size = match limit {
                Some(limit) => self.options.page_size.min(limit - processed),
                None => self.options.page_size,
            };
            if page_size == 0 {
                break;
            }
            let rows = self
                .fetch_page(run, &key_columns, &key, last.as_ref(), page_size)
                .await?;
            let fetched = rows.len() as u64;
            for row in rows {
                let Some(id) = row.into_values().into_iter().next() else {
                    continue;
                };
                let context = format!("row {key} = {}", self.driver.literal(&id));
                let mut assignments = Vec::with_capacity(plans.len());
                for plan in plans {
                    let value = self.next_value(&run.name, plan, &context)?;
                    assignments.push((&plan.info, value));
                }
                let statement = sql::update(self.driver, &run.name, &key, id.clone(), assignments);
                self.run_statement(run, &statement).await?;
                run.report.rows_updated += 1;
                run.tick();
                processed += 1;
                last = Some(id);
            }
            if fetched < page_size {
                break;
            }
        }
        Ok(())
    }

    async fn insert_rows(&mut self, run: &mut EntityRun<'_>, plans: &[ColumnPlan], count: u64) -> Result<()> {
        for index in 1..=count {
            let context = format!("inserted row {index}");
            let mut values = Vec::with_capacity(plans.len());
            for plan in plans {
                let value = self.next_value(&run.name, plan, &context)?;
                values.push((&plan.info, value));
            }
            let statement = sql::insert(self.driver, &run.name, values);
            self.run_statement(run, &statement).await?;
            run.report.rows_inserted += 1;
            run.tick();
        }
        Ok(())
    }

    /// Batch insert: stage `count` synthetic rows, then load them.
    async fn load_rows(
        &mut self,
        run: &mut EntityRun<'_>,
        schema: &TableSchema,
        plans: &[ColumnPlan],
        count: u64,
    ) -> Result<()> {
        self.driver
            .ensure_local_staging(&run.name, self.db.host())
            .await?;
        let format = self.driver.staging_format();
        let targets: Vec<ColumnInfo> = if format.all_columns {
            schema.columns.clone()
        } else {
            plans.iter().map(|plan| plan.info.clone()).collect()
        };
        let staged = self.stage_inserts(run, plans, &targets, count);
        let mut staging = abort_on_error(&run.name, staged)?;
        let path = staging.finish()?;
        let load = self.driver.bulk_load(&run.name, &path, &targets, LoadMode::Insert)?;
        self.issue_load(run, &load, &path, staging.rows()).await?;
        run.report.rows_inserted = staging.rows();
        Ok(())
    }

    fn stage_inserts(
        &mut self,
        run: &mut EntityRun<'_>,
        plans: &[ColumnPlan],
        columns: &[ColumnInfo],
        count: u64,
    ) -> Result<StagingFile> {
        let mut staging = StagingFile::create(
            &run.name,
            self.options.staging_dir.as_deref(),
            self.driver.staging_format(),
        )?
        .with_hex_columns(self.driver.hex_columns(columns));
        for index in 1..=count {
            let context = format!("staged row {index}");
            let mut row = Vec::with_capacity(columns.len());
            for column in columns {
                let value = match plans.iter().find(|plan| plan.info.name == column.name) {
                    Some(plan) => self.next_value(&run.name, plan, &context)?,
                    None => SqlValue::Null,
                };
                row.push(value);
            }
            staging.write_row(&row)?;
            run.tick();
        }
        Ok(staging)
    }

    /// Batch update: copy every row with configured non-NULL cells
    /// replaced, then truncate and reload the table in one transaction.
    async fn replace_rows(
        &mut self,
        run: &mut EntityRun<'_>,
        schema: &TableSchema,
        plans: &[ColumnPlan],
    ) -> Result<()> {
        self.driver
            .ensure_local_staging(&run.name, self.db.host())
            .await?;
        let columns = schema.column_names();
        let staged = self.stage_replacements(run, schema, plans, &columns).await;
        let mut staging = abort_on_error(&run.name, staged)?;
        let path = staging.finish()?;
        let load = self
            .driver
            .bulk_load(&run.name, &path, &schema.columns, LoadMode::Replace)?;
        self.issue_load(run, &load, &path, staging.rows()).await?;
        run.report.rows_updated = staging.rows();
        Ok(())
    }

    async fn stage_replacements(
        &mut self,
        run: &mut EntityRun<'_>,
        schema: &TableSchema,
        plans: &[ColumnPlan],
        columns: &[String],
    ) -> Result<StagingFile> {
        let key = schema.primary_key.clone();
        let key_index = columns
            .iter()
            .position(|column| column == &key)
            .ok_or_else(|| Error::schema(&schema.table, format!("primary key '{key}' is not a column")))?;
        let targets: Vec<(usize, &ColumnPlan)> = plans
            .iter()
            .filter_map(|plan| {
                columns
                    .iter()
                    .position(|column| column == &plan.info.name)
                    .map(|index| (index, plan))
            })
            .collect();

        let mut staging = StagingFile::create(
            &run.name,
            self.options.staging_dir.as_deref(),
            self.driver.staging_format(),
        )?
        .with_hex_columns(self.driver.hex_columns(&schema.columns));
        let mut last: Option<SqlValue> = None;
        loop {
            let page_size = self.options.page_size;
            let rows = self
                .fetch_page(run, columns, &key, last.as_ref(), page_size)
                .await?;
            let fetched = rows.len() as u64;
            for row in rows {
                let mut values = row.into_values();
                let id = values.get(key_index).cloned().unwrap_or(SqlValue::Null);
                let context = format!("row {key} = {}", self.driver.literal(&id));
                // Draw for every cell, NULL or not, to stay in step with queries mode.
                for (index, plan) in &targets {
                    let value = self.next_value(&run.name, plan, &context)?;
                    if values.get(*index).is_some_and(|current| !current.is_null()) {
                        values[*index] = value;
                    }
                }
                staging.write_row(&values)?;
                run.tick();
                last = Some(id);
            }
            if fetched < page_size {
                break;
            }
        }
        Ok(staging)
    }

    async fn issue_load(
        &self,
        run: &mut EntityRun<'_>,
        load: &BulkLoad,
        path: &Path,
        rows: u64,
    ) -> Result<()> {
        for statement in load.statements() {
            run.report.record(|| statement.to_string());
        }
        if run.pretend {
            return Ok(());
        }
        info!(
            event = "bulk_load_issued",
            entity = %run.name,
            rows,
            file = %path.display(),
        );
        self.db
            .load_file(&load.prelude, &load.statement, &load.epilogue, path)
            .await
            .map_err(|err| Error::bulk_load(&run.name, err))?;
        Ok(())
    }
}

impl fmt::Debug for Anonymizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anonymizer")
            .field("engine", &self.driver.engine())
            .field("options", &self.options)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// Staging that failed part-way leaves no file and no load behind.
fn abort_on_error(entity: &str, staged: Result<StagingFile>) -> Result<StagingFile> {
    staged.inspect_err(|err| {
        warn!(event = "bulk_load_aborted", entity, error = %err);
    })
}
