use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;

use masquerade_anonymize::{Anonymizer, ExpressionEvaluator, Mode, RunOptions, ServiceRegistry};
use masquerade_core::{
    ColumnFamily, ColumnInfo, Config, Engine, Error, Result, SqlValue, TableSchema,
};
use masquerade_generate::{GeneratorRegistry, ProviderSettings, ValueProvider};
use masquerade_introspect::{Database, Row, SchemaIntrospector};

struct Load {
    prelude: Vec<String>,
    statement: String,
    epilogue: Vec<String>,
    contents: String,
}

/// One in-memory table keyed by its first column; every write is recorded
/// instead of applied.
struct RecordingDatabase {
    engine: Engine,
    host: String,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    canned: Vec<(String, Vec<Row>)>,
    executed: Mutex<Vec<(String, Vec<SqlValue>)>>,
    loads: Mutex<Vec<Load>>,
}

impl RecordingDatabase {
    fn new(engine: Engine, columns: &[&str], rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            engine,
            host: "localhost".to_string(),
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows,
            canned: Vec::new(),
            executed: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
        }
    }

    fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    fn with_row(mut self, row: Vec<SqlValue>) -> Self {
        self.rows.push(row);
        self
    }

    fn with_canned(mut self, fragment: &str, rows: Vec<Row>) -> Self {
        self.canned.push((fragment.to_string(), rows));
        self
    }

    fn executed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.executed.lock().unwrap().clone()
    }

    fn select_page(&self, sql: &str, params: &[SqlValue]) -> Vec<Row> {
        let select = Regex::new(r"^SELECT (?:TOP \((\d+)\) )?(.+?) FROM .*?(?:LIMIT (\d+))?$").unwrap();
        let captures = select.captures(sql).unwrap();
        let limit: usize = captures
            .get(1)
            .or(captures.get(3))
            .map(|limit| limit.as_str().parse().unwrap())
            .unwrap_or(usize::MAX);
        let wanted: Vec<String> = captures[2].split(", ").map(str::to_string).collect();
        let after = params.first().and_then(SqlValue::as_i64);
        self.rows
            .iter()
            .filter(|row| after.is_none_or(|after| row[0].as_i64().unwrap() > after))
            .take(limit)
            .map(|row| {
                let values = wanted
                    .iter()
                    .map(|column| {
                        let index = self.columns.iter().position(|name| name == column).unwrap();
                        row[index].clone()
                    })
                    .collect();
                Row::new(wanted.clone(), values)
            })
            .collect()
    }
}

#[async_trait]
impl Database for RecordingDatabase {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        if let Some((_, rows)) = self.canned.iter().find(|(fragment, _)| sql.contains(fragment)) {
            return Ok(rows.clone());
        }
        if sql.starts_with("SELECT") {
            return Ok(self.select_page(sql, params));
        }
        Ok(Vec::new())
    }

    async fn load_file(
        &self,
        prelude: &[String],
        statement: &str,
        epilogue: &[String],
        path: &Path,
    ) -> Result<u64> {
        let contents = std::fs::read_to_string(path)?;
        let rows = contents.lines().count() as u64;
        self.loads.lock().unwrap().push(Load {
            prelude: prelude.to_vec(),
            statement: statement.to_string(),
            epilogue: epilogue.to_vec(),
            contents,
        });
        Ok(rows)
    }
}

struct StaticIntrospector {
    schemas: Vec<TableSchema>,
}

#[async_trait]
impl SchemaIntrospector for StaticIntrospector {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.schemas.iter().map(|schema| schema.table.clone()).collect())
    }

    async fn primary_key(&self, table: &str) -> Result<String> {
        match self.schemas.iter().find(|schema| schema.table == table) {
            Some(schema) if !schema.primary_key.is_empty() => Ok(schema.primary_key.clone()),
            _ => Err(Error::schema(table, "table has no primary key")),
        }
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self
            .schemas
            .iter()
            .find(|schema| schema.table == table)
            .map(|schema| schema.columns.clone())
            .unwrap_or_default())
    }
}

fn column(name: &str, sql_type: &str, family: ColumnFamily, max_length: Option<u32>) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        sql_type: sql_type.to_string(),
        family,
        max_length,
        unsigned: false,
        nullable: name != "id",
    }
}

fn guestbook_schema(primary_key: &str) -> TableSchema {
    TableSchema {
        table: "guestbook".to_string(),
        primary_key: primary_key.to_string(),
        columns: vec![
            column("id", "integer", ColumnFamily::Integer, None),
            column("username", "character varying(32)", ColumnFamily::Text, Some(32)),
            column("content", "text", ColumnFamily::Text, None),
            column("created", "date", ColumnFamily::Date, None),
            column("votes", "integer", ColumnFamily::Integer, None),
        ],
    }
}

fn date(year: i32, month: u32, day: u32) -> SqlValue {
    SqlValue::Date(NaiveDate::from_ymd_opt(year, month, day).unwrap())
}

fn guestbook(engine: Engine) -> RecordingDatabase {
    RecordingDatabase::new(
        engine,
        &["id", "username", "content", "created", "votes"],
        vec![
            vec![
                SqlValue::Int(1),
                SqlValue::Text("joe".to_string()),
                SqlValue::Text("hello".to_string()),
                date(2020, 1, 1),
                SqlValue::Int(3),
            ],
            vec![
                SqlValue::Int(2),
                SqlValue::Text("ann".to_string()),
                SqlValue::Null,
                date(2021, 5, 5),
                SqlValue::Null,
            ],
        ],
    )
}

fn anonymizer(
    yaml: &str,
    db: Arc<RecordingDatabase>,
    schema: TableSchema,
    options: RunOptions,
) -> Anonymizer {
    let config = Config::from_yaml_str(yaml).unwrap();
    let provider = ValueProvider::new(
        GeneratorRegistry::with_defaults(),
        ProviderSettings::from_config(&config).unwrap(),
    );
    let evaluator = ExpressionEvaluator::new(&ServiceRegistry::with_database(db.clone())).unwrap();
    let introspector = Arc::new(StaticIntrospector {
        schemas: vec![schema],
    });
    Anonymizer::new(config, db, introspector, provider, evaluator, options)
}

const UPDATE_GUESTBOOK: &str = r#"
seed: 7
entities:
  guestbook:
    cols:
      username: { generator: firstName }
      created: { generator: date }
"#;

#[tokio::test]
async fn pretend_mode_reports_without_executing() -> anyhow::Result<()> {
    let db = Arc::new(guestbook(Engine::Postgres));
    let mut anonymizer =
        anonymizer(UPDATE_GUESTBOOK, db.clone(), guestbook_schema("id"), RunOptions::default());

    let report = anonymizer.process_entity("guestbook", None, true, true).await?;

    assert!(db.executed().is_empty());
    assert_eq!(report.statements.len(), 2);
    assert!(report.statements[0].starts_with(
        "UPDATE guestbook SET username = CASE WHEN username IS NULL THEN NULL ELSE CAST('"
    ));
    assert!(report.statements[0].ends_with("WHERE id = 1"));
    assert!(report.statements[1].ends_with("WHERE id = 2"));
    assert!(report.pretend);
    Ok(())
}

#[tokio::test]
async fn update_guards_nulls_and_keeps_keys() -> anyhow::Result<()> {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
seed: 7
entities:
  guestbook:
    cols:
      username: { generator: firstName }
      content: { generator: paragraph }
      created: { generator: date }
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());
    let mut seen = Vec::new();
    let mut progress = |rows: u64| seen.push(rows);

    let report = anonymizer
        .process_entity("guestbook", Some(&mut progress), false, false)
        .await?;

    let executed = db.executed();
    assert_eq!(executed.len(), 2);
    for (index, (sql, params)) in executed.iter().enumerate() {
        assert_eq!(
            sql,
            "UPDATE guestbook SET \
             username = CASE WHEN username IS NULL THEN NULL ELSE CAST($1 AS character varying(32)) END, \
             content = CASE WHEN content IS NULL THEN NULL ELSE CAST($2 AS text) END, \
             created = CASE WHEN created IS NULL THEN NULL ELSE CAST($3 AS date) END \
             WHERE id = $4"
        );
        assert_eq!(params[3], SqlValue::Int(index as i64 + 1));
        let username = params[0].as_str().unwrap();
        assert!(username.chars().count() <= 32);
        assert_ne!(username, ["joe", "ann"][index]);
    }
    assert_eq!(seen, vec![1, 2]);
    assert_eq!(report.rows_updated, 2);
    assert!(report.statements.is_empty());
    Ok(())
}

#[tokio::test]
async fn same_seed_yields_same_values() -> anyhow::Result<()> {
    let yaml = r#"
seed: 11
entities:
  guestbook:
    cols:
      username: { generator: firstName }
      created: { generator: dateBetween, params: ["2000-01-01", "2010-01-01"] }
"#;
    let mut runs = Vec::new();
    for _ in 0..2 {
        let db = Arc::new(guestbook(Engine::Postgres));
        let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());
        anonymizer.process_entity("guestbook", None, false, false).await?;
        runs.push(db.executed());
    }
    assert_eq!(runs[0], runs[1]);
    Ok(())
}

#[tokio::test]
async fn delete_reports_the_condition() -> anyhow::Result<()> {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
entities:
  guestbook:
    delete: true
    delete_where: "username = 'joe'"
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());

    let report = anonymizer.process_entity("guestbook", None, false, true).await?;

    assert_eq!(
        report.statements,
        vec!["DELETE FROM guestbook WHERE username = 'joe'".to_string()]
    );
    assert_eq!(report.rows_deleted, Some(1));
    assert_eq!(db.executed().len(), 1);
    Ok(())
}

#[tokio::test]
async fn insert_generates_the_requested_rows() -> anyhow::Result<()> {
    let db = Arc::new(RecordingDatabase::new(Engine::Mysql, &["id", "username", "created"], Vec::new()));
    let yaml = r#"
entities:
  guestbook:
    action: insert
    limit: 20
    cols:
      username: { generator: userName, unique: true }
      created: { generator: dateTimeBetween, params: ["-1 year", "now"] }
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());
    let mut last = 0;
    let mut progress = |rows: u64| last = rows;

    let report = anonymizer
        .process_entity("guestbook", Some(&mut progress), false, false)
        .await?;

    let executed = db.executed();
    assert_eq!(executed.len(), 20);
    assert!(executed
        .iter()
        .all(|(sql, _)| sql == "INSERT INTO guestbook (username, created) VALUES (?, ?)"));
    let mut usernames: Vec<&SqlValue> = executed.iter().map(|(_, params)| &params[0]).collect();
    usernames.sort_by_key(|value| value.as_str().map(str::to_string));
    usernames.dedup();
    assert_eq!(usernames.len(), 20);
    assert_eq!(last, 20);
    assert_eq!(report.rows_inserted, 20);
    Ok(())
}

#[tokio::test]
async fn missing_primary_key_is_a_schema_error() {
    let db = Arc::new(guestbook(Engine::Postgres));
    let mut anonymizer =
        anonymizer(UPDATE_GUESTBOOK, db.clone(), guestbook_schema(""), RunOptions::default());

    let err = anonymizer
        .process_entity("guestbook", None, false, true)
        .await
        .unwrap_err();

    match err {
        Error::Schema { table, .. } => assert_eq!(table, "guestbook"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(db.executed().is_empty());
}

#[tokio::test]
async fn unknown_column_names_the_column() {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
entities:
  guestbook:
    cols:
      nickname: { generator: firstName }
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());

    let err = anonymizer
        .process_entity("guestbook", None, false, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("'nickname'"));
    assert!(db.executed().is_empty());
}

#[tokio::test]
async fn unknown_entity_is_a_configuration_error() {
    let db = Arc::new(guestbook(Engine::Postgres));
    let mut anonymizer =
        anonymizer(UPDATE_GUESTBOOK, db.clone(), guestbook_schema("id"), RunOptions::default());

    let err = anonymizer
        .process_entity("visitors", None, false, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn temporal_generator_cannot_target_text() {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
entities:
  guestbook:
    cols:
      username: { generator: dateTime }
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());

    let err = anonymizer
        .process_entity("guestbook", None, false, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("dateTime"));
}

#[tokio::test]
async fn unique_exhaustion_stops_the_entity() {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
max_unique_attempts: 5
entities:
  guestbook:
    cols:
      votes: { generator: numberBetween, params: [1, 1], unique: true }
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());

    let err = anonymizer
        .process_entity("guestbook", None, false, false)
        .await
        .unwrap_err();

    match err {
        Error::GeneratorExhausted { scope, attempts, .. } => {
            assert_eq!(scope, "guestbook.votes");
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(db.executed().len(), 1);
}

#[tokio::test]
async fn actions_and_expression_params_use_the_database() -> anyhow::Result<()> {
    let db = Arc::new(guestbook(Engine::Postgres).with_canned(
        "max_votes",
        vec![Row::new(vec!["max_votes".to_string()], vec![SqlValue::Int(5)])],
    ));
    let yaml = r#"
entities:
  guestbook:
    pre_actions: ["db.execute('UPDATE audit SET started = 1')"]
    post_actions: ["db.execute('UPDATE audit SET finished = 1')"]
    cols:
      votes: { generator: numberBetween, params: [1, { expr: "db.scalar('SELECT 5 AS max_votes')" }] }
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());

    anonymizer.process_entity("guestbook", None, false, false).await?;

    let executed = db.executed();
    assert_eq!(executed.len(), 4);
    assert_eq!(executed[0].0, "UPDATE audit SET started = 1");
    assert_eq!(executed[3].0, "UPDATE audit SET finished = 1");
    for (_, params) in &executed[1..3] {
        let votes = params[0].as_i64().unwrap();
        assert!((1..=5).contains(&votes));
    }
    Ok(())
}

#[tokio::test]
async fn pretend_skips_pre_and_post_actions() -> anyhow::Result<()> {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
entities:
  guestbook:
    pre_actions: ["db.execute('UPDATE audit SET started = 1')"]
    cols:
      username: { generator: firstName }
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());

    let report = anonymizer.process_entity("guestbook", None, true, true).await?;

    assert!(db.executed().is_empty());
    assert_eq!(report.statements.len(), 2);
    Ok(())
}

#[tokio::test]
async fn failing_action_aborts_the_entity() {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
entities:
  guestbook:
    pre_actions: ["nothing.here()"]
    delete: true
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());

    let err = anonymizer
        .process_entity("guestbook", None, false, false)
        .await
        .unwrap_err();

    match err {
        Error::Anonymization { entity, context, .. } => {
            assert_eq!(entity, "guestbook");
            assert_eq!(context, "pre_actions");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(db.executed().is_empty());
}

#[tokio::test]
async fn batch_update_replaces_the_table_in_one_load() -> anyhow::Result<()> {
    let staging_dir = tempfile::tempdir()?;
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
seed: 3
entities:
  guestbook:
    cols:
      username: { generator: firstName }
      content: { generator: sentence }
"#;
    let options = RunOptions {
        mode: Mode::Batch,
        staging_dir: Some(staging_dir.path().to_path_buf()),
        ..RunOptions::default()
    };
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), options);

    let report = anonymizer.process_entity("guestbook", None, false, true).await?;

    assert!(db.executed().is_empty());
    let loads = db.loads.lock().unwrap();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].prelude, vec!["TRUNCATE TABLE guestbook".to_string()]);
    assert!(loads[0]
        .statement
        .starts_with("COPY guestbook (id, username, content, created, votes) FROM STDIN"));
    let lines: Vec<Vec<&str>> = loads[0]
        .contents
        .lines()
        .map(|line| line.split('|').collect())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0][0], "\"1\"");
    assert_eq!(lines[1][0], "\"2\"");
    assert_ne!(lines[0][1], "\"joe\"");
    assert_eq!(lines[1][2], "\\N");
    assert_eq!(lines[0][3], "\"2020-01-01\"");
    assert_eq!(lines[1][4], "\\N");
    assert_eq!(report.statements.len(), 2);
    assert_eq!(report.rows_updated, 2);
    assert_eq!(std::fs::read_dir(staging_dir.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn mysql_batch_update_keeps_binary_cells_and_foreign_keys() -> anyhow::Result<()> {
    let db = Arc::new(RecordingDatabase::new(
        Engine::Mysql,
        &["id", "username", "avatar"],
        vec![
            vec![
                SqlValue::Int(1),
                SqlValue::Text("joe".to_string()),
                SqlValue::Bytes(vec![0x00, 0xff, 0x7c]),
            ],
            vec![SqlValue::Int(2), SqlValue::Text("ann".to_string()), SqlValue::Null],
        ],
    ));
    let schema = TableSchema {
        table: "guestbook".to_string(),
        primary_key: "id".to_string(),
        columns: vec![
            column("id", "int(11)", ColumnFamily::Integer, None),
            column("username", "varchar(32)", ColumnFamily::Text, Some(32)),
            column("avatar", "blob", ColumnFamily::Binary, None),
        ],
    };
    let yaml = r#"
entities:
  guestbook:
    cols:
      username: { generator: firstName }
"#;
    let options = RunOptions {
        mode: Mode::Batch,
        ..RunOptions::default()
    };
    let mut anonymizer = anonymizer(yaml, db.clone(), schema, options);

    let report = anonymizer.process_entity("guestbook", None, false, true).await?;

    let loads = db.loads.lock().unwrap();
    assert_eq!(loads.len(), 1);
    assert_eq!(
        loads[0].prelude,
        vec![
            "SET @masquerade_fk_checks = @@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS = 0".to_string(),
            "DELETE FROM guestbook".to_string(),
        ]
    );
    assert_eq!(
        loads[0].epilogue,
        vec!["SET FOREIGN_KEY_CHECKS = @masquerade_fk_checks".to_string()]
    );
    assert!(loads[0]
        .statement
        .ends_with("(id, username, @hex3) SET avatar = UNHEX(@hex3)"));
    let lines: Vec<Vec<&str>> = loads[0]
        .contents
        .lines()
        .map(|line| line.split('|').collect())
        .collect();
    assert_eq!(lines[0][2], "\"00ff7c\"");
    assert_eq!(lines[1][2], "\\N");
    assert_eq!(report.statements.len(), 4);
    assert_eq!(report.rows_updated, 2);
    Ok(())
}

#[tokio::test]
async fn batch_update_rejects_a_limit() {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
entities:
  guestbook:
    limit: 1
    cols:
      username: { generator: firstName }
"#;
    let options = RunOptions {
        mode: Mode::Batch,
        ..RunOptions::default()
    };
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), options);

    let err = anonymizer
        .process_entity("guestbook", None, false, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert!(db.loads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn batch_insert_stages_only_configured_columns() -> anyhow::Result<()> {
    let db = Arc::new(RecordingDatabase::new(Engine::Mysql, &["id"], Vec::new()));
    let yaml = r#"
entities:
  guestbook:
    action: insert
    limit: 3
    cols:
      username: { generator: firstName }
"#;
    let options = RunOptions {
        mode: Mode::Batch,
        ..RunOptions::default()
    };
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), options);

    let report = anonymizer.process_entity("guestbook", None, false, false).await?;

    let loads = db.loads.lock().unwrap();
    assert_eq!(loads.len(), 1);
    assert!(loads[0].prelude.is_empty());
    assert!(loads[0].statement.starts_with("LOAD DATA LOCAL INFILE '"));
    assert!(loads[0].statement.ends_with("(username)"));
    assert_eq!(loads[0].contents.lines().count(), 3);
    assert_eq!(report.rows_inserted, 3);
    Ok(())
}

#[tokio::test]
async fn batch_mode_on_remote_sql_server_fails_fast() {
    let db = Arc::new(guestbook(Engine::Mssql).with_host("10.1.2.3"));
    let options = RunOptions {
        mode: Mode::Batch,
        ..RunOptions::default()
    };
    let mut anonymizer = anonymizer(UPDATE_GUESTBOOK, db.clone(), guestbook_schema("id"), options);

    let err = anonymizer
        .process_entity("guestbook", None, true, true)
        .await
        .unwrap_err();

    match err {
        Error::BulkLoad { entity, message } => {
            assert_eq!(entity, "guestbook");
            assert!(message.contains("10.1.2.3"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(db.loads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn limit_caps_updated_rows() -> anyhow::Result<()> {
    let db = Arc::new(guestbook(Engine::Mssql));
    let options = RunOptions {
        limit: Some(1),
        ..RunOptions::default()
    };
    let mut anonymizer = anonymizer(UPDATE_GUESTBOOK, db.clone(), guestbook_schema("id"), options);

    let report = anonymizer.process_entity("guestbook", None, false, true).await?;

    let executed = db.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].0.ends_with("WHERE id = @P3"));
    assert!(report.statements[0].contains("ELSE N'"));
    Ok(())
}

#[tokio::test]
async fn batch_and_queries_modes_draw_the_same_values() -> anyhow::Result<()> {
    let yaml = r#"
seed: 5
entities:
  guestbook:
    cols:
      username: { generator: firstName }
      content: { generator: firstName }
"#;
    let third_row = vec![
        SqlValue::Int(3),
        SqlValue::Text("bob".to_string()),
        SqlValue::Text("bye".to_string()),
        date(2022, 2, 2),
        SqlValue::Int(1),
    ];

    let queries_db = Arc::new(guestbook(Engine::Postgres).with_row(third_row.clone()));
    let mut queries = anonymizer(yaml, queries_db.clone(), guestbook_schema("id"), RunOptions::default());
    queries.process_entity("guestbook", None, false, false).await?;

    let staging_dir = tempfile::tempdir()?;
    let batch_db = Arc::new(guestbook(Engine::Postgres).with_row(third_row));
    let options = RunOptions {
        mode: Mode::Batch,
        staging_dir: Some(staging_dir.path().to_path_buf()),
        ..RunOptions::default()
    };
    let mut batch = anonymizer(yaml, batch_db.clone(), guestbook_schema("id"), options);
    batch.process_entity("guestbook", None, false, false).await?;

    let executed = queries_db.executed();
    let loads = batch_db.loads.lock().unwrap();
    let staged: Vec<Vec<&str>> = loads[0]
        .contents
        .lines()
        .map(|line| line.split('|').collect())
        .collect();
    assert_eq!(staged.len(), 3);
    for (row, (_, params)) in staged.iter().zip(&executed) {
        let username = params[0].as_str().unwrap();
        assert_eq!(row[1], format!("\"{username}\""));
    }
    // Row 2 keeps its NULL; row 3 still gets the value queries mode wrote.
    assert_eq!(staged[1][2], "\\N");
    let content = executed[2].1[1].as_str().unwrap();
    assert_eq!(staged[2][2], format!("\"{content}\""));
    Ok(())
}

#[tokio::test]
async fn staging_failure_never_issues_the_load() -> anyhow::Result<()> {
    let staging_dir = tempfile::tempdir()?;
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
max_unique_attempts: 3
entities:
  guestbook:
    cols:
      votes: { generator: numberBetween, params: [1, 1], unique: true }
"#;
    let options = RunOptions {
        mode: Mode::Batch,
        staging_dir: Some(staging_dir.path().to_path_buf()),
        ..RunOptions::default()
    };
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), options);

    let err = anonymizer
        .process_entity("guestbook", None, false, true)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GeneratorExhausted { .. }), "{err}");
    assert!(db.loads.lock().unwrap().is_empty());
    assert!(db.executed().is_empty());
    assert_eq!(std::fs::read_dir(staging_dir.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn pretend_refuses_writes_from_expression_params() {
    let db = Arc::new(guestbook(Engine::Postgres));
    let yaml = r#"
entities:
  guestbook:
    cols:
      votes: { generator: numberBetween, params: [0, { expr: "db.execute('UPDATE audit SET touched = 1')" }] }
"#;
    let mut anonymizer = anonymizer(yaml, db.clone(), guestbook_schema("id"), RunOptions::default());

    let err = anonymizer
        .process_entity("guestbook", None, true, true)
        .await
        .unwrap_err();

    match err {
        Error::Anonymization { context, source, .. } => {
            assert_eq!(context, "parameters of column 'votes'");
            assert!(source.to_string().contains("read-only"), "{source}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(db.executed().is_empty());
}
