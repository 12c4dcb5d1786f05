use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use masquerade_anonymize::{Anonymizer, Mode, RunOptions};
use masquerade_core::{Config, ConnectionSettings, SqlValue};
use masquerade_introspect::{Database, connect};

const SCHEMA: &[&str] = &[
    "drop table if exists masq_anon_guestbook",
    "create table masq_anon_guestbook (id serial primary key, username varchar(32) not null, content text, votes int)",
    "insert into masq_anon_guestbook (username, content, votes) values \
     ('joe', 'hello', 3), ('ann', null, null), ('bob', 'hi there', 7)",
];

fn database_url() -> Option<String> {
    env::var("TEST_POSTGRES_URL").ok()
}

async fn prepare(url: &str) -> Result<Arc<dyn Database>> {
    let settings = ConnectionSettings::from_url(url).context("parsing TEST_POSTGRES_URL")?;
    let db = connect(&settings).await.context("connecting to Postgres")?;
    for sql in SCHEMA {
        db.execute(sql, &[])
            .await
            .with_context(|| format!("executing fixture: {sql}"))?;
    }
    Ok(db)
}

async fn snapshot(db: &Arc<dyn Database>) -> Result<Vec<Vec<SqlValue>>> {
    let rows = db
        .fetch_all(
            "select id, username, content, votes from masq_anon_guestbook order by id",
            &[],
        )
        .await?;
    Ok(rows.into_iter().map(|row| row.into_values()).collect())
}

fn config(yaml: &str) -> Result<Config> {
    Ok(Config::from_yaml_str(yaml)?)
}

#[tokio::test]
async fn anonymizes_live_rows_in_both_modes() -> Result<()> {
    let Some(url) = database_url() else {
        eprintln!("skipping: TEST_POSTGRES_URL is not set");
        return Ok(());
    };
    // One test body: the fixture table is shared and tests run in parallel.
    let db = prepare(&url).await?;
    let before = snapshot(&db).await?;

    let update = config(
        r#"
seed: 5
entities:
  masq_anon_guestbook:
    cols:
      username: { generator: userName, unique: true }
      content: { generator: sentence }
"#,
    )?;
    let mut anonymizer = Anonymizer::for_database(update.clone(), db.clone(), RunOptions::default())?;
    let report = anonymizer
        .process_entity("masq_anon_guestbook", None, false, false)
        .await?;
    assert_eq!(report.rows_updated, 3);

    let after = snapshot(&db).await?;
    assert_eq!(after.len(), before.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old[0], new[0], "keys are preserved");
        assert_ne!(old[1], new[1], "username is rewritten");
        assert_eq!(old[3], new[3], "unconfigured columns are untouched");
        assert_eq!(old[2].is_null(), new[2].is_null(), "NULL stays NULL");
    }

    let options = RunOptions {
        mode: Mode::Batch,
        ..RunOptions::default()
    };
    let mut batch = Anonymizer::for_database(update, db.clone(), options)?;
    let report = batch
        .process_entity("masq_anon_guestbook", None, false, false)
        .await?;
    assert_eq!(report.rows_updated, 3);
    let replaced = snapshot(&db).await?;
    assert_eq!(replaced.len(), 3);
    assert!(replaced[1][2].is_null());
    assert_eq!(replaced[2][3], SqlValue::Int(7));

    let delete = config(
        r#"
entities:
  masq_anon_guestbook:
    delete: true
    delete_where: "votes is null"
"#,
    )?;
    let mut deleter = Anonymizer::for_database(delete, db.clone(), RunOptions::default())?;
    let report = deleter
        .process_entity("masq_anon_guestbook", None, false, false)
        .await?;
    assert_eq!(report.rows_deleted, Some(1));
    assert_eq!(snapshot(&db).await?.len(), 2);

    db.execute("drop table masq_anon_guestbook", &[]).await?;
    Ok(())
}
