//! Embedded expression language.
//!
//! Pre/post actions and `{ expr: ... }` generator parameters are Lua
//! snippets. The interpreter only sees the capabilities registered in a
//! [`ServiceRegistry`]; with the default registry that is `db`, giving
//! `db.query(sql)`, `db.execute(sql)` and `db.scalar(sql)`. While the
//! evaluator is read-only, `db.execute` fails instead of running.

use std::fmt;
use std::sync::Arc;

use mlua::{IntoLua, Lua, LuaOptions, LuaSerdeExt, StdLib, Table, Value as LuaValue};
use serde_json::Value as JsonValue;
use tracing::debug;

use masquerade_core::{Error, Result};
use masquerade_introspect::Database;

/// A capability exposed to expressions as a global table.
pub trait ExpressionService: Send + Sync {
    /// Global name the table is bound to.
    fn name(&self) -> &str;

    fn install(&self, lua: &Lua) -> mlua::Result<Table>;
}

/// Capabilities available to expressions, by name.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<Arc<dyn ExpressionService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry exposing `db` over `database`.
    pub fn with_database(database: Arc<dyn Database>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DatabaseService::new(database)));
        registry
    }

    /// Add `service`, replacing any service of the same name.
    pub fn register(&mut self, service: Arc<dyn ExpressionService>) -> &mut Self {
        self.services.retain(|existing| existing.name() != service.name());
        self.services.push(service);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|service| service.name()).collect()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

/// `db` service: runs SQL on the connection being anonymized.
pub struct DatabaseService {
    db: Arc<dyn Database>,
}

impl DatabaseService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

impl ExpressionService for DatabaseService {
    fn name(&self) -> &str {
        "db"
    }

    fn install(&self, lua: &Lua) -> mlua::Result<Table> {
        let table = lua.create_table()?;

        let db = self.db.clone();
        let query = lua.create_async_function(move |_, sql: String| {
            let db = db.clone();
            async move {
                let rows = db.fetch_all(&sql, &[]).await.map_err(mlua::Error::external)?;
                if rows.is_empty() {
                    return Ok(Json(JsonValue::Null));
                }
                Ok(Json(JsonValue::Array(rows.iter().map(|row| row.to_json()).collect())))
            }
        })?;
        table.set("query", query)?;

        let db = self.db.clone();
        let execute = lua.create_async_function(move |lua, sql: String| {
            let db = db.clone();
            let read_only = lua.app_data_ref::<ReadOnly>().is_some_and(|flag| flag.0);
            async move {
                if read_only {
                    return Err(mlua::Error::runtime(format!(
                        "db.execute is disabled in read-only mode: {sql}"
                    )));
                }
                db.execute(&sql, &[]).await.map_err(mlua::Error::external)
            }
        })?;
        table.set("execute", execute)?;

        let db = self.db.clone();
        let scalar = lua.create_async_function(move |_, sql: String| {
            let db = db.clone();
            async move {
                let rows = db.fetch_all(&sql, &[]).await.map_err(mlua::Error::external)?;
                let value = rows
                    .first()
                    .and_then(|row| row.values().first())
                    .map(|value| value.to_json())
                    .unwrap_or(JsonValue::Null);
                Ok(Json(value))
            }
        })?;
        table.set("scalar", scalar)?;

        Ok(table)
    }
}

/// Interpreter flag checked by services that write.
struct ReadOnly(bool);

/// JSON handed back to Lua; `null` becomes `nil`.
struct Json(JsonValue);

impl IntoLua for Json {
    fn into_lua(self, lua: &Lua) -> mlua::Result<LuaValue> {
        match self.0 {
            JsonValue::Null => Ok(LuaValue::Nil),
            value => lua.to_value(&value),
        }
    }
}

/// Sandboxed Lua state with the registry's services installed.
pub struct ExpressionEvaluator {
    lua: Lua,
}

impl ExpressionEvaluator {
    pub fn new(services: &ServiceRegistry) -> Result<Self> {
        let lua = Lua::new_with(
            StdLib::MATH | StdLib::STRING | StdLib::TABLE | StdLib::UTF8,
            LuaOptions::default(),
        )
        .map_err(|err| Error::config(format!("cannot start expression interpreter: {err}")))?;
        let globals = lua.globals();
        for service in &services.services {
            service
                .install(&lua)
                .and_then(|table| globals.set(service.name(), table))
                .map_err(|err| {
                    Error::config(format!("cannot install service '{}': {err}", service.name()))
                })?;
        }
        Ok(Self { lua })
    }

    /// Refuse `db.execute` until switched back.
    pub fn set_read_only(&self, read_only: bool) {
        self.lua.set_app_data(ReadOnly(read_only));
    }

    /// Evaluate `expression` and return its value as JSON.
    ///
    /// Expressions are read as `return <expression>` first; snippets that
    /// are statements rather than expressions run as-is and yield `null`.
    pub async fn evaluate(&self, expression: &str) -> Result<JsonValue> {
        debug!(event = "expression_evaluated", expression);
        let value = match self
            .lua
            .load(format!("return {expression}"))
            .set_name("expression")
            .eval_async::<LuaValue>()
            .await
        {
            Ok(value) => value,
            Err(mlua::Error::SyntaxError { .. }) => {
                self.lua
                    .load(expression)
                    .set_name("expression")
                    .exec_async()
                    .await
                    .map_err(|err| Error::expression(expression, err))?;
                return Ok(JsonValue::Null);
            }
            Err(err) => return Err(Error::expression(expression, err)),
        };
        if value.is_nil() {
            return Ok(JsonValue::Null);
        }
        self.lua
            .from_value(value)
            .map_err(|err| Error::expression(expression, err))
    }

    /// Evaluate each expression in order, stopping at the first failure.
    pub async fn evaluate_all(&self, expressions: &[String]) -> Result<Vec<JsonValue>> {
        let mut values = Vec::with_capacity(expressions.len());
        for expression in expressions {
            values.push(self.evaluate(expression).await?);
        }
        Ok(values)
    }
}

impl fmt::Debug for ExpressionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEvaluator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Constants;

    impl ExpressionService for Constants {
        fn name(&self) -> &str {
            "constants"
        }

        fn install(&self, lua: &Lua) -> mlua::Result<Table> {
            let table = lua.create_table()?;
            table.set("answer", 42)?;
            Ok(table)
        }
    }

    fn evaluator() -> ExpressionEvaluator {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(Constants));
        ExpressionEvaluator::new(&registry).unwrap()
    }

    #[tokio::test]
    async fn evaluates_plain_expressions() {
        let evaluator = evaluator();
        assert_eq!(evaluator.evaluate("1 + 1").await.unwrap(), json!(2));
        assert_eq!(evaluator.evaluate("'ab' .. 'cd'").await.unwrap(), json!("abcd"));
        assert_eq!(evaluator.evaluate("constants.answer").await.unwrap(), json!(42));
        assert_eq!(evaluator.evaluate("nil").await.unwrap(), JsonValue::Null);
    }

    #[tokio::test]
    async fn statements_yield_null_and_keep_state() {
        let evaluator = evaluator();
        let values = evaluator
            .evaluate_all(&["counter = 10".to_string(), "counter * 2".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![JsonValue::Null, json!(20)]);
    }

    #[tokio::test]
    async fn runtime_errors_name_the_expression() {
        let err = evaluator().evaluate("missing.field").await.unwrap_err();
        match err {
            Error::Expression { expression, .. } => assert_eq!(expression, "missing.field"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn sandbox_has_no_os_access() {
        assert!(evaluator().evaluate("os.getenv('HOME')").await.is_err());
        assert_eq!(evaluator().evaluate("math.max(3, 9)").await.unwrap(), json!(9));
    }

    #[test]
    fn registry_replaces_services_by_name() {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(Constants));
        registry.register(Arc::new(Constants));
        assert_eq!(registry.names(), vec!["constants"]);
    }
}
