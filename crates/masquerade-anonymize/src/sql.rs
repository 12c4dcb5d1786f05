use masquerade_core::{ColumnInfo, SqlValue};

use crate::driver::DriverStrategy;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Sql(String),
    Param(SqlValue),
    /// Bound value cast to the column's declared type.
    Value { column: ColumnInfo, value: SqlValue },
    /// NULL-preserving assignment to `column`.
    Guarded { column: ColumnInfo, value: SqlValue },
}

/// SQL text with its values kept aside until rendering, so one statement
/// yields both the parameterised form that is executed and the literal form
/// that is reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    parts: Vec<Part>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Sql(sql.into())],
        }
    }

    pub fn push_sql(&mut self, sql: impl Into<String>) -> &mut Self {
        self.parts.push(Part::Sql(sql.into()));
        self
    }

    pub fn push_param(&mut self, value: SqlValue) -> &mut Self {
        self.parts.push(Part::Param(value));
        self
    }

    pub fn push_value(&mut self, column: &ColumnInfo, value: SqlValue) -> &mut Self {
        self.parts.push(Part::Value {
            column: column.clone(),
            value,
        });
        self
    }

    pub fn push_guarded(&mut self, column: &ColumnInfo, value: SqlValue) -> &mut Self {
        self.parts.push(Part::Guarded {
            column: column.clone(),
            value,
        });
        self
    }

    pub fn param_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| !matches!(part, Part::Sql(_)))
            .count()
    }

    /// SQL with numbered placeholders, and the values to bind in order.
    pub fn render(&self, driver: DriverStrategy) -> (String, Vec<SqlValue>) {
        let mut params = Vec::with_capacity(self.param_count());
        let sql = self.render_with(driver, |value| {
            params.push(value.clone());
            driver.placeholder(params.len())
        });
        (sql, params)
    }

    /// SQL with every value inlined as a literal.
    pub fn render_literal(&self, driver: DriverStrategy) -> String {
        self.render_with(driver, |value| driver.literal(value))
    }

    fn render_with(
        &self,
        driver: DriverStrategy,
        mut slot: impl FnMut(&SqlValue) -> String,
    ) -> String {
        let mut sql = String::new();
        for part in &self.parts {
            match part {
                Part::Sql(text) => sql.push_str(text),
                Part::Param(value) => sql.push_str(&slot(value)),
                Part::Value { column, value } => {
                    sql.push_str(&driver.value_expression(&slot(value), column))
                }
                Part::Guarded { column, value } => sql.push_str(&driver.null_safe_assignment(
                    &column.name,
                    &slot(value),
                    column,
                )),
            }
        }
        sql
    }
}

pub fn delete(driver: DriverStrategy, table: &str, condition: Option<&str>) -> Statement {
    let mut statement = Statement::new(format!("DELETE FROM {}", driver.quote_ident(table)));
    if let Some(condition) = condition {
        statement.push_sql(format!(" WHERE {condition}"));
    }
    statement
}

/// `UPDATE` of one row by key; each assignment leaves NULL cells untouched.
pub fn update(
    driver: DriverStrategy,
    table: &str,
    key: &str,
    id: SqlValue,
    assignments: Vec<(&ColumnInfo, SqlValue)>,
) -> Statement {
    let mut statement = Statement::new(format!("UPDATE {} SET ", driver.quote_ident(table)));
    for (index, (column, value)) in assignments.into_iter().enumerate() {
        if index > 0 {
            statement.push_sql(", ");
        }
        statement.push_guarded(column, value);
    }
    statement
        .push_sql(format!(" WHERE {} = ", driver.quote_ident(key)))
        .push_param(id);
    statement
}

pub fn insert(driver: DriverStrategy, table: &str, values: Vec<(&ColumnInfo, SqlValue)>) -> Statement {
    let columns = values
        .iter()
        .map(|(column, _)| driver.quote_ident(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let mut statement = Statement::new(format!(
        "INSERT INTO {} ({columns}) VALUES (",
        driver.quote_ident(table)
    ));
    for (index, (column, value)) in values.into_iter().enumerate() {
        if index > 0 {
            statement.push_sql(", ");
        }
        statement.push_value(column, value);
    }
    statement.push_sql(")");
    statement
}
