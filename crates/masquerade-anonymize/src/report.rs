use serde::Serialize;

use crate::engine::Mode;

/// What one entity run did, or would have done when pretending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub entity: String,
    pub mode: Mode,
    pub pretend: bool,
    /// SQL built for the run, with values inlined. Empty unless collection
    /// was requested.
    pub statements: Vec<String>,
    pub rows_updated: u64,
    pub rows_inserted: u64,
    /// `None` when nothing was deleted or the delete did not run.
    pub rows_deleted: Option<u64>,
    pub duration_ms: u64,
    #[serde(skip)]
    collect_sql: bool,
}

impl ExecutionReport {
    pub fn new(entity: impl Into<String>, mode: Mode, pretend: bool, collect_sql: bool) -> Self {
        Self {
            entity: entity.into(),
            mode,
            pretend,
            statements: Vec::new(),
            rows_updated: 0,
            rows_inserted: 0,
            rows_deleted: None,
            duration_ms: 0,
            collect_sql,
        }
    }

    pub fn collects_sql(&self) -> bool {
        self.collect_sql
    }

    pub fn record(&mut self, sql: impl FnOnce() -> String) {
        if self.collect_sql {
            self.statements.push(sql());
        }
    }

    pub fn rows_processed(&self) -> u64 {
        self.rows_updated + self.rows_inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_only_when_collecting() {
        let mut quiet = ExecutionReport::new("users", Mode::Queries, false, false);
        quiet.record(|| "DELETE FROM users".to_string());
        assert!(quiet.statements.is_empty());

        let mut report = ExecutionReport::new("users", Mode::Queries, true, true);
        report.record(|| "DELETE FROM users".to_string());
        assert_eq!(report.statements, vec!["DELETE FROM users".to_string()]);
    }

    #[test]
    fn serializes_without_internal_flags() {
        let report = ExecutionReport::new("users", Mode::Batch, true, true);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "batch");
        assert!(json.get("collect_sql").is_none());
    }
}
