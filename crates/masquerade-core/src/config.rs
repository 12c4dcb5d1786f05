//! Anonymization configuration.
//!
//! The YAML layout mirrors one entry per table under `entities`, each
//! naming an action, optional delete, and the columns to rewrite:
//!
//! ```yaml
//! language: en_US
//! entities:
//!   guestbook:
//!     action: update
//!     cols:
//!       username: { generator: firstName }
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

pub const DEFAULT_LANGUAGE: &str = "en_US";
pub const DEFAULT_MAX_UNIQUE_ATTEMPTS: u32 = 10_000;

/// Parsed configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Locale used by locale-aware generators.
    #[serde(default = "default_language")]
    pub language: String,
    /// Seed for deterministic generation; entropy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Attempts a unique scope makes before giving up on a value.
    #[serde(default = "default_max_unique_attempts")]
    pub max_unique_attempts: u32,
    /// Table name patterns skipped by the config generator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities_to_exclude: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub entities: OrderedMap<EntityConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: default_language(),
            seed: None,
            max_unique_attempts: DEFAULT_MAX_UNIQUE_ATTEMPTS,
            entities_to_exclude: Vec::new(),
            entities: OrderedMap::default(),
        }
    }
}

/// Row action applied to an entity besides deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityAction {
    #[default]
    Update,
    Insert,
}

/// Configuration of one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    #[serde(default)]
    pub action: EntityAction,
    #[serde(default)]
    pub delete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_where: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cols: OrderedMap<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_actions: Vec<String>,
    /// Row cap; `0` means no cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl EntityConfig {
    /// Non-empty delete condition, if any.
    pub fn delete_condition(&self) -> Option<&str> {
        self.delete_where
            .as_deref()
            .map(str::trim)
            .filter(|condition| !condition.is_empty())
    }

    pub fn effective_limit(&self) -> Option<u64> {
        self.limit.filter(|limit| *limit > 0)
    }
}

/// Generator assignment for one column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    #[serde(alias = "method")]
    pub generator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<GeneratorParam>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl ColumnSpec {
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            params: Vec::new(),
            unique: false,
        }
    }

    pub fn has_expressions(&self) -> bool {
        self.params
            .iter()
            .any(|param| matches!(param, GeneratorParam::Expression { .. }))
    }
}

/// A generator argument: a literal, or `{ expr: "..." }` evaluated once per
/// entity before rows are processed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GeneratorParam {
    Expression { expr: String },
    Literal(JsonValue),
}

impl Config {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            Error::config(format!("cannot read config '{}': {err}", path.display()))
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Look up an entity, failing with a configuration error naming it.
    pub fn entity(&self, name: &str) -> Result<&EntityConfig> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::config(format!("entity '{name}' is not configured")))
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// Check internal consistency. Cross-references against the live schema
    /// happen when an entity is processed.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.max_unique_attempts == 0 {
            problems.push("max_unique_attempts must be greater than 0".to_string());
        }

        for (name, entity) in self.entities.iter() {
            if entity.delete_condition().is_some() && !entity.delete {
                problems.push(format!(
                    "entity '{name}': delete_where requires delete: true"
                ));
            }
            if entity.action == EntityAction::Insert && entity.cols.is_empty() {
                problems.push(format!(
                    "entity '{name}': insert requires at least one column"
                ));
            }
            for (column, spec) in entity.cols.iter() {
                if column.trim().is_empty() {
                    problems.push(format!("entity '{name}': empty column name"));
                }
                if spec.generator.trim().is_empty() {
                    problems.push(format!(
                        "entity '{name}', column '{column}': generator is required"
                    ));
                }
            }
            for action in entity.pre_actions.iter().chain(&entity.post_actions) {
                if action.trim().is_empty() {
                    problems.push(format!("entity '{name}': empty pre/post action"));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::config(problems.join("; ")))
        }
    }
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_max_unique_attempts() -> u32 {
    DEFAULT_MAX_UNIQUE_ATTEMPTS
}

/// String-keyed map that keeps the order entries were written in.
pub type OrderedMap<V> = IndexMap<String, V>;

/// A bare `key:` with no entries reads as an empty map.
fn null_as_empty<'de, D, V>(deserializer: D) -> std::result::Result<OrderedMap<V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    Ok(Option::<OrderedMap<V>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUESTBOOK: &str = r#"
language: en_US
seed: 7
entities:
  guestbook:
    cols:
      username: { method: firstName }
      created: { generator: dateTimeBetween, params: ["-10 years", "now"] }
      token: { generator: numberBetween, params: [1, { expr: "1 + 1" }], unique: true }
  audit:
    action: insert
    limit: 20
    cols:
      message: { generator: sentence }
"#;

    #[test]
    fn parses_entities_in_declared_order() {
        let config = Config::from_yaml_str(GUESTBOOK).expect("valid config");
        assert_eq!(config.entity_names(), vec!["guestbook", "audit"]);
        let guestbook = config.entity("guestbook").expect("entity");
        let columns: Vec<&str> = guestbook.cols.keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["username", "created", "token"]);
        assert_eq!(guestbook.action, EntityAction::Update);
        assert_eq!(config.max_unique_attempts, DEFAULT_MAX_UNIQUE_ATTEMPTS);
    }

    #[test]
    fn separates_expression_params_from_literals() {
        let config = Config::from_yaml_str(GUESTBOOK).expect("valid config");
        let token = config
            .entity("guestbook")
            .and_then(|entity| {
                entity
                    .cols
                    .get("token")
                    .ok_or_else(|| Error::config("missing"))
            })
            .expect("token column");
        assert!(token.unique);
        assert!(token.has_expressions());
        assert_eq!(
            token.params[1],
            GeneratorParam::Expression {
                expr: "1 + 1".to_string()
            }
        );
        assert_eq!(token.params[0], GeneratorParam::Literal(serde_json::json!(1)));
    }

    #[test]
    fn rejects_delete_where_without_delete() {
        let yaml = r#"
entities:
  guestbook:
    delete_where: "username = 'joe'"
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("delete_where requires delete"));
    }

    #[test]
    fn rejects_insert_without_columns() {
        let yaml = r#"
entities:
  audit:
    action: insert
"#;
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn unknown_entity_is_a_configuration_error() {
        let config = Config::default();
        let err = config.entity("missing").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn zero_limit_means_no_cap() {
        let entity = EntityConfig {
            limit: Some(0),
            ..EntityConfig::default()
        };
        assert_eq!(entity.effective_limit(), None);
    }

    #[test]
    fn serializes_back_in_order() {
        let config = Config::from_yaml_str(GUESTBOOK).expect("valid config");
        let yaml = config.to_yaml_string().expect("yaml");
        let guestbook = yaml.find("guestbook").expect("guestbook present");
        let audit = yaml.find("audit").expect("audit present");
        assert!(guestbook < audit);
        let reparsed = Config::from_yaml_str(&yaml).expect("round trip");
        assert_eq!(reparsed, config);
    }

    #[test]
    fn bare_sections_read_as_empty() {
        let config = Config::from_yaml_str("entities:\n  audit:\n    delete: true\n    cols:\n")
            .expect("valid config");
        assert!(config.entity("audit").expect("entity").cols.is_empty());
        let config = Config::from_yaml_str("entities:\n").expect("valid config");
        assert!(config.entities.is_empty());
    }
}
