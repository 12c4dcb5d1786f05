use regex::Regex;
use tracing::{debug, info, warn};

use masquerade_core::{Config, EntityConfig, Error, OrderedMap, Result};
use masquerade_generate::Guesser;
use masquerade_introspect::SchemaIntrospector;

/// Builds a starting configuration from a live schema.
///
/// Every table gets an `update` entity whose columns are whatever the
/// [`Guesser`] proposes. Primary keys are never rewritten; tables matching
/// an exclusion pattern, without a usable primary key, or without a single
/// guessable column are left out.
pub struct ConfigGenerator<'a> {
    introspector: &'a dyn SchemaIntrospector,
    guesser: Guesser,
}

impl<'a> ConfigGenerator<'a> {
    pub fn new(introspector: &'a dyn SchemaIntrospector, guesser: Guesser) -> Self {
        Self {
            introspector,
            guesser,
        }
    }

    /// Fill `base.entities` from the schema, keeping its other settings.
    pub async fn generate(&self, base: Config) -> Result<Config> {
        let exclude = base
            .entities_to_exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| {
                    Error::config(format!("entities_to_exclude pattern '{pattern}' is invalid: {err}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut entities = OrderedMap::new();
        for table in self.introspector.list_tables().await? {
            if exclude.iter().any(|pattern| pattern.is_match(&table)) {
                debug!(event = "table_excluded", table = %table);
                continue;
            }
            let schema = match self.introspector.table_schema(&table).await {
                Ok(schema) => schema,
                Err(err @ Error::Schema { .. }) => {
                    warn!(event = "table_skipped", table = %table, error = %err);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let mut entity = EntityConfig::default();
            for column in &schema.columns {
                if column.name == schema.primary_key {
                    continue;
                }
                if let Some(spec) = self.guesser.guess(column) {
                    entity.cols.insert(column.name.clone(), spec);
                }
            }
            if entity.cols.is_empty() {
                debug!(event = "table_without_guesses", table = %table);
                continue;
            }
            entities.insert(table, entity);
        }

        info!(event = "config_generated", entities = entities.len());
        Ok(Config { entities, ..base })
    }
}
