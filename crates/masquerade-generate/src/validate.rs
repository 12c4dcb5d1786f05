use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use masquerade_core::{Config, EntityAction, Error, GeneratorParam, Result};

use crate::catalog::{GeneratorContext, GeneratorRegistry};
use crate::locale::Locale;
use crate::params::Params;

/// Check a loaded configuration against the generator catalog.
///
/// Every column must name a known generator, `unique` is refused for
/// generators that cannot honour it, and literal parameters are exercised
/// once so that type errors surface before any row is touched. All
/// problems are reported together.
pub fn validate_config(config: &Config, registry: &GeneratorRegistry) -> Result<()> {
    let mut problems = Vec::new();

    let locale = match Locale::parse(&config.language) {
        Ok(locale) => locale,
        Err(err) => {
            problems.push(err.to_string());
            Locale::default()
        }
    };
    for pattern in &config.entities_to_exclude {
        if let Err(err) = Regex::new(pattern) {
            problems.push(format!("entities_to_exclude pattern '{pattern}' is invalid: {err}"));
        }
    }

    let ctx = GeneratorContext {
        locale,
        now: Utc::now().naive_utc(),
    };
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    for (entity, entity_config) in config.entities.iter() {
        if entity_config.action == EntityAction::Update
            && entity_config.cols.is_empty()
            && !entity_config.delete
            && entity_config.pre_actions.is_empty()
            && entity_config.post_actions.is_empty()
        {
            warn!(event = "entity_noop", entity = %entity, "entity has nothing to do");
        }

        for (column, spec) in entity_config.cols.iter() {
            let Some(generator) = registry.get(&spec.generator) else {
                problems.push(format!(
                    "{entity}.{column}: unknown generator '{}'",
                    spec.generator
                ));
                continue;
            };
            if spec.unique && !generator.unique_capable() {
                problems.push(format!(
                    "{entity}.{column}: generator '{}' cannot produce unique values",
                    spec.generator
                ));
            }
            if spec.has_expressions() {
                continue;
            }
            let literals: Vec<Value> = spec
                .params
                .iter()
                .filter_map(|param| match param {
                    GeneratorParam::Literal(value) => Some(value.clone()),
                    GeneratorParam::Expression { .. } => None,
                })
                .collect();
            let params = Params::new(generator.name(), &literals);
            if let Err(err) = generator.generate(&ctx, &params, &mut rng) {
                problems.push(format!("{entity}.{column}: {}", plain_message(&err)));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::config(problems.join("; ")))
    }
}

fn plain_message(err: &Error) -> String {
    match err {
        Error::Configuration(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(yaml: &str) -> Config {
        Config::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn accepts_known_generators() {
        let config = load(
            r#"
entities:
  guestbook:
    cols:
      username: { generator: firstName, unique: true }
      created: { generator: dateTimeBetween, params: ["-1 year", "now"] }
      score: { generator: numberBetween, params: [{ expr: "1 + 1" }, 10] }
"#,
        );
        validate_config(&config, &GeneratorRegistry::with_defaults()).unwrap();
    }

    #[test]
    fn collects_every_problem() {
        let config = load(
            r#"
language: xx_XX
entities:
  users:
    cols:
      nick: { generator: nope }
      active: { generator: boolean, unique: true }
      born: { generator: dateTimeBetween, params: ["someday"] }
"#,
        );
        let err = validate_config(&config, &GeneratorRegistry::with_defaults()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("xx_XX"));
        assert!(message.contains("users.nick: unknown generator 'nope'"));
        assert!(message.contains("users.active"));
        assert!(message.contains("users.born"));
    }
}
