use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{NaiveDateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tracing::debug;

use masquerade_core::{Config, Error, Result, SqlValue};

use crate::catalog::{GeneratorContext, GeneratorRegistry};
use crate::locale::Locale;
use crate::params::Params;

/// Identifies one generator pool: entity, column and uniqueness flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub entity: String,
    pub column: String,
    pub unique: bool,
}

impl ScopeKey {
    pub fn new(entity: impl Into<String>, column: impl Into<String>, unique: bool) -> Self {
        Self {
            entity: entity.into(),
            column: column.into(),
            unique,
        }
    }

    fn seed_key(&self) -> String {
        let pool = if self.unique { "unique" } else { "plain" };
        format!("{}.{}.{pool}", self.entity, self.column)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.column)
    }
}

/// Run-level knobs for a [`ValueProvider`].
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub seed: u64,
    pub locale: Locale,
    /// Consecutive duplicate draws tolerated before a unique scope gives up.
    pub max_unique_attempts: u32,
    pub now: NaiveDateTime,
}

impl ProviderSettings {
    /// Settings from a loaded configuration; an absent seed is drawn from
    /// entropy.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            seed: config.seed.unwrap_or_else(rand::random),
            locale: Locale::parse(&config.language)?,
            max_unique_attempts: config.max_unique_attempts,
            now: Utc::now().naive_utc(),
        })
    }
}

struct GeneratorScope {
    rng: ChaCha8Rng,
    seen: Option<HashSet<String>>,
}

/// Produces column values, keeping one seeded pool per [`ScopeKey`].
///
/// Pools live as long as the provider; one provider serves one run.
pub struct ValueProvider {
    registry: GeneratorRegistry,
    settings: ProviderSettings,
    scopes: HashMap<ScopeKey, GeneratorScope>,
}

impl ValueProvider {
    pub fn new(registry: GeneratorRegistry, settings: ProviderSettings) -> Self {
        Self {
            registry,
            settings,
            scopes: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn context(&self) -> GeneratorContext {
        GeneratorContext {
            locale: self.settings.locale,
            now: self.settings.now,
        }
    }

    /// Produce the next value of `generator` for `scope`, truncated to
    /// `max_length` characters when the value is text.
    ///
    /// Unique scopes never return a value twice; after
    /// `max_unique_attempts` consecutive duplicates the call fails with
    /// [`Error::GeneratorExhausted`].
    pub fn value_for(
        &mut self,
        scope: &ScopeKey,
        generator: &str,
        params: &[Value],
        max_length: Option<u32>,
    ) -> Result<SqlValue> {
        let ctx = self.context();
        let seed = self.settings.seed;
        let max_attempts = self.settings.max_unique_attempts;
        let generator = self.registry.resolve(generator)?;
        if scope.unique && !generator.unique_capable() {
            return Err(Error::config(format!(
                "generator '{}' cannot produce unique values (column '{scope}')",
                generator.name()
            )));
        }

        let state = self.scopes.entry(scope.clone()).or_insert_with(|| {
            debug!(event = "generator_scope_created", scope = %scope, unique = scope.unique);
            GeneratorScope {
                rng: ChaCha8Rng::seed_from_u64(hash_seed(seed, &scope.seed_key())),
                seen: scope.unique.then(HashSet::new),
            }
        });
        let params = Params::new(generator.name(), params);

        let Some(seen) = state.seen.as_mut() else {
            let value = generator.generate(&ctx, &params, &mut state.rng)?;
            return Ok(value.truncated(max_length));
        };

        for _ in 0..max_attempts {
            let value = generator
                .generate(&ctx, &params, &mut state.rng)?
                .truncated(max_length);
            let key = value.to_plain_string().unwrap_or_default();
            if seen.insert(key) {
                return Ok(value);
            }
        }
        Err(Error::GeneratorExhausted {
            scope: scope.to_string(),
            generator: generator.name().to_string(),
            attempts: max_attempts,
        })
    }

    /// Number of values already handed out by a unique scope.
    pub fn unique_count(&self, scope: &ScopeKey) -> usize {
        self.scopes
            .get(scope)
            .and_then(|state| state.seen.as_ref())
            .map_or(0, HashSet::len)
    }
}

impl fmt::Debug for ValueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueProvider")
            .field("settings", &self.settings)
            .field("scopes", &self.scopes.len())
            .finish()
    }
}

/// FNV-1a over `key`, mixed with the run seed.
fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
