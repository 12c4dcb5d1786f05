//! Synthetic value generation for Masquerade.
//!
//! Generators are named after their Faker counterparts (`firstName`,
//! `dateTimeBetween`, ...) and take positional parameters. The
//! [`ValueProvider`] keeps one seeded generator scope per entity, column and
//! uniqueness flag.

pub mod catalog;
pub mod guesser;
pub mod locale;
pub mod params;
pub mod provider;
pub mod validate;

pub use catalog::{Generator, GeneratorContext, GeneratorRegistry, GeneratorSpec, ValueKind};
pub use guesser::{GuessRule, Guesser};
pub use locale::Locale;
pub use params::Params;
pub use provider::{ProviderSettings, ScopeKey, ValueProvider};
pub use validate::validate_config;
