use std::fmt;

use masquerade_core::{Error, Result};

/// Locale used by locale-sensitive generators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Locale {
    #[default]
    EnUs,
    FrFr,
    PtBr,
}

impl Locale {
    pub const ALL: &'static [Locale] = &[Locale::EnUs, Locale::FrFr, Locale::PtBr];

    pub fn parse(value: &str) -> Result<Self> {
        match value.replace('-', "_").as_str() {
            "en_US" | "en" => Ok(Self::EnUs),
            "fr_FR" | "fr" => Ok(Self::FrFr),
            "pt_BR" | "pt" => Ok(Self::PtBr),
            _ => Err(Error::config(format!(
                "unsupported language '{value}' (expected one of: en_US, fr_FR, pt_BR)"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en_US",
            Self::FrFr => "fr_FR",
            Self::PtBr => "pt_BR",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
