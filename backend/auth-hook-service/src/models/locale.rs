use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Locales with a message catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Es,
    Fr,
    De,
    Pt,
}

impl Default for Locale {
    fn default() -> Self {
        Locale::En
    }
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Es => "es",
            Locale::Fr => "fr",
            Locale::De => "de",
            Locale::Pt => "pt",
        }
    }

    /// Resolve the first usable hint, falling back to `default`.
    ///
    /// Region subtags are ignored: `pt-BR` and `en_US` resolve to `pt` and `en`.
    pub fn resolve<'a, I>(hints: I, default: Locale) -> Locale
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        hints
            .into_iter()
            .flatten()
            .find_map(|hint| hint.parse().ok())
            .unwrap_or(default)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported locale: {0}")]
pub struct UnsupportedLocale(pub String);

impl FromStr for Locale {
    type Err = UnsupportedLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let primary = s
            .trim()
            .split(|c: char| c == '-' || c == '_')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match primary.as_str() {
            "en" => Ok(Locale::En),
            "es" => Ok(Locale::Es),
            "fr" => Ok(Locale::Fr),
            "de" => Ok(Locale::De),
            "pt" => Ok(Locale::Pt),
            _ => Err(UnsupportedLocale(s.to_string())),
        }
    }
}
