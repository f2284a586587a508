//! Application configuration.
//!
//! Values come from the environment (a `.env` file is loaded first when
//! present), with defaults matching the interactive tool:
//!
//! | Variable                    | Default                   |
//! |-----------------------------|---------------------------|
//! | `CLASSIFIER_PORT`           | `3000`                    |
//! | `CLASSIFIER_SEPARATOR`      | `" OR "`                  |
//! | `CLASSIFIER_OUTPUT_NAME`    | `classified_result.xlsx`  |
//! | `CLASSIFIER_MAX_UPLOAD_MB`  | `100`                     |
//! | `CLASSIFIER_CACHE_ENTRIES`  | `32`                      |
//!
//! CLI flags override these values.

use std::env;
use std::str::FromStr;

use crate::api::logs::log_warning;

/// Separator placed between joined values.
pub const DEFAULT_SEPARATOR: &str = " OR ";

/// File name offered for the downloaded workbook.
pub const DEFAULT_OUTPUT_NAME: &str = "classified_result.xlsx";

pub const DEFAULT_PORT: u16 = 3000;

/// Upload ceiling, in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;

pub const DEFAULT_CACHE_ENTRIES: usize = 32;

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub separator: String,
    pub output_name: String,
    pub max_upload_bytes: usize,
    /// Zero disables the result cache.
    pub cache_entries: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            separator: DEFAULT_SEPARATOR.to_string(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            cache_entries: DEFAULT_CACHE_ENTRIES,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_upload_mb = parse_or(&lookup, "CLASSIFIER_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB);

        Self {
            port: parse_or(&lookup, "CLASSIFIER_PORT", defaults.port),
            // Taken verbatim: an empty or space-padded separator is meaningful.
            separator: lookup("CLASSIFIER_SEPARATOR").unwrap_or(defaults.separator),
            output_name: lookup("CLASSIFIER_OUTPUT_NAME")
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.output_name),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            cache_entries: parse_or(&lookup, "CLASSIFIER_CACHE_ENTRIES", defaults.cache_entries),
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log_warning(format!("Ignoring invalid {}={:?}, using {}", key, raw, default));
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[]));

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.separator, " OR ");
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CLASSIFIER_PORT", "8080"),
            ("CLASSIFIER_SEPARATOR", "; "),
            ("CLASSIFIER_OUTPUT_NAME", "out.xlsx"),
            ("CLASSIFIER_MAX_UPLOAD_MB", "5"),
            ("CLASSIFIER_CACHE_ENTRIES", "0"),
        ]));

        assert_eq!(config.port, 8080);
        assert_eq!(config.separator, "; ");
        assert_eq!(config.output_name, "out.xlsx");
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.cache_entries, 0);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = AppConfig::from_lookup(lookup(&[("CLASSIFIER_PORT", "http")]));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_empty_separator_kept() {
        let config = AppConfig::from_lookup(lookup(&[("CLASSIFIER_SEPARATOR", "")]));
        assert_eq!(config.separator, "");
    }
}
