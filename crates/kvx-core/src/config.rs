//! Configuration loading: INI store settings and YAML key-pattern tables.

use crate::key::PatternLabel;
use crate::KvxError;
use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store connection settings, `[redis_connection]` (or legacy `[redis]`)
/// section of `config.ini`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Store host name
    pub host: String,

    /// Store port
    pub port: u16,

    /// Whether the client should decode responses to text. Carried for
    /// config compatibility; the adapter always fetches type-aware.
    pub decode_responses: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            decode_responses: true,
        }
    }
}

/// Extractor settings, `[extractor]` section of `config.ini`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorSettings {
    /// Logical database index to extract
    pub database: i64,

    /// Keys per SCAN page and per value-fetch pipeline
    pub batch_size: usize,

    /// Also write the per-entity schema variations file
    pub export_variations: bool,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            database: 0,
            batch_size: 1000,
            export_variations: false,
        }
    }
}

/// Load both settings blocks from an INI file.
///
/// Individual keys fall back to defaults, but a config file without any
/// connection section is rejected before the store is touched.
pub fn load_settings(path: &Path) -> Result<(StoreSettings, ExtractorSettings), KvxError> {
    let path_str = path.to_string_lossy();
    let cfg = Config::builder()
        .add_source(File::new(path_str.as_ref(), FileFormat::Ini))
        .build()
        .map_err(|e| KvxError::Config(format!("{}: {}", path_str, e)))?;

    let section = if cfg.get_table("redis_connection").is_ok() {
        "redis_connection"
    } else if cfg.get_table("redis").is_ok() {
        "redis"
    } else {
        return Err(KvxError::Config(format!(
            "section redis_connection not found in {}",
            path_str
        )));
    };

    let defaults = StoreSettings::default();
    let store = StoreSettings {
        host: cfg
            .get_string(&format!("{}.host", section))
            .unwrap_or(defaults.host),
        port: cfg
            .get_int(&format!("{}.port", section))
            .map(|p| p as u16)
            .unwrap_or(defaults.port),
        decode_responses: cfg
            .get_bool(&format!("{}.decode_responses", section))
            .unwrap_or(defaults.decode_responses),
    };

    let defaults = ExtractorSettings::default();
    let extractor = ExtractorSettings {
        database: cfg.get_int("extractor.database").unwrap_or(defaults.database),
        batch_size: cfg
            .get_int("extractor.batch_size")
            .map(|b| b as usize)
            .unwrap_or(defaults.batch_size),
        export_variations: cfg
            .get_bool("extractor.export_variations")
            .unwrap_or(defaults.export_variations),
    };

    Ok((store, extractor))
}

/// One labelled key template, e.g. `User:{id}:{property}` -> `Prop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub pattern: String,
    pub label: PatternLabel,
}

/// The `patterns.yaml` file: an ordered list of labelled templates.
/// Declaration order is the match order; the first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternsSpec {
    pub patterns: Vec<PatternSpec>,
}

impl PatternsSpec {
    pub fn load(path: &Path) -> Result<Self, KvxError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| KvxError::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text)
            .map_err(|e| KvxError::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_yaml_parses_labels() {
        let spec: PatternsSpec = serde_yaml::from_str(
            "patterns:\n  - pattern: \"{entity}:{id}:{property}\"\n    label: Prop\n  - pattern: \"{entity}:{id}:{property}[{index}]\"\n    label: Arr\n",
        )
        .expect("valid yaml");
        assert_eq!(spec.patterns.len(), 2);
        assert_eq!(spec.patterns[0].label, PatternLabel::Prop);
        assert_eq!(spec.patterns[1].label, PatternLabel::Arr);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let parsed: Result<PatternsSpec, _> =
            serde_yaml::from_str("patterns:\n  - pattern: \"{entity}\"\n    label: Wild\n");
        assert!(parsed.is_err());
    }
}
