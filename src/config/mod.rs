use crate::bean::BeanScope;
use dashmap::DashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

pub const COMPLEX_MAPPING_THRESHOLD: &str = "MESHDISPATCH_COMPLEX_MAPPING_THRESHOLD";
pub const DEFAULT_SCOPE: &str = "MESHDISPATCH_DEFAULT_SCOPE";
pub const MAX_BODY_BYTES: &str = "MESHDISPATCH_MAX_BODY_BYTES";
pub const LOG_ARGUMENT_TYPES: &str = "MESHDISPATCH_LOG_ARGUMENT_TYPES";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// A service preloaded with the process environment.
    pub fn new() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parses the value under `key`. Unparsable values are logged and treated
    /// as absent.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
                None
            }
        }
    }

    pub fn get_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get_parsed(key).unwrap_or(default)
    }
}

/// Registration-time settings of the execution pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Combined predicate cost above which interceptors sharing a predicate
    /// evaluate it once per request.
    pub complex_mapping_threshold: usize,
    /// Scope of routes registered without a bean definition.
    pub default_scope: BeanScope,
    /// Request body limit of [`RouteService`](crate::service::RouteService).
    pub max_body_bytes: usize,
    /// Include resolved argument types in illegal-argument errors.
    pub log_argument_types: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            complex_mapping_threshold: 8,
            default_scope: BeanScope::Singleton,
            max_body_bytes: 2 * 1024 * 1024,
            log_argument_types: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &ConfigService) -> Self {
        let defaults = Self::default();
        Self {
            complex_mapping_threshold: config.get_or(COMPLEX_MAPPING_THRESHOLD, defaults.complex_mapping_threshold),
            default_scope: config.get_or(DEFAULT_SCOPE, defaults.default_scope),
            max_body_bytes: config.get_or(MAX_BODY_BYTES, defaults.max_body_bytes),
            log_argument_types: config.get_or(LOG_ARGUMENT_TYPES, defaults.log_argument_types),
        }
    }

    pub fn from_env() -> Self {
        Self::from_config(&ConfigService::new())
    }
}
