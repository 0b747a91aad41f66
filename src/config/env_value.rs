// ABOUTME: Container environment values: literals or references to controller env vars.
// ABOUTME: References are resolved when an environment is built, right before a run.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(val),
                Err(_) => default
                    .clone()
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}

/// Resolve every value; the first missing variable aborts.
pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<HashMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

/// Shared values overlaid with per-environment ones.
pub fn merge_env(
    shared: &HashMap<String, EnvValue>,
    overrides: &HashMap<String, EnvValue>,
) -> HashMap<String, EnvValue> {
    let mut merged = shared.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
