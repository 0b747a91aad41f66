// ABOUTME: DNS-compatible environment name validation.
// ABOUTME: Names key deployment records, locks, and container labels.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvironmentNameError {
    #[error("environment name cannot be empty")]
    Empty,

    #[error("environment name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("environment name cannot start or end with a hyphen")]
    EdgeHyphen,

    #[error("environment name must be lowercase")]
    NotLowercase,

    #[error("invalid character in environment name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentName(String);

impl EnvironmentName {
    pub fn new(value: &str) -> Result<Self, EnvironmentNameError> {
        if value.is_empty() {
            return Err(EnvironmentNameError::Empty);
        }

        if value.len() > 63 {
            return Err(EnvironmentNameError::TooLong);
        }

        if value.starts_with('-') || value.ends_with('-') {
            return Err(EnvironmentNameError::EdgeHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(EnvironmentNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(EnvironmentNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn staging() -> Self {
        Self("staging".to_string())
    }

    pub fn production() -> Self {
        Self("production".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for EnvironmentName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EnvironmentName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EnvironmentName::new(&s).map_err(serde::de::Error::custom)
    }
}
