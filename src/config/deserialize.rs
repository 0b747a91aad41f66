// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles app names, image refs, and server entries.

use serde::Deserialize;

use super::server::{Server, ServerEntry};
use crate::types::ImageRef;

/// Container-name safe: starts alphanumeric, then alphanumerics, `-`, `_` or `.`.
pub fn validate_app_name(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err("app name cannot be empty".to_string()),
        Some(c) if !c.is_ascii_alphanumeric() => {
            return Err(format!("app name must start with a letter or digit: {}", name));
        }
        Some(_) => {}
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))) {
        return Err(format!("invalid character {:?} in app name: {}", bad, name));
    }
    Ok(())
}

pub fn deserialize_app_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    validate_app_name(&s).map_err(serde::de::Error::custom)?;
    Ok(s)
}

pub fn deserialize_image_ref<'de, D>(deserializer: D) -> Result<ImageRef, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ImageRef::parse(&s).map_err(serde::de::Error::custom)
}

pub fn deserialize_server<'de, D>(deserializer: D) -> Result<Server, D::Error>
where
    D: serde::Deserializer<'de>,
{
    ServerEntry::deserialize(deserializer)?
        .into_server()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_names_follow_container_rules() {
        assert!(validate_app_name("shop").is_ok());
        assert!(validate_app_name("shop-api_v2.1").is_ok());
        assert!(validate_app_name("").is_err());
        assert!(validate_app_name("-shop").is_err());
        assert!(validate_app_name("shop/api").is_err());
    }
}
