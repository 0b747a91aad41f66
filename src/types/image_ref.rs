// ABOUTME: Immutable image reference: registry host, repository, and tag.
// ABOUTME: Renders as host/repo:tag and distinguishes content tags from the mutable alias.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// The tag that registries move between builds.
pub const MUTABLE_ALIAS: &str = "latest";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("image reference is missing a registry host: {0}")]
    MissingRegistry(String),

    #[error("image reference is missing a repository: {0}")]
    MissingRepository(String),

    #[error("image reference is missing a tag: {0}")]
    MissingTag(String),

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),
}

/// Identity of a deployable build.
///
/// Equality is structural. Two references denote the same build only when
/// their tags match exactly, so the controller always deploys by the
/// content-derived tag and never by [`MUTABLE_ALIAS`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: String,
    repository: String,
    tag: String,
}

impl ImageRef {
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, ParseImageRefError> {
        let registry = registry.into();
        let repository = repository.into();
        let tag = tag.into();

        let rendered = format!("{}/{}:{}", registry, repository, tag);
        if registry.trim().is_empty() {
            return Err(ParseImageRefError::MissingRegistry(rendered));
        }
        if repository.trim().is_empty() {
            return Err(ParseImageRefError::MissingRepository(rendered));
        }
        if tag.trim().is_empty() {
            return Err(ParseImageRefError::MissingTag(rendered));
        }

        for c in registry.chars().chain(repository.chars()).chain(tag.chars()) {
            if !c.is_ascii_alphanumeric() && !matches!(c, '/' | ':' | '.' | '-' | '_') {
                return Err(ParseImageRefError::InvalidChar(c));
            }
        }
        // The rendering splits the registry at the first `/` and the tag at
        // the last `:`, so neither may carry those separators.
        if registry.contains('/') {
            return Err(ParseImageRefError::InvalidChar('/'));
        }
        if let Some(c) = tag.chars().find(|c| matches!(c, '/' | ':')) {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        Ok(Self {
            registry,
            repository,
            tag,
        })
    }

    /// Parse the canonical `host/repo:tag` rendering.
    ///
    /// The registry is everything before the first `/`. The tag follows the
    /// last `:` after the last `/`, so registry ports (`host:5000/app:v1`)
    /// are preserved.
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        let (registry, rest) = input
            .split_once('/')
            .ok_or_else(|| ParseImageRefError::MissingRegistry(input.to_string()))?;

        let (repository, tag) = rest
            .rsplit_once(':')
            .filter(|(_, tag)| !tag.contains('/'))
            .ok_or_else(|| ParseImageRefError::MissingTag(input.to_string()))?;

        Self::new(registry, repository, tag)
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Same registry and repository, different tag.
    pub fn with_tag(&self, tag: &str) -> Result<Self, ParseImageRefError> {
        Self::new(self.registry.as_str(), self.repository.as_str(), tag)
    }

    /// Whether the tag is the registry's moving alias rather than a build tag.
    pub fn is_mutable_alias(&self) -> bool {
        self.tag == MUTABLE_ALIAS
    }

    /// Exact, case-sensitive comparison. No normalization is applied.
    pub fn is_same_build(&self, other: &ImageRef) -> bool {
        self == other
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl std::str::FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ImageRef::parse(&s).map_err(serde::de::Error::custom)
    }
}
