// ABOUTME: Validated domain types shared across the crate.
// ABOUTME: Image references, environment names, and engine container IDs.

mod environment_name;
mod id;
mod image_ref;

pub use environment_name::{EnvironmentName, EnvironmentNameError};
pub use id::ContainerId;
pub use image_ref::{ImageRef, MUTABLE_ALIAS, ParseImageRefError};
