// ABOUTME: Engine capabilities the environment driver is written against.
// ABOUTME: Both traits are sealed; only the bollard engine and in-crate test doubles implement them.

mod container;
mod image;

pub use container::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerOps, ContainerSummary,
    PortMapping, RestartPolicyConfig,
};
pub use image::{ImageError, ImageOps};

/// Supertrait that keeps engine implementations inside the crate.
pub trait Sealed {}
