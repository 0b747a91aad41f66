// ABOUTME: Container engine access for environment hosts.
// ABOUTME: Detection, connection (local or SSH-forwarded), and capability traits.

mod detection;
mod engine;
mod error;
mod traits;
mod types;

pub use detection::{DetectionError, detect_local, detect_runtime};
pub use engine::{BollardRuntime, connect_local, connect_via_session};
pub use error::{ConnectError, RuntimeError, RuntimeErrorKind};
pub use traits::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerOps, ContainerSummary, ImageError,
    ImageOps, PortMapping, RestartPolicyConfig,
};
pub(crate) use traits::Sealed;
pub use types::{EngineOverride, RuntimeInfo, RuntimeType};
