//! CLI command implementations

pub mod registry;
pub mod serve;

pub use registry::RegistryArgs;
pub use serve::ServeArgs;
