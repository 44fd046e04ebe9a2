//! Core module - agent directory and routing.
//!
//! - Registry of live agents keyed by id
//! - Message routing with per-route delivery counts

pub mod registry;
pub mod routing;

pub use registry::{Registry, RegistryStats};
pub use routing::{route_key, RouteTable};
