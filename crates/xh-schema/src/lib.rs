//! Shared types for xh.
//!
//! These are the plain values passed between the provisioning pipeline
//! (`xh-core`) and the command surface (`xh-cli`): which proxy core is
//! managed, and the protocol-agnostic descriptor produced for every
//! subscription node.

pub mod core_type;
pub mod node;

// Re-exports
pub use core_type::{CoreType, UnsupportedCoreType};
pub use node::{NodeDescriptor, NodeError, ProtocolKind};
