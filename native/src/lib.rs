//! Native bindings for the SendHome mobile shell and biometric support
//!
//! Exposes blocking wallet operations for FFI wrappers and provides the
//! platform biometric subsystem used by the credential gate

pub mod api;
pub mod biometric;

pub use api::*;
pub use biometric::*;
