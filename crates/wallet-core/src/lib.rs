//! Wallet Core - Local ledger and credential gate for SendHome
//!
//! This crate provides:
//! - A `SecureStore` abstraction with an AES-256-GCM encrypted file backend
//! - Argon2id key derivation from a per-device secret
//! - The ledger (balance + transaction log) with serialised, atomic updates
//! - The credential gate (session token + biometric presence check)

pub mod models;
pub mod crypto;
pub mod storage;
pub mod ledger;
pub mod gate;
pub mod app;
pub mod error;

pub use models::*;
pub use crypto::*;
pub use storage::*;
pub use ledger::*;
pub use gate::*;
pub use app::*;
pub use error::*;
