//! Error types for wallet operations

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the store, the credential gate and the app service
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Not signed in - log in first")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Biometric verification was denied")]
    BiometricDenied,

    #[error("Biometric subsystem error: {0}")]
    BiometricError(String),

    #[error("Secure store corrupted or tampered")]
    StoreCorrupted,

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Key derivation error: {0}")]
    KeyDerivationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Errors a transfer can be rejected with
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid transfer: {0}")]
    InvalidInput(String),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

pub type WalletResult<T> = Result<T, WalletError>;
pub type TransferResult<T> = Result<T, TransferError>;
