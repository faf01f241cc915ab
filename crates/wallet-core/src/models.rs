//! Data models for wallet records, the encrypted store envelope and config

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a transaction together with its counterparty
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money sent to someone
    Send {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
    /// Money received from someone
    Receive {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },
}

/// A single ledger record as persisted in the transactions key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier, never reused
    pub id: String,

    /// Send/receive plus counterparty
    #[serde(flatten)]
    pub kind: TransactionKind,

    /// Positive amount in the wallet currency
    pub amount: Decimal,

    /// Optional free-text note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Creation time, only used for display ordering
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new outgoing record stamped with the current time
    pub fn send(to: impl Into<String>, amount: Decimal, note: Option<String>) -> Self {
        Self {
            id: new_transaction_id(),
            kind: TransactionKind::Send { to: Some(to.into()) },
            amount,
            note,
            created_at: now_millis(),
        }
    }

    /// Create an incoming record with an explicit timestamp
    pub fn receive(
        from: impl Into<String>,
        amount: Decimal,
        note: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_transaction_id(),
            kind: TransactionKind::Receive { from: Some(from.into()) },
            amount,
            note,
            created_at: created_at.trunc_subsecs(3),
        }
    }

    pub fn is_send(&self) -> bool {
        matches!(self.kind, TransactionKind::Send { .. })
    }

    /// The other party, if one was recorded
    pub fn counterparty(&self) -> Option<&str> {
        match &self.kind {
            TransactionKind::Send { to } => to.as_deref(),
            TransactionKind::Receive { from } => from.as_deref(),
        }
    }

    /// Amount with the sign it has on the balance
    pub fn signed_amount(&self) -> Decimal {
        if self.is_send() {
            -self.amount
        } else {
            self.amount
        }
    }

    /// One-line description, e.g. "Sent to Mom"
    pub fn summary(&self) -> String {
        let who = self.counterparty().unwrap_or("—");
        if self.is_send() {
            format!("Sent to {}", who)
        } else {
            format!("Received from {}", who)
        }
    }
}

/// Sort records newest first by creation time
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Format an amount as dollars with two decimals
pub fn format_money(amount: Decimal) -> String {
    let value = amount.abs().round_dp(2);
    // Pad by hand: values near Decimal::MAX cannot be rescaled to two places
    let text = value.to_string();
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let sign = if amount.is_sign_negative() && !value.is_zero() { "-" } else { "" };
    format!("{}${}.{:0<2}", sign, whole, cents)
}

fn new_transaction_id() -> String {
    format!("tx_{}", Uuid::new_v4().simple())
}

// Stored timestamps have millisecond resolution
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Encrypted store file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedStore {
    /// Schema version for migrations
    pub version: u32,

    /// Argon2 salt (32 bytes)
    pub salt: [u8; 32],

    /// AES-GCM nonce (12 bytes)
    pub nonce: [u8; 12],

    /// Encrypted key-value map
    pub ciphertext: Vec<u8>,

    /// SHA-256 checksum of plaintext for integrity
    pub checksum: [u8; 32],
}

impl EncryptedStore {
    pub const CURRENT_VERSION: u32 = 1;
}

/// Wallet configuration (non-sensitive, stored in plaintext)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WalletConfig {
    /// Argon2 memory cost in KB
    pub argon2_memory_kb: u32,

    /// Argon2 iterations
    pub argon2_iterations: u32,

    /// Argon2 parallelism
    pub argon2_parallelism: u32,

    /// Balance written on first login when none is stored
    pub seed_balance: Decimal,

    /// Balance reported when the stored value is missing or unreadable
    pub fallback_balance: Decimal,

    /// Treat devices without biometric hardware or enrollment as verified
    pub allow_biometric_bypass: bool,

    /// Prompt shown by the platform biometric dialog
    pub biometric_prompt: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            argon2_memory_kb: 65536, // 64 MB
            argon2_iterations: 3,
            argon2_parallelism: 4,
            seed_balance: Decimal::new(25000, 2),
            fallback_balance: Decimal::new(25000, 2),
            allow_biometric_bypass: true,
            biometric_prompt: "Authenticate to open SendHome".to_string(),
        }
    }
}
