//! Blocking API for mobile bindings
//!
//! Each call is a cold start: it opens the wallet directory and, except
//! for `login` and `has_session`, re-runs the credential gate before
//! touching the ledger. Errors cross the boundary as strings.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wallet_core::{
    format_money, parse_amount, SessionState, Transaction, WalletApp, WalletError, RECENT_LIMIT,
};

use crate::biometric::PlatformBiometrics;

/// Transaction row prepared for display
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionView {
    pub id: String,
    /// e.g. "Sent to Mom"
    pub title: String,
    /// Signed amount, e.g. "-$25.00"
    pub amount: String,
    pub note: Option<String>,
    /// Creation time in epoch milliseconds
    pub created_at_ms: i64,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        let sign = if tx.is_send() { "-" } else { "+" };
        Self {
            id: tx.id.clone(),
            title: tx.summary(),
            amount: format!("{}{}", sign, format_money(tx.amount)),
            note: tx.note.clone(),
            created_at_ms: tx.created_at.timestamp_millis(),
        }
    }
}

/// Balance plus the most recent activity
#[derive(Debug, Clone, PartialEq)]
pub struct WalletOverview {
    pub balance: String,
    pub recent: Vec<TransactionView>,
}

fn block_on<T, F>(task: F) -> Result<T, String>
where
    F: Future<Output = Result<T, WalletError>>,
{
    let rt = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    rt.block_on(task).map_err(|e| e.to_string())
}

async fn open_app(wallet_dir: &Path) -> Result<WalletApp, WalletError> {
    let biometrics = PlatformBiometrics::new(wallet_dir.to_string_lossy());
    WalletApp::open(wallet_dir, Arc::new(biometrics)).await
}

/// Open the wallet and require a restored session
async fn open_unlocked(wallet_dir: &Path) -> Result<WalletApp, WalletError> {
    let app = open_app(wallet_dir).await?;
    match app.restore().await? {
        SessionState::LoggedIn => Ok(app),
        SessionState::LoggedOut => Err(WalletError::NotAuthenticated),
    }
}

/// Check whether a session token is stored
///
/// A wallet directory without a store has no session; nothing is created.
pub fn has_session(wallet_dir: String) -> Result<bool, String> {
    block_on(async {
        let wallet_dir = PathBuf::from(wallet_dir);
        if !wallet_core::store_exists(&wallet_dir).await {
            return Ok(false);
        }
        let app = open_app(&wallet_dir).await?;
        app.gate().has_session().await
    })
}

/// Sign in; returns whether the biometric check was skipped
pub fn login(wallet_dir: String, email: String, pin: String) -> Result<bool, String> {
    block_on(async {
        let app = open_app(&PathBuf::from(wallet_dir)).await?;
        let presence = app.login(&email, &pin).await?;
        Ok(presence.skipped)
    })
}

pub fn logout(wallet_dir: String) -> Result<(), String> {
    block_on(async {
        let app = open_app(&PathBuf::from(wallet_dir)).await?;
        app.logout().await
    })
}

/// Formatted balance and the latest transactions
pub fn wallet_overview(wallet_dir: String) -> Result<WalletOverview, String> {
    block_on(async {
        let app = open_unlocked(&PathBuf::from(wallet_dir)).await?;
        let ledger = app.ledger().await?;
        let balance = ledger.load_balance().await?;
        let recent = ledger.recent(RECENT_LIMIT).await?;
        Ok(WalletOverview {
            balance: format_money(balance),
            recent: recent.iter().map(TransactionView::from).collect(),
        })
    })
}

/// Send money; returns the new transaction id
pub fn send_money(wallet_dir: String, to: String, amount: String, note: String) -> Result<String, String> {
    let amount = parse_amount(&amount).map_err(|e| e.to_string())?;
    let rt = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    rt.block_on(async {
        let app = open_unlocked(&PathBuf::from(wallet_dir))
            .await
            .map_err(|e| e.to_string())?;
        let ledger = app.ledger().await.map_err(|e| e.to_string())?;
        let tx = ledger
            .apply_transfer(&to, amount, Some(note.as_str()))
            .await
            .map_err(|e| e.to_string())?;
        Ok(tx.id)
    })
}

/// Full history, newest first
pub fn transaction_history(wallet_dir: String) -> Result<Vec<TransactionView>, String> {
    block_on(async {
        let app = open_unlocked(&PathBuf::from(wallet_dir)).await?;
        let history = app.ledger().await?.history().await?;
        Ok(history.iter().map(TransactionView::from).collect())
    })
}

/// Delete all simulated transactions and zero the balance
pub fn clear_history(wallet_dir: String) -> Result<(), String> {
    block_on(async {
        let app = open_unlocked(&PathBuf::from(wallet_dir)).await?;
        app.ledger().await?.clear_all().await
    })
}

/// Get the default wallet directory for the platform
pub fn default_wallet_dir() -> String {
    wallet_core::default_store_dir()
        .to_string_lossy()
        .to_string()
}
