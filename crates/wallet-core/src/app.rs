//! Wallet app service
//!
//! Owns the credential gate and the ledger for one process, runs the login
//! flow and keeps the ledger behind the session state.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{WalletError, WalletResult};
use crate::gate::{new_session_token, BiometricAuthenticator, CredentialGate, Presence, SessionState};
use crate::ledger::Ledger;
use crate::models::WalletConfig;
use crate::storage::{self, EncryptedFileStore, SecureStore};

/// Minimum PIN length accepted by the login form
pub const MIN_PIN_LENGTH: usize = 4;

pub struct WalletApp {
    gate: CredentialGate,
    ledger: Ledger,
    state: RwLock<SessionState>,
}

impl WalletApp {
    pub fn new(
        store: Arc<dyn SecureStore>,
        biometrics: Arc<dyn BiometricAuthenticator>,
        config: WalletConfig,
    ) -> Self {
        Self {
            gate: CredentialGate::new(store.clone(), biometrics, &config),
            ledger: Ledger::new(store, config),
            state: RwLock::new(SessionState::LoggedOut),
        }
    }

    /// Open the encrypted store in `base_dir` with the config kept there
    pub async fn open(
        base_dir: &Path,
        biometrics: Arc<dyn BiometricAuthenticator>,
    ) -> WalletResult<Self> {
        let config = storage::load_config(base_dir).await?;
        let store = EncryptedFileStore::open_with_device_secret(base_dir, &config).await?;
        Ok(Self::new(Arc::new(store), biometrics, config))
    }

    pub fn gate(&self) -> &CredentialGate {
        &self.gate
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Re-evaluate the session as on a cold start
    pub async fn restore(&self) -> WalletResult<SessionState> {
        let restored = self.gate.restore().await?;
        *self.state.write().await = restored;
        Ok(restored)
    }

    /// Sign in with an email and PIN, then verify presence
    pub async fn login(&self, email: &str, pin: &str) -> WalletResult<Presence> {
        if email.trim().is_empty() {
            return Err(WalletError::InvalidCredentials("email is required".to_string()));
        }
        if pin.trim().chars().count() < MIN_PIN_LENGTH {
            return Err(WalletError::InvalidCredentials(format!(
                "PIN must have at least {} digits",
                MIN_PIN_LENGTH
            )));
        }

        self.gate.begin_session(&new_session_token()).await?;

        let presence = self.gate.verify_presence().await;
        if !presence.granted {
            warn!("Login blocked by biometric check");
            *self.state.write().await = SessionState::LoggedOut;
            return Err(WalletError::BiometricDenied);
        }

        self.ledger.seed_if_empty().await?;
        *self.state.write().await = SessionState::LoggedIn;
        info!(biometric_skipped = presence.skipped, "Logged in");

        Ok(presence)
    }

    pub async fn logout(&self) -> WalletResult<()> {
        self.gate.end_session().await?;
        *self.state.write().await = SessionState::LoggedOut;
        info!("Logged out");
        Ok(())
    }

    /// The ledger, available only while logged in
    pub async fn ledger(&self) -> WalletResult<&Ledger> {
        match self.state().await {
            SessionState::LoggedIn => Ok(&self.ledger),
            SessionState::LoggedOut => Err(WalletError::NotAuthenticated),
        }
    }
}
