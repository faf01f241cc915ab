//! Credential gate: session token plus biometric presence check
//!
//! Entry to the wallet needs a stored token and a granted presence check.
//! Devices without biometric hardware or enrollment skip the check when
//! `allow_biometric_bypass` is set, which is the default.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::WalletResult;
use crate::models::WalletConfig;
use crate::storage::{SecureStore, TOKEN_KEY};

/// Platform biometric subsystem
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    /// Whether the device has a fingerprint/face sensor
    async fn has_hardware(&self) -> WalletResult<bool>;

    /// Whether a biometric is enrolled on the device
    async fn is_enrolled(&self) -> WalletResult<bool>;

    /// Run the prompt; `Ok(false)` on failure or cancellation
    async fn authenticate(&self, prompt: &str) -> WalletResult<bool>;
}

/// Outcome of a presence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    /// Whether access is granted
    pub granted: bool,
    /// Whether the check was bypassed for lack of hardware or enrollment
    pub skipped: bool,
}

impl Presence {
    const DENIED: Presence = Presence { granted: false, skipped: false };
}

/// Login state of the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    LoggedOut,
    LoggedIn,
}

/// Generate a fresh opaque session token
pub fn new_session_token() -> String {
    format!("token_{}", Uuid::new_v4().simple())
}

pub struct CredentialGate {
    store: Arc<dyn SecureStore>,
    biometrics: Arc<dyn BiometricAuthenticator>,
    allow_bypass: bool,
    prompt: String,
}

impl CredentialGate {
    pub fn new(
        store: Arc<dyn SecureStore>,
        biometrics: Arc<dyn BiometricAuthenticator>,
        config: &WalletConfig,
    ) -> Self {
        Self {
            store,
            biometrics,
            allow_bypass: config.allow_biometric_bypass,
            prompt: config.biometric_prompt.clone(),
        }
    }

    /// True iff a token is stored
    pub async fn has_session(&self) -> WalletResult<bool> {
        Ok(self
            .store
            .get_item(TOKEN_KEY)
            .await?
            .is_some_and(|token| !token.is_empty()))
    }

    pub async fn begin_session(&self, token: &str) -> WalletResult<()> {
        self.store.set_item(TOKEN_KEY, token.to_string()).await
    }

    pub async fn end_session(&self) -> WalletResult<()> {
        self.store.delete_item(TOKEN_KEY).await
    }

    /// Run the biometric check. Errors from the platform count as denial.
    pub async fn verify_presence(&self) -> Presence {
        match self.check_presence().await {
            Ok(presence) => presence,
            Err(e) => {
                warn!(error = %e, "Biometric check failed, denying access");
                Presence::DENIED
            }
        }
    }

    async fn check_presence(&self) -> WalletResult<Presence> {
        let has_hardware = self.biometrics.has_hardware().await?;
        let enrolled = has_hardware && self.biometrics.is_enrolled().await?;

        if !enrolled {
            if self.allow_bypass {
                debug!(has_hardware, "No usable biometric, bypassing presence check");
                return Ok(Presence { granted: true, skipped: true });
            }
            debug!(has_hardware, "No usable biometric and bypass disabled");
            return Ok(Presence::DENIED);
        }

        let granted = self.biometrics.authenticate(&self.prompt).await?;
        Ok(Presence { granted, skipped: false })
    }

    /// Cold-start evaluation: token first, then the biometric check
    pub async fn restore(&self) -> WalletResult<SessionState> {
        if !self.has_session().await? {
            return Ok(SessionState::LoggedOut);
        }

        if self.verify_presence().await.granted {
            Ok(SessionState::LoggedIn)
        } else {
            Ok(SessionState::LoggedOut)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBiometrics;
    use super::*;
    use crate::error::WalletError;
    use crate::storage::MemoryStore;

    fn gate(biometrics: FakeBiometrics, allow_bypass: bool) -> (Arc<FakeBiometrics>, CredentialGate) {
        let biometrics = Arc::new(biometrics);
        let config = WalletConfig {
            allow_biometric_bypass: allow_bypass,
            ..WalletConfig::default()
        };
        let gate = CredentialGate::new(Arc::new(MemoryStore::new()), biometrics.clone(), &config);
        (biometrics, gate)
    }

    #[tokio::test]
    async fn test_session_token_lifecycle() {
        let (_bio, gate) = gate(FakeBiometrics::new(true, true, true), true);
        assert!(!gate.has_session().await.unwrap());

        gate.begin_session(&new_session_token()).await.unwrap();
        assert!(gate.has_session().await.unwrap());

        gate.end_session().await.unwrap();
        assert!(!gate.has_session().await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_without_token_skips_biometrics() {
        let (bio, gate) = gate(FakeBiometrics::new(true, true, true), true);

        assert_eq!(gate.restore().await.unwrap(), SessionState::LoggedOut);
        assert_eq!(bio.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_restore_with_token_and_granted_check() {
        let (bio, gate) = gate(FakeBiometrics::new(true, true, true), true);
        gate.begin_session("token_1").await.unwrap();

        assert_eq!(gate.restore().await.unwrap(), SessionState::LoggedIn);
        assert_eq!(gate.restore().await.unwrap(), SessionState::LoggedIn);
        // The prompt runs on every cold start
        assert_eq!(bio.prompt_count(), 2);
    }

    #[tokio::test]
    async fn test_restore_with_token_and_denied_check() {
        let (_bio, gate) = gate(FakeBiometrics::new(true, true, false), true);
        gate.begin_session("token_1").await.unwrap();

        assert_eq!(gate.restore().await.unwrap(), SessionState::LoggedOut);
        assert!(gate.has_session().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_hardware_is_bypassed() {
        let (bio, gate) = gate(FakeBiometrics::new(false, false, false), true);

        let presence = gate.verify_presence().await;
        assert_eq!(presence, Presence { granted: true, skipped: true });
        assert_eq!(bio.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_enrollment_is_bypassed() {
        let (_bio, gate) = gate(FakeBiometrics::new(true, false, false), true);
        assert!(gate.verify_presence().await.skipped);
    }

    #[tokio::test]
    async fn test_bypass_can_be_disabled() {
        let (_bio, gate) = gate(FakeBiometrics::new(false, false, true), false);

        let presence = gate.verify_presence().await;
        assert!(!presence.granted);
        assert!(!presence.skipped);
    }

    #[tokio::test]
    async fn test_platform_error_is_denial() {
        let (bio, gate) = gate(FakeBiometrics::failing(), true);
        gate.begin_session("token_1").await.unwrap();

        assert!(!gate.verify_presence().await.granted);
        assert_eq!(gate.restore().await.unwrap(), SessionState::LoggedOut);
        assert_eq!(bio.prompt_count(), 2);
    }

    #[tokio::test]
    async fn test_lookup_error_is_denial_even_with_bypass() {
        let (bio, gate) = gate(FakeBiometrics::failing_lookup(), true);
        gate.begin_session("token_1").await.unwrap();

        assert_eq!(gate.verify_presence().await, Presence::DENIED);
        assert_eq!(gate.restore().await.unwrap(), SessionState::LoggedOut);
        assert_eq!(bio.prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_enrollment_error_is_denial() {
        struct EnrollmentFails;

        #[async_trait]
        impl BiometricAuthenticator for EnrollmentFails {
            async fn has_hardware(&self) -> WalletResult<bool> {
                Ok(true)
            }

            async fn is_enrolled(&self) -> WalletResult<bool> {
                Err(WalletError::BiometricError("keychain locked".to_string()))
            }

            async fn authenticate(&self, _prompt: &str) -> WalletResult<bool> {
                Ok(true)
            }
        }

        let gate = CredentialGate::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EnrollmentFails),
            &WalletConfig::default(),
        );
        assert_eq!(gate.verify_presence().await, Presence::DENIED);
    }

    #[test]
    fn test_tokens_are_unique() {
        let token = new_session_token();
        assert!(token.starts_with("token_"));
        assert_ne!(token, new_session_token());
    }
}
