//! Biometric authentication support
//!
//! Platform-specific implementations behind the credential gate:
//! - macOS: Touch ID via bioutil + Keychain
//! - Linux: (future) fprintd
//! - Windows: (future) Windows Hello
//!
//! Platforms without an implementation report no hardware, so the gate
//! falls back to its bypass rule.

use std::error::Error;

use async_trait::async_trait;
use tracing::debug;
use wallet_core::{BiometricAuthenticator, WalletError, WalletResult};

/// Result of biometric capability check
#[derive(Debug, Clone)]
pub struct BiometricStatus {
    /// Whether biometric auth is available on this system
    pub available: bool,
    /// Type of biometric (TouchID, FaceID, Fingerprint, etc.)
    pub biometric_type: String,
    /// Whether the gate item is enrolled for this wallet
    pub enrolled: bool,
}

/// Service name of the Touch ID protected Keychain item
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
const SERVICE_NAME: &str = "com.sendhome.biometric-gate";

/// Service name of the unprotected enrollment flag, readable without a prompt
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
const ENROLLED_SERVICE_NAME: &str = "com.sendhome.biometric-gate.enrolled";

/// Marker stored in the protected item
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
const GATE_MARKER: &[u8] = b"sendhome-gate-v1";

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use security_framework::passwords::{
        delete_generic_password, generic_password, get_generic_password, set_generic_password,
        set_generic_password_options, AccessControlOptions, PasswordOptions,
    };
    use std::process::Command;

    pub fn check_biometric_status(account: &str) -> BiometricStatus {
        let available = is_biometric_available();
        // Looking up the protected item would raise the prompt
        let enrolled = get_generic_password(ENROLLED_SERVICE_NAME, account).is_ok();

        BiometricStatus {
            available,
            biometric_type: if available { "TouchID".to_string() } else { "None".to_string() },
            enrolled,
        }
    }

    /// Store the gate marker behind the current biometric set
    ///
    /// Biometry access control needs the data protection keychain, which
    /// is only open to signed binaries. Unsigned builds get an error here
    /// and stay unenrolled.
    pub fn enroll_biometric(account: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let _ = delete_generic_password(SERVICE_NAME, account);
        let _ = delete_generic_password(ENROLLED_SERVICE_NAME, account);

        let mut options = PasswordOptions::new_generic_password(SERVICE_NAME, account);
        options.set_access_control_options(AccessControlOptions::BIOMETRY_CURRENT_SET);
        set_generic_password_options(GATE_MARKER, options)?;

        set_generic_password(ENROLLED_SERVICE_NAME, account, b"1")?;
        Ok(())
    }

    /// Read the protected marker; the system shows Touch ID before returning it
    pub fn unlock_with_biometric(account: &str) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let marker = generic_password(PasswordOptions::new_generic_password(SERVICE_NAME, account))?;
        Ok(marker == GATE_MARKER)
    }

    pub fn unenroll_biometric(account: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let _ = delete_generic_password(ENROLLED_SERVICE_NAME, account);
        delete_generic_password(SERVICE_NAME, account)?;
        Ok(())
    }

    pub fn is_biometric_available() -> bool {
        Command::new("bioutil")
            .args(["--availability"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(not(target_os = "macos"))]
mod fallback {
    use super::*;

    pub fn check_biometric_status(_account: &str) -> BiometricStatus {
        BiometricStatus {
            available: false,
            biometric_type: "None".to_string(),
            enrolled: false,
        }
    }

    pub fn enroll_biometric(_account: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        Err("Biometric authentication not available on this platform".into())
    }

    pub fn unlock_with_biometric(_account: &str) -> Result<bool, Box<dyn Error + Send + Sync>> {
        Err("Biometric authentication not available on this platform".into())
    }

    pub fn unenroll_biometric(_account: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    pub fn is_biometric_available() -> bool {
        false
    }
}

// Re-export platform-specific implementations
#[cfg(target_os = "macos")]
pub use macos::*;

#[cfg(not(target_os = "macos"))]
pub use fallback::*;

/// The device's biometric subsystem, scoped to one wallet account
pub struct PlatformBiometrics {
    account: String,
}

impl PlatformBiometrics {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }
}

// Platform checks shell out or hit the Keychain, so keep them off the runtime
async fn run_blocking<T, F>(check: F) -> WalletResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(check)
        .await
        .map_err(|e| WalletError::BiometricError(e.to_string()))
}

#[async_trait]
impl BiometricAuthenticator for PlatformBiometrics {
    async fn has_hardware(&self) -> WalletResult<bool> {
        run_blocking(is_biometric_available).await
    }

    async fn is_enrolled(&self) -> WalletResult<bool> {
        let account = self.account.clone();
        run_blocking(move || check_biometric_status(&account).enrolled).await
    }

    async fn authenticate(&self, prompt: &str) -> WalletResult<bool> {
        debug!(prompt, "Requesting biometric verification");
        let account = self.account.clone();
        let outcome = run_blocking(move || unlock_with_biometric(&account).map_err(|e| e.to_string())).await?;

        match outcome {
            Ok(granted) => Ok(granted),
            Err(reason) => {
                // Cancelled prompts surface as Keychain errors
                debug!(%reason, "Biometric verification not completed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_biometric_status() {
        let status = check_biometric_status("test-wallet");
        assert!(!status.biometric_type.is_empty());
    }

    #[test]
    fn test_enrollment_flag_is_separate_from_gate_item() {
        // Status checks read the flag, so they never touch the protected item
        assert_ne!(SERVICE_NAME, ENROLLED_SERVICE_NAME);
        assert!(!GATE_MARKER.is_empty());
    }

    #[test]
    fn test_is_biometric_available() {
        // Platform-dependent, only checks the call does not panic
        let _available = is_biometric_available();
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn test_fallback_reports_no_hardware() {
        let biometrics = PlatformBiometrics::new("test-wallet");

        assert!(!biometrics.has_hardware().await.unwrap());
        assert!(!biometrics.is_enrolled().await.unwrap());
        assert!(!biometrics.authenticate("Unlock").await.unwrap());
        assert!(enroll_biometric("test-wallet").is_err());
    }
}
