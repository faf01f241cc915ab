//! Secure key-value storage for wallet data
//!
//! The `SecureStore` trait is what the gate and the ledger are built on.
//! `EncryptedFileStore` keeps every key in one encrypted file with:
//! - Atomic writes (write to temp, then rename)
//! - Automatic backups before writes
//! - Version checking for migrations

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::crypto::{
    compute_checksum, generate_device_secret, generate_salt, verify_checksum, StoreKey,
    DEVICE_SECRET_SIZE, SALT_SIZE,
};
use crate::error::{WalletError, WalletResult};
use crate::models::{EncryptedStore, WalletConfig};

/// Key holding the session token
pub const TOKEN_KEY: &str = "sendhome_token_v1";

/// Key holding the balance as a decimal string
pub const BALANCE_KEY: &str = "sendhome_balance_v1";

/// Key holding the JSON array of transactions
pub const TRANSACTIONS_KEY: &str = "sendhome_transactions_v1";

/// Default store directory name
const STORE_DIR: &str = ".sendhome";

/// Environment variable overriding the store directory
pub const STORE_DIR_ENV: &str = "SENDHOME_DIR";

/// Main store file name
const STORE_FILE: &str = "store.enc";

/// Backup file name
const BACKUP_FILE: &str = "store.enc.backup";

/// Device secret file name
const DEVICE_SECRET_FILE: &str = "device.key";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Encrypted key-value storage used by the wallet
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Read a value, `None` if the key was never written
    async fn get_item(&self, key: &str) -> WalletResult<Option<String>>;

    async fn set_item(&self, key: &str, value: String) -> WalletResult<()>;

    async fn delete_item(&self, key: &str) -> WalletResult<()>;

    /// Write several keys as one logical operation.
    ///
    /// Implementations should apply the whole batch or nothing. This
    /// fallback writes key by key and reports a divergence when a later
    /// write fails after an earlier one landed.
    async fn set_items(&self, items: Vec<(String, String)>) -> WalletResult<()> {
        let mut written: Vec<String> = Vec::new();
        for (key, value) in items {
            if let Err(e) = self.set_item(&key, value).await {
                if !written.is_empty() {
                    warn!(written = ?written, failed = %key, error = %e, "Partial write left stored keys out of step");
                }
                return Err(e);
            }
            written.push(key);
        }
        Ok(())
    }
}

/// In-memory store, used for tests and previews
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn get_item(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> WalletResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_item(&self, key: &str) -> WalletResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn set_items(&self, items: Vec<(String, String)>) -> WalletResult<()> {
        let mut entries = self.entries.write().await;
        entries.extend(items);
        Ok(())
    }
}

/// Get the default store directory path
pub fn default_store_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(STORE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STORE_DIR)
}

/// Get the store file path
pub fn store_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(STORE_FILE)
}

/// Get the backup file path
pub fn backup_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(BACKUP_FILE)
}

/// Get the device secret path
pub fn device_secret_path(base_dir: &Path) -> PathBuf {
    base_dir.join(DEVICE_SECRET_FILE)
}

/// Get the config file path
pub fn config_file_path(base_dir: &Path) -> PathBuf {
    base_dir.join(CONFIG_FILE)
}

/// Ensure the store directory exists with proper permissions
pub async fn ensure_store_dir(base_dir: &Path) -> WalletResult<()> {
    if !base_dir.exists() {
        fs::create_dir_all(base_dir).await?;

        // Set directory permissions to 700 (owner only) on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(base_dir, perms)?;
        }
    }
    Ok(())
}

/// Check if a store exists at the given path
pub async fn store_exists(base_dir: &Path) -> bool {
    store_file_path(base_dir).exists()
}

/// Load the device secret, generating one on first use
pub async fn load_or_create_device_secret(
    base_dir: &Path,
) -> WalletResult<Secret<[u8; DEVICE_SECRET_SIZE]>> {
    let path = device_secret_path(base_dir);

    if path.exists() {
        let bytes = fs::read(&path).await?;
        let secret: [u8; DEVICE_SECRET_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            WalletError::ConfigError(format!("Device secret at {} is malformed", path.display()))
        })?;
        return Ok(Secret::new(secret));
    }

    ensure_store_dir(base_dir).await?;
    let secret = generate_device_secret();
    write_private_file(&path, secret.expose_secret()).await?;
    debug!("Generated new device secret at {}", path.display());

    Ok(secret)
}

/// Store backed by a single encrypted file
pub struct EncryptedFileStore {
    /// Base directory for store files
    base_dir: PathBuf,
    /// Key derived from the device secret
    key: StoreKey,
    /// Salt the key was derived with
    salt: [u8; SALT_SIZE],
    /// Decrypted entries (in-memory only)
    entries: RwLock<BTreeMap<String, String>>,
}

impl EncryptedFileStore {
    /// Open the store with an explicit device secret, creating it if absent
    pub async fn open(base_dir: &Path, secret: &[u8], config: &WalletConfig) -> WalletResult<Self> {
        ensure_store_dir(base_dir).await?;

        let store_path = store_file_path(base_dir);
        if !store_path.exists() {
            let salt = generate_salt();
            let key = StoreKey::derive(secret, &salt, config)?;
            let store = Self {
                base_dir: base_dir.to_path_buf(),
                key,
                salt,
                entries: RwLock::new(BTreeMap::new()),
            };
            store.persist(&BTreeMap::new()).await?;
            debug!("Created secure store at {}", store_path.display());
            return Ok(store);
        }

        let encrypted = read_store_file(&store_path).await?;

        // Check version
        if encrypted.version > EncryptedStore::CURRENT_VERSION {
            return Err(WalletError::ConfigError(format!(
                "Store version {} is newer than supported version {}",
                encrypted.version,
                EncryptedStore::CURRENT_VERSION
            )));
        }

        let key = StoreKey::derive(secret, &encrypted.salt, config)?;
        let plaintext = key.decrypt(&encrypted.ciphertext, &encrypted.nonce)?;

        if !verify_checksum(&plaintext, &encrypted.checksum) {
            return Err(WalletError::StoreCorrupted);
        }

        let entries: BTreeMap<String, String> = serde_json::from_slice(&plaintext)?;
        debug!(keys = entries.len(), "Opened secure store at {}", store_path.display());

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            key,
            salt: encrypted.salt,
            entries: RwLock::new(entries),
        })
    }

    /// Open the store using the device secret kept beside it
    pub async fn open_with_device_secret(base_dir: &Path, config: &WalletConfig) -> WalletResult<Self> {
        let secret = load_or_create_device_secret(base_dir).await?;
        Self::open(base_dir, secret.expose_secret(), config).await
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Apply a change to a copy of the entries and commit it only once
    /// the file has been replaced.
    async fn update<F>(&self, change: F) -> WalletResult<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        change(&mut next);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    /// Encrypt and write the entries (creates backup first)
    async fn persist(&self, entries: &BTreeMap<String, String>) -> WalletResult<()> {
        let store_path = store_file_path(&self.base_dir);
        let backup_path = backup_file_path(&self.base_dir);

        if store_path.exists() {
            fs::copy(&store_path, &backup_path).await?;
        }

        let plaintext = serde_json::to_vec(entries)?;
        let checksum = compute_checksum(&plaintext);
        let (ciphertext, nonce) = self.key.encrypt(&plaintext)?;

        let encrypted = EncryptedStore {
            version: EncryptedStore::CURRENT_VERSION,
            salt: self.salt,
            nonce,
            ciphertext,
            checksum,
        };

        // Write atomically (write to temp, then rename)
        let temp_path = store_path.with_extension("enc.tmp");
        write_store_file(&temp_path, &encrypted).await?;
        fs::rename(&temp_path, &store_path).await?;

        Ok(())
    }
}

#[async_trait]
impl SecureStore for EncryptedFileStore {
    async fn get_item(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> WalletResult<()> {
        let key = key.to_string();
        self.update(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn delete_item(&self, key: &str) -> WalletResult<()> {
        if !self.entries.read().await.contains_key(key) {
            return Ok(());
        }
        let key = key.to_string();
        self.update(move |entries| {
            entries.remove(&key);
        })
        .await
    }

    async fn set_items(&self, items: Vec<(String, String)>) -> WalletResult<()> {
        self.update(move |entries| entries.extend(items)).await
    }
}

/// Read encrypted store from file
async fn read_store_file(path: &Path) -> WalletResult<EncryptedStore> {
    let mut file = fs::File::open(path).await?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).await?;

    let encrypted: EncryptedStore = serde_json::from_slice(&data)?;
    Ok(encrypted)
}

/// Write encrypted store to file
async fn write_store_file(path: &Path, encrypted: &EncryptedStore) -> WalletResult<()> {
    let data = serde_json::to_vec(encrypted)?;
    write_private_file(path, &data).await
}

async fn write_private_file(path: &Path, data: &[u8]) -> WalletResult<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;

    // Set file permissions to 600 (owner only) on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    Ok(())
}

/// Load wallet configuration
pub async fn load_config(base_dir: &Path) -> WalletResult<WalletConfig> {
    let config_path = config_file_path(base_dir);

    if !config_path.exists() {
        return Ok(WalletConfig::default());
    }

    let content = fs::read_to_string(&config_path).await?;
    let config: WalletConfig = toml::from_str(&content)
        .map_err(|e| WalletError::ConfigError(e.to_string()))?;

    Ok(config)
}

/// Save wallet configuration
pub async fn save_config(base_dir: &Path, config: &WalletConfig) -> WalletResult<()> {
    ensure_store_dir(base_dir).await?;

    let config_path = config_file_path(base_dir);
    let content = toml::to_string_pretty(config)
        .map_err(|e| WalletError::ConfigError(e.to_string()))?;

    fs::write(&config_path, content).await?;

    Ok(())
}
