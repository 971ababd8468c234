//! Settings and encrypted credential storage for the halite pool bridge.
//!
//! Two persisted documents, both JSON:
//!
//! - **[`Settings`]** — tunables (API root, poll interval, channel count).
//! - **[`CredentialStore`]** — per-instance login credentials and session
//!   token. Passwords are encrypted with an AES-256-CBC key generated on
//!   first run and stored alongside the entries; tokens are persisted on
//!   every change so a restart can resume the session without re-login.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

mod crypto;

pub const SETTINGS_FILE: &str = "settings.json";
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Shipping automation-channel count; the newer hardware revision has 8.
pub const DEFAULT_AUTOMATION_CHANNELS: u8 = 7;

const DEFAULT_BASE_URL: &str = "https://api.mypool.cloud/v1/";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize config document: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("no stored credentials for instance '{instance}'")]
    MissingEntry { instance: String },

    #[error("could not resolve a configuration directory")]
    NoConfigDir,
}

// ── Paths ───────────────────────────────────────────────────────────

/// Resolve the config directory via XDG / platform conventions.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("io", "halite", "halite")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(ConfigError::NoConfigDir)
}

// ── Settings ────────────────────────────────────────────────────────

/// Bridge tunables, loaded from `settings.json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Vendor API root.
    #[serde(default = "default_base_url")]
    pub base_url: Url,

    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Automation channels on the device revision (7 or 8).
    #[serde(default = "default_channels")]
    pub automation_channels: u8,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Verify the vendor TLS chain. Off by default — the cloud serves
    /// an incomplete chain and the official apps skip verification too.
    #[serde(default)]
    pub verify_tls: bool,
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).unwrap_or_else(|_| unreachable!("default URL is valid"))
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_channels() -> u8 {
    DEFAULT_AUTOMATION_CHANNELS
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval(),
            automation_channels: default_channels(),
            timeout_secs: default_timeout(),
            verify_tls: false,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

// ── Credential store ────────────────────────────────────────────────

/// One stored account, keyed by integration-instance id.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct StoredEntry {
    username: String,
    /// AES-256-CBC ciphertext, IV-prefixed, base64.
    password: String,
    /// Last known session token; `None` until first login.
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct StoreDocument {
    /// Base64 AES-256 key, generated on first run.
    key: String,
    #[serde(default)]
    entries: BTreeMap<String, StoredEntry>,
}

/// Encrypted credential + token storage, one JSON document on disk.
///
/// Every mutation persists immediately — a crash between a token
/// refresh and the next poll must not lose the new token.
pub struct CredentialStore {
    path: PathBuf,
    key: [u8; 32],
    document: StoreDocument,
}

impl CredentialStore {
    /// Load the store from `path`, generating a fresh encryption key
    /// (and the file itself) on first run.
    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let document: StoreDocument = serde_json::from_str(&text)?;
                let key = crypto::decode_key(&document.key)?;
                Ok(Self {
                    path,
                    key,
                    document,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "credential store missing, generating key");
                let key = crypto::generate_key();
                let document = StoreDocument {
                    key: crypto::encode_key(&key),
                    entries: BTreeMap::new(),
                };
                let store = Self {
                    path,
                    key,
                    document,
                };
                store.save()?;
                Ok(store)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load from the default platform config directory.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(config_dir()?.join(CREDENTIALS_FILE))
    }

    /// Store (or replace) credentials for an instance.
    pub fn store_credentials(
        &mut self,
        instance: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<(), ConfigError> {
        let encrypted = crypto::encrypt(&self.key, password.expose_secret().as_bytes());
        let token = self
            .document
            .entries
            .get(instance)
            .and_then(|e| e.token.clone());

        self.document.entries.insert(
            instance.to_owned(),
            StoredEntry {
                username: username.to_owned(),
                password: encrypted,
                token,
            },
        );
        self.save()
    }

    /// Decrypted credentials for an instance.
    pub fn credentials(&self, instance: &str) -> Result<(String, SecretString), ConfigError> {
        let entry = self.entry(instance)?;
        let plaintext = crypto::decrypt(&self.key, &entry.password)?;
        let password = String::from_utf8(plaintext)
            .map_err(|_| ConfigError::Crypto("decrypted password is not UTF-8".into()))?;
        Ok((entry.username.clone(), SecretString::from(password)))
    }

    /// Last persisted session token for an instance.
    pub fn token(&self, instance: &str) -> Option<SecretString> {
        self.document
            .entries
            .get(instance)
            .and_then(|e| e.token.as_deref())
            .map(SecretString::from)
    }

    /// Persist a token change (`None` clears it).
    pub fn update_token(
        &mut self,
        instance: &str,
        token: Option<&str>,
    ) -> Result<(), ConfigError> {
        let entry = self
            .document
            .entries
            .get_mut(instance)
            .ok_or_else(|| ConfigError::MissingEntry {
                instance: instance.to_owned(),
            })?;
        entry.token = token.map(str::to_owned);
        self.save()
    }

    /// Drop an instance's entry (integration removed).
    pub fn remove(&mut self, instance: &str) -> Result<(), ConfigError> {
        if self.document.entries.remove(instance).is_some() {
            self.save()?;
        }
        Ok(())
    }

    /// Instance ids with stored credentials.
    pub fn instances(&self) -> impl Iterator<Item = &str> {
        self.document.entries.keys().map(String::as_str)
    }

    fn entry(&self, instance: &str) -> Result<&StoredEntry, ConfigError> {
        self.document
            .entries
            .get(instance)
            .ok_or_else(|| ConfigError::MissingEntry {
                instance: instance.to_owned(),
            })
    }

    fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.document)?)?;
        Ok(())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("entries", &self.document.entries.len())
            .finish_non_exhaustive()
    }
}
