//! Bridge configuration
//!
//! All settings live in a single JSON file. Every field has a default, so a
//! missing file or a partial file both yield a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::reference::ProviderRoot;

/// Root name the transient scope is declared under
pub const TRANSIENT_ROOT_NAME: &str = "temp_share";

/// Root name the durable scope is declared under
pub const DURABLE_ROOT_NAME: &str = "downloads";

/// Secure reference provider settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Content authority, e.g. `com.example.app.provider`
    #[serde(default = "default_authority")]
    pub authority: String,
    /// Extra roots beyond the two storage scopes (e.g. a web layer's cache dir)
    #[serde(default)]
    pub extra_roots: Vec<ProviderRoot>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            extra_roots: Vec::new(),
        }
    }
}

fn default_authority() -> String {
    "webshare.bridge.provider".to_string()
}

/// Storage scope locations and cleanup policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Transient staging root. None = `<cache dir>/webshare-bridge/temp_share`
    #[serde(default)]
    pub transient_dir: Option<PathBuf>,
    /// Arenas older than this are swept before each transient write.
    /// 0 keeps only the most recent request.
    #[serde(default)]
    pub transient_ttl_secs: u64,
    /// Legacy public downloads directory. None = the platform download dir
    #[serde(default)]
    pub durable_dir: Option<PathBuf>,
    /// Folder passed to the mediated store as the relative target
    #[serde(default = "default_relative_folder")]
    pub durable_relative_folder: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            transient_dir: None,
            transient_ttl_secs: 0,
            durable_dir: None,
            durable_relative_folder: default_relative_folder(),
        }
    }
}

fn default_relative_folder() -> String {
    "Download".to_string()
}

/// Targeted hand-off to a messaging application
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_primary_package")]
    pub primary_package: String,
    #[serde(default = "default_business_package")]
    pub business_package: String,
    /// Prefixed to the normalized address digits
    #[serde(default = "default_country_code")]
    pub country_code: String,
    /// Number of trailing digits kept from the address
    #[serde(default = "default_address_digits")]
    pub address_digits: usize,
    /// Appended to build the routing token, e.g. `@s.whatsapp.net`
    #[serde(default = "default_address_domain")]
    pub address_domain: String,
    /// Extra the routing token is attached under
    #[serde(default = "default_token_extra")]
    pub token_extra: String,
    #[serde(default = "default_chat_scheme_url")]
    pub chat_scheme_url: String,
    #[serde(default = "default_chat_web_url")]
    pub chat_web_url: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            primary_package: default_primary_package(),
            business_package: default_business_package(),
            country_code: default_country_code(),
            address_digits: default_address_digits(),
            address_domain: default_address_domain(),
            token_extra: default_token_extra(),
            chat_scheme_url: default_chat_scheme_url(),
            chat_web_url: default_chat_web_url(),
        }
    }
}

fn default_primary_package() -> String {
    "com.whatsapp".to_string()
}

fn default_business_package() -> String {
    "com.whatsapp.w4b".to_string()
}

fn default_country_code() -> String {
    "91".to_string()
}

fn default_address_digits() -> usize {
    10
}

fn default_address_domain() -> String {
    "@s.whatsapp.net".to_string()
}

fn default_token_extra() -> String {
    "jid".to_string()
}

fn default_chat_scheme_url() -> String {
    "whatsapp://send".to_string()
}

fn default_chat_web_url() -> String {
    "https://wa.me/".to_string()
}

/// All bridge settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    /// Prefix for synthesized file names
    #[serde(default = "default_name_prefix")]
    pub fallback_name_prefix: String,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_share_title")]
    pub share_chooser_title: String,
    #[serde(default = "default_multi_title")]
    pub multi_chooser_title: String,
    /// Whether to show host notices (toasts) in addition to returning outcomes
    #[serde(default = "default_true")]
    pub notices_enabled: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            storage: StorageConfig::default(),
            messaging: MessagingConfig::default(),
            fallback_name_prefix: default_name_prefix(),
            max_payload_bytes: default_max_payload_bytes(),
            share_chooser_title: default_share_title(),
            multi_chooser_title: default_multi_title(),
            notices_enabled: true,
        }
    }
}

fn default_name_prefix() -> String {
    "Shared_Doc_".to_string()
}

fn default_max_payload_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_share_title() -> String {
    "Share Document".to_string()
}

fn default_multi_title() -> String {
    "Share Via".to_string()
}

fn default_true() -> bool {
    true
}

impl BridgeConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            tracing::info!("[Config] No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))?;
        tracing::info!("[Config] Loaded {:?}", path);
        Ok(config)
    }

    /// Fill unset scope directories from paths the host resolved itself.
    /// `dirs` knows nothing about app sandboxes, so mobile shells pass their
    /// cache dir and (where raw writes are still allowed) the public downloads dir.
    pub fn with_host_dirs(mut self, cache_dir: Option<&Path>, downloads_dir: Option<&Path>) -> Self {
        if self.storage.transient_dir.is_none() {
            self.storage.transient_dir = cache_dir.map(|d| d.join(TRANSIENT_ROOT_NAME));
        }
        if self.storage.durable_dir.is_none() {
            self.storage.durable_dir = downloads_dir.map(Path::to_path_buf);
        }
        self
    }

    pub fn transient_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.transient_ttl_secs)
    }

    /// Transient staging root, from config or the platform cache dir
    pub fn transient_root(&self) -> Option<PathBuf> {
        self.storage.transient_dir.clone().or_else(|| {
            dirs::cache_dir().map(|d| d.join("webshare-bridge").join(TRANSIENT_ROOT_NAME))
        })
    }

    /// Legacy public downloads directory, from config or the platform download dir
    pub fn durable_root(&self) -> Option<PathBuf> {
        self.storage.durable_dir.clone().or_else(dirs::download_dir)
    }

    /// Roots declared to the reference provider: both scopes plus any extras
    pub fn provider_roots(&self) -> Vec<ProviderRoot> {
        let mut roots = Vec::new();
        if let Some(path) = self.transient_root() {
            roots.push(ProviderRoot::new(TRANSIENT_ROOT_NAME, path));
        }
        if let Some(path) = self.durable_root() {
            roots.push(ProviderRoot::new(DURABLE_ROOT_NAME, path));
        }
        roots.extend(self.provider.extra_roots.iter().cloned());
        roots
    }
}
