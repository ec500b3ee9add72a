use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use subsync_errors::{ClassifierTable, MessageCatalog, StatusClasses};
use subsync_reconcile::IsolationMode;

/// Default deadline for a background refresh's vendor call.
pub const DEFAULT_VENDOR_TIMEOUT_MS: u64 = 200;
/// Default deadline for a vendor call the caller waits on (full sync, fetch).
pub const DEFAULT_VENDOR_SYNC_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_MAX_CONCURRENT_REFRESHES: usize = 8;
pub const DEFAULT_VENDOR_API_KEY_ENV: &str = "SUBSYNC_VENDOR_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorSettings {
    pub base_url: String,
    /// Deadline for the background refresh's vendor call.
    pub timeout_ms: u64,
    /// Deadline for synchronous vendor calls. Also the HTTP client's
    /// per-request timeout.
    pub sync_timeout_ms: u64,
    /// Name of the env var holding the vendor API key.
    pub api_key_env: String,
}

impl Default for VendorSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8089".to_string(),
            timeout_ms: DEFAULT_VENDOR_TIMEOUT_MS,
            sync_timeout_ms: DEFAULT_VENDOR_SYNC_TIMEOUT_MS,
            api_key_env: DEFAULT_VENDOR_API_KEY_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    pub isolation: IsolationMode,
    /// Creates are written in chunks of this many rows, inside one transaction.
    pub chunk_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            isolation: IsolationMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshSettings {
    pub max_concurrent: usize,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_REFRESHES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorSettings {
    pub status_classes: StatusClasses,
    /// Message template overrides keyed by error kind (`not-found`, ...).
    pub messages: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonSettings {
    pub addr: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8899".to_string(),
        }
    }
}

/// Typed view of the merged config tree. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub vendor: VendorSettings,
    pub sync: SyncSettings,
    pub refresh: RefreshSettings,
    pub errors: ErrorSettings,
    pub daemon: DaemonSettings,
}

impl SyncConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: SyncConfig =
            serde_json::from_value(v.clone()).context("config does not match SyncConfig")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vendor.timeout_ms == 0 {
            bail!("CONFIG_INVALID vendor.timeout_ms must be > 0");
        }
        if self.vendor.sync_timeout_ms == 0 {
            bail!("CONFIG_INVALID vendor.sync_timeout_ms must be > 0");
        }
        if self.sync.chunk_size == 0 {
            bail!("CONFIG_INVALID sync.chunk_size must be > 0");
        }
        if self.refresh.max_concurrent == 0 {
            bail!("CONFIG_INVALID refresh.max_concurrent must be > 0");
        }
        if self.vendor.base_url.trim().is_empty() {
            bail!("CONFIG_INVALID vendor.base_url must not be empty");
        }
        // surface classifier/catalog problems at load time, not first use
        self.classifier()?;
        self.catalog()?;
        Ok(())
    }

    /// Fails on two kinds mapped to the same vendor status.
    pub fn classifier(&self) -> Result<ClassifierTable> {
        ClassifierTable::from_status_classes(&self.errors.status_classes)
            .context("errors.status_classes")
    }

    pub fn catalog(&self) -> Result<MessageCatalog> {
        MessageCatalog::with_overrides(&self.errors.messages).context("errors.messages")
    }

    /// Apply `SUBSYNC_VENDOR_URL` / `SUBSYNC_DAEMON_ADDR` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SUBSYNC_VENDOR_URL").filter(|s| !s.trim().is_empty()) {
            self.vendor.base_url = url;
        }
        if let Some(addr) = lookup("SUBSYNC_DAEMON_ADDR").filter(|s| !s.trim().is_empty()) {
            self.daemon.addr = addr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_yields_defaults() {
        let cfg = SyncConfig::from_json(&serde_json::json!({})).unwrap();
        assert_eq!(cfg, SyncConfig::default());
        assert_eq!(cfg.vendor.timeout_ms, 200);
        assert_eq!(cfg.vendor.sync_timeout_ms, 10_000);
        assert_eq!(cfg.sync.isolation, IsolationMode::SerializableSnapshot);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = SyncConfig::from_json(&serde_json::json!({"sync": {"chunk_size": 0}})).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn zero_sync_timeout_is_rejected() {
        let err = SyncConfig::from_json(&serde_json::json!({"vendor": {"sync_timeout_ms": 0}}))
            .unwrap_err();
        assert!(err.to_string().contains("sync_timeout_ms"));
    }

    #[test]
    fn unknown_section_field_is_rejected() {
        assert!(SyncConfig::from_json(&serde_json::json!({"vendor": {"timeout": 5}})).is_err());
    }

    #[test]
    fn env_overrides_apply_only_when_non_blank() {
        let mut cfg = SyncConfig::default();
        cfg.apply_env_overrides(|k| match k {
            "SUBSYNC_VENDOR_URL" => Some("http://vendor.internal".to_string()),
            "SUBSYNC_DAEMON_ADDR" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.vendor.base_url, "http://vendor.internal");
        assert_eq!(cfg.daemon.addr, DaemonSettings::default().addr);
    }
}
