//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (`vendor.api_key_env`). Secrets are
//! resolved once at startup and passed into constructors. `Debug` redacts.

use crate::SyncConfig;

#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    /// Vendor API key. `None` if the named env var was absent or empty.
    pub vendor_api_key: Option<String>,
    /// Name of the env var the key was read from, for diagnostics.
    pub vendor_api_key_env: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "vendor_api_key",
                &self.vendor_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field("vendor_api_key_env", &self.vendor_api_key_env)
            .finish()
    }
}

/// Resolve secrets through `lookup` (injectable for tests).
pub fn resolve_secrets<F>(cfg: &SyncConfig, lookup: F) -> ResolvedSecrets
where
    F: Fn(&str) -> Option<String>,
{
    let name = cfg.vendor.api_key_env.trim().to_string();
    let vendor_api_key = if name.is_empty() {
        None
    } else {
        lookup(&name).filter(|v| !v.trim().is_empty())
    };
    ResolvedSecrets {
        vendor_api_key,
        vendor_api_key_env: name,
    }
}

pub fn resolve_secrets_from_env(cfg: &SyncConfig) -> ResolvedSecrets {
    resolve_secrets(cfg, |name| std::env::var(name).ok())
}
