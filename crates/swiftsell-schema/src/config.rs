use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Admin-entered credential overrides, persisted under the
/// `admin_api_keys` preference key. Only set fields override the
/// startup configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminKeys {
    pub gemini_api_key: Option<String>,
    pub google_client_id: Option<String>,
    pub facebook_app_id: Option<String>,
    pub shopify_api_key: Option<String>,
    pub ebay_client_id: Option<String>,
    pub amazon_client_id: Option<String>,
    pub etsy_client_id: Option<String>,
}

/// Startup configuration. Every credential is optional; a missing
/// credential selects the deterministic stub path for that collaborator.
///
/// Precedence: YAML file, then environment variables, then any
/// admin-persisted overrides applied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub google_client_id: Option<String>,
    pub facebook_app_id: Option<String>,
    pub shopify_api_key: Option<String>,
    pub ebay_client_id: Option<String>,
    pub amazon_client_id: Option<String>,
    pub etsy_client_id: Option<String>,
    pub store_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config file {}", p.display()))?;
                serde_yaml::from_str(&content)
                    .with_context(|| format!("invalid config file {}", p.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Environment overrides. `GEMINI_API_KEY` is honored as a fallback
    /// for the model key.
    pub fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        let overrides: [(&mut Option<String>, &[&str]); 7] = [
            (
                &mut self.gemini_api_key,
                &["SWIFTSELL_GEMINI_API_KEY", "GEMINI_API_KEY"],
            ),
            (&mut self.google_client_id, &["SWIFTSELL_GOOGLE_CLIENT_ID"]),
            (&mut self.facebook_app_id, &["SWIFTSELL_FACEBOOK_APP_ID"]),
            (&mut self.shopify_api_key, &["SWIFTSELL_SHOPIFY_API_KEY"]),
            (&mut self.ebay_client_id, &["SWIFTSELL_EBAY_CLIENT_ID"]),
            (&mut self.amazon_client_id, &["SWIFTSELL_AMAZON_CLIENT_ID"]),
            (&mut self.etsy_client_id, &["SWIFTSELL_ETSY_CLIENT_ID"]),
        ];
        for (field, names) in overrides {
            if let Some(value) = names.iter().find_map(|n| get(n)).filter(|v| !v.is_empty()) {
                *field = Some(value);
            }
        }
        if let Some(path) = get("SWIFTSELL_STORE_PATH").filter(|v| !v.is_empty()) {
            self.store_path = Some(PathBuf::from(path));
        }
    }

    /// Runtime admin overrides win over file and environment so an
    /// operator-entered key takes effect without a restart.
    pub fn apply_admin_overrides(&mut self, keys: &AdminKeys) {
        let pairs = [
            (&mut self.gemini_api_key, &keys.gemini_api_key),
            (&mut self.google_client_id, &keys.google_client_id),
            (&mut self.facebook_app_id, &keys.facebook_app_id),
            (&mut self.shopify_api_key, &keys.shopify_api_key),
            (&mut self.ebay_client_id, &keys.ebay_client_id),
            (&mut self.amazon_client_id, &keys.amazon_client_id),
            (&mut self.etsy_client_id, &keys.etsy_client_id),
        ];
        for (field, value) in pairs {
            if value.is_some() {
                *field = value.clone();
            }
        }
    }
}
