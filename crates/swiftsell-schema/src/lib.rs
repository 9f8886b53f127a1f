pub mod config;
pub mod error;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use config::{AdminKeys, AppConfig};
pub use error::Error;

/// Listing draft produced by the content client and edited by the user.
/// Lives only for the active workflow session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    pub title: String,
    pub description: String,
    /// Always non-negative; a price the backend failed to produce parses to 0.
    pub price: f64,
}

/// One citation attached to a price suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Closed set of marketplace identifiers a profile can be connected to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PlatformId {
    Google,
    Facebook,
    FacebookMarketplace,
    Shopify,
    Ebay,
    Amazon,
    Etsy,
    Mercari,
    Poshmark,
    Depop,
    Vinted,
}

impl PlatformId {
    pub const ALL: [PlatformId; 11] = [
        PlatformId::Google,
        PlatformId::Facebook,
        PlatformId::FacebookMarketplace,
        PlatformId::Shopify,
        PlatformId::Ebay,
        PlatformId::Amazon,
        PlatformId::Etsy,
        PlatformId::Mercari,
        PlatformId::Poshmark,
        PlatformId::Depop,
        PlatformId::Vinted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::Google => "google",
            PlatformId::Facebook => "facebook",
            PlatformId::FacebookMarketplace => "facebook_marketplace",
            PlatformId::Shopify => "shopify",
            PlatformId::Ebay => "ebay",
            PlatformId::Amazon => "amazon",
            PlatformId::Etsy => "etsy",
            PlatformId::Mercari => "mercari",
            PlatformId::Poshmark => "poshmark",
            PlatformId::Depop => "depop",
            PlatformId::Vinted => "vinted",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformId::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown platform: {s}"))
    }
}

/// Per-platform connection relation. `connect` parks a platform at
/// `Pending` until the authorization callback completes the transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Pending,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub default_platform: Option<PlatformId>,
    pub auto_sync: bool,
    pub notifications: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_platform: Some(PlatformId::Ebay),
            auto_sync: true,
            notifications: true,
        }
    }
}

/// Field-wise preference update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceUpdate {
    pub default_platform: Option<PlatformId>,
    pub auto_sync: Option<bool>,
    pub notifications: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProviderKind {
    Google,
    Facebook,
}

impl AuthProviderKind {
    /// Identity-provider tag recorded on the profile.
    pub fn provider_tag(&self) -> &'static str {
        match self {
            AuthProviderKind::Google => "google.com",
            AuthProviderKind::Facebook => "facebook.com",
        }
    }
}

impl fmt::Display for AuthProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthProviderKind::Google => f.write_str("google"),
            AuthProviderKind::Facebook => f.write_str("facebook"),
        }
    }
}

impl FromStr for AuthProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(AuthProviderKind::Google),
            "facebook" => Ok(AuthProviderKind::Facebook),
            other => Err(anyhow::anyhow!("unknown auth provider: {other}")),
        }
    }
}

/// Normalized user identity plus per-platform connection and preference
/// state. Persisted to the preference store on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub provider: String,
    #[serde(default)]
    pub connected_platforms: BTreeMap<PlatformId, ConnectionState>,
    #[serde(default)]
    pub preferences: Preferences,
}

impl UserProfile {
    pub fn connection(&self, platform: PlatformId) -> ConnectionState {
        self.connected_platforms
            .get(&platform)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_connected(&self, platform: PlatformId) -> bool {
        self.connection(platform) == ConnectionState::Connected
    }
}
