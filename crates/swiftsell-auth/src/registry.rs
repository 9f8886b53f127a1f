use std::collections::BTreeMap;

use swiftsell_schema::{AppConfig, PlatformId};
use urlencoding::encode;
use uuid::Uuid;

const DEFAULT_REDIRECT_URI: &str = "com.swiftsell.app://oauth-callback";

const EBAY_SCOPES: &str = "https://api.ebay.com/oauth/api_scope/sell.marketing.readonly \
https://api.ebay.com/oauth/api_scope/sell.inventory.readonly \
https://api.ebay.com/oauth/api_scope/sell.account.readonly";

/// Authorization endpoint description for one marketplace. Query
/// parameter names differ per platform, so the shape is data, not code.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub base: &'static str,
    pub client_id_param: &'static str,
    pub client_id: Option<String>,
    pub scopes: Option<&'static str>,
    pub response_type: Option<&'static str>,
    /// Amazon's consent endpoint requires an opaque state parameter.
    pub uses_state: bool,
}

impl Authorization {
    fn url(&self, redirect_uri: &str) -> Option<String> {
        let client_id = self.client_id.as_deref()?;
        let mut query = vec![
            format!("{}={}", self.client_id_param, encode(client_id)),
            format!("redirect_uri={}", encode(redirect_uri)),
        ];
        if let Some(scopes) = self.scopes {
            query.push(format!("scope={}", encode(scopes)));
        }
        if let Some(response_type) = self.response_type {
            query.push(format!("response_type={response_type}"));
        }
        if self.uses_state {
            query.push(format!("state={}", Uuid::new_v4()));
        }
        Some(format!("{}?{}", self.base, query.join("&")))
    }
}

#[derive(Debug, Clone)]
pub struct PlatformSpec {
    pub id: PlatformId,
    pub name: &'static str,
    pub authorization: Option<Authorization>,
}

impl PlatformSpec {
    /// Platforms with an authorization endpoint stay `Pending` until the
    /// callback completes; the rest connect directly.
    pub fn requires_authorization(&self) -> bool {
        self.authorization.is_some()
    }
}

/// Data-driven capability map over the closed marketplace set. Replaces
/// per-platform connect functions with one lookup.
pub struct PlatformRegistry {
    specs: BTreeMap<PlatformId, PlatformSpec>,
    redirect_uri: String,
}

impl PlatformRegistry {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut specs = BTreeMap::new();
        for id in PlatformId::ALL {
            specs.insert(id, spec_for(id, config));
        }
        Self {
            specs,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn spec(&self, id: PlatformId) -> &PlatformSpec {
        // The map is seeded with every PlatformId variant.
        &self.specs[&id]
    }

    pub fn all(&self) -> impl Iterator<Item = &PlatformSpec> {
        self.specs.values()
    }

    /// `None` when the platform has no authorization endpoint, or when
    /// its client id is not configured (the redirect is skipped then).
    pub fn authorization_url(&self, id: PlatformId) -> Option<String> {
        self.spec(id)
            .authorization
            .as_ref()
            .and_then(|auth| auth.url(&self.redirect_uri))
    }
}

fn spec_for(id: PlatformId, config: &AppConfig) -> PlatformSpec {
    let authorization = match id {
        PlatformId::FacebookMarketplace => Some(Authorization {
            base: "https://www.facebook.com/v18.0/dialog/oauth",
            client_id_param: "client_id",
            client_id: config.facebook_app_id.clone(),
            scopes: Some("marketplace_management,pages_manage_posts"),
            response_type: Some("code"),
            uses_state: false,
        }),
        // The shop subdomain is only known once a merchant account is
        // linked; the template keeps the placeholder until then.
        PlatformId::Shopify => Some(Authorization {
            base: "https://{shop}.myshopify.com/admin/oauth/authorize",
            client_id_param: "client_id",
            client_id: config.shopify_api_key.clone(),
            scopes: Some("read_products,write_products,read_orders"),
            response_type: Some("code"),
            uses_state: false,
        }),
        PlatformId::Ebay => Some(Authorization {
            base: "https://auth.ebay.com/oauth2/authorize",
            client_id_param: "client_id",
            client_id: config.ebay_client_id.clone(),
            scopes: Some(EBAY_SCOPES),
            response_type: Some("code"),
            uses_state: false,
        }),
        PlatformId::Amazon => Some(Authorization {
            base: "https://sellercentral.amazon.com/apps/authorize/consent",
            client_id_param: "application_id",
            client_id: config.amazon_client_id.clone(),
            scopes: None,
            response_type: None,
            uses_state: true,
        }),
        PlatformId::Etsy => Some(Authorization {
            base: "https://www.etsy.com/oauth/connect",
            client_id_param: "client_id",
            client_id: config.etsy_client_id.clone(),
            scopes: Some("listings_r listings_w"),
            response_type: Some("code"),
            uses_state: false,
        }),
        PlatformId::Google
        | PlatformId::Facebook
        | PlatformId::Mercari
        | PlatformId::Poshmark
        | PlatformId::Depop
        | PlatformId::Vinted => None,
    };

    PlatformSpec {
        id,
        name: display_name(id),
        authorization,
    }
}

fn display_name(id: PlatformId) -> &'static str {
    match id {
        PlatformId::Google => "Google",
        PlatformId::Facebook => "Facebook",
        PlatformId::FacebookMarketplace => "Facebook Marketplace",
        PlatformId::Shopify => "Shopify",
        PlatformId::Ebay => "eBay",
        PlatformId::Amazon => "Amazon",
        PlatformId::Etsy => "Etsy",
        PlatformId::Mercari => "Mercari",
        PlatformId::Poshmark => "Poshmark",
        PlatformId::Depop => "Depop",
        PlatformId::Vinted => "Vinted",
    }
}
