pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use swiftsell_schema::{AppConfig, ChatMessage, ChatRole, Error, GroundingChunk, ItemData};

pub use gemini::{GeminiAssistantClient, GeminiListingClient};

/// One captured image. The capture surface guarantees 1..=3 per analysis;
/// this crate only re-checks non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}

/// Title/description pair returned by the structured-output call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCopy {
    pub title: String,
    pub description: String,
}

/// Price plus the grounding citations that justified it.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceEstimate {
    pub price: f64,
    pub sources: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub item: ItemData,
    pub sources: Vec<GroundingChunk>,
}

/// Turns captured images into listing content and a price estimate,
/// isolating all backend specifics.
#[async_trait]
pub trait ListingClient: Send + Sync {
    async fn describe(&self, images: &[ImageBlob]) -> Result<ItemCopy, Error>;

    async fn estimate_price(&self, images: &[ImageBlob]) -> Result<PriceEstimate, Error>;

    /// Runs `describe` and `estimate_price` over the same image set; both
    /// must complete. Their relative order is not significant.
    async fn analyze_images(&self, images: &[ImageBlob]) -> Result<Analysis, Error> {
        if images.is_empty() {
            return Err(Error::NoImages);
        }
        let (copy, estimate) =
            tokio::try_join!(self.describe(images), self.estimate_price(images))?;
        Ok(Analysis {
            item: ItemData {
                title: copy.title,
                description: copy.description,
                price: estimate.price,
            },
            sources: estimate.sources,
        })
    }
}

/// Ongoing help conversation. One session per client lifetime, no teardown.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn respond(&self, history: &[ChatMessage]) -> Result<String, Error>;
}

pub const PLACEHOLDER_TITLE: &str = "Premium Quality Item - Great Condition";

const PLACEHOLDER_DESCRIPTION: &str = "This is a high-quality item in excellent condition. \
Perfect for collectors or everyday use. Features include durable construction, attractive \
design, and great functionality. Don't miss this opportunity to own this fantastic piece!";

const PLACEHOLDER_PRICE: f64 = 25.0;

fn placeholder_sources() -> Vec<GroundingChunk> {
    vec![
        GroundingChunk {
            title: Some("Similar Item on eBay".into()),
            uri: Some("https://ebay.com/example".into()),
        },
        GroundingChunk {
            title: Some("Amazon Listing".into()),
            uri: Some("https://amazon.com/example".into()),
        },
    ]
}

/// Deterministic placeholder content used when no backend credential is
/// configured, so the workflow stays exercisable without network access.
pub struct StubListingClient;

#[async_trait]
impl ListingClient for StubListingClient {
    async fn describe(&self, _images: &[ImageBlob]) -> Result<ItemCopy, Error> {
        Ok(ItemCopy {
            title: PLACEHOLDER_TITLE.into(),
            description: PLACEHOLDER_DESCRIPTION.into(),
        })
    }

    async fn estimate_price(&self, _images: &[ImageBlob]) -> Result<PriceEstimate, Error> {
        Ok(PriceEstimate {
            price: PLACEHOLDER_PRICE,
            sources: placeholder_sources(),
        })
    }
}

pub struct StubAssistantClient;

#[async_trait]
impl AssistantClient for StubAssistantClient {
    async fn respond(&self, history: &[ChatMessage]) -> Result<String, Error> {
        let last_user = history
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let regarding = if last_user.is_empty() {
            String::new()
        } else {
            format!("Regarding \"{last_user}\", ")
        };
        Ok(format!(
            "Thanks for your question! I'm here to help you with SwiftSell AI. {regarding}\
I'd be happy to assist you with listing items, pricing strategies, and marketplace \
optimization. However, I'm currently running in demo mode. Please configure your API \
keys for full functionality."
        ))
    }
}

pub fn listing_client_from_config(config: &AppConfig) -> Arc<dyn ListingClient> {
    match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiListingClient::new(key.clone())),
        None => {
            tracing::warn!("no model api key configured, serving placeholder listing content");
            Arc::new(StubListingClient)
        }
    }
}

pub fn assistant_client_from_config(config: &AppConfig) -> Arc<dyn AssistantClient> {
    match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiAssistantClient::new(key.clone())),
        None => Arc::new(StubAssistantClient),
    }
}
