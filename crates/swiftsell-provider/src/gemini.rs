//! Google Gemini `generateContent` clients.
//!
//! https://ai.google.dev/api/generate-content

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::prelude::*;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use swiftsell_schema::{ChatMessage, Error, GroundingChunk};
use tokio::sync::Mutex;

use crate::{AssistantClient, ImageBlob, ItemCopy, ListingClient, PriceEstimate};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const CHAT_MODEL: &str = "gemini-2.5-flash";
const SEARCH_MODEL: &str = "gemini-2.5-flash";

const DESCRIPTION_PROMPT: &str = "Analyze the item in the image(s). Generate a catchy, \
SEO-friendly product title (under 80 characters) and a detailed, persuasive product \
description. Highlight key features and potential uses.";

const PRICE_PROMPT: &str = "Based on the item in the image(s), act as a pricing expert. \
Search online marketplaces to determine a competitive but fair market price for this item \
if sold secondhand. Provide only a single numerical value representing the price in USD. \
Do not include currency symbols or any explanatory text.";

const ASSISTANT_SYSTEM_INSTRUCTION: &str = "You are a friendly and helpful AI assistant \
for the 'SwiftSell AI' app. Your purpose is to guide users on how to operate the \
application. Keep your answers concise and easy to understand. The user is on a mobile \
device.";

#[derive(Debug, Clone)]
pub struct GeminiListingClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiListingClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn describe_request(images: &[ImageBlob]) -> GenerateContentRequest {
        let mut parts = image_parts(images);
        parts.push(Part::Text {
            text: DESCRIPTION_PROMPT.to_string(),
        });
        GenerateContentRequest {
            contents: vec![Content::user(parts)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                temperature: Some(0.3),
                top_p: Some(0.8),
                top_k: Some(40),
                response_mime_type: Some("application/json".into()),
                response_schema: Some(description_schema()),
            }),
            tools: None,
        }
    }

    fn price_request(images: &[ImageBlob]) -> GenerateContentRequest {
        let mut parts = image_parts(images);
        parts.push(Part::Text {
            text: PRICE_PROMPT.to_string(),
        });
        GenerateContentRequest {
            contents: vec![Content::user(parts)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                temperature: Some(0.2),
                top_p: Some(0.7),
                top_k: Some(30),
                response_mime_type: None,
                response_schema: None,
            }),
            tools: Some(vec![Tool {
                google_search: serde_json::json!({}),
            }]),
        }
    }
}

#[async_trait]
impl ListingClient for GeminiListingClient {
    async fn describe(&self, images: &[ImageBlob]) -> Result<ItemCopy, Error> {
        let request = Self::describe_request(images);
        let response = generate(
            &self.client,
            &self.base_url,
            &self.api_key,
            CHAT_MODEL,
            &request,
        )
        .await?;
        parse_item_copy(&response)
    }

    async fn estimate_price(&self, images: &[ImageBlob]) -> Result<PriceEstimate, Error> {
        let request = Self::price_request(images);
        let response = generate(
            &self.client,
            &self.base_url,
            &self.api_key,
            SEARCH_MODEL,
            &request,
        )
        .await?;
        Ok(parse_price_estimate(&response))
    }
}

/// One conversation session per client lifetime, created lazily on the
/// first turn. The transcript lives here; callers only append to their own
/// copy of the history.
pub struct GeminiAssistantClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    session: Mutex<Option<Vec<Content>>>,
}

impl GeminiAssistantClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
            session: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl AssistantClient for GeminiAssistantClient {
    async fn respond(&self, history: &[ChatMessage]) -> Result<String, Error> {
        let last = history
            .last()
            .ok_or_else(|| anyhow!("empty chat history"))?;

        let mut session = self.session.lock().await;
        let contents = session.get_or_insert_with(Vec::new);
        contents.push(Content::user(vec![Part::Text {
            text: last.content.clone(),
        }]));

        let request = GenerateContentRequest {
            contents: contents.clone(),
            system_instruction: Some(Content::user(vec![Part::Text {
                text: ASSISTANT_SYSTEM_INSTRUCTION.to_string(),
            }])),
            generation_config: Some(GenerationConfig {
                temperature: Some(0.4),
                top_p: Some(0.8),
                top_k: Some(40),
                response_mime_type: None,
                response_schema: None,
            }),
            tools: None,
        };

        let response = match generate(
            &self.client,
            &self.base_url,
            &self.api_key,
            CHAT_MODEL,
            &request,
        )
        .await
        {
            Ok(response) => response,
            Err(err) => {
                // Keep the session transcript consistent with what the
                // backend actually saw.
                contents.pop();
                return Err(err.into());
            }
        };

        let reply = response_text(&response);
        contents.push(Content {
            role: "model".to_string(),
            parts: vec![Part::Text {
                text: reply.clone(),
            }],
        });
        Ok(reply)
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .unwrap_or_default()
}

async fn generate(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    request: &GenerateContentRequest,
) -> Result<GenerateContentResponse> {
    let url = format!("{base_url}/models/{model}:generateContent?key={api_key}");

    let resp = match client
        .post(&url)
        .header("content-type", "application/json")
        .json(request)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) if e.is_timeout() => {
            return Err(anyhow!("gemini api error (timeout): request timed out"));
        }
        Err(e) if e.is_connect() => {
            return Err(anyhow!("gemini api error (connect): {e}"));
        }
        Err(e) => return Err(e.into()),
    };

    let status = resp.status();
    if status != StatusCode::OK {
        let text = resp.text().await.unwrap_or_default();
        return Err(anyhow!("gemini api error ({status}): {text}"));
    }

    Ok(resp.json().await?)
}

fn image_parts(images: &[ImageBlob]) -> Vec<Part> {
    images
        .iter()
        .map(|image| Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: BASE64_STANDARD.encode(&image.data),
            },
        })
        .collect()
}

fn description_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "title": {
                "type": "STRING",
                "description": "Catchy product title, under 80 characters."
            },
            "description": {
                "type": "STRING",
                "description": "Detailed and persuasive product description."
            }
        },
        "required": ["title", "description"]
    })
}

fn parse_item_copy(response: &GenerateContentResponse) -> Result<ItemCopy, Error> {
    let text = response_text(response);
    serde_json::from_str(text.trim()).map_err(Error::MalformedResponse)
}

fn parse_price_estimate(response: &GenerateContentResponse) -> PriceEstimate {
    let price = sanitize_price(&response_text(response));
    let sources = response
        .candidates
        .first()
        .and_then(|c| c.grounding_metadata.as_ref())
        .map(|metadata| {
            metadata
                .grounding_chunks
                .iter()
                .map(|chunk| GroundingChunk {
                    title: chunk.web.as_ref().and_then(|w| w.title.clone()),
                    uri: chunk.web.as_ref().and_then(|w| w.uri.clone()),
                })
                .collect()
        })
        .unwrap_or_default();
    PriceEstimate { price, sources }
}

/// Strip everything but digits and decimal points before parsing. A text
/// that still fails to parse prices the item at zero, never errors.
pub fn sanitize_price(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().unwrap_or(0.0)
}

fn response_text(response: &GenerateContentResponse) -> String {
    let mut text = String::new();
    if let Some(candidate) = response.candidates.first() {
        for part in &candidate.content.parts {
            if let Part::Text { text: t } = part {
                text.push_str(t);
            }
        }
    }
    text
}

// ============================================================
// Gemini API Types
// ============================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn user(parts: Vec<Part>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<RawGroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawGroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Clone, Deserialize)]
struct WebSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_request_asks_for_structured_output() {
        let images = vec![ImageBlob::new(vec![1, 2, 3], "image/png")];
        let request = GeminiListingClient::describe_request(&images);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            json["generationConfig"]["responseSchema"]["required"],
            serde_json::json!(["title", "description"])
        );
        assert_eq!(json["contents"][0]["role"], "user");
        // image part first, prompt text last
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert!(json["contents"][0]["parts"][1]["text"]
            .as_str()
            .unwrap()
            .contains("under 80 characters"));
    }

    #[test]
    fn price_request_enables_search_grounding() {
        let images = vec![ImageBlob::new(vec![1], "image/jpeg")];
        let request = GeminiListingClient::price_request(&images);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["tools"][0]["googleSearch"], serde_json::json!({}));
        assert!(json["generationConfig"].get("responseSchema").is_none());
        assert!(json["contents"][0]["parts"][1]["text"]
            .as_str()
            .unwrap()
            .contains("Do not include currency symbols"));
    }

    #[test]
    fn sanitize_price_strips_symbols_and_text() {
        assert_eq!(sanitize_price("25.00"), 25.0);
        assert_eq!(sanitize_price("$1,299.99"), 1299.99);
        assert_eq!(sanitize_price("around 42 USD"), 42.0);
    }

    #[test]
    fn sanitize_price_defaults_to_zero() {
        assert_eq!(sanitize_price(""), 0.0);
        assert_eq!(sanitize_price("unknown"), 0.0);
        // Two decimal points survive the strip and fail the parse.
        assert_eq!(sanitize_price("12.34.56"), 0.0);
    }

    #[test]
    fn parse_item_copy_reads_schema_fields() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "{\"title\":\"Vintage Camera\",\"description\":\"Works great.\"}"}]
                }
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let copy = parse_item_copy(&response).unwrap();
        assert_eq!(copy.title, "Vintage Camera");
        assert_eq!(copy.description, "Works great.");
    }

    #[test]
    fn parse_item_copy_rejects_non_json_text() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Sure! Here is a title: ..."}]}
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let err = parse_item_copy(&response).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn parse_item_copy_rejects_missing_field() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"title\":\"only\"}"}]}
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            parse_item_copy(&response),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn parse_price_estimate_maps_grounding_chunks() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "34.99"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"title": "eBay sold listings", "uri": "https://ebay.com/sold"}},
                        {"web": {"uri": "https://mercari.com/item"}},
                        {}
                    ]
                }
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let estimate = parse_price_estimate(&response);
        assert_eq!(estimate.price, 34.99);
        assert_eq!(estimate.sources.len(), 3);
        assert_eq!(estimate.sources[0].title.as_deref(), Some("eBay sold listings"));
        assert_eq!(estimate.sources[1].title, None);
        assert_eq!(estimate.sources[2].uri, None);
    }

    #[test]
    fn parse_price_estimate_degrades_to_zero_without_candidates() {
        let raw = serde_json::json!({"candidates": []});
        let response: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let estimate = parse_price_estimate(&response);
        assert_eq!(estimate.price, 0.0);
        assert!(estimate.sources.is_empty());
    }
}
