use swiftsell_provider::{
    AssistantClient, GeminiAssistantClient, GeminiListingClient, ImageBlob, ListingClient,
};
use swiftsell_schema::{ChatMessage, Error};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn one_image() -> Vec<ImageBlob> {
    vec![ImageBlob::new(vec![0x89, 0x50, 0x4e, 0x47], "image/png")]
}

fn text_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]}
        }]
    }))
}

#[tokio::test]
async fn describe_parses_structured_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(serde_json::json!({
            "generationConfig": {"responseMimeType": "application/json"}
        })))
        .respond_with(text_response(
            "{\"title\":\"Retro Lamp\",\"description\":\"Warm glow, solid base.\"}",
        ))
        .mount(&server)
        .await;

    let client = GeminiListingClient::new("test-key").with_base_url(server.uri());
    let copy = client.describe(&one_image()).await.unwrap();
    assert_eq!(copy.title, "Retro Lamp");
    assert_eq!(copy.description, "Warm glow, solid base.");
}

#[tokio::test]
async fn describe_surfaces_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .respond_with(text_response("Here's a great title for you!"))
        .mount(&server)
        .await;

    let client = GeminiListingClient::new("test-key").with_base_url(server.uri());
    let err = client.describe(&one_image()).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
}

#[tokio::test]
async fn describe_propagates_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let client = GeminiListingClient::new("test-key").with_base_url(server.uri());
    let err = client.describe(&one_image()).await.unwrap_err();
    assert!(err.to_string().contains("quota exceeded") || matches!(err, Error::Backend(_)));
}

#[tokio::test]
async fn estimate_price_sanitizes_and_collects_sources() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "$27.50 USD"}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"title": "eBay comps", "uri": "https://ebay.com/c"}}
                    ]
                }
            }]
        })))
        .mount(&server)
        .await;

    let client = GeminiListingClient::new("test-key").with_base_url(server.uri());
    let estimate = client.estimate_price(&one_image()).await.unwrap();
    assert_eq!(estimate.price, 27.50);
    assert_eq!(estimate.sources.len(), 1);
    assert_eq!(estimate.sources[0].title.as_deref(), Some("eBay comps"));
}

#[tokio::test]
async fn estimate_price_never_errors_on_garbage_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(text_response("I could not determine a price."))
        .mount(&server)
        .await;

    let client = GeminiListingClient::new("test-key").with_base_url(server.uri());
    let estimate = client.estimate_price(&one_image()).await.unwrap();
    assert_eq!(estimate.price, 0.0);
    assert!(estimate.sources.is_empty());
}

#[tokio::test]
async fn analyze_images_merges_both_calls() {
    let server = MockServer::start().await;
    // The structured-output call carries a response schema; the grounded
    // price call carries the search tool. Match on those.
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "generationConfig": {"responseMimeType": "application/json"}
        })))
        .respond_with(text_response(
            "{\"title\":\"Mountain Bike\",\"description\":\"26in wheels.\"}",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "tools": [{"googleSearch": {}}]
        })))
        .respond_with(text_response("140"))
        .mount(&server)
        .await;

    let client = GeminiListingClient::new("test-key").with_base_url(server.uri());
    let analysis = client.analyze_images(&one_image()).await.unwrap();
    assert_eq!(analysis.item.title, "Mountain Bike");
    assert_eq!(analysis.item.price, 140.0);
}

#[tokio::test]
async fn assistant_session_accumulates_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .respond_with(text_response("Tap the camera button to start."))
        .mount(&server)
        .await;

    let client = GeminiAssistantClient::new("test-key").with_base_url(server.uri());

    let mut history = vec![ChatMessage::user("How do I start?")];
    let first = client.respond(&history).await.unwrap();
    assert_eq!(first, "Tap the camera button to start.");

    history.push(ChatMessage::assistant(first));
    history.push(ChatMessage::user("And then?"));
    let _second = client.respond(&history).await.unwrap();

    // Second request must replay the whole session: user, model, user.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let body: serde_json::Value = parse_body(&requests[1]);
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[2]["parts"][0]["text"], "And then?");
    assert!(body["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .contains("SwiftSell AI"));
}

#[tokio::test]
async fn assistant_failed_turn_is_not_recorded_in_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(text_response("Recovered."))
        .mount(&server)
        .await;

    let client = GeminiAssistantClient::new("test-key").with_base_url(server.uri());
    let history = vec![ChatMessage::user("hello?")];
    assert!(client.respond(&history).await.is_err());
    assert!(client.respond(&history).await.is_ok());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = parse_body(&requests[1]);
    // The failed turn was rolled back; the retry carries a single message.
    assert_eq!(body["contents"].as_array().unwrap().len(), 1);
}

fn parse_body(request: &Request) -> serde_json::Value {
    serde_json::from_slice(&request.body).unwrap()
}
