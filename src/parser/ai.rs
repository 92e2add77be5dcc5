use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::models::ListingType;
use crate::parser::gazetteer;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are an expert at parsing Hebrew and English apartment \
rental listings from Tel Aviv social-media groups. Extract from the listing:\n\
- price_min, price_max: monthly rent range in NIS; for a single price set both to it.\n\
- rooms: number of rooms, may be fractional like 2.5 or 3.5.\n\
- neighborhoods: array of normalized area names, e.g. florentin, neve_tzedek, \
lev_hair, rothschild, dizengoff, basel, old_north, new_north, ramat_aviv, \
shapira, hatikva, yaffo, ramat_gan.\n\
- listing_type: \"room\" when a room or roommate is offered, \"whole_apartment\" \
when the entire apartment is for rent, null when unclear.\n\
Return ONLY valid JSON with exactly these fields, null for unknowns and [] when \
no neighborhood is found.";

/// Fixed output schema for the AI extraction call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiListingFields {
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub rooms: Option<f32>,
    #[serde(default)]
    pub neighborhoods: Vec<String>,
    pub listing_type: Option<String>,
}

impl AiListingFields {
    /// Map the schema's listing_type string onto the typed enum; anything
    /// unexpected is treated as absent rather than an error.
    pub fn typed_listing(&self) -> Option<ListingType> {
        match self.listing_type.as_deref() {
            Some("room") => Some(ListingType::Room),
            Some("whole_apartment") => Some(ListingType::WholeApartment),
            _ => None,
        }
    }

    /// Neighborhoods the gazetteer recognizes; hallucinated names are dropped.
    pub fn known_neighborhoods(&self) -> Vec<String> {
        self.neighborhoods
            .iter()
            .filter(|n| gazetteer::is_known(n))
            .cloned()
            .collect()
    }
}

/// Seam for the external AI extraction service, mockable in tests.
#[async_trait]
pub trait AiExtractor: Send + Sync {
    async fn extract(&self, raw_text: &str) -> Result<AiListingFields, ParseError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: serde_json::Value,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Chat-completions based extractor with an explicit timeout and a small
/// bounded retry count. Timeouts retry; a malformed body never does.
pub struct OpenAiExtractor {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_attempts: u32,
}

impl OpenAiExtractor {
    pub fn new(api_key: &str, model: &str, timeout: Duration, max_attempts: u32) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: OPENAI_API_URL.to_string(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, ParseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| ParseError::Request(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn call_once(
        &self,
        raw_text: &str,
        headers: HeaderMap,
    ) -> Result<String, reqwest::Error> {
        let url = format!("{}/chat/completions", self.base_url);
        // Long posts blow the token budget without adding signal.
        let clipped: String = raw_text.chars().take(2000).collect();
        let user_prompt = format!("Parse this listing:\n\n{clipped}");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            response_format: serde_json::json!({"type": "json_object"}),
            temperature: 0.1,
            max_tokens: 500,
        };

        debug!(model = %self.model, "AI extraction request");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = response.json().await?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl AiExtractor for OpenAiExtractor {
    async fn extract(&self, raw_text: &str) -> Result<AiListingFields, ParseError> {
        // A key that cannot form a header will never authenticate; fail
        // here instead of sending a doomed request.
        let headers = self.headers()?;
        let mut timed_out = false;

        for attempt in 1..=self.max_attempts {
            match self.call_once(raw_text, headers.clone()).await {
                Ok(content) => {
                    // Schema violations are not retried; resending the same
                    // text buys nothing.
                    return serde_json::from_str::<AiListingFields>(&content)
                        .map_err(|e| ParseError::MalformedResponse(e.to_string()));
                }
                Err(e) if e.is_timeout() => {
                    timed_out = true;
                    warn!(attempt, "AI extraction timed out");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "AI extraction request failed");
                    if attempt == self.max_attempts {
                        return Err(ParseError::Request(e.to_string()));
                    }
                }
            }
        }

        if timed_out {
            Err(ParseError::AiTimeout {
                attempts: self.max_attempts,
            })
        } else {
            Err(ParseError::Request("retries exhausted".to_string()))
        }
    }
}
