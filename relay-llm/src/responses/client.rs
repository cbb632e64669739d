use futures::StreamExt;
use openai_dive::v1::error::APIError;
use reqwest::{Method, RequestBuilder, StatusCode};
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use super::stream::{ResponseEventStream, ResponseStreamEvent};
use super::types::{Response, ResponseRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI REST endpoints openai_dive does not cover: responses,
/// files and vector stores
#[derive(Clone, Debug)]
pub struct ResponsesClient {
    pub http_client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    /// sent with every request, e.g. OpenAI-Organization
    pub headers: HashMap<String, String>,
}

/// `{"error": {"message": ...}}` body of a failed call
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Map a non 2xx answer, keeping the server message when it sent a json error
fn api_error(status: StatusCode, body: String) -> APIError {
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|body| body.error.message)
        .unwrap_or(body);

    match status {
        StatusCode::BAD_REQUEST => APIError::InvalidRequestError(message),
        StatusCode::UNAUTHORIZED => APIError::AuthenticationError(message),
        StatusCode::FORBIDDEN => APIError::PermissionError(message),
        StatusCode::NOT_FOUND => APIError::NotFoundError(message),
        StatusCode::TOO_MANY_REQUESTS => APIError::RateLimitError(message),
        other => APIError::UnknownError(other.as_u16(), message),
    }
}

impl ResponsesClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            headers: HashMap::new(),
        }
    }

    /// OPENAI_API_KEY, and OPENAI_BASE_URL when set
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Some(Self::new(api_key, base_url))
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Authenticated request on `base_url + path`
    pub(crate) fn build_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.headers.iter().fold(
            self.http_client
                .request(method, format!("{}{}", self.base_url, path))
                .bearer_auth(&self.api_key),
            |request, (key, value)| request.header(key, value),
        )
    }

    /// Deserialize the body of a 2xx answer
    pub(crate) async fn parse_body<T: DeserializeOwned>(
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, APIError> {
        let response = result.map_err(|e| APIError::ParseError(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| APIError::ParseError(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status, text));
        }
        serde_json::from_str(&text).map_err(|e| APIError::ParseError(format!("{}: {}", e, text)))
    }

    /// POST /responses
    pub async fn create(&self, request: &ResponseRequest) -> Result<Response, APIError> {
        let mut request = request.clone();
        request.stream = None;

        debug!(target: "llm::http", model = %request.model, tools = request.tools.len(), "POST /responses");

        let result = self
            .build_request(Method::POST, "/responses")
            .json(&request)
            .send()
            .await;

        Self::parse_body(result).await
    }

    /// GET /responses/{id}
    pub async fn retrieve(&self, response_id: &str) -> Result<Response, APIError> {
        let result = self
            .build_request(Method::GET, &format!("/responses/{}", response_id))
            .send()
            .await;

        Self::parse_body(result).await
    }

    /// POST /responses with `stream: true`
    ///
    /// The stream ends after the first terminal event (completed, incomplete,
    /// failed or error) or when the server closes the connection.
    pub async fn create_stream(&self, request: &ResponseRequest) -> Result<ResponseEventStream, APIError> {
        let mut request = request.clone();
        request.stream = Some(true);

        debug!(target: "llm::http", model = %request.model, tools = request.tools.len(), "POST /responses (stream)");

        let event_source = self
            .build_request(Method::POST, "/responses")
            .json(&request)
            .eventsource()
            .map_err(|e| APIError::ParseError(e.to_string()))?;

        let stream = async_stream::stream! {
            let mut event_source = event_source;
            while let Some(event) = event_source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        if message.data == "[DONE]" {
                            break;
                        }

                        match serde_json::from_str::<ResponseStreamEvent>(&message.data) {
                            Ok(event) => {
                                let terminal = event.is_terminal();
                                yield Ok(event);
                                if terminal {
                                    break;
                                }
                            }
                            Err(e) => yield Err(APIError::ParseError(e.to_string())),
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        yield Err(APIError::StreamError(e.to_string()));
                        break;
                    }
                }
            }
            event_source.close();
        };

        Ok(Box::pin(stream))
    }
}
