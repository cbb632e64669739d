use super::structs::{ForecastResponse, WeatherParams};
use crate::tools::{ToolResult, tool};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com";

pub struct WeatherTool {
    base_url: String,
    client: reqwest::Client,
}

impl WeatherTool {
    pub fn new() -> Self {
        Self::with_base_url(OPEN_METEO_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[tool(name = "get_weather", description = r#"Get current temperature for provided coordinates in celsius.

Returns only the numeric temperature, e.g. `14.2`."#, capabilities = [ToolCapability::Network])]
impl WeatherTool {
    async fn execute(&self, params: WeatherParams) -> ToolResult {
        let url = format!("{}/v1/forecast", self.base_url);
        debug!(target: "roundtrip::tool", "get_weather lat={} lon={}", params.latitude, params.longitude);

        let response = self.client
            .get(&url)
            .query(&[
                ("latitude", params.latitude.to_string()),
                ("longitude", params.longitude.to_string()),
                ("current", "temperature_2m".to_string()),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Weather request failed: {}", e))
        };

        let status = response.status();
        if !status.is_success() {
            return ToolResult::error(format!("Weather request failed with status: {}", status));
        }

        let forecast: ForecastResponse = match response.json().await {
            Ok(f) => f,
            Err(e) => return ToolResult::error(format!("Failed to decode forecast: {}", e))
        };

        let mut meta = HashMap::new();
        meta.insert("latitude".to_string(), json!(params.latitude));
        meta.insert("longitude".to_string(), json!(params.longitude));
        if let Some(unit) = forecast.current_units.and_then(|u| u.temperature_2m) {
            meta.insert("unit".to_string(), json!(unit));
        }
        if let Some(time) = forecast.current.time {
            meta.insert("time".to_string(), json!(time));
        }

        ToolResult::Success {
            output: forecast.current.temperature_2m.to_string(),
            metadata: Some(meta),
        }
    }
}
