use serde::Deserialize;
use schemars::JsonSchema;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WeatherParams {
    /// Latitude of the location in decimal degrees
    pub latitude: f64,
    /// Longitude of the location in decimal degrees
    pub longitude: f64,
}

/// Subset of the open-meteo forecast body
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ForecastResponse {
    pub current: CurrentWeather,
    #[serde(default)]
    pub current_units: Option<CurrentUnits>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CurrentWeather {
    pub temperature_2m: f64,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CurrentUnits {
    #[serde(default)]
    pub temperature_2m: Option<String>,
}
