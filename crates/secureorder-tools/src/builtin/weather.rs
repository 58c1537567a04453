use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use secureorder_core::error::Result;
use secureorder_core::traits::Tool;
use secureorder_core::types::{ParamSpec, ParamType};

use super::{exec_err, get_json, http_client, str_arg};

const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";

/// Current conditions from OpenWeather, used to anticipate logistics delays.
pub struct ShippingWeatherTool {
    api_key: Option<String>,
    http: reqwest::Client,
    base_url: String,
}

impl ShippingWeatherTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, OPENWEATHER_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            api_key,
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Tool for ShippingWeatherTool {
    fn name(&self) -> &str {
        "get_shipping_weather"
    }

    fn description(&self) -> &str {
        "Check current weather conditions in a city to predict shipping or production delays."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("city", ParamType::String, "City name, e.g. Karachi")]
    }

    fn timeout_secs(&self) -> Option<u64> {
        Some(15)
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let city = str_arg(&args, "city")?;
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| exec_err(self.name(), "OpenWeather API key not configured"))?;

            let request = self
                .http
                .get(format!("{}/data/2.5/weather", self.base_url))
                .query(&[("q", city), ("appid", api_key), ("units", "metric")]);
            let body = get_json(self.name(), request).await?;
            let (condition, temp) = parse_weather(&body)
                .ok_or_else(|| exec_err(self.name(), format!("no weather data for {}", city)))?;

            Ok(json!({
                "type": "weather",
                "city": city,
                "condition": condition,
                "temperature_c": temp,
                "text": format!(
                    "Weather Report for {}: {}, {}°C. Check for potential logistics delays if conditions are severe.",
                    city,
                    capitalize(&condition),
                    temp
                ),
            }))
        })
    }
}

fn parse_weather(body: &Value) -> Option<(String, f64)> {
    let condition = body["weather"][0]["description"].as_str()?.to_string();
    let temp = body["main"]["temp"].as_f64()?;
    Some((condition, temp))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let tool = ShippingWeatherTool::new(None);
        let mut args = Map::new();
        args.insert("city".into(), json!("Karachi"));
        let err = tool.execute(args).await.unwrap_err();
        assert!(err.to_string().contains("API key not configured"));
    }

    #[test]
    fn parses_current_conditions() {
        let body = json!({
            "weather": [{ "description": "light rain" }],
            "main": { "temp": 21.5 }
        });
        let (condition, temp) = parse_weather(&body).unwrap();
        assert_eq!(condition, "light rain");
        assert_eq!(temp, 21.5);
        assert_eq!(capitalize(&condition), "Light rain");
    }

    #[test]
    fn incomplete_body_is_none() {
        assert!(parse_weather(&json!({ "cod": "404" })).is_none());
    }
}
