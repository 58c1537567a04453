use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use secureorder_core::error::Result;
use secureorder_core::traits::Tool;
use secureorder_core::types::{ParamSpec, ParamType};

use super::{exec_err, get_json, http_client, str_arg};

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Live commodity prices from the Yahoo Finance chart endpoint.
pub struct MaterialPriceTool {
    http: reqwest::Client,
    base_url: String,
}

impl MaterialPriceTool {
    pub fn new() -> Self {
        Self::with_base_url(YAHOO_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for MaterialPriceTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for MaterialPriceTool {
    fn name(&self) -> &str {
        "get_material_price"
    }

    fn description(&self) -> &str {
        "Fetch the live price for an industrial material by market ticker. \
         Examples: 'HG=F' (Copper), 'ALI=F' (Aluminum), 'GC=F' (Gold)."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required(
            "ticker",
            ParamType::String,
            "Market ticker symbol, e.g. HG=F",
        )]
    }

    fn timeout_secs(&self) -> Option<u64> {
        Some(15)
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let ticker = str_arg(&args, "ticker")?.trim().to_uppercase();
            let request = self
                .http
                .get(format!("{}/v8/finance/chart/{}", self.base_url, ticker))
                .query(&[("interval", "1d"), ("range", "1d")]);
            let body = get_json(self.name(), request).await?;
            let (price, currency) = parse_chart(&body)
                .ok_or_else(|| exec_err(self.name(), format!("no live price for {}", ticker)))?;

            Ok(json!({
                "type": "market_price",
                "ticker": ticker,
                "price": price,
                "currency": currency,
                "text": format!("Live market update: The price for {} is ${:.2}.", ticker, price),
            }))
        })
    }
}

/// Extract `regularMarketPrice` and currency from a chart response.
fn parse_chart(body: &Value) -> Option<(f64, Option<String>)> {
    let meta = &body["chart"]["result"][0]["meta"];
    let price = meta["regularMarketPrice"].as_f64()?;
    let currency = meta["currency"].as_str().map(String::from);
    Some((price, currency))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chart_meta() {
        let body = json!({
            "chart": {
                "result": [{ "meta": { "regularMarketPrice": 4.1234, "currency": "USD" } }],
                "error": null
            }
        });
        let (price, currency) = parse_chart(&body).unwrap();
        assert!((price - 4.1234).abs() < f64::EPSILON);
        assert_eq!(currency.as_deref(), Some("USD"));
    }

    #[test]
    fn missing_result_is_none() {
        let body = json!({
            "chart": { "result": null, "error": { "code": "Not Found" } }
        });
        assert!(parse_chart(&body).is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let tool = MaterialPriceTool::with_base_url("http://localhost:9000/");
        assert_eq!(tool.base_url, "http://localhost:9000");
    }
}
