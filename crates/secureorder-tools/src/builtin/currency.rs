use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::traits::Tool;
use secureorder_core::types::{ParamSpec, ParamType};

use super::{exec_err, get_json, http_client, str_arg};

const EXCHANGE_RATE_BASE_URL: &str = "https://v6.exchangerate-api.com";

/// Currency conversion through ExchangeRate-API's pair endpoint.
pub struct CurrencyConvertTool {
    api_key: Option<String>,
    http: reqwest::Client,
    base_url: String,
}

impl CurrencyConvertTool {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, EXCHANGE_RATE_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: &str) -> Self {
        Self {
            api_key,
            http: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Tool for CurrencyConvertTool {
    fn name(&self) -> &str {
        "convert_currency"
    }

    fn description(&self) -> &str {
        "Convert an amount from one currency to another (e.g., USD to PKR). \
         The amount must be a plain number, not an expression."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("amount", ParamType::Number, "Amount to convert"),
            ParamSpec::required("from_curr", ParamType::String, "ISO code of the source currency"),
            ParamSpec::required("to_curr", ParamType::String, "ISO code of the target currency"),
        ]
    }

    fn timeout_secs(&self) -> Option<u64> {
        Some(15)
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let amount = args
                .get("amount")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| SecureOrderError::ToolValidation("'amount' must be a number".into()))?;
            let from = currency_code(&args, "from_curr")?;
            let to = currency_code(&args, "to_curr")?;
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| exec_err(self.name(), "ExchangeRate API key not configured"))?;

            let url = pair_url(&self.base_url, api_key, &from, &to, amount)
                .map_err(|m| exec_err(self.name(), m))?;
            let body = get_json(self.name(), self.http.get(url)).await?;
            let converted = parse_conversion(&body).map_err(|m| exec_err(self.name(), m))?;

            Ok(json!({
                "type": "currency_conversion",
                "amount": amount,
                "from": from,
                "to": to,
                "result": converted,
                "text": format!(
                    "Currency Conversion: {} {} is approximately {:.2} {}.",
                    amount, from, converted, to
                ),
            }))
        })
    }
}

/// An ISO 4217 style code: exactly three ASCII letters, upper-cased.
fn currency_code(args: &Map<String, Value>, name: &str) -> Result<String> {
    let code = str_arg(args, name)?.trim();
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(SecureOrderError::ToolValidation(format!(
            "'{}' must be a three-letter currency code, got '{}'",
            name, code
        )));
    }
    Ok(code.to_ascii_uppercase())
}

/// `{base}/v6/{key}/pair/{from}/{to}/{amount}`, each part pushed as one
/// encoded path segment.
fn pair_url(
    base: &str,
    api_key: &str,
    from: &str,
    to: &str,
    amount: f64,
) -> std::result::Result<reqwest::Url, String> {
    let mut url = reqwest::Url::parse(base).map_err(|e| format!("invalid base URL: {}", e))?;
    url.path_segments_mut()
        .map_err(|_| format!("base URL cannot take a path: {}", base))?
        .pop_if_empty()
        .extend(["v6", api_key, "pair", from, to, &amount.to_string()]);
    Ok(url)
}

/// Read `conversion_result`, surfacing the service's `error-type` on failure.
fn parse_conversion(body: &Value) -> std::result::Result<f64, String> {
    if body["result"].as_str() == Some("error") {
        let kind = body["error-type"].as_str().unwrap_or("unknown error");
        return Err(format!("conversion service error: {}", kind));
    }
    body["conversion_result"]
        .as_f64()
        .ok_or_else(|| "conversion result missing from response".to_string())
}
