use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use serde::Deserialize;

use crate::config::RampConfig;
use crate::error::QuoteError;
use crate::executor::CallRequest;

/// A priced swap route from the aggregator. Ephemeral and single-use: if the
/// swap transaction reverts the call-data is considered stale and must never
/// be resubmitted verbatim — request a fresh quote instead.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    pub from_token: Address,
    pub to_token: Address,
    pub from_amount: U256,
    /// The aggregator's output estimate. The payout uses the realized amount
    /// measured on-chain, never this figure.
    pub to_token_amount: U256,
    pub call: CallRequest,
}

/// Aggregator seam. The orchestrator — not implementations — owns retry
/// policy; implementations only classify failures via [`QuoteError`].
pub trait QuoteApi: Send + Sync {
    /// Fetch ERC-20 approval call-data for spending `amount` of `token`.
    fn get_approval(
        &self,
        token: Address,
        amount: U256,
    ) -> impl std::future::Future<Output = Result<CallRequest, QuoteError>> + Send;

    /// Fetch a swap quote plus executable call-data.
    fn get_swap_quote(
        &self,
        from_token: Address,
        to_token: Address,
        amount: U256,
        from_address: Address,
    ) -> impl std::future::Future<Output = Result<SwapQuote, QuoteError>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveCalldataResponse {
    to: String,
    data: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    to_token_amount: String,
    tx: SwapTx,
}

#[derive(Debug, Deserialize)]
struct SwapTx {
    to: String,
    data: String,
    value: String,
}

/// HTTP client for the swap aggregator. Stateless request/response; no quote
/// is cached or reused across orchestration attempts.
pub struct QuoteClient {
    http: reqwest::Client,
    base_url: String,
    chain_id: u64,
    slippage: f64,
    timeout: Duration,
}

impl QuoteClient {
    pub fn new(http: reqwest::Client, config: &RampConfig) -> Self {
        Self {
            http,
            base_url: config.aggregator_base_url.trim_end_matches('/').to_string(),
            chain_id: config.chain_id,
            slippage: config.slippage,
            timeout: config.http_timeout,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, QuoteError> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| QuoteError::Transient(e.to_string()))?;

        let response = classify_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| QuoteError::Decode(e.to_string()))
    }
}

/// Map aggregator HTTP statuses onto the retry taxonomy: 429 is retryable
/// after backoff, a liquidity rejection is terminal, everything else
/// unexpected is transient.
async fn classify_status(response: reqwest::Response) -> Result<reqwest::Response, QuoteError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(QuoteError::RateLimited);
    }
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        if body.to_ascii_lowercase().contains("insufficient liquidity") {
            return Err(QuoteError::InsufficientLiquidity);
        }
        return Err(QuoteError::Transient(format!(
            "aggregator returned {status}: {body}"
        )));
    }
    if status.is_server_error() {
        return Err(QuoteError::Transient(format!("aggregator returned {status}")));
    }
    Ok(response)
}

fn parse_address(s: &str) -> Result<Address, QuoteError> {
    s.parse::<Address>()
        .map_err(|e| QuoteError::Decode(format!("bad address {s:?}: {e}")))
}

fn parse_calldata(s: &str) -> Result<Bytes, QuoteError> {
    s.parse::<Bytes>()
        .map_err(|e| QuoteError::Decode(format!("bad call-data: {e}")))
}

fn parse_amount(s: &str) -> Result<U256, QuoteError> {
    s.parse::<U256>()
        .map_err(|e| QuoteError::Decode(format!("bad amount {s:?}: {e}")))
}

impl QuoteApi for QuoteClient {
    async fn get_approval(
        &self,
        token: Address,
        amount: U256,
    ) -> Result<CallRequest, QuoteError> {
        let url = format!(
            "{}/{}/approve/calldata?tokenAddress={token}&amount={amount}",
            self.base_url, self.chain_id
        );
        let body: ApproveCalldataResponse = self.get_json(&url).await?;

        Ok(CallRequest {
            to: parse_address(&body.to)?,
            data: parse_calldata(&body.data)?,
            value: body
                .value
                .as_deref()
                .map(parse_amount)
                .transpose()?
                .unwrap_or(U256::ZERO),
        })
    }

    async fn get_swap_quote(
        &self,
        from_token: Address,
        to_token: Address,
        amount: U256,
        from_address: Address,
    ) -> Result<SwapQuote, QuoteError> {
        let url = format!(
            "{}/{}/swap?fromTokenAddress={from_token}&toTokenAddress={to_token}\
             &amount={amount}&fromAddress={from_address}&slippage={}&disableEstimate=true",
            self.base_url, self.chain_id, self.slippage
        );
        let body: SwapResponse = self.get_json(&url).await?;

        Ok(SwapQuote {
            from_token,
            to_token,
            from_amount: amount,
            to_token_amount: parse_amount(&body.to_token_amount)?,
            call: CallRequest {
                to: parse_address(&body.tx.to)?,
                data: parse_calldata(&body.tx.data)?,
                value: parse_amount(&body.tx.value)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_response_decoding() {
        let raw = r#"{
            "toTokenAmount": "98700",
            "tx": {
                "to": "0x1111111254fb6c44bAC0beD2854e76F90643097d",
                "data": "0x90411a32",
                "value": "0"
            }
        }"#;
        let body: SwapResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.to_token_amount, "98700");
        assert_eq!(parse_amount(&body.to_token_amount).unwrap(), U256::from(98700u64));
        assert_eq!(parse_calldata(&body.tx.data).unwrap().len(), 4);
    }

    #[test]
    fn test_approve_response_without_value() {
        let raw = r#"{
            "to": "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270",
            "data": "0x095ea7b3"
        }"#;
        let body: ApproveCalldataResponse = serde_json::from_str(raw).unwrap();
        assert!(body.value.is_none());
    }

    #[test]
    fn test_bad_amount_is_decode_error() {
        assert!(matches!(
            parse_amount("not-a-number"),
            Err(QuoteError::Decode(_))
        ));
    }

    #[test]
    fn test_bad_address_is_decode_error() {
        assert!(matches!(parse_address("0x123"), Err(QuoteError::Decode(_))));
    }

    #[tokio::test]
    async fn test_unreachable_aggregator_is_transient() {
        let mut config = RampConfig::default();
        config.aggregator_base_url = "http://127.0.0.1:1".to_string();
        config.http_timeout = Duration::from_millis(200);
        let client = QuoteClient::new(reqwest::Client::new(), &config);

        let err = client
            .get_approval(crate::config::WMATIC, U256::from(1u64))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
