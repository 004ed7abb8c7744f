use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MpesaConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TOKEN_ATTEMPTS: u32 = 3;
const TOKEN_BACKOFF: Duration = Duration::from_millis(500);

/// Client for the Daraja (Safaricom M-Pesa) REST API.
///
/// The token fetch is idempotent and retried a bounded number of times with
/// backoff. The STK push itself is issued exactly once per call: Daraja has
/// no idempotency key, so a blind retry could charge the customer twice.
#[derive(Clone)]
pub struct MpesaGateway {
    http: reqwest::Client,
    config: MpesaConfig,
}

/// Outcome of a successful STK push request.
#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct StkPushRequest<'a> {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: &'a str,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: &'static str,
    #[serde(rename = "Amount")]
    amount: i64,
    #[serde(rename = "PartyA")]
    party_a: &'a str,
    #[serde(rename = "PartyB")]
    party_b: &'a str,
    #[serde(rename = "PhoneNumber")]
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    #[serde(rename = "AccountReference")]
    account_reference: &'a str,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: &'static str,
}

impl MpesaGateway {
    pub fn new(config: MpesaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, config })
    }

    /// Initiate an STK push for `amount` KES to `phone`, returning the
    /// gateway's `CheckoutRequestID` correlation id.
    pub async fn stk_push(&self, phone: &str, amount: i64) -> Result<StkPushResponse> {
        let token = self.fetch_token().await?;
        let now = Utc::now();
        let timestamp = stk_timestamp(now);
        let password = stk_password(&self.config.shortcode, &self.config.passkey, &timestamp);

        let body = StkPushRequest {
            business_short_code: &self.config.shortcode,
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount,
            party_a: phone,
            party_b: &self.config.shortcode,
            phone_number: phone,
            callback_url: &self.config.callback_url,
            account_reference: &self.config.account_reference,
            transaction_desc: "Payment for order",
        };

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("stk push request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("stk push rejected ({status}): {detail}"));
        }

        let parsed: StkPushResponse = response
            .json()
            .await
            .context("stk push response was not valid json")?;
        if parsed.response_code != "0" {
            return Err(anyhow!(
                "stk push declined ({}): {}",
                parsed.response_code,
                parsed.response_description
            ));
        }
        Ok(parsed)
    }

    /// Fetch a short-lived OAuth bearer token. Safe to retry.
    async fn fetch_token(&self) -> Result<String> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let credentials = BASE64.encode(format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        ));

        let mut last_err = None;
        for attempt in 1..=TOKEN_ATTEMPTS {
            let result = self
                .http
                .get(&url)
                .header("Authorization", format!("Basic {credentials}"))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let token: TokenResponse = response
                        .json()
                        .await
                        .context("token response was not valid json")?;
                    return Ok(token.access_token);
                }
                Ok(response) => {
                    last_err = Some(anyhow!("token endpoint returned {}", response.status()));
                }
                Err(err) => {
                    last_err = Some(anyhow!(err).context("token request failed"));
                }
            }

            if attempt < TOKEN_ATTEMPTS {
                tracing::warn!(attempt, "mpesa token fetch failed, retrying");
                tokio::time::sleep(TOKEN_BACKOFF * attempt).await;
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("token fetch failed")))
    }
}

/// Daraja timestamp format: YYYYMMDDHHmmss.
fn stk_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// STK password: base64(shortcode + passkey + timestamp).
fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{shortcode}{passkey}{timestamp}"))
}
