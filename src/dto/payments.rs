use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    pub order_id: i64,
    /// Payer phone in MSISDN form, e.g. 254712345678.
    pub phone: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InitiatePaymentResponse {
    pub order_id: i64,
    pub correlation_id: String,
}

/// Daraja wraps its webhook payload in `Body.stkCallback`. The field names
/// below are fixed by Safaricom, not ours to choose.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

/// Acknowledgement the gateway expects back. Always sent with a 200 so the
/// gateway stops retrying, whatever we made of the payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

impl CallbackAck {
    pub fn success() -> Self {
        Self {
            result_code: 0,
            result_desc: "Success",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_callback() {
        let raw = serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": 200.0 },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" }
                        ]
                    }
                }
            }
        });
        let envelope: CallbackEnvelope = serde_json::from_value(raw).unwrap();
        let callback = envelope.body.stk_callback;
        assert!(callback.is_success());
        assert_eq!(callback.checkout_request_id, "ws_CO_191220191020363925");
    }

    #[test]
    fn parses_failure_callback() {
        let raw = serde_json::json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user."
                }
            }
        });
        let envelope: CallbackEnvelope = serde_json::from_value(raw).unwrap();
        assert!(!envelope.body.stk_callback.is_success());
    }

    #[test]
    fn ack_serializes_gateway_shape() {
        let json = serde_json::to_value(CallbackAck::success()).unwrap();
        assert_eq!(json["ResultCode"], 0);
        assert_eq!(json["ResultDesc"], "Success");
    }
}
