use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::user::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

/// Payment record stored in the "payments" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub email: String,
    /// Amount in kobo, as sent to the gateway.
    pub amount_kobo: i64,
    pub currency: String,
    pub status: PaymentRecordStatus,
    pub paystack_reference: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    Pending,
    Success,
    Failed,
}

/// Response to the client after initializing a transaction
#[derive(Debug, Serialize)]
pub struct InitializePaymentResponse {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
    pub amount_kobo: i64,
    pub currency: String,
}

/// Result of verifying a transaction by reference
#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub reference: String,
    pub status: PaymentRecordStatus,
    /// True once the account has been unlocked by this payment.
    pub activated: bool,
}

// ---- Paystack wire types (request/response bodies of the gateway API) ----

#[derive(Debug, Serialize)]
pub struct PaystackInitRequest {
    pub email: String,
    /// Kobo (naira * 100).
    pub amount: i64,
    pub currency: String,
    pub callback_url: String,
    pub metadata: PaystackMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackMetadata {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaystackInitResponse {
    pub status: bool,
    pub message: String,
    pub data: PaystackInitData,
}

#[derive(Debug, Deserialize)]
pub struct PaystackInitData {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct PaystackVerifyResponse {
    pub status: bool,
    pub message: String,
    pub data: PaystackTransactionData,
}

#[derive(Debug, Deserialize)]
pub struct PaystackTransactionData {
    /// "success" | "failed" | "abandoned" | ...
    pub status: String,
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<PaystackMetadata>,
}

/// Webhook envelope posted by Paystack (signature-verified before decode)
#[derive(Debug, Deserialize)]
pub struct PaystackWebhookEvent {
    pub event: String,
    pub data: PaystackTransactionData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_paystack_verify_payload() {
        let payload = r#"{
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "reference": "ref-123",
                "amount": 500000,
                "currency": "NGN",
                "paid_at": "2024-05-01T12:00:00.000Z",
                "metadata": { "user_id": "abc123" }
            }
        }"#;

        let decoded: PaystackVerifyResponse = serde_json::from_str(payload).unwrap();
        assert!(decoded.status);
        assert_eq!(decoded.data.status, "success");
        assert_eq!(decoded.data.amount, 500000);
        assert_eq!(decoded.data.metadata.unwrap().user_id, "abc123");
    }

    #[test]
    fn decodes_webhook_event_without_metadata() {
        let payload = r#"{
            "event": "charge.success",
            "data": {
                "status": "success",
                "reference": "ref-456",
                "amount": 500000,
                "currency": "NGN"
            }
        }"#;

        let decoded: PaystackWebhookEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded.event, "charge.success");
        assert!(decoded.data.metadata.is_none());
        assert!(decoded.data.paid_at.is_none());
    }
}
