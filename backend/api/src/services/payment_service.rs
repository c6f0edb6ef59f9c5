use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use sha2::Sha512;
use thiserror::Error;

use crate::config::PaystackConfig;
use crate::metrics::PAYMENTS_TOTAL;
use crate::models::payment::{
    InitializePaymentResponse, PaymentRecord, PaymentRecordStatus, PaystackInitRequest,
    PaystackInitResponse, PaystackMetadata, PaystackVerifyResponse, PaystackWebhookEvent,
    VerifyPaymentResponse,
};
use crate::models::user::User;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const PAYMENTS_COLLECTION: &str = "payments";

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    #[error("payment gateway returned error status {status}")]
    Gateway { status: u16 },
    #[error("webhook signature verification failed")]
    InvalidSignature,
}

pub struct PaymentService {
    mongo: Database,
    http_client: reqwest::Client,
    paystack: PaystackConfig,
}

impl PaymentService {
    pub fn new(mongo: Database, paystack: PaystackConfig) -> Self {
        Self {
            mongo,
            http_client: reqwest::Client::new(),
            paystack,
        }
    }

    fn payments(&self) -> mongodb::Collection<PaymentRecord> {
        self.mongo.collection::<PaymentRecord>(PAYMENTS_COLLECTION)
    }

    /// Initializes a Paystack transaction for the one-time activation fee and
    /// records it as pending.
    pub async fn initialize(&self, user_id: &str) -> Result<InitializePaymentResponse> {
        if self.paystack.secret_key.is_empty() {
            return Err(PaymentError::NotConfigured.into());
        }

        let user = self.find_user(user_id).await?;
        if user.is_active {
            return Err(anyhow!("Account already activated"));
        }

        let amount_kobo = self.paystack.activation_amount_naira as i64 * 100;
        let request = PaystackInitRequest {
            email: user.email.clone(),
            amount: amount_kobo,
            currency: "NGN".to_string(),
            callback_url: self.paystack.callback_url.clone(),
            metadata: PaystackMetadata {
                user_id: user_id.to_string(),
            },
        };

        let url = format!("{}/transaction/initialize", self.paystack.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.paystack.secret_key)
            .json(&request)
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
            .context("Failed to reach payment gateway")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Paystack initialize failed ({}): {}", status, body);
            PAYMENTS_TOTAL.with_label_values(&["init_failed"]).inc();
            return Err(PaymentError::Gateway { status }.into());
        }

        let init: PaystackInitResponse = response
            .json()
            .await
            .context("Failed to decode gateway response")?;
        if !init.status {
            tracing::error!("Paystack initialize rejected: {}", init.message);
            PAYMENTS_TOTAL.with_label_values(&["init_failed"]).inc();
            return Err(anyhow!("Payment gateway rejected the transaction"));
        }

        let record = PaymentRecord {
            id: None,
            user_id: user_id.to_string(),
            email: user.email,
            amount_kobo,
            currency: "NGN".to_string(),
            status: PaymentRecordStatus::Pending,
            paystack_reference: init.data.reference.clone(),
            created_at: Utc::now(),
            paid_at: None,
        };
        self.payments()
            .insert_one(&record)
            .await
            .context("Failed to record pending payment")?;

        PAYMENTS_TOTAL.with_label_values(&["initialized"]).inc();
        tracing::info!(
            "Payment initialized: {} for user: {}",
            init.data.reference,
            user_id
        );

        Ok(InitializePaymentResponse {
            authorization_url: init.data.authorization_url,
            access_code: init.data.access_code,
            reference: init.data.reference,
            amount_kobo,
            currency: "NGN".to_string(),
        })
    }

    /// Verifies a transaction by reference against the gateway and activates
    /// the account on success. Safe to call repeatedly. The reference must
    /// have been initialized by the calling user; anyone else gets the same
    /// answer as a reference that does not exist.
    pub async fn verify(&self, user_id: &str, reference: &str) -> Result<VerifyPaymentResponse> {
        if self.paystack.secret_key.is_empty() {
            return Err(PaymentError::NotConfigured.into());
        }

        let record = self
            .payments()
            .find_one(doc! { "paystack_reference": reference })
            .await
            .context("Failed to query payment record")?
            .ok_or_else(|| anyhow!("Payment record not found"))?;
        if !reference_owned_by(&record.user_id, None, user_id) {
            tracing::warn!(
                "User {} attempted to verify reference {} owned by {}",
                user_id,
                reference,
                record.user_id
            );
            return Err(anyhow!("Payment record not found"));
        }

        let url = format!("{}/transaction/verify/{}", self.paystack.base_url, reference);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.paystack.secret_key)
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
            .context("Failed to reach payment gateway")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(PaymentError::Gateway { status }.into());
        }

        let verify: PaystackVerifyResponse = response
            .json()
            .await
            .context("Failed to decode gateway response")?;

        if verify.data.status == "success" {
            // The gateway echoes back the metadata set at initialize; a
            // mismatch means the reference belongs to someone else.
            if !reference_owned_by(&record.user_id, verify.data.metadata.as_ref(), user_id) {
                tracing::warn!(
                    "Gateway metadata for reference {} does not match user {}",
                    reference,
                    user_id
                );
                return Err(anyhow!("Payment record not found"));
            }
            let paid_at = parse_paid_at(verify.data.paid_at.as_deref());
            self.activate(user_id, reference, paid_at).await?;
            PAYMENTS_TOTAL.with_label_values(&["success"]).inc();
            return Ok(VerifyPaymentResponse {
                reference: reference.to_string(),
                status: PaymentRecordStatus::Success,
                activated: true,
            });
        }

        self.mark_failed(reference).await?;
        PAYMENTS_TOTAL.with_label_values(&["failed"]).inc();
        Ok(VerifyPaymentResponse {
            reference: reference.to_string(),
            status: PaymentRecordStatus::Failed,
            activated: false,
        })
    }

    /// Verifies the HMAC-SHA512 signature Paystack puts in
    /// `x-paystack-signature` over the raw request body.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> Result<()> {
        if self.paystack.secret_key.is_empty() {
            return Err(PaymentError::NotConfigured.into());
        }

        let mut mac = HmacSha512::new_from_slice(self.paystack.secret_key.as_bytes())
            .map_err(|_| PaymentError::InvalidSignature)?;
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());

        if expected.eq_ignore_ascii_case(signature) {
            Ok(())
        } else {
            Err(PaymentError::InvalidSignature.into())
        }
    }

    /// Processes a signature-verified webhook event. Only `charge.success`
    /// carries state changes; everything else is logged and dropped.
    pub async fn handle_webhook(&self, event: PaystackWebhookEvent) -> Result<()> {
        if event.event != "charge.success" {
            tracing::debug!("Ignoring webhook event: {}", event.event);
            return Ok(());
        }

        let user_id = match event.data.metadata.as_ref().map(|m| m.user_id.clone()) {
            Some(id) => id,
            None => {
                // Fall back to the pending record for this reference.
                self.payments()
                    .find_one(doc! { "paystack_reference": &event.data.reference })
                    .await
                    .context("Failed to query payment record")?
                    .map(|r| r.user_id)
                    .ok_or_else(|| anyhow!("Webhook reference has no payment record"))?
            }
        };

        let paid_at = parse_paid_at(event.data.paid_at.as_deref());
        self.activate(&user_id, &event.data.reference, paid_at)
            .await?;
        PAYMENTS_TOTAL.with_label_values(&["success"]).inc();

        tracing::info!(
            "Webhook charge.success processed: {} for user: {}",
            event.data.reference,
            user_id
        );
        Ok(())
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<PaymentRecord>> {
        use futures::TryStreamExt;

        let mut cursor = self
            .payments()
            .find(doc! { "user_id": user_id })
            .sort(doc! { "createdAt": -1 })
            .await
            .context("Failed to query payment history")?;

        let mut records = Vec::new();
        while let Some(record) = cursor
            .try_next()
            .await
            .context("Failed to read payments cursor")?
        {
            records.push(record);
        }
        Ok(records)
    }

    /// Shared activation path for verify and webhook. Flips the payment
    /// record to success and unlocks the user. Retried because losing this
    /// write strands a paid account.
    async fn activate(
        &self,
        user_id: &str,
        reference: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let paid_at_bson = paid_at
            .map(|d| mongodb::bson::DateTime::from_millis(d.timestamp_millis()))
            .unwrap_or_else(|| {
                mongodb::bson::DateTime::from_millis(Utc::now().timestamp_millis())
            });

        let payments = self.payments();
        retry_async_with_config(RetryConfig::aggressive(), || {
            let payments = payments.clone();
            let paid_at_bson = paid_at_bson;
            async move {
                payments
                    .update_one(
                        doc! { "paystack_reference": reference },
                        doc! { "$set": { "status": "success", "paid_at": paid_at_bson } },
                    )
                    .await
                    .context("Failed to update payment record")
            }
        })
        .await?;

        let object_id = ObjectId::parse_str(user_id).context("Invalid user id")?;
        let users = self.mongo.collection::<User>("users");
        retry_async_with_config(RetryConfig::aggressive(), || {
            let users = users.clone();
            async move {
                users
                    .update_one(
                        doc! { "_id": object_id },
                        doc! { "$set": {
                            "is_active": true,
                            "payment_status": "paid",
                            "paystack_reference": reference,
                        }},
                    )
                    .await
                    .context("Failed to activate user")
            }
        })
        .await?;

        tracing::info!("Account activated: {} via {}", user_id, reference);
        Ok(())
    }

    async fn mark_failed(&self, reference: &str) -> Result<()> {
        self.payments()
            .update_one(
                doc! { "paystack_reference": reference, "status": "pending" },
                doc! { "$set": { "status": "failed" } },
            )
            .await
            .context("Failed to update payment record")?;
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<User> {
        let object_id = ObjectId::parse_str(user_id).context("Invalid user id")?;
        self.mongo
            .collection::<User>("users")
            .find_one(doc! { "_id": object_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow!("User not found"))
    }
}

/// A reference may only activate the account that initialized it. When the
/// gateway echoes metadata back, it must agree with the caller as well.
fn reference_owned_by(
    record_user_id: &str,
    metadata: Option<&PaystackMetadata>,
    caller: &str,
) -> bool {
    record_user_id == caller && metadata.map_or(true, |m| m.user_id == caller)
}

fn parse_paid_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaystackConfig;
    use mongodb::Client;

    async fn service_with_secret(secret: &str) -> PaymentService {
        // Client construction is lazy; no server connection happens here.
        let client = Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap();
        PaymentService::new(
            client.database("test"),
            PaystackConfig {
                secret_key: secret.to_string(),
                base_url: "https://api.paystack.co".to_string(),
                callback_url: "http://localhost:5173/dashboard".to_string(),
                activation_amount_naira: 5000,
            },
        )
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn webhook_signature_accepts_valid_hmac() {
        let service = service_with_secret("sk_test_secret").await;
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign("sk_test_secret", body);
        assert!(service.verify_webhook_signature(body, &signature).is_ok());
    }

    #[tokio::test]
    async fn webhook_signature_rejects_wrong_key_or_body() {
        let service = service_with_secret("sk_test_secret").await;
        let body = br#"{"event":"charge.success"}"#;

        let wrong_key = sign("sk_other_secret", body);
        assert!(service.verify_webhook_signature(body, &wrong_key).is_err());

        let valid = sign("sk_test_secret", body);
        let tampered = br#"{"event":"charge.failed"}"#;
        assert!(service.verify_webhook_signature(tampered, &valid).is_err());
    }

    #[test]
    fn reference_only_activates_its_owner() {
        let meta = |id: &str| PaystackMetadata {
            user_id: id.to_string(),
        };

        // Caller matches the record, with and without echoed metadata.
        assert!(reference_owned_by("user_a", None, "user_a"));
        assert!(reference_owned_by("user_a", Some(&meta("user_a")), "user_a"));

        // Another authenticated user presenting someone else's reference.
        assert!(!reference_owned_by("user_a", None, "user_b"));
        assert!(!reference_owned_by("user_a", Some(&meta("user_a")), "user_b"));

        // Record and gateway metadata disagreeing never activates.
        assert!(!reference_owned_by("user_a", Some(&meta("user_b")), "user_a"));
    }

    #[test]
    fn paid_at_parses_rfc3339() {
        let parsed = parse_paid_at(Some("2024-05-01T12:00:00.000Z"));
        assert!(parsed.is_some());
        assert!(parse_paid_at(Some("not-a-date")).is_none());
        assert!(parse_paid_at(None).is_none());
    }
}
