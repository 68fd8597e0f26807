//! Webhook notifier.
//!
//! Every notification is POSTed as a JSON envelope to one endpoint. When a
//! secret is configured the body is signed with HMAC-SHA256 over
//! `{timestamp}.{body}` and the hex digest sent as
//! `X-Webhook-Signature: sha256=<digest>`.

use async_trait::async_trait;
use folio_queue::job::JobProgress;
use folio_queue::queue::{JobEvent, JobRef};
use folio_workflow::BoxedError;
use folio_workflow::collaborator::{Notifier, WorkflowProgress};
use hmac::{Hmac, Mac};
use jiff::Timestamp;
use reqwest::Method;
use serde::Serialize;
use sha2::Sha256;
use url::Url;
use uuid::Uuid;

use crate::client::check_status;
use crate::{Error, RemoteClient, Result, TRACING_TARGET_WEBHOOK};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the event name.
pub const HEADER_EVENT: &str = "X-Webhook-Event";
/// Header carrying the signing timestamp, in Unix seconds.
pub const HEADER_TIMESTAMP: &str = "X-Webhook-Timestamp";
/// Header carrying the unique delivery id.
pub const HEADER_REQUEST_ID: &str = "X-Webhook-Request-Id";
/// Header carrying the payload signature.
pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";

/// Audience of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Channel {
    User(Uuid),
    Project(Uuid),
}

#[derive(Debug, Serialize)]
struct JobProgressData<'a> {
    job: &'a JobRef,
    progress: &'a JobProgress,
}

#[derive(Debug, Serialize)]
struct Envelope<'a, T> {
    event: &'a str,
    channel: Channel,
    sent_at: Timestamp,
    data: &'a T,
}

/// Notifier delivering every update to a webhook endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: RemoteClient,
    url: Url,
    secret: Option<String>,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .field("signed", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`, signing with `secret` if given.
    pub fn new(client: RemoteClient, url: Url, secret: Option<String>) -> Self {
        Self {
            client,
            url,
            secret,
        }
    }

    /// Signs a payload using HMAC-SHA256.
    ///
    /// The signature is computed over: `{timestamp}.{payload}`
    pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String> {
        let mac = Self::mac(secret, timestamp, payload)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks a hex signature produced by [`sign_payload`](Self::sign_payload).
    ///
    /// Accepts the digest with or without the `sha256=` prefix.
    pub fn verify_signature(secret: &str, timestamp: i64, payload: &[u8], signature: &str) -> bool {
        let digest = signature.strip_prefix("sha256=").unwrap_or(signature);
        let Ok(expected) = hex::decode(digest) else {
            return false;
        };
        Self::mac(secret, timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    }

    fn mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|err| Error::invalid_config(format!("webhook secret: {err}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    async fn deliver<T: Serialize>(&self, event: &str, channel: Channel, data: &T) -> Result<()> {
        let sent_at = Timestamp::now();
        let timestamp = sent_at.as_second();
        let request_id = Uuid::now_v7();

        let body = serde_json::to_vec(&Envelope {
            event,
            channel,
            sent_at,
            data,
        })?;

        let mut request = self
            .client
            .request(Method::POST, self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(HEADER_EVENT, event)
            .header(HEADER_TIMESTAMP, timestamp.to_string())
            .header(HEADER_REQUEST_ID, request_id.to_string());

        if let Some(secret) = &self.secret {
            let signature = Self::sign_payload(secret, timestamp, &body)?;
            request = request.header(HEADER_SIGNATURE, format!("sha256={signature}"));
        }

        let response = request.body(body).send().await?;
        let status = check_status(response).await?.status();

        tracing::trace!(
            target: TRACING_TARGET_WEBHOOK,
            request_id = %request_id,
            event,
            status = status.as_u16(),
            "Webhook delivered"
        );
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_workflow_progress(
        &self,
        user_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        Ok(self
            .deliver("workflow.progress", Channel::User(user_id), payload)
            .await?)
    }

    async fn send_project_workflow_progress(
        &self,
        project_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        Ok(self
            .deliver("workflow.progress", Channel::Project(project_id), payload)
            .await?)
    }

    async fn send_workflow_status(
        &self,
        user_id: Uuid,
        payload: &WorkflowProgress,
    ) -> Result<(), BoxedError> {
        Ok(self
            .deliver("workflow.status", Channel::User(user_id), payload)
            .await?)
    }

    async fn send_job_status(&self, user_id: Uuid, event: &JobEvent) -> Result<(), BoxedError> {
        Ok(self
            .deliver("job.status", Channel::User(user_id), event)
            .await?)
    }

    async fn send_job_progress(
        &self,
        user_id: Uuid,
        job: &JobRef,
        progress: &JobProgress,
    ) -> Result<(), BoxedError> {
        let data = JobProgressData { job, progress };
        Ok(self
            .deliver("job.progress", Channel::User(user_id), &data)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use folio_queue::job::JobType;
    use serde_json::{Value, json};

    use super::*;
    use crate::RemoteConfig;
    use crate::test_util::serve;

    type Deliveries = Arc<Mutex<Vec<(HeaderMap, Bytes)>>>;

    async fn receiver(status: StatusCode) -> (Url, Deliveries) {
        let deliveries = Deliveries::default();
        let router = Router::new()
            .route(
                "/hooks",
                post(
                    move |State(deliveries): State<Deliveries>, headers: HeaderMap, body: Bytes| async move {
                        deliveries.lock().unwrap().push((headers, body));
                        status
                    },
                ),
            )
            .with_state(deliveries.clone());
        let url = serve(router).await.join("hooks").unwrap();
        (url, deliveries)
    }

    fn notifier(url: Url, secret: Option<&str>) -> WebhookNotifier {
        let client = RemoteClient::new(RemoteConfig::default().with_timeout(5)).unwrap();
        WebhookNotifier::new(client, url, secret.map(str::to_string))
    }

    fn job_ref() -> JobRef {
        JobRef {
            job_id: Uuid::new_v4(),
            job_type: JobType::OcrProcessing,
            user_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_sign_payload() {
        let signature =
            WebhookNotifier::sign_payload("test_secret", 1234567890, b"{\"event\":\"test\"}").unwrap();

        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_signature() {
        let payload = br#"{"event":"workflow.status"}"#;
        let signature = WebhookNotifier::sign_payload("s3cret", 1700000000, payload).unwrap();

        assert!(WebhookNotifier::verify_signature("s3cret", 1700000000, payload, &signature));
        assert!(WebhookNotifier::verify_signature(
            "s3cret",
            1700000000,
            payload,
            &format!("sha256={signature}")
        ));
        assert!(!WebhookNotifier::verify_signature("other", 1700000000, payload, &signature));
        assert!(!WebhookNotifier::verify_signature("s3cret", 1700000001, payload, &signature));
        assert!(!WebhookNotifier::verify_signature("s3cret", 1700000000, payload, "not-hex"));
    }

    #[test]
    fn test_channel_serialization() {
        let id = Uuid::nil();
        assert_eq!(
            serde_json::to_value(Channel::Project(id)).unwrap(),
            json!({"kind": "project", "id": id})
        );
    }

    #[tokio::test]
    async fn test_signed_delivery() {
        let (url, deliveries) = receiver(StatusCode::NO_CONTENT).await;
        let notifier = notifier(url, Some("s3cret"));
        let job = job_ref();
        let progress = JobProgress::new(40, "ocr", "page 2 of 5");

        notifier
            .send_job_progress(job.user_id, &job, &progress)
            .await
            .unwrap();

        let deliveries = deliveries.lock().unwrap().clone();
        assert_eq!(deliveries.len(), 1);
        let (headers, body) = &deliveries[0];

        assert_eq!(headers[HEADER_EVENT], "job.progress");
        let timestamp: i64 = headers[HEADER_TIMESTAMP].to_str().unwrap().parse().unwrap();
        let signature = headers[HEADER_SIGNATURE].to_str().unwrap();
        assert!(signature.starts_with("sha256="));
        assert!(WebhookNotifier::verify_signature("s3cret", timestamp, body, signature));

        let envelope: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(envelope["event"], "job.progress");
        assert_eq!(envelope["channel"], json!({"kind": "user", "id": job.user_id}));
        assert_eq!(envelope["data"]["progress"]["percentage"], 40);
        assert_eq!(envelope["data"]["job"]["job_id"], json!(job.job_id));
    }

    #[tokio::test]
    async fn test_unsigned_delivery_and_rejection() {
        let (url, deliveries) = receiver(StatusCode::GONE).await;
        let notifier = notifier(url, None);
        let job = job_ref();
        let event = JobEvent::Active { job, attempt: 1 };

        let err = notifier.send_job_status(job.user_id, &event).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 410"));

        let deliveries = deliveries.lock().unwrap().clone();
        assert_eq!(deliveries.len(), 1);
        assert!(!deliveries[0].0.contains_key(HEADER_SIGNATURE));
    }
}
