use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::models::elder::ElderContacts;

pub const REPORT_CREATED_TITLE: &str = "글이 작성되었어요^^";
pub const COMMENT_CREATED_TITLE: &str = "댓글이 작성되었어요^^";

/// Client screen opened when a report or comment notification is tapped.
pub const REPORT_DEEP_LINK: &str = "notedetail";

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Guardian, center owner and protectors of an elder, without the author and
/// without duplicates, in that order.
pub fn recipients_for(contacts: &ElderContacts, author_id: i64) -> Vec<i64> {
    let candidates = contacts
        .guardian_id
        .into_iter()
        .chain(std::iter::once(contacts.center_owner_id))
        .chain(contacts.protector_ids.iter().copied());

    let mut recipients = Vec::with_capacity(contacts.protector_ids.len() + 2);
    for user_id in candidates {
        if user_id != author_id && !recipients.contains(&user_id) {
            recipients.push(user_id);
        }
    }
    recipients
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub deep_link_type: String,
    pub deep_link_id: i64,
}

/// Push provider seam: device lookup per user, delivery per device token.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn device_tokens(&self, user_id: i64) -> anyhow::Result<Vec<String>>;

    async fn deliver(&self, token: &str, message: &PushMessage) -> anyhow::Result<()>;
}

pub struct FcmTransport {
    client: Client,
    fcm_api_key: Option<String>,
    pool: PgPool,
}

impl FcmTransport {
    pub fn new(pool: PgPool, fcm_api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            fcm_api_key,
            pool,
        }
    }

    async fn send_fcm(&self, api_key: &str, token: &str, message: &PushMessage) -> anyhow::Result<()> {
        let payload = json!({
            "to": token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": {
                "type": message.deep_link_type,
                "id": message.deep_link_id.to_string(),
            }
        });

        let response = self
            .client
            .post("https://fcm.googleapis.com/fcm/send")
            .header("Authorization", format!("key={}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("FCM error {}: {}", status, text);
        }

        Ok(())
    }
}

#[async_trait]
impl PushTransport for FcmTransport {
    async fn device_tokens(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        if self.fcm_api_key.is_none() {
            tracing::debug!(user_id, "FCM not configured, skipping push notification");
            return Ok(Vec::new());
        }

        let tokens = sqlx::query_scalar("SELECT token FROM push_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(tokens)
    }

    async fn deliver(&self, token: &str, message: &PushMessage) -> anyhow::Result<()> {
        let Some(api_key) = &self.fcm_api_key else {
            return Ok(());
        };
        self.send_fcm(api_key, token, message).await
    }
}

/// Push gateway used by the create flows. Sending never blocks the caller and
/// never reports failure back to it.
pub struct NotificationService {
    transport: Arc<dyn PushTransport>,
    timeout: Duration,
    max_attempts: u32,
}

impl NotificationService {
    pub fn new(transport: Arc<dyn PushTransport>, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            transport,
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Spawns delivery to every device of every recipient. Each attempt is
    /// bounded by the configured timeout and retried per device with
    /// exponential backoff.
    pub fn send(
        &self,
        recipients: Vec<i64>,
        title: &str,
        body: &str,
        deep_link_type: &str,
        deep_link_id: i64,
    ) -> JoinHandle<()> {
        let message = PushMessage {
            title: title.to_string(),
            body: body.to_string(),
            deep_link_type: deep_link_type.to_string(),
            deep_link_id,
        };
        let transport = self.transport.clone();
        let timeout = self.timeout;
        let max_attempts = self.max_attempts;

        tokio::spawn(async move {
            if recipients.is_empty() {
                return;
            }
            let lookups = recipients
                .iter()
                .map(|&user_id| devices_of(transport.as_ref(), user_id, timeout));
            let devices: Vec<(i64, String)> = join_all(lookups).await.into_iter().flatten().collect();

            let deliveries = devices.iter().map(|(user_id, token)| {
                deliver_with_retry(transport.as_ref(), *user_id, token, &message, timeout, max_attempts)
            });
            let delivered = join_all(deliveries).await.into_iter().filter(|ok| *ok).count();
            tracing::debug!(
                deep_link_id,
                delivered,
                devices = devices.len(),
                recipients = recipients.len(),
                "Push notifications dispatched"
            );
        })
    }
}

async fn devices_of(transport: &dyn PushTransport, user_id: i64, timeout: Duration) -> Vec<(i64, String)> {
    match tokio::time::timeout(timeout, transport.device_tokens(user_id)).await {
        Ok(Ok(tokens)) => tokens.into_iter().map(|token| (user_id, token)).collect(),
        Ok(Err(e)) => {
            tracing::warn!(user_id, "Push token lookup failed: {:#}", e);
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(user_id, "Push token lookup timed out after {:?}", timeout);
            Vec::new()
        }
    }
}

async fn deliver_with_retry(
    transport: &dyn PushTransport,
    user_id: i64,
    token: &str,
    message: &PushMessage,
    timeout: Duration,
    max_attempts: u32,
) -> bool {
    for attempt in 1..=max_attempts {
        match tokio::time::timeout(timeout, transport.deliver(token, message)).await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => tracing::warn!(user_id, attempt, "Push delivery failed: {:#}", e),
            Err(_) => tracing::warn!(user_id, attempt, "Push delivery timed out after {:?}", timeout),
        }
        if attempt < max_attempts {
            tokio::time::sleep(RETRY_BACKOFF * 2u32.pow(attempt - 1)).await;
        }
    }
    false
}
