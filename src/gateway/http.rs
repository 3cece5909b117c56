//! HTTP Gateway Client
//!
//! Implements the [`RemoteGateway`] contract against the hosted gateway's
//! REST surface. Real-time subscriptions consume the gateway's
//! server-sent event stream; the stream reader reconnects with capped
//! backoff on connection loss, which is the transport's own behavior —
//! the client layer above never retries failed operations.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{RemoteGateway, Subscription};
use crate::shared::config::GatewayConfig;
use crate::shared::error::ChatError;
use crate::shared::event::RealtimeEvent;
use crate::shared::messaging::{Conversation, ConversationSummary, MessageRecord, Profile};

const SUBSCRIPTION_BUFFER: usize = 64;
const INITIAL_RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_millis(1000);
const MAX_RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(30);

/// Gateway client over REST + server-sent events
#[derive(Debug, Clone)]
pub struct HttpGateway {
    config: GatewayConfig,
    client: Client,
}

impl HttpGateway {
    /// Create a gateway client from a validated configuration
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, self.config.api_url(path));
        if let Some(token) = self.config.bearer_token() {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }

    /// Map a non-success response onto the shared error taxonomy.
    /// `entity` names what a 404 refers to; `write` selects the
    /// read/write flavor for unclassified statuses.
    async fn check(response: Response, entity: &'static str, write: bool) -> Result<Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_else(|_| status.to_string());
        Err(match status {
            StatusCode::UNAUTHORIZED => ChatError::NotAuthenticated,
            StatusCode::FORBIDDEN => ChatError::permission(body),
            StatusCode::NOT_FOUND => ChatError::not_found(entity),
            StatusCode::CONFLICT => ChatError::conflict(body),
            _ if write => ChatError::write(format!("{}: {}", status, body)),
            _ => ChatError::read(format!("{}: {}", status, body)),
        })
    }

    fn subscribe<T, F>(&self, path: String, decode: F) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn(&RealtimeEvent) -> Option<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let forwarder = spawn_event_reader(
            self.client.clone(),
            self.config.api_url(&path),
            self.config.bearer_token().map(str::to_string),
            tx,
            decode,
        );
        Subscription::new(rx, forwarder)
    }
}

/// Spawn the long-lived SSE reader task for one subscription
fn spawn_event_reader<T, F>(
    client: Client,
    url: String,
    bearer: Option<String>,
    tx: mpsc::Sender<T>,
    decode: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(&RealtimeEvent) -> Option<T> + Send + 'static,
{
    tokio::spawn(async move {
        let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

        loop {
            let mut request = client.get(&url).header("Accept", "text/event-stream");
            if let Some(token) = bearer.as_ref() {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            tracing::debug!("subscribing to event stream: {}", url);
            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!("event stream connect failed (will retry): {}", err);
                    tokio::time::sleep(reconnect_delay).await;
                    reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
                    continue;
                }
            };

            if !response.status().is_success() {
                tracing::warn!(
                    "event stream rejected with status {} (will retry)",
                    response.status()
                );
                tokio::time::sleep(reconnect_delay).await;
                reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
                continue;
            }

            tracing::debug!("event stream established: {}", url);
            reconnect_delay = INITIAL_RECONNECT_DELAY;

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut connection_lost = false;

            'read: while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::warn!("event stream read error: {}", err);
                        connection_lost = true;
                        break;
                    }
                };
                let Ok(text) = std::str::from_utf8(&chunk) else {
                    tracing::warn!("event stream sent invalid UTF-8");
                    connection_lost = true;
                    break;
                };
                buffer.push_str(text);

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim_end_matches('\r').to_string();
                    buffer.drain(..=newline);

                    // Keep-alive comments and event-name lines carry no payload
                    if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let event: RealtimeEvent = match serde_json::from_str(data) {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!("unparseable realtime event: {} | {}", err, data);
                            continue;
                        }
                    };
                    if let Some(value) = decode(&event) {
                        if tx.send(value).await.is_err() {
                            // Subscriber dropped the handle
                            return;
                        }
                    }
                }

                if tx.is_closed() {
                    break 'read;
                }
            }

            if tx.is_closed() {
                return;
            }
            if connection_lost {
                tracing::warn!("event stream lost, reconnecting: {}", url);
                tokio::time::sleep(reconnect_delay).await;
                reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
            } else {
                tracing::debug!("event stream closed by server: {}", url);
                return;
            }
        }
    })
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn find_conversation(
        &self,
        participant_a: Uuid,
        participant_b: Uuid,
        listing_id: Option<Uuid>,
    ) -> Result<Option<Conversation>, ChatError> {
        let mut query = vec![
            ("participant_a".to_string(), participant_a.to_string()),
            ("participant_b".to_string(), participant_b.to_string()),
        ];
        if let Some(listing) = listing_id {
            query.push(("listing_id".to_string(), listing.to_string()));
        }

        let response = self
            .request(reqwest::Method::GET, "/conversations")
            .query(&query)
            .send()
            .await
            .map_err(|e| ChatError::read(e.to_string()))?;
        let response = Self::check(response, "conversation", false).await?;
        let mut matches: Vec<Conversation> = response
            .json()
            .await
            .map_err(|e| ChatError::read(e.to_string()))?;
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.remove(0))
        })
    }

    async fn create_conversation(
        &self,
        buyer_id: Uuid,
        seller_id: Uuid,
        listing_id: Option<Uuid>,
    ) -> Result<Conversation, ChatError> {
        let response = self
            .request(reqwest::Method::POST, "/conversations")
            .json(&json!({
                "buyer_id": buyer_id,
                "seller_id": seller_id,
                "listing_id": listing_id,
            }))
            .send()
            .await
            .map_err(|e| ChatError::write(e.to_string()))?;
        let response = Self::check(response, "conversation", true).await?;
        response.json().await.map_err(|e| ChatError::read(e.to_string()))
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>, ChatError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/conversations/{}", conversation_id))
            .send()
            .await
            .map_err(|e| ChatError::read(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response, "conversation", false).await?;
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| ChatError::read(e.to_string()))
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, ChatError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/conversations/{}/messages", conversation_id),
            )
            .json(&json!({
                "sender_id": sender_id,
                "content": content,
            }))
            .send()
            .await
            .map_err(|e| ChatError::write(e.to_string()))?;
        let response = Self::check(response, "conversation", true).await?;
        response.json().await.map_err(|e| ChatError::read(e.to_string()))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRecord>, ChatError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/conversations/{}/messages", conversation_id),
            )
            .send()
            .await
            .map_err(|e| ChatError::read(e.to_string()))?;
        let response = Self::check(response, "conversation", false).await?;
        response.json().await.map_err(|e| ChatError::read(e.to_string()))
    }

    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<(), ChatError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/conversations/{}/read", conversation_id),
            )
            .json(&json!({ "reader_id": reader_id }))
            .send()
            .await
            .map_err(|e| ChatError::write(e.to_string()))?;
        Self::check(response, "conversation", true).await?;
        Ok(())
    }

    async fn list_conversation_summaries(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/users/{}/conversations", user_id),
            )
            .send()
            .await
            .map_err(|e| ChatError::read(e.to_string()))?;
        let response = Self::check(response, "user", false).await?;
        response.json().await.map_err(|e| ChatError::read(e.to_string()))
    }

    async fn subscribe_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Subscription<MessageRecord>, ChatError> {
        Ok(self.subscribe(
            format!("/events?conversation_id={}", conversation_id),
            move |event| {
                event
                    .as_message()
                    .filter(|record| record.conversation_id == conversation_id)
            },
        ))
    }

    async fn subscribe_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Subscription<Conversation>, ChatError> {
        Ok(self.subscribe(format!("/events?user_id={}", user_id), move |event| {
            event
                .as_conversation()
                .filter(|conversation| conversation.has_participant(user_id))
        }))
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, ChatError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/profiles/{}", user_id))
            .send()
            .await
            .map_err(|e| ChatError::read(e.to_string()))?;
        let response = Self::check(response, "profile", false).await?;
        response.json().await.map_err(|e| ChatError::read(e.to_string()))
    }

    async fn get_push_token(&self, user_id: Uuid) -> Result<Option<String>, ChatError> {
        let profile = self.get_profile(user_id).await?;
        Ok(profile.push_token)
    }

    async fn save_push_token(&self, user_id: Uuid, token: &str) -> Result<(), ChatError> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/profiles/{}/push-token", user_id),
            )
            .json(&json!({ "push_token": token }))
            .send()
            .await
            .map_err(|e| ChatError::write(e.to_string()))?;
        Self::check(response, "profile", true).await?;
        Ok(())
    }

    async fn send_push(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), ChatError> {
        let mut request = self.client.post(self.config.push_url());
        if let Some(bearer) = self.config.bearer_token() {
            request = request.header("Authorization", format!("Bearer {}", bearer));
        }
        let response = request
            .json(&json!({
                "to": token,
                "title": title,
                "body": body,
                "data": data,
            }))
            .send()
            .await
            .map_err(|e| ChatError::write(e.to_string()))?;
        Self::check(response, "push token", true).await?;
        Ok(())
    }

    async fn set_active_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<(), ChatError> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/profiles/{}/active-conversation", user_id),
            )
            .json(&json!({ "conversation_id": conversation_id }))
            .send()
            .await
            .map_err(|e| ChatError::write(e.to_string()))?;
        Self::check(response, "profile", true).await?;
        Ok(())
    }

    async fn clear_active_conversation(&self, user_id: Uuid) -> Result<(), ChatError> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/profiles/{}/active-conversation", user_id),
            )
            .send()
            .await
            .map_err(|e| ChatError::write(e.to_string()))?;
        Self::check(response, "profile", true).await?;
        Ok(())
    }
}
