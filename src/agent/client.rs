//! Strom Agent API Client
//!
//! Communicates with the agent backend over JSON/HTTPS. Responses are
//! parsed defensively from loose JSON and normalized at this boundary:
//! the core never sees the string-or-array / string-or-object wire forms.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::SessionError;
use crate::types::{
    AgentClient, ConversationOutcome, ConversationResult, Identity, MessageBody, ProjectAnalysis,
    Source, Verification,
};

/// HTTP client for the agent backend.
pub struct StromHttpClient {
    api_url: String,
    timeout: Duration,
    http: Client,
}

impl StromHttpClient {
    /// Create a new client. Every request carries the given deadline;
    /// the backend call is attempted exactly once.
    pub fn new(api_url: String, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_url,
            timeout,
            http,
        }
    }

    /// Internal helper: POST a JSON body and return the parsed response.
    async fn post(&self, path: &str, body: Value) -> Result<(u16, Value), SessionError> {
        let url = format!("{}{}", self.api_url, path);

        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::from_transport(e, self.timeout))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| SessionError::from_transport(e, self.timeout))?;
        let json: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        debug!(path, status, "agent backend responded");
        Ok((status, json))
    }
}

#[async_trait]
impl AgentClient for StromHttpClient {
    /// Send one user message to the conversation endpoint.
    async fn converse(
        &self,
        message: &str,
        identity: Option<&Identity>,
    ) -> Result<ConversationResult, SessionError> {
        let mut body = serde_json::json!({ "message": message });

        if let Some(Identity::Authenticated { token, user_id, .. }) = identity {
            body["user"] = serde_json::json!({ "token": token, "userId": user_id });
        }

        let (status, json) = self.post("/agent/conversation", body).await?;
        if !(200..300).contains(&status) {
            return Err(SessionError::Network(format!(
                "POST /agent/conversation -> {}: {}",
                status, json
            )));
        }

        Ok(parse_conversation(&json))
    }

    /// Verify a credential token, at session start (replay) or at sign-in.
    async fn verify_identity(&self, token: &str) -> Result<Verification, SessionError> {
        let body = serde_json::json!({ "token": token });

        let (status, json) = self.post("/agent/auth/google", body).await?;
        if !(200..300).contains(&status) {
            // Non-2xx from the auth endpoint means the token was rejected
            let detail = json["detail"]
                .as_str()
                .unwrap_or("token rejected")
                .to_string();
            return Err(SessionError::Auth(detail));
        }

        if !json["success"].as_bool().unwrap_or(false) {
            return Err(SessionError::Auth("verification unsuccessful".to_string()));
        }

        Ok(Verification {
            success: true,
            user_id: json["user"]["user_id"]
                .as_str()
                .or_else(|| json["user"]["userId"].as_str())
                .map(|s| s.to_string()),
            usage_count: json["messageCount"]
                .as_u64()
                .or_else(|| json["message_count"].as_u64())
                .unwrap_or(0) as u32,
            is_free: json["isFree"].as_bool().unwrap_or(true),
            is_paid: json["isPaid"].as_bool().unwrap_or(false),
        })
    }

    /// Tell the backend a payment settled, for server-side bookkeeping.
    async fn confirm_payment(&self, user_id: &str) -> Result<Value, SessionError> {
        let body = serde_json::json!({ "userId": user_id });

        let (status, json) = self.post("/agent/user/pay", body).await?;
        if !(200..300).contains(&status) {
            return Err(SessionError::Network(format!(
                "POST /agent/user/pay -> {}: {}",
                status, json
            )));
        }

        Ok(json)
    }
}

// ── Response normalization ──────────────────────────────────────────

/// Parse a conversation response body into a normalized result.
///
/// `conversation.response` may be a plain string or an array of bullet
/// points; `sources` entries may be bare strings or objects. A top-level
/// `limitReached` flag turns the whole reply into a hard stop, carrying
/// whatever partial reply accompanied it.
pub fn parse_conversation(json: &Value) -> ConversationResult {
    let paid = json["paid"].as_bool();
    let free = json["free"].as_bool();

    let reply = parse_reply(&json["conversation"]);

    let outcome = if json["limitReached"].as_bool().unwrap_or(false) {
        ConversationOutcome::LimitReached { partial: reply }
    } else {
        ConversationOutcome::Reply(
            reply.unwrap_or_else(|| MessageBody::Text(String::new())),
        )
    };

    ConversationResult {
        outcome,
        paid,
        free,
    }
}

fn parse_reply(conversation: &Value) -> Option<MessageBody> {
    let response = &conversation["response"];

    if let Some(text) = response.as_str() {
        return Some(MessageBody::Text(text.to_string()));
    }

    let points: Vec<String> = response
        .as_array()?
        .iter()
        .filter_map(|p| p.as_str().map(|s| s.to_string()))
        .collect();

    let is_greeting = conversation["is_greeting"]
        .as_bool()
        .or_else(|| conversation["isGreeting"].as_bool())
        .unwrap_or(false);

    // Greetings use the array form too but are a single text blob in spirit
    if is_greeting {
        return Some(MessageBody::Text(points.join("\n")));
    }

    let relevant_projects = conversation["relevant_projects"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|p| p.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let sources = conversation["sources"]
        .as_array()
        .map(|arr| arr.iter().filter_map(parse_source).collect())
        .unwrap_or_default();

    Some(MessageBody::Analysis(ProjectAnalysis {
        points,
        is_greeting,
        relevant_projects,
        sources,
    }))
}

/// Normalize one wire source entry, which may be a bare string or a
/// `{source_name, source_url}` object.
fn parse_source(value: &Value) -> Option<Source> {
    if let Some(name) = value.as_str() {
        return Some(Source {
            name: name.to_string(),
            url: None,
        });
    }

    if value.is_object() {
        let name = value["source_name"]
            .as_str()
            .or_else(|| value["name"].as_str())
            .unwrap_or("source")
            .to_string();
        let url = value["source_url"]
            .as_str()
            .or_else(|| value["url"].as_str())
            .map(|s| s.to_string());
        return Some(Source { name, url });
    }

    None
}
