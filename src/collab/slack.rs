use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::collab::{ChatTransport, CollabError, Sender, ThreadMessage};
use crate::config::SlackConfig;

const API_BASE: &str = "https://slack.com/api";
const PAGE_LIMIT: u32 = 100;

/// Edits, deletions, joins and other system messages carry a `subtype`;
/// only plain messages, bot posts and thread broadcasts are conversation.
fn is_conversational(msg: &Value) -> bool {
    match msg["subtype"].as_str() {
        None => true,
        Some(subtype) => matches!(subtype, "thread_broadcast" | "bot_message"),
    }
}

pub struct SlackClient {
    client: Client,
    token: String,
    channel_id: String,
    bot_user_id: String,
}

impl SlackClient {
    /// Connects and verifies the token with `auth.test`.
    pub fn connect(config: &SlackConfig, token: String) -> anyhow::Result<Self> {
        if token.trim().is_empty() {
            anyhow::bail!("SLACK_BOT_TOKEN is not set");
        }
        if config.channel_id.trim().is_empty() {
            anyhow::bail!("slack.channel_id is not configured");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let mut slack = Self {
            client,
            token,
            channel_id: config.channel_id.clone(),
            bot_user_id: String::new(),
        };
        let auth = slack.call(slack.client.post(format!("{API_BASE}/auth.test")))?;
        slack.bot_user_id = auth["user_id"].as_str().unwrap_or_default().to_string();
        info!(bot_user = %slack.bot_user_id, "slack authentication succeeded");
        Ok(slack)
    }

    fn call(&self, request: RequestBuilder) -> Result<Value, CollabError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| CollabError::Transient(e.to_string()))?;
        if response.status().as_u16() == 429 || response.status().is_server_error() {
            return Err(CollabError::Transient(format!("HTTP {}", response.status())));
        }
        let payload: Value = response
            .json()
            .map_err(|e| CollabError::Malformed(e.to_string()))?;
        if payload["ok"].as_bool() == Some(true) {
            return Ok(payload);
        }
        let error = payload["error"].as_str().unwrap_or("unknown_error").to_string();
        if error == "ratelimited" || error == "service_unavailable" {
            Err(CollabError::Transient(error))
        } else {
            Err(CollabError::Rejected(error))
        }
    }

    fn post_message(&self, text: &str, thread_ts: Option<&str>) -> Result<String, CollabError> {
        let mut body = json!({ "channel": self.channel_id, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = Value::String(ts.to_string());
        }
        let payload = self.call(
            self.client
                .post(format!("{API_BASE}/chat.postMessage"))
                .json(&body),
        )?;
        payload["ts"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CollabError::Malformed("chat.postMessage returned no ts".into()))
    }

    fn to_thread_message(&self, msg: &Value) -> ThreadMessage {
        let user = msg["user"].as_str().unwrap_or_default();
        let sender = if msg.get("bot_id").is_some() || user == self.bot_user_id {
            Sender::Bot
        } else {
            Sender::User(user.to_string())
        };
        ThreadMessage {
            sender,
            text: msg["text"].as_str().unwrap_or_default().to_string(),
            ts: msg["ts"].as_str().unwrap_or_default().to_string(),
        }
    }
}

impl ChatTransport for SlackClient {
    fn create_thread(&self, text: &str) -> Result<String, CollabError> {
        let ts = self.post_message(text, None)?;
        info!(thread = %ts, "created thread");
        Ok(ts)
    }

    fn post_reply(&self, thread_id: &str, text: &str) -> Result<String, CollabError> {
        let ts = self.post_message(text, Some(thread_id))?;
        debug!(thread = %thread_id, message = %ts, "posted reply");
        Ok(ts)
    }

    fn fetch_thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, CollabError> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![
                ("channel", self.channel_id.clone()),
                ("ts", thread_id.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }
            let payload = self.call(
                self.client
                    .get(format!("{API_BASE}/conversations.replies"))
                    .query(&query),
            )?;
            if let Some(page) = payload["messages"].as_array() {
                messages.extend(
                    page.iter()
                        .filter(|m| is_conversational(m))
                        .map(|m| self.to_thread_message(m)),
                );
            }

            let next = payload["response_metadata"]["next_cursor"]
                .as_str()
                .filter(|c| !c.is_empty());
            match next {
                Some(c) if payload["has_more"].as_bool() == Some(true) => {
                    cursor = Some(c.to_string())
                }
                _ => break,
            }
        }
        debug!(thread = %thread_id, count = messages.len(), "fetched thread");
        Ok(messages)
    }
}
