//! Backend reply service
//!
//! The language-model backend is reached over a single JSON endpoint:
//! `POST {message, history, profile} -> {replyText}`. The caller bounds each
//! request with its own timeout and turns every failure into an apology.

use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// User details forwarded with every request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Preferred name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// BCP 47 locale (e.g. `en-US`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Free-form facts the assistant may use
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<String>,
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Bounded conversation history, oldest turn dropped first
#[derive(Debug, Clone)]
pub struct History {
    turns: VecDeque<HistoryTurn>,
    limit: usize,
}

impl History {
    /// Create an empty history keeping at most `limit` turns
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Append a turn, evicting the oldest past the limit
    pub fn push(&mut self, turn: HistoryTurn) {
        if self.limit == 0 {
            return;
        }
        while self.turns.len() >= self.limit {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Copy of the retained turns, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<HistoryTurn> {
        self.turns.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Body of a reply request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyRequest {
    /// What the user just said
    pub message: String,

    /// Prior turns, oldest first, excluding `message`
    pub history: Vec<HistoryTurn>,

    /// Who is talking
    pub profile: UserProfile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyResponse {
    reply_text: String,
}

/// Produces assistant replies
#[async_trait]
pub trait ReplyBackend: Send + Sync {
    /// Produce a reply to `request`
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable or answers badly
    async fn reply(&self, request: &ReplyRequest) -> Result<String>;
}

/// JSON-over-HTTP reply backend
pub struct HttpBackend {
    client: Client,
    url: String,
}

impl HttpBackend {
    /// Create a backend posting to `url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::Config("backend URL must not be empty".to_string()));
        }

        Ok(Self {
            client: Client::new(),
            url,
        })
    }
}

#[async_trait]
impl ReplyBackend for HttpBackend {
    async fn reply(&self, request: &ReplyRequest) -> Result<String> {
        tracing::debug!(
            url = %self.url,
            history = request.history.len(),
            "requesting reply"
        );

        let response = self.client.post(&self.url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!("reply service error {status}: {body}")));
        }

        let body: ReplyResponse = response.json().await?;
        let reply = body.reply_text.trim();
        if reply.is_empty() {
            return Err(Error::Backend("reply service returned empty text".to_string()));
        }

        Ok(reply.to_string())
    }
}

/// Backend used when no service is configured; every reply fails
#[derive(Debug, Default)]
pub struct UnconfiguredBackend;

#[async_trait]
impl ReplyBackend for UnconfiguredBackend {
    async fn reply(&self, _request: &ReplyRequest) -> Result<String> {
        Err(Error::Backend("no reply service configured".to_string()))
    }
}
