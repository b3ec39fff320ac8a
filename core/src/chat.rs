use crate::api::{ApiError, ApiResponse};
use crate::gateway::{GatewayApi, HistoryRole, QueryRequest, QueryResult};
use crate::stream::StreamError;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl From<HistoryRole> for MessageRole {
    fn from(role: HistoryRole) -> Self {
        match role {
            HistoryRole::User => Self::User,
            HistoryRole::Assistant => Self::Assistant,
            HistoryRole::System => Self::System,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sql: Option<String>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            sql: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-side id, known once the gateway has answered at least once.
    pub remote_id: Option<String>,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            remote_id: None,
            title: "New chat".to_string(),
            updated_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        if self.messages.is_empty() && message.role == MessageRole::User {
            self.title = snippet(&message.content);
        }
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// One piece of a streamed answer. The last chunk has `done` set and no delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

/// Client-side mirror of one conversation with the assistant.
#[derive(Clone)]
pub struct ChatSession {
    gateway: GatewayApi,
    conversation: Arc<RwLock<Conversation>>,
    datasource_id: Option<String>,
}

impl ChatSession {
    pub fn new(gateway: GatewayApi, datasource_id: Option<String>) -> Self {
        Self {
            gateway,
            conversation: Arc::new(RwLock::new(Conversation::new())),
            datasource_id,
        }
    }

    /// Continue a conversation stored on the gateway.
    pub async fn resume(
        gateway: GatewayApi,
        conversation_id: &str,
        datasource_id: Option<String>,
    ) -> Result<Self, ApiError> {
        let detail = gateway.conversation(conversation_id).await.into_result()?;
        let mut conversation = Conversation::new();
        conversation.remote_id = Some(detail.id);
        for message in detail.messages {
            let mut restored = ChatMessage::new(message.role.into(), message.content);
            restored.sql = message.sql;
            if let Some(created_at) = message.created_at {
                restored.created_at = created_at;
            }
            conversation.messages.push(restored);
        }
        conversation.title = detail.title;
        Ok(Self {
            gateway,
            conversation: Arc::new(RwLock::new(conversation)),
            datasource_id,
        })
    }

    pub fn conversation(&self) -> Conversation {
        self.conversation.read().clone()
    }

    fn record_question(&self, question: &str) -> QueryRequest {
        let mut conversation = self.conversation.write();
        conversation.add_message(ChatMessage::new(MessageRole::User, question));
        QueryRequest {
            question: question.to_string(),
            datasource_id: self.datasource_id.clone(),
            conversation_id: conversation.remote_id.clone(),
        }
    }

    /// Ask for SQL in one round trip. Blank questions are ignored.
    pub async fn ask(&self, question: &str) -> Option<ApiResponse<QueryResult>> {
        if question.trim().is_empty() {
            return None;
        }
        let request = self.record_question(question);
        let response = self.gateway.translate(&request).await;
        if let ApiResponse::Success(result) = &response {
            let mut conversation = self.conversation.write();
            if conversation.remote_id.is_none() {
                conversation.remote_id = result.conversation_id.clone();
            }
            let content = result
                .explanation
                .clone()
                .unwrap_or_else(|| result.sql.clone());
            let mut answer = ChatMessage::new(MessageRole::Assistant, content);
            answer.sql = Some(result.sql.clone());
            conversation.add_message(answer);
        }
        Some(response)
    }

    /// Ask with a streamed answer.
    ///
    /// Deltas are forwarded as they arrive; the assembled answer is appended
    /// to the conversation once the stream ends.
    pub async fn ask_streaming(
        &self,
        question: &str,
    ) -> Result<mpsc::UnboundedReceiver<Result<StreamChunk, StreamError>>, StreamError> {
        let (tx, rx) = mpsc::unbounded_channel();
        if question.trim().is_empty() {
            let _ = tx.send(Ok(StreamChunk {
                delta: String::new(),
                done: true,
            }));
            return Ok(rx);
        }

        let request = self.record_question(question);
        let mut events = self.gateway.stream_answer(&request).await?;
        let conversation = self.conversation.clone();

        tokio::spawn(async move {
            let mut accumulated = String::new();
            while let Some(event) = events.next().await {
                match event {
                    Ok(delta) => {
                        accumulated.push_str(&delta);
                        let _ = tx.send(Ok(StreamChunk { delta, done: false }));
                    }
                    Err(err) => {
                        error!(%err, "answer stream interrupted");
                        let _ = tx.send(Err(err));
                        return;
                    }
                }
            }
            debug!(chars = accumulated.len(), "answer stream finished");
            conversation
                .write()
                .add_message(ChatMessage::new(MessageRole::Assistant, accumulated));
            let _ = tx.send(Ok(StreamChunk {
                delta: String::new(),
                done: true,
            }));
        });

        Ok(rx)
    }
}

fn snippet(content: &str) -> String {
    let trimmed = content.trim();
    const MAX: usize = 42;
    let mut chars = trimmed.chars();
    let mut acc = String::new();
    for _ in 0..MAX {
        if let Some(ch) = chars.next() {
            acc.push(ch);
        } else {
            return trimmed.to_string();
        }
    }
    acc.push('…');
    acc
}
