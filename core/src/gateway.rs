use crate::api::{ApiClient, ApiResponse};
use crate::auth::UserRecord;
use crate::session::SessionManager;
use crate::stream::{DataStream, StreamError};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::form_urlencoded;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub token: String,
    pub user_id: String,
    pub email: String,
}

impl AuthPayload {
    pub fn user(&self) -> UserRecord {
        UserRecord {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
        }
    }
}

/// A plain acknowledgement with an optional human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Notice {
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of endpoints that return nothing useful. Accepts any JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Acknowledged {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            datasource_id: None,
            conversation_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub sql: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub datasource_id: String,
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceKind {
    Postgres,
    Mysql,
    Sqlite,
    Snowflake,
    Bigquery,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    pub id: String,
    pub name: String,
    pub kind: DatasourceKind,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewDatasource {
    pub name: String,
    pub kind: DatasourceKind,
    pub connection_string: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCheck {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub default_datasource_id: Option<String>,
    #[serde(default)]
    pub row_limit: Option<u32>,
}

/// Typed operations exposed by the API gateway.
#[derive(Clone)]
pub struct GatewayApi {
    client: ApiClient,
}

impl GatewayApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn session(&self) -> &SessionManager {
        self.client.session()
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResponse<AuthPayload> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.client.post("/auth/login", &credentials).await;
        self.adopt_session(response)
    }

    pub async fn register(&self, email: &str, password: &str) -> ApiResponse<AuthPayload> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.client.post("/auth/register", &credentials).await;
        self.adopt_session(response)
    }

    pub async fn forgot_password(&self, email: &str) -> ApiResponse<Notice> {
        self.client
            .post("/auth/forgot-password", &serde_json::json!({ "email": email }))
            .await
    }

    pub fn logout(&self) -> Result<()> {
        self.session().sign_out()
    }

    pub async fn translate(&self, request: &QueryRequest) -> ApiResponse<QueryResult> {
        self.client.post("/query", request).await
    }

    pub async fn stream_answer(&self, request: &QueryRequest) -> Result<DataStream, StreamError> {
        self.client.stream_request("/query/stream", request).await
    }

    pub async fn schema(&self, datasource_id: &str) -> ApiResponse<SchemaInfo> {
        self.client
            .get(&format!("/datasources/{}/schema", path_segment(datasource_id)))
            .await
    }

    pub async fn conversations(&self) -> ApiResponse<Vec<ConversationSummary>> {
        self.client.get("/conversations").await
    }

    pub async fn conversation(&self, id: &str) -> ApiResponse<ConversationDetail> {
        self.client.get(&format!("/conversations/{}", path_segment(id))).await
    }

    pub async fn delete_conversation(&self, id: &str) -> ApiResponse<Acknowledged> {
        self.client.delete(&format!("/conversations/{}", path_segment(id))).await
    }

    pub async fn datasources(&self) -> ApiResponse<Vec<Datasource>> {
        self.client.get("/datasources").await
    }

    pub async fn create_datasource(&self, datasource: &NewDatasource) -> ApiResponse<Datasource> {
        self.client.post("/datasources", datasource).await
    }

    pub async fn test_datasource(&self, id: &str) -> ApiResponse<ConnectionCheck> {
        self.client
            .post(&format!("/datasources/{}/test", path_segment(id)), &serde_json::json!({}))
            .await
    }

    pub async fn delete_datasource(&self, id: &str) -> ApiResponse<Acknowledged> {
        self.client.delete(&format!("/datasources/{}", path_segment(id))).await
    }

    pub async fn settings(&self) -> ApiResponse<UserSettings> {
        self.client.get("/settings").await
    }

    pub async fn update_settings(&self, settings: &UserSettings) -> ApiResponse<UserSettings> {
        self.client.put("/settings", settings).await
    }

    fn adopt_session(&self, response: ApiResponse<AuthPayload>) -> ApiResponse<AuthPayload> {
        if let ApiResponse::Success(payload) = &response {
            if let Err(err) = self
                .session()
                .establish(payload.token.clone(), Some(payload.user()))
            {
                warn!(%err, "failed to persist session after login");
            }
        }
        response
    }
}

/// Percent-encode an id so it stays a single path segment.
fn path_segment(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
