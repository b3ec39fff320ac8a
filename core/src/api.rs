use crate::config::GatewaySettings;
use crate::session::SessionManager;
use crate::stream::{data_events, DataStream, StreamError};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub use reqwest::header::{HeaderName, HeaderValue};
pub use reqwest::Method;

/// Endpoints where a 401 is an expected answer rather than a dead session.
pub const PUBLIC_AUTH_ENDPOINTS: [&str; 3] =
    ["/auth/login", "/auth/register", "/auth/forgot-password"];

pub fn is_public_endpoint(endpoint: &str) -> bool {
    PUBLIC_AUTH_ENDPOINTS
        .iter()
        .any(|public| endpoint.contains(public))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request never completed. Status is 0.
    Network,
    /// The request could not be built locally. Status is 0.
    InvalidRequest,
    /// The gateway answered with a 4xx/5xx status.
    Status,
    /// A 401 from a protected endpoint; the session has been cleared.
    SessionExpired,
    /// A success status whose body did not match the expected schema.
    InvalidResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (status {status})")]
pub struct ApiError {
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: 0,
            code: None,
            kind: ErrorKind::Network,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: 0,
            code: None,
            kind: ErrorKind::InvalidRequest,
        }
    }

    /// Build an error from the gateway's JSON error body.
    pub fn from_payload(status: StatusCode, payload: &Value, kind: ErrorKind) -> Self {
        let message = ["message", "error", "detail"]
            .iter()
            .find_map(|field| payload.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });
        let code = payload.get("code").and_then(|code| match code {
            Value::String(code) => Some(code.clone()),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        });
        Self {
            message,
            status: status.as_u16(),
            code,
            kind,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        self.kind == ErrorKind::SessionExpired
    }
}

/// Either the payload of a successful call or a normalized error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ApiResponse<T> {
    #[serde(rename = "data")]
    Success(T),
    #[serde(rename = "error")]
    Failure(ApiError),
}

impl<T> ApiResponse<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Failure(error) => Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        match self {
            Self::Success(data) => ApiResponse::Success(f(data)),
            Self::Failure(error) => ApiResponse::Failure(error),
        }
    }
}

impl<T> From<Result<T, ApiError>> for ApiResponse<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(error) => Self::Failure(error),
        }
    }
}

/// Method, JSON body and extra headers for one call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// HTTP client for the API gateway.
///
/// Every call goes through [`ApiClient::request`], which injects the bearer
/// token, normalizes failures into [`ApiError`] and expires the session on a
/// 401 from a protected endpoint.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    session: SessionManager,
}

impl ApiClient {
    pub fn new(settings: &GatewaySettings, session: SessionManager) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    fn headers(&self, extra: &HeaderMap) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.session.token() {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ApiError::invalid_request("stored session token is not a valid header value")
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        for name in extra.keys() {
            headers.remove(name);
        }
        for (name, value) in extra.iter() {
            if *name != CONTENT_TYPE {
                headers.append(name.clone(), value.clone());
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Issue one JSON request. Never fails: every outcome is an [`ApiResponse`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ApiResponse<T> {
        let headers = match self.headers(&options.headers) {
            Ok(headers) => headers,
            Err(error) => return ApiResponse::Failure(error),
        };
        let mut builder = self
            .http
            .request(options.method.clone(), self.url_for(endpoint))
            .headers(headers)
            .timeout(self.timeout);
        if let Some(body) = &options.body {
            builder = builder.body(body.to_string());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(endpoint, method = %options.method, error = %err, "gateway request failed");
                return ApiResponse::Failure(ApiError::network(err.to_string()));
            }
        };

        let status = response.status();
        let payload = read_json(response).await;
        if !status.is_success() {
            let kind = if status == StatusCode::UNAUTHORIZED && !is_public_endpoint(endpoint) {
                let first = self.session.expire();
                debug!(endpoint, first, "protected endpoint rejected the session");
                ErrorKind::SessionExpired
            } else {
                ErrorKind::Status
            };
            debug!(endpoint, status = status.as_u16(), "gateway returned an error");
            return ApiResponse::Failure(ApiError::from_payload(status, &payload, kind));
        }

        match serde_json::from_value(payload) {
            Ok(data) => ApiResponse::Success(data),
            Err(err) => {
                warn!(endpoint, error = %err, "gateway response did not match the expected schema");
                ApiResponse::Failure(ApiError {
                    message: format!("unexpected response from {endpoint}: {err}"),
                    status: status.as_u16(),
                    code: Some("invalid_response".to_string()),
                    kind: ErrorKind::InvalidResponse,
                })
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResponse<T> {
        self.request(endpoint, RequestOptions::new(Method::GET)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResponse<T> {
        self.request(endpoint, RequestOptions::new(Method::DELETE))
            .await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::POST, endpoint, body).await
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::PUT, endpoint, body).await
    }

    async fn send_json<T, B>(&self, method: Method, endpoint: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        match serde_json::to_value(body) {
            Ok(body) => {
                self.request(endpoint, RequestOptions::new(method).with_body(body))
                    .await
            }
            Err(err) => ApiResponse::Failure(ApiError::invalid_request(format!(
                "failed to encode request body: {err}"
            ))),
        }
    }

    /// POST `body` and decode the streamed `data: ` payloads.
    ///
    /// Fails before yielding anything when the gateway answers with a
    /// non-success status.
    pub async fn stream_request<B>(&self, endpoint: &str, body: &B) -> Result<DataStream, StreamError>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self.http.post(self.url_for(endpoint)).json(body);
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "stream request rejected");
            return Err(StreamError::Status {
                status: status.as_u16(),
            });
        }
        debug!(endpoint, "stream opened");
        Ok(data_events(response.bytes_stream()))
    }
}

async fn read_json(response: Response) -> Value {
    match response.bytes().await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::Object(Map::new())),
        Err(err) => {
            debug!(error = %err, "failed to read gateway response body");
            Value::Object(Map::new())
        }
    }
}
