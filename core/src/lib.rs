pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod gateway;
pub mod routes;
pub mod session;
pub mod store;
pub mod stream;
pub mod telemetry;

pub use api::{ApiClient, ApiError, ApiResponse, ErrorKind, RequestOptions};
pub use auth::{AuthCookie, UserRecord};
pub use chat::{ChatMessage, ChatSession, Conversation, MessageRole, StreamChunk};
pub use config::{ConfigError, GatewaySettings, SettingsOverrides};
pub use gateway::GatewayApi;
pub use routes::{RouteDecision, RouteGate};
pub use session::{SessionEvent, SessionManager};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use stream::{DataStream, StreamError};
