use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const AUTH_COOKIE_NAME: &str = "authToken";
pub const AUTH_COOKIE_TTL_DAYS: i64 = 7;

/// Identity of the signed-in user, persisted next to the token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
}

/// The persisted session: the bearer token, the user it belongs to and
/// when the matching cookie runs out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    #[serde(rename = "authToken")]
    pub auth_token: String,
    #[serde(default)]
    pub user: Option<UserRecord>,
    /// Missing in files written before the expiry was stored.
    #[serde(
        rename = "cookieExpiresAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cookie_expires_at: Option<DateTime<Utc>>,
}

impl StoredSession {
    pub fn new(auth_token: impl Into<String>, user: Option<UserRecord>) -> Self {
        Self {
            auth_token: auth_token.into(),
            user,
            cookie_expires_at: None,
        }
    }

    /// Cookie for this session, keeping the stored expiry when there is one.
    pub fn cookie(&self) -> AuthCookie {
        let cookie = AuthCookie::new(self.auth_token.clone());
        match self.cookie_expires_at {
            Some(expires_at) => AuthCookie {
                expires_at,
                ..cookie
            },
            None => cookie,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Cookie mirror of the session token, read by the route gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthCookie {
    pub value: String,
    pub path: String,
    pub same_site: SameSite,
    pub expires_at: DateTime<Utc>,
}

impl AuthCookie {
    pub fn new(token: impl Into<String>) -> Self {
        Self::issued_at(token, Utc::now())
    }

    pub fn issued_at(token: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            value: token.into(),
            path: "/".to_string(),
            same_site: SameSite::Lax,
            expires_at: now + Duration::days(AUTH_COOKIE_TTL_DAYS),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// `Set-Cookie` value that installs this cookie.
    pub fn to_header_value(&self) -> String {
        format!(
            "{AUTH_COOKIE_NAME}={}; Path={}; Expires={}; SameSite={}",
            self.value,
            self.path,
            self.expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.same_site.as_str()
        )
    }

    /// `Set-Cookie` value that removes the cookie.
    pub fn clearing_header_value() -> String {
        format!("{AUTH_COOKIE_NAME}=; Path=/; Max-Age=0; SameSite=Lax")
    }
}
