//! Wire Models
//!
//! Request and response bodies exchanged with the agent server's account
//! endpoints, plus the `{code, message, data}` envelope every JSON endpoint
//! wraps its payload in.

use crate::error::ClientError;
use serde::{Deserialize, Deserializer, Serialize, de};

/// Application-level success code carried in [`ApiResponse::code`].
pub const SUCCESS_CODE: i64 = 1;

/// The envelope every JSON endpoint responds with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<bool>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Converts a failed envelope into [`ClientError::Api`], keeping the optional payload.
    pub fn into_result(self) -> Result<Option<T>, ClientError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ClientError::Api {
                code: self.code,
                message: self.message,
            })
        }
    }

    /// Like [`into_result`](Self::into_result) but also requires a payload.
    pub fn into_data(self) -> Result<T, ClientError> {
        let code = self.code;
        self.into_result()?.ok_or_else(|| ClientError::Api {
            code,
            message: "response carried no data".to_string(),
        })
    }
}

/// Token lifetime, which the server sends either as a number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    pub fn as_secs(&self) -> Option<u64> {
        match self {
            ExpiresIn::Seconds(secs) => Some(*secs),
            ExpiresIn::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// A numeric identifier. Large ids arrive as strings so they survive
/// JavaScript number precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireId::Number(id) => Some(*id),
            WireId::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Deserializes an id sent either as a number or as a numeric string.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let id = WireId::deserialize(deserializer)?;
    id.as_i64()
        .ok_or_else(|| de::Error::custom(format!("invalid id {id:?}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: i64,
    pub email: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_avatar: Option<String>,
    #[serde(default)]
    pub user_role: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<ExpiresIn>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<ExpiresIn>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: String,
}
