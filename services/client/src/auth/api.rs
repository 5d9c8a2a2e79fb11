//! Account endpoints: verification codes, registration, sign-in, renewal and sign-out.
//!
//! These calls never carry a bearer credential and never go through the
//! request executor, so a failed renewal cannot recurse into another renewal.

use super::coordinator::{CredentialRenewer, RenewalError, RenewedCredentials};
use crate::{
    error::ClientError,
    models::{
        ApiResponse, LoginRequest, LoginResponse, LogoutRequest, RefreshTokenRequest,
        RefreshTokenResponse, RegisterRequest, SendCodeRequest, WireId,
    },
    transport::{ApiRequest, HttpResponse, HttpTransport},
};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{info, instrument};

pub const SEND_CODE_PATH: &str = "/user/send-code";
pub const REGISTER_PATH: &str = "/user/register";
pub const LOGIN_PATH: &str = "/user/login";
pub const REFRESH_PATH: &str = "/user/refresh-token";
pub const LOGOUT_PATH: &str = "/user/logout";

#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn HttpTransport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Asks the server to email a verification code to `email`.
    #[instrument(skip(self))]
    pub async fn send_code(&self, email: &str) -> Result<(), ClientError> {
        let request = SendCodeRequest {
            email: email.to_string(),
        };
        self.post::<serde_json::Value, _>(SEND_CODE_PATH, &request)
            .await?
            .into_result()?;
        info!("Verification code sent");
        Ok(())
    }

    /// Creates an account and returns the new user's id.
    #[instrument(skip_all, fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<i64, ClientError> {
        let response = self.post::<WireId, _>(REGISTER_PATH, request).await?;
        let code = response.code;
        let wire_id = response.into_data()?;
        let user_id = wire_id.as_i64().ok_or_else(|| ClientError::Api {
            code,
            message: format!("invalid user id {wire_id:?}"),
        })?;
        info!(user_id, "Account registered");
        Ok(user_id)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let login = self
            .post::<LoginResponse, _>(LOGIN_PATH, &request)
            .await?
            .into_data()?;
        info!(user_id = login.user_id, "Signed in");
        Ok(login)
    }

    /// Revokes `refresh_credential` on the server.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_credential: &str) -> Result<(), ClientError> {
        let request = LogoutRequest {
            refresh_token: refresh_credential.to_string(),
        };
        self.post::<serde_json::Value, _>(LOGOUT_PATH, &request)
            .await?
            .into_result()?;
        Ok(())
    }

    async fn send_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, ClientError> {
        let request = ApiRequest::post_json(path, serde_json::to_value(body)?);
        Ok(self.transport.send(&request, None).await?)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ClientError> {
        let response = self.send_json(path, body).await?;
        if !response.is_success() {
            return Err(ClientError::Status {
                status: response.status,
            });
        }
        Ok(response.json()?)
    }
}

#[async_trait]
impl CredentialRenewer for AuthApi {
    async fn renew(&self, refresh_credential: &str) -> Result<RenewedCredentials, RenewalError> {
        let request = ApiRequest::post_json(
            REFRESH_PATH,
            serde_json::to_value(RefreshTokenRequest {
                refresh_token: refresh_credential.to_string(),
            })?,
        );
        let response = self.transport.send(&request, None).await?;
        if !response.is_success() {
            return Err(RenewalError::Status(response.status));
        }

        // HTTP 200 still fails when the envelope code says so.
        let envelope: ApiResponse<RefreshTokenResponse> = response.json()?;
        if !envelope.is_success() {
            return Err(RenewalError::Rejected {
                code: envelope.code,
                message: envelope.message,
            });
        }
        let data = envelope.data.ok_or_else(|| RenewalError::Rejected {
            code: envelope.code,
            message: "renewal response carried no credentials".to_string(),
        })?;
        Ok(RenewedCredentials {
            access_credential: data.access_token,
            refresh_credential: data.refresh_token,
        })
    }
}
