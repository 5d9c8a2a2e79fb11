//! Authenticated Request Executor
//!
//! Sends a request with the current access credential. A `401` hands over to
//! the [`RefreshCoordinator`], and the request is replayed exactly once with
//! whatever credential it returns. Any other non-2xx status is returned as
//! [`ClientError::Status`] without a retry.

use crate::{
    auth::{CredentialStore, RefreshCoordinator},
    error::ClientError,
    transport::{ApiRequest, HttpResponse, HttpTransport, Query, UploadForm},
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const UNAUTHORIZED: u16 = 401;

#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
        }
    }

    /// Runs `request` under the renew-and-retry-once policy and returns the raw response.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub async fn execute_raw(&self, request: &ApiRequest) -> Result<HttpResponse, ClientError> {
        let bearer = self.store.access_credential();
        let response = self.transport.send(request, bearer.clone()).await?;
        if response.status != UNAUTHORIZED {
            return ensure_success(response);
        }

        debug!("Request unauthorized, asking for a fresh access credential");
        let Some(fresh) = self
            .coordinator
            .ensure_fresh_credential(bearer.as_deref())
            .await
        else {
            return Err(ClientError::SessionExpired);
        };

        let retried = self.transport.send(request, Some(fresh)).await?;
        if retried.status == UNAUTHORIZED {
            warn!("Request rejected again after renewal, giving up");
            return Err(ClientError::Unauthorized);
        }
        ensure_success(retried)
    }

    /// Runs `request` and decodes the response body as `T`.
    ///
    /// Most endpoints wrap their payload in [`ApiResponse`](crate::models::ApiResponse);
    /// use it as `T` to inspect the application-level code.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        let response = self.execute_raw(request).await?;
        Ok(response.json()?)
    }

    /// `GET path?params`, skipping parameters without a value.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: Query) -> Result<T, ClientError> {
        self.execute(&ApiRequest::get(path).with_query(params)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.execute(&ApiRequest::post_json(path, serde_json::to_value(body)?))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.execute(&ApiRequest::put_json(path, serde_json::to_value(body)?))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute(&ApiRequest::delete(path)).await
    }

    /// Multipart `POST`. The form is rebuilt for the retry.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: UploadForm,
    ) -> Result<T, ClientError> {
        self.execute(&ApiRequest::upload(path, form)).await
    }
}

fn ensure_success(response: HttpResponse) -> Result<HttpResponse, ClientError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status {
            status: response.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            coordinator::{
                MockCredentialRenewer, RenewalError,
                tests::{RecordingExpiry, renewed},
            },
            store::tests::signed_in_store,
        },
        transport::{MockHttpTransport, RequestBody, query_from},
    };
    use bytes::Bytes;
    use std::time::Duration;

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    struct Harness {
        executor: RequestExecutor,
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
        expiry: Arc<RecordingExpiry>,
    }

    fn harness(transport: MockHttpTransport, renewer: MockCredentialRenewer) -> Harness {
        let store = signed_in_store("old", "r1");
        let expiry = Arc::new(RecordingExpiry::default());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            Arc::new(renewer),
            expiry.clone(),
            Duration::from_millis(10),
            "/login",
        ));
        let executor = RequestExecutor::new(Arc::new(transport), store.clone(), coordinator.clone());
        Harness {
            executor,
            store,
            coordinator,
            expiry,
        }
    }

    /// Transport that rejects "old" and accepts "new".
    fn rotating_transport() -> MockHttpTransport {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().returning(|_, bearer| match bearer.as_deref() {
            Some("new") => Ok(response(200, r#"{"value":1}"#)),
            _ => Ok(response(401, "")),
        });
        transport
    }

    #[tokio::test]
    async fn test_attaches_current_bearer() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request, bearer| request.path == "/knowledge/list" && bearer.as_deref() == Some("old"))
            .times(1)
            .returning(|_, _| Ok(response(200, r#"{"code":1,"message":"ok","data":[]}"#)));
        let mut renewer = MockCredentialRenewer::new();
        renewer.expect_renew().never();
        let h = harness(transport, renewer);

        let value: serde_json::Value = h.executor.get("/knowledge/list", Vec::new()).await.unwrap();
        assert_eq!(value["code"], 1);
    }

    #[tokio::test]
    async fn test_get_encodes_present_params_only() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request, _| {
                request.query == vec![("page".to_string(), "1".to_string())]
                    && matches!(request.body, RequestBody::Empty)
            })
            .returning(|_, _| Ok(response(200, "{}")));
        let h = harness(transport, MockCredentialRenewer::new());

        let params = query_from([("page", Some("1")), ("keyword", None)]);
        let _: serde_json::Value = h.executor.get("/knowledge/list", params).await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_renews_and_retries_once() {
        let mut renewer = MockCredentialRenewer::new();
        renewer
            .expect_renew()
            .times(1)
            .returning(|_| Ok(renewed("new", "r2")));
        let h = harness(rotating_transport(), renewer);

        let value: serde_json::Value = h
            .executor
            .post("/conversation/create", &serde_json::json!({"title": "t"}))
            .await
            .unwrap();

        assert_eq!(value["value"], 1);
        assert_eq!(h.store.access_credential().as_deref(), Some("new"));
        assert_eq!(h.store.refresh_credential().as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_second_unauthorized_does_not_renew_again() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(2)
            .returning(|_, _| Ok(response(401, "")));
        let mut renewer = MockCredentialRenewer::new();
        renewer
            .expect_renew()
            .times(1)
            .returning(|_| Ok(renewed("new", "r2")));
        let h = harness(transport, renewer);

        let err = h
            .executor
            .delete::<serde_json::Value>("/conversation/3")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Unauthorized));
        assert_eq!(h.coordinator.renewals(), 1);
        // Credentials stay in place; only a failed renewal clears them.
        assert!(h.store.is_authenticated());
        assert!(h.expiry.notices.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_renewal_surfaces_session_expired() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(response(401, "")));
        let mut renewer = MockCredentialRenewer::new();
        renewer
            .expect_renew()
            .returning(|_| Err(RenewalError::Status(401)));
        let h = harness(transport, renewer);

        let err = h
            .executor
            .put::<serde_json::Value, _>("/user/profile", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::SessionExpired));
        assert!(err.is_authentication_failure());
        assert!(!h.store.is_authenticated());
        assert_eq!(h.expiry.notices.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Ok(response(500, "oops")));
        let mut renewer = MockCredentialRenewer::new();
        renewer.expect_renew().never();
        let h = harness(transport, renewer);

        let err = h
            .executor
            .get::<serde_json::Value>("/knowledge/list", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 500 }));
    }

    #[tokio::test]
    async fn test_upload_retries_with_same_form() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request, _| match &request.body {
                RequestBody::Multipart(form) => form.parts().len() == 2,
                _ => false,
            })
            .times(2)
            .returning(|_, bearer| match bearer.as_deref() {
                Some("new") => Ok(response(200, r#"{"code":1,"message":"ok","data":"doc-1"}"#)),
                _ => Ok(response(401, "")),
            });
        let mut renewer = MockCredentialRenewer::new();
        renewer
            .expect_renew()
            .times(1)
            .returning(|_| Ok(renewed("new", "r2")));
        let h = harness(transport, renewer);

        let form = UploadForm::new()
            .text("knowledgeId", "7")
            .file("file", "notes.md", Some("text/markdown".to_string()), "# notes".as_bytes());
        let value: serde_json::Value = h.executor.upload("/knowledge/upload", form).await.unwrap();
        assert_eq!(value["data"], "doc-1");
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_requests_share_one_renewal() {
        let mut renewer = MockCredentialRenewer::new();
        renewer
            .expect_renew()
            .times(1)
            .returning(|_| Ok(renewed("new", "r2")));
        let h = harness(rotating_transport(), renewer);
        let executor = Arc::new(h.executor);

        let requests: Vec<_> = (0..8)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    executor
                        .get::<serde_json::Value>(&format!("/items/{i}"), Vec::new())
                        .await
                })
            })
            .collect();

        for request in requests {
            assert_eq!(request.await.unwrap().unwrap()["value"], 1);
        }
        assert_eq!(h.coordinator.renewals(), 1);
    }
}
