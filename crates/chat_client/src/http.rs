use chat_shared::protocol::ResponseEnvelope;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{ClientError, Result},
    session::CredentialStore,
};

const INVALID_TOKEN_MESSAGE: &str = "Invalid token";

/// Request plumbing shared by the gateway clients.
///
/// Every response is a `{success, message, ...}` object. `success: false` is
/// a remote failure; an authentication rejection also ends the session held
/// in the credential store.
#[derive(Debug, Clone)]
pub struct GatewayHttp {
    http: Client,
    base_url: String,
    credentials: CredentialStore,
}

impl GatewayHttp {
    pub fn new(base_url: impl Into<String>, credentials: CredentialStore) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub(crate) async fn get<Q, T>(&self, path: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("http: GET {path}");
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await?;
        self.decode(response).await
    }

    pub(crate) async fn post_form<F, T>(&self, path: &str, form: &F) -> Result<T>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("http: POST {path}");
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .form(form)
            .send()
            .await?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        let value = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => value,
            Err(err) => {
                if status == StatusCode::UNAUTHORIZED {
                    return Err(self.reject_session(INVALID_TOKEN_MESSAGE));
                }
                if !status.is_success() {
                    return Err(ClientError::Remote(format!(
                        "gateway returned status {status}"
                    )));
                }
                return Err(err.into());
            }
        };

        let envelope: ResponseEnvelope = serde_json::from_value(value.clone())?;
        if status == StatusCode::UNAUTHORIZED
            || (!envelope.success
                && envelope.message.as_deref() == Some(INVALID_TOKEN_MESSAGE))
        {
            let message = envelope
                .message
                .unwrap_or_else(|| INVALID_TOKEN_MESSAGE.to_string());
            return Err(self.reject_session(&message));
        }
        if !envelope.success {
            return Err(ClientError::Remote(envelope.message.unwrap_or_else(|| {
                format!("request failed with status {status}")
            })));
        }

        Ok(serde_json::from_value(value)?)
    }

    fn reject_session(&self, message: &str) -> ClientError {
        if let Some(credential) = self.credentials.clear() {
            warn!(
                user_id = credential.user_id.0,
                "http: gateway rejected credential; session cleared"
            );
        }
        ClientError::AuthFailure(message.to_string())
    }
}
