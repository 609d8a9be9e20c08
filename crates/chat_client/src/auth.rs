use chat_shared::{
    domain::{Credential, UserId},
    protocol::{CredentialsForm, LoginReply, RegisterReply},
};
use tracing::info;

use crate::{
    error::{ClientError, Result},
    http::GatewayHttp,
};

/// Credential exchange with the gateway. Saving the resulting credential is
/// left to the session owner.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: GatewayHttp,
}

impl AuthClient {
    pub fn new(http: GatewayHttp) -> Self {
        Self { http }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Credential> {
        let form = credentials_form(username, password)?;
        let reply: LoginReply = self
            .http
            .post_form("/api/login", &form)
            .await
            .map_err(|err| match err {
                ClientError::Remote(message) => ClientError::AuthFailure(message),
                other => other,
            })?;
        info!(user_id = reply.user_id.0, "auth: login accepted");
        Ok(Credential::new(reply.token, reply.user_id, form.username))
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<UserId> {
        let form = credentials_form(username, password)?;
        let reply: RegisterReply = self.http.post_form("/api/register", &form).await?;
        info!(user_id = reply.user_id.0, "auth: account registered");
        Ok(reply.user_id)
    }
}

fn credentials_form(username: &str, password: &str) -> Result<CredentialsForm> {
    if username.is_empty() {
        return Err(ClientError::validation("username is required"));
    }
    if password.is_empty() {
        return Err(ClientError::validation("password is required"));
    }
    Ok(CredentialsForm {
        username: username.to_string(),
        password: password.to_string(),
    })
}
