use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::error::{ClientError, Result};

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub gateway_url: String,
    /// Websocket base URL; derived from `gateway_url` when unset.
    pub ws_url: Option<String>,
    pub event_capacity: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8080".into(),
            ws_url: None,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    gateway_url: Option<String>,
    ws_url: Option<String>,
    event_capacity: Option<usize>,
}

impl ClientSettings {
    pub fn ws_base_url(&self) -> Result<String> {
        match &self.ws_url {
            Some(url) => Ok(url.trim_end_matches('/').to_string()),
            None => derive_ws_url(&self.gateway_url),
        }
    }

    /// Socket endpoint for one connection, carrying the token as a query
    /// credential.
    pub fn realtime_endpoint(&self, token: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/ws", self.ws_base_url()?))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

pub fn derive_ws_url(gateway_url: &str) -> Result<String> {
    let gateway_url = gateway_url.trim_end_matches('/');
    if gateway_url.starts_with("https://") {
        Ok(gateway_url.replacen("https://", "wss://", 1))
    } else if gateway_url.starts_with("http://") {
        Ok(gateway_url.replacen("http://", "ws://", 1))
    } else {
        Err(ClientError::validation(
            "gateway_url must start with http:// or https://",
        ))
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from<F>(path: &Path, env: F) -> ClientSettings
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_settings(&mut settings, &raw);
    }
    apply_env_settings(&mut settings, env);

    settings
}

pub(crate) fn apply_file_settings(settings: &mut ClientSettings, raw: &str) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!("config: ignoring unreadable settings file: {err}");
            return;
        }
    };
    if let Some(v) = file_cfg.gateway_url {
        settings.gateway_url = v;
    }
    if let Some(v) = file_cfg.ws_url {
        settings.ws_url = Some(v);
    }
    if let Some(v) = file_cfg.event_capacity {
        settings.event_capacity = v.max(1);
    }
}

pub(crate) fn apply_env_settings<F>(settings: &mut ClientSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = env("CHAT_GATEWAY_URL") {
        settings.gateway_url = v;
    }
    if let Some(v) = env("APP__GATEWAY_URL") {
        settings.gateway_url = v;
    }

    if let Some(v) = env("CHAT_WS_URL") {
        settings.ws_url = Some(v);
    }
    if let Some(v) = env("APP__WS_URL") {
        settings.ws_url = Some(v);
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
