//! HTTP client for the Evolution API.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::config::EvolutionConfig;

use super::ProviderError;
use super::types::{
    ConnectionStateResponse, CreateInstanceResponse, FetchInstancesEntry, InstanceSnapshot,
    InstanceState, QrCode, QrCodePayload,
};

/// Per-step results of a best-effort teardown.
///
/// Teardown is not transactional: one step failing does not abort the other,
/// and the operation as a whole only fails when nothing was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownOutcome {
    pub logout_ok: bool,
    pub delete_ok: bool,
}

/// Typed client for the Evolution instance-management API.
///
/// All calls require the configured global API key; a client without one
/// fails every call fast, before any network I/O.
#[derive(Debug, Clone)]
pub struct EvolutionClient {
    base_url: Url,
    api_key: Option<String>,
    webhook_base_url: String,
    http: reqwest::Client,
}

impl EvolutionClient {
    /// Build a client from the application's provider configuration.
    pub fn from_config(config: &EvolutionConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            webhook_base_url: config.webhook_base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(ProviderError::MissingApiKey)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|err| ProviderError::Unavailable {
                detail: format!("invalid endpoint '{}': {}", path, err),
            })
    }

    /// Create a new provider instance bound to our webhook endpoint and
    /// return the initial scannable QR code.
    pub async fn create_instance(
        &self,
        name: &str,
        webhook_path: &str,
    ) -> Result<QrCode, ProviderError> {
        let key = self.require_key()?;
        let url = self.endpoint("/instance/create")?;

        let webhook_url = format!(
            "{}/{}",
            self.webhook_base_url,
            webhook_path.trim_start_matches('/')
        );

        debug!(instance_name = name, webhook_url = %webhook_url, "Creating provider instance");

        let response = self
            .http
            .post(url)
            .header("apikey", key)
            .json(&json!({
                "instanceName": name,
                "qrcode": true,
                "integration": "WHATSAPP-BAILEYS",
                "webhook": webhook_url,
                "webhook_by_events": false,
                "events": ["QRCODE_UPDATED", "CONNECTION_UPDATE"],
            }))
            .send()
            .await
            .map_err(into_unavailable)?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::FORBIDDEN {
            let detail = body_snippet(response).await;
            return Err(ProviderError::InvalidName {
                name: name.to_string(),
                detail,
            });
        }

        let parsed: CreateInstanceResponse = decode(check_status(response, name).await?).await?;

        if let Some(instance) = &parsed.instance {
            debug!(
                instance_name = %instance.instance_name,
                instance_id = ?instance.instance_id,
                apikey_issued = parsed.hash.as_ref().is_some_and(|h| h.apikey.is_some()),
                "Provider instance created"
            );
        }

        parsed
            .qrcode
            .and_then(QrCode::from_payload)
            .ok_or(ProviderError::Unexpected {
                status: status.as_u16(),
                body: Some("create response carried no QR payload".to_string()),
            })
    }

    /// Fetch a fresh QR code for an existing, not-yet-connected instance.
    pub async fn fetch_qr_code(&self, name: &str) -> Result<QrCode, ProviderError> {
        let key = self.require_key()?;
        let url = self.endpoint(&format!("/instance/connect/{}", name))?;

        let response = self
            .http
            .get(url)
            .header("apikey", key)
            .send()
            .await
            .map_err(into_unavailable)?;

        let status = response.status();
        let payload: QrCodePayload = decode(check_status(response, name).await?).await?;

        QrCode::from_payload(payload).ok_or(ProviderError::Unexpected {
            status: status.as_u16(),
            body: Some("connect response carried no QR payload".to_string()),
        })
    }

    /// One-shot probe of an instance's connection state.
    pub async fn fetch_connection_state(&self, name: &str) -> Result<InstanceState, ProviderError> {
        let key = self.require_key()?;
        let url = self.endpoint(&format!("/instance/connectionState/{}", name))?;

        let response = self
            .http
            .get(url)
            .header("apikey", key)
            .send()
            .await
            .map_err(into_unavailable)?;

        let parsed: ConnectionStateResponse = decode(check_status(response, name).await?).await?;
        Ok(parsed.state())
    }

    /// Bulk listing of every instance the provider knows, one call for the
    /// whole reconciliation pass.
    pub async fn list_instances(&self) -> Result<Vec<InstanceSnapshot>, ProviderError> {
        let key = self.require_key()?;
        let url = self.endpoint("/instance/fetchInstances")?;

        let response = self
            .http
            .get(url)
            .header("apikey", key)
            .send()
            .await
            .map_err(into_unavailable)?;

        let status = response.status();
        if !status.is_success() {
            let body = body_snippet(response).await;
            return Err(ProviderError::Unexpected {
                status: status.as_u16(),
                body: Some(body),
            });
        }

        let entries: Vec<FetchInstancesEntry> = decode(response).await?;
        Ok(entries.into_iter().map(|entry| entry.instance).collect())
    }

    /// Best-effort two-step teardown: log the session out, then delete the
    /// instance. Each step's failure is logged without aborting the other;
    /// the call errors only when both steps failed.
    pub async fn logout_and_delete(&self, name: &str) -> Result<TeardownOutcome, ProviderError> {
        // Fail fast on configuration before attempting either step.
        self.require_key()?;

        let logout = self
            .delete_request(&format!("/instance/logout/{}", name), name)
            .await;
        if let Err(err) = &logout {
            warn!(instance_name = name, error = %err, "Instance logout failed");
        }

        let delete = self
            .delete_request(&format!("/instance/delete/{}", name), name)
            .await;
        if let Err(err) = &delete {
            warn!(instance_name = name, error = %err, "Instance delete failed");
        }

        let logout_ok = logout.is_ok();
        match delete {
            Ok(()) => Ok(TeardownOutcome {
                logout_ok,
                delete_ok: true,
            }),
            Err(_) if logout_ok => Ok(TeardownOutcome {
                logout_ok: true,
                delete_ok: false,
            }),
            Err(delete_err) => Err(delete_err),
        }
    }

    async fn delete_request(&self, path: &str, name: &str) -> Result<(), ProviderError> {
        let key = self.require_key()?;
        let url = self.endpoint(path)?;

        let response = self
            .http
            .delete(url)
            .header("apikey", key)
            .send()
            .await
            .map_err(into_unavailable)?;

        check_status(response, name).await.map(|_| ())
    }
}

fn into_unavailable(err: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable {
        detail: err.to_string(),
    }
}

async fn check_status(response: Response, name: &str) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::InstanceNotFound {
            name: name.to_string(),
        });
    }

    let body = body_snippet(response).await;
    Err(ProviderError::Unexpected {
        status: status.as_u16(),
        body: Some(body),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    response
        .json()
        .await
        .map_err(|err| ProviderError::Unexpected {
            status: status.as_u16(),
            body: Some(format!("malformed response: {}", err)),
        })
}

async fn body_snippet(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    body.chars().take(200).collect()
}
