// VyOS HTTPS API client

use async_trait::async_trait;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::time::Duration;

use super::{RouterApi, UNKNOWN_ASN};
use crate::error::{AppError, AppResult};

pub struct VyosApi {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl VyosApi {
    pub fn new(router: &str, api_key: String, verify_tls: bool, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(timeout)
            .build()?;

        Ok(VyosApi {
            client,
            base_url: format!("https://{}", router),
            api_key,
        })
    }

    async fn post(&self, endpoint: &str, payload: Value) -> AppResult<Value> {
        let form = reqwest::multipart::Form::new()
            .text("data", payload.to_string())
            .text("key", self.api_key.clone());

        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!("POST {} {}", url, payload);

        let response = self.client.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(AppError::RouterApi(format!("{} returned {}", url, response.status())));
        }
        let body: Value = response.json().await?;
        Ok(body)
    }

    async fn show(&self, path: &[&str]) -> String {
        match self.post("show", show_payload(path)).await {
            Ok(body) => body.get("data").and_then(Value::as_str).unwrap_or_default().to_string(),
            Err(e) => {
                tracing::warn!("show {} failed: {}", path.join(" "), e);
                String::new()
            }
        }
    }
}

fn show_payload(path: &[&str]) -> Value {
    json!({ "op": "show", "path": path })
}

fn system_as_payload() -> Value {
    json!({ "op": "showConfig", "path": ["protocols", "bgp", "system-as"] })
}

/// Pull `data.system-as` out of a `/retrieve` response. Accepts a string or a number.
fn extract_system_as(body: &Value) -> String {
    match body.get("data").and_then(|d| d.get("system-as")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN_ASN.to_string(),
    }
}

#[async_trait]
impl RouterApi for VyosApi {
    async fn local_asn(&self) -> String {
        match self.post("retrieve", system_as_payload()).await {
            Ok(body) => extract_system_as(&body),
            Err(e) => {
                tracing::warn!("Failed to retrieve system ASN: {}", e);
                UNKNOWN_ASN.to_string()
            }
        }
    }

    async fn bgp_summary(&self) -> String {
        self.show(&["bgp", "ipv4", "summary"]).await
    }

    async fn received_routes(&self, neighbor: IpAddr) -> String {
        let neighbor = neighbor.to_string();
        self.show(&["bgp", "ipv4", "neighbors", neighbor.as_str(), "received-routes"])
            .await
    }
}
