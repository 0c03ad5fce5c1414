use crate::model::ApiConfig;
use crate::records::{Area, ConnectionType, Conversion, Profile, Role, Valve, ValveLog};
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Status { status: u16, detail: Option<String> },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0}")]
    Io(String),
}

impl ApiError {
    /// Message for the user: the server's own explanation when it sent one.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Status {
                detail: Some(d), ..
            } if !d.trim().is_empty() => d.clone(),
            _ => fallback.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Pull a human-readable reason out of an error body: `detail`, else the
/// first message of the first field error (`{"area_id": ["..."]}`).
pub fn extract_detail(body: &JsonValue) -> Option<String> {
    if let Some(d) = body.get("detail").and_then(|d| d.as_str()) {
        return Some(d.to_string());
    }
    let obj = body.as_object()?;
    obj.values().find_map(|v| match v {
        JsonValue::Array(items) => items.first().and_then(|s| s.as_str()).map(str::to_string),
        JsonValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl ApiClient {
    pub fn new(cfg: &ApiConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self.http.request(method, self.url(path));
        match &self.token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        }
    }

    fn check(resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = resp
            .text()
            .ok()
            .and_then(|t| serde_json::from_str::<JsonValue>(&t).ok())
            .and_then(|v| extract_detail(&v));
        warn!(status = status.as_u16(), detail = ?detail, "api request failed");
        Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ApiError> {
        info!(path, ?query, "GET");
        let resp = self.request(Method::GET, path).query(query).send()?;
        let resp = Self::check(resp)?;
        resp.json::<T>()
            .map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Map<String, JsonValue>,
    ) -> Result<T, ApiError> {
        info!(path, %method, "sending json");
        let resp = self.request(method, path).json(body).send()?;
        let resp = Self::check(resp)?;
        resp.json::<T>()
            .map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }

    fn delete(&self, path: &str) -> Result<(), ApiError> {
        info!(path, "DELETE");
        let resp = self.request(Method::DELETE, path).send()?;
        Self::check(resp).map(|_| ())
    }

    pub fn list_valves(&self, query: &[(String, String)]) -> Result<Vec<Valve>, ApiError> {
        self.get_json("/valve/valves/", query)
    }

    pub fn list_conversions(&self, query: &[(String, String)]) -> Result<Vec<Conversion>, ApiError> {
        self.get_json("/conversion/conversions/", query)
    }

    pub fn list_areas(&self) -> Result<Vec<Area>, ApiError> {
        self.get_json("/area/add-area/", &[])
    }

    pub fn list_connection_types(&self) -> Result<Vec<ConnectionType>, ApiError> {
        self.get_json("/connectiontype/connection-types/", &[])
    }

    pub fn profile(&self) -> Result<Profile, ApiError> {
        self.get_json("/auth/profile/", &[])
    }

    pub fn role(&self, id: i64) -> Result<Role, ApiError> {
        self.get_json(&format!("/auth/roles/{id}/"), &[])
    }

    /// Create a valve. Attachments switch the body to multipart with the
    /// JSON fields sent as text parts.
    pub fn create_valve(
        &self,
        payload: &Map<String, JsonValue>,
        attachments: &[(String, PathBuf)],
    ) -> Result<Valve, ApiError> {
        if attachments.is_empty() {
            return self.send_json(Method::POST, "/valve/valves/", payload);
        }
        let mut form = multipart::Form::new();
        for (k, v) in payload {
            let text = match v {
                JsonValue::Null => continue,
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            form = form.text(k.clone(), text);
        }
        for (field, path) in attachments {
            form = form
                .file(field.clone(), path)
                .map_err(|e| ApiError::Io(format!("{}: {e}", path.display())))?;
        }
        info!(files = attachments.len(), "POST /valve/valves/ (multipart)");
        let resp = self
            .request(Method::POST, "/valve/valves/")
            .multipart(form)
            .send()?;
        let resp = Self::check(resp)?;
        resp.json::<Valve>()
            .map_err(|e| ApiError::Decode(format!("/valve/valves/: {e}")))
    }

    pub fn update_valve(&self, id: i64, payload: &Map<String, JsonValue>) -> Result<Valve, ApiError> {
        self.send_json(Method::PUT, &format!("/valve/valves/{id}/"), payload)
    }

    pub fn delete_valve(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/valve/valves/{id}/"))
    }

    /// Audit trail for one valve, oldest entry first.
    pub fn valve_logs(&self, valve_id: i64) -> Result<Vec<ValveLog>, ApiError> {
        let mut logs: Vec<ValveLog> =
            self.get_json("/valve/logs/", &[("valve_id".to_string(), valve_id.to_string())])?;
        logs.reverse();
        debug!(valve_id, count = logs.len(), "fetched valve logs");
        Ok(logs)
    }

    pub fn patch_conversion(
        &self,
        id: i64,
        payload: &Map<String, JsonValue>,
    ) -> Result<Conversion, ApiError> {
        self.send_json(Method::PATCH, &format!("/conversion/conversions/{id}/"), payload)
    }

    pub fn delete_conversion(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/conversion/conversions/{id}/"))
    }
}
