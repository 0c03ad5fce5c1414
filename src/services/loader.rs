use crate::model::PageId;
use crate::permissions::Capabilities;
use crate::records::{Area, ConnectionType, Conversion, ConversionStatus, Valve, ValveLog};
use crate::services::api_client::{ApiClient, ApiError};
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// One backend call a page asks the loop to make off-thread.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiRequest {
    Capabilities {
        page: &'static str,
    },
    Valves {
        token: u64,
        query: Vec<(String, String)>,
    },
    Conversions {
        token: u64,
        query: Vec<(String, String)>,
    },
    Areas,
    ConnectionTypes,
    CreateValve {
        payload: Map<String, JsonValue>,
        attachments: Vec<(String, PathBuf)>,
    },
    UpdateValve {
        id: i64,
        payload: Map<String, JsonValue>,
    },
    DeleteValve(i64),
    ValveLogs(i64),
    SetConversionStatus {
        id: i64,
        status: ConversionStatus,
    },
    UpdateConversion {
        id: i64,
        payload: Map<String, JsonValue>,
    },
    DeleteConversion(i64),
}

/// Which call a result belongs to; failures are routed by this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Capabilities,
    Valves,
    Conversions,
    Areas,
    ConnectionTypes,
    CreateValve,
    UpdateValve,
    DeleteValve,
    ValveLogs,
    SetConversionStatus,
    UpdateConversion,
    DeleteConversion,
}

impl ApiRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            ApiRequest::Capabilities { .. } => RequestKind::Capabilities,
            ApiRequest::Valves { .. } => RequestKind::Valves,
            ApiRequest::Conversions { .. } => RequestKind::Conversions,
            ApiRequest::Areas => RequestKind::Areas,
            ApiRequest::ConnectionTypes => RequestKind::ConnectionTypes,
            ApiRequest::CreateValve { .. } => RequestKind::CreateValve,
            ApiRequest::UpdateValve { .. } => RequestKind::UpdateValve,
            ApiRequest::DeleteValve(_) => RequestKind::DeleteValve,
            ApiRequest::ValveLogs(_) => RequestKind::ValveLogs,
            ApiRequest::SetConversionStatus { .. } => RequestKind::SetConversionStatus,
            ApiRequest::UpdateConversion { .. } => RequestKind::UpdateConversion,
            ApiRequest::DeleteConversion(_) => RequestKind::DeleteConversion,
        }
    }

    /// Token of a list fetch, used to drop stale failures as well as results.
    pub fn token(&self) -> Option<u64> {
        match self {
            ApiRequest::Valves { token, .. } | ApiRequest::Conversions { token, .. } => {
                Some(*token)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Loaded {
    Capabilities(Capabilities),
    Valves { token: u64, items: Vec<Valve> },
    Conversions { token: u64, items: Vec<Conversion> },
    Areas(Vec<Area>),
    ConnectionTypes(Vec<ConnectionType>),
    ValveCreated(Valve),
    ValveSaved(Valve),
    ValveDeleted(i64),
    Logs { valve_id: i64, logs: Vec<ValveLog> },
    ConversionStatusSet { id: i64, status: ConversionStatus },
    ConversionSaved(Conversion),
    ConversionDeleted(i64),
}

pub struct LoadMsg {
    pub page: PageId,
    pub kind: RequestKind,
    pub token: Option<u64>,
    pub outcome: Result<Loaded, ApiError>,
}

/// Resolve permissions: profile first, then its role when it has one.
pub fn load_capabilities(api: &ApiClient, page: &str) -> Result<Capabilities, ApiError> {
    let profile = api.profile()?;
    let role = match profile.role.as_ref() {
        Some(r) => Some(api.role(r.id)?),
        None => None,
    };
    Ok(Capabilities::derive(&profile, role.as_ref(), page))
}

pub fn run_request(api: &ApiClient, req: ApiRequest) -> Result<Loaded, ApiError> {
    match req {
        ApiRequest::Capabilities { page } => load_capabilities(api, page).map(Loaded::Capabilities),
        ApiRequest::Valves { token, query } => api
            .list_valves(&query)
            .map(|items| Loaded::Valves { token, items }),
        ApiRequest::Conversions { token, query } => api
            .list_conversions(&query)
            .map(|items| Loaded::Conversions { token, items }),
        ApiRequest::Areas => api.list_areas().map(Loaded::Areas),
        ApiRequest::ConnectionTypes => api.list_connection_types().map(Loaded::ConnectionTypes),
        ApiRequest::CreateValve {
            payload,
            attachments,
        } => api
            .create_valve(&payload, &attachments)
            .map(Loaded::ValveCreated),
        ApiRequest::UpdateValve { id, payload } => {
            api.update_valve(id, &payload).map(Loaded::ValveSaved)
        }
        ApiRequest::DeleteValve(id) => api.delete_valve(id).map(|_| Loaded::ValveDeleted(id)),
        ApiRequest::ValveLogs(valve_id) => api
            .valve_logs(valve_id)
            .map(|logs| Loaded::Logs { valve_id, logs }),
        ApiRequest::SetConversionStatus { id, status } => {
            let mut body = Map::new();
            body.insert("status".into(), JsonValue::String(status.as_str().into()));
            api.patch_conversion(id, &body)
                .map(|_| Loaded::ConversionStatusSet { id, status })
        }
        ApiRequest::UpdateConversion { id, payload } => api
            .patch_conversion(id, &payload)
            .map(Loaded::ConversionSaved),
        ApiRequest::DeleteConversion(id) => api
            .delete_conversion(id)
            .map(|_| Loaded::ConversionDeleted(id)),
    }
}

pub fn spawn_request(api: Arc<ApiClient>, page: PageId, req: ApiRequest, tx: Sender<LoadMsg>) {
    thread::spawn(move || {
        let kind = req.kind();
        let token = req.token();
        let outcome = run_request(&api, req);
        debug!(?page, ?kind, ok = outcome.is_ok(), "request finished");
        let _ = tx.send(LoadMsg {
            page,
            kind,
            token,
            outcome,
        });
    });
}

#[cfg(test)]
mod loader_tests;
