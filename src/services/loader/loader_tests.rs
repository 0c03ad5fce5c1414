use super::*;
use crate::model::ApiConfig;
use serde_json::json;
use std::sync::mpsc;
use std::time::Duration;

fn api(server: &mockito::Server) -> ApiClient {
    ApiClient::new(&ApiConfig {
        base_url: server.url(),
        token: None,
        timeout_secs: 5,
    })
    .unwrap()
}

fn json_mock(server: &mut mockito::Server, method: &str, path: &str, body: JsonValue) -> mockito::Mock {
    server
        .mock(method, path)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create()
}

#[test]
fn capabilities_follow_profile_role() {
    let mut server = mockito::Server::new();
    json_mock(
        &mut server,
        "GET",
        "/auth/profile/",
        json!({"id": 1, "username": "ae", "email": "", "is_superuser": false,
               "role": {"id": 4, "name": "Engineer"}}),
    );
    let role = json_mock(
        &mut server,
        "GET",
        "/auth/roles/4/",
        json!({"id": 4, "name": "Engineer", "permissions": [
            {"page": "valves", "can_view": true, "can_add": false, "can_edit": true, "can_delete": false},
            {"page": "e-tapp", "can_view": true, "can_add": true, "can_edit": true, "can_delete": true}
        ]}),
    );
    let caps = load_capabilities(&api(&server), "valves").unwrap();
    role.assert();
    assert!(caps.can_edit);
    assert!(!caps.can_delete);
}

#[test]
fn profile_without_role_skips_role_lookup() {
    let mut server = mockito::Server::new();
    json_mock(
        &mut server,
        "GET",
        "/auth/profile/",
        json!({"id": 1, "username": "x", "email": "", "is_superuser": false, "role": null}),
    );
    let role = server.mock("GET", mockito::Matcher::Regex("^/auth/roles/".into())).expect(0).create();
    let caps = load_capabilities(&api(&server), "e-tapp").unwrap();
    role.assert();
    assert!(caps.loaded);
    assert!(!caps.can_edit && !caps.can_delete);
}

#[test]
fn status_patch_reports_the_new_status() {
    let mut server = mockito::Server::new();
    let m = server
        .mock("PATCH", "/conversion/conversions/3/")
        .match_body(mockito::Matcher::Json(json!({"status": "fo"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"id": 3, "name": "A", "from_connection_type": 1, "to_connection_type": 2,
                   "status": "fo", "created_at": "2025-04-01T00:00:00Z"})
            .to_string(),
        )
        .create();
    let out = run_request(
        &api(&server),
        ApiRequest::SetConversionStatus {
            id: 3,
            status: ConversionStatus::Fo,
        },
    )
    .unwrap();
    m.assert();
    assert_eq!(
        out,
        Loaded::ConversionStatusSet {
            id: 3,
            status: ConversionStatus::Fo
        }
    );
}

#[test]
fn spawned_request_reports_kind_and_token() {
    let mut server = mockito::Server::new();
    json_mock(&mut server, "GET", "/valve/valves/", json!([]));
    let (tx, rx) = mpsc::channel();
    spawn_request(
        Arc::new(api(&server)),
        PageId::Valves,
        ApiRequest::Valves {
            token: 7,
            query: Vec::new(),
        },
        tx,
    );
    let msg = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(msg.page, PageId::Valves);
    assert_eq!(msg.kind, RequestKind::Valves);
    assert_eq!(msg.token, Some(7));
    assert_eq!(
        msg.outcome.unwrap(),
        Loaded::Valves {
            token: 7,
            items: Vec::new()
        }
    );
}

#[test]
fn failures_keep_their_kind() {
    let mut server = mockito::Server::new();
    server.mock("DELETE", "/valve/valves/2/").with_status(500).create();
    let (tx, rx) = mpsc::channel();
    spawn_request(Arc::new(api(&server)), PageId::Valves, ApiRequest::DeleteValve(2), tx);
    let msg = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(msg.kind, RequestKind::DeleteValve);
    assert!(matches!(msg.outcome, Err(ApiError::Status { status: 500, .. })));
}
