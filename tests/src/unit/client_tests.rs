use crate::support::{MockGateway, VALID_PASSWORD, VALID_TOKEN};
use querydesk_core::api::{ApiResponse, ErrorKind, HeaderName, HeaderValue, RequestOptions};
use querydesk_core::{ApiClient, GatewayApi, GatewaySettings, SessionEvent, SessionManager};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn signed_in(gateway: &MockGateway) -> (GatewayApi, UnboundedReceiver<SessionEvent>) {
    let (api, mut events) = gateway.connect();
    api.login("ada@example.com", VALID_PASSWORD)
        .await
        .into_result()
        .expect("login");
    drain(&mut events);
    (api, events)
}

#[tokio::test]
async fn login_stores_token_user_and_cookie() {
    let gateway = MockGateway::spawn().await;
    let (api, mut events) = gateway.connect();

    let auth = api
        .login("ada@example.com", VALID_PASSWORD)
        .await
        .into_result()
        .expect("login");

    assert_eq!(auth.token, VALID_TOKEN);
    assert_eq!(api.session().token().as_deref(), Some(VALID_TOKEN));
    assert_eq!(api.session().user().unwrap().email, "ada@example.com");
    assert_eq!(
        api.session().cookie_header().as_deref(),
        Some("authToken=tok-valid")
    );
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SessionEvent::SignedIn { .. }]
    ));
}

#[tokio::test]
async fn bearer_header_follows_the_stored_token() {
    let gateway = MockGateway::spawn().await;
    let (api, _events) = gateway.connect();

    let anonymous: ApiResponse<Value> = api.client().get("/echo").await;
    let echoed = anonymous.data().expect("echo data");
    assert_eq!(echoed["authorization"], Value::Null);
    assert_eq!(echoed["contentType"], "application/json");

    api.session().establish("abc", None).unwrap();
    let options = RequestOptions::default().with_header(
        HeaderName::from_static("x-custom"),
        HeaderValue::from_static("yes"),
    );
    let authed: ApiResponse<Value> = api.client().request("/echo", options).await;
    let echoed = authed.data().expect("echo data");
    assert_eq!(echoed["authorization"], "Bearer abc");
    assert_eq!(echoed["custom"], "yes");
}

#[tokio::test]
async fn failed_login_does_not_end_the_session() {
    let gateway = MockGateway::spawn().await;
    let (api, mut events) = signed_in(&gateway).await;

    let response = api.login("ada@example.com", "wrong").await;
    let error = response.error().expect("login should fail");
    assert_eq!(error.status, 401);
    assert_eq!(error.kind, ErrorKind::Status);
    assert_eq!(error.message, "Invalid email or password");
    assert_eq!(error.code.as_deref(), Some("INVALID_CREDENTIALS"));

    assert_eq!(api.session().token().as_deref(), Some(VALID_TOKEN));
    assert!(!api.session().is_logging_out());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn concurrent_unauthorized_calls_expire_once() {
    let gateway = MockGateway::spawn().await;
    let (api, mut events) = gateway.connect();
    api.session().establish("tok-stale", None).unwrap();
    drain(&mut events);

    let (first, second) = tokio::join!(api.conversations(), api.conversations());

    for response in [&first, &second] {
        let error = response.error().expect("both calls fail");
        assert_eq!(error.status, 401);
        assert!(error.is_session_expired());
        assert!(response.data().is_none());
    }
    assert_eq!(gateway.unauthorized_count(), 2);
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Expired {
            redirect: "/login?reason=session_expired".into()
        }]
    );
    assert!(api.session().token().is_none());
    assert!(api.session().cookie().is_none());

    let third = api.conversations().await;
    assert!(third.error().unwrap().is_session_expired());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn non_json_success_body_becomes_empty_object() {
    let gateway = MockGateway::spawn().await;
    let (api, _events) = gateway.connect();

    let response: ApiResponse<Value> = api.client().get("/not-json").await;
    assert_eq!(response, ApiResponse::Success(json!({})));
}

#[tokio::test]
async fn server_errors_carry_message_status_and_code() {
    let gateway = MockGateway::spawn().await;
    let (api, _events) = gateway.connect();

    let response: ApiResponse<Value> = api.client().get("/unavailable").await;
    let error = response.into_result().unwrap_err();
    assert_eq!(error.message, "Warehouse offline");
    assert_eq!(error.status, 503);
    assert_eq!(error.code.as_deref(), Some("WAREHOUSE_DOWN"));
    assert_eq!(error.kind, ErrorKind::Status);
    assert!(!api.session().is_logging_out());
}

#[tokio::test]
async fn mismatched_success_payload_is_rejected_at_the_boundary() {
    let gateway = MockGateway::spawn().await;
    let (api, _events) = signed_in(&gateway).await;

    let mut request = querydesk_core::gateway::QueryRequest::new("bad shape");
    request.datasource_id = Some("ds-1".into());
    let error = api.translate(&request).await.into_result().unwrap_err();
    assert_eq!(error.kind, ErrorKind::InvalidResponse);
    assert_eq!(error.status, 200);
    assert_eq!(error.code.as_deref(), Some("invalid_response"));
}

#[tokio::test]
async fn unreachable_gateway_reports_status_zero() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let settings =
        GatewaySettings::for_base_url(&format!("http://127.0.0.1:{port}"), std::env::temp_dir())
            .unwrap();
    let (session, _events) = SessionManager::in_memory();
    let client = ApiClient::new(&settings, session).unwrap();

    let response: ApiResponse<Value> = client.get("/conversations").await;
    let error = response.error().expect("network failure");
    assert_eq!(error.status, 0);
    assert_eq!(error.kind, ErrorKind::Network);
    assert!(!error.message.is_empty());
}

#[tokio::test]
async fn typed_endpoints_decode_gateway_payloads() {
    let gateway = MockGateway::spawn().await;
    let (api, _events) = signed_in(&gateway).await;

    let conversations = api.conversations().await.into_result().unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].message_count, 4);

    let schema = api.schema("ds-1").await.into_result().unwrap();
    assert_eq!(schema.datasource_id, "ds-1");
    assert_eq!(schema.tables[0].columns.len(), 2);
    assert!(schema.tables[0].columns[1].nullable);

    let datasources = api.datasources().await.into_result().unwrap();
    assert_eq!(datasources[0].name, "warehouse");

    assert!(api.delete_conversation("c-1").await.is_success());

    let notice = api
        .forgot_password("ada@example.com")
        .await
        .into_result()
        .unwrap();
    assert_eq!(notice.message.as_deref(), Some("Reset link sent"));
}

#[tokio::test]
async fn ids_with_reserved_characters_stay_inside_their_route() {
    let gateway = MockGateway::spawn().await;
    let (api, mut events) = gateway.connect();
    api.session().establish("tok-stale", None).unwrap();
    drain(&mut events);

    let error = api
        .conversation("c-1/auth/login")
        .await
        .into_result()
        .unwrap_err();
    assert_eq!(error.status, 401);
    assert!(error.is_session_expired());
    assert_eq!(gateway.unauthorized_count(), 1);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SessionEvent::Expired { .. }]
    ));
}
