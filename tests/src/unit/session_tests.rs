use crate::support::{MockGateway, VALID_PASSWORD, VALID_TOKEN};
use querydesk::commands;
use querydesk::{spawn_session_watcher, CliSettings, Command, Shell};
use querydesk_core::{GatewaySettings, RouteDecision, SessionEvent};
use tempfile::TempDir;

fn settings_in(gateway: &MockGateway, dir: &TempDir) -> GatewaySettings {
    GatewaySettings::for_base_url(&gateway.base_url, dir.path().to_path_buf()).unwrap()
}

#[tokio::test]
async fn session_survives_a_new_shell() {
    let gateway = MockGateway::spawn().await;
    let dir = TempDir::new().expect("temp dir");
    let settings = settings_in(&gateway, &dir);

    let (shell, _events) = Shell::connect(&settings).unwrap();
    let mut cli = CliSettings::default();
    commands::run(
        &shell,
        &mut cli,
        Command::Login {
            email: "ada@example.com".into(),
            password: Some(VALID_PASSWORD.into()),
        },
    )
    .await
    .unwrap();
    assert!(dir.path().join("session.json").exists());
    let expires_at = shell.session().cookie().unwrap().expires_at;
    drop(shell);

    let (restored, _events) = Shell::connect(&settings).unwrap();
    assert_eq!(restored.session().token().as_deref(), Some(VALID_TOKEN));
    assert_eq!(restored.session().cookie().unwrap().expires_at, expires_at);
    assert_eq!(restored.session().user().unwrap().email, "ada@example.com");
    let conversations = restored.gateway.conversations().await.into_result().unwrap();
    assert_eq!(conversations.len(), 2);

    commands::run(&restored, &mut cli, Command::Logout).await.unwrap();
    assert!(!dir.path().join("session.json").exists());
    assert!(restored.session().token().is_none());
}

#[tokio::test]
async fn watcher_reports_expiry_once() {
    let gateway = MockGateway::spawn().await;
    let dir = TempDir::new().expect("temp dir");
    let (shell, events) = Shell::connect(&settings_in(&gateway, &dir)).unwrap();
    let watcher = spawn_session_watcher(events);
    shell.session().establish("tok-stale", None).unwrap();

    let mut cli = CliSettings::default();
    let history = commands::run(&shell, &mut cli, Command::History { id: None, delete: false }).await;
    assert!(history.is_err());
    let schema = commands::run(
        &shell,
        &mut cli,
        Command::Schema {
            datasource: Some("ds-1".into()),
        },
    )
    .await;
    assert!(schema.is_err());
    assert!(!dir.path().join("session.json").exists());

    drop(shell);
    let shown = watcher.await.unwrap();
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[0], "Signed in.");
    assert!(shown[1].contains("/login?reason=session_expired"));
}

#[tokio::test]
async fn new_login_rearms_expiry() {
    let gateway = MockGateway::spawn().await;
    let (api, mut events) = gateway.connect();
    api.session().establish("tok-stale", None).unwrap();
    assert!(api.conversations().await.error().is_some());
    assert!(api.session().is_logging_out());

    api.login("ada@example.com", VALID_PASSWORD)
        .await
        .into_result()
        .unwrap();
    assert!(!api.session().is_logging_out());
    api.session().establish("tok-stale-again", None).unwrap();
    assert!(api.conversations().await.error().is_some());

    let mut expiries = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Expired { .. }) {
            expiries += 1;
        }
    }
    assert_eq!(expiries, 2);
}

#[tokio::test]
async fn ask_without_streaming_remembers_the_conversation() {
    let gateway = MockGateway::spawn().await;
    let dir = TempDir::new().expect("temp dir");
    let (shell, _events) = Shell::connect(&settings_in(&gateway, &dir)).unwrap();
    shell.session().establish(VALID_TOKEN, None).unwrap();

    let mut cli = CliSettings {
        default_datasource: Some("ds-1".into()),
        ..CliSettings::default()
    };
    commands::run(
        &shell,
        &mut cli,
        Command::Ask {
            question: vec!["top".into(), "customers".into()],
            datasource: None,
            conversation: None,
            no_stream: true,
        },
    )
    .await
    .unwrap();
    assert_eq!(cli.last_conversation.as_deref(), Some("c-42"));
}

#[tokio::test]
async fn settings_update_keeps_unchanged_fields() {
    let gateway = MockGateway::spawn().await;
    let dir = TempDir::new().expect("temp dir");
    let (shell, _events) = Shell::connect(&settings_in(&gateway, &dir)).unwrap();
    shell.session().establish(VALID_TOKEN, None).unwrap();

    let mut cli = CliSettings::default();
    commands::run(
        &shell,
        &mut cli,
        Command::Settings {
            display_name: None,
            default_datasource: Some("ds-1".into()),
            row_limit: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(cli.default_datasource.as_deref(), Some("ds-1"));
}

#[tokio::test]
async fn gate_command_uses_the_stored_cookie() {
    let gateway = MockGateway::spawn().await;
    let dir = TempDir::new().expect("temp dir");
    let (shell, _events) = Shell::connect(&settings_in(&gateway, &dir)).unwrap();

    assert_eq!(
        commands::gate_decision(&shell, "/dashboard", None),
        RouteDecision::Redirect("/login?redirect=%2Fdashboard".into())
    );

    shell.session().establish(VALID_TOKEN, None).unwrap();
    assert_eq!(
        commands::gate_decision(&shell, "/dashboard", None),
        RouteDecision::Pass
    );
    assert_eq!(
        commands::gate_decision(&shell, "/login", None),
        RouteDecision::Redirect("/dashboard".into())
    );
    assert_eq!(
        commands::gate_decision(&shell, "/dashboard", Some("theme=dark".into())),
        RouteDecision::Redirect("/login?redirect=%2Fdashboard".into())
    );

    let mut cli = CliSettings::default();
    commands::run(
        &shell,
        &mut cli,
        Command::Gate {
            path: "/dashboard".into(),
            cookie: None,
        },
    )
    .await
    .unwrap();
    commands::run(&shell, &mut cli, Command::Logout).await.unwrap();
    assert_eq!(
        commands::gate_decision(&shell, "/dashboard", None),
        RouteDecision::Redirect("/login?redirect=%2Fdashboard".into())
    );
}
