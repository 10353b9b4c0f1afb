use panelchat::api::mock_client::MockApiClient;
use panelchat::api::ChatClient;
use panelchat::config::Config;
use panelchat::router::{route_tool_call, IN_PANEL_TOOLS, PANEL_TOOLS};
use panelchat::sequencer::{ActionSequencer, DEFAULT_STAGGER};
use panelchat::state::{ChatSession, PanelController, Role, UiUpdate};
use panelchat::types::{PanelAction, PanelType, ThemeChoice};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn sse(payload: serde_json::Value) -> String {
    format!("data: {payload}")
}

fn tool_open(index: usize, id: &str, name: &str, arguments: &str) -> String {
    sse(json!({"choices": [{"delta": {"tool_calls": [
        {"index": index, "id": id, "function": {"name": name, "arguments": arguments}}
    ]}}]}))
}

fn text(content: &str) -> String {
    sse(json!({"choices": [{"delta": {"content": content}}]}))
}

#[test]
fn test_config_validation_rejects_remote_endpoint_without_key() {
    let config = Config {
        api_key: None,
        api_url: "https://api.openai.com/v1/chat/completions".to_string(),
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_allows_local_endpoint_without_key() {
    let config = Config {
        api_key: None,
        api_url: "http://127.0.0.1:11434/v1/chat/completions".to_string(),
        model: "llama3.2".to_string(),
        ..Config::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_rejects_non_http_url() {
    let config = Config {
        api_key: Some("sk-test".to_string()),
        api_url: "localhost:8000".to_string(),
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_router_contract_over_all_names() {
    for name in PANEL_TOOLS {
        let routed = route_tool_call(name, &json!({"slug": "x", "slug2": "y"}));
        let state = routed.panel_state.expect("panel patch");
        assert_eq!(state.is_open(), *name != "hide_panel", "{name}");
    }
    for name in IN_PANEL_TOOLS {
        let routed = route_tool_call(name, &json!({}));
        assert!(routed.panel_state.is_some() && routed.action.is_some(), "{name}");
    }
    assert!(route_tool_call("launch_rockets", &json!({})).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sequencer_stagger_on_virtual_clock() {
    let origin = Instant::now();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let mut sequencer = ActionSequencer::new(move |action: PanelAction| {
        sink.lock().unwrap().push((origin.elapsed(), action));
    });

    for year in ["2019", "2020", "2021"] {
        sequencer.enqueue(PanelAction::HighlightYear {
            year: year.to_string(),
        });
    }
    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(log.lock().unwrap().is_empty());

    sequencer.set_ready(true);
    while let Some(deadline) = sequencer.next_deadline() {
        tokio::time::sleep_until(deadline).await;
        sequencer.fire_due();
    }

    let offsets: Vec<Duration> = log.lock().unwrap().iter().map(|(at, _)| *at).collect();
    let start = Duration::from_secs(1);
    assert_eq!(
        offsets,
        vec![start, start + DEFAULT_STAGGER, start + DEFAULT_STAGGER * 2]
    );
}

#[tokio::test(start_paused = true)]
async fn test_turn_drives_panel_then_actions_after_transition() {
    let mock = MockApiClient::new(vec![vec![
        text("Let me show you. "),
        tool_open(0, "c1", "compare_projects", r#"{"slug":"alpha","slug2":"beta"}"#),
        tool_open(1, "c2", "highlight_comparison", r#"{"slug":"alpha","slug2":"beta","field":"stack"}"#),
        tool_open(2, "c3", "highlight_comparison", r#"{"slug":"alpha","slug2":"beta","field":"scale"}"#),
        tool_open(3, "c4", "set_theme", r#"{"theme":"dark"}"#),
        text("Done."),
        "data: [DONE]".to_string(),
    ]]);
    let mut session = ChatSession::new(ChatClient::new_mock(Arc::new(mock)), None);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    let origin = Instant::now();
    let mut panel = PanelController::new(move |action: PanelAction| {
        sink.lock().unwrap().push((origin.elapsed(), action));
    });
    let (tx, mut rx) = mpsc::unbounded_channel();

    session.start_turn("compare alpha and beta", tx);
    let mut themes = Vec::new();
    while session.is_busy() {
        let update = rx.recv().await.expect("turn update");
        themes.extend(session.apply_update(update, &mut panel));
    }

    assert_eq!(themes, vec![ThemeChoice::Dark]);
    assert_eq!(panel.state().panel_type(), Some(PanelType::Compare));
    assert_eq!(panel.state().slug2.as_deref(), Some("beta"));
    assert!(delivered.lock().unwrap().is_empty(), "panel still opening");
    assert_eq!(panel.pending_actions(), 2);

    let opened_at = origin.elapsed();
    while let Some(deadline) = panel.next_deadline() {
        tokio::time::sleep_until(deadline).await;
        panel.tick();
    }

    let delivered = delivered.lock().unwrap();
    let fields: Vec<&PanelAction> = delivered.iter().map(|(_, action)| action).collect();
    assert_eq!(
        fields,
        vec![
            &PanelAction::HighlightRow {
                field: "stack".into()
            },
            &PanelAction::HighlightRow {
                field: "scale".into()
            },
        ]
    );
    let transition_done = opened_at + Duration::from_millis(300);
    assert_eq!(delivered[0].0, transition_done);
    assert_eq!(delivered[1].0, transition_done + DEFAULT_STAGGER);

    let entries = session.transcript().entries();
    assert_eq!(entries[0].role, Role::User);
    assert_eq!(entries[1].content, "Let me show you. Done.");
}

#[tokio::test(start_paused = true)]
async fn test_in_panel_call_without_slugs_keeps_compare_target() {
    let mock = MockApiClient::new(vec![vec![
        tool_open(0, "c1", "compare_projects", r#"{"slug":"alpha","slug2":"beta"}"#),
        tool_open(1, "c2", "highlight_comparison", r#"{"slug":"alpha","slug2":"beta","field":"stack"}"#),
        tool_open(2, "c3", "highlight_comparison", r#"{"field":"scale"}"#),
        tool_open(3, "c4", "show_skills", r#"{"category":"web"}"#),
        tool_open(4, "c5", "highlight_skill", r#"{"skill":"Rust"}"#),
        "data: [DONE]".to_string(),
    ]]);
    let mut session = ChatSession::new(ChatClient::new_mock(Arc::new(mock)), None);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    let mut panel = PanelController::new(move |action| sink.lock().unwrap().push(action));
    let (tx, mut rx) = mpsc::unbounded_channel();

    session.start_turn("compare, then skills", tx);
    let mut compare_pending = None;
    while session.is_busy() {
        let update = rx.recv().await.unwrap();
        session.apply_update(update, &mut panel);
        if panel.state().panel_type() == Some(PanelType::Compare) {
            assert_eq!(panel.state().slug.as_deref(), Some("alpha"));
            assert_eq!(panel.state().slug2.as_deref(), Some("beta"));
            compare_pending = Some(panel.pending_actions());
        }
    }

    assert_eq!(compare_pending, Some(2));
    assert_eq!(panel.state().panel_type(), Some(PanelType::Skills));
    assert_eq!(panel.state().category.as_deref(), Some("web"));

    while let Some(deadline) = panel.next_deadline() {
        tokio::time::sleep_until(deadline).await;
        panel.tick();
    }
    assert_eq!(
        *delivered.lock().unwrap(),
        vec![PanelAction::HighlightSkill {
            skill: "Rust".into()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_hide_panel_mid_turn_drops_queued_actions() {
    let mock = MockApiClient::new(vec![vec![
        tool_open(0, "a", "show_skills", "{}"),
        tool_open(1, "b", "highlight_skill", r#"{"skill":"Rust"}"#),
        tool_open(2, "c", "hide_panel", ""),
        "data: [DONE]".to_string(),
    ]]);
    let mut session = ChatSession::new(ChatClient::new_mock(Arc::new(mock)), None);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    let mut panel = PanelController::new(move |action| sink.lock().unwrap().push(action));
    let (tx, mut rx) = mpsc::unbounded_channel();

    session.start_turn("skills", tx);
    while session.is_busy() {
        let update = rx.recv().await.unwrap();
        session.apply_update(update, &mut panel);
    }

    assert!(!panel.state().is_open());
    assert_eq!(panel.next_deadline(), None);
    tokio::time::advance(Duration::from_secs(10)).await;
    panel.tick();
    assert!(delivered.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_turn_discards_pending_and_queued() {
    let (tx_bytes, rx_bytes) = mpsc::unbounded_channel::<anyhow::Result<bytes::Bytes>>();
    let producer = Arc::new(ChannelProducer(Mutex::new(Some(rx_bytes))));
    let mut session = ChatSession::new(ChatClient::new_mock(producer), None);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    let mut panel = PanelController::new(move |action| sink.lock().unwrap().push(action));
    let (tx, mut rx) = mpsc::unbounded_channel();

    session.start_turn("experience", tx);
    for line in [
        tool_open(0, "a", "scroll_to_experience", r#"{"company":"Acme"}"#),
        tool_open(0, "b", "show_resume", ""),
    ] {
        tx_bytes
            .send(Ok(bytes::Bytes::from(format!("{line}\n\n"))))
            .unwrap();
    }

    // The reused slot displaces the first call, which routes immediately.
    let update = rx.recv().await.unwrap();
    assert!(matches!(update, UiUpdate::Event { .. }));
    session.apply_update(update, &mut panel);
    assert_eq!(panel.state().panel_type(), Some(PanelType::Experience));
    assert_eq!(panel.pending_actions(), 1);

    assert!(session.cancel_turn(&mut panel));
    assert_eq!(panel.pending_actions(), 0);

    // The second call was still pending and is never finalized.
    drop(tx_bytes);
    tokio::time::advance(Duration::from_secs(10)).await;
    while let Ok(update) = rx.try_recv() {
        session.apply_update(update, &mut panel);
    }
    panel.tick();
    assert!(delivered.lock().unwrap().is_empty());
    assert_eq!(panel.state().panel_type(), Some(PanelType::Experience));
}

struct ChannelProducer(Mutex<Option<mpsc::UnboundedReceiver<anyhow::Result<bytes::Bytes>>>>);

impl panelchat::api::MockStreamProducer for ChannelProducer {
    fn create_mock_stream(
        &self,
        _messages: &[panelchat::types::ApiMessage],
    ) -> anyhow::Result<panelchat::api::ByteStream> {
        let rx = self
            .0
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow::anyhow!("stream already taken"))?;
        Ok(Box::pin(tokio_stream_from(rx)))
    }
}

fn tokio_stream_from(
    rx: mpsc::UnboundedReceiver<anyhow::Result<bytes::Bytes>>,
) -> impl futures::Stream<Item = anyhow::Result<bytes::Bytes>> + Send {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}
