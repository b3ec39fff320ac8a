use crate::support::{stream_chunks, MockGateway, VALID_PASSWORD};
use futures::stream::{self, TryStreamExt};
use querydesk_core::gateway::QueryRequest;
use querydesk_core::stream::{data_events, DataLineDecoder};
use querydesk_core::{ApiResponse, ChatSession, GatewayApi, MessageRole, StreamChunk};

async fn signed_in(gateway: &MockGateway) -> GatewayApi {
    let (api, _events) = gateway.connect();
    api.login("ada@example.com", VALID_PASSWORD)
        .await
        .into_result()
        .expect("login");
    api
}

#[test]
fn decoder_handles_the_gateway_chunking() {
    let mut decoder = DataLineDecoder::new();
    let mut payloads = Vec::new();
    for chunk in stream_chunks() {
        payloads.extend(decoder.push(&chunk));
    }
    payloads.extend(decoder.finish());
    assert_eq!(payloads, vec!["Top ", "customers: Zoë"]);
}

#[tokio::test]
async fn data_events_stop_at_the_sentinel() {
    let chunks = stream_chunks()
        .into_iter()
        .map(Ok::<_, std::io::Error>)
        .collect::<Vec<_>>();
    let payloads: Vec<String> = data_events(stream::iter(chunks))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(payloads, vec!["Top ", "customers: Zoë"]);
}

#[tokio::test]
async fn gateway_stream_yields_payloads_in_order() {
    let gateway = MockGateway::spawn().await;
    let api = signed_in(&gateway).await;

    let events = api
        .stream_answer(&QueryRequest::new("top customers"))
        .await
        .expect("stream opens");
    let payloads: Vec<String> = events.try_collect().await.unwrap();
    assert_eq!(payloads, vec!["Top ", "customers: Zoë"]);
}

#[tokio::test]
async fn rejected_stream_fails_before_yielding() {
    let gateway = MockGateway::spawn().await;
    let api = signed_in(&gateway).await;

    let err = match api.stream_answer(&QueryRequest::new("overloaded")).await {
        Ok(_) => panic!("stream should be rejected"),
        Err(err) => err,
    };
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn unauthorized_stream_leaves_the_session_alone() {
    let gateway = MockGateway::spawn().await;
    let (api, mut events) = gateway.connect();
    api.session().establish("tok-stale", None).unwrap();
    while events.try_recv().is_ok() {}

    let err = match api.stream_answer(&QueryRequest::new("top customers")).await {
        Ok(_) => panic!("stream should be rejected"),
        Err(err) => err,
    };
    assert_eq!(err.status(), Some(401));
    assert_eq!(gateway.unauthorized_count(), 1);
    assert_eq!(api.session().token().as_deref(), Some("tok-stale"));
    assert!(!api.session().is_logging_out());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn streamed_answer_is_appended_to_the_conversation() {
    let gateway = MockGateway::spawn().await;
    let chat = ChatSession::new(signed_in(&gateway).await, Some("ds-1".into()));

    let mut chunks = chat.ask_streaming("top customers").await.unwrap();
    let mut received = Vec::new();
    while let Some(chunk) = chunks.recv().await {
        let chunk = chunk.unwrap();
        let done = chunk.done;
        received.push(chunk);
        if done {
            break;
        }
    }

    assert_eq!(
        received,
        vec![
            StreamChunk {
                delta: "Top ".into(),
                done: false
            },
            StreamChunk {
                delta: "customers: Zoë".into(),
                done: false
            },
            StreamChunk {
                delta: String::new(),
                done: true
            },
        ]
    );
    let conversation = chat.conversation();
    assert_eq!(conversation.title, "top customers");
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[1].role, MessageRole::Assistant);
    assert_eq!(conversation.messages[1].content, "Top customers: Zoë");
}

#[tokio::test]
async fn blank_questions_never_reach_the_gateway() {
    let gateway = MockGateway::spawn().await;
    let chat = ChatSession::new(signed_in(&gateway).await, None);

    assert!(chat.ask("   ").await.is_none());
    let mut chunks = chat.ask_streaming("").await.unwrap();
    assert!(chunks.recv().await.unwrap().unwrap().done);
    assert!(chat.conversation().messages.is_empty());
}

#[tokio::test]
async fn translated_answer_records_sql_and_conversation_id() {
    let gateway = MockGateway::spawn().await;
    let chat = ChatSession::new(signed_in(&gateway).await, Some("ds-1".into()));

    let result = match chat.ask("top customers by revenue").await {
        Some(ApiResponse::Success(result)) => result,
        other => panic!("unexpected response {other:?}"),
    };
    assert!(result.sql.starts_with("SELECT name"));

    let conversation = chat.conversation();
    assert_eq!(conversation.remote_id.as_deref(), Some("c-42"));
    let answer = &conversation.messages[1];
    assert_eq!(answer.content, "Top ten customers by revenue");
    assert_eq!(answer.sql.as_deref(), Some(result.sql.as_str()));
}

#[tokio::test]
async fn resumed_chat_restores_history() {
    let gateway = MockGateway::spawn().await;
    let api = signed_in(&gateway).await;

    let chat = ChatSession::resume(api, "c-1", None).await.unwrap();
    let conversation = chat.conversation();
    assert_eq!(conversation.remote_id.as_deref(), Some("c-1"));
    assert_eq!(conversation.title, "Revenue by month");
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[1].sql.as_deref(), Some("SELECT 1"));
}
