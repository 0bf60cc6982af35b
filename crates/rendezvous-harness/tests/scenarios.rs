//! End-to-end scenarios through the production runtime.
//!
//! Each test drives `Runtime` with the simulation driver: scripted sockets,
//! an in-memory REST backend and a virtual clock.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rendezvous_app::{DriverEvent, Notice, UserInput};
use rendezvous_client::{ApiError, ConnectionStatus, Provenance};
use rendezvous_core::SocketState;
use rendezvous_harness::{Scenario, SimRuntime, SocketPolicy, new_message_event, run_for, settle};
use rendezvous_proto::{ConversationId, InboundEvent, MessageId};
use serde_json::json;

const CONVERSATION: ConversationId = ConversationId(42);
const PEER: u64 = 2;

async fn connected(scenario: Scenario) -> SimRuntime {
    let mut runtime = scenario.build();
    runtime.login().await.unwrap();
    settle(&mut runtime).await.unwrap();
    assert_eq!(runtime.status(), ConnectionStatus::Connected);
    runtime
}

async fn in_conversation(scenario: Scenario) -> SimRuntime {
    let mut runtime = connected(scenario).await;
    runtime.open_conversation(CONVERSATION).await.unwrap();
    settle(&mut runtime).await.unwrap();
    runtime
}

#[tokio::test]
async fn login_connects_to_chat_path() {
    let mut runtime = Scenario::new().build();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    runtime.connection_mut().add_connection_handler(move |up| {
        sink.lock().unwrap().push(*up);
        Ok(())
    });

    runtime.login().await.unwrap();
    settle(&mut runtime).await.unwrap();

    assert_eq!(runtime.status(), ConnectionStatus::Connected);
    assert_eq!(*seen.lock().unwrap(), vec![true]);

    let sockets = runtime.driver().sockets();
    assert_eq!(sockets.len(), 1);
    assert_eq!(sockets[0].url, "ws://chat.test/ws/chat/?token=T");
}

#[tokio::test]
async fn login_without_token_reports_error() {
    let mut runtime = Scenario::new().token(None).build();

    runtime.login().await.unwrap();
    settle(&mut runtime).await.unwrap();

    assert_eq!(runtime.status(), ConnectionStatus::Error);
    assert!(runtime.driver().sockets().is_empty());
}

#[tokio::test]
async fn send_while_disconnected_requests_reconnect() {
    let mut runtime = in_conversation(Scenario::new()).await;
    runtime.driver().set_socket_policy(SocketPolicy::Hold);

    runtime.driver().drop_connection(1006);
    settle(&mut runtime).await.unwrap();
    assert_eq!(runtime.status(), ConnectionStatus::Disconnected);
    assert_eq!(runtime.driver().sockets().len(), 1);

    runtime.driver().input(UserInput::Send("hi".to_string()));
    settle(&mut runtime).await.unwrap();

    // The frame was dropped, but a fresh socket is already dialing without
    // waiting for the backoff.
    assert!(runtime.driver().sent_actions("send_message").is_empty());
    assert_eq!(runtime.driver().sockets().len(), 2);
    assert_eq!(runtime.status(), ConnectionStatus::Connecting);

    // The REST half still delivered the message.
    let stored = runtime.driver().server().messages(CONVERSATION);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "hi");
}

#[tokio::test]
async fn optimistic_send_is_replaced_by_confirmation() {
    let mut runtime = in_conversation(Scenario::new().next_message_id(987).manual_api()).await;
    assert!(runtime.driver().complete_next_request().await);
    settle(&mut runtime).await.unwrap();

    runtime.driver().input(UserInput::Send("hello".to_string()));
    settle(&mut runtime).await.unwrap();

    let pending = runtime.driver().last_render().unwrap();
    assert_eq!(pending.message_ids, vec!["temp_1700000000000"]);
    assert_eq!(
        runtime.driver().sent_actions("send_message"),
        vec![json!({
            "action": "send_message",
            "conversation_id": 42,
            "content": "hello",
            "message_type": "TEXT",
        })]
    );

    assert!(runtime.driver().complete_next_request().await);
    settle(&mut runtime).await.unwrap();

    let confirmed = runtime.driver().last_render().unwrap();
    assert_eq!(confirmed.message_ids, vec!["987"]);
    assert_eq!(confirmed.contents, vec!["hello"]);

    let messages = runtime.conversation().unwrap().messages();
    assert_eq!(messages[0].provenance(), Provenance::Confirmed);
    assert!(messages[0].sender_is_self);
}

#[tokio::test]
async fn pushed_echo_of_own_send_is_not_listed_twice() {
    let mut runtime = in_conversation(Scenario::new().next_message_id(987).manual_api()).await;
    assert!(runtime.driver().complete_next_request().await);

    runtime.driver().input(UserInput::Send("hello".to_string()));
    settle(&mut runtime).await.unwrap();

    // The server stores and broadcasts the message before the REST response
    // reaches the client.
    let request = runtime.driver().take_next_request().unwrap();
    let response = request.perform(runtime.driver().server()).await;
    let stored = runtime.driver().server().messages(CONVERSATION).remove(0);
    runtime.driver().push(&new_message_event(stored));
    settle(&mut runtime).await.unwrap();
    assert_eq!(runtime.driver().last_render().unwrap().message_ids, vec!["temp_1700000000000"]);

    runtime.driver().inject(DriverEvent::Api(response));
    settle(&mut runtime).await.unwrap();

    assert_eq!(runtime.driver().last_render().unwrap().message_ids, vec!["987"]);
}

#[tokio::test]
async fn failed_send_rolls_back_and_notifies() {
    let mut runtime = in_conversation(Scenario::new()).await;
    runtime
        .driver()
        .server()
        .fail_next_send(ApiError::Status { status: 400, body: "bad".to_string() });

    runtime.driver().input(UserInput::Send("doomed".to_string()));
    settle(&mut runtime).await.unwrap();

    let render = runtime.driver().last_render().unwrap();
    assert!(render.message_ids.is_empty());
    assert_eq!(
        render.notices,
        vec![Notice::SendFailed {
            content: "doomed".to_string(),
            reason: "server returned 400: bad".to_string(),
        }]
    );
}

#[tokio::test]
async fn reconnect_gives_up_after_five_attempts() {
    let mut runtime = connected(Scenario::new()).await;
    runtime.driver().set_socket_policy(SocketPolicy::Refuse);

    runtime.driver().drop_connection(1006);
    run_for(&mut runtime, Duration::from_secs(120)).await.unwrap();

    // The first socket plus five automatic attempts.
    assert_eq!(runtime.driver().sockets().len(), 6);
    assert_eq!(runtime.connection().reconnect_attempts(), 5);
    assert!(!runtime.connection().reconnect_pending());
    assert_eq!(runtime.status(), ConnectionStatus::Error);
}

#[tokio::test]
async fn reconnect_waits_for_backoff() {
    let mut runtime = connected(Scenario::new()).await;
    runtime.driver().set_socket_policy(SocketPolicy::Refuse);
    runtime.driver().drop_connection(1006);

    run_for(&mut runtime, Duration::from_millis(1950)).await.unwrap();
    assert_eq!(runtime.driver().sockets().len(), 1);

    run_for(&mut runtime, Duration::from_millis(100)).await.unwrap();
    assert_eq!(runtime.driver().sockets().len(), 2);
}

#[tokio::test]
async fn manual_reconnect_after_giving_up() {
    let mut runtime = connected(Scenario::new()).await;
    runtime.driver().set_socket_policy(SocketPolicy::Refuse);
    runtime.driver().drop_connection(1006);
    run_for(&mut runtime, Duration::from_secs(120)).await.unwrap();

    runtime.driver().set_socket_policy(SocketPolicy::Accept);
    runtime.driver().input(UserInput::Reconnect);
    settle(&mut runtime).await.unwrap();

    assert_eq!(runtime.status(), ConnectionStatus::Connected);
    assert_eq!(runtime.connection().reconnect_attempts(), 0);
}

#[tokio::test]
async fn close_before_open_counts_as_failed_handshake() {
    let mut runtime = Scenario::new().build();
    runtime.driver().set_socket_policy(SocketPolicy::Hold);
    runtime.login().await.unwrap();
    settle(&mut runtime).await.unwrap();
    assert_eq!(runtime.status(), ConnectionStatus::Connecting);

    for _ in 0..8 {
        runtime.driver().drop_connection(1006);
        run_for(&mut runtime, Duration::from_secs(40)).await.unwrap();
    }

    assert_eq!(runtime.status(), ConnectionStatus::Error);
    assert_eq!(runtime.connection().socket_state(), SocketState::Disconnected);
    assert!(!runtime.connection().reconnect_pending());
    assert_eq!(runtime.driver().sockets().len(), 6);

    runtime.driver().set_socket_policy(SocketPolicy::Accept);
    runtime.driver().input(UserInput::Reconnect);
    settle(&mut runtime).await.unwrap();

    assert_eq!(runtime.driver().sockets().len(), 7);
    assert_eq!(runtime.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn peer_typing_indicator_times_out() {
    let mut runtime = in_conversation(Scenario::new()).await;

    runtime.driver().push(&InboundEvent::UserTyping { conversation_id: CONVERSATION });
    settle(&mut runtime).await.unwrap();
    assert!(runtime.driver().last_render().unwrap().peer_typing);

    run_for(&mut runtime, Duration::from_secs(1)).await.unwrap();
    assert!(runtime.conversation().unwrap().peer_typing());

    run_for(&mut runtime, Duration::from_millis(2100)).await.unwrap();
    assert!(!runtime.conversation().unwrap().peer_typing());
    assert!(!runtime.driver().last_render().unwrap().peer_typing);
}

#[tokio::test]
async fn join_is_sent_once_and_repeated_after_reconnect() {
    let mut runtime = in_conversation(Scenario::new()).await;
    assert_eq!(runtime.driver().sent_actions("join_conversation").len(), 1);

    runtime.driver().push(&InboundEvent::ConversationJoined { conversation_id: CONVERSATION });
    settle(&mut runtime).await.unwrap();
    assert_eq!(runtime.driver().sent_actions("join_conversation").len(), 1);

    runtime.driver().drop_connection(1001);
    run_for(&mut runtime, Duration::from_secs(3)).await.unwrap();

    assert_eq!(runtime.status(), ConnectionStatus::Connected);
    assert_eq!(runtime.driver().sockets().len(), 2);
    assert_eq!(runtime.driver().sent_actions("join_conversation").len(), 2);
}

#[tokio::test]
async fn peer_messages_arrive_once_and_get_read() {
    let mut runtime = in_conversation(Scenario::new().next_message_id(500)).await;
    let message = runtime.driver().server().post(CONVERSATION, PEER, "hey");

    runtime.driver().push(&new_message_event(message.clone()));
    runtime.driver().push(&new_message_event(message));
    settle(&mut runtime).await.unwrap();
    assert_eq!(runtime.driver().last_render().unwrap().message_ids, vec!["500"]);

    runtime.driver().input(UserInput::Viewed(vec![MessageId::Number(500)]));
    runtime.driver().input(UserInput::Viewed(vec![MessageId::Number(500)]));
    settle(&mut runtime).await.unwrap();

    let reads: Vec<_> =
        runtime.driver().server().calls().into_iter().filter(|c| c.starts_with("read")).collect();
    assert_eq!(reads, vec!["read 500"]);
    assert_eq!(runtime.driver().sent_actions("mark_as_read").len(), 1);
    assert!(runtime.conversation().unwrap().messages()[0].is_read);
}

#[tokio::test]
async fn history_merges_with_early_pushes() {
    let mut runtime = connected(Scenario::new().next_message_id(10).manual_api()).await;
    let older = runtime.driver().server().post(CONVERSATION, PEER, "older");
    runtime.open_conversation(CONVERSATION).await.unwrap();

    runtime.driver().push(&new_message_event(older));
    settle(&mut runtime).await.unwrap();

    assert!(runtime.driver().complete_next_request().await);
    settle(&mut runtime).await.unwrap();

    assert_eq!(runtime.driver().last_render().unwrap().message_ids, vec!["10"]);
}

#[tokio::test]
async fn history_failure_is_reported() {
    let mut runtime = connected(Scenario::new()).await;
    runtime.driver().server().fail_next_history(ApiError::Timeout);

    runtime.open_conversation(CONVERSATION).await.unwrap();
    settle(&mut runtime).await.unwrap();

    let notices: Vec<Notice> =
        runtime.driver().renders().into_iter().flat_map(|r| r.notices).collect();
    assert_eq!(notices, vec![Notice::HistoryFailed { reason: "request timed out".to_string() }]);
}

#[tokio::test]
async fn server_error_events_become_notices() {
    let mut runtime = in_conversation(Scenario::new()).await;

    runtime.driver().push_raw(r#"{"type":"error","message":"rate limited"}"#);
    runtime.driver().push_raw("not json");
    settle(&mut runtime).await.unwrap();

    assert_eq!(
        runtime.driver().last_render().unwrap().notices,
        vec![Notice::ServerError { reason: "rate limited".to_string() }]
    );
    assert_eq!(runtime.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn logout_closes_socket_and_stops_reconnecting() {
    let mut runtime = in_conversation(Scenario::new()).await;

    runtime.logout().await.unwrap();
    settle(&mut runtime).await.unwrap();
    run_for(&mut runtime, Duration::from_secs(60)).await.unwrap();

    assert_eq!(runtime.status(), ConnectionStatus::Disconnected);
    assert_eq!(runtime.connection().socket_state(), SocketState::Disconnected);
    let sockets = runtime.driver().sockets();
    assert_eq!(sockets.len(), 1);
    assert!(sockets[0].closed_by_client);
}

#[tokio::test]
async fn clear_events_keeps_connection() {
    let mut runtime = in_conversation(Scenario::new()).await;
    runtime.driver().push(&InboundEvent::UserTyping { conversation_id: CONVERSATION });
    settle(&mut runtime).await.unwrap();
    assert!(!runtime.session().log().is_empty());

    runtime.driver().input(UserInput::ClearEvents);
    settle(&mut runtime).await.unwrap();

    assert!(runtime.session().log().is_empty());
    assert_eq!(runtime.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn quit_leaves_conversation_and_stops_driver() {
    let runtime = in_conversation(Scenario::new()).await;
    let observer = runtime.driver().clone();
    observer.input(UserInput::Quit);

    runtime.run().await.unwrap();

    assert_eq!(observer.sent_actions("leave_conversation").len(), 1);
    assert!(observer.sockets()[0].closed_by_client);
    assert!(observer.is_stopped());
}

#[tokio::test]
async fn frame_sequence_of_a_short_chat() {
    let mut runtime = in_conversation(Scenario::new().next_message_id(500)).await;
    let observer = runtime.driver().clone();

    observer.input(UserInput::Send("hi".to_string()));
    settle(&mut runtime).await.unwrap();

    let reply = observer.server().post(CONVERSATION, PEER, "hello");
    observer.push(&new_message_event(reply));
    observer.input(UserInput::Viewed(vec![MessageId::Number(501)]));
    settle(&mut runtime).await.unwrap();

    observer.input(UserInput::Quit);
    runtime.run().await.unwrap();

    insta::assert_snapshot!(observer.sent_texts().join("\n"), @r#"
    {"action":"join_conversation","conversation_id":42}
    {"action":"send_message","conversation_id":42,"content":"hi","message_type":"TEXT"}
    {"action":"mark_as_read","message_id":501}
    {"action":"leave_conversation","conversation_id":42}
    "#);
}
