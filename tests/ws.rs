mod common;

use common::{
    assert_silent, authenticated_json_request, authenticated_request, connect, join, recv_json,
    send_json, TestServer,
};
use chathub::config::GatewayLimits;
use futures_util::{SinkExt, StreamExt};
use http::{Method, StatusCode};
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tower::ServiceExt;

fn expect_http_status(result: Result<impl std::fmt::Debug, WsError>, expected: StatusCode) {
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status(), expected),
        other => panic!("expected HTTP {expected}, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ws_missing_token_is_refused() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;

    let result = connect_async(format!("ws://{addr}/ws")).await;
    expect_http_status(result.map(|(_, r)| r), StatusCode::UNAUTHORIZED);
    assert_eq!(server.session_count().await, 0);
}

#[tokio::test]
async fn test_ws_invalid_token_is_refused() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;

    let result = connect_async(format!("ws://{addr}/ws?token=nope")).await;
    expect_http_status(result.map(|(_, r)| r), StatusCode::UNAUTHORIZED);
    assert_eq!(server.session_count().await, 0);
}

#[tokio::test]
async fn test_ws_bearer_header_is_accepted() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;

    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", alice.auth_header().parse().unwrap());
    let (_ws, _) = connect_async(request).await.unwrap();

    server.wait_for_sessions(1).await;
}

#[tokio::test]
async fn test_ws_join_approved() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let chat = server.create_group(&alice, "team", &[]).await;

    let mut ws = connect(&server, &addr, &alice).await;
    send_json(&mut ws, json!({ "type": "join_room", "chatId": chat.id })).await;

    let ack = recv_json(&mut ws).await;
    assert_eq!(ack, json!({ "type": "joined_chat", "chatId": chat.id }));

    let snapshot = server.state.hub.snapshot().await.unwrap();
    assert_eq!(snapshot.room_members(&chat.id).len(), 1);
}

#[tokio::test]
async fn test_ws_join_denied_for_non_member() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let mallory = server.create_user_with_token("mallory").await;
    let chat = server.create_group(&alice, "team", &[]).await;

    let mut ws = connect(&server, &addr, &mallory).await;
    send_json(&mut ws, json!({ "type": "join_room", "chatId": chat.id })).await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply, json!({ "type": "error", "error": "Access denied" }));
    assert!(server.state.hub.snapshot().await.unwrap().rooms.is_empty());

    // still connected
    send_json(&mut ws, json!({ "type": "leave_room", "chatId": chat.id })).await;
    assert_eq!(recv_json(&mut ws).await["type"], "left_chat");
}

#[tokio::test]
async fn test_ws_message_fans_out_to_subscribers_only() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;
    let carol = server.create_user_with_token("carol").await;
    let chat = server.create_group(&alice, "team", &[&bob, &carol]).await;

    let mut a = connect(&server, &addr, &alice).await;
    let mut b = connect(&server, &addr, &bob).await;
    let mut c = connect(&server, &addr, &carol).await;
    join(&mut a, &chat.id).await;
    join(&mut b, &chat.id).await;

    send_json(
        &mut a,
        json!({ "type": "send_message", "chatId": chat.id, "data": { "text": "hello team" } }),
    )
    .await;

    for ws in [&mut a, &mut b] {
        let event = recv_json(ws).await;
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["chatId"], chat.id);
        assert_eq!(event["data"]["text"], "hello team");
        assert_eq!(event["data"]["senderId"], alice.user.id);
        assert_eq!(event["data"]["type"], "text");
        assert!(event["data"]["id"].is_string());
        assert!(event["data"]["timestamp"].is_string());
    }
    assert_silent(&mut c, Duration::from_millis(200)).await;

    let (stored, _) = chathub::db::messages::list_messages(server.pool(), &chat.id, None, 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "hello team");
}

#[tokio::test]
async fn test_ws_send_by_removed_member_is_denied() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;
    let chat = server.create_group(&alice, "team", &[&bob]).await;

    let mut b = connect(&server, &addr, &bob).await;
    join(&mut b, &chat.id).await;

    let response = server
        .router()
        .oneshot(authenticated_request(
            Method::DELETE,
            &format!("/api/v1/chats/{}/members/{}", chat.id, bob.user.id),
            &alice.auth_header(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // the removal notice still reaches the subscribed session
    let notice = recv_json(&mut b).await;
    assert_eq!(notice["data"]["type"], "system");

    send_json(
        &mut b,
        json!({ "type": "send_message", "chatId": chat.id, "data": { "text": "still here?" } }),
    )
    .await;
    assert_eq!(recv_json(&mut b).await["error"], "Access denied");
}

#[tokio::test]
async fn test_ws_empty_text_is_rejected() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let chat = server.create_group(&alice, "team", &[]).await;

    let mut ws = connect(&server, &addr, &alice).await;
    send_json(
        &mut ws,
        json!({ "type": "send_message", "chatId": chat.id, "data": { "text": "   " } }),
    )
    .await;

    assert_eq!(
        recv_json(&mut ws).await,
        json!({ "type": "error", "error": "Message text cannot be empty" })
    );
}

#[tokio::test]
async fn test_ws_bad_frames_get_errors_and_keep_the_connection() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;

    let mut ws = connect(&server, &addr, &alice).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(recv_json(&mut ws).await["error"], "Invalid message format");

    ws.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    assert_eq!(recv_json(&mut ws).await["error"], "Invalid message format");

    send_json(&mut ws, json!({ "type": "dance" })).await;
    assert_eq!(recv_json(&mut ws).await["error"], "Unknown message type");

    send_json(&mut ws, json!({ "type": "join_room" })).await;
    assert_eq!(recv_json(&mut ws).await["error"], "Invalid chat ID");

    assert_eq!(server.session_count().await, 1);
}

#[tokio::test]
async fn test_ws_typing_reaches_room() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;
    let chat = server.create_group(&alice, "team", &[&bob]).await;

    let mut a = connect(&server, &addr, &alice).await;
    let mut b = connect(&server, &addr, &bob).await;
    join(&mut b, &chat.id).await;

    send_json(&mut a, json!({ "type": "typing", "chatId": chat.id })).await;

    let event = recv_json(&mut b).await;
    assert_eq!(event["type"], "user_typing");
    assert_eq!(event["data"]["userId"], alice.user.id);
    assert_eq!(event["data"]["displayName"], "alice");
}

#[tokio::test]
async fn test_rest_message_is_broadcast_to_socket_subscribers() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;
    let chat = server.create_group(&alice, "team", &[&bob]).await;

    let mut b = connect(&server, &addr, &bob).await;
    join(&mut b, &chat.id).await;

    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::POST,
            &format!("/api/v1/chats/{}/messages", chat.id),
            &alice.auth_header(),
            &json!({ "text": "via rest" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let event = recv_json(&mut b).await;
    assert_eq!(event["type"], "new_message");
    assert_eq!(event["data"]["text"], "via rest");
}

#[tokio::test]
async fn test_ws_client_close_unregisters_session() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let chat = server.create_group(&alice, "team", &[]).await;

    let mut ws = connect(&server, &addr, &alice).await;
    join(&mut ws, &chat.id).await;
    ws.close(None).await.unwrap();

    server.wait_for_sessions(0).await;
    assert!(server.state.hub.snapshot().await.unwrap().rooms.is_empty());
}

#[tokio::test]
async fn test_ws_oversized_frame_tears_down_session() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;

    let mut ws = connect(&server, &addr, &alice).await;
    let text = "x".repeat(2048);
    send_json(&mut ws, json!({ "type": "typing", "chatId": text })).await;

    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn test_ws_silent_peer_is_timed_out_without_leave() {
    let limits = GatewayLimits {
        read_timeout: Duration::from_millis(400),
        ping_interval: Duration::from_millis(300),
        ..GatewayLimits::default()
    };
    let server = TestServer::with_limits(limits).await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;
    let chat = server.create_group(&alice, "team", &[&bob]).await;

    let mut a = connect(&server, &addr, &alice).await;
    let mut b = connect(&server, &addr, &bob).await;
    join(&mut a, &chat.id).await;
    join(&mut b, &chat.id).await;

    // Bob keeps answering pings, Alice goes quiet and never polls, so no pong
    // is ever written on her side.
    let keepalive = tokio::spawn(async move {
        while let Some(Ok(_)) = b.next().await {}
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = server.state.hub.snapshot().await.unwrap();
        if snapshot.session_count() == 1 {
            assert_eq!(snapshot.room_members(&chat.id).len(), 1);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "silent session was never reaped"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    drop(a);
    keepalive.abort();
}

#[tokio::test]
async fn test_logout_does_not_close_open_sessions() {
    let server = TestServer::new().await;
    let addr = server.spawn().await;
    let alice = server.create_user_with_token("alice").await;
    let chat = server.create_group(&alice, "team", &[]).await;

    let mut ws = connect(&server, &addr, &alice).await;

    let response = server
        .router()
        .oneshot(authenticated_request(
            Method::POST,
            "/api/v1/auth/logout",
            &alice.auth_header(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    join(&mut ws, &chat.id).await;

    let result = connect_async(format!("ws://{addr}/ws?token={}", alice.token)).await;
    expect_http_status(result.map(|(_, r)| r), StatusCode::UNAUTHORIZED);
}
