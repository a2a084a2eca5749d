mod support;

use serde_json::json;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn healthz_reports_ok() {
    let base_url = support::ensure_server();
    let response = reqwest::get(format!("{base_url}/healthz"))
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "ok");
    assert!(body["active_sessions"].is_u64());
    assert!(body["queued_players"].is_u64());
}

#[tokio::test]
async fn queueing_without_username_is_rejected() {
    let result = tokio_tungstenite::connect_async(format!("{}/ws/matchmaking", support::ws_base())).await;
    assert!(result.is_err(), "handshake should be refused");
}

#[tokio::test]
async fn connecting_to_the_queue_acknowledges_with_searching() {
    let grace = support::unique_name("grace");
    let mut ws = support::connect(&format!("/ws/matchmaking?username={grace}")).await;

    // The acknowledgement arrives before any find_match request.
    let searching = support::recv_json_with_type(&mut ws, "searching", TIMEOUT).await;
    assert_eq!(searching["username"], grace.as_str());
}

#[tokio::test]
async fn two_players_get_matched_in_fifo_order() {
    let alice = support::unique_name("alice");
    let bob = support::unique_name("bob");

    let mut ws_alice = support::connect(&format!("/ws/matchmaking?username={alice}")).await;
    support::send_json(
        &mut ws_alice,
        &json!({"type": "find_match", "game_type": "pong"}),
    )
    .await;
    let searching = support::recv_json_with_type(&mut ws_alice, "searching", TIMEOUT).await;
    assert_eq!(searching["username"], alice.as_str());

    let mut ws_bob = support::connect(&format!("/ws/matchmaking?username={bob}")).await;
    support::send_json(
        &mut ws_bob,
        &json!({"type": "find_match", "game_type": "pong"}),
    )
    .await;

    let matched_bob = support::recv_json_with_type(&mut ws_bob, "matched", TIMEOUT).await;
    let matched_alice = support::recv_json_with_type(&mut ws_alice, "matched", TIMEOUT).await;

    assert_eq!(matched_alice["game_id"], matched_bob["game_id"]);
    // The longer-waiting player takes slot one.
    assert_eq!(matched_alice["player1"], alice.as_str());
    assert_eq!(matched_bob["player1"], alice.as_str());
    assert_eq!(matched_alice["opponent"], bob.as_str());
    assert_eq!(matched_bob["opponent"], alice.as_str());
    assert_eq!(matched_alice["game_type"], "pong");
}

#[tokio::test]
async fn players_in_different_queues_do_not_pair() {
    let dave = support::unique_name("dave");
    let erin = support::unique_name("erin");

    let mut ws_dave = support::connect(&format!("/ws/matchmaking?username={dave}")).await;
    support::send_json(
        &mut ws_dave,
        &json!({"type": "find_match", "game_type": "pong"}),
    )
    .await;
    support::recv_json_with_type(&mut ws_dave, "searching", TIMEOUT).await;

    let mut ws_erin = support::connect(&format!("/ws/matchmaking?username={erin}")).await;
    support::send_json(
        &mut ws_erin,
        &json!({"type": "find_match", "game_type": "space-rivalry"}),
    )
    .await;
    let reply = support::recv_json_with_type(&mut ws_erin, "searching", TIMEOUT).await;
    assert_eq!(reply["username"], erin.as_str());
}

#[tokio::test]
async fn repeated_find_match_is_rejected() {
    let carol = support::unique_name("carol");
    let mut ws = support::connect(&format!("/ws/matchmaking?username={carol}")).await;

    support::send_json(&mut ws, &json!({"type": "find_match", "game_type": "pong"})).await;
    support::recv_json_with_type(&mut ws, "searching", TIMEOUT).await;

    support::send_json(&mut ws, &json!({"type": "find_match", "game_type": "pong"})).await;
    let error = support::recv_json_with_type(&mut ws, "error", TIMEOUT).await;
    assert!(
        error["message"]
            .as_str()
            .expect("error message")
            .contains("already"),
        "unexpected error: {error}"
    );
}

#[tokio::test]
async fn unknown_game_type_is_an_error() {
    let frank = support::unique_name("frank");
    let mut ws = support::connect(&format!("/ws/matchmaking?username={frank}")).await;

    support::send_json(&mut ws, &json!({"type": "find_match", "game_type": "chess"})).await;
    let error = support::recv_json_with_type(&mut ws, "error", TIMEOUT).await;
    assert!(
        error["message"]
            .as_str()
            .expect("error message")
            .contains("unknown game type"),
        "unexpected error: {error}"
    );
}
