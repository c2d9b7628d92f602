// tests/swap_tests.rs

mod common;

use common::spawn_app;
use serde_json::Value;

#[tokio::test]
async fn accepted_swap_cannot_be_cancelled_but_can_be_completed() {
    let app = spawn_app().await;
    let (_, ana) = app.register("Ana", &["Guitar"], &["Spanish"]).await;
    let (ben_id, ben) = app.register("Ben", &["Spanish"], &["Guitar"]).await;

    let response = app.send_swap(&ana, ben_id, "Guitar", "Spanish").await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["from"]["name"], "Ana");
    let id = body["id"].as_i64().unwrap();

    let response = app.put(&ben, &format!("/api/swaps/{}/accept", id)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "accepted");
    assert!(body["completedAt"].is_null());

    let response = app.put(&ana, &format!("/api/swaps/{}/cancel", id)).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.put(&ana, &format!("/api/swaps/{}/complete", id)).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "completed");
    assert!(body["completedAt"].is_string());
}

#[tokio::test]
async fn only_the_recipient_can_accept() {
    let app = spawn_app().await;
    let (_, ana) = app.register("Ana", &["Guitar"], &[]).await;
    let (ben_id, ben) = app.register("Ben", &["Python"], &[]).await;
    let (_, cal) = app.register("Cal", &[], &[]).await;

    let id = app.create_swap(&ana, ben_id, "Guitar", "Python").await;

    let response = app.put(&ana, &format!("/api/swaps/{}/accept", id)).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.put(&cal, &format!("/api/swaps/{}/accept", id)).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.get(Some(&cal), &format!("/api/swaps/{}", id)).await;
    assert_eq!(response.status().as_u16(), 403);

    let body: Value = app
        .get(Some(&ben), &format!("/api/swaps/{}", id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["availableActions"], serde_json::json!(["accept", "reject"]));
}

#[tokio::test]
async fn duplicate_pending_request_is_a_conflict() {
    let app = spawn_app().await;
    let (_, ana) = app.register("Ana", &["Guitar"], &[]).await;
    let (ben_id, ben) = app.register("Ben", &["Python"], &[]).await;

    let id = app.create_swap(&ana, ben_id, "Guitar", "Python").await;

    let response = app.send_swap(&ana, ben_id, "Guitar", "Cooking").await;
    assert_eq!(response.status().as_u16(), 409);

    // Once the first request is settled a new one is allowed.
    let response = app.put(&ben, &format!("/api/swaps/{}/reject", id)).await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.send_swap(&ana, ben_id, "Guitar", "Cooking").await;
    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn requests_to_self_or_missing_users_are_refused() {
    let app = spawn_app().await;
    let (ana_id, ana) = app.register("Ana", &["Guitar"], &[]).await;

    let response = app.send_swap(&ana, ana_id, "Guitar", "Python").await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.send_swap(&ana, 999_999, "Guitar", "Python").await;
    assert_eq!(response.status().as_u16(), 404);

    let response = app.send_swap("not-a-token", 1, "Guitar", "Python").await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn concurrent_accepts_have_a_single_winner() {
    let app = spawn_app().await;
    let (_, ana) = app.register("Ana", &["Guitar"], &[]).await;
    let (ben_id, ben) = app.register("Ben", &["Python"], &[]).await;

    let id = app.create_swap(&ana, ben_id, "Guitar", "Python").await;
    let path = format!("/api/swaps/{}/accept", id);

    let (first, second) = tokio::join!(app.put(&ben, &path), app.put(&ben, &path));
    let mut codes = vec![first.status().as_u16(), second.status().as_u16()];
    codes.sort();
    assert_eq!(codes, vec![200, 400]);
}

#[tokio::test]
async fn delete_cancels_a_pending_request() {
    let app = spawn_app().await;
    let (_, ana) = app.register("Ana", &["Guitar"], &[]).await;
    let (ben_id, _) = app.register("Ben", &["Python"], &[]).await;

    let id = app.create_swap(&ana, ben_id, "Guitar", "Python").await;

    let response = app
        .client
        .delete(app.url(&format!("/api/swaps/{}", id)))
        .bearer_auth(&ana)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn list_swaps_filters_by_direction() {
    let app = spawn_app().await;
    let (ana_id, ana) = app.register("Ana", &["Guitar"], &[]).await;
    let (ben_id, ben) = app.register("Ben", &["Python"], &[]).await;
    let (cal_id, cal) = app.register("Cal", &["Drums"], &[]).await;

    app.create_swap(&ana, ben_id, "Guitar", "Python").await;
    app.create_swap(&cal, ana_id, "Drums", "Guitar").await;
    app.create_swap(&ben, cal_id, "Python", "Drums").await;

    let body: Value = app
        .get(Some(&ana), "/api/swaps?type=sent")
        .await
        .json()
        .await
        .unwrap();
    let swaps = body["swaps"].as_array().unwrap();
    assert_eq!(swaps.len(), 1);
    assert_eq!(swaps[0]["to"]["id"], ben_id);
    assert_eq!(swaps[0]["to"]["name"], "Ben");

    let body: Value = app
        .get(Some(&ana), "/api/swaps?type=received")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["swaps"].as_array().unwrap().len(), 1);
    assert_eq!(body["swaps"][0]["from"]["id"], cal_id);

    let body: Value = app.get(Some(&ana), "/api/swaps").await.json().await.unwrap();
    assert_eq!(body["swaps"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["totalItems"], 2);
}

#[tokio::test]
async fn feedback_flag_needs_an_accepted_or_completed_swap() {
    let app = spawn_app().await;
    let (_, ana) = app.register("Ana", &["Guitar"], &[]).await;
    let (ben_id, ben) = app.register("Ben", &["Python"], &[]).await;

    let id = app.create_swap(&ana, ben_id, "Guitar", "Python").await;
    let path = format!("/api/swaps/{}/feedback-given", id);

    let response = app.put(&ana, &path).await;
    assert_eq!(response.status().as_u16(), 400);

    app.put(&ben, &format!("/api/swaps/{}/accept", id)).await;
    app.put(&ben, &format!("/api/swaps/{}/complete", id)).await;

    let response = app.put(&ana, &path).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["feedbackGiven"], true);

    // Marking twice is harmless.
    let response = app.put(&ana, &path).await;
    assert_eq!(response.status().as_u16(), 200);
}
