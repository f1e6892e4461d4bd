use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use patrol_core::codec::EntityType;
use patrol_core::config::{MessagingSettings, StorageBackend};
use patrol_services::SqliteStore;

use crate::*;

#[tokio::test]
async fn test_status_reports_counts() -> Result<()> {
    let server = spawn_server().await?;
    seed(&server, 2).await?;

    let status = server.get_ok("/status").await?;
    assert_eq!(status["storage_backend"], "memory");
    assert_eq!(status["users"], 4);
    assert_eq!(status["orders"], 1);
    assert_eq!(status["assignments"], 2);
    assert_eq!(status["messages"], 0);
    assert_eq!(status["multi_send_max_chars"], 5000);
    Ok(())
}

#[tokio::test]
async fn test_user_registration_validation() -> Result<()> {
    let server = spawn_server().await?;

    let (status, body) = server
        .post("/users", json!({ "name": "  ", "role": "admin" }))
        .await?;
    assert_eq!(status, 422);
    assert_eq!(error_fields(&body), vec!["name", "role"]);

    let (status, body) = server.post("/users", json!({ "name": "x" })).await?;
    assert_eq!(status, 422);
    assert_eq!(error_fields(&body), vec!["body"]);

    let user = server
        .post_ok("/users", json!({ "name": "Nadia", "role": "agent" }))
        .await?;
    assert_eq!(user["role"], "agent");
    assert_eq!(user["name"], "Nadia");
    Ok(())
}

#[tokio::test]
async fn test_order_requires_a_client() -> Result<()> {
    let server = spawn_server().await?;
    let agent = register(&server, "Agent", "agent").await?;

    let (status, body) = server
        .post("/orders", json!({ "client_id": agent }))
        .await?;
    assert_eq!(status, 409);
    assert_eq!(body["status"], "error");

    let ghost = server.token(EntityType::User, 4242);
    let (status, _) = server
        .post("/orders", json!({ "client_id": ghost }))
        .await?;
    assert_eq!(status, 404);

    let (status, _) = server
        .post("/orders", json!({ "client_id": "???" }))
        .await?;
    assert_eq!(status, 400);
    Ok(())
}

#[tokio::test]
async fn test_order_status_lifecycle() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 0).await?;

    let order = server.get_ok(&format!("/orders/{}/assignments", s.order)).await?;
    assert!(order.as_array().unwrap().is_empty());

    let (status, body) = server
        .patch(&format!("/orders/{}/status", s.order), json!({ "status": "active" }))
        .await?;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "active");
    assert!(body["data"]["id"].is_string());

    let (status, body) = server
        .patch(&format!("/orders/{}/status", s.order), json!({ "status": "paused" }))
        .await?;
    assert_eq!(status, 422);
    assert_eq!(error_fields(&body), vec!["status"]);
    Ok(())
}

#[tokio::test]
async fn test_assignment_lifecycle_controls_messaging() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 1).await?;

    let listed = server.get_ok(&format!("/orders/{}/assignments", s.order)).await?;
    let listed = listed.as_array().unwrap().clone();
    assert_eq!(listed.len(), 1);
    server.assert_same_id(&listed[0]["agent_id"], &json!(s.agents[0]), EntityType::User);
    server.assert_same_id(&listed[0]["order_id"], &json!(s.order), EntityType::Order);
    assert_eq!(listed[0]["active"], true);
    let assignment = listed[0]["id"].as_str().unwrap().to_string();

    let send = json!({
        "sender_id": s.client,
        "receiver_id": s.agents[0],
        "order_id": s.order,
        "content": "check in",
    });
    let (status, _) = server.post("/messages", send.clone()).await?;
    assert_eq!(status, 200);

    let (status, body) = server.delete(&format!("/assignments/{assignment}")).await?;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["removed"], true);
    assert_eq!(body["data"]["active"], false);

    let (status, _) = server.post("/messages", send).await?;
    assert_eq!(status, 403);

    // Removal keeps the row
    let listed = server.get_ok(&format!("/orders/{}/assignments", s.order)).await?;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_expired_assignment_does_not_authorize() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 0).await?;
    let agent = register(&server, "Night shift", "agent").await?;

    server
        .post_ok(
            &format!("/orders/{}/assignments", s.order),
            json!({
                "agent_id": agent,
                "starts_at": 1_000,
                "ends_at": 2_000,
                "latitude": 45.0,
                "longitude": 5.0,
            }),
        )
        .await?;

    let data = server
        .post_ok(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": [agent],
                "order_id": s.order,
                "content": "are you there?",
            }),
        )
        .await?;
    assert_eq!(data["total_sent"], 0);
    assert_eq!(data["failed_conversations"][0]["error"], "unauthorized");
    Ok(())
}

#[tokio::test]
async fn test_assignment_rejections() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 0).await?;
    let agent = register(&server, "Agent", "agent").await?;
    let path = format!("/orders/{}/assignments", s.order);

    let (status, _) = server
        .post(&path, json!({ "agent_id": agent, "latitude": 95.0, "longitude": 0.0 }))
        .await?;
    assert_eq!(status, 422);

    let (status, _) = server
        .post(
            &path,
            json!({ "agent_id": agent, "starts_at": 50, "ends_at": 10, "latitude": 0.0, "longitude": 0.0 }),
        )
        .await?;
    assert_eq!(status, 409);

    let (status, _) = server
        .post(&path, json!({ "agent_id": s.client, "latitude": 0.0, "longitude": 0.0 }))
        .await?;
    assert_eq!(status, 409);

    // A user token in the order slot
    let (status, body) = server
        .post(
            &format!("/orders/{}/assignments", s.client),
            json!({ "agent_id": agent, "latitude": 0.0, "longitude": 0.0 }),
        )
        .await?;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Un ou plusieurs identifiants sont invalides");

    let (status, _) = server
        .delete(&format!("/assignments/{}", server.token(EntityType::Assignment, 77)))
        .await?;
    assert_eq!(status, 404);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_backend_end_to_end() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let server = spawn_server_with(
        store.clone(),
        store,
        StorageBackend::Sqlite,
        MessagingSettings::default(),
    )
    .await?;
    let s = seed(&server, 2).await?;

    let data = server
        .post_ok(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": [s.agents[0], s.outsider, s.agents[1]],
                "order_id": s.order,
                "content": "Relève à 7h",
            }),
        )
        .await?;
    assert_eq!(data["total_sent"], 2);
    assert_eq!(data["total_failed"], 1);

    let status = server.get_ok("/status").await?;
    assert_eq!(status["storage_backend"], "sqlite");
    assert_eq!(status["messages"], 2);

    let stored = server.get_ok(&format!("/orders/{}/messages", s.order)).await?;
    assert_eq!(stored[0]["content"], "Relève à 7h");
    Ok(())
}

#[tokio::test]
async fn test_custom_limits_apply() -> Result<()> {
    let settings = MessagingSettings {
        multi_send_max_chars: 10,
        ..MessagingSettings::default()
    };
    let server = spawn_server_with(
        Arc::new(patrol_services::MemoryDirectory::new()),
        Arc::new(patrol_services::MemoryMessageStore::new()),
        StorageBackend::Memory,
        settings,
    )
    .await?;
    let s = seed(&server, 1).await?;

    let (status, _) = server
        .post(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "eleven char",
            }),
        )
        .await?;
    assert_eq!(status, 422);
    Ok(())
}
