use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use patrol_core::codec::EntityType;
use patrol_core::config::{MessagingSettings, StorageBackend};
use patrol_core::model::{Message, NewMessage};
use patrol_services::{MemoryDirectory, MemoryMessageStore, MessageRepository, StoreError};

use crate::*;

const INVALID_IDS: &str = "Un ou plusieurs identifiants sont invalides";

async fn message_count(server: &TestServer) -> Result<u64> {
    Ok(server.get_ok("/status").await?["messages"]
        .as_u64()
        .unwrap_or_default())
}

#[tokio::test]
async fn test_multi_send_to_all_assigned_agents() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 3).await?;

    let data = server
        .post_ok(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "Rondes renforcées ce soir",
            }),
        )
        .await?;

    assert_eq!(data["total_sent"], 3);
    assert_eq!(data["total_failed"], 0);
    assert_eq!(data["successful_conversations"].as_array().unwrap().len(), 3);
    assert!(data["failed_conversations"].as_array().unwrap().is_empty());
    assert_eq!(data["message"], "3 message(s) sent");
    for (entry, agent) in data["successful_conversations"]
        .as_array()
        .unwrap()
        .iter()
        .zip(&s.agents)
    {
        // Echoed as submitted
        assert_eq!(entry["receiver_id"], agent.as_str());
        assert!(entry["conversation_id"].is_string());
    }

    let stored = server.get_ok(&format!("/orders/{}/messages", s.order)).await?;
    let stored = stored.as_array().unwrap();
    assert_eq!(stored.len(), 3);
    let mut receivers: Vec<u64> = Vec::new();
    for m in stored {
        assert_eq!(m["content"], "Rondes renforcées ce soir");
        server.assert_same_id(&m["sender_id"], &json!(s.client), EntityType::User);
        server.assert_same_id(&m["order_id"], &json!(s.order), EntityType::Order);
        receivers.push(server.id_of(&m["receiver_id"], EntityType::User));
    }
    let agents: Vec<u64> = s
        .agents
        .iter()
        .map(|a| server.id_of(&json!(a), EntityType::User))
        .collect();
    assert_eq!(receivers, agents);
    Ok(())
}

#[tokio::test]
async fn test_multi_send_partial_failure_is_200() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 1).await?;

    let (status, body) = server
        .post(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": [s.agents[0], s.outsider, "garbage"],
                "order_id": s.order,
                "content": "hello",
            }),
        )
        .await?;

    assert_eq!(status, 200);
    let data = &body["data"];
    assert_eq!(data["total_sent"], 1);
    assert_eq!(data["total_failed"], 2);
    let failed = data["failed_conversations"].as_array().unwrap();
    assert_eq!(failed[0]["receiver_id"], s.outsider.as_str());
    assert_eq!(failed[0]["error"], "unauthorized");
    assert_eq!(failed[1]["receiver_id"], "garbage");
    assert_eq!(failed[1]["error"], "invalid_receiver_id");
    assert_eq!(message_count(&server).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_multi_send_bad_sender_is_400_and_stores_nothing() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 2).await?;

    let (status, body) = server
        .post(
            "/messages/multi",
            json!({
                "sender_id": "not-a-token",
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "hello",
            }),
        )
        .await?;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], INVALID_IDS);

    // An order token in the sender slot is rejected the same way
    let (status, _) = server
        .post(
            "/messages/multi",
            json!({
                "sender_id": s.order,
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "hello",
            }),
        )
        .await?;
    assert_eq!(status, 400);

    assert_eq!(message_count(&server).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_multi_send_validation_is_422() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 1).await?;

    let (status, body) = server
        .post(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "x".repeat(5001),
            }),
        )
        .await?;
    assert_eq!(status, 422);
    assert_eq!(body["status"], "error");
    assert_eq!(error_fields(&body), vec!["content"]);

    let (status, body) = server
        .post(
            "/messages/multi",
            json!({ "sender_id": s.client, "receiver_ids": "nope", "content": "" }),
        )
        .await?;
    assert_eq!(status, 422);
    assert_eq!(error_fields(&body), vec!["order_id", "receiver_ids", "content"]);

    let (status, body) = server.post_raw("/messages/multi", "{not json").await?;
    assert_eq!(status, 422);
    assert_eq!(error_fields(&body), vec!["body"]);

    assert_eq!(message_count(&server).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_multi_send_validation_runs_before_decoding() -> Result<()> {
    let server = spawn_server().await?;

    let (status, _) = server
        .post(
            "/messages/multi",
            json!({
                "sender_id": "bad",
                "receiver_ids": [],
                "order_id": "bad",
                "content": "   ",
            }),
        )
        .await?;
    assert_eq!(status, 422);
    Ok(())
}

#[tokio::test]
async fn test_multi_send_empty_receivers() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 1).await?;

    let data = server
        .post_ok(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": [],
                "order_id": s.order,
                "content": "hello",
            }),
        )
        .await?;
    assert_eq!(data["total_sent"], 0);
    assert_eq!(data["total_failed"], 0);
    assert!(data["successful_conversations"].as_array().unwrap().is_empty());
    assert!(data["failed_conversations"].as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_multi_send_deduplicates_receivers() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 1).await?;

    let data = server
        .post_ok(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": [s.agents[0], s.agents[0]],
                "order_id": s.order,
                "content": "hello",
            }),
        )
        .await?;
    assert_eq!(data["total_sent"], 1);
    assert_eq!(data["total_failed"], 0);
    assert_eq!(message_count(&server).await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_agent_replies_to_client_in_same_conversation() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 1).await?;

    let out = server
        .post_ok(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": [s.agents[0]],
                "order_id": s.order,
                "content": "Status?",
            }),
        )
        .await?;
    let reply = server
        .post_ok(
            "/messages",
            json!({
                "sender_id": s.agents[0],
                "receiver_id": s.client,
                "order_id": s.order,
                "content": "All quiet",
            }),
        )
        .await?;

    assert_eq!(
        out["successful_conversations"][0]["conversation_id"],
        reply["conversation_id"]
    );
    assert!(reply["message_id"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_single_send_error_mapping() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 1).await?;

    let (status, body) = server
        .post(
            "/messages",
            json!({
                "sender_id": s.client,
                "receiver_id": s.outsider,
                "order_id": s.order,
                "content": "hi",
            }),
        )
        .await?;
    assert_eq!(status, 403);
    assert_eq!(body["status"], "error");

    let (status, body) = server
        .post(
            "/messages",
            json!({
                "sender_id": s.client,
                "receiver_id": "garbage",
                "order_id": s.order,
                "content": "hi",
            }),
        )
        .await?;
    assert_eq!(status, 400);
    assert_eq!(body["message"], INVALID_IDS);

    let (status, body) = server
        .post(
            "/messages",
            json!({
                "sender_id": s.client,
                "receiver_id": s.agents[0],
                "order_id": s.order,
                "content": "x".repeat(2001),
            }),
        )
        .await?;
    assert_eq!(status, 422);
    assert_eq!(error_fields(&body), vec!["content"]);

    assert_eq!(message_count(&server).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_conversation_filter() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 2).await?;

    server
        .post_ok(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "briefing",
            }),
        )
        .await?;

    let convo = server
        .get_ok(&format!(
            "/orders/{}/messages?with={}&and={}",
            s.order, s.agents[1], s.client
        ))
        .await?;
    let convo = convo.as_array().unwrap();
    assert_eq!(convo.len(), 1);
    server.assert_same_id(&convo[0]["receiver_id"], &json!(s.agents[1]), EntityType::User);
    server.assert_same_id(&convo[0]["sender_id"], &json!(s.client), EntityType::User);

    let (status, _) = server
        .get(&format!("/orders/{}/messages?with={}", s.order, s.client))
        .await?;
    assert_eq!(status, 422);
    Ok(())
}

#[tokio::test]
async fn test_notifications_are_published() -> Result<()> {
    let server = spawn_server().await?;
    let s = seed(&server, 2).await?;
    let mut rx = server.notifier.subscribe();

    server
        .post_ok(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "heads up",
            }),
        )
        .await?;

    let first = rx.recv().await?;
    let second = rx.recv().await?;
    assert_eq!(first.content, "heads up");
    assert!(first.id < second.id);
    Ok(())
}

/// Refuses every insert whose content mentions "reject".
struct RejectingStore(MemoryMessageStore);

impl MessageRepository for RejectingStore {
    fn insert(&self, new: NewMessage) -> Result<Message, StoreError> {
        if new.content.contains("reject") {
            return Err(StoreError::Backend("injected fault".into()));
        }
        self.0.insert(new)
    }

    fn for_order(&self, order_id: u64) -> Result<Vec<Message>, StoreError> {
        self.0.for_order(order_id)
    }

    fn count(&self) -> Result<usize, StoreError> {
        self.0.count()
    }
}

#[tokio::test]
async fn test_storage_faults_are_per_receiver_and_500_for_single_send() -> Result<()> {
    let server = spawn_server_with(
        Arc::new(MemoryDirectory::new()),
        Arc::new(RejectingStore(MemoryMessageStore::new())),
        StorageBackend::Memory,
        MessagingSettings::default(),
    )
    .await?;
    let s = seed(&server, 2).await?;

    let (status, body) = server
        .post(
            "/messages/multi",
            json!({
                "sender_id": s.client,
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "please reject",
            }),
        )
        .await?;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total_failed"], 2);
    assert_eq!(body["data"]["failed_conversations"][1]["error"], "storage_error");

    let (status, _) = server
        .post(
            "/messages",
            json!({
                "sender_id": s.client,
                "receiver_id": s.agents[0],
                "order_id": s.order,
                "content": "reject me",
            }),
        )
        .await?;
    assert_eq!(status, 500);
    Ok(())
}

#[tokio::test]
async fn test_tokens_from_another_server_are_rejected() -> Result<()> {
    let server = spawn_server().await?;
    let other = spawn_server().await?;
    let s = seed(&server, 1).await?;

    // Same numeric ids, different key
    let (status, _) = server
        .post(
            "/messages/multi",
            json!({
                "sender_id": other.token(EntityType::User, 1),
                "receiver_ids": s.agents,
                "order_id": s.order,
                "content": "hello",
            }),
        )
        .await?;
    assert_eq!(status, 400);
    Ok(())
}
