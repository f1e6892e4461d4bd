//! Messaging commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body};

#[derive(Deserialize)]
#[allow(dead_code)]
struct MessageJson {
    id: String,
    sender_id: String,
    receiver_id: String,
    order_id: String,
    content: String,
    sent_at: u64,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    sender_id: &'a str,
    receiver_id: &'a str,
    order_id: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct SentMessageJson {
    message_id: String,
    conversation_id: String,
}

#[derive(Serialize)]
struct MultiSendRequest<'a> {
    sender_id: &'a str,
    receiver_ids: &'a [String],
    order_id: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MultiSendJson {
    total_sent: usize,
    total_failed: usize,
    successful_conversations: Vec<SuccessfulJson>,
    failed_conversations: Vec<FailedJson>,
    message: String,
}

#[derive(Deserialize)]
struct SuccessfulJson {
    conversation_id: String,
    receiver_id: String,
}

#[derive(Deserialize)]
struct FailedJson {
    receiver_id: String,
    error: String,
}

fn short(token: &str) -> &str {
    token
        .char_indices()
        .nth(16)
        .map_or(token, |(end, _)| &token[..end])
}

pub async fn cmd_messages(port: u16, order: &str) -> Result<()> {
    let messages: Vec<MessageJson> =
        get_json(&format!("{}/orders/{}/messages", base_url(port), order)).await?;

    if messages.is_empty() {
        println!("No messages on order {}...", short(order));
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Messages on order {}...", short(order));
    println!("═══════════════════════════════════════");

    for m in &messages {
        println!("  ┌─ [{}]", m.sent_at);
        println!("  │  from : {}...", short(&m.sender_id));
        println!("  │  to   : {}...", short(&m.receiver_id));
        println!("  └─ {}", m.content);
    }

    Ok(())
}

pub async fn cmd_messages_send(
    port: u16,
    sender: &str,
    order: &str,
    receiver: &str,
    text: &str,
) -> Result<()> {
    let sent: SentMessageJson = post_json_body(
        &format!("{}/messages", base_url(port)),
        &SendMessageRequest {
            sender_id: sender,
            receiver_id: receiver,
            order_id: order,
            content: text,
        },
    )
    .await?;

    println!("Message sent.");
    println!("  id           : {}", sent.message_id);
    println!("  conversation : {}", sent.conversation_id);
    Ok(())
}

pub async fn cmd_messages_multi(
    port: u16,
    sender: &str,
    order: &str,
    text: &str,
    receivers: &[String],
) -> Result<()> {
    let resp: MultiSendJson = post_json_body(
        &format!("{}/messages/multi", base_url(port)),
        &MultiSendRequest {
            sender_id: sender,
            receiver_ids: receivers,
            order_id: order,
            content: text,
        },
    )
    .await?;

    println!("{}", resp.message);
    println!("  sent   : {}", resp.total_sent);
    println!("  failed : {}", resp.total_failed);
    for s in &resp.successful_conversations {
        println!("  ✓ {}... → {}", short(&s.receiver_id), short(&s.conversation_id));
    }
    for f in &resp.failed_conversations {
        println!("  ✗ {}... ({})", short(&f.receiver_id), f.error);
    }
    Ok(())
}
