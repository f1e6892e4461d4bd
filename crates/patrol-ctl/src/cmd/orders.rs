//! Service order and assignment commands.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json_body, send_json_body};

#[derive(Deserialize)]
struct OrderJson {
    id: String,
    client_id: String,
    status: String,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct AssignmentJson {
    id: String,
    order_id: String,
    agent_id: String,
    starts_at: Option<u64>,
    ends_at: Option<u64>,
    latitude: f64,
    longitude: f64,
    removed: bool,
    active: bool,
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    client_id: &'a str,
}

#[derive(Serialize)]
struct SetStatusRequest<'a> {
    status: &'a str,
}

#[derive(Serialize)]
struct AssignAgentRequest<'a> {
    agent_id: &'a str,
    latitude: f64,
    longitude: f64,
}

fn print_order(order: &OrderJson) {
    println!("  ┌─ order  : {}", order.id);
    println!("  │  client : {}", order.client_id);
    println!("  └─ status : {}", order.status);
}

pub async fn cmd_orders_create(port: u16, client: &str) -> Result<()> {
    let order: OrderJson = post_json_body(
        &format!("{}/orders", base_url(port)),
        &CreateOrderRequest { client_id: client },
    )
    .await?;
    println!("Service order created.");
    print_order(&order);
    Ok(())
}

pub async fn cmd_orders_status(port: u16, order: &str, status: &str) -> Result<()> {
    let order: OrderJson = send_json_body(
        reqwest::Method::PATCH,
        &format!("{}/orders/{}/status", base_url(port), order),
        &SetStatusRequest { status },
    )
    .await?;
    println!("Status updated.");
    print_order(&order);
    Ok(())
}

pub async fn cmd_orders_assign(
    port: u16,
    order: &str,
    agent: &str,
    latitude: &str,
    longitude: &str,
) -> Result<()> {
    let latitude: f64 = latitude.parse().context("latitude must be a number")?;
    let longitude: f64 = longitude.parse().context("longitude must be a number")?;

    let assignment: AssignmentJson = post_json_body(
        &format!("{}/orders/{}/assignments", base_url(port), order),
        &AssignAgentRequest {
            agent_id: agent,
            latitude,
            longitude,
        },
    )
    .await?;

    println!("Agent assigned.");
    println!("  id : {}", assignment.id);
    Ok(())
}

pub async fn cmd_orders_assignments(port: u16, order: &str) -> Result<()> {
    let assignments: Vec<AssignmentJson> =
        get_json(&format!("{}/orders/{}/assignments", base_url(port), order)).await?;

    if assignments.is_empty() {
        println!("No assignments on this order.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Assignments ({})", assignments.len());
    println!("═══════════════════════════════════════");
    for a in &assignments {
        let state = match (a.removed, a.active) {
            (true, _) => "removed",
            (false, true) => "active",
            (false, false) => "expired",
        };
        println!("  ┌─ {}", a.id);
        println!("  │  agent : {}", a.agent_id);
        println!("  │  point : {:.5}, {:.5}", a.latitude, a.longitude);
        println!("  └─ state : {}", state);
    }
    Ok(())
}
