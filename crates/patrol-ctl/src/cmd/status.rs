//! Daemon status command.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    storage_backend: String,
    uptime_secs: u64,
    users: usize,
    orders: usize,
    assignments: usize,
    messages: usize,
    multi_send_max_chars: usize,
    single_send_max_chars: usize,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Patrol Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Storage backend : {}", resp.storage_backend);
    println!("  Uptime          : {}s", resp.uptime_secs);
    println!("  Users           : {}", resp.users);
    println!("  Service orders  : {}", resp.orders);
    println!("  Assignments     : {}", resp.assignments);
    println!("  Messages        : {}", resp.messages);
    println!(
        "  Content limits  : {} chars (multi), {} chars (single)",
        resp.multi_send_max_chars, resp.single_send_max_chars
    );

    Ok(())
}
