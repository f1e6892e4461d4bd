//! patrol-ctl — command-line interface for the Patrol daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::messages::{cmd_messages, cmd_messages_multi, cmd_messages_send};
use cmd::orders::{
    cmd_orders_assign, cmd_orders_assignments, cmd_orders_create, cmd_orders_status,
};
use cmd::status::cmd_status;
use cmd::users::cmd_users_add;

const DEFAULT_PORT: u16 = 9101;

fn print_usage() {
    println!("Usage: patrol-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                                         Show daemon status and counts");
    println!("  users add <name> <client|agent>                Register a user");
    println!("  orders create <client>                         Open a service order");
    println!("  orders status <order> <pending|active|closed>  Change order status");
    println!("  orders assign <order> <agent> <lat> <lon>      Assign an agent to an order");
    println!("  orders assignments <order>                     List assignments on an order");
    println!("  messages <order>                               List messages on an order");
    println!("  messages send <sender> <order> <receiver> <text>");
    println!("                                                 Send one message");
    println!("  messages multi <sender> <order> <text> <receiver>...");
    println!("                                                 Send to several receivers");
    println!();
    println!("Ids are the opaque tokens returned by the daemon.");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd_status(port).await,
        ["users", "add", name, role] => cmd_users_add(port, name, role).await,
        ["orders", "create", client] => cmd_orders_create(port, client).await,
        ["orders", "status", order, status] => cmd_orders_status(port, order, status).await,
        ["orders", "assign", order, agent, lat, lon] => {
            cmd_orders_assign(port, order, agent, lat, lon).await
        }
        ["orders", "assignments", order] => cmd_orders_assignments(port, order).await,
        ["messages", "send", sender, order, receiver, text @ ..] if !text.is_empty() => {
            cmd_messages_send(port, sender, order, receiver, &text.join(" ")).await
        }
        ["messages", "multi", sender, order, text, receivers @ ..] => {
            let receivers: Vec<String> = receivers.iter().map(|r| r.to_string()).collect();
            cmd_messages_multi(port, sender, order, text, &receivers).await
        }
        ["messages", order] => cmd_messages(port, order).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
