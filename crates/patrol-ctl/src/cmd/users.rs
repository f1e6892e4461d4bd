//! User registration command.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body};

#[derive(Serialize)]
struct CreateUserRequest<'a> {
    name: &'a str,
    role: &'a str,
}

#[derive(Deserialize)]
struct UserJson {
    id: String,
    name: String,
    role: String,
}

pub async fn cmd_users_add(port: u16, name: &str, role: &str) -> Result<()> {
    let user: UserJson = post_json_body(
        &format!("{}/users", base_url(port)),
        &CreateUserRequest { name, role },
    )
    .await?;

    println!("Registered {} ({})", user.name, user.role);
    println!("  id : {}", user.id);
    Ok(())
}
