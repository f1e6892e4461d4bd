//! Shared HTTP request helpers for CLI commands.
//!
//! Every response is either `{"status":"success","data":...}` or an error
//! body carrying `message` or `violations`.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

fn unwrap_envelope<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T> {
    if body["status"] == "success" {
        return serde_json::from_value(body["data"].clone()).context("failed to parse response");
    }
    if let Some(message) = body["message"].as_str() {
        bail!("{message}");
    }
    if let Some(violations) = body["violations"].as_array() {
        let lines: Vec<String> = violations
            .iter()
            .map(|v| {
                format!(
                    "{}: {}",
                    v["field"].as_str().unwrap_or("?"),
                    v["message"].as_str().unwrap_or("?")
                )
            })
            .collect();
        bail!("invalid request:\n  {}", lines.join("\n  "));
    }
    bail!("unexpected response: {body}")
}

async fn read(resp: reqwest::Response) -> Result<Value> {
    resp.json::<Value>().await.context("failed to parse response")
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to patrold at {} — is it running?", url))?;
    unwrap_envelope(read(resp).await?)
}

pub async fn send_json_body<T, R>(method: reqwest::Method, url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    let resp = reqwest::Client::new()
        .request(method, url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to connect to patrold at {} — is it running?", url))?;
    unwrap_envelope(read(resp).await?)
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    send_json_body(reqwest::Method::POST, url, body).await
}
