#![allow(clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: send one message through an SMTP server
//!
//! Arguments are `key=value` pairs:
//!
//! | key         | default               |
//! |-------------|-----------------------|
//! | `host`      | `localhost`           |
//! | `port`      | `25`                  |
//! | `secure`    | `false` (implicit TLS)|
//! | `ignore_tls`| `false`               |
//! | `user`      | none (no login)       |
//! | `pass`      | empty                 |
//! | `from`      | `sender@example.com`  |
//! | `to`        | `recipient@example.net` (comma separated) |
//! | `data`      | built-in test message, or a path to an RFC 5322 file |
//!
//! ## Running
//!
//! ```bash
//! RUST_LOG=courier_smtp=trace cargo run --package courier --example send_mail -- \
//!     host=localhost port=2525 ignore_tls=true to=someone@example.net
//! ```

use std::collections::HashMap;

use anyhow::{Context, bail};
use courier::{ConnectionOptions, Credentials, Envelope, Message, SmtpClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;
    let get = |key: &str, default: &str| args.get(key).cloned().unwrap_or_else(|| default.to_string());

    let port: u16 = get("port", "25").parse().context("invalid port")?;
    let options = ConnectionOptions::builder(get("host", "localhost"))
        .port(port)
        .secure(get("secure", "false") == "true")
        .ignore_tls(get("ignore_tls", "false") == "true")
        .logger(true)
        .transaction_log(true)
        .build()?;

    let from = get("from", "sender@example.com");
    let to = get("to", "recipient@example.net");
    let envelope = Envelope::parse(&from, to.split(','))?;
    let message: Message = match args.get("data") {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path))?
            .into(),
        None => format!("From: {from}\r\nTo: {to}\r\nSubject: courier test\r\n\r\nHello from courier.\r\n").into(),
    };

    let client = SmtpClient::new(options);
    let result = deliver(&client, &args, envelope, message).await;
    if result.is_err() {
        client.close().await;
    }
    client.destroy().await;
    result
}

async fn deliver(
    client: &SmtpClient,
    args: &HashMap<String, String>,
    envelope: Envelope,
    message: Message,
) -> anyhow::Result<()> {
    client.connect().await.context("connect failed")?;
    println!("Connected (secure: {})", client.is_secure());

    if let Some(user) = args.get("user") {
        let pass = args.get("pass").map_or("", String::as_str);
        client
            .login(Credentials::password(user.as_str(), pass))
            .await
            .context("login failed")?;
        println!("Authenticated as {}", user);
    }

    let info = client.send(envelope, message).await.context("send failed")?;
    println!("Accepted: {:?}", info.accepted);
    if !info.rejected.is_empty() {
        println!("Rejected: {:?}", info.rejected);
    }
    println!("Server said: {}", info.response);

    client.quit().await;
    Ok(())
}

fn parse_args() -> anyhow::Result<HashMap<String, String>> {
    let mut args = HashMap::new();
    for arg in std::env::args().skip(1) {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("expected key=value, got {:?}", arg);
        };
        args.insert(key.to_string(), value.to_string());
    }
    Ok(args)
}
