//! Shared fixtures: an in-process SMTP server and a scripted transport.

#![allow(dead_code, clippy::unwrap_used)]

mod scripted;

pub use scripted::ScriptedTransport;

use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use courier::{ConnectionOptions, SmtpClient};

pub const USER: &str = "user";
pub const PASS: &str = "pass";

/// One message accepted by the test server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Received {
    pub from: String,
    pub to: Vec<String>,
    pub data: String,
}

/// Minimal SMTP server on `127.0.0.1:0`.
///
/// Advertises `AUTH PLAIN LOGIN` and no STARTTLS, accepts `user`/`pass` and
/// rejects recipients whose local part starts with `reject`.
pub struct TestServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
    commands: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let received = Arc::clone(&received);
            let commands = Arc::clone(&commands);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let session = Session {
                        received: Arc::clone(&received),
                        commands: Arc::clone(&commands),
                    };
                    tokio::spawn(session.run(stream));
                }
            })
        };

        Self {
            addr,
            received,
            commands,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Options for a plaintext client of this server.
    pub fn options(&self) -> ConnectionOptions {
        ConnectionOptions::builder("127.0.0.1")
            .port(self.port())
            .ignore_tls(true)
            .name("client.test")
            .build()
            .unwrap()
    }

    pub fn client(&self) -> SmtpClient {
        SmtpClient::new(self.options())
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    /// Every command line received so far, across connections.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Session {
    received: Arc<Mutex<Vec<Received>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl Session {
    async fn run(self, stream: TcpStream) {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut current = Received::default();

        if reply(&mut write, "220 localhost ESMTP test server\r\n").await.is_err() {
            return;
        }

        while let Ok(Some(line)) = lines.next_line().await {
            self.commands.lock().push(line.clone());
            let upper = line.to_ascii_uppercase();

            let response = if upper.starts_with("EHLO") {
                "250-localhost Nice to meet you\r\n250-AUTH PLAIN LOGIN\r\n250-8BITMIME\r\n250 SIZE 10485760\r\n".to_string()
            } else if upper.starts_with("HELO") {
                "250 localhost\r\n".to_string()
            } else if upper.starts_with("AUTH PLAIN") {
                let payload = match line.split_whitespace().nth(2) {
                    Some(payload) => payload.to_string(),
                    None => match prompt(&mut write, &mut lines, "334 \r\n").await {
                        Some(payload) => payload,
                        None => return,
                    },
                };
                auth_result(check_plain(&payload))
            } else if upper.starts_with("AUTH LOGIN") {
                let Some(user) = prompt(&mut write, &mut lines, "334 VXNlcm5hbWU6\r\n").await else {
                    return;
                };
                let Some(pass) = prompt(&mut write, &mut lines, "334 UGFzc3dvcmQ6\r\n").await else {
                    return;
                };
                auth_result(decode(&user) == USER && decode(&pass) == PASS)
            } else if upper.starts_with("MAIL FROM:") {
                current = Received {
                    from: path(&line),
                    ..Received::default()
                };
                "250 Accepted\r\n".to_string()
            } else if upper.starts_with("RCPT TO:") {
                let to = path(&line);
                if to.starts_with("reject") {
                    format!("550 5.1.1 <{to}>: Recipient address rejected\r\n")
                } else {
                    current.to.push(to);
                    "250 Accepted\r\n".to_string()
                }
            } else if upper == "DATA" {
                if reply(&mut write, "354 End data with <CR><LF>.<CR><LF>\r\n").await.is_err() {
                    return;
                }
                while let Ok(Some(data)) = lines.next_line().await {
                    if data == "." {
                        break;
                    }
                    let data = data.strip_prefix('.').unwrap_or(&data);
                    current.data.push_str(data);
                    current.data.push_str("\r\n");
                }
                self.received.lock().push(std::mem::take(&mut current));
                "250 OK: message queued\r\n".to_string()
            } else if upper == "RSET" {
                current = Received::default();
                "250 Flushed\r\n".to_string()
            } else if upper == "NOOP" {
                "250 OK\r\n".to_string()
            } else if upper == "QUIT" {
                let _ = reply(&mut write, "221 Bye\r\n").await;
                return;
            } else {
                "502 5.5.2 Error: command not recognized\r\n".to_string()
            };

            if reply(&mut write, &response).await.is_err() {
                return;
            }
        }
    }
}

async fn reply(write: &mut OwnedWriteHalf, text: &str) -> std::io::Result<()> {
    write.write_all(text.as_bytes()).await
}

async fn prompt(
    write: &mut OwnedWriteHalf,
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    challenge: &str,
) -> Option<String> {
    reply(write, challenge).await.ok()?;
    lines.next_line().await.ok().flatten()
}

fn decode(payload: &str) -> String {
    STANDARD
        .decode(payload.trim())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn check_plain(payload: &str) -> bool {
    let decoded = decode(payload);
    let mut parts = decoded.split('\0');
    let _authzid = parts.next();
    parts.next() == Some(USER) && parts.next() == Some(PASS)
}

fn auth_result(ok: bool) -> String {
    if ok {
        "235 2.7.0 Authentication successful\r\n".to_string()
    } else {
        "535 5.7.8 Error: authentication failed: Invalid username or password\r\n".to_string()
    }
}

/// Address between the angle brackets of MAIL FROM / RCPT TO.
fn path(line: &str) -> String {
    line.split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(addr, _)| addr.to_string())
        .unwrap_or_default()
}
