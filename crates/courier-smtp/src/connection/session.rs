//! One established SMTP session: greeting, capability discovery, TLS,
//! authentication and mail transactions.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use super::ServerInfo;
use super::options::ConnectionOptions;
use super::stream::{BoxedIo, SmtpStream, dial};
use super::tls;
use crate::command::Command;
use crate::error::{ErrorCode, Result, SmtpError};
use crate::parser::ReplyParser;
use crate::sasl;
use crate::types::{
    AuthMechanism, Credentials, Envelope, Extension, Message, Reply, ReplyCode, SentMessageInfo,
};

pub(crate) struct Session {
    cid: u64,
    stream: SmtpStream,
    options: Arc<ConnectionOptions>,
    server: ServerInfo,
}

impl Session {
    /// Connects, reads the greeting, discovers capabilities and applies the
    /// TLS policy.
    pub(crate) async fn establish(
        cid: u64,
        options: Arc<ConnectionOptions>,
        socket: Option<BoxedIo>,
    ) -> Result<Self> {
        let io = match socket {
            Some(io) => io,
            None => {
                dial(
                    &options.host,
                    options.port,
                    options.local_address,
                    options.connection_timeout,
                )
                .await?
            }
        };

        let stream = if options.secure {
            let connector = tls::connector(&options.tls);
            let handshake = SmtpStream::tls(io, &connector, options.tls_server_name());
            tokio::time::timeout(options.connection_timeout, handshake)
                .await
                .map_err(|_| SmtpError::new(ErrorCode::Timeout, "Connection timeout"))??
        } else {
            SmtpStream::plain(io)
        };

        let mut session = Self {
            cid,
            stream,
            options,
            server: ServerInfo::default(),
        };

        let greeting = session
            .read_reply(session.options.greeting_timeout)
            .await
            .map_err(|err| match err.code {
                ErrorCode::Timeout => SmtpError::new(ErrorCode::Timeout, "Greeting never received"),
                _ => err,
            })?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(SmtpError::from_reply(
                ErrorCode::Connection,
                "Invalid greeting",
                &greeting,
            ));
        }

        session.greet().await?;
        session.negotiate_tls().await
    }

    pub(crate) const fn is_secure(&self) -> bool {
        self.stream.is_tls()
    }

    pub(crate) const fn server(&self) -> &ServerInfo {
        &self.server
    }

    /// EHLO, falling back to HELO for servers that reject it.
    async fn greet(&mut self) -> Result<()> {
        let hostname = self.options.name.clone();
        let reply = self
            .command(&Command::Ehlo {
                hostname: hostname.clone(),
            })
            .await?;
        if reply.is_success() {
            self.server = ServerInfo::from_ehlo(&reply);
            return Ok(());
        }

        let reply = self.command(&Command::Helo { hostname }).await?;
        let reply = reply
            .expect_success(ErrorCode::Protocol, "Invalid response for EHLO/HELO")
            .map_err(|err| err.with_command("HELO"))?;
        self.server = ServerInfo::from_ehlo(&reply);
        self.server.extensions.clear();
        Ok(())
    }

    async fn negotiate_tls(mut self) -> Result<Self> {
        if self.stream.is_tls() || self.options.ignore_tls {
            return Ok(self);
        }
        if !self.server.supports_starttls() && !self.options.require_tls {
            return Ok(self);
        }

        let reply = self.command(&Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            if self.options.opportunistic_tls {
                tracing::warn!(cid = self.cid, %reply, "STARTTLS refused, continuing unencrypted");
                return Ok(self);
            }
            return Err(SmtpError::from_reply(
                ErrorCode::Tls,
                "Error upgrading connection with STARTTLS",
                &reply,
            )
            .with_command("STARTTLS"));
        }

        let connector = tls::connector(&self.options.tls);
        self.stream = self
            .stream
            .upgrade(&connector, self.options.tls_server_name())
            .await?;
        if self.options.logger {
            tracing::debug!(cid = self.cid, "Connection upgraded with STARTTLS");
        }

        self.greet().await?;
        Ok(self)
    }

    pub(crate) async fn authenticate(&mut self, credentials: Credentials) -> Result<()> {
        let mechanism = self.select_mechanism(&credentials);
        let command = format!("AUTH {mechanism}");
        tracing::debug!(cid = self.cid, user = credentials.user(), %mechanism, "Authenticating");

        let reply = match (&credentials, mechanism) {
            (Credentials::Password { user, pass }, AuthMechanism::Plain) => {
                self.command(&Command::Auth {
                    mechanism,
                    initial_response: Some(sasl::plain_response(user, pass)),
                })
                .await?
            }
            (Credentials::Password { user, pass }, AuthMechanism::Login) => {
                self.login_exchange(user, pass).await?
            }
            (Credentials::OAuth2(token), AuthMechanism::XOAuth2 | AuthMechanism::OAuthBearer) => {
                let initial_response = if mechanism == AuthMechanism::XOAuth2 {
                    sasl::xoauth2_response(&token.user, &token.access_token)
                } else {
                    sasl::oauthbearer_response(&token.user, &token.access_token)
                };
                let reply = self
                    .command(&Command::Auth {
                        mechanism,
                        initial_response: Some(initial_response),
                    })
                    .await?;
                if reply.code == ReplyCode::AUTH_CONTINUE {
                    // The challenge carries the error details; an empty line
                    // ends the exchange and yields the final status.
                    if let Some(challenge) = reply.message.first() {
                        tracing::debug!(
                            cid = self.cid,
                            challenge = %sasl::decode_challenge(challenge),
                            "OAuth2 token rejected"
                        );
                    }
                    self.command(&Command::AuthResponse(String::new())).await?
                } else {
                    reply
                }
            }
            _ => {
                return Err(SmtpError::new(
                    ErrorCode::Auth,
                    format!("Credentials do not match the {mechanism} mechanism"),
                )
                .with_command(command));
            }
        };

        reply
            .expect_code(ReplyCode::AUTH_SUCCESS, ErrorCode::Auth, "Invalid login")
            .map_err(|err| err.with_command(command))?;
        if self.options.logger {
            tracing::debug!(cid = self.cid, user = credentials.user(), "User authenticated");
        }
        Ok(())
    }

    fn select_mechanism(&self, credentials: &Credentials) -> AuthMechanism {
        let preferred = self.options.auth_method;
        match credentials {
            Credentials::OAuth2(_) => match preferred {
                Some(AuthMechanism::OAuthBearer) => AuthMechanism::OAuthBearer,
                _ => AuthMechanism::XOAuth2,
            },
            Credentials::Password { .. } => preferred.unwrap_or_else(|| {
                let advertised = self.server.auth_mechanisms();
                [AuthMechanism::Plain, AuthMechanism::Login]
                    .into_iter()
                    .find(|m| advertised.contains(m))
                    .unwrap_or(AuthMechanism::Plain)
            }),
        }
    }

    async fn login_exchange(&mut self, user: &str, pass: &str) -> Result<Reply> {
        let steps = [
            Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            },
            Command::AuthResponse(sasl::login_step(user)),
        ];
        for step in &steps {
            self.command(step)
                .await?
                .expect_code(ReplyCode::AUTH_CONTINUE, ErrorCode::Auth, "Invalid login sequence")
                .map_err(|err| err.with_command("AUTH LOGIN"))?;
        }
        self.command(&Command::AuthResponse(sasl::login_step(pass)))
            .await
    }

    /// Runs one mail transaction.
    pub(crate) async fn send(&mut self, envelope: Envelope, message: Message) -> Result<SentMessageInfo> {
        envelope.validate()?;

        if let (Some(size), Some(max)) = (envelope.size, self.server.max_message_size())
            && max > 0
            && size > max
        {
            return Err(SmtpError::new(
                ErrorCode::Message,
                format!("Message size larger than allowed {max}"),
            ));
        }

        self.command(&Command::MailFrom {
            from: envelope.from.clone(),
            params: self.mail_params(&envelope),
        })
        .await?
        .expect_success(ErrorCode::Envelope, "Mail command failed")
        .map_err(|err| err.with_command("MAIL FROM"))?;

        let mut info = SentMessageInfo::default();
        let rcpt_params = match &envelope.dsn {
            Some(dsn) if self.server.supports(&Extension::Dsn) => dsn.rcpt_params(),
            _ => Vec::new(),
        };
        let mut last_rejection = None;
        for to in envelope.to {
            let reply = self
                .command(&Command::RcptTo {
                    to: to.clone(),
                    params: rcpt_params.clone(),
                })
                .await?;
            if reply.is_success() {
                info.accepted.push(to.to_string());
            } else {
                info.rejected.push(to.to_string());
                info.rejected_errors.push(
                    SmtpError::from_reply(
                        ErrorCode::Envelope,
                        format!("Recipient command failed for {to}"),
                        &reply,
                    )
                    .with_command("RCPT TO"),
                );
                last_rejection = Some(reply);
            }
        }

        if info.accepted.is_empty() {
            self.abort_transaction().await;
            let err = match last_rejection {
                Some(reply) => SmtpError::from_reply(
                    ErrorCode::Envelope,
                    "Can't send mail - all recipients were rejected",
                    &reply,
                ),
                None => SmtpError::new(
                    ErrorCode::Envelope,
                    "Can't send mail - all recipients were rejected",
                ),
            };
            return Err(err.with_command("RCPT TO"));
        }

        let reply = self.command(&Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            self.abort_transaction().await;
            return Err(
                SmtpError::from_reply(ErrorCode::Message, "Data command failed", &reply).with_command("DATA"),
            );
        }

        self.transmit(message).await?;

        let reply = self
            .read_reply(self.options.socket_timeout)
            .await?
            .expect_success(ErrorCode::Message, "Message failed")
            .map_err(|err| err.with_command("DATA"))?;
        info.response = reply.to_string();
        if self.options.logger {
            tracing::debug!(
                cid = self.cid,
                accepted = info.accepted.len(),
                rejected = info.rejected.len(),
                response = %info.response,
                "Message sent"
            );
        }
        Ok(info)
    }

    fn mail_params(&self, envelope: &Envelope) -> Vec<String> {
        let mut params = Vec::new();
        if envelope.use_8bit_mime && self.server.supports(&Extension::EightBitMime) {
            params.push("BODY=8BITMIME".to_string());
        }
        if let Some(size) = envelope.size
            && self.server.supports_size()
        {
            params.push(format!("SIZE={size}"));
        }
        let international = !envelope.reverse_path().is_ascii()
            || envelope.to.iter().any(|to| !to.as_str().is_ascii());
        if international && self.server.supports(&Extension::SmtpUtf8) {
            params.push("SMTPUTF8".to_string());
        }
        if let Some(dsn) = &envelope.dsn
            && self.server.supports(&Extension::Dsn)
        {
            params.extend(dsn.mail_params());
        }
        params
    }

    /// Streams the message body with CRLF line endings and dot-stuffing,
    /// followed by the terminating `.` line.
    async fn transmit(&mut self, message: Message) -> Result<()> {
        let mut reader = BufReader::new(message.into_reader());
        let mut line = Vec::new();
        let mut total = 0usize;

        loop {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(|err| SmtpError::new(ErrorCode::Streaming, err.to_string()))?;
            if n == 0 {
                break;
            }

            let mut content = line.as_slice();
            if let Some(stripped) = content.strip_suffix(b"\n") {
                content = stripped.strip_suffix(b"\r").unwrap_or(stripped);
            }
            if content.first() == Some(&b'.') {
                self.stream.write_chunk(b".").await?;
            }
            self.stream.write_chunk(content).await?;
            self.stream.write_chunk(b"\r\n").await?;
            total += n;

            if self.options.debug {
                tracing::trace!(cid = self.cid, "C: {}", String::from_utf8_lossy(content));
            }
        }

        self.stream.write_all(b".\r\n").await?;
        if self.options.logs_transactions() {
            tracing::trace!(cid = self.cid, bytes = total, "C: <message data> .");
        }
        Ok(())
    }

    /// Best-effort RSET after a transaction was abandoned half way.
    async fn abort_transaction(&mut self) {
        if let Err(err) = self.command(&Command::Rset).await {
            tracing::debug!(cid = self.cid, error = %err, "RSET after failed transaction");
        }
    }

    pub(crate) async fn reset(&mut self) -> Result<()> {
        self.command(&Command::Rset)
            .await?
            .expect_success(ErrorCode::Protocol, "Could not reset session state")
            .map_err(|err| err.with_command("RSET"))?;
        Ok(())
    }

    /// Sends QUIT and waits for the reply. Failures are irrelevant at this
    /// point and only logged.
    pub(crate) async fn quit(&mut self) {
        if let Err(err) = self.command(&Command::Quit).await {
            tracing::warn!(cid = self.cid, error = %err, "QUIT failed");
        }
        self.stream.shutdown().await;
    }

    pub(crate) async fn shutdown(&mut self) {
        self.stream.shutdown().await;
    }

    async fn command(&mut self, command: &Command) -> Result<Reply> {
        if self.options.logs_transactions() {
            tracing::trace!(cid = self.cid, "C: {}", command.redacted());
        }
        self.stream
            .write_all(&command.serialize())
            .await
            .map_err(|err| err.with_command(command.verb()))?;
        self.read_reply(self.options.socket_timeout)
            .await
            .map_err(|err| err.with_command(command.verb()))
    }

    async fn read_reply(&mut self, timeout: std::time::Duration) -> Result<Reply> {
        let mut parser = ReplyParser::new();
        loop {
            let line = self.stream.read_line(timeout).await?;
            if self.options.logs_transactions() {
                tracing::trace!(cid = self.cid, "S: {line}");
            }
            if let Some(reply) = parser.feed(&line)? {
                return Ok(reply);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};

    use super::*;

    /// Scripted peer: answers every received line from `script` in order and
    /// records what the client sent.
    async fn peer(stream: DuplexStream, greeting: &str, script: Vec<(&'static str, &'static str)>) -> Vec<String> {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        write.write_all(greeting.as_bytes()).await.unwrap();

        let mut seen = Vec::new();
        let mut script = script.into_iter();
        let mut in_data = false;
        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(line.clone());
            if in_data {
                if line == "." {
                    in_data = false;
                    write.write_all(b"250 OK: queued\r\n").await.unwrap();
                }
                continue;
            }
            let Some((expected, reply)) = script.next() else { break };
            assert!(line.starts_with(expected), "expected {expected}, got {line}");
            in_data = expected == "DATA" && reply.starts_with("354");
            write.write_all(reply.as_bytes()).await.unwrap();
        }
        seen
    }

    fn options() -> ConnectionOptions {
        ConnectionOptions::builder("mx.example.com")
            .name("client.test")
            .socket_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    async fn session(
        script: Vec<(&'static str, &'static str)>,
        options: ConnectionOptions,
    ) -> (Result<Session>, tokio::task::JoinHandle<Vec<String>>) {
        let (client, server) = duplex(4096);
        let peer = tokio::spawn(peer(server, "220 mx.example.com ESMTP\r\n", script));
        let session = Session::establish(1, Arc::new(options), Some(Box::new(client))).await;
        (session, peer)
    }

    #[tokio::test]
    async fn plain_login_and_send() {
        let script = vec![
            ("EHLO client.test", "250-mx.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 SIZE 1000\r\n"),
            ("AUTH PLAIN", "235 Authentication successful\r\n"),
            ("MAIL FROM:<a@example.com> SIZE=14", "250 OK\r\n"),
            ("RCPT TO:<b@example.com>", "250 OK\r\n"),
            ("RCPT TO:<c@example.com>", "550 No such user\r\n"),
            ("DATA", "354 Go ahead\r\n"),
            ("QUIT", "221 Bye\r\n"),
        ];
        let (session, peer) = session(script, options()).await;
        let mut session = session.unwrap();

        session.authenticate(Credentials::password("user", "pass")).await.unwrap();
        let envelope = Envelope::parse("a@example.com", ["b@example.com", "c@example.com"])
            .unwrap()
            .with_size(14);
        let info = session.send(envelope, Message::from(".hidden\nbody\n")).await.unwrap();
        assert_eq!(info.accepted, vec!["b@example.com"]);
        assert_eq!(info.rejected, vec!["c@example.com"]);
        assert_eq!(info.rejected_errors[0].response_code, Some(550));
        assert_eq!(info.response, "250 OK: queued");
        session.quit().await;

        let seen = peer.await.unwrap();
        assert!(seen.contains(&"..hidden".to_string()));
        assert!(seen.contains(&"body".to_string()));
    }

    #[tokio::test]
    async fn falls_back_to_helo() {
        let script = vec![
            ("EHLO", "502 Command not implemented\r\n"),
            ("HELO client.test", "250 mx.example.com\r\n"),
        ];
        let (session, _peer) = session(script, options()).await;
        let session = session.unwrap();
        assert!(session.server().extensions.is_empty());
        assert!(!session.is_secure());
    }

    #[tokio::test]
    async fn rejected_login_is_auth_error() {
        let script = vec![
            ("EHLO", "250-mx.example.com\r\n250 AUTH LOGIN\r\n"),
            ("AUTH LOGIN", "334 VXNlcm5hbWU6\r\n"),
            ("dXNlcg==", "334 UGFzc3dvcmQ6\r\n"),
            ("d3Jvbmc=", "535 5.7.8 Authentication credentials invalid\r\n"),
        ];
        let (session, _peer) = session(script, options()).await;
        let err = session
            .unwrap()
            .authenticate(Credentials::password("user", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Auth);
        assert_eq!(err.response_code, Some(535));
        assert_eq!(err.command.as_deref(), Some("AUTH LOGIN"));
    }

    #[tokio::test]
    async fn required_tls_refused() {
        let script = vec![
            ("EHLO", "250 mx.example.com\r\n"),
            ("STARTTLS", "454 TLS not available\r\n"),
        ];
        let options = ConnectionOptions::builder("mx.example.com")
            .require_tls(true)
            .build()
            .unwrap();
        let (session, _peer) = session(script, options).await;
        let err = session.err().unwrap();
        assert_eq!(err.code, ErrorCode::Tls);
    }

    #[tokio::test]
    async fn opportunistic_tls_continues_in_plaintext() {
        let script = vec![
            ("EHLO", "250-mx.example.com\r\n250 STARTTLS\r\n"),
            ("STARTTLS", "454 TLS not available\r\n"),
        ];
        let options = ConnectionOptions::builder("mx.example.com")
            .opportunistic_tls(true)
            .build()
            .unwrap();
        let (session, _peer) = session(script, options).await;
        assert!(!session.unwrap().is_secure());
    }

    #[tokio::test]
    async fn all_recipients_rejected() {
        let script = vec![
            ("EHLO", "250 mx.example.com\r\n"),
            ("MAIL FROM:<a@example.com>", "250 OK\r\n"),
            ("RCPT TO:<b@example.com>", "550 No such user\r\n"),
            ("RSET", "250 OK\r\n"),
        ];
        let (session, _peer) = session(script, options()).await;
        let err = session
            .unwrap()
            .send(
                Envelope::parse("a@example.com", ["b@example.com"]).unwrap(),
                Message::from("x"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Envelope);
        assert_eq!(err.response.as_deref(), Some("550 No such user"));
    }

    #[tokio::test]
    async fn bad_greeting_is_connection_error() {
        let (client, server) = duplex(256);
        tokio::spawn(peer(server, "554 No SMTP service here\r\n", Vec::new()));
        let err = Session::establish(1, Arc::new(options()), Some(Box::new(client)))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::Connection);
        assert_eq!(err.response_code, Some(554));
    }
}
