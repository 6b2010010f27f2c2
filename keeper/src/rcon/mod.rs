//! Remote console (RCON) client for the game server
//!
//! A `ControlChannel` owns at most one TCP session to the server's RCON port.
//! Every request/response exchange is bounded by a deadline; any transport
//! failure or timeout drops the session so the next call fails fast with
//! `NotConnected` instead of reusing a dead socket.

pub mod packet;
pub mod retry;

pub use retry::{connect_with_retry, RetryConnect, RetryPolicy};

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info_span, warn, Span};

use crate::constants::rcon as consts;
use crate::errors::RconError;
use packet::{Packet, AUTH_FAILED_ID, PACKET_AUTH_RESPONSE, PACKET_COMMAND, PACKET_LOGIN};

pub struct ControlChannel {
    host: String,
    port: u16,
    password: String,
    timeout: Duration,
    stream: Option<TcpStream>,
    next_request_id: i32,
    span: Span,
}

impl ControlChannel {
    /// Open a session and authenticate with `password`.
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, RconError> {
        let mut channel = Self {
            host: host.to_string(),
            port,
            password: password.to_string(),
            timeout,
            stream: None,
            next_request_id: 1,
            span: info_span!("rcon", server = %host, port = port),
        };
        channel.open().await?;
        Ok(channel)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True iff a socket is held. Does not probe liveness.
    pub fn has_connection(&self) -> bool {
        self.stream.is_some()
    }

    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!(parent: &self.span, "Dropped RCON connection");
        }
    }

    /// Close any existing session and open a fresh one.
    pub async fn reconnect(&mut self) -> Result<(), RconError> {
        self.disconnect();
        self.open().await
    }

    async fn open(&mut self) -> Result<(), RconError> {
        let address = self.address();
        let login_id = self.take_request_id();
        let password = self.password.clone();

        let handshake = async {
            let mut stream =
                TcpStream::connect(&address)
                    .await
                    .map_err(|e| RconError::ConnectFailed {
                        address: address.clone(),
                        reason: e.to_string(),
                    })?;

            let io_err = |e: std::io::Error| RconError::ConnectFailed {
                address: address.clone(),
                reason: e.to_string(),
            };

            Packet::new(login_id, PACKET_LOGIN, password)
                .write_to(&mut stream)
                .await
                .map_err(io_err)?;

            // Some servers send an empty response packet ahead of the auth result
            loop {
                let reply = Packet::read_from(&mut stream).await.map_err(io_err)?;
                if reply.kind != PACKET_AUTH_RESPONSE {
                    continue;
                }
                if reply.request_id == AUTH_FAILED_ID {
                    return Err(RconError::AuthFailed {
                        address: address.clone(),
                    });
                }
                return Ok(stream);
            }
        };

        let stream = match tokio::time::timeout(self.timeout, handshake).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RconError::ConnectFailed {
                    address,
                    reason: format!("handshake timed out after {}s", self.timeout.as_secs()),
                })
            }
        };

        debug!(parent: &self.span, "Connected to RCON at {}", address);
        self.stream = Some(stream);
        Ok(())
    }

    fn take_request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id = if id >= i32::MAX - 1 { 1 } else { id + 1 };
        id
    }

    /// Send one command and wait for its reply.
    pub async fn send(&mut self, command: &str) -> Result<String, RconError> {
        let request_id = self.take_request_id();
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(RconError::NotConnected)?;

        let exchange = async {
            Packet::new(request_id, PACKET_COMMAND, command)
                .write_to(stream)
                .await?;
            let reply = Packet::read_from(stream).await?;
            if reply.request_id != request_id {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "reply id {} does not match request id {}",
                        reply.request_id, request_id
                    ),
                ));
            }
            Ok(reply.body)
        };

        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(e)) => Err(RconError::TransportFailed {
                command: command.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(RconError::Timeout {
                command: command.to_string(),
                seconds: timeout.as_secs(),
            }),
        };

        if let Err(e) = &result {
            warn!(parent: &self.span, "RCON exchange failed, dropping connection: {}", e);
            self.stream = None;
        }
        result
    }

    pub async fn list(&mut self) -> Result<String, RconError> {
        self.send(consts::LIST_COMMAND).await
    }

    pub async fn save_on(&mut self) -> Result<String, RconError> {
        self.send(consts::SAVE_ON_COMMAND).await
    }

    pub async fn save_off(&mut self) -> Result<String, RconError> {
        self.send(consts::SAVE_OFF_COMMAND).await
    }

    pub async fn save_all(&mut self) -> Result<String, RconError> {
        self.send(consts::SAVE_ALL_COMMAND).await
    }

    pub async fn number_of_users(&mut self) -> Result<u32, RconError> {
        let reply = self.list().await?;
        parse_number_of_users(&reply)
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn users_regex() -> &'static Regex {
    static USERS: OnceLock<Regex> = OnceLock::new();
    USERS.get_or_init(|| Regex::new(consts::USERS_PATTERN).expect("users pattern is valid"))
}

fn formatting_regex() -> &'static Regex {
    static FORMATTING: OnceLock<Regex> = OnceLock::new();
    FORMATTING.get_or_init(|| Regex::new("§.").expect("formatting pattern is valid"))
}

/// Remove `§x` colour and style codes from a server reply
pub fn strip_formatting(reply: &str) -> String {
    formatting_regex().replace_all(reply, "").into_owned()
}

/// Extract `<N>` from `There are <N>/<M> players online...`
pub fn parse_number_of_users(reply: &str) -> Result<u32, RconError> {
    let clean = strip_formatting(reply);
    let captures = users_regex()
        .captures(&clean)
        .ok_or_else(|| RconError::ParseFailed {
            reply: reply.to_string(),
            reason: format!("no match for \"{}\"", consts::USERS_PATTERN),
        })?;

    captures[1]
        .parse::<u32>()
        .map_err(|e| RconError::ParseFailed {
            reply: reply.to_string(),
            reason: format!("user count \"{}\": {}", &captures[1], e),
        })
}
