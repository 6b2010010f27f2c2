// File: keeper/src/rcon/retry.rs
//! Fixed-delay connect retry for a server that may still be starting up

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use super::ControlChannel;
use crate::config::Config;
use crate::constants::rcon::UNBOUNDED_BATCH_SIZE;
use crate::errors::RconError;

/// How many times to retry after the first failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// `Bounded(n)` makes at most `n + 1` attempts; `Bounded(0)` tries once
    Bounded(u32),
    /// Keep trying in batches until an attempt succeeds
    Unbounded,
}

/// Reusable connect policy: retry budget, fixed delay and per-attempt deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConnect {
    pub policy: RetryPolicy,
    pub delay: Duration,
    pub timeout: Duration,
}

impl RetryConnect {
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: config.retry_policy(),
            delay: config.retry_delay(),
            timeout: config.rcon_timeout(),
        }
    }

    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        password: &str,
    ) -> Result<ControlChannel, RconError> {
        connect_with_retry(host, port, password, self.timeout, self.policy, self.delay).await
    }
}

/// Connect to the RCON port, sleeping `delay` between failed attempts.
#[instrument(skip(password, timeout), fields(address = %format!("{}:{}", host, port)))]
pub async fn connect_with_retry(
    host: &str,
    port: u16,
    password: &str,
    timeout: Duration,
    policy: RetryPolicy,
    delay: Duration,
) -> Result<ControlChannel, RconError> {
    let channel = retry(policy, delay, || {
        ControlChannel::connect(host, port, password, timeout)
    })
    .await
    .map_err(|(attempts, last_error)| RconError::RetryExhausted {
        address: format!("{}:{}", host, port),
        attempts,
        last_error: last_error.to_string(),
    });

    match &channel {
        Ok(_) => info!("RCON connection established"),
        Err(e) => error!("{}", e),
    }
    channel
}

/// Drive `attempt` under `policy`. On exhaustion returns the number of
/// attempts made and the last error seen.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    delay: Duration,
    mut attempt: F,
) -> Result<T, (u64, E)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match policy {
        RetryPolicy::Bounded(retries) => bounded(retries, delay, &mut attempt, 0).await,
        RetryPolicy::Unbounded => {
            let mut batch = 0u64;
            let mut made = 0u64;
            loop {
                match bounded(UNBOUNDED_BATCH_SIZE - 1, delay, &mut attempt, made).await {
                    Ok(value) => return Ok(value),
                    Err((attempts, e)) => {
                        made = attempts;
                        batch += 1;
                        debug!(
                            batch,
                            attempts = made,
                            "Continuing to try to connect: {}",
                            e
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

async fn bounded<T, E, F, Fut>(
    retries: u32,
    delay: Duration,
    attempt: &mut F,
    already_made: u64,
) -> Result<T, (u64, E)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let total = u64::from(retries) + 1;
    let mut made = already_made;
    let mut tried = 0u64;
    loop {
        made += 1;
        tried += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(attempt = made, "Connect attempt failed: {}", e);
                if tried >= total {
                    return Err((made, e));
                }
                tokio::time::sleep(delay).await;
            }
        }
    }
}
