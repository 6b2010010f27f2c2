// File: keeper/src/scheduler/operations.rs
use serde::Serialize;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Span};

use super::{decide, Decision, ServerConsole, SnapshotSink, WakeReason};
use crate::archive::{ArchivePipeline, ArchiveReceipt, SnapshotKind};
use crate::config::{Config, ServerDescriptor};
use crate::constants::rcon::{SAVE_ALL_COMMAND, SAVE_OFF_COMMAND, SAVE_ON_COMMAND};
use crate::errors::RconError;
use crate::rcon::retry::RetryConnect;
use crate::rcon::ControlChannel;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub user_check_interval: Duration,
    pub backup_interval: Duration,
    pub quiesce_saves: bool,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_check_interval: Duration::from_secs(config.scheduler.user_check_interval_seconds),
            backup_interval: Duration::from_secs(config.scheduler.backup_interval_seconds),
            quiesce_saves: config.scheduler.quiesce_saves,
        }
    }
}

/// What a single wake did, for logging and tests
#[derive(Debug, Clone, Serialize)]
pub struct WakeOutcome {
    pub reason: WakeReason,
    /// `None` when the user poll failed
    pub users: Option<u32>,
    pub decision: Option<Decision>,
    pub receipts: Vec<ArchiveReceipt>,
    pub failures: Vec<String>,
}

impl WakeOutcome {
    fn new(reason: WakeReason) -> Self {
        Self {
            reason,
            users: None,
            decision: None,
            receipts: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Private loop state, only touched from the loop itself
#[derive(Debug, Default)]
struct SchedulerState {
    last_user_count: u32,
    wakes: u64,
}

pub struct SnapshotScheduler<C, S> {
    console: C,
    sink: S,
    settings: SchedulerSettings,
    state: SchedulerState,
    span: Span,
}

/// Span carrying the structured context every scheduler event is logged with
pub fn scheduler_span(descriptor: &ServerDescriptor) -> Span {
    info_span!(
        "scheduler",
        user = %descriptor.user,
        server = %descriptor.server_name,
        rcon = %descriptor.rcon_address(),
        bucket = %descriptor.bucket,
    )
}

impl SnapshotScheduler<ControlChannel, ArchivePipeline> {
    /// Establish the control channel under `retry` and build a scheduler.
    ///
    /// Exhausting the retry policy here is fatal to the run.
    pub async fn connect(
        pipeline: ArchivePipeline,
        settings: SchedulerSettings,
        retry: &RetryConnect,
    ) -> Result<Self, RconError> {
        let descriptor = pipeline.descriptor();
        let span = scheduler_span(descriptor);
        let console = retry
            .connect(
                &descriptor.public_ip,
                descriptor.rcon_port,
                &descriptor.rcon_password,
            )
            .await?;
        Ok(Self::new(console, pipeline, settings, span))
    }
}

impl<C: ServerConsole, S: SnapshotSink> SnapshotScheduler<C, S> {
    pub fn new(console: C, sink: S, settings: SchedulerSettings, span: Span) -> Self {
        Self {
            console,
            sink,
            settings,
            state: SchedulerState::default(),
            span,
        }
    }

    pub fn last_user_count(&self) -> u32 {
        self.state.last_user_count
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Captures run inline, so a slow capture delays the next wake of both
    /// timers. Cancellation is only observed between wakes; an in-flight
    /// capture always finishes.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let start = Instant::now();
        let user_period = self.settings.user_check_interval;
        let backup_period = self.settings.backup_interval;

        let mut user_check = interval_at(start + user_period, user_period);
        user_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backup = interval_at(start + backup_period, backup_period);
        backup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            parent: &self.span,
            user_check_secs = user_period.as_secs(),
            backup_secs = backup_period.as_secs(),
            quiesce = self.settings.quiesce_saves,
            "Scheduler started"
        );

        loop {
            let reason = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(parent: &self.span, wakes = self.state.wakes, "Scheduler stopping");
                    break;
                }
                _ = user_check.tick() => WakeReason::NewUserTick,
                _ = backup.tick() => WakeReason::BackupTick,
            };
            self.handle_wake(reason).await;
        }
    }

    /// Evaluate one wake: poll, decide, capture.
    #[instrument(parent = &self.span, skip(self, reason), fields(wake = %reason))]
    pub async fn handle_wake(&mut self, reason: WakeReason) -> WakeOutcome {
        self.state.wakes += 1;
        let mut outcome = WakeOutcome::new(reason);
        debug!(parent: &self.span, wake = %reason, count = self.state.wakes, "Scheduler woke");

        let users = match self.console.number_of_users().await {
            Ok(users) => users,
            Err(e) => {
                error!(
                    parent: &self.span,
                    wake = %reason,
                    "Can't get the number of users from the server: {}",
                    e
                );
                outcome.failures.push(e.to_string());
                if e.is_retryable() {
                    self.try_reconnect().await;
                }
                return outcome;
            }
        };

        let previous = self.state.last_user_count;
        let decision = decide(reason, users, previous);
        outcome.users = Some(users);
        outcome.decision = Some(decision);

        match decision {
            Decision::NoUsers => {
                info!(parent: &self.span, wake = %reason, "No users on server, skipping archive")
            }
            Decision::NoChanges => {
                info!(parent: &self.span, wake = %reason, users, "No changes in users, skipping archive")
            }
            Decision::UsersChanged => info!(
                parent: &self.span,
                wake = %reason,
                previous,
                users,
                "User count changed, archiving"
            ),
            Decision::PeriodicBackup => {
                info!(parent: &self.span, wake = %reason, users, "Periodic backup")
            }
        }

        let kinds = decision.captures();
        if !kinds.is_empty() {
            self.capture_all(kinds, &mut outcome).await;
        }

        self.state.last_user_count = users;
        outcome
    }

    async fn capture_all(&mut self, kinds: &[SnapshotKind], outcome: &mut WakeOutcome) {
        if self.settings.quiesce_saves {
            if let Err(e) = pause_saves(&mut self.console).await {
                error!(parent: &self.span, "Could not pause saves, skipping archive: {}", e);
                outcome.failures.push(e.to_string());
                resume_saves(&mut self.console, &self.span).await;
                return;
            }
        }

        for &kind in kinds {
            match self.sink.capture(kind).await {
                Ok(receipt) => {
                    info!(
                        parent: &self.span,
                        kind = %kind,
                        key = %receipt.stored_key,
                        etag = receipt.etag.as_deref().unwrap_or("----"),
                        "Archive captured"
                    );
                    outcome.receipts.push(receipt);
                }
                Err(e) => {
                    error!(
                        parent: &self.span,
                        kind = %kind,
                        "Error creating an archive and publishing: {}",
                        e
                    );
                    outcome.failures.push(format!("{}: {}", kind, e));
                }
            }
        }

        if self.settings.quiesce_saves {
            resume_saves(&mut self.console, &self.span).await;
        }
    }

    /// One reconnect attempt; a failure waits for the next tick.
    async fn try_reconnect(&mut self) {
        match self.console.reconnect().await {
            Ok(()) => info!(parent: &self.span, "Reconnected to server"),
            Err(e) => warn!(
                parent: &self.span,
                "Reconnect failed, will retry on the next tick: {}",
                e
            ),
        }
    }
}

/// Stop the server writing world files and flush pending changes.
pub async fn pause_saves<C: ServerConsole + ?Sized>(console: &mut C) -> Result<(), RconError> {
    console.send(SAVE_OFF_COMMAND).await?;
    console.send(SAVE_ALL_COMMAND).await?;
    Ok(())
}

/// Re-enable saving. Failures are logged, never propagated.
pub async fn resume_saves<C: ServerConsole + ?Sized>(console: &mut C, span: &Span) {
    if let Err(e) = console.send(SAVE_ON_COMMAND).await {
        warn!(parent: span, "Could not re-enable saves on the server: {}", e);
    }
}
