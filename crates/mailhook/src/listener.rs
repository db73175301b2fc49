//! Polling session controller.
//!
//! One [`Listener::start`] call owns one server session:
//!
//! ```text
//! Idle ──► Connecting ──► Authenticating ──► Polling ──┐
//!              │                │              ▲       │ select, search,
//!              │                │              └───────┘ fetch + dispatch, sleep
//!              ▼                ▼                      │
//!           Stopped ◄──── logout ◄──────────────────────┘ stop / interrupt / error
//! ```
//!
//! [`StopHandle::stop`] is honored between cycles, so a fetch or handler
//! that is already running completes. [`StopHandle::interrupt`] also
//! abandons the protocol step in flight. Either way the session is logged
//! out before `start` returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use crate::assemble::assemble;
use crate::attachment::AttachmentExtractor;
use crate::config::{FailurePolicy, ListenerConfig};
use crate::error::{Error, Result};
use crate::handler::HandlerRegistry;
use crate::record::EmailRecord;
use crate::transport::{Connector, MailSession, TransportError};

/// Lifecycle of a listener session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started yet.
    Idle,
    /// Opening the connection.
    Connecting,
    /// Logging in.
    Authenticating,
    /// Running poll cycles.
    Polling,
    /// Finished; the session has been closed.
    Stopped,
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: AtomicBool,
    interrupted: AtomicBool,
    notify: Notify,
}

/// Cloneable handle that ends a running listener.
///
/// A request made while no run is active applies to the next
/// [`Listener::start`], which then returns at once. Requests are cleared
/// when `start` returns, so the listener can be started again.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    /// Requests a normal stop. `start` then returns `Ok(())`.
    pub fn stop(&self) {
        self.signal.stopped.store(true, Ordering::SeqCst);
        self.signal.notify.notify_waiters();
    }

    /// Requests a stop on behalf of the user. `start` then returns
    /// [`Error::UserStopped`].
    ///
    /// Unlike [`Self::stop`], the step in flight is abandoned.
    pub fn interrupt(&self) {
        self.signal.interrupted.store(true, Ordering::SeqCst);
        self.signal.notify.notify_waiters();
    }

    /// Returns true once either request has been made.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.signal.stopped.load(Ordering::SeqCst) || self.signal.interrupted.load(Ordering::SeqCst)
    }

    /// The result `start` should return, if a request is pending.
    fn pending_exit(&self) -> Option<Result<()>> {
        if self.signal.interrupted.load(Ordering::SeqCst) {
            Some(Err(Error::UserStopped))
        } else if self.signal.stopped.load(Ordering::SeqCst) {
            Some(Ok(()))
        } else {
            None
        }
    }

    fn reset(&self) {
        self.signal.stopped.store(false, Ordering::SeqCst);
        self.signal.interrupted.store(false, Ordering::SeqCst);
    }

    /// Sleeps for `duration` or until a request arrives.
    async fn sleep(&self, duration: Duration) {
        // Registered before the flag check so a request in between is not lost.
        let notified = self.signal.notify.notified();
        if self.is_stopped() {
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = notified => {}
        }
    }

    /// Resolves once an interrupt has been requested.
    async fn interrupted(&self) {
        loop {
            let notified = self.signal.notify.notified();
            if self.signal.interrupted.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Polls a mailbox and hands every new email to the registered handlers.
#[derive(Debug)]
pub struct Listener<C> {
    config: ListenerConfig,
    connector: C,
    extractor: AttachmentExtractor,
    handlers: HandlerRegistry,
    stop: StopHandle,
    state: watch::Sender<SessionState>,
}

impl<C: Connector> Listener<C> {
    /// Validates the configuration and prepares the download directory.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid.
    /// - [`Error::DownloadDir`] if the download directory cannot be created.
    pub async fn new(config: ListenerConfig, connector: C) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download_dir)
            .await
            .map_err(|source| Error::DownloadDir {
                path: config.download_dir.clone(),
                source,
            })?;

        let extractor = AttachmentExtractor::new(
            config.download_dir.clone(),
            config.accepted_extensions.clone(),
        );
        let (state, _) = watch::channel(SessionState::Idle);

        Ok(Self {
            config,
            connector,
            extractor,
            handlers: HandlerRegistry::new(),
            stop: StopHandle::default(),
            state,
        })
    }

    /// Registers a handler. Handlers run in registration order.
    pub fn on_new_email<F>(&mut self, handler: F)
    where
        F: Fn(&EmailRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.register(handler);
    }

    /// Returns a handle that can stop [`Self::start`] from elsewhere.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Subscribes to session state changes.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The configuration this listener was built with.
    #[must_use]
    pub const fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Connects, logs in and polls every `interval` until stopped.
    ///
    /// The session is logged out on every exit path once connected; logout
    /// failures are only logged. Pending stop requests are cleared on
    /// return, so the same listener may be started again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UserStopped`] after [`StopHandle::interrupt`], or the
    /// error of the step that failed. Returns `Ok(())` after
    /// [`StopHandle::stop`].
    pub async fn start(&self, interval: Duration) -> Result<()> {
        let result = self.serve(interval).await;
        self.stop.reset();
        self.set_state(SessionState::Stopped);

        match &result {
            Ok(()) => info!("listener stopped"),
            Err(Error::UserStopped) => warn!("listener interrupted by user"),
            Err(e) => warn!("listener ended: {e}"),
        }
        result
    }

    async fn serve(&self, interval: Duration) -> Result<()> {
        if let Some(exit) = self.stop.pending_exit() {
            return exit;
        }

        self.set_state(SessionState::Connecting);
        let connecting = self.connector.connect(&self.config.server, self.config.port);
        let mut session = tokio::select! {
            session = connecting => session.map_err(Error::Connection)?,
            () = self.stop.interrupted() => return Err(Error::UserStopped),
        };

        let result = tokio::select! {
            result = self.run(&mut session, interval) => result,
            () = self.stop.interrupted() => Err(Error::UserStopped),
        };

        // An abandoned step may leave the server unresponsive.
        match tokio::time::timeout(self.config.connect_timeout, session.logout()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("logout failed: {e}"),
            Err(_) => debug!("logout timed out"),
        }
        result
    }

    async fn run(&self, session: &mut C::Session, interval: Duration) -> Result<()> {
        self.set_state(SessionState::Authenticating);
        session
            .authenticate(&self.config.address, &self.config.secret)
            .await
            .map_err(Error::Authentication)?;

        self.set_state(SessionState::Polling);
        loop {
            if let Some(exit) = self.stop.pending_exit() {
                return exit;
            }
            self.poll_cycle(session).await?;
            self.stop.sleep(interval).await;
        }
    }

    async fn poll_cycle(&self, session: &mut C::Session) -> Result<()> {
        let mailbox = self.config.mailbox.as_str();
        let criterion = self.config.search_criterion.as_str();

        self.attempt("select", async || session.select(mailbox).await)
            .await
            .map_err(|source| Error::Mailbox {
                mailbox: mailbox.to_string(),
                source,
            })?;

        let ids = self
            .attempt("search", async || session.search(criterion).await)
            .await
            .map_err(Error::Search)?;
        debug!(mailbox, criterion, count = ids.len(), "poll cycle");

        for id in ids {
            let raw = self
                .attempt("fetch", async || session.fetch(id).await)
                .await
                .map_err(|source| Error::Fetch { id, source })?;

            let record = assemble(&raw, &self.extractor).await?;
            info!(
                id,
                title = %record.title,
                sender = %record.sender,
                attachments = record.attachment_paths.len(),
                "new email"
            );

            self.handlers.dispatch(&record, self.config.handler_failure)?;
        }

        Ok(())
    }

    /// Runs a protocol step under the configured [`FailurePolicy`].
    async fn attempt<T>(
        &self,
        step: &'static str,
        mut op: impl AsyncFnMut() -> std::result::Result<T, TransportError>,
    ) -> std::result::Result<T, TransportError> {
        let (retries, backoff) = match self.config.failure_policy {
            FailurePolicy::Abort => (0, Duration::ZERO),
            FailurePolicy::Retry { attempts, backoff } => (attempts, backoff),
        };

        let mut failures = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if failures < retries => {
                    failures += 1;
                    warn!(step, failures, "step failed, retrying: {e}");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "session state changed");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_wakes_on_stop() {
        let handle = StopHandle::default();
        let waker = handle.clone();

        let start = tokio::time::Instant::now();
        tokio::join!(handle.sleep(Duration::from_secs(3600)), async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            waker.stop();
        });

        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert!(matches!(handle.pending_exit(), Some(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_full_interval() {
        let handle = StopHandle::default();
        let start = tokio::time::Instant::now();
        handle.sleep(Duration::from_secs(5)).await;

        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(handle.pending_exit().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_ignores_plain_stop() {
        let handle = StopHandle::default();
        let other = handle.clone();

        let start = tokio::time::Instant::now();
        tokio::join!(handle.interrupted(), async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            other.stop();
            tokio::time::sleep(Duration::from_secs(1)).await;
            other.interrupt();
        });

        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn test_reset_clears_requests() {
        let handle = StopHandle::default();
        handle.interrupt();
        handle.reset();

        assert!(!handle.is_stopped());
        assert!(handle.pending_exit().is_none());
    }

    #[test]
    fn test_interrupt_wins_over_stop() {
        let handle = StopHandle::default();
        handle.stop();
        handle.interrupt();

        assert!(handle.is_stopped());
        assert!(matches!(handle.pending_exit(), Some(Err(Error::UserStopped))));
    }
}
