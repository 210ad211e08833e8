//! Scanner polling
//!
//! The [`Producer`] is the one task that drives the pipeline from the radio
//! side. It asks its [`SignalSource`] for a scan, applies the result and
//! sleeps until the next poll. A failed poll is logged and retried after a
//! back-off; the last known state is left as it was.
//!
//! Shutdown is checked between iterations. Applying a scan happens under the
//! monitor's lock without any await point, so it always runs to completion.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::sleep;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::{ServerError, Session};

mod simulator;

pub use simulator::Simulator;

/// Wait after a failed poll before trying again
pub const ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Outcome of one scan cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Scan {
    Found { signal: i32, address: String },
    /// The cycle completed but the tracked device was not heard
    Absent,
}

/// A single poll cycle failed. Never fatal.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("scanner unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Backend that supplies raw signal readings, real radio or simulated.
#[async_trait]
pub trait SignalSource: Send {
    fn name(&self) -> &str;

    async fn poll(&mut self) -> Result<Scan, SourceError>;
}

pub struct Producer {
    session: Session,
    source: Box<dyn SignalSource>,
    interval: Duration,
    backoff: Duration,
}

impl Producer {
    pub fn new(session: Session, source: Box<dyn SignalSource>, interval: Duration) -> Self {
        Producer {
            session,
            source,
            interval,
            backoff: ERROR_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Poll once and apply the result. Returns how long to wait before the
    /// next poll.
    pub async fn step(&mut self) -> Duration {
        match self.source.poll().await {
            Ok(scan) => {
                self.apply(scan);
                self.interval
            }
            Err(e) => {
                log::error!(
                    "{}: {} poll failed: {}, retrying in {:?}",
                    self.session.key(),
                    self.source.name(),
                    e,
                    self.backoff
                );
                self.backoff
            }
        }
    }

    fn apply(&self, scan: Scan) {
        match scan {
            Scan::Found { signal, address } => {
                let events = self.session.apply_signal(signal, &address);
                log::debug!(
                    "{}: {} dBm from {}, {} events",
                    self.session.key(),
                    signal,
                    address,
                    events.len()
                );
            }
            Scan::Absent => {
                if !self.session.mark_absent().is_empty() {
                    log::info!("{}: not seen in last scan", self.session.key());
                }
            }
        }
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), ServerError> {
        log::info!(
            "{}: polling {} every {:?}",
            self.session.key(),
            self.source.name(),
            self.interval
        );

        loop {
            let delay = tokio::select! {
                _ = subsys.on_shutdown_requested() => break,
                delay = self.step() => delay,
            };

            tokio::select! {
                _ = subsys.on_shutdown_requested() => break,
                _ = sleep(delay) => {}
            }
        }

        log::info!("{}: producer stopped", self.session.key());
        Ok(())
    }
}
