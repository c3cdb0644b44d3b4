//! Timer-driven posting loop
//!
//! Sleep for the current interval, generate and publish, repeat. The interval is
//! re-read from [`AgentRuntime`] every cycle so `!set-interval` applies without a
//! restart. Failures never end the loop.

use crate::pipeline::PostPipeline;
use crate::runtime::AgentRuntime;
use murmur_core::config::PostingSection;
use murmur_core::{MurmurError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct PostingLoop {
    pipeline: Arc<PostPipeline>,
    runtime: Arc<AgentRuntime>,
    min_interval: Duration,
    recovery_delay: Duration,
}

impl PostingLoop {
    pub fn new(pipeline: Arc<PostPipeline>) -> Self {
        let runtime = pipeline.runtime().clone();
        Self {
            pipeline,
            runtime,
            min_interval: DEFAULT_MIN_INTERVAL,
            recovery_delay: DEFAULT_RECOVERY_DELAY,
        }
    }

    pub fn from_config(pipeline: Arc<PostPipeline>, section: &PostingSection) -> Self {
        Self::new(pipeline)
            .with_min_interval(Duration::from_secs(section.min_interval_seconds))
            .with_recovery_delay(Duration::from_secs(section.recovery_delay_secs))
    }

    /// Spam floor for [`PostingLoop::set_interval`]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Pause after a failed cycle
    pub fn with_recovery_delay(mut self, recovery_delay: Duration) -> Self {
        self.recovery_delay = recovery_delay;
        self
    }

    /// Run until [`PostingLoop::stop`] is called
    pub async fn run(&self) {
        let mut running = self.runtime.subscribe_running();
        info!(
            "Posting loop started (every {} min)",
            self.runtime.interval().as_secs() / 60
        );

        let mut cycle: u64 = 0;
        while self.runtime.is_running() {
            // Read fresh every cycle
            let interval = self.runtime.interval();
            if !self.sleep_while_running(&mut running, interval).await {
                break;
            }

            cycle += 1;
            match self.pipeline.generate_and_post(None).await {
                Ok(receipt) => {
                    info!(cycle, attempts = receipt.attempts, "Scheduled post published");
                }
                Err(e) => {
                    error!(cycle, "Scheduled post failed: {}", e);
                    info!("Retrying in {}s", self.recovery_delay.as_secs());
                    if !self.sleep_while_running(&mut running, self.recovery_delay).await {
                        break;
                    }
                }
            }
        }

        info!("Posting loop stopped");
    }

    /// Ask the loop to exit; an in-progress sleep is interrupted
    pub fn stop(&self) {
        info!("Stopping posting loop");
        self.runtime.set_running(false);
    }

    /// Change the posting interval, effective from the next sleep
    ///
    /// # Errors
    ///
    /// [`MurmurError::InvalidInterval`] when the interval is under the spam floor;
    /// the previous interval is kept.
    pub fn set_interval(&self, minutes: u64) -> Result<()> {
        let interval = Duration::from_secs(minutes.saturating_mul(60));
        if interval < self.min_interval {
            return Err(MurmurError::InvalidInterval(format!(
                "{} minutes is below the minimum of {} seconds",
                minutes,
                self.min_interval.as_secs()
            )));
        }

        self.runtime.store_interval(interval);
        info!("Posting interval changed to {} minutes", minutes);
        Ok(())
    }

    /// Sleep for `duration` unless stopped first; returns whether still running
    async fn sleep_while_running(
        &self,
        running: &mut watch::Receiver<bool>,
        duration: Duration,
    ) -> bool {
        let stopped = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = running.wait_for(|r| !*r) => true,
        };
        !stopped && self.runtime.is_running()
    }
}
