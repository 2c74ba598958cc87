use std::time::Duration;

use crate::image::transfer_budget;
use crate::info::Resolution;
use crate::port::OpenOptions;

/// Connection and timing parameters of a [`ScribblerDriver`](super::ScribblerDriver).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub baudrate: u32,
    /// Open even if another process holds the device
    pub force: bool,
    pub open_attempts: usize,
    pub open_backoff: Duration,
    /// Transport read timeout while the port is being opened
    pub open_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Quiet period that ends the stale-input drain before the handshake
    pub drain_quiet: Duration,
    /// Pause between the two identification queries
    pub settle_delay: Duration,
    pub command_timeout: Duration,
    /// Extra attempts for queries that time out
    pub retries: usize,
    pub image_chunk_timeout: Duration,
    /// Whole-frame deadline; derived from the baud rate when unset
    pub image_deadline: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let open = OpenOptions::default();
        Self {
            baudrate: open.baudrate,
            force: open.force,
            open_attempts: open.attempts,
            open_backoff: open.backoff,
            open_timeout: open.timeout,
            handshake_timeout: Duration::from_secs(4),
            drain_quiet: Duration::from_millis(500),
            settle_delay: Duration::from_millis(100),
            command_timeout: Duration::from_secs(1),
            retries: 0,
            image_chunk_timeout: Duration::from_millis(10),
            image_deadline: None,
        }
    }
}

impl DriverConfig {
    pub fn with_baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = baudrate;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_image_deadline(mut self, deadline: Duration) -> Self {
        self.image_deadline = Some(deadline);
        self
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            baudrate: self.baudrate,
            force: self.force,
            attempts: self.open_attempts,
            backoff: self.open_backoff,
            timeout: self.open_timeout,
        }
    }

    pub fn image_deadline_for(&self, resolution: Resolution) -> Duration {
        self.image_deadline
            .unwrap_or_else(|| transfer_budget(resolution.pixels(), self.baudrate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.baudrate, 38400);
        assert_eq!(config.open_attempts, 3);
        assert_eq!(config.handshake_timeout, Duration::from_secs(4));
        assert_eq!(config.drain_quiet, Duration::from_millis(500));
        assert_eq!(config.command_timeout, Duration::from_secs(1));
        assert_eq!(config.image_chunk_timeout, Duration::from_millis(10));
        assert!(config.image_deadline.is_none());
    }

    #[test]
    fn open_options_follow_config() {
        let options = DriverConfig::default()
            .with_baudrate(9600)
            .with_force(true)
            .open_options();
        assert_eq!(options.baudrate, 9600);
        assert!(options.force);
        assert_eq!(options.timeout, Duration::from_secs(10));
    }

    #[test]
    fn image_deadline_override() {
        let config = DriverConfig::default();
        assert_eq!(
            config.image_deadline_for(Resolution::LOW),
            transfer_budget(Resolution::LOW.pixels(), 38400)
        );

        let config = config.with_image_deadline(Duration::from_secs(3));
        assert_eq!(
            config.image_deadline_for(Resolution::HIGH),
            Duration::from_secs(3)
        );
    }
}
