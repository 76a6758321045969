//! Command-line configuration

use crate::input::ReleaseBehavior;
use crate::network::TransportConfig;
use crate::retry::{ExponentialBackoff, FixedDelay};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backoff {
    /// Wait the same delay before every reconnect
    Fixed,
    /// Double the delay after each failed reconnect, with jitter
    Exponential,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// WebSocket endpoint of the game server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    pub server: String,

    /// Display name sent with the join request
    #[arg(short = 'u', long, default_value = "player")]
    pub username: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    pub width: u32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    pub height: u32,

    /// World width in world units
    #[arg(long, default_value_t = shared::WORLD_WIDTH)]
    pub world_width: f32,

    /// World height in world units
    #[arg(long, default_value_t = shared::WORLD_HEIGHT)]
    pub world_height: f32,

    /// Background image covering the whole world
    #[arg(short = 'b', long, default_value = "assets/background.png")]
    pub background: PathBuf,

    /// Seconds to wait for the connection to open before reporting a timeout
    #[arg(long, default_value = "10")]
    pub connect_timeout: f32,

    /// Seconds to wait before reconnecting (base delay for exponential backoff)
    #[arg(long, default_value = "3")]
    pub reconnect_delay: f32,

    /// Reconnect delay policy
    #[arg(long, value_enum, default_value = "fixed")]
    pub backoff: Backoff,

    /// Give up after this many consecutive failed reconnects (exponential only)
    #[arg(long)]
    pub max_reconnects: Option<u32>,

    /// On key release, resume a direction that is still held instead of stopping
    #[arg(long)]
    pub resume_held_direction: bool,
}

/// Validated settings derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    pub username: String,
    pub window_size: (u32, u32),
    pub world_size: (f32, f32),
    pub background: PathBuf,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub backoff: Backoff,
    pub max_reconnects: Option<u32>,
    pub release: ReleaseBehavior,
}

impl Args {
    pub fn into_config(self) -> ClientConfig {
        ClientConfig {
            server: self.server,
            username: self.username,
            window_size: (self.width.max(1), self.height.max(1)),
            world_size: (self.world_width.max(1.0), self.world_height.max(1.0)),
            background: self.background,
            connect_timeout: seconds(self.connect_timeout),
            reconnect_delay: seconds(self.reconnect_delay),
            backoff: self.backoff,
            max_reconnects: self.max_reconnects,
            release: if self.resume_held_direction {
                ReleaseBehavior::ResumeHeld
            } else {
                ReleaseBehavior::StopOnAnyRelease
            },
        }
    }
}

fn seconds(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::ZERO)
}

impl ClientConfig {
    pub fn transport(&self) -> TransportConfig {
        let config = TransportConfig::new(&self.server, &self.username)
            .with_connect_timeout(self.connect_timeout);

        match self.backoff {
            Backoff::Fixed => config.with_retry_policy(FixedDelay::new(self.reconnect_delay)),
            Backoff::Exponential => {
                let mut policy =
                    ExponentialBackoff::new(self.reconnect_delay, Duration::from_secs(60))
                        .with_jitter();
                if let Some(max) = self.max_reconnects {
                    policy = policy.with_max_attempts(max);
                }
                config.with_retry_policy(policy)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Args::try_parse_from(["client"]).unwrap().into_config();
        assert_eq!(config.server, "ws://127.0.0.1:8080");
        assert_eq!(config.window_size, (800, 600));
        assert_eq!(config.world_size, (2048.0, 2048.0));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.release, ReleaseBehavior::StopOnAnyRelease);

        let transport = config.transport();
        assert_eq!(transport.username, "player");
        assert_eq!(transport.retry_policy.delay(1), Duration::from_secs(3));
        assert_eq!(transport.retry_policy.delay(9), Duration::from_secs(3));
        assert_eq!(transport.retry_policy.max_attempts(), None);
    }

    #[test]
    fn test_exponential_backoff_flags() {
        let config = Args::try_parse_from([
            "client",
            "--backoff",
            "exponential",
            "--reconnect-delay",
            "0.5",
            "--max-reconnects",
            "4",
            "--resume-held-direction",
        ])
        .unwrap()
        .into_config();

        assert_eq!(config.release, ReleaseBehavior::ResumeHeld);
        let transport = config.transport();
        assert_eq!(transport.retry_policy.max_attempts(), Some(4));
        assert!(transport.retry_policy.delay(3) <= Duration::from_secs(2));
    }

    #[test]
    fn test_negative_durations_clamp_to_zero() {
        let config = Args::try_parse_from(["client", "--reconnect-delay=-2"])
            .unwrap()
            .into_config();
        assert_eq!(config.reconnect_delay, Duration::ZERO);
    }
}
