use std::time::Duration;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 512;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(54);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HUB_MAILBOX: usize = 1024;

/// Per-connection and hub limits for the real-time gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayLimits {
    pub max_frame_bytes: usize,
    pub outbound_queue: usize,
    pub read_timeout: Duration,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
    pub hub_mailbox: usize,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            hub_mailbox: DEFAULT_HUB_MAILBOX,
        }
    }
}

impl GatewayLimits {
    /// Zero values fall back to defaults, and the ping interval is kept
    /// below the read timeout so a healthy peer is never timed out.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.max_frame_bytes == 0 {
            self.max_frame_bytes = defaults.max_frame_bytes;
        }
        if self.outbound_queue == 0 {
            self.outbound_queue = defaults.outbound_queue;
        }
        if self.hub_mailbox == 0 {
            self.hub_mailbox = defaults.hub_mailbox;
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = defaults.read_timeout;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = defaults.write_timeout;
        }
        if self.ping_interval.is_zero() || self.ping_interval >= self.read_timeout {
            self.ping_interval = self.read_timeout * 9 / 10;
        }
        self
    }
}

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub token_ttl_hours: i64,
    pub limits: GatewayLimits,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = GatewayLimits::default();
        let limits = GatewayLimits {
            max_frame_bytes: env_parse("CHATHUB_MAX_FRAME_BYTES")
                .unwrap_or(defaults.max_frame_bytes),
            outbound_queue: env_parse("CHATHUB_OUTBOUND_QUEUE").unwrap_or(defaults.outbound_queue),
            read_timeout: env_parse("CHATHUB_READ_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
            ping_interval: env_parse("CHATHUB_PING_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ping_interval),
            write_timeout: env_parse("CHATHUB_WRITE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.write_timeout),
            hub_mailbox: defaults.hub_mailbox,
        }
        .normalized();

        Self {
            port: env_parse("PORT").unwrap_or(3000),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:chathub.db?mode=rwc".to_string()),
            token_ttl_hours: env_parse("CHATHUB_TOKEN_TTL_HOURS")
                .filter(|h: &i64| *h > 0)
                .unwrap_or(24),
            limits,
        }
    }
}
