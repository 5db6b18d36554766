//! Pipeline configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the streaming pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Longest silence between two body reads, in seconds.
    ///
    /// A slow reply is fine as long as chunks keep arriving.
    #[serde(default = "StreamConfig::default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// Connection establishment timeout in seconds.
    #[serde(default = "StreamConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Largest accumulated response the renderer will accept, in bytes.
    #[serde(default = "StreamConfig::default_max_render_bytes")]
    pub max_render_bytes: usize,

    /// Capacity of the transcript event channel.
    #[serde(default = "StreamConfig::default_event_buffer")]
    pub event_buffer: usize,
}

impl StreamConfig {
    const fn default_read_timeout() -> u64 {
        300 // 5 minutes; tool-using models can think for a while
    }

    const fn default_connect_timeout() -> u64 {
        10
    }

    const fn default_max_render_bytes() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_event_buffer() -> usize {
        128
    }

    /// Get the read timeout as a `Duration`.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_timeout_seconds: Self::default_read_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            max_render_bytes: Self::default_max_render_bytes(),
            event_buffer: Self::default_event_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.read_timeout_seconds, 300);
        assert_eq!(config.max_render_bytes, 1024 * 1024);
        assert_eq!(config.event_buffer, 128);
    }

    #[test]
    fn timeout_duration() {
        let config = StreamConfig::default();
        assert_eq!(config.read_timeout(), Duration::from_secs(300));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: StreamConfig =
            serde_json::from_str(r#"{"max_render_bytes": 2048}"#).unwrap();
        assert_eq!(config.max_render_bytes, 2048);
        assert_eq!(config.connect_timeout_seconds, 10);
    }
}
