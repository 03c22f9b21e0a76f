use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`TalkServer`](crate::session::talk_server::TalkServer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TalkServerConfig {
    /// Upper bound on how long the drain task waits for new chunks before
    /// checking the queue again (default: 10 ms).
    #[serde(with = "millis")]
    pub drain_interval: Duration,

    /// Append the end-of-speech sentinel as soon as the engine acknowledges
    /// a stop, instead of relying on the engine to signal completion
    /// afterwards (default: true).
    pub sentinel_on_stop: bool,
}

impl TalkServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.drain_interval.is_zero() {
            return Err("drain interval must be positive".into());
        }
        if self.drain_interval > Duration::from_secs(1) {
            return Err(format!(
                "drain interval too long: {} ms",
                self.drain_interval.as_millis()
            ));
        }
        Ok(())
    }
}

impl Default for TalkServerConfig {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_millis(10),
            sentinel_on_stop: true,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
