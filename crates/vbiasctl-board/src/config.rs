use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Attempts per request when the board stays silent.
pub const DEFAULT_RETRIES: u32 = 2;

/// Listening window per attempt.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Unexpected frames tolerated per listening window.
pub const DEFAULT_MAX_BAD_FRAMES: usize = 999;

/// Largest code change per channel in one ramp step (about 100 mV).
pub const DEFAULT_RAMP_MAX_STEP: u16 = 10;

/// Ramp steps attempted before giving up.
pub const DEFAULT_RAMP_MAX_ITERATIONS: u32 = 9999;

/// Timing and retry policy for a board session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Attempts per request. Default: 2.
    pub retries: u32,
    /// Listening window per attempt. Default: 2 s.
    pub response_timeout: Duration,
    /// Malformed or unrelated frames tolerated per window. Default: 999.
    pub max_bad_frames: usize,
    pub ramp: RampConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_bad_frames: DEFAULT_MAX_BAD_FRAMES,
            ramp: RampConfig::default(),
        }
    }
}

/// Slew policy of the ramping controller.
///
/// These values protect the analog front end and are hardware policy; the
/// defaults match what the boards were validated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampConfig {
    /// Largest code change per channel per step. Default: 10.
    pub max_step: u16,
    /// Steps attempted before the ramp is reported incomplete. Default: 9999.
    pub max_iterations: u32,
    /// Pause between steps. Default: none.
    pub step_delay: Duration,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            max_step: DEFAULT_RAMP_MAX_STEP,
            max_iterations: DEFAULT_RAMP_MAX_ITERATIONS,
            step_delay: Duration::ZERO,
        }
    }
}

/// Listening policy for board discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// How long to collect answers after the broadcast query. Default: 2 s.
    pub window: Duration,
    /// Consecutive unrelated frames tolerated before listening stops. Default: 999.
    pub max_bad_frames: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_RESPONSE_TIMEOUT,
            max_bad_frames: DEFAULT_MAX_BAD_FRAMES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_board_policy() {
        let config = SessionConfig::default();
        assert_eq!(config.retries, 2);
        assert_eq!(config.response_timeout, Duration::from_secs(2));
        assert_eq!(config.ramp.max_step, 10);
        assert_eq!(config.ramp.max_iterations, 9999);
        assert!(config.ramp.step_delay.is_zero());
    }

    #[test]
    fn config_serializes() {
        let json = serde_json::to_value(SessionConfig::default()).expect("config should serialize");
        assert_eq!(json["retries"], 2);
        assert_eq!(json["ramp"]["max_step"], 10);
        let back: SessionConfig =
            serde_json::from_value(json).expect("config should deserialize");
        assert_eq!(back, SessionConfig::default());
    }
}
