//! Maps a judge's score to a break length.
//!
//! Two policies exist. `Tiered` is the default; `Linear` is kept selectable
//! through settings.

use serde::{Deserialize, Serialize};

pub trait RewardPolicy: Send + Sync {
    /// Break length in seconds. Zero means no break.
    fn reward_seconds(&self, score: f64, allow_break: bool) -> u32;
}

/// 0.6 / 0.7 / 0.85 thresholds for 3, 5 and 10 minute breaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TieredPolicy;

impl RewardPolicy for TieredPolicy {
    fn reward_seconds(&self, score: f64, allow_break: bool) -> u32 {
        if !allow_break {
            return 0;
        }
        match score {
            s if (0.0..0.6).contains(&s) => 0,
            s if (0.6..0.7).contains(&s) => 180,
            s if (0.7..0.85).contains(&s) => 300,
            s if (0.85..=1.0).contains(&s) => 600,
            _ => 300,
        }
    }
}

/// Up to 30 whole minutes, proportional to the clamped score.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearPolicy;

const LINEAR_MAX_MINUTES: f64 = 30.0;

impl RewardPolicy for LinearPolicy {
    fn reward_seconds(&self, score: f64, allow_break: bool) -> u32 {
        if !allow_break {
            return 0;
        }
        let clamped = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        let minutes = (clamped * LINEAR_MAX_MINUTES).floor() as u32;
        minutes * 60
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewardPolicyKind {
    #[default]
    Tiered,
    Linear,
}

impl RewardPolicyKind {
    pub fn into_policy(self) -> Box<dyn RewardPolicy> {
        match self {
            RewardPolicyKind::Tiered => Box::new(TieredPolicy),
            RewardPolicyKind::Linear => Box::new(LinearPolicy),
        }
    }
}

/// "m:ss", e.g. `5:00`.
pub fn format_break_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiered_boundaries() {
        let policy = TieredPolicy;
        assert_eq!(policy.reward_seconds(0.0, true), 0);
        assert_eq!(policy.reward_seconds(0.59, true), 0);
        assert_eq!(policy.reward_seconds(0.6, true), 180);
        assert_eq!(policy.reward_seconds(0.69, true), 180);
        assert_eq!(policy.reward_seconds(0.7, true), 300);
        assert_eq!(policy.reward_seconds(0.84, true), 300);
        assert_eq!(policy.reward_seconds(0.85, true), 600);
        assert_eq!(policy.reward_seconds(1.0, true), 600);
    }

    #[test]
    fn tiered_is_monotonic() {
        let policy = TieredPolicy;
        let mut previous = 0;
        for step in 0..=100 {
            let reward = policy.reward_seconds(step as f64 / 100.0, true);
            assert!(reward >= previous, "reward dropped at score {}", step);
            previous = reward;
        }
    }

    #[test]
    fn denied_break_is_always_zero() {
        for score in [0.0, 0.5, 0.6, 0.85, 1.0] {
            assert_eq!(TieredPolicy.reward_seconds(score, false), 0);
            assert_eq!(LinearPolicy.reward_seconds(score, false), 0);
        }
    }

    #[test]
    fn linear_floors_whole_minutes() {
        let policy = LinearPolicy;
        assert_eq!(policy.reward_seconds(1.0, true), 1800);
        assert_eq!(policy.reward_seconds(0.5, true), 900);
        assert_eq!(policy.reward_seconds(0.65, true), 19 * 60);
        assert_eq!(policy.reward_seconds(0.02, true), 0);
        assert_eq!(policy.reward_seconds(3.0, true), 1800);
        assert_eq!(policy.reward_seconds(-1.0, true), 0);
    }

    #[test]
    fn kind_selects_policy() {
        assert_eq!(RewardPolicyKind::default(), RewardPolicyKind::Tiered);
        assert_eq!(RewardPolicyKind::Tiered.into_policy().reward_seconds(0.9, true), 600);
        assert_eq!(RewardPolicyKind::Linear.into_policy().reward_seconds(0.9, true), 1620);
    }

    #[test]
    fn break_duration_label() {
        assert_eq!(format_break_duration(300), "5:00");
        assert_eq!(format_break_duration(185), "3:05");
        assert_eq!(format_break_duration(0), "0:00");
    }
}
