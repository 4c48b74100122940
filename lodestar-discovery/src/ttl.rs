//! Heartbeat and lease TTL policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest heartbeat interval a registration may use.
pub const MIN_HEARTBEAT: Duration = Duration::from_secs(3);

/// Lowest lease TTL a registration may use.
pub const MIN_TTL: Duration = Duration::from_secs(10);

/// How often a registration is renewed and how long its lease lives.
///
/// Built through [`TtlPolicy::new`], which corrects out-of-range values
/// upwards instead of rejecting them:
///
/// - `heartbeat >= MIN_HEARTBEAT`
/// - `ttl >= MIN_TTL`
/// - `ttl >= heartbeat`
///
/// Durations are stored as integer nanoseconds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    #[serde(with = "nanos")]
    heartbeat: Duration,

    #[serde(with = "nanos")]
    ttl: Duration,
}

impl TtlPolicy {
    /// Create a policy, clamping both durations to their floors.
    ///
    /// # Examples
    ///
    /// ```
    /// use lodestar_discovery::TtlPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = TtlPolicy::new(Duration::from_secs(20), Duration::ZERO);
    /// assert_eq!(policy.heartbeat(), Duration::from_secs(20));
    /// assert_eq!(policy.ttl(), Duration::from_secs(20));
    /// ```
    pub fn new(heartbeat: Duration, ttl: Duration) -> Self {
        let heartbeat = heartbeat.max(MIN_HEARTBEAT);
        let ttl = ttl.max(MIN_TTL).max(heartbeat);
        Self { heartbeat, ttl }
    }

    /// Interval between lease renewals.
    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Lifetime of the lease backing a registration.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Lease TTL in whole seconds, rounded up.
    pub fn lease_ttl_secs(&self) -> i64 {
        let secs = self.ttl.as_secs() + u64::from(self.ttl.subsec_nanos() > 0);
        i64::try_from(secs).unwrap_or(i64::MAX)
    }

    /// Re-apply the clamping rules.
    ///
    /// Deserialized policies are taken as-is; this brings one back in range.
    pub fn clamped(self) -> Self {
        Self::new(self.heartbeat, self.ttl)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            heartbeat: MIN_HEARTBEAT,
            ttl: MIN_TTL,
        }
    }
}

mod nanos {
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos())
            .map_err(|_| S::Error::custom("duration exceeds u64 nanoseconds"))?;
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.heartbeat(), Duration::from_secs(3));
        assert_eq!(policy.ttl(), Duration::from_secs(10));
        assert_eq!(policy, TtlPolicy::new(Duration::ZERO, Duration::ZERO));
    }

    #[test]
    fn test_clamps_hold_for_any_input() {
        let inputs = [
            Duration::ZERO,
            Duration::from_millis(1),
            Duration::from_secs(3),
            Duration::from_secs(9),
            Duration::from_secs(10),
            Duration::from_secs(45),
            Duration::from_secs(3600),
        ];

        for heartbeat in inputs {
            for ttl in inputs {
                let policy = TtlPolicy::new(heartbeat, ttl);
                assert!(policy.heartbeat() >= MIN_HEARTBEAT);
                assert!(policy.ttl() >= MIN_TTL);
                assert!(policy.ttl() >= policy.heartbeat());
            }
        }
    }

    #[test]
    fn test_values_above_floor_are_kept() {
        let policy = TtlPolicy::new(Duration::from_secs(5), Duration::from_secs(30));
        assert_eq!(policy.heartbeat(), Duration::from_secs(5));
        assert_eq!(policy.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_ttl_raised_to_heartbeat() {
        let policy = TtlPolicy::new(Duration::from_secs(15), Duration::from_secs(12));
        assert_eq!(policy.ttl(), Duration::from_secs(15));
    }

    #[test]
    fn test_lease_ttl_rounds_up() {
        let policy = TtlPolicy::new(MIN_HEARTBEAT, Duration::from_millis(10_500));
        assert_eq!(policy.lease_ttl_secs(), 11);
        assert_eq!(TtlPolicy::default().lease_ttl_secs(), 10);
    }

    #[test]
    fn test_wire_format_is_nanoseconds() {
        let json = serde_json::to_value(TtlPolicy::default()).unwrap();
        assert_eq!(json["heartbeat"], 3_000_000_000u64);
        assert_eq!(json["ttl"], 10_000_000_000u64);
    }

    #[test]
    fn test_clamped_repairs_deserialized_policy() {
        let policy: TtlPolicy = serde_json::from_str(r#"{"heartbeat":1,"ttl":2}"#).unwrap();
        assert_eq!(policy.heartbeat(), Duration::from_nanos(1));
        assert_eq!(policy.clamped(), TtlPolicy::default());
    }

    #[test]
    fn test_unrepresentable_duration_is_rejected() {
        let policy = TtlPolicy::new(Duration::MAX, Duration::MAX);
        let err = serde_json::to_string(&policy).unwrap_err();
        assert!(err.to_string().contains("exceeds u64 nanoseconds"));

        // largest value that still fits round-trips exactly
        let edge = Duration::from_nanos(u64::MAX);
        let policy = TtlPolicy::new(edge, edge);
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(serde_json::from_str::<TtlPolicy>(&json).unwrap(), policy);
    }
}
