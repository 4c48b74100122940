//! Load balancing over resolved instances

use crate::service::ServiceRecord;
use rand::Rng;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

/// Load balancing strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadBalancingStrategy {
    /// Uniformly random selection
    #[default]
    Random,

    /// Cycle through instances, one step per call, per service key
    RoundRobin,
}

impl LoadBalancingStrategy {
    /// Build the balancer implementing this strategy.
    pub fn balancer(self) -> Arc<dyn Balancer> {
        match self {
            LoadBalancingStrategy::Random => Arc::new(RandomBalancer),
            LoadBalancingStrategy::RoundRobin => Arc::new(RoundRobinBalancer::new()),
        }
    }
}

impl FromStr for LoadBalancingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" | "randomness" => Ok(LoadBalancingStrategy::Random),
            "round_robin" | "round-robin" | "roundrobin" => Ok(LoadBalancingStrategy::RoundRobin),
            other => Err(format!("unknown load balancing strategy: {}", other)),
        }
    }
}

/// Picks one instance out of a resolved set.
pub trait Balancer: Send + Sync {
    /// Select an instance of `key`; `None` only when `records` is empty.
    fn select<'a>(&self, key: &str, records: &'a [ServiceRecord]) -> Option<&'a ServiceRecord>;
}

/// Uniformly random selection
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBalancer;

impl Balancer for RandomBalancer {
    fn select<'a>(&self, _key: &str, records: &'a [ServiceRecord]) -> Option<&'a ServiceRecord> {
        if records.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..records.len());
        records.get(index)
    }
}

/// Round-robin selection with one cursor per service key.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    cursors: Mutex<HashMap<String, usize>>,
}

impl RoundRobinBalancer {
    /// Create a balancer with every cursor at the start.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for RoundRobinBalancer {
    fn select<'a>(&self, key: &str, records: &'a [ServiceRecord]) -> Option<&'a ServiceRecord> {
        if records.is_empty() {
            return None;
        }

        let index = {
            let mut cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
            let cursor = cursors.entry(key.to_string()).or_insert(0);
            let index = *cursor % records.len();
            *cursor = cursor.wrapping_add(1);
            index
        };

        records.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances(key: &str, count: usize) -> Vec<ServiceRecord> {
        (0..count)
            .map(|i| ServiceRecord::new(key, format!("10.0.0.{}:9000", i + 1)))
            .collect()
    }

    #[test]
    fn test_empty_set() {
        assert!(RandomBalancer.select("chat", &[]).is_none());
        assert!(RoundRobinBalancer::new().select("chat", &[]).is_none());
    }

    #[test]
    fn test_random_stays_in_set() {
        let records = instances("chat", 3);
        for _ in 0..100 {
            let picked = RandomBalancer.select("chat", &records).unwrap();
            assert!(records.contains(picked));
        }
    }

    #[test]
    fn test_round_robin_cycles_and_wraps() {
        let records = instances("chat", 3);
        let balancer = RoundRobinBalancer::new();

        let picked: Vec<&str> = (0..7)
            .map(|_| balancer.select("chat", &records).unwrap().address.as_str())
            .collect();

        assert_eq!(
            picked,
            vec![
                "10.0.0.1:9000",
                "10.0.0.2:9000",
                "10.0.0.3:9000",
                "10.0.0.1:9000",
                "10.0.0.2:9000",
                "10.0.0.3:9000",
                "10.0.0.1:9000",
            ]
        );
    }

    #[test]
    fn test_round_robin_cursor_per_key() {
        let chat = instances("chat", 2);
        let gate = instances("gate", 2);
        let balancer = RoundRobinBalancer::new();

        assert_eq!(balancer.select("chat", &chat).unwrap().address, "10.0.0.1:9000");
        assert_eq!(balancer.select("chat", &chat).unwrap().address, "10.0.0.2:9000");
        assert_eq!(balancer.select("gate", &gate).unwrap().address, "10.0.0.1:9000");
        assert_eq!(balancer.select("chat", &chat).unwrap().address, "10.0.0.1:9000");
    }

    #[test]
    fn test_round_robin_set_shrinks() {
        let balancer = RoundRobinBalancer::new();
        let three = instances("chat", 3);
        balancer.select("chat", &three);
        balancer.select("chat", &three);

        let one = instances("chat", 1);
        assert_eq!(balancer.select("chat", &one).unwrap().address, "10.0.0.1:9000");
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("random".parse(), Ok(LoadBalancingStrategy::Random));
        assert_eq!("Round-Robin".parse(), Ok(LoadBalancingStrategy::RoundRobin));
        assert_eq!("round_robin".parse(), Ok(LoadBalancingStrategy::RoundRobin));
        assert!("weighted".parse::<LoadBalancingStrategy>().is_err());
        assert_eq!(LoadBalancingStrategy::default(), LoadBalancingStrategy::Random);
    }
}
