//! Load balancer (spec.md §4.7): picks an idle worker for the next task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;

use crate::domain::{LoadBalancingAlgorithm, Worker};

#[derive(Default)]
pub struct LoadBalancer {
    round_robin_cursor: AtomicUsize,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks an idle worker from `workers` per `algorithm`. `weights`
    /// applies only to `weighted`; workers absent from it default to 1.
    pub fn pick<'a>(
        &self,
        algorithm: LoadBalancingAlgorithm,
        workers: &'a [Worker],
        weights: &HashMap<String, u32>,
    ) -> Option<&'a Worker> {
        let idle: Vec<&Worker> = workers.iter().filter(|w| w.is_idle()).collect();
        if idle.is_empty() {
            return None;
        }

        match algorithm {
            LoadBalancingAlgorithm::RoundRobin => {
                let cursor = self.round_robin_cursor.fetch_add(1, Ordering::SeqCst);
                idle.get(cursor % idle.len()).copied()
            }
            LoadBalancingAlgorithm::LeastConnections => idle
                .into_iter()
                .min_by_key(|w| w.tasks_completed + w.tasks_failed),
            LoadBalancingAlgorithm::LeastBusy => idle
                .into_iter()
                .min_by_key(|w| w.consecutive_health_failures),
            LoadBalancingAlgorithm::Weighted => {
                let total: u32 = idle
                    .iter()
                    .map(|w| *weights.get(&w.worker_id).unwrap_or(&1))
                    .sum();
                if total == 0 {
                    return idle.into_iter().next();
                }
                let mut pick = rand::random::<u32>() % total;
                for worker in &idle {
                    let weight = *weights.get(&worker.worker_id).unwrap_or(&1);
                    if pick < weight {
                        return Some(worker);
                    }
                    pick -= weight;
                }
                idle.into_iter().next()
            }
            LoadBalancingAlgorithm::Random => {
                let mut rng = rand::thread_rng();
                idle.choose(&mut rng).copied()
            }
        }
    }
}
