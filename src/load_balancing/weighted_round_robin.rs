use super::LoadBalancingAlgorithm;
use crate::backend::Backend;
use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

/// Smooth weighted round-robin. Every pick raises each candidate's current
/// weight by its static weight, selects the maximum, and lowers the winner by
/// the weight total. Over any window of `total` picks each candidate wins
/// exactly its static weight's worth, interleaved rather than in bursts.
#[derive(Debug)]
pub struct WeightedRoundRobin {
  current_weights: Mutex<HashMap<String, i64>>,
}

impl WeightedRoundRobin {
  pub fn new() -> WeightedRoundRobin {
    WeightedRoundRobin {
      current_weights: Mutex::new(HashMap::new()),
    }
  }
}

impl LoadBalancingAlgorithm for WeightedRoundRobin {
  fn name(&self) -> &'static str {
    "weighted"
  }

  fn pick(&self, candidates: &[Arc<Backend>]) -> Option<Arc<Backend>> {
    // the whole add/select/subtract cycle runs under one lock; interleaved
    // picks would corrupt the current weights
    let mut current_weights = self.current_weights.lock().unwrap();

    let mut selected: Option<&Arc<Backend>> = None;
    let mut max_weight = i64::MIN;
    let mut total_weight = 0;

    for candidate in candidates {
      let weight = i64::from(candidate.weight.max(1));
      total_weight += weight;

      let current = current_weights.entry(candidate.url().to_string()).or_insert(0);
      *current += weight;
      if *current > max_weight {
        max_weight = *current;
        selected = Some(candidate);
      }
    }

    let selected = selected?;
    *current_weights.get_mut(selected.url()).unwrap() -= total_weight;
    Some(selected.clone())
  }
}
