use super::LoadBalancingAlgorithm;
use crate::backend::Backend;
use std::sync::{
  atomic::{AtomicU64, Ordering},
  Arc,
};

#[derive(Debug)]
pub struct RoundRobin {
  counter: AtomicU64,
}

impl RoundRobin {
  pub fn new() -> RoundRobin {
    RoundRobin {
      counter: AtomicU64::new(0),
    }
  }
}

impl LoadBalancingAlgorithm for RoundRobin {
  fn name(&self) -> &'static str {
    "round-robin"
  }

  fn pick(&self, candidates: &[Arc<Backend>]) -> Option<Arc<Backend>> {
    if candidates.is_empty() {
      return None;
    }
    // the counter survives membership changes, so a shrinking candidate list
    // skews at most one cycle instead of hot-spotting the first backend
    let turn = self.counter.fetch_add(1, Ordering::Relaxed);
    Some(candidates[(turn % candidates.len() as u64) as usize].clone())
  }
}
