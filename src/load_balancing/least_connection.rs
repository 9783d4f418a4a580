use super::LoadBalancingAlgorithm;
use crate::backend::Backend;
use std::sync::Arc;

/// Stateless: reads each candidate's in-flight counter once per pick. Ties go
/// to the earliest candidate in list order.
#[derive(Debug)]
pub struct LeastConnection;

impl LeastConnection {
  pub fn new() -> LeastConnection {
    LeastConnection
  }
}

impl LoadBalancingAlgorithm for LeastConnection {
  fn name(&self) -> &'static str {
    "least-connections"
  }

  fn pick(&self, candidates: &[Arc<Backend>]) -> Option<Arc<Backend>> {
    candidates
      .iter()
      .enumerate()
      .min_by_key(|(index, candidate)| (candidate.connections(), *index))
      .map(|(_, candidate)| candidate.clone())
  }
}
