use crate::backend::Backend;
use log::warn;
use std::{fmt, sync::Arc};

pub mod least_connection;
pub mod round_robin;
pub mod weighted_round_robin;

use least_connection::LeastConnection;
use round_robin::RoundRobin;
use weighted_round_robin::WeightedRoundRobin;

pub trait LoadBalancingAlgorithm: Send + Sync + fmt::Debug {
  fn name(&self) -> &'static str;

  /// Picks one backend from the candidate list. Returns `None` iff the list
  /// is empty. Callers pass a pre-filtered list of available backends.
  fn pick(&self, candidates: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}

/// Maps the configured algorithm name to an instance. The match is
/// case-sensitive; unknown names fall back to round-robin.
pub fn algorithm_for_name(name: &str) -> Box<dyn LoadBalancingAlgorithm> {
  match name {
    "round-robin" => Box::new(RoundRobin::new()),
    "weighted" => Box::new(WeightedRoundRobin::new()),
    "least-connections" => Box::new(LeastConnection::new()),
    other => {
      warn!("unknown load balancing algorithm {:?}, falling back to round-robin", other);
      Box::new(RoundRobin::new())
    }
  }
}
