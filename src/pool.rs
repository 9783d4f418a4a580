use crate::{backend::Backend, health, load_balancing::LoadBalancingAlgorithm};
use futures::future::join_all;
use log::{debug, info};
use std::sync::{Arc, RwLock};

/// Owns the backend list and the selection algorithm. Membership is read on
/// every request and only ever grows, so it sits behind a read/write lock
/// that is never held across I/O.
#[derive(Debug)]
pub struct ServerPool {
  backends: RwLock<Vec<Arc<Backend>>>,
  algorithm: Box<dyn LoadBalancingAlgorithm>,
}

#[derive(Debug, Eq, PartialEq)]
pub struct PoolSummary {
  pub total: usize,
  pub alive: usize,
  pub available: usize,
  pub circuits_closed: usize,
}

impl ServerPool {
  pub fn new(algorithm: Box<dyn LoadBalancingAlgorithm>) -> ServerPool {
    ServerPool {
      backends: RwLock::new(Vec::new()),
      algorithm,
    }
  }

  pub fn algorithm_name(&self) -> &'static str {
    self.algorithm.name()
  }

  pub fn add_backend(&self, backend: Backend) {
    info!("added backend {} (weight: {})", backend, backend.weight);
    self.backends.write().unwrap().push(Arc::new(backend));
  }

  /// Snapshots the membership, filters to available backends and delegates
  /// exactly one pick to the algorithm. `None` iff nothing is available.
  pub fn next_available(&self) -> Option<Arc<Backend>> {
    let backends = self.get_backends();
    let available: Vec<Arc<Backend>> = backends.iter().filter(|b| b.is_available()).cloned().collect();
    if available.is_empty() {
      debug!("no available backends ({} configured)", backends.len());
      return None;
    }
    debug!("{}/{} backends available", available.len(), backends.len());
    self.algorithm.pick(&available)
  }

  pub fn get_backends(&self) -> Vec<Arc<Backend>> {
    self.backends.read().unwrap().clone()
  }

  pub fn pool_summary(&self) -> PoolSummary {
    let backends = self.backends.read().unwrap();
    let mut summary = PoolSummary {
      total: backends.len(),
      alive: 0,
      available: 0,
      circuits_closed: 0,
    };
    for backend in backends.iter() {
      if backend.is_alive() {
        summary.alive += 1;
      }
      if backend.is_available() {
        summary.available += 1;
      }
      if !backend.is_circuit_open() {
        summary.circuits_closed += 1;
      }
    }
    summary
  }

  /// Probes every backend concurrently and updates its liveness flag.
  pub async fn health_check(&self) {
    let backends = self.get_backends();
    join_all(backends.iter().map(health::probe_backend)).await;

    let summary = self.pool_summary();
    info!(
      "health check complete: {}/{} alive, {}/{} available, {}/{} circuits closed",
      summary.alive, summary.total, summary.available, summary.total, summary.circuits_closed, summary.total
    );
  }
}
