use crate::{configuration::Config, error_response, pool::ServerPool};
use chrono::Utc;
use hyper::{header::CONTENT_TYPE, Body, Response};
use log::error;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct BackendView {
  url: String,
  status: String,
  connections: usize,
  weight: u32,
  consecutive_errors: u32,
  circuit_open: bool,
  available: bool,
  alive: bool,
}

#[derive(Debug, Serialize)]
pub struct LoadBalancerView {
  algorithm: &'static str,
  total_backends: usize,
  alive_backends: usize,
  available_backends: usize,
  pool_health_percentage: f64,
  backends: Vec<BackendView>,
}

#[derive(Debug, Serialize)]
struct ConfigView {
  port: u16,
  health_check_interval: u64,
  max_retries: u32,
  algorithm: String,
}

#[derive(Debug, Serialize)]
struct StatsView {
  load_balancer: LoadBalancerView,
  config: ConfigView,
  timestamp: i64,
}

#[derive(Debug, Serialize)]
struct CircuitBreakerView {
  url: String,
  consecutive_errors: u32,
  circuit_open: bool,
  available: bool,
  alive: bool,
  connections: usize,
  weight: u32,
}

#[derive(Debug, Serialize)]
struct CircuitBreakerSummaryView {
  total_backends: usize,
  available_backends: usize,
  circuits_open: usize,
  circuits_closed: usize,
  health_percentage: f64,
}

#[derive(Debug, Serialize)]
struct CircuitBreakersView {
  circuit_breakers: HashMap<String, CircuitBreakerView>,
  summary: CircuitBreakerSummaryView,
  timestamp: i64,
}

pub fn health(pool: &ServerPool) -> Response<Body> {
  json_response(&load_balancer_view(pool))
}

pub fn stats(pool: &ServerPool, config: &Config) -> Response<Body> {
  json_response(&StatsView {
    load_balancer: load_balancer_view(pool),
    config: ConfigView {
      port: config.listen_port,
      health_check_interval: config.health_check_interval,
      max_retries: config.max_retries,
      algorithm: config.algorithm.clone(),
    },
    timestamp: Utc::now().timestamp(),
  })
}

pub fn circuit_breakers(pool: &ServerPool) -> Response<Body> {
  let backends = pool.get_backends();

  let mut circuits = HashMap::new();
  let mut available_backends = 0;
  let mut circuits_open = 0;

  for backend in &backends {
    let circuit_open = backend.is_circuit_open();
    let available = backend.is_available();
    if available {
      available_backends += 1;
    }
    if circuit_open {
      circuits_open += 1;
    }

    circuits.insert(
      backend.url().to_string(),
      CircuitBreakerView {
        url: backend.url().to_string(),
        consecutive_errors: backend.consecutive_errors(),
        circuit_open,
        available,
        alive: backend.is_alive(),
        connections: backend.connections(),
        weight: backend.weight,
      },
    );
  }

  json_response(&CircuitBreakersView {
    summary: CircuitBreakerSummaryView {
      total_backends: backends.len(),
      available_backends,
      circuits_open,
      circuits_closed: backends.len() - circuits_open,
      health_percentage: percentage(available_backends, backends.len()),
    },
    circuit_breakers: circuits,
    timestamp: Utc::now().timestamp(),
  })
}

fn load_balancer_view(pool: &ServerPool) -> LoadBalancerView {
  let backends = pool.get_backends();

  let mut views = Vec::with_capacity(backends.len());
  let mut alive_backends = 0;
  let mut available_backends = 0;

  for backend in &backends {
    let alive = backend.is_alive();
    let circuit_open = backend.is_circuit_open();
    let available = backend.is_available();
    if alive {
      alive_backends += 1;
    }
    if available {
      available_backends += 1;
    }

    let mut status = if alive { "up".to_string() } else { "down".to_string() };
    if circuit_open {
      status.push_str(" (circuit open)");
    }

    views.push(BackendView {
      url: backend.url().to_string(),
      status,
      connections: backend.connections(),
      weight: backend.weight,
      consecutive_errors: backend.consecutive_errors(),
      circuit_open,
      available,
      alive,
    });
  }

  LoadBalancerView {
    algorithm: pool.algorithm_name(),
    total_backends: backends.len(),
    alive_backends,
    available_backends,
    pool_health_percentage: percentage(available_backends, backends.len()),
    backends: views,
  }
}

fn percentage(part: usize, total: usize) -> f64 {
  if total == 0 {
    return 0.0;
  }
  part as f64 / total as f64 * 100.0
}

fn json_response<T: Serialize>(view: &T) -> Response<Body> {
  match serde_json::to_vec(view) {
    Ok(body) => Response::builder()
      .header(CONTENT_TYPE, "application/json")
      .body(Body::from(body))
      .unwrap(),
    Err(e) => {
      error!("failed to encode admin response: {}", e);
      error_response::internal_server_error()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    backend::{Backend, DEFAULT_CIRCUIT_TIMEOUT},
    load_balancing::algorithm_for_name,
  };
  use serde_json::Value;

  fn pool_with_two_backends() -> ServerPool {
    let pool = ServerPool::new(algorithm_for_name("round-robin"));
    pool.add_backend(Backend::new("http://127.0.0.1:3001", 1, 1, DEFAULT_CIRCUIT_TIMEOUT).unwrap());
    pool.add_backend(Backend::new("http://127.0.0.1:3002", 2, 1, DEFAULT_CIRCUIT_TIMEOUT).unwrap());
    pool
  }

  #[test]
  fn load_balancer_view_counts_and_statuses() {
    let pool = pool_with_two_backends();
    pool.get_backends()[1].record_error();

    let view = serde_json::to_value(&load_balancer_view(&pool)).unwrap();

    assert_eq!(view["algorithm"], "round-robin");
    assert_eq!(view["total_backends"], 2);
    assert_eq!(view["alive_backends"], 2);
    assert_eq!(view["available_backends"], 1);
    assert_eq!(view["pool_health_percentage"], 50.0);

    let backends = view["backends"].as_array().unwrap();
    assert_eq!(backends[0]["url"], "http://127.0.0.1:3001");
    assert_eq!(backends[0]["status"], "up");
    assert_eq!(backends[0]["weight"], 1);
    assert_eq!(backends[1]["status"], "up (circuit open)");
    assert_eq!(backends[1]["circuit_open"], true);
    assert_eq!(backends[1]["available"], false);
    assert_eq!(backends[1]["consecutive_errors"], 1);
  }

  #[test]
  fn load_balancer_view_marks_dead_backends() {
    let pool = pool_with_two_backends();
    pool.get_backends()[0].mark_alive(false);

    let view = serde_json::to_value(&load_balancer_view(&pool)).unwrap();

    assert_eq!(view["alive_backends"], 1);
    assert_eq!(view["backends"][0]["status"], "down");
    assert_eq!(view["backends"][0]["alive"], false);
  }

  #[test]
  fn load_balancer_view_handles_an_empty_pool() {
    let pool = ServerPool::new(algorithm_for_name("round-robin"));
    let view = serde_json::to_value(&load_balancer_view(&pool)).unwrap();

    assert_eq!(view["total_backends"], 0);
    assert_eq!(view["pool_health_percentage"], 0.0);
  }

  #[tokio::test]
  async fn circuit_breakers_view_is_keyed_by_url() {
    let pool = pool_with_two_backends();
    pool.get_backends()[0].record_error();

    let response = circuit_breakers(&pool);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let view: Value = serde_json::from_slice(&body).unwrap();

    let entry = &view["circuit_breakers"]["http://127.0.0.1:3001"];
    assert_eq!(entry["url"], "http://127.0.0.1:3001");
    assert_eq!(entry["circuit_open"], true);
    assert_eq!(entry["consecutive_errors"], 1);

    assert_eq!(view["summary"]["total_backends"], 2);
    assert_eq!(view["summary"]["available_backends"], 1);
    assert_eq!(view["summary"]["circuits_open"], 1);
    assert_eq!(view["summary"]["circuits_closed"], 1);
    assert_eq!(view["summary"]["health_percentage"], 50.0);
    assert!(view["timestamp"].is_i64());
  }

  #[tokio::test]
  async fn stats_view_includes_the_configuration() {
    let pool = pool_with_two_backends();
    let config: Config = toml::from_str(
      r#"
        listen_port = 3030
        algorithm = "round-robin"
        backends = []
      "#,
    )
    .unwrap();

    let response = stats(&pool, &config);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let view: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(view["config"]["port"], 3030);
    assert_eq!(view["config"]["health_check_interval"], 30);
    assert_eq!(view["config"]["max_retries"], 3);
    assert_eq!(view["config"]["algorithm"], "round-robin");
    assert_eq!(view["load_balancer"]["total_backends"], 2);
    assert!(view["timestamp"].is_i64());
  }
}
