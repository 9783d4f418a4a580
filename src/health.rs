use crate::{backend::Backend, pool::ServerPool};
use hyper::{client::HttpConnector, Body, Client, StatusCode, Uri};
use hyper_timeout::TimeoutConnector;
use log::{debug, info, warn};
use std::{sync::Arc, time::Duration};

// Bounds each probe and therefore the worst-case drain on shutdown
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Probes all backends once at startup and then every `interval_seconds`.
pub async fn watch_health(pool: Arc<ServerPool>, interval_seconds: u64) {
  let interval = chrono::Duration::seconds(interval_seconds.max(1) as i64).to_std().unwrap();
  let mut interval_timer = tokio::time::interval(interval);
  loop {
    // the first tick fires immediately
    interval_timer.tick().await;
    pool.health_check().await;
  }
}

/// Probes `{url}/health`; on transport error or a non-2xx answer falls back
/// to the root route, for backends that only expose one. The backend is
/// alive iff the final status is 2xx. Never touches the circuit breaker.
pub async fn probe_backend(backend: &Arc<Backend>) {
  let was_alive = backend.is_alive();
  let alive = contact_backend(backend).await;
  backend.mark_alive(alive);

  if alive != was_alive {
    if alive {
      info!("backend {} is up", backend);
    } else {
      warn!("backend {} is down", backend);
    }
  } else {
    debug!("backend {} still {}", backend, if alive { "up" } else { "down" });
  }
}

async fn contact_backend(backend: &Arc<Backend>) -> bool {
  match probe_status(format!("{}/health", backend.url())).await {
    Some(status) if status.is_success() => true,
    _ => match probe_status(backend.url().to_string()).await {
      Some(status) => status.is_success(),
      None => false,
    },
  }
}

async fn probe_status(url: String) -> Option<StatusCode> {
  let uri = url.parse::<Uri>().ok()?;

  let mut connector = TimeoutConnector::new(HttpConnector::new());
  connector.set_connect_timeout(Some(PROBE_TIMEOUT));
  connector.set_read_timeout(Some(PROBE_TIMEOUT));
  connector.set_write_timeout(Some(PROBE_TIMEOUT));
  let client = Client::builder().build::<_, Body>(connector);

  client.get(uri).await.ok().map(|response| response.status())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::DEFAULT_CIRCUIT_TIMEOUT;
  use hyper::{
    service::{make_service_fn, service_fn},
    Request, Response, Server,
  };
  use std::convert::Infallible;

  // one-route test origin: `health_status` for /health, `root_status` for
  // everything else
  async fn spawn_origin(health_status: StatusCode, root_status: StatusCode) -> String {
    let make_service = make_service_fn(move |_| async move {
      Ok::<_, Infallible>(service_fn(move |request: Request<Body>| async move {
        let status = if request.uri().path() == "/health" {
          health_status
        } else {
          root_status
        };
        Ok::<_, Infallible>(Response::builder().status(status).body(Body::empty()).unwrap())
      }))
    });
    let server = Server::bind(&"127.0.0.1:0".parse().unwrap()).serve(make_service);
    let address = server.local_addr();
    tokio::spawn(server);
    format!("http://{}", address)
  }

  fn backend_for(url: &str) -> Arc<Backend> {
    Arc::new(Backend::new(url, 1, 10, DEFAULT_CIRCUIT_TIMEOUT).unwrap())
  }

  #[tokio::test]
  async fn probe_marks_healthy_backend_alive() {
    let url = spawn_origin(StatusCode::OK, StatusCode::OK).await;
    let backend = backend_for(&url);
    backend.mark_alive(false);

    probe_backend(&backend).await;
    assert!(backend.is_alive());
  }

  #[tokio::test]
  async fn probe_marks_unreachable_backend_dead() {
    let port = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap().port()
    };
    let backend = backend_for(&format!("http://127.0.0.1:{}", port));

    probe_backend(&backend).await;
    assert!(!backend.is_alive());
  }

  #[tokio::test]
  async fn probe_falls_back_to_root_route() {
    let url = spawn_origin(StatusCode::NOT_FOUND, StatusCode::OK).await;
    let backend = backend_for(&url);
    backend.mark_alive(false);

    probe_backend(&backend).await;
    assert!(backend.is_alive());
  }

  #[tokio::test]
  async fn probe_needs_a_successful_status_somewhere() {
    let url = spawn_origin(StatusCode::INTERNAL_SERVER_ERROR, StatusCode::INTERNAL_SERVER_ERROR).await;
    let backend = backend_for(&url);

    probe_backend(&backend).await;
    assert!(!backend.is_alive());
  }

  #[tokio::test]
  async fn probe_prefers_the_health_route() {
    let url = spawn_origin(StatusCode::OK, StatusCode::INTERNAL_SERVER_ERROR).await;
    let backend = backend_for(&url);
    backend.mark_alive(false);

    probe_backend(&backend).await;
    assert!(backend.is_alive());
  }

  #[tokio::test]
  async fn health_check_takes_dead_backends_out_of_rotation() {
    let healthy_url = spawn_origin(StatusCode::OK, StatusCode::OK).await;
    let dead_port = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap().port()
    };

    let pool = ServerPool::new(crate::load_balancing::algorithm_for_name("round-robin"));
    pool.add_backend(Backend::new(&format!("http://127.0.0.1:{}", dead_port), 1, 10, DEFAULT_CIRCUIT_TIMEOUT).unwrap());
    pool.add_backend(Backend::new(&healthy_url, 1, 10, DEFAULT_CIRCUIT_TIMEOUT).unwrap());

    pool.health_check().await;

    for _ in 0..4 {
      assert_eq!(pool.next_available().unwrap().url(), healthy_url);
    }
  }

  #[tokio::test]
  async fn probe_never_resets_the_circuit() {
    let url = spawn_origin(StatusCode::OK, StatusCode::OK).await;
    let backend = Arc::new(Backend::new(&url, 1, 1, DEFAULT_CIRCUIT_TIMEOUT).unwrap());
    backend.record_error();

    probe_backend(&backend).await;
    assert!(backend.is_alive());
    assert!(backend.is_circuit_open());
    assert!(!backend.is_available());
  }
}
