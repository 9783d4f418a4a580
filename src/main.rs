use crate::{
  backend::Backend,
  configuration::Config,
  load_balancing::algorithm_for_name,
  pool::ServerPool,
  server::{ProxyService, SharedData},
};
use hyper::{server::conn::AddrStream, service::make_service_fn, Client, Server};
use log::info;
use std::{convert::Infallible, io, net::SocketAddr, sync::Arc, time::Duration};

mod admin;
mod backend;
mod configuration;
mod error_response;
mod health;
mod load_balancing;
mod logging;
mod pool;
mod server;

#[tokio::main]
pub async fn main() -> Result<(), io::Error> {
  logging::initialize();

  let toml_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
  let config = Config::new(&toml_path).ok_or_else(|| {
    io::Error::new(
      io::ErrorKind::InvalidInput,
      format!("could not load configuration from {}", toml_path),
    )
  })?;

  let pool = Arc::new(ServerPool::new(algorithm_for_name(&config.algorithm)));
  let circuit_timeout = Duration::from_secs(config.circuit_timeout);
  for backend in &config.backends {
    let backend = Backend::new(&backend.url, backend.weight, config.max_consecutive_errors, circuit_timeout)
      .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    pool.add_backend(backend);
  }

  let prober = tokio::spawn(health::watch_health(pool.clone(), config.health_check_interval));

  let address = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
  info!(
    "starting load balancer on {} ({} algorithm, {} backends, max retries: {}, health check every {}s)",
    address,
    pool.algorithm_name(),
    config.backends.len(),
    config.max_retries,
    config.health_check_interval
  );

  let shared_data = Arc::new(SharedData {
    pool,
    config,
    client: Client::new(),
  });

  let make_service = make_service_fn(move |stream: &AddrStream| {
    let shared_data = shared_data.clone();
    let client_address = stream.remote_addr();
    async move {
      Ok::<_, Infallible>(ProxyService {
        client_address,
        shared_data,
      })
    }
  });

  let server = Server::try_bind(&address)
    .map_err(|e| io::Error::new(io::ErrorKind::AddrInUse, format!("failed to bind {}: {}", address, e)))?
    .serve(make_service)
    .with_graceful_shutdown(shutdown_signal());

  let result = server
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("server error: {}", e)));

  prober.abort();
  info!("shut down");
  result
}

async fn shutdown_signal() {
  tokio::signal::ctrl_c()
    .await
    .expect("Installing the shutdown signal handler should not fail");
}
