use crate::{admin, backend::Backend, configuration::Config, error_response, pool::ServerPool};
use futures::Future;
use hyper::{
  body::Bytes,
  client::HttpConnector,
  http::request::Parts,
  service::Service,
  Body, Client, Request, Response, StatusCode, Uri,
};
use log::{debug, info, warn};
use std::{
  net::SocketAddr,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
  time::Duration,
};

// Fixed back-off between attempts. Retries are expected to land on a
// different backend, not to wait out the failing one.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

pub struct SharedData {
  pub pool: Arc<ServerPool>,
  pub config: Config,
  pub client: Client<HttpConnector, Body>,
}

pub struct ProxyService {
  pub client_address: SocketAddr,
  pub shared_data: Arc<SharedData>,
}

impl Service<Request<Body>> for ProxyService {
  type Response = Response<Body>;
  type Error = hyper::Error;

  // let's allow this complex type. A refactor would make it more complicated due to the used trait types
  #[allow(clippy::type_complexity)]
  type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

  fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
    Poll::Ready(Ok(()))
  }

  fn call(&mut self, request: Request<Body>) -> Self::Future {
    let shared_data = self.shared_data.clone();
    let client_address = self.client_address;
    Box::pin(async move { Ok(handle_request(shared_data, client_address, request).await) })
  }
}

/// Admin paths are matched exactly so no forwarded request can shadow them;
/// everything else is proxied.
pub async fn handle_request(
  shared_data: Arc<SharedData>,
  client_address: SocketAddr,
  request: Request<Body>,
) -> Response<Body> {
  debug!(
    "{:?} {} {} from {}",
    request.version(),
    request.method(),
    request.uri(),
    client_address
  );
  match request.uri().path() {
    "/health" => admin::health(&shared_data.pool),
    "/stats" => admin::stats(&shared_data.pool, &shared_data.config),
    "/circuit-breakers" => admin::circuit_breakers(&shared_data.pool),
    _ => proxy_request(shared_data, client_address, request).await,
  }
}

async fn proxy_request(
  shared_data: Arc<SharedData>,
  client_address: SocketAddr,
  request: Request<Body>,
) -> Response<Body> {
  let (parts, body) = request.into_parts();

  // collected once so every attempt can resend it
  let body = match hyper::body::to_bytes(body).await {
    Ok(body) => body,
    Err(e) => {
      warn!("failed to read request body from {}: {}", client_address, e);
      return error_response::bad_request("Invalid request body");
    }
  };

  let max_retries = shared_data.config.max_retries;
  for attempt in 0..=max_retries {
    let backend = match shared_data.pool.next_available() {
      Some(backend) => backend,
      None => {
        warn!("no available backend for {} {}", parts.method, parts.uri);
        return error_response::service_unavailable();
      }
    };

    // counts the request against the backend until this attempt resolves
    let connection = backend.track_connection();
    info!(
      "{} {} from {} routed to {} (attempt {}/{}, connections: {})",
      parts.method,
      parts.uri.path(),
      client_address,
      backend,
      attempt + 1,
      max_retries + 1,
      backend.connections()
    );

    match shared_data.client.request(backend_request(&backend, &parts, body.clone(), &client_address)).await {
      Ok(response) => {
        observe_response(&backend, response.status());
        return response;
      }
      Err(e) => {
        let errors = backend.record_error();
        warn!(
          "backend {} failed for {} {}: {} (consecutive errors: {})",
          backend, parts.method, parts.uri, e, errors
        );
        drop(connection);
        if attempt < max_retries {
          info!("retrying {} {} (attempt {}/{})", parts.method, parts.uri, attempt + 2, max_retries + 1);
          tokio::time::sleep(RETRY_BACKOFF).await;
        }
      }
    }
  }

  warn!("retries exhausted for {} {}", parts.method, parts.uri);
  error_response::service_unavailable()
}

/// Breakers open for origin-owned failures only: 5xx counts against the
/// backend, 2xx/3xx clears it, 4xx is the client's fault and changes nothing.
fn observe_response(backend: &Backend, status: StatusCode) {
  if status.is_server_error() {
    let errors = backend.record_error();
    warn!("backend {} returned {} (consecutive errors: {})", backend, status, errors);
  } else if status.is_success() || status.is_redirection() {
    backend.record_success();
  }
}

fn backend_request(backend: &Backend, parts: &Parts, body: Bytes, client_address: &SocketAddr) -> Request<Body> {
  let path = parts.uri.path_and_query().map(|path| path.as_str()).unwrap_or("/");
  let uri = Uri::builder()
    .scheme(backend.uri().scheme_str().unwrap_or("http"))
    .authority(backend.uri().authority().unwrap().as_str())
    .path_and_query(path)
    .build()
    .unwrap();

  let builder = Request::builder().method(parts.method.clone()).uri(uri);
  parts
    .headers
    .iter()
    .fold(builder, |builder, (key, value)| builder.header(key, value))
    .header("x-forwarded-for", client_address.ip().to_string())
    .body(Body::from(body))
    .unwrap()
}
