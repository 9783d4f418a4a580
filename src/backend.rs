use hyper::Uri;
use log::{info, warn};
use std::{
  error::Error,
  fmt,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, RwLock,
  },
  time::{Duration, Instant},
};

pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 10;
pub const DEFAULT_CIRCUIT_TIMEOUT: Duration = Duration::from_secs(30);

/// One origin server. Created at startup and never destroyed; everything
/// mutable on it is updated concurrently by the request path and the prober.
#[derive(Debug)]
pub struct Backend {
  uri: Uri,
  url: String,
  pub weight: u32,
  alive: RwLock<bool>,
  connections: AtomicUsize,
  circuit: Mutex<CircuitState>,
  max_consecutive_errors: u32,
  circuit_timeout: Duration,
}

#[derive(Debug)]
struct CircuitState {
  consecutive_errors: u32,
  circuit_open: bool,
  last_error_time: Option<Instant>,
}

#[derive(Debug, Eq, PartialEq)]
pub struct InvalidBackendUrl {
  pub url: String,
}

impl fmt::Display for InvalidBackendUrl {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "invalid backend url: {}", self.url)
  }
}

impl Error for InvalidBackendUrl {}

impl Backend {
  pub fn new(
    url: &str,
    weight: u32,
    max_consecutive_errors: u32,
    circuit_timeout: Duration,
  ) -> Result<Backend, InvalidBackendUrl> {
    let url = url.trim_end_matches('/').to_string();
    let uri = url.parse::<Uri>().map_err(|_| InvalidBackendUrl { url: url.clone() })?;
    if uri.scheme_str().is_none() || uri.authority().is_none() {
      return Err(InvalidBackendUrl { url });
    }

    Ok(Backend {
      uri,
      url,
      weight,
      alive: RwLock::new(true),
      connections: AtomicUsize::new(0),
      circuit: Mutex::new(CircuitState {
        consecutive_errors: 0,
        circuit_open: false,
        last_error_time: None,
      }),
      max_consecutive_errors,
      circuit_timeout,
    })
  }

  pub fn uri(&self) -> &Uri {
    &self.uri
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Prober-only caller.
  pub fn mark_alive(&self, alive: bool) {
    *self.alive.write().unwrap() = alive;
  }

  pub fn is_alive(&self) -> bool {
    *self.alive.read().unwrap()
  }

  pub fn record_success(&self) {
    let mut circuit = self.circuit.lock().unwrap();
    if circuit.consecutive_errors > 0 {
      info!("backend {} recovered, error count reset", self.url);
    }
    circuit.consecutive_errors = 0;
    circuit.circuit_open = false;
  }

  /// Returns the consecutive error count after this error.
  pub fn record_error(&self) -> u32 {
    let mut circuit = self.circuit.lock().unwrap();
    circuit.consecutive_errors += 1;
    circuit.last_error_time = Some(Instant::now());
    if !circuit.circuit_open && circuit.consecutive_errors >= self.max_consecutive_errors {
      circuit.circuit_open = true;
      warn!(
        "circuit breaker for {} opened after {} consecutive errors",
        self.url, circuit.consecutive_errors
      );
    }
    circuit.consecutive_errors
  }

  /// Effective open state. An open circuit whose timeout has elapsed closes
  /// here and starts with a clean error count.
  pub fn is_circuit_open(&self) -> bool {
    let mut circuit = self.circuit.lock().unwrap();
    if !circuit.circuit_open {
      return false;
    }
    match circuit.last_error_time {
      Some(last_error) if last_error.elapsed() > self.circuit_timeout => {
        circuit.circuit_open = false;
        circuit.consecutive_errors = 0;
        info!("circuit breaker for {} closed after timeout", self.url);
        false
      }
      _ => true,
    }
  }

  pub fn is_available(&self) -> bool {
    self.is_alive() && !self.is_circuit_open()
  }

  pub fn consecutive_errors(&self) -> u32 {
    self.circuit.lock().unwrap().consecutive_errors
  }

  pub fn connections(&self) -> usize {
    self.connections.load(Ordering::Relaxed)
  }

  /// Counts an in-flight request against this backend until the guard drops.
  pub fn track_connection(self: &Arc<Self>) -> ConnectionGuard {
    self.connections.fetch_add(1, Ordering::Relaxed);
    ConnectionGuard { backend: self.clone() }
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.url)
  }
}

#[derive(Debug)]
pub struct ConnectionGuard {
  backend: Arc<Backend>,
}

impl Drop for ConnectionGuard {
  fn drop(&mut self) {
    self.backend.connections.fetch_sub(1, Ordering::Relaxed);
  }
}
