use hyper::{Body, Response, StatusCode};

pub fn service_unavailable() -> Response<Body> {
  Response::builder()
    .status(StatusCode::SERVICE_UNAVAILABLE)
    .body(Body::from("Service not available"))
    .unwrap()
}

pub fn internal_server_error() -> Response<Body> {
  Response::builder()
    .status(StatusCode::INTERNAL_SERVER_ERROR)
    .body(Body::from("Internal server error"))
    .unwrap()
}

pub fn bad_request<B>(message: B) -> Response<Body>
where
  Body: From<B>,
{
  Response::builder()
    .status(StatusCode::BAD_REQUEST)
    .body(Body::from(message))
    .unwrap()
}
