//! Metric exposition endpoint
//!
//! A plain HTTP/1.1 server answering `GET /metrics` with the text encoding
//! of the registry. Each connection is served on its own task.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::{debug, info};

use cumulo_common::Result;

/// Bind the exposition listener. Failing to bind is fatal at startup, so
/// this runs before the serving task is spawned.
pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!(addr = listen_addr, "serving metrics on /metrics");
    Ok(listener)
}

/// Serve the exposition endpoint forever
pub async fn serve_metrics(registry: Arc<Registry>, listener: TcpListener) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let registry = registry.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req: Request<Incoming>| {
                let registry = registry.clone();
                async move { Ok::<_, Infallible>(handle(&req, &registry)) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, error = %e, "metrics connection ended with error");
            }
        });
    }
}

fn handle<B>(req: &Request<B>, registry: &Registry) -> Response<Full<Bytes>> {
    if req.method() != Method::GET || req.uri().path() != "/metrics" {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .expect("static response");
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        return Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::new(Bytes::from(format!("encoding error: {e}"))))
            .expect("static response");
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, encoder.format_type())
        .body(Full::new(Bytes::from(buffer)))
        .expect("static response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::IntCounter;

    fn get(path: &str) -> Request<()> {
        Request::builder().method(Method::GET).uri(path).body(()).unwrap()
    }

    #[test]
    fn test_metrics_path_renders_registry() {
        let registry = Registry::new();
        let counter = IntCounter::new("test_counter_total", "help").unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc();

        let resp = handle(&get("/metrics"), &registry);
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_other_paths_are_404() {
        let registry = Registry::new();
        assert_eq!(handle(&get("/"), &registry).status(), StatusCode::NOT_FOUND);
        assert_eq!(handle(&get("/health"), &registry).status(), StatusCode::NOT_FOUND);
    }
}
