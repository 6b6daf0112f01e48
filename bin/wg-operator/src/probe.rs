//! Health, readiness and metrics endpoints

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::tokio::TokioIo;
use http_body_util::Full;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;

/// Serve probes on `addr` until the task is dropped
pub async fn serve(addr: SocketAddr, metrics: Metrics, ready: Arc<AtomicBool>) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Probe server listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();
        let ready = ready.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = respond(
                    req.method(),
                    req.uri().path(),
                    &metrics,
                    ready.load(Ordering::Relaxed),
                );
                async move { Ok::<_, hyper::Error>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving probe connection from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Mark the operator ready once every controller reports its cache synced.
/// A controller that stops first leaves it unready
pub async fn ready_when_synced(synced: Vec<oneshot::Receiver<()>>, ready: Arc<AtomicBool>) {
    for signal in synced {
        if signal.await.is_err() {
            warn!("A controller stopped before its cache synced");
            return;
        }
    }
    ready.store(true, Ordering::Relaxed);
    info!("Controller caches synced, ready");
}

fn respond(method: &Method, path: &str, metrics: &Metrics, ready: bool) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => match metrics.gather() {
            Ok(text) => {
                let mut response = text_response(StatusCode::OK, text);
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            Err(e) => {
                warn!("Failed to gather metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics\n")
            }
        },
        (&Method::GET, "/healthz") => text_response(StatusCode::OK, "OK\n"),
        (&Method::GET, "/readyz") if ready => text_response(StatusCode::OK, "OK\n"),
        (&Method::GET, "/readyz") => text_response(StatusCode::SERVICE_UNAVAILABLE, "Not ready\n"),
        _ => text_response(StatusCode::NOT_FOUND, "Not found\n"),
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}
