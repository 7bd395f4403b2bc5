use anyhow::Result;
use bridge_core::RelayMetrics;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{
    body::Bytes, server::conn::http1, service::service_fn, Method, Request, Response, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Serve `/metrics` and `/healthz` until the task is dropped
pub async fn serve_metrics(bind: SocketAddr, metrics: RelayMetrics) -> Result<()> {
    let listener = TcpListener::bind(&bind).await?;
    info!(address = %bind, "Metrics server listening");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Error accepting metrics connection");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let metrics = metrics.clone();
                async move { Ok::<_, Infallible>(handle_request(req, &metrics)) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(peer = %peer_addr, error = %e, "Error serving metrics connection");
            }
        });
    }
}

fn handle_request<B>(req: Request<B>, metrics: &RelayMetrics) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => match metrics.gather() {
            Ok(text) => response(StatusCode::OK, "text/plain; version=0.0.4", text),
            Err(e) => {
                warn!(error = %e, "Failed to gather metrics");
                response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    "Failed to gather metrics\n".to_string(),
                )
            }
        },
        (_, "/healthz") => response(StatusCode::OK, "text/plain", "OK\n".to_string()),
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found\n".to_string()),
    }
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
