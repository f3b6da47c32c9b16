// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use http_body_util::BodyExt;
use std::str::FromStr;

use crate::{CallbackRegistry, DeliveryOutcome};

#[derive(Clone)]
struct CallbackService {
    registry: std::sync::Arc<CallbackRegistry>,
}

impl hyper::service::Service<hyper::Request<hyper::body::Incoming>> for CallbackService {
    type Response = hyper::Response<http_body_util::Full<hyper::body::Bytes>>;

    type Error = anyhow::Error;

    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: hyper::Request<hyper::body::Incoming>) -> Self::Future {
        let registry = self.registry.clone();
        Box::pin(async move {
            if req.method() != hyper::Method::POST {
                return Ok(plain_response(hyper::StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"));
            }
            let (_, body) = req.into_parts();
            let data = body.collect().await?.to_bytes();
            let payload: serde_json::Value = match serde_json::from_slice(&data) {
                Ok(payload) => payload,
                Err(err) => {
                    log::warn!("Discarding callback with unparsable payload: {}", err);
                    return Ok(plain_response(hyper::StatusCode::BAD_REQUEST, "Bad Request"));
                }
            };
            match registry.deliver(&payload).await {
                DeliveryOutcome::Fulfilled { invocation_id } => {
                    log::debug!("Callback for invocation '{}' delivered", invocation_id);
                    Ok(plain_response(hyper::StatusCode::OK, "OK"))
                }
                DeliveryOutcome::Unknown => Ok(plain_response(hyper::StatusCode::NOT_FOUND, "Not Found")),
            }
        })
    }
}

fn plain_response(status: hyper::StatusCode, body: &'static str) -> hyper::Response<http_body_util::Full<hyper::body::Bytes>> {
    let mut response = hyper::Response::new(http_body_util::Full::new(hyper::body::Bytes::from(body)));
    *response.status_mut() = status;
    response
}

/// Bind the webhook receiver and serve callback deliveries into the
/// registry. The socket is bound before this function returns; the accept
/// loop runs in the returned task.
pub async fn receiver_task(
    registry: std::sync::Arc<CallbackRegistry>,
    callback_bind_url: &str,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let (_, host, port) = remotefn_api::util::parse_http_host(callback_bind_url)?;
    let addr = std::net::SocketAddr::from((std::net::IpAddr::from_str(&host)?, port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Callback receiver listening on {}", addr);

    let handle = tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(val) => val,
                Err(_) => {
                    log::error!("Accept Error");
                    continue;
                }
            };
            let io = hyper_util::rt::TokioIo::new(stream);
            let service = CallbackService {
                registry: registry.clone(),
            };
            tokio::task::spawn(async move {
                if let Err(err) = hyper::server::conn::http1::Builder::new().serve_connection(io, service).await {
                    log::warn!("Error serving callback connection: {:?}", err);
                }
            });
        }
    });
    Ok(handle)
}
