//! # Telemetry module
//!
//! This module expose the health and metrics endpoints of the provisioner
//! through a small http server

use std::{collections::BTreeMap, convert::Infallible, net::SocketAddr, time::Instant};

use hyper::{
    header::{self, HeaderValue},
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use prometheus::{opts, register_counter_vec, CounterVec};
use tracing::{debug, info};

#[cfg(feature = "metrics")]
pub mod metrics;

// -----------------------------------------------------------------------------
// Telemetry

#[cfg(feature = "metrics")]
static SERVER_REQUEST: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "contour_provisioner_server_request",
            "number of request handled by the telemetry server",
        ),
        &["method", "path", "status"]
    )
    .expect("metrics 'contour_provisioner_server_request' to not be already registered")
});

#[cfg(feature = "metrics")]
static SERVER_REQUEST_DURATION: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        opts!(
            "contour_provisioner_server_request_duration",
            "duration of request handled by the telemetry server",
        ),
        &["method", "path", "unit"]
    )
    .expect("metrics 'contour_provisioner_server_request_duration' to not be already registered")
});

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "metrics")]
    #[error("{0}")]
    Metrics(metrics::Error),
    #[error("failed to serialize payload, {0}")]
    Serialize(serde_json::Error),
    #[error("failed to serve telemetry endpoints on '{0}', {1}")]
    Serve(SocketAddr, hyper::Error),
}

// -----------------------------------------------------------------------------
// Helper methods

/// listen on the given address until the server fails
pub async fn serve(addr: SocketAddr) -> Result<(), Error> {
    let service = make_service_fn(|_| async { Ok::<_, Infallible>(service_fn(router)) });

    info!(addr = addr.to_string(), "Begin to listen on address");
    Server::try_bind(&addr)
        .map_err(|err| Error::Serve(addr, err))?
        .serve(service)
        .await
        .map_err(|err| Error::Serve(addr, err))
}

pub async fn router(req: Request<Body>) -> Result<Response<Body>, Error> {
    let begin = Instant::now();

    let result = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => healthz(&req).await,
        #[cfg(feature = "metrics")]
        (&Method::GET, "/metrics") => metrics::handler(&req).await.map_err(Error::Metrics),
        _ => not_found(&req).await,
    };

    let res = match result {
        Ok(res) => res,
        Err(err) => internal_error(&err)?,
    };

    let duration = Instant::now().duration_since(begin).as_micros();
    let status = res.status().as_u16();
    debug!(
        method = req.method().as_str(),
        path = req.uri().path(),
        status = status,
        duration = duration,
        "Receive request"
    );

    #[cfg(feature = "metrics")]
    {
        SERVER_REQUEST
            .with_label_values(&[req.method().as_str(), req.uri().path(), &status.to_string()])
            .inc();

        SERVER_REQUEST_DURATION
            .with_label_values(&[req.method().as_str(), req.uri().path(), "us"])
            .inc_by(duration as f64);
    }

    Ok(res)
}

pub async fn healthz(_req: &Request<Body>) -> Result<Response<Body>, Error> {
    let mut res = Response::default();

    *res.status_mut() = StatusCode::NO_CONTENT;

    Ok(res)
}

pub async fn not_found(_req: &Request<Body>) -> Result<Response<Body>, Error> {
    let mut res = Response::default();

    *res.status_mut() = StatusCode::NOT_FOUND;

    Ok(res)
}

/// format the error as a json payload
fn internal_error(err: &Error) -> Result<Response<Body>, Error> {
    let map = BTreeMap::from([("error".to_string(), err.to_string())]);
    let mut res = Response::default();

    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    *res.body_mut() = Body::from(serde_json::to_string_pretty(&map).map_err(Error::Serialize)?);

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .expect("request to build")
    }

    #[tokio::test]
    async fn health_endpoint_answers() {
        let res = router(get("/healthz")).await.expect("request to be handled");
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = router(get("/unknown")).await.expect("request to be handled");
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(feature = "metrics")]
    #[tokio::test]
    async fn metrics_endpoint_answers() {
        let res = router(get("/metrics")).await.expect("request to be handled");
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(header::CONTENT_TYPE));
    }
}
