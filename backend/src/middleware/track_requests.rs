//! Request middleware correlating and logging every HTTP exchange.
//!
//! A request carrying a usable token in `x-request-id` keeps it (see
//! [`RequestId`] for what is accepted); any other request gets a fresh UUID. The identifier is placed in task-local storage
//! for the lifetime of the request (see [`RequestId::scope`]), echoed on the
//! response and attached to the single `info` event logged once the response
//! is ready.

use std::future::Future;
use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{error, info};

use crate::domain::RequestId;
use crate::domain::timing::round_to_millis;

/// Header carrying the request identifier in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn incoming_request_id(req: &ServiceRequest) -> Option<RequestId> {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Middleware assigning each request a [`RequestId`] and logging its outcome.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use accounts::middleware::TrackRequests;
///
/// let app = App::new().wrap(TrackRequests);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct TrackRequests;

impl<S, B> Transform<S, ServiceRequest> for TrackRequests
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TrackRequestsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TrackRequestsMiddleware { service }))
    }
}

/// Service wrapper produced by [`TrackRequests`].
pub struct TrackRequestsMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for TrackRequestsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let request_id = incoming_request_id(&req).unwrap_or_else(RequestId::generate);
        let method = req.method().to_string();
        let path = req.path().to_owned();
        let started = Instant::now();
        let fut = RequestId::scope(request_id.clone(), self.service.call(req));
        Box::pin(track(request_id, method, path, started, fut))
    }
}

async fn track<B, F>(
    request_id: RequestId,
    method: String,
    path: String,
    started: Instant,
    fut: F,
) -> Result<ServiceResponse<B>, Error>
where
    F: Future<Output = Result<ServiceResponse<B>, Error>>,
{
    let outcome = fut.await;
    let status = match &outcome {
        Ok(res) => res.status(),
        Err(err) => err.as_response_error().status_code(),
    };
    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = round_to_millis(started.elapsed()).as_millis(),
        request_id = %request_id,
        "request handled"
    );

    let mut res = outcome?;
    match HeaderValue::from_str(request_id.as_str()) {
        Ok(value) => {
            res.response_mut()
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        Err(error) => {
            error!(%error, request_id = %request_id, "failed to encode request identifier header");
        }
    }
    Ok(res)
}
