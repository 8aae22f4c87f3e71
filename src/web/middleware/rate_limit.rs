//! Tower layer that gates a route group behind a [`RateLimiter`].
//!
//! Applied as a `route_layer` on the AI description and spreadsheet logging
//! routes. A limited request never reaches the handler: it is answered with
//! `429`, a JSON error body and the `X-RateLimit-*` headers.

use crate::rate_limit::{RateLimitDecision, SharedRateLimiter, rate_limit_headers};
use crate::web::error::ApiError;
use crate::web::middleware::client_ip::client_identifier;
use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: SharedRateLimiter,
}

impl RateLimitLayer {
    pub fn new(limiter: SharedRateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: SharedRateLimiter,
}

impl<S, ResBody> Service<Request> for RateLimitService<S>
where
    S: Service<Request, Response = Response<ResBody>> + Send + Clone + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug + Send,
    ResBody: Send + 'static,
    Body: Into<ResBody>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let client_id = client_identifier(req.headers());
        let decision = self.limiter.check(&client_id);

        if !decision.limited {
            return Box::pin(self.inner.call(req));
        }

        warn!(
            client_id = %client_id,
            path = %req.uri().path(),
            reset_in_ms = decision.reset_in.as_millis() as u64,
            "Rate limit exceeded"
        );
        let limit = self.limiter.config().max_requests;
        let resp = rate_limited_response(decision, limit).map(Into::into);
        Box::pin(async move { Ok(resp) })
    }
}

fn rate_limited_response(decision: RateLimitDecision, limit: u32) -> Response<Body> {
    let mut response = ApiError::rate_limited().into_response();
    response.headers_mut().extend(rate_limit_headers(
        decision.remaining,
        decision.reset_in,
        limit,
    ));
    response
}
