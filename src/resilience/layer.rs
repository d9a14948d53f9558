//! Tower middleware form of the executor.
//!
//! Every request runs through [`PolicyHandle::run`], so a wrapped service gets
//! the same retry, backoff and breaker behavior as a direct `execute` call.
//! Requests must be `Clone` because each attempt sends a fresh copy.

use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower::{Layer, Service, ServiceExt};

use crate::resilience::classifier::Classify;
use crate::resilience::error::ExecuteError;
use crate::resilience::executor::PolicyHandle;

#[derive(Debug, Clone)]
pub struct ResilienceLayer {
    handle: PolicyHandle,
}

impl ResilienceLayer {
    pub fn new(handle: PolicyHandle) -> Self {
        Self { handle }
    }
}

impl<S> Layer<S> for ResilienceLayer {
    type Service = ResilienceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResilienceService {
            inner,
            handle: self.handle.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResilienceService<S> {
    inner: S,
    handle: PolicyHandle,
}

impl<S, Req> Service<Req> for ResilienceService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send,
    S::Response: Send + 'static,
    S::Error: Classify + Send + 'static,
    Req: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = ExecuteError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is awaited per attempt on a clone of the inner service.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let inner = self.inner.clone();
        let handle = self.handle.clone();
        Box::pin(async move {
            handle
                .run(move || inner.clone().oneshot(request.clone()))
                .await
        })
    }
}
