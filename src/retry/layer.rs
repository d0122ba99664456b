use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service, ServiceExt};

use crate::retry::config::RetryConfig;
use crate::retry::error::RetryError;
use crate::retry::retrier::Retrier;
use crate::task_manager::BoxError;

/// A [`tower::Layer`] that wraps services in a [`RetryService`].
#[derive(Debug, Clone)]
pub struct RetryLayer {
    retrier: Retrier,
    operation: String,
    config: RetryConfig,
}

impl RetryLayer {
    /// Every request through the layered service is retried under `operation`'s circuit breaker.
    pub fn new(retrier: Retrier, operation: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            retrier,
            operation: operation.into(),
            config,
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RetryService {
            service,
            retrier: self.retrier.clone(),
            operation: self.operation.clone(),
            config: self.config.clone(),
        }
    }
}

/// A [`tower::Service`] that retries failed requests with backoff.
#[derive(Debug, Clone)]
pub struct RetryService<S> {
    service: S,
    retrier: Retrier,
    operation: String,
    config: RetryConfig,
}

impl<S, Request> Service<Request> for RetryService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<BoxError> + Send,
    S::Future: Send + 'static,
    Request: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = RetryError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service
            .poll_ready(cx)
            .map_err(|e| RetryError::Operation(e.into()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // keep the instance that was driven to readiness for this call
        let clone = self.service.clone();
        let service = std::mem::replace(&mut self.service, clone);
        let retrier = self.retrier.clone();
        let operation = self.operation.clone();
        let config = self.config.clone();

        Box::pin(async move {
            retrier
                .execute(&operation, &config, move || {
                    let mut service = service.clone();
                    let req = req.clone();
                    async move {
                        let ready = service.ready().await.map_err(Into::<BoxError>::into)?;
                        ready.call(req).await.map_err(Into::<BoxError>::into)
                    }
                })
                .await
        })
    }
}
