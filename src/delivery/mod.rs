//! 响应分发模块：把结果送回调用方的执行上下文。
//!
//! # Response Delivery Module
//!
//! Marshals parsed responses and errors onto the caller's execution context
//! and finishes the request afterwards. Cancellation is checked once more on
//! that context so a canceled request never reaches its callbacks.

mod executor;

pub use executor::{
    ChannelExecutor, DeliveryExecutor, DeliveryLoop, ImmediateExecutor, Job, TokioExecutor,
};

use crate::error::RequestError;
use crate::request::{Dispatch, Payload, Response};
use std::sync::Arc;

/// Work to run after a delivery completes.
pub type Continuation = Box<dyn FnOnce() + Send>;

/// Posts results to the caller. Every post marks the request delivered.
pub trait ResponseDelivery: Send + Sync {
    fn post_response(&self, request: Arc<dyn Dispatch>, response: Response<Payload>);

    /// Post a response and run `continuation` on the delivery context after
    /// the callback.
    fn post_response_with(
        &self,
        request: Arc<dyn Dispatch>,
        response: Response<Payload>,
        continuation: Continuation,
    );

    fn post_error(&self, request: Arc<dyn Dispatch>, error: RequestError);
}

/// [`ResponseDelivery`] over any [`DeliveryExecutor`].
pub struct ExecutorDelivery {
    executor: Arc<dyn DeliveryExecutor>,
}

impl ExecutorDelivery {
    pub fn new(executor: impl DeliveryExecutor + 'static) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    pub fn from_arc(executor: Arc<dyn DeliveryExecutor>) -> Self {
        Self { executor }
    }

    fn schedule(
        &self,
        request: Arc<dyn Dispatch>,
        response: Response<Payload>,
        continuation: Option<Continuation>,
    ) {
        request.core().mark_delivered();
        request.core().add_marker("post-response");
        self.executor
            .execute(Box::new(move || run_delivery(request, response, continuation)));
    }
}

fn run_delivery(
    request: Arc<dyn Dispatch>,
    response: Response<Payload>,
    continuation: Option<Continuation>,
) {
    if request.core().is_canceled() {
        request.finish("canceled-at-delivery");
        return;
    }

    match response.result {
        Ok(payload) => request.deliver_response(payload),
        Err(error) => request.deliver_error(error),
    }

    if response.intermediate {
        request.core().add_marker("intermediate-response");
    } else {
        request.finish("done");
    }

    if let Some(continuation) = continuation {
        continuation();
    }
}

impl ResponseDelivery for ExecutorDelivery {
    fn post_response(&self, request: Arc<dyn Dispatch>, response: Response<Payload>) {
        self.schedule(request, response, None);
    }

    fn post_response_with(
        &self,
        request: Arc<dyn Dispatch>,
        response: Response<Payload>,
        continuation: Continuation,
    ) {
        self.schedule(request, response, Some(continuation));
    }

    fn post_error(&self, request: Arc<dyn Dispatch>, error: RequestError) {
        request.core().add_marker("post-error");
        self.schedule(request, Response::error(error), None);
    }
}
