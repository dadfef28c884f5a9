use crate::arg::{HandlerFuture, ReturnValue};
use crate::error::{BoxError, WebError};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tokio::task::JoinHandle;

pub type TransferFuture = BoxFuture<'static, Result<Option<ReturnValue>, WebError>>;

/// Normalizes a handler's raw return into a single asynchronous completion.
///
/// Chosen per handler method by the resolver factory, so the execution core
/// does not depend on any one future type.
pub trait FutureTransfer: Send + Sync {
    fn transfer(&self, raw: Option<ReturnValue>) -> TransferFuture;
}

/// For synchronous handlers: the raw value is already the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadyTransfer;

impl FutureTransfer for ReadyTransfer {
    fn transfer(&self, raw: Option<ReturnValue>) -> TransferFuture {
        future::ready(Ok(raw)).boxed()
    }
}

/// For concurrent handlers: awaits a boxed [`HandlerFuture`] or a spawned
/// task's `JoinHandle`. Any other value passes through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsyncTransfer;

type TaskHandle = JoinHandle<Result<Option<ReturnValue>, BoxError>>;

impl FutureTransfer for AsyncTransfer {
    fn transfer(&self, raw: Option<ReturnValue>) -> TransferFuture {
        let Some(raw) = raw else {
            return future::ready(Ok(None)).boxed();
        };

        let raw = match raw.downcast::<HandlerFuture>() {
            Ok(pending) => {
                return async move { (*pending).await.map_err(WebError::from) }.boxed();
            }
            Err(raw) => raw,
        };

        match raw.downcast::<TaskHandle>() {
            Ok(handle) => async move {
                match (*handle).await {
                    Ok(result) => result.map_err(WebError::from),
                    Err(join) if join.is_panic() => Err(WebError::from_panic(join.into_panic())),
                    Err(join) => Err(WebError::internal(format!("handler task did not complete: {join}"))),
                }
            }
            .boxed(),
            Err(value) => future::ready(Ok(Some(value))).boxed(),
        }
    }
}
