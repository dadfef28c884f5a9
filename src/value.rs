//! Converting a handler's return value into response state.

use crate::arg::ReturnValue;
use crate::context::{RequestContext, ResponseBody, ResponseEntity};
use crate::error::WebError;
use crate::method::HandlerMethod;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use serde::Serialize;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

#[async_trait]
pub trait HandlerValueResolver: Send + Sync {
    async fn resolve_value(
        &self,
        ctx: &mut RequestContext,
        handler: &HandlerMethod,
        value: Option<ReturnValue>,
    ) -> Result<(), WebError>;
}

/// One return type conversion. Hands the value back when it is not of a type
/// this handler understands.
pub trait ReturnValueHandler: Send + Sync {
    fn handle(&self, ctx: &mut RequestContext, value: ReturnValue) -> Result<Option<ReturnValue>, WebError>;
}

/// Serializes return values of type `T` as a JSON body.
pub struct JsonReturnHandler<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonReturnHandler<T> {
    fn default() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T: Serialize + Any + Send> ReturnValueHandler for JsonReturnHandler<T> {
    fn handle(&self, ctx: &mut RequestContext, value: ReturnValue) -> Result<Option<ReturnValue>, WebError> {
        match value.downcast::<T>() {
            Ok(value) => {
                let json = serde_json::to_value(&*value)
                    .map_err(|e| WebError::internal(format!("cannot serialize {}: {e}", std::any::type_name::<T>())))?;
                ctx.response_mut().set_json(json);
                Ok(None)
            }
            Err(other) => Ok(Some(other)),
        }
    }
}

/// Custom handlers first, then the built-in conversions:
///
/// | Return | Effect |
/// |---|---|
/// | null, `()` | nothing |
/// | `String`, `&'static str` | text body |
/// | `serde_json::Value` | JSON body |
/// | `Bytes`, `Vec<u8>` | raw body |
/// | `StatusCode` | status only |
/// | `ResponseEntity` | status, headers and body |
#[derive(Clone, Default)]
pub struct DefaultValueResolver {
    handlers: Vec<Arc<dyn ReturnValueHandler>>,
}

impl DefaultValueResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: impl ReturnValueHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Shorthand for a [`JsonReturnHandler`] of `T`.
    pub fn with_json<T: Serialize + Any + Send>(self) -> Self {
        self.with_handler(JsonReturnHandler::<T>::default())
    }

    fn builtin(ctx: &mut RequestContext, value: ReturnValue) -> Result<(), ReturnValue> {
        let response = ctx.response_mut();
        let value = match value.downcast::<()>() {
            Ok(_) => return Ok(()),
            Err(v) => v,
        };
        let value = match value.downcast::<String>() {
            Ok(text) => {
                response.set_text(*text);
                return Ok(());
            }
            Err(v) => v,
        };
        let value = match value.downcast::<&'static str>() {
            Ok(text) => {
                response.set_text(*text);
                return Ok(());
            }
            Err(v) => v,
        };
        let value = match value.downcast::<serde_json::Value>() {
            Ok(json) => {
                response.set_json(*json);
                return Ok(());
            }
            Err(v) => v,
        };
        let value = match value.downcast::<Bytes>() {
            Ok(bytes) => {
                response.set_body(ResponseBody::Bytes(*bytes));
                return Ok(());
            }
            Err(v) => v,
        };
        let value = match value.downcast::<Vec<u8>>() {
            Ok(bytes) => {
                response.set_body(ResponseBody::Bytes(Bytes::from(*bytes)));
                return Ok(());
            }
            Err(v) => v,
        };
        let value = match value.downcast::<StatusCode>() {
            Ok(status) => {
                response.set_status(*status);
                return Ok(());
            }
            Err(v) => v,
        };
        let entity = value.downcast::<ResponseEntity>()?;
        response.apply(*entity);
        Ok(())
    }
}

#[async_trait]
impl HandlerValueResolver for DefaultValueResolver {
    async fn resolve_value(
        &self,
        ctx: &mut RequestContext,
        handler: &HandlerMethod,
        value: Option<ReturnValue>,
    ) -> Result<(), WebError> {
        let Some(mut value) = value else {
            return Ok(());
        };
        for custom in &self.handlers {
            match custom.handle(ctx, value)? {
                Some(unhandled) => value = unhandled,
                None => return Ok(()),
            }
        }
        Self::builtin(ctx, value).map_err(|_| {
            WebError::internal(format!(
                "No return value handler for {} returned by {handler}",
                handler.return_type()
            ))
        })
    }
}
