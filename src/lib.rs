//! # Meshdispatch
//!
//! The handler execution pipeline of an annotation-style web framework.
//!
//! Given a matched route and a request, Meshdispatch obtains the handler's
//! bean, resolves every method argument through a pluggable resolver chain,
//! runs filters and interceptors around the call, invokes the handler
//! (synchronous or future-returning) and turns its return value into a
//! response.
//!
//! ## Features
//!
//! - **Argument resolution**: path, query, header, attribute, body and
//!   deployment-context parameters, with resolver advices (pipes) around them
//! - **Bean scopes**: singleton, per-request prototype with constructor,
//!   field and setter injection, or externally supplied
//! - **Interceptors**: `pre_handle` short-circuit, `post_handle`, and
//!   `after_completion` in reverse over the interceptors that ran
//! - **Filters**: chain-of-responsibility stages around the whole route
//! - **Handler advices and aspects** around invocation
//! - **Tower integration**: mount a route on an axum `Router`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshdispatch::prelude::*;
//!
//! struct UserController {
//!     greeting: String,
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let show = HandlerMethod::builder::<UserController>("show")
//!         .param(MethodParameter::path::<u64>("id"))
//!         .returns::<String>()
//!         .handler(|controller, args| {
//!             let id = args.get::<u64>(0)?;
//!             Ok(ret(format!("{} #{id}", controller.greeting)))
//!         })
//!         .build();
//!
//!     let mut container = Container::new();
//!     container.register(UserController {
//!         greeting: "user".into(),
//!     });
//!
//!     let registry = RouteRegistry::new(Arc::new(container))
//!         .with_interceptor(InterceptorMapping::new(LoggingInterceptor));
//!     let service = registry.service(HandlerMapping::new(show)).unwrap();
//!
//!     let app: Router = Router::new().route_service("/users/{id}", service);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

extern crate self as meshdispatch;

pub mod arg;
pub mod bean;
pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod exception;
pub mod execution;
pub mod filter;
pub mod interceptor;
pub mod invoke;
pub mod method;
pub mod resolve;
pub mod route;
pub mod service;
pub mod value;

// Re-export core types
pub use arg::{Arg, Args, ReturnValue, Value, ret, ret_future};
pub use bean::{Bean, BeanDefinition, BeanScope, Prototype};
pub use config::{ConfigService, PipelineConfig};
pub use context::RequestContext;
pub use di::{Container, ContainerBuilder};
pub use error::{BoxError, RegistrationError, Result, WebError};
pub use execution::{ExecutionHandler, Outcome, RouteExecution};
pub use method::{HandlerMethod, MethodParameter};
pub use route::{HandlerMapping, RouteRegistry};
pub use service::RouteService;

// Re-export macros
pub use meshdispatch_macro::Prototype as DerivePrototype;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use meshdispatch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::DerivePrototype as Prototype;
    pub use crate::arg::{
        Arg, Args, ReturnValue, Value, optional_arc, optional_cloned, required_arc, required_cloned, ret, ret_future,
    };
    pub use crate::bean::{Bean, BeanDefinition, BeanDescriptor, BeanScope, Prototype};
    pub use crate::config::{ConfigService, PipelineConfig};
    pub use crate::context::{RequestContext, ResponseBody, ResponseEntity};
    pub use crate::di::{Container, ContainerBuilder};
    pub use crate::error::{BoxError, RegistrationError, WebError};
    pub use crate::exception::{
        CompletionHandler, DefaultExceptionHandler, ExceptionHandler, LoggingCompletionHandler,
    };
    pub use crate::execution::{ExecutionHandler, Outcome, RouteExecution};
    pub use crate::filter::{Next, RouteFilter};
    pub use crate::interceptor::{
        Guard, GuardError, GuardInterceptor, GuardResult, HandlerInterceptor, InterceptorMapping,
        InterceptorResult, LoggingInterceptor, PathPredicate,
    };
    pub use crate::invoke::{Aspect, AspectAdvice, AspectResult, HandlerAdvice, Invocation, InvocationError};
    pub use crate::method::{HandlerMethod, MethodParameter, ParamSource};
    pub use crate::resolve::{
        DefaultResolverFactory, ParseIntPipe, Pipe, PipeAdvice, PipeError, PipeResult, ResolverAdvice,
    };
    pub use crate::route::{HandlerMapping, RouteRegistry};
    pub use crate::service::RouteService;
    pub use crate::value::{DefaultValueResolver, HandlerValueResolver};
    pub use async_trait::async_trait;
    pub use axum::{
        Router,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    pub use std::sync::Arc;
}
