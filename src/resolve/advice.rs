use super::{ResolutionChain, ResolverAdvice};
use crate::arg::{Arg, Value};
use crate::context::RequestContext;
use crate::error::BoxError;
use crate::method::MethodParameter;
use async_trait::async_trait;
use std::any::Any;
use std::marker::PhantomData;

pub type PipeResult<T> = Result<T, PipeError>;

#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transformation failed: {0}")]
    Transformation(String),
}

/// Transformation or validation of a resolved argument
#[async_trait]
pub trait Pipe: Send + Sync + 'static {
    type Input: Any + Send + Sync;
    type Output: Any + Send + Sync;

    async fn transform(&self, input: &Self::Input) -> PipeResult<Self::Output>;
}

/// A pipe that parses a string into an integer
#[derive(Debug, Default, Clone)]
pub struct ParseIntPipe;

#[async_trait]
impl Pipe for ParseIntPipe {
    type Input = String;
    type Output = i64;

    async fn transform(&self, input: &String) -> PipeResult<i64> {
        input
            .trim()
            .parse::<i64>()
            .map_err(|_| PipeError::Validation(format!("'{input}' is not an integer")))
    }
}

/// Runs a [`Pipe`] over parameters declared with the pipe's output type.
///
/// Values already of the output type, and nulls, pass through untouched.
pub struct PipeAdvice<P: Pipe> {
    pipe: P,
}

impl<P: Pipe> PipeAdvice<P> {
    pub fn new(pipe: P) -> Self {
        Self { pipe }
    }
}

#[async_trait]
impl<P: Pipe> ResolverAdvice for PipeAdvice<P> {
    fn supports(&self, param: &MethodParameter) -> bool {
        param.is::<P::Output>()
    }

    async fn around(&self, ctx: &mut RequestContext, chain: ResolutionChain<'_>) -> Result<Arg, BoxError> {
        let Some(value) = chain.proceed(ctx).await? else {
            return Ok(None);
        };
        match value.downcast::<P::Input>() {
            Some(input) => {
                let output = self.pipe.transform(&input).await?;
                Ok(Some(Value::new(output)))
            }
            None => Ok(Some(value)),
        }
    }
}

/// Parses undecoded string arguments into the declared scalar type
/// (`i64`, `i32`, `u64`, `u32`, `f64`, `bool`).
#[derive(Debug, Default, Clone)]
pub struct ParseAdvice;

impl ParseAdvice {
    fn parse(param: &MethodParameter, text: &str) -> Result<Option<Value>, BoxError> {
        let text = text.trim();
        let value = if param.is::<i64>() {
            Value::new(text.parse::<i64>()?)
        } else if param.is::<i32>() {
            Value::new(text.parse::<i32>()?)
        } else if param.is::<u64>() {
            Value::new(text.parse::<u64>()?)
        } else if param.is::<u32>() {
            Value::new(text.parse::<u32>()?)
        } else if param.is::<f64>() {
            Value::new(text.parse::<f64>()?)
        } else if param.is::<bool>() {
            Value::new(text.parse::<bool>()?)
        } else {
            return Ok(None);
        };
        Ok(Some(value))
    }
}

#[async_trait]
impl ResolverAdvice for ParseAdvice {
    fn supports(&self, param: &MethodParameter) -> bool {
        param.get_decoder().is_none()
            && (param.is::<i64>()
                || param.is::<i32>()
                || param.is::<u64>()
                || param.is::<u32>()
                || param.is::<f64>()
                || param.is::<bool>())
    }

    async fn around(&self, ctx: &mut RequestContext, chain: ResolutionChain<'_>) -> Result<Arg, BoxError> {
        let param = chain.param();
        let Some(value) = chain.proceed(ctx).await? else {
            return Ok(None);
        };
        let Some(text) = value.downcast_ref::<String>() else {
            return Ok(Some(value));
        };
        match Self::parse(param, text) {
            Ok(Some(parsed)) => Ok(Some(parsed)),
            Ok(None) => Ok(Some(value)),
            Err(e) => Err(format!(
                "'{text}' is not a valid {} for parameter '{}': {e}",
                param.type_descriptor(),
                param.name()
            )
            .into()),
        }
    }
}

/// Replaces a null resolution of a `T` parameter with `T::default()`.
pub struct DefaultValueAdvice<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DefaultValueAdvice<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for DefaultValueAdvice<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Default + Any + Send + Sync> ResolverAdvice for DefaultValueAdvice<T> {
    fn supports(&self, param: &MethodParameter) -> bool {
        param.is::<T>()
    }

    async fn around(&self, ctx: &mut RequestContext, chain: ResolutionChain<'_>) -> Result<Arg, BoxError> {
        match chain.proceed(ctx).await? {
            Some(value) => Ok(Some(value)),
            None => Ok(Some(Value::new(T::default()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::Container;
    use crate::method::ParamSource;
    use crate::resolve::{ParamResolver, QueryParamResolver, ResolverKind, ResolverWrap};
    use std::sync::Arc;

    fn wrap(advice: Arc<dyn ResolverAdvice>) -> ResolverWrap {
        ResolverWrap::new(ResolverKind::Param(Arc::new(QueryParamResolver)), vec![advice])
    }

    fn undecoded<T: Any>(name: &str) -> MethodParameter {
        MethodParameter::new::<T>(name).source(ParamSource::Query(name.to_string()))
    }

    #[tokio::test]
    async fn test_parse_advice_converts_query_text() {
        let mut ctx = RequestContext::get("/?limit=25&active=true&ratio=x");
        let deployment = Container::new();
        let advice: Arc<dyn ResolverAdvice> = Arc::new(ParseAdvice);

        let limit = undecoded::<i64>("limit");
        assert!(advice.supports(&limit));
        let value = wrap(advice.clone()).resolve(&mut ctx, &deployment, &limit).await.unwrap();
        assert_eq!(*value.unwrap().downcast::<i64>().unwrap(), 25);

        let active = undecoded::<bool>("active");
        let value = wrap(advice.clone()).resolve(&mut ctx, &deployment, &active).await.unwrap();
        assert!(*value.unwrap().downcast::<bool>().unwrap());

        let ratio = undecoded::<f64>("ratio");
        let err = wrap(advice.clone()).resolve(&mut ctx, &deployment, &ratio).await.unwrap_err();
        assert!(err.to_string().contains("'x' is not a valid f64"), "{err}");

        assert!(!advice.supports(&MethodParameter::query::<i64>("limit")));
    }

    #[tokio::test]
    async fn test_pipe_advice() {
        let mut ctx = RequestContext::get("/?id=%2042");
        let deployment = Container::new();
        let advice: Arc<dyn ResolverAdvice> = Arc::new(PipeAdvice::new(ParseIntPipe));

        let id = undecoded::<i64>("id");
        assert!(advice.supports(&id));
        let value = wrap(advice.clone()).resolve(&mut ctx, &deployment, &id).await.unwrap();
        assert_eq!(*value.unwrap().downcast::<i64>().unwrap(), 42);

        let mut ctx = RequestContext::get("/?id=abc");
        let err = wrap(advice).resolve(&mut ctx, &deployment, &id).await.unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: 'abc' is not an integer");
    }

    #[tokio::test]
    async fn test_default_value_advice_fills_null() {
        let mut ctx = RequestContext::get("/");
        let deployment = Container::new();
        let advice: Arc<dyn ResolverAdvice> = Arc::new(DefaultValueAdvice::<Vec<String>>::new());

        let tags = MethodParameter::new::<Vec<String>>("tags")
            .source(ParamSource::Query("tags".into()))
            .optional();
        assert!(QueryParamResolver.resolve(&mut ctx, &tags).await.unwrap().is_none());

        let value = wrap(advice).resolve(&mut ctx, &deployment, &tags).await.unwrap();
        assert!(value.unwrap().downcast::<Vec<String>>().unwrap().is_empty());
    }
}
