use super::{ContextResolver, ParamResolver, RequestEntityResolver};
use crate::arg::{Arg, Value};
use crate::context::RequestContext;
use crate::di::Container;
use crate::error::BoxError;
use crate::method::{MethodParameter, ParamSource};
use async_trait::async_trait;
use axum::body::Bytes;

/// Handles a value the request does not carry: the declared default wins,
/// then null for optional parameters.
fn absent(param: &MethodParameter) -> Result<Arg, BoxError> {
    if let Some(default) = param.get_default_value() {
        return param.decode(default.as_bytes()).map(Some);
    }
    if param.is_required() {
        return Err(format!("missing {} for parameter '{}'", param.param_source(), param.name()).into());
    }
    Ok(None)
}

fn decode_text(param: &MethodParameter, raw: Option<&str>) -> Result<Arg, BoxError> {
    match raw {
        Some(raw) => param
            .decode(raw.as_bytes())
            .map(Some)
            .map_err(|e| format!("cannot convert {} to {}: {e}", param.param_source(), param.type_descriptor()).into()),
        None => absent(param),
    }
}

/// Beans registered in the deployment [`Container`], looked up by declared type.
#[derive(Debug, Default, Clone)]
pub struct ContainerResolver;

#[async_trait]
impl ContextResolver for ContainerResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.param_source(), ParamSource::Context)
    }

    async fn resolve(&self, deployment: &Container, param: &MethodParameter) -> Result<Arg, BoxError> {
        match deployment.resolve_value(param.type_descriptor().id()) {
            Some(bean) => Ok(Some(bean)),
            None if param.is_required() => Err(format!(
                "no bean of type {} in the deployment context",
                param.type_descriptor()
            )
            .into()),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PathVariableResolver;

#[async_trait]
impl ParamResolver for PathVariableResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.param_source(), ParamSource::Path(_))
    }

    async fn resolve(&self, ctx: &mut RequestContext, param: &MethodParameter) -> Result<Arg, BoxError> {
        let ParamSource::Path(name) = param.param_source() else {
            return absent(param);
        };
        decode_text(param, ctx.path_variable(name))
    }
}

#[derive(Debug, Default, Clone)]
pub struct QueryParamResolver;

#[async_trait]
impl ParamResolver for QueryParamResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.param_source(), ParamSource::Query(_))
    }

    async fn resolve(&self, ctx: &mut RequestContext, param: &MethodParameter) -> Result<Arg, BoxError> {
        let ParamSource::Query(name) = param.param_source() else {
            return absent(param);
        };
        decode_text(param, ctx.query_param(name))
    }
}

#[derive(Debug, Default, Clone)]
pub struct HeaderResolver;

#[async_trait]
impl ParamResolver for HeaderResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.param_source(), ParamSource::Header(_))
    }

    async fn resolve(&self, ctx: &mut RequestContext, param: &MethodParameter) -> Result<Arg, BoxError> {
        let ParamSource::Header(name) = param.param_source() else {
            return absent(param);
        };
        decode_text(param, ctx.header(name))
    }
}

/// Values placed in the attribute bag by filters or interceptors.
#[derive(Debug, Default, Clone)]
pub struct AttributeResolver;

#[async_trait]
impl ParamResolver for AttributeResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.param_source(), ParamSource::Attribute(_))
    }

    async fn resolve(&self, ctx: &mut RequestContext, param: &MethodParameter) -> Result<Arg, BoxError> {
        let ParamSource::Attribute(key) = param.param_source() else {
            return absent(param);
        };
        match ctx.attributes().get_value(key) {
            Some(value) if value.concrete_type_id() == param.type_descriptor().id() => Ok(Some(value.clone())),
            Some(value) => Err(format!(
                "attribute '{key}' holds {}, expected {}",
                value.type_name(),
                param.type_descriptor()
            )
            .into()),
            None => absent(param),
        }
    }
}

/// JSON bodies, decoded with the parameter's decoder or into `serde_json::Value`.
#[derive(Debug, Default, Clone)]
pub struct JsonEntityResolver;

#[async_trait]
impl RequestEntityResolver for JsonEntityResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.param_source(), ParamSource::Body)
            && (param.get_decoder().is_some() || param.is::<serde_json::Value>())
    }

    async fn read(&self, ctx: &mut RequestContext, param: &MethodParameter) -> Result<Option<Arg>, BoxError> {
        if let Some(content_type) = ctx.content_type() {
            if !content_type.contains("json") {
                return Ok(None);
            }
        }
        if ctx.body().is_empty() {
            return absent(param).map(Some);
        }
        let value = match param.get_decoder() {
            Some(decoder) => decoder(ctx.body())?,
            None => Value::new(serde_json::from_slice::<serde_json::Value>(ctx.body())?),
        };
        Ok(Some(Some(value)))
    }
}

/// The body as UTF-8 text, for parameters declared as `String`.
#[derive(Debug, Default, Clone)]
pub struct TextEntityResolver;

#[async_trait]
impl RequestEntityResolver for TextEntityResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.param_source(), ParamSource::Body) && param.is::<String>()
    }

    async fn read(&self, ctx: &mut RequestContext, param: &MethodParameter) -> Result<Option<Arg>, BoxError> {
        if ctx.body().is_empty() {
            return absent(param).map(Some);
        }
        let text = std::str::from_utf8(ctx.body())?.to_string();
        Ok(Some(Some(Value::new(text))))
    }
}

/// The raw body, for parameters declared as `Bytes`.
#[derive(Debug, Default, Clone)]
pub struct BytesEntityResolver;

#[async_trait]
impl RequestEntityResolver for BytesEntityResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.param_source(), ParamSource::Body) && param.is::<Bytes>()
    }

    async fn read(&self, ctx: &mut RequestContext, _param: &MethodParameter) -> Result<Option<Arg>, BoxError> {
        Ok(Some(Some(Value::new(ctx.body().clone()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        id: u32,
    }

    struct Repo;

    #[tokio::test]
    async fn test_container_resolver() {
        let mut container = Container::new();
        container.register(Repo);

        let found = ContainerResolver
            .resolve(&container, &MethodParameter::context::<Repo>("repo"))
            .await
            .unwrap();
        assert!(found.unwrap().is::<Repo>());

        let missing = MethodParameter::context::<String>("name");
        assert!(ContainerResolver.resolve(&container, &missing).await.is_err());
        let optional = missing.optional();
        assert!(ContainerResolver.resolve(&container, &optional).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_path_and_query_resolution() {
        let mut ctx = RequestContext::get("/users/7?page=3").with_path_variable("id", "7");

        let id = PathVariableResolver
            .resolve(&mut ctx, &MethodParameter::path::<u64>("id"))
            .await
            .unwrap();
        assert_eq!(*id.unwrap().downcast::<u64>().unwrap(), 7);

        let page = QueryParamResolver
            .resolve(&mut ctx, &MethodParameter::query::<u32>("page"))
            .await
            .unwrap();
        assert_eq!(*page.unwrap().downcast::<u32>().unwrap(), 3);

        let size = QueryParamResolver
            .resolve(&mut ctx, &MethodParameter::query::<u32>("size").default_value("20"))
            .await
            .unwrap();
        assert_eq!(*size.unwrap().downcast::<u32>().unwrap(), 20);

        let err = QueryParamResolver
            .resolve(&mut ctx, &MethodParameter::query::<u32>("sort"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("query parameter 'sort'"), "{err}");
    }

    #[tokio::test]
    async fn test_header_conversion_failure() {
        let mut ctx = RequestContext::get("/").with_header("x-count", "many");
        let err = HeaderResolver
            .resolve(&mut ctx, &MethodParameter::header::<u8>("x-count"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("cannot convert header 'x-count'"), "{err}");
    }

    #[tokio::test]
    async fn test_attribute_type_is_checked() {
        let mut ctx = RequestContext::get("/");
        ctx.attributes_mut().insert("user", 42_u64);

        let ok = AttributeResolver
            .resolve(&mut ctx, &MethodParameter::attribute::<u64>("user"))
            .await
            .unwrap();
        assert_eq!(*ok.unwrap().downcast::<u64>().unwrap(), 42);

        assert!(AttributeResolver
            .resolve(&mut ctx, &MethodParameter::attribute::<String>("user"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_entity_readers() {
        let mut ctx = RequestContext::with_method(Method::POST, "/", r#"{"id":5}"#)
            .with_header("content-type", "application/json");

        let param = MethodParameter::body::<Payload>("payload");
        assert!(JsonEntityResolver.supports(&param));
        let payload = JsonEntityResolver.read(&mut ctx, &param).await.unwrap().unwrap();
        assert_eq!(*payload.unwrap().downcast::<Payload>().unwrap(), Payload { id: 5 });

        let text = MethodParameter::raw_body::<String>("text");
        assert!(!JsonEntityResolver.supports(&text));
        let raw = TextEntityResolver.read(&mut ctx, &text).await.unwrap().unwrap();
        assert_eq!(*raw.unwrap().downcast::<String>().unwrap(), r#"{"id":5}"#);

        let bytes = MethodParameter::raw_body::<Bytes>("bytes");
        let raw: Arc<Bytes> = BytesEntityResolver
            .read(&mut ctx, &bytes)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .downcast()
            .unwrap();
        assert_eq!(raw.len(), 8);
    }

    #[tokio::test]
    async fn test_json_reader_skips_other_content_types() {
        let mut ctx = RequestContext::with_method(Method::POST, "/", "id=5")
            .with_header("content-type", "application/x-www-form-urlencoded");
        let param = MethodParameter::body::<Payload>("payload");
        assert!(JsonEntityResolver.read(&mut ctx, &param).await.unwrap().is_none());
    }
}
