use crate::arg::Value;
use crate::error::BoxError;
use crate::method::TypeDescriptor;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Converts raw request bytes (a path segment, a header, a body) into the
/// parameter's declared type.
pub type Decoder = Arc<dyn Fn(&[u8]) -> Result<Value, BoxError> + Send + Sync>;

/// Where a parameter's value is declared to come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Path(String),
    Query(String),
    Header(String),
    Attribute(String),
    Body,
    /// A bean from the deployment context.
    Context,
    /// No declaration; only a fixed argument or a custom resolver can supply it.
    Unbound,
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Path(name) => write!(f, "path variable '{name}'"),
            ParamSource::Query(name) => write!(f, "query parameter '{name}'"),
            ParamSource::Header(name) => write!(f, "header '{name}'"),
            ParamSource::Attribute(name) => write!(f, "request attribute '{name}'"),
            ParamSource::Body => f.write_str("request body"),
            ParamSource::Context => f.write_str("deployment context"),
            ParamSource::Unbound => f.write_str("unbound"),
        }
    }
}

/// One declared parameter of a handler method, constructor or setter.
#[derive(Clone)]
pub struct MethodParameter {
    index: usize,
    name: String,
    ty: TypeDescriptor,
    source: ParamSource,
    required: bool,
    default_value: Option<String>,
    decoder: Option<Decoder>,
}

fn parse_decoder<T>() -> Decoder
where
    T: FromStr + Any + Send + Sync,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Arc::new(|raw: &[u8]| -> Result<Value, BoxError> {
        let text = std::str::from_utf8(raw)?;
        let parsed = text.parse::<T>()?;
        Ok(Value::new(parsed))
    })
}

fn json_decoder<T>() -> Decoder
where
    T: DeserializeOwned + Any + Send + Sync,
{
    Arc::new(|raw: &[u8]| -> Result<Value, BoxError> {
        let parsed = serde_json::from_slice::<T>(raw)?;
        Ok(Value::new(parsed))
    })
}

impl MethodParameter {
    /// A parameter with no declared source.
    pub fn new<T: ?Sized + Any>(name: impl Into<String>) -> Self {
        Self {
            index: 0,
            name: name.into(),
            ty: TypeDescriptor::of::<T>(),
            source: ParamSource::Unbound,
            required: true,
            default_value: None,
            decoder: None,
        }
    }

    pub fn context<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self::new::<T>(name).source(ParamSource::Context)
    }

    pub fn path<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Any + Send + Sync,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let name = name.into();
        Self::new::<T>(name.clone())
            .source(ParamSource::Path(name))
            .decoder(parse_decoder::<T>())
    }

    pub fn query<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Any + Send + Sync,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let name = name.into();
        Self::new::<T>(name.clone())
            .source(ParamSource::Query(name))
            .decoder(parse_decoder::<T>())
    }

    pub fn header<T>(name: impl Into<String>) -> Self
    where
        T: FromStr + Any + Send + Sync,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let name = name.into();
        Self::new::<T>(name.clone())
            .source(ParamSource::Header(name))
            .decoder(parse_decoder::<T>())
    }

    /// A value already stored in the request's attribute bag under `key`.
    pub fn attribute<T: Any + Send + Sync>(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new::<T>(key.clone()).source(ParamSource::Attribute(key))
    }

    /// A JSON request body deserialized into `T`.
    pub fn body<T: DeserializeOwned + Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self::new::<T>(name)
            .source(ParamSource::Body)
            .decoder(json_decoder::<T>())
    }

    /// A request body read verbatim (`String` or `Bytes`).
    pub fn raw_body<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self::new::<T>(name).source(ParamSource::Body)
    }

    pub fn source(mut self, source: ParamSource) -> Self {
        self.source = source;
        self
    }

    pub fn decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// A missing value resolves to null instead of failing.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Raw text used when the request does not carry the value.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub(crate) fn at(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_descriptor(&self) -> TypeDescriptor {
        self.ty
    }

    pub fn is<T: ?Sized + Any>(&self) -> bool {
        self.ty.is::<T>()
    }

    pub fn param_source(&self) -> &ParamSource {
        &self.source
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn get_default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    pub fn get_decoder(&self) -> Option<&Decoder> {
        self.decoder.as_ref()
    }

    /// Decodes raw bytes with the declared decoder, or keeps them as a `String`.
    pub fn decode(&self, raw: &[u8]) -> Result<Value, BoxError> {
        match &self.decoder {
            Some(decoder) => decoder(raw),
            None => Ok(Value::new(String::from_utf8(raw.to_vec())?)),
        }
    }
}

impl fmt::Debug for MethodParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodParameter")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("type", &self.ty)
            .field("source", &self.source)
            .field("required", &self.required)
            .finish()
    }
}
