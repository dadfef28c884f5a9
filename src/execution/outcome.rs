use crate::error::WebError;

/// The result of a pipeline stage.
///
/// `Suppressed` means an interceptor refused execution. It is not an error
/// and never reaches the caller of [`RouteExecution::handle`](super::RouteExecution::handle).
#[derive(Debug)]
pub enum Outcome<T> {
    Proceed(T),
    Suppressed,
    Failed(WebError),
}

impl<T> Outcome<T> {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Outcome::Suppressed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn error(&self) -> Option<&WebError> {
        match self {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Swallows the suppression: `Suppressed` becomes `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>, WebError> {
        match self {
            Outcome::Proceed(value) => Ok(Some(value)),
            Outcome::Suppressed => Ok(None),
            Outcome::Failed(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, WebError>> for Outcome<T> {
    fn from(result: Result<T, WebError>) -> Self {
        match result {
            Ok(value) => Outcome::Proceed(value),
            Err(error) => Outcome::Failed(error),
        }
    }
}
