use std::fmt::{Display, Formatter};

/// The error type returned by every client trait. Carries the service error code, when the remote
/// side provided one, so that callers can tell "not found" apart from real failures.
#[derive(Debug)]
pub struct ClientError {
    /// The service error code, e.g. `InvalidKeyPair.NotFound`.
    code: Option<String>,

    /// Any message to be included with the error. This will be included in the formatted display
    /// before `inner`.
    context: String,

    /// The error that caused this error.
    inner: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

/// The result type returned by client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn new_with_source_and_context<S, E>(context: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self {
            code: None,
            context: context.into(),
            inner: Some(source.into()),
        }
    }

    pub fn new_with_context<S>(context: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            code: None,
            context: context.into(),
            inner: None,
        }
    }

    /// Attach a service error code.
    pub fn with_code<S>(mut self, code: Option<S>) -> Self
    where
        S: Into<String>,
    {
        self.code = code.map(Into::into);
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn inner(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.inner.as_ref().map(|some| some.as_ref())
    }

    /// True when the remote side reported that the resource does not exist, e.g.
    /// `InvalidKeyPair.NotFound` or `InvalidGroup.NotFound`.
    pub fn is_not_found(&self) -> bool {
        self.code()
            .map(|code| code.ends_with(".NotFound") || code == "NotFound" || code == "NoSuchBucket")
            .unwrap_or(false)
    }

    /// True when the resource is still in use by another resource, which usually resolves itself
    /// once the other resource finishes terminating.
    pub fn is_dependency_violation(&self) -> bool {
        matches!(self.code(), Some("DependencyViolation") | Some("InvalidGroup.InUse"))
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.context)?;
        if let Some(code) = self.code() {
            write!(f, " ({})", code)?;
        }
        if let Some(inner) = self.inner() {
            write!(f, ": {}", inner)?;
        }
        Ok(())
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// A trait that makes it possible to convert error types to `ClientError` using a familiar
/// `context` function.
pub trait IntoClientError<T> {
    fn context<S>(self, message: S) -> ClientResult<T>
    where
        S: Into<String>;
}

impl<T, E> IntoClientError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<S>(self, message: S) -> ClientResult<T>
    where
        S: Into<String>,
    {
        self.map_err(|e| ClientError::new_with_source_and_context(message, e))
    }
}

// Options where `None` is converted into an error.
impl<T> IntoClientError<T> for std::option::Option<T> {
    fn context<S>(self, message: S) -> ClientResult<T>
    where
        S: Into<String>,
    {
        self.ok_or_else(|| ClientError::new_with_context(message))
    }
}
