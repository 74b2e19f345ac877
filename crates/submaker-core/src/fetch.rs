//! Completed HTTP exchanges as reported back by hosts.

/// Response to a request issued through an effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpReply {
    /// Status code.
    pub status: u16,
    /// Body decoded as text.
    pub body: String,
    /// `Content-Disposition` header, when present.
    pub content_disposition: Option<String>,
}

impl HttpReply {
    /// Reply with a status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_disposition: None,
        }
    }

    /// Attach a `Content-Disposition` header.
    #[must_use]
    pub fn with_content_disposition(mut self, value: impl Into<String>) -> Self {
        self.content_disposition = Some(value.into());
        self
    }

    /// 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Request that never produced a response (network error, abort, CORS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure(pub String);

impl FetchFailure {
    /// Failure with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one request.
pub type FetchResult = Result<HttpReply, FetchFailure>;
