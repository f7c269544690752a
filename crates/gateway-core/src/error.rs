use std::fmt;

/// Error taxonomy for the gateway (spec.md §7).
///
/// Mirrors the teacher's `LLMError`: a plain enum with a hand-written
/// `Display` and targeted `From` impls, rather than a derive-macro error
/// crate. Each variant maps to exactly one row of the error taxonomy table.
#[derive(Debug)]
pub enum GatewayError {
    /// Malformed request body, unknown provider, missing target URL.
    ClientError(String),
    /// Target host not present in the SSRF allowlist.
    ForbiddenTarget(String),
    /// Upstream timed out.
    UpstreamTimeout(String),
    /// Upstream connection failure (refused, DNS, TLS, ...).
    UpstreamUnreachable(String),
    /// Upstream responded with a 5xx status; carries the original status.
    UpstreamServerError(u16, String),
    /// A pipe or summarizer failed; the request should still proceed with
    /// passthrough. Exposed as a value rather than propagated as an error
    /// in most call sites, but kept here for the cases that do need to
    /// report failure (e.g. adapter parse failures at the router).
    PipeError(String),
    /// Adapter could not parse the request/response body.
    AdapterError(String),
    /// Shadow id not found or expired.
    ShadowNotFound(String),
    /// Rate limit exceeded for the client.
    RateLimited,
    /// Any other internal invariant violation; maps to 500.
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::ClientError(e) => write!(f, "Client Error: {}", e),
            GatewayError::ForbiddenTarget(e) => write!(f, "Forbidden Target: {}", e),
            GatewayError::UpstreamTimeout(e) => write!(f, "Upstream Timeout: {}", e),
            GatewayError::UpstreamUnreachable(e) => write!(f, "Upstream Unreachable: {}", e),
            GatewayError::UpstreamServerError(status, e) => {
                write!(f, "Upstream Server Error ({}): {}", status, e)
            }
            GatewayError::PipeError(e) => write!(f, "Pipe Error: {}", e),
            GatewayError::AdapterError(e) => write!(f, "Adapter Error: {}", e),
            GatewayError::ShadowNotFound(id) => {
                write!(f, "shadow_id '{}' not found or expired", id)
            }
            GatewayError::RateLimited => write!(f, "Rate limit exceeded"),
            GatewayError::Internal(e) => write!(f, "Internal Error: {}", e),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::ClientError(format!(
            "{} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout(err.to_string())
        } else {
            GatewayError::UpstreamUnreachable(err.to_string())
        }
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(err: url::ParseError) -> Self {
        GatewayError::ClientError(format!("invalid URL: {}", err))
    }
}

impl GatewayError {
    /// HTTP status code this error maps to, per spec.md §7.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::ClientError(_) | GatewayError::AdapterError(_) => 400,
            GatewayError::ForbiddenTarget(_) => 403,
            GatewayError::ShadowNotFound(_) => 404,
            GatewayError::RateLimited => 429,
            GatewayError::UpstreamTimeout(_) => 504,
            GatewayError::UpstreamServerError(status, _) => *status,
            GatewayError::UpstreamUnreachable(_) => 502,
            GatewayError::PipeError(_) | GatewayError::Internal(_) => 500,
        }
    }
}
