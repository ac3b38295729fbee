use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;

/// A failure as reported by an operation, before classification.
///
/// Every field is optional: a `RawError` with nothing set is still a valid
/// input to [`classify`](crate::classify) and lands in `unknown`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawError {
    /// HTTP status returned by the provider, if a response was received
    pub status: Option<u16>,
    /// Network fault code such as `ECONNRESET` or `ETIMEDOUT`
    pub code: Option<String>,
    /// Free-form error text from the provider or transport
    pub message: Option<String>,
    /// Server-provided `Retry-After` hint
    pub retry_after: Option<Duration>,
}

impl RawError {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Failure carrying an HTTP status and response text
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new().with_status(status).with_message(message)
    }

    /// Transport failure identified by a network fault code
    #[must_use]
    pub fn network(code: impl Into<String>) -> Self {
        Self::new().with_code(code)
    }

    /// Failure described only by its message
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::new().with_message(message)
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(status) = self.status {
            write!(f, "HTTP {status}")?;
            wrote = true;
        }
        if let Some(code) = &self.code {
            if wrote {
                f.write_str(" ")?;
            }
            write!(f, "[{code}]")?;
            wrote = true;
        }
        if let Some(message) = &self.message {
            if wrote {
                f.write_str(": ")?;
            }
            f.write_str(message)?;
            wrote = true;
        }
        if !wrote {
            f.write_str("unspecified error")?;
        }
        Ok(())
    }
}

impl std::error::Error for RawError {}

/// Network fault code for an I/O error kind, if the kind is a transport failure
fn io_kind_code(kind: io::ErrorKind) -> Option<&'static str> {
    let code = match kind {
        io::ErrorKind::ConnectionReset => "ECONNRESET",
        io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
        io::ErrorKind::ConnectionAborted => "ECONNABORTED",
        io::ErrorKind::TimedOut => "ETIMEDOUT",
        io::ErrorKind::BrokenPipe => "EPIPE",
        io::ErrorKind::NotConnected => "ENOTCONN",
        io::ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        io::ErrorKind::HostUnreachable => "EHOSTUNREACH",
        io::ErrorKind::NetworkUnreachable => "ENETUNREACH",
        io::ErrorKind::NetworkDown => "ENETDOWN",
        _ => return None,
    };
    Some(code)
}

impl From<io::Error> for RawError {
    fn from(err: io::Error) -> Self {
        let raw = Self::message(err.to_string());
        match io_kind_code(err.kind()) {
            Some(code) => raw.with_code(code),
            None => raw,
        }
    }
}

impl From<&reqwest::Error> for RawError {
    fn from(err: &reqwest::Error) -> Self {
        let mut raw = Self::message(err.to_string());
        if let Some(status) = err.status() {
            raw = raw.with_status(status.as_u16());
        }
        if err.is_timeout() {
            raw = raw.with_code("ETIMEDOUT");
        } else if err.is_connect() {
            raw = raw.with_code("ECONNREFUSED");
        }
        raw
    }
}

impl From<reqwest::Error> for RawError {
    fn from(err: reqwest::Error) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_combines_present_fields() {
        let raw = RawError::http(503, "upstream overloaded").with_code("ECONNRESET");
        assert_eq!(raw.to_string(), "HTTP 503 [ECONNRESET]: upstream overloaded");
        assert_eq!(RawError::new().to_string(), "unspecified error");
        assert_eq!(RawError::network("ETIMEDOUT").to_string(), "[ETIMEDOUT]");
    }

    #[test]
    fn test_from_io_error_maps_transport_kinds() {
        let raw = RawError::from(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"));
        assert_eq!(raw.code.as_deref(), Some("ECONNRESET"));
        assert_eq!(raw.message.as_deref(), Some("peer reset"));

        let raw = RawError::from(io::Error::new(io::ErrorKind::InvalidData, "bad pdf header"));
        assert_eq!(raw.code, None);
        assert_eq!(raw.message.as_deref(), Some("bad pdf header"));
    }

    #[test]
    fn test_retry_after_builder() {
        let raw = RawError::http(429, "slow down").with_retry_after(Duration::from_secs(7));
        assert_eq!(raw.status, Some(429));
        assert_eq!(raw.retry_after, Some(Duration::from_secs(7)));
    }
}
