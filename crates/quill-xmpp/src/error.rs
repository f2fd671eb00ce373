//! Error types for the XMPP protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
///
/// Two variants are control-flow signals rather than failures:
/// [`ProtocolError::StreamClosed`] reports an orderly `</stream:stream>`
/// from the peer, and [`ProtocolError::RequireRestart`] reports that the
/// transport upgraded itself in-band (STARTTLS) and the stream must redo
/// its header exchange.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream violated XML well-formedness.
    #[error("xml syntax error: {0}")]
    Syntax(String),

    /// A single top-level element exceeded the frame limit.
    #[error("frame too long: {actual} bytes (limit: {limit})")]
    FrameTooLong {
        /// Bytes buffered without finding a frame boundary.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The first element of a stream was not `<stream:stream>`.
    #[error("element is not a stream header: <{0}>")]
    NotStreamHeader(String),

    /// `start` was called on an initiating stream with no header set.
    #[error("stream header has not been set")]
    HeaderNotSet,

    /// The peer closed the stream with `</stream:stream>`.
    #[error("stream closed")]
    StreamClosed,

    /// The transport replaced its socket and decoder (STARTTLS); the
    /// caller must restart the stream.
    #[error("transport upgraded, stream restart required")]
    RequireRestart,

    /// The peer answered a TLS upgrade request with `<failure/>`.
    #[error("peer refused the TLS upgrade")]
    UpgradeRefused,

    /// An element could not be projected onto the requested stanza type.
    #[error("element is not a {expected} stanza: <{found}>")]
    NotStanza {
        /// The stanza kind that was expected.
        expected: &'static str,
        /// The local name actually found.
        found: String,
    },

    /// An IQ carried a `type` attribute outside `get|set|result|error`.
    #[error("invalid iq type: {0:?}")]
    InvalidIqType(String),
}

impl ProtocolError {
    /// Whether this error is a well-formedness violation that should be
    /// answered with `<stream:error><bad-format/></stream:error>`.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            ProtocolError::Syntax(_) | ProtocolError::FrameTooLong { .. }
        )
    }
}

#[cfg(feature = "tokio")]
impl From<quick_xml::Error> for ProtocolError {
    fn from(e: quick_xml::Error) -> Self {
        ProtocolError::Syntax(e.to_string())
    }
}
