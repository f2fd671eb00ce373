//! The `<stream:stream …>` preamble.
//!
//! The stream header is written once per stream (re)start and is never
//! closed by the element serializer; shutdown writes the literal
//! [`STREAM_CLOSE`].

use crate::element::{escape, Element};
use crate::error::ProtocolError;
use crate::ns;

/// The stream close tag, written exactly once at orderly shutdown.
pub const STREAM_CLOSE: &str = "</stream:stream>";

/// The attributes of the root `<stream:stream>` element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamHeader {
    /// Destination of the stream, from the writer's perspective.
    pub to: String,
    /// Origin of the stream.
    pub from: String,
    /// Stream identifier, assigned by the receiving entity.
    pub id: String,
    /// The `xml:lang` attribute.
    pub lang: String,
    /// The `version` attribute; `1.0` for RFC 6120 streams.
    pub version: String,
    /// The default namespace of the stream (`jabber:client` for C2S).
    pub namespace: String,
}

impl StreamHeader {
    /// Reads a header out of the root element. The element must be
    /// `<stream:stream>`.
    pub fn from_element(el: &Element) -> Result<StreamHeader, ProtocolError> {
        if el.prefix != "stream" || el.name != "stream" {
            let mut found = String::new();
            if !el.prefix.is_empty() {
                found.push_str(&el.prefix);
                found.push(':');
            }
            found.push_str(&el.name);
            return Err(ProtocolError::NotStreamHeader(found));
        }
        let mut header = StreamHeader::default();
        for attr in &el.attrs {
            match (attr.prefix.as_str(), attr.name.as_str()) {
                ("", "to") => header.to = attr.value.clone(),
                ("", "from") => header.from = attr.value.clone(),
                ("", "id") => header.id = attr.value.clone(),
                ("", "version") => header.version = attr.value.clone(),
                ("", "xmlns") => header.namespace = attr.value.clone(),
                ("xml", "lang") => header.lang = attr.value.clone(),
                _ => {}
            }
        }
        Ok(header)
    }

    /// Serializes the unclosed open tag.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::with_capacity(128);
        out.push_str("<stream:stream");
        out.push_str(&format!(" to='{}'", escape(&self.to)));
        out.push_str(&format!(" from='{}'", escape(&self.from)));
        out.push_str(&format!(" id='{}'", escape(&self.id)));
        out.push_str(&format!(" version='{}'", escape(&self.version)));
        if !self.lang.is_empty() {
            out.push_str(&format!(" xml:lang='{}'", escape(&self.lang)));
        }
        if !self.namespace.is_empty() {
            out.push_str(&format!(" xmlns='{}'", escape(&self.namespace)));
        }
        out.push_str(&format!(" xmlns:stream='{}'>", ns::STREAM));
        out.into_bytes()
    }

    /// Whether no field has been set.
    pub fn is_empty(&self) -> bool {
        *self == StreamHeader::default()
    }
}
