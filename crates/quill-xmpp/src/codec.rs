//! Tokio codec framing an XMPP byte stream into top-level elements.
//!
//! XMPP frames are not length-delimited: the unit of framing is one
//! complete top-level XML element inside the long-lived `<stream:stream>`
//! document. [`XmppCodec`] scans the read buffer for one of three frames:
//!
//! - [`Frame::Open`]: the root `<stream:stream ...>` open tag, surfaced
//!   immediately without waiting for its (never-arriving) close tag. Its
//!   namespace bindings are remembered and inherited by every element
//!   decoded afterwards, so `xmlns`-free children match correctly.
//! - [`Frame::Element`]: a complete stanza or negotiation element.
//! - [`Frame::Close`]: an end tag at document level (`</stream:stream>`).
//!
//! Incomplete input is never an error; the codec asks for more bytes.
//! Well-formedness violations surface as [`ProtocolError::Syntax`].

use std::collections::HashMap;

use bytes::{Buf, BytesMut};
use quick_xml::errors::SyntaxError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio_util::codec::{Decoder, Encoder};

use crate::element::{Attr, Element, Node};
use crate::error::ProtocolError;

/// Default cap on the bytes buffered while waiting for a frame boundary.
pub const MAX_FRAME_LEN: usize = 256 * 1024;

/// One decoded unit of an XMPP stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// The root `<stream:stream …>` open tag.
    Open(Element),
    /// A complete top-level element.
    Element(Element),
    /// An end tag at document level.
    Close,
}

/// Decoder/encoder for XMPP stream frames.
#[derive(Debug, Clone)]
pub struct XmppCodec {
    stream_ns: HashMap<String, String>,
    max_frame_len: usize,
}

impl XmppCodec {
    /// A fresh codec with the default frame limit. Each stream restart
    /// (and each TLS upgrade) gets a fresh codec so that decoder state
    /// never crosses a transport boundary.
    pub fn new() -> XmppCodec {
        XmppCodec {
            stream_ns: HashMap::new(),
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// A codec with a custom frame limit.
    pub fn with_max_frame_len(max_frame_len: usize) -> XmppCodec {
        XmppCodec {
            stream_ns: HashMap::new(),
            max_frame_len,
        }
    }

    /// More data is needed; fail instead if the buffer already exceeds the
    /// frame limit.
    fn incomplete(&self, src: &BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() > self.max_frame_len {
            return Err(ProtocolError::FrameTooLong {
                actual: src.len(),
                limit: self.max_frame_len,
            });
        }
        Ok(None)
    }
}

impl Default for XmppCodec {
    fn default() -> Self {
        XmppCodec::new()
    }
}

impl Decoder for XmppCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        // Inter-stanza whitespace (often used as keepalive) and the XML
        // declaration are consumed silently.
        loop {
            let ws = src
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            if ws > 0 {
                src.advance(ws);
            }
            if src.is_empty() {
                return Ok(None);
            }
            if src.starts_with(b"<?") {
                match find(src, b"?>") {
                    Some(pos) => {
                        src.advance(pos + 2);
                        continue;
                    }
                    None => return self.incomplete(src),
                }
            }
            break;
        }

        // An end tag at document level closes the stream.
        if src.starts_with(b"</") {
            return match src.iter().position(|&b| b == b'>') {
                Some(pos) => {
                    src.advance(pos + 1);
                    Ok(Some(Frame::Close))
                }
                None => self.incomplete(src),
            };
        }

        if src[0] != b'<' {
            return Err(ProtocolError::Syntax(
                "character data at stream level".to_string(),
            ));
        }

        let mut reader = Reader::from_reader(&src[..]);
        let mut depth = 0usize;
        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    if depth == 0 && is_stream_root(e) {
                        let end = reader.buffer_position() as usize;
                        let el = read_open_element(&src[..end])?;
                        self.stream_ns = el.namespaces.clone();
                        src.advance(end);
                        return Ok(Some(Frame::Open(el)));
                    }
                    depth += 1;
                }
                Ok(Event::Empty(_)) if depth == 0 => {
                    let end = reader.buffer_position() as usize;
                    let el = build_element(&src[..end], &self.stream_ns)?;
                    src.advance(end);
                    return Ok(Some(Frame::Element(el)));
                }
                Ok(Event::End(_)) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        let end = reader.buffer_position() as usize;
                        let el = build_element(&src[..end], &self.stream_ns)?;
                        src.advance(end);
                        return Ok(Some(Frame::Element(el)));
                    }
                }
                Ok(Event::Eof) => return self.incomplete(src),
                Ok(_) => {}
                Err(quick_xml::Error::Syntax(
                    SyntaxError::UnclosedTag
                    | SyntaxError::UnclosedComment
                    | SyntaxError::UnclosedCData
                    | SyntaxError::UnclosedPIOrXmlDecl,
                )) => return self.incomplete(src),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Encoder<Element> for XmppCodec {
    type Error = ProtocolError;

    fn encode(&mut self, el: Element, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.extend_from_slice(&el.to_bytes());
        Ok(())
    }
}

impl Encoder<&Element> for XmppCodec {
    type Error = ProtocolError;

    fn encode(&mut self, el: &Element, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.extend_from_slice(&el.to_bytes());
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn is_stream_root(e: &BytesStart<'_>) -> bool {
    e.name().as_ref() == b"stream:stream"
}

/// Parses just the root open tag out of a slice ending at its `>`.
fn read_open_element(bytes: &[u8]) -> Result<Element, ProtocolError> {
    let mut reader = Reader::from_reader(bytes);
    match reader.read_event() {
        Ok(Event::Start(ref e)) => element_from_start(e, &HashMap::new()),
        Ok(_) => Err(ProtocolError::Syntax(
            "expected stream open tag".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Builds the element tree for one complete top-level element.
fn build_element(
    bytes: &[u8],
    inherited: &HashMap<String, String>,
) -> Result<Element, ProtocolError> {
    let mut reader = Reader::from_reader(bytes);
    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let scope = stack.last().map(|p| &p.namespaces).unwrap_or(inherited);
                let el = element_from_start(e, scope)?;
                stack.push(el);
            }
            Ok(Event::Empty(ref e)) => {
                let scope = stack.last().map(|p| &p.namespaces).unwrap_or(inherited);
                let el = element_from_start(e, scope)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(el)),
                    None => return Ok(el),
                }
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| ProtocolError::Syntax("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(el)),
                    None => return Ok(el),
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::Text(e.unescape()?.into_owned()));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(
                        String::from_utf8_lossy(&e.into_inner()).into_owned(),
                    ));
                }
            }
            Ok(Event::Eof) => {
                return Err(ProtocolError::Syntax("truncated element".to_string()))
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
    }
}

fn element_from_start(
    e: &BytesStart<'_>,
    scope: &HashMap<String, String>,
) -> Result<Element, ProtocolError> {
    let qname = e.name();
    let prefix = qname
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
        .unwrap_or_default();
    let local = String::from_utf8_lossy(qname.local_name().as_ref()).into_owned();

    let mut el = Element {
        prefix,
        name: local,
        namespaces: scope.clone(),
        attrs: Vec::new(),
        children: Vec::new(),
    };

    for attr in e.attributes() {
        let attr = attr.map_err(|err| ProtocolError::Syntax(err.to_string()))?;
        let key = attr.key;
        let aprefix = key
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
            .unwrap_or_default();
        let alocal = String::from_utf8_lossy(key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();

        if aprefix.is_empty() && alocal == "xmlns" {
            el.namespaces.insert(String::new(), value.clone());
        } else if aprefix == "xmlns" {
            el.namespaces.insert(alocal.clone(), value.clone());
        }
        el.attrs.push(Attr {
            prefix: aprefix,
            name: alocal,
            value,
        });
    }
    Ok(el)
}
