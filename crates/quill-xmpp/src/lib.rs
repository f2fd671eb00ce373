//! # quill-xmpp
//!
//! Protocol primitives for XMPP (RFC 6120) streams:
//!
//! - An in-memory XML [`Element`] tree with namespace scoping and an
//!   insertion-ordered, escaping serializer
//! - [`Jid`] addresses normalized per RFC 7622
//! - Stanza projections ([`Iq`], [`Message`], [`Presence`]) over elements
//! - The unclosed `<stream:stream>` preamble ([`StreamHeader`])
//! - SASL PLAIN payload encoding/decoding (RFC 4616)
//! - With the `tokio` feature, [`codec::XmppCodec`]: a tokio codec that
//!   frames a byte stream into top-level XMPP elements
//!
//! The crate is transport-agnostic; the stream state machine, handler
//! dispatch, and socket handling live in the `quilld` daemon.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod element;
pub mod error;
pub mod header;
pub mod jid;
pub mod ns;
pub mod sasl;
pub mod stanza;

#[cfg(feature = "tokio")]
pub mod codec;

pub use self::element::{Attr, Element, Node, SaslFailure, StanzaErrorCond, StreamErrorCond};
pub use self::error::{ProtocolError, Result};
pub use self::header::{StreamHeader, STREAM_CLOSE};
pub use self::jid::Jid;
pub use self::stanza::{BindRequest, Iq, IqType, Message, Presence, Stanza};

#[cfg(feature = "tokio")]
pub use self::codec::{Frame, XmppCodec};
