//! The stream core: per-connection state, handler contracts, multiplexers,
//! transport, and the run loop.
//!
//! A connection owns exactly one [`XmppStream`], which owns its
//! [`XmlTransport`] and [`Properties`]. Handlers never touch the socket:
//! they consume an inbound element plus the mutable properties bundle and
//! return outbound elements together with explicit `restart`/`close` flags
//! and an optional [`StateChange`] that the multiplexer fans out to every
//! registered handler.

pub mod iq_mux;
pub mod mux;
pub mod runtime;
pub mod transport;

pub use iq_mux::IqMux;
pub use mux::{ElementMux, RegistrationError};
pub use runtime::{StreamWriter, XmppStream};
pub use transport::XmlTransport;

use std::ops::BitOr;
use std::sync::{Arc, Mutex};

use quill_xmpp::{Element, Jid, Stanza, StreamHeader};

/// Which side of the stream this entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The entity that opens the stream and speaks first (a client).
    Initiating,
    /// The entity that answers the stream open (a server).
    Receiving,
}

/// The connection status bitset. The zero value is an open, unnegotiated
/// stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status(u8);

impl Status {
    /// The zero value: stream open, nothing negotiated.
    pub const OPEN: Status = Status(0);
    /// The stream has been closed; never cleared once set.
    pub const CLOSED: Status = Status(1);
    /// The stream must redo its header exchange before reading on.
    pub const RESTART: Status = Status(1 << 1);
    /// The transport is TLS-protected.
    pub const SECURE: Status = Status(1 << 2);
    /// SASL completed.
    pub const AUTH: Status = Status(1 << 3);
    /// A resource is bound.
    pub const BIND: Status = Status(1 << 4);

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Status) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn clear(&mut self, other: Status) {
        self.0 &= !other.0;
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

/// Per-connection state, owned by the stream runtime. Handlers observe and
/// mutate it through their dispatch entry points.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// The negotiated stream header, set by the transport on (re)start.
    pub header: Option<StreamHeader>,
    /// The status bitset.
    pub status: Status,
    /// The domain this server answers for.
    pub domain: String,
    /// The feature list advertised on the most recent (re)start.
    pub features: Vec<Element>,
    /// The authenticated JID: bare after SASL, full after bind.
    pub jid: Option<Jid>,
}

impl Properties {
    /// Fresh properties for a connection to `domain`.
    pub fn new(domain: &str) -> Properties {
        Properties {
            domain: domain.to_string(),
            ..Properties::default()
        }
    }
}

/// A state transition observed by a handler, broadcast to all other
/// handlers and feature generators so they can react to shifts they did
/// not cause.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// SASL succeeded for the given bare JID.
    Authenticated(Jid),
    /// A resource was bound; the payload is the full JID.
    Bound(Jid),
}

/// What an element handler hands back to the multiplexer.
#[derive(Debug, Default)]
pub struct HandlerOutput {
    /// Elements to write, in order, before any later inbound element is
    /// answered.
    pub elements: Vec<Element>,
    /// A state transition to broadcast.
    pub change: Option<StateChange>,
    /// The stream must redo its header exchange.
    pub restart: bool,
    /// The stream must be closed after the elements are written.
    pub close: bool,
}

impl HandlerOutput {
    /// No reply, no flags.
    pub fn none() -> HandlerOutput {
        HandlerOutput::default()
    }

    /// Reply with a single element.
    pub fn reply(el: Element) -> HandlerOutput {
        HandlerOutput {
            elements: vec![el],
            ..HandlerOutput::default()
        }
    }

    /// Reply with a single element and close the stream.
    pub fn reply_and_close(el: Element) -> HandlerOutput {
        HandlerOutput {
            elements: vec![el],
            close: true,
            ..HandlerOutput::default()
        }
    }
}

/// What an IQ handler hands back to the IQ multiplexer.
#[derive(Debug, Default)]
pub struct IqOutput {
    /// Stanzas to write, in order.
    pub stanzas: Vec<Stanza>,
    /// A state transition to broadcast.
    pub change: Option<StateChange>,
    /// The stream must redo its header exchange.
    pub restart: bool,
    /// The stream must be closed.
    pub close: bool,
}

impl IqOutput {
    /// No reply, no flags.
    pub fn none() -> IqOutput {
        IqOutput::default()
    }

    /// Reply with a single stanza.
    pub fn reply(stanza: Stanza) -> IqOutput {
        IqOutput {
            stanzas: vec![stanza],
            ..IqOutput::default()
        }
    }
}

/// Handles one inbound top-level element.
pub trait ElementHandler: Send {
    /// Processes `el` against the connection state.
    fn handle_element(&mut self, el: &Element, props: &mut Properties) -> HandlerOutput;

    /// Observes a state transition caused by another handler.
    fn update(&mut self, _change: &StateChange) {}
}

/// Handles one inbound IQ, routed by the IQ multiplexer.
pub trait IqHandler: Send {
    /// Processes `iq` against the connection state.
    fn handle_iq(&mut self, iq: &quill_xmpp::Iq, props: &mut Properties) -> IqOutput;

    /// Observes a state transition caused by another handler.
    fn update(&mut self, _change: &StateChange) {}
}

/// Consulted on every stream (re)start to contribute a feature element.
pub trait FeatureGenerator: Send {
    /// The feature to advertise in the current state, if any.
    fn generate_feature(&mut self) -> Option<Element>;

    /// Observes a state transition.
    fn update(&mut self, _change: &StateChange) {}
}

/// A handler shared between several registrations (and, for SASL and bind,
/// between a mux route and the feature registry).
pub type Shared<T> = Arc<Mutex<T>>;

/// Wraps a handler for shared registration.
pub fn shared<T>(handler: T) -> Shared<T> {
    Arc::new(Mutex::new(handler))
}

impl<T: ElementHandler> ElementHandler for Shared<T> {
    fn handle_element(&mut self, el: &Element, props: &mut Properties) -> HandlerOutput {
        self.lock().expect("poisoned handler lock").handle_element(el, props)
    }

    fn update(&mut self, change: &StateChange) {
        self.lock().expect("poisoned handler lock").update(change);
    }
}

impl<T: IqHandler> IqHandler for Shared<T> {
    fn handle_iq(&mut self, iq: &quill_xmpp::Iq, props: &mut Properties) -> IqOutput {
        self.lock().expect("poisoned handler lock").handle_iq(iq, props)
    }

    fn update(&mut self, change: &StateChange) {
        self.lock().expect("poisoned handler lock").update(change);
    }
}

impl<T: FeatureGenerator> FeatureGenerator for Shared<T> {
    fn generate_feature(&mut self) -> Option<Element> {
        self.lock().expect("poisoned handler lock").generate_feature()
    }

    fn update(&mut self, change: &StateChange) {
        self.lock().expect("poisoned handler lock").update(change);
    }
}
