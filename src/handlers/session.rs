//! The legacy session-establishment placeholder (RFC 3921 §3).
//!
//! RFC 6121 deprecated session establishment, but plenty of clients still
//! send the IQ-set and some expect the feature to be advertised. The
//! feature advertisement is a config toggle; the IQ is always answered
//! with an empty result.

use tracing::debug;

use quill_xmpp::element::defs;
use quill_xmpp::{Element, Iq};

use crate::stream::{FeatureGenerator, IqHandler, IqOutput, Properties, StateChange};

/// Session feature advertisement and IQ handling.
pub struct SessionHandler {
    advertise: bool,
    authenticated: bool,
    bound: bool,
}

impl SessionHandler {
    /// `advertise` controls whether `<session/>` appears in the feature
    /// list at all.
    pub fn new(advertise: bool) -> SessionHandler {
        SessionHandler {
            advertise,
            authenticated: false,
            bound: false,
        }
    }

    fn observe(&mut self, change: &StateChange) {
        match change {
            StateChange::Authenticated(_) => self.authenticated = true,
            StateChange::Bound(_) => self.bound = true,
        }
    }
}

impl IqHandler for SessionHandler {
    fn handle_iq(&mut self, iq: &Iq, _props: &mut Properties) -> IqOutput {
        debug!(id = %iq.stanza.id, "session established (no-op)");
        IqOutput::reply(iq.result_reply().into_stanza())
    }

    fn update(&mut self, change: &StateChange) {
        self.observe(change);
    }
}

impl FeatureGenerator for SessionHandler {
    fn generate_feature(&mut self) -> Option<Element> {
        if self.advertise && self.authenticated && !self.bound {
            Some(defs::session())
        } else {
            None
        }
    }

    fn update(&mut self, change: &StateChange) {
        self.observe(change);
    }
}
