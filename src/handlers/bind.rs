//! The resource-binding handler.
//!
//! Advertises `<bind/>` once the stream is authenticated and handles the
//! IQ-set that binds a resource. A missing `<resource>` draws a generated
//! one (a 32-hex-digit UUID; generation aborts rather than falling back
//! if the OS RNG is unavailable). On success the handler publishes the
//! `Bound` state change and, when a route registrar is attached, binds
//! the full JID to this stream's writer.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use quill_xmpp::element::defs;
use quill_xmpp::stanza::{bind_result, BindRequest};
use quill_xmpp::{Iq, Jid, StanzaErrorCond};

use crate::stream::{
    FeatureGenerator, IqHandler, IqOutput, Properties, StateChange, Status, StreamWriter,
};

/// Collaborator notified when a full JID is bound to a stream, so that
/// stanzas addressed to it can be routed back in. Implementations must be
/// internally synchronized.
pub trait RouteRegister: Send + Sync {
    /// Binds `jid` to the given stream writer.
    fn register_route(&self, jid: &Jid, stream: StreamWriter);
}

/// Feature generation and IQ handling for resource binding.
pub struct BindHandler {
    jid: Option<Jid>,
    bound: bool,
    registrar: Option<Arc<dyn RouteRegister>>,
    writer: Option<StreamWriter>,
}

impl BindHandler {
    /// A bind handler with no registrar attached.
    pub fn new() -> BindHandler {
        BindHandler {
            jid: None,
            bound: false,
            registrar: None,
            writer: None,
        }
    }

    /// Attaches a route registrar called once on a successful bind.
    pub fn with_route_register(mut self, registrar: Arc<dyn RouteRegister>) -> BindHandler {
        self.registrar = Some(registrar);
        self
    }

    /// Attaches the stream writer handed to the registrar. The writer only
    /// exists once the runtime is assembled, so this is a late setter
    /// rather than a builder method.
    pub fn set_writer(&mut self, writer: StreamWriter) {
        self.writer = Some(writer);
    }

    fn observe(&mut self, change: &StateChange) {
        match change {
            StateChange::Authenticated(jid) => self.jid = Some(jid.bare()),
            StateChange::Bound(_) => self.bound = true,
        }
    }
}

impl Default for BindHandler {
    fn default() -> Self {
        BindHandler::new()
    }
}

impl IqHandler for BindHandler {
    fn handle_iq(&mut self, iq: &Iq, props: &mut Properties) -> IqOutput {
        let request = match BindRequest::from_iq(iq) {
            Some(request) => request,
            None => {
                return IqOutput::reply(
                    iq.error_reply(StanzaErrorCond::BadRequest).into_stanza(),
                )
            }
        };
        let bare = match self.jid.clone() {
            Some(bare) => bare,
            None => {
                // Reachable only if the auth gate was bypassed.
                return IqOutput::reply(
                    iq.error_reply(StanzaErrorCond::NotAuthorized).into_stanza(),
                );
            }
        };

        let resource = request
            .resource
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let full = bare.with_resource(&resource);
        if full.is_empty() {
            debug!(resource = %resource, "resource does not normalize");
            return IqOutput::reply(
                iq.error_reply(StanzaErrorCond::JidMalformed).into_stanza(),
            );
        }

        info!(jid = %full, "resource bound");
        props.status.insert(Status::BIND);
        props.jid = Some(full.clone());
        if let Some(header) = &mut props.header {
            header.to = full.to_string();
        }

        if let (Some(registrar), Some(writer)) = (&self.registrar, &self.writer) {
            registrar.register_route(&full, writer.clone());
        }

        IqOutput {
            stanzas: vec![bind_result(iq, &full).into_stanza()],
            change: Some(StateChange::Bound(full)),
            restart: false,
            close: false,
        }
    }

    fn update(&mut self, change: &StateChange) {
        self.observe(change);
    }
}

impl FeatureGenerator for BindHandler {
    fn generate_feature(&mut self) -> Option<quill_xmpp::Element> {
        if self.jid.is_some() && !self.bound {
            Some(defs::bind())
        } else {
            None
        }
    }

    fn update(&mut self, change: &StateChange) {
        self.observe(change);
    }
}
