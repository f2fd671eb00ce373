//! The IQ multiplexer.
//!
//! Registered with the element multiplexer for `{jabber:client, iq}`. An
//! inbound IQ is routed by the triple `(first-child namespace, first-child
//! local name, iq type)`; `*` is a wildcard in any coordinate. Before
//! routing, the authorization gate applies: an IQ on an unauthenticated
//! stream (or an outbound-addressed IQ on an unbound stream) is answered
//! with a `<not-authorized/>` stream error and the stream is closed.

use quill_xmpp::{Element, Iq, IqType, Stanza, StreamErrorCond};

use crate::handlers::ServiceUnavailable;
use crate::stream::mux::RegistrationError;
use crate::stream::{
    ElementHandler, HandlerOutput, IqHandler, IqOutput, Properties, StateChange, Status,
};

/// The wildcard coordinate.
const ANY: &str = "*";

struct IqRoute {
    space: String,
    tag: String,
    iq_type: String,
    handler: Box<dyn IqHandler>,
}

impl IqRoute {
    fn matches(&self, child: Option<&Element>, iq_type: IqType) -> bool {
        if self.iq_type != ANY && self.iq_type != iq_type.as_str() {
            return false;
        }
        match child {
            Some(child) => {
                (self.space == ANY || child.matches_namespace(&self.space))
                    && (self.tag == ANY || child.name == self.tag)
            }
            // A payload-less IQ only reaches full-wildcard entries.
            None => self.space == ANY && self.tag == ANY,
        }
    }
}

/// First-match IQ router with precondition checks.
pub struct IqMux {
    routes: Vec<IqRoute>,
    default: Box<dyn IqHandler>,
    err: Option<RegistrationError>,
}

impl IqMux {
    /// An empty multiplexer whose default handler answers with an IQ error
    /// carrying `<service-unavailable/>`.
    pub fn new() -> IqMux {
        IqMux {
            routes: Vec::new(),
            default: Box::new(ServiceUnavailable),
            err: None,
        }
    }

    /// Registers `handler` for IQs of type `iq_type` whose first child
    /// matches `space` and `tag`. `*` is accepted in any coordinate.
    ///
    /// Chainable; the first registration error sticks.
    pub fn handle(
        mut self,
        space: &str,
        tag: &str,
        iq_type: &str,
        handler: impl IqHandler + 'static,
    ) -> IqMux {
        if self.err.is_some() {
            return self;
        }
        if space.is_empty() || tag.is_empty() || iq_type.is_empty() {
            self.err = Some(RegistrationError::EmptyKey);
            return self;
        }
        if iq_type != ANY && IqType::parse(iq_type).is_none() {
            self.err = Some(RegistrationError::InvalidIqType(iq_type.to_string()));
            return self;
        }
        if self
            .routes
            .iter()
            .any(|r| r.space == space && r.tag == tag && r.iq_type == iq_type)
        {
            self.err = Some(RegistrationError::DuplicateIq {
                space: space.to_string(),
                tag: tag.to_string(),
                iq_type: iq_type.to_string(),
            });
            return self;
        }
        self.routes.push(IqRoute {
            space: space.to_string(),
            tag: tag.to_string(),
            iq_type: iq_type.to_string(),
            handler: Box::new(handler),
        });
        self
    }

    /// Replaces the default handler.
    pub fn default_handler(mut self, handler: impl IqHandler + 'static) -> IqMux {
        self.default = Box::new(handler);
        self
    }

    /// Surfaces the deferred registration error, if any.
    pub fn into_result(self) -> Result<IqMux, RegistrationError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Whether the stream state admits this IQ at all.
    fn authorized(&self, el: &Element, props: &Properties) -> bool {
        if !props.status.contains(Status::AUTH) {
            return false;
        }
        if props.status.contains(Status::BIND) {
            return true;
        }
        // Pre-bind, only the server itself or the user's own bare JID may
        // be addressed.
        let to = el.attr_or("to", "");
        if to.is_empty() {
            return true;
        }
        let bare = props
            .jid
            .as_ref()
            .map(|j| j.bare().to_string())
            .unwrap_or_default();
        to == props.domain || to == bare
    }
}

impl Default for IqMux {
    fn default() -> Self {
        IqMux::new()
    }
}

impl ElementHandler for IqMux {
    fn handle_element(&mut self, el: &Element, props: &mut Properties) -> HandlerOutput {
        if !self.authorized(el, props) {
            tracing::debug!(to = el.attr_or("to", ""), "iq rejected: not authorized");
            return HandlerOutput::reply_and_close(StreamErrorCond::NotAuthorized.to_element());
        }

        let iq = match Iq::from_element(el) {
            Ok(iq) => iq,
            Err(e) => {
                tracing::debug!(error = %e, "malformed iq");
                let mut reply = Stanza::from_element(el);
                std::mem::swap(&mut reply.to, &mut reply.from);
                reply.stanza_type = "error".to_string();
                reply.text = String::new();
                reply.payload =
                    vec![quill_xmpp::StanzaErrorCond::BadRequest.to_element()];
                return HandlerOutput::reply(reply.into_element());
            }
        };

        let child = iq.first();
        let matched = self
            .routes
            .iter_mut()
            .find(|r| r.matches(child, iq.iq_type));
        let output = match matched {
            Some(route) => route.handler.handle_iq(&iq, props),
            None => {
                tracing::debug!(
                    child = child.map(|c| c.name.as_str()).unwrap_or(""),
                    iq_type = %iq.iq_type,
                    "no iq handler registered, using default"
                );
                self.default.handle_iq(&iq, props)
            }
        };

        let IqOutput {
            stanzas,
            change,
            restart,
            close,
        } = output;
        if let Some(change) = &change {
            for route in &mut self.routes {
                route.handler.update(change);
            }
        }
        HandlerOutput {
            elements: stanzas.into_iter().map(Stanza::into_element).collect(),
            change,
            restart,
            close,
        }
    }

    fn update(&mut self, change: &StateChange) {
        for route in &mut self.routes {
            route.handler.update(change);
        }
    }
}
