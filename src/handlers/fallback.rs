//! Default handlers: the element-mux fallback, the IQ-mux fallback, and a
//! blackhole for stanzas that should be accepted and dropped.

use tracing::{debug, warn};

use quill_xmpp::{Element, Iq, StanzaErrorCond, StreamErrorCond};

use crate::stream::{ElementHandler, HandlerOutput, IqHandler, IqOutput, Properties};

/// Answers any element with `<unsupported-stanza-type/>` and closes the
/// stream. The element multiplexer uses this as its default.
pub struct UnsupportedStanza;

impl ElementHandler for UnsupportedStanza {
    fn handle_element(&mut self, el: &Element, _props: &mut Properties) -> HandlerOutput {
        warn!(tag = %el.name, "unsupported stanza type");
        HandlerOutput::reply_and_close(StreamErrorCond::UnsupportedStanzaType.to_element())
    }
}

/// Answers any IQ with an IQ error carrying `<service-unavailable/>`. The
/// IQ multiplexer uses this as its default; the stream stays open.
pub struct ServiceUnavailable;

impl IqHandler for ServiceUnavailable {
    fn handle_iq(&mut self, iq: &Iq, props: &mut Properties) -> IqOutput {
        debug!(id = %iq.stanza.id, "iq has no handler, answering service-unavailable");
        let mut reply = iq.error_reply(StanzaErrorCond::ServiceUnavailable);
        // A client usually omits from/to on its own stanzas; fill in the
        // session addresses so the error is routable.
        if reply.stanza.to.is_empty() {
            if let Some(jid) = &props.jid {
                reply.stanza.to = jid.to_string();
            }
        }
        if reply.stanza.from.is_empty() {
            reply.stanza.from = props.domain.clone();
        }
        IqOutput::reply(reply.into_stanza())
    }
}

/// Accepts and drops elements without replying. Useful for stanza kinds
/// the deployment consciously ignores (e.g. presence on a minimal server).
pub struct Blackhole;

impl ElementHandler for Blackhole {
    fn handle_element(&mut self, el: &Element, _props: &mut Properties) -> HandlerOutput {
        debug!(tag = %el.name, "blackholed");
        HandlerOutput::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Status;
    use quill_xmpp::{ns, IqType, Jid};

    #[test]
    fn test_unsupported_stanza_closes() {
        let el = Element::new("bogus");
        let out = UnsupportedStanza.handle_element(&el, &mut Properties::new("localhost"));
        assert!(out.close);
        assert!(out.elements[0].find("unsupported-stanza-type").is_some());
    }

    #[test]
    fn test_service_unavailable_fills_addresses() {
        let mut props = Properties::new("localhost");
        props.status.insert(Status::AUTH | Status::BIND);
        props.jid = Some(Jid::new("alice@localhost/phone"));

        let el = Element::new("iq")
            .with_attr("type", "get")
            .with_attr("id", "x")
            .with_attr("to", "localhost")
            .with_child(Element::new("ping").with_attr("xmlns", "urn:xmpp:ping"));
        let iq = Iq::from_element(&el).unwrap();
        let out = ServiceUnavailable.handle_iq(&iq, &mut props);
        assert!(!out.close);
        let reply = &out.stanzas[0];
        assert_eq!(reply.to, "alice@localhost/phone");
        assert_eq!(reply.from, "localhost");
        assert_eq!(reply.stanza_type, IqType::Error.as_str());
    }

    #[test]
    fn test_blackhole_is_silent() {
        let el = Element::new("presence").with_attr("xmlns", ns::CLIENT);
        let out = Blackhole.handle_element(&el, &mut Properties::new("localhost"));
        assert!(out.elements.is_empty());
        assert!(!out.close && !out.restart);
        assert!(out.change.is_none());
    }
}
