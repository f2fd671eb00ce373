//! Resource binding payloads (RFC 6120 §7).

use crate::element::{defs, Element};
use crate::jid::Jid;
use crate::ns;
use crate::stanza::{Iq, IqType};

/// The client half of a bind exchange: an IQ-set carrying
/// `<bind xmlns='…-bind'>` with an optional `<resource>` child.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindRequest {
    /// The client-requested resource, absent when the server should pick.
    pub resource: Option<String>,
}

impl BindRequest {
    /// Extracts a bind request from an IQ. `None` when the IQ carries no
    /// bind payload.
    pub fn from_iq(iq: &Iq) -> Option<BindRequest> {
        let bind = iq
            .stanza
            .payload
            .iter()
            .find(|c| c.name == "bind" && has_bind_ns(c))?;
        let resource = bind
            .find("resource")
            .map(|r| r.text().to_string())
            .filter(|r| !r.is_empty());
        Some(BindRequest { resource })
    }

    /// Builds the IQ-set for this request.
    pub fn into_iq(self, id: &str) -> Iq {
        let mut bind = defs::bind();
        if let Some(resource) = self.resource {
            bind = bind.with_child(Element::new("resource").with_text(&resource));
        }
        let mut iq = Iq::new(IqType::Set, id);
        iq.stanza.payload.push(bind);
        iq
    }
}

fn has_bind_ns(el: &Element) -> bool {
    el.matches_namespace(ns::BIND) || el.attr("xmlns") == Some(ns::BIND)
}

/// The result IQ for a completed bind, echoing the request id and carrying
/// the full JID.
pub fn bind_result(iq: &Iq, jid: &Jid) -> Iq {
    let mut result = iq.result_reply();
    result.stanza.payload.push(
        defs::bind().with_child(Element::new("jid").with_text(&jid.to_string())),
    );
    result
}
