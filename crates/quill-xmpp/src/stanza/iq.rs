//! IQ stanzas.

use std::fmt;

use crate::element::{Element, StanzaErrorCond};
use crate::error::ProtocolError;
use crate::stanza::Stanza;

/// The four IQ semantics (RFC 6120 §8.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqType {
    /// A request for information.
    Get,
    /// A request to set or replace information.
    Set,
    /// A response to a get or set.
    Result,
    /// An error response.
    Error,
}

impl IqType {
    /// Parses a `type` attribute value.
    pub fn parse(s: &str) -> Option<IqType> {
        match s {
            "get" => Some(IqType::Get),
            "set" => Some(IqType::Set),
            "result" => Some(IqType::Result),
            "error" => Some(IqType::Error),
            _ => None,
        }
    }

    /// The wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            IqType::Get => "get",
            IqType::Set => "set",
            IqType::Result => "result",
            IqType::Error => "error",
        }
    }
}

impl fmt::Display for IqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `<iq/>` stanza with a typed `type` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Iq {
    /// The underlying stanza fields.
    pub stanza: Stanza,
    /// The parsed `type` attribute.
    pub iq_type: IqType,
}

impl Iq {
    /// Projects an element onto an IQ. Fails when the element is not an
    /// `<iq>` or carries an unknown `type`.
    pub fn from_element(el: &Element) -> Result<Iq, ProtocolError> {
        if el.name != "iq" {
            return Err(ProtocolError::NotStanza {
                expected: "iq",
                found: el.name.clone(),
            });
        }
        let stanza = Stanza::from_element(el);
        let iq_type = IqType::parse(&stanza.stanza_type)
            .ok_or_else(|| ProtocolError::InvalidIqType(stanza.stanza_type.clone()))?;
        Ok(Iq { stanza, iq_type })
    }

    /// A fresh IQ of the given type.
    pub fn new(iq_type: IqType, id: &str) -> Iq {
        Iq {
            stanza: Stanza {
                name: "iq".to_string(),
                id: id.to_string(),
                stanza_type: iq_type.as_str().to_string(),
                ..Stanza::default()
            },
            iq_type,
        }
    }

    /// A `result` IQ answering this one: addresses swapped, same id.
    pub fn result_reply(&self) -> Iq {
        let mut reply = Iq::new(IqType::Result, &self.stanza.id);
        reply.stanza.to = self.stanza.from.clone();
        reply.stanza.from = self.stanza.to.clone();
        reply
    }

    /// An `error` IQ answering this one, carrying the given condition.
    pub fn error_reply(&self, cond: StanzaErrorCond) -> Iq {
        let mut reply = Iq::new(IqType::Error, &self.stanza.id);
        reply.stanza.to = self.stanza.from.clone();
        reply.stanza.from = self.stanza.to.clone();
        reply.stanza.payload.push(cond.to_element());
        reply
    }

    /// The first payload element, if any.
    pub fn first(&self) -> Option<&Element> {
        self.stanza.first()
    }

    /// Builds the wire element.
    pub fn into_element(mut self) -> Element {
        self.stanza.name = "iq".to_string();
        self.stanza.stanza_type = self.iq_type.as_str().to_string();
        self.stanza.into_element()
    }

    /// Converts into the generic stanza representation.
    pub fn into_stanza(mut self) -> Stanza {
        self.stanza.name = "iq".to_string();
        self.stanza.stanza_type = self.iq_type.as_str().to_string();
        self.stanza
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns;

    #[test]
    fn test_iq_from_element() {
        let el = Element::new("iq")
            .with_attr("type", "set")
            .with_attr("id", "b1")
            .with_child(Element::new("bind").with_attr("xmlns", ns::BIND));
        let iq = Iq::from_element(&el).unwrap();
        assert_eq!(iq.iq_type, IqType::Set);
        assert_eq!(iq.stanza.id, "b1");
        assert_eq!(iq.first().map(|c| c.name.as_str()), Some("bind"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let el = Element::new("iq").with_attr("type", "demand");
        assert!(matches!(
            Iq::from_element(&el),
            Err(ProtocolError::InvalidIqType(_))
        ));
        let el = Element::new("iq");
        assert!(Iq::from_element(&el).is_err());
    }

    #[test]
    fn test_error_reply_swaps_addresses() {
        let el = Element::new("iq")
            .with_attr("type", "get")
            .with_attr("id", "x")
            .with_attr("to", "example.net")
            .with_attr("from", "alice@example.net/phone");
        let iq = Iq::from_element(&el).unwrap();
        let reply = iq.error_reply(StanzaErrorCond::ServiceUnavailable);
        assert_eq!(
            reply.into_element().to_string(),
            "<iq to='alice@example.net/phone' from='example.net' id='x' type='error'>\
             <error type='cancel'><service-unavailable \
             xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></iq>"
        );
    }

    #[test]
    fn test_result_reply() {
        let iq = Iq::new(IqType::Set, "s1");
        let reply = iq.result_reply();
        assert_eq!(reply.into_element().to_string(), "<iq id='s1' type='result'/>");
    }
}
