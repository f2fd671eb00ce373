//! Stanza projections over [`Element`].
//!
//! A [`Stanza`] carries the common addressing attributes of the three
//! top-level XMPP stanzas plus a payload of child elements. [`Iq`],
//! [`Message`] and [`Presence`] wrap it; each round-trips to and from an
//! element. Empty string fields are absent attributes.

mod bind;
mod iq;

pub use bind::{bind_result, BindRequest};
pub use iq::{Iq, IqType};

use crate::element::{Element, Node};
use crate::error::ProtocolError;

/// The fields shared by all stanza kinds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stanza {
    /// Destination address.
    pub to: String,
    /// Origin address.
    pub from: String,
    /// Stanza identifier.
    pub id: String,
    /// The `type` attribute; semantics depend on the stanza kind.
    pub stanza_type: String,
    /// The `xml:lang` attribute.
    pub lang: String,
    /// Local tag name (`iq`, `message`, `presence`).
    pub name: String,
    /// Explicit namespace; when empty the stream default applies and no
    /// `xmlns` attribute is written.
    pub ns: String,
    /// Leading character data.
    pub text: String,
    /// Child elements, in order.
    pub payload: Vec<Element>,
}

impl Stanza {
    /// Reads the addressing attributes and payload out of an element.
    pub fn from_element(el: &Element) -> Stanza {
        Stanza {
            to: el.attr_or("to", "").to_string(),
            from: el.attr_or("from", "").to_string(),
            id: el.attr_or("id", "").to_string(),
            stanza_type: el.attr_or("type", "").to_string(),
            lang: el.attr_or("xml:lang", "").to_string(),
            name: el.name.clone(),
            ns: String::new(),
            text: el.text().to_string(),
            payload: el.child_elements().cloned().collect(),
        }
    }

    /// The first payload element, if any.
    pub fn first(&self) -> Option<&Element> {
        self.payload.first()
    }

    /// Appends a payload element.
    pub fn with_payload(mut self, el: Element) -> Stanza {
        self.payload.push(el);
        self
    }

    /// Builds the wire element. Empty fields are omitted.
    pub fn into_element(self) -> Element {
        let mut el = Element::new(&self.name);
        if !self.to.is_empty() {
            el = el.with_attr("to", &self.to);
        }
        if !self.from.is_empty() {
            el = el.with_attr("from", &self.from);
        }
        if !self.id.is_empty() {
            el = el.with_attr("id", &self.id);
        }
        if !self.stanza_type.is_empty() {
            el = el.with_attr("type", &self.stanza_type);
        }
        if !self.lang.is_empty() {
            el = el.with_attr("xml:lang", &self.lang);
        }
        if !self.ns.is_empty() {
            el = el.with_attr("xmlns", &self.ns);
        }
        if !self.text.is_empty() {
            el = el.with_text(&self.text);
        }
        for child in self.payload {
            el.children.push(Node::Element(child));
        }
        el
    }
}

/// A `<message/>` stanza.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    /// The underlying stanza fields.
    pub stanza: Stanza,
}

impl Message {
    /// Projects an element onto a message stanza.
    pub fn from_element(el: &Element) -> Result<Message, ProtocolError> {
        if el.name != "message" {
            return Err(ProtocolError::NotStanza {
                expected: "message",
                found: el.name.clone(),
            });
        }
        Ok(Message {
            stanza: Stanza::from_element(el),
        })
    }

    /// Builds the wire element.
    pub fn into_element(mut self) -> Element {
        self.stanza.name = "message".to_string();
        self.stanza.into_element()
    }
}

/// A `<presence/>` stanza.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Presence {
    /// The underlying stanza fields.
    pub stanza: Stanza,
}

impl Presence {
    /// Projects an element onto a presence stanza.
    pub fn from_element(el: &Element) -> Result<Presence, ProtocolError> {
        if el.name != "presence" {
            return Err(ProtocolError::NotStanza {
                expected: "presence",
                found: el.name.clone(),
            });
        }
        Ok(Presence {
            stanza: Stanza::from_element(el),
        })
    }

    /// Builds the wire element.
    pub fn into_element(mut self) -> Element {
        self.stanza.name = "presence".to_string();
        self.stanza.into_element()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stanza_round_trip() {
        let el = Element::new("message")
            .with_attr("to", "bob@example.net")
            .with_attr("id", "m1")
            .with_attr("type", "chat")
            .with_child(Element::new("body").with_text("hello"));
        let msg = Message::from_element(&el).unwrap();
        assert_eq!(msg.stanza.to, "bob@example.net");
        assert_eq!(msg.stanza.stanza_type, "chat");
        assert_eq!(msg.stanza.payload.len(), 1);
        assert_eq!(
            msg.into_element().to_string(),
            "<message to='bob@example.net' id='m1' type='chat'><body>hello</body></message>"
        );
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let st = Stanza {
            name: "presence".to_string(),
            ..Stanza::default()
        };
        assert_eq!(st.into_element().to_string(), "<presence/>");
    }

    #[test]
    fn test_wrong_tag_is_rejected() {
        let el = Element::new("iq");
        assert!(Message::from_element(&el).is_err());
        assert!(Presence::from_element(&el).is_err());
    }
}
