//! XMPP namespace URIs (RFC 6120 and friends).

/// The stream namespace, bound to the `stream` prefix on the root element.
pub const STREAM: &str = "http://etherx.jabber.org/streams";
/// STARTTLS negotiation.
pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
/// SASL negotiation.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
/// Resource binding.
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
/// Session establishment (RFC 3921, kept for legacy clients).
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
/// Stanza error conditions.
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
/// The default namespace of a client-to-server stream.
pub const CLIENT: &str = "jabber:client";
