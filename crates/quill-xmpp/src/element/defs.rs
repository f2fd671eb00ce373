//! Predefined protocol elements and the RFC 6120 error-condition
//! catalogues.

use crate::element::Element;
use crate::ns;

/// `<stream:features/>`, the container written after each stream (re)start.
pub fn stream_features() -> Element {
    Element::new("stream:features")
}

/// `<starttls xmlns='…-tls'/>` as advertised inside stream features.
pub fn starttls() -> Element {
    Element::new("starttls").with_attr("xmlns", ns::TLS)
}

/// `<required/>`, appended to a feature that must be negotiated.
pub fn required() -> Element {
    Element::new("required")
}

/// `<proceed xmlns='…-tls'/>`, the go-ahead for a TLS handshake.
pub fn proceed() -> Element {
    Element::new("proceed").with_attr("xmlns", ns::TLS)
}

/// `<failure xmlns='…-tls'/>`, refusing a TLS upgrade.
pub fn tls_failure() -> Element {
    Element::new("failure").with_attr("xmlns", ns::TLS)
}

/// `<mechanisms xmlns='…-sasl'/>`; callers append `<mechanism>` children.
pub fn mechanisms() -> Element {
    Element::new("mechanisms").with_attr("xmlns", ns::SASL)
}

/// A single `<mechanism>NAME</mechanism>` entry.
pub fn mechanism(name: &str) -> Element {
    Element::new("mechanism").with_text(name)
}

/// `<success xmlns='…-sasl'/>`, ending a SASL exchange.
pub fn sasl_success() -> Element {
    Element::new("success").with_attr("xmlns", ns::SASL)
}

/// `<failure xmlns='…-sasl'/>` carrying the given condition child.
pub fn sasl_failure(cond: SaslFailure) -> Element {
    Element::new("failure")
        .with_attr("xmlns", ns::SASL)
        .with_child(Element::new(cond.as_str()))
}

/// `<bind xmlns='…-bind'/>`, both the feature and the IQ payload shell.
pub fn bind() -> Element {
    Element::new("bind").with_attr("xmlns", ns::BIND)
}

/// `<session xmlns='…-session'/>`, the legacy session feature.
pub fn session() -> Element {
    Element::new("session").with_attr("xmlns", ns::SESSION)
}

/// Stream-level error conditions (RFC 6120 §4.9.3), written as children of
/// `<stream:error>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum StreamErrorCond {
    BadFormat,
    BadNamespacePrefix,
    Conflict,
    ConnectionTimeout,
    HostGone,
    HostUnknown,
    ImproperAddressing,
    InternalServerError,
    InvalidFrom,
    InvalidNamespace,
    InvalidXml,
    NotAuthorized,
    NotWellFormed,
    PolicyViolation,
    RemoteConnectionFailed,
    Reset,
    ResourceConstraint,
    RestrictedXml,
    SeeOtherHost,
    SystemShutdown,
    UndefinedCondition,
    UnsupportedEncoding,
    UnsupportedFeature,
    UnsupportedStanzaType,
    UnsupportedVersion,
}

impl StreamErrorCond {
    /// The wire name of the condition.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamErrorCond::BadFormat => "bad-format",
            StreamErrorCond::BadNamespacePrefix => "bad-namespace-prefix",
            StreamErrorCond::Conflict => "conflict",
            StreamErrorCond::ConnectionTimeout => "connection-timeout",
            StreamErrorCond::HostGone => "host-gone",
            StreamErrorCond::HostUnknown => "host-unknown",
            StreamErrorCond::ImproperAddressing => "improper-addressing",
            StreamErrorCond::InternalServerError => "internal-server-error",
            StreamErrorCond::InvalidFrom => "invalid-from",
            StreamErrorCond::InvalidNamespace => "invalid-namespace",
            StreamErrorCond::InvalidXml => "invalid-xml",
            StreamErrorCond::NotAuthorized => "not-authorized",
            StreamErrorCond::NotWellFormed => "not-well-formed",
            StreamErrorCond::PolicyViolation => "policy-violation",
            StreamErrorCond::RemoteConnectionFailed => "remote-connection-failed",
            StreamErrorCond::Reset => "reset",
            StreamErrorCond::ResourceConstraint => "resource-constraint",
            StreamErrorCond::RestrictedXml => "restricted-xml",
            StreamErrorCond::SeeOtherHost => "see-other-host",
            StreamErrorCond::SystemShutdown => "system-shutdown",
            StreamErrorCond::UndefinedCondition => "undefined-condition",
            StreamErrorCond::UnsupportedEncoding => "unsupported-encoding",
            StreamErrorCond::UnsupportedFeature => "unsupported-feature",
            StreamErrorCond::UnsupportedStanzaType => "unsupported-stanza-type",
            StreamErrorCond::UnsupportedVersion => "unsupported-version",
        }
    }

    /// `<stream:error><condition xmlns='…streams'/></stream:error>`.
    pub fn to_element(self) -> Element {
        Element::new("stream:error")
            .with_child(Element::new(self.as_str()).with_attr("xmlns", ns::STREAM))
    }
}

/// SASL failure conditions (RFC 6120 §6.5), written as children of
/// `<failure xmlns='…-sasl'>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SaslFailure {
    Aborted,
    AccountDisabled,
    CredentialsExpired,
    EncryptionRequired,
    IncorrectEncoding,
    InvalidAuthzid,
    InvalidMechanism,
    MalformedRequest,
    MechanismTooWeak,
    NotAuthorized,
    TemporaryAuthFailure,
}

impl SaslFailure {
    /// The wire name of the condition.
    pub fn as_str(self) -> &'static str {
        match self {
            SaslFailure::Aborted => "aborted",
            SaslFailure::AccountDisabled => "account-disabled",
            SaslFailure::CredentialsExpired => "credentials-expired",
            SaslFailure::EncryptionRequired => "encryption-required",
            SaslFailure::IncorrectEncoding => "incorrect-encoding",
            SaslFailure::InvalidAuthzid => "invalid-authzid",
            SaslFailure::InvalidMechanism => "invalid-mechanism",
            SaslFailure::MalformedRequest => "malformed-request",
            SaslFailure::MechanismTooWeak => "mechanism-too-weak",
            SaslFailure::NotAuthorized => "not-authorized",
            SaslFailure::TemporaryAuthFailure => "temporary-auth-failure",
        }
    }

    /// `<failure xmlns='…-sasl'><condition/></failure>`.
    pub fn to_element(self) -> Element {
        sasl_failure(self)
    }
}

/// Stanza error conditions (RFC 6120 §8.3.3), each with its default
/// `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum StanzaErrorCond {
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    Forbidden,
    Gone,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAcceptable,
    NotAllowed,
    NotAuthorized,
    PolicyViolation,
    RecipientUnavailable,
    Redirect,
    RegistrationRequired,
    RemoteServerNotFound,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    SubscriptionRequired,
    UndefinedCondition,
    UnexpectedRequest,
}

impl StanzaErrorCond {
    /// The wire name of the condition.
    pub fn as_str(self) -> &'static str {
        match self {
            StanzaErrorCond::BadRequest => "bad-request",
            StanzaErrorCond::Conflict => "conflict",
            StanzaErrorCond::FeatureNotImplemented => "feature-not-implemented",
            StanzaErrorCond::Forbidden => "forbidden",
            StanzaErrorCond::Gone => "gone",
            StanzaErrorCond::InternalServerError => "internal-server-error",
            StanzaErrorCond::ItemNotFound => "item-not-found",
            StanzaErrorCond::JidMalformed => "jid-malformed",
            StanzaErrorCond::NotAcceptable => "not-acceptable",
            StanzaErrorCond::NotAllowed => "not-allowed",
            StanzaErrorCond::NotAuthorized => "not-authorized",
            StanzaErrorCond::PolicyViolation => "policy-violation",
            StanzaErrorCond::RecipientUnavailable => "recipient-unavailable",
            StanzaErrorCond::Redirect => "redirect",
            StanzaErrorCond::RegistrationRequired => "registration-required",
            StanzaErrorCond::RemoteServerNotFound => "remote-server-not-found",
            StanzaErrorCond::RemoteServerTimeout => "remote-server-timeout",
            StanzaErrorCond::ResourceConstraint => "resource-constraint",
            StanzaErrorCond::ServiceUnavailable => "service-unavailable",
            StanzaErrorCond::SubscriptionRequired => "subscription-required",
            StanzaErrorCond::UndefinedCondition => "undefined-condition",
            StanzaErrorCond::UnexpectedRequest => "unexpected-request",
        }
    }

    /// The default value of the `type` attribute on the `<error>` wrapper.
    pub fn error_type(self) -> &'static str {
        match self {
            StanzaErrorCond::BadRequest
            | StanzaErrorCond::JidMalformed
            | StanzaErrorCond::NotAcceptable
            | StanzaErrorCond::PolicyViolation
            | StanzaErrorCond::Redirect
            | StanzaErrorCond::UndefinedCondition
            | StanzaErrorCond::UnexpectedRequest => "modify",
            StanzaErrorCond::Forbidden
            | StanzaErrorCond::NotAuthorized
            | StanzaErrorCond::RegistrationRequired
            | StanzaErrorCond::SubscriptionRequired => "auth",
            StanzaErrorCond::RecipientUnavailable
            | StanzaErrorCond::RemoteServerTimeout
            | StanzaErrorCond::ResourceConstraint => "wait",
            StanzaErrorCond::Conflict
            | StanzaErrorCond::FeatureNotImplemented
            | StanzaErrorCond::Gone
            | StanzaErrorCond::InternalServerError
            | StanzaErrorCond::ItemNotFound
            | StanzaErrorCond::NotAllowed
            | StanzaErrorCond::RemoteServerNotFound
            | StanzaErrorCond::ServiceUnavailable => "cancel",
        }
    }

    /// `<error type='…'><condition xmlns='…-stanzas'/></error>`.
    pub fn to_element(self) -> Element {
        Element::new("error")
            .with_attr("type", self.error_type())
            .with_child(Element::new(self.as_str()).with_attr("xmlns", ns::STANZAS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_wire_form() {
        assert_eq!(
            StreamErrorCond::HostUnknown.to_element().to_string(),
            "<stream:error><host-unknown xmlns='http://etherx.jabber.org/streams'/></stream:error>"
        );
    }

    #[test]
    fn test_sasl_failure_wire_form() {
        assert_eq!(
            SaslFailure::MalformedRequest.to_element().to_string(),
            "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><malformed-request/></failure>"
        );
    }

    #[test]
    fn test_stanza_error_types() {
        assert_eq!(StanzaErrorCond::ServiceUnavailable.error_type(), "cancel");
        assert_eq!(StanzaErrorCond::JidMalformed.error_type(), "modify");
        assert_eq!(StanzaErrorCond::Forbidden.error_type(), "auth");
        assert_eq!(StanzaErrorCond::ResourceConstraint.error_type(), "wait");
        assert_eq!(
            StanzaErrorCond::ServiceUnavailable.to_element().to_string(),
            "<error type='cancel'><service-unavailable \
             xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error>"
        );
    }

    #[test]
    fn test_starttls_required() {
        let el = starttls().with_child(required());
        assert_eq!(
            el.to_string(),
            "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>"
        );
    }
}
