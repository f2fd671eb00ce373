//! The SASL handler and the PLAIN mechanism.
//!
//! The handler doubles as a feature generator: while the stream is not
//! authenticated it advertises `<mechanisms>` listing every registered
//! mechanism, and it stops once it observes the `Authenticated` state
//! change. As an element handler it owns `{sasl, auth}` and
//! `{sasl, response}`; a multi-message exchange pins the mechanism chosen
//! by `<auth>` until the exchange concludes.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use quill_xmpp::element::defs;
use quill_xmpp::sasl::decode_plain;
use quill_xmpp::{Element, Jid, SaslFailure};

use crate::stream::{
    ElementHandler, FeatureGenerator, HandlerOutput, Properties, StateChange, Status,
};

/// Decides the outcome of SASL PLAIN exchanges. Implementations must be
/// internally synchronized; one instance is shared by every connection.
pub trait Authenticator: Send + Sync {
    /// Checks the presented credentials. `authzid` is empty unless the
    /// client requested a separate authorization identity.
    fn authenticate(&self, authzid: &str, authcid: &str, password: &str) -> Result<(), AuthError>;
}

/// Why an authentication attempt was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The credentials did not check out.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The account exists but is disabled.
    #[error("account disabled")]
    AccountDisabled,
    /// The backing store could not be consulted.
    #[error("temporary authentication failure")]
    Temporary,
}

impl AuthError {
    /// The SASL failure condition this error maps to on the wire.
    pub fn failure(self) -> SaslFailure {
        match self {
            AuthError::InvalidCredentials => SaslFailure::NotAuthorized,
            AuthError::AccountDisabled => SaslFailure::AccountDisabled,
            AuthError::Temporary => SaslFailure::TemporaryAuthFailure,
        }
    }
}

/// Accepts every credential pair. For demos and tests only.
pub struct PermitAll;

impl Authenticator for PermitAll {
    fn authenticate(&self, _authzid: &str, _authcid: &str, _password: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Checks credentials against a static user table (the `[users]` block of
/// the config file).
pub struct StaticUsers {
    users: HashMap<String, String>,
}

impl StaticUsers {
    /// A table of `username -> password`.
    pub fn new(users: HashMap<String, String>) -> StaticUsers {
        StaticUsers { users }
    }
}

impl Authenticator for StaticUsers {
    fn authenticate(&self, _authzid: &str, authcid: &str, password: &str) -> Result<(), AuthError> {
        match self.users.get(authcid) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

/// What a mechanism hands back to the SASL handler.
#[derive(Debug, Default)]
pub struct MechanismOutput {
    /// Elements to write (success, failure, or a challenge).
    pub elements: Vec<Element>,
    /// Set on success.
    pub change: Option<StateChange>,
    /// Whether the stream must restart (set on success).
    pub restart: bool,
    /// Whether the mechanism expects a `<response>` to continue the
    /// exchange.
    pub challenge: bool,
}

/// A SASL mechanism. `data` is the base64 payload of the `<auth>` or
/// `<response>` element.
pub trait Mechanism: Send {
    /// Processes one message of the exchange.
    fn authenticate(&mut self, data: &str, props: &mut Properties) -> MechanismOutput;
}

/// The PLAIN mechanism (RFC 4616) over an [`Authenticator`].
pub struct Plain {
    auth: Arc<dyn Authenticator>,
}

impl Plain {
    /// A PLAIN mechanism deferring to `auth`.
    pub fn new(auth: Arc<dyn Authenticator>) -> Plain {
        Plain { auth }
    }

    fn failure(cond: SaslFailure) -> MechanismOutput {
        MechanismOutput {
            elements: vec![cond.to_element()],
            ..MechanismOutput::default()
        }
    }
}

impl Mechanism for Plain {
    fn authenticate(&mut self, data: &str, props: &mut Properties) -> MechanismOutput {
        let creds = match decode_plain(data) {
            Ok(creds) => creds,
            Err(e) => {
                debug!(error = %e, "malformed PLAIN payload");
                return Self::failure(SaslFailure::MalformedRequest);
            }
        };

        if let Err(e) = self
            .auth
            .authenticate(&creds.authzid, &creds.authcid, &creds.password)
        {
            warn!(authcid = %creds.authcid, error = %e, "authentication refused");
            return Self::failure(e.failure());
        }

        let user = if creds.authzid.is_empty() {
            &creds.authcid
        } else {
            &creds.authzid
        };
        let jid = Jid::new(&format!("{user}@{}", props.domain));
        if jid.is_empty() {
            return Self::failure(if creds.authzid.is_empty() {
                SaslFailure::MalformedRequest
            } else {
                SaslFailure::InvalidAuthzid
            });
        }

        info!(jid = %jid, "authenticated");
        props.status.insert(Status::AUTH);
        props.jid = Some(jid.clone());
        if let Some(header) = &mut props.header {
            header.to = jid.to_string();
        }
        MechanismOutput {
            elements: vec![defs::sasl_success()],
            change: Some(StateChange::Authenticated(jid)),
            restart: true,
            challenge: false,
        }
    }
}

/// Feature generation and element handling for the SASL namespace.
pub struct SaslHandler {
    mechanisms: Vec<(String, Box<dyn Mechanism>)>,
    current: Option<usize>,
    authenticated: bool,
}

impl SaslHandler {
    /// An empty handler; add mechanisms with
    /// [`SaslHandler::with_mechanism`].
    pub fn new() -> SaslHandler {
        SaslHandler {
            mechanisms: Vec::new(),
            current: None,
            authenticated: false,
        }
    }

    /// Registers a mechanism under its SASL name (e.g. `PLAIN`).
    /// Mechanisms are advertised in registration order.
    pub fn with_mechanism(mut self, name: &str, mechanism: impl Mechanism + 'static) -> SaslHandler {
        self.mechanisms.push((name.to_string(), Box::new(mechanism)));
        self
    }

    fn observe(&mut self, change: &StateChange) {
        if let StateChange::Authenticated(_) = change {
            self.authenticated = true;
        }
    }

    fn handle_auth(&mut self, el: &Element, props: &mut Properties) -> HandlerOutput {
        let name = el.attr_or("mechanism", "");
        let index = match self.mechanisms.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                warn!(mechanism = %name, "unknown sasl mechanism");
                return HandlerOutput::reply(SaslFailure::InvalidMechanism.to_element());
            }
        };
        let output = self.mechanisms[index].1.authenticate(el.text(), props);
        self.current = if output.challenge { Some(index) } else { None };
        into_handler_output(output)
    }

    fn handle_response(&mut self, el: &Element, props: &mut Properties) -> HandlerOutput {
        let index = match self.current {
            Some(index) => index,
            None => {
                return HandlerOutput::reply(
                    SaslFailure::NotAuthorized
                        .to_element()
                        .with_child(Element::new("text").with_text("Out of order SASL element")),
                );
            }
        };
        let output = self.mechanisms[index].1.authenticate(el.text(), props);
        if !output.challenge {
            self.current = None;
        }
        into_handler_output(output)
    }
}

impl Default for SaslHandler {
    fn default() -> Self {
        SaslHandler::new()
    }
}

fn into_handler_output(output: MechanismOutput) -> HandlerOutput {
    HandlerOutput {
        elements: output.elements,
        change: output.change,
        restart: output.restart,
        close: false,
    }
}

impl ElementHandler for SaslHandler {
    fn handle_element(&mut self, el: &Element, props: &mut Properties) -> HandlerOutput {
        match el.name.as_str() {
            "auth" => self.handle_auth(el, props),
            "response" => self.handle_response(el, props),
            _ => HandlerOutput::none(),
        }
    }

    fn update(&mut self, change: &StateChange) {
        self.observe(change);
    }
}

impl FeatureGenerator for SaslHandler {
    fn generate_feature(&mut self) -> Option<Element> {
        if self.authenticated {
            return None;
        }
        let mut mechanisms = defs::mechanisms();
        for (name, _) in &self.mechanisms {
            mechanisms = mechanisms.with_child(defs::mechanism(name));
        }
        Some(mechanisms)
    }

    fn update(&mut self, change: &StateChange) {
        self.observe(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_xmpp::ns;
    use quill_xmpp::sasl::{encode_plain, encode_plain_with_authzid};

    fn handler() -> SaslHandler {
        SaslHandler::new().with_mechanism("PLAIN", Plain::new(Arc::new(PermitAll)))
    }

    fn auth_element(mechanism: &str, payload: &str) -> Element {
        Element::new("auth")
            .with_attr("xmlns", ns::SASL)
            .with_attr("mechanism", mechanism)
            .with_text(payload)
    }

    fn props() -> Properties {
        Properties::new("localhost")
    }

    #[test]
    fn test_plain_success() {
        let mut h = handler();
        let mut props = props();
        let out = h.handle_element(&auth_element("PLAIN", &encode_plain("alice", "secret")), &mut props);

        assert_eq!(out.elements[0].name, "success");
        assert!(out.restart);
        assert!(!out.close);
        assert!(props.status.contains(Status::AUTH));
        assert_eq!(props.jid.as_ref().unwrap().to_string(), "alice@localhost");
        match out.change {
            Some(StateChange::Authenticated(jid)) => {
                assert_eq!(jid.to_string(), "alice@localhost")
            }
            other => panic!("expected authenticated change, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_authzid_takes_precedence() {
        let mut h = handler();
        let mut props = props();
        let payload = encode_plain_with_authzid("ops", "alice", "secret");
        h.handle_element(&auth_element("PLAIN", &payload), &mut props);
        assert_eq!(props.jid.as_ref().unwrap().to_string(), "ops@localhost");
    }

    #[test]
    fn test_plain_malformed_payload() {
        let mut h = handler();
        let mut props = props();
        let out = h.handle_element(&auth_element("PLAIN", "!notbase64!"), &mut props);
        let failure = &out.elements[0];
        assert_eq!(failure.name, "failure");
        assert!(failure.find("malformed-request").is_some());
        // The stream stays open and unauthenticated for a retry.
        assert!(!out.close && !out.restart);
        assert!(!props.status.contains(Status::AUTH));
    }

    #[test]
    fn test_plain_wrong_password() {
        let users = StaticUsers::new(HashMap::from([("alice".to_string(), "right".to_string())]));
        let mut h = SaslHandler::new().with_mechanism("PLAIN", Plain::new(Arc::new(users)));
        let mut props = props();
        let out = h.handle_element(&auth_element("PLAIN", &encode_plain("alice", "wrong")), &mut props);
        assert!(out.elements[0].find("not-authorized").is_some());
        assert!(!props.status.contains(Status::AUTH));
    }

    #[test]
    fn test_unknown_mechanism() {
        let mut h = handler();
        let out = h.handle_element(&auth_element("SCRAM-SHA-1", "payload"), &mut props());
        assert!(out.elements[0].find("invalid-mechanism").is_some());
    }

    #[test]
    fn test_out_of_order_response() {
        let mut h = handler();
        let response = Element::new("response").with_attr("xmlns", ns::SASL);
        let out = h.handle_element(&response, &mut props());
        let failure = &out.elements[0];
        assert!(failure.find("not-authorized").is_some());
        assert_eq!(
            failure.find("text").map(|t| t.text()),
            Some("Out of order SASL element")
        );
    }

    #[test]
    fn test_feature_disappears_after_authentication() {
        let mut h = handler();
        let feature = h.generate_feature().unwrap();
        assert_eq!(feature.name, "mechanisms");
        assert_eq!(
            feature.find("mechanism").map(|m| m.text()),
            Some("PLAIN")
        );

        FeatureGenerator::update(
            &mut h,
            &StateChange::Authenticated(Jid::new("alice@localhost")),
        );
        assert!(h.generate_feature().is_none());
    }

    #[test]
    fn test_mechanisms_listed_in_registration_order() {
        struct Refuse;
        impl Mechanism for Refuse {
            fn authenticate(&mut self, _: &str, _: &mut Properties) -> MechanismOutput {
                MechanismOutput::default()
            }
        }
        let mut h = SaslHandler::new()
            .with_mechanism("EXTERNAL", Refuse)
            .with_mechanism("PLAIN", Plain::new(Arc::new(PermitAll)));
        let feature = h.generate_feature().unwrap();
        let names: Vec<&str> = feature.child_elements().map(|m| m.text()).collect();
        assert_eq!(names, vec!["EXTERNAL", "PLAIN"]);
    }

    #[test]
    fn test_auth_error_condition_mapping() {
        assert_eq!(
            AuthError::InvalidCredentials.failure(),
            SaslFailure::NotAuthorized
        );
        assert_eq!(
            AuthError::AccountDisabled.failure(),
            SaslFailure::AccountDisabled
        );
        assert_eq!(
            AuthError::Temporary.failure(),
            SaslFailure::TemporaryAuthFailure
        );
    }
}
