//! The element multiplexer.
//!
//! Routes an inbound top-level element by `(namespace, local name)` to the
//! first matching handler, falling back to a default (normally
//! [`UnsupportedStanza`](crate::handlers::UnsupportedStanza)). Registration
//! is chainable and accumulates a deferred error so that wiring reads as a
//! single expression checked once with [`ElementMux::into_result`].

use thiserror::Error;

use quill_xmpp::Element;

use crate::handlers::UnsupportedStanza;
use crate::stream::{ElementHandler, HandlerOutput, Properties};

/// Errors detected while registering handlers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A namespace or tag was empty.
    #[error("namespace and tag cannot be empty")]
    EmptyKey,
    /// Two handlers were registered for the same element key.
    #[error("multiple registrations for <{space}:{tag}>")]
    Duplicate {
        /// Namespace of the colliding registration.
        space: String,
        /// Local name of the colliding registration.
        tag: String,
    },
    /// Two IQ handlers were registered for the same (key, type) triple.
    #[error("multiple iq registrations for type {iq_type} and <{space}:{tag}>")]
    DuplicateIq {
        /// Child namespace of the colliding registration.
        space: String,
        /// Child local name of the colliding registration.
        tag: String,
        /// IQ type of the colliding registration.
        iq_type: String,
    },
    /// An IQ registration used a type outside `get|set|result|error|*`.
    #[error("invalid iq type in registration: {0:?}")]
    InvalidIqType(String),
}

struct Route {
    space: String,
    tag: String,
    handler: Box<dyn ElementHandler>,
}

/// First-match element router with a state-change fan-out.
pub struct ElementMux {
    routes: Vec<Route>,
    default: Box<dyn ElementHandler>,
    err: Option<RegistrationError>,
}

impl ElementMux {
    /// An empty multiplexer whose default handler answers with
    /// `<unsupported-stanza-type/>`.
    pub fn new() -> ElementMux {
        ElementMux {
            routes: Vec::new(),
            default: Box::new(UnsupportedStanza),
            err: None,
        }
    }

    /// Registers `handler` for elements whose in-scope namespace is `space`
    /// and whose local name is `tag`.
    ///
    /// Chainable; the first registration error sticks and short-circuits
    /// the rest of the chain.
    pub fn handle(
        mut self,
        space: &str,
        tag: &str,
        handler: impl ElementHandler + 'static,
    ) -> ElementMux {
        if self.err.is_some() {
            return self;
        }
        if space.is_empty() || tag.is_empty() {
            self.err = Some(RegistrationError::EmptyKey);
            return self;
        }
        if self.routes.iter().any(|r| r.space == space && r.tag == tag) {
            self.err = Some(RegistrationError::Duplicate {
                space: space.to_string(),
                tag: tag.to_string(),
            });
            return self;
        }
        self.routes.push(Route {
            space: space.to_string(),
            tag: tag.to_string(),
            handler: Box::new(handler),
        });
        self
    }

    /// Replaces the default handler consulted when no route matches.
    pub fn default_handler(mut self, handler: impl ElementHandler + 'static) -> ElementMux {
        self.default = Box::new(handler);
        self
    }

    /// Surfaces the deferred registration error, if any.
    pub fn into_result(self) -> Result<ElementMux, RegistrationError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    /// Dispatches `el` to the first matching handler (or the default) and
    /// fans any returned state change out to every registered handler
    /// before returning.
    pub fn dispatch(&mut self, el: &Element, props: &mut Properties) -> HandlerOutput {
        let matched = self
            .routes
            .iter()
            .position(|r| el.matches_namespace(&r.space) && el.name == r.tag);
        let output = match matched {
            Some(i) => self.routes[i].handler.handle_element(el, props),
            None => {
                tracing::debug!(
                    namespace = el.namespace().unwrap_or(""),
                    tag = %el.name,
                    "no handler registered, using default"
                );
                self.default.handle_element(el, props)
            }
        };
        if let Some(change) = &output.change {
            for route in &mut self.routes {
                route.handler.update(change);
            }
        }
        output
    }
}

impl Default for ElementMux {
    fn default() -> Self {
        ElementMux::new()
    }
}
