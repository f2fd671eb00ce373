//! Built-in stream handlers: SASL, resource binding, the legacy session
//! placeholder, and the fallback handlers the multiplexers default to.

pub mod bind;
pub mod fallback;
pub mod sasl;
pub mod session;

pub use bind::{BindHandler, RouteRegister};
pub use fallback::{Blackhole, ServiceUnavailable, UnsupportedStanza};
pub use sasl::{
    AuthError, Authenticator, Mechanism, MechanismOutput, PermitAll, Plain, SaslHandler,
    StaticUsers,
};
pub use session::SessionHandler;
