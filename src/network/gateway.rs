//! Gateway - TCP listener that accepts incoming connections.
//!
//! The gateway binds the client port, builds the TLS acceptor once, and
//! spawns an independent task per accepted connection. Each task wires a
//! fresh dispatch tree (handlers are per-connection state) and runs the
//! stream to completion; connections share nothing but the authenticator
//! and the optional route registrar.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::pki_types::PrivateKeyDer;
use tokio_rustls::rustls::ServerConfig as RustlsServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};

use quill_xmpp::ns;

use crate::config::{Config, TlsConfig};
use crate::handlers::{
    Authenticator, BindHandler, Blackhole, Plain, RouteRegister, SaslHandler, SessionHandler,
};
use crate::stream::mux::RegistrationError;
use crate::stream::{
    shared, ElementMux, FeatureGenerator, IqMux, Properties, XmlTransport, XmppStream,
};

/// Accepts incoming TCP connections and runs a stream per connection.
pub struct Gateway {
    listener: TcpListener,
    config: Arc<Config>,
    acceptor: Option<TlsAcceptor>,
    authenticator: Arc<dyn Authenticator>,
    registrar: Option<Arc<dyn RouteRegister>>,
    conn_seq: AtomicU64,
}

impl Gateway {
    /// Binds the gateway and prepares the TLS acceptor if configured.
    pub async fn bind(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        registrar: Option<Arc<dyn RouteRegister>>,
    ) -> anyhow::Result<Gateway> {
        let acceptor = match &config.tls {
            Some(tls) => Some(tls_acceptor(tls)?),
            None => None,
        };
        let listener = TcpListener::bind(config.listen.address)
            .await
            .with_context(|| format!("binding {}", config.listen.address))?;
        info!(addr = %listener.local_addr()?, domain = %config.server.domain, "gateway listening");
        Ok(Gateway {
            listener,
            config: Arc::new(config),
            acceptor,
            authenticator,
            registrar,
            conn_seq: AtomicU64::new(0),
        })
    }

    /// The bound address (useful when listening on port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever.
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn = self.conn_seq.fetch_add(1, Ordering::Relaxed);
                    info!(conn, %addr, "connection accepted");

                    let config = Arc::clone(&self.config);
                    let acceptor = self.acceptor.clone();
                    let authenticator = Arc::clone(&self.authenticator);
                    let registrar = self.registrar.clone();

                    tokio::spawn(async move {
                        let stream = match build_stream(
                            stream,
                            &config,
                            acceptor,
                            authenticator,
                            registrar,
                        ) {
                            Ok(stream) => stream,
                            Err(e) => {
                                error!(conn, %addr, error = %e, "handler registration failed");
                                return;
                            }
                        };
                        match stream.run().await {
                            Ok(()) => info!(conn, %addr, "connection closed"),
                            Err(e) => info!(conn, %addr, error = %e, "connection ended"),
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

/// Wires the per-connection dispatch tree and runtime.
///
/// Registration happens entirely before `run`; the handler set is
/// immutable for the life of the connection.
fn build_stream(
    stream: TcpStream,
    config: &Config,
    acceptor: Option<TlsAcceptor>,
    authenticator: Arc<dyn Authenticator>,
    registrar: Option<Arc<dyn RouteRegister>>,
) -> Result<XmppStream, RegistrationError> {
    let tls_required = config.tls.as_ref().map(|t| t.required).unwrap_or(false);
    let transport = XmlTransport::receiving(
        stream,
        &config.server.domain,
        acceptor,
        tls_required,
    );
    let props = Properties::new(&config.server.domain);

    let sasl = shared(
        SaslHandler::new().with_mechanism("PLAIN", Plain::new(authenticator)),
    );
    let mut bind = BindHandler::new();
    if let Some(registrar) = registrar {
        bind = bind.with_route_register(registrar);
    }
    let bind = shared(bind);
    let session = shared(SessionHandler::new(config.session.advertise));

    let iq_mux = IqMux::new()
        .handle(ns::BIND, "bind", "set", bind.clone())
        .handle(ns::SESSION, "session", "set", session.clone())
        .into_result()?;
    let mux = ElementMux::new()
        .handle(ns::SASL, "auth", sasl.clone())
        .handle(ns::SASL, "response", sasl.clone())
        .handle(ns::CLIENT, "iq", iq_mux)
        .handle(ns::CLIENT, "message", Blackhole)
        .handle(ns::CLIENT, "presence", Blackhole)
        .into_result()?;

    let features: Vec<Box<dyn FeatureGenerator>> =
        vec![Box::new(sasl), Box::new(bind.clone()), Box::new(session)];

    let stream = XmppStream::new(transport, props, mux, features)
        .with_idle_timeout(Duration::from_secs(config.timeouts.idle_secs));
    bind.lock()
        .expect("poisoned handler lock")
        .set_writer(stream.writer());
    Ok(stream)
}

/// Builds a TLS acceptor from PEM cert/key files.
pub fn tls_acceptor(tls: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
    let mut cert_reader = BufReader::new(
        File::open(&tls.cert_path).with_context(|| format!("opening {}", tls.cert_path))?,
    );
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .context("reading certificate chain")?;

    let mut key_reader = BufReader::new(
        File::open(&tls.key_path).with_context(|| format!("opening {}", tls.key_path))?,
    );
    let key = rustls_pemfile::pkcs8_private_keys(&mut key_reader)
        .next()
        .context("no pkcs8 private key found")?
        .context("reading private key")?;

    let server_config = RustlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, PrivateKeyDer::Pkcs8(key))
        .context("building tls config")?;
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
