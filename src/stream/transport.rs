//! Byte-level stream transport.
//!
//! [`XmlTransport`] owns the socket and its XML decoder, framed through
//! [`XmppCodec`]. It performs the stream preamble exchange, pulls complete
//! elements off the wire, and transparently performs the in-band STARTTLS
//! upgrade: when the next would-be element is `<starttls/>` (receiving) or
//! a `<features>` carrying a STARTTLS child (initiating) on a plaintext
//! socket, the transport handshakes TLS on the same socket, replaces its
//! stream/decoder pair, and returns [`ProtocolError::RequireRestart`]
//! instead of an element.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use uuid::Uuid;

use quill_xmpp::element::defs;
use quill_xmpp::{
    ns, Element, Frame, ProtocolError, Stanza, StreamErrorCond, StreamHeader, XmppCodec,
};

use crate::stream::{Mode, Properties, Status};

/// The socket behind a stream, before or after its TLS upgrade.
pub enum TransportStream {
    /// Plain TCP.
    Tcp(TcpStream),
    /// Server-side TLS.
    Tls(Box<tokio_rustls::server::TlsStream<TcpStream>>),
    /// Client-side TLS.
    ClientTls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            TransportStream::ClientTls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            TransportStream::ClientTls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            TransportStream::ClientTls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            TransportStream::ClientTls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A stream transport over TCP, upgradable to TLS in place.
pub struct XmlTransport {
    io: Option<Framed<TransportStream, XmppCodec>>,
    mode: Mode,
    domain: String,
    acceptor: Option<TlsAcceptor>,
    connector: Option<(TlsConnector, ServerName<'static>)>,
    tls_required: bool,
    secure: bool,
}

impl XmlTransport {
    /// A receiving-side transport for a freshly accepted socket.
    ///
    /// When `acceptor` is present the STARTTLS feature is offered; with
    /// `tls_required` it replaces every other feature until the upgrade
    /// happens.
    pub fn receiving(
        stream: TcpStream,
        domain: &str,
        acceptor: Option<TlsAcceptor>,
        tls_required: bool,
    ) -> XmlTransport {
        if let Err(e) = enable_keepalive(&stream) {
            warn!(error = %e, "failed to enable TCP keepalive");
        }
        XmlTransport {
            io: Some(Framed::new(
                TransportStream::Tcp(stream),
                XmppCodec::new(),
            )),
            mode: Mode::Receiving,
            domain: domain.to_string(),
            acceptor,
            connector: None,
            tls_required,
            secure: false,
        }
    }

    /// A receiving-side transport over an already-established TLS socket
    /// (a direct-TLS listener).
    pub fn receiving_tls(
        stream: tokio_rustls::server::TlsStream<TcpStream>,
        domain: &str,
    ) -> XmlTransport {
        XmlTransport {
            io: Some(Framed::new(
                TransportStream::Tls(Box::new(stream)),
                XmppCodec::new(),
            )),
            mode: Mode::Receiving,
            domain: domain.to_string(),
            acceptor: None,
            connector: None,
            tls_required: false,
            secure: true,
        }
    }

    /// An initiating-side transport. When `tls` is present the transport
    /// negotiates STARTTLS as soon as the server advertises it.
    pub fn initiating(
        stream: TcpStream,
        tls: Option<(TlsConnector, ServerName<'static>)>,
    ) -> XmlTransport {
        XmlTransport {
            io: Some(Framed::new(
                TransportStream::Tcp(stream),
                XmppCodec::new(),
            )),
            mode: Mode::Initiating,
            domain: String::new(),
            acceptor: None,
            connector: tls,
            tls_required: false,
            secure: false,
        }
    }

    /// Whether the socket is TLS-protected.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    fn io_mut(&mut self) -> Result<&mut Framed<TransportStream, XmppCodec>, ProtocolError> {
        self.io.as_mut().ok_or_else(|| {
            ProtocolError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport closed",
            ))
        })
    }

    /// Starts or restarts the stream.
    ///
    /// Receiving mode waits for the peer's `<stream:stream>`, answers with
    /// its own header (fresh 128-bit id, addresses swapped) and the
    /// feature list from `props`. A `to` that is not the served domain
    /// draws a `<host-unknown/>` stream error; the returned flag is then
    /// `true` and the stream must be torn down.
    ///
    /// Initiating mode writes the caller-supplied header from `props`.
    pub async fn start(&mut self, props: &mut Properties) -> Result<bool, ProtocolError> {
        if self.secure {
            props.status.insert(Status::SECURE);
        }
        match self.mode {
            Mode::Initiating => {
                let header = props
                    .header
                    .clone()
                    .filter(|h| !h.is_empty())
                    .ok_or(ProtocolError::HeaderNotSet)?;
                self.write_raw(&header.to_bytes()).await?;
                Ok(false)
            }
            Mode::Receiving => self.start_receiving(props).await,
        }
    }

    async fn start_receiving(&mut self, props: &mut Properties) -> Result<bool, ProtocolError> {
        let el = self.next().await?;
        let mut header = StreamHeader::from_element(&el)?;
        header.id = Uuid::new_v4().simple().to_string();

        if header.to != self.domain {
            warn!(to = %header.to, domain = %self.domain, "stream addressed to unknown host");
            header.from = self.domain.clone();
            self.write_raw(&header.to_bytes()).await?;
            self.write_element(&StreamErrorCond::HostUnknown.to_element())
                .await?;
            props.status.insert(Status::CLOSED);
            return Ok(true);
        }

        header.to = std::mem::take(&mut header.from);
        header.from = self.domain.clone();
        self.write_raw(&header.to_bytes()).await?;
        debug!(id = %header.id, "stream header exchanged");

        let mut features = defs::stream_features();
        for feature in &props.features {
            features = features.with_child(feature.clone());
        }
        if self.acceptor.is_some() && !self.secure {
            let mut starttls = defs::starttls();
            if self.tls_required {
                starttls = starttls.with_child(defs::required());
                features.children.clear();
            }
            features = features.with_child(starttls);
        }
        self.write_element(&features).await?;

        props.header = Some(header);
        Ok(false)
    }

    /// Pulls the next complete element off the stream.
    ///
    /// The root `<stream:stream>` open tag is returned as an element
    /// without waiting for its close tag. An end tag at document level
    /// returns [`ProtocolError::StreamClosed`]. A STARTTLS exchange is
    /// intercepted: the transport upgrades itself and returns
    /// [`ProtocolError::RequireRestart`].
    pub async fn next(&mut self) -> Result<Element, ProtocolError> {
        let frame = match self.io_mut()?.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )))
            }
        };
        match frame {
            Frame::Open(el) => Ok(el),
            Frame::Close => Err(ProtocolError::StreamClosed),
            Frame::Element(el) => {
                if self.intercepts_starttls(&el) {
                    match self.mode {
                        Mode::Receiving => self.upgrade_receiving().await?,
                        Mode::Initiating => self.upgrade_initiating().await?,
                    }
                    return Err(ProtocolError::RequireRestart);
                }
                Ok(el)
            }
        }
    }

    fn intercepts_starttls(&self, el: &Element) -> bool {
        if self.secure {
            return false;
        }
        match self.mode {
            Mode::Receiving => {
                self.acceptor.is_some()
                    && el.name == "starttls"
                    && el.matches_namespace(ns::TLS)
            }
            Mode::Initiating => {
                self.connector.is_some()
                    && el.name == "features"
                    && el
                        .child_elements()
                        .any(|c| c.name == "starttls" && c.matches_namespace(ns::TLS))
            }
        }
    }

    /// `<proceed/>`, then handshake as the TLS server and swap the
    /// socket/decoder pair.
    async fn upgrade_receiving(&mut self) -> Result<(), ProtocolError> {
        self.write_element(&defs::proceed()).await?;
        let tcp = self.take_plaintext()?;
        let acceptor = self.acceptor.clone().ok_or_else(|| {
            ProtocolError::Io(io::Error::new(io::ErrorKind::InvalidInput, "no tls context"))
        })?;
        let tls = acceptor.accept(tcp).await?;
        debug!("tls handshake complete, decoder reset");
        self.io = Some(Framed::new(
            TransportStream::Tls(Box::new(tls)),
            XmppCodec::new(),
        ));
        self.secure = true;
        Ok(())
    }

    /// `<starttls/>`, await `<proceed/>`, then handshake as the TLS client.
    async fn upgrade_initiating(&mut self) -> Result<(), ProtocolError> {
        self.write_element(&defs::starttls()).await?;
        let reply = match self.io_mut()?.next().await {
            Some(Ok(Frame::Element(el))) => el,
            Some(Ok(_)) | None => return Err(ProtocolError::UpgradeRefused),
            Some(Err(e)) => return Err(e),
        };
        if reply.name != "proceed" || !reply.matches_namespace(ns::TLS) {
            return Err(ProtocolError::UpgradeRefused);
        }
        let tcp = self.take_plaintext()?;
        let (connector, server_name) = self.connector.clone().ok_or_else(|| {
            ProtocolError::Io(io::Error::new(io::ErrorKind::InvalidInput, "no tls context"))
        })?;
        let tls = connector.connect(server_name, tcp).await?;
        debug!("tls handshake complete, decoder reset");
        self.io = Some(Framed::new(
            TransportStream::ClientTls(Box::new(tls)),
            XmppCodec::new(),
        ));
        self.secure = true;
        Ok(())
    }

    /// Recovers the plaintext socket from the framed pair for the upgrade.
    fn take_plaintext(&mut self) -> Result<TcpStream, ProtocolError> {
        let framed = self.io.take().ok_or_else(|| {
            ProtocolError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport closed",
            ))
        })?;
        match framed.into_parts().io {
            TransportStream::Tcp(tcp) => Ok(tcp),
            _ => Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "transport already secure",
            ))),
        }
    }

    /// Serializes and writes one element.
    pub async fn write_element(&mut self, el: &Element) -> Result<(), ProtocolError> {
        self.io_mut()?.send(el).await
    }

    /// Serializes and writes one stanza.
    pub async fn write_stanza(&mut self, stanza: Stanza) -> Result<(), ProtocolError> {
        self.write_element(&stanza.into_element()).await
    }

    /// Writes raw bytes: the stream header and the close tag, which are
    /// not complete elements.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let io = self.io_mut()?.get_mut();
        io.write_all(bytes).await?;
        io.flush().await?;
        Ok(())
    }

    /// Drops the underlying connection.
    pub async fn close(&mut self) {
        if let Some(mut framed) = self.io.take() {
            let _ = framed.get_mut().shutdown().await;
        }
    }
}

fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};
    use std::time::Duration;

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    sock.set_tcp_keepalive(&keepalive)
}
