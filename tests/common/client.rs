//! Raw XMPP test client.
//!
//! Writes protocol fragments as literal strings and asserts on the bytes
//! the server sends back, so the tests pin the wire format rather than
//! going through the crate's own serializer.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;

use super::tls::trusting_connector;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

enum ClientStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

/// A test client speaking raw XMPP.
pub struct TestClient {
    stream: Option<ClientStream>,
    collected: String,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<TestClient> {
        let stream = TcpStream::connect(addr).await?;
        Ok(TestClient {
            stream: Some(ClientStream::Plain(stream)),
            collected: String::new(),
        })
    }

    /// Writes a raw fragment.
    pub async fn send(&mut self, data: &str) -> anyhow::Result<()> {
        match self.stream.as_mut().context("client closed")? {
            ClientStream::Plain(s) => s.write_all(data.as_bytes()).await?,
            ClientStream::Tls(s) => s.write_all(data.as_bytes()).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        let n = match self.stream.as_mut().context("client closed")? {
            ClientStream::Plain(s) => s.read(buf).await?,
            ClientStream::Tls(s) => s.read(buf).await?,
        };
        Ok(n)
    }

    /// Reads until one of `needles` appears in the collected bytes;
    /// returns and clears everything collected so far.
    pub async fn read_until_any(&mut self, needles: &[&str]) -> anyhow::Result<String> {
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
        let mut buf = [0u8; 4096];
        loop {
            if needles.iter().any(|n| self.collected.contains(n)) {
                return Ok(std::mem::take(&mut self.collected));
            }
            let n = tokio::time::timeout_at(deadline, self.read(&mut buf))
                .await
                .with_context(|| {
                    format!(
                        "timed out waiting for {needles:?}; collected so far: {:?}",
                        self.collected
                    )
                })??;
            if n == 0 {
                bail!(
                    "connection closed waiting for {needles:?}; collected: {:?}",
                    self.collected
                );
            }
            self.collected.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    }

    /// Reads until the collected bytes contain `needle`.
    pub async fn read_until(&mut self, needle: &str) -> anyhow::Result<String> {
        self.read_until_any(&[needle]).await
    }

    /// Reads until the server closes the connection.
    pub async fn read_to_close(&mut self) -> anyhow::Result<String> {
        let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
        let mut buf = [0u8; 4096];
        loop {
            let n = tokio::time::timeout_at(deadline, self.read(&mut buf))
                .await
                .context("timed out waiting for close")??;
            if n == 0 {
                return Ok(std::mem::take(&mut self.collected));
            }
            self.collected.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    }

    /// Opens (or reopens) the stream and returns everything up to the end
    /// of the server's feature list. The feature container is
    /// self-closing when no feature applies.
    pub async fn open_stream(&mut self, to: &str) -> anyhow::Result<String> {
        self.send(&format!(
            "<stream:stream to='{to}' version='1.0' xmlns='jabber:client' \
             xmlns:stream='http://etherx.jabber.org/streams'>"
        ))
        .await?;
        self.read_until_any(&["</stream:features>", "<stream:features/>"])
            .await
    }

    /// Sends `<starttls/>`, waits for `<proceed/>`, and performs the TLS
    /// handshake in place.
    pub async fn starttls(&mut self) -> anyhow::Result<()> {
        self.send("<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>")
            .await?;
        self.read_until("<proceed").await?;

        let plain = match self.stream.take().context("client closed")? {
            ClientStream::Plain(s) => s,
            tls @ ClientStream::Tls(_) => {
                self.stream = Some(tls);
                bail!("already on tls");
            }
        };
        let connector = trusting_connector();
        let server_name = ServerName::try_from("localhost".to_string())?;
        let tls = connector.connect(server_name, plain).await?;
        self.stream = Some(ClientStream::Tls(Box::new(tls)));
        self.collected.clear();
        Ok(())
    }

    /// Runs SASL PLAIN with the given base64 payload and returns the
    /// server's reply (success or failure element).
    pub async fn sasl_plain(&mut self, payload: &str) -> anyhow::Result<String> {
        self.send(&format!(
            "<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='PLAIN'>{payload}</auth>"
        ))
        .await?;
        self.read_until_any(&["<success", "</failure>"]).await
    }
}
