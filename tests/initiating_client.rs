//! Drives the initiating-side transport against the server: the same
//! codec and upgrade machinery, from the client perspective.

mod common;

use common::tls::trusting_connector;
use common::TestServer;

use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;

use quill_xmpp::sasl::encode_plain;
use quill_xmpp::{ns, Element, ProtocolError, StreamHeader};
use quilld::stream::{Properties, XmlTransport};

fn client_header() -> StreamHeader {
    StreamHeader {
        to: "localhost".to_string(),
        version: "1.0".to_string(),
        namespace: ns::CLIENT.to_string(),
        ..StreamHeader::default()
    }
}

#[tokio::test]
async fn test_initiating_transport_negotiates_starttls_and_sasl() {
    let server = TestServer::spawn_tls(true).await.unwrap();
    let tcp = TcpStream::connect(server.addr()).await.unwrap();
    let server_name = ServerName::try_from("localhost".to_string()).unwrap();
    let mut transport =
        XmlTransport::initiating(tcp, Some((trusting_connector(), server_name)));

    let mut props = Properties::new("");
    props.header = Some(client_header());

    // Plaintext: header out, server header in, then the features element
    // carrying STARTTLS is intercepted and the transport upgrades itself.
    transport.start(&mut props).await.unwrap();
    let open = transport.next().await.unwrap();
    assert_eq!(open.prefix, "stream");
    assert_eq!(open.name, "stream");
    assert_eq!(open.attr("from"), Some("localhost"));

    let err = transport.next().await.unwrap_err();
    assert!(matches!(err, ProtocolError::RequireRestart), "got {err:?}");
    assert!(transport.is_secure());

    // Restart over TLS: fresh header exchange, mechanisms now offered.
    transport.start(&mut props).await.unwrap();
    let open = transport.next().await.unwrap();
    assert_eq!(open.name, "stream");
    let features = transport.next().await.unwrap();
    assert_eq!(features.name, "features");
    let mechanisms = features.find("mechanisms").expect("mechanisms offered");
    assert!(mechanisms
        .child_elements()
        .any(|m| m.text() == "PLAIN"));

    // SASL PLAIN over the upgraded socket.
    let auth = Element::new("auth")
        .with_attr("xmlns", ns::SASL)
        .with_attr("mechanism", "PLAIN")
        .with_text(&encode_plain("alice", "secret"));
    transport.write_element(&auth).await.unwrap();
    let reply = transport.next().await.unwrap();
    assert_eq!(reply.name, "success");
    assert!(reply.matches_namespace(ns::SASL));
}

#[tokio::test]
async fn test_initiating_transport_without_tls_context_sees_features() {
    let server = TestServer::spawn_tls(false).await.unwrap();
    let tcp = TcpStream::connect(server.addr()).await.unwrap();
    // No connector: the features element must be surfaced, not
    // intercepted.
    let mut transport = XmlTransport::initiating(tcp, None);

    let mut props = Properties::new("");
    props.header = Some(client_header());
    transport.start(&mut props).await.unwrap();

    let open = transport.next().await.unwrap();
    assert_eq!(open.name, "stream");
    let features = transport.next().await.unwrap();
    assert_eq!(features.name, "features");
    assert!(features
        .child_elements()
        .any(|c| c.name == "starttls" && c.matches_namespace(ns::TLS)));
    assert!(!transport.is_secure());
}

#[tokio::test]
async fn test_initiating_write_stanza() {
    // write_stanza goes through the same sink as write_element.
    let server = TestServer::spawn().await.unwrap();
    let tcp = TcpStream::connect(server.addr()).await.unwrap();
    let mut transport = XmlTransport::initiating(tcp, None);

    let mut props = Properties::new("");
    props.header = Some(client_header());
    transport.start(&mut props).await.unwrap();
    let _open = transport.next().await.unwrap();
    let _features = transport.next().await.unwrap();

    let mut iq = quill_xmpp::Iq::new(quill_xmpp::IqType::Get, "p1");
    iq.stanza
        .payload
        .push(Element::new("ping").with_attr("xmlns", "urn:xmpp:ping"));
    transport.write_stanza(iq.into_stanza()).await.unwrap();

    // Unauthenticated IQ: the server answers with a stream error and
    // closes.
    let reply = transport.next().await.unwrap();
    assert_eq!(reply.prefix, "stream");
    assert_eq!(reply.name, "error");
    assert!(reply.find("not-authorized").is_some());
}
