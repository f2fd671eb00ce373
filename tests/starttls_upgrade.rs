//! Integration tests for the in-band STARTTLS upgrade.

mod common;

use common::{TestClient, TestServer};

/// `\0alice\0secret`
const PLAIN_OK: &str = "AGFsaWNlAHNlY3JldA==";

#[tokio::test]
async fn test_required_tls_replaces_other_features() {
    let server = TestServer::spawn_tls(true).await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    let features = client.open_stream("localhost").await.unwrap();
    assert!(features.contains("<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'>"));
    assert!(features.contains("<required/>"));
    // Required STARTTLS pushes everything else out of the list.
    assert!(!features.contains("<mechanisms"), "got {features:?}");
}

#[tokio::test]
async fn test_optional_tls_is_advertised_alongside_sasl() {
    let server = TestServer::spawn_tls(false).await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    let features = client.open_stream("localhost").await.unwrap();
    assert!(features.contains("<starttls"));
    assert!(!features.contains("<required/>"));
    assert!(features.contains("<mechanisms"));
}

#[tokio::test]
async fn test_full_upgrade_cycle() {
    let server = TestServer::spawn_tls(true).await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    // Plaintext: open, see starttls required, upgrade.
    client.open_stream("localhost").await.unwrap();
    client.starttls().await.unwrap();

    // Over TLS: a fresh stream open is expected; mechanisms appear now
    // and starttls is no longer offered.
    let features = client.open_stream("localhost").await.unwrap();
    assert!(features.contains("<mechanisms"), "got {features:?}");
    assert!(features.contains("<mechanism>PLAIN</mechanism>"));
    assert!(!features.contains("<starttls"), "got {features:?}");

    // SASL and bind proceed over the upgraded socket.
    let reply = client.sasl_plain(PLAIN_OK).await.unwrap();
    assert!(reply.contains("<success"));

    let features = client.open_stream("localhost").await.unwrap();
    assert!(features.contains("<bind"));

    client
        .send(
            "<iq type='set' id='b1'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
             <resource>phone</resource></bind></iq>",
        )
        .await
        .unwrap();
    let reply = client.read_until("</iq>").await.unwrap();
    assert!(reply.contains("<jid>alice@localhost/phone</jid>"), "got {reply:?}");
    assert_eq!(server.routes.routes(), ["alice@localhost/phone"]);
}

#[tokio::test]
async fn test_proceed_is_written_before_handshake() {
    let server = TestServer::spawn_tls(false).await.unwrap();
    let mut client = TestClient::connect(server.addr()).await.unwrap();

    client.open_stream("localhost").await.unwrap();
    client
        .send("<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>")
        .await
        .unwrap();
    let reply = client.read_until("<proceed").await.unwrap();
    assert!(reply.contains("<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>"));
}
