//! In-process test gateway.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use quilld::config::{Config, ListenConfig, ServerConfig, SessionConfig, TimeoutsConfig, TlsConfig};
use quilld::handlers::{RouteRegister, StaticUsers};
use quilld::network::Gateway;
use quilld::stream::StreamWriter;
use quill_xmpp::Jid;

use super::tls::generate_tls_assets;

/// Records every JID bound through the gateway, keeping the stream
/// writers so tests can push stanzas back into a connection.
#[derive(Default)]
pub struct RouteRecorder {
    routes: Mutex<Vec<(String, StreamWriter)>>,
}

impl RouteRecorder {
    pub fn new() -> Arc<RouteRecorder> {
        Arc::new(RouteRecorder::default())
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .map(|(jid, _)| jid.clone())
            .collect()
    }

    pub fn writer_for(&self, jid: &str) -> Option<StreamWriter> {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .find(|(j, _)| j == jid)
            .map(|(_, w)| w.clone())
    }
}

impl RouteRegister for RouteRecorder {
    fn register_route(&self, jid: &Jid, stream: StreamWriter) {
        self.routes.lock().unwrap().push((jid.to_string(), stream));
    }
}

/// A gateway running in a background task on an ephemeral port.
pub struct TestServer {
    addr: SocketAddr,
    pub routes: Arc<RouteRecorder>,
    data_dir: Option<PathBuf>,
}

impl TestServer {
    /// Plaintext server for `localhost` with `alice`/`secret` configured.
    pub async fn spawn() -> anyhow::Result<TestServer> {
        Self::spawn_with(None).await
    }

    /// Server with STARTTLS offered; `required` replaces the feature list
    /// with starttls-only until the upgrade.
    pub async fn spawn_tls(required: bool) -> anyhow::Result<TestServer> {
        Self::spawn_with(Some(required)).await
    }

    async fn spawn_with(tls_required: Option<bool>) -> anyhow::Result<TestServer> {
        let mut data_dir = None;
        let tls = match tls_required {
            Some(required) => {
                let dir = std::env::temp_dir().join(format!(
                    "quilld-test-{}",
                    uuid::Uuid::new_v4().simple()
                ));
                let paths = generate_tls_assets(&dir)?;
                data_dir = Some(dir);
                Some(TlsConfig {
                    cert_path: paths.cert_path.to_string_lossy().into_owned(),
                    key_path: paths.key_path.to_string_lossy().into_owned(),
                    required,
                })
            }
            None => None,
        };

        let config = Config {
            server: ServerConfig {
                domain: "localhost".to_string(),
            },
            listen: ListenConfig {
                address: "127.0.0.1:0".parse()?,
            },
            tls,
            session: SessionConfig { advertise: true },
            timeouts: TimeoutsConfig { idle_secs: 5 },
            users: HashMap::from([("alice".to_string(), "secret".to_string())]),
        };

        let routes = RouteRecorder::new();
        let authenticator = Arc::new(StaticUsers::new(config.users.clone()));
        let gateway = Gateway::bind(config, authenticator, Some(routes.clone())).await?;
        let addr = gateway.local_addr()?;
        tokio::spawn(async move {
            let _ = gateway.run().await;
        });

        Ok(TestServer {
            addr,
            routes,
            data_dir,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(dir) = &self.data_dir {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
