use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use trialdb_store::FileProtocol;
use trialdb_transport::{Channel, SecurityLayer, TransportError};
use trialdb_wire::{Codec, Request};

use crate::config::ServerConfig;
use crate::dispatch::dispatch;
use crate::error::{ServerError, ServerResult};

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Serves one file-backed store over TCP.
///
/// Each accepted connection gets its own thread and is optionally
/// upgraded through the encrypted handshake; requests are served one
/// frame at a time against the shared store, which serializes access via
/// its own mutex and cross-process lock. Connections hold no server-side
/// state between calls.
pub struct StoreServer {
    protocol: Arc<Mutex<FileProtocol>>,
    config: ServerConfig,
}

/// Handle to a running server.
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// The address the server actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Already-established connections drain on their own threads.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }
}

impl StoreServer {
    pub fn new(protocol: FileProtocol, config: ServerConfig) -> Self {
        Self {
            protocol: Arc::new(Mutex::new(protocol)),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the listener and start serving on a background thread.
    pub fn start(self) -> ServerResult<ServerHandle> {
        let listener = TcpListener::bind(&self.config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let protocol = self.protocol;
        let security = self.config.security;

        let join = thread::Builder::new()
            .name("trialdb-accept".to_string())
            .spawn(move || accept_loop(listener, protocol, security, flag))?;

        info!(%local_addr, security = ?security, "store server listening");
        Ok(ServerHandle {
            shutdown,
            join,
            local_addr,
        })
    }
}

fn accept_loop(
    listener: TcpListener,
    protocol: Arc<Mutex<FileProtocol>>,
    security: SecurityLayer,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "connection accepted");
                let protocol = Arc::clone(&protocol);
                thread::spawn(move || {
                    if let Err(err) = serve_connection(stream, protocol, security) {
                        debug!(%peer, error = %err, "connection ended with error");
                    }
                });
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(err) => {
                warn!(error = %err, "accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("accept loop stopped");
}

fn serve_connection(
    stream: TcpStream,
    protocol: Arc<Mutex<FileProtocol>>,
    security: SecurityLayer,
) -> ServerResult<()> {
    // The listener is non-blocking for shutdown polling; the accepted
    // socket must not inherit that.
    stream.set_nonblocking(false)?;
    let mut channel = Channel::accept(stream, security)?;

    loop {
        let payload = match channel.recv() {
            Ok(payload) => payload,
            Err(TransportError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                debug!("connection closed by peer");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let request: Request = Codec::decode(&payload)?;
        let response = {
            let mut protocol = protocol.lock().map_err(|_| ServerError::Poisoned)?;
            dispatch(&mut protocol, request)
        };
        channel.send(&Codec::encode(&response)?)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trialdb_query::Predicate;
    use trialdb_store::StoreOptions;
    use trialdb_types::{Project, Trial};
    use trialdb_wire::Response;

    fn start_server(dir: &tempfile::TempDir, security: SecurityLayer) -> ServerHandle {
        let protocol =
            FileProtocol::open(dir.path().join("db.json"), StoreOptions::default()).unwrap();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            security,
        };
        StoreServer::new(protocol, config).start().unwrap()
    }

    fn call(channel: &mut Channel<TcpStream>, request: &Request) -> Response {
        channel.send(&Codec::encode(request).unwrap()).unwrap();
        Codec::decode(&channel.recv().unwrap()).unwrap()
    }

    #[test]
    fn serves_requests_over_plain_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_server(&dir, SecurityLayer::None);

        let stream = TcpStream::connect(handle.local_addr()).unwrap();
        let mut channel = Channel::connect(stream, SecurityLayer::None).unwrap();

        let response = call(
            &mut channel,
            &Request::NewProject {
                project: Project::new("p"),
            },
        );
        assert!(matches!(response, Response::Project(_)));

        let response = call(
            &mut channel,
            &Request::NewTrial {
                trial: Trial::new([("a".to_string(), json!(1))].into_iter().collect()),
            },
        );
        assert!(matches!(response, Response::Trial(_)));

        let response = call(
            &mut channel,
            &Request::FetchTrials {
                predicate: Predicate::new(),
            },
        );
        match response {
            Response::Trials(trials) => assert_eq!(trials.len(), 1),
            other => panic!("unexpected response: {other:?}"),
        }

        handle.shutdown();
    }

    #[test]
    fn serves_requests_over_encrypted_channel() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_server(&dir, SecurityLayer::Aes);

        let stream = TcpStream::connect(handle.local_addr()).unwrap();
        let mut channel = Channel::connect(stream, SecurityLayer::Aes).unwrap();

        let response = call(
            &mut channel,
            &Request::NewProject {
                project: Project::new("secure"),
            },
        );
        assert!(matches!(response, Response::Project(_)));

        handle.shutdown();
    }

    #[test]
    fn two_connections_share_one_store() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_server(&dir, SecurityLayer::None);

        let mut first = Channel::connect(
            TcpStream::connect(handle.local_addr()).unwrap(),
            SecurityLayer::None,
        )
        .unwrap();
        let mut second = Channel::connect(
            TcpStream::connect(handle.local_addr()).unwrap(),
            SecurityLayer::None,
        )
        .unwrap();

        call(
            &mut first,
            &Request::NewProject {
                project: Project::new("shared"),
            },
        );
        let response = call(
            &mut second,
            &Request::FetchProjects {
                predicate: Predicate::new(),
            },
        );
        match response {
            Response::Projects(projects) => assert_eq!(projects.len(), 1),
            other => panic!("unexpected response: {other:?}"),
        }

        handle.shutdown();
    }

    #[test]
    fn shutdown_stops_accepting() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_server(&dir, SecurityLayer::None);
        let addr = handle.local_addr();
        handle.shutdown();
        // The listener is gone; a fresh connection either fails outright
        // or is never served.
        match TcpStream::connect(addr) {
            Err(_) => {}
            Ok(stream) => {
                let mut channel = Channel::connect(stream, SecurityLayer::None).unwrap();
                channel
                    .send(&Codec::encode(&Request::Commit).unwrap())
                    .unwrap_or_default();
                assert!(channel.recv().is_err());
            }
        }
    }
}
