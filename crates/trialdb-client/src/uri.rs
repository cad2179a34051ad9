use std::path::PathBuf;

use tracing::warn;

use trialdb_store::{FileProtocol, Protocol, StoreError, StoreOptions, StoreResult};
use trialdb_transport::SecurityLayer;

use crate::client::RemoteClient;

/// A resolved backend selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    /// In-process file store: `file://path/to/db.json` or `file:db.json`.
    File { path: PathBuf },
    /// Remote dispatch client:
    /// `socket://host:port[?security_layer=AES]`.
    Socket {
        host: String,
        port: u16,
        security: SecurityLayer,
    },
}

/// Parse a backend URI.
pub fn parse_uri(uri: &str) -> StoreResult<Backend> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(Backend::File {
            path: PathBuf::from(path),
        });
    }
    if let Some(path) = uri.strip_prefix("file:") {
        return Ok(Backend::File {
            path: PathBuf::from(path),
        });
    }
    if let Some(rest) = uri.strip_prefix("socket://") {
        let (address, query) = match rest.split_once('?') {
            Some((address, query)) => (address, Some(query)),
            None => (rest, None),
        };
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| StoreError::Backend(format!("socket uri needs host:port: {uri}")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| StoreError::Backend(format!("invalid port in uri: {uri}")))?;

        let mut security = SecurityLayer::None;
        if let Some(query) = query {
            for pair in query.split('&') {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                match key {
                    "security_layer" => {
                        security = value
                            .parse()
                            .map_err(|e| StoreError::Backend(format!("{e}")))?;
                    }
                    other => warn!(option = other, "ignoring unknown uri option"),
                }
            }
        }
        return Ok(Backend::Socket {
            host: host.to_string(),
            port,
            security,
        });
    }
    Err(StoreError::Backend(format!("unknown backend uri: {uri}")))
}

/// Resolve a URI to a ready store protocol with default options.
pub fn open(uri: &str) -> StoreResult<Box<dyn Protocol>> {
    open_with(uri, StoreOptions::default())
}

/// Resolve a URI to a ready store protocol.
///
/// `options` apply to the file backend; the socket backend's store lives
/// in the server process and keeps the server's options.
pub fn open_with(uri: &str, options: StoreOptions) -> StoreResult<Box<dyn Protocol>> {
    match parse_uri(uri)? {
        Backend::File { path } => Ok(Box::new(FileProtocol::open(path, options)?)),
        Backend::Socket {
            host,
            port,
            security,
        } => Ok(Box::new(RemoteClient::connect(&host, port, security)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uri_forms() {
        assert_eq!(
            parse_uri("file://runs/db.json").unwrap(),
            Backend::File {
                path: PathBuf::from("runs/db.json")
            }
        );
        assert_eq!(
            parse_uri("file:db.json").unwrap(),
            Backend::File {
                path: PathBuf::from("db.json")
            }
        );
    }

    #[test]
    fn socket_uri_plain() {
        assert_eq!(
            parse_uri("socket://localhost:9618").unwrap(),
            Backend::Socket {
                host: "localhost".into(),
                port: 9618,
                security: SecurityLayer::None,
            }
        );
    }

    #[test]
    fn socket_uri_with_security_layer() {
        assert_eq!(
            parse_uri("socket://10.0.0.7:4000?security_layer=AES").unwrap(),
            Backend::Socket {
                host: "10.0.0.7".into(),
                port: 4000,
                security: SecurityLayer::Aes,
            }
        );
    }

    #[test]
    fn bad_uris_are_rejected() {
        assert!(parse_uri("mongo://db").is_err());
        assert!(parse_uri("socket://nohost").is_err());
        assert!(parse_uri("socket://host:notaport").is_err());
        assert!(parse_uri("socket://host:1?security_layer=rot13").is_err());
    }
}
