use std::io::{Read, Write};
use std::str::FromStr;

use crate::encrypted::EncryptedStream;
use crate::error::{TransportError, TransportResult};
use crate::frame::{read_frame, write_frame};

/// Which security layer a connection negotiates at setup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SecurityLayer {
    /// Length-prefixed frames in the clear.
    #[default]
    None,
    /// X25519 handshake, then AES-256-CBC-encrypted frames.
    Aes,
}

impl FromStr for SecurityLayer {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "aes" => Ok(Self::Aes),
            other => Err(TransportError::UnknownSecurityLayer(other.to_string())),
        }
    }
}

/// A framed byte channel, optionally upgraded through the encrypted
/// handshake.
///
/// Both variants speak the same length-prefixed framing, so the layer
/// above (the wire codec) never cares which one it got.
pub enum Channel<S> {
    Plain(S),
    Encrypted(EncryptedStream<S>),
}

impl<S: Read + Write> Channel<S> {
    /// Set up the connector side of a channel.
    pub fn connect(stream: S, security: SecurityLayer) -> TransportResult<Self> {
        match security {
            SecurityLayer::None => Ok(Self::Plain(stream)),
            SecurityLayer::Aes => Ok(Self::Encrypted(EncryptedStream::connect(stream)?)),
        }
    }

    /// Set up the acceptor side of a channel.
    pub fn accept(stream: S, security: SecurityLayer) -> TransportResult<Self> {
        match security {
            SecurityLayer::None => Ok(Self::Plain(stream)),
            SecurityLayer::Aes => Ok(Self::Encrypted(EncryptedStream::accept(stream)?)),
        }
    }

    /// Send one payload as a single frame.
    pub fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        match self {
            Self::Plain(stream) => write_frame(stream, payload),
            Self::Encrypted(stream) => stream.send(payload),
        }
    }

    /// Receive one frame's payload.
    pub fn recv(&mut self) -> TransportResult<Vec<u8>> {
        match self {
            Self::Plain(stream) => read_frame(stream),
            Self::Encrypted(stream) => stream.recv(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (client.join().unwrap(), server)
    }

    #[test]
    fn security_layer_parsing() {
        assert_eq!("AES".parse::<SecurityLayer>().unwrap(), SecurityLayer::Aes);
        assert_eq!("aes".parse::<SecurityLayer>().unwrap(), SecurityLayer::Aes);
        assert_eq!("none".parse::<SecurityLayer>().unwrap(), SecurityLayer::None);
        assert_eq!("".parse::<SecurityLayer>().unwrap(), SecurityLayer::None);
        assert!(matches!(
            "rot13".parse::<SecurityLayer>().unwrap_err(),
            TransportError::UnknownSecurityLayer(_)
        ));
    }

    #[test]
    fn plain_channel_roundtrip() {
        let (client, server) = socket_pair();
        let mut connector = Channel::connect(client, SecurityLayer::None).unwrap();
        let mut acceptor = Channel::accept(server, SecurityLayer::None).unwrap();

        connector.send(b"in the clear").unwrap();
        assert_eq!(acceptor.recv().unwrap(), b"in the clear");
    }

    #[test]
    fn encrypted_channel_roundtrip() {
        let (client, server) = socket_pair();
        let acceptor =
            thread::spawn(move || Channel::accept(server, SecurityLayer::Aes).unwrap());
        let mut connector = Channel::connect(client, SecurityLayer::Aes).unwrap();
        let mut acceptor = acceptor.join().unwrap();

        connector.send(b"over the wire").unwrap();
        assert_eq!(acceptor.recv().unwrap(), b"over the wire");
        acceptor.send(b"and back").unwrap();
        assert_eq!(connector.recv().unwrap(), b"and back");
    }
}
