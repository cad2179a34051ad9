use std::io::{Read, Write};

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use tracing::debug;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::{TransportError, TransportResult};
use crate::frame::{read_frame, write_frame, MAX_FRAME_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size; ciphertext lengths are always a multiple of this.
pub const CIPHER_BLOCK_SIZE: usize = 16;

/// Context label fed to key derivation. Protocol constant: both peers
/// must use the same bytes or they derive different session keys.
const HANDSHAKE_INFO: &[u8] = b"handshake data";

/// Which side of the handshake we are: the connector sends its public key
/// first, the acceptor reads first. The derivation is otherwise identical.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Connector,
    Acceptor,
}

/// Session key material derived from the shared secret: a cipher key and
/// an initialization vector, split out of 48 bytes of HKDF output.
struct SessionKey {
    key: [u8; 32],
    iv: [u8; 16],
}

fn handshake<S: Read + Write>(stream: &mut S, role: Role) -> TransportResult<SessionKey> {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let ours = PublicKey::from(&secret);

    let mut theirs = [0u8; 32];
    match role {
        Role::Connector => {
            stream.write_all(ours.as_bytes())?;
            stream.flush()?;
            stream.read_exact(&mut theirs)?;
        }
        Role::Acceptor => {
            stream.read_exact(&mut theirs)?;
            stream.write_all(ours.as_bytes())?;
            stream.flush()?;
        }
    }

    let shared = secret.diffie_hellman(&PublicKey::from(theirs));
    if !shared.was_contributory() {
        return Err(TransportError::Handshake(
            "peer sent a non-contributory public key".into(),
        ));
    }

    let mut okm = [0u8; 48];
    Hkdf::<Sha256>::new(None, shared.as_bytes())
        .expand(HANDSHAKE_INFO, &mut okm)
        .map_err(|_| TransportError::Handshake("key derivation failed".into()))?;

    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&okm[..32]);
    iv.copy_from_slice(&okm[32..]);
    debug!(role = ?role, "transport keyed");
    Ok(SessionKey { key, iv })
}

/// A symmetric-key-encrypted channel over a raw byte stream.
///
/// The stream moves through unkeyed → handshaking → keyed states:
/// construction consumes the raw (unkeyed) stream, runs the X25519 key
/// agreement, and only hands back a value once keyed — so `send`/`recv`
/// exist exclusively on keyed streams.
///
/// Every payload is PKCS#7-padded, encrypted with AES-256-CBC under the
/// derived key/iv, and carried in a length-prefixed frame, so message
/// boundaries survive TCP fragmentation. A frame that fails to decrypt is
/// a channel error; callers are expected to drop the connection.
///
/// No identity or certificate verification occurs at any point: the
/// channel is confidential against passive eavesdroppers only and assumes
/// a trusted network. An active man-in-the-middle can substitute keys
/// during the handshake.
pub struct EncryptedStream<S> {
    inner: S,
    session: SessionKey,
}

impl<S: Read + Write> EncryptedStream<S> {
    /// Handshake in the connector role (send our key first).
    pub fn connect(mut inner: S) -> TransportResult<Self> {
        let session = handshake(&mut inner, Role::Connector)?;
        Ok(Self { inner, session })
    }

    /// Handshake in the acceptor role (read the peer's key first).
    pub fn accept(mut inner: S) -> TransportResult<Self> {
        let session = handshake(&mut inner, Role::Acceptor)?;
        Ok(Self { inner, session })
    }

    /// Encrypt and send one payload as a single frame.
    pub fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        let ciphertext = Aes256CbcEnc::new(&self.session.key.into(), &self.session.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(payload);
        write_frame(&mut self.inner, &ciphertext)
    }

    /// Receive and decrypt one frame.
    pub fn recv(&mut self) -> TransportResult<Vec<u8>> {
        let ciphertext = read_frame(&mut self.inner)?;
        if ciphertext.is_empty() || ciphertext.len() % CIPHER_BLOCK_SIZE != 0 {
            return Err(TransportError::Framing(format!(
                "ciphertext length {} is not a positive multiple of the cipher block size",
                ciphertext.len()
            )));
        }
        Aes256CbcDec::new(&self.session.key.into(), &self.session.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|e| TransportError::Crypto(e.to_string()))
    }

    /// Tear down the channel and hand back the raw stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}
