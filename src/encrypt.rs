//! Session encryption for stream transports: X25519 key agreement,
//! HKDF-SHA256 key derivation, and ChaCha20-Poly1305 sealing of frame
//! payloads. The handshake that negotiates all of this lives in
//! [`crate::handshake`].

use core::fmt;

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::errors::OscError;

/// Length of an X25519 public key and of the derived session key.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const HKDF_INFO: &[u8] = b"osckit stream session v1";

/// A long-term X25519 keypair identifying one endpoint. Generate one
/// per installation, or restore a persisted secret with
/// [`Keypair::from_bytes`].
#[derive(Clone)]
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(rand::rngs::OsRng))
    }

    /// Restores a keypair from a previously stored secret.
    pub fn from_bytes(secret: [u8; KEY_LEN]) -> Self {
        Self::from_secret(StaticSecret::from(secret))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Keypair { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        *self.public.as_bytes()
    }

    /// Derives the symmetric session cipher shared with the holder of
    /// `peer_public`. Both sides compute the same key: the HKDF salt is
    /// the two public keys concatenated in lexicographic order, so the
    /// derivation is independent of who initiated.
    pub fn session(&self, peer_public: &[u8]) -> Result<SessionCipher, OscError> {
        let peer: [u8; KEY_LEN] = peer_public
            .try_into()
            .map_err(|_| OscError::ProtocolError("peer public key has the wrong length"))?;
        let peer = PublicKey::from(peer);

        let shared = self.secret.diffie_hellman(&peer);
        if !shared.was_contributory() {
            return Err(OscError::ProtocolError(
                "peer public key is a low-order point",
            ));
        }

        let ours = self.public.as_bytes();
        let theirs = peer.as_bytes();
        let mut salt = [0u8; 2 * KEY_LEN];
        let (first, second) = if ours <= theirs {
            (ours, theirs)
        } else {
            (theirs, ours)
        };
        salt[..KEY_LEN].copy_from_slice(first);
        salt[KEY_LEN..].copy_from_slice(second);

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared.as_bytes());
        let mut key = [0u8; KEY_LEN];
        hkdf.expand(HKDF_INFO, &mut key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");

        Ok(SessionCipher {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

/// The per-connection frame cipher. Every sealed frame carries a fresh
/// random 96-bit nonce followed by the ciphertext, so frames are
/// independently decryptable and replay of a truncated stream cannot
/// forge anything.
#[derive(Clone)]
pub struct SessionCipher {
    cipher: ChaCha20Poly1305,
}

impl SessionCipher {
    /// Encrypts one frame payload.
    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .expect("ChaCha20-Poly1305 encryption of an in-memory buffer cannot fail");

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        sealed
    }

    /// Decrypts one frame payload. A frame that is too short or fails
    /// authentication is a protocol error; the connection it arrived on
    /// cannot be trusted afterwards.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, OscError> {
        if sealed.len() < NONCE_LEN {
            return Err(OscError::ProtocolError("encrypted frame too short"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| OscError::ProtocolError("frame failed authentication"))
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}
