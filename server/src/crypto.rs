//! The frontend's `crypto-server(DH)` stage (§6): a classical
//! Diffie-Hellman key exchange run directly over the raw connection
//! before any framed [`tunnel_protocol::Message`] traffic starts. Its
//! only output, as far as the routing core is concerned, is the
//! authenticated [`DeviceId`] — key material never leaves this module.

use crate::error::HandshakeError;
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::thread_rng;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tunnel_protocol::DeviceId;

/// Caps the size of a peer-supplied public value so a malicious or
/// confused peer can't make us allocate an unbounded buffer.
const MAX_PUBLIC_VALUE_LEN: u32 = 4096;

/// Fixed group parameters for the handshake, parsed once from config.
pub struct DhHandshake {
    g: BigUint,
    p: BigUint,
}

impl DhHandshake {
    pub fn new(g_decimal: &str, p_decimal: &str) -> Result<Self, HandshakeError> {
        let g = BigUint::parse_bytes(g_decimal.as_bytes(), 10)
            .ok_or(HandshakeError::MalformedPublicValue)?;
        let p = BigUint::parse_bytes(p_decimal.as_bytes(), 10)
            .ok_or(HandshakeError::MalformedPublicValue)?;
        Ok(Self { g, p })
    }

    /// Run the server side of the exchange: emit our public value, read
    /// the peer's, derive the shared secret, and turn it into a stable
    /// device identity. Connection is authenticated in the sense that
    /// the same device reconnecting with the same long-term key
    /// material derives the same id — full mutual authentication of a
    /// specific device identity is outside this repo's scope (see §1).
    pub async fn server_handshake<S>(&self, stream: &mut S) -> Result<DeviceId, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut rng = thread_rng();
        let private = rng.gen_biguint_below(&self.p);
        let public = self.g.modpow(&private, &self.p);

        write_public_value(stream, &public).await?;
        let peer_public = read_public_value(stream).await?;

        if peer_public <= BigUint::one() || peer_public >= &self.p - BigUint::one() {
            return Err(HandshakeError::UnsafePublicValue);
        }

        let shared = peer_public.modpow(&private, &self.p);
        Ok(derive_device_id(&shared))
    }
}

async fn write_public_value<S: AsyncWrite + Unpin>(
    stream: &mut S,
    value: &BigUint,
) -> Result<(), HandshakeError> {
    let bytes = value.to_bytes_be();
    stream.write_u32(bytes.len() as u32).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_public_value<S: AsyncRead + Unpin>(stream: &mut S) -> Result<BigUint, HandshakeError> {
    let len = stream.read_u32().await.map_err(|_| HandshakeError::ClosedEarly)?;
    if len == 0 || len > MAX_PUBLIC_VALUE_LEN {
        return Err(HandshakeError::MalformedPublicValue);
    }
    let mut buf = vec![0u8; len as usize];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|_| HandshakeError::ClosedEarly)?;
    let value = BigUint::from_bytes_be(&buf);
    if value.is_zero() {
        return Err(HandshakeError::MalformedPublicValue);
    }
    Ok(value)
}

fn derive_device_id(shared_secret: &BigUint) -> DeviceId {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret.to_bytes_be());
    let digest = hasher.finalize();
    DeviceId::new(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    // A 61-bit test prime — small enough for fast tests, large enough that
    // modpow exercises the real arithmetic path.
    const TEST_G: &str = "5";
    const TEST_P: &str = "2305843009213693951";

    #[tokio::test]
    async fn both_sides_derive_the_same_device_id() {
        let handshake = DhHandshake::new(TEST_G, TEST_P).unwrap();
        let (mut server_stream, mut client_stream) = duplex(4096);

        let server = tokio::spawn(async move { handshake.server_handshake(&mut server_stream).await });

        // Stand in for the device side of the exchange using the same
        // group parameters, driven manually rather than via DhHandshake
        // (which only exposes the server role).
        let client_handshake = DhHandshake::new(TEST_G, TEST_P).unwrap();
        let mut rng = thread_rng();
        let private = rng.gen_biguint_below(&client_handshake.p);
        let public = client_handshake.g.modpow(&private, &client_handshake.p);

        let peer_public = read_public_value(&mut client_stream).await.unwrap();
        write_public_value(&mut client_stream, &public).await.unwrap();

        let shared = peer_public.modpow(&private, &client_handshake.p);
        let client_device_id = derive_device_id(&shared);

        let server_device_id = server.await.unwrap().unwrap();
        assert_eq!(server_device_id, client_device_id);
    }

    #[tokio::test]
    async fn rejects_a_degenerate_public_value() {
        let handshake = DhHandshake::new(TEST_G, TEST_P).unwrap();
        let (mut server_stream, mut client_stream) = duplex(4096);

        let server = tokio::spawn(async move { handshake.server_handshake(&mut server_stream).await });

        let _ = read_public_value(&mut client_stream).await.unwrap();
        write_public_value(&mut client_stream, &BigUint::one()).await.unwrap();

        assert!(matches!(
            server.await.unwrap(),
            Err(HandshakeError::UnsafePublicValue)
        ));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let handshake = DhHandshake::new(TEST_G, TEST_P).unwrap();
        let (mut server_stream, mut client_stream) = duplex(4096);

        let server = tokio::spawn(async move { handshake.server_handshake(&mut server_stream).await });

        let _ = read_public_value(&mut client_stream).await.unwrap();
        client_stream.write_u32(MAX_PUBLIC_VALUE_LEN + 1).await.unwrap();

        assert!(matches!(
            server.await.unwrap(),
            Err(HandshakeError::MalformedPublicValue)
        ));
    }
}
