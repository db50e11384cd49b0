//! Length-prefixed binary framing for [`Message`], plus the bincode
//! helpers used to (de)serialize the `Tunnel`/`TunnelWhoAmI` payloads
//! that travel as a message's `content`.
//!
//! Wire format per frame: `[1B code][1B agent][2B service, BE][4B
//! content length, BE][content]`.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Code, Message};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected rather than buffered, so a
/// corrupt or hostile length prefix cannot exhaust memory.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 8;

/// Read one framed [`Message`] from `reader`. Returns an `Io` error with
/// `UnexpectedEof` kind if the peer closed mid-frame.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<Message> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let code = Code::from_u8(header[0]).ok_or(ProtocolError::UnknownCode(header[0]))?;
    let agent = header[1];
    let service = u16::from_be_bytes([header[2], header[3]]);
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len, MAX_FRAME_LEN));
    }

    let mut content = vec![0u8; len];
    reader.read_exact(&mut content).await?;

    Ok(Message {
        code,
        agent,
        service,
        content,
    })
}

/// Write one framed [`Message`] to `writer`.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> ProtocolResult<()> {
    if message.content.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(
            message.content.len(),
            MAX_FRAME_LEN,
        ));
    }

    let mut header = [0u8; HEADER_LEN];
    header[0] = message.code as u8;
    header[1] = message.agent;
    header[2..4].copy_from_slice(&message.service.to_be_bytes());
    header[4..8].copy_from_slice(&(message.content.len() as u32).to_be_bytes());

    writer.write_all(&header).await?;
    writer.write_all(&message.content).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize a `Tunnel`/`TunnelWhoAmI` payload into the bytes that go in
/// a message's `content` field.
pub fn encode_envelope<T: serde::Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Inverse of [`encode_envelope`].
pub fn decode_envelope<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    bincode::deserialize(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::{NamedService, TunnelEnvelope, TunnelWhoAmI};
    use crate::DeviceId;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_message() {
        let msg = Message {
            code: Code::Request,
            agent: 7,
            service: 42,
            content: b"hello world".to_vec(),
        };

        let mut buf = Vec::new();
        write_message(&mut buf, &msg).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn round_trips_back_to_back_messages() {
        let a = Message::request(1, b"a".to_vec());
        let b = Message::response(1, b"bb".to_vec());

        let mut buf = Vec::new();
        write_message(&mut buf, &a).await.unwrap();
        write_message(&mut buf, &b).await.unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_message(&mut cursor).await.unwrap(), a);
        assert_eq!(read_message(&mut cursor).await.unwrap(), b);
    }

    #[tokio::test]
    async fn rejects_unknown_code() {
        let mut buf = vec![0xFFu8, 0, 0, 0, 0, 0, 0, 0];
        let mut cursor = Cursor::new(&mut buf);
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCode(0xFF)));
    }

    #[tokio::test]
    async fn rejects_oversized_frame() {
        let mut header = vec![Code::Request as u8, 0, 0, 0];
        header.extend_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        let mut cursor = Cursor::new(header);
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_, _)));
    }

    #[test]
    fn envelope_round_trips_through_bincode() {
        let envelope = TunnelEnvelope::new(
            DeviceId::new("device-1"),
            Message::request(9, b"payload".to_vec()),
        );
        let bytes = encode_envelope(&envelope).unwrap();
        let decoded: TunnelEnvelope = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.device_id, envelope.device_id);
        assert_eq!(decoded.inner, envelope.inner);
    }

    #[test]
    fn who_am_i_round_trips() {
        let who = TunnelWhoAmI {
            services: vec![NamedService::new(0, "RESTful"), NamedService::new(1, "GPS")],
        };
        let bytes = encode_envelope(&who).unwrap();
        let decoded: TunnelWhoAmI = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.services, who.services);
    }
}
