//! Frame encoding

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared_protocol::{MAX_FRAME_SIZE, ProtocolError, ProtocolResult};

/// Length prefix: unsigned 64-bit big-endian
pub const FRAME_HEADER_SIZE: usize = 8;

/// Serialize `message` to JSON and prepend its length
pub fn encode_frame<T: Serialize>(message: &T) -> ProtocolResult<Bytes> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len() as u64,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.put_u64(payload.len() as u64);
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Read the payload length out of a frame header
pub fn decode_header(header: [u8; FRAME_HEADER_SIZE]) -> ProtocolResult<usize> {
    let size = u64::from_be_bytes(header);
    match usize::try_from(size) {
        Ok(len) if len <= MAX_FRAME_SIZE => Ok(len),
        _ => Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        }),
    }
}

pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_protocol::PeerMessage;

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(&PeerMessage::dh_public(8)).unwrap();
        let payload = br#"{"type":"dh_public","value":"8"}"#;

        assert_eq!(frame.len(), FRAME_HEADER_SIZE + payload.len());
        assert_eq!(&frame[..FRAME_HEADER_SIZE], &(payload.len() as u64).to_be_bytes());
        assert_eq!(&frame[FRAME_HEADER_SIZE..], payload);
    }

    #[test]
    fn test_header_limits() {
        assert_eq!(decode_header(0u64.to_be_bytes()).unwrap(), 0);
        assert_eq!(
            decode_header((MAX_FRAME_SIZE as u64).to_be_bytes()).unwrap(),
            MAX_FRAME_SIZE
        );
        assert!(matches!(
            decode_header((MAX_FRAME_SIZE as u64 + 1).to_be_bytes()),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
        assert!(matches!(
            decode_header(u64::MAX.to_be_bytes()),
            Err(ProtocolError::FrameTooLarge { size: u64::MAX, .. })
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let text = "x".repeat(MAX_FRAME_SIZE);
        assert!(matches!(
            encode_frame(&text),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_payload() {
        let message: PeerMessage =
            decode_payload(br#"{"type":"ciphertext","values":[1,2]}"#).unwrap();
        assert_eq!(message.into_ciphertext().unwrap(), vec![1, 2]);
        assert!(decode_payload::<PeerMessage>(b"not json").is_err());
    }
}
