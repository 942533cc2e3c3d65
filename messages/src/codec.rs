//! Message codec: bincode behind a 4-byte big-endian length prefix.

use crate::{MessageError, TempoMessage};

/// Maximum message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Encode a message for transmission.
pub fn encode(message: &TempoMessage) -> Result<Vec<u8>, MessageError> {
    let body = bincode::serialize(message)?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(MessageError::TooLarge {
            size: body.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode one frame from the front of `data`.
///
/// Returns the message and the number of bytes consumed so callers can
/// advance a stream buffer.
pub fn decode(data: &[u8]) -> Result<(TempoMessage, usize), MessageError> {
    if data.len() < LENGTH_PREFIX {
        return Err(MessageError::Incomplete {
            needed: LENGTH_PREFIX,
            available: data.len(),
        });
    }
    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&data[..LENGTH_PREFIX]);
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(MessageError::TooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let end = LENGTH_PREFIX + len;
    if data.len() < end {
        return Err(MessageError::Incomplete {
            needed: end,
            available: data.len(),
        });
    }
    let message = bincode::deserialize(&data[LENGTH_PREFIX..end])?;
    Ok((message, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiscoveryResponseMessage, SampleRequestMessage};
    use tempo_types::{AtomId, ConflictTag, Hash, LogicalClockCursor};

    fn response() -> TempoMessage {
        DiscoveryResponseMessage {
            cursor: LogicalClockCursor::with_next(0, LogicalClockCursor::new(2)),
            commitments: vec![Hash::new([1u8; 32]), Hash::new([2u8; 32])],
            aids: vec![AtomId::new([3u8; 32])],
        }
        .into()
    }

    #[test]
    fn frame_carries_length_prefix() {
        let frame = encode(&response()).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len + 4, frame.len());
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let mut stream = encode(&response()).unwrap();
        let second: TempoMessage = SampleRequestMessage {
            tag: ConflictTag::new([4u8; 16]),
            aids: vec![AtomId::new([5u8; 32])],
        }
        .into();
        stream.extend(encode(&second).unwrap());

        let (first, used) = decode(&stream).unwrap();
        assert_eq!(first, response());
        let (next, _) = decode(&stream[used..]).unwrap();
        assert_eq!(next, second);
    }

    #[test]
    fn decoded_cursor_keeps_next() {
        let frame = encode(&response()).unwrap();
        let (TempoMessage::DiscoveryResponse(msg), _) = decode(&frame).unwrap() else {
            panic!("expected a discovery response");
        };
        assert_eq!(msg.cursor.next().map(|c| c.position()), Some(2));
    }

    #[test]
    fn truncated_frame_is_incomplete() {
        let frame = encode(&response()).unwrap();
        assert!(matches!(
            decode(&frame[..frame.len() - 1]),
            Err(MessageError::Incomplete { .. })
        ));
        assert!(matches!(decode(&frame[..2]), Err(MessageError::Incomplete { .. })));
    }

    #[test]
    fn oversized_prefix_rejected() {
        let mut frame = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&[0u8; 8]);
        assert!(matches!(decode(&frame), Err(MessageError::TooLarge { .. })));
    }

    #[test]
    fn garbage_body_is_malformed() {
        let mut frame = 3u32.to_be_bytes().to_vec();
        frame.extend_from_slice(&[0xff, 0xff, 0xff]);
        assert!(matches!(decode(&frame), Err(MessageError::Malformed(_))));
    }
}
