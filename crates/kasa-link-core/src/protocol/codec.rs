//! Running-key XOR codec used on every datagram and direct frame.
//!
//! Each obfuscated byte is the plaintext byte XORed with the previous
//! obfuscated byte, starting from a fixed seed. This only keeps plaintext
//! JSON off the wire; it is not encryption.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Initial key for both directions.
pub const SEED: u8 = 0xAB;

/// Largest direct frame we accept from a device.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Obfuscate a plaintext payload.
pub fn obfuscate(plain: &[u8]) -> Vec<u8> {
    let mut key = SEED;
    plain
        .iter()
        .map(|&b| {
            key ^= b;
            key
        })
        .collect()
}

/// Reverse [`obfuscate`]. Works on arbitrary bytes; no UTF-8 assumption.
pub fn deobfuscate(data: &[u8]) -> Vec<u8> {
    let mut key = SEED;
    data.iter()
        .map(|&b| {
            let plain = key ^ b;
            key = b;
            plain
        })
        .collect()
}

/// Build a direct (TCP) frame: 4-byte big-endian length, then the obfuscated payload.
pub fn encode_frame(plain: &[u8]) -> Bytes {
    let body = obfuscate(plain);
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    buf.freeze()
}

/// Read the length header of a direct frame.
pub fn frame_len(header: [u8; 4]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // {"system":{"get_sysinfo":{}}} as produced by the vendor app
        let plain = br#"{"system":{"get_sysinfo":{}}}"#;
        let wire = obfuscate(plain);
        assert_eq!(&wire[..4], &[0xd0, 0xf2, 0x81, 0xf8]);
        assert_eq!(deobfuscate(&wire), plain.to_vec());
    }

    #[test]
    fn test_empty_input() {
        assert!(obfuscate(&[]).is_empty());
        assert!(deobfuscate(&[]).is_empty());
    }

    #[test]
    fn test_non_utf8_round_trip() {
        let data: Vec<u8> = (0..=255u8).rev().chain([0xff, 0x00, 0xfe]).collect();
        assert_eq!(deobfuscate(&obfuscate(&data)), data);
    }

    #[test]
    fn test_deobfuscate_is_left_inverse_too() {
        let noise = [0x13u8, 0x37, 0x00, 0xab, 0xab, 0x80];
        assert_eq!(obfuscate(&deobfuscate(&noise)), noise.to_vec());
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(b"{}");
        assert_eq!(&frame[..4], &[0, 0, 0, 2]);
        assert_eq!(deobfuscate(&frame[4..]), b"{}".to_vec());
        assert_eq!(frame_len([0, 0, 0, 2]).unwrap(), 2);
    }

    #[test]
    fn test_frame_len_limit() {
        let err = frame_len([0x7f, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge(_)));
    }
}
