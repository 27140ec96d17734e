use bytes::{Buf, BufMut};

use crate::constants::{AAD_LENGTH, FLAG_FINAL, HEADER_LENGTH, IV_LENGTH, MAX_PAYLOAD_LENGTH};
use crate::error::{FrameError, Result};

/// Decoded plaintext frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub final_frame: bool,
    pub payload_length: usize,
}

/// Encode a frame header.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────────────────────┐
/// │ Flags (1) │ Payload length (2 BE) │
/// └───────────┴──────────────────────┘
/// ```
/// Bit 0 of the flags marks the final frame; the other bits are zero.
pub fn encode_header(final_frame: bool, payload_length: usize) -> Result<[u8; HEADER_LENGTH]> {
    if payload_length > MAX_PAYLOAD_LENGTH {
        return Err(FrameError::PayloadTooLarge {
            size: payload_length,
            max: MAX_PAYLOAD_LENGTH,
        });
    }
    let mut header = [0u8; HEADER_LENGTH];
    let mut dst = &mut header[..];
    dst.put_u8(if final_frame { FLAG_FINAL } else { 0 });
    dst.put_u16(payload_length as u16);
    Ok(header)
}

/// Decode the header at the start of a decrypted frame.
///
/// Rejects reserved flag bits. The payload length is not checked against the
/// frame size here; the decrypter does that once it knows the frame length.
pub fn decode_header(plaintext: &[u8]) -> Result<FrameHeader> {
    if plaintext.len() < HEADER_LENGTH {
        return Err(FrameError::Format);
    }
    let mut src = &plaintext[..HEADER_LENGTH];
    let flags = src.get_u8();
    if flags & !FLAG_FINAL != 0 {
        return Err(FrameError::Format);
    }
    let payload_length = src.get_u16() as usize;
    Ok(FrameHeader {
        final_frame: flags & FLAG_FINAL != 0,
        payload_length,
    })
}

/// Nonce for a frame: frame number (8 BE) followed by four zero bytes.
pub fn encode_iv(frame_number: u64) -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    (&mut iv[..]).put_u64(frame_number);
    iv
}

/// Associated data for a frame: frame number (8 BE) and plaintext length (2 BE).
pub fn encode_aad(frame_number: u64, plaintext_length: usize) -> [u8; AAD_LENGTH] {
    let mut aad = [0u8; AAD_LENGTH];
    let mut dst = &mut aad[..];
    dst.put_u64(frame_number);
    dst.put_u16(plaintext_length as u16);
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        assert_eq!(encode_header(false, 5).unwrap(), [0x00, 0x00, 0x05]);
        assert_eq!(encode_header(true, 0x0123).unwrap(), [0x01, 0x01, 0x23]);
    }

    #[test]
    fn header_decodes_flags_and_length() {
        let header = decode_header(&[0x01, 0x03, 0xED, 0xFF]).unwrap();
        assert!(header.final_frame);
        assert_eq!(header.payload_length, MAX_PAYLOAD_LENGTH);

        let header = decode_header(&encode_header(false, 123).unwrap()).unwrap();
        assert_eq!(
            header,
            FrameHeader {
                final_frame: false,
                payload_length: 123
            }
        );
    }

    #[test]
    fn header_rejects_reserved_bits() {
        assert!(decode_header(&[0x02, 0x00, 0x00]).unwrap_err().is_format());
        assert!(decode_header(&[0x81, 0x00, 0x00]).unwrap_err().is_format());
    }

    #[test]
    fn header_rejects_short_input() {
        assert!(decode_header(&[0x00, 0x00]).unwrap_err().is_format());
    }

    #[test]
    fn header_rejects_oversized_payload() {
        assert!(matches!(
            encode_header(false, MAX_PAYLOAD_LENGTH + 1),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn iv_and_aad_layout() {
        assert_eq!(
            encode_iv(0x0102_0304_0506_0708),
            [1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]
        );
        assert_eq!(
            encode_aad(1, 1008),
            [0, 0, 0, 0, 0, 0, 0, 1, 0x03, 0xF0]
        );
    }

    #[test]
    fn iv_differs_per_frame() {
        assert_ne!(encode_iv(0), encode_iv(1));
        assert_ne!(encode_aad(0, 100), encode_aad(0, 101));
    }
}
