//! Control-plane RPC framing:
//! `[u16 version][u32 body_length][u32 rpc_type][body][credential bytes]`.
//!
//! `body_length` covers `rpc_type` and `body` but not `version`, matching
//! §6 of the design this is built against. The trailing credential is
//! opaque to this crate (it's `slurm_auth`'s concern); callers pass a
//! `credential_len` probe so the codec can tell "need more bytes" from
//! "frame complete" without depending on the auth crate.

use crate::primitives::{read_u32, write_u32};
use slurm_common::error::{Error, Result};
use std::io::Cursor;

/// Oldest protocol version this receiver still accepts, preserving
/// interoperation with the two preceding releases.
pub const MIN_PROTOCOL_VERSION: u16 = 38;
pub const CURRENT_PROTOCOL_VERSION: u16 = 40;

/// Messages whose declared body exceeds this close the connection
/// rather than buffering indefinitely.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 2 + 4;

pub struct DecodedFrame {
    /// Total bytes consumed from the input, including the credential.
    pub consumed: usize,
    pub version: u16,
    pub rpc_type: u32,
    pub body: Vec<u8>,
    pub credential: Vec<u8>,
}

/// Attempts to decode one complete frame from the front of `buf`.
///
/// `credential_len(bytes)` is called with everything after the body and
/// must return `Some(n)` once it can determine the credential's total
/// wire length from its prefix, or `None` if not enough bytes are
/// present yet to tell.
pub fn try_decode(buf: &[u8], credential_len: impl Fn(&[u8]) -> Option<usize>) -> Result<DecodedFrame> {
    if buf.len() < HEADER_LEN {
        return Err(Error::Wait);
    }

    let mut cursor = Cursor::new(buf);
    let version = read_u16_raw(&mut cursor)?;
    let body_length = read_u32(&mut cursor)? as usize;

    if !(MIN_PROTOCOL_VERSION..=CURRENT_PROTOCOL_VERSION).contains(&version) {
        return Err(Error::ProtocolDecode(format!("unsupported protocol version {version}")));
    }
    if body_length < 4 || body_length > MAX_MESSAGE_SIZE {
        return Err(Error::ProtocolDecode(format!("invalid body length {body_length}")));
    }

    let body_start = HEADER_LEN;
    let body_end = body_start + body_length;
    if buf.len() < body_end {
        return Err(Error::Wait);
    }

    let rpc_type = {
        let mut body_cursor = Cursor::new(&buf[body_start..body_end]);
        read_u32(&mut body_cursor)?
    };
    let body = buf[body_start + 4..body_end].to_vec();

    let tail = &buf[body_end..];
    let cred_len = match credential_len(tail) {
        Some(len) => len,
        None => return Err(Error::Wait),
    };
    if tail.len() < cred_len {
        return Err(Error::Wait);
    }

    let credential = tail[..cred_len].to_vec();
    Ok(DecodedFrame {
        consumed: body_end + cred_len,
        version,
        rpc_type,
        body,
        credential,
    })
}

fn read_u16_raw(cursor: &mut Cursor<&[u8]>) -> Result<u16> {
    crate::primitives::read_u16(cursor)
}

/// Assembles a complete frame ready to hand to the conmgr `Buffer`.
pub fn encode_frame(version: u16, rpc_type: u32, body: &[u8], credential: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 4 + body.len() + credential.len());
    crate::primitives::write_u16(&mut out, version);
    write_u32(&mut out, (4 + body.len()) as u32);
    write_u32(&mut out, rpc_type);
    out.extend_from_slice(body);
    out.extend_from_slice(credential);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_full_frame() {
        let body = b"job query payload".to_vec();
        let credential = b"\x00\x00\x00\x01cred-bytes".to_vec();
        let frame = encode_frame(CURRENT_PROTOCOL_VERSION, 7, &body, &credential);

        let decoded = try_decode(&frame, |tail| Some(tail.len())).unwrap();
        assert_eq!(decoded.version, CURRENT_PROTOCOL_VERSION);
        assert_eq!(decoded.rpc_type, 7);
        assert_eq!(decoded.body, body);
        assert_eq!(decoded.credential, credential);
        assert_eq!(decoded.consumed, frame.len());
    }

    #[test]
    fn short_buffer_requests_more_bytes() {
        let frame = encode_frame(CURRENT_PROTOCOL_VERSION, 7, b"body", b"cred");
        let short = &frame[..frame.len() - 2];
        let result = try_decode(short, |tail| Some(tail.len()));
        assert!(matches!(result, Err(Error::Wait)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let frame = encode_frame(MIN_PROTOCOL_VERSION - 1, 1, b"body", b"");
        let result = try_decode(&frame, |tail| Some(tail.len()));
        assert!(matches!(result, Err(Error::ProtocolDecode(_))));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let mut frame = Vec::new();
        crate::primitives::write_u16(&mut frame, CURRENT_PROTOCOL_VERSION);
        write_u32(&mut frame, (MAX_MESSAGE_SIZE + 1) as u32);
        let result = try_decode(&frame, |tail| Some(tail.len()));
        assert!(matches!(result, Err(Error::ProtocolDecode(_))));
    }
}
