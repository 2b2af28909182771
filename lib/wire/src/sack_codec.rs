//! The sack daemon's own framing (§4.5/§6): `[u16 version][u32 length]
//! [u32 rpc_id][body...]`, distinct from `codec`'s control-RPC frame —
//! no trailing credential, and an unrecognized `rpc_id` is the caller's
//! signal to close the connection rather than something this module
//! rejects itself.

use crate::primitives::{read_u16, read_u32, write_u16, write_u32};
use slurm_common::error::{Error, Result};
use std::io::Cursor;

pub const SACK_CREATE: u32 = 1;
pub const SACK_VERIFY: u32 = 2;

/// A declared body longer than this closes the connection instead of
/// buffering indefinitely.
pub const MAX_SACK_MESSAGE_SIZE: usize = 1024 * 1024;

const HEADER_LEN: usize = 2 + 4;

pub struct SackFrame {
    pub consumed: usize,
    pub version: u16,
    pub rpc_id: u32,
    pub body: Vec<u8>,
}

/// Attempts to decode one complete frame from the front of `buf`.
/// `Error::Wait` means "need more bytes"; a body too short to carry the
/// `rpc_id` prefix is also `Wait` per §4.5 ("half-read is legal").
pub fn try_decode_sack(buf: &[u8]) -> Result<SackFrame> {
    if buf.len() < HEADER_LEN {
        return Err(Error::Wait);
    }

    let mut cursor = Cursor::new(buf);
    let version = read_u16(&mut cursor)?;
    let length = read_u32(&mut cursor)? as usize;

    if length < 4 {
        return Err(Error::Wait);
    }
    if length > MAX_SACK_MESSAGE_SIZE {
        return Err(Error::ProtocolDecode(format!("sack frame too large: {length} bytes")));
    }

    let body_start = HEADER_LEN;
    let frame_end = body_start + length;
    if buf.len() < frame_end {
        return Err(Error::Wait);
    }

    let rpc_id = {
        let mut rpc_cursor = Cursor::new(&buf[body_start..frame_end]);
        read_u32(&mut rpc_cursor)?
    };
    let body = buf[body_start + 4..frame_end].to_vec();

    Ok(SackFrame { consumed: frame_end, version, rpc_id, body })
}

pub fn encode_sack_frame(version: u16, rpc_id: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 4 + body.len());
    write_u16(&mut out, version);
    write_u32(&mut out, (4 + body.len()) as u32);
    write_u32(&mut out, rpc_id);
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_full_frame() {
        let frame = encode_sack_frame(1, SACK_CREATE, b"payload");
        let decoded = try_decode_sack(&frame).unwrap();
        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.rpc_id, SACK_CREATE);
        assert_eq!(decoded.body, b"payload");
        assert_eq!(decoded.consumed, frame.len());
    }

    #[test]
    fn short_buffer_requests_more_bytes() {
        let frame = encode_sack_frame(1, SACK_VERIFY, b"token-bytes");
        let short = &frame[..frame.len() - 3];
        assert!(matches!(try_decode_sack(short), Err(Error::Wait)));
    }

    #[test]
    fn header_alone_requests_more_bytes() {
        let mut partial = Vec::new();
        write_u16(&mut partial, 1);
        write_u32(&mut partial, 4);
        assert!(matches!(try_decode_sack(&partial), Err(Error::Wait)));
    }

    #[test]
    fn oversized_declared_length_is_rejected() {
        let mut frame = Vec::new();
        write_u16(&mut frame, 1);
        write_u32(&mut frame, (MAX_SACK_MESSAGE_SIZE + 1) as u32);
        assert!(matches!(try_decode_sack(&frame), Err(Error::ProtocolDecode(_))));
    }
}
