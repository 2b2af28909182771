//! Simple numeric status reply, used whenever a handler has nothing
//! richer to say than "it worked" or a specific error code (see the
//! `Error::rc()` mapping in `slurm_common`).

use crate::primitives::{read_u32, write_u32, WireDecode, WireEncode};
use slurm_common::error::Result;
use std::io::Cursor;

pub const SLURM_SUCCESS: u32 = 0;
pub const SLURM_NO_CHANGE_IN_DATA: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseRc {
    pub rc: u32,
}

impl ResponseRc {
    pub fn ok() -> ResponseRc {
        ResponseRc { rc: SLURM_SUCCESS }
    }

    pub fn no_change() -> ResponseRc {
        ResponseRc { rc: SLURM_NO_CHANGE_IN_DATA }
    }

    pub fn is_success(&self) -> bool {
        self.rc == SLURM_SUCCESS
    }
}

impl WireEncode for ResponseRc {
    fn encode(&self, out: &mut Vec<u8>) {
        write_u32(out, self.rc);
    }
}

impl WireDecode for ResponseRc {
    fn decode(cursor: &mut Cursor<&[u8]>) -> Result<ResponseRc> {
        Ok(ResponseRc { rc: read_u32(cursor)? })
    }
}
