//! Wire framing and the hand-rolled tagged binary layout shared by every
//! control-plane RPC. Grounded on `flux::shared`'s `Serialize`/`Deserialize`
//! pair, generalized from its fixed-capacity game-packet framing to the
//! versioned, auth-credential-terminated frame this protocol uses.

mod codec;
mod job;
mod primitives;
mod response;
mod sack_codec;

pub use codec::{try_decode, encode_frame, DecodedFrame, CURRENT_PROTOCOL_VERSION, MAX_MESSAGE_SIZE, MIN_PROTOCOL_VERSION};
pub use job::{CoreSpec, ExitCode, JobInfo, JobUpdate, MinMemory};
pub use primitives::{
    read_array, read_bytes, read_string, read_u16, read_u32, read_u64, read_f64, write_array,
    write_bytes, write_string, write_u16, write_u32, write_u64, write_f64, SizedRead, WireDecode,
    WireEncode, NULL_LEN,
};
pub use response::{ResponseRc, SLURM_NO_CHANGE_IN_DATA, SLURM_SUCCESS};
pub use sack_codec::{encode_sack_frame, try_decode_sack, SackFrame, MAX_SACK_MESSAGE_SIZE, SACK_CREATE, SACK_VERIFY};
