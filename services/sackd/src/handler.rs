//! Connects the sack framing (`slurm_wire::sack_codec`) to `slurm_auth`:
//! `SACK_CREATE` mints a credential using the peer's own `SO_PEERCRED`
//! identity, `SACK_VERIFY` checks one and reports a status code.

use crate::os_identity::extra_identity_for;
use slog::{debug, warn, Logger};
use slurm_auth::{AuthProvider, AuthRegistry};
use slurm_common::error::{Error, Result};
use slurm_conmgr::{Conmgr, ConnectionHandler, ConnectionId};
use slurm_wire::{
    encode_sack_frame, read_bytes, read_u32, try_decode_sack, write_bytes, write_u32, SACK_CREATE,
    SACK_VERIFY,
};
use std::io::Cursor;
use std::sync::{Arc, OnceLock};

const SACK_WIRE_VERSION: u16 = 1;

pub struct SackHandler {
    conmgr: OnceLock<Arc<Conmgr>>,
    mint_provider: Arc<dyn AuthProvider>,
    registry: AuthRegistry,
    logger: Logger,
}

impl SackHandler {
    pub fn new(mint_provider: Arc<dyn AuthProvider>, registry: AuthRegistry, logger: Logger) -> SackHandler {
        SackHandler { conmgr: OnceLock::new(), mint_provider, registry, logger }
    }

    /// Must be called once, after the owning `Conmgr` is constructed, so
    /// replies can be written back through it.
    pub fn attach(&self, conmgr: Arc<Conmgr>) {
        let _ = self.conmgr.set(conmgr);
    }

    fn handle_create(&self, id: ConnectionId, body: &[u8]) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(body);
        let recipient_uid = read_u32(&mut cursor)?;
        let payload = read_bytes(&mut cursor)?;

        let peer = self.conmgr_ref()?.peer_cred(id).ok_or_else(|| {
            Error::AuthInvalid("sack create with no peer credentials (not a unix connection?)".into())
        })?;

        let extra = extra_identity_for(peer.uid, peer.gid);
        let cred = self.mint_provider.mint(&payload, (peer.uid, peer.gid), recipient_uid, extra.as_deref())?;
        let token = slurm_auth::encode_credential(self.mint_provider.as_ref(), &cred);

        let mut reply = Vec::new();
        write_bytes(&mut reply, &token);
        Ok(reply)
    }

    fn handle_verify(&self, id: ConnectionId, body: &[u8]) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(body);
        let token = read_bytes(&mut cursor)?;

        let peer = self.conmgr_ref()?.peer_cred(id).ok_or_else(|| {
            Error::AuthInvalid("sack verify with no peer credentials (not a unix connection?)".into())
        })?;

        let rc = match self.registry.verify(&token, peer.uid) {
            Ok(_) => 0,
            Err(err) => {
                debug!(self.logger, "sack verify rejected"; "error" => %err);
                err.rc()
            }
        };

        let mut reply = Vec::new();
        write_u32(&mut reply, rc);
        Ok(reply)
    }

    fn conmgr_ref(&self) -> Result<&Arc<Conmgr>> {
        self.conmgr
            .get()
            .ok_or_else(|| Error::Fatal("SackHandler used before attach()".into()))
    }
}

impl ConnectionHandler for SackHandler {
    fn on_data(&self, id: ConnectionId, data: &[u8]) -> Result<usize> {
        let frame = try_decode_sack(data)?;

        let reply_body = match frame.rpc_id {
            SACK_CREATE => self.handle_create(id, &frame.body),
            SACK_VERIFY => self.handle_verify(id, &frame.body),
            other => {
                return Err(Error::ProtocolDecode(format!("unknown sack rpc_id {other}")));
            }
        };

        match reply_body {
            Ok(body) => {
                let frame_out = encode_sack_frame(SACK_WIRE_VERSION, frame.rpc_id, &body);
                let _ = self.conmgr_ref()?.write_to(id, &frame_out);
            }
            Err(err) => {
                warn!(self.logger, "sack rpc failed"; "rpc_id" => frame.rpc_id, "error" => %err);
                if frame.rpc_id == SACK_VERIFY {
                    let mut reply = Vec::new();
                    write_u32(&mut reply, err.rc());
                    let frame_out = encode_sack_frame(SACK_WIRE_VERSION, frame.rpc_id, &reply);
                    let _ = self.conmgr_ref()?.write_to(id, &frame_out);
                }
            }
        }

        Ok(frame.consumed)
    }
}
