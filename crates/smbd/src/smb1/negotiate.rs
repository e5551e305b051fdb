//! SMB_COM_NEGOTIATE: dialect selection and challenge minting.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use smbd_msg::negotiate::{Capabilities, NegotiateRequest, NegotiateResponse, SecurityMode};

use crate::auth::fresh_challenge;
use crate::config::SigningPolicy;
use crate::smb1::{AndXNext, RequestContext};
use crate::{Error, Result};

/// The buffer size we advertise; matches the large-response pool.
const MAX_BUFFER_SIZE: u32 = 0x1_0000;
const MAX_RAW_SIZE: u32 = 0x1_0000;

pub fn handle_negotiate(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = NegotiateRequest::read(req)?;

    // An SMB2-capable client on an SMB2-enabled server is handed off to
    // the SMB2 layer; with the protocol ceiling at NT1 the SMB1 dialect
    // wins whenever offered.
    if request.is_smb2_supported() && ctx.server.global.server_max_protocol != "NT1" {
        return Err(Error::NotSupported("SMB2 dialect handoff"));
    }

    let Some(dialect_index) = request.nt_lm_index() else {
        log::info!("peer {} offered no supported dialect", ctx.conn.peer);
        let response = no_dialect_response(ctx.unicode);
        response.write_args(out, (ctx.unicode,))?;
        return Ok(AndXNext::Done);
    };

    let challenge = fresh_challenge();
    *ctx.conn.challenge.lock().unwrap() = Some(challenge);

    let signing = ctx.server.global.server_signing;
    let security_mode = SecurityMode::new()
        .with_user_security(true)
        .with_encrypt_passwords(true)
        .with_security_signatures_enabled(signing != SigningPolicy::Disable)
        .with_security_signatures_required(signing == SigningPolicy::Mandatory);

    let response = NegotiateResponse {
        dialect_index,
        security_mode,
        max_mpx_count: 1,
        max_number_vcs: 1,
        max_buffer_size: MAX_BUFFER_SIZE,
        max_raw_size: MAX_RAW_SIZE,
        session_key: 0,
        capabilities: Capabilities::new()
            .with_unicode(true)
            .with_large_files(true)
            .with_nt_smbs(true)
            .with_nt_status(true)
            .with_nt_find(true)
            .with_level_ii_oplocks(true)
            .with_large_readx(true)
            .with_large_writex(true)
            .with_infolevel_passthru(true)
            .with_unix(true),
        system_time: smbd_dtyp::binrw_util::prelude::FileTime::now(),
        server_time_zone: 0,
        encryption_key: challenge,
        domain_name: ctx.server.global.workgroup.as_str().into(),
    };
    response.write_args(out, (ctx.unicode,))?;
    Ok(AndXNext::Done)
}

fn no_dialect_response(_unicode: bool) -> NegotiateResponse {
    NegotiateResponse {
        dialect_index: 0xFFFF,
        security_mode: SecurityMode::new(),
        max_mpx_count: 1,
        max_number_vcs: 1,
        max_buffer_size: 0,
        max_raw_size: 0,
        session_key: 0,
        capabilities: Capabilities::new(),
        system_time: smbd_dtyp::binrw_util::prelude::FileTime::ZERO,
        server_time_zone: 0,
        encryption_key: [0; 8],
        domain_name: "".into(),
    }
}
