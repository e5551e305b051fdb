//! SMB_COM_SESSION_SETUP_ANDX and SMB_COM_LOGOFF_ANDX.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use smbd_msg::session_setup::{
    LogoffRequest, LogoffResponse, SessionSetupAction, SessionSetupRequest, SessionSetupResponse,
};

use crate::config::{MapToGuest, SigningPolicy, UserConfig};
use crate::session::{Session, SessionState};
use crate::smb1::{AndXNext, RequestContext, patch_header_uid, teardown_session};
use crate::{Error, Result};

pub fn handle_session_setup(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = SessionSetupRequest::read_args(req, (ctx.unicode,))?;
    let account = request.account_name.to_string();

    let challenge = ctx
        .conn
        .challenge
        .lock()
        .unwrap()
        .ok_or(Error::InvalidParameter("SESSION_SETUP before NEGOTIATE"))?;

    let (user, is_guest, outcome) = authenticate(ctx, &account, &challenge, &request)?;

    let mut signing_key = outcome.signing_key;
    if ctx.server.global.server_signing == SigningPolicy::Disable || is_guest {
        signing_key = Vec::new();
    }

    let session = ctx
        .server
        .sessions
        .register(|uid| Session::new(uid, user, is_guest, signing_key.clone()))?;
    session.set_state(SessionState::Valid);
    ctx.conn.attach_session(&session);
    log::info!(
        "session {} established for {} (guest: {is_guest})",
        session.uid,
        account
    );

    patch_header_uid(out, session.uid);
    ctx.session = Some(session);

    let response = SessionSetupResponse {
        andx: smbd_msg::AndX::none(),
        action: SessionSetupAction::new().with_guest(is_guest),
        native_os: "Unix".into(),
        native_lan_man: ctx.server.global.server_string.as_str().into(),
        primary_domain: ctx.server.global.workgroup.as_str().into(),
    };
    response.write_args(out, (ctx.unicode,))?;
    Ok(AndXNext::from_andx(&request.andx))
}

/// Runs the account lookup and the external NTLM verification, applying
/// the map-to-guest policy on failures.
fn authenticate(
    ctx: &RequestContext<'_>,
    account: &str,
    challenge: &[u8; 8],
    request: &SessionSetupRequest,
) -> Result<(UserConfig, bool, crate::auth::AuthOutcome)> {
    let guest_fallback = || -> Result<(UserConfig, bool, crate::auth::AuthOutcome)> {
        let guest = ctx
            .server
            .guest_user()
            .ok_or_else(|| Error::LogonFailure(account.to_string()))?;
        Ok((
            guest,
            true,
            crate::auth::AuthOutcome {
                signing_key: Vec::new(),
            },
        ))
    };

    if account.is_empty() {
        // Anonymous setup: the classic null session becomes guest.
        return guest_fallback();
    }

    let Some(user) = ctx.server.find_user(account).cloned() else {
        return match ctx.server.global.map_to_guest {
            MapToGuest::BadUser => guest_fallback(),
            MapToGuest::Never => Err(Error::LogonFailure(account.to_string())),
        };
    };

    match ctx.server.auth.verify_ntlm(
        &user,
        challenge,
        &request.case_insensitive_password,
        &request.case_sensitive_password,
    ) {
        Some(outcome) => {
            let is_guest = user.is_guest;
            Ok((user, is_guest, outcome))
        }
        None => Err(Error::LogonFailure(account.to_string())),
    }
}

pub async fn handle_logoff(
    ctx: &mut RequestContext<'_>,
    req: &mut Cursor<&[u8]>,
    out: &mut Cursor<Vec<u8>>,
) -> Result<AndXNext> {
    let request = LogoffRequest::read(req)?;
    let session = ctx.require_session()?;

    // The LOGOFF contract: stop admitting work, wait until this request is
    // the only one in flight, then tear everything down.
    session.set_state(SessionState::NeedReconnect);
    session.wait_single_inflight().await;

    teardown_session(ctx.server, &session).await;
    ctx.server.sessions.remove(session.uid);
    ctx.conn.detach_session(session.uid);
    ctx.session = None;
    log::info!("session {} logged off", session.uid);

    LogoffResponse {
        andx: smbd_msg::AndX::none(),
    }
    .write(out)?;
    Ok(AndXNext::from_andx(&request.andx))
}
