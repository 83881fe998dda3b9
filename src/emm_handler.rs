//! EMM Message Handling
//!
//! NAS-originated authentication parameter requests: resolve the
//! subscriber context, derive the visited PLMN and issue the AIR.

use log::{debug, warn};
use thiserror::Error;

use crate::context::{AuthState, ContextError, MmeContext, ResyncInfo};
use crate::fd_path::{FdError, HssLink};
use crate::plmn::{validate_imsi, visited_plmn_from_imsi, PlmnError};

// ============================================================================
// Request Type
// ============================================================================

/// Authentication parameter request from the NAS layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthParamRequest {
    /// NAS-assigned UE session identifier
    pub session_id: u64,
    pub imsi_bcd: String,
    /// Set on abnormal resync retries only
    pub resync: Option<ResyncInfo>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmmError {
    #[error(transparent)]
    Plmn(#[from] PlmnError),
    #[error(transparent)]
    Fd(#[from] FdError),
    #[error(transparent)]
    Context(#[from] ContextError),
}

// ============================================================================
// Authentication Request
// ============================================================================

/// Handle an authentication parameter request.
///
/// Resolves (or creates) the subscriber context, derives the visited
/// PLMN from the IMSI, sends the AIR and moves the subscriber to
/// VECTOR_REQUESTED with the new Session-Id pinned. A request while a
/// previous one is in flight supersedes it: the old answer no longer
/// matches the pinned Session-Id and will be discarded on arrival.
pub fn mme_emm_handle_auth_request(
    store: &MmeContext,
    hss: &HssLink,
    req: &AuthParamRequest,
) -> Result<(), EmmError> {
    validate_imsi(&req.imsi_bcd)?;
    let visited_plmn = visited_plmn_from_imsi(&req.imsi_bcd)?;

    // Resolve the context: prefer the IMSI binding, rebind onto the new
    // NAS session when the subscriber returns under a different one.
    let session_id = match store.ue_find_by_imsi(&req.imsi_bcd) {
        Some(sid) if sid == req.session_id => sid,
        Some(old_sid) => {
            debug!(
                "[MME] Rebind [IMSI:{} session_id:{} -> {}]",
                req.imsi_bcd, old_sid, req.session_id
            );
            store.ue_rebind(old_sid, req.session_id, &req.imsi_bcd)?;
            req.session_id
        }
        None => {
            if store.ue_find_by_session_id(req.session_id).is_none() {
                store.ue_add(req.session_id)?;
            }
            store.ue_set_imsi(req.session_id, &req.imsi_bcd)?;
            req.session_id
        }
    };

    store.ue_touch(session_id)?;
    if req.resync.is_some() {
        warn!("[MME] Authentication resync [IMSI:{}]", req.imsi_bcd);
    }

    let air_session_id = hss.send_air(&req.imsi_bcd, &visited_plmn, req.resync.clone())?;

    store.ue_update(session_id, |ue| {
        ue.visited_plmn = visited_plmn.clone();
        ue.resync = req.resync.clone();
        ue.auth_state = AuthState::VectorRequested;
        ue.air_session_id = Some(air_session_id);
    })?;

    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
