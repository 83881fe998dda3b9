//! S6a Handler
//!
//! Handles Authentication-Information-Answers from the HSS and the
//! Diameter-to-EMM cause translation.

use log::{debug, error, warn};
use thiserror::Error;

use crate::context::{AuthState, ContextError, MmeContext};
use crate::fd_path::{experimental_result, result_code, AiaMessage, S6aAnswer};
use crate::nas_path::{EmmCause, NasError, NasPath};

// ============================================================================
// Cause Translation
// ============================================================================

/// Which Diameter code space a result code belongs to.
///
/// Base Result-Code and 3GPP Experimental-Result-Code overlap
/// numerically (5004 means Invalid-AVP-Value in one and
/// Roaming-Not-Allowed in the other), so the space travels with the
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSpace {
    Base,
    Experimental,
}

/// Translate a Diameter S6a result code to the EMM cause sent to the UE.
///
/// Total over both spaces: any code without a specific mapping becomes
/// Network-Failure, never an error.
pub fn emm_cause_from_diameter(space: CodeSpace, code: u32) -> EmmCause {
    match space {
        CodeSpace::Base => match code {
            result_code::DIAMETER_SUCCESS => EmmCause::RequestAccepted,
            result_code::DIAMETER_UNABLE_TO_DELIVER => {
                EmmCause::NoSuitableCellsInTrackingArea
            }
            result_code::DIAMETER_REALM_NOT_SERVED => EmmCause::PlmnNotAllowed,
            result_code::DIAMETER_AUTHORIZATION_REJECTED => {
                EmmCause::EpsServicesNotAllowed
            }
            result_code::DIAMETER_UNABLE_TO_COMPLY => EmmCause::NetworkFailure,
            _ => {
                warn!("[MME] Unmapped Diameter Result-Code [{}]", code);
                EmmCause::NetworkFailure
            }
        },
        CodeSpace::Experimental => match code {
            experimental_result::DIAMETER_ERROR_USER_UNKNOWN => {
                EmmCause::EpsServicesAndNonEpsServicesNotAllowed
            }
            experimental_result::DIAMETER_ERROR_ROAMING_NOT_ALLOWED => {
                EmmCause::PlmnNotAllowed
            }
            experimental_result::DIAMETER_ERROR_UNKNOWN_EPS_SUBSCRIPTION => {
                EmmCause::NoSuitableCellsInTrackingArea
            }
            experimental_result::DIAMETER_ERROR_RAT_NOT_ALLOWED => {
                EmmCause::TrackingAreaNotAllowed
            }
            experimental_result::DIAMETER_ERROR_EQUIPMENT_UNKNOWN => {
                EmmCause::IllegalUe
            }
            experimental_result::DIAMETER_AUTHENTICATION_DATA_UNAVAILABLE => {
                EmmCause::NetworkFailure
            }
            _ => {
                warn!("[MME] Unmapped Experimental-Result-Code [{}]", code);
                EmmCause::NetworkFailure
            }
        },
    }
}

// ============================================================================
// AIA Handling
// ============================================================================

/// Why an answer was dropped without touching the subscriber state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No context holds this IMSI
    UnknownSubscriber,
    /// The subscriber is not waiting for a vector
    NotWaiting,
    /// The subscriber is waiting, but for a different request
    SessionMismatch,
}

/// What became of an Authentication-Information-Answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiaDisposition {
    /// Vector accepted, subscriber is AUTHENTICATED
    Authenticated,
    /// Error answer accepted, failure reported with this cause
    Rejected(EmmCause),
    /// Answer discarded without state change
    Dropped(DropReason),
}

/// S6a handler errors. Drops are a disposition, not an error; these
/// are invariant breaches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum S6aError {
    #[error("Success answer carried no vector [IMSI:{0}]")]
    NoVectors(String),
    #[error("Success answer carried {got} vectors, requested 1 [IMSI:{imsi}]")]
    TooManyVectors { imsi: String, got: usize },
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Nas(#[from] NasError),
}

/// Handle an Authentication-Information-Answer.
///
/// The answer is correlated by IMSI, then by procedure state, then by
/// the pinned S6a Session-Id. Anything that fails correlation is
/// dropped silently; subscriber state only ever changes for the answer
/// to the current in-flight request.
pub fn mme_s6a_handle_aia(
    store: &MmeContext,
    nas: &NasPath,
    aia: &AiaMessage,
) -> Result<AiaDisposition, S6aError> {
    let session_id = match store.ue_find_by_imsi(&aia.imsi_bcd) {
        Some(id) => id,
        None => {
            warn!(
                "[MME] AIA for unknown subscriber dropped [IMSI:{}]",
                aia.imsi_bcd
            );
            return Ok(AiaDisposition::Dropped(DropReason::UnknownSubscriber));
        }
    };

    let ue = store
        .ue_find_by_session_id(session_id)
        .ok_or(ContextError::NoSuchUe(session_id))?;

    if ue.auth_state != AuthState::VectorRequested {
        debug!(
            "[MME] AIA in state {} dropped [IMSI:{}]",
            ue.auth_state, aia.imsi_bcd
        );
        return Ok(AiaDisposition::Dropped(DropReason::NotWaiting));
    }
    if ue.air_session_id.as_deref() != Some(aia.session_id.as_str()) {
        debug!(
            "[MME] Stale AIA dropped [IMSI:{} Session-Id:{}]",
            aia.imsi_bcd, aia.session_id
        );
        return Ok(AiaDisposition::Dropped(DropReason::SessionMismatch));
    }

    match &aia.answer {
        S6aAnswer::Success(vectors) => {
            let vector = match vectors.as_slice() {
                [] => return Err(S6aError::NoVectors(aia.imsi_bcd.clone())),
                [v] => v.clone(),
                many => {
                    return Err(S6aError::TooManyVectors {
                        imsi: aia.imsi_bcd.clone(),
                        got: many.len(),
                    })
                }
            };

            store.ue_vector_append(session_id, vector.clone())?;
            store.ue_update(session_id, |ue| {
                ue.auth_state = AuthState::Authenticated;
                ue.air_session_id = None;
                ue.resync = None;
            })?;
            let count = store.ue_vector_count(session_id)?;
            nas.send_auth_success(session_id, count, vector)?;
            Ok(AiaDisposition::Authenticated)
        }
        S6aAnswer::BaseError(code) => {
            reject(store, nas, session_id, CodeSpace::Base, *code)
        }
        S6aAnswer::VendorError(code) => {
            reject(store, nas, session_id, CodeSpace::Experimental, *code)
        }
    }
}

fn reject(
    store: &MmeContext,
    nas: &NasPath,
    session_id: u64,
    space: CodeSpace,
    code: u32,
) -> Result<AiaDisposition, S6aError> {
    let emm_cause = emm_cause_from_diameter(space, code);
    error!(
        "[MME] Authentication-Information failed [code:{} cause:{}]",
        code, emm_cause
    );
    store.ue_update(session_id, |ue| {
        ue.auth_state = AuthState::Idle;
        ue.air_session_id = None;
        ue.resync = None;
    })?;
    nas.send_auth_failure(session_id, emm_cause)?;
    Ok(AiaDisposition::Rejected(emm_cause))
}

// ============================================================================
// Unit Tests
// ============================================================================
