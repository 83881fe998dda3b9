//! NAS Path
//!
//! Outcome notifications toward the NAS/EMM layer. The authentication
//! procedure reports exactly one outcome, success or failure, per
//! accepted answer.

use log::debug;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::fd_path::EUtranVector;

// ============================================================================
// EMM Cause
// ============================================================================

/// EMM cause values (TS 24.301 Annex A) used by the authentication
/// procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EmmCause {
    /// Not a reject cause; the translation of a success result code
    RequestAccepted = 0,
    IllegalUe = 3,
    EpsServicesNotAllowed = 7,
    PlmnNotAllowed = 11,
    TrackingAreaNotAllowed = 12,
    NoSuitableCellsInTrackingArea = 15,
    NetworkFailure = 17,
    EpsServicesAndNonEpsServicesNotAllowed = 8,
}

impl std::fmt::Display for EmmCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EmmCause::RequestAccepted => "Request accepted",
            EmmCause::IllegalUe => "Illegal UE",
            EmmCause::EpsServicesNotAllowed => "EPS services not allowed",
            EmmCause::PlmnNotAllowed => "PLMN not allowed",
            EmmCause::TrackingAreaNotAllowed => "Tracking area not allowed",
            EmmCause::NoSuitableCellsInTrackingArea => {
                "No suitable cells in tracking area"
            }
            EmmCause::NetworkFailure => "Network failure",
            EmmCause::EpsServicesAndNonEpsServicesNotAllowed => {
                "EPS services and non-EPS services not allowed"
            }
        };
        write!(f, "{} ({})", s, *self as u8)
    }
}

// ============================================================================
// NAS Events
// ============================================================================

/// Authentication outcome delivered to the NAS layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NasEvent {
    /// A vector was accepted; the NAS side builds the Authentication
    /// Request from it
    AuthSuccess {
        session_id: u64,
        /// Total vectors cached for the subscriber, including this one
        vector_count: usize,
        vector: EUtranVector,
    },
    /// Authentication failed; the NAS side rejects with this cause
    AuthFailure {
        session_id: u64,
        emm_cause: EmmCause,
    },
}

impl NasEvent {
    pub fn session_id(&self) -> u64 {
        match self {
            NasEvent::AuthSuccess { session_id, .. } => *session_id,
            NasEvent::AuthFailure { session_id, .. } => *session_id,
        }
    }
}

// ============================================================================
// NAS Path (outcome sink)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NasError {
    #[error("NAS path closed")]
    PathClosed,
}

/// Sink for authentication outcomes.
///
/// Unbounded on purpose: the NAS side must never exert backpressure on
/// answer processing, an outcome is produced for every accepted answer.
#[derive(Debug, Clone)]
pub struct NasPath {
    tx: mpsc::UnboundedSender<NasEvent>,
}

impl NasPath {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NasEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report an accepted vector
    pub fn send_auth_success(
        &self,
        session_id: u64,
        vector_count: usize,
        vector: EUtranVector,
    ) -> Result<(), NasError> {
        debug!(
            "[MME] Authentication success [session_id:{} vectors:{}]",
            session_id, vector_count
        );
        self.tx
            .send(NasEvent::AuthSuccess {
                session_id,
                vector_count,
                vector,
            })
            .map_err(|_| NasError::PathClosed)
    }

    /// Report an authentication failure with its EMM cause
    pub fn send_auth_failure(
        &self,
        session_id: u64,
        emm_cause: EmmCause,
    ) -> Result<(), NasError> {
        debug!(
            "[MME] Authentication failure [session_id:{} cause:{}]",
            session_id, emm_cause
        );
        self.tx
            .send(NasEvent::AuthFailure {
                session_id,
                emm_cause,
            })
            .map_err(|_| NasError::PathClosed)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
