//! Diameter S6a Path
//!
//! Message types exchanged with the HSS over the S6a application, and
//! the HSS link used to issue Authentication-Information-Requests.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::context::{ResyncInfo, AUTN_LEN, KASME_LEN, RAND_LEN};
use crate::plmn::PlmnId;

// ============================================================================
// Diameter Constants
// ============================================================================

/// Diameter Application ID for S6a
pub const DIAMETER_APPLICATION_S6A: u32 = 16777251;

/// 3GPP Vendor-Id
pub const DIAMETER_VENDOR_3GPP: u32 = 10415;

/// Diameter base Result-Code values (RFC 6733)
pub mod result_code {
    pub const DIAMETER_SUCCESS: u32 = 2001;
    pub const DIAMETER_UNABLE_TO_DELIVER: u32 = 3002;
    pub const DIAMETER_REALM_NOT_SERVED: u32 = 3003;
    pub const DIAMETER_TOO_BUSY: u32 = 3004;
    pub const DIAMETER_AUTHORIZATION_REJECTED: u32 = 5003;
    pub const DIAMETER_UNABLE_TO_COMPLY: u32 = 5012;
}

/// 3GPP Experimental-Result-Code values for S6a (TS 29.272)
pub mod experimental_result {
    pub const DIAMETER_ERROR_USER_UNKNOWN: u32 = 5001;
    pub const DIAMETER_ERROR_ROAMING_NOT_ALLOWED: u32 = 5004;
    pub const DIAMETER_ERROR_UNKNOWN_EPS_SUBSCRIPTION: u32 = 5420;
    pub const DIAMETER_ERROR_RAT_NOT_ALLOWED: u32 = 5421;
    pub const DIAMETER_ERROR_EQUIPMENT_UNKNOWN: u32 = 5422;
    pub const DIAMETER_AUTHENTICATION_DATA_UNAVAILABLE: u32 = 4181;
}

/// Default number of requested E-UTRAN vectors per AIR
pub const NB_OF_VECTORS: u8 = 1;

/// HSS link queue depth
const HSS_QUEUE_DEPTH: usize = 64;

// ============================================================================
// S6a Message Types
// ============================================================================

/// One E-UTRAN authentication vector from the HSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EUtranVector {
    pub rand: [u8; RAND_LEN],
    /// Variable length, 4..16 octets
    pub xres: Bytes,
    pub autn: [u8; AUTN_LEN],
    pub kasme: [u8; KASME_LEN],
}

/// Authentication-Information-Request toward the HSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirMessage {
    /// S6a Session-Id AVP
    pub session_id: String,
    pub imsi_bcd: String,
    /// Visited-PLMN-Id, already BCD-encoded
    pub visited_plmn_id: [u8; 3],
    pub nb_of_vectors: u8,
    /// Re-Synchronization-Info, present on resync retries only
    pub resync: Option<ResyncInfo>,
}

/// Outcome of an Authentication-Information-Answer.
///
/// The two error spaces are distinct: the same numeric code means
/// different things in each, so they are separate variants rather
/// than a shared `u32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S6aAnswer {
    /// Result-Code 2001 with Authentication-Info
    Success(Vec<EUtranVector>),
    /// Base-protocol Result-Code other than 2001
    BaseError(u32),
    /// 3GPP Experimental-Result-Code
    VendorError(u32),
}

/// Authentication-Information-Answer from the HSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiaMessage {
    /// Echoed S6a Session-Id AVP
    pub session_id: String,
    pub imsi_bcd: String,
    pub answer: S6aAnswer,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FdError {
    #[error("Cannot send AIR without IMSI")]
    EmptyImsi,
    #[error("HSS link closed")]
    LinkClosed,
    #[error("HSS link full")]
    LinkFull,
}

// ============================================================================
// HSS Link
// ============================================================================

/// Outbound S6a link toward the HSS.
///
/// Requests are fire-and-forget; answers come back as events through
/// the dispatcher. Session-Ids are "{origin};{high};{low}" with a
/// monotonically increasing counter, never reused within a run.
#[derive(Debug)]
pub struct HssLink {
    tx: mpsc::Sender<AirMessage>,
    origin_host: String,
    session_counter: AtomicU64,
}

impl HssLink {
    /// Create a link and the receiving half the HSS side consumes
    pub fn new(origin_host: &str) -> (Self, mpsc::Receiver<AirMessage>) {
        let (tx, rx) = mpsc::channel(HSS_QUEUE_DEPTH);
        (
            Self {
                tx,
                origin_host: origin_host.to_string(),
                session_counter: AtomicU64::new(1),
            },
            rx,
        )
    }

    /// Allocate the next S6a Session-Id
    pub fn next_session_id(&self) -> String {
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst);
        format!("{};{};{}", self.origin_host, (n >> 32) as u32, n as u32)
    }

    /// Send an Authentication-Information-Request.
    ///
    /// Returns the allocated Session-Id so the caller can pin it on
    /// the UE context for answer correlation.
    pub fn send_air(
        &self,
        imsi_bcd: &str,
        visited_plmn: &PlmnId,
        resync: Option<ResyncInfo>,
    ) -> Result<String, FdError> {
        if imsi_bcd.is_empty() {
            return Err(FdError::EmptyImsi);
        }

        let session_id = self.next_session_id();
        let air = AirMessage {
            session_id: session_id.clone(),
            imsi_bcd: imsi_bcd.to_string(),
            visited_plmn_id: visited_plmn.encode(),
            nb_of_vectors: NB_OF_VECTORS,
            resync,
        };

        debug!(
            "[MME] Authentication-Information-Request [IMSI:{} Session-Id:{}]",
            imsi_bcd, session_id
        );

        match self.tx.try_send(air) {
            Ok(()) => Ok(session_id),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("[MME] HSS link full, AIR dropped [IMSI:{}]", imsi_bcd);
                Err(FdError::LinkFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FdError::LinkClosed),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
