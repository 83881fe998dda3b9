//! MME Events
//!
//! Everything the dispatcher routes to a subscriber actor.

use crate::emm_handler::AuthParamRequest;
use crate::fd_path::AiaMessage;

/// Event delivered to a per-subscriber actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmeEvent {
    /// NAS authentication parameter request
    EmmAuthRequest(AuthParamRequest),
    /// Authentication-Information-Answer from the HSS
    S6aMessage(AiaMessage),
    /// NAS session released; tears the subscriber down
    SessionRelease { session_id: u64 },
}

impl MmeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MmeEvent::EmmAuthRequest(_) => "MME_EVENT_EMM_AUTH_REQUEST",
            MmeEvent::S6aMessage(_) => "MME_EVENT_S6A_MESSAGE",
            MmeEvent::SessionRelease { .. } => "MME_EVENT_SESSION_RELEASE",
        }
    }
}
