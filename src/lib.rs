//! EPC MME authentication core.
//!
//! Subscriber context store, S6a authentication procedure and the
//! per-subscriber event dispatch loop.

pub mod context;
pub mod emm_handler;
pub mod event;
pub mod fd_path;
pub mod nas_path;
pub mod plmn;
pub mod s6a_handler;
pub mod sm;


pub use context::{AuthState, ContextError, MmeContext, MmeUe, ResyncInfo};
pub use emm_handler::{mme_emm_handle_auth_request, AuthParamRequest, EmmError};
pub use event::MmeEvent;
pub use fd_path::{AiaMessage, AirMessage, EUtranVector, FdError, HssLink, S6aAnswer};
pub use nas_path::{EmmCause, NasEvent, NasPath};
pub use s6a_handler::{
    emm_cause_from_diameter, mme_s6a_handle_aia, AiaDisposition, CodeSpace, DropReason,
    S6aError,
};
pub use sm::UeDispatcher;
