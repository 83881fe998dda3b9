//! MME Context Management
//!
//! Subscriber (UE) contexts with the IMSI/session-id key indexes and the
//! per-subscriber authentication vector cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::fd_path::EUtranVector;
use crate::plmn::PlmnId;

// ============================================================================
// Constants
// ============================================================================

/// RAND length
pub const RAND_LEN: usize = 16;
/// AUTN length
pub const AUTN_LEN: usize = 16;
/// AUTS length
pub const AUTS_LEN: usize = 14;
/// KASME length (SHA-256 digest size)
pub const KASME_LEN: usize = 32;
/// MAX RES length
pub const MAX_RES_LEN: usize = 16;

// ============================================================================
// Types
// ============================================================================

/// Per-subscriber authentication procedure state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No authentication in progress, no valid vector
    #[default]
    Idle,
    /// Authentication-Information-Request in flight to the HSS
    VectorRequested,
    /// A vector has been received and is in use
    Authenticated,
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthState::Idle => write!(f, "IDLE"),
            AuthState::VectorRequested => write!(f, "VECTOR_REQUESTED"),
            AuthState::Authenticated => write!(f, "AUTHENTICATED"),
        }
    }
}

/// Re-Synchronization-Info carried in an abnormal resync retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncInfo {
    /// RAND of the challenged vector
    pub rand: [u8; RAND_LEN],
    /// AUTS token from the USIM
    pub auts: [u8; AUTS_LEN],
}

/// MME UE context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MmeUe {
    /// NAS-assigned session identifier (primary store key)
    pub session_id: u64,
    /// IMSI BCD string; empty until the identity is known
    pub imsi_bcd: String,
    /// Visited PLMN, replaced wholesale on every authentication request
    pub visited_plmn: PlmnId,

    /// Authentication vectors, append-only within an episode
    pub auth_vectors: Vec<EUtranVector>,
    /// Cursor into `auth_vectors`; always valid when state is AUTHENTICATED
    pub vector_in_use: Option<usize>,
    /// Authentication procedure state
    pub auth_state: AuthState,
    /// S6a Session-Id of the in-flight AIR, for stale-answer correlation
    pub air_session_id: Option<String>,
    /// Pending resync token, present only on resync retries
    pub resync: Option<ResyncInfo>,

    /// Last contact timestamp (unix millis)
    pub last_contact: u64,
}

// ============================================================================
// Errors
// ============================================================================

/// Context store errors
///
/// Lookup misses are `Option`, not errors; these variants are invariant
/// violations the caller must abort on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Duplicate key [{0}]")]
    DuplicateKey(String),
    #[error("No such UE [session_id={0}]")]
    NoSuchUe(u64),
    #[error("No vector in use [session_id={0}]")]
    NoVectorInUse(u64),
}

// ============================================================================
// MME Context (store)
// ============================================================================

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Main MME context: the subscriber store.
///
/// The UE pool is keyed by session id; `imsi_ue_hash` maps IMSI to
/// session id. Both indexes resolve to the same context once bound.
/// Lock order where both are held: `ue_pool` before `imsi_ue_hash`.
#[derive(Debug, Default)]
pub struct MmeContext {
    /// UE storage, keyed by session id
    ue_pool: RwLock<HashMap<u64, MmeUe>>,
    /// IMSI -> session id index
    imsi_ue_hash: RwLock<HashMap<String, u64>>,
    /// Initialized flag
    initialized: AtomicBool,
}

impl MmeContext {
    /// Create a new MME context
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the context
    pub fn init(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    /// Finalize the context
    pub fn final_(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }

    /// Check if context is initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

// ============================================================================
// UE Management
// ============================================================================

impl MmeContext {
    /// Add a new UE bound to `session_id`. State starts IDLE with an
    /// empty vector list. A session id already in use is a caller bug.
    pub fn ue_add(&self, session_id: u64) -> Result<(), ContextError> {
        let mut pool = self.ue_pool.write().unwrap();
        if pool.contains_key(&session_id) {
            return Err(ContextError::DuplicateKey(format!(
                "session_id={session_id}"
            )));
        }
        let ue = MmeUe {
            session_id,
            last_contact: now_millis(),
            ..Default::default()
        };
        pool.insert(session_id, ue);
        Ok(())
    }

    /// Remove a UE, unbinding both keys
    pub fn ue_remove(&self, session_id: u64) -> bool {
        let mut pool = self.ue_pool.write().unwrap();
        let mut imsi_hash = self.imsi_ue_hash.write().unwrap();
        match pool.remove(&session_id) {
            Some(ue) => {
                if !ue.imsi_bcd.is_empty() {
                    imsi_hash.remove(&ue.imsi_bcd);
                }
                true
            }
            None => false,
        }
    }

    /// Find UE by session id
    pub fn ue_find_by_session_id(&self, session_id: u64) -> Option<MmeUe> {
        self.ue_pool.read().unwrap().get(&session_id).cloned()
    }

    /// Find UE session id by IMSI
    pub fn ue_find_by_imsi(&self, imsi_bcd: &str) -> Option<u64> {
        self.imsi_ue_hash.read().unwrap().get(imsi_bcd).copied()
    }

    /// Number of UEs in the store
    pub fn ue_count(&self) -> usize {
        self.ue_pool.read().unwrap().len()
    }

    /// Bind (or rebind) the IMSI key onto an existing context.
    ///
    /// Holds both index write locks for the duration, so a concurrent
    /// lookup observes the context under its old keys or its new keys,
    /// never neither. Binding an IMSI already owned by another context
    /// is an invariant violation.
    pub fn ue_set_imsi(&self, session_id: u64, imsi_bcd: &str) -> Result<(), ContextError> {
        let mut pool = self.ue_pool.write().unwrap();
        let mut imsi_hash = self.imsi_ue_hash.write().unwrap();

        if let Some(&owner) = imsi_hash.get(imsi_bcd) {
            if owner != session_id {
                return Err(ContextError::DuplicateKey(format!(
                    "imsi={imsi_bcd} already bound to session_id={owner}"
                )));
            }
        }

        let ue = pool
            .get_mut(&session_id)
            .ok_or(ContextError::NoSuchUe(session_id))?;
        if !ue.imsi_bcd.is_empty() && ue.imsi_bcd != imsi_bcd {
            imsi_hash.remove(&ue.imsi_bcd);
        }
        ue.imsi_bcd = imsi_bcd.to_string();
        imsi_hash.insert(imsi_bcd.to_string(), session_id);
        Ok(())
    }

    /// Rebind a context onto a new session id (and IMSI), atomically
    /// with respect to concurrent lookups on either key.
    pub fn ue_rebind(
        &self,
        session_id: u64,
        new_session_id: u64,
        new_imsi: &str,
    ) -> Result<(), ContextError> {
        let mut pool = self.ue_pool.write().unwrap();
        let mut imsi_hash = self.imsi_ue_hash.write().unwrap();

        if new_session_id != session_id && pool.contains_key(&new_session_id) {
            return Err(ContextError::DuplicateKey(format!(
                "session_id={new_session_id}"
            )));
        }
        if let Some(&owner) = imsi_hash.get(new_imsi) {
            if owner != session_id {
                return Err(ContextError::DuplicateKey(format!(
                    "imsi={new_imsi} already bound to session_id={owner}"
                )));
            }
        }

        let mut ue = pool
            .remove(&session_id)
            .ok_or(ContextError::NoSuchUe(session_id))?;
        if !ue.imsi_bcd.is_empty() {
            imsi_hash.remove(&ue.imsi_bcd);
        }
        ue.session_id = new_session_id;
        ue.imsi_bcd = new_imsi.to_string();
        imsi_hash.insert(new_imsi.to_string(), new_session_id);
        pool.insert(new_session_id, ue);
        Ok(())
    }

    /// Update the last-contact timestamp
    pub fn ue_touch(&self, session_id: u64) -> Result<(), ContextError> {
        let mut pool = self.ue_pool.write().unwrap();
        let ue = pool
            .get_mut(&session_id)
            .ok_or(ContextError::NoSuchUe(session_id))?;
        ue.last_contact = now_millis();
        Ok(())
    }

    /// Apply a closure to a UE under the pool write lock
    pub fn ue_update<F, R>(&self, session_id: u64, f: F) -> Result<R, ContextError>
    where
        F: FnOnce(&mut MmeUe) -> R,
    {
        let mut pool = self.ue_pool.write().unwrap();
        let ue = pool
            .get_mut(&session_id)
            .ok_or(ContextError::NoSuchUe(session_id))?;
        Ok(f(ue))
    }
}

// ============================================================================
// Authentication Vector Cache
// ============================================================================

impl MmeContext {
    /// Append one vector and move the in-use cursor onto it.
    ///
    /// Vectors are single-use credentials; the cache never evicts and
    /// never reorders, only appends. Returns the new cursor index.
    pub fn ue_vector_append(
        &self,
        session_id: u64,
        vector: EUtranVector,
    ) -> Result<usize, ContextError> {
        self.ue_update(session_id, |ue| {
            ue.auth_vectors.push(vector);
            let idx = ue.auth_vectors.len() - 1;
            ue.vector_in_use = Some(idx);
            idx
        })
    }

    /// Number of vectors cached for a UE
    pub fn ue_vector_count(&self, session_id: u64) -> Result<usize, ContextError> {
        let pool = self.ue_pool.read().unwrap();
        let ue = pool
            .get(&session_id)
            .ok_or(ContextError::NoSuchUe(session_id))?;
        Ok(ue.auth_vectors.len())
    }

    /// The vector currently in use. Reading with an empty cache is a
    /// precondition violation.
    pub fn ue_vector_in_use(&self, session_id: u64) -> Result<EUtranVector, ContextError> {
        let pool = self.ue_pool.read().unwrap();
        let ue = pool
            .get(&session_id)
            .ok_or(ContextError::NoSuchUe(session_id))?;
        let idx = ue
            .vector_in_use
            .ok_or(ContextError::NoVectorInUse(session_id))?;
        ue.auth_vectors
            .get(idx)
            .cloned()
            .ok_or(ContextError::NoVectorInUse(session_id))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
