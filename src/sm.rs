//! Per-Subscriber Dispatch
//!
//! One actor task per subscriber, fed by a bounded queue. Events for
//! one IMSI are processed strictly in arrival order; different
//! subscribers run in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::context::MmeContext;
use crate::emm_handler::mme_emm_handle_auth_request;
use crate::event::MmeEvent;
use crate::fd_path::HssLink;
use crate::nas_path::NasPath;
use crate::s6a_handler::mme_s6a_handle_aia;

/// Per-actor queue depth
const UE_QUEUE_DEPTH: usize = 64;

struct Actor {
    tx: mpsc::Sender<MmeEvent>,
    handle: JoinHandle<()>,
}

/// Routes events to per-subscriber actors, keyed by IMSI.
///
/// The first event for an IMSI spawns the actor; `SessionRelease` makes
/// the actor drain its queue and terminate itself. Dispatch awaits
/// queue space, and a replacement actor is spawned only after the old
/// task has fully terminated, so at most one actor ever runs per IMSI
/// and per-subscriber FIFO order is preserved end to end.
pub struct UeDispatcher {
    store: Arc<MmeContext>,
    hss: Arc<HssLink>,
    nas: NasPath,
    actors: HashMap<String, Actor>,
}

impl UeDispatcher {
    pub fn new(store: Arc<MmeContext>, hss: Arc<HssLink>, nas: NasPath) -> Self {
        Self {
            store,
            hss,
            nas,
            actors: HashMap::new(),
        }
    }

    /// Number of tracked subscriber actors (terminated actors are
    /// pruned on the next event for their IMSI)
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Route one event to its subscriber actor
    pub async fn dispatch(&mut self, event: MmeEvent) {
        let imsi = match &event {
            MmeEvent::EmmAuthRequest(req) => req.imsi_bcd.clone(),
            MmeEvent::S6aMessage(aia) => aia.imsi_bcd.clone(),
            MmeEvent::SessionRelease { session_id } => {
                // release carries no IMSI, resolve through the store
                match self.store.ue_find_by_session_id(*session_id) {
                    Some(ue) if !ue.imsi_bcd.is_empty() => ue.imsi_bcd,
                    _ => {
                        // no routable identity; subscriber state is only
                        // ever touched from inside its actor
                        warn!(
                            "[MME] Release for unknown session dropped [session_id:{}]",
                            session_id
                        );
                        return;
                    }
                }
            }
        };

        let mut event = event;
        loop {
            let tx = self.actor_for(&imsi);
            match tx.send(event).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(ev)) => {
                    // actor closed its queue on a release; let the old
                    // task finish before a replacement takes the IMSI
                    if let Some(actor) = self.actors.remove(&imsi) {
                        let _ = actor.handle.await;
                    }
                    event = ev;
                }
            }
        }
    }

    fn actor_for(&mut self, imsi: &str) -> mpsc::Sender<MmeEvent> {
        if let Some(actor) = self.actors.get(imsi) {
            return actor.tx.clone();
        }
        debug!("[MME] Subscriber actor spawned [IMSI:{}]", imsi);
        let (tx, rx) = mpsc::channel(UE_QUEUE_DEPTH);
        let handle = tokio::spawn(ue_actor(
            imsi.to_string(),
            rx,
            Arc::clone(&self.store),
            Arc::clone(&self.hss),
            self.nas.clone(),
        ));
        self.actors.insert(
            imsi.to_string(),
            Actor {
                tx: tx.clone(),
                handle,
            },
        );
        tx
    }
}

/// Serial event loop for one subscriber. Handler errors abandon the
/// event, never the actor. A release closes the queue to new sends and
/// the loop drains what was already enqueued before exiting.
async fn ue_actor(
    imsi: String,
    mut rx: mpsc::Receiver<MmeEvent>,
    store: Arc<MmeContext>,
    hss: Arc<HssLink>,
    nas: NasPath,
) {
    while let Some(event) = rx.recv().await {
        debug!("[MME] {} [IMSI:{}]", event.name(), imsi);
        match event {
            MmeEvent::EmmAuthRequest(req) => {
                if let Err(e) = mme_emm_handle_auth_request(&store, &hss, &req) {
                    error!("[MME] Authentication request failed [IMSI:{}]: {}", imsi, e);
                }
            }
            MmeEvent::S6aMessage(aia) => {
                if let Err(e) = mme_s6a_handle_aia(&store, &nas, &aia) {
                    error!("[MME] S6a answer handling failed [IMSI:{}]: {}", imsi, e);
                }
            }
            MmeEvent::SessionRelease { session_id } => {
                store.ue_remove(session_id);
                rx.close();
            }
        }
    }
    debug!("[MME] Subscriber actor terminated [IMSI:{}]", imsi);
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AuthState, AUTN_LEN, KASME_LEN, RAND_LEN};
    use crate::emm_handler::AuthParamRequest;
    use crate::fd_path::{AiaMessage, EUtranVector, S6aAnswer};
    use crate::nas_path::NasEvent;
    use bytes::Bytes;

    const IMSI: &str = "208011234567890";

    fn setup() -> (
        UeDispatcher,
        Arc<MmeContext>,
        mpsc::Receiver<crate::fd_path::AirMessage>,
        mpsc::UnboundedReceiver<NasEvent>,
    ) {
        let store = Arc::new(MmeContext::new());
        let (hss, air_rx) = HssLink::new("mme.localdomain");
        let (nas, nas_rx) = NasPath::new();
        let dispatcher = UeDispatcher::new(Arc::clone(&store), Arc::new(hss), nas);
        (dispatcher, store, air_rx, nas_rx)
    }

    fn vector() -> EUtranVector {
        EUtranVector {
            rand: [1; RAND_LEN],
            xres: Bytes::from_static(&[2; 8]),
            autn: [3; AUTN_LEN],
            kasme: [4; KASME_LEN],
        }
    }

    fn auth_request(session_id: u64) -> MmeEvent {
        MmeEvent::EmmAuthRequest(AuthParamRequest {
            session_id,
            imsi_bcd: IMSI.to_string(),
            resync: None,
        })
    }

    #[tokio::test]
    async fn test_request_then_answer_through_dispatcher() {
        let (mut dispatcher, store, mut air_rx, mut nas_rx) = setup();

        dispatcher.dispatch(auth_request(7)).await;
        let air = air_rx.recv().await.unwrap();

        dispatcher
            .dispatch(MmeEvent::S6aMessage(AiaMessage {
                session_id: air.session_id,
                imsi_bcd: IMSI.to_string(),
                answer: S6aAnswer::Success(vec![vector()]),
            }))
            .await;

        match nas_rx.recv().await.unwrap() {
            NasEvent::AuthSuccess { session_id, .. } => assert_eq!(session_id, 7),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            store.ue_find_by_session_id(7).unwrap().auth_state,
            AuthState::Authenticated
        );
        assert_eq!(dispatcher.actor_count(), 1);
    }

    #[tokio::test]
    async fn test_release_removes_context() {
        let (mut dispatcher, store, mut air_rx, _nas_rx) = setup();

        dispatcher.dispatch(auth_request(7)).await;
        air_rx.recv().await.unwrap();

        dispatcher
            .dispatch(MmeEvent::SessionRelease { session_id: 7 })
            .await;

        // the actor processes the queue in order, wait for teardown
        let mut tries = 0;
        while store.ue_find_by_session_id(7).is_some() && tries < 100 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            tries += 1;
        }
        assert_eq!(store.ue_find_by_session_id(7), None);
        assert_eq!(store.ue_find_by_imsi(IMSI), None);
    }

    #[tokio::test]
    async fn test_request_after_release_gets_fresh_context() {
        let (mut dispatcher, store, mut air_rx, _nas_rx) = setup();

        dispatcher.dispatch(auth_request(7)).await;
        air_rx.recv().await.unwrap();
        dispatcher
            .dispatch(MmeEvent::SessionRelease { session_id: 7 })
            .await;

        // a later request for the same IMSI must be serviced again
        dispatcher.dispatch(auth_request(9)).await;
        air_rx.recv().await.unwrap();

        let ue = store.ue_find_by_session_id(9).unwrap();
        assert_eq!(ue.auth_state, AuthState::VectorRequested);
        assert_eq!(store.ue_find_by_session_id(7), None);
        assert_eq!(store.ue_find_by_imsi(IMSI), Some(9));
    }

    /// Events for one IMSI must be applied in dispatch order even when
    /// a release sits between two requests: the release may never
    /// outlive the request dispatched after it.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_release_between_requests_keeps_later_context() {
        for _ in 0..200 {
            let (mut dispatcher, store, mut air_rx, _nas_rx) = setup();

            dispatcher.dispatch(auth_request(7)).await;
            dispatcher
                .dispatch(MmeEvent::SessionRelease { session_id: 7 })
                .await;
            dispatcher.dispatch(auth_request(7)).await;

            // both requests emitted an AIR, so both have been applied,
            // and the release was applied between them or not at all
            air_rx.recv().await.unwrap();
            air_rx.recv().await.unwrap();

            // the AIR is emitted before the state commit, wait for the
            // actor to settle the context
            let mut tries = 0;
            while !matches!(
                store.ue_find_by_session_id(7),
                Some(ue) if ue.auth_state == AuthState::VectorRequested
            ) && tries < 100
            {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                tries += 1;
            }

            let ue = store
                .ue_find_by_session_id(7)
                .expect("later request lost to a stale release");
            assert_eq!(ue.auth_state, AuthState::VectorRequested);
            assert_eq!(store.ue_find_by_imsi(IMSI), Some(7));
        }
    }

    #[tokio::test]
    async fn test_release_unknown_session_is_dropped() {
        let (mut dispatcher, _store, _air_rx, _nas_rx) = setup();
        dispatcher
            .dispatch(MmeEvent::SessionRelease { session_id: 99 })
            .await;
        assert_eq!(dispatcher.actor_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_after_release_hits_unknown_subscriber() {
        let (mut dispatcher, store, mut air_rx, mut nas_rx) = setup();

        dispatcher.dispatch(auth_request(7)).await;
        let air = air_rx.recv().await.unwrap();
        dispatcher
            .dispatch(MmeEvent::SessionRelease { session_id: 7 })
            .await;

        let mut tries = 0;
        while store.ue_find_by_imsi(IMSI).is_some() && tries < 100 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            tries += 1;
        }

        // late answer: a fresh actor spawns, the handler drops it
        dispatcher
            .dispatch(MmeEvent::S6aMessage(AiaMessage {
                session_id: air.session_id,
                imsi_bcd: IMSI.to_string(),
                answer: S6aAnswer::Success(vec![vector()]),
            }))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(nas_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_first_answer_discarded_after_second_request() {
        let (mut dispatcher, store, mut air_rx, mut nas_rx) = setup();

        dispatcher.dispatch(auth_request(7)).await;
        let first = air_rx.recv().await.unwrap();
        dispatcher.dispatch(auth_request(7)).await;
        let second = air_rx.recv().await.unwrap();
        assert_ne!(first.session_id, second.session_id);

        // the first request's answer arrives late
        dispatcher
            .dispatch(MmeEvent::S6aMessage(AiaMessage {
                session_id: first.session_id,
                imsi_bcd: IMSI.to_string(),
                answer: S6aAnswer::Success(vec![vector()]),
            }))
            .await;
        dispatcher
            .dispatch(MmeEvent::S6aMessage(AiaMessage {
                session_id: second.session_id,
                imsi_bcd: IMSI.to_string(),
                answer: S6aAnswer::Success(vec![vector()]),
            }))
            .await;

        // exactly one outcome, from the second answer
        match nas_rx.recv().await.unwrap() {
            NasEvent::AuthSuccess { vector_count, .. } => assert_eq!(vector_count, 1),
            other => panic!("unexpected event {other:?}"),
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(nas_rx.try_recv().is_err());
        assert_eq!(store.ue_vector_count(7).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_two_subscribers_get_separate_actors() {
        let (mut dispatcher, _store, mut air_rx, _nas_rx) = setup();

        dispatcher.dispatch(auth_request(1)).await;
        dispatcher
            .dispatch(MmeEvent::EmmAuthRequest(AuthParamRequest {
                session_id: 2,
                imsi_bcd: "208019876543210".to_string(),
                resync: None,
            }))
            .await;

        air_rx.recv().await.unwrap();
        air_rx.recv().await.unwrap();
        assert_eq!(dispatcher.actor_count(), 2);
    }
}
