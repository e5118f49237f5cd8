use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use runtime::EventBus;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::FetchError;

/// A named logical request channel.
///
/// Within one slot only the most recently started request is authoritative.
/// Different slots are fully independent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    BaseData,
    ShortestPath,
    FloodFill,
    ColourValues,
    Attributes,
    Centroid,
    SearchComplete,
    UrlSync,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Slot::BaseData => "base-data",
            Slot::ShortestPath => "shortest-path",
            Slot::FloodFill => "flood-fill",
            Slot::ColourValues => "colour-values",
            Slot::Attributes => "attributes",
            Slot::Centroid => "centroid",
            Slot::SearchComplete => "search-complete",
            Slot::UrlSync => "url-sync",
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a request within its slot. Strictly increasing per slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct SlotStats {
    pub started: u64,
    pub superseded: u64,
    pub committed: u64,
}

#[derive(Debug)]
struct LiveRequest {
    id: RequestId,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct SlotState {
    next_id: u64,
    live: Option<LiveRequest>,
    stats: SlotStats,
}

/// Tracks the single live request of one slot.
///
/// Starting a request cancels the previous one's token before the new ticket
/// is handed out. Cloning yields another handle to the same slot.
#[derive(Debug, Clone)]
pub struct SlotTracker {
    slot: Slot,
    state: Arc<Mutex<SlotState>>,
}

impl SlotTracker {
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            state: Arc::new(Mutex::new(SlotState::default())),
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Starts a new request, superseding the live one (if any).
    pub fn begin(&self) -> Ticket {
        let mut st = self.state.lock();
        if let Some(prev) = st.live.take() {
            prev.token.cancel();
            st.stats.superseded += 1;
            debug!(slot = %self.slot, request = prev.id.0, "request superseded");
        }
        st.next_id += 1;
        let id = RequestId(st.next_id);
        let token = CancellationToken::new();
        st.live = Some(LiveRequest {
            id,
            token: token.clone(),
        });
        st.stats.started += 1;

        Ticket {
            slot: self.slot,
            id,
            token,
            state: self.state.clone(),
        }
    }

    /// Cancels the live request without starting another.
    ///
    /// Returns `true` if a request was live.
    pub fn cancel(&self) -> bool {
        let mut st = self.state.lock();
        let Some(prev) = st.live.take() else {
            return false;
        };
        prev.token.cancel();
        st.stats.superseded += 1;
        debug!(slot = %self.slot, request = prev.id.0, "request cancelled");
        true
    }

    pub fn live(&self) -> Option<RequestId> {
        self.state.lock().live.as_ref().map(|l| l.id)
    }

    pub fn stats(&self) -> SlotStats {
        self.state.lock().stats
    }
}

/// The right to commit one request's result into application state.
///
/// A ticket stays valid until a newer request starts in the same slot (or the
/// slot is cancelled). Validity is checked again at commit time, under the
/// slot lock, so a result that resolves after being superseded can never be
/// written, regardless of the order in which responses arrive.
#[derive(Debug)]
pub struct Ticket {
    slot: Slot,
    id: RequestId,
    token: CancellationToken,
    state: Arc<Mutex<SlotState>>,
}

impl Ticket {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled() && self.is_current(&self.state.lock())
    }

    fn is_current(&self, st: &SlotState) -> bool {
        st.live.as_ref().is_some_and(|l| l.id == self.id)
    }

    /// Drives `fetch` until it resolves or this ticket is cancelled.
    ///
    /// Cancellation drops the in-flight future (aborting the transport) and
    /// yields `FetchError::Cancelled`.
    pub async fn run<T, F>(&self, fetch: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FetchError::Cancelled),
            out = fetch => out,
        }
    }

    /// Runs `apply` if and only if this ticket is still the live request of
    /// its slot, then retires it. `apply` runs under the slot lock, so it must
    /// not touch the slot again (no `begin`, no `cancel`, no emitting events
    /// whose handlers might).
    pub fn commit<R>(self, apply: impl FnOnce() -> R) -> Option<R> {
        let mut st = self.state.lock();
        if self.token.is_cancelled() || !self.is_current(&st) {
            return None;
        }
        st.live = None;
        st.stats.committed += 1;
        let out = apply();
        drop(st);
        Some(out)
    }
}

/// Spawns `fetch` for `ticket` and hands its outcome to `settle` exactly once,
/// and only if the ticket is still live when the fetch resolves.
///
/// `settle` writes the outcome into store state under the slot lock and
/// returns the event to announce, if any. The event is emitted on `events`
/// after the slot lock is released, so handlers may start or cancel requests
/// in the same slot.
///
/// Cancelled and superseded outcomes never reach `settle`. Genuine failures of
/// the live request do, after being logged as a warning.
pub fn spawn_settled<T, E, F, S>(ticket: Ticket, fetch: F, events: EventBus<E>, settle: S)
where
    T: Send + 'static,
    E: Send + 'static,
    F: Future<Output = Result<T, FetchError>> + Send + 'static,
    S: FnOnce(Result<T, FetchError>) -> Option<E> + Send + 'static,
{
    tokio::spawn(async move {
        let slot = ticket.slot();
        let id = ticket.id();
        let outcome = ticket.run(fetch).await;
        if outcome.as_ref().is_err_and(FetchError::is_cancelled) {
            debug!(%slot, request = id.0, "cancelled request dropped");
            return;
        }

        let failure = outcome.as_ref().err().map(ToString::to_string);
        match ticket.commit(move || settle(outcome)) {
            Some(event) => {
                if let Some(error) = failure {
                    warn!(%slot, request = id.0, %error, "request failed");
                }
                if let Some(event) = event {
                    events.emit(&event);
                }
            }
            None => debug!(%slot, request = id.0, "superseded result dropped"),
        }
    });
}
