use std::sync::Arc;

use parking_lot::Mutex;
use runtime::GateTiming;
use tokio::time::Instant;
use tracing::debug;

use crate::request::{RequestId, Slot, SlotStats, SlotTracker, Ticket};

type FireFn<P> = dyn Fn(P, Ticket) + Send + Sync;

struct GateState<P> {
    /// Bumped by every `schedule`, `fire_now` and `cancel`; a debounce timer
    /// only fires if its arming epoch is still the newest.
    epoch: u64,
    /// Epoch whose parameters were last handed to `fire`.
    fired_epoch: u64,
    /// Time of the most recent fire of any kind.
    last_fire: Option<Instant>,
    pending: Option<P>,
    fired: u64,
}

/// Rate-limits one slot's fetches.
///
/// `schedule` fires at once when the throttle window has elapsed and always
/// (re)arms a debounce timer that fires the latest parameters once calls stop
/// arriving. Every fire starts a new request in the slot, cancelling the
/// previous one. The `fire` callback receives the parameters together with the
/// ticket that must be used to commit the result.
pub struct RequestGate<P> {
    timing: GateTiming,
    tracker: SlotTracker,
    state: Arc<Mutex<GateState<P>>>,
    fire: Arc<FireFn<P>>,
}

impl<P> Clone for RequestGate<P> {
    fn clone(&self) -> Self {
        Self {
            timing: self.timing,
            tracker: self.tracker.clone(),
            state: self.state.clone(),
            fire: self.fire.clone(),
        }
    }
}

impl<P> std::fmt::Debug for RequestGate<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("slot", &self.tracker.slot())
            .field("timing", &self.timing)
            .field("fired", &self.state.lock().fired)
            .finish()
    }
}

impl<P> RequestGate<P>
where
    P: Clone + Send + 'static,
{
    pub fn new(
        slot: Slot,
        timing: GateTiming,
        fire: impl Fn(P, Ticket) + Send + Sync + 'static,
    ) -> Self {
        Self {
            timing,
            tracker: SlotTracker::new(slot),
            state: Arc::new(Mutex::new(GateState {
                epoch: 0,
                fired_epoch: 0,
                last_fire: None,
                pending: None,
                fired: 0,
            })),
            fire: Arc::new(fire),
        }
    }

    pub fn slot(&self) -> Slot {
        self.tracker.slot()
    }

    pub fn timing(&self) -> GateTiming {
        self.timing
    }

    /// Records an intent to fetch with `params`.
    ///
    /// Must be called from within a tokio runtime when a debounce window is
    /// configured.
    pub fn schedule(&self, params: P) {
        let (epoch, throttled) = {
            let mut st = self.state.lock();
            st.epoch += 1;
            let epoch = st.epoch;

            let now = Instant::now();
            let throttled = self.timing.throttle.is_some_and(|window| {
                st.last_fire
                    .is_none_or(|last| now.duration_since(last) >= window)
            });
            let immediate = throttled || self.timing.is_immediate();
            if immediate {
                st.fired_epoch = epoch;
                st.last_fire = Some(now);
            }
            if self.timing.debounce.is_some() && !immediate {
                st.pending = Some(params.clone());
            } else {
                st.pending = None;
            }
            (epoch, immediate)
        };

        if throttled {
            self.fire(params);
        }
        if let Some(window) = self.timing.debounce {
            let gate = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                gate.fire_trailing(epoch);
            });
        }
    }

    fn fire_trailing(&self, epoch: u64) {
        let params = {
            let mut st = self.state.lock();
            if st.epoch != epoch || st.fired_epoch == epoch {
                // A newer call re-armed the timer, or these parameters are
                // already in flight.
                return;
            }
            st.fired_epoch = epoch;
            st.last_fire = Some(Instant::now());
            st.pending.take()
        };
        if let Some(params) = params {
            self.fire(params);
        }
    }

    /// Like `schedule`, but first cancels the live request, so a result for
    /// parameters the caller has moved away from can no longer commit while
    /// the new ones wait out the debounce window.
    pub fn supersede(&self, params: P) {
        if self.tracker.cancel() {
            debug!(slot = %self.slot(), "live request superseded by new parameters");
        }
        self.schedule(params);
    }

    /// Fires immediately, bypassing throttle and debounce. Any armed debounce
    /// timer is disarmed.
    pub fn fire_now(&self, params: P) {
        {
            let mut st = self.state.lock();
            st.epoch += 1;
            st.fired_epoch = st.epoch;
            st.pending = None;
            st.last_fire = Some(Instant::now());
        }
        self.fire(params);
    }

    /// Disarms the debounce timer and cancels the live request, if any.
    pub fn cancel(&self) {
        {
            let mut st = self.state.lock();
            st.epoch += 1;
            st.pending = None;
        }
        if self.tracker.cancel() {
            debug!(slot = %self.slot(), "gate cancelled live request");
        }
    }

    fn fire(&self, params: P) {
        let ticket = self.tracker.begin();
        self.state.lock().fired += 1;
        debug!(slot = %self.slot(), request = ticket.id().0, "request fired");
        (self.fire)(params, ticket);
    }

    /// Number of requests fired so far.
    pub fn fired(&self) -> u64 {
        self.state.lock().fired
    }

    pub fn live(&self) -> Option<RequestId> {
        self.tracker.live()
    }

    pub fn stats(&self) -> SlotStats {
        self.tracker.stats()
    }
}
