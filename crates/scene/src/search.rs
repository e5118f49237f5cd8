use std::sync::Arc;

use parking_lot::Mutex;
use runtime::{EngineTiming, EventBus};
use serde::Serialize;
use streaming::{QueryService, RequestGate, SearchQuery, Slot, spawn_settled};

use crate::hierarchy::HierarchyFilterStore;

/// Shorter inputs are not sent to the service.
pub const MIN_SEARCH_CHARS: usize = 2;

/// Candidates kept from one response.
pub const MAX_CANDIDATES: usize = 100;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SearchState {
    pub input: String,
    pub candidates: Vec<String>,
    pub loading: bool,
}

/// Free-text name completion for one input box.
#[derive(Clone)]
pub struct SearchCompletion {
    state: Arc<Mutex<SearchState>>,
    hierarchy: HierarchyFilterStore,
    gate: RequestGate<SearchQuery>,
    events: EventBus<SearchState>,
}

impl std::fmt::Debug for SearchCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SearchCompletion")
            .field(&*self.state.lock())
            .finish()
    }
}

impl SearchCompletion {
    pub fn new(
        service: Arc<dyn QueryService>,
        timing: &EngineTiming,
        hierarchy: HierarchyFilterStore,
    ) -> Self {
        let state = Arc::new(Mutex::new(SearchState::default()));
        let events = EventBus::new();
        let gate = {
            let state = state.clone();
            let events = events.clone();
            RequestGate::new(Slot::SearchComplete, timing.query(), move |query: SearchQuery, ticket| {
                state.lock().loading = true;
                let fetch = service.search_complete(&query);
                let state = state.clone();
                spawn_settled(ticket, fetch, events.clone(), move |outcome| {
                    let mut st = state.lock();
                    st.loading = false;
                    if let Ok(mut names) = outcome {
                        names.truncate(MAX_CANDIDATES);
                        st.candidates = names;
                    }
                    Some(st.clone())
                });
            })
        };
        Self {
            state,
            hierarchy,
            gate,
            events,
        }
    }

    /// Emits the full state after every change.
    pub fn events(&self) -> &EventBus<SearchState> {
        &self.events
    }

    pub fn state(&self) -> SearchState {
        self.state.lock().clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.state.lock().candidates.clone()
    }

    pub fn set_input(&self, input: impl Into<String>) {
        self.state.lock().input = input.into();
        self.refresh();
    }

    /// Re-evaluates the current input, e.g. after the hierarchy filter
    /// changed.
    pub fn refresh(&self) {
        let (query, snapshot) = {
            let mut st = self.state.lock();
            let query = if st.input.chars().count() < MIN_SEARCH_CHARS {
                st.candidates.clear();
                st.loading = false;
                None
            } else {
                st.loading = true;
                Some(SearchQuery {
                    input: st.input.clone(),
                    hierarchy: self.hierarchy.current(),
                })
            };
            (query, st.clone())
        };
        match query {
            Some(query) => self.gate.supersede(query),
            None => self.gate.cancel(),
        }
        self.events.emit(&snapshot);
    }
}

/// Completions for the connectivity panel's three name inputs. Each input
/// has its own request slot.
#[derive(Debug, Clone)]
pub struct ConnectivityCompletions {
    pub path_from: SearchCompletion,
    pub path_to: SearchCompletion,
    pub flood_fill: SearchCompletion,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConnectivityCompletionStates {
    pub path_from: SearchState,
    pub path_to: SearchState,
    pub flood_fill: SearchState,
}

impl ConnectivityCompletions {
    pub fn new(
        service: Arc<dyn QueryService>,
        timing: &EngineTiming,
        hierarchy: HierarchyFilterStore,
    ) -> Self {
        Self {
            path_from: SearchCompletion::new(service.clone(), timing, hierarchy.clone()),
            path_to: SearchCompletion::new(service.clone(), timing, hierarchy.clone()),
            flood_fill: SearchCompletion::new(service, timing, hierarchy),
        }
    }

    pub fn refresh(&self) {
        self.path_from.refresh();
        self.path_to.refresh();
        self.flood_fill.refresh();
    }

    pub fn states(&self) -> ConnectivityCompletionStates {
        ConnectivityCompletionStates {
            path_from: self.path_from.state(),
            path_to: self.path_to.state(),
            flood_fill: self.flood_fill.state(),
        }
    }
}
