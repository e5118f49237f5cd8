//! Shortest-path and flood-fill overlays.
//!
//! The two pipelines share one implementation but nothing else: each has its
//! own inputs, exclusion list, request slot and result set. The only place
//! they meet is [`ConnectivityStore::all_highlighted_edges`].

use std::collections::BTreeSet;
use std::sync::Arc;

use foundation::HierarchyView;
use parking_lot::Mutex;
use runtime::{EngineTiming, EventBus};
use serde::Serialize;
use streaming::{
    ConnectivityKind, ConnectivityRequest, QueryService, RequestGate, Slot, spawn_settled,
};

use crate::hierarchy::HierarchyFilterStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Overlay {
    ShortestPath,
    FloodFill,
}

/// Which overlays currently have valid inputs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ActiveOverlay {
    #[default]
    None,
    ShortestPath,
    FloodFill,
    Both,
}

impl ActiveOverlay {
    fn from_flags(path: bool, flood: bool) -> Self {
        match (path, flood) {
            (false, false) => ActiveOverlay::None,
            (true, false) => ActiveOverlay::ShortestPath,
            (false, true) => ActiveOverlay::FloodFill,
            (true, true) => ActiveOverlay::Both,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectivityEvent {
    Changed(Overlay),
    ActiveOverlayChanged(ActiveOverlay),
}

/// Derived state of one overlay query.
///
/// `not_found` is only ever set by a successful, empty response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OverlayStatus {
    pub result_edges: BTreeSet<String>,
    pub not_found: bool,
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PathQuery {
    pub from_text: String,
    pub to_text: String,
    pub excluded_edges: Vec<String>,
    #[serde(flatten)]
    pub status: OverlayStatus,
}

impl PathQuery {
    /// Both ends given and different (case-sensitive, ignoring surrounding
    /// whitespace).
    pub fn is_active(&self) -> bool {
        let (from, to) = (self.from_text.trim(), self.to_text.trim());
        !from.is_empty() && !to.is_empty() && from != to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FloodFillQuery {
    pub node_text: String,
    pub excluded_edges: Vec<String>,
    #[serde(flatten)]
    pub status: OverlayStatus,
}

impl FloodFillQuery {
    pub fn is_active(&self) -> bool {
        !self.node_text.trim().is_empty()
    }
}

trait OverlayQuery: Default + Send + 'static {
    fn kind(&self) -> Option<ConnectivityKind>;
    fn excluded(&self) -> &[String];
    fn status_mut(&mut self) -> &mut OverlayStatus;
}

impl OverlayQuery for PathQuery {
    fn kind(&self) -> Option<ConnectivityKind> {
        self.is_active().then(|| ConnectivityKind::ShortestPath {
            from: self.from_text.trim().to_string(),
            to: self.to_text.trim().to_string(),
        })
    }

    fn excluded(&self) -> &[String] {
        &self.excluded_edges
    }

    fn status_mut(&mut self) -> &mut OverlayStatus {
        &mut self.status
    }
}

impl OverlayQuery for FloodFillQuery {
    fn kind(&self) -> Option<ConnectivityKind> {
        self.is_active().then(|| ConnectivityKind::FloodFill {
            node: self.node_text.trim().to_string(),
        })
    }

    fn excluded(&self) -> &[String] {
        &self.excluded_edges
    }

    fn status_mut(&mut self) -> &mut OverlayStatus {
        &mut self.status
    }
}

struct Pipeline<Q> {
    state: Arc<Mutex<Q>>,
    gate: RequestGate<ConnectivityRequest>,
}

impl<Q> Clone for Pipeline<Q> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<Q: OverlayQuery + Clone> Pipeline<Q> {
    fn new(
        overlay: Overlay,
        slot: Slot,
        timing: &EngineTiming,
        service: Arc<dyn QueryService>,
        events: EventBus<ConnectivityEvent>,
    ) -> Self {
        let state = Arc::new(Mutex::new(Q::default()));
        let gate = {
            let state = state.clone();
            RequestGate::new(slot, timing.query(), move |request: ConnectivityRequest, ticket| {
                state.lock().status_mut().loading = true;
                let fetch = service.connectivity(&request);
                let state = state.clone();
                spawn_settled(ticket, fetch, events.clone(), move |outcome| {
                    let mut st = state.lock();
                    let status = st.status_mut();
                    status.loading = false;
                    match outcome {
                        Ok(edges) => {
                            status.not_found = edges.is_empty();
                            status.result_edges = edges.into_iter().collect();
                        }
                        // Keep whatever was displayed before.
                        Err(_) => status.not_found = false,
                    }
                    Some(ConnectivityEvent::Changed(overlay))
                });
            })
        };
        Self { state, gate }
    }

    fn snapshot(&self) -> Q {
        self.state.lock().clone()
    }

    /// Applies an input edit and re-evaluates the pipeline.
    fn edit(&self, hierarchy: Option<HierarchyView>, f: impl FnOnce(&mut Q)) {
        f(&mut self.state.lock());
        self.evaluate(hierarchy);
    }

    /// Schedules a debounced request when the inputs are valid, cancelling
    /// the request for the previous inputs. Otherwise cancels anything pending
    /// and clears the derived state, keeping the typed text.
    fn evaluate(&self, hierarchy: Option<HierarchyView>) {
        let request = {
            let mut st = self.state.lock();
            match st.kind() {
                Some(kind) => {
                    let excluded = st.excluded().to_vec();
                    let status = st.status_mut();
                    status.loading = true;
                    status.not_found = false;
                    Some(ConnectivityRequest {
                        kind,
                        excluded,
                        hierarchy,
                    })
                }
                None => {
                    *st.status_mut() = OverlayStatus::default();
                    None
                }
            }
        };
        match request {
            Some(request) => self.gate.supersede(request),
            None => self.gate.cancel(),
        }
    }

    fn clear(&self) {
        self.gate.cancel();
        *self.state.lock() = Q::default();
    }
}

/// Owns the shortest-path and flood-fill overlay queries.
#[derive(Clone)]
pub struct ConnectivityStore {
    path: Pipeline<PathQuery>,
    flood: Pipeline<FloodFillQuery>,
    hierarchy: HierarchyFilterStore,
    events: EventBus<ConnectivityEvent>,
}

impl std::fmt::Debug for ConnectivityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityStore")
            .field("path", &self.path_query())
            .field("flood_fill", &self.flood_fill_query())
            .finish_non_exhaustive()
    }
}

impl ConnectivityStore {
    pub fn new(
        service: Arc<dyn QueryService>,
        timing: &EngineTiming,
        hierarchy: HierarchyFilterStore,
    ) -> Self {
        let events = EventBus::new();
        Self {
            path: Pipeline::new(
                Overlay::ShortestPath,
                Slot::ShortestPath,
                timing,
                service.clone(),
                events.clone(),
            ),
            flood: Pipeline::new(
                Overlay::FloodFill,
                Slot::FloodFill,
                timing,
                service,
                events.clone(),
            ),
            hierarchy,
            events,
        }
    }

    pub fn events(&self) -> &EventBus<ConnectivityEvent> {
        &self.events
    }

    pub fn path_query(&self) -> PathQuery {
        self.path.snapshot()
    }

    pub fn flood_fill_query(&self) -> FloodFillQuery {
        self.flood.snapshot()
    }

    /// Union of both overlays' result edges; the set handed to rendering.
    pub fn all_highlighted_edges(&self) -> BTreeSet<String> {
        let mut edges = self.path.state.lock().status.result_edges.clone();
        edges.extend(self.flood.state.lock().status.result_edges.iter().cloned());
        edges
    }

    pub fn active_overlay(&self) -> ActiveOverlay {
        let path = self.path.state.lock().is_active();
        let flood = self.flood.state.lock().is_active();
        ActiveOverlay::from_flags(path, flood)
    }

    fn notify(&self, overlay: Overlay, before: ActiveOverlay) {
        self.events.emit(&ConnectivityEvent::Changed(overlay));
        let after = self.active_overlay();
        if after != before {
            self.events
                .emit(&ConnectivityEvent::ActiveOverlayChanged(after));
        }
    }

    fn edit_path(&self, f: impl FnOnce(&mut PathQuery)) {
        let before = self.active_overlay();
        self.path.edit(self.hierarchy.current(), f);
        self.notify(Overlay::ShortestPath, before);
    }

    fn edit_flood(&self, f: impl FnOnce(&mut FloodFillQuery)) {
        let before = self.active_overlay();
        self.flood.edit(self.hierarchy.current(), f);
        self.notify(Overlay::FloodFill, before);
    }

    pub fn set_path_from_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.edit_path(|q| q.from_text = text);
    }

    pub fn set_path_to_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.edit_path(|q| q.to_text = text);
    }

    /// Replaces the path's exclusion list. Blank entries are kept for editing
    /// and left out of requests.
    pub fn set_excluded_edges(&self, edges: Vec<String>) {
        self.edit_path(|q| q.excluded_edges = edges);
    }

    pub fn set_flood_fill_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.edit_flood(|q| q.node_text = text);
    }

    pub fn set_flood_fill_excluded_edges(&self, edges: Vec<String>) {
        self.edit_flood(|q| q.excluded_edges = edges);
    }

    /// Dismisses the shortest-path overlay, including the typed text.
    pub fn clear_shortest_path(&self) {
        let before = self.active_overlay();
        self.path.clear();
        self.notify(Overlay::ShortestPath, before);
    }

    /// Dismisses the flood-fill overlay, including the typed text.
    pub fn clear_flood_fill(&self) {
        let before = self.active_overlay();
        self.flood.clear();
        self.notify(Overlay::FloodFill, before);
    }

    /// Re-runs both overlays against the current hierarchy filter.
    pub fn refresh(&self) {
        let hierarchy = self.hierarchy.current();
        self.path.evaluate(hierarchy.clone());
        self.flood.evaluate(hierarchy);
        self.events
            .emit(&ConnectivityEvent::Changed(Overlay::ShortestPath));
        self.events.emit(&ConnectivityEvent::Changed(Overlay::FloodFill));
    }
}
