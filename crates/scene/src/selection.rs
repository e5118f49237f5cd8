use std::sync::Arc;

use foundation::DEFAULT_ATTRIBUTE_BOUNDS;
use foundation::math::Vec2;
use parking_lot::Mutex;
use runtime::{EventBus, GateTiming};
use serde::Serialize;
use streaming::{AttributeQuery, AttributeRecord, QueryService, RequestGate, Slot, spawn_settled};

use crate::picking::compute_box_selection;
use crate::viewport::ViewportController;

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    ViewedChanged(Option<String>),
    AttributesLoaded(String),
    SelectionChanged(usize),
    BoxModeChanged(bool),
}

/// Render-facing snapshot of the selection.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SelectionSnapshot {
    /// The single asset whose attributes are shown.
    pub viewed: Option<String>,
    pub attributes: Option<AttributeRecord>,
    pub attributes_loading: bool,
    pub attributes_error: Option<String>,
    /// Multi-select list, in insertion order, without duplicates.
    pub selected: Vec<String>,
    pub box_selection_mode: bool,
}

/// Owns single and multi feature selection and the attribute lookup of the
/// viewed feature.
#[derive(Clone)]
pub struct SelectionStore {
    state: Arc<Mutex<SelectionSnapshot>>,
    viewport: ViewportController,
    gate: RequestGate<AttributeQuery>,
    events: EventBus<SelectionEvent>,
}

impl std::fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStore")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl SelectionStore {
    pub fn new(service: Arc<dyn QueryService>, viewport: ViewportController) -> Self {
        let state = Arc::new(Mutex::new(SelectionSnapshot::default()));
        let events = EventBus::new();

        let gate = {
            let state = state.clone();
            let events = events.clone();
            RequestGate::new(
                Slot::Attributes,
                GateTiming::immediate(),
                move |query: AttributeQuery, ticket| {
                    let fetch = service.attributes(&query);
                    let state = state.clone();
                    spawn_settled(ticket, fetch, events.clone(), move |outcome| {
                        let mut st = state.lock();
                        st.attributes_loading = false;
                        match outcome {
                            Ok(record) => {
                                st.attributes = Some(record);
                                st.attributes_error = None;
                                Some(SelectionEvent::AttributesLoaded(query.name))
                            }
                            Err(e) => {
                                st.attributes_error = Some(e.to_string());
                                None
                            }
                        }
                    });
                },
            )
        };

        Self {
            state,
            viewport,
            gate,
            events,
        }
    }

    pub fn events(&self) -> &EventBus<SelectionEvent> {
        &self.events
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        self.state.lock().clone()
    }

    pub fn viewed(&self) -> Option<String> {
        self.state.lock().viewed.clone()
    }

    pub fn attributes(&self) -> Option<AttributeRecord> {
        self.state.lock().attributes.clone()
    }

    pub fn selected(&self) -> Vec<String> {
        self.state.lock().selected.clone()
    }

    /// Makes `name` the viewed asset and fetches its attributes inside the
    /// current map bounds (or the default bounds before the map has any).
    pub fn select_single(&self, name: impl Into<String>) {
        let name = name.into();
        {
            let mut st = self.state.lock();
            st.viewed = Some(name.clone());
            st.attributes = None;
            st.attributes_error = None;
            st.attributes_loading = true;
        }
        self.events
            .emit(&SelectionEvent::ViewedChanged(Some(name.clone())));

        let bounds = self.viewport.bounds().unwrap_or(DEFAULT_ATTRIBUTE_BOUNDS);
        self.gate.schedule(AttributeQuery { name, bounds });
    }

    /// Map click on a feature.
    pub fn click_feature(&self, name: impl Into<String>) {
        self.select_single(name);
    }

    /// Adds `name` to the multi-select list. Returns `false` if it was
    /// already there.
    pub fn add_to_selection(&self, name: impl Into<String>) -> bool {
        self.add_many([name.into()]) == 1
    }

    /// Adds every name not yet selected. Returns how many were added.
    pub fn add_many(&self, names: impl IntoIterator<Item = String>) -> usize {
        let (added, len) = {
            let mut st = self.state.lock();
            let mut added = 0;
            for name in names {
                if !st.selected.contains(&name) {
                    st.selected.push(name);
                    added += 1;
                }
            }
            (added, st.selected.len())
        };
        if added > 0 {
            self.events.emit(&SelectionEvent::SelectionChanged(len));
        }
        added
    }

    /// Replaces the multi-select list (duplicates dropped, order kept).
    pub fn replace_selection(&self, names: impl IntoIterator<Item = String>) {
        self.state.lock().selected.clear();
        let len = self.add_many(names);
        if len == 0 {
            self.events.emit(&SelectionEvent::SelectionChanged(0));
        }
    }

    /// Forgets the viewed asset and its attributes; the multi-select list is
    /// kept.
    pub fn clear_selection(&self) {
        self.gate.cancel();
        {
            let mut st = self.state.lock();
            st.viewed = None;
            st.attributes = None;
            st.attributes_error = None;
            st.attributes_loading = false;
        }
        self.events.emit(&SelectionEvent::ViewedChanged(None));
    }

    pub fn set_box_selection_mode(&self, enabled: bool) {
        let changed = {
            let mut st = self.state.lock();
            std::mem::replace(&mut st.box_selection_mode, enabled) != enabled
        };
        if changed {
            self.events.emit(&SelectionEvent::BoxModeChanged(enabled));
        }
    }

    /// Finishes a box drag from `a` to `b` (screen pixels): selects every
    /// loaded base feature inside the box. Returns the matched names.
    pub fn complete_box_selection(&self, a: Vec2, b: Vec2) -> Vec<String> {
        let (viewport, size) = (self.viewport.viewport(), self.viewport.size());
        let matched = self
            .viewport
            .with_features(|features| compute_box_selection(viewport, size, a, b, features));
        self.add_many(matched.iter().cloned());
        matched
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use foundation::Viewport;
    use foundation::math::{Vec2, WebMercatorViewport};
    use pretty_assertions::assert_eq;
    use runtime::EngineTiming;
    use serde_json::json;
    use streaming::Endpoint;

    use super::SelectionStore;
    use crate::colouring::ColourCategoryStore;
    use crate::hierarchy::HierarchyFilterStore;
    use crate::testing::{FakeService, param};
    use crate::viewport::ViewportController;

    fn setup() -> (Arc<FakeService>, ViewportController, SelectionStore) {
        let fake = Arc::new(FakeService::new());
        let hierarchy = HierarchyFilterStore::new(None);
        let colouring = ColourCategoryStore::new(fake.clone(), hierarchy.clone(), "");
        let viewport = ViewportController::new(
            fake.clone(),
            &EngineTiming::default(),
            hierarchy,
            colouring,
            Viewport::default(),
            None,
        );
        let selection = SelectionStore::new(fake.clone(), viewport.clone());
        (fake, viewport, selection)
    }

    #[tokio::test(start_paused = true)]
    async fn attributes_fall_back_to_default_bounds() {
        let (fake, _, selection) = setup();
        fake.respond(Endpoint::Attributes, json!({"name": "T1", "voltage": 11000}));
        selection.select_single("T1");
        assert!(selection.snapshot().attributes_loading);
        tokio::time::sleep(Duration::from_millis(1)).await;

        let calls = fake.calls(Endpoint::Attributes);
        assert_eq!(param(&calls[0], "bbox").as_deref(), Some("166,-47.5,179,-34"));
        let snap = selection.snapshot();
        assert_eq!(snap.viewed.as_deref(), Some("T1"));
        assert_eq!(snap.attributes.expect("attributes")["voltage"], json!(11000));
        assert!(!snap.attributes_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn attributes_use_current_bounds_and_latest_selection_wins() {
        let (fake, viewport, selection) = setup();
        viewport.set_container_size(800.0, 600.0);
        let slow = fake.hold(Endpoint::Attributes);
        fake.respond(Endpoint::Attributes, json!({"name": "B"}));

        selection.click_feature("A");
        selection.select_single("B");
        slow.release(Ok(json!({"name": "A"})));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let bbox = viewport.bounds().expect("bounds").to_query_value();
        assert_eq!(param(&fake.calls(Endpoint::Attributes)[1], "bbox"), Some(bbox));
        assert_eq!(selection.attributes().expect("attributes")["name"], json!("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn multi_select_is_set_like() {
        let (_, _, selection) = setup();
        assert!(selection.add_to_selection("A"));
        assert!(!selection.add_to_selection("A"));
        assert_eq!(selection.add_many(vec!["B".into(), "A".into(), "C".into()]), 2);
        assert_eq!(selection.selected(), vec!["A", "B", "C"]);

        selection.replace_selection(vec!["X".into(), "X".into()]);
        assert_eq!(selection.selected(), vec!["X"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_keeps_multi_select() {
        let (_, _, selection) = setup();
        selection.add_to_selection("A");
        selection.select_single("T1");
        selection.clear_selection();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let snap = selection.snapshot();
        assert_eq!(snap.viewed, None);
        assert_eq!(snap.attributes, None);
        assert_eq!(snap.selected, vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn box_selection_uses_loaded_features() {
        let (fake, viewport, selection) = setup();
        let v = Viewport::default();
        let size = foundation::ContainerSize::new(800.0, 600.0);
        let view = WebMercatorViewport::new(v, size);
        let a = view.unproject(Vec2::new(100.0, 100.0));
        let b = view.unproject(Vec2::new(600.0, 500.0));
        fake.respond(
            Endpoint::Geometry,
            json!({"features": [
                {"properties": {"name": "A"}, "geometry": {"type": "Point", "coordinates": a}},
                {"properties": {"name": "B"}, "geometry": {"type": "Point", "coordinates": b}},
            ]}),
        );
        viewport.set_container_size(800.0, 600.0);
        tokio::time::sleep(Duration::from_millis(1)).await;

        selection.set_box_selection_mode(true);
        let picked = selection.complete_box_selection(Vec2::new(50.0, 50.0), Vec2::new(200.0, 200.0));
        assert_eq!(picked, vec!["A"]);
        assert_eq!(selection.selected(), vec!["A"]);
        assert!(selection.snapshot().box_selection_mode);
    }
}
