use std::sync::Arc;
use std::time::Duration;

use foundation::{ContainerSize, GeoBounds, Viewport};
use parking_lot::Mutex;
use runtime::{EngineTiming, EventBus};
use streaming::{
    Feature, FetchError, GeometryQuery, QueryService, RequestGate, Slot, SlotTracker,
    spawn_settled,
};
use tracing::{debug, warn};

use crate::colouring::ColourCategoryStore;
use crate::hierarchy::HierarchyFilterStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewportEvent {
    ViewportChanged(Viewport),
    Resized(ContainerSize),
    DetailChanged(Option<String>),
    FeaturesLoaded(usize),
    /// A fly-to asked for `name` to be selected and its attributes shown.
    FocusRequested(String),
}

#[derive(Debug)]
struct ViewState {
    viewport: Viewport,
    size: ContainerSize,
    detail: Option<String>,
    /// Animation length requested with the latest viewport, if any.
    transition: Option<Duration>,
    cold_started: bool,
    features: Vec<Feature>,
    loading: bool,
    error: Option<String>,
}

/// Owns the map camera and container size and keeps the base geometry for
/// the visible area loaded.
///
/// Base-data requests carry a snapshot of the bounding box, zoom, colour
/// column, level of detail and hierarchy filter taken when they are
/// scheduled.
#[derive(Clone)]
pub struct ViewportController {
    state: Arc<Mutex<ViewState>>,
    service: Arc<dyn QueryService>,
    hierarchy: HierarchyFilterStore,
    colouring: ColourCategoryStore,
    gate: RequestGate<GeometryQuery>,
    centroid: SlotTracker,
    fly_to_zoom: f64,
    fly_to_transition: Duration,
    events: EventBus<ViewportEvent>,
}

impl std::fmt::Debug for ViewportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("ViewportController")
            .field("viewport", &st.viewport)
            .field("size", &st.size)
            .field("detail", &st.detail)
            .field("features", &st.features.len())
            .finish_non_exhaustive()
    }
}

impl ViewportController {
    pub fn new(
        service: Arc<dyn QueryService>,
        timing: &EngineTiming,
        hierarchy: HierarchyFilterStore,
        colouring: ColourCategoryStore,
        initial: Viewport,
        detail: Option<String>,
    ) -> Self {
        let state = Arc::new(Mutex::new(ViewState {
            viewport: initial,
            size: ContainerSize::default(),
            detail,
            transition: None,
            cold_started: false,
            features: Vec::new(),
            loading: false,
            error: None,
        }));
        let events = EventBus::new();

        let gate = {
            let state = state.clone();
            let events = events.clone();
            let service = service.clone();
            RequestGate::new(Slot::BaseData, timing.base_data(), move |query: GeometryQuery, ticket| {
                state.lock().loading = true;
                let fetch = service.geometry(&query);
                let state = state.clone();
                spawn_settled(ticket, fetch, events.clone(), move |outcome| {
                    let mut st = state.lock();
                    st.loading = false;
                    match outcome {
                        Ok(collection) => {
                            st.error = None;
                            st.features = collection.features;
                            let count = st.features.len();
                            debug!(count, "base geometry loaded");
                            Some(ViewportEvent::FeaturesLoaded(count))
                        }
                        Err(e) => {
                            st.error = Some(e.to_string());
                            None
                        }
                    }
                });
            })
        };

        Self {
            state,
            service,
            hierarchy,
            colouring,
            gate,
            centroid: SlotTracker::new(Slot::Centroid),
            fly_to_zoom: timing.fly_to_zoom,
            fly_to_transition: timing.fly_to_transition,
            events,
        }
    }

    pub fn events(&self) -> &EventBus<ViewportEvent> {
        &self.events
    }

    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    pub fn size(&self) -> ContainerSize {
        self.state.lock().size
    }

    /// Visible rectangle; `None` until the container has a measurable size.
    pub fn bounds(&self) -> Option<GeoBounds> {
        let st = self.state.lock();
        st.viewport.bounds(st.size)
    }

    pub fn level_of_detail(&self) -> Option<String> {
        self.state.lock().detail.clone()
    }

    pub fn transition(&self) -> Option<Duration> {
        self.state.lock().transition
    }

    pub fn loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn feature_count(&self) -> usize {
        self.state.lock().features.len()
    }

    /// Runs `f` over the currently loaded base geometry.
    pub fn with_features<R>(&self, f: impl FnOnce(&[Feature]) -> R) -> R {
        f(&self.state.lock().features)
    }

    pub fn base_requests_fired(&self) -> u64 {
        self.gate.fired()
    }

    /// Moves the camera (user pan/zoom) and schedules a base-data fetch.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.apply_viewport(viewport, None);
    }

    fn apply_viewport(&self, viewport: Viewport, transition: Option<Duration>) {
        {
            let mut st = self.state.lock();
            st.viewport = viewport;
            st.transition = transition;
        }
        self.events.emit(&ViewportEvent::ViewportChanged(viewport));
        self.refresh();
    }

    /// Records the container's pixel size. The first measurable size fetches
    /// immediately; sizes without area never fetch.
    pub fn set_container_size(&self, width: f64, height: f64) {
        let size = ContainerSize::new(width, height);
        let cold_start = {
            let mut st = self.state.lock();
            if st.size == size {
                return;
            }
            st.size = size;
            let cold = size.is_measurable() && !st.cold_started;
            st.cold_started |= cold;
            cold
        };
        self.events.emit(&ViewportEvent::Resized(size));

        if cold_start {
            if let Some(query) = self.base_query() {
                debug!(width, height, "container measurable, cold-start fetch");
                self.gate.fire_now(query);
            }
        } else {
            self.refresh();
        }
    }

    /// Selects a server-side level of detail (`None` for automatic).
    pub fn set_level_of_detail(&self, detail: Option<String>) {
        {
            let mut st = self.state.lock();
            if st.detail == detail {
                return;
            }
            st.detail.clone_from(&detail);
        }
        self.events.emit(&ViewportEvent::DetailChanged(detail));
        self.refresh();
    }

    /// Schedules a base-data fetch for the current state. Used whenever one
    /// of the query inputs owned by another store changes.
    pub fn refresh(&self) {
        if let Some(query) = self.base_query() {
            self.gate.schedule(query);
        }
    }

    /// Snapshot of everything the base-data request depends on.
    pub fn base_query(&self) -> Option<GeometryQuery> {
        let (bounds, zoom, detail) = {
            let st = self.state.lock();
            (st.viewport.bounds(st.size)?, st.viewport.zoom, st.detail.clone())
        };
        Some(GeometryQuery {
            bounds,
            zoom,
            column: self.colouring.category(),
            detail,
            hierarchy: self.hierarchy.current(),
        })
    }

    /// Centres the map on the named feature.
    ///
    /// Always requests the feature be selected. The camera only moves when the
    /// service knows a location for `name`; it then flies to the configured
    /// zoom with the configured transition and the usual base-data fetch
    /// follows. Returns `true` if the camera moved.
    pub async fn fly_to(&self, name: &str) -> bool {
        self.events
            .emit(&ViewportEvent::FocusRequested(name.to_string()));

        let ticket = self.centroid.begin();
        let outcome = ticket.run(self.service.centroid(name)).await;
        let target = match outcome {
            Ok(Some([lng, lat])) => Viewport::new(lat, lng, self.fly_to_zoom),
            Ok(None) => {
                debug!(name, "no location, viewport unchanged");
                return false;
            }
            Err(FetchError::Cancelled) => return false,
            Err(e) => {
                if ticket.is_live() {
                    warn!(name, error = %e, "centroid lookup failed");
                }
                return false;
            }
        };

        if ticket.commit(|| ()).is_none() {
            debug!(name, "fly-to superseded");
            return false;
        }
        self.apply_viewport(target, Some(self.fly_to_transition));
        true
    }
}
