//! Composition root: builds every store from the hydrated URL and wires
//! their change notifications to each other.

use std::collections::BTreeSet;
use std::sync::Arc;

use foundation::{ContainerSize, GeoBounds, HierarchyView, Viewport};
use parking_lot::Mutex;
use runtime::{EngineTiming, SubscriberId, TimingError};
use serde::Serialize;
use streaming::{AttributeFilterQuery, FetchError, QueryService};
use tracing::{debug, info, warn};

use crate::colouring::{ColourCategoryStore, ColouringContext, ColouringEvent};
use crate::connectivity::{
    ActiveOverlay, ConnectivityEvent, ConnectivityStore, FloodFillQuery, PathQuery,
};
use crate::hierarchy::{HierarchyEvent, HierarchyFilterStore};
use crate::search::{
    ConnectivityCompletionStates, ConnectivityCompletions, SearchCompletion, SearchState,
};
use crate::selection::{SelectionSnapshot, SelectionStore};
use crate::tree::HierarchyTree;
use crate::url_state::{UrlSink, UrlState, UrlStateSync, hydrate};
use crate::viewport::{ViewportController, ViewportEvent};

/// Everything a renderer needs, taken at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderState {
    pub viewport: Viewport,
    pub size: ContainerSize,
    pub bounds: Option<GeoBounds>,
    pub level_of_detail: Option<String>,
    pub hierarchy: Option<HierarchyView>,
    pub colouring: ColouringContext,
    pub highlighted_edges: BTreeSet<String>,
    pub active_overlay: ActiveOverlay,
    pub shortest_path: PathQuery,
    pub flood_fill: FloodFillQuery,
    pub selection: SelectionSnapshot,
    pub search: SearchState,
    pub connectivity_completions: ConnectivityCompletionStates,
    pub feature_count: usize,
    pub base_loading: bool,
    pub base_error: Option<String>,
    pub column_names: Vec<String>,
    pub detail_levels: Vec<String>,
    pub location: String,
}

#[derive(Debug, Default)]
struct Catalogue {
    column_names: Vec<String>,
    detail_levels: Vec<String>,
}

enum Subscription {
    Hierarchy(SubscriberId),
    Colouring(SubscriberId),
    Viewport(SubscriberId),
    Connectivity(SubscriberId),
}

/// The map viewer's query engine.
///
/// Dropping the engine detaches the store subscriptions it installed; store
/// handles cloned out of it keep working on their own.
pub struct Engine {
    service: Arc<dyn QueryService>,
    sink: Arc<dyn UrlSink>,
    timing: EngineTiming,
    hierarchy: HierarchyFilterStore,
    colouring: ColourCategoryStore,
    viewport: ViewportController,
    connectivity: ConnectivityStore,
    selection: SelectionStore,
    search: SearchCompletion,
    connectivity_completions: ConnectivityCompletions,
    tree: HierarchyTree,
    url: UrlStateSync,
    catalogue: Arc<Mutex<Catalogue>>,
    subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("timing", &self.timing)
            .field("viewport", &self.viewport)
            .field("hierarchy", &self.hierarchy)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Hydrates from `sink`'s current URL and starts syncing back to it.
    /// Must be called inside a tokio runtime.
    pub fn new(
        service: Arc<dyn QueryService>,
        timing: EngineTiming,
        sink: Arc<dyn UrlSink>,
    ) -> Result<Self, TimingError> {
        timing.validate()?;
        let hydrated = hydrate(sink.as_ref());

        let hierarchy = HierarchyFilterStore::new(hydrated.hierarchy.clone());
        let colouring = ColourCategoryStore::new(
            service.clone(),
            hierarchy.clone(),
            hydrated.colour_category.clone(),
        );
        let viewport = ViewportController::new(
            service.clone(),
            &timing,
            hierarchy.clone(),
            colouring.clone(),
            hydrated.viewport,
            hydrated.level_of_detail.clone(),
        );
        let connectivity = ConnectivityStore::new(service.clone(), &timing, hierarchy.clone());
        let selection = SelectionStore::new(service.clone(), viewport.clone());
        let search = SearchCompletion::new(service.clone(), &timing, hierarchy.clone());
        let connectivity_completions =
            ConnectivityCompletions::new(service.clone(), &timing, hierarchy.clone());
        let tree = HierarchyTree::new(service.clone());

        let url = {
            let (hierarchy, colouring, viewport) =
                (hierarchy.clone(), colouring.clone(), viewport.clone());
            UrlStateSync::start(sink.clone(), &timing, hydrated, move || {
                tracked_state(&hierarchy, &colouring, &viewport)
            })
        };

        let mut engine = Self {
            service,
            sink,
            timing,
            hierarchy,
            colouring,
            viewport,
            connectivity,
            selection,
            search,
            connectivity_completions,
            tree,
            url,
            catalogue: Arc::default(),
            subscriptions: Vec::new(),
        };
        engine.wire();
        engine.colouring.regenerate_if_needed();
        info!(timing = ?engine.timing, "engine started");
        Ok(engine)
    }

    fn wire(&mut self) {
        let id = {
            let (colouring, viewport, connectivity, search, completions, url) = (
                self.colouring.clone(),
                self.viewport.clone(),
                self.connectivity.clone(),
                self.search.clone(),
                self.connectivity_completions.clone(),
                self.url.clone(),
            );
            self.hierarchy.events().subscribe(move |e| {
                let HierarchyEvent::Changed(view) = e;
                debug!(hierarchy = ?view, "hierarchy changed, re-scoping queries");
                colouring.invalidate();
                viewport.refresh();
                connectivity.refresh();
                search.refresh();
                completions.refresh();
                url.notify();
            })
        };
        self.subscriptions.push(Subscription::Hierarchy(id));

        let id = {
            let (viewport, url) = (self.viewport.clone(), self.url.clone());
            self.colouring.events().subscribe(move |e| {
                if let ColouringEvent::CategoryChanged(_) = e {
                    viewport.refresh();
                    url.notify();
                }
            })
        };
        self.subscriptions.push(Subscription::Colouring(id));

        let id = {
            let (selection, url) = (self.selection.clone(), self.url.clone());
            self.viewport.events().subscribe(move |e| match e {
                ViewportEvent::ViewportChanged(_) | ViewportEvent::DetailChanged(_) => url.notify(),
                ViewportEvent::FocusRequested(name) => selection.select_single(name.clone()),
                ViewportEvent::Resized(_) | ViewportEvent::FeaturesLoaded(_) => {}
            })
        };
        self.subscriptions.push(Subscription::Viewport(id));

        let id = {
            let url = self.url.clone();
            self.connectivity.events().subscribe(move |e| {
                if let ConnectivityEvent::ActiveOverlayChanged(_) = e {
                    url.notify();
                }
            })
        };
        self.subscriptions.push(Subscription::Connectivity(id));
    }

    pub fn timing(&self) -> &EngineTiming {
        &self.timing
    }

    pub fn hierarchy(&self) -> &HierarchyFilterStore {
        &self.hierarchy
    }

    pub fn colouring(&self) -> &ColourCategoryStore {
        &self.colouring
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn connectivity(&self) -> &ConnectivityStore {
        &self.connectivity
    }

    pub fn selection(&self) -> &SelectionStore {
        &self.selection
    }

    pub fn search(&self) -> &SearchCompletion {
        &self.search
    }

    /// Name completion for the shortest-path and flood-fill inputs.
    pub fn connectivity_completions(&self) -> &ConnectivityCompletions {
        &self.connectivity_completions
    }

    pub fn tree(&self) -> &HierarchyTree {
        &self.tree
    }

    pub fn url_sync(&self) -> &UrlStateSync {
        &self.url
    }

    /// The fields the URL tracks, as the stores hold them now.
    pub fn url_state(&self) -> UrlState {
        tracked_state(&self.hierarchy, &self.colouring, &self.viewport)
    }

    /// Loads the hierarchy tree's roots and opens it along the current filter.
    pub async fn load_tree(&self) -> Result<bool, FetchError> {
        self.tree.load_roots().await?;
        match self.hierarchy.current() {
            Some(view) => Ok(self.tree.expand_along(&view).await),
            None => Ok(true),
        }
    }

    /// Columns features can be coloured by.
    pub async fn load_column_names(&self) -> Result<Vec<String>, FetchError> {
        let names = self.service.column_names().await.inspect_err(|e| {
            warn!(error = %e, "column names unavailable");
        })?;
        self.catalogue.lock().column_names.clone_from(&names);
        Ok(names)
    }

    /// Selectable level-of-detail tiers.
    pub async fn load_detail_levels(&self) -> Result<Vec<String>, FetchError> {
        let levels = self.service.detail_levels().await.inspect_err(|e| {
            warn!(error = %e, "detail levels unavailable");
        })?;
        self.catalogue.lock().detail_levels.clone_from(&levels);
        Ok(levels)
    }

    /// Replaces the multi-selection with every feature whose `column` equals
    /// `value` under the current hierarchy filter. Returns how many matched.
    pub async fn select_all_with_attribute(
        &self,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<usize, FetchError> {
        let query = AttributeFilterQuery {
            column: column.into(),
            value: value.into(),
            hierarchy: self.hierarchy.current(),
        };
        let names = self
            .service
            .all_with_attribute(&query)
            .await
            .inspect_err(|e| warn!(column = %query.column, error = %e, "attribute filter failed"))?;
        let count = names.len();
        self.selection.replace_selection(names);
        debug!(column = %query.column, value = %query.value, count, "selected by attribute");
        Ok(count)
    }

    pub fn render_state(&self) -> RenderState {
        let catalogue = self.catalogue.lock();
        RenderState {
            viewport: self.viewport.viewport(),
            size: self.viewport.size(),
            bounds: self.viewport.bounds(),
            level_of_detail: self.viewport.level_of_detail(),
            hierarchy: self.hierarchy.current(),
            colouring: self.colouring.context(),
            highlighted_edges: self.connectivity.all_highlighted_edges(),
            active_overlay: self.connectivity.active_overlay(),
            shortest_path: self.connectivity.path_query(),
            flood_fill: self.connectivity.flood_fill_query(),
            selection: self.selection.snapshot(),
            search: self.search.state(),
            connectivity_completions: self.connectivity_completions.states(),
            feature_count: self.viewport.feature_count(),
            base_loading: self.viewport.loading(),
            base_error: self.viewport.error(),
            column_names: catalogue.column_names.clone(),
            detail_levels: catalogue.detail_levels.clone(),
            location: self.sink.current().to_string(),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            match subscription {
                Subscription::Hierarchy(id) => self.hierarchy.events().unsubscribe(id),
                Subscription::Colouring(id) => self.colouring.events().unsubscribe(id),
                Subscription::Viewport(id) => self.viewport.events().unsubscribe(id),
                Subscription::Connectivity(id) => self.connectivity.events().unsubscribe(id),
            };
        }
    }
}

fn tracked_state(
    hierarchy: &HierarchyFilterStore,
    colouring: &ColourCategoryStore,
    viewport: &ViewportController,
) -> UrlState {
    UrlState {
        viewport: viewport.viewport(),
        hierarchy: hierarchy.current(),
        level_of_detail: viewport.level_of_detail(),
        colour_category: colouring.category(),
    }
}
