use std::sync::Arc;

use layers::{ColourMapping, generate_colour_mapping, is_voltage_column};
use parking_lot::Mutex;
use runtime::{EventBus, GateTiming};
use serde::Serialize;
use streaming::{ColumnValuesQuery, QueryService, RequestGate, Slot, spawn_settled};
use tracing::debug;

use crate::hierarchy::HierarchyFilterStore;

/// Selected colour column and the mapping generated for it.
///
/// `mapping` is only ever populated for `category`; an empty `category`
/// means features are not coloured by attribute.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ColouringContext {
    pub category: String,
    pub mapping: ColourMapping,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColouringEvent {
    CategoryChanged(String),
    MappingChanged,
}

#[derive(Debug, Default)]
struct ColouringState {
    context: ColouringContext,
    loading: bool,
    error: Option<String>,
}

/// Owns the colour category and regenerates its mapping from the column's
/// distinct values whenever a category is set and no mapping is cached.
#[derive(Clone)]
pub struct ColourCategoryStore {
    state: Arc<Mutex<ColouringState>>,
    hierarchy: HierarchyFilterStore,
    gate: RequestGate<ColumnValuesQuery>,
    events: EventBus<ColouringEvent>,
}

impl std::fmt::Debug for ColourCategoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColourCategoryStore")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl ColourCategoryStore {
    pub fn new(
        service: Arc<dyn QueryService>,
        hierarchy: HierarchyFilterStore,
        category: impl Into<String>,
    ) -> Self {
        let state = Arc::new(Mutex::new(ColouringState {
            context: ColouringContext {
                category: category.into(),
                mapping: ColourMapping::new(),
            },
            ..ColouringState::default()
        }));
        let events = EventBus::new();

        let gate = {
            let state = state.clone();
            let events = events.clone();
            RequestGate::new(
                Slot::ColourValues,
                GateTiming::immediate(),
                move |query: ColumnValuesQuery, ticket| {
                    state.lock().loading = true;
                    let fetch = service.column_values(&query);
                    let state = state.clone();
                    spawn_settled(ticket, fetch, events.clone(), move |outcome| {
                        let mut st = state.lock();
                        st.loading = false;
                        if st.context.category != query.column {
                            return None;
                        }
                        match outcome {
                            Ok(values) => {
                                st.error = None;
                                st.context.mapping = generate_colour_mapping(
                                    &values,
                                    is_voltage_column(&query.column),
                                );
                                (!values.is_empty()).then_some(ColouringEvent::MappingChanged)
                            }
                            Err(e) => {
                                st.error = Some(e.to_string());
                                None
                            }
                        }
                    });
                },
            )
        };

        Self {
            state,
            hierarchy,
            gate,
            events,
        }
    }

    pub fn events(&self) -> &EventBus<ColouringEvent> {
        &self.events
    }

    pub fn category(&self) -> String {
        self.state.lock().context.category.clone()
    }

    pub fn context(&self) -> ColouringContext {
        self.state.lock().context.clone()
    }

    pub fn loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Selects a colour column (`""` for none), discarding the mapping of the
    /// previous one, and starts regenerating.
    pub fn set_category(&self, category: impl Into<String>) {
        let category = category.into();
        let changed = {
            let mut st = self.state.lock();
            let changed = st.context.category != category;
            st.context.category.clone_from(&category);
            st.context.mapping.clear();
            st.error = None;
            changed
        };
        if changed {
            self.events.emit(&ColouringEvent::CategoryChanged(category));
        }
        self.events.emit(&ColouringEvent::MappingChanged);
        self.regenerate_if_needed();
    }

    /// Drops the mapping because its scope (the hierarchy filter) changed,
    /// and regenerates it for the new scope.
    pub fn invalidate(&self) {
        let had_mapping = {
            let mut st = self.state.lock();
            let had = !st.context.mapping.is_empty();
            st.context.mapping.clear();
            had
        };
        if had_mapping {
            self.events.emit(&ColouringEvent::MappingChanged);
        }
        self.regenerate_if_needed();
    }

    /// Fetches the column's values when a category is set and the mapping is
    /// empty. Returns `true` if a fetch was started.
    pub fn regenerate_if_needed(&self) -> bool {
        let (category, needed) = {
            let st = self.state.lock();
            let c = &st.context;
            (c.category.clone(), !c.category.is_empty() && c.mapping.is_empty())
        };
        if category.is_empty() {
            self.gate.cancel();
            self.state.lock().loading = false;
            return false;
        }
        if !needed {
            return false;
        }
        debug!(%category, "regenerating colour mapping");
        self.gate.fire_now(ColumnValuesQuery {
            column: category,
            hierarchy: self.hierarchy.current(),
        });
        true
    }

    /// Overrides the colour of one value, keeping the rest of the mapping.
    pub fn update_colour(&self, value: impl Into<String>, colour: impl Into<String>) {
        self.state
            .lock()
            .context
            .mapping
            .insert(value.into(), colour.into());
        self.events.emit(&ColouringEvent::MappingChanged);
    }

    /// Replaces the whole mapping of the current category.
    pub fn update_mapping(&self, mapping: ColourMapping) {
        self.state.lock().context.mapping = mapping;
        self.events.emit(&ColouringEvent::MappingChanged);
    }
}
