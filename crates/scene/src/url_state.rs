//! Two-way sync between engine state and the page URL's query string.
//!
//! Startup reads every tracked field once ([`hydrate`]). From then on
//! [`UrlStateSync`] debounces change notifications and rewrites the URL, in
//! place, only when a tracked field changed materially since the last write.

use std::sync::Arc;

use foundation::math::{differs_by_more_than, format_fixed};
use foundation::{DEFAULT_VIEWPORT, HierarchyLevel, HierarchyView, Viewport};
use parking_lot::Mutex;
use runtime::EngineTiming;
use serde::Serialize;
use streaming::{RequestGate, Slot, Url};
use tracing::debug;

pub const LAT_KEY: &str = "lat";
pub const LNG_KEY: &str = "lng";
pub const ZOOM_KEY: &str = "zoom";
pub const DETAIL_KEY: &str = "detail";
pub const COLOUR_KEY: &str = "color";

const LAT_LNG_DIGITS: usize = 6;
const ZOOM_DIGITS: usize = 2;
const LAT_LNG_TOLERANCE: f64 = 1e-4;
const ZOOM_TOLERANCE: f64 = 0.01;

fn is_tracked(key: &str) -> bool {
    [LAT_KEY, LNG_KEY, ZOOM_KEY, DETAIL_KEY, COLOUR_KEY].contains(&key)
        || HierarchyLevel::ALL.iter().any(|l| l.query_key() == key)
}

/// Every field the URL carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlState {
    pub viewport: Viewport,
    pub hierarchy: Option<HierarchyView>,
    pub level_of_detail: Option<String>,
    /// Column name only; the mapping is regenerated on load.
    pub colour_category: String,
}

impl Default for UrlState {
    fn default() -> Self {
        Self {
            viewport: DEFAULT_VIEWPORT,
            hierarchy: None,
            level_of_detail: None,
            colour_category: String::new(),
        }
    }
}

impl UrlState {
    /// Reads the tracked fields from `url`. Missing or unparseable values
    /// fall back to their defaults; a hierarchy is cut at its first gap.
    pub fn read(url: &Url) -> Self {
        let get = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        let number = |key: &str, default: f64| {
            get(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(default)
        };

        let levels: Vec<Option<String>> = HierarchyLevel::ALL
            .iter()
            .map(|l| get(l.query_key()))
            .collect();
        let hierarchy = HierarchyView::from_parts(
            levels[0].as_deref(),
            levels[1].as_deref(),
            levels[2].as_deref(),
            levels[3].as_deref(),
        );

        Self {
            viewport: Viewport::new(
                number(LAT_KEY, DEFAULT_VIEWPORT.latitude),
                number(LNG_KEY, DEFAULT_VIEWPORT.longitude),
                number(ZOOM_KEY, DEFAULT_VIEWPORT.zoom),
            ),
            hierarchy,
            level_of_detail: get(DETAIL_KEY),
            colour_category: get(COLOUR_KEY).unwrap_or_default(),
        }
    }

    /// `url` with the tracked parameters replaced by this state. Untracked
    /// parameters are kept; absent fields are removed.
    pub fn write(&self, url: &Url) -> Url {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !is_tracked(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut out = url.clone();
        {
            let mut query = out.query_pairs_mut();
            query.clear();
            query.extend_pairs(kept);
            query.append_pair(LAT_KEY, &format_fixed(self.viewport.latitude, LAT_LNG_DIGITS));
            query.append_pair(LNG_KEY, &format_fixed(self.viewport.longitude, LAT_LNG_DIGITS));
            query.append_pair(ZOOM_KEY, &format_fixed(self.viewport.zoom, ZOOM_DIGITS));
            if let Some(view) = &self.hierarchy {
                for (level, key) in view.keys() {
                    query.append_pair(level.query_key(), key);
                }
            }
            if let Some(detail) = &self.level_of_detail {
                query.append_pair(DETAIL_KEY, detail);
            }
            if !self.colour_category.is_empty() {
                query.append_pair(COLOUR_KEY, &self.colour_category);
            }
        }
        out
    }

    /// `true` if writing `self` over `last` would change the URL in a way
    /// that matters. Viewport jitter within tolerance does not.
    pub fn differs_materially(&self, last: &UrlState) -> bool {
        let (a, b) = (self.viewport, last.viewport);
        differs_by_more_than(a.latitude, b.latitude, LAT_LNG_TOLERANCE)
            || differs_by_more_than(a.longitude, b.longitude, LAT_LNG_TOLERANCE)
            || differs_by_more_than(a.zoom, b.zoom, ZOOM_TOLERANCE)
            || self.hierarchy != last.hierarchy
            || self.level_of_detail != last.level_of_detail
            || self.colour_category != last.colour_category
    }
}

/// The page location. Implementations replace the current history entry and
/// never navigate.
pub trait UrlSink: Send + Sync {
    fn current(&self) -> Url;
    fn replace(&self, url: Url);
}

/// Hydrating phase: the one synchronous read of the URL at startup.
pub fn hydrate(sink: &dyn UrlSink) -> UrlState {
    let url = sink.current();
    let state = UrlState::read(&url);
    debug!(%url, state = ?state, "hydrated from url");
    state
}

#[derive(Debug)]
struct SyncState {
    last_written: UrlState,
    writes: u64,
    skipped: u64,
}

/// Syncing phase: debounced, change-gated URL rewriting.
#[derive(Clone)]
pub struct UrlStateSync {
    state: Arc<Mutex<SyncState>>,
    gate: RequestGate<()>,
}

impl std::fmt::Debug for UrlStateSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlStateSync")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl UrlStateSync {
    /// Starts syncing. `hydrated` is what the URL held at startup, so nothing
    /// is written until the engine moves away from it. `snapshot` reads the
    /// tracked fields from the stores.
    pub fn start(
        sink: Arc<dyn UrlSink>,
        timing: &EngineTiming,
        hydrated: UrlState,
        snapshot: impl Fn() -> UrlState + Send + Sync + 'static,
    ) -> Self {
        let state = Arc::new(Mutex::new(SyncState {
            last_written: hydrated,
            writes: 0,
            skipped: 0,
        }));

        let gate = {
            let state = state.clone();
            RequestGate::new(Slot::UrlSync, timing.url_sync(), move |(), ticket| {
                let current = snapshot();
                let changed = {
                    let mut st = state.lock();
                    if current.differs_materially(&st.last_written) {
                        st.last_written = current.clone();
                        st.writes += 1;
                        true
                    } else {
                        st.skipped += 1;
                        false
                    }
                };
                if changed {
                    let url = current.write(&sink.current());
                    debug!(%url, "url updated");
                    sink.replace(url);
                } else {
                    debug!("no material change, url left alone");
                }
                ticket.commit(|| ());
            })
        };

        Self { state, gate }
    }

    /// A tracked field may have changed.
    pub fn notify(&self) {
        self.gate.schedule(());
    }

    /// Evaluates immediately instead of waiting for the debounce window.
    pub fn flush(&self) {
        self.gate.fire_now(());
    }

    pub fn writes(&self) -> u64 {
        self.state.lock().writes
    }

    pub fn last_written(&self) -> UrlState {
        self.state.lock().last_written.clone()
    }
}
