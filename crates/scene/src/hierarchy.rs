use std::sync::Arc;

use foundation::{HierarchyView, hierarchy_query_pairs};
use parking_lot::Mutex;
use runtime::EventBus;
use streaming::Url;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum HierarchyEvent {
    Changed(Option<HierarchyView>),
}

/// Holds the selected location-hierarchy node, `None` for no filter.
#[derive(Debug, Clone, Default)]
pub struct HierarchyFilterStore {
    current: Arc<Mutex<Option<HierarchyView>>>,
    events: EventBus<HierarchyEvent>,
}

impl HierarchyFilterStore {
    pub fn new(initial: Option<HierarchyView>) -> Self {
        Self {
            current: Arc::new(Mutex::new(initial)),
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus<HierarchyEvent> {
        &self.events
    }

    pub fn current(&self) -> Option<HierarchyView> {
        self.current.lock().clone()
    }

    /// Replaces the filter. Subscribers are only notified of real changes.
    ///
    /// Returns `true` if the filter changed.
    pub fn set_filter(&self, filter: Option<HierarchyView>) -> bool {
        {
            let mut current = self.current.lock();
            if *current == filter {
                return false;
            }
            current.clone_from(&filter);
        }
        debug!(filter = ?filter, "hierarchy filter changed");
        self.events.emit(&HierarchyEvent::Changed(filter));
        true
    }

    /// `base` with the current filter appended as `gxp`, `substation`, `hv`,
    /// `dtx` (only the levels that are set, in that order). Parameters already
    /// on `base` are kept.
    pub fn to_query_string(&self, base: &Url) -> String {
        let current = self.current();
        let pairs = hierarchy_query_pairs(current.as_ref());
        let mut url = base.clone();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        url.into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::HierarchyView;
    use parking_lot::Mutex;
    use streaming::Url;

    use super::{HierarchyEvent, HierarchyFilterStore};

    fn base() -> Url {
        Url::parse("http://svc/api/shortest_path?a=N1&b=N2").expect("url")
    }

    #[test]
    fn appends_only_set_levels_in_order() {
        let store = HierarchyFilterStore::new(HierarchyView::gxp("G1").child("S 1"));
        assert_eq!(
            store.to_query_string(&base()),
            "http://svc/api/shortest_path?a=N1&b=N2&gxp=G1&substation=S+1"
        );
    }

    #[test]
    fn no_filter_leaves_url_untouched() {
        let store = HierarchyFilterStore::new(None);
        assert_eq!(store.to_query_string(&base()), base().as_str());
    }

    #[test]
    fn notifies_only_on_change() {
        let store = HierarchyFilterStore::new(None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.events().subscribe(move |e: &HierarchyEvent| sink.lock().push(e.clone()));

        assert!(store.set_filter(Some(HierarchyView::gxp("G1"))));
        assert!(!store.set_filter(Some(HierarchyView::gxp("G1"))));
        assert!(store.set_filter(None));

        assert_eq!(
            *seen.lock(),
            vec![
                HierarchyEvent::Changed(Some(HierarchyView::gxp("G1"))),
                HierarchyEvent::Changed(None),
            ]
        );
    }
}
