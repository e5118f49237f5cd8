//! Lazily loaded browse tree over the location hierarchy.
//!
//! Children are fetched the first time a node is expanded. DTX nodes are
//! leaves. Failures are recorded on the node and never propagate.

use std::sync::Arc;

use foundation::{HierarchyLevel, HierarchyView};
use parking_lot::Mutex;
use serde::Serialize;
use streaming::{FetchError, QueryService};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode {
    pub label: String,
    pub level: HierarchyLevel,
    /// The filter this node stands for.
    pub view: HierarchyView,
    pub expanded: bool,
    /// `None` until loaded.
    pub children: Option<Vec<HierarchyNode>>,
    pub loading: bool,
    pub error: Option<String>,
}

impl HierarchyNode {
    fn new(view: HierarchyView) -> Self {
        Self {
            label: view.leaf_key().to_string(),
            level: view.level(),
            view,
            expanded: false,
            children: None,
            loading: false,
            error: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.level == HierarchyLevel::Dtx
    }

    /// `true` if this node is the store's current filter.
    pub fn is_selected(&self, current: Option<&HierarchyView>) -> bool {
        current == Some(&self.view)
    }
}

#[derive(Debug, Default)]
struct TreeState {
    roots: Option<Vec<HierarchyNode>>,
    loading: bool,
    error: Option<String>,
}

fn node_at<'a>(roots: &'a mut [HierarchyNode], path: &[usize]) -> Option<&'a mut HierarchyNode> {
    let (first, rest) = path.split_first()?;
    let mut node = roots.get_mut(*first)?;
    for &i in rest {
        node = node.children.as_mut()?.get_mut(i)?;
    }
    Some(node)
}

fn children_of(parent: &HierarchyView, names: Vec<String>) -> Vec<HierarchyNode> {
    names
        .into_iter()
        .filter_map(|name| parent.child(name))
        .map(HierarchyNode::new)
        .collect()
}

#[derive(Clone)]
pub struct HierarchyTree {
    state: Arc<Mutex<TreeState>>,
    service: Arc<dyn QueryService>,
}

impl std::fmt::Debug for HierarchyTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyTree")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl HierarchyTree {
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TreeState::default())),
            service,
        }
    }

    /// Current tree, `None` before the roots have loaded.
    pub fn roots(&self) -> Option<Vec<HierarchyNode>> {
        self.state.lock().roots.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Fetches the GXP list.
    pub async fn load_roots(&self) -> Result<(), FetchError> {
        self.state.lock().loading = true;
        let outcome = self.service.hierarchy_children(None).await;
        let mut st = self.state.lock();
        st.loading = false;
        match outcome {
            Ok(names) => {
                st.roots = Some(
                    names
                        .into_iter()
                        .map(|n| HierarchyNode::new(HierarchyView::gxp(n)))
                        .collect(),
                );
                st.error = None;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "hierarchy roots failed to load");
                st.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Expands or collapses the node at `path` (child indices from the root),
    /// loading its children on first expansion. Returns `false` if there is
    /// no such node.
    pub async fn toggle(&self, path: &[usize]) -> bool {
        let view = {
            let mut st = self.state.lock();
            let Some(node) = st.roots.as_mut().and_then(|r| node_at(r, path)) else {
                return false;
            };
            if node.expanded || node.is_leaf() {
                node.expanded = false;
                return true;
            }
            node.expanded = true;
            if node.children.is_some() || node.loading {
                return true;
            }
            node.loading = true;
            node.view.clone()
        };
        self.load_children(path, view).await;
        true
    }

    async fn load_children(&self, path: &[usize], view: HierarchyView) {
        let outcome = self.service.hierarchy_children(Some(&view)).await;
        let mut st = self.state.lock();
        let Some(node) = st.roots.as_mut().and_then(|r| node_at(r, path)) else {
            return;
        };
        if node.view != view {
            // The tree was reloaded underneath us.
            return;
        }
        node.loading = false;
        match outcome {
            Ok(names) => {
                node.children = Some(children_of(&view, names));
                node.error = None;
            }
            Err(e) => {
                warn!(node = %node.label, error = %e, "hierarchy children failed to load");
                node.children = Some(Vec::new());
                node.error = Some(e.to_string());
            }
        }
    }

    /// Expands every ancestor of `view` so its node is visible, loading
    /// levels as needed. Returns `true` if the node for `view` exists.
    pub async fn expand_along(&self, view: &HierarchyView) -> bool {
        let loaded = self.state.lock().roots.is_some();
        if !loaded && self.load_roots().await.is_err() {
            return false;
        }

        let keys: Vec<&str> = view.keys().map(|(_, k)| k).collect();
        let mut path = Vec::with_capacity(keys.len());
        for (depth, key) in keys.iter().enumerate() {
            let (index, needs_load) = {
                let mut st = self.state.lock();
                let Some(roots) = st.roots.as_mut() else {
                    return false;
                };
                let siblings: &mut Vec<HierarchyNode> = if path.is_empty() {
                    roots
                } else {
                    match node_at(roots, &path).and_then(|n| n.children.as_mut()) {
                        Some(children) => children,
                        None => return false,
                    }
                };
                let Some(index) = siblings.iter().position(|n| n.label == *key) else {
                    return false;
                };
                let node = &mut siblings[index];
                let last = depth + 1 == keys.len();
                let needs_load = !last && node.children.is_none() && !node.loading;
                if !last {
                    node.expanded = true;
                    node.loading |= needs_load;
                }
                (index, needs_load.then(|| node.view.clone()))
            };
            path.push(index);
            if let Some(parent) = needs_load {
                self.load_children(&path, parent).await;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use foundation::{HierarchyLevel, HierarchyView};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use streaming::{Endpoint, FetchError};

    use super::HierarchyTree;
    use crate::testing::{FakeService, param};

    #[tokio::test]
    async fn lazily_loads_children_once() {
        let fake = Arc::new(FakeService::new());
        fake.respond(Endpoint::Hierarchy, json!(["G1", "G2"]));
        let tree = HierarchyTree::new(fake.clone());
        tree.load_roots().await.expect("roots");

        fake.respond(Endpoint::Hierarchy, json!(["S1"]));
        assert!(tree.toggle(&[1]).await);
        let roots = tree.roots().expect("roots");
        let g2 = &roots[1];
        assert!(g2.expanded);
        let children = g2.children.as_ref().expect("children");
        assert_eq!(children[0].label, "S1");
        assert_eq!(children[0].level, HierarchyLevel::Substation);
        assert_eq!(children[0].view, HierarchyView::gxp("G2").child("S1").expect("child"));

        let calls = fake.calls(Endpoint::Hierarchy);
        assert_eq!(param(&calls[1], "gxp").as_deref(), Some("G2"));

        // Collapse, expand again: no new fetch.
        assert!(tree.toggle(&[1]).await);
        assert!(tree.toggle(&[1]).await);
        assert_eq!(fake.call_count(Endpoint::Hierarchy), 2);
        assert!(!tree.toggle(&[7]).await);
    }

    #[tokio::test]
    async fn child_failure_is_recorded_on_node() {
        let fake = Arc::new(FakeService::new());
        fake.respond(Endpoint::Hierarchy, json!(["G1"]));
        let tree = HierarchyTree::new(fake.clone());
        tree.load_roots().await.expect("roots");

        fake.fail(Endpoint::Hierarchy, FetchError::Transport("down".into()));
        tree.toggle(&[0]).await;
        let node = &tree.roots().expect("roots")[0];
        assert_eq!(node.children, Some(Vec::new()));
        assert!(node.error.is_some());
        assert!(!node.loading);
    }

    #[tokio::test]
    async fn expands_along_external_selection() {
        let fake = Arc::new(FakeService::new());
        fake.respond(Endpoint::Hierarchy, json!(["G1"]));
        let tree = HierarchyTree::new(fake.clone());
        tree.load_roots().await.expect("roots");
        fake.respond(Endpoint::Hierarchy, json!(["S1", "S2"]));
        tree.toggle(&[0]).await;
        fake.respond(Endpoint::Hierarchy, json!(["H1"]));

        let target = HierarchyView::from_keys(&["G1", "S2", "H1"]).expect("view");
        assert!(tree.expand_along(&target).await);

        let roots = tree.roots().expect("roots");
        let s2 = &roots[0].children.as_ref().expect("children")[1];
        assert!(s2.expanded);
        let h1 = &s2.children.as_ref().expect("children")[0];
        assert!(h1.is_selected(Some(&target)));
        assert!(!h1.expanded);

        let missing = HierarchyView::from_keys(&["G1", "S9"]).expect("view");
        assert!(!tree.expand_along(&missing).await);
    }
}
