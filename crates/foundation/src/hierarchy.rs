//! The electrical-network location hierarchy used to scope every query.
//!
//! GXP (grid exit point) → substation → HV feeder → DTX (distribution
//! transformer). A [`HierarchyView`] names one node of that tree by the keys
//! of all its ancestors, so a deeper level can only be set when every
//! shallower one is set. The type keeps its fields private and only offers
//! constructors that preserve this.

use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HierarchyLevel {
    Gxp,
    Substation,
    HvFeeder,
    Dtx,
}

impl HierarchyLevel {
    pub const ALL: [HierarchyLevel; 4] = [
        HierarchyLevel::Gxp,
        HierarchyLevel::Substation,
        HierarchyLevel::HvFeeder,
        HierarchyLevel::Dtx,
    ];

    /// Query-string key shared by the page URL and the query service.
    pub fn query_key(self) -> &'static str {
        match self {
            HierarchyLevel::Gxp => "gxp",
            HierarchyLevel::Substation => "substation",
            HierarchyLevel::HvFeeder => "hv",
            HierarchyLevel::Dtx => "dtx",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HierarchyLevel::Gxp => "GXP",
            HierarchyLevel::Substation => "Substation",
            HierarchyLevel::HvFeeder => "HV Feeder",
            HierarchyLevel::Dtx => "LV",
        }
    }

    pub fn depth(self) -> usize {
        self as usize
    }

    /// The next, more specific level.
    pub fn child(self) -> Option<HierarchyLevel> {
        HierarchyLevel::ALL.get(self.depth() + 1).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HierarchyView {
    gxp_code: String,
    substation_name: Option<String>,
    hv_feeder_code: Option<String>,
    dtx_code: Option<String>,
}

impl HierarchyView {
    /// A filter at GXP level.
    pub fn gxp(code: impl Into<String>) -> Self {
        Self {
            gxp_code: code.into(),
            substation_name: None,
            hv_feeder_code: None,
            dtx_code: None,
        }
    }

    /// Builds a view from up to four keys, coarsest first.
    ///
    /// Returns `None` for an empty list or more than four keys.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Option<Self> {
        let (first, rest) = keys.split_first()?;
        if rest.len() >= HierarchyLevel::ALL.len() {
            return None;
        }
        let mut view = Self::gxp(first.as_ref());
        for key in rest {
            view = view.child(key.as_ref())?;
        }
        Some(view)
    }

    /// Builds a view from optional per-level values, stopping at the first
    /// missing (or empty) level. Anything below a gap is dropped.
    pub fn from_parts(
        gxp: Option<&str>,
        substation: Option<&str>,
        hv: Option<&str>,
        dtx: Option<&str>,
    ) -> Option<Self> {
        let keys: Vec<&str> = [gxp, substation, hv, dtx]
            .into_iter()
            .map_while(|k| k.filter(|s| !s.is_empty()))
            .collect();
        Self::from_keys(&keys)
    }

    /// The view one level deeper, under `key`. `None` when already at DTX.
    pub fn child(&self, key: impl Into<String>) -> Option<Self> {
        let mut out = self.clone();
        let key = Some(key.into());
        match self.level() {
            HierarchyLevel::Gxp => out.substation_name = key,
            HierarchyLevel::Substation => out.hv_feeder_code = key,
            HierarchyLevel::HvFeeder => out.dtx_code = key,
            HierarchyLevel::Dtx => return None,
        }
        Some(out)
    }

    /// The enclosing view, or `None` at GXP level.
    pub fn parent(&self) -> Option<Self> {
        let keys: Vec<&str> = self.keys().map(|(_, k)| k).collect();
        Self::from_keys(&keys[..keys.len() - 1])
    }

    pub fn gxp_code(&self) -> &str {
        &self.gxp_code
    }

    pub fn substation_name(&self) -> Option<&str> {
        self.substation_name.as_deref()
    }

    pub fn hv_feeder_code(&self) -> Option<&str> {
        self.hv_feeder_code.as_deref()
    }

    pub fn dtx_code(&self) -> Option<&str> {
        self.dtx_code.as_deref()
    }

    /// Deepest level that is set.
    pub fn level(&self) -> HierarchyLevel {
        if self.dtx_code.is_some() {
            HierarchyLevel::Dtx
        } else if self.hv_feeder_code.is_some() {
            HierarchyLevel::HvFeeder
        } else if self.substation_name.is_some() {
            HierarchyLevel::Substation
        } else {
            HierarchyLevel::Gxp
        }
    }

    /// Key of the deepest level that is set.
    pub fn leaf_key(&self) -> &str {
        self.keys()
            .last()
            .map(|(_, k)| k)
            .unwrap_or(self.gxp_code.as_str())
    }

    /// The set levels with their keys, coarsest first.
    pub fn keys(&self) -> impl Iterator<Item = (HierarchyLevel, &str)> {
        [
            Some(self.gxp_code.as_str()),
            self.substation_name.as_deref(),
            self.hv_feeder_code.as_deref(),
            self.dtx_code.as_deref(),
        ]
        .into_iter()
        .zip(HierarchyLevel::ALL)
        .map_while(|(key, level)| key.map(|k| (level, k)))
    }

    /// `true` if `other` is this view or lies underneath it.
    pub fn contains(&self, other: &HierarchyView) -> bool {
        self.keys().zip(other.keys()).all(|(a, b)| a == b) && other.level() >= self.level()
    }
}

/// Canonical query parameters for an optional filter: `gxp`, `substation`,
/// `hv`, `dtx`, in that order, only for the levels that are set.
///
/// Every request that is scoped by the hierarchy goes through this function
/// so they all serialize the filter identically.
pub fn hierarchy_query_pairs(view: Option<&HierarchyView>) -> Vec<(&'static str, &str)> {
    view.map(|v| v.keys().map(|(level, key)| (level.query_key(), key)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{HierarchyLevel, HierarchyView, hierarchy_query_pairs};

    #[test]
    fn builds_top_down() {
        let v = HierarchyView::gxp("GXP1")
            .child("SUB1")
            .and_then(|v| v.child("HV1"))
            .and_then(|v| v.child("DTX1"))
            .expect("four levels");
        assert_eq!(v.level(), HierarchyLevel::Dtx);
        assert_eq!(v.leaf_key(), "DTX1");
        assert!(v.child("too deep").is_none());
    }

    #[test]
    fn from_parts_truncates_at_first_gap() {
        let v = HierarchyView::from_parts(Some("A"), None, Some("C"), Some("D")).expect("gxp");
        assert_eq!(v, HierarchyView::gxp("A"));

        let v = HierarchyView::from_parts(Some("A"), Some("B"), Some(""), None).expect("gxp");
        assert_eq!(v.level(), HierarchyLevel::Substation);

        assert!(HierarchyView::from_parts(None, Some("B"), None, None).is_none());
        assert!(HierarchyView::from_parts(Some(""), None, None, None).is_none());
    }

    #[test]
    fn query_pairs_follow_fixed_order() {
        let v = HierarchyView::from_keys(&["G", "S", "H"]).expect("view");
        assert_eq!(
            hierarchy_query_pairs(Some(&v)),
            vec![("gxp", "G"), ("substation", "S"), ("hv", "H")]
        );
        assert!(hierarchy_query_pairs(None).is_empty());
    }

    #[test]
    fn parent_and_containment() {
        let sub = HierarchyView::from_keys(&["G", "S"]).expect("view");
        let hv = sub.child("H").expect("hv");
        assert_eq!(hv.parent(), Some(sub.clone()));
        assert_eq!(HierarchyView::gxp("G").parent(), None);
        assert!(sub.contains(&hv));
        assert!(!hv.contains(&sub));
        assert!(!HierarchyView::gxp("X").contains(&hv));
    }

    #[test]
    fn from_keys_rejects_too_many_levels() {
        assert!(HierarchyView::from_keys(&["a", "b", "c", "d", "e"]).is_none());
        assert!(HierarchyView::from_keys::<&str>(&[]).is_none());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let json = serde_json::to_value(HierarchyView::gxp("GXP1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "gxp_code": "GXP1",
                "substation_name": null,
                "hv_feeder_code": null,
                "dtx_code": null,
            })
        );
    }
}
