use std::collections::HashSet;

use crate::types::RemoteAsset;

/// Selected asset ids; a pure set with no click order.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    ids: HashSet<String>,
    multi_select: bool,
}

impl SelectionSet {
    pub fn new(multi_select: bool) -> Self {
        Self {
            ids: HashSet::new(),
            multi_select,
        }
    }

    /// Single-select replaces the selection; multi-select flips membership.
    pub fn toggle(&mut self, asset_id: &str) {
        if !self.multi_select {
            self.ids.clear();
            self.ids.insert(asset_id.to_owned());
            return;
        }
        if !self.ids.remove(asset_id) {
            self.ids.insert(asset_id.to_owned());
        }
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.ids.contains(asset_id)
    }

    pub fn remove(&mut self, asset_id: &str) -> bool {
        self.ids.remove(asset_id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected assets in display order.
    pub fn confirm(&self, display_order: &[RemoteAsset]) -> Vec<RemoteAsset> {
        display_order
            .iter()
            .filter(|asset| self.ids.contains(&asset.id))
            .cloned()
            .collect()
    }
}
