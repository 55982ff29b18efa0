//! Item Registry: per-run ownership of every competing item
//!
//! One registry is created at run start and dropped at run end. It holds
//! every item ever produced in the run, including superseded ones, keyed by
//! id, and remembers creation order per direction.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::elo::EloTracker;
use crate::model::{CompetingItem, DirectionId, ItemId, QualityAssessment};

/// Errors from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate item id: {0}")]
    DuplicateItem(ItemId),

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),
}

/// Registry of all items in one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemRegistry {
    items: HashMap<ItemId, CompetingItem>,
    /// Insertion order per direction
    order: BTreeMap<DirectionId, Vec<ItemId>>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Ids must be unique within the run.
    pub fn insert(&mut self, item: CompetingItem) -> Result<(), RegistryError> {
        if self.items.contains_key(&item.item_id) {
            return Err(RegistryError::DuplicateItem(item.item_id));
        }
        self.order
            .entry(item.direction_id.clone())
            .or_default()
            .push(item.item_id.clone());
        self.items.insert(item.item_id.clone(), item);
        Ok(())
    }

    pub fn get(&self, item_id: &str) -> Option<&CompetingItem> {
        self.items.get(item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.items.contains_key(item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Directions that have at least one item, in id order
    pub fn directions(&self) -> Vec<DirectionId> {
        self.order.keys().cloned().collect()
    }

    /// Items of one direction in creation order
    pub fn by_direction(&self, direction_id: &str) -> Vec<&CompetingItem> {
        self.order
            .get(direction_id)
            .map(|ids| ids.iter().filter_map(|id| self.items.get(id)).collect())
            .unwrap_or_default()
    }

    /// Every item, grouped by direction, each group in creation order
    pub fn all(&self) -> Vec<&CompetingItem> {
        self.order
            .values()
            .flat_map(|ids| ids.iter().filter_map(|id| self.items.get(id)))
            .collect()
    }

    /// Owned copy of every item, in the same order as [`Self::all`]
    pub fn to_vec(&self) -> Vec<CompetingItem> {
        self.all().into_iter().cloned().collect()
    }

    /// Store a reflection result on the item.
    pub fn apply_assessment(
        &mut self,
        item_id: &str,
        assessment: &QualityAssessment,
    ) -> Result<(), RegistryError> {
        let item = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| RegistryError::UnknownItem(item_id.to_string()))?;
        item.apply_assessment(assessment);
        Ok(())
    }

    /// Record 50 / REVISE on every item still lacking an assessment.
    /// Returns how many items were filled.
    pub fn fill_unscored_defaults(&mut self) -> usize {
        self.items
            .values_mut()
            .map(CompetingItem::fill_unscored_defaults)
            .filter(|filled| *filled)
            .count()
    }

    /// Copy the tracker's current ratings onto the item mirrors.
    pub fn sync_ratings(&mut self, tracker: &EloTracker) {
        for (id, item) in self.items.iter_mut() {
            if let Some(rating) = tracker.rating(id) {
                item.elo_rating = rating;
            }
        }
    }
}
