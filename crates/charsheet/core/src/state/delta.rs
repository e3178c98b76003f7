//! Structural diff between two character models.

use std::collections::BTreeMap;

use bitflags::bitflags;

use super::{CharacterModel, FeatureModel};

bitflags! {
    /// Which parts of a [`FeatureModel`] changed.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFields: u8 {
        const RANKS   = 1 << 0;
        const NOTES   = 1 << 1;
        const CHOICES = 1 << 2;
        /// Any of the plot-controlled flags or notes.
        const PLOT    = 1 << 3;
    }
}

impl FeatureFields {
    pub fn between(before: &FeatureModel, after: &FeatureModel) -> Self {
        let mut fields = Self::empty();
        fields.set(Self::RANKS, before.ranks != after.ranks);
        fields.set(Self::NOTES, before.notes != after.notes);
        fields.set(Self::CHOICES, before.choices != after.choices);
        fields.set(
            Self::PLOT,
            before.plot_added != after.plot_added
                || before.plot_notes != after.plot_notes
                || before.player_can_remove != after.player_can_remove
                || before.plot_free != after.plot_free
                || before.plot_suppressed != after.plot_suppressed,
        );
        fields
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureChange {
    pub id: String,
    pub fields: FeatureFields,
    /// Purchased ranks after minus before.
    pub rank_delta: i32,
}

/// What changed between two snapshots of a character.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<FeatureChange>,
    pub metadata_changed: bool,
}

impl ModelDelta {
    pub fn from_models(before: &CharacterModel, after: &CharacterModel) -> Self {
        let mut delta = Self {
            metadata_changed: before.metadata != after.metadata,
            ..Self::default()
        };
        let mut remaining: BTreeMap<&String, &FeatureModel> = before.features.iter().collect();

        for (id, entry) in &after.features {
            match remaining.remove(id) {
                Some(prev) => {
                    let fields = FeatureFields::between(prev, entry);
                    if !fields.is_empty() {
                        delta.changed.push(FeatureChange {
                            id: id.clone(),
                            fields,
                            rank_delta: entry.ranks - prev.ranks,
                        });
                    }
                }
                None => delta.added.push(id.clone()),
            }
        }
        delta.removed.extend(remaining.into_keys().cloned());
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && !self.metadata_changed
    }
}
