//! Attribute controller.

use super::PropertyController;
use crate::engine::CharacterController;
use crate::expr::PropExpression;
use crate::ruleset::{Attribute, AttributeKind, FeatureDefinition};

/// Value of a ruleset attribute, or of a feature-scoped attribute such as
/// `wizard.spell_slots` that only exists through grants.
pub struct AttributeController<'c> {
    character: &'c CharacterController,
    attribute: Option<&'c Attribute>,
    full_id: String,
}

impl<'c> AttributeController<'c> {
    pub(crate) fn new(
        character: &'c CharacterController,
        attribute: Option<&'c Attribute>,
        expr: &PropExpression,
    ) -> Self {
        Self {
            character,
            attribute,
            full_id: expr.full_id(),
        }
    }

    pub fn attribute(&self) -> Option<&'c Attribute> {
        self.attribute
    }

    fn granted(&self) -> i32 {
        self.character.propagation().granted(&self.full_id)
    }

    /// Values of every feature the attribute sums over.
    fn summed_values(&self, feature_type: Option<&str>, tag: Option<&str>) -> Vec<i32> {
        let matches = |def: &FeatureDefinition| {
            feature_type.is_none_or(|t| def.feature_type == t)
                && tag.is_none_or(|t| def.tags.contains(t))
        };
        self.character
            .ruleset()
            .features()
            .filter(|def| matches(def))
            .map(|def| {
                self.character
                    .controller(&PropExpression::new(def.id.as_str()))
                    .map_or(0, |node| node.value())
            })
            .collect()
    }
}

impl PropertyController for AttributeController<'_> {
    fn full_id(&self) -> &str {
        &self.full_id
    }

    fn value(&self) -> i32 {
        self.character.cached_value(&self.full_id, || {
            let Some(attribute) = self.attribute else {
                return self.granted();
            };
            match &attribute.kind {
                AttributeKind::Stored => attribute.default_value + self.granted(),
                AttributeKind::Sum { feature_type, tag } => self
                    .summed_values(feature_type.as_deref(), tag.as_deref())
                    .into_iter()
                    .sum(),
                AttributeKind::Currency => self.character.currency_balance(&attribute.id),
            }
        })
    }

    fn max_value(&self) -> i32 {
        match self.attribute.map(|a| &a.kind) {
            Some(AttributeKind::Sum { feature_type, tag }) => self
                .summed_values(feature_type.as_deref(), tag.as_deref())
                .into_iter()
                .max()
                .unwrap_or(0),
            _ => self.value(),
        }
    }
}
