//! Choices: bounded sub-selections a feature offers once it has ranks.

pub mod strategy;

pub use strategy::{
    MatchStrategy, StrategyArgs, StrategyContext, StrategyError, StrategyFactory, StrategyRegistry,
};

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::decision::Decision;
use crate::engine::CharacterController;
use crate::graph::propagation::Outbound;
use crate::graph::{FeatureController, PropertyController};
use crate::ruleset::{ChoiceDef, FeatureDefinition, Limit};

/// One choice of one owning feature.
pub struct ChoiceController<'c> {
    character: &'c CharacterController,
    owner_id: String,
    owner_prop: String,
    owner_value: i32,
    id: &'c str,
    definition: &'c ChoiceDef,
    strategy: Option<&'c Arc<dyn MatchStrategy>>,
}

impl<'c> ChoiceController<'c> {
    pub(crate) fn new(
        character: &'c CharacterController,
        owner: &FeatureController<'c>,
        id: &'c str,
        definition: &'c ChoiceDef,
    ) -> Self {
        let ruleset = character.ruleset();
        let owner_prop = owner.expression().prop.clone();
        Self {
            character,
            owner_id: owner.id().to_owned(),
            strategy: ruleset.strategy(&owner_prop, id),
            owner_prop,
            owner_value: owner.value(),
            id,
            definition,
        }
    }

    pub fn id(&self) -> &'c str {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn definition(&self) -> &'c ChoiceDef {
        self.definition
    }

    /// Selections allowed in total, `None` when unlimited.
    pub fn limit(&self) -> Option<i32> {
        match self.definition.limit {
            Limit::Unlimited => None,
            Limit::Count(n) => {
                let n = i32::try_from(n).unwrap_or(i32::MAX);
                Some(if self.definition.limit_is_per_rank {
                    n.saturating_mul(self.owner_value)
                } else {
                    n
                })
            }
        }
    }

    pub fn taken(&self) -> &'c [String] {
        let character: &'c CharacterController = self.character;
        character
            .model()
            .features
            .get(&self.owner_id)
            .and_then(|m| m.choices.get(self.id))
            .map_or(&[], Vec::as_slice)
    }

    /// Selections left, `None` when unlimited. Zero while the choice's own
    /// requirement is unmet.
    pub fn remaining(&self) -> Option<i32> {
        if !self.is_active() {
            return Some(0);
        }
        let taken = i32::try_from(self.taken().len()).unwrap_or(i32::MAX);
        self.limit().map(|limit| limit - taken)
    }

    pub fn meets_requirements(&self) -> Decision {
        match &self.definition.requires {
            Some(requires) => requires.evaluate(self.character),
            None => Decision::OK,
        }
    }

    /// Whether selections currently take effect. Selections stay stored
    /// while the requirement is unmet but give nothing.
    pub fn is_active(&self) -> bool {
        self.meets_requirements().success
    }

    /// Whether `candidate` passes the matcher and strategy. Option-bearing
    /// features and the owner itself never qualify.
    pub fn is_candidate(&self, candidate: &FeatureDefinition) -> bool {
        if candidate.option_def.is_some() || candidate.id == self.owner_prop {
            return false;
        }
        if self
            .definition
            .matcher
            .as_ref()
            .is_some_and(|matcher| !matcher.matches(candidate))
        {
            return false;
        }
        let Some(strategy) = self.strategy else {
            return true;
        };
        let ctx = StrategyContext {
            surface: self.character,
            ruleset: self.character.ruleset(),
            flags: &self.character.model().metadata.flags,
            owner: &self.owner_id,
            taken: self.taken(),
        };
        strategy.accepts(&ctx, candidate)
    }

    /// Feature ids that may be chosen right now.
    pub fn available_choices(&self) -> BTreeSet<String> {
        if self.remaining().is_some_and(|r| r <= 0) {
            return BTreeSet::new();
        }
        let taken = self.taken();
        self.character
            .ruleset()
            .features()
            .filter(|def| self.definition.multi || !taken.contains(&def.id))
            .filter(|def| self.is_candidate(def))
            .map(|def| def.id.clone())
            .collect()
    }

    pub fn can_choose(&self, selection: &str) -> Decision {
        let requirements = self.meets_requirements();
        if !requirements.success {
            return requirements;
        }
        if !self.definition.multi && self.taken().iter().any(|t| t == selection) {
            return Decision::fail(format!("{selection} has already been chosen"));
        }
        if self.remaining().is_some_and(|r| r <= 0) {
            return Decision::fail(format!("No {} choices remain", self.definition.name))
                .with_amount(0);
        }
        if !self.available_choices().contains(selection) {
            return Decision::fail(format!(
                "{selection} is not a valid choice for {}",
                self.definition.name
            ));
        }
        Decision::OK
    }

    pub fn can_unchoose(&self, selection: &str) -> Decision {
        if self.taken().iter().any(|t| t == selection) {
            Decision::OK
        } else {
            Decision::fail(format!(
                "{selection} has not been chosen for {}",
                self.definition.name
            ))
        }
    }

    /// Each selection is granted one rank, or discounted if the choice
    /// defines a discount.
    pub(crate) fn contribute(&self, outbound: &mut Outbound) {
        if !self.is_active() {
            return;
        }
        for selection in self.taken() {
            match self.definition.discount {
                Some(discount) => outbound.discount(selection.as_str(), discount),
                None => outbound.grant(selection.as_str(), 1),
            }
        }
    }

    pub fn validate(&self) -> Decision {
        if !self.is_active() {
            return Decision::OK;
        }
        let taken = i32::try_from(self.taken().len()).unwrap_or(i32::MAX);
        match self.limit() {
            Some(limit) if taken > limit => Decision::fail(format!(
                "{} has {taken} selections for {} but only {limit} are allowed",
                self.owner_id, self.definition.name
            )),
            _ => Decision::OK,
        }
    }
}
