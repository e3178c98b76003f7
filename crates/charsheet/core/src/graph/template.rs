//! Option template: the option-less view of an option-bearing feature.

use std::collections::{BTreeMap, BTreeSet};

use super::feature::FeatureController;
use super::{FeatureNode, PropertyController};
use crate::decision::Decision;
use crate::engine::CharacterController;
use crate::expr::PropExpression;
use crate::ruleset::{FeatureDefinition, OptionDef};

/// Aggregates every option instance of one feature. Its value is the sum of
/// the instances and its single-instance value is the best of them.
///
/// A template never pushes grants or discounts of its own.
#[derive(Clone)]
pub struct OptionTemplateController<'c> {
    character: &'c CharacterController,
    definition: &'c FeatureDefinition,
    option_def: &'c OptionDef,
}

impl<'c> OptionTemplateController<'c> {
    pub(crate) fn new(
        character: &'c CharacterController,
        definition: &'c FeatureDefinition,
        option_def: &'c OptionDef,
    ) -> Self {
        Self {
            character,
            definition,
            option_def,
        }
    }

    pub fn option_def(&self) -> &'c OptionDef {
        self.option_def
    }

    /// Controllers for every option the character holds or is granted.
    pub fn instances(&self) -> Vec<FeatureController<'c>> {
        self.character
            .option_instances(&self.definition.id)
            .into_iter()
            .map(|option| {
                let expr = PropExpression::new(self.definition.id.as_str()).with_option(option);
                FeatureController::new(self.character, self.definition, &expr)
            })
            .collect()
    }

    /// Options that currently have a value, with that value.
    pub fn taken_options(&self) -> BTreeMap<String, i32> {
        self.instances()
            .into_iter()
            .filter_map(|instance| {
                let value = instance.value();
                let option = instance.option()?.to_owned();
                (value > 0).then_some((option, value))
            })
            .collect()
    }

    /// Option values the ruleset lists, with `$flag` entries expanded from
    /// the character's flags.
    pub fn declared_options(&self) -> BTreeSet<String> {
        let flags = &self.character.model().metadata.flags;
        let mut options = BTreeSet::new();
        for value in &self.option_def.values {
            match value.strip_prefix('$') {
                Some(flag) => options.extend(flags.get(flag).into_iter().flatten().cloned()),
                None => {
                    options.insert(value.clone());
                }
            }
        }
        options
    }

    /// Listed options not yet taken.
    pub fn available_options(&self) -> BTreeSet<String> {
        let taken = self.taken_options();
        self.declared_options()
            .into_iter()
            .filter(|option| !taken.contains_key(option))
            .collect()
    }

    pub fn can_take_new_option(&self) -> bool {
        self.option_def.multiple.allows(self.taken_options().len())
    }
}

impl PropertyController for OptionTemplateController<'_> {
    fn full_id(&self) -> &str {
        &self.definition.id
    }

    fn value(&self) -> i32 {
        self.character.cached_value(&self.definition.id, || {
            self.instances().iter().map(PropertyController::value).sum()
        })
    }

    fn max_value(&self) -> i32 {
        self.instances()
            .iter()
            .map(PropertyController::value)
            .max()
            .unwrap_or(0)
    }
}

impl FeatureNode for OptionTemplateController<'_> {
    fn definition(&self) -> &FeatureDefinition {
        self.definition
    }

    fn is_option_template(&self) -> bool {
        true
    }

    fn purchased_ranks(&self) -> i32 {
        self.instances().iter().map(FeatureNode::purchased_ranks).sum()
    }

    fn granted_ranks(&self) -> i32 {
        self.instances().iter().map(FeatureNode::granted_ranks).sum()
    }

    fn paid_ranks(&self) -> i32 {
        self.instances().iter().map(FeatureNode::paid_ranks).sum()
    }

    fn max_ranks(&self) -> i32 {
        self.definition
            .max_ranks(self.character.config().unlimited_ranks)
    }

    fn cost(&self) -> i32 {
        self.instances().iter().map(FeatureNode::cost).sum()
    }

    /// Succeeds with `needs_option` when a new option could be taken.
    fn can_increase(&self, ranks: i32) -> Decision {
        if ranks <= 0 {
            return Decision::fail(format!(
                "Must increase {} by at least one rank",
                self.definition.name
            ));
        }
        if let Some(requires) = &self.definition.requires {
            let decision = requires.evaluate(self.character);
            if !decision.success {
                return decision;
            }
        }
        if !self.can_take_new_option() {
            return Decision::fail(format!(
                "Can't take a new option for {}: the maximum number of options has been reached",
                self.definition.name
            ));
        }
        if !self.option_def.freeform && self.available_options().is_empty() {
            return Decision::fail(format!("No options remain for {}", self.definition.name));
        }
        Decision::NEEDS_OPTION
    }

    fn can_decrease(&self, _ranks: i32) -> Decision {
        Decision {
            needs_option: true,
            ..Decision::fail(format!(
                "Choose which option of {} to decrease",
                self.definition.name
            ))
        }
    }

    fn explain(&self) -> Vec<String> {
        self.instances()
            .iter()
            .map(|instance| format!("{}: {}", instance.name(), instance.value()))
            .collect()
    }
}
