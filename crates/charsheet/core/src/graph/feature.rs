//! Concrete feature controller.

use std::collections::{BTreeMap, BTreeSet};

use super::propagation::{Outbound, PropagationData};
use super::template::OptionTemplateController;
use super::{FeatureNode, PropertyController};
use crate::choice::ChoiceController;
use crate::cost;
use crate::decision::Decision;
use crate::engine::CharacterController;
use crate::expr::PropExpression;
use crate::ruleset::{Discount, FeatureDefinition};
use crate::state::FeatureModel;

/// A feature, or one option instance of an option-bearing feature.
#[derive(Clone)]
pub struct FeatureController<'c> {
    character: &'c CharacterController,
    definition: &'c FeatureDefinition,
    expr: PropExpression,
    full_id: String,
}

impl<'c> FeatureController<'c> {
    pub(crate) fn new(
        character: &'c CharacterController,
        definition: &'c FeatureDefinition,
        expr: &PropExpression,
    ) -> Self {
        let expr = PropExpression {
            attribute: None,
            slot: None,
            ..expr.identity()
        };
        let full_id = expr.full_id();
        Self {
            character,
            definition,
            expr,
            full_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.full_id
    }

    pub fn expression(&self) -> &PropExpression {
        &self.expr
    }

    pub fn option(&self) -> Option<&str> {
        self.expr.option.as_deref()
    }

    /// Display name, with the option in brackets.
    pub fn name(&self) -> String {
        match self.option() {
            Some(option) => format!("{} [{option}]", self.definition.name),
            None => self.definition.name.clone(),
        }
    }

    pub fn model(&self) -> Option<&'c FeatureModel> {
        let character: &'c CharacterController = self.character;
        character.model().features.get(&self.full_id)
    }

    fn flag(&self, read: impl Fn(&FeatureModel) -> bool) -> bool {
        self.model().is_some_and(read)
    }

    pub fn is_suppressed(&self) -> bool {
        self.flag(|m| m.plot_suppressed)
    }

    pub fn is_plot_free(&self) -> bool {
        self.flag(|m| m.plot_free)
    }

    pub fn is_plot_added(&self) -> bool {
        self.flag(|m| m.plot_added)
    }

    pub fn player_can_remove(&self) -> bool {
        self.model().is_none_or(|m| m.player_can_remove)
    }

    pub fn notes(&self) -> Option<&'c str> {
        self.model().and_then(|m| m.notes.as_deref())
    }

    /// Currency charged for this feature, if it has a cost at all.
    pub fn currency(&self) -> Option<&'c str> {
        let character: &'c CharacterController = self.character;
        self.definition.cost.as_ref()?;
        Some(
            self.definition
                .currency
                .as_deref()
                .unwrap_or(&character.config().default_currency),
        )
    }

    /// Inbound discounts. An option instance also receives discounts aimed
    /// at its feature as a whole.
    pub fn discounts(&self) -> Vec<Discount> {
        let store = self.character.propagation();
        let mut discounts = store.discounts(&self.full_id);
        if self.option().is_some() {
            discounts.extend(store.discounts(&self.expr.prop));
        }
        discounts
    }

    /// Undiscounted price of the first `ranks` ranks.
    pub fn cost_for(&self, ranks: i32) -> i32 {
        self.definition
            .cost
            .as_ref()
            .map_or(0, |cost| cost::cost_for(cost, ranks))
    }

    /// Total charge if `purchased` ranks were bought.
    fn cost_at(&self, purchased: i32) -> i32 {
        if self.is_plot_free() {
            return 0;
        }
        match &self.definition.cost {
            Some(cost) => cost::total_cost(
                cost,
                purchased,
                self.granted_ranks(),
                self.max_ranks(),
                &self.discounts(),
            ),
            None => 0,
        }
    }

    pub fn template(&self) -> Option<OptionTemplateController<'c>> {
        let option_def = self.definition.option_def.as_ref()?;
        Some(OptionTemplateController::new(
            self.character,
            self.definition,
            option_def,
        ))
    }

    /// Options held across this feature's instances; empty without options.
    pub fn taken_options(&self) -> BTreeMap<String, i32> {
        self.template()
            .map(|template| template.taken_options())
            .unwrap_or_default()
    }

    pub fn available_options(&self) -> BTreeSet<String> {
        self.template()
            .map(|template| template.available_options())
            .unwrap_or_default()
    }

    /// Feature requirements plus any requirement attached to this option.
    pub fn meets_requirements(&self) -> Decision {
        if let Some(requires) = &self.definition.requires {
            let decision = requires.evaluate(self.character);
            if !decision.success {
                return decision;
            }
        }
        let option_requires = self
            .definition
            .option_def
            .as_ref()
            .zip(self.option())
            .and_then(|(def, option)| def.requires.get(option));
        match option_requires {
            Some(requires) => requires.evaluate(self.character),
            None => Decision::OK,
        }
    }

    /// Whether this instance's option may be taken.
    fn check_option(&self) -> Decision {
        let Some(template) = self.template() else {
            return match self.option() {
                Some(_) => Decision::fail(format!(
                    "{} does not accept options",
                    self.definition.name
                )),
                None => Decision::OK,
            };
        };
        let Some(option) = self.option() else {
            return Decision {
                needs_option: true,
                ..Decision::fail(format!("{} requires an option", self.definition.name))
            };
        };
        if self.purchased_ranks() > 0 || self.value() > 0 {
            return Decision::OK;
        }

        let option_def = template.option_def();
        let listed = template.declared_options().contains(option);
        if !listed && !option_def.freeform {
            return Decision::fail(format!(
                "'{option}' is not a valid option for {}",
                self.definition.name
            ));
        }
        if !listed && !is_valid_freeform(option) {
            return Decision::fail(format!(
                "'{option}' may only contain letters, digits, spaces and dashes"
            ));
        }
        if !template.can_take_new_option() {
            return Decision::fail(format!(
                "Can't take a new option for {}: the maximum number of options has been reached",
                self.definition.name
            ));
        }
        Decision::OK
    }

    fn check_currency(&self, ranks: i32) -> Decision {
        let Some(currency) = self.currency() else {
            return Decision::OK.with_amount(ranks);
        };
        let purchased = self.purchased_ranks();
        let current = self.cost();
        let price = |extra: i32| self.cost_at(purchased.saturating_add(extra)) - current;

        let delta = price(ranks);
        if delta <= 0 || !self.character.config().enforce_currency {
            return Decision::OK.with_amount(ranks);
        }
        let balance = self.character.currency_balance(currency);
        if delta <= balance {
            return Decision::OK.with_amount(ranks);
        }
        let affordable = (0..ranks).rev().find(|n| price(*n) <= balance).unwrap_or(0);
        Decision::fail(format!(
            "Need {delta} {currency} for {ranks} rank(s) of {}, but only have {balance}",
            self.name()
        ))
        .with_amount(affordable)
        .with_need_currency(currency, delta)
    }

    /// Choice controllers for this feature. Empty while it has no ranks.
    pub fn choices(&self) -> Vec<ChoiceController<'c>> {
        if self.value() <= 0 {
            return Vec::new();
        }
        self.definition
            .choices
            .iter()
            .map(|(id, def)| ChoiceController::new(self.character, self, id, def))
            .collect()
    }

    pub fn choice(&self, id: &str) -> Option<ChoiceController<'c>> {
        if self.value() <= 0 {
            return None;
        }
        let (id, def) = self.definition.choices.get_key_value(id)?;
        Some(ChoiceController::new(self.character, self, id, def))
    }

    /// Grants and discounts this feature currently pushes to others.
    pub(crate) fn outbound_records(&self) -> Vec<PropagationData> {
        let value = self.value();
        let mut outbound = Outbound::default();
        let definition = self.definition;

        let mut grants = BTreeMap::new();
        if let Some(granted) = &definition.grants {
            granted.collect(value, &mut grants);
        }
        for (_, granted) in definition
            .rank_grants
            .range(..=u32::try_from(value).unwrap_or(0))
        {
            granted.collect(value, &mut grants);
        }
        for conditional in &definition.grant_if {
            if conditional.requires.evaluate(self.character).success {
                conditional.grants.collect(value, &mut grants);
            }
        }
        for (target, amount) in grants {
            outbound.grant(target, amount);
        }
        for (target, discount) in &definition.discounts {
            outbound.discount(target.full_id(), *discount);
        }
        for choice in self.choices() {
            choice.contribute(&mut outbound);
        }
        outbound.into_records(&self.full_id, value > 0)
    }

    /// Per-feature consistency check used by whole-character validation.
    pub fn validate(&self) -> Decision {
        if self.paid_ranks() > 0 && !self.is_plot_added() {
            let decision = self.meets_requirements();
            if !decision.success {
                return Decision::fail(format!(
                    "{} no longer meets its requirements: {}",
                    self.name(),
                    decision.reason_str()
                ));
            }
        }
        for choice in self.choices() {
            let decision = choice.validate();
            if !decision.success {
                return decision;
            }
        }
        Decision::OK
    }
}

impl PropertyController for FeatureController<'_> {
    fn full_id(&self) -> &str {
        &self.full_id
    }

    fn value(&self) -> i32 {
        self.character.cached_value(&self.full_id, || {
            if self.is_suppressed() {
                return 0;
            }
            self.purchased_ranks()
                .saturating_add(self.granted_ranks())
                .min(self.max_ranks())
                .max(0)
        })
    }
}

impl FeatureNode for FeatureController<'_> {
    fn definition(&self) -> &FeatureDefinition {
        self.definition
    }

    fn purchased_ranks(&self) -> i32 {
        self.model().map_or(0, |m| m.ranks)
    }

    fn granted_ranks(&self) -> i32 {
        self.character.propagation().granted(&self.full_id)
    }

    fn paid_ranks(&self) -> i32 {
        cost::paid_ranks(self.purchased_ranks(), self.granted_ranks(), self.max_ranks())
    }

    fn max_ranks(&self) -> i32 {
        self.definition
            .max_ranks(self.character.config().unlimited_ranks)
    }

    fn cost(&self) -> i32 {
        self.character
            .cached_cost(&self.full_id, || self.cost_at(self.purchased_ranks()))
    }

    fn can_increase(&self, ranks: i32) -> Decision {
        let name = self.name();
        if ranks <= 0 {
            return Decision::fail(format!("Must increase {name} by at least one rank"));
        }
        if self.is_suppressed() {
            return Decision::fail(format!("{name} is suppressed"));
        }
        let max = self.max_ranks();
        let purchaseable = max - self.value();
        if purchaseable <= 0 {
            return Decision::fail(format!("{name} is already at its maximum of {max}"))
                .with_amount(0);
        }
        if ranks > purchaseable {
            return Decision::fail(format!(
                "Max is {max}, so {name} can't increase to {}",
                self.value().saturating_add(ranks)
            ))
            .with_amount(purchaseable);
        }

        let requirements = self.meets_requirements();
        if !requirements.success {
            return requirements;
        }
        let option = self.check_option();
        if !option.success {
            return option;
        }
        self.check_currency(ranks)
    }

    fn can_decrease(&self, ranks: i32) -> Decision {
        let name = self.name();
        if ranks <= 0 {
            return Decision::fail(format!("Must decrease {name} by at least one rank"));
        }
        let purchased = self.purchased_ranks();
        if ranks > purchased {
            return Decision::fail(format!(
                "Can't sell back {ranks} ranks of {name} when only {purchased} were purchased"
            ))
            .with_amount(purchased);
        }
        if self.is_plot_added() && !self.player_can_remove() {
            return Decision::fail(format!("{name} was added by plot and can't be removed"));
        }
        if self.granted_ranks() >= self.max_ranks() {
            return Decision::fail(format!("{name} is already fully refunded"));
        }
        Decision::OK.with_amount(ranks)
    }

    fn explain(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let purchased = self.purchased_ranks();
        if purchased > 0 {
            lines.push(format!("Purchased: {purchased}"));
        }
        for source in self.character.propagation().sources(&self.full_id) {
            if source.grants != 0 {
                lines.push(format!("Granted by {}: {}", source.source, source.grants));
            }
            for discount in &source.discounts {
                lines.push(format!(
                    "Discount from {}: {} (minimum {})",
                    source.source, discount.discount, discount.minimum
                ));
            }
        }
        if self.is_suppressed() {
            lines.push("Suppressed".to_owned());
        }
        if self.is_plot_free() {
            lines.push("No cost".to_owned());
        }
        lines
    }
}

/// Freeform option text: letters, digits, spaces and dashes, not blank.
fn is_valid_freeform(option: &str) -> bool {
    !option.trim().is_empty()
        && option.trim() == option
        && option
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeform_text_is_restricted() {
        assert!(is_valid_freeform("Old Gods"));
        assert!(is_valid_freeform("half-elf"));
        assert!(!is_valid_freeform(""));
        assert!(!is_valid_freeform(" padded "));
        assert!(!is_valid_freeform("semi;colon"));
        assert!(!is_valid_freeform("under_score"));
    }
}
