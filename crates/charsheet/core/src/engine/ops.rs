//! Local model edits behind each mutation kind.
//!
//! Each operation checks its own preconditions, edits the model, and
//! reconciles the touched feature. Whole-character validation and rollback
//! happen one level up, in the transition pipeline.

use super::CharacterController;
use super::mutation::PlotMutation;
use crate::decision::Decision;
use crate::error::{InternalFault, RequestError};
use crate::expr::PropExpression;
use crate::graph::FeatureNode;

impl CharacterController {
    pub(crate) fn increase_ranks(
        &mut self,
        expr: &PropExpression,
        ranks: i32,
    ) -> Result<Decision, InternalFault> {
        let full_id = {
            let node = match self.node(expr) {
                Ok(node) => node,
                Err(error) => return Ok(error.into()),
            };
            let decision = node.can_increase(ranks);
            if decision.needs_option {
                return Ok(Decision {
                    needs_option: true,
                    ..Decision::fail(format!("Choose an option for {}", node.definition().name))
                });
            }
            if !decision.success {
                return Ok(decision);
            }
            node.full_id().to_owned()
        };

        self.feature_entry(&full_id).ranks += ranks;
        self.reconcile(&full_id)?;
        Ok(Decision::MUTATED.with_amount(self.value(&full_id)))
    }

    pub(crate) fn decrease_ranks(
        &mut self,
        expr: &PropExpression,
        ranks: i32,
    ) -> Result<Decision, InternalFault> {
        let full_id = {
            let node = match self.node(expr) {
                Ok(node) => node,
                Err(error) => return Ok(error.into()),
            };
            let decision = node.can_decrease(ranks);
            if !decision.success {
                return Ok(decision);
            }
            node.full_id().to_owned()
        };

        self.feature_entry(&full_id).ranks -= ranks;
        self.reconcile(&full_id)?;
        Ok(Decision::MUTATED.with_amount(self.value(&full_id)))
    }

    pub(crate) fn add_choice(
        &mut self,
        feature_id: &str,
        choice: &str,
        selection: &str,
    ) -> Result<Decision, InternalFault> {
        let owner = match self.choice(feature_id, choice) {
            Ok(controller) => {
                let decision = controller.can_choose(selection);
                if !decision.success {
                    return Ok(decision);
                }
                controller.owner_id().to_owned()
            }
            Err(error) => return Ok(error.into()),
        };

        self.feature_entry(&owner)
            .choices
            .entry(choice.to_owned())
            .or_default()
            .push(selection.to_owned());
        self.reconcile(&owner)?;
        Ok(Decision::MUTATED)
    }

    pub(crate) fn remove_choice(
        &mut self,
        feature_id: &str,
        choice: &str,
        selection: &str,
    ) -> Result<Decision, InternalFault> {
        let owner = match self.choice(feature_id, choice) {
            Ok(controller) => {
                let decision = controller.can_unchoose(selection);
                if !decision.success {
                    return Ok(decision);
                }
                controller.owner_id().to_owned()
            }
            Err(error) => return Ok(error.into()),
        };

        if let Some(taken) = self.feature_entry(&owner).choices.get_mut(choice) {
            if let Some(index) = taken.iter().rposition(|t| t == selection) {
                taken.remove(index);
            }
        }
        self.reconcile(&owner)?;
        Ok(Decision::MUTATED)
    }

    pub(crate) fn set_note(&mut self, id: &str, note: &str) -> Result<Decision, InternalFault> {
        let full_id = match self.feature(id) {
            Ok(feature) => feature.id().to_owned(),
            Err(error) => return Ok(error.into()),
        };
        self.feature_entry(&full_id).notes = non_empty(note);
        self.reconcile(&full_id)?;
        Ok(Decision::MUTATED)
    }

    pub(crate) fn apply_plot(&mut self, plot: &PlotMutation) -> Result<Decision, InternalFault> {
        let (full_id, purchased, max) = match self.feature(&plot.id) {
            Ok(feature) => (
                feature.id().to_owned(),
                feature.purchased_ranks(),
                feature.max_ranks(),
            ),
            Err(error) => return Ok(error.into()),
        };
        let ranks = match plot.ranks {
            Some(delta) => match purchased.checked_add(delta) {
                Some(ranks) => Some(ranks),
                None => {
                    let error = RequestError::RankOutOfRange {
                        id: full_id,
                        ranks: delta,
                    };
                    return Ok(error.into());
                }
            },
            None => None,
        };
        if let Some(ranks) = ranks {
            if !(0..=max).contains(&ranks) {
                return Ok(Decision::fail(format!(
                    "Plot can't set {full_id} to {ranks} ranks: must be between 0 and {max}"
                ))
                .with_amount(ranks.clamp(0, max) - purchased));
            }
        }

        let entry = self.feature_entry(&full_id);
        if let (Some(ranks), Some(delta)) = (ranks, plot.ranks) {
            entry.ranks = ranks;
            entry.plot_added = ranks > 0;
            if delta > 0 && plot.cost_applies.is_none() {
                entry.plot_free = true;
            }
        }
        if let Some(suppress) = plot.suppress {
            entry.plot_suppressed = suppress;
        }
        if let Some(cost_applies) = plot.cost_applies {
            entry.plot_free = !cost_applies;
        }
        if let Some(player_can_remove) = plot.player_can_remove {
            entry.player_can_remove = player_can_remove;
        }
        if let Some(note) = &plot.plot_note {
            entry.plot_notes = non_empty(note);
        }
        if let Some(note) = &plot.player_note {
            entry.notes = non_empty(note);
        }
        self.reconcile(&full_id)?;
        Ok(Decision::MUTATED)
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_owned())
}
