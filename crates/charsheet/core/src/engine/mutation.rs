//! Mutation requests accepted by [`CharacterController::apply`].

use serde::{Deserialize, Serialize};

use super::CharacterController;
use crate::decision::Decision;
use crate::error::{InternalFault, RequestError};
use crate::expr::PropExpression;
use crate::ruleset::Ruleset;

/// One change to a character, in serializable form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mutation {
    Rank(RankMutation),
    Choice(ChoiceMutation),
    Note(NoteMutation),
    Plot(PlotMutation),
}

/// Buy (positive) or sell back (negative) ranks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankMutation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    #[serde(default = "one")]
    pub ranks: i32,
}

/// Add or remove one selection of a choice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceMutation {
    pub id: String,
    pub choice: String,
    pub value: String,
    #[serde(default)]
    pub remove: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMutation {
    pub id: String,
    pub note: String,
}

/// Privileged edit made by game staff rather than the player.
///
/// `ranks` is added to the purchased ranks without any purchase checks; the
/// result must stay within `0..=max_ranks`. Fields left as `None` are not
/// touched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotMutation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranks: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_applies: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_can_remove: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_note: Option<String>,
}

fn one() -> i32 {
    1
}

impl Mutation {
    pub fn rank(id: impl Into<String>, ranks: i32) -> Self {
        Self::Rank(RankMutation {
            id: id.into(),
            option: None,
            ranks,
        })
    }

    pub fn rank_with_option(id: impl Into<String>, option: impl Into<String>, ranks: i32) -> Self {
        Self::Rank(RankMutation {
            id: id.into(),
            option: Some(option.into()),
            ranks,
        })
    }

    pub fn choose(
        id: impl Into<String>,
        choice: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Choice(ChoiceMutation {
            id: id.into(),
            choice: choice.into(),
            value: value.into(),
            remove: false,
        })
    }

    pub fn unchoose(
        id: impl Into<String>,
        choice: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Choice(ChoiceMutation {
            id: id.into(),
            choice: choice.into(),
            value: value.into(),
            remove: true,
        })
    }

    pub fn note(id: impl Into<String>, note: impl Into<String>) -> Self {
        Self::Note(NoteMutation {
            id: id.into(),
            note: note.into(),
        })
    }

    pub fn plot(plot: PlotMutation) -> Self {
        Self::Plot(plot)
    }

    /// Discriminant name, e.g. `"rank"`.
    pub fn kind(&self) -> &str {
        self.as_ref()
    }

    /// Feature the mutation is aimed at.
    pub fn target_id(&self) -> &str {
        match self {
            Self::Rank(m) => &m.id,
            Self::Choice(m) => &m.id,
            Self::Note(m) => &m.id,
            Self::Plot(m) => &m.id,
        }
    }

    /// One-line human description, using display names from `ruleset`.
    pub fn describe(&self, ruleset: &Ruleset) -> String {
        let name = |id: &str| {
            ruleset
                .feature(id)
                .map_or_else(|| id.to_owned(), |def| def.name.clone())
        };
        match self {
            Self::Rank(m) => {
                let target = match &m.option {
                    Some(option) => format!("{} [{option}]", name(&m.id)),
                    None => name(&m.id),
                };
                if m.ranks >= 0 {
                    format!("Add {} rank(s) of {target}", m.ranks)
                } else {
                    format!("Remove {} rank(s) of {target}", m.ranks.unsigned_abs())
                }
            }
            Self::Choice(m) if m.remove => {
                format!("Unchoose {} for {} of {}", name(&m.value), m.choice, name(&m.id))
            }
            Self::Choice(m) => {
                format!("Choose {} for {} of {}", name(&m.value), m.choice, name(&m.id))
            }
            Self::Note(m) => format!("Update note on {}", name(&m.id)),
            Self::Plot(m) => format!("Plot edit of {}", name(&m.id)),
        }
    }
}

impl RankMutation {
    /// Target expression with the option folded in.
    pub fn expression(&self) -> Result<PropExpression, RequestError> {
        let expr = PropExpression::parse(&self.id)?;
        Ok(match &self.option {
            Some(option) => expr.with_option(option.as_str()),
            None => expr,
        })
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Stage of the mutation pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationPhase {
    PreValidate,
    Apply,
    PostValidate,
}

impl MutationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationPhase::PreValidate => "pre_validate",
            MutationPhase::Apply => "apply",
            MutationPhase::PostValidate => "post_validate",
        }
    }
}

/// A mutation variant that can be driven through the pipeline.
pub(crate) trait MutationTransition {
    /// Structural checks that need no state change.
    fn pre_validate(&self, character: &CharacterController) -> Result<(), RequestError>;

    /// Performs the change. A failed [`Decision`] means nothing was changed.
    fn apply(&self, character: &mut CharacterController) -> Result<Decision, InternalFault>;
}

impl MutationTransition for RankMutation {
    fn pre_validate(&self, character: &CharacterController) -> Result<(), RequestError> {
        if self.ranks == 0 {
            return Err(RequestError::ZeroRanks {
                id: self.id.clone(),
            });
        }
        if self.ranks.checked_neg().is_none() {
            return Err(RequestError::RankOutOfRange {
                id: self.id.clone(),
                ranks: self.ranks,
            });
        }
        character.node(&self.expression()?).map(drop)
    }

    fn apply(&self, character: &mut CharacterController) -> Result<Decision, InternalFault> {
        let expr = match self.expression() {
            Ok(expr) => expr,
            Err(error) => return Ok(error.into()),
        };
        if self.ranks > 0 {
            return character.increase_ranks(&expr, self.ranks);
        }
        match self.ranks.checked_neg() {
            Some(sold) => character.decrease_ranks(&expr, sold),
            None => Ok(RequestError::RankOutOfRange {
                id: self.id.clone(),
                ranks: self.ranks,
            }
            .into()),
        }
    }
}

impl MutationTransition for ChoiceMutation {
    fn pre_validate(&self, character: &CharacterController) -> Result<(), RequestError> {
        character.choice(&self.id, &self.choice).map(drop)
    }

    fn apply(&self, character: &mut CharacterController) -> Result<Decision, InternalFault> {
        if self.remove {
            character.remove_choice(&self.id, &self.choice, &self.value)
        } else {
            character.add_choice(&self.id, &self.choice, &self.value)
        }
    }
}

impl MutationTransition for NoteMutation {
    fn pre_validate(&self, character: &CharacterController) -> Result<(), RequestError> {
        character.feature(&self.id).map(drop)
    }

    fn apply(&self, character: &mut CharacterController) -> Result<Decision, InternalFault> {
        character.set_note(&self.id, &self.note)
    }
}

impl MutationTransition for PlotMutation {
    fn pre_validate(&self, character: &CharacterController) -> Result<(), RequestError> {
        if self.ranks == Some(0) {
            return Err(RequestError::ZeroRanks {
                id: self.id.clone(),
            });
        }
        character.feature(&self.id).map(drop)
    }

    fn apply(&self, character: &mut CharacterController) -> Result<Decision, InternalFault> {
        character.apply_plot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_use_a_type_tag() {
        let json = serde_json::to_value(Mutation::choose("mage", "school", "fire")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "choice", "id": "mage", "choice": "school", "value": "fire", "remove": false
            })
        );

        let parsed: Mutation =
            serde_json::from_value(serde_json::json!({"type": "rank", "id": "lore"})).unwrap();
        assert_eq!(parsed, Mutation::rank("lore", 1));
        assert_eq!(parsed.kind(), "rank");
    }

    #[test]
    fn rank_expression_folds_in_option() {
        let Mutation::Rank(rank) = Mutation::rank_with_option("lore", "Old Gods", 2) else {
            panic!("expected a rank mutation");
        };
        assert_eq!(rank.expression().unwrap().full_id(), "lore+Old_Gods");
    }

    #[test]
    fn phase_names() {
        assert_eq!(MutationPhase::PostValidate.as_str(), "post_validate");
    }
}
