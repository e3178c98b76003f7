//! Mutation dispatch with snapshot, validation and rollback.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use super::CharacterController;
use super::mutation::{Mutation, MutationPhase, MutationTransition};
use crate::decision::Decision;
use crate::error::InternalFault;
use crate::graph::PropagationStore;
use crate::state::CharacterModel;

/// Runs one transition through its three phases.
///
/// Phases:
/// 1. `pre_validate` - structural checks, nothing changes
/// 2. `apply` - the local edit and its reconcile
/// 3. `post_validate` - whole-character validation of the result
fn drive_transition<T>(
    transition: &T,
    character: &mut CharacterController,
) -> (MutationPhase, Decision)
where
    T: MutationTransition,
{
    if let Err(error) = transition.pre_validate(character) {
        return (MutationPhase::PreValidate, error.into());
    }

    let decision = match transition.apply(character) {
        Ok(decision) => decision,
        Err(fault) => return (MutationPhase::Apply, fault.into()),
    };
    if !decision.success {
        return (MutationPhase::Apply, decision);
    }

    let validation = character.validate();
    if !validation.success {
        return (MutationPhase::PostValidate, validation);
    }
    (MutationPhase::PostValidate, decision)
}

fn dispatch(mutation: &Mutation, character: &mut CharacterController) -> (MutationPhase, Decision) {
    match mutation {
        Mutation::Rank(transition) => drive_transition(transition, character),
        Mutation::Choice(transition) => drive_transition(transition, character),
        Mutation::Note(transition) => drive_transition(transition, character),
        Mutation::Plot(transition) => drive_transition(transition, character),
    }
}

/// Everything needed to put a character back exactly as it was.
struct Snapshot {
    model: CharacterModel,
    propagation: PropagationStore,
}

impl CharacterController {
    /// Applies `mutation` atomically: either it succeeds and the result is
    /// valid, or the character is left exactly as it was.
    pub fn apply(&mut self, mutation: &Mutation) -> Decision {
        self.run(mutation, false)
    }

    /// Evaluates `mutation` the same way [`apply`](Self::apply) does, then
    /// always restores the character.
    pub fn dry_run(&mut self, mutation: &Mutation) -> Decision {
        self.run(mutation, true)
    }

    fn run(&mut self, mutation: &Mutation, dry_run: bool) -> Decision {
        let span = tracing::debug_span!(
            "mutation",
            kind = mutation.kind(),
            id = mutation.target_id(),
            dry_run
        );
        let _enter = span.enter();

        let snapshot = Snapshot {
            model: self.model.clone(),
            propagation: self.propagation.clone(),
        };

        let (phase, mut decision) =
            match panic::catch_unwind(AssertUnwindSafe(|| dispatch(mutation, self))) {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let fault = InternalFault::Panicked {
                        phase: "dispatch",
                        message: panic_message(payload.as_ref()),
                    };
                    (MutationPhase::Apply, fault.into())
                }
            };

        if !decision.success || dry_run {
            self.model = snapshot.model;
            self.propagation = snapshot.propagation;
            self.invalidate();
            if decision.success {
                tracing::debug!(phase = phase.as_str(), "dry run restored");
            } else {
                tracing::warn!(
                    phase = phase.as_str(),
                    reason = decision.reason_str(),
                    "mutation rolled back"
                );
                decision.mutation_applied = false;
            }
        } else {
            tracing::debug!(applied = decision.mutation_applied, "mutation committed");
        }

        if dry_run {
            decision.mutation_applied = false;
        }
        if !self.config().capture_trace {
            decision = decision.without_trace();
        }
        decision
    }

    // ===== convenience wrappers =====

    /// Buys `ranks` ranks of `id` (which may carry a `+option`). `ranks`
    /// must be positive.
    pub fn increase(&mut self, id: &str, ranks: i32) -> Decision {
        if ranks <= 0 {
            return self.refuse(Decision::fail(format!(
                "Must increase {id} by at least one rank"
            )));
        }
        self.apply(&Mutation::rank(id, ranks))
    }

    fn refuse(&self, decision: Decision) -> Decision {
        if self.config().capture_trace {
            decision
        } else {
            decision.without_trace()
        }
    }

    /// Sells back `ranks` ranks of `id`. `ranks` must be positive.
    pub fn decrease(&mut self, id: &str, ranks: i32) -> Decision {
        match ranks.checked_neg().filter(|delta| *delta < 0) {
            Some(delta) => self.apply(&Mutation::rank(id, delta)),
            None => self.refuse(Decision::fail(format!(
                "Must decrease {id} by at least one rank"
            ))),
        }
    }

    pub fn choose(&mut self, id: &str, choice: &str, selection: &str) -> Decision {
        self.apply(&Mutation::choose(id, choice, selection))
    }

    pub fn unchoose(&mut self, id: &str, choice: &str, selection: &str) -> Decision {
        self.apply(&Mutation::unchoose(id, choice, selection))
    }

    /// Human description of `mutation` against this character's ruleset.
    pub fn describe(&self, mutation: &Mutation) -> String {
        mutation.describe(self.ruleset())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
