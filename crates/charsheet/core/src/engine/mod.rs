//! Character creation, loading and the mutation pipeline.
//!
//! The [`Engine`] holds the shared, immutable ruleset and configuration and
//! hands out one [`CharacterController`] per character. Every change to a
//! character flows through [`CharacterController::apply`]:
//! pre_validate → apply → post_validate, with automatic rollback when any
//! phase fails.

mod character;
mod mutation;
mod ops;
mod reconcile;
mod transition;

pub use character::CharacterController;
pub use mutation::{
    ChoiceMutation, Mutation, MutationPhase, NoteMutation, PlotMutation, RankMutation,
};
pub use reconcile::PLOT_SOURCE;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{InternalFault, LoadError};
use crate::ruleset::{Ruleset, compare_versions};
use crate::state::{CharacterMetadata, CharacterModel};

/// Entry point shared by every character built against one ruleset.
#[derive(Clone, Debug)]
pub struct Engine {
    ruleset: Arc<Ruleset>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(ruleset: Ruleset) -> Self {
        Self::with_config(ruleset, EngineConfig::default())
    }

    pub fn with_config(ruleset: Ruleset, config: EngineConfig) -> Self {
        Self {
            ruleset: Arc::new(ruleset),
            config,
        }
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A blank character stamped with this ruleset's id and version.
    pub fn new_character(
        &self,
        metadata: CharacterMetadata,
    ) -> Result<CharacterController, InternalFault> {
        let model = CharacterModel {
            ruleset_id: self.ruleset.id().to_owned(),
            ruleset_version: self.ruleset.version().to_owned(),
            metadata,
            features: Default::default(),
        };
        CharacterController::attach(Arc::clone(&self.ruleset), self.config.clone(), model)
    }

    /// Attaches a saved model. Models from another ruleset, or from a newer
    /// version of this one, are rejected.
    pub fn load_character(&self, model: CharacterModel) -> Result<CharacterController, LoadError> {
        if model.ruleset_id != self.ruleset.id() {
            return Err(LoadError::RulesetMismatch {
                expected: self.ruleset.id().to_owned(),
                found: model.ruleset_id,
            });
        }
        if compare_versions(&model.ruleset_version, self.ruleset.version()) == Ordering::Greater {
            return Err(LoadError::VersionTooNew {
                loaded: self.ruleset.version().to_owned(),
                found: model.ruleset_version,
            });
        }
        let mut model = model;
        model.ruleset_version = self.ruleset.version().to_owned();
        tracing::debug!(
            ruleset = self.ruleset.id(),
            features = model.features.len(),
            "loading character"
        );
        Ok(CharacterController::attach(
            Arc::clone(&self.ruleset),
            self.config.clone(),
            model,
        )?)
    }

    /// Like [`load_character`](Self::load_character), from the generic
    /// structured form produced by [`CharacterController::dump_value`].
    pub fn load_character_value(
        &self,
        value: serde_json::Value,
    ) -> Result<CharacterController, LoadError> {
        self.load_character(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choice::StrategyRegistry;
    use crate::graph::{FeatureNode, PropertyController};
    use crate::ruleset::{
        CostDef, Discount, FeatureDefinition, Grantable, Limit, OptionDef,
        RulesetDocument,
    };

    fn feature(id: &str, cost: i32, ranks: u32) -> FeatureDefinition {
        FeatureDefinition {
            cost: Some(CostDef::Flat(cost)),
            ranks: Limit::Count(ranks),
            ..FeatureDefinition::new(id, id, "skill")
        }
    }

    fn engine(features: Vec<FeatureDefinition>) -> Engine {
        let document = RulesetDocument {
            id: "test".into(),
            name: "Test".into(),
            version: "2".into(),
            attributes: Vec::new(),
            features,
        };
        let ruleset = Ruleset::load_strict(document, &StrategyRegistry::with_builtins())
            .expect("test ruleset loads");
        Engine::new(ruleset)
    }

    fn funded(engine: &Engine, cp: i32) -> CharacterController {
        engine
            .new_character(CharacterMetadata::new("Tester").with_award("cp", cp))
            .unwrap()
    }

    #[test]
    fn purchase_spends_currency() {
        let engine = engine(vec![feature("lore", 2, 3)]);
        let mut character = funded(&engine, 5);

        let decision = character.increase("lore", 2);
        assert!(decision.success, "{decision}");
        assert!(decision.mutation_applied);
        assert_eq!(character.value("lore"), 2);
        assert_eq!(character.currency_balance("cp"), 1);

        let decision = character.increase("lore", 1);
        assert!(!decision.success);
        assert_eq!(decision.amount, Some(0));
        assert_eq!(decision.need_currency.get("cp"), Some(&2));
        assert_eq!(character.value("lore"), 2);
    }

    #[test]
    fn failed_mutation_leaves_model_untouched() {
        let engine = engine(vec![feature("lore", 1, 1)]);
        let mut character = funded(&engine, 1);
        let before = character.digest().unwrap();

        let decision = character.increase("lore", 2);
        assert!(!decision.success);
        assert!(!decision.mutation_applied);
        assert_eq!(character.digest().unwrap(), before);
    }

    #[test]
    fn dry_run_always_restores() {
        let engine = engine(vec![feature("lore", 1, 1)]);
        let mut character = funded(&engine, 1);
        let before = character.dump();

        let decision = character.dry_run(&Mutation::rank("lore", 1));
        assert!(decision.success);
        assert!(!decision.mutation_applied);
        assert_eq!(character.dump(), before);
        assert_eq!(character.value("lore"), 0);
    }

    #[test]
    fn grants_follow_their_source() {
        let mut patron = feature("patron", 1, 1);
        patron.grants = Some(Grantable::Expr("lore".parse().unwrap()));
        let engine = engine(vec![patron, feature("lore", 3, 2)]);
        let mut character = funded(&engine, 1);

        assert!(character.increase("patron", 1).success);
        let lore = character.feature("lore").unwrap();
        assert_eq!(lore.value(), 1);
        assert_eq!(lore.cost(), 0);

        assert!(character.decrease("patron", 1).success);
        assert_eq!(character.value("lore"), 0);
        assert!(character.model().features.is_empty());
    }

    #[test]
    fn discounts_reach_their_target() {
        let mut mentor = feature("mentor", 0, 1);
        mentor
            .discounts
            .insert("lore".parse().unwrap(), Discount::new(2));
        let engine = engine(vec![mentor, feature("lore", 3, 2)]);
        let mut character = funded(&engine, 2);

        assert!(character.increase("mentor", 1).success);
        assert!(character.increase("lore", 2).success);
        assert_eq!(character.feature("lore").unwrap().cost(), 2);
        assert_eq!(character.currency_balance("cp"), 0);
    }

    #[test]
    fn zero_rank_request_is_rejected() {
        let engine = engine(vec![feature("lore", 1, 1)]);
        let mut character = funded(&engine, 1);
        let decision = character.apply(&Mutation::rank("lore", 0));
        assert!(!decision.success);
        assert!(decision.reason_str().contains("non-zero"));
        let decision = character.increase("lore", 0);
        assert!(!decision.success);
        assert!(decision.reason_str().contains("at least one rank"));
    }

    #[test]
    fn traces_are_stripped_when_disabled() {
        let document = RulesetDocument {
            id: "test".into(),
            name: "Test".into(),
            version: "1".into(),
            attributes: Vec::new(),
            features: vec![feature("lore", 1, 1)],
        };
        let ruleset = Ruleset::load_strict(document, &StrategyRegistry::default()).unwrap();
        let engine =
            Engine::with_config(ruleset, EngineConfig::default().with_capture_trace(false));
        let mut character = engine.new_character(CharacterMetadata::default()).unwrap();

        let decision = character.increase("lore", 1);
        assert!(!decision.success);
        assert_eq!(decision.amount, Some(0));
        assert!(decision.trace.is_none());
    }

    #[test]
    fn newer_models_are_refused() {
        let engine = engine(Vec::new());
        let model = CharacterModel {
            ruleset_id: "test".into(),
            ruleset_version: "10".into(),
            ..CharacterModel::default()
        };
        assert!(matches!(
            engine.load_character(model),
            Err(LoadError::VersionTooNew { .. })
        ));

        let model = CharacterModel {
            ruleset_id: "other".into(),
            ..CharacterModel::default()
        };
        assert!(matches!(
            engine.load_character(model),
            Err(LoadError::RulesetMismatch { .. })
        ));
    }

    #[test]
    fn template_increase_asks_for_an_option() {
        let mut lore = feature("lore", 1, 1);
        lore.option_def = Some(OptionDef {
            freeform: true,
            ..OptionDef::default()
        });
        let engine = engine(vec![lore]);
        let mut character = funded(&engine, 3);

        let decision = character.increase("lore", 1);
        assert!(!decision.success);
        assert!(decision.needs_option);

        assert!(character.increase("lore+Undead", 1).success);
        let template = character.feature_controller("lore").unwrap();
        assert!(template.is_option_template());
        assert_eq!(template.value(), 1);
    }
}
