//! Internal faults: runaway propagation and panics roll the character back.

mod common;

use std::sync::Arc;

use charsheet_core::{
    CharacterMetadata, CharacterModel, Engine, EngineConfig, FeatureDefinition, InternalFault,
    LoadError, MatchStrategy, Ruleset, StrategyContext, StrategyRegistry,
};
use serde_json::json;

/// `echo` and `answer` grant each other one rank per rank held, so any
/// purchase feeds back until the depth guard trips.
fn feedback_ruleset(registry: &StrategyRegistry) -> Ruleset {
    common::init_tracing();
    let report = Ruleset::from_json(
        json!({
            "id": "feedback",
            "name": "Feedback",
            "features": [
                {"id": "plain", "name": "Plain", "type": "skill", "cost": 1},
                {
                    "id": "echo",
                    "name": "Echo",
                    "type": "perk",
                    "ranks": "unlimited",
                    "grants": {"id": "answer", "per_rank": true}
                },
                {
                    "id": "answer",
                    "name": "Answer",
                    "type": "perk",
                    "ranks": "unlimited",
                    "grants": {"id": "echo", "per_rank": true}
                },
                {
                    "id": "fickle",
                    "name": "Fickle",
                    "type": "perk",
                    "choices": {
                        "whim": {"name": "Whim", "strategy": "tantrum"}
                    }
                }
            ]
        }),
        registry,
    )
    .unwrap();
    report.into_result().unwrap()
}

#[derive(Debug)]
struct Tantrum;

impl MatchStrategy for Tantrum {
    fn accepts(&self, _: &StrategyContext<'_>, candidate: &FeatureDefinition) -> bool {
        panic!("refusing to look at {}", candidate.id)
    }
}

fn registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::with_builtins();
    registry.register("tantrum", |_| {
        let strategy: Arc<dyn MatchStrategy> = Arc::new(Tantrum);
        Ok(strategy)
    });
    registry
}

fn feedback_character(engine: &Engine) -> charsheet_core::CharacterController {
    engine
        .new_character(CharacterMetadata::new("Wren").with_award("cp", 5))
        .unwrap()
}

#[test]
fn runaway_propagation_is_rolled_back() {
    let engine = Engine::with_config(
        feedback_ruleset(&registry()),
        EngineConfig::default().with_max_propagation_depth(16),
    );
    let mut character = feedback_character(&engine);
    assert!(character.increase("plain", 2).success);
    let before = character.dump();
    let digest = character.digest().unwrap();

    let decision = character.increase("echo", 1);
    assert!(!decision.success);
    assert!(!decision.mutation_applied);
    assert!(
        decision.reason_str().starts_with("Internal error"),
        "{decision}"
    );
    assert!(decision.reason_str().contains("depth"), "{decision}");

    assert_eq!(character.dump(), before);
    assert_eq!(character.digest().unwrap(), digest);
    assert_eq!(character.value("echo"), 0);
    assert_eq!(character.value("answer"), 0);
    assert_eq!(character.value("plain"), 2);
    assert_eq!(character.currency_balance("cp"), 3);
    assert!(character.validate().success);
}

#[test]
fn panics_become_internal_errors() {
    let engine = Engine::new(feedback_ruleset(&registry()));
    let mut character = feedback_character(&engine);
    assert!(character.increase("fickle", 1).success);
    assert!(character.increase("plain", 1).success);
    let before = character.dump();

    let decision = character.choose("fickle", "whim", "plain");
    assert!(!decision.success);
    assert!(!decision.mutation_applied);
    assert!(
        decision.reason_str().starts_with("Internal error"),
        "{decision}"
    );
    assert!(decision.reason_str().contains("refusing to look at"), "{decision}");
    assert_eq!(character.dump(), before);
    assert_eq!(character.value("plain"), 1);

    // the character stays usable afterwards
    assert!(character.increase("plain", 1).success);
    assert_eq!(character.value("plain"), 2);
}

#[test]
fn runaway_models_are_refused_on_load() {
    let engine = Engine::with_config(
        feedback_ruleset(&registry()),
        EngineConfig::default().with_max_propagation_depth(16),
    );
    let model: CharacterModel = serde_json::from_value(json!({
        "ruleset_id": "feedback",
        "features": {"echo": {"ranks": 1}}
    }))
    .unwrap();
    assert!(matches!(
        engine.load_character(model),
        Err(LoadError::Reconcile(InternalFault::PropagationTooDeep { .. }))
    ));
}
