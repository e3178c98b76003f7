//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Once;

use charsheet_core::{
    CharacterController, CharacterMetadata, Engine, EngineConfig, Ruleset, StrategyRegistry,
};

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary. Set `RUST_LOG` to
/// see engine logs, e.g. `RUST_LOG=charsheet_core=trace`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// The fixture ruleset, which must load without errors.
pub fn ruleset() -> Ruleset {
    let value: serde_json::Value =
        serde_json::from_str(include_str!("../fixtures/ruleset.json")).expect("fixture is JSON");
    let report =
        Ruleset::from_json(value, &StrategyRegistry::with_builtins()).expect("fixture header");
    report.into_result().expect("fixture definitions load")
}

pub fn engine() -> Engine {
    init_tracing();
    Engine::new(ruleset())
}

pub fn engine_with(config: EngineConfig) -> Engine {
    init_tracing();
    Engine::with_config(ruleset(), config)
}

/// A fresh character holding `cp` character points.
pub fn character(engine: &Engine, cp: i32) -> CharacterController {
    engine
        .new_character(CharacterMetadata::new("Wren").with_award("cp", cp))
        .expect("new character reconciles")
}
