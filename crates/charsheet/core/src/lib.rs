//! Data-driven rules engine for character builds.
//!
//! `charsheet-core` loads a [`Ruleset`] of feature and attribute definitions
//! and evaluates characters against it: rank purchases, grants and discounts
//! flowing between features, bounded choices, option-bearing features and
//! currency. All character changes flow through
//! [`CharacterController::apply`], which validates the result and rolls the
//! character back when anything fails. The crate performs no I/O; models are
//! plain serde data for the caller to persist.
pub mod choice;
pub mod config;
pub mod cost;
pub mod decision;
pub mod engine;
pub mod error;
pub mod expr;
pub mod graph;
pub mod ruleset;
pub mod state;

pub use choice::{ChoiceController, MatchStrategy, StrategyContext, StrategyRegistry};
pub use config::EngineConfig;
pub use decision::Decision;
pub use engine::{
    CharacterController, ChoiceMutation, Engine, Mutation, MutationPhase, NoteMutation,
    PlotMutation, RankMutation,
};
pub use error::{
    DefinitionError, DefinitionErrors, ErrorSeverity, InternalFault, LoadError, RequestError,
    RulesError,
};
pub use expr::{ParseError, PropExpression, PropertySurface, Requirement};
pub use graph::{
    AttributeController, FeatureController, FeatureNode, OptionTemplateController,
    PropertyController,
};
pub use ruleset::{
    Attribute, AttributeKind, FeatureDefinition, LoadReport, Ruleset, RulesetDocument,
};
pub use state::{CharacterMetadata, CharacterModel, FeatureModel, ModelDelta};
