//! The per-character controller: owns the model and the propagation store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::choice::ChoiceController;
use crate::config::EngineConfig;
use crate::decision::Decision;
use crate::error::{InternalFault, RequestError};
use crate::expr::{PropExpression, PropertySurface, Requirement};
use crate::graph::{
    AttributeController, FeatureController, FeatureNode, GenerationCache,
    OptionTemplateController, PropagationStore, PropertyController,
};
use crate::ruleset::{AttributeKind, Ruleset};
use crate::state::{CharacterMetadata, CharacterModel, FeatureModel, ModelDelta};

/// Mutation orchestrator for one character.
///
/// All reads go through short-lived controllers borrowed from `&self`; all
/// writes go through `&mut self` methods that reconcile afterwards. Computed
/// values are memoized per generation, and the generation is bumped on every
/// model or propagation change.
pub struct CharacterController {
    ruleset: Arc<Ruleset>,
    config: EngineConfig,
    pub(super) model: CharacterModel,
    pub(super) propagation: PropagationStore,
    generation: u64,
    values: GenerationCache<i32>,
    costs: GenerationCache<i32>,
}

impl CharacterController {
    /// Wraps a model and brings its propagation up to date.
    pub(crate) fn attach(
        ruleset: Arc<Ruleset>,
        config: EngineConfig,
        model: CharacterModel,
    ) -> Result<Self, InternalFault> {
        let mut character = Self {
            ruleset,
            config,
            model,
            propagation: PropagationStore::new(),
            generation: 0,
            values: GenerationCache::new(),
            costs: GenerationCache::new(),
        };
        character.reconcile_all()?;
        Ok(character)
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &CharacterModel {
        &self.model
    }

    pub fn metadata(&self) -> &CharacterMetadata {
        &self.model.metadata
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn propagation(&self) -> &PropagationStore {
        &self.propagation
    }

    pub(crate) fn cached_value(&self, key: &str, compute: impl FnOnce() -> i32) -> i32 {
        self.values.get_or_compute(key, self.generation, compute)
    }

    pub(crate) fn cached_cost(&self, key: &str, compute: impl FnOnce() -> i32) -> i32 {
        self.costs.get_or_compute(key, self.generation, compute)
    }

    /// Marks every memoized value stale.
    pub(super) fn invalidate(&mut self) {
        self.generation += 1;
    }

    /// Model record for `full_id`, created if missing.
    pub(super) fn feature_entry(&mut self, full_id: &str) -> &mut FeatureModel {
        self.invalidate();
        self.model.features.entry(full_id.to_owned()).or_default()
    }

    // ===== lookups =====

    /// Controller for any property the ruleset knows, `None` otherwise.
    pub fn controller(
        &self,
        expr: &PropExpression,
    ) -> Option<Box<dyn PropertyController + '_>> {
        if let Some(attribute) = self.ruleset.attribute(&expr.prop) {
            return Some(Box::new(AttributeController::new(self, Some(attribute), expr)));
        }
        let definition = self.ruleset.feature(&expr.prop)?;
        if expr.attribute.is_some() {
            return Some(Box::new(AttributeController::new(self, None, expr)));
        }
        match (&definition.option_def, &expr.option) {
            (Some(option_def), None) => Some(Box::new(OptionTemplateController::new(
                self, definition, option_def,
            ))),
            _ => Some(Box::new(FeatureController::new(self, definition, expr))),
        }
    }

    /// Feature node for `id`: an option template when the feature takes
    /// options and none is given, the concrete feature otherwise.
    pub fn feature_controller(
        &self,
        id: &str,
    ) -> Result<Box<dyn FeatureNode + '_>, RequestError> {
        self.node(&PropExpression::parse(id)?)
    }

    pub(crate) fn node(
        &self,
        expr: &PropExpression,
    ) -> Result<Box<dyn FeatureNode + '_>, RequestError> {
        let Some(definition) = self.ruleset.feature(&expr.prop) else {
            return Err(self.unknown(&expr.prop));
        };
        match (&definition.option_def, &expr.option) {
            (Some(option_def), None) => Ok(Box::new(OptionTemplateController::new(
                self, definition, option_def,
            ))),
            _ => Ok(Box::new(FeatureController::new(self, definition, expr))),
        }
    }

    /// Concrete feature (or option instance) for `id`.
    pub fn feature(&self, id: &str) -> Result<FeatureController<'_>, RequestError> {
        self.concrete(&PropExpression::parse(id)?)
    }

    pub(crate) fn concrete(
        &self,
        expr: &PropExpression,
    ) -> Result<FeatureController<'_>, RequestError> {
        let Some(definition) = self.ruleset.feature(&expr.prop) else {
            return Err(self.unknown(&expr.prop));
        };
        if definition.option_def.is_some() && expr.option.is_none() {
            return Err(RequestError::OptionRequired {
                id: expr.prop.clone(),
            });
        }
        Ok(FeatureController::new(self, definition, expr))
    }

    pub fn option_template(&self, id: &str) -> Option<OptionTemplateController<'_>> {
        let definition = self.ruleset.feature(id)?;
        let option_def = definition.option_def.as_ref()?;
        Some(OptionTemplateController::new(self, definition, option_def))
    }

    /// Choice `choice` of feature `feature_id`.
    pub fn choice(
        &self,
        feature_id: &str,
        choice: &str,
    ) -> Result<ChoiceController<'_>, RequestError> {
        let feature = self.feature(feature_id)?;
        if let Some(controller) = feature.choice(choice) {
            return Ok(controller);
        }
        let error = if feature.definition().choices.contains_key(choice) {
            RequestError::ChoiceUnavailable {
                id: feature.id().to_owned(),
                choice: choice.to_owned(),
            }
        } else {
            RequestError::UnknownChoice {
                id: feature.id().to_owned(),
                choice: choice.to_owned(),
            }
        };
        Err(error)
    }

    fn unknown(&self, id: &str) -> RequestError {
        if self.ruleset.attribute(id).is_some() {
            RequestError::NotAFeature { id: id.to_owned() }
        } else {
            RequestError::UnknownFeature { id: id.to_owned() }
        }
    }

    /// Current value of a property by id, zero if unknown or malformed.
    pub fn value(&self, id: &str) -> i32 {
        PropExpression::parse(id).map_or(0, |expr| self.get_prop(&expr))
    }

    /// Options of `prop` the character holds or is granted, in display form.
    pub fn option_instances(&self, prop: &str) -> BTreeSet<String> {
        self.model
            .features
            .keys()
            .chain(self.propagation.targets())
            .filter_map(|id| id.strip_prefix(prop)?.strip_prefix('+'))
            .map(|raw| raw.replace('_', " "))
            .collect()
    }

    /// Concrete features with a positive value, by full id.
    pub fn features(&self) -> BTreeMap<String, i32> {
        let mut ids: BTreeSet<&String> = self.model.features.keys().collect();
        ids.extend(self.propagation.targets());
        ids.into_iter()
            .filter_map(|id| {
                let expr = PropExpression::parse(id).ok()?;
                let value = self.concrete(&expr).ok()?.value();
                (value > 0).then(|| (id.clone(), value))
            })
            .collect()
    }

    pub fn meets_requirements(&self, requirement: &Requirement) -> Decision {
        requirement.evaluate(self)
    }

    // ===== currency =====

    /// Currency left: default + awards + grants - spent.
    pub fn currency_balance(&self, currency: &str) -> i32 {
        let base = self
            .ruleset
            .attribute(currency)
            .map_or(0, |attribute| attribute.default_value);
        let awarded = self
            .model
            .metadata
            .awards
            .get(currency)
            .copied()
            .unwrap_or(0);
        base + awarded + self.propagation.granted(currency) - self.spent(currency)
    }

    /// Charges across stored features and granted-only ones, which may carry
    /// rebates or refunds.
    fn spent(&self, currency: &str) -> i32 {
        let ids: BTreeSet<&String> = self
            .model
            .features
            .keys()
            .chain(self.propagation.targets())
            .collect();
        ids.into_iter()
            .filter_map(|id| self.feature(id).ok())
            .filter(|feature| feature.currency() == Some(currency))
            .map(|feature| feature.cost())
            .sum()
    }

    /// Every currency the character could be charged in.
    fn currencies(&self) -> BTreeSet<String> {
        let mut currencies: BTreeSet<String> = self
            .ruleset
            .attributes()
            .filter(|attribute| attribute.kind == AttributeKind::Currency)
            .map(|attribute| attribute.id.clone())
            .collect();
        currencies.insert(self.config.default_currency.clone());
        currencies.extend(
            self.model
                .features
                .keys()
                .filter_map(|id| self.feature(id).ok()?.currency().map(str::to_owned)),
        );
        currencies
    }

    // ===== validation =====

    /// Reconciles everything, then checks the whole character.
    pub fn validate(&mut self) -> Decision {
        if let Err(fault) = self.reconcile_all() {
            tracing::warn!(%fault, "reconcile failed during validation");
            return fault.into();
        }
        self.check()
    }

    fn check(&self) -> Decision {
        for id in self.features().keys().chain(self.model.features.keys()) {
            let Ok(feature) = self.feature(id) else {
                continue;
            };
            let decision = feature.validate();
            if !decision.success {
                return decision;
            }
        }
        if self.config.enforce_currency {
            for currency in self.currencies() {
                let balance = self.currency_balance(&currency);
                if balance < 0 {
                    return Decision::fail(format!(
                        "Not enough {currency}: {} over budget",
                        -balance
                    ))
                    .with_need_currency(currency, -balance);
                }
            }
        }
        Decision::OK
    }

    // ===== persistence =====

    /// Serializable copy of the model.
    pub fn dump(&self) -> CharacterModel {
        self.model.clone()
    }

    pub fn dump_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.model)
    }

    pub fn digest(&self) -> Result<[u8; 32], bincode::Error> {
        self.model.digest()
    }

    /// Changes from `before` to the current model.
    pub fn diff(&self, before: &CharacterModel) -> ModelDelta {
        ModelDelta::from_models(before, &self.model)
    }

    pub fn snapshot(&self) -> CharacterModel {
        self.model.clone()
    }

    /// Replaces the model with `snapshot` and rebuilds propagation from it.
    pub fn restore(&mut self, snapshot: CharacterModel) -> Result<(), InternalFault> {
        self.model = snapshot;
        self.propagation.clear();
        self.values.clear();
        self.costs.clear();
        self.invalidate();
        self.reconcile_all()
    }
}

impl PropertySurface for CharacterController {
    fn has_prop(&self, expr: &PropExpression) -> bool {
        if self.ruleset.attribute(&expr.prop).is_some() {
            return true;
        }
        if expr.attribute.is_some() && self.ruleset.feature(&expr.prop).is_some() {
            return true;
        }
        self.controller(expr).is_some_and(|node| node.value() > 0)
    }

    fn get_prop(&self, expr: &PropExpression) -> i32 {
        self.controller(expr).map_or(0, |node| {
            if expr.single.is_some() {
                node.max_value()
            } else {
                node.value()
            }
        })
    }
}

impl fmt::Debug for CharacterController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharacterController")
            .field("ruleset", &self.ruleset.id())
            .field("character", &self.model.metadata.character_name)
            .field("features", &self.model.features.len())
            .field("generation", &self.generation)
            .finish()
    }
}
