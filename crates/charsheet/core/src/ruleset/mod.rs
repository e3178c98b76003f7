//! Ruleset registry.
//!
//! A [`Ruleset`] is the validated, immutable set of feature and attribute
//! definitions that characters are built against. Loading checks every
//! definition independently: a bad definition is reported in
//! [`LoadReport::errors`] and left out of the registry, the rest still load.

pub mod definition;
pub mod matcher;

pub use definition::{
    Attribute, AttributeKind, ChoiceDef, ConditionalGrant, CostDef, Discount, FeatureDefinition,
    GrantDef, GrantValue, Grantable, Limit, OptionDef, OptionMultiple, RankTable,
};
pub use matcher::FeatureMatcher;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::choice::strategy::{MatchStrategy, StrategyError, StrategyRegistry};
use crate::error::{DefinitionError, DefinitionErrors};
use crate::expr::{PropExpression, Requirement};

/// Source form of a whole ruleset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesetDocument {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
}

fn default_version() -> String {
    "0".to_owned()
}

/// Header plus raw definitions, for loading one definition at a time.
#[derive(Deserialize)]
struct RawDocument {
    id: String,
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    attributes: Vec<serde_json::Value>,
    #[serde(default)]
    features: Vec<serde_json::Value>,
}

/// Result of loading a ruleset: the usable registry plus whatever was rejected.
#[derive(Debug)]
pub struct LoadReport {
    pub ruleset: Ruleset,
    pub errors: DefinitionErrors,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// The ruleset if every definition loaded, otherwise all errors.
    pub fn into_result(self) -> Result<Ruleset, DefinitionErrors> {
        if self.errors.is_empty() {
            Ok(self.ruleset)
        } else {
            Err(self.errors)
        }
    }
}

/// Validated, immutable ruleset.
pub struct Ruleset {
    id: String,
    name: String,
    version: String,
    features: BTreeMap<String, FeatureDefinition>,
    attributes: BTreeMap<String, Attribute>,
    strategies: BTreeMap<(String, String), Arc<dyn MatchStrategy>>,
}

impl Ruleset {
    /// Validates a document and builds the registry.
    pub fn load(document: RulesetDocument, strategies: &StrategyRegistry) -> LoadReport {
        Loader::new(document.id, document.name, document.version, strategies)
            .finish(document.attributes, document.features)
    }

    /// Like [`load`](Self::load), but any rejected definition fails the load.
    pub fn load_strict(
        document: RulesetDocument,
        strategies: &StrategyRegistry,
    ) -> Result<Ruleset, DefinitionErrors> {
        Self::load(document, strategies).into_result()
    }

    /// Loads a ruleset from its JSON form, reading each definition on its own
    /// so one malformed entry does not hide the rest.
    pub fn from_json(
        value: serde_json::Value,
        strategies: &StrategyRegistry,
    ) -> Result<LoadReport, serde_json::Error> {
        let raw: RawDocument = serde_json::from_value(value)?;
        let mut errors = DefinitionErrors::default();
        let attributes = read_each(raw.attributes, "attributes", &mut errors);
        let features = read_each(raw.features, "features", &mut errors);

        let mut report =
            Loader::new(raw.id, raw.name, raw.version, strategies).finish(attributes, features);
        errors.0.append(&mut report.errors.0);
        report.errors = errors;
        Ok(report)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn feature(&self, id: &str) -> Option<&FeatureDefinition> {
        self.features.get(id)
    }

    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.get(id)
    }

    /// Feature definitions in id order.
    pub fn features(&self) -> impl Iterator<Item = &FeatureDefinition> {
        self.features.values()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.features.contains_key(id) || self.attributes.contains_key(id)
    }

    /// Strategy resolved for `feature`'s choice `choice`, if it names one.
    pub fn strategy(&self, feature: &str, choice: &str) -> Option<&Arc<dyn MatchStrategy>> {
        self.strategies.get(&(feature.to_owned(), choice.to_owned()))
    }
}

impl fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ruleset")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("features", &self.features.len())
            .field("attributes", &self.attributes.len())
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Orders dotted version strings component-wise, numerically where possible.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn read_each<T: serde::de::DeserializeOwned>(
    values: Vec<serde_json::Value>,
    section: &str,
    errors: &mut DefinitionErrors,
) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for (idx, value) in values.into_iter().enumerate() {
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| format!("{section}[{idx}]"), str::to_owned);
        match serde_json::from_value(value) {
            Ok(def) => out.push(def),
            Err(err) => errors.push(DefinitionError::Malformed {
                id,
                message: err.to_string(),
            }),
        }
    }
    out
}

// ============================================================================
// Validation
// ============================================================================

struct Loader<'r> {
    ruleset: Ruleset,
    errors: DefinitionErrors,
    registry: &'r StrategyRegistry,
}

impl<'r> Loader<'r> {
    fn new(id: String, name: String, version: String, registry: &'r StrategyRegistry) -> Self {
        Self {
            ruleset: Ruleset {
                id,
                name,
                version,
                features: BTreeMap::new(),
                attributes: BTreeMap::new(),
                strategies: BTreeMap::new(),
            },
            errors: DefinitionErrors::default(),
            registry,
        }
    }

    fn finish(
        mut self,
        attributes: Vec<Attribute>,
        features: Vec<FeatureDefinition>,
    ) -> LoadReport {
        let mut seen = BTreeSet::new();
        for attribute in attributes {
            if !seen.insert(attribute.id.clone()) {
                self.errors.push(DefinitionError::DuplicateId { id: attribute.id });
                continue;
            }
            self.ruleset.attributes.insert(attribute.id.clone(), attribute);
        }

        let mut candidates = Vec::with_capacity(features.len());
        for feature in features {
            if !seen.insert(feature.id.clone()) {
                self.errors.push(DefinitionError::DuplicateId { id: feature.id });
                continue;
            }
            candidates.push(feature);
        }

        // Identifiers resolve only against definitions that survive, so a
        // rejection also rejects everything that references it.
        let mut rejected = BTreeSet::new();
        let accepted = loop {
            let known: BTreeMap<&str, Option<&FeatureDefinition>> = self
                .ruleset
                .attributes
                .keys()
                .map(|id| (id.as_str(), None))
                .chain(
                    candidates
                        .iter()
                        .filter(|f| !rejected.contains(&f.id))
                        .map(|f| (f.id.as_str(), Some(f))),
                )
                .collect();

            let mut accepted = Vec::with_capacity(known.len());
            let mut newly_rejected = Vec::new();
            for feature in candidates.iter().filter(|f| !rejected.contains(&f.id)) {
                let mut check = FeatureCheck {
                    feature,
                    known: &known,
                    errors: Vec::new(),
                };
                check.run();
                let strategies = check.strategies(self.registry);
                if check.errors.is_empty() {
                    accepted.push((feature.id.clone(), strategies));
                } else {
                    tracing::warn!(
                        id = %feature.id,
                        errors = check.errors.len(),
                        "rejecting feature definition"
                    );
                    newly_rejected.push(feature.id.clone());
                    for error in check.errors {
                        self.errors.push(error);
                    }
                }
            }
            if newly_rejected.is_empty() {
                break accepted;
            }
            rejected.extend(newly_rejected);
        };

        let mut by_id: BTreeMap<String, FeatureDefinition> =
            candidates.into_iter().map(|f| (f.id.clone(), f)).collect();
        for (id, strategies) in accepted {
            for (choice, strategy) in strategies {
                self.ruleset.strategies.insert((id.clone(), choice), strategy);
            }
            if let Some(feature) = by_id.remove(&id) {
                self.ruleset.features.insert(id, feature);
            }
        }

        tracing::debug!(
            id = %self.ruleset.id,
            features = self.ruleset.features.len(),
            attributes = self.ruleset.attributes.len(),
            errors = self.errors.len(),
            "ruleset loaded"
        );
        LoadReport {
            ruleset: self.ruleset,
            errors: self.errors,
        }
    }
}

/// Per-definition checks.
struct FeatureCheck<'a> {
    feature: &'a FeatureDefinition,
    known: &'a BTreeMap<&'a str, Option<&'a FeatureDefinition>>,
    errors: Vec<DefinitionError>,
}

impl FeatureCheck<'_> {
    fn run(&mut self) {
        let feature = self.feature;
        if feature.ranks == Limit::Count(0) {
            self.invalid("ranks must be at least 1");
        }
        if let Some(CostDef::ByRank { ranks }) = &feature.cost {
            if ranks.is_empty() {
                self.invalid("cost table is empty");
            }
        }
        if let Some(parent) = &feature.parent {
            self.identifier("parent", parent);
        }
        if let Some(requires) = &feature.requires {
            self.requirement("requires", requires);
        }
        if let Some(grants) = &feature.grants {
            self.targets("grants", grants.targets(), true);
        }
        for grants in feature.rank_grants.values() {
            self.targets("rank_grants", grants.targets(), true);
        }
        for conditional in &feature.grant_if {
            self.targets("grant_if", conditional.grants.targets(), true);
            self.requirement("grant_if", &conditional.requires);
        }
        self.targets("discounts", feature.discounts.keys().collect(), false);
        if let Some(option) = &feature.option_def {
            for requirement in option.requires.values() {
                self.requirement("option", requirement);
            }
        }

        for (choice_id, choice) in &feature.choices {
            if choice.limit == Limit::Count(0) {
                self.errors.push(DefinitionError::InvalidChoice {
                    id: feature.id.clone(),
                    choice: choice_id.clone(),
                    message: "limit must be at least 1".into(),
                });
            }
            if let Some(matcher) = &choice.matcher {
                for id in &matcher.id {
                    self.identifier("choices", id);
                }
            }
            if let Some(requires) = &choice.requires {
                self.requirement("choices", requires);
            }
        }
    }

    /// Resolves choice strategies, recording any that fail.
    fn strategies(&mut self, registry: &StrategyRegistry) -> Vec<(String, Arc<dyn MatchStrategy>)> {
        let mut out = Vec::new();
        for (choice_id, choice) in &self.feature.choices {
            let Some(tag) = &choice.strategy else {
                continue;
            };
            match registry.build(tag, &choice.strategy_args) {
                Ok(strategy) => out.push((choice_id.clone(), strategy)),
                Err(StrategyError::Unknown(tag)) => {
                    self.errors.push(DefinitionError::UnknownStrategy {
                        id: self.feature.id.clone(),
                        choice: choice_id.clone(),
                        tag,
                    });
                }
                Err(err @ StrategyError::InvalidArgs { .. }) => {
                    self.errors.push(DefinitionError::InvalidChoice {
                        id: self.feature.id.clone(),
                        choice: choice_id.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        out
    }

    fn invalid(&mut self, message: &str) {
        self.errors.push(DefinitionError::Invalid {
            id: self.feature.id.clone(),
            message: message.to_owned(),
        });
    }

    fn identifier(&mut self, field: &'static str, identifier: &str) {
        if !self.known.contains_key(identifier) {
            self.errors.push(DefinitionError::UnknownIdentifier {
                id: self.feature.id.clone(),
                field,
                identifier: identifier.to_owned(),
            });
        }
    }

    fn requirement(&mut self, field: &'static str, requirement: &Requirement) {
        for id in requirement.identifiers() {
            self.identifier(field, &id);
        }
    }

    /// Grant and discount targets must exist, and only option-bearing
    /// features may be targeted with an option. Grants to an option-bearing
    /// feature must name the option; a discount without one covers every
    /// option of the feature.
    fn targets(&mut self, field: &'static str, targets: Vec<&PropExpression>, grants: bool) {
        let known = self.known;
        for target in targets {
            match known.get(target.prop.as_str()) {
                None => self.identifier(field, &target.prop),
                Some(Some(def)) if target.option.is_some() && def.option_def.is_none() => {
                    let message =
                        format!("{field} gives an option to `{}`, which takes none", def.id);
                    self.invalid(&message);
                }
                Some(Some(def))
                    if grants && target.option.is_none() && def.option_def.is_some() =>
                {
                    let message = format!("{field} grants `{}` without naming an option", def.id);
                    self.invalid(&message);
                }
                Some(_) => {}
            }
        }
    }
}
