//! Pluggable candidate filters for choices.
//!
//! A ruleset names a strategy by tag; the tag is resolved against a
//! [`StrategyRegistry`] when the ruleset is loaded, so an unknown tag is a
//! definition error rather than a runtime surprise.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::expr::{PropExpression, PropertySurface};
use crate::ruleset::{FeatureDefinition, Ruleset};

/// Arguments passed to a strategy factory, taken from the choice definition.
pub type StrategyArgs = BTreeMap<String, String>;

/// Builds a strategy from its arguments, or explains why they are unusable.
pub type StrategyFactory = fn(&StrategyArgs) -> Result<Arc<dyn MatchStrategy>, String>;

/// Everything a strategy may look at while filtering.
pub struct StrategyContext<'a> {
    pub surface: &'a dyn PropertySurface,
    pub ruleset: &'a Ruleset,
    pub flags: &'a BTreeMap<String, Vec<String>>,
    /// Full id of the feature that owns the choice.
    pub owner: &'a str,
    /// Selections already made for this choice.
    pub taken: &'a [String],
}

impl StrategyContext<'_> {
    fn value_of(&self, id: &str) -> i32 {
        self.surface.get_prop(&PropExpression::new(id))
    }
}

/// Narrows the candidates of a choice beyond its declarative matcher.
pub trait MatchStrategy: fmt::Debug + Send + Sync {
    fn accepts(&self, ctx: &StrategyContext<'_>, candidate: &FeatureDefinition) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("unknown strategy `{0}`")]
    Unknown(String),

    #[error("strategy `{tag}`: {message}")]
    InvalidArgs { tag: String, message: String },
}

/// Tag to factory table.
#[derive(Clone)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    /// Registry with no strategies at all.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in strategies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(NotOwned::TAG, NotOwned::build);
        registry.register(SameTag::TAG, SameTag::build);
        registry.register(OwnedParent::TAG, OwnedParent::build);
        registry
    }

    /// Adds or replaces a strategy.
    pub fn register(&mut self, tag: impl Into<String>, factory: StrategyFactory) {
        self.factories.insert(tag.into(), factory);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(
        &self,
        tag: &str,
        args: &StrategyArgs,
    ) -> Result<Arc<dyn MatchStrategy>, StrategyError> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| StrategyError::Unknown(tag.to_owned()))?;
        factory(args).map_err(|message| StrategyError::InvalidArgs {
            tag: tag.to_owned(),
            message,
        })
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

fn reject_unknown_args(args: &StrategyArgs, allowed: &[&str]) -> Result<(), String> {
    match args.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(format!("unknown argument `{key}`")),
        None => Ok(()),
    }
}

// ============================================================================
// Built-ins
// ============================================================================

/// Only features the character does not already have.
#[derive(Debug)]
pub struct NotOwned;

impl NotOwned {
    pub const TAG: &'static str = "not-owned";

    fn build(args: &StrategyArgs) -> Result<Arc<dyn MatchStrategy>, String> {
        reject_unknown_args(args, &[])?;
        Ok(Arc::new(Self))
    }
}

impl MatchStrategy for NotOwned {
    fn accepts(&self, ctx: &StrategyContext<'_>, candidate: &FeatureDefinition) -> bool {
        ctx.value_of(&candidate.id) <= 0
    }
}

/// Every selection must share at least one tag with all earlier selections.
///
/// `ignore` lists comma-separated tags that never count as shared.
#[derive(Debug)]
pub struct SameTag {
    ignore: BTreeSet<String>,
}

impl SameTag {
    pub const TAG: &'static str = "same-tag";

    fn build(args: &StrategyArgs) -> Result<Arc<dyn MatchStrategy>, String> {
        reject_unknown_args(args, &["ignore"])?;
        let ignore = args
            .get("ignore")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Arc::new(Self { ignore }))
    }
}

impl MatchStrategy for SameTag {
    fn accepts(&self, ctx: &StrategyContext<'_>, candidate: &FeatureDefinition) -> bool {
        let mut shared: Option<BTreeSet<&String>> = None;
        for taken in ctx.taken {
            let Some(def) = ctx.ruleset.feature(taken) else {
                continue;
            };
            let tags: BTreeSet<&String> = def.tags.difference(&self.ignore).collect();
            shared = Some(match shared {
                Some(prev) => prev.intersection(&tags).copied().collect(),
                None => tags,
            });
        }
        match shared {
            None => true,
            Some(shared) => candidate.tags.iter().any(|t| shared.contains(t)),
        }
    }
}

/// Candidates must hang off a parent the character owns. A character who owns
/// no parent at all may instead pick under parents tagged with one of the
/// values of the character flag named by `flag` (default `disciplines`).
#[derive(Debug)]
pub struct OwnedParent {
    flag: String,
    parent_type: Option<String>,
}

impl OwnedParent {
    pub const TAG: &'static str = "owned-parent";
    const DEFAULT_FLAG: &'static str = "disciplines";

    fn build(args: &StrategyArgs) -> Result<Arc<dyn MatchStrategy>, String> {
        reject_unknown_args(args, &["flag", "parent_type"])?;
        Ok(Arc::new(Self {
            flag: args
                .get("flag")
                .cloned()
                .unwrap_or_else(|| Self::DEFAULT_FLAG.to_owned()),
            parent_type: args.get("parent_type").cloned(),
        }))
    }
}

impl MatchStrategy for OwnedParent {
    fn accepts(&self, ctx: &StrategyContext<'_>, candidate: &FeatureDefinition) -> bool {
        let Some(parent) = candidate.parent.as_deref().and_then(|p| ctx.ruleset.feature(p)) else {
            return false;
        };
        if let Some(kind) = &self.parent_type {
            if parent.feature_type != *kind {
                return false;
            }
        }
        let owns_any = ctx
            .ruleset
            .features()
            .filter_map(|f| f.parent.as_deref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|id| ctx.ruleset.feature(id))
            .filter(|p| self.parent_type.as_ref().is_none_or(|kind| p.feature_type == *kind))
            .any(|p| ctx.value_of(&p.id) > 0);
        if owns_any {
            return ctx.value_of(&parent.id) > 0;
        }
        ctx.flags
            .get(&self.flag)
            .is_some_and(|values| values.iter().any(|v| parent.tags.contains(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = StrategyRegistry::default();
        let tags: Vec<_> = registry.tags().collect();
        assert_eq!(tags, vec!["not-owned", "owned-parent", "same-tag"]);
    }

    #[test]
    fn unknown_tag_is_reported() {
        let err = StrategyRegistry::default()
            .build("psychic", &StrategyArgs::new())
            .unwrap_err();
        assert_eq!(err, StrategyError::Unknown("psychic".into()));
    }

    #[test]
    fn unexpected_arguments_are_rejected() {
        let args: StrategyArgs = [("colour".to_owned(), "red".to_owned())].into_iter().collect();
        let err = StrategyRegistry::default().build("same-tag", &args).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidArgs { .. }));
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn custom_strategies_can_be_registered() {
        #[derive(Debug)]
        struct Nothing;
        impl MatchStrategy for Nothing {
            fn accepts(&self, _: &StrategyContext<'_>, _: &FeatureDefinition) -> bool {
                false
            }
        }

        let mut registry = StrategyRegistry::empty();
        registry.register("nothing", |_| {
            let strategy: Arc<dyn MatchStrategy> = Arc::new(Nothing);
            Ok(strategy)
        });
        assert!(registry.contains("nothing"));
        assert!(registry.build("nothing", &StrategyArgs::new()).is_ok());
    }
}
