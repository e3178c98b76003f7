//! Static ruleset definitions.
//!
//! These types are the in-memory shape of a ruleset as produced by whatever
//! loader reads the source files. They are immutable once a [`super::Ruleset`]
//! has been built from them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::matcher::FeatureMatcher;
use crate::expr::{PropExpression, Requirement};

// ============================================================================
// Features
// ============================================================================

/// A purchasable feature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Maximum ranks. Defaults to a single rank.
    #[serde(default)]
    pub ranks: Limit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostDef>,
    /// Currency charged for this feature's cost; the engine default if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grants: Option<Grantable>,
    /// Grants unlocked at a given rank, cumulative up to the current value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rank_grants: BTreeMap<u32, Grantable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grant_if: Vec<ConditionalGrant>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub discounts: BTreeMap<PropExpression, Discount>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub choices: BTreeMap<String, ChoiceDef>,
    #[serde(default, rename = "option", skip_serializing_if = "Option::is_none")]
    pub option_def: Option<OptionDef>,
    /// Free-form attributes available to feature matchers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl FeatureDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        feature_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            feature_type: feature_type.into(),
            parent: None,
            tags: BTreeSet::new(),
            description: None,
            ranks: Limit::default(),
            requires: None,
            cost: None,
            currency: None,
            grants: None,
            rank_grants: BTreeMap::new(),
            grant_if: Vec::new(),
            discounts: BTreeMap::new(),
            choices: BTreeMap::new(),
            option_def: None,
            attrs: BTreeMap::new(),
        }
    }

    pub fn max_ranks(&self, unlimited: i32) -> i32 {
        self.ranks.resolve(unlimited)
    }
}

/// A count that may also be `"unlimited"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Limit {
    Count(u32),
    Unlimited,
}

impl Limit {
    /// Numeric form, substituting `unlimited` for [`Limit::Unlimited`].
    pub fn resolve(self, unlimited: i32) -> i32 {
        match self {
            Self::Count(n) => i32::try_from(n).unwrap_or(i32::MAX),
            Self::Unlimited => unlimited,
        }
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl Default for Limit {
    fn default() -> Self {
        Self::Count(1)
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Count(n) => serializer.serialize_u32(*n),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LimitVisitor;

        impl Visitor<'_> for LimitVisitor {
            type Value = Limit;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative count or \"unlimited\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Limit, E> {
                u32::try_from(v).map(Limit::Count).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Limit, E> {
                u64::try_from(v)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Limit, E> {
                if v == "unlimited" {
                    Ok(Limit::Unlimited)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(LimitVisitor)
    }
}

// ============================================================================
// Costs
// ============================================================================

/// Per-rank price of a feature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CostDef {
    /// Same price for every rank.
    Flat(i32),
    /// Explicit schedule; a rank without an entry uses the nearest lower one.
    ByRank { ranks: RankTable<i32> },
}

impl CostDef {
    /// Price of one specific rank (1-based).
    pub fn rank_cost(&self, rank: i32) -> i32 {
        match self {
            Self::Flat(cost) => *cost,
            Self::ByRank { ranks } => ranks.lookup(rank).copied().unwrap_or(0),
        }
    }
}

/// Map keyed by rank, read with "greatest key not above the rank" lookups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RankTable<V>(pub BTreeMap<u32, V>);

impl<V> RankTable<V> {
    /// Entry for the greatest key `<= rank`, falling back to the first entry.
    pub fn lookup(&self, rank: i32) -> Option<&V> {
        let below = u32::try_from(rank)
            .ok()
            .and_then(|rank| self.0.range(..=rank).next_back());
        below.or_else(|| self.0.iter().next()).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> FromIterator<(u32, V)> for RankTable<V> {
    fn from_iter<T: IntoIterator<Item = (u32, V)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V: Serialize> Serialize for RankTable<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for RankTable<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<RankKey, V>::deserialize(deserializer)?;
        Ok(Self(raw.into_iter().map(|(k, v)| (k.0, v)).collect()))
    }
}

/// Rank key that accepts both integers and numeric strings, since data
/// formats like JSON only allow string keys.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct RankKey(u32);

impl<'de> Deserialize<'de> for RankKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RankKeyVisitor;

        impl Visitor<'_> for RankKeyVisitor {
            type Value = RankKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a rank number")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RankKey, E> {
                u32::try_from(v).map(RankKey).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RankKey, E> {
                u32::try_from(v).map(RankKey).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RankKey, E> {
                v.parse().map(RankKey).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(RankKeyVisitor)
    }
}

// ============================================================================
// Discounts
// ============================================================================

/// Reduction of a feature's per-rank cost.
///
/// Written either as a bare amount or as `{discount, minimum, ranks}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DiscountSpec")]
pub struct Discount {
    /// Amount taken off each affected rank. Negative values are surcharges.
    pub discount: i32,
    /// No rank is discounted below this cost.
    pub minimum: i32,
    /// How many ranks (counted from the highest) the discount covers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranks: Option<u32>,
}

impl Discount {
    pub const DEFAULT_MINIMUM: i32 = 1;

    pub fn new(discount: i32) -> Self {
        Self {
            discount,
            minimum: Self::DEFAULT_MINIMUM,
            ranks: None,
        }
    }

    #[must_use]
    pub fn with_minimum(mut self, minimum: i32) -> Self {
        self.minimum = minimum;
        self
    }

    #[must_use]
    pub fn with_ranks(mut self, ranks: u32) -> Self {
        self.ranks = Some(ranks);
        self
    }

    /// Applies this discount to a single rank's cost.
    pub fn apply_to(&self, cost: i32) -> i32 {
        if self.discount <= 0 {
            return cost - self.discount;
        }
        if cost <= self.minimum {
            cost
        } else {
            (cost - self.discount).max(self.minimum)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DiscountSpec {
    Amount(i32),
    Detailed {
        discount: i32,
        #[serde(default = "default_minimum")]
        minimum: i32,
        #[serde(default)]
        ranks: Option<u32>,
    },
}

fn default_minimum() -> i32 {
    Discount::DEFAULT_MINIMUM
}

impl From<DiscountSpec> for Discount {
    fn from(raw: DiscountSpec) -> Self {
        match raw {
            DiscountSpec::Amount(discount) => Discount::new(discount),
            DiscountSpec::Detailed {
                discount,
                minimum,
                ranks,
            } => Discount {
                discount,
                minimum,
                ranks,
            },
        }
    }
}

// ============================================================================
// Grants
// ============================================================================

/// Something a feature hands out for free.
///
/// Accepts a single expression (`"id"` or `"id:2"`), a list, an explicit
/// `{grant: ranks}` map, or a [`GrantDef`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grantable {
    Expr(PropExpression),
    List(Vec<Grantable>),
    Def(GrantDef),
    Map(BTreeMap<PropExpression, i32>),
}

impl Grantable {
    /// Adds this grant's contributions to `out`, keyed by target full id.
    /// `rank` is the granting feature's current value.
    pub fn collect(&self, rank: i32, out: &mut BTreeMap<String, i32>) {
        match self {
            Self::Expr(expr) => {
                *out.entry(expr.full_id()).or_default() += expr.value.unwrap_or(1);
            }
            Self::List(items) => {
                for item in items {
                    item.collect(rank, out);
                }
            }
            Self::Def(def) => {
                let mut amount = def.value.at(rank);
                if def.per_rank {
                    amount *= rank;
                }
                *out.entry(def.id.full_id()).or_default() += amount;
            }
            Self::Map(map) => {
                for (expr, amount) in map {
                    *out.entry(expr.full_id()).or_default() += amount;
                }
            }
        }
    }

    /// Every target expression named by this grant.
    pub fn targets(&self) -> Vec<&PropExpression> {
        match self {
            Self::Expr(expr) => vec![expr],
            Self::List(items) => items.iter().flat_map(Grantable::targets).collect(),
            Self::Def(def) => vec![&def.id],
            Self::Map(map) => map.keys().collect(),
        }
    }
}

/// Detailed grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantDef {
    pub id: PropExpression,
    #[serde(default)]
    pub value: GrantValue,
    /// Multiply the granted amount by the granting feature's value.
    #[serde(default)]
    pub per_rank: bool,
}

/// Amount granted: fixed, or looked up by the granting feature's value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantValue {
    Flat(i32),
    ByRank(RankTable<i32>),
}

impl GrantValue {
    pub fn at(&self, rank: i32) -> i32 {
        match self {
            Self::Flat(amount) => *amount,
            Self::ByRank(table) => table.lookup(rank).copied().unwrap_or(0),
        }
    }
}

impl Default for GrantValue {
    fn default() -> Self {
        Self::Flat(1)
    }
}

/// Grant that applies only while a requirement holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalGrant {
    pub grants: Grantable,
    pub requires: Requirement,
}

// ============================================================================
// Options
// ============================================================================

/// Makes a feature option-bearing ("Lore [Undead]", "Lore [Arcane]").
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionDef {
    /// Accept any text made of letters, digits, spaces and dashes.
    #[serde(default)]
    pub freeform: bool,
    /// Legal option values. A value `$name` expands to the character flag `name`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub values: BTreeSet<String>,
    #[serde(default)]
    pub multiple: OptionMultiple,
    /// Extra requirements for specific option values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requires: BTreeMap<String, Requirement>,
}

/// How many distinct options of one feature a character may hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptionMultiple {
    Single,
    Limited(u32),
    #[default]
    Unlimited,
}

impl OptionMultiple {
    pub fn allows(self, taken: usize) -> bool {
        match self {
            Self::Single => taken == 0,
            Self::Limited(n) => taken < n as usize,
            Self::Unlimited => true,
        }
    }
}

impl Serialize for OptionMultiple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single => serializer.serialize_bool(false),
            Self::Limited(n) => serializer.serialize_u32(*n),
            Self::Unlimited => serializer.serialize_bool(true),
        }
    }
}

impl<'de> Deserialize<'de> for OptionMultiple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MultipleVisitor;

        impl Visitor<'_> for MultipleVisitor {
            type Value = OptionMultiple;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a boolean or a positive count")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<OptionMultiple, E> {
                Ok(if v {
                    OptionMultiple::Unlimited
                } else {
                    OptionMultiple::Single
                })
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<OptionMultiple, E> {
                match u32::try_from(v) {
                    Ok(0) | Err(_) => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
                    Ok(n) => Ok(OptionMultiple::Limited(n)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<OptionMultiple, E> {
                u64::try_from(v)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(MultipleVisitor)
    }
}

// ============================================================================
// Choices
// ============================================================================

/// A bounded sub-selection slot attached to a feature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChoiceDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub limit: Limit,
    /// Multiply the limit by the owning feature's value.
    #[serde(default)]
    pub limit_is_per_rank: bool,
    /// Discount the chosen feature instead of granting it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<Discount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<FeatureMatcher>,
    /// Tag of a registered matcher strategy that further narrows candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategy_args: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Requirement>,
    /// The same feature may be chosen more than once.
    #[serde(default)]
    pub multi: bool,
}

// ============================================================================
// Attributes
// ============================================================================

/// A numeric property that is not itself purchased.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Attribute {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub default_value: i32,
    #[serde(default)]
    pub kind: AttributeKind,
}

/// How an attribute's value is derived.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Default value plus whatever is granted to it.
    #[default]
    Stored,
    /// Sum over matching features; single-instance queries report the maximum.
    Sum {
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        feature_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
    /// Spendable balance: default + awards + grants - spent.
    Currency,
}
