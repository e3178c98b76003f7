//! Persisted character data.
//!
//! The character model is the only state that is saved; everything else
//! (values, costs, propagation) is recomputed from it against a ruleset.

pub mod delta;

pub use delta::{FeatureChange, FeatureFields, ModelDelta};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expr::PropExpression;

/// Serializable record of a character.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterModel {
    pub ruleset_id: String,
    pub ruleset_version: String,
    #[serde(default)]
    pub metadata: CharacterMetadata,
    /// Per-feature records keyed by full id (`lore+Undead`).
    #[serde(default)]
    pub features: BTreeMap<String, FeatureModel>,
}

impl CharacterModel {
    /// Deterministic SHA-256 digest over the bincode encoding of
    /// [`DigestForm`], which writes every field whether or not it is default.
    pub fn digest(&self) -> Result<[u8; 32], bincode::Error> {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        bincode::serialize_into(&mut hasher, &DigestForm::new(self))?;
        Ok(hasher.finalize().into())
    }
}

/// Fixed-layout view of a [`CharacterModel`] for hashing. The serde form
/// skips defaults, which a positional encoding can't tell apart.
#[derive(Serialize)]
struct DigestForm<'a> {
    ruleset_id: &'a str,
    ruleset_version: &'a str,
    id: Option<&'a str>,
    character_name: &'a str,
    player_name: &'a str,
    awards: &'a BTreeMap<String, i32>,
    flags: &'a BTreeMap<String, Vec<String>>,
    grants: Vec<(String, i32)>,
    features: Vec<(&'a str, FeatureDigest<'a>)>,
}

#[derive(Serialize)]
struct FeatureDigest<'a> {
    ranks: i32,
    notes: Option<&'a str>,
    choices: &'a BTreeMap<String, Vec<String>>,
    plot_added: bool,
    plot_notes: Option<&'a str>,
    player_can_remove: bool,
    plot_free: bool,
    plot_suppressed: bool,
}

impl<'a> DigestForm<'a> {
    fn new(model: &'a CharacterModel) -> Self {
        let metadata = &model.metadata;
        Self {
            ruleset_id: &model.ruleset_id,
            ruleset_version: &model.ruleset_version,
            id: metadata.id.as_deref(),
            character_name: &metadata.character_name,
            player_name: &metadata.player_name,
            awards: &metadata.awards,
            flags: &metadata.flags,
            grants: metadata
                .grants
                .iter()
                .map(|(expr, amount)| (expr.to_string(), *amount))
                .collect(),
            features: model
                .features
                .iter()
                .map(|(id, feature)| {
                    let digest = FeatureDigest {
                        ranks: feature.ranks,
                        notes: feature.notes.as_deref(),
                        choices: &feature.choices,
                        plot_added: feature.plot_added,
                        plot_notes: feature.plot_notes.as_deref(),
                        player_can_remove: feature.player_can_remove,
                        plot_free: feature.plot_free,
                        plot_suppressed: feature.plot_suppressed,
                    };
                    (id.as_str(), digest)
                })
                .collect(),
        }
    }
}

/// Character-wide data supplied by the game runner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub character_name: String,
    #[serde(default)]
    pub player_name: String,
    /// Currency awarded outside of the build, e.g. for attendance.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub awards: BTreeMap<String, i32>,
    /// Named value lists consulted by options (`$flag`) and strategies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, Vec<String>>,
    /// Grants applied to the character by the game itself.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub grants: BTreeMap<PropExpression, i32>,
}

impl CharacterMetadata {
    pub fn new(character_name: impl Into<String>) -> Self {
        Self {
            character_name: character_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_award(mut self, currency: impl Into<String>, amount: i32) -> Self {
        *self.awards.entry(currency.into()).or_default() += amount;
        self
    }

    #[must_use]
    pub fn with_flag<I, S>(mut self, flag: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags
            .insert(flag.into(), values.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_grant(mut self, target: PropExpression, amount: i32) -> Self {
        *self.grants.entry(target).or_default() += amount;
        self
    }
}

/// Stored record of one feature (or one option instance of a feature).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureModel {
    /// Purchased ranks.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub ranks: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Selections per choice id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub choices: BTreeMap<String, Vec<String>>,
    /// Ranks were given by plot rather than bought.
    #[serde(default, skip_serializing_if = "is_false")]
    pub plot_added: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_notes: Option<String>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub player_can_remove: bool,
    /// The feature costs nothing regardless of its cost definition.
    #[serde(default, skip_serializing_if = "is_false")]
    pub plot_free: bool,
    /// The feature counts as zero ranks while set.
    #[serde(default, skip_serializing_if = "is_false")]
    pub plot_suppressed: bool,
}

impl Default for FeatureModel {
    fn default() -> Self {
        Self {
            ranks: 0,
            notes: None,
            choices: BTreeMap::new(),
            plot_added: false,
            plot_notes: None,
            player_can_remove: true,
            plot_free: false,
            plot_suppressed: false,
        }
    }
}

impl FeatureModel {
    /// Whether the record carries anything worth storing.
    pub fn should_keep(&self) -> bool {
        self.ranks != 0
            || self.notes.is_some()
            || !self.choices.is_empty()
            || self.plot_added
            || self.plot_notes.is_some()
            || !self.player_can_remove
            || self.plot_free
            || self.plot_suppressed
    }
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_true(value: &bool) -> bool {
    *value
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_feature_record_is_not_kept() {
        let mut model = FeatureModel::default();
        assert!(!model.should_keep());
        model.notes = Some("note".into());
        assert!(model.should_keep());
    }

    #[test]
    fn default_fields_are_omitted_when_serialized() {
        let model = FeatureModel {
            ranks: 2,
            ..FeatureModel::default()
        };
        assert_eq!(serde_json::to_value(&model).unwrap(), serde_json::json!({"ranks": 2}));
        let back: FeatureModel = serde_json::from_value(serde_json::json!({"ranks": 2})).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn digest_tracks_content() {
        let mut model = CharacterModel {
            ruleset_id: "test".into(),
            ruleset_version: "1".into(),
            ..CharacterModel::default()
        };
        let before = model.digest().unwrap();
        assert_eq!(before, model.clone().digest().unwrap());
        model.features.insert(
            "a".into(),
            FeatureModel {
                ranks: 1,
                ..FeatureModel::default()
            },
        );
        assert_ne!(hex::encode(before), hex::encode(model.digest().unwrap()));
    }

    #[test]
    fn digest_separates_fields_the_serde_form_skips() {
        let with_note = FeatureModel {
            notes: Some("1".into()),
            ..FeatureModel::default()
        };
        let with_plot_note = FeatureModel {
            plot_notes: Some("1".into()),
            ..FeatureModel::default()
        };
        let model = |feature: FeatureModel| CharacterModel {
            features: [("a".to_owned(), feature)].into_iter().collect(),
            ..CharacterModel::default()
        };
        assert_ne!(
            model(with_note).digest().unwrap(),
            model(with_plot_note).digest().unwrap()
        );

        let locked = FeatureModel {
            player_can_remove: false,
            ..FeatureModel::default()
        };
        assert_ne!(
            model(locked).digest().unwrap(),
            model(FeatureModel::default()).digest().unwrap()
        );
    }
}
