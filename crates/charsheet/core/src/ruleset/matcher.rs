use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::definition::FeatureDefinition;

/// Declarative filter over feature definitions.
///
/// Every populated field must match. A tag prefixed with `-` must be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureMatcher {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub id: BTreeSet<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl FeatureMatcher {
    pub fn matches(&self, definition: &FeatureDefinition) -> bool {
        if !self.id.is_empty() && !self.id.contains(&definition.id) {
            return false;
        }
        if self
            .feature_type
            .as_ref()
            .is_some_and(|t| *t != definition.feature_type)
        {
            return false;
        }
        let tags_ok = self.tags.iter().all(|tag| match tag.strip_prefix('-') {
            Some(excluded) => !definition.tags.contains(excluded),
            None => definition.tags.contains(tag),
        });
        tags_ok
            && self
                .attrs
                .iter()
                .all(|(key, value)| definition.attrs.get(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(id: &str, tags: &[&str]) -> FeatureDefinition {
        let mut def = FeatureDefinition::new(id, id, "skill");
        def.tags = tags.iter().map(|t| (*t).to_owned()).collect();
        def
    }

    #[test]
    fn empty_matcher_accepts_everything() {
        assert!(FeatureMatcher::default().matches(&skill("a", &[])));
    }

    #[test]
    fn type_and_tags_must_all_match() {
        let matcher: FeatureMatcher = serde_json::from_value(serde_json::json!({
            "type": "skill",
            "tags": ["martial", "-advanced"],
        }))
        .unwrap();
        assert!(matcher.matches(&skill("a", &["martial"])));
        assert!(!matcher.matches(&skill("b", &["martial", "advanced"])));
        assert!(!matcher.matches(&skill("c", &[])));
        assert!(!matcher.matches(&FeatureDefinition::new("d", "d", "perk")));
    }

    #[test]
    fn id_set_restricts_candidates() {
        let matcher = FeatureMatcher {
            id: ["x".to_owned(), "y".to_owned()].into_iter().collect(),
            ..FeatureMatcher::default()
        };
        assert!(matcher.matches(&skill("x", &[])));
        assert!(!matcher.matches(&skill("z", &[])));
    }

    #[test]
    fn attrs_compare_exactly() {
        let mut def = skill("a", &[]);
        def.attrs.insert("school".into(), "fire".into());
        let matcher = FeatureMatcher {
            attrs: [("school".to_owned(), "fire".to_owned())].into_iter().collect(),
            ..FeatureMatcher::default()
        };
        assert!(matcher.matches(&def));
        def.attrs.insert("school".into(), "ice".into());
        assert!(!matcher.matches(&def));
    }
}
