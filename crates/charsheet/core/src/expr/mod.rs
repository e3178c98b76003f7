//! Property expressions and requirement trees.
//!
//! Every reference a ruleset makes to a feature or attribute is written as a
//! property expression:
//!
//! ```text
//! prop[.attribute][@slot][+option][:value][$single][<less_than]
//! ```
//!
//! [`PropExpression`] parses and renders that grammar losslessly, and
//! [`Requirement`] combines expressions into boolean trees that are evaluated
//! against a character through the [`PropertySurface`] trait.

mod requirement;

pub use requirement::{PropertySurface, Requirement, RequirementGroup, RequirementSpec};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Structural error produced when an expression string does not follow the grammar.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expression is empty")]
    Empty,

    #[error("`{input}`: expected {expected} at offset {offset}")]
    Expected {
        input: String,
        offset: usize,
        expected: &'static str,
    },

    #[error("`{input}`: unexpected `{found}` at offset {offset}")]
    Unexpected {
        input: String,
        offset: usize,
        found: char,
    },

    #[error("`{input}`: malformed number at offset {offset}")]
    BadNumber { input: String, offset: usize },

    #[error("`{input}`: at most one of `:`, `$` and `<` may be given")]
    ConflictingQualifiers { input: String },
}

/// A parsed property identifier with its optional qualifiers.
///
/// `value`, `single` and `less_than` select the comparison mode used when the
/// expression appears in a requirement; at most one of them is set. With none
/// set the expression means "at least one rank".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropExpression {
    pub prop: String,
    pub attribute: Option<String>,
    pub slot: Option<String>,
    /// Option text as displayed, with spaces (underscores in the string form).
    pub option: Option<String>,
    pub value: Option<i32>,
    pub single: Option<i32>,
    pub less_than: Option<i32>,
}

impl PropExpression {
    /// Creates a bare expression naming `prop`.
    pub fn new(prop: impl Into<String>) -> Self {
        Self {
            prop: prop.into(),
            ..Self::default()
        }
    }

    /// Attaches an option (builder pattern).
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }

    /// Attaches a minimum value (builder pattern).
    #[must_use]
    pub fn with_value(mut self, value: i32) -> Self {
        self.value = Some(value);
        self
    }

    /// Parses an expression string.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut cursor = Cursor::new(input);
        let prop = cursor.take_while(is_ident_char);
        if prop.is_empty() {
            return Err(cursor.unexpected_or("a property id"));
        }

        let mut expr = Self::new(prop);
        if cursor.eat('.') {
            expr.attribute = Some(cursor.required(is_ident_char, "an attribute")?);
        }
        if cursor.eat('@') {
            expr.slot = Some(cursor.required(is_ident_char, "a slot")?);
        }
        if cursor.eat('+') {
            let raw = cursor.required(is_option_char, "an option")?;
            expr.option = Some(raw.replace('_', " "));
        }
        if cursor.eat(':') {
            expr.value = Some(cursor.number()?);
        }
        if cursor.eat('$') {
            expr.single = Some(cursor.number()?);
        }
        if cursor.eat('<') {
            expr.less_than = Some(cursor.number()?);
        }
        if let Some(found) = cursor.peek() {
            return Err(ParseError::Unexpected {
                input: input.to_owned(),
                offset: cursor.pos,
                found,
            });
        }

        let qualifiers = [expr.value, expr.single, expr.less_than]
            .iter()
            .filter(|q| q.is_some())
            .count();
        if qualifiers > 1 {
            return Err(ParseError::ConflictingQualifiers {
                input: input.to_owned(),
            });
        }

        Ok(expr)
    }

    /// Identity of the property this expression points at: everything except
    /// the comparison qualifiers. Controllers, propagation records and model
    /// entries are keyed by this string.
    pub fn full_id(&self) -> String {
        let mut out = String::with_capacity(self.prop.len() + 8);
        self.write_identity(&mut out);
        out
    }

    /// Returns a copy without the comparison qualifiers.
    pub fn identity(&self) -> Self {
        Self {
            value: None,
            single: None,
            less_than: None,
            ..self.clone()
        }
    }

    /// Returns a copy without the option, naming the option template.
    pub fn template(&self) -> Self {
        Self {
            option: None,
            ..self.identity()
        }
    }

    pub fn has_qualifiers(&self) -> bool {
        self.value.is_some() || self.single.is_some() || self.less_than.is_some()
    }

    fn write_identity(&self, out: &mut String) {
        out.push_str(&self.prop);
        if let Some(attribute) = &self.attribute {
            out.push('.');
            out.push_str(attribute);
        }
        if let Some(slot) = &self.slot {
            out.push('@');
            out.push_str(slot);
        }
        if let Some(option) = &self.option {
            out.push('+');
            out.push_str(&option.replace(' ', "_"));
        }
    }
}

impl fmt::Display for PropExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_id())?;
        if let Some(value) = self.value {
            write!(f, ":{value}")?;
        }
        if let Some(single) = self.single {
            write!(f, "${single}")?;
        }
        if let Some(less_than) = self.less_than {
            write!(f, "<{less_than}")?;
        }
        Ok(())
    }
}

impl FromStr for PropExpression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PropExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PropExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_option_char(c: char) -> bool {
    is_ident_char(c) || c == '?'
}

// ============================================================================
// Cursor
// ============================================================================

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn required(
        &mut self,
        pred: impl Fn(char) -> bool,
        expected: &'static str,
    ) -> Result<String, ParseError> {
        let taken = self.take_while(pred);
        if taken.is_empty() {
            return Err(self.unexpected_or(expected));
        }
        Ok(taken.to_owned())
    }

    /// Signed decimal in canonical form: no leading zeros, no `-0`.
    fn number(&mut self) -> Result<i32, ParseError> {
        let start = self.pos;
        let negative = self.eat('-');
        let digits = self.take_while(|c| c.is_ascii_digit());
        let canonical = !digits.is_empty()
            && (digits == "0" || !digits.starts_with('0'))
            && !(negative && digits == "0");
        if !canonical {
            return Err(ParseError::BadNumber {
                input: self.input.to_owned(),
                offset: start,
            });
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| ParseError::BadNumber {
                input: self.input.to_owned(),
                offset: start,
            })
    }

    fn unexpected_or(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some(found) => ParseError::Unexpected {
                input: self.input.to_owned(),
                offset: self.pos,
                found,
            },
            None => ParseError::Expected {
                input: self.input.to_owned(),
                offset: self.pos,
                expected,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(s: &str) {
        let parsed = PropExpression::parse(s).unwrap();
        assert_eq!(parsed.to_string(), s);
    }

    #[test]
    fn parses_every_section() {
        let expr = PropExpression::parse("lore.bonus@-1+Undead_Lore:2").unwrap();
        assert_eq!(expr.prop, "lore");
        assert_eq!(expr.attribute.as_deref(), Some("bonus"));
        assert_eq!(expr.slot.as_deref(), Some("-1"));
        assert_eq!(expr.option.as_deref(), Some("Undead Lore"));
        assert_eq!(expr.value, Some(2));
        assert_eq!(expr.single, None);
    }

    #[test]
    fn round_trips_valid_strings() {
        for s in [
            "basic-skill",
            "feature_id@1",
            "lore+Undead",
            "lore+Undead_Lore:3",
            "caster.spell_slots@2",
            "caster.spell_slots@2$1",
            "magic<4",
            "flaw:-2",
            "option-feature+?",
            "x:0",
        ] {
            round_trip(s);
        }
    }

    #[test]
    fn option_spaces_serialize_as_underscores() {
        let expr = PropExpression::new("lore").with_option("Old Gods");
        assert_eq!(expr.to_string(), "lore+Old_Gods");
        assert_eq!(PropExpression::parse("lore+Old_Gods").unwrap(), expr);
    }

    #[test]
    fn full_id_drops_qualifiers() {
        let expr = PropExpression::parse("lore+Undead:3").unwrap();
        assert_eq!(expr.full_id(), "lore+Undead");
        assert_eq!(expr.template().full_id(), "lore");
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(PropExpression::parse(""), Err(ParseError::Empty));
        assert!(matches!(
            PropExpression::parse("skill:"),
            Err(ParseError::BadNumber { .. })
        ));
        assert!(matches!(
            PropExpression::parse("skill!"),
            Err(ParseError::Unexpected { found: '!', .. })
        ));
        assert!(matches!(
            PropExpression::parse("skill+"),
            Err(ParseError::Expected { .. })
        ));
        assert!(matches!(
            PropExpression::parse(":2"),
            Err(ParseError::Unexpected { found: ':', .. })
        ));
    }

    #[test]
    fn rejects_non_canonical_numbers() {
        assert!(PropExpression::parse("skill:02").is_err());
        assert!(PropExpression::parse("skill:-0").is_err());
        assert!(PropExpression::parse("skill:99999999999").is_err());
    }

    #[test]
    fn rejects_more_than_one_comparison_mode() {
        assert_eq!(
            PropExpression::parse("feature-id@1+My_Option:2$3<4"),
            Err(ParseError::ConflictingQualifiers {
                input: "feature-id@1+My_Option:2$3<4".into()
            })
        );
    }

    #[test]
    fn sections_must_appear_in_order() {
        assert!(PropExpression::parse("skill:2+opt").is_err());
        assert!(PropExpression::parse("skill+opt@1").is_err());
    }

    #[test]
    fn serde_uses_the_string_form() {
        let expr: PropExpression = serde_json::from_str("\"lore+Old_Gods:2\"").unwrap();
        assert_eq!(expr.option.as_deref(), Some("Old Gods"));
        assert_eq!(serde_json::to_string(&expr).unwrap(), "\"lore+Old_Gods:2\"");
        assert!(serde_json::from_str::<PropExpression>("\"bad!\"").is_err());
    }
}
