//! End-to-end build scenarios against the fixture ruleset.

mod common;

use std::collections::BTreeSet;

use charsheet_core::{FeatureNode, PropertyController};

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[test]
fn currency_limits_purchases() {
    let engine = common::engine();
    let mut character = common::character(&engine, 5);

    let check = character.feature("athletics").unwrap().can_increase(6);
    assert!(!check.success);
    assert_eq!(check.amount, Some(5));
    assert_eq!(check.need_currency.get("cp"), Some(&6));

    let decision = character.increase("athletics", 5);
    assert!(decision.success, "{decision}");
    assert_eq!(decision.amount, Some(5));
    assert_eq!(character.value("athletics"), 5);
    assert_eq!(character.currency_balance("cp"), 0);
    assert_eq!(character.value("cp"), 0);
}

#[test]
fn capacity_is_checked_before_currency() {
    let engine = common::engine();
    let character = common::character(&engine, 100);
    let check = character.feature("athletics").unwrap().can_increase(11);
    assert!(!check.success);
    assert_eq!(check.amount, Some(10));
}

#[test]
fn granted_rank_is_free_and_follows_its_source() {
    let engine = common::engine();
    let mut character = common::character(&engine, 2);

    assert!(character.increase("patron", 1).success);
    let arcana = character.feature("arcana").unwrap();
    assert_eq!(arcana.value(), 1);
    assert_eq!(arcana.granted_ranks(), 1);
    assert_eq!(arcana.cost(), 0);
    assert_eq!(character.currency_balance("cp"), 0);

    assert!(character.decrease("patron", 1).success);
    assert_eq!(character.value("arcana"), 0);
    assert_eq!(character.currency_balance("cp"), 2);
    assert!(character.model().features.is_empty());
}

#[test]
fn absorbed_purchases_are_charged_again_when_the_grant_goes() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);

    assert!(character.increase("arcana", 2).success);
    assert_eq!(character.currency_balance("cp"), 4);

    // arcana is already at its maximum, so the granted rank absorbs one
    // purchased rank instead of raising the value
    assert!(character.increase("patron", 1).success);
    let arcana = character.feature("arcana").unwrap();
    assert_eq!(arcana.value(), 2);
    assert_eq!(arcana.purchased_ranks(), 2);
    assert_eq!(arcana.paid_ranks(), 1);
    assert_eq!(arcana.cost(), 3);
    assert_eq!(character.currency_balance("cp"), 5);

    assert!(character.decrease("patron", 1).success);
    assert_eq!(character.feature("arcana").unwrap().cost(), 6);
    assert_eq!(character.currency_balance("cp"), 4);
}

#[test]
fn choice_with_limit_one() {
    let engine = common::engine();
    let mut character = common::character(&engine, 3);
    assert!(character.increase("mentor", 1).success);

    let student = character.choice("mentor", "student").unwrap();
    assert_eq!(student.available_choices(), set(&["climb", "swim"]));
    assert_eq!(student.remaining(), Some(1));

    assert!(character.choose("mentor", "student", "swim").success);
    let student = character.choice("mentor", "student").unwrap();
    assert!(student.available_choices().is_empty());
    assert_eq!(student.taken(), ["swim".to_owned()]);
    assert_eq!(character.value("swim"), 1);
    assert_eq!(character.feature("swim").unwrap().cost(), 0);

    let before = character.dump();
    assert!(!character.choose("mentor", "student", "climb").success);
    assert_eq!(character.dump(), before);

    assert!(character.unchoose("mentor", "student", "swim").success);
    let student = character.choice("mentor", "student").unwrap();
    assert_eq!(student.available_choices(), set(&["climb", "swim"]));
    assert_eq!(character.value("swim"), 0);
}

#[test]
fn choices_need_an_owner_with_ranks() {
    let engine = common::engine();
    let mut character = common::character(&engine, 3);

    let decision = character.choose("mentor", "student", "swim");
    assert!(!decision.success);
    assert!(decision.reason_str().contains("unavailable"));

    assert!(character.increase("mentor", 1).success);
    let decision = character.choose("mentor", "mentee", "swim");
    assert!(!decision.success);
    assert!(decision.reason_str().contains("no choice"));
}

#[test]
fn any_of_requirement() {
    let engine = common::engine();

    let character = common::character(&engine, 10);
    let check = character.feature("duelist").unwrap().can_increase(1);
    assert!(!check.success);
    let reason = check.reason_str();
    assert!(reason.starts_with("AnyOf("), "{reason}");
    assert!(reason.contains("fencing") && reason.contains("brawling"), "{reason}");

    let mut fencer = common::character(&engine, 10);
    assert!(fencer.increase("fencing", 2).success);
    assert!(fencer.increase("duelist", 1).success);

    let mut brawler = common::character(&engine, 10);
    assert!(brawler.increase("brawling", 2).success);
    assert!(brawler.increase("duelist", 1).success);

    let mut novice = common::character(&engine, 10);
    assert!(novice.increase("fencing", 1).success);
    assert!(!novice.increase("duelist", 1).success);
}

#[test]
fn none_of_requirement() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);
    assert!(character.feature("pacifist").unwrap().can_increase(1).success);

    assert!(character.increase("brawling", 1).success);
    let check = character.feature("pacifist").unwrap().can_increase(1);
    assert!(!check.success);
    assert_eq!(check.reason_str(), "Not(brawling)");
}

#[test]
fn losing_a_prerequisite_is_rolled_back() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);
    assert!(character.increase("fencing", 2).success);
    assert!(character.increase("duelist", 1).success);
    let before = character.digest().unwrap();

    let decision = character.decrease("fencing", 1);
    assert!(!decision.success);
    assert!(decision.reason_str().contains("no longer meets"), "{decision}");
    assert_eq!(hex::encode(character.digest().unwrap()), hex::encode(before));
    assert_eq!(character.value("fencing"), 2);
}

#[test]
fn stacked_discounts_respect_their_floor() {
    let engine = common::engine();
    let mut character = common::character(&engine, 30);

    assert!(character.increase("forge_blessing", 1).success);
    assert!(character.increase("smithing", 5).success);
    assert_eq!(character.feature("smithing").unwrap().cost(), 10);

    assert!(character.increase("guild_member", 1).success);
    let smithing = character.feature("smithing").unwrap();
    assert_eq!(smithing.discounts().len(), 2);
    assert_eq!(smithing.cost_for(5), 15);
    assert_eq!(smithing.cost(), 5);
    assert_eq!(character.currency_balance("cp"), 25);
}

#[test]
fn discount_choice_lowers_scheduled_costs() {
    let engine = common::engine();
    let mut character = common::character(&engine, 20);

    assert_eq!(character.feature("history").unwrap().cost_for(3), 8);
    assert!(character.increase("scholar", 1).success);
    assert!(character.choose("scholar", "field", "history").success);
    // the discount choice does not grant a rank
    assert_eq!(character.value("history"), 0);

    assert!(character.increase("history", 2).success);
    assert_eq!(character.feature("history").unwrap().cost(), 3);
}

#[test]
fn per_rank_choice_limit_and_strategy() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);
    assert!(character.increase("climb", 1).success);
    assert!(character.increase("wanderer", 1).success);

    let terrain = character.choice("wanderer", "terrain").unwrap();
    assert_eq!(terrain.limit(), Some(1));
    assert_eq!(terrain.available_choices(), set(&["swim"]));

    assert!(character.choose("wanderer", "terrain", "swim").success);
    assert!(character.increase("wanderer", 1).success);
    let terrain = character.choice("wanderer", "terrain").unwrap();
    assert_eq!(terrain.limit(), Some(2));
    assert_eq!(terrain.remaining(), Some(1));
    assert!(terrain.available_choices().is_empty());
}

#[test]
fn rank_and_per_rank_grants() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);
    assert_eq!(character.value("vigor"), 2);

    assert!(character.increase("toughness", 1).success);
    assert_eq!(character.value("vigor"), 3);
    assert_eq!(character.value("athletics"), 0);

    assert!(character.increase("toughness", 2).success);
    assert_eq!(character.value("vigor"), 5);
    assert_eq!(character.value("athletics"), 1);
}

#[test]
fn conditional_grant_follows_its_requirement() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);
    assert!(character.increase("veteran", 1).success);
    assert_eq!(character.value("brawling"), 0);

    assert!(character.increase("fencing", 1).success);
    assert_eq!(character.value("brawling"), 1);

    assert!(character.decrease("fencing", 1).success);
    assert_eq!(character.value("brawling"), 0);
}

#[test]
fn sum_attribute_adds_up_skills() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);
    assert!(character.increase("athletics", 2).success);
    assert!(character.increase("lore+Undead", 1).success);
    assert_eq!(character.value("skill_ranks"), 3);
    assert_eq!(character.value("skill_ranks$2"), 2);
}

#[test]
fn choice_requirement_gates_its_benefits() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);
    assert!(character.increase("sponsor", 1).success);

    let decision = character.choose("sponsor", "protege", "swim");
    assert!(!decision.success);
    assert!(decision.reason_str().contains("athletics"), "{decision}");
    assert_eq!(character.choice("sponsor", "protege").unwrap().remaining(), Some(0));

    assert!(character.increase("athletics", 1).success);
    assert!(character.choose("sponsor", "protege", "swim").success);
    assert_eq!(character.value("swim"), 1);

    // losing the requirement keeps the selection but drops what it gives
    let decision = character.decrease("athletics", 1);
    assert!(decision.success, "{decision}");
    assert_eq!(character.value("swim"), 0);
    let protege = character.choice("sponsor", "protege").unwrap();
    assert_eq!(protege.taken(), ["swim".to_owned()]);
    assert_eq!(protege.remaining(), Some(0));
    assert!(protege.available_choices().is_empty());
    assert!(!protege.can_choose("climb").success);
    assert!(character.validate().success);

    assert!(character.increase("athletics", 1).success);
    assert_eq!(character.value("swim"), 1);
}

#[test]
fn discounted_and_excess_grants_are_credited() {
    let engine = common::engine();
    let mut character = common::character(&engine, 10);

    assert!(character.increase("arcane_heritage", 1).success);
    let arcana = character.feature("arcana").unwrap();
    assert_eq!(arcana.value(), 2);
    assert_eq!(arcana.purchased_ranks(), 0);
    // both granted ranks would have cost 3 - 1
    assert_eq!(arcana.cost(), -2);
    assert_eq!(character.currency_balance("cp"), 10);

    // a third granted rank lies past the maximum of two
    assert!(character.increase("patron", 1).success);
    let arcana = character.feature("arcana").unwrap();
    assert_eq!(arcana.value(), 2);
    assert_eq!(arcana.granted_ranks(), 3);
    assert_eq!(arcana.cost(), -5);
    assert_eq!(character.currency_balance("cp"), 11);

    assert!(character.decrease("arcane_heritage", 1).success);
    assert_eq!(character.feature("arcana").unwrap().cost(), 0);
    assert_eq!(character.currency_balance("cp"), 8);
}
