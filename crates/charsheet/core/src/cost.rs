//! Rank cost arithmetic.
//!
//! All functions are pure: the feature controller gathers purchased and
//! granted ranks plus inbound discounts and hands them here.
//!
//! A feature's total is the discounted price of its paid ranks, less two
//! credits: a rebate when a positive discount lands on granted ranks, and a
//! refund for every granted rank beyond the maximum. The total may go
//! negative.

use crate::ruleset::{CostDef, Discount};

/// Ranks the character actually pays for.
///
/// Granted ranks come first; purchased ranks beyond the feature's maximum
/// are refunded rather than charged.
pub fn paid_ranks(purchased: i32, granted: i32, max: i32) -> i32 {
    let paid = if purchased.saturating_add(granted) <= max {
        purchased
    } else if granted < max {
        max - granted
    } else {
        0
    };
    paid.max(0)
}

/// Undiscounted price of each rank `1..=ranks`.
pub fn rank_costs(cost: &CostDef, ranks: i32) -> Vec<i32> {
    (1..=ranks).map(|rank| cost.rank_cost(rank)).collect()
}

/// Undiscounted price of the first `ranks` ranks.
pub fn cost_for(cost: &CostDef, ranks: i32) -> i32 {
    rank_costs(cost, ranks).into_iter().sum()
}

/// Applies discounts in order. Each discount covers the highest-numbered
/// ranks first, up to its rank limit.
pub fn apply_discounts(costs: &mut [i32], discounts: &[Discount]) {
    for discount in discounts {
        let covered = discount.ranks.map_or(costs.len(), |r| r as usize);
        for cost in costs.iter_mut().rev().take(covered) {
            *cost = discount.apply_to(*cost);
        }
    }
}

/// Price of `paid` ranks after discounts.
pub fn discounted_total(cost: &CostDef, paid: i32, discounts: &[Discount]) -> i32 {
    let mut costs = rank_costs(cost, paid);
    apply_discounts(&mut costs, discounts);
    costs.into_iter().sum()
}

/// Credit for granted ranks that a positive discount would have lowered.
///
/// Granted ranks sit above the `paid` ones, so they are priced as ranks
/// `paid + 1 ..= paid + granted`. Surcharges never produce a rebate.
pub fn rebate(cost: &CostDef, paid: i32, granted: i32, discounts: &[Discount]) -> i32 {
    let positive: Vec<Discount> = discounts
        .iter()
        .copied()
        .filter(|discount| discount.discount > 0)
        .collect();
    if positive.is_empty() || granted <= 0 {
        return 0;
    }
    let mut costs: Vec<i32> = (paid + 1..=paid + granted)
        .map(|rank| cost.rank_cost(rank))
        .collect();
    let full: i32 = costs.iter().sum();
    apply_discounts(&mut costs, &positive);
    full - costs.into_iter().sum::<i32>()
}

/// Credit for granted ranks the feature can't hold: each one is worth the
/// price of the top rank.
pub fn refund(cost: &CostDef, granted: i32, max: i32) -> i32 {
    let excess = granted.saturating_sub(max).max(0);
    cost.rank_cost(max).saturating_mul(excess)
}

/// Everything the character is charged for a feature.
pub fn total_cost(
    cost: &CostDef,
    purchased: i32,
    granted: i32,
    max: i32,
    discounts: &[Discount],
) -> i32 {
    let paid = paid_ranks(purchased, granted, max);
    let used = granted.clamp(0, max.max(0));
    discounted_total(cost, paid, discounts)
        - rebate(cost, paid, used, discounts)
        - refund(cost, granted, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::RankTable;

    #[test]
    fn paid_ranks_refund_overlap_with_grants() {
        assert_eq!(paid_ranks(2, 0, 5), 2);
        assert_eq!(paid_ranks(2, 1, 5), 2);
        assert_eq!(paid_ranks(3, 3, 5), 2);
        assert_eq!(paid_ranks(1, 1, 1), 0);
        assert_eq!(paid_ranks(1, 4, 3), 0);
    }

    #[test]
    fn stacked_discounts_stop_at_the_floor() {
        let discounts = [Discount::new(1), Discount::new(2)];
        assert_eq!(discounted_total(&CostDef::Flat(3), 5, &discounts), 5);
    }

    #[test]
    fn limited_discount_covers_highest_ranks() {
        let cost = CostDef::ByRank {
            ranks: [(1, 1), (2, 2), (3, 4)].into_iter().collect::<RankTable<i32>>(),
        };
        let mut costs = rank_costs(&cost, 3);
        assert_eq!(costs, vec![1, 2, 4]);
        apply_discounts(&mut costs, &[Discount::new(2).with_ranks(2)]);
        assert_eq!(costs, vec![1, 1, 2]);
    }

    #[test]
    fn surcharges_raise_every_rank() {
        assert_eq!(discounted_total(&CostDef::Flat(2), 3, &[Discount::new(-1)]), 9);
    }

    #[test]
    fn discounted_grants_earn_a_rebate() {
        let discounts = [Discount::new(1)];
        // one purchased rank at 3-1, one granted rank rebated by 1
        assert_eq!(total_cost(&CostDef::Flat(3), 1, 1, 5, &discounts), 1);
        assert_eq!(rebate(&CostDef::Flat(3), 1, 1, &discounts), 1);
        // the rebate keeps to the discount floor
        assert_eq!(rebate(&CostDef::Flat(1), 0, 2, &discounts), 0);
        assert_eq!(rebate(&CostDef::Flat(3), 0, 2, &[Discount::new(-1)]), 0);
    }

    #[test]
    fn grants_beyond_the_maximum_are_refunded() {
        assert_eq!(refund(&CostDef::Flat(3), 3, 2), 3);
        assert_eq!(refund(&CostDef::Flat(3), 2, 2), 0);
        let table = CostDef::ByRank {
            ranks: [(1, 1), (2, 4)].into_iter().collect::<RankTable<i32>>(),
        };
        assert_eq!(refund(&table, 4, 2), 8);
        assert_eq!(total_cost(&CostDef::Flat(3), 0, 3, 2, &[]), -3);
    }

    #[test]
    fn cost_for_ignores_discounts() {
        assert_eq!(cost_for(&CostDef::Flat(3), 4), 12);
        assert_eq!(cost_for(&CostDef::Flat(3), 0), 0);
    }
}
