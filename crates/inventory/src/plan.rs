//! Reservation plans: aggregated ingredient demand.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hotcoffee_core::{DomainError, DomainResult, IngredientId, Quantity};

/// Total quantity required per ingredient, for one order or a whole batch.
///
/// Backed by an ordered map, so iteration order (and therefore lock acquisition
/// order in the ledger) is the same for equal plans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationPlan {
    demand: BTreeMap<IngredientId, Quantity>,
}

/// Per-ingredient availability gap found during a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub ingredient_id: IngredientId,
    pub needed: Quantity,
    pub available: Quantity,
}

impl core::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} (need {}, have {})",
            self.ingredient_id, self.needed, self.available
        )
    }
}

impl ReservationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate `quantity` of `ingredient_id` into the plan. Zero amounts are ignored.
    pub fn add(&mut self, ingredient_id: IngredientId, quantity: Quantity) -> DomainResult<()> {
        if quantity.is_zero() {
            return Ok(());
        }
        let entry = self.demand.entry(ingredient_id).or_insert(Quantity::ZERO);
        *entry = entry.checked_add(quantity).ok_or_else(|| {
            DomainError::validation("ingredient demand exceeds the representable range")
        })?;
        Ok(())
    }

    /// Fold another plan into this one.
    pub fn merge(&mut self, other: &ReservationPlan) -> DomainResult<()> {
        for (id, qty) in other.iter() {
            self.add(id.clone(), qty)?;
        }
        Ok(())
    }

    pub fn get(&self, ingredient_id: &IngredientId) -> Option<Quantity> {
        self.demand.get(ingredient_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IngredientId, Quantity)> + '_ {
        self.demand.iter().map(|(id, qty)| (id, *qty))
    }

    pub fn ingredients(&self) -> impl Iterator<Item = &IngredientId> + '_ {
        self.demand.keys()
    }

    pub fn len(&self) -> usize {
        self.demand.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demand.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> IngredientId {
        IngredientId::new(s).unwrap()
    }

    #[test]
    fn add_accumulates_per_ingredient() {
        let mut plan = ReservationPlan::new();
        plan.add(id("milk"), Quantity::from_units(200)).unwrap();
        plan.add(id("espresso_shot"), Quantity::from_units(1)).unwrap();
        plan.add(id("milk"), Quantity::from_units(150)).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get(&id("milk")), Some(Quantity::from_units(350)));
    }

    #[test]
    fn iteration_is_sorted_by_ingredient() {
        let mut plan = ReservationPlan::new();
        for (name, units) in [("sugar", 5), ("milk", 200), ("cocoa", 10)] {
            plan.add(id(name), Quantity::from_units(units)).unwrap();
        }
        let order: Vec<&str> = plan.ingredients().map(|i| i.as_str()).collect();
        assert_eq!(order, vec!["cocoa", "milk", "sugar"]);
    }

    #[test]
    fn zero_amounts_are_dropped() {
        let mut plan = ReservationPlan::new();
        plan.add(id("milk"), Quantity::ZERO).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn overflow_is_reported() {
        let mut plan = ReservationPlan::new();
        plan.add(id("milk"), Quantity::from_milli(u64::MAX)).unwrap();
        assert!(plan.add(id("milk"), Quantity::from_milli(1)).is_err());
    }

    proptest! {
        /// Property: merging is order-independent (same demand regardless of fold order).
        #[test]
        fn merge_is_commutative(
            a in prop::collection::vec((0usize..4, 1u64..10_000), 0..12),
            b in prop::collection::vec((0usize..4, 1u64..10_000), 0..12),
        ) {
            let names = ["milk", "sugar", "cocoa", "espresso_shot"];
            let build = |entries: &Vec<(usize, u64)>| -> ReservationPlan {
                let mut plan = ReservationPlan::new();
                for (i, milli) in entries {
                    plan.add(id(names[*i]), Quantity::from_milli(*milli)).unwrap();
                }
                plan
            };

            let mut ab = build(&a);
            ab.merge(&build(&b)).unwrap();
            let mut ba = build(&b);
            ba.merge(&build(&a)).unwrap();

            prop_assert_eq!(ab, ba);
        }
    }
}
