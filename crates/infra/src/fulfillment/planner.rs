use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::instrument;

use hotcoffee_core::MenuItemId;
use hotcoffee_inventory::ReservationPlan;
use hotcoffee_menu::MenuItem;
use hotcoffee_orders::{LineSelection, OrderLineItem};

use crate::store::MenuCatalog;

use super::error::FulfillmentError;
use super::FulfillmentConfig;
use super::resolver::RecipeResolver;

/// Priced order lines plus the ingredient demand they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedPlan {
    pub items: Vec<OrderLineItem>,
    pub plan: ReservationPlan,
}

/// Turns order lines into aggregated ingredient demand.
///
/// Demand for an ingredient used by several lines (or several times in one
/// recipe) is summed into a single entry.
#[derive(Debug, Clone)]
pub struct ReservationPlanner<M> {
    resolver: RecipeResolver<M>,
}

impl<M: MenuCatalog> ReservationPlanner<M> {
    pub fn new(catalog: M, config: FulfillmentConfig) -> Self {
        Self {
            resolver: RecipeResolver::new(catalog, config.store_timeout),
        }
    }

    pub fn resolver(&self) -> &RecipeResolver<M> {
        &self.resolver
    }

    /// Demand for lines already on an order.
    ///
    /// Availability is not checked: an item taken off the menu still has to
    /// release what its order reserved.
    #[instrument(skip(self, lines), fields(line_count = lines.len()), err)]
    pub async fn plan(&self, lines: &[LineSelection]) -> Result<ReservationPlan, FulfillmentError> {
        let mut cache = HashMap::new();
        let mut plan = ReservationPlan::new();
        for line in lines {
            let item = self.lookup(&mut cache, &line.product_id).await?;
            add_recipe(&mut plan, item, line.quantity)?;
        }
        Ok(plan)
    }

    /// Price new lines at current menu prices and compute their demand.
    #[instrument(skip(self, lines), fields(line_count = lines.len()), err)]
    pub async fn price(&self, lines: &[LineSelection]) -> Result<PricedPlan, FulfillmentError> {
        let mut cache = HashMap::new();
        let mut plan = ReservationPlan::new();
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            let item = self.lookup(&mut cache, &line.product_id).await?;
            if !item.is_available() {
                return Err(FulfillmentError::Validation(format!(
                    "menu item '{}' is not available",
                    line.product_id
                )));
            }
            add_recipe(&mut plan, item, line.quantity)?;
            items.push(OrderLineItem {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                price_at_time: item.price(),
            });
        }

        Ok(PricedPlan { items, plan })
    }

    async fn lookup<'c>(
        &self,
        cache: &'c mut HashMap<MenuItemId, MenuItem>,
        id: &MenuItemId,
    ) -> Result<&'c MenuItem, FulfillmentError> {
        match cache.entry(id.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(self.resolver.menu_item(id).await?)),
        }
    }
}

fn add_recipe(
    plan: &mut ReservationPlan,
    item: &MenuItem,
    units: u32,
) -> Result<(), FulfillmentError> {
    for req in item.ingredients() {
        let needed = req.quantity_per_unit.checked_mul(units).ok_or_else(|| {
            FulfillmentError::Validation(format!(
                "demand for '{}' exceeds the representable range",
                req.ingredient_id
            ))
        })?;
        plan.add(req.ingredient_id.clone(), needed)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulfillment::error::Missing;
    use crate::store::InMemoryMenuCatalog;
    use hotcoffee_core::{IngredientId, Money, Quantity};
    use hotcoffee_menu::{IngredientRequirement, MenuCategory, NewMenuItem};

    fn item(id: &str, cents: u64, available: bool, recipe: &[(&str, u32)]) -> MenuItem {
        MenuItem::new(NewMenuItem {
            id: MenuItemId::new(id).unwrap(),
            name: id.to_string(),
            description: String::new(),
            category: MenuCategory::Coffee,
            price: Money::from_cents(cents),
            available,
            ingredients: recipe
                .iter()
                .map(|(ing, qty)| {
                    IngredientRequirement::new(
                        IngredientId::new(*ing).unwrap(),
                        Quantity::from_units(*qty),
                    )
                })
                .collect(),
        })
        .unwrap()
    }

    fn planner() -> ReservationPlanner<InMemoryMenuCatalog> {
        ReservationPlanner::new(
            InMemoryMenuCatalog::with_items([
                item("latte", 450, true, &[("espresso_shot", 1), ("milk", 200)]),
                item("mocha", 500, true, &[("espresso_shot", 1), ("milk", 150), ("cocoa", 20)]),
                item("seasonal", 600, false, &[("pumpkin", 30)]),
            ]),
            FulfillmentConfig::default(),
        )
    }

    fn line(id: &str, quantity: u32) -> LineSelection {
        LineSelection {
            product_id: MenuItemId::new(id).unwrap(),
            quantity,
        }
    }

    fn ing(id: &str) -> IngredientId {
        IngredientId::new(id).unwrap()
    }

    #[tokio::test]
    async fn shared_ingredients_are_summed() {
        let priced = planner()
            .price(&[line("latte", 2), line("mocha", 1)])
            .await
            .unwrap();

        assert_eq!(priced.plan.get(&ing("espresso_shot")), Some(Quantity::from_units(3)));
        assert_eq!(priced.plan.get(&ing("milk")), Some(Quantity::from_units(550)));
        assert_eq!(priced.plan.get(&ing("cocoa")), Some(Quantity::from_units(20)));
        assert_eq!(priced.items[0].price_at_time, Money::from_cents(450));
        assert_eq!(priced.items[1].price_at_time, Money::from_cents(500));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let err = planner().price(&[line("frappe", 1)]).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::NotFound(Missing::MenuItem(id)) if id.as_str() == "frappe"
        ));
    }

    #[tokio::test]
    async fn unavailable_items_cannot_be_priced_but_can_be_planned() {
        let planner = planner();
        assert!(matches!(
            planner.price(&[line("seasonal", 1)]).await,
            Err(FulfillmentError::Validation(_))
        ));
        let plan = planner.plan(&[line("seasonal", 2)]).await.unwrap();
        assert_eq!(plan.get(&ing("pumpkin")), Some(Quantity::from_units(60)));
    }
}
