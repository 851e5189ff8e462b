use serde::{Deserialize, Serialize};

use hotcoffee_core::{DomainError, DomainResult, IngredientId, MenuItemId, Money, Quantity};

/// Menu category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuCategory {
    #[default]
    Coffee,
    Tea,
    Pastry,
    Sandwich,
    Drink,
}

impl MenuCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MenuCategory::Coffee => "coffee",
            MenuCategory::Tea => "tea",
            MenuCategory::Pastry => "pastry",
            MenuCategory::Sandwich => "sandwich",
            MenuCategory::Drink => "drink",
        }
    }
}

impl core::str::FromStr for MenuCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coffee" => Ok(MenuCategory::Coffee),
            "tea" => Ok(MenuCategory::Tea),
            "pastry" => Ok(MenuCategory::Pastry),
            "sandwich" => Ok(MenuCategory::Sandwich),
            "drink" => Ok(MenuCategory::Drink),
            other => Err(DomainError::validation(format!(
                "unknown menu category '{other}' (expected one of: coffee, tea, pastry, sandwich, drink)"
            ))),
        }
    }
}

/// One line of a recipe: how much of an ingredient a single unit consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientRequirement {
    pub ingredient_id: IngredientId,
    pub quantity_per_unit: Quantity,
}

impl IngredientRequirement {
    pub fn new(ingredient_id: IngredientId, quantity_per_unit: Quantity) -> Self {
        Self {
            ingredient_id,
            quantity_per_unit,
        }
    }
}

/// Unvalidated menu item input (as read from a catalog or a request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMenuItem {
    pub id: MenuItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: MenuCategory,
    pub price: Money,
    #[serde(default = "default_available")]
    pub available: bool,
    pub ingredients: Vec<IngredientRequirement>,
}

fn default_available() -> bool {
    true
}

/// A sellable menu item with its recipe.
///
/// Holds the recipe as an ordered list of requirements. A validated item always
/// has at least one requirement and every `quantity_per_unit` is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NewMenuItem", into = "NewMenuItem")]
pub struct MenuItem {
    id: MenuItemId,
    name: String,
    description: String,
    category: MenuCategory,
    price: Money,
    available: bool,
    ingredients: Vec<IngredientRequirement>,
}

impl MenuItem {
    /// Validate and build a menu item.
    pub fn new(input: NewMenuItem) -> DomainResult<Self> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("menu item name cannot be empty"));
        }
        if input.ingredients.is_empty() {
            return Err(DomainError::validation(
                "menu item must have at least 1 ingredient",
            ));
        }
        for (idx, req) in input.ingredients.iter().enumerate() {
            if req.quantity_per_unit.is_zero() {
                return Err(DomainError::validation(format!(
                    "ingredient {}: quantity must be positive",
                    idx + 1
                )));
            }
        }

        Ok(Self {
            id: input.id,
            name: input.name.trim().to_string(),
            description: input.description,
            category: input.category,
            price: input.price,
            available: input.available,
            ingredients: input.ingredients,
        })
    }

    pub fn id_typed(&self) -> &MenuItemId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> MenuCategory {
        self.category
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Recipe requirements, in catalog order.
    pub fn ingredients(&self) -> &[IngredientRequirement] {
        &self.ingredients
    }
}

impl TryFrom<NewMenuItem> for MenuItem {
    type Error = DomainError;

    fn try_from(value: NewMenuItem) -> Result<Self, Self::Error> {
        MenuItem::new(value)
    }
}

impl From<MenuItem> for NewMenuItem {
    fn from(value: MenuItem) -> Self {
        Self {
            id: value.id,
            name: value.name,
            description: value.description,
            category: value.category,
            price: value.price,
            available: value.available,
            ingredients: value.ingredients,
        }
    }
}
