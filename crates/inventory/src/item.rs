use serde::{Deserialize, Serialize};

use hotcoffee_core::{DomainError, DomainResult, IngredientId, Quantity};

use crate::plan::Shortfall;

/// Unvalidated inventory item input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub id: IngredientId,
    pub name: String,
    pub quantity: Quantity,
    pub unit: String,
    #[serde(default)]
    pub min_threshold: Quantity,
}

/// One ingredient's stock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NewInventoryItem", into = "NewInventoryItem")]
pub struct InventoryItem {
    id: IngredientId,
    name: String,
    quantity: Quantity,
    unit: String,
    min_threshold: Quantity,
}

/// A change to an ingredient's on-hand quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum StockAdjustment {
    /// Decrement on-hand stock (reservation).
    Consume(Quantity),
    /// Increment on-hand stock (release / compensation).
    Restore(Quantity),
}

impl StockAdjustment {
    pub fn amount(self) -> Quantity {
        match self {
            StockAdjustment::Consume(q) | StockAdjustment::Restore(q) => q,
        }
    }

    /// The adjustment that undoes this one.
    pub fn inverse(self) -> StockAdjustment {
        match self {
            StockAdjustment::Consume(q) => StockAdjustment::Restore(q),
            StockAdjustment::Restore(q) => StockAdjustment::Consume(q),
        }
    }

    /// Quantity after applying this adjustment to `current`.
    ///
    /// A consume larger than `current` is a conflict: stock never goes negative.
    pub fn apply_to(self, current: Quantity) -> DomainResult<Quantity> {
        match self {
            StockAdjustment::Consume(q) => current.checked_sub(q).ok_or_else(|| {
                DomainError::conflict(format!(
                    "stock cannot go negative (have {current}, consume {q})"
                ))
            }),
            StockAdjustment::Restore(q) => current
                .checked_add(q)
                .ok_or_else(|| DomainError::invariant("stock quantity overflow")),
        }
    }
}

impl InventoryItem {
    pub fn new(input: NewInventoryItem) -> DomainResult<Self> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("ingredient name cannot be empty"));
        }
        if input.unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        Ok(Self {
            id: input.id,
            name: input.name.trim().to_string(),
            quantity: input.quantity,
            unit: input.unit.trim().to_string(),
            min_threshold: input.min_threshold,
        })
    }

    pub fn id_typed(&self) -> &IngredientId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn min_threshold(&self) -> Quantity {
        self.min_threshold
    }

    /// At or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_threshold
    }

    /// Shortfall against `needed`, if on-hand stock does not cover it.
    pub fn shortfall(&self, needed: Quantity) -> Option<Shortfall> {
        (self.quantity < needed).then(|| Shortfall {
            ingredient_id: self.id.clone(),
            needed,
            available: self.quantity,
        })
    }

    /// Apply an adjustment, returning the new quantity. State is unchanged on error.
    pub fn adjust(&mut self, adjustment: StockAdjustment) -> DomainResult<Quantity> {
        let next = adjustment.apply_to(self.quantity)?;
        self.quantity = next;
        Ok(next)
    }
}

impl TryFrom<NewInventoryItem> for InventoryItem {
    type Error = DomainError;

    fn try_from(value: NewInventoryItem) -> Result<Self, Self::Error> {
        InventoryItem::new(value)
    }
}

impl From<InventoryItem> for NewInventoryItem {
    fn from(value: InventoryItem) -> Self {
        Self {
            id: value.id,
            name: value.name,
            quantity: value.quantity,
            unit: value.unit,
            min_threshold: value.min_threshold,
        }
    }
}
