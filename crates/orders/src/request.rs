//! Order requests as received from callers, and their validated form.

use serde::{Deserialize, Serialize};

use hotcoffee_core::{DomainError, DomainResult, MenuItemId};

/// One requested line: which product, how many.
///
/// `quantity` is signed so that malformed (zero / negative) input can be
/// reported as a validation error instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: MenuItemId,
    pub quantity: i64,
}

/// Create/update request for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer_name: String,
    pub items: Vec<OrderLineRequest>,
}

/// A validated line: product and a positive unit count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSelection {
    pub product_id: MenuItemId,
    pub quantity: u32,
}

/// Request that passed shape validation (menu lookups still pending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub customer_name: String,
    pub lines: Vec<LineSelection>,
}

impl OrderLineRequest {
    pub fn new(product_id: MenuItemId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

impl OrderRequest {
    pub fn new(customer_name: impl Into<String>, items: Vec<OrderLineRequest>) -> Self {
        Self {
            customer_name: customer_name.into(),
            items,
        }
    }

    /// Shape validation: non-empty customer name, at least one line, positive quantities.
    pub fn validate(&self) -> DomainResult<ValidatedOrder> {
        let customer_name = self.customer_name.trim();
        if customer_name.is_empty() {
            return Err(DomainError::validation("customer name is required"));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation("order must have at least one item"));
        }

        let mut lines = Vec::with_capacity(self.items.len());
        for (idx, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "item {}: quantity must be positive",
                    idx + 1
                )));
            }
            let quantity = u32::try_from(item.quantity).map_err(|_| {
                DomainError::validation(format!("item {}: quantity is too large", idx + 1))
            })?;
            lines.push(LineSelection {
                product_id: item.product_id.clone(),
                quantity,
            });
        }

        Ok(ValidatedOrder {
            customer_name: customer_name.to_string(),
            lines,
        })
    }
}
