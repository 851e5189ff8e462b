use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use hotcoffee_core::{AggregateRoot, DomainError, DomainResult, MenuItemId, Money, OrderId};
use hotcoffee_inventory::ReservationPlan;

use crate::request::LineSelection;

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Closed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Closed => "closed",
        }
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "closed" => Ok(OrderStatus::Closed),
            other => Err(DomainError::validation(format!("invalid status: {other}"))),
        }
    }
}

/// Order line: product, quantity, unit price captured when the line was priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: MenuItemId,
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents).
    pub price_at_time: Money,
}

impl OrderLineItem {
    pub fn line_total(&self) -> Option<Money> {
        self.price_at_time.checked_mul(self.quantity)
    }
}

/// Full persisted state of an order (storage/transport form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub customer_name: String,
    pub items: Vec<OrderLineItem>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    /// Absent for rows written before reservations were recorded.
    #[serde(default)]
    pub reservation: ReservationPlan,
}

/// Aggregate root: Order.
///
/// Status only moves forward: a closed order is terminal and every further
/// mutation is rejected. Each accepted mutation yields a new value with
/// `version + 1`.
///
/// The order carries the ingredient demand that was consumed for it, so a
/// release returns exactly that amount even if a recipe changed since.
/// Timestamps are kept at microsecond precision, the finest a SQL timestamp
/// column stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "OrderSnapshot", into = "OrderSnapshot")]
pub struct Order {
    id: OrderId,
    customer_name: String,
    items: Vec<OrderLineItem>,
    status: OrderStatus,
    total_amount: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    reservation: ReservationPlan,
}

fn validate_lines(customer_name: &str, items: &[OrderLineItem]) -> DomainResult<Money> {
    if customer_name.trim().is_empty() {
        return Err(DomainError::validation("customer name is required"));
    }
    if items.is_empty() {
        return Err(DomainError::validation("order must have at least one item"));
    }
    if items.iter().any(|line| line.quantity == 0) {
        return Err(DomainError::validation("quantity must be positive"));
    }
    total_of(items)
}

fn total_of(items: &[OrderLineItem]) -> DomainResult<Money> {
    items.iter().try_fold(Money::ZERO, |acc, line| {
        line.line_total()
            .and_then(|t| acc.checked_add(t))
            .ok_or_else(|| DomainError::validation("order total exceeds the representable range"))
    })
}

impl Order {
    /// Build a new pending order from priced lines and the demand reserved for them.
    pub fn place(
        id: OrderId,
        customer_name: impl Into<String>,
        items: Vec<OrderLineItem>,
        reservation: ReservationPlan,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let customer_name = customer_name.into();
        let total_amount = validate_lines(&customer_name, &items)?;
        let now = now.trunc_subsecs(6);

        Ok(Self {
            id,
            customer_name,
            items,
            status: OrderStatus::Pending,
            total_amount,
            created_at: now,
            updated_at: now,
            version: 1,
            reservation,
        })
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn items(&self) -> &[OrderLineItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Ingredient demand consumed for this order. Empty only for legacy rows.
    pub fn reservation(&self) -> &ReservationPlan {
        &self.reservation
    }

    pub fn is_closed(&self) -> bool {
        self.status == OrderStatus::Closed
    }

    pub fn ensure_modifiable(&self) -> DomainResult<()> {
        if self.is_closed() {
            return Err(DomainError::invariant("cannot modify order once it is closed"));
        }
        Ok(())
    }

    /// Product/quantity pairs of the current lines.
    pub fn selections(&self) -> Vec<LineSelection> {
        self.items
            .iter()
            .map(|line| LineSelection {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
            })
            .collect()
    }

    /// Replace customer, lines and reservation. Creation time is preserved.
    pub fn revise(
        &self,
        customer_name: impl Into<String>,
        items: Vec<OrderLineItem>,
        reservation: ReservationPlan,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        self.ensure_modifiable()?;
        let mut next = Order::place(self.id, customer_name, items, reservation, self.created_at)?;
        next.updated_at = now.trunc_subsecs(6);
        next.version = self.version + 1;
        Ok(next)
    }

    /// Transition `pending → closed`.
    pub fn close(&self, now: DateTime<Utc>) -> DomainResult<Self> {
        if self.status != OrderStatus::Pending {
            return Err(DomainError::invariant("only pending orders can be closed"));
        }
        let mut next = self.clone();
        next.status = OrderStatus::Closed;
        next.updated_at = now.trunc_subsecs(6);
        next.version = self.version + 1;
        Ok(next)
    }

    /// Same revision as `other`, ignoring timestamps.
    ///
    /// Used to recognise a write read back from a store that may keep
    /// timestamps at a coarser precision.
    pub fn same_revision(&self, other: &Order) -> bool {
        self.id == other.id
            && self.version == other.version
            && self.status == other.status
            && self.customer_name == other.customer_name
            && self.items == other.items
            && self.total_amount == other.total_amount
            && self.reservation == other.reservation
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl TryFrom<OrderSnapshot> for Order {
    type Error = DomainError;

    /// Rebuild a stored order, rejecting state `place` could never produce.
    fn try_from(s: OrderSnapshot) -> DomainResult<Self> {
        let total = validate_lines(&s.customer_name, &s.items)?;
        if total != s.total_amount {
            return Err(DomainError::invariant(format!(
                "order {} total {} does not match its lines ({total})",
                s.id, s.total_amount
            )));
        }
        if s.version == 0 {
            return Err(DomainError::invariant(format!("order {} has version 0", s.id)));
        }
        Ok(Self {
            id: s.id,
            customer_name: s.customer_name,
            items: s.items,
            status: s.status,
            total_amount: s.total_amount,
            created_at: s.created_at,
            updated_at: s.updated_at,
            version: s.version,
            reservation: s.reservation,
        })
    }
}

impl From<Order> for OrderSnapshot {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            customer_name: o.customer_name,
            items: o.items,
            status: o.status,
            total_amount: o.total_amount,
            created_at: o.created_at,
            updated_at: o.updated_at,
            version: o.version,
            reservation: o.reservation,
        }
    }
}
