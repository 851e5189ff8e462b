use std::time::Duration;

use tracing::instrument;

use hotcoffee_core::MenuItemId;
use hotcoffee_menu::{IngredientRequirement, MenuItem};

use crate::store::MenuCatalog;

use super::error::{FulfillmentError, Missing};
use super::with_timeout;

/// Looks up menu items and their recipes. Every catalog call is bounded by
/// the store timeout.
#[derive(Debug, Clone)]
pub struct RecipeResolver<M> {
    catalog: M,
    store_timeout: Duration,
}

impl<M: MenuCatalog> RecipeResolver<M> {
    pub fn new(catalog: M, store_timeout: Duration) -> Self {
        Self {
            catalog,
            store_timeout,
        }
    }

    #[instrument(skip(self), fields(menu_item_id = %id), err)]
    pub async fn menu_item(&self, id: &MenuItemId) -> Result<MenuItem, FulfillmentError> {
        with_timeout(self.store_timeout, "get_menu_item", self.catalog.get_menu_item(id))
            .await
            .map_err(|e| FulfillmentError::persistence(e, || Missing::MenuItem(id.clone())))
    }

    /// Recipe lines for one unit of `id`, in catalog order.
    pub async fn resolve(
        &self,
        id: &MenuItemId,
    ) -> Result<Vec<IngredientRequirement>, FulfillmentError> {
        Ok(self.menu_item(id).await?.ingredients().to_vec())
    }

    pub async fn menu(&self) -> Result<Vec<MenuItem>, FulfillmentError> {
        with_timeout(self.store_timeout, "list_menu_items", self.catalog.list_menu_items())
            .await
            .map_err(FulfillmentError::from)
    }
}
