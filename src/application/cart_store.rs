use crate::domain::account::UserId;
use crate::domain::cart::{Cart, CartSnapshot};
use crate::domain::catalog::ProductId;
use crate::domain::ports::CatalogRef;
use crate::error::{Result, StorefrontError};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Per-user carts. Ephemeral: never checkpointed.
pub struct CartStore {
    carts: RwLock<HashMap<UserId, Cart>>,
    catalog: CatalogRef,
}

impl CartStore {
    pub fn new(catalog: CatalogRef) -> Self {
        Self {
            carts: RwLock::new(HashMap::new()),
            catalog,
        }
    }

    pub async fn add_item(&self, user_id: UserId, product_id: ProductId) -> Result<CartSnapshot> {
        let product = self
            .catalog
            .product(product_id)
            .await
            .ok_or(StorefrontError::ProductNotFound(product_id))?;

        let mut carts = self.carts.write().await;
        let cart = carts.entry(user_id).or_default();
        let quantity = cart.add(product)?;
        tracing::debug!(user_id, product_id, quantity, "Added to cart");
        Ok(cart.snapshot())
    }

    pub async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<CartSnapshot> {
        let mut carts = self.carts.write().await;
        let cart = carts
            .get_mut(&user_id)
            .ok_or(StorefrontError::NotInCart(product_id))?;
        let quantity = cart.remove(product_id)?;
        tracing::debug!(user_id, product_id, quantity, "Removed from cart");
        Ok(cart.snapshot())
    }

    pub async fn clear(&self, user_id: UserId) {
        if let Some(cart) = self.carts.write().await.get_mut(&user_id) {
            cart.clear();
        }
    }

    /// Copy of the cart; later edits do not affect it.
    pub async fn snapshot(&self, user_id: UserId) -> CartSnapshot {
        self.carts
            .read()
            .await
            .get(&user_id)
            .map(Cart::snapshot)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Product;
    use crate::infrastructure::in_memory::InMemoryCatalog;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn store() -> CartStore {
        let catalog = InMemoryCatalog::new(vec![
            Product {
                id: 1,
                name: "Gift card".to_string(),
                price: dec!(150),
                quantity: 3,
            },
            Product {
                id: 2,
                name: "Sold out".to_string(),
                price: dec!(10),
                quantity: 0,
            },
        ]);
        CartStore::new(Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_add_and_snapshot() {
        let store = store();
        store.add_item(1, 1).await.unwrap();
        let snapshot = store.add_item(1, 1).await.unwrap();
        assert_eq!(snapshot.total, dec!(300));
        assert_eq!(store.snapshot(1).await, snapshot);
        assert!(store.snapshot(2).await.items.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_limits() {
        let store = store();
        assert!(matches!(
            store.add_item(1, 2).await,
            Err(StorefrontError::OutOfStock(2))
        ));
        assert!(matches!(
            store.add_item(1, 99).await,
            Err(StorefrontError::ProductNotFound(99))
        ));
        for _ in 0..3 {
            store.add_item(1, 1).await.unwrap();
        }
        assert!(matches!(
            store.add_item(1, 1).await,
            Err(StorefrontError::QuantityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = store();
        assert!(matches!(
            store.remove_item(1, 1).await,
            Err(StorefrontError::NotInCart(1))
        ));
        store.add_item(1, 1).await.unwrap();
        let snapshot = store.remove_item(1, 1).await.unwrap();
        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.total, dec!(0));

        store.add_item(1, 1).await.unwrap();
        store.clear(1).await;
        store.clear(1).await;
        assert!(store.snapshot(1).await.items.is_empty());
    }
}
