use super::catalog::{Product, ProductId};
use crate::error::{Result, StorefrontError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

/// A user's cart. `total` is kept equal to the sum of price × quantity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: BTreeMap<ProductId, CartLine>,
    total: Decimal,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one unit, checked against the product's current availability.
    pub fn add(&mut self, product: Product) -> Result<u32> {
        if product.quantity == 0 {
            return Err(StorefrontError::OutOfStock(product.id));
        }

        let quantity = match self.lines.get_mut(&product.id) {
            Some(line) => {
                if line.quantity >= product.quantity {
                    return Err(StorefrontError::QuantityExceeded {
                        product_id: product.id,
                        available: product.quantity,
                    });
                }
                line.quantity += 1;
                line.product = product;
                line.quantity
            }
            None => {
                self.lines.insert(
                    product.id,
                    CartLine {
                        product,
                        quantity: 1,
                    },
                );
                1
            }
        };

        self.recompute();
        Ok(quantity)
    }

    /// Removes one unit, dropping the line when it reaches zero.
    pub fn remove(&mut self, product_id: ProductId) -> Result<u32> {
        let line = self
            .lines
            .get_mut(&product_id)
            .ok_or(StorefrontError::NotInCart(product_id))?;

        line.quantity -= 1;
        let remaining = line.quantity;
        if remaining == 0 {
            self.lines.remove(&product_id);
        }

        self.recompute();
        Ok(remaining)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total = Decimal::ZERO;
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self
                .lines
                .values()
                .map(|line| CartItem {
                    product_id: line.product.id,
                    name: line.product.name.clone(),
                    price: line.product.price,
                    quantity: line.quantity,
                })
                .collect(),
            total: self.total,
        }
    }

    fn recompute(&mut self) {
        self.total = self
            .lines
            .values()
            .map(|line| line.product.price * Decimal::from(line.quantity))
            .sum();
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Point-in-time copy of a cart, attached to a purchase payment.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub total: Decimal,
}
