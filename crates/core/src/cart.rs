//! Client-held shopping cart.
//!
//! The cart is a plain value: clients keep it wherever they like and send a
//! [`CartSnapshot`] at checkout. Prices in a cart are advisory. The server
//! re-resolves every price from the live catalog when an order is created.

use serde::{Deserialize, Serialize};

use crate::types::{Money, ProductId};

/// Largest quantity accepted for a single line.
pub const MAX_LINE_QUANTITY: u32 = 100;

/// Errors from cart operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be between 1 and {max}, got {got}")]
    InvalidQuantity { got: u32, max: u32 },
    #[error("product {0} is not in the cart")]
    NotInCart(ProductId),
    #[error("cart is empty")]
    Empty,
}

const fn check_quantity(quantity: u32) -> Result<u32, CartError> {
    if quantity == 0 || quantity > MAX_LINE_QUANTITY {
        Err(CartError::InvalidQuantity {
            got: quantity,
            max: MAX_LINE_QUANTITY,
        })
    } else {
        Ok(quantity)
    }
}

/// One product line in a [`Cart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

/// A shopping cart. Each product appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Add `quantity` of a product, merging with an existing line.
    ///
    /// When the product is already present the displayed name and price are
    /// refreshed from the arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] if `quantity` or the merged
    /// quantity falls outside `1..=MAX_LINE_QUANTITY`.
    pub fn add(
        &mut self,
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Result<(), CartError> {
        check_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = check_quantity(line.quantity.saturating_add(quantity))?;
            line.name = name.into();
            line.unit_price = unit_price;
        } else {
            self.lines.push(CartLine {
                product_id,
                name: name.into(),
                unit_price,
                quantity,
            });
        }
        Ok(())
    }

    /// Remove a product's line. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        self.lines.len() != before
    }

    /// Replace a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for a quantity outside
    /// `1..=MAX_LINE_QUANTITY` (use [`Cart::remove`] to drop a line) and
    /// [`CartError::NotInCart`] if the product has no line.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        let quantity = check_quantity(quantity)?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CartError::NotInCart(product_id))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Sum of `unit_price * quantity` over all lines, at the cart's prices.
    #[must_use]
    pub fn total(&self) -> Money {
        self.lines.iter().map(|l| l.unit_price * l.quantity).sum()
    }

    /// The checkout payload for this cart.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self
                .lines
                .iter()
                .map(|l| CartSnapshotItem {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: Some(l.unit_price),
                })
                .collect(),
        }
    }
}

/// The cart as sent to checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub items: Vec<CartSnapshotItem>,
}

/// One line of a [`CartSnapshot`].
///
/// `unit_price` is whatever the client displayed. It is accepted so older
/// clients can send their whole cart, and it is never read when pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshotItem {
    #[serde(alias = "productId")]
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, alias = "price", skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
}

impl CartSnapshot {
    /// Validated `(product, quantity)` pairs with duplicate products merged,
    /// in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Empty`] for an empty snapshot and
    /// [`CartError::InvalidQuantity`] for any line (or merged line) outside
    /// `1..=MAX_LINE_QUANTITY`.
    pub fn normalized(&self) -> Result<Vec<(ProductId, u32)>, CartError> {
        if self.items.is_empty() {
            return Err(CartError::Empty);
        }

        let mut merged: Vec<(ProductId, u32)> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            check_quantity(item.quantity)?;
            if let Some((_, qty)) = merged.iter_mut().find(|(id, _)| *id == item.product_id) {
                *qty = check_quantity(qty.saturating_add(item.quantity))?;
            } else {
                merged.push((item.product_id, item.quantity));
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(id: i32) -> ProductId {
        ProductId::new(id)
    }

    fn price(cents: u32) -> Money {
        Money::from_cents(cents)
    }

    #[test]
    fn test_add_merges_existing_line() {
        let mut cart = Cart::new();
        cart.add(p(1), "HACCP Plan", price(1000), 1).unwrap();
        cart.add(p(1), "HACCP Plan", price(1000), 2).unwrap();

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, 3);
    }

    #[test]
    fn test_add_rejects_zero_quantity() {
        let mut cart = Cart::new();
        assert_eq!(
            cart.add(p(1), "x", price(100), 0),
            Err(CartError::InvalidQuantity { got: 0, max: 100 })
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_rejects_merge_over_limit() {
        let mut cart = Cart::new();
        cart.add(p(1), "x", price(100), 99).unwrap();
        assert!(cart.add(p(1), "x", price(100), 2).is_err());
        assert_eq!(cart.lines()[0].quantity, 99);
    }

    #[test]
    fn test_remove() {
        let mut cart = Cart::new();
        cart.add(p(1), "a", price(100), 1).unwrap();
        cart.add(p(2), "b", price(200), 1).unwrap();

        assert!(cart.remove(p(1)));
        assert!(!cart.remove(p(1)));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].product_id, p(2));
    }

    #[test]
    fn test_set_quantity_keeps_minimum_of_one() {
        let mut cart = Cart::new();
        cart.add(p(1), "a", price(100), 4).unwrap();

        cart.set_quantity(p(1), 1).unwrap();
        assert_eq!(cart.lines()[0].quantity, 1);

        assert!(cart.set_quantity(p(1), 0).is_err());
        assert_eq!(cart.lines()[0].quantity, 1);

        assert_eq!(cart.set_quantity(p(9), 2), Err(CartError::NotInCart(p(9))));
    }

    #[test]
    fn test_total_and_clear() {
        let mut cart = Cart::new();
        cart.add(p(1), "a", price(1000), 2).unwrap();
        cart.add(p(2), "b", price(499), 1).unwrap();

        assert_eq!(cart.total(), price(2499));
        assert_eq!(cart.item_count(), 3);

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Money::ZERO);
    }

    #[test]
    fn test_snapshot_normalized_merges_duplicates() {
        let snapshot: CartSnapshot = serde_json::from_value(serde_json::json!({
            "items": [
                {"product_id": 1, "quantity": 1, "unit_price": "0.01"},
                {"product_id": 2, "quantity": 3},
                {"product_id": 1, "quantity": 2}
            ]
        }))
        .unwrap();

        assert_eq!(snapshot.normalized().unwrap(), vec![(p(1), 3), (p(2), 3)]);
    }

    #[test]
    fn test_snapshot_normalized_rejects_bad_input() {
        assert_eq!(CartSnapshot::default().normalized(), Err(CartError::Empty));

        let zero = CartSnapshot {
            items: vec![CartSnapshotItem {
                product_id: p(1),
                quantity: 0,
                unit_price: None,
            }],
        };
        assert!(matches!(
            zero.normalized(),
            Err(CartError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_cart_snapshot_carries_client_prices() {
        let mut cart = Cart::new();
        cart.add(p(5), "a", price(1234), 2).unwrap();
        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items[0].unit_price, Some(price(1234)));
        assert_eq!(snapshot.items[0].quantity, 2);
    }
}
