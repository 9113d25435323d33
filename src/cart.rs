//! Counter-side cart. Prices are snapshotted when a product is added and are only used
//! for display; checkout sends product ids and quantities and the server reprices.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dto::orders::CheckoutItem, models::Product};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
}

impl From<&Product> for CartProduct {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product: CartProduct,
    pub quantity: i32,
    pub notes: String,
}

impl CartLine {
    pub fn line_total(&self) -> i64 {
        self.product.price.saturating_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Same product with the same notes merges into one line; anything else appends.
    pub fn add_item(&mut self, product: impl Into<CartProduct>, quantity: i32, notes: &str) {
        let product = product.into();
        if quantity <= 0 {
            return;
        }
        match self
            .lines
            .iter_mut()
            .find(|line| line.product.id == product.id && line.notes == notes)
        {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine {
                product,
                quantity,
                notes: notes.to_string(),
            }),
        }
    }

    /// A quantity of zero or less removes the line.
    pub fn update_quantity(&mut self, index: usize, quantity: i32) {
        if quantity <= 0 {
            self.remove_item(index);
            return;
        }
        if let Some(line) = self.lines.get_mut(index) {
            line.quantity = quantity;
        }
    }

    pub fn update_notes(&mut self, index: usize, notes: &str) {
        if let Some(line) = self.lines.get_mut(index) {
            line.notes = notes.to_string();
        }
    }

    pub fn remove_item(&mut self, index: usize) {
        if index < self.lines.len() {
            self.lines.remove(index);
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total(&self) -> i64 {
        self.lines
            .iter()
            .map(CartLine::line_total)
            .fold(0, i64::saturating_add)
    }

    pub fn item_count(&self) -> i64 {
        self.lines
            .iter()
            .map(|line| i64::from(line.quantity))
            .fold(0, i64::saturating_add)
    }

    pub fn to_checkout_items(&self) -> Vec<CheckoutItem> {
        self.lines
            .iter()
            .map(|line| CheckoutItem {
                product_id: line.product.id,
                quantity: line.quantity,
                notes: Some(line.notes.trim().to_string()).filter(|n| !n.is_empty()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn juice(name: &str, price: i64) -> CartProduct {
        CartProduct {
            id: Uuid::new_v4(),
            name: name.to_string(),
            price,
        }
    }

    #[test]
    fn same_product_and_notes_merge() {
        let jeruk = juice("Jus Jeruk", 12000);
        let mut cart = Cart::new();
        cart.add_item(jeruk.clone(), 1, "");
        cart.add_item(jeruk.clone(), 2, "");
        cart.add_item(jeruk, 1, "less sugar");

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].quantity, 3);
        assert_eq!(cart.lines()[1].notes, "less sugar");
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.total(), 48000);
    }

    #[test]
    fn zero_quantity_update_removes_line() {
        let mut cart = Cart::new();
        cart.add_item(juice("Jus Mangga", 15000), 2, "");
        cart.add_item(juice("Jus Melon", 12000), 1, "");

        cart.update_quantity(0, 0);

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].product.name, "Jus Melon");
        assert_eq!(cart.total(), 12000);
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let mut cart = Cart::new();
        cart.add_item(juice("Jus Nanas", 10000), 1, "");
        cart.update_quantity(5, 3);
        cart.update_notes(5, "ice");
        cart.remove_item(5);
        assert_eq!(cart.total(), 10000);
    }

    #[test]
    fn total_uses_price_snapshot() {
        let mut product = juice("Jus Alpukat", 15000);
        let mut cart = Cart::new();
        cart.add_item(product.clone(), 2, "");
        product.price = 99000;
        assert_eq!(cart.total(), 30000);
    }

    #[test]
    fn checkout_items_carry_no_prices() {
        let mut cart = Cart::new();
        cart.add_item(juice("Jus Jambu", 12000), 2, "  ");
        cart.add_item(juice("Mix Tropical", 18000), 1, "no ice");

        let items = cart.to_checkout_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].notes, None);
        assert_eq!(items[1].notes.as_deref(), Some("no ice"));

        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn huge_quantities_saturate_instead_of_overflowing() {
        let jeruk = juice("Jus Jeruk", i64::MAX / 2);
        let mut cart = Cart::new();
        cart.add_item(jeruk.clone(), i32::MAX, "");
        cart.add_item(jeruk, 5, "");

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].quantity, i32::MAX);
        assert_eq!(cart.lines()[0].line_total(), i64::MAX);

        cart.add_item(juice("Jus Melon", i64::MAX), 1, "");
        assert_eq!(cart.total(), i64::MAX);
        assert_eq!(cart.item_count(), i64::from(i32::MAX) + 1);
    }
}
