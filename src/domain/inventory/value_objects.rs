use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Inventory Value Objects
// ============================================================================

/// Catalog product identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The slice of a catalog product the order core reads and mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub manage_stock: bool,
    pub in_stock: bool,
    pub sales_count: i32,
    pub images: Vec<String>,
    pub category_name: String,
    pub brand_name: Option<String>,
}

impl Product {
    /// Sale price when one is set, list price otherwise
    pub fn current_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }

    pub fn is_on_sale(&self) -> bool {
        matches!(self.sale_price, Some(sale) if sale < self.price)
    }

    pub fn main_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Details frozen onto an order line at purchase time
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            image: self.main_image().map(str::to_string),
            category: self.category_name.clone(),
            brand: self.brand_name.clone(),
        }
    }
}

/// Product details captured on an order line. Never refreshed from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub image: Option<String>,
    pub category: String,
    pub brand: Option<String>,
}

/// Outcome of a ledger operation on one product
#[derive(Debug, Clone, PartialEq)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub quantity: i32,
    /// False when the product does not manage stock and nothing changed
    pub applied: bool,
    pub stock_after: i32,
    pub sales_after: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product() -> Product {
        Product {
            id: ProductId(1),
            name: "Espresso Machine".to_string(),
            sku: "ESP-001".to_string(),
            price: dec!(199.00),
            sale_price: None,
            stock_quantity: 4,
            manage_stock: true,
            in_stock: true,
            sales_count: 0,
            images: vec!["https://cdn.example.com/esp-1.jpg".to_string(), "https://cdn.example.com/esp-2.jpg".to_string()],
            category_name: "Kitchen".to_string(),
            brand_name: Some("Brewline".to_string()),
        }
    }

    #[test]
    fn test_current_price_prefers_sale_price() {
        let mut p = product();
        assert_eq!(p.current_price(), dec!(199.00));

        p.sale_price = Some(dec!(149.00));
        assert_eq!(p.current_price(), dec!(149.00));
        assert!(p.is_on_sale());
    }

    #[test]
    fn test_sale_price_not_below_price_is_not_on_sale() {
        let mut p = product();
        p.sale_price = Some(dec!(199.00));
        assert!(!p.is_on_sale());
    }

    #[test]
    fn test_snapshot_uses_first_image() {
        let snapshot = product().snapshot();
        assert_eq!(snapshot.image.as_deref(), Some("https://cdn.example.com/esp-1.jpg"));
        assert_eq!(snapshot.category, "Kitchen");
        assert_eq!(snapshot.brand.as_deref(), Some("Brewline"));
    }

    #[test]
    fn test_snapshot_without_images_or_brand() {
        let mut p = product();
        p.images.clear();
        p.brand_name = None;

        let json = serde_json::to_value(p.snapshot()).unwrap();
        assert_eq!(json["image"], serde_json::Value::Null);
        assert_eq!(json["brand"], serde_json::Value::Null);
        assert_eq!(json["category"], "Kitchen");
    }
}
