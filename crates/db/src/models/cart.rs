//! Cart models.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use atelier_core::pricing::line_total;
use atelier_core::{ProductId, SkuId};

/// One cart line joined with its SKU and product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub sku_id: SkuId,
    pub sku_code: String,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_slug: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    /// VAT-inclusive unit price (SKU override or product price).
    pub unit_price: Decimal,
    pub quantity: i32,
    pub stock: i32,
    pub is_active: bool,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        line_total(self.unit_price, self.quantity)
    }
}

/// A cart with its lines and running subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub id: Uuid,
    pub lines: Vec<CartLine>,
    pub item_count: i64,
    pub subtotal: Decimal,
}

impl CartSummary {
    #[must_use]
    pub fn new(id: Uuid, lines: Vec<CartLine>) -> Self {
        let item_count = lines.iter().map(|l| i64::from(l.quantity)).sum();
        let subtotal = lines.iter().map(CartLine::line_total).sum();
        Self {
            id,
            lines,
            item_count,
            subtotal,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
