//! Catalog models: products, SKUs and collections.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::{CollectionId, ProductId, SkuId};

/// A product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: String,
    /// VAT-inclusive base price.
    pub price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product in a listing, with aggregate stock over its SKUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    pub total_stock: i64,
}

/// A sellable variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Sku {
    pub id: SkuId,
    pub product_id: ProductId,
    pub code: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    /// Overrides the product price when set.
    pub price: Option<Decimal>,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sku {
    /// Price charged for this SKU.
    #[must_use]
    pub fn effective_price(&self, product: &Product) -> Decimal {
        self.price.unwrap_or(product.price)
    }
}

/// A product together with its SKUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub skus: Vec<Sku>,
}

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    pub(crate) const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => " ORDER BY p.created_at DESC, p.id DESC",
            Self::PriceAsc => " ORDER BY p.price ASC, p.id ASC",
            Self::PriceDesc => " ORDER BY p.price DESC, p.id DESC",
            Self::Name => " ORDER BY p.name ASC, p.id ASC",
        }
    }
}

/// Filters for product listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct ProductFilter {
    /// Restrict to products in the collection with this slug.
    pub collection: Option<String>,
    /// Case-insensitive match on name or description.
    pub q: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Only products with at least one SKU in stock.
    #[serde(default)]
    pub in_stock: bool,
    /// Include inactive products (admin listings).
    #[serde(default)]
    pub include_inactive: bool,
    #[serde(default)]
    pub sort: ProductSort,
}

/// Input for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Decimal,
    pub is_active: bool,
}

/// Partial product update. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Input for creating a SKU.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSku {
    pub code: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    pub price: Option<Decimal>,
    pub stock: i32,
}

/// Partial SKU update. Stock changes go through `adjust_stock`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSku {
    pub code: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    pub price: Option<Decimal>,
}

/// A curated group of products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCollection {
    pub name: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCollection {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}
