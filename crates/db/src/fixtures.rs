//! Rows for database tests.

use rust_decimal::Decimal;
use sqlx::PgPool;

use atelier_core::pricing::OrderTotals;
use atelier_core::{Email, SkuId};

use crate::models::{NewOrder, NewOrderItem, NewProduct, NewSku, Order, ShippingAddress, Sku};
use crate::{OrderRepository, ProductRepository};

pub fn price(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// A product with one SKU holding `stock` units at 25.00.
pub async fn sku_with_stock(pool: &PgPool, slug: &str, stock: i32) -> Sku {
    let products = ProductRepository::new(pool);
    let product = products
        .create(&NewProduct {
            name: format!("Product {slug}"),
            slug: slug.to_string(),
            description: String::new(),
            price: price("25.00"),
            is_active: true,
        })
        .await
        .unwrap();

    products
        .create_sku(
            product.id,
            &NewSku {
                code: format!("SKU-{}", slug.to_uppercase()),
                color: None,
                size: Some("M".to_string()),
                material: None,
                price: None,
                stock,
            },
        )
        .await
        .unwrap()
}

pub async fn stock_of(pool: &PgPool, id: SkuId) -> i32 {
    ProductRepository::new(pool)
        .get_sku(id)
        .await
        .unwrap()
        .unwrap()
        .stock
}

pub fn new_order(order_number: &str, total: &str) -> NewOrder {
    let total = price(total);
    NewOrder {
        order_number: order_number.to_string(),
        user_id: None,
        cart_id: None,
        email: Email::parse("buyer@example.com").unwrap(),
        totals: OrderTotals {
            subtotal: total,
            discount_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            total,
        },
        currency: "GBP".to_string(),
        discount_code: None,
        shipping: ShippingAddress {
            name: "Ada Buyer".to_string(),
            line1: "1 High Street".to_string(),
            line2: None,
            city: "Leeds".to_string(),
            postal_code: "LS1 1AA".to_string(),
            country: "GB".to_string(),
        },
    }
}

pub fn item(sku: &Sku, quantity: i32) -> NewOrderItem {
    NewOrderItem {
        sku_id: sku.id,
        product_name: "Product".to_string(),
        sku_code: sku.code.clone(),
        quantity,
        unit_price: price("25.00"),
    }
}

/// An order for `quantity` units of `sku`, stock already taken.
pub async fn order_for(pool: &PgPool, order_number: &str, sku: &Sku, quantity: i32) -> Order {
    OrderRepository::new(pool)
        .create_with_items(&new_order(order_number, "25.00"), &[item(sku, quantity)])
        .await
        .unwrap()
}

/// Mark an order paid with a payment intent.
pub async fn paid(pool: &PgPool, order: &Order) -> Order {
    OrderRepository::new(pool)
        .mark_paid(order.id, Some("pi_test"))
        .await
        .unwrap()
        .unwrap()
}
