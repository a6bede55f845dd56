//! Seed the database with a small demo catalog.
//!
//! Creates a handful of products with SKUs, two collections and a welcome
//! discount. Skips everything if the demo collections already exist.

use rust_decimal::Decimal;

use atelier_core::{DiscountKind, generate_sku_code};
use atelier_db::models::{DiscountInput, NewCollection, NewProduct, NewSku};
use atelier_db::{CollectionRepository, DiscountRepository, ProductRepository};

struct DemoProduct {
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    /// Price in pence.
    price: i64,
    colors: &'static [&'static str],
    sizes: &'static [&'static str],
    material: &'static str,
}

const PRODUCTS: &[DemoProduct] = &[
    DemoProduct {
        name: "Linen Shirt",
        slug: "linen-shirt",
        description: "Relaxed shirt in washed European linen.",
        price: 6500,
        colors: &["Sand", "Navy"],
        sizes: &["S", "M", "L"],
        material: "Linen",
    },
    DemoProduct {
        name: "Merino Crew",
        slug: "merino-crew",
        description: "Fine-gauge crew neck knitted from extra-fine merino.",
        price: 9000,
        colors: &["Charcoal", "Oat"],
        sizes: &["S", "M", "L", "XL"],
        material: "Merino wool",
    },
    DemoProduct {
        name: "Canvas Tote",
        slug: "canvas-tote",
        description: "Heavyweight tote with an inside pocket.",
        price: 2800,
        colors: &["Natural"],
        sizes: &["One size"],
        material: "Cotton canvas",
    },
];

const NEW_ARRIVALS: &str = "new-arrivals";

/// Insert the demo catalog.
pub async fn demo_catalog() -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let products = ProductRepository::new(&pool);
    let collections = CollectionRepository::new(&pool);

    if collections.get_by_slug(NEW_ARRIVALS).await?.is_some() {
        tracing::info!("Demo catalog already present, nothing to do");
        return Ok(());
    }

    let arrivals = collections
        .create(&NewCollection {
            name: "New Arrivals".to_owned(),
            slug: NEW_ARRIVALS.to_owned(),
            description: "Just landed.".to_owned(),
        })
        .await?;
    let essentials = collections
        .create(&NewCollection {
            name: "Essentials".to_owned(),
            slug: "essentials".to_owned(),
            description: "Pieces we always keep in stock.".to_owned(),
        })
        .await?;

    let mut sku_count = 0;
    for (position, demo) in (0_i32..).zip(PRODUCTS) {
        let product = products
            .create(&NewProduct {
                name: demo.name.to_owned(),
                slug: demo.slug.to_owned(),
                description: demo.description.to_owned(),
                price: Decimal::new(demo.price, 2),
                is_active: true,
            })
            .await?;

        for color in demo.colors {
            for size in demo.sizes {
                products
                    .create_sku(
                        product.id,
                        &NewSku {
                            code: generate_sku_code(),
                            color: Some((*color).to_owned()),
                            size: Some((*size).to_owned()),
                            material: Some(demo.material.to_owned()),
                            price: None,
                            stock: 10,
                        },
                    )
                    .await?;
                sku_count += 1;
            }
        }

        collections
            .add_product(arrivals.id, product.id, position)
            .await?;
        collections
            .add_product(essentials.id, product.id, position)
            .await?;
    }

    DiscountRepository::new(&pool)
        .create(&DiscountInput {
            code: "WELCOME10".to_owned(),
            kind: DiscountKind::Percentage,
            value: Decimal::from(10),
            min_subtotal: None,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            is_active: true,
        })
        .await?;

    tracing::info!("Seeding complete!");
    tracing::info!("  Products: {}", PRODUCTS.len());
    tracing::info!("  SKUs: {sku_count}");
    tracing::info!("  Collections: 2");
    tracing::info!("  Discount code: WELCOME10");
    Ok(())
}
