//! Demo cellar seed used by the CLI and local development.

use rust_decimal::Decimal;

use cantina_core::domain::product::{Product, ProductId, WineType};

use crate::repositories::{ProductRepository, RepositoryError, SqlProductRepository};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub products_inserted: usize,
}

/// Idempotent: products are upserted by id, so reseeding refreshes the demo
/// cellar without duplicating rows.
pub async fn seed_demo_cellar(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let repo = SqlProductRepository::new(pool.clone());
    let cellar = demo_cellar();
    let count = cellar.len();

    for product in cellar {
        repo.save(product).await?;
    }

    Ok(SeedResult { products_inserted: count })
}

fn demo_cellar() -> Vec<Product> {
    let entry = |id: &str, name: &str, wine_type, price_cents, margin_cents| Product {
        id: ProductId(id.to_owned()),
        name: name.to_owned(),
        wine_type,
        price: Decimal::new(price_cents, 2),
        margin: Some(Decimal::new(margin_cents, 2)),
        is_available: true,
    };

    vec![
        entry("barolo-docg-2019", "Barolo DOCG 2019", WineType::Red, 4_500, 1_800),
        entry("chianti-classico-2021", "Chianti Classico 2021", WineType::Red, 2_200, 900),
        entry("barbera-alba-2022", "Barbera d'Alba 2022", WineType::Red, 1_800, 700),
        entry("vermentino-2023", "Vermentino di Gallura 2023", WineType::White, 1_900, 750),
        entry("gavi-di-gavi-2023", "Gavi di Gavi 2023", WineType::White, 2_400, 950),
        entry("soave-classico-2022", "Soave Classico 2022", WineType::White, 1_600, 600),
        entry("cerasuolo-2023", "Cerasuolo d'Abruzzo 2023", WineType::Rose, 1_500, 550),
        entry("franciacorta-brut", "Franciacorta Brut NV", WineType::Sparkling, 3_200, 1_300),
        entry("prosecco-valdobbiadene", "Prosecco Valdobbiadene DOCG", WineType::Sparkling, 1_400, 500),
    ]
}

#[cfg(test)]
mod tests {
    use super::seed_demo_cellar;
    use crate::migrations;
    use crate::repositories::{ProductRepository, SqlProductRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn seeding_twice_does_not_duplicate_products() {
        let pool = setup_pool().await;

        let first = seed_demo_cellar(&pool).await.expect("first seed");
        let second = seed_demo_cellar(&pool).await.expect("second seed");
        assert_eq!(first, second);

        let repo = SqlProductRepository::new(pool.clone());
        let available = repo.list_available(None).await.expect("list products");
        assert_eq!(available.len(), first.products_inserted);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
