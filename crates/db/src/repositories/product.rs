use sqlx::{sqlite::SqliteRow, Row};

use cantina_core::domain::product::{Product, ProductId, WineType};

use super::session::{parse_decimal, parse_optional_decimal};
use super::{ProductRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, wine_type, price, margin, is_available
             FROM products
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(product_from_row).transpose()
    }

    async fn list_available(
        &self,
        wine_type: Option<WineType>,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = if let Some(wine_type) = wine_type {
            sqlx::query(
                "SELECT id, name, wine_type, price, margin, is_available
                 FROM products
                 WHERE is_available = 1 AND wine_type = ?
                 ORDER BY name ASC",
            )
            .bind(wine_type.as_str())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, name, wine_type, price, margin, is_available
                 FROM products
                 WHERE is_available = 1
                 ORDER BY name ASC",
            )
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(product_from_row).collect()
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO products (id, name, wine_type, price, margin, is_available)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                wine_type = excluded.wine_type,
                price = excluded.price,
                margin = excluded.margin,
                is_available = excluded.is_available",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(product.wine_type.as_str())
        .bind(product.price.to_string())
        .bind(product.margin.map(|value| value.to_string()))
        .bind(product.is_available)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn product_from_row(row: SqliteRow) -> Result<Product, RepositoryError> {
    let wine_type_raw = row.try_get::<String, _>("wine_type")?;
    let wine_type = match wine_type_raw.as_str() {
        "red" => WineType::Red,
        "white" => WineType::White,
        "rose" => WineType::Rose,
        "sparkling" => WineType::Sparkling,
        other => {
            return Err(RepositoryError::Decode(format!("unknown wine type `{other}`")));
        }
    };

    Ok(Product {
        id: ProductId(row.try_get("id")?),
        name: row.try_get("name")?,
        wine_type,
        price: parse_decimal("price", &row.try_get::<String, _>("price")?)?,
        margin: parse_optional_decimal("margin", row.try_get("margin")?)?,
        is_available: row.try_get("is_available")?,
    })
}
