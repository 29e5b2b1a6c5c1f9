//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Branch Scoping
//! Every lookup that uses a business key (sku, barcode) is scoped to a
//! branch; the same SKU may exist in two branches as two distinct products.
//! Branch scope arrives explicitly via [`RequestContext`] - there is no
//! ambient "current branch".
//!
//! ## No Stock Here
//! Products carry no quantity column. Stock questions go to the
//! stock ledger repository, which derives them from movement history.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::new_id;
use tally_core::{validation, Money, Product, RequestContext};

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub default_price: Money,
    pub standard_cost: Option<Money>,
    pub min_stock: i64,
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    id, branch_id, sku, barcode, name, description,
    default_price, standard_cost, min_stock, is_active,
    created_at, updated_at
"#;

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product into the caller's branch.
    ///
    /// ## Errors
    /// * `DbError::Domain` - sku/name/price validation failed
    /// * `DbError::UniqueViolation` - sku or barcode already exists in branch
    pub async fn insert(&self, ctx: &RequestContext, new: NewProduct) -> DbResult<Product> {
        validation::validate_sku(&new.sku)?;
        validation::validate_product_name(&new.name)?;
        validation::validate_price(new.default_price)?;

        let now = Utc::now();
        let product = Product {
            id: new_id(),
            branch_id: ctx.branch_id.clone(),
            sku: new.sku,
            barcode: new.barcode,
            name: new.name,
            description: new.description,
            default_price: new.default_price,
            standard_cost: new.standard_cost,
            min_stock: new.min_stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %product.sku, branch = %ctx.branch_id, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, branch_id, sku, barcode, name, description,
                default_price, standard_cost, min_stock, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.branch_id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.default_price)
        .bind(product.standard_cost)
        .bind(product.min_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {SELECT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by SKU within the caller's branch.
    pub async fn get_by_sku(&self, ctx: &RequestContext, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {SELECT_COLUMNS} FROM products WHERE sku = ?1 AND branch_id = ?2"
        ))
        .bind(sku)
        .bind(&ctx.branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by barcode within the caller's branch.
    pub async fn get_by_barcode(
        &self,
        ctx: &RequestContext,
        barcode: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {SELECT_COLUMNS} FROM products WHERE barcode = ?1 AND branch_id = ?2"
        ))
        .bind(barcode)
        .bind(&ctx.branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists active products in the caller's branch, sorted by name.
    pub async fn list_active(&self, ctx: &RequestContext, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM products
            WHERE branch_id = ?1 AND is_active = 1
            ORDER BY name
            LIMIT ?2
            "#
        ))
        .bind(&ctx.branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Updates mutable product fields.
    ///
    /// ## Errors
    /// * `DbError::NotFound` - product doesn't exist
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, "Updating product");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?2,
                barcode = ?3,
                name = ?4,
                description = ?5,
                default_price = ?6,
                standard_cost = ?7,
                min_stock = ?8,
                is_active = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.default_price)
        .bind(product.standard_cost)
        .bind(product.min_stock)
        .bind(product.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// ## Why Soft Delete?
    /// Historical order lines and stock movements still reference it.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let now = Utc::now();

        let result =
            sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(now)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products in a branch (for diagnostics).
    pub async fn count(&self, ctx: &RequestContext) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE branch_id = ?1 AND is_active = 1",
        )
        .bind(&ctx.branch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new("tester", "branch-a")
    }

    fn widget() -> NewProduct {
        NewProduct {
            sku: "WIDGET-1".into(),
            barcode: Some("5449000000996".into()),
            name: "Widget".into(),
            description: None,
            default_price: Money::from_major(10),
            standard_cost: Some(Money::from_major(6)),
            min_stock: 3,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = test_db().await;
        let repo = db.products();

        let created = repo.insert(&ctx(), widget()).await.unwrap();
        assert_eq!(created.branch_id, "branch-a");

        let by_id = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id.sku, "WIDGET-1");

        let by_sku = repo.get_by_sku(&ctx(), "WIDGET-1").await.unwrap().unwrap();
        assert_eq!(by_sku.id, created.id);

        let by_barcode = repo
            .get_by_barcode(&ctx(), "5449000000996")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_barcode.id, created.id);
    }

    #[tokio::test]
    async fn test_sku_unique_per_branch() {
        let db = test_db().await;
        let repo = db.products();

        repo.insert(&ctx(), widget()).await.unwrap();
        let err = repo.insert(&ctx(), widget()).await.unwrap_err();
        assert!(err.is_unique_violation());

        // Same SKU in another branch is allowed
        let other_branch = RequestContext::new("tester", "branch-b");
        assert!(repo.insert(&other_branch, widget()).await.is_ok());
    }

    #[tokio::test]
    async fn test_sku_lookup_is_branch_scoped() {
        let db = test_db().await;
        let repo = db.products();

        repo.insert(&ctx(), widget()).await.unwrap();

        let other_branch = RequestContext::new("tester", "branch-b");
        assert!(repo
            .get_by_sku(&other_branch, "WIDGET-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_invalid_sku_rejected() {
        let db = test_db().await;
        let repo = db.products();

        let mut bad = widget();
        bad.sku = "has space".into();
        let err = repo.insert(&ctx(), bad).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }

    #[tokio::test]
    async fn test_deactivate() {
        let db = test_db().await;
        let repo = db.products();

        let created = repo.insert(&ctx(), widget()).await.unwrap();
        repo.deactivate(&created.id).await.unwrap();

        let reloaded = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert!(!reloaded.is_active);
        assert_eq!(repo.count(&ctx()).await.unwrap(), 0);
    }
}
