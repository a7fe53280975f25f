use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::GarmentCategory;
use crate::models::store::{CatalogItem, Entitlement, SavedItem, TryOnRecord};
use crate::services::controller::{DynError, EntitlementStore, HistoryStore};

fn catalog_item_from_row(row: &sqlx::postgres::PgRow) -> Result<CatalogItem, sqlx::Error> {
    let category: String = row.try_get("category")?;
    Ok(CatalogItem {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        image_url: row.try_get("image_url")?,
        // Unknown historical categories degrade to tops rather than erroring.
        category: category.parse().unwrap_or(GarmentCategory::Tops),
        price_cents: row.try_get("price_cents")?,
        created_at: row.try_get("created_at")?,
    })
}

/// List store items, newest first, optionally scoped to a category.
pub async fn list_catalog(
    pool: &PgPool,
    category: Option<GarmentCategory>,
) -> Result<Vec<CatalogItem>, sqlx::Error> {
    let rows = match category {
        Some(category) => {
            sqlx::query(
                r#"
                SELECT id, name, image_url, category, price_cents, created_at
                FROM catalog_items
                WHERE category = $1
                ORDER BY created_at DESC
                "#,
            )
            .bind(category.to_string())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT id, name, image_url, category, price_cents, created_at
                FROM catalog_items
                ORDER BY created_at DESC
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(catalog_item_from_row).collect()
}

/// Add a garment to the store catalog.
pub async fn insert_catalog_item(
    pool: &PgPool,
    name: &str,
    image_url: &str,
    category: GarmentCategory,
    price_cents: i64,
) -> Result<CatalogItem, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO catalog_items (name, image_url, category, price_cents)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, image_url, category, price_cents, created_at
        "#,
    )
    .bind(name)
    .bind(image_url)
    .bind(category.to_string())
    .bind(price_cents)
    .fetch_one(pool)
    .await?;

    catalog_item_from_row(&row)
}

/// Bookmark an image for a user. Saving the same URL twice is a no-op.
pub async fn save_item(pool: &PgPool, user_id: Uuid, image_url: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO saved_items (user_id, image_url)
        VALUES ($1, $2)
        ON CONFLICT (user_id, image_url) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(image_url)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a bookmark by user and URL.
pub async fn remove_saved(
    pool: &PgPool,
    user_id: Uuid,
    image_url: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM saved_items
        WHERE user_id = $1 AND image_url = $2
        "#,
    )
    .bind(user_id)
    .bind(image_url)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_saved(pool: &PgPool, user_id: Uuid, image_url: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT 1 AS present FROM saved_items
        WHERE user_id = $1 AND image_url = $2
        "#,
    )
    .bind(user_id)
    .bind(image_url)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub async fn list_saved(pool: &PgPool, user_id: Uuid) -> Result<Vec<SavedItem>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, image_url, created_at
        FROM saved_items
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(SavedItem {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                image_url: row.try_get("image_url")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

/// Grant tries to a user (subscription purchase / top-up).
pub async fn grant_tries(pool: &PgPool, user_id: Uuid, tries: i32) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO entitlements (user_id, remaining_tries)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET remaining_tries = entitlements.remaining_tries + $2, updated_at = NOW()
        RETURNING remaining_tries
        "#,
    )
    .bind(user_id)
    .bind(tries)
    .fetch_one(pool)
    .await?;

    row.try_get("remaining_tries")
}

pub async fn remaining_tries(pool: &PgPool, user_id: Uuid) -> Result<Option<Entitlement>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT user_id, remaining_tries, updated_at
        FROM entitlements
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(Entitlement {
            user_id: row.try_get("user_id")?,
            remaining_tries: row.try_get("remaining_tries")?,
            updated_at: row.try_get("updated_at")?,
        })
    })
    .transpose()
}

/// Atomically consume one try. Fails with `RowNotFound` when the user has no
/// entitlement row or has run out.
pub async fn consume_try(pool: &PgPool, user_id: Uuid) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE entitlements
        SET remaining_tries = remaining_tries - 1, updated_at = NOW()
        WHERE user_id = $1 AND remaining_tries > 0
        RETURNING remaining_tries
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    row.try_get("remaining_tries")
}

/// Record a completed try-on: the (model, garment, result) triple.
pub async fn record_try_on(
    pool: &PgPool,
    user_id: Uuid,
    model_image_url: &str,
    garment_image_url: &str,
    result_image_url: &str,
) -> Result<TryOnRecord, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO try_on_history (user_id, model_image_url, garment_image_url, result_image_url)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, model_image_url, garment_image_url, result_image_url, created_at
        "#,
    )
    .bind(user_id)
    .bind(model_image_url)
    .bind(garment_image_url)
    .bind(result_image_url)
    .fetch_one(pool)
    .await?;

    Ok(TryOnRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        model_image_url: row.try_get("model_image_url")?,
        garment_image_url: row.try_get("garment_image_url")?,
        result_image_url: row.try_get("result_image_url")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn list_history(pool: &PgPool, user_id: Uuid) -> Result<Vec<TryOnRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, model_image_url, garment_image_url, result_image_url, created_at
        FROM try_on_history
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(TryOnRecord {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                model_image_url: row.try_get("model_image_url")?,
                garment_image_url: row.try_get("garment_image_url")?,
                result_image_url: row.try_get("result_image_url")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl HistoryStore for PgPool {
    async fn record_try_on(
        &self,
        user_id: Uuid,
        model_url: &str,
        garment_url: &str,
        result_url: &str,
    ) -> Result<(), DynError> {
        record_try_on(self, user_id, model_url, garment_url, result_url).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntitlementStore for PgPool {
    async fn consume_try(&self, user_id: Uuid) -> Result<i32, DynError> {
        Ok(consume_try(self, user_id).await?)
    }
}
