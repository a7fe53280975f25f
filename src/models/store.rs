use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::GarmentCategory;

/// A garment offered in the store catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub category: GarmentCategory,
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// An image a user bookmarked from the store or from a try-on result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user generation allowance, decremented once per successful try-on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: Uuid,
    pub remaining_tries: i32,
    pub updated_at: DateTime<Utc>,
}

/// Durable record of one completed try-on: the (model, garment, result)
/// triple. Written best-effort after a job succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryOnRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub model_image_url: String,
    pub garment_image_url: String,
    pub result_image_url: String,
    pub created_at: DateTime<Utc>,
}
