use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::job::GarmentCategory;

/// Parameters for starting a try-on generation flow.
///
/// The garment is either a catalog item referenced by its public URL or a
/// device image supplied separately as bytes; `garment_url` covers the
/// catalog case.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TryOnRequest {
    #[garde(skip)]
    pub user_id: Uuid,

    #[garde(skip)]
    pub category: GarmentCategory,

    /// Catalog garment URL, when trying on a store item.
    #[garde(inner(length(min = 1, max = 2048)))]
    pub garment_url: Option<String>,
}

/// Request to save a catalog or result image to the user's saved list.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveItemRequest {
    #[garde(skip)]
    pub user_id: Uuid,

    #[garde(length(min = 1, max = 2048))]
    pub image_url: String,
}
