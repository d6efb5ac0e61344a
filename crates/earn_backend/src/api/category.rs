use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use earn_contract::Category;

use super::ApiError;
use crate::{
    category::{CategoryListing, MarketStats},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/category/:category", get(listing))
        .route("/stats", get(stats))
}

/// Active bounties of one category
pub async fn listing(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<CategoryListing>, ApiError> {
    let category: Category = category.parse().map_err(ApiError::bad_request)?;
    let listing = state.categories.listing(category).await?;
    Ok(Json(listing))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<MarketStats>, ApiError> {
    let stats = state.categories.stats().await?;
    Ok(Json(stats))
}
