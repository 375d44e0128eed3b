use actix_web::{HttpResponse, Result, web};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use reservation_engine::PromotionDraft;

use crate::errors::ApiError;
use crate::requester::RequesterToken;
use crate::state::AppState;

/// Body of an advisory promotion check
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PromotionCheckRequest {
    /// Code typed by the guest
    #[serde(rename = "promotionCode")]
    #[validate(length(min = 1, message = "Promotion code is required"))]
    pub code: String,

    /// Base amount the code would apply to
    pub spend: Decimal,
}

/// Tells a guest whether a code would currently apply. Advisory only: the
/// redemption itself happens when the reservation is submitted.
pub async fn check_promotion(
    state: web::Data<AppState>,
    request: web::Json<PromotionCheckRequest>,
) -> Result<HttpResponse, ApiError> {
    request.validate()?;

    let catalog = state.promotions().await?;

    let response = match catalog.check(&request.code, request.spend, Utc::now()) {
        Ok(promotion) => serde_json::json!({
            "valid": true,
            "promotionCode": promotion.code,
            "discountPercentage": promotion.discount_percentage,
            "remainingUses": promotion.remaining_uses()
        }),
        Err(rejection) => serde_json::json!({
            "valid": false,
            "reason": rejection,
            "message": rejection.to_string()
        }),
    };

    Ok(HttpResponse::Ok().json(response))
}

/// Creates a promotion
pub async fn create_promotion(
    state: web::Data<AppState>,
    token: RequesterToken,
    draft: web::Json<PromotionDraft>,
) -> Result<HttpResponse, ApiError> {
    let catalog = state.promotions().await?;
    let promotion = state
        .promotion_admin
        .create(token.as_str(), &draft, &catalog, Utc::now())
        .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "data": promotion
    })))
}

/// Updates a promotion
pub async fn update_promotion(
    state: web::Data<AppState>,
    token: RequesterToken,
    path: web::Path<String>,
    draft: web::Json<PromotionDraft>,
) -> Result<HttpResponse, ApiError> {
    let promotion_id = path.into_inner();
    let catalog = state.promotions().await?;
    let promotion = state
        .promotion_admin
        .update(token.as_str(), &promotion_id, &draft, &catalog, Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": promotion
    })))
}

/// Deletes a promotion
pub async fn delete_promotion(
    state: web::Data<AppState>,
    token: RequesterToken,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let promotion_id = path.into_inner();
    let catalog = state.promotions().await?;
    state
        .promotion_admin
        .delete(token.as_str(), &promotion_id, &catalog)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
