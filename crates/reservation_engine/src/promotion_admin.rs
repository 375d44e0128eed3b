use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::gateway::{GatewayError, PromotionAdminGateway};
use crate::promotion_ledger::{LedgerError, PromotionLedger};
use crate::promotion_validator::PromotionCatalog;
use crate::types::Promotion;

/// Settings an administrator submits when creating or editing a promotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PromotionDraft {
    /// Code guests will type; unique ignoring case
    #[serde(rename = "promotionCode")]
    #[validate(length(min = 1, max = 64, message = "Promotion code is required"))]
    pub code: String,

    /// Discount on the base amount
    #[validate(range(min = 1, max = 100, message = "Discount must be between 1 and 100 percent"))]
    pub discount_percentage: u8,

    /// Last instant the code can be redeemed
    #[serde(rename = "expiredDate")]
    pub expires_at: DateTime<Utc>,

    /// Minimum base amount
    #[serde(default)]
    #[validate(custom(function = "validate_min_spend"))]
    pub min_spend: Decimal,

    /// Redemption limit
    #[validate(range(min = 1, message = "Usage limit must be positive"))]
    pub max_uses: u32,
}

impl PromotionDraft {
    /// Values the admin form starts from: 10% off, valid for 30 days, no minimum
    /// spend, 100 uses
    pub fn template(now: DateTime<Utc>) -> Self {
        Self {
            code: String::new(),
            discount_percentage: 10,
            expires_at: now + Duration::days(30),
            min_spend: Decimal::ZERO,
            max_uses: 100,
        }
    }
}

fn validate_min_spend(min_spend: &Decimal) -> Result<(), validator::ValidationError> {
    if *min_spend < Decimal::ZERO {
        return Err(validator::ValidationError::new("negative_min_spend"));
    }
    Ok(())
}

/// Administrative promotion errors
#[derive(thiserror::Error, Debug)]
pub enum PromotionAdminError {
    /// Field-level validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another promotion already uses this code
    #[error("Promotion code {0} already exists")]
    DuplicateCode(String),

    /// Expiry is not after the current instant
    #[error("Expiry date must be in the future")]
    ExpiryNotInFuture,

    /// No such promotion
    #[error("Promotion {0} not found")]
    NotFound(String),

    /// The new limit is below redemptions already made
    #[error("Usage limit {requested} is below the {used} redemptions already made")]
    LimitBelowUsage {
        /// Limit asked for
        requested: u32,
        /// Redemptions already made
        used: u32,
    },

    /// The persistence API failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The ledger failed
    #[error("Promotion ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for PromotionAdminError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::LimitBelowUsage { requested, used } => {
                PromotionAdminError::LimitBelowUsage { requested, used }
            }
            other => PromotionAdminError::Ledger(other),
        }
    }
}

impl actix_web::ResponseError for PromotionAdminError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::{HttpResponse, ResponseError};

        match self {
            PromotionAdminError::Validation(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "validation_error",
                    "message": msg
                }))
            }
            PromotionAdminError::DuplicateCode(_) => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "duplicate_code",
                    "message": self.to_string()
                }))
            }
            PromotionAdminError::ExpiryNotInFuture => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "expiry_not_in_future",
                    "message": self.to_string()
                }))
            }
            PromotionAdminError::NotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "promotion_not_found",
                "message": self.to_string()
            })),
            PromotionAdminError::LimitBelowUsage { .. } => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "limit_below_usage",
                    "message": self.to_string()
                }))
            }
            PromotionAdminError::Gateway(error) => error.error_response(),
            PromotionAdminError::Ledger(_) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "ledger_unavailable",
                    "message": "Promotion ledger is temporarily unavailable"
                }))
            }
        }
    }
}

/// Checks a draft for a new promotion against the current catalog
pub fn validate_new(
    draft: &PromotionDraft,
    catalog: &PromotionCatalog,
    now: DateTime<Utc>,
) -> Result<(), PromotionAdminError> {
    check_draft(draft, catalog, None, now)
}

/// Checks an edit of `promotion_id`; the promotion's own code does not count as a
/// duplicate, and the limit may not drop below the uses already recorded
pub fn validate_update(
    promotion_id: &str,
    draft: &PromotionDraft,
    catalog: &PromotionCatalog,
    now: DateTime<Utc>,
) -> Result<(), PromotionAdminError> {
    let current = catalog
        .find_by_id(promotion_id)
        .ok_or_else(|| PromotionAdminError::NotFound(promotion_id.to_string()))?;

    check_draft(draft, catalog, Some(promotion_id), now)?;

    if draft.max_uses < current.used_count {
        return Err(PromotionAdminError::LimitBelowUsage {
            requested: draft.max_uses,
            used: current.used_count,
        });
    }

    Ok(())
}

fn check_draft(
    draft: &PromotionDraft,
    catalog: &PromotionCatalog,
    own_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), PromotionAdminError> {
    draft
        .validate()
        .map_err(|e| PromotionAdminError::Validation(e.to_string()))?;

    let code = draft.code.trim();
    if code.is_empty() {
        return Err(PromotionAdminError::Validation(
            "Promotion code is required".to_string(),
        ));
    }

    if catalog
        .promotions()
        .iter()
        .any(|p| Some(p.id.as_str()) != own_id && p.matches_code(code))
    {
        return Err(PromotionAdminError::DuplicateCode(code.to_string()));
    }

    if draft.expires_at <= now {
        return Err(PromotionAdminError::ExpiryNotInFuture);
    }

    Ok(())
}

/// Promotion administration: validates edits, persists them, and keeps the
/// redemption ledger in step with the catalog
#[derive(Clone)]
pub struct PromotionAdmin {
    gateway: Arc<dyn PromotionAdminGateway>,
    ledger: Arc<dyn PromotionLedger>,
}

impl PromotionAdmin {
    /// Creates the service
    pub fn new(gateway: Arc<dyn PromotionAdminGateway>, ledger: Arc<dyn PromotionLedger>) -> Self {
        Self { gateway, ledger }
    }

    /// Creates a promotion and starts tracking its redemptions
    pub async fn create(
        &self,
        token: &str,
        draft: &PromotionDraft,
        catalog: &PromotionCatalog,
        now: DateTime<Utc>,
    ) -> Result<Promotion, PromotionAdminError> {
        validate_new(draft, catalog, now)?;

        let draft = normalized(draft);
        let promotion = self.gateway.create_promotion(token, &draft).await?;
        self.ledger
            .register(&promotion.id, promotion.max_uses, promotion.used_count)
            .await?;

        info!(
            "Created promotion {} ({}% off, {} uses)",
            promotion.code, promotion.discount_percentage, promotion.max_uses
        );
        Ok(promotion)
    }

    /// Updates a promotion. Reservations already holding it keep the percentage they
    /// were priced with.
    pub async fn update(
        &self,
        token: &str,
        promotion_id: &str,
        draft: &PromotionDraft,
        catalog: &PromotionCatalog,
        now: DateTime<Utc>,
    ) -> Result<Promotion, PromotionAdminError> {
        validate_update(promotion_id, draft, catalog, now)?;
        let previous = catalog
            .find_by_id(promotion_id)
            .ok_or_else(|| PromotionAdminError::NotFound(promotion_id.to_string()))?;

        // The ledger has the final say on the usage floor
        let tracked = match self.ledger.reconfigure(promotion_id, draft.max_uses).await {
            Ok(()) => true,
            Err(LedgerError::UnknownPromotion(_)) => false,
            Err(error) => return Err(error.into()),
        };

        let draft = normalized(draft);
        let promotion = match self.gateway.update_promotion(token, promotion_id, &draft).await {
            Ok(promotion) => promotion,
            Err(error) => {
                if tracked {
                    if let Err(restore_error) = self
                        .ledger
                        .reconfigure(promotion_id, previous.max_uses)
                        .await
                    {
                        warn!(
                            "Could not restore usage limit of promotion {}: {}",
                            promotion_id, restore_error
                        );
                    }
                }
                return Err(error.into());
            }
        };

        if !tracked {
            self.ledger
                .register(&promotion.id, promotion.max_uses, promotion.used_count)
                .await?;
        }

        info!("Updated promotion {}", promotion.code);
        Ok(promotion)
    }

    /// Deletes a promotion. The ledger retires it first, so no booking can take a
    /// slot of a promotion that is being removed, even one priced from a catalog
    /// that still lists it. A failed delete reinstates it.
    pub async fn delete(
        &self,
        token: &str,
        promotion_id: &str,
        catalog: &PromotionCatalog,
    ) -> Result<(), PromotionAdminError> {
        let current = catalog
            .find_by_id(promotion_id)
            .ok_or_else(|| PromotionAdminError::NotFound(promotion_id.to_string()))?;

        self.ledger.retire(promotion_id).await?;

        if let Err(error) = self.gateway.delete_promotion(token, promotion_id).await {
            if let Err(restore_error) = self
                .ledger
                .reinstate(promotion_id, current.max_uses, current.used_count)
                .await
            {
                warn!(
                    "Could not restore ledger entry of promotion {}: {}",
                    promotion_id, restore_error
                );
            }
            return Err(error.into());
        }

        info!("Deleted promotion {}", current.code);
        Ok(())
    }
}

fn normalized(draft: &PromotionDraft) -> PromotionDraft {
    PromotionDraft {
        code: draft.code.trim().to_string(),
        ..draft.clone()
    }
}
