use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::Promotion;

/// Why a promotion cannot be applied; serializes to a stable snake_case code
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionRejection {
    /// No promotion carries this code
    #[error("Promotion code not found")]
    CodeNotFound,

    /// The promotion has expired
    #[error("Promotion code has expired")]
    Expired,

    /// The stay costs less than the promotion's minimum spend
    #[error("Minimum spend for this promotion has not been reached")]
    BelowMinimumSpend,

    /// Every redemption has been used
    #[error("Promotion code is no longer available")]
    RedemptionLimitReached,
}

/// Decides whether a promotion is currently redeemable
pub struct PromotionValidator;

impl PromotionValidator {
    /// Advisory check of a promotion against a candidate spend; the first failing
    /// check wins.
    ///
    /// The binding check happens on the ledger at submission time, since spend and
    /// remaining uses can change in between.
    pub fn validate(
        promotion: Option<&Promotion>,
        candidate_spend: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), PromotionRejection> {
        let promotion = promotion.ok_or(PromotionRejection::CodeNotFound)?;

        if now >= promotion.expires_at {
            return Err(PromotionRejection::Expired);
        }

        if candidate_spend < promotion.min_spend {
            return Err(PromotionRejection::BelowMinimumSpend);
        }

        if promotion.used_count >= promotion.max_uses {
            return Err(PromotionRejection::RedemptionLimitReached);
        }

        Ok(())
    }
}

/// Snapshot of the promotions known at validation time
#[derive(Debug, Clone, Default)]
pub struct PromotionCatalog {
    promotions: Vec<Promotion>,
}

impl PromotionCatalog {
    /// Wraps a list fetched from the persistence API
    pub fn new(promotions: Vec<Promotion>) -> Self {
        Self { promotions }
    }

    /// Finds a promotion by code, ignoring case and surrounding whitespace
    pub fn find_by_code(&self, code: &str) -> Option<&Promotion> {
        self.promotions.iter().find(|p| p.matches_code(code))
    }

    /// Finds a promotion by identifier
    pub fn find_by_id(&self, id: &str) -> Option<&Promotion> {
        self.promotions.iter().find(|p| p.id == id)
    }

    /// Resolves `code` and validates it in one step
    pub fn check(
        &self,
        code: &str,
        candidate_spend: Decimal,
        now: DateTime<Utc>,
    ) -> Result<&Promotion, PromotionRejection> {
        let promotion = self.find_by_code(code);
        PromotionValidator::validate(promotion, candidate_spend, now)?;
        promotion.ok_or(PromotionRejection::CodeNotFound)
    }

    /// All promotions in the snapshot
    pub fn promotions(&self) -> &[Promotion] {
        &self.promotions
    }
}
