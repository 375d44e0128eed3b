use serde::{Deserialize, Serialize};

use crate::promotion_admin::PromotionDraft;
use crate::types::{Campground, Promotion, Reservation, ReservationPatch, ReservationRequest};

/// Failures talking to the external persistence API
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The API answered but refused the operation; the message is passed through verbatim
    #[error("{message}")]
    Rejected {
        /// HTTP status returned
        status: u16,
        /// Message returned by the API
        message: String,
    },

    /// The API could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The API answered with a body that could not be understood
    #[error("Data format error: {0}")]
    DataFormat(String),
}

/// Acknowledgement of a created reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingReceipt {
    /// Identifier assigned by the persistence layer
    pub reservation_id: String,
    /// Message returned by the API, if any
    #[serde(default)]
    pub message: Option<String>,
}

/// Read-only access to the campground and promotion catalogs
#[async_trait::async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Lists every campground
    async fn list_campgrounds(&self) -> Result<Vec<Campground>, GatewayError>;

    /// Lists every promotion
    async fn list_promotions(&self) -> Result<Vec<Promotion>, GatewayError>;
}

/// Reservation persistence. The token is opaque and passed through unchanged.
#[async_trait::async_trait]
pub trait ReservationGateway: Send + Sync {
    /// Persists a new reservation
    async fn create_reservation(
        &self,
        token: &str,
        request: &ReservationRequest,
    ) -> Result<BookingReceipt, GatewayError>;

    /// Applies a re-priced amendment to an existing reservation
    async fn update_reservation(
        &self,
        token: &str,
        reservation_id: &str,
        patch: &ReservationPatch,
    ) -> Result<(), GatewayError>;

    /// Cancels a reservation
    async fn delete_reservation(&self, token: &str, reservation_id: &str)
    -> Result<(), GatewayError>;

    /// Lists the requester's reservations
    async fn list_reservations(&self, token: &str) -> Result<Vec<Reservation>, GatewayError>;
}

/// Admin-only promotion persistence
#[async_trait::async_trait]
pub trait PromotionAdminGateway: Send + Sync {
    /// Creates a promotion and returns it as stored
    async fn create_promotion(
        &self,
        token: &str,
        draft: &PromotionDraft,
    ) -> Result<Promotion, GatewayError>;

    /// Replaces a promotion's settings and returns it as stored
    async fn update_promotion(
        &self,
        token: &str,
        promotion_id: &str,
        draft: &PromotionDraft,
    ) -> Result<Promotion, GatewayError>;

    /// Deletes a promotion
    async fn delete_promotion(&self, token: &str, promotion_id: &str) -> Result<(), GatewayError>;
}
