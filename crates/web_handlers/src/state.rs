use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use reservation_engine::{
    Campground, CatalogGateway, PromotionAdmin, PromotionCatalog, PromotionLedger,
    ReservationAssembler, ReservationGateway, ReservationStore,
};

use crate::errors::ApiError;

/// Reservation mirrors, one per requester token
pub type ReservationStores = Arc<Mutex<HashMap<String, ReservationStore>>>;

/// Creates an empty set of reservation mirrors
pub fn create_reservation_stores() -> ReservationStores {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Everything the handlers share
#[derive(Clone)]
pub struct AppState {
    /// Campground and promotion catalog
    pub catalog: Arc<dyn CatalogGateway>,
    /// Reservation persistence
    pub reservations: Arc<dyn ReservationGateway>,
    /// Authoritative promotion redemption counters
    pub ledger: Arc<dyn PromotionLedger>,
    /// Promotion administration
    pub promotion_admin: PromotionAdmin,
    /// Validation and pricing rules
    pub assembler: ReservationAssembler,
    /// Local reservation mirrors
    pub stores: ReservationStores,
}

impl AppState {
    /// Fetches the campground catalog
    pub async fn campgrounds(&self) -> Result<Vec<Campground>, ApiError> {
        Ok(self.catalog.list_campgrounds().await?)
    }

    /// Fetches the promotion catalog and makes sure the ledger tracks every
    /// promotion in it. Registration never lowers a count the ledger already holds.
    pub async fn promotions(&self) -> Result<PromotionCatalog, ApiError> {
        let promotions = self.catalog.list_promotions().await?;

        for promotion in &promotions {
            if let Err(e) = self
                .ledger
                .register(&promotion.id, promotion.max_uses, promotion.used_count)
                .await
            {
                log::warn!("Could not track promotion {} in the ledger: {}", promotion.code, e);
            }
        }

        Ok(PromotionCatalog::new(promotions))
    }

    /// Drops the requester's mirror; returns how many reservations it held
    pub fn forget_requester(&self, token: &str) -> Result<usize, ApiError> {
        let removed = self.lock_stores()?.remove(token);
        Ok(removed.map_or(0, |mut store| {
            let held = store.len();
            store.clear();
            held
        }))
    }

    /// Locks the mirrors
    pub fn lock_stores(&self) -> Result<MutexGuard<'_, HashMap<String, ReservationStore>>, ApiError> {
        self.stores
            .lock()
            .map_err(|_| ApiError::Internal("reservation store lock poisoned".to_string()))
    }
}
