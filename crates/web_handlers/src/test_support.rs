use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use reservation_engine::{
    BookingReceipt, Campground, CatalogGateway, GatewayError, InMemoryPromotionLedger, Promotion,
    PromotionAdmin, PromotionAdminGateway, PromotionDraft, Reservation, ReservationAssembler,
    ReservationGateway, ReservationPatch, ReservationRequest,
};

use crate::state::{AppState, create_reservation_stores};

#[derive(Default)]
struct Inner {
    promotions: Vec<Promotion>,
    reservations: Vec<Reservation>,
    next_id: usize,
    last_token: Option<String>,
    last_patch_total: Option<Decimal>,
}

/// In-process stand-in for the booking API
#[derive(Clone)]
pub struct FakeBookingApi {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBookingApi {
    /// One campground (50 a night, breakfast 15) and one promotion, CAMP20
    pub fn new(max_uses: u32, used_count: u32) -> Self {
        let promotion = Promotion {
            id: "promo-1".to_string(),
            code: "CAMP20".to_string(),
            discount_percentage: 20,
            expires_at: Utc::now() + Duration::days(30),
            min_spend: dec!(100),
            max_uses,
            used_count,
        };

        Self {
            inner: Arc::new(Mutex::new(Inner {
                promotions: vec![promotion],
                ..Inner::default()
            })),
        }
    }

    pub fn last_token(&self) -> Option<String> {
        self.inner.lock().unwrap().last_token.clone()
    }

    pub fn last_patch_total(&self) -> Option<Decimal> {
        self.inner.lock().unwrap().last_patch_total
    }

    pub fn reservation_count(&self) -> usize {
        self.inner.lock().unwrap().reservations.len()
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        format!("{}-{}", prefix, inner.next_id + 100)
    }
}

#[async_trait::async_trait]
impl CatalogGateway for FakeBookingApi {
    async fn list_campgrounds(&self) -> Result<Vec<Campground>, GatewayError> {
        Ok(vec![Campground {
            id: "cg-1".to_string(),
            name: "Pine Ridge".to_string(),
            nightly_rate: dec!(50),
            breakfast_rate: Some(dec!(15)),
            breakfast_offered: true,
            address: None,
            district: None,
            province: None,
            postal_code: None,
            tel: None,
            picture: None,
        }])
    }

    async fn list_promotions(&self) -> Result<Vec<Promotion>, GatewayError> {
        Ok(self.inner.lock().unwrap().promotions.clone())
    }
}

#[async_trait::async_trait]
impl ReservationGateway for FakeBookingApi {
    async fn create_reservation(
        &self,
        token: &str,
        request: &ReservationRequest,
    ) -> Result<BookingReceipt, GatewayError> {
        let id = self.next_id("res");
        let mut inner = self.inner.lock().unwrap();
        inner.last_token = Some(token.to_string());
        inner.reservations.push(Reservation {
            id: Some(id.clone()),
            requester: request.requester.clone(),
            campground_id: request.campground_id.clone(),
            dates: request.dates,
            breakfast: request.breakfast,
            price: request.price.clone(),
            promotion: None,
            created_at: Some(Utc::now()),
        });

        Ok(BookingReceipt {
            reservation_id: id,
            message: None,
        })
    }

    async fn update_reservation(
        &self,
        _token: &str,
        reservation_id: &str,
        patch: &ReservationPatch,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner.last_patch_total = Some(patch.total_price);
        let reservation = inner
            .reservations
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(reservation_id))
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                message: format!("No booking with the id of {}", reservation_id),
            })?;
        reservation.dates = patch.dates;
        reservation.breakfast = patch.breakfast;
        reservation.price = patch.price.clone();
        Ok(())
    }

    async fn delete_reservation(&self, _token: &str, reservation_id: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .reservations
            .retain(|r| r.id.as_deref() != Some(reservation_id));
        Ok(())
    }

    async fn list_reservations(&self, _token: &str) -> Result<Vec<Reservation>, GatewayError> {
        Ok(self.inner.lock().unwrap().reservations.clone())
    }
}

#[async_trait::async_trait]
impl PromotionAdminGateway for FakeBookingApi {
    async fn create_promotion(
        &self,
        _token: &str,
        draft: &PromotionDraft,
    ) -> Result<Promotion, GatewayError> {
        let promotion = Promotion {
            id: self.next_id("promo"),
            code: draft.code.clone(),
            discount_percentage: draft.discount_percentage,
            expires_at: draft.expires_at,
            min_spend: draft.min_spend,
            max_uses: draft.max_uses,
            used_count: 0,
        };
        self.inner.lock().unwrap().promotions.push(promotion.clone());
        Ok(promotion)
    }

    async fn update_promotion(
        &self,
        _token: &str,
        promotion_id: &str,
        draft: &PromotionDraft,
    ) -> Result<Promotion, GatewayError> {
        let mut inner = self.inner.lock().unwrap();
        let promotion = inner
            .promotions
            .iter_mut()
            .find(|p| p.id == promotion_id)
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                message: "Promotion not found".to_string(),
            })?;
        promotion.code = draft.code.clone();
        promotion.discount_percentage = draft.discount_percentage;
        promotion.expires_at = draft.expires_at;
        promotion.min_spend = draft.min_spend;
        promotion.max_uses = draft.max_uses;
        Ok(promotion.clone())
    }

    async fn delete_promotion(&self, _token: &str, promotion_id: &str) -> Result<(), GatewayError> {
        self.inner
            .lock()
            .unwrap()
            .promotions
            .retain(|p| p.id != promotion_id);
        Ok(())
    }
}

/// Application state wired to a fake booking API and an in-memory ledger
pub fn app_state(api: FakeBookingApi) -> AppState {
    let api = Arc::new(api);
    let ledger = Arc::new(InMemoryPromotionLedger::new());

    AppState {
        catalog: api.clone(),
        reservations: api.clone(),
        ledger: ledger.clone(),
        promotion_admin: PromotionAdmin::new(api, ledger),
        assembler: ReservationAssembler::default(),
        stores: create_reservation_stores(),
    }
}
