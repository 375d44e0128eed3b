use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::date_policy::{DateRangePolicy, PolicyNotice};
use crate::gateway::{GatewayError, ReservationGateway};
use crate::pricing::PriceCalculator;
use crate::promotion_ledger::{LedgerError, PromotionLedger};
use crate::promotion_validator::{PromotionCatalog, PromotionRejection, PromotionValidator};
use crate::types::*;

/// Raw booking form input; every field may still be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDraft {
    /// Guest name
    #[serde(default, rename = "nameLastname")]
    pub name: Option<String>,
    /// Guest telephone number
    #[serde(default)]
    pub tel: Option<String>,
    /// Selected campground
    #[serde(default, rename = "campground")]
    pub campground_id: Option<String>,
    /// Requested check-in
    #[serde(default)]
    pub check_in_date: Option<NaiveDate>,
    /// Requested check-out
    #[serde(default)]
    pub check_out_date: Option<NaiveDate>,
    /// Breakfast add-on
    #[serde(default)]
    pub breakfast: bool,
    /// Promotion code typed by the guest
    #[serde(default)]
    pub promotion_code: Option<String>,
}

/// A required form field that is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldError {
    /// Guest name is empty
    NameRequired,
    /// Telephone number is empty
    PhoneRequired,
    /// No check-in date
    CheckInRequired,
    /// No check-out date
    CheckOutRequired,
    /// No campground selected
    CampgroundRequired,
}

impl FieldError {
    /// Form field the error belongs to
    pub fn field(&self) -> &'static str {
        match self {
            FieldError::NameRequired => "nameLastname",
            FieldError::PhoneRequired => "tel",
            FieldError::CheckInRequired => "checkInDate",
            FieldError::CheckOutRequired => "checkOutDate",
            FieldError::CampgroundRequired => "campground",
        }
    }

    /// Message shown next to the field
    pub fn message(&self) -> &'static str {
        match self {
            FieldError::NameRequired => "Name is required",
            FieldError::PhoneRequired => "Telephone number is required",
            FieldError::CheckInRequired => "Check-in date is required",
            FieldError::CheckOutRequired => "Check-out date is required",
            FieldError::CampgroundRequired => "Please select a campground",
        }
    }
}

/// Why a draft could not be priced
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// One or more required fields are missing; all of them are listed
    #[error("Missing required fields: {}", .0.iter().map(|e| e.field()).collect::<Vec<_>>().join(", "))]
    MissingFields(Vec<FieldError>),

    /// The selected campground is not in the catalog
    #[error("Campground {0} not found")]
    UnknownCampground(String),

    /// The dates break the booking rules
    #[error(transparent)]
    DateRange(#[from] DateRangeError),
}

/// A draft that passed every rule, with its price
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedReservation {
    /// Request ready for the persistence API
    pub request: ReservationRequest,
    /// Campground snapshot the price was computed from
    pub campground: Campground,
    /// Nights in the stay
    pub nights: u32,
    /// Correction made to the dates, if any
    pub notice: Option<PolicyNotice>,
    /// Promotion priced into the request
    pub applied_promotion: Option<AppliedPromotion>,
    /// Why the typed promotion code was not applied
    pub promotion_rejection: Option<PromotionRejection>,
}

/// An existing reservation after an amendment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmendedReservation {
    /// The reservation as it will be after the update
    pub reservation: Reservation,
    /// Body for the persistence API
    #[serde(skip)]
    pub patch: ReservationPatch,
    /// Correction made to the dates, if any
    pub notice: Option<PolicyNotice>,
}

/// Turns booking input into priced reservation requests
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationAssembler {
    policy: DateRangePolicy,
    calculator: PriceCalculator,
}

impl ReservationAssembler {
    /// Creates an assembler from its policy and calculator
    pub fn new(policy: DateRangePolicy, calculator: PriceCalculator) -> Self {
        Self { policy, calculator }
    }

    /// Validates and prices a draft.
    ///
    /// A promotion code that fails validation does not fail assembly: the request is
    /// priced without a discount and the rejection is reported alongside it.
    pub fn assemble(
        &self,
        draft: &ReservationDraft,
        campgrounds: &[Campground],
        promotions: &PromotionCatalog,
        now: DateTime<Utc>,
    ) -> Result<PricedReservation, AssemblyError> {
        let name = non_blank(draft.name.as_deref());
        let tel = non_blank(draft.tel.as_deref());
        let campground_id = non_blank(draft.campground_id.as_deref());

        let mut missing = Vec::new();
        if name.is_none() {
            missing.push(FieldError::NameRequired);
        }
        if tel.is_none() {
            missing.push(FieldError::PhoneRequired);
        }
        if draft.check_in_date.is_none() {
            missing.push(FieldError::CheckInRequired);
        }
        if draft.check_out_date.is_none() {
            missing.push(FieldError::CheckOutRequired);
        }
        if campground_id.is_none() {
            missing.push(FieldError::CampgroundRequired);
        }

        let (Some(name), Some(tel), Some(campground_id)) = (name, tel, campground_id) else {
            return Err(AssemblyError::MissingFields(missing));
        };
        if !missing.is_empty() {
            return Err(AssemblyError::MissingFields(missing));
        }

        let campground = campgrounds
            .iter()
            .find(|c| c.id == campground_id)
            .ok_or_else(|| AssemblyError::UnknownCampground(campground_id.to_string()))?;

        let normalized =
            self.policy
                .normalize(draft.check_in_date, draft.check_out_date, now.date_naive())?;
        let dates = normalized
            .date_range()
            .ok_or(AssemblyError::MissingFields(vec![FieldError::CheckOutRequired]))?;

        let requester = Requester {
            name: name.to_string(),
            tel: tel.to_string(),
        };

        let mut priced = self.price(
            requester,
            campground,
            dates,
            draft.breakfast,
            None,
            normalized.notice,
        );

        if let Some(code) = non_blank(draft.promotion_code.as_deref()) {
            let spend = priced.request.price.base_amount;
            match promotions.check(code, spend, now) {
                Ok(promotion) => {
                    let applied = AppliedPromotion::from(promotion);
                    priced = self.price(
                        priced.request.requester,
                        campground,
                        dates,
                        draft.breakfast,
                        Some(applied),
                        normalized.notice,
                    );
                }
                Err(rejection) => {
                    debug!("Promotion code {:?} not applied: {}", code, rejection);
                    priced.promotion_rejection = Some(rejection);
                }
            }
        }

        Ok(priced)
    }

    /// Re-prices a priced reservation without its promotion, recording why
    pub fn without_promotion(
        &self,
        priced: &PricedReservation,
        rejection: PromotionRejection,
    ) -> PricedReservation {
        let mut repriced = self.price(
            priced.request.requester.clone(),
            &priced.campground,
            priced.request.dates,
            priced.request.breakfast,
            None,
            priced.notice,
        );
        repriced.promotion_rejection = Some(rejection);
        repriced
    }

    /// Re-validates and re-prices an existing reservation after a date change or a
    /// breakfast toggle. The promotion redeemed at booking time keeps its percentage.
    pub fn amend(
        &self,
        reservation: &Reservation,
        amendment: &ReservationAmendment,
        campground: &Campground,
        now: DateTime<Utc>,
    ) -> Result<AmendedReservation, AssemblyError> {
        if campground.id != reservation.campground_id {
            return Err(AssemblyError::UnknownCampground(
                reservation.campground_id.clone(),
            ));
        }

        let check_in = amendment
            .check_in_date
            .unwrap_or_else(|| reservation.dates.check_in());
        let check_out = amendment
            .check_out_date
            .unwrap_or_else(|| reservation.dates.check_out());

        let normalized = self
            .policy
            .normalize(Some(check_in), Some(check_out), now.date_naive())?;
        let dates = normalized
            .date_range()
            .ok_or(AssemblyError::MissingFields(vec![FieldError::CheckOutRequired]))?;

        let priced = self.price(
            reservation.requester.clone(),
            campground,
            dates,
            amendment.breakfast.unwrap_or(reservation.breakfast),
            reservation.promotion.clone(),
            normalized.notice,
        );

        let patch = ReservationPatch {
            dates,
            breakfast: priced.request.breakfast,
            total_price: priced.request.total_price,
            price: priced.request.price.clone(),
        };

        let reservation = Reservation {
            dates,
            breakfast: priced.request.breakfast,
            price: priced.request.price,
            ..reservation.clone()
        };

        Ok(AmendedReservation {
            reservation,
            patch,
            notice: normalized.notice,
        })
    }

    fn price(
        &self,
        requester: Requester,
        campground: &Campground,
        dates: DateRange,
        breakfast_selected: bool,
        applied_promotion: Option<AppliedPromotion>,
        notice: Option<PolicyNotice>,
    ) -> PricedReservation {
        let breakfast_rate = campground.offered_breakfast_rate();
        let breakfast = breakfast_selected && breakfast_rate.is_some();
        let nights = dates.nights();

        let price = self.calculator.price(
            campground.nightly_rate,
            nights,
            breakfast,
            breakfast_rate,
            applied_promotion.as_ref().map(|p| p.discount_percentage),
        );

        PricedReservation {
            request: ReservationRequest {
                requester,
                campground_id: campground.id.clone(),
                dates,
                breakfast,
                promotion_code: applied_promotion.as_ref().map(|p| p.code.clone()),
                total_price: price.total_amount,
                price,
            },
            campground: campground.clone(),
            nights,
            notice,
            applied_promotion,
            promotion_rejection: None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Where a booking attempt stands
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionState {
    /// Input is missing or invalid; `None` until the first revision
    Incomplete(Option<AssemblyError>),
    /// Every rule passed and a price is known
    Priced(PricedReservation),
    /// The request is with the persistence API
    Submitting(PricedReservation),
    /// The persistence API accepted the reservation
    Confirmed(Reservation),
    /// The persistence API refused or could not be reached
    Failed {
        /// Input kept for the retry
        priced: PricedReservation,
        /// Failure surfaced to the caller
        reason: String,
    },
}

impl SubmissionState {
    fn label(&self) -> &'static str {
        match self {
            SubmissionState::Incomplete(_) => "incomplete",
            SubmissionState::Priced(_) => "priced",
            SubmissionState::Submitting(_) => "submitting",
            SubmissionState::Confirmed(_) => "confirmed",
            SubmissionState::Failed { .. } => "failed",
        }
    }
}

/// Why a submission did not confirm
#[derive(thiserror::Error, Debug)]
pub enum SubmissionError {
    /// Submit was called while the attempt was not priced
    #[error("Reservation is not ready to submit (state: {0})")]
    NotPriced(&'static str),

    /// The promotion ran out (or was deleted) between pricing and submission; the
    /// attempt has been re-priced without it
    #[error("Promotion code {code} is no longer available")]
    PromotionUnavailable {
        /// Code that was dropped
        code: String,
    },

    /// The ledger itself failed; nothing was redeemed
    #[error("Promotion ledger error: {0}")]
    Ledger(LedgerError),

    /// The persistence API refused or failed; input is kept for a retry
    #[error(transparent)]
    External(#[from] GatewayError),
}

/// One guest's booking form, driven through
/// Incomplete → Priced → Submitting → Confirmed, with failures returning to Priced.
#[derive(Debug, Clone)]
pub struct BookingAttempt {
    assembler: ReservationAssembler,
    state: SubmissionState,
}

impl BookingAttempt {
    /// Starts an empty attempt
    pub fn new(assembler: ReservationAssembler) -> Self {
        Self {
            assembler,
            state: SubmissionState::Incomplete(None),
        }
    }

    /// Current state
    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Priced reservation, when there is one
    pub fn priced(&self) -> Option<&PricedReservation> {
        match &self.state {
            SubmissionState::Priced(priced) | SubmissionState::Submitting(priced) => Some(priced),
            _ => None,
        }
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!("Booking attempt {} -> {}", self.state.label(), next.label());
        self.state = next;
    }

    /// Re-runs validation and pricing after any input change.
    ///
    /// Falling back to Incomplete drops the applied promotion; it is re-validated on
    /// the next successful revision.
    pub fn revise(
        &mut self,
        draft: &ReservationDraft,
        campgrounds: &[Campground],
        promotions: &PromotionCatalog,
        now: DateTime<Utc>,
    ) -> &SubmissionState {
        let next = match self.assembler.assemble(draft, campgrounds, promotions, now) {
            Ok(priced) => SubmissionState::Priced(priced),
            Err(error) => SubmissionState::Incomplete(Some(error)),
        };
        self.transition(next);
        &self.state
    }

    /// Sends the priced request to the persistence API.
    ///
    /// A promotion is redeemed on the ledger before the booking call, so a
    /// confirmation never carries a discount that cannot be honored. If the booking
    /// call then fails, the redemption is released on a best-effort basis.
    pub async fn submit(
        &mut self,
        gateway: &dyn ReservationGateway,
        ledger: &dyn PromotionLedger,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Reservation, SubmissionError> {
        let priced = match &self.state {
            SubmissionState::Priced(priced) => priced.clone(),
            other => return Err(SubmissionError::NotPriced(other.label())),
        };
        self.transition(SubmissionState::Submitting(priced.clone()));

        let mut redeemed = None;
        if let Some(applied) = &priced.applied_promotion {
            match ledger.try_redeem(&applied.promotion_id).await {
                Ok(redemption) => {
                    debug!(
                        "Promotion {} redeemed ({}/{})",
                        applied.code, redemption.used_count, redemption.max_uses
                    );
                    redeemed = Some(applied.promotion_id.clone());
                }
                Err(LedgerError::RedemptionLimitReached | LedgerError::UnknownPromotion(_)) => {
                    info!(
                        "Promotion {} lost to a concurrent redemption; re-pricing without it",
                        applied.code
                    );
                    let repriced = self.assembler.without_promotion(
                        &priced,
                        PromotionRejection::RedemptionLimitReached,
                    );
                    self.transition(SubmissionState::Priced(repriced));
                    return Err(SubmissionError::PromotionUnavailable {
                        code: applied.code.clone(),
                    });
                }
                Err(error) => {
                    warn!("Promotion ledger failed: {}", error);
                    self.transition(SubmissionState::Priced(priced));
                    return Err(SubmissionError::Ledger(error));
                }
            }
        }

        match gateway.create_reservation(token, &priced.request).await {
            Ok(receipt) => {
                info!(
                    "Reservation {} confirmed at campground {}",
                    receipt.reservation_id, priced.request.campground_id
                );
                let reservation = Reservation {
                    id: Some(receipt.reservation_id),
                    requester: priced.request.requester.clone(),
                    campground_id: priced.request.campground_id.clone(),
                    dates: priced.request.dates,
                    breakfast: priced.request.breakfast,
                    price: priced.request.price.clone(),
                    promotion: priced.applied_promotion.clone(),
                    created_at: Some(now),
                };
                self.transition(SubmissionState::Confirmed(reservation.clone()));
                Ok(reservation)
            }
            Err(error) => {
                warn!("Reservation request failed: {}", error);
                if let Some(promotion_id) = redeemed {
                    if let Err(release_error) = ledger.release(&promotion_id).await {
                        warn!(
                            "Could not release redemption of promotion {}: {}",
                            promotion_id, release_error
                        );
                    }
                }
                self.transition(SubmissionState::Failed {
                    priced: priced.clone(),
                    reason: error.to_string(),
                });
                self.transition(SubmissionState::Priced(priced));
                Err(SubmissionError::External(error))
            }
        }
    }
}

impl actix_web::ResponseError for AssemblyError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            AssemblyError::MissingFields(errors) => {
                let fields: Vec<serde_json::Value> = errors
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "field": e.field(),
                            "error": e,
                            "message": e.message(),
                        })
                    })
                    .collect();
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "validation_error",
                    "message": self.to_string(),
                    "fields": fields
                }))
            }
            AssemblyError::UnknownCampground(_) => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "campground_not_found",
                    "message": self.to_string()
                }))
            }
            AssemblyError::DateRange(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid_date_range",
                "message": self.to_string()
            })),
        }
    }
}

impl actix_web::ResponseError for SubmissionError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            SubmissionError::NotPriced(_) => HttpResponse::Conflict().json(serde_json::json!({
                "error": "not_priced",
                "message": self.to_string()
            })),
            SubmissionError::PromotionUnavailable { code } => {
                HttpResponse::Conflict().json(serde_json::json!({
                    "error": "promotion_unavailable",
                    "message": self.to_string(),
                    "code": code
                }))
            }
            SubmissionError::External(GatewayError::Rejected { message, .. }) => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "booking_rejected",
                    "message": message
                }))
            }
            SubmissionError::External(error) => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "booking_api_unavailable",
                    "message": error.to_string()
                }))
            }
            SubmissionError::Ledger(_) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "ledger_unavailable",
                    "message": "Promotion redemption is temporarily unavailable"
                }))
            }
        }
    }
}

impl actix_web::ResponseError for GatewayError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            GatewayError::Rejected { status: 404, message } => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "not_found",
                    "message": message
                }))
            }
            GatewayError::Rejected { message, .. } => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "booking_rejected",
                    "message": message
                }))
            }
            _ => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "booking_api_unavailable",
                "message": self.to_string()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    use crate::gateway::BookingReceipt;
    use crate::promotion_ledger::InMemoryPromotionLedger;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 5, 9, 30, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn campground() -> Campground {
        Campground {
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
        }
    }

    fn promotion(max_uses: u32) -> Promotion {
        Promotion {
            id: "promo-1".to_string(),
            code: "CAMP20".to_string(),
            discount_percentage: 20,
            expires_at: now() + Duration::days(30),
            min_spend: dec!(100),
            max_uses,
            used_count: 0,
        }
    }

    fn draft() -> ReservationDraft {
        ReservationDraft {
            name: Some("Jo Camper".to_string()),
            tel: Some("0812345678".to_string()),
            campground_id: Some("cg-1".to_string()),
            check_in_date: Some(day(2025, 1, 10)),
            check_out_date: Some(day(2025, 1, 13)),
            breakfast: true,
            promotion_code: Some("camp20".to_string()),
        }
    }

    struct FakeGateway {
        fail_with: Option<GatewayError>,
        calls: AtomicUsize,
        last_request: Mutex<Option<ReservationRequest>>,
    }

    impl FakeGateway {
        fn accepting() -> Self {
            Self {
                fail_with: None,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn failing(error: GatewayError) -> Self {
            Self {
                fail_with: Some(error),
                ..Self::accepting()
            }
        }
    }

    #[async_trait::async_trait]
    impl ReservationGateway for FakeGateway {
        async fn create_reservation(
            &self,
            _token: &str,
            request: &ReservationRequest,
        ) -> Result<BookingReceipt, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            match &self.fail_with {
                Some(error) => Err(error.clone()),
                None => Ok(BookingReceipt {
                    reservation_id: "res-1".to_string(),
                    message: None,
                }),
            }
        }

        async fn update_reservation(
            &self,
            _token: &str,
            _reservation_id: &str,
            _patch: &ReservationPatch,
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn delete_reservation(
            &self,
            _token: &str,
            _reservation_id: &str,
        ) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn list_reservations(&self, _token: &str) -> Result<Vec<Reservation>, GatewayError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_full_scenario_price() {
        let catalog = PromotionCatalog::new(vec![promotion(5)]);
        let priced = ReservationAssembler::default()
            .assemble(&draft(), &[campground()], &catalog, now())
            .unwrap();

        let price = &priced.request.price;
        assert_eq!(price.base_amount, dec!(150));
        assert_eq!(price.breakfast_amount, dec!(45));
        assert_eq!(price.discount_amount, dec!(30));
        assert_eq!(price.total_amount, dec!(165));
        assert_eq!(priced.request.total_price, dec!(165));
        assert_eq!(priced.request.promotion_code.as_deref(), Some("CAMP20"));
        assert!(priced.promotion_rejection.is_none());
    }

    #[test]
    fn test_all_missing_fields_reported_together() {
        let error = ReservationAssembler::default()
            .assemble(
                &ReservationDraft {
                    name: Some("   ".to_string()),
                    ..ReservationDraft::default()
                },
                &[campground()],
                &PromotionCatalog::default(),
                now(),
            )
            .unwrap_err();

        assert_eq!(
            error,
            AssemblyError::MissingFields(vec![
                FieldError::NameRequired,
                FieldError::PhoneRequired,
                FieldError::CheckInRequired,
                FieldError::CheckOutRequired,
                FieldError::CampgroundRequired,
            ])
        );
    }

    #[test]
    fn test_unknown_code_books_without_discount() {
        let mut input = draft();
        input.promotion_code = Some("NOPE".to_string());

        let priced = ReservationAssembler::default()
            .assemble(&input, &[campground()], &PromotionCatalog::default(), now())
            .unwrap();

        assert_eq!(
            priced.promotion_rejection,
            Some(PromotionRejection::CodeNotFound)
        );
        assert_eq!(priced.request.price.discount_amount, dec!(0));
        assert_eq!(priced.request.price.total_amount, dec!(195));
        assert!(priced.request.promotion_code.is_none());
    }

    #[test]
    fn test_long_stay_is_clamped_and_priced_for_three_nights() {
        let mut input = draft();
        input.check_out_date = Some(day(2025, 1, 20));
        input.promotion_code = None;

        let priced = ReservationAssembler::default()
            .assemble(&input, &[campground()], &PromotionCatalog::default(), now())
            .unwrap();

        assert_eq!(priced.nights, 3);
        assert_eq!(priced.request.dates.check_out(), day(2025, 1, 13));
        assert!(matches!(priced.notice, Some(PolicyNotice::Clamped { .. })));
        assert_eq!(priced.request.price.total_amount, dec!(195));
    }

    #[test]
    fn test_breakfast_dropped_when_not_offered() {
        let mut cg = campground();
        cg.breakfast_offered = false;

        let priced = ReservationAssembler::default()
            .assemble(&draft(), &[cg], &PromotionCatalog::default(), now())
            .unwrap();

        assert!(!priced.request.breakfast);
        assert_eq!(priced.request.price.breakfast_amount, dec!(0));
    }

    #[test]
    fn test_date_and_campground_errors() {
        let assembler = ReservationAssembler::default();

        let mut past = draft();
        past.check_in_date = Some(day(2025, 1, 1));
        assert!(matches!(
            assembler.assemble(&past, &[campground()], &PromotionCatalog::default(), now()),
            Err(AssemblyError::DateRange(DateRangeError::CheckInInPast { .. }))
        ));

        let mut unknown = draft();
        unknown.campground_id = Some("cg-9".to_string());
        assert_eq!(
            assembler
                .assemble(&unknown, &[campground()], &PromotionCatalog::default(), now())
                .unwrap_err(),
            AssemblyError::UnknownCampground("cg-9".to_string())
        );
    }

    #[test]
    fn test_returning_to_incomplete_clears_promotion() {
        let catalog = PromotionCatalog::new(vec![promotion(5)]);
        let mut attempt = BookingAttempt::new(ReservationAssembler::default());

        attempt.revise(&draft(), &[campground()], &catalog, now());
        assert!(attempt.priced().unwrap().applied_promotion.is_some());

        let mut edited = draft();
        edited.tel = None;
        attempt.revise(&edited, &[campground()], &catalog, now());
        assert!(matches!(
            attempt.state(),
            SubmissionState::Incomplete(Some(AssemblyError::MissingFields(_)))
        ));
        assert!(attempt.priced().is_none());
    }

    #[tokio::test]
    async fn test_submit_redeems_then_confirms() {
        let catalog = PromotionCatalog::new(vec![promotion(5)]);
        let ledger = InMemoryPromotionLedger::new();
        ledger.register("promo-1", 5, 0).await.unwrap();
        let gateway = FakeGateway::accepting();

        let mut attempt = BookingAttempt::new(ReservationAssembler::default());
        attempt.revise(&draft(), &[campground()], &catalog, now());
        let reservation = attempt.submit(&gateway, &ledger, "token", now()).await.unwrap();

        assert_eq!(reservation.id.as_deref(), Some("res-1"));
        assert_eq!(reservation.price.total_amount, dec!(165));
        assert_eq!(reservation.promotion.unwrap().code, "CAMP20");
        assert_eq!(ledger.redemption_count("promo-1").await.unwrap(), Some(1));
        assert!(matches!(attempt.state(), SubmissionState::Confirmed(_)));

        // A confirmed attempt cannot be submitted twice
        assert!(matches!(
            attempt.submit(&gateway, &ledger, "token", now()).await,
            Err(SubmissionError::NotPriced("confirmed"))
        ));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lost_redemption_reprices_without_promotion() {
        let catalog = PromotionCatalog::new(vec![promotion(1)]);
        let ledger = InMemoryPromotionLedger::new();
        ledger.register("promo-1", 1, 0).await.unwrap();
        // Someone else takes the last slot after pricing
        ledger.try_redeem("promo-1").await.unwrap();
        let gateway = FakeGateway::accepting();

        let mut attempt = BookingAttempt::new(ReservationAssembler::default());
        attempt.revise(&draft(), &[campground()], &catalog, now());
        let result = attempt.submit(&gateway, &ledger, "token", now()).await;

        assert!(matches!(
            result,
            Err(SubmissionError::PromotionUnavailable { ref code }) if code == "CAMP20"
        ));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);

        let priced = attempt.priced().unwrap();
        assert!(priced.applied_promotion.is_none());
        assert_eq!(
            priced.promotion_rejection,
            Some(PromotionRejection::RedemptionLimitReached)
        );
        assert_eq!(priced.request.price.total_amount, dec!(195));

        // The user can go ahead at full price
        let reservation = attempt.submit(&gateway, &ledger, "token", now()).await.unwrap();
        assert!(reservation.promotion.is_none());
        assert_eq!(ledger.redemption_count("promo-1").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_failed_booking_returns_to_priced_and_releases() {
        let catalog = PromotionCatalog::new(vec![promotion(5)]);
        let ledger = InMemoryPromotionLedger::new();
        ledger.register("promo-1", 5, 0).await.unwrap();
        let gateway = FakeGateway::failing(GatewayError::Rejected {
            status: 400,
            message: "Campground is closed".to_string(),
        });

        let mut attempt = BookingAttempt::new(ReservationAssembler::default());
        attempt.revise(&draft(), &[campground()], &catalog, now());
        let error = attempt
            .submit(&gateway, &ledger, "token", now())
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "Campground is closed");
        assert!(matches!(attempt.state(), SubmissionState::Priced(_)));
        assert!(attempt.priced().unwrap().applied_promotion.is_some());
        assert_eq!(ledger.redemption_count("promo-1").await.unwrap(), Some(0));
        assert!(gateway.last_request.lock().unwrap().is_some());
    }

    #[test]
    fn test_amend_reprices_and_keeps_promotion() {
        let reservation = Reservation {
            id: Some("res-1".to_string()),
            requester: Requester {
                name: "Jo Camper".to_string(),
                tel: "0812345678".to_string(),
            },
            campground_id: "cg-1".to_string(),
            dates: DateRange::new(day(2025, 1, 10), day(2025, 1, 11)).unwrap(),
            breakfast: false,
            price: PriceCalculator::default().price(dec!(50), 1, false, None, Some(20)),
            promotion: Some(AppliedPromotion::from(&promotion(5))),
            created_at: Some(now()),
        };

        let amended = ReservationAssembler::default()
            .amend(
                &reservation,
                &ReservationAmendment {
                    check_in_date: None,
                    check_out_date: Some(day(2025, 1, 15)),
                    breakfast: Some(true),
                },
                &campground(),
                now(),
            )
            .unwrap();

        assert_eq!(amended.reservation.dates.nights(), 3);
        assert!(amended.notice.is_some());
        assert!(amended.reservation.breakfast);
        assert_eq!(amended.patch.total_price, dec!(165));
        assert_eq!(amended.reservation.id.as_deref(), Some("res-1"));
        assert_eq!(amended.reservation.promotion, reservation.promotion);
    }
}
