use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Longest stay a single reservation may cover
pub const MAX_STAY_NIGHTS: u32 = 3;

/// A campground as published by the external catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campground {
    /// Catalog identifier
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Display name
    pub name: String,
    /// Price of one night
    #[serde(default)]
    pub nightly_rate: Decimal,
    /// Price of breakfast for one night, when the campground sets one
    #[serde(default)]
    pub breakfast_rate: Option<Decimal>,
    /// Whether the breakfast add-on can be booked at all
    #[serde(default, rename = "breakfast")]
    pub breakfast_offered: bool,
    /// Street address
    #[serde(default)]
    pub address: Option<String>,
    /// District
    #[serde(default)]
    pub district: Option<String>,
    /// Province
    #[serde(default)]
    pub province: Option<String>,
    /// Postal code
    #[serde(default, rename = "postalcode")]
    pub postal_code: Option<String>,
    /// Contact telephone number
    #[serde(default)]
    pub tel: Option<String>,
    /// Picture URL
    #[serde(default)]
    pub picture: Option<String>,
}

impl Campground {
    /// Breakfast rate that may actually be charged: `None` unless breakfast is offered.
    pub fn offered_breakfast_rate(&self) -> Option<Decimal> {
        if self.breakfast_offered {
            Some(self.breakfast_rate.unwrap_or_default())
        } else {
            None
        }
    }
}

/// A promotion code as stored by the external persistence API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    /// Persistence identifier
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Code typed by guests; unique ignoring case
    #[serde(rename = "promotionCode")]
    pub code: String,
    /// Discount on the base amount, 1 to 100
    pub discount_percentage: u8,
    /// Instant after which the code can no longer be redeemed
    #[serde(rename = "expiredDate")]
    pub expires_at: DateTime<Utc>,
    /// Minimum base amount the code applies to
    #[serde(default)]
    pub min_spend: Decimal,
    /// Maximum number of redemptions
    pub max_uses: u32,
    /// Redemptions so far
    #[serde(default, rename = "usedCount")]
    pub used_count: u32,
}

impl Promotion {
    /// Case-insensitive comparison against a code typed by a guest.
    pub fn matches_code(&self, code: &str) -> bool {
        self.code.trim().eq_ignore_ascii_case(code.trim())
    }

    /// Redemptions left before the limit is reached
    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.used_count)
    }
}

/// A validated stay. Both endpoints are calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "DateRangeFields")]
pub struct DateRange {
    check_in_date: NaiveDate,
    check_out_date: NaiveDate,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateRangeFields {
    check_in_date: NaiveDate,
    check_out_date: NaiveDate,
}

impl TryFrom<DateRangeFields> for DateRange {
    type Error = DateRangeError;

    fn try_from(fields: DateRangeFields) -> Result<Self, Self::Error> {
        DateRange::new(fields.check_in_date, fields.check_out_date)
    }
}

impl DateRange {
    /// Builds a range, enforcing `check_out > check_in` and the maximum stay.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, DateRangeError> {
        let nights = (check_out - check_in).num_days();
        if nights <= 0 {
            return Err(DateRangeError::CheckOutNotAfterCheckIn);
        }
        if nights > i64::from(MAX_STAY_NIGHTS) {
            return Err(DateRangeError::StayTooLong {
                nights,
                max: MAX_STAY_NIGHTS,
            });
        }

        Ok(Self {
            check_in_date: check_in,
            check_out_date: check_out,
        })
    }

    /// Check-in day
    pub fn check_in(&self) -> NaiveDate {
        self.check_in_date
    }

    /// Check-out day
    pub fn check_out(&self) -> NaiveDate {
        self.check_out_date
    }

    /// Whole nights between check-in and check-out
    pub fn nights(&self) -> u32 {
        // Construction guarantees 1..=MAX_STAY_NIGHTS
        (self.check_out_date - self.check_in_date).num_days() as u32
    }
}

/// Date-range violations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    /// No check-in date was given
    #[error("Check-in date is required")]
    MissingCheckIn,

    /// Check-in lies before the current calendar day
    #[error("Check-in date {check_in} is in the past (today is {today})")]
    CheckInInPast {
        /// Requested check-in
        check_in: NaiveDate,
        /// Current calendar day
        today: NaiveDate,
    },

    /// Check-out is on or before check-in
    #[error("Check-out date must be after check-in date")]
    CheckOutNotAfterCheckIn,

    /// The stay is longer than allowed; only raised when building a range directly
    #[error("A stay of {nights} nights exceeds the maximum of {max} nights")]
    StayTooLong {
        /// Requested nights
        nights: i64,
        /// Allowed nights
        max: u32,
    },
}

/// Itemized price of a stay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    /// Nightly rate times nights
    pub base_amount: Decimal,
    /// Breakfast rate times nights, zero when not booked
    pub breakfast_amount: Decimal,
    /// Promotion discount, computed on the base amount only
    pub discount_amount: Decimal,
    /// Amount due, rounded to cents
    pub total_amount: Decimal,
    /// Set when a misconfigured discount would have made the total negative
    #[serde(default)]
    pub total_clamped: bool,
}

/// A promotion that has been applied to a reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPromotion {
    /// Identifier of the redeemed promotion
    #[serde(default)]
    pub promotion_id: String,
    /// Code as configured by the administrator
    pub code: String,
    /// Discount percentage in force when the promotion was redeemed
    pub discount_percentage: u8,
}

impl From<&Promotion> for AppliedPromotion {
    fn from(promotion: &Promotion) -> Self {
        Self {
            promotion_id: promotion.id.clone(),
            code: promotion.code.clone(),
            discount_percentage: promotion.discount_percentage,
        }
    }
}

/// Who the reservation is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Full name of the guest
    #[serde(rename = "nameLastname")]
    pub name: String,
    /// Contact telephone number
    pub tel: String,
}

/// Body of the external "create reservation" call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    /// Guest details
    #[serde(flatten)]
    pub requester: Requester,
    /// Campground being booked
    #[serde(rename = "campground")]
    pub campground_id: String,
    /// Validated stay
    #[serde(flatten)]
    pub dates: DateRange,
    /// Whether breakfast is booked
    pub breakfast: bool,
    /// Promotion code to honor, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
    /// Itemized price
    pub price: PriceBreakdown,
    /// Same as `price.total_amount`, kept flat for the persistence API
    pub total_price: Decimal,
}

/// A reservation, confirmed or in flight.
///
/// Decoding goes through [`ReservationRecord`], which also accepts the shapes
/// older bookings are stored in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ReservationRecord")]
pub struct Reservation {
    /// Assigned by the persistence API; absent before confirmation
    #[serde(
        rename = "_id",
        alias = "id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Guest details
    #[serde(flatten)]
    pub requester: Requester,
    /// Campground booked
    #[serde(rename = "campground")]
    pub campground_id: String,
    /// Validated stay
    #[serde(flatten)]
    pub dates: DateRange,
    /// Whether breakfast is booked
    #[serde(default)]
    pub breakfast: bool,
    /// Itemized price
    pub price: PriceBreakdown,
    /// Promotion applied at booking time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<AppliedPromotion>,
    /// When the reservation was made, if the persistence API recorded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Campground reference in a stored booking: a bare id, or the populated document
#[derive(Deserialize)]
#[serde(untagged)]
enum CampgroundRef {
    Id(String),
    Populated {
        #[serde(rename = "_id", alias = "id")]
        id: String,
    },
}

/// A calendar day, or an instant whose UTC day is taken
#[derive(Deserialize)]
#[serde(untagged)]
enum WireDay {
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

impl WireDay {
    fn day(self) -> NaiveDate {
        match self {
            WireDay::Day(day) => day,
            WireDay::Instant(instant) => instant.date_naive(),
        }
    }
}

/// Wire form of a stored booking
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReservationRecord {
    #[serde(rename = "_id", alias = "id", default)]
    id: Option<String>,
    #[serde(flatten)]
    requester: Requester,
    campground: CampgroundRef,
    #[serde(alias = "CheckInDate")]
    check_in_date: WireDay,
    #[serde(default, alias = "CheckOutDate")]
    check_out_date: Option<WireDay>,
    #[serde(default)]
    breakfast: bool,
    #[serde(default)]
    price: Option<PriceBreakdown>,
    #[serde(default)]
    total_price: Option<Decimal>,
    #[serde(default)]
    promotion: Option<AppliedPromotion>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReservationRecord> for Reservation {
    type Error = DateRangeError;

    fn try_from(record: ReservationRecord) -> Result<Self, Self::Error> {
        let check_in = record.check_in_date.day();
        // Single-day bookings carry no check-out and cover one night
        let check_out = match record.check_out_date {
            Some(day) => day.day(),
            None => check_in + chrono::Duration::days(1),
        };

        // Bookings stored with only a flat total are itemized as base amount
        let price = match (record.price, record.total_price) {
            (Some(price), _) => price,
            (None, total) => {
                let total = total.unwrap_or_default();
                PriceBreakdown {
                    base_amount: total,
                    breakfast_amount: Decimal::ZERO,
                    discount_amount: Decimal::ZERO,
                    total_amount: total,
                    total_clamped: false,
                }
            }
        };

        Ok(Self {
            id: record.id,
            requester: record.requester,
            campground_id: match record.campground {
                CampgroundRef::Id(id) | CampgroundRef::Populated { id } => id,
            },
            dates: DateRange::new(check_in, check_out)?,
            breakfast: record.breakfast,
            price,
            promotion: record.promotion,
            created_at: record.created_at,
        })
    }
}

/// Changes a requester may make to an existing reservation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationAmendment {
    /// New check-in day
    pub check_in_date: Option<NaiveDate>,
    /// New check-out day
    pub check_out_date: Option<NaiveDate>,
    /// Toggle breakfast
    pub breakfast: Option<bool>,
}

/// Body of the external "update reservation" call; always re-priced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPatch {
    /// Validated stay after the amendment
    #[serde(flatten)]
    pub dates: DateRange,
    /// Breakfast flag after the amendment
    pub breakfast: bool,
    /// Re-computed price
    pub price: PriceBreakdown,
    /// Same as `price.total_amount`
    pub total_price: Decimal,
}
