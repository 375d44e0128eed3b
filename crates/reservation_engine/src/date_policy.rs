use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone};
use serde::Serialize;
use tracing::debug;

use crate::types::{DateRange, DateRangeError, MAX_STAY_NIGHTS};

/// Anything that can be truncated to a calendar day
pub trait CalendarDay {
    /// The calendar day, time of day dropped
    fn calendar_day(&self) -> NaiveDate;
}

impl CalendarDay for NaiveDate {
    fn calendar_day(&self) -> NaiveDate {
        *self
    }
}

impl CalendarDay for NaiveDateTime {
    fn calendar_day(&self) -> NaiveDate {
        self.date()
    }
}

impl<Tz: TimeZone> CalendarDay for DateTime<Tz> {
    fn calendar_day(&self) -> NaiveDate {
        self.date_naive()
    }
}

/// Non-fatal corrections applied while normalizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyNotice {
    /// Check-out was pulled in to respect the maximum stay
    Clamped {
        /// Check-out the guest asked for
        requested_check_out: NaiveDate,
        /// Check-out actually used
        clamped_check_out: NaiveDate,
    },
}

/// Result of normalizing a (check-in, check-out) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizedDates {
    /// Check-in day
    pub check_in: NaiveDate,
    /// Check-out day, `None` while the guest has not picked one yet
    pub check_out: Option<NaiveDate>,
    /// Nights between the two days, zero while check-out is pending
    pub nights: u32,
    /// Correction applied, if any
    pub notice: Option<PolicyNotice>,
}

impl NormalizedDates {
    /// The complete range, once check-out is known
    pub fn date_range(&self) -> Option<DateRange> {
        self.check_out
            .and_then(|check_out| DateRange::new(self.check_in, check_out).ok())
    }

    /// Whether the policy had to shorten the stay
    pub fn was_clamped(&self) -> bool {
        matches!(self.notice, Some(PolicyNotice::Clamped { .. }))
    }
}

/// Validates and normalizes stay dates against the booking rules
#[derive(Debug, Clone, Copy)]
pub struct DateRangePolicy {
    max_stay_nights: u32,
}

impl Default for DateRangePolicy {
    fn default() -> Self {
        Self {
            max_stay_nights: MAX_STAY_NIGHTS,
        }
    }
}

impl DateRangePolicy {
    /// Creates a policy with a custom maximum stay, capped at [`MAX_STAY_NIGHTS`]
    pub fn with_max_stay(max_stay_nights: u32) -> Self {
        Self {
            max_stay_nights: max_stay_nights.clamp(1, MAX_STAY_NIGHTS),
        }
    }

    /// Maximum nights a stay may cover
    pub fn max_stay_nights(&self) -> u32 {
        self.max_stay_nights
    }

    /// Normalizes a (check-in, check-out) pair.
    ///
    /// Check-out beyond the maximum stay is clamped rather than rejected; the
    /// returned [`PolicyNotice`] tells the caller it happened. Normalizing an
    /// already normalized pair returns it unchanged.
    pub fn normalize<D: CalendarDay>(
        &self,
        check_in: Option<D>,
        check_out: Option<D>,
        today: NaiveDate,
    ) -> Result<NormalizedDates, DateRangeError> {
        let check_in = check_in
            .map(|d| d.calendar_day())
            .ok_or(DateRangeError::MissingCheckIn)?;

        if check_in < today {
            return Err(DateRangeError::CheckInInPast { check_in, today });
        }

        let Some(requested_check_out) = check_out.map(|d| d.calendar_day()) else {
            return Ok(NormalizedDates {
                check_in,
                check_out: None,
                nights: 0,
                notice: None,
            });
        };

        let nights = (requested_check_out - check_in).num_days();
        if nights <= 0 {
            return Err(DateRangeError::CheckOutNotAfterCheckIn);
        }

        if nights > i64::from(self.max_stay_nights) {
            let clamped_check_out = check_in
                .checked_add_days(Days::new(u64::from(self.max_stay_nights)))
                .ok_or(DateRangeError::CheckOutNotAfterCheckIn)?;

            debug!(
                "Clamping check-out from {} to {} ({} night maximum)",
                requested_check_out, clamped_check_out, self.max_stay_nights
            );

            return Ok(NormalizedDates {
                check_in,
                check_out: Some(clamped_check_out),
                nights: self.max_stay_nights,
                notice: Some(PolicyNotice::Clamped {
                    requested_check_out,
                    clamped_check_out,
                }),
            });
        }

        Ok(NormalizedDates {
            check_in,
            check_out: Some(requested_check_out),
            nights: nights as u32,
            notice: None,
        })
    }
}
