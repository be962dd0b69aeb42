// Validation utilities module
// Provides custom validation functions for stay requests

use chrono::NaiveDate;
use validator::ValidationError;

use crate::models::{AvailabilityQuery, QuoteRequest};

/// Longest stay the API will quote, in nights
pub const MAX_STAY_NIGHTS: i64 = 366;

/// Longest channel identifier accepted
const MAX_CHANNEL_LEN: usize = 32;

/// Validates a sales channel identifier
/// Lowercase letters, digits, '_' and '-' only (e.g. "direct", "booking_com")
pub fn validate_channel_name(channel: &str) -> Result<(), ValidationError> {
    let well_formed = !channel.is_empty()
        && channel.len() <= MAX_CHANNEL_LEN
        && channel
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_channel_name"))
    }
}

/// Validates that `[start, end)` is ordered and not absurdly long
/// A same-day range is accepted
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), ValidationError> {
    if end < start {
        return Err(ValidationError::new("departure_before_arrival"));
    }
    if (end - start).num_days() > MAX_STAY_NIGHTS {
        return Err(ValidationError::new("stay_too_long"));
    }
    Ok(())
}

/// Struct-level check for POST /api/quotes
pub fn validate_stay_dates(request: &QuoteRequest) -> Result<(), ValidationError> {
    validate_date_range(request.arrival, request.departure)
}

/// Struct-level check for GET /api/availability
pub fn validate_availability_range(query: &AvailabilityQuery) -> Result<(), ValidationError> {
    validate_date_range(query.from, query.to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_channel_names() {
        assert!(validate_channel_name("direct").is_ok());
        assert!(validate_channel_name("booking_com").is_ok());
        assert!(validate_channel_name("airbnb-2").is_ok());

        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("Booking").is_err());
        assert!(validate_channel_name("direct; drop").is_err());
        assert!(validate_channel_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_date_range() {
        assert!(validate_date_range(day(1), day(5)).is_ok());
        assert!(validate_date_range(day(5), day(5)).is_ok());

        let error = validate_date_range(day(5), day(1)).unwrap_err();
        assert_eq!(error.code, "departure_before_arrival");
    }

    #[test]
    fn test_stay_length_limit() {
        let start = day(1);
        let end = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();

        let error = validate_date_range(start, end).unwrap_err();
        assert_eq!(error.code, "stay_too_long");
    }
}
