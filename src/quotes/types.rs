//! Quote types and strike/expiry arithmetic

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::Serialize;

/// A straddle quote for one instrument at one strike pair
///
/// ATM quotes carry `call_strike == put_strike == atm_strike`; OTM-derived
/// quotes carry the offset strikes. Quotes are ephemeral, produced per
/// refresh cycle and never mutated in place.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub spot: Decimal,
    pub atm_strike: Decimal,
    pub call_strike: Decimal,
    pub put_strike: Decimal,
    pub expiry: NaiveDate,
    pub call_premium: Decimal,
    pub put_premium: Decimal,
}

impl Quote {
    /// Combined call + put premium
    pub fn straddle_premium(&self) -> Decimal {
        self.call_premium + self.put_premium
    }
}

/// Nearest strike to the spot on the instrument's strike grid
pub fn atm_strike(spot: Decimal, interval: Decimal) -> Decimal {
    (spot / interval).round() * interval
}

/// Next monthly option expiry: the last Thursday of the current month,
/// rolling to the next month once it has passed
pub fn next_monthly_expiry(today: NaiveDate) -> NaiveDate {
    let expiry = last_thursday(today.year(), today.month());
    if expiry < today {
        let (year, month) = if today.month() == 12 {
            (today.year() + 1, 1)
        } else {
            (today.year(), today.month() + 1)
        };
        last_thursday(year, month)
    } else {
        expiry
    }
}

fn last_thursday(year: i32, month: u32) -> NaiveDate {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid first-of-month date");

    let mut day = first_of_next.pred_opt().expect("valid last-of-month date");
    while day.weekday() != Weekday::Thu {
        day = day.pred_opt().expect("valid previous date");
    }
    day
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_atm_strike_index_interval() {
        assert_eq!(atm_strike(dec!(45012.35), dec!(100)), dec!(45000));
        assert_eq!(atm_strike(dec!(45051), dec!(100)), dec!(45100));
    }

    #[test]
    fn test_atm_strike_stock_interval() {
        assert_eq!(atm_strike(dec!(1650), dec!(50)), dec!(1650));
        assert_eq!(atm_strike(dec!(1667), dec!(50)), dec!(1650));
        assert_eq!(atm_strike(dec!(1680), dec!(50)), dec!(1700));
    }

    #[test]
    fn test_straddle_premium() {
        let quote = Quote {
            symbol: "SBIN".to_string(),
            spot: dec!(600),
            atm_strike: dec!(600),
            call_strike: dec!(600),
            put_strike: dec!(600),
            expiry: NaiveDate::from_ymd_opt(2024, 1, 25).unwrap(),
            call_premium: dec!(12.50),
            put_premium: dec!(11.25),
        };
        assert_eq!(quote.straddle_premium(), dec!(23.75));
    }

    #[test]
    fn test_last_thursday() {
        // January 2024: last Thursday is the 25th
        assert_eq!(
            last_thursday(2024, 1),
            NaiveDate::from_ymd_opt(2024, 1, 25).unwrap()
        );
        // February 2024 (leap year): the 29th is a Thursday
        assert_eq!(
            last_thursday(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn test_next_monthly_expiry_same_month() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(
            next_monthly_expiry(today),
            NaiveDate::from_ymd_opt(2024, 1, 25).unwrap()
        );
    }

    #[test]
    fn test_next_monthly_expiry_on_expiry_day() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 25).unwrap();
        assert_eq!(next_monthly_expiry(today), today);
    }

    #[test]
    fn test_next_monthly_expiry_rolls_over() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 26).unwrap();
        assert_eq!(
            next_monthly_expiry(today),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn test_next_monthly_expiry_december_rollover() {
        let today = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        // Last Thursday of December 2024 is the 26th, so roll to January 2025
        assert_eq!(
            next_monthly_expiry(today),
            NaiveDate::from_ymd_opt(2025, 1, 30).unwrap()
        );
    }
}
