//! Cohorts: time-boxed offerings of a course with a seat capacity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Result, timestamp::TimestampRepr};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CohortStatus {
  #[default]
  Upcoming,
  Active,
  Completed,
  Cancelled,
}

// ─── Pricing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
  pub base_price_cents:       i64,
  /// ISO 4217 code, lowercase as the payment provider expects it.
  pub currency:               String,
  pub early_bird_price_cents: Option<i64>,
  pub early_bird_deadline:    Option<DateTime<Utc>>,
}

impl Default for Pricing {
  fn default() -> Self {
    Self {
      base_price_cents:       0,
      currency:               "usd".into(),
      early_bird_price_cents: None,
      early_bird_deadline:    None,
    }
  }
}

/// A discount code as it is stored, with validity dates in whatever form the
/// producer wrote them.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCoupon {
  pub code:             String,
  pub discount_percent: u8,
  pub valid_from:       Option<TimestampRepr>,
  pub valid_until:      Option<TimestampRepr>,
  pub max_uses:         Option<u32>,
  #[serde(default)]
  pub used_count:       u32,
}

impl RawCoupon {
  pub fn normalize(self) -> Result<Coupon> {
    Ok(Coupon {
      code:             self.code,
      discount_percent: self.discount_percent.min(100),
      valid_from:       self.valid_from.as_ref().map(TimestampRepr::normalize).transpose()?,
      valid_until:      self.valid_until.as_ref().map(TimestampRepr::normalize).transpose()?,
      max_uses:         self.max_uses,
      used_count:       self.used_count,
    })
  }
}

/// A discount code with normalised validity dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
  pub code:             String,
  pub discount_percent: u8,
  pub valid_from:       Option<DateTime<Utc>>,
  pub valid_until:      Option<DateTime<Utc>>,
  pub max_uses:         Option<u32>,
  pub used_count:       u32,
}

impl Coupon {
  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    let started = self.valid_from.is_none_or(|from| from <= now);
    let not_expired = self.valid_until.is_none_or(|until| now <= until);
    let uses_left = self.max_uses.is_none_or(|max| self.used_count < max);
    started && not_expired && uses_left
  }
}

// ─── Cohort ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
  pub cohort_id:        String,
  pub course_id:        String,
  pub name:             String,
  pub start_date:       DateTime<Utc>,
  pub end_date:         DateTime<Utc>,
  pub max_students:     u32,
  /// Incremented by active-enrollment creation only; never decremented.
  pub current_students: u32,
  pub status:           CohortStatus,
  pub pricing:          Pricing,
  pub coupons:          Vec<Coupon>,
}

impl Cohort {
  pub fn seats_remaining(&self) -> u32 {
    self.max_students.saturating_sub(self.current_students)
  }

  pub fn is_full(&self) -> bool { self.seats_remaining() == 0 }

  /// The price a buyer pays at `now`, after early-bird pricing and an
  /// optional coupon. Unknown or expired coupon codes are ignored.
  pub fn price_at(&self, now: DateTime<Utc>, coupon_code: Option<&str>) -> i64 {
    let early_bird = match (
      self.pricing.early_bird_price_cents,
      self.pricing.early_bird_deadline,
    ) {
      (Some(price), Some(deadline)) if now <= deadline => Some(price),
      _ => None,
    };
    let base = early_bird.unwrap_or(self.pricing.base_price_cents);

    let discount = coupon_code
      .and_then(|code| {
        self
          .coupons
          .iter()
          .find(|c| c.code.eq_ignore_ascii_case(code) && c.is_valid_at(now))
      })
      .map_or(0, |c| i64::from(c.discount_percent));

    base - base * discount / 100
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn cohort(now: DateTime<Utc>) -> Cohort {
    Cohort {
      cohort_id:        "h1".into(),
      course_id:        "c1".into(),
      name:             "Spring".into(),
      start_date:       now,
      end_date:         now + Duration::weeks(8),
      max_students:     2,
      current_students: 1,
      status:           CohortStatus::Upcoming,
      pricing:          Pricing {
        base_price_cents:       20_000,
        currency:               "usd".into(),
        early_bird_price_cents: Some(15_000),
        early_bird_deadline:    Some(now + Duration::days(3)),
      },
      coupons:          vec![Coupon {
        code:             "WELCOME10".into(),
        discount_percent: 10,
        valid_from:       None,
        valid_until:      Some(now + Duration::days(30)),
        max_uses:         Some(5),
        used_count:       0,
      }],
    }
  }

  #[test]
  fn seats() {
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut c = cohort(now);
    assert_eq!(c.seats_remaining(), 1);
    assert!(!c.is_full());
    c.current_students = 5;
    assert_eq!(c.seats_remaining(), 0);
    assert!(c.is_full());
  }

  #[test]
  fn early_bird_then_base_price() {
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let c = cohort(now);
    assert_eq!(c.price_at(now, None), 15_000);
    assert_eq!(c.price_at(now + Duration::days(4), None), 20_000);
  }

  #[test]
  fn coupon_applies_case_insensitively_and_expires() {
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let c = cohort(now);
    let later = now + Duration::days(10);
    assert_eq!(c.price_at(later, Some("welcome10")), 18_000);
    assert_eq!(c.price_at(now + Duration::days(31), Some("WELCOME10")), 20_000);
    assert_eq!(c.price_at(later, Some("NOPE")), 20_000);
  }

  #[test]
  fn raw_coupon_normalises_mixed_dates() {
    let raw: RawCoupon = serde_json::from_value(serde_json::json!({
      "code": "MIX",
      "discount_percent": 150,
      "valid_from": { "_seconds": 1_700_000_000, "_nanoseconds": 0 },
      "valid_until": "2030-01-01",
      "max_uses": null
    }))
    .unwrap();
    let coupon = raw.normalize().unwrap();
    assert_eq!(coupon.discount_percent, 100);
    assert_eq!(coupon.valid_from.unwrap().timestamp(), 1_700_000_000);
    assert_eq!(
      coupon.valid_until.unwrap(),
      Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    );
  }
}
