//! Deposit state classifier
//!
//! Pure mapping from a deposit and the current time to the risk facts that
//! warrant alerts, plus the canonical lifecycle state. Nothing here touches
//! the store, and `now` is always an explicit argument.

use chrono::{DateTime, Utc};

use crate::types::{AlertType, Deposit, LifecycleState, WatchError};
use crate::Result;

/// Days before the deadline inside which a near-expiration alert is raised
pub const NEAR_EXPIRATION_WINDOW_DAYS: i64 = 30;

/// Total value above which a deposit is flagged as high value
pub const HIGH_VALUE_THRESHOLD: f64 = 10_000.0;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Classification thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub near_expiration_days: i64,
    pub high_value: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            near_expiration_days: NEAR_EXPIRATION_WINDOW_DAYS,
            high_value: HIGH_VALUE_THRESHOLD,
        }
    }
}

/// Expiration-based fact for a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationFact {
    /// Deadline passed `days_overdue` days ago
    Expired { days_overdue: i64 },
    /// Deadline is `days_remaining` days away, inside the window
    NearExpiration { days_remaining: i64 },
    /// Deadline is beyond the window; prior expiration alerts are stale
    Clear { days_remaining: i64 },
}

impl ExpirationFact {
    /// Alert type this fact calls for, if any
    pub fn alert_type(&self) -> Option<AlertType> {
        match self {
            Self::Expired { .. } => Some(AlertType::Expired),
            Self::NearExpiration { .. } => Some(AlertType::NearExpiration),
            Self::Clear { .. } => None,
        }
    }
}

/// Risk facts derived for one deposit
#[derive(Debug, Clone, PartialEq)]
pub struct RiskFacts {
    /// Days to expiration, when the deposit has a deadline
    pub days_to_expiration: Option<i64>,
    /// `None` when the deposit is inactive, terminal or has no deadline
    pub expiration: Option<ExpirationFact>,
    /// Total value when it exceeds the high-value threshold
    pub high_value: Option<f64>,
    /// Canonical lifecycle state
    pub state: LifecycleState,
}

impl RiskFacts {
    /// Alert types warranted by these facts
    pub fn alert_types(&self) -> Vec<AlertType> {
        let mut types: Vec<AlertType> = self
            .expiration
            .and_then(|fact| fact.alert_type())
            .into_iter()
            .collect();
        if self.high_value.is_some() {
            types.push(AlertType::HighValue);
        }
        types
    }
}

/// `floor((expiration - now) / 1 day)`
pub fn days_to_expiration(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiration - now).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// Expiration fact for a number of days to the deadline
pub fn expiration_fact(days: i64, window_days: i64) -> ExpirationFact {
    if days < 0 {
        ExpirationFact::Expired {
            days_overdue: days.abs(),
        }
    } else if days <= window_days {
        ExpirationFact::NearExpiration {
            days_remaining: days,
        }
    } else {
        ExpirationFact::Clear {
            days_remaining: days,
        }
    }
}

/// Canonical lifecycle state
///
/// Terminal states are kept as they are; everything else follows from the
/// expiration date alone.
pub fn derive_state(
    current: LifecycleState,
    expiration: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_days: i64,
) -> LifecycleState {
    if current.is_terminal() {
        return current;
    }

    match expiration.map(|exp| expiration_fact(days_to_expiration(exp, now), window_days)) {
        Some(ExpirationFact::Expired { .. }) => LifecycleState::Expired,
        Some(ExpirationFact::NearExpiration { .. }) => LifecycleState::NearExpiration,
        Some(ExpirationFact::Clear { .. }) | None => LifecycleState::Active,
    }
}

/// Check the numeric fields the classification depends on
fn validate(deposit: &Deposit) -> Result<()> {
    if !deposit.quantity.is_finite() || deposit.quantity < 0.0 {
        return Err(WatchError::classification(
            &deposit.id,
            format!("invalid quantity {}", deposit.quantity),
        ));
    }
    if !deposit.unit_value.is_finite() || deposit.unit_value < 0.0 {
        return Err(WatchError::classification(
            &deposit.id,
            format!("invalid unit value {}", deposit.unit_value),
        ));
    }
    Ok(())
}

/// Compute the risk facts of a deposit at `now`
pub fn classify(deposit: &Deposit, now: DateTime<Utc>, thresholds: &Thresholds) -> Result<RiskFacts> {
    validate(deposit)?;

    let days = deposit
        .expiration_date
        .map(|exp| days_to_expiration(exp, now));

    // Inactive and terminal deposits warrant no alerts; the obsolescence
    // sweep closes whatever they still carry.
    let alertable = deposit.active && !deposit.state.is_terminal();

    let expiration = match days {
        Some(d) if alertable => Some(expiration_fact(d, thresholds.near_expiration_days)),
        _ => None,
    };

    let total = deposit.total_value();
    let high_value = (alertable && total > thresholds.high_value).then_some(total);

    Ok(RiskFacts {
        days_to_expiration: days,
        expiration,
        high_value,
        state: derive_state(
            deposit.state,
            deposit.expiration_date,
            now,
            thresholds.near_expiration_days,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn deposit() -> Deposit {
        Deposit::new("d1", "DEP-2026-0000001", 10.0, 5.0)
    }

    #[test]
    fn test_days_to_expiration_floors() {
        let now = now();
        assert_eq!(days_to_expiration(now + Duration::days(3), now), 3);
        assert_eq!(days_to_expiration(now + Duration::hours(71), now), 2);
        assert_eq!(days_to_expiration(now - Duration::hours(1), now), -1);
        assert_eq!(days_to_expiration(now - Duration::days(5), now), -5);
        assert_eq!(days_to_expiration(now, now), 0);
    }

    #[test]
    fn test_expired_deposit() {
        let now = now();
        let d = deposit().with_expiration(now - Duration::days(5));
        let facts = classify(&d, now, &Thresholds::default()).unwrap();

        assert_eq!(facts.expiration, Some(ExpirationFact::Expired { days_overdue: 5 }));
        assert_eq!(facts.state, LifecycleState::Expired);
        assert_eq!(facts.alert_types(), vec![AlertType::Expired]);
    }

    #[test]
    fn test_window_boundaries() {
        let now = now();
        let thresholds = Thresholds::default();

        let at_zero = deposit().with_expiration(now);
        assert_eq!(
            classify(&at_zero, now, &thresholds).unwrap().expiration,
            Some(ExpirationFact::NearExpiration { days_remaining: 0 })
        );

        let at_thirty = deposit().with_expiration(now + Duration::days(30));
        assert_eq!(
            classify(&at_thirty, now, &thresholds).unwrap().expiration,
            Some(ExpirationFact::NearExpiration { days_remaining: 30 })
        );

        let at_thirty_one = deposit().with_expiration(now + Duration::days(31));
        let facts = classify(&at_thirty_one, now, &thresholds).unwrap();
        assert_eq!(
            facts.expiration,
            Some(ExpirationFact::Clear { days_remaining: 31 })
        );
        assert!(facts.alert_types().is_empty());
        assert_eq!(facts.state, LifecycleState::Active);
    }

    #[test]
    fn test_no_expiration_date() {
        let facts = classify(&deposit(), now(), &Thresholds::default()).unwrap();
        assert_eq!(facts.expiration, None);
        assert_eq!(facts.days_to_expiration, None);
        assert_eq!(facts.state, LifecycleState::Active);
    }

    #[test]
    fn test_inactive_deposit_has_no_facts() {
        let now = now();
        let d = Deposit::new("d1", "DEP-1", 1000.0, 50.0)
            .with_expiration(now - Duration::days(2))
            .with_active(false);
        let facts = classify(&d, now, &Thresholds::default()).unwrap();
        assert_eq!(facts.expiration, None);
        assert_eq!(facts.high_value, None);
        assert!(facts.alert_types().is_empty());
    }

    #[test]
    fn test_high_value_is_strictly_above_threshold() {
        let thresholds = Thresholds::default();
        let at = Deposit::new("d1", "DEP-1", 100.0, 100.0);
        assert_eq!(classify(&at, now(), &thresholds).unwrap().high_value, None);

        let above = Deposit::new("d2", "DEP-2", 150.0, 100.0);
        assert_eq!(
            classify(&above, now(), &thresholds).unwrap().high_value,
            Some(15000.0)
        );
    }

    #[test]
    fn test_expired_and_high_value_are_independent() {
        let now = now();
        let d = Deposit::new("d1", "DEP-1", 300.0, 100.0).with_expiration(now - Duration::days(1));
        let facts = classify(&d, now, &Thresholds::default()).unwrap();
        assert_eq!(
            facts.alert_types(),
            vec![AlertType::Expired, AlertType::HighValue]
        );
    }

    #[test]
    fn test_high_value_ignores_cached_state() {
        let d = Deposit::new("d1", "DEP-1", 300.0, 100.0).with_state(LifecycleState::Expired);
        let facts = classify(&d, now(), &Thresholds::default()).unwrap();
        assert_eq!(facts.high_value, Some(30000.0));
        // No deadline: the cached state is recomputed from scratch
        assert_eq!(facts.state, LifecycleState::Active);
    }

    #[test]
    fn test_terminal_deposit_has_no_facts() {
        let now = now();
        let d = Deposit::new("d1", "DEP-1", 300.0, 100.0)
            .with_expiration(now - Duration::days(3))
            .with_state(LifecycleState::Invoiced);
        let facts = classify(&d, now, &Thresholds::default()).unwrap();
        assert!(facts.alert_types().is_empty());
        assert_eq!(facts.state, LifecycleState::Invoiced);
    }

    #[test]
    fn test_terminal_state_is_never_overwritten() {
        let now = now();
        for terminal in [LifecycleState::Withdrawn, LifecycleState::Invoiced] {
            let state = derive_state(terminal, Some(now - Duration::days(10)), now, 30);
            assert_eq!(state, terminal);
        }
    }

    #[test]
    fn test_custom_window() {
        let now = now();
        let thresholds = Thresholds {
            near_expiration_days: 7,
            high_value: 500.0,
        };
        let d = deposit().with_expiration(now + Duration::days(10));
        let facts = classify(&d, now, &thresholds).unwrap();
        assert_eq!(
            facts.expiration,
            Some(ExpirationFact::Clear { days_remaining: 10 })
        );
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let negative = Deposit::new("d1", "DEP-1", -1.0, 5.0);
        assert!(matches!(
            classify(&negative, now(), &Thresholds::default()),
            Err(WatchError::Classification { .. })
        ));

        let nan = Deposit::new("d2", "DEP-2", 1.0, f64::NAN);
        assert!(matches!(
            classify(&nan, now(), &Thresholds::default()),
            Err(WatchError::Classification { .. })
        ));
    }

    #[test]
    fn test_deterministic() {
        let now = now();
        let d = Deposit::new("d1", "DEP-1", 200.0, 100.0).with_expiration(now + Duration::days(12));
        let thresholds = Thresholds::default();
        assert_eq!(
            classify(&d, now, &thresholds).unwrap(),
            classify(&d, now, &thresholds).unwrap()
        );
    }
}
