// src/definition/schedule.rs

use chrono::{DateTime, Utc};

use super::BackupDefinition;

impl BackupDefinition {
    /// Whether a new attempt should start at `now`.
    ///
    /// - disabled definitions are never due
    /// - a definition that never completed a run is due immediately
    /// - otherwise due once a full cadence period has passed since the last
    ///   completed run (boundary inclusive)
    pub fn is_due(&self, last_run_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match last_run_at {
            None => true,
            Some(last) => now - last >= self.cadence.period(),
        }
    }

    /// When the next attempt is expected, or `None` when disabled.
    ///
    /// Falls back to `now` for a definition that never ran, since such a
    /// definition is already due.
    pub fn next_run_at(
        &self,
        last_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        Some(match last_run_at {
            None => now,
            Some(last) => last + self.cadence.period(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::definition::{Location, Provider, VerifyPolicy};
    use crate::types::{Cadence, ProviderType};
    use crate::verify::Tolerance;

    fn definition(cadence: Cadence, enabled: bool) -> BackupDefinition {
        let provider = Provider {
            id: "p".into(),
            name: "p".into(),
            provider_type: ProviderType::BackblazeB2,
            access_key_id: "k".into(),
            secret_access_key: "s".into(),
            endpoint: None,
            region: None,
        };
        let loc = |id: &str| Location {
            storage_id: id.into(),
            display_name: None,
            bucket: id.into(),
            path: None,
            usage: None,
            provider: provider.clone(),
        };
        BackupDefinition {
            id: "b".into(),
            name: "b".into(),
            source: loc("a"),
            destination: loc("z"),
            cadence,
            enabled,
            retention_days: 30,
            verify: VerifyPolicy {
                enabled: false,
                tolerance: Tolerance::from_percent(0.1),
            },
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn never_run_daily_is_due() {
        assert!(definition(Cadence::Daily, true).is_due(None, now()));
    }

    #[test]
    fn disabled_is_never_due() {
        assert!(!definition(Cadence::Daily, false).is_due(None, now()));
        assert_eq!(definition(Cadence::Daily, false).next_run_at(None, now()), None);
    }

    #[test]
    fn daily_due_again_after_one_day() {
        let def = definition(Cadence::Daily, true);
        assert!(!def.is_due(Some(now()), now()));
        assert!(!def.is_due(Some(now() - Duration::hours(1)), now()));
        assert!(!def.is_due(Some(now() - Duration::hours(24) + Duration::seconds(1)), now()));
        assert!(def.is_due(Some(now() - Duration::hours(24)), now()));
        assert!(def.is_due(Some(now() - Duration::days(2)), now()));
    }

    #[test]
    fn weekly_waits_seven_days() {
        let def = definition(Cadence::Weekly, true);
        assert!(!def.is_due(Some(now() - Duration::days(6)), now()));
        assert!(def.is_due(Some(now() - Duration::days(7)), now()));
        assert_eq!(
            def.next_run_at(Some(now()), now()),
            Some(now() + Duration::days(7))
        );
    }
}
