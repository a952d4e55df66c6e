//! The period reset engine.
//!
//! A reset closes the current usage period at an instant, records each
//! active grant's rollover outcome, spawns children for recurring grants
//! whose windows ended with the period, and opens the next period. The
//! whole thing persists in one atomic batch.

use chrono::{DateTime, Utc};

use meterd_core::{
    EntitlementId, Grant, GrantId, GrantRollover, MeterError, ResetEvent, Result,
};
use meterd_store::Store;

use crate::balance;
use crate::engine::Engine;

impl<S: Store + 'static> Engine<S> {
    /// Reset a metered entitlement's usage period at `at` (now if omitted).
    ///
    /// Usage strictly before `at` belongs to the closing period; usage at
    /// `at` or later belongs to the new one. Each grant active just before
    /// `at` gets a rollover outcome recorded; recurring grants whose
    /// windows ended during the closing period spawn fresh child grants
    /// effective from `at`.
    ///
    /// # Errors
    ///
    /// - `MeterError::ResetOutOfOrder` if `at` is not strictly after the
    ///   latest recorded reset.
    /// - `MeterError::NotMetered` / `MeterError::EntitlementNotFound` /
    ///   `MeterError::EntitlementDeleted` for a bad target.
    pub async fn reset_entitlement(
        &self,
        entitlement_id: &EntitlementId,
        at: Option<DateTime<Utc>>,
        new_anchor: Option<DateTime<Utc>>,
    ) -> Result<ResetEvent> {
        let lock = self.locks.lock_for(entitlement_id);
        let _guard = lock.lock().await;

        let mut entitlement = self.load_metered(entitlement_id)?;
        let at = at.unwrap_or_else(Utc::now);

        let latest = self
            .store
            .last_reset_at_or_before(entitlement_id, DateTime::<Utc>::MAX_UTC)?;
        if let Some(latest) = &latest {
            if at <= latest.at {
                return Err(MeterError::ResetOutOfOrder {
                    requested: at,
                    latest: latest.at,
                });
            }
        }

        let period_start = latest.as_ref().map_or(entitlement.created_at, |r| r.at);
        let usage = self.meter.query_usage(entitlement_id, period_start, at)?;

        // Balances close the period leading up to `at`, so a grant
        // expiring exactly at `at` still closes with an outcome.
        let grants = self.store.list_grants(entitlement_id, true)?;
        let active: Vec<&Grant> = grants.iter().filter(|g| g.active_before(at)).collect();

        let starting: Vec<(GrantId, i64)> = active
            .iter()
            .map(|g| (g.id, balance::starting_balance(g, latest.as_ref())))
            .collect();
        let (balances, _) = balance::burn_down(&starting, usage);

        let outcomes: Vec<GrantRollover> = active
            .iter()
            .zip(&balances)
            .map(|(grant, computed)| GrantRollover {
                grant_id: grant.id,
                balance_before: computed.balance,
                balance_after: grant.rollover_balance(computed.balance),
            })
            .collect();

        // A recurring grant whose window ended with the closing period
        // spawns a child effective from the reset. Still-active parents do
        // not spawn; that would double-credit the new period.
        let mut children = Vec::new();
        for grant in &grants {
            let ended_this_period = grant.expires_at > period_start && grant.expires_at <= at;
            if grant.voided_at.is_none() && ended_this_period {
                if let Some(recurrence) = grant.recurrence {
                    let child = Grant::new(
                        grant.entitlement_id,
                        grant.amount,
                        at,
                        at + recurrence.interval.duration(),
                        grant.priority,
                    )?
                    .with_recurrence(recurrence);
                    children.push(match grant.rollover {
                        Some(policy) => child.with_rollover(policy),
                        None => child,
                    });
                }
            }
        }

        entitlement.current_period_start = at;
        if let Some(anchor) = new_anchor {
            entitlement.period_anchor = anchor;
        }
        entitlement.updated_at = Utc::now();

        let reset = ResetEvent::new(*entitlement_id, at, new_anchor, outcomes);
        self.store.apply_reset(&reset, &entitlement, &children)?;

        tracing::info!(
            entitlement_id = %entitlement_id,
            reset_id = %reset.id,
            at = %at,
            outcomes = reset.outcomes.len(),
            children = children.len(),
            "Period reset"
        );

        Ok(reset)
    }

    /// List an entitlement's reset events with `from <= at < to`.
    ///
    /// # Errors
    ///
    /// - `MeterError::InvalidQueryWindow` if `from >= to`.
    /// - `MeterError::EntitlementNotFound` if the entitlement doesn't exist.
    pub fn list_resets(
        &self,
        entitlement_id: &EntitlementId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ResetEvent>> {
        if from >= to {
            return Err(MeterError::InvalidQueryWindow { from, to });
        }
        self.get_entitlement(entitlement_id)?;
        Ok(self.store.list_resets(entitlement_id, from, to)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    use meterd_core::{
        Entitlement, EntitlementKind, EntitlementValue, Recurrence, RecurrenceInterval,
        RolloverPolicy, SubjectId, UsageEvent,
    };
    use meterd_store::RocksStore;

    use super::*;
    use crate::engine::GrantParams;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn test_engine() -> (Engine<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (Engine::new(store), dir)
    }

    async fn metered_entitlement(engine: &Engine<RocksStore>) -> Entitlement {
        let mut ent = engine
            .create_entitlement(
                SubjectId::generate(),
                "api_requests".into(),
                EntitlementKind::Metered,
            )
            .await
            .unwrap();
        ent.created_at = t0();
        ent.current_period_start = t0();
        ent.period_anchor = t0();
        engine.store().put_entitlement(&ent).unwrap();
        ent
    }

    fn params(amount: i64, priority: u8) -> GrantParams {
        GrantParams {
            amount,
            effective_at: t0(),
            expires_at: t0() + Duration::days(60),
            priority,
            recurrence: None,
            rollover: None,
        }
    }

    fn balance_of(value: &EntitlementValue) -> i64 {
        match value {
            EntitlementValue::Metered { balance, .. } => *balance,
            other => panic!("expected metered value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_applies_rollover_policy() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;

        let mut p = params(100, 0);
        p.rollover = Some(RolloverPolicy {
            max_amount: 30,
            min_amount: 10,
        });
        let grant = engine.add_grant(&ent.id, p).await.unwrap();

        engine
            .record_usage(UsageEvent::new("evt_1".into(), ent.id, 80).at(t0() + Duration::hours(1)))
            .await
            .unwrap();

        let reset = engine
            .reset_entitlement(&ent.id, Some(t0() + Duration::days(30)), None)
            .await
            .unwrap();

        assert_eq!(reset.outcomes.len(), 1);
        assert_eq!(reset.outcomes[0].grant_id, grant.id);
        assert_eq!(reset.outcomes[0].balance_before, 20);
        // min(30, max(20, 10)) = 20
        assert_eq!(reset.outcomes[0].balance_after, 20);

        // The new period starts from the rolled-over balance with no usage.
        let value = engine
            .entitlement_value(&ent.id, t0() + Duration::days(31))
            .unwrap();
        assert_eq!(balance_of(&value), 20);
    }

    #[tokio::test]
    async fn rollover_floor_lifts_exhausted_balance() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;

        let mut p = params(100, 0);
        p.rollover = Some(RolloverPolicy {
            max_amount: 30,
            min_amount: 10,
        });
        engine.add_grant(&ent.id, p).await.unwrap();

        engine
            .record_usage(UsageEvent::new("evt_1".into(), ent.id, 95).at(t0() + Duration::hours(1)))
            .await
            .unwrap();

        let reset = engine
            .reset_entitlement(&ent.id, Some(t0() + Duration::days(30)), None)
            .await
            .unwrap();

        assert_eq!(reset.outcomes[0].balance_before, 5);
        // min(30, max(5, 10)) = 10
        assert_eq!(reset.outcomes[0].balance_after, 10);
    }

    #[tokio::test]
    async fn reset_without_policy_carries_balance_unchanged() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;

        engine.add_grant(&ent.id, params(100, 0)).await.unwrap();
        engine
            .record_usage(UsageEvent::new("evt_1".into(), ent.id, 60).at(t0() + Duration::hours(1)))
            .await
            .unwrap();

        let reset = engine
            .reset_entitlement(&ent.id, Some(t0() + Duration::days(30)), None)
            .await
            .unwrap();
        assert_eq!(reset.outcomes[0].balance_before, 40);
        assert_eq!(reset.outcomes[0].balance_after, 40);

        let value = engine
            .entitlement_value(&ent.id, t0() + Duration::days(31))
            .unwrap();
        assert_eq!(balance_of(&value), 40);
    }

    #[tokio::test]
    async fn reset_rejects_out_of_order_instant() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;
        engine.add_grant(&ent.id, params(100, 0)).await.unwrap();

        engine
            .reset_entitlement(&ent.id, Some(t0() + Duration::days(30)), None)
            .await
            .unwrap();

        let result = engine
            .reset_entitlement(&ent.id, Some(t0() + Duration::days(29)), None)
            .await;
        assert!(matches!(result, Err(MeterError::ResetOutOfOrder { .. })));

        // The exact same instant is rejected too.
        let result = engine
            .reset_entitlement(&ent.id, Some(t0() + Duration::days(30)), None)
            .await;
        assert!(matches!(result, Err(MeterError::ResetOutOfOrder { .. })));
    }

    #[tokio::test]
    async fn usage_at_reset_instant_belongs_to_new_period() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;
        engine.add_grant(&ent.id, params(100, 0)).await.unwrap();

        let reset_at = t0() + Duration::days(30);
        engine
            .record_usage(UsageEvent::new("evt_1".into(), ent.id, 10).at(reset_at))
            .await
            .unwrap();

        let reset = engine
            .reset_entitlement(&ent.id, Some(reset_at), None)
            .await
            .unwrap();
        // The closing period saw no usage.
        assert_eq!(reset.outcomes[0].balance_before, 100);

        let value = engine
            .entitlement_value(&ent.id, reset_at + Duration::hours(1))
            .unwrap();
        assert_eq!(balance_of(&value), 90);
    }

    #[tokio::test]
    async fn grant_expiring_at_reset_closes_with_outcome() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;

        let reset_at = t0() + Duration::days(30);
        let grant = engine
            .add_grant(
                &ent.id,
                GrantParams {
                    amount: 100,
                    effective_at: t0(),
                    expires_at: reset_at,
                    priority: 0,
                    recurrence: None,
                    rollover: None,
                },
            )
            .await
            .unwrap();

        engine
            .record_usage(UsageEvent::new("evt_1".into(), ent.id, 30).at(t0() + Duration::days(1)))
            .await
            .unwrap();

        let reset = engine
            .reset_entitlement(&ent.id, Some(reset_at), None)
            .await
            .unwrap();

        assert_eq!(reset.outcomes.len(), 1);
        assert_eq!(reset.outcomes[0].grant_id, grant.id);
        assert_eq!(reset.outcomes[0].balance_before, 70);

        // Expired with the period and not recurring, so nothing backs the
        // new one.
        let value = engine
            .entitlement_value(&ent.id, reset_at + Duration::hours(1))
            .unwrap();
        assert_eq!(balance_of(&value), 0);
    }

    #[tokio::test]
    async fn recurring_grant_spawns_child_on_reset() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;

        let reset_at = t0() + Duration::days(30);
        let parent = engine
            .add_grant(
                &ent.id,
                GrantParams {
                    amount: 100,
                    effective_at: t0(),
                    expires_at: reset_at,
                    priority: 0,
                    recurrence: Some(Recurrence {
                        interval: RecurrenceInterval::Month,
                    }),
                    rollover: None,
                },
            )
            .await
            .unwrap();

        engine
            .record_usage(UsageEvent::new("evt_1".into(), ent.id, 100).at(t0() + Duration::days(1)))
            .await
            .unwrap();

        engine
            .reset_entitlement(&ent.id, Some(reset_at), None)
            .await
            .unwrap();

        let grants = engine.list_grants(&ent.id, false).unwrap();
        assert_eq!(grants.len(), 2);
        let child = grants.iter().find(|g| g.id != parent.id).unwrap();
        assert_eq!(child.amount, 100);
        assert_eq!(child.effective_at, reset_at);
        assert_eq!(child.expires_at, reset_at + RecurrenceInterval::Month.duration());
        assert!(child.recurrence.is_some());

        // The parent expired with the reset; only the child backs the new
        // period.
        let value = engine
            .entitlement_value(&ent.id, reset_at + Duration::hours(1))
            .unwrap();
        assert_eq!(balance_of(&value), 100);
    }

    #[tokio::test]
    async fn still_active_grant_does_not_spawn_child() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;

        let mut p = params(100, 0);
        p.recurrence = Some(Recurrence {
            interval: RecurrenceInterval::Month,
        });
        engine.add_grant(&ent.id, p).await.unwrap();

        engine
            .reset_entitlement(&ent.id, Some(t0() + Duration::days(30)), None)
            .await
            .unwrap();

        // Window runs 60 days; the grant survives the reset as itself.
        let grants = engine.list_grants(&ent.id, false).unwrap();
        assert_eq!(grants.len(), 1);
    }

    #[tokio::test]
    async fn reset_moves_period_anchor() {
        let (engine, _dir) = test_engine();
        let ent = metered_entitlement(&engine).await;
        engine.add_grant(&ent.id, params(100, 0)).await.unwrap();

        let reset_at = t0() + Duration::days(30);
        let anchor = t0() + Duration::days(15);
        engine
            .reset_entitlement(&ent.id, Some(reset_at), Some(anchor))
            .await
            .unwrap();

        let updated = engine.get_entitlement(&ent.id).unwrap();
        assert_eq!(updated.current_period_start, reset_at);
        assert_eq!(updated.period_anchor, anchor);
    }

    #[tokio::test]
    async fn reset_requires_metered_entitlement() {
        let (engine, _dir) = test_engine();
        let ent = engine
            .create_entitlement(
                SubjectId::generate(),
                "beta_access".into(),
                EntitlementKind::Boolean { value: true },
            )
            .await
            .unwrap();

        let result = engine.reset_entitlement(&ent.id, None, None).await;
        assert!(matches!(result, Err(MeterError::NotMetered { .. })));
    }
}
