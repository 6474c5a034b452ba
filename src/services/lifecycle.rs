//! Subscription lifecycle state machine.
//!
//! `plan_update` decides, for one update request, which ledger and
//! subscription mutations keep the price timeline consistent. It performs no
//! I/O: the returned `LedgerOp`s are executed by `SubscriptionService`
//! inside a single transaction.
//!
//! Timeline rules
//! - Price increases apply immediately: the running version is closed at the
//!   end of the previous month (or absorbed if it started this month).
//! - Price decreases are deferred: the current price is charged through the
//!   end of this month, the new price from the first of next month.
//! - Reasserting the current price cancels a scheduled decrease (rollback).

use crate::error::{AppError, AppResult};
use crate::models::{PriceVersion, Subscription, UpdateOperation, UpdateOutcome, UpdateRequest};
use crate::utils::{BillingCalendar, month_end};
use chrono::NaiveDate;
use std::cmp::Ordering;

/// The versions of one subscription a price decision depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerView {
    /// Latest version in effect. For a subscription that has not started yet
    /// this is its opening version.
    pub settled: Option<PriceVersion>,
    /// Scheduled version that has not taken effect yet.
    pub pending: Option<PriceVersion>,
}

impl LedgerView {
    /// The version reaching the subscription end.
    pub fn tail(&self) -> Option<&PriceVersion> {
        self.pending.as_ref().or(self.settled.as_ref())
    }
}

/// Versions starting after this day are pending, the rest are settled.
pub fn pending_pivot(subscription: &Subscription, today: NaiveDate) -> NaiveDate {
    today.max(subscription.start_date)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOp {
    SetSubscriptionPrice(i32),
    SetSubscriptionEnd(Option<NaiveDate>),
    SetVersionPrice {
        version_id: i64,
        price: i32,
    },
    SetPreviousPrice {
        version_id: i64,
        previous_price: Option<i32>,
    },
    SetValidFrom {
        version_id: i64,
        valid_from: NaiveDate,
    },
    /// Set `valid_to`; `None` reopens the version to the open end.
    CloseVersion {
        version_id: i64,
        valid_to: Option<NaiveDate>,
    },
    InsertVersion {
        price: i32,
        previous_price: Option<i32>,
        valid_from: NaiveDate,
        valid_to: Option<NaiveDate>,
    },
    DeleteVersion {
        version_id: i64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub ops: Vec<LedgerOp>,
    pub outcome: UpdateOutcome,
}

/// Price the subscription row should carry today, if it differs from the
/// stored one (a deferred downgrade has taken effect).
pub fn settlement_price(
    subscription: &Subscription,
    settled: Option<&PriceVersion>,
    today: NaiveDate,
) -> Option<i32> {
    settled
        .filter(|v| v.valid_from <= today && v.price != subscription.price)
        .map(|v| v.price)
}

/// Reasserting the row price against a downgrade that already runs but is
/// not settled yet. `reassert` rejects this as a late rollback.
fn reasserts_unsettled_downgrade(
    subscription: &Subscription,
    ledger: &LedgerView,
    request: UpdateRequest,
) -> bool {
    ledger.pending.is_none()
        && request.new_price == Some(subscription.price)
        && ledger
            .settled
            .as_ref()
            .is_some_and(|v| v.previous_price == Some(subscription.price))
}

pub fn plan_update(
    subscription: &Subscription,
    ledger: &LedgerView,
    request: UpdateRequest,
    calendar: &BillingCalendar,
) -> AppResult<UpdatePlan> {
    // Plan against the price in effect, settling the row in the same plan.
    let unsettled = settlement_price(subscription, ledger.settled.as_ref(), calendar.today)
        .filter(|_| !reasserts_unsettled_downgrade(subscription, ledger, request));
    let effective;
    let subscription = match unsettled {
        Some(price) => {
            log::info!(
                "Subscription {} row price {} lags the version in effect, settling to {}",
                subscription.id,
                subscription.price,
                price
            );
            effective = Subscription {
                price,
                ..subscription.clone()
            };
            &effective
        }
        None => subscription,
    };

    let end_change = request
        .end_date
        .target()
        .map(|end| end.map(month_end))
        .filter(|end| *end != subscription.end_date);

    if let Some(end) = end_change {
        check_end_date(subscription, end, calendar)?;
    }

    let mut planner = Planner {
        subscription,
        ledger,
        calendar,
        end_change,
        effective_end: end_change.unwrap_or(subscription.end_date),
        plan: UpdatePlan::default(),
    };
    planner.plan.outcome.end_date_changed = end_change.is_some();
    if let Some(price) = unsettled {
        planner.push(LedgerOp::SetSubscriptionPrice(price));
    }

    let Some(new_price) = request.new_price else {
        planner.end_date_only();
        return Ok(planner.plan);
    };

    if !subscription.has_started_by(calendar.today) && new_price != subscription.price {
        planner.reprice_unstarted(new_price)?;
        return Ok(planner.plan);
    }

    match new_price.cmp(&subscription.price) {
        Ordering::Greater => planner.upgrade(new_price)?,
        Ordering::Less => planner.downgrade(new_price)?,
        Ordering::Equal => planner.reassert()?,
    }
    Ok(planner.plan)
}

fn check_end_date(
    subscription: &Subscription,
    end: Option<NaiveDate>,
    calendar: &BillingCalendar,
) -> AppResult<()> {
    let Some(end) = end else {
        return Ok(());
    };
    if end < calendar.current_month_start {
        return Err(AppError::InvalidTransition(
            "End date cannot be earlier than the current month".into(),
        ));
    }
    if end < subscription.start_date {
        return Err(AppError::InvalidTransition(
            "End date cannot be earlier than the subscription start".into(),
        ));
    }
    Ok(())
}

struct Planner<'a> {
    subscription: &'a Subscription,
    ledger: &'a LedgerView,
    calendar: &'a BillingCalendar,
    end_change: Option<Option<NaiveDate>>,
    effective_end: Option<NaiveDate>,
    plan: UpdatePlan,
}

impl<'a> Planner<'a> {
    fn push(&mut self, op: LedgerOp) {
        self.plan.ops.push(op);
    }

    fn settled(&self) -> AppResult<&PriceVersion> {
        self.ledger.settled.as_ref().ok_or_else(|| {
            AppError::InternalError(format!(
                "Subscription {} has no price version in effect",
                self.subscription.id
            ))
        })
    }

    fn record_end_change(&mut self) {
        if let Some(end) = self.end_change {
            self.push(LedgerOp::SetSubscriptionEnd(end));
        }
    }

    /// Move the end of the timeline. A scheduled version that would start
    /// after the new end can never be charged and is dropped.
    fn move_tail_end(&mut self, end: Option<NaiveDate>) {
        let ledger = self.ledger;
        match (&ledger.pending, &ledger.settled) {
            (Some(pending), Some(settled)) if end.is_some_and(|e| e < pending.valid_from) => {
                log::info!(
                    "Scheduled price version {} dropped: subscription {} now ends before it starts",
                    pending.id,
                    self.subscription.id
                );
                let (pending_id, settled_id) = (pending.id, settled.id);
                self.push(LedgerOp::DeleteVersion {
                    version_id: pending_id,
                });
                self.push(LedgerOp::CloseVersion {
                    version_id: settled_id,
                    valid_to: end,
                });
            }
            _ => {
                if let Some(tail) = ledger.tail() {
                    let tail_id = tail.id;
                    self.push(LedgerOp::CloseVersion {
                        version_id: tail_id,
                        valid_to: end,
                    });
                }
            }
        }
    }

    fn end_date_only(&mut self) {
        if let Some(end) = self.end_change {
            self.record_end_change();
            self.move_tail_end(end);
        }
    }

    /// Nothing has been charged yet, so the opening version is rewritten.
    fn reprice_unstarted(&mut self, new_price: i32) -> AppResult<()> {
        let settled_id = self.settled()?.id;
        self.push(LedgerOp::SetVersionPrice {
            version_id: settled_id,
            price: new_price,
        });
        if let Some(end) = self.end_change {
            self.push(LedgerOp::CloseVersion {
                version_id: settled_id,
                valid_to: end,
            });
        }
        self.push(LedgerOp::SetSubscriptionPrice(new_price));
        self.record_end_change();

        self.plan.outcome.price_changed = true;
        self.plan.outcome.operation = Some(if new_price > self.subscription.price {
            UpdateOperation::Upgrade
        } else {
            UpdateOperation::Downgrade
        });
        Ok(())
    }

    fn upgrade(&mut self, new_price: i32) -> AppResult<()> {
        let ledger = self.ledger;
        if let Some(pending) = &ledger.pending {
            let pending_id = pending.id;
            self.push(LedgerOp::DeleteVersion {
                version_id: pending_id,
            });
        }

        let settled = self.settled()?.clone();
        if settled.valid_from >= self.calendar.current_month_start {
            // Started this month: absorb the increase into the same version.
            self.push(LedgerOp::SetVersionPrice {
                version_id: settled.id,
                price: new_price,
            });
            self.push(LedgerOp::CloseVersion {
                version_id: settled.id,
                valid_to: self.effective_end,
            });
            if settled.previous_price.is_some() {
                self.push(LedgerOp::SetValidFrom {
                    version_id: settled.id,
                    valid_from: self.calendar.today,
                });
            }
        } else {
            self.push(LedgerOp::CloseVersion {
                version_id: settled.id,
                valid_to: Some(self.calendar.end_of_prev_month),
            });
            self.push(LedgerOp::InsertVersion {
                price: new_price,
                previous_price: None,
                valid_from: self.calendar.today,
                valid_to: self.effective_end,
            });
        }

        self.push(LedgerOp::SetSubscriptionPrice(new_price));
        self.record_end_change();
        self.plan.outcome.price_changed = true;
        self.plan.outcome.operation = Some(UpdateOperation::Upgrade);
        Ok(())
    }

    fn downgrade(&mut self, new_price: i32) -> AppResult<()> {
        if self
            .effective_end
            .is_some_and(|end| end < self.calendar.first_next_month)
        {
            return Err(AppError::InvalidTransition(
                "Downgrade would take effect only after the subscription ends".into(),
            ));
        }

        let current_price = self.subscription.price;
        let ledger = self.ledger;
        if let Some(pending) = &ledger.pending {
            let pending_id = pending.id;
            let valid_to = self.end_change.unwrap_or(pending.valid_to);
            self.push(LedgerOp::SetVersionPrice {
                version_id: pending_id,
                price: new_price,
            });
            self.push(LedgerOp::SetPreviousPrice {
                version_id: pending_id,
                previous_price: Some(current_price),
            });
            self.push(LedgerOp::CloseVersion {
                version_id: pending_id,
                valid_to,
            });
        } else {
            let settled_id = self.settled()?.id;
            self.push(LedgerOp::CloseVersion {
                version_id: settled_id,
                valid_to: Some(self.calendar.end_of_current_month),
            });
            self.push(LedgerOp::InsertVersion {
                price: new_price,
                previous_price: Some(current_price),
                valid_from: self.calendar.first_next_month,
                valid_to: self.effective_end,
            });
        }

        self.record_end_change();
        self.plan.outcome.price_changed = true;
        self.plan.outcome.operation = Some(UpdateOperation::Downgrade);
        Ok(())
    }

    /// The downgrade a reasserted price would undo: the scheduled version, or
    /// a deferred downgrade already in effect that the row does not reflect
    /// yet.
    fn rollback_candidate(&self) -> Option<&'a PriceVersion> {
        let ledger = self.ledger;
        let current_price = self.subscription.price;
        ledger.pending.as_ref().or_else(|| {
            ledger
                .settled
                .as_ref()
                .filter(|v| v.previous_price == Some(current_price) && v.price != current_price)
        })
    }

    fn reassert(&mut self) -> AppResult<()> {
        self.record_end_change();

        let Some(candidate) = self.rollback_candidate() else {
            if let Some(end) = self.end_change {
                self.move_tail_end(end);
            }
            return Ok(());
        };

        if candidate.valid_from < self.calendar.first_next_month {
            return Err(AppError::InvalidTransition(
                "Downgrade is already in effect and cannot be rolled back".into(),
            ));
        }

        let candidate_id = candidate.id;
        let settled_id = self.settled()?.id;
        self.push(LedgerOp::DeleteVersion {
            version_id: candidate_id,
        });
        self.push(LedgerOp::CloseVersion {
            version_id: settled_id,
            valid_to: self.effective_end,
        });
        self.plan.outcome.operation = Some(UpdateOperation::Rollback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CostClassification, EndDateUpdate};
    use crate::services::cost::aggregate_cost;
    use crate::utils::{month_start, next_month_start};
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// In-memory ledger applying plans the way the service does.
    struct Sim {
        pub sub: Subscription,
        pub versions: Vec<PriceVersion>,
        next_id: i64,
    }

    impl Sim {
        pub fn new(price: i32, start: NaiveDate, end: Option<NaiveDate>) -> Self {
            let start = month_start(start);
            let end = end.map(month_end);
            Self {
                sub: Subscription {
                    id: 1,
                    user_id: Uuid::nil(),
                    service_name: "Netflix".into(),
                    price,
                    start_date: start,
                    end_date: end,
                },
                versions: vec![PriceVersion {
                    id: 1,
                    subscription_id: 1,
                    price,
                    previous_price: None,
                    valid_from: start,
                    valid_to: end,
                }],
                next_id: 2,
            }
        }

        pub fn view(&self, today: NaiveDate) -> LedgerView {
            let pivot = pending_pivot(&self.sub, today);
            let latest = |pending: bool| {
                self.versions
                    .iter()
                    .filter(|v| (v.valid_from > pivot) == pending)
                    .max_by_key(|v| v.valid_from)
                    .cloned()
            };
            LedgerView {
                settled: latest(false),
                pending: latest(true),
            }
        }

        fn version_mut(&mut self, id: i64) -> &mut PriceVersion {
            self.versions.iter_mut().find(|v| v.id == id).unwrap()
        }

        pub fn apply(&mut self, plan: &UpdatePlan) {
            for op in &plan.ops {
                match op.clone() {
                    LedgerOp::SetSubscriptionPrice(p) => self.sub.price = p,
                    LedgerOp::SetSubscriptionEnd(e) => self.sub.end_date = e,
                    LedgerOp::SetVersionPrice { version_id, price } => {
                        self.version_mut(version_id).price = price
                    }
                    LedgerOp::SetPreviousPrice {
                        version_id,
                        previous_price,
                    } => self.version_mut(version_id).previous_price = previous_price,
                    LedgerOp::SetValidFrom {
                        version_id,
                        valid_from,
                    } => self.version_mut(version_id).valid_from = valid_from,
                    LedgerOp::CloseVersion {
                        version_id,
                        valid_to,
                    } => self.version_mut(version_id).valid_to = valid_to,
                    LedgerOp::InsertVersion {
                        price,
                        previous_price,
                        valid_from,
                        valid_to,
                    } => {
                        self.versions.push(PriceVersion {
                            id: self.next_id,
                            subscription_id: self.sub.id,
                            price,
                            previous_price,
                            valid_from,
                            valid_to,
                        });
                        self.next_id += 1;
                    }
                    LedgerOp::DeleteVersion { version_id } => {
                        self.versions.retain(|v| v.id != version_id)
                    }
                }
            }
        }

        pub fn update(
            &mut self,
            today: NaiveDate,
            new_price: Option<i32>,
            end_date: EndDateUpdate,
        ) -> AppResult<UpdateOutcome> {
            let plan = plan_update(
                &self.sub,
                &self.view(today),
                UpdateRequest {
                    new_price,
                    end_date,
                },
                &BillingCalendar::for_day(today),
            )?;
            self.apply(&plan);
            self.assert_partition();
            self.assert_single_pending(today);
            Ok(plan.outcome)
        }

        pub fn settle(&mut self, today: NaiveDate) {
            let view = self.view(today);
            if let Some(price) = settlement_price(&self.sub, view.settled.as_ref(), today) {
                self.sub.price = price;
            }
        }

        pub fn cost(&self, from: NaiveDate, to: NaiveDate, today: NaiveDate) -> i64 {
            let summary = aggregate_cost(
                self.versions.iter().map(|v| (&self.sub, v)),
                month_start(from),
                month_end(to),
                &BillingCalendar::for_day(today),
            );
            match summary.classification {
                CostClassification::Ok => summary.total,
                _ => 0,
            }
        }

        /// Every month of the subscription is charged by exactly one version.
        pub fn assert_partition(&self) {
            let mut sorted = self.versions.clone();
            sorted.sort_by_key(|v| v.valid_from);
            assert!(!sorted.is_empty(), "ledger is empty");
            assert_eq!(
                month_start(sorted[0].valid_from),
                self.sub.start_date,
                "first version must open the subscription: {sorted:?}"
            );
            for pair in sorted.windows(2) {
                let end = pair[0].valid_to.expect("only the last version may be open");
                assert!(pair[0].valid_from <= end, "empty version: {sorted:?}");
                assert_eq!(
                    next_month_start(end),
                    month_start(pair[1].valid_from),
                    "gap or overlap between versions: {sorted:?}"
                );
            }
            let last = sorted.last().unwrap();
            assert_eq!(last.valid_to, self.sub.end_date, "tail must reach the end");
            if let Some(end) = last.valid_to {
                assert!(last.valid_from <= end, "empty tail version: {sorted:?}");
            }
        }

        pub fn assert_single_pending(&self, today: NaiveDate) {
            let pivot = pending_pivot(&self.sub, today);
            let pending = self.versions.iter().filter(|v| v.valid_from > pivot).count();
            assert!(pending <= 1, "more than one pending version");
        }
    }

    #[test]
    fn test_scenario_downgrade_then_rollback() {
        let jan = d(2024, 1, 10);
        let feb = d(2024, 2, 5);
        let mut sim = Sim::new(100, d(2024, 1, 1), None);
        assert_eq!(sim.cost(d(2024, 1, 1), d(2024, 1, 1), jan), 100);

        let outcome = sim.update(jan, Some(50), EndDateUpdate::Omitted).unwrap();
        assert_eq!(outcome.operation, Some(UpdateOperation::Downgrade));
        assert!(outcome.price_changed);
        assert_eq!(sim.cost(d(2024, 1, 1), d(2024, 1, 1), jan), 100);
        assert_eq!(sim.cost(d(2024, 2, 1), d(2024, 2, 1), feb), 50);
        assert_eq!(sim.sub.price, 100, "row keeps the charged price");

        let outcome = sim.update(jan, Some(100), EndDateUpdate::Omitted).unwrap();
        assert_eq!(outcome.operation, Some(UpdateOperation::Rollback));
        assert!(!outcome.price_changed);
        assert_eq!(sim.versions.len(), 1);
        assert_eq!(sim.versions[0].valid_to, None);
        assert_eq!(sim.cost(d(2024, 2, 1), d(2024, 2, 1), feb), 100);
    }

    #[test]
    fn test_rollback_after_downgrade_took_effect_fails() {
        let mut sim = Sim::new(100, d(2023, 10, 1), None);
        sim.update(d(2024, 1, 10), Some(50), EndDateUpdate::Omitted)
            .unwrap();

        let err = sim
            .update(d(2024, 2, 3), Some(100), EndDateUpdate::Omitted)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        // Once the row is settled the same price is just a no-op.
        sim.settle(d(2024, 2, 3));
        assert_eq!(sim.sub.price, 50);
        let outcome = sim
            .update(d(2024, 2, 3), Some(50), EndDateUpdate::Omitted)
            .unwrap();
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_requesting_price_in_effect_settles_stale_row() {
        let mut sim = Sim::new(200, d(2023, 6, 1), None);
        sim.update(d(2024, 1, 10), Some(100), EndDateUpdate::Omitted)
            .unwrap();

        // February, the sync has not run: row still says 200.
        let outcome = sim
            .update(d(2024, 2, 10), Some(100), EndDateUpdate::Omitted)
            .unwrap();
        assert!(outcome.is_noop());
        assert_eq!(sim.sub.price, 100);
        assert_eq!(sim.versions.len(), 2);
        assert!(sim.view(d(2024, 2, 10)).pending.is_none());
        assert_eq!(sim.cost(d(2024, 3, 1), d(2024, 3, 1), d(2024, 3, 2)), 100);
    }

    #[test]
    fn test_downgrade_from_stale_row_records_charged_price() {
        let mut sim = Sim::new(200, d(2023, 6, 1), None);
        sim.update(d(2024, 1, 10), Some(100), EndDateUpdate::Omitted)
            .unwrap();

        let today = d(2024, 2, 10);
        let outcome = sim.update(today, Some(50), EndDateUpdate::Omitted).unwrap();
        assert_eq!(outcome.operation, Some(UpdateOperation::Downgrade));
        assert_eq!(sim.sub.price, 100);
        let pending = sim.view(today).pending.unwrap();
        assert_eq!(pending.price, 50);
        assert_eq!(pending.previous_price, Some(100));
        assert_eq!(pending.valid_from, d(2024, 3, 1));
        assert_eq!(sim.cost(d(2024, 2, 1), d(2024, 2, 1), today), 100);
    }

    #[test]
    fn test_end_date_change_on_stale_row_settles_it() {
        let mut sim = Sim::new(200, d(2023, 6, 1), None);
        sim.update(d(2024, 1, 10), Some(100), EndDateUpdate::Omitted)
            .unwrap();

        let outcome = sim
            .update(d(2024, 2, 10), None, EndDateUpdate::Set(d(2024, 6, 1)))
            .unwrap();
        assert!(outcome.end_date_changed);
        assert!(!outcome.price_changed);
        assert_eq!(sim.sub.price, 100);
        assert_eq!(sim.sub.end_date, Some(d(2024, 6, 30)));
    }

    #[test]
    fn test_reasserting_stale_row_price_is_rejected() {
        let mut sim = Sim::new(200, d(2023, 6, 1), None);
        sim.update(d(2024, 1, 10), Some(100), EndDateUpdate::Omitted)
            .unwrap();

        let err = sim
            .update(d(2024, 2, 10), Some(200), EndDateUpdate::Omitted)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(sim.sub.price, 200, "rejected plan writes nothing");
        assert_eq!(sim.versions.len(), 2);
    }

    #[test]
    fn test_rollback_of_pending_that_already_started_fails() {
        let today = d(2024, 1, 10);
        let sub = Subscription {
            id: 7,
            user_id: Uuid::nil(),
            service_name: "Kion".into(),
            price: 200,
            start_date: d(2023, 5, 1),
            end_date: None,
        };
        let ledger = LedgerView {
            settled: Some(PriceVersion {
                id: 1,
                subscription_id: 7,
                price: 200,
                previous_price: None,
                valid_from: d(2023, 5, 1),
                valid_to: Some(d(2024, 1, 10)),
            }),
            pending: Some(PriceVersion {
                id: 2,
                subscription_id: 7,
                price: 100,
                previous_price: Some(200),
                valid_from: d(2024, 1, 11),
                valid_to: None,
            }),
        };
        let result = plan_update(
            &sub,
            &ledger,
            UpdateRequest {
                new_price: Some(200),
                end_date: EndDateUpdate::Omitted,
            },
            &BillingCalendar::for_day(today),
        );
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_upgrade_closes_running_version_at_previous_month_end() {
        let today = d(2024, 1, 15);
        let mut sim = Sim::new(50, d(2023, 11, 1), None);
        let outcome = sim.update(today, Some(200), EndDateUpdate::Omitted).unwrap();

        assert_eq!(outcome.operation, Some(UpdateOperation::Upgrade));
        assert!(!outcome.end_date_changed);
        assert_eq!(sim.sub.price, 200);
        assert_eq!(sim.versions.len(), 2);
        assert_eq!(sim.versions[0].valid_to, Some(d(2023, 12, 31)));
        assert_eq!(sim.versions[1].valid_from, today);
        assert_eq!(sim.versions[1].previous_price, None);
        assert!(sim.view(today).pending.is_none());
        assert_eq!(sim.cost(d(2024, 1, 1), d(2024, 1, 1), today), 200);
        assert_eq!(sim.cost(d(2023, 11, 1), d(2024, 1, 1), today), 300);
    }

    #[test]
    fn test_upgrade_in_first_month_is_absorbed() {
        let today = d(2024, 1, 20);
        let mut sim = Sim::new(50, d(2024, 1, 1), Some(d(2024, 6, 1)));
        sim.update(today, Some(100), EndDateUpdate::Omitted).unwrap();

        assert_eq!(sim.versions.len(), 1);
        assert_eq!(sim.versions[0].price, 100);
        assert_eq!(sim.versions[0].valid_from, d(2024, 1, 1));
        assert_eq!(sim.versions[0].valid_to, Some(d(2024, 6, 30)));
        assert_eq!(sim.cost(d(2024, 1, 1), d(2024, 1, 1), today), 100);
    }

    #[test]
    fn test_upgrade_supersedes_scheduled_downgrade() {
        let today = d(2024, 1, 10);
        let mut sim = Sim::new(100, d(2023, 6, 1), None);
        sim.update(today, Some(50), EndDateUpdate::Omitted).unwrap();
        assert!(sim.view(today).pending.is_some());

        let outcome = sim.update(today, Some(200), EndDateUpdate::Omitted).unwrap();
        assert_eq!(outcome.operation, Some(UpdateOperation::Upgrade));
        assert!(sim.view(today).pending.is_none());
        assert!(sim.versions.iter().all(|v| v.price != 50));
        assert_eq!(sim.cost(d(2024, 2, 1), d(2024, 2, 1), d(2024, 2, 2)), 200);
    }

    #[test]
    fn test_upgrade_reverses_downgrade_in_effect() {
        let mut sim = Sim::new(100, d(2023, 6, 1), None);
        sim.update(d(2024, 1, 10), Some(50), EndDateUpdate::Omitted)
            .unwrap();

        // February, row not settled yet: the downgrade version is running.
        let today = d(2024, 2, 12);
        sim.update(today, Some(200), EndDateUpdate::Omitted).unwrap();
        let tail = sim.versions.iter().max_by_key(|v| v.valid_from).unwrap();
        assert_eq!(tail.price, 200);
        assert_eq!(tail.valid_from, today);
        assert_eq!(sim.sub.price, 200);
    }

    #[test]
    fn test_downgrade_defers_to_next_month() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(200, d(2023, 1, 1), Some(d(2024, 12, 1)));
        sim.update(today, Some(100), EndDateUpdate::Omitted).unwrap();

        let view = sim.view(today);
        assert_eq!(view.settled.as_ref().unwrap().valid_to, Some(d(2024, 3, 31)));
        let pending = view.pending.unwrap();
        assert_eq!(pending.valid_from, d(2024, 4, 1));
        assert_eq!(pending.valid_to, Some(d(2024, 12, 31)));
        assert_eq!(pending.previous_price, Some(200));
        assert_eq!(sim.cost(d(2024, 3, 1), d(2024, 3, 1), today), 200);
    }

    #[test]
    fn test_second_downgrade_retargets_pending() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(200, d(2023, 1, 1), None);
        sim.update(today, Some(100), EndDateUpdate::Omitted).unwrap();
        sim.update(today, Some(50), EndDateUpdate::Set(d(2024, 9, 1)))
            .unwrap();

        assert_eq!(sim.versions.len(), 2);
        let pending = sim.view(today).pending.unwrap();
        assert_eq!(pending.price, 50);
        assert_eq!(pending.previous_price, Some(200));
        assert_eq!(pending.valid_to, Some(d(2024, 9, 30)));
        assert_eq!(sim.sub.end_date, Some(d(2024, 9, 30)));
    }

    #[test]
    fn test_downgrade_ending_this_month_is_rejected() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(200, d(2023, 1, 1), Some(d(2024, 3, 1)));
        let err = sim
            .update(today, Some(50), EndDateUpdate::Omitted)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
        assert_eq!(sim.versions.len(), 1);
    }

    #[test]
    fn test_identical_update_is_noop() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(100, d(2024, 1, 1), Some(d(2024, 8, 1)));
        let before = sim.versions.clone();

        let outcome = sim
            .update(today, Some(100), EndDateUpdate::Set(d(2024, 8, 1)))
            .unwrap();
        assert!(outcome.is_noop());
        assert_eq!(sim.versions, before);

        let outcome = sim.update(today, None, EndDateUpdate::Omitted).unwrap();
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_end_date_only_change_moves_tail() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(100, d(2023, 1, 1), None);
        let outcome = sim
            .update(today, None, EndDateUpdate::Set(d(2024, 6, 1)))
            .unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome {
                price_changed: false,
                end_date_changed: true,
                operation: None,
            }
        );
        assert_eq!(sim.sub.end_date, Some(d(2024, 6, 30)));

        sim.update(today, None, EndDateUpdate::Cleared).unwrap();
        assert_eq!(sim.sub.end_date, None);
        assert_eq!(sim.versions[0].valid_to, None);
    }

    #[test]
    fn test_shortening_before_pending_drops_it() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(200, d(2023, 1, 1), None);
        sim.update(today, Some(100), EndDateUpdate::Omitted).unwrap();

        sim.update(today, None, EndDateUpdate::Set(d(2024, 3, 1)))
            .unwrap();
        assert_eq!(sim.versions.len(), 1);
        assert_eq!(sim.versions[0].price, 200);
        assert_eq!(sim.versions[0].valid_to, Some(d(2024, 3, 31)));
    }

    #[test]
    fn test_rollback_with_end_date_change() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(200, d(2023, 1, 1), None);
        sim.update(today, Some(50), EndDateUpdate::Omitted).unwrap();

        let outcome = sim
            .update(today, Some(200), EndDateUpdate::Set(d(2025, 2, 1)))
            .unwrap();
        assert_eq!(outcome.operation, Some(UpdateOperation::Rollback));
        assert!(outcome.end_date_changed);
        assert_eq!(sim.versions.len(), 1);
        assert_eq!(sim.versions[0].valid_to, Some(d(2025, 2, 28)));
    }

    #[test]
    fn test_end_date_in_past_month_is_rejected() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(100, d(2023, 1, 1), None);
        let err = sim
            .update(today, None, EndDateUpdate::Set(d(2024, 2, 1)))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn test_unstarted_subscription_is_repriced_in_place() {
        let today = d(2024, 3, 18);
        let mut sim = Sim::new(100, d(2024, 5, 1), None);
        assert!(sim.view(today).pending.is_none());

        let outcome = sim.update(today, Some(50), EndDateUpdate::Omitted).unwrap();
        assert_eq!(outcome.operation, Some(UpdateOperation::Downgrade));
        assert_eq!(sim.versions.len(), 1);
        assert_eq!(sim.versions[0].price, 50);
        assert_eq!(sim.sub.price, 50);

        let outcome = sim.update(today, Some(200), EndDateUpdate::Omitted).unwrap();
        assert_eq!(outcome.operation, Some(UpdateOperation::Upgrade));
        assert_eq!(sim.versions.len(), 1);
        assert_eq!(sim.versions[0].valid_from, d(2024, 5, 1));
    }

    #[test]
    fn test_long_sequence_keeps_partition() {
        let mut sim = Sim::new(100, d(2023, 9, 1), None);
        let steps: &[(NaiveDate, Option<i32>, EndDateUpdate)] = &[
            (d(2023, 10, 4), Some(50), EndDateUpdate::Omitted),
            (d(2023, 10, 20), Some(100), EndDateUpdate::Omitted),
            (d(2023, 12, 2), Some(200), EndDateUpdate::Set(d(2024, 12, 1))),
            (d(2024, 2, 9), Some(100), EndDateUpdate::Omitted),
            (d(2024, 2, 10), Some(50), EndDateUpdate::Cleared),
            (d(2024, 4, 1), Some(200), EndDateUpdate::Omitted),
            (d(2024, 4, 30), None, EndDateUpdate::Set(d(2024, 10, 1))),
            (d(2024, 5, 2), Some(50), EndDateUpdate::Omitted),
        ];
        for (today, price, end) in steps {
            sim.settle(*today);
            sim.update(*today, *price, *end).unwrap();
        }
        assert_eq!(sim.sub.end_date, Some(d(2024, 10, 31)));
        // The opening months were charged at the original price.
        let total = sim.cost(d(2023, 9, 1), d(2023, 11, 1), d(2024, 5, 2));
        assert_eq!(total, 300);
    }

    #[test]
    fn test_settlement_price() {
        let sub = Subscription {
            id: 1,
            user_id: Uuid::nil(),
            service_name: "Okko".into(),
            price: 200,
            start_date: d(2023, 1, 1),
            end_date: None,
        };
        let version = PriceVersion {
            id: 3,
            subscription_id: 1,
            price: 100,
            previous_price: Some(200),
            valid_from: d(2024, 2, 1),
            valid_to: None,
        };
        assert_eq!(settlement_price(&sub, Some(&version), d(2024, 1, 31)), None);
        assert_eq!(
            settlement_price(&sub, Some(&version), d(2024, 2, 1)),
            Some(100)
        );
        assert_eq!(settlement_price(&sub, None, d(2024, 2, 1)), None);
    }
}
