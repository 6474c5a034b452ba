use crate::models::{CostClassification, CostSummary, PriceVersion, Subscription};
use crate::utils::{BillingCalendar, inclusive_month_count};
use chrono::NaiveDate;

/// Sum what the versions charge inside `[from, to]`.
///
/// Each version is clipped to its own range, its subscription's range, the
/// query window and the end of the current month; every calendar month the
/// clipped range touches costs one `price`.
pub fn aggregate_cost<'a, I>(
    rows: I,
    from: NaiveDate,
    to: NaiveDate,
    calendar: &BillingCalendar,
) -> CostSummary
where
    I: IntoIterator<Item = (&'a Subscription, &'a PriceVersion)>,
{
    let horizon = to.min(calendar.end_of_current_month);
    let mut total = 0i64;
    let mut overlapped = false;

    for (subscription, version) in rows {
        let start = version.valid_from.max(subscription.start_date).max(from);
        let end = [version.valid_to, subscription.end_date]
            .into_iter()
            .flatten()
            .fold(horizon, NaiveDate::min);
        if end < start {
            continue;
        }
        overlapped = true;
        total += i64::from(version.price) * inclusive_month_count(start, end);
    }

    CostSummary {
        total,
        classification: if overlapped {
            CostClassification::Ok
        } else {
            CostClassification::NoOverlap
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sub(id: i64, start: NaiveDate, end: Option<NaiveDate>) -> Subscription {
        Subscription {
            id,
            user_id: Uuid::nil(),
            service_name: "Netflix".into(),
            price: 100,
            start_date: start,
            end_date: end,
        }
    }

    fn version(
        sub_id: i64,
        price: i32,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> PriceVersion {
        PriceVersion {
            id: 0,
            subscription_id: sub_id,
            price,
            previous_price: None,
            valid_from: from,
            valid_to: to,
        }
    }

    #[test]
    fn test_price_change_inside_window() {
        let s = sub(1, d(2024, 1, 1), None);
        let versions = [
            version(1, 100, d(2024, 1, 1), Some(d(2024, 3, 31))),
            version(1, 50, d(2024, 4, 1), None),
        ];
        let cal = BillingCalendar::for_day(d(2024, 12, 10));
        let summary = aggregate_cost(
            versions.iter().map(|v| (&s, v)),
            d(2024, 2, 1),
            d(2024, 5, 31),
            &cal,
        );
        assert_eq!(summary.classification, CostClassification::Ok);
        assert_eq!(summary.total, 2 * 100 + 2 * 50);
    }

    #[test]
    fn test_open_end_stops_at_current_month() {
        let s = sub(1, d(2024, 1, 1), None);
        let versions = [version(1, 200, d(2024, 1, 1), None)];
        let cal = BillingCalendar::for_day(d(2024, 3, 15));
        let summary = aggregate_cost(
            versions.iter().map(|v| (&s, v)),
            d(2024, 1, 1),
            d(2024, 12, 31),
            &cal,
        );
        assert_eq!(summary.total, 3 * 200);
    }

    #[test]
    fn test_future_window_has_no_overlap() {
        let s = sub(1, d(2024, 1, 1), None);
        let versions = [version(1, 200, d(2024, 1, 1), None)];
        let cal = BillingCalendar::for_day(d(2024, 3, 15));
        let summary = aggregate_cost(
            versions.iter().map(|v| (&s, v)),
            d(2024, 6, 1),
            d(2024, 8, 31),
            &cal,
        );
        assert_eq!(summary.classification, CostClassification::NoOverlap);
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn test_history_of_subscriptions_is_summed() {
        let old = sub(1, d(2023, 1, 1), Some(d(2023, 6, 30)));
        let current = sub(2, d(2023, 9, 1), None);
        let v_old = version(1, 50, d(2023, 1, 1), Some(d(2023, 6, 30)));
        let v_new = version(2, 100, d(2023, 9, 1), None);
        let cal = BillingCalendar::for_day(d(2023, 10, 2));
        let rows = [(&old, &v_old), (&current, &v_new)];
        let summary = aggregate_cost(rows, d(2023, 5, 1), d(2023, 12, 31), &cal);
        // May..Jun on the old one, Sep..Oct on the new one.
        assert_eq!(summary.total, 2 * 50 + 2 * 100);
    }

    #[test]
    fn test_mid_month_upgrade_counts_whole_month() {
        let s = sub(1, d(2023, 11, 1), None);
        let versions = [
            version(1, 50, d(2023, 11, 1), Some(d(2023, 12, 31))),
            version(1, 200, d(2024, 1, 15), None),
        ];
        let cal = BillingCalendar::for_day(d(2024, 1, 20));
        let summary = aggregate_cost(
            versions.iter().map(|v| (&s, v)),
            d(2024, 1, 1),
            d(2024, 1, 31),
            &cal,
        );
        assert_eq!(summary.total, 200);
    }
}
