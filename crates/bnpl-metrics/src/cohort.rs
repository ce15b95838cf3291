//! Signup-month cohort retention

use bnpl_core::{tables, GoldRow, RowFlag};
use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::aggregate::ratio;
use crate::definition::MetricDefinition;
use crate::snapshot::SilverSnapshot;
use crate::store::Partition;

/// Cohort key of a signup date
pub fn cohort_of(signup: NaiveDate) -> String {
    signup.format("%Y-%m").to_string()
}

/// One row per cohort of users signed up on or before `date`
///
/// A user is retained when their `user_features_daily` row for `date`
/// shows at least one order in the last 30 days.
pub fn compute(
    def: &MetricDefinition,
    date: NaiveDate,
    snapshot: &SilverSnapshot,
    user_features: &Partition,
) -> Vec<GoldRow> {
    let mut cohorts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for user in snapshot.up_to(tables::USERS, date) {
        let (Some(user_id), Some(signup)) = (user.get_str("user_id"), user.get_date("signup_date"))
        else {
            continue;
        };
        let active = user_features
            .row(user_id)
            .and_then(|row| row.get_f64("orders_30d"))
            .map(|orders| orders > 0.0)
            .unwrap_or(false);

        let entry = cohorts.entry(cohort_of(signup)).or_default();
        entry.0 += 1;
        if active {
            entry.1 += 1;
        }
    }

    cohorts
        .into_iter()
        .map(|(cohort, (size, active))| {
            let (rate, no_data) = ratio(active as f64, size as f64);
            let mut row = GoldRow::new(&def.output_table, &def.name, &cohort, date)
                .with_value("cohort", cohort.as_str())
                .with_value("cohort_size", size as i64)
                .with_value("active_users_30d", active as i64)
                .with_value("retention_rate", rate)
                .with_value("no_data", no_data);
            if no_data {
                row = row.with_flag(RowFlag::NoData);
            }
            row.seal()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cohort_key() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 17).unwrap();
        assert_eq!(cohort_of(date), "2024-03");
    }
}
