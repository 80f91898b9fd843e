// 💰 Financial Aggregator - project rollups + financial date
//
// Rollup:  for each kind in {Estimated, NetBook, Assessed}
//            project.kind = Σ over properties of the record selected
//                           for project.fiscal_year (missing → 0)
// Date:    anchor-kind effective date, never later than "now"
//
// Pure functions of the attached properties' histories. Missing data
// degrades to zero / now and is never an error.

use crate::config::{AggregatorConfig, AnchorPolicy, YearMatch};
use crate::entities::{FinancialKind, FinancialRecord, FinancialRollup, Project, Property};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Kinds summed into project-level fields.
pub const ROLLUP_KINDS: [FinancialKind; 3] = [
    FinancialKind::Estimated,
    FinancialKind::NetBook,
    FinancialKind::Assessed,
];

/// Outcome of a recompute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recompute {
    Updated(FinancialRollup),
    /// Terminal project: derived fields left untouched
    Frozen,
}

// ============================================================================
// FINANCIAL AGGREGATOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct FinancialAggregator {
    config: AggregatorConfig,
}

impl FinancialAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        FinancialAggregator { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Record of `kind` that counts for `fiscal_year`.
    ///
    /// Picks the highest eligible fiscal year; when several records share
    /// (kind, year) the one created last (highest position) wins.
    pub fn select_record<'a>(
        &self,
        records: &'a [FinancialRecord],
        kind: FinancialKind,
        fiscal_year: i32,
    ) -> Option<&'a FinancialRecord> {
        records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == kind)
            .filter(|(_, r)| match self.config.year_match {
                YearMatch::Exact => r.fiscal_year == fiscal_year,
                YearMatch::ExactOrPrior => r.fiscal_year <= fiscal_year,
            })
            .max_by_key(|(position, r)| (r.fiscal_year, *position))
            .map(|(_, r)| r)
    }

    /// Sum the rollup kinds across `properties` for `fiscal_year`.
    pub fn compute_rollup(&self, properties: &[Property], fiscal_year: i32) -> FinancialRollup {
        let mut rollup = FinancialRollup::zero();

        for property in properties {
            for kind in ROLLUP_KINDS {
                let value = self
                    .select_record(property.financials(), kind, fiscal_year)
                    .map(|r| r.value)
                    .unwrap_or(Decimal::ZERO);

                match kind {
                    FinancialKind::Estimated => rollup.estimated += value,
                    FinancialKind::NetBook => rollup.net_book += value,
                    FinancialKind::Assessed => rollup.assessed += value,
                    FinancialKind::Appraised | FinancialKind::Market => {}
                }
            }
        }

        rollup
    }

    /// Rewrite the project's three derived fields from its properties.
    ///
    /// Terminal projects are left as they are.
    pub fn update_project_financials(&self, project: &mut Project) -> Recompute {
        if project.is_frozen() {
            info!(
                project_id = project.id,
                status = %project.status(),
                "Skipping rollup for terminal project"
            );
            return Recompute::Frozen;
        }

        let rollup = self.compute_rollup(project.properties(), project.fiscal_year());
        project.apply_rollup(rollup);

        debug!(
            project_id = project.id,
            fiscal_year = project.fiscal_year(),
            properties = project.properties().len(),
            estimated = %rollup.estimated,
            net_book = %rollup.net_book,
            assessed = %rollup.assessed,
            "Project financials updated"
        );

        Recompute::Updated(rollup)
    }

    /// Financial date as of the current processing time.
    pub fn compute_financial_date(&self, project: &Project) -> DateTime<Utc> {
        self.compute_financial_date_at(project, Utc::now())
    }

    /// Financial date as of `now`. Never later than `now`.
    pub fn compute_financial_date_at(
        &self,
        project: &Project,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let records: Vec<&FinancialRecord> = project
            .properties()
            .iter()
            .flat_map(|p| p.financials())
            .collect();

        if records.is_empty() {
            return now;
        }

        let anchor_kind = self.config.anchor_kind;
        let anchored = self.pick_date(
            records.iter().filter(|r| r.kind == anchor_kind).copied(),
            now,
        );

        let date = anchored.or_else(|| {
            debug!(
                project_id = project.id,
                anchor_kind = %anchor_kind,
                "No dated anchor records, falling back to all kinds"
            );
            self.pick_date(records.iter().copied(), now)
        });

        date.map_or(now, |date| date.min(now))
    }

    /// `None` when no record carries an effective date. Otherwise the
    /// policy's pick, clamped to `now`: with every date in the future the
    /// result is `now`.
    fn pick_date<'a, I>(&self, records: I, now: DateTime<Utc>) -> Option<DateTime<Utc>>
    where
        I: Iterator<Item = &'a FinancialRecord>,
    {
        let dates: Vec<DateTime<Utc>> = records
            .filter_map(|r| r.effective_date)
            .map(start_of_day)
            .collect();

        if dates.is_empty() {
            return None;
        }

        let picked = match self.config.anchor_policy {
            AnchorPolicy::Latest => dates.iter().copied().filter(|date| *date <= now).max(),
            AnchorPolicy::Earliest => dates.iter().copied().min(),
        };
        Some(picked.map_or(now, |date| date.min(now)))
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ProjectStatus;
    use chrono::TimeZone;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    /// One record per year in `years`, dated Jan 1st of that year.
    fn create_test_series(
        property: Property,
        kind: FinancialKind,
        years: std::ops::RangeInclusive<i32>,
        value: Decimal,
    ) -> Property {
        years.fold(property, |p, year| {
            p.with_financial(
                FinancialRecord::new(kind, year, value).with_effective_date(ymd(year, 1, 1)),
            )
        })
    }

    fn create_test_project(fiscal_year: i32, properties: Vec<Property>) -> Project {
        let mut project = Project::new(1, "SPP-10001", "Test project", 1, fiscal_year);
        for property in properties {
            project.push_property(property);
        }
        project
    }

    #[test]
    fn test_financial_date_without_records_is_now() {
        let aggregator = FinancialAggregator::default();
        let buildings = (1..=10)
            .map(|id| Property::new_building(id, format!("Building {}", id), Some(100)))
            .collect();
        let project = create_test_project(2019, buildings);

        let before = Utc::now();
        let result = aggregator.compute_financial_date(&project);

        assert!(result >= before);
        assert!(result <= Utc::now());
    }

    #[test]
    fn test_financial_date_of_empty_project_is_now() {
        let aggregator = FinancialAggregator::default();
        let project = create_test_project(2019, Vec::new());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert_eq!(aggregator.compute_financial_date_at(&project, now), now);
    }

    #[test]
    fn test_financial_date_uses_latest_assessed_record() {
        let aggregator = FinancialAggregator::default();
        let mut buildings: Vec<Property> = (1..=10)
            .map(|id| Property::new_building(id, format!("Building {}", id), Some(100)))
            .collect();
        let first = buildings.remove(0);
        let first = (2015..=2019).fold(first, |p, year| {
            p.with_financial(
                FinancialRecord::new(FinancialKind::Assessed, year, Decimal::from(year - 2014))
                    .with_effective_date(ymd(year, 1, 1)),
            )
        });
        buildings.insert(0, first);
        let project = create_test_project(2019, buildings);

        let result = aggregator.compute_financial_date(&project);

        assert_eq!(result, Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_financial_date_earliest_policy() {
        let aggregator = FinancialAggregator::new(AggregatorConfig {
            anchor_policy: AnchorPolicy::Earliest,
            ..AggregatorConfig::default()
        });
        let building = create_test_series(
            Property::new_building(1, "B1", None),
            FinancialKind::Assessed,
            2015..=2019,
            Decimal::ONE,
        );
        let project = create_test_project(2019, vec![building]);

        assert_eq!(
            aggregator.compute_financial_date(&project),
            Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_financial_date_falls_back_to_other_kinds() {
        let aggregator = FinancialAggregator::default();
        let parcel = create_test_series(
            Property::new_parcel(1, "P1"),
            FinancialKind::NetBook,
            2016..=2018,
            Decimal::ONE,
        )
        // anchor kind present but undated: does not count
        .with_financial(FinancialRecord::new(FinancialKind::Assessed, 2019, Decimal::ONE));
        let project = create_test_project(2019, vec![parcel]);

        assert_eq!(
            aggregator.compute_financial_date(&project),
            Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_financial_date_never_after_now() {
        let aggregator = FinancialAggregator::default();
        let now = Utc.with_ymd_and_hms(2020, 6, 30, 0, 0, 0).unwrap();
        let parcel = create_test_series(
            Property::new_parcel(1, "P1"),
            FinancialKind::Assessed,
            2019..=2022,
            Decimal::ONE,
        );
        let project = create_test_project(2022, vec![parcel]);

        let result = aggregator.compute_financial_date_at(&project, now);
        assert_eq!(result, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(result <= now);

        // every record in the future: clamp to now
        let future = create_test_series(
            Property::new_parcel(2, "P2"),
            FinancialKind::Assessed,
            2030..=2031,
            Decimal::ONE,
        );
        let project = create_test_project(2031, vec![future]);
        assert_eq!(aggregator.compute_financial_date_at(&project, now), now);
    }

    #[test]
    fn test_future_anchor_records_do_not_fall_back() {
        let aggregator = FinancialAggregator::default();
        let now = Utc.with_ymd_and_hms(2020, 6, 30, 0, 0, 0).unwrap();
        let parcel = Property::new_parcel(1, "P1")
            .with_financial(
                FinancialRecord::new(FinancialKind::Assessed, 2030, Decimal::ONE)
                    .with_effective_date(ymd(2030, 1, 1)),
            )
            .with_financial(
                FinancialRecord::new(FinancialKind::NetBook, 2015, Decimal::ONE)
                    .with_effective_date(ymd(2015, 1, 1)),
            );
        let project = create_test_project(2020, vec![parcel]);

        assert_eq!(aggregator.compute_financial_date_at(&project, now), now);

        let earliest = FinancialAggregator::new(AggregatorConfig {
            anchor_policy: AnchorPolicy::Earliest,
            ..AggregatorConfig::default()
        });
        assert_eq!(earliest.compute_financial_date_at(&project, now), now);
    }

    #[test]
    fn test_update_without_properties_is_zero() {
        let aggregator = FinancialAggregator::default();
        let mut project = create_test_project(2019, Vec::new());

        let outcome = aggregator.update_project_financials(&mut project);

        assert_eq!(outcome, Recompute::Updated(FinancialRollup::zero()));
        assert_eq!(project.estimated(), Decimal::ZERO);
        assert_eq!(project.net_book(), Decimal::ZERO);
        assert_eq!(project.assessed(), Decimal::ZERO);
    }

    #[test]
    fn test_update_project_financials() {
        let aggregator = FinancialAggregator::default();
        let five = Decimal::from(5);

        let mut parcel = Property::new_parcel(1, "Parcel 1");
        let mut building = Property::new_building(2, "Building 1", Some(1));
        for kind in ROLLUP_KINDS {
            parcel = create_test_series(parcel, kind, 2015..=2019, five);
            building = create_test_series(building, kind, 2015..=2019, five);
        }
        let others: Vec<Property> = (3..=11)
            .map(|id| Property::new_building(id, format!("Building {}", id), Some(1)))
            .collect();

        let mut properties = vec![parcel, building];
        properties.extend(others);
        let mut project = create_test_project(2019, properties);

        aggregator.update_project_financials(&mut project);

        assert_eq!(project.estimated(), Decimal::from(10));
        assert_eq!(project.net_book(), Decimal::from(10));
        assert_eq!(project.assessed(), Decimal::from(10));
    }

    #[test]
    fn test_rollup_uses_exact_year_before_prior() {
        let aggregator = FinancialAggregator::default();
        let parcel = Property::new_parcel(1, "P1")
            .with_financial(FinancialRecord::new(FinancialKind::NetBook, 2017, Decimal::from(100)))
            .with_financial(FinancialRecord::new(FinancialKind::NetBook, 2019, Decimal::from(300)))
            .with_financial(FinancialRecord::new(FinancialKind::NetBook, 2018, Decimal::from(200)));

        let rollup = aggregator.compute_rollup(&[parcel.clone()], 2019);
        assert_eq!(rollup.net_book, Decimal::from(300));

        // 2021 is absent: latest prior year (2019) is used
        let rollup = aggregator.compute_rollup(&[parcel.clone()], 2021);
        assert_eq!(rollup.net_book, Decimal::from(300));

        // nothing at or before 2016
        let rollup = aggregator.compute_rollup(&[parcel], 2016);
        assert_eq!(rollup.net_book, Decimal::ZERO);
    }

    #[test]
    fn test_rollup_exact_policy_ignores_prior_years() {
        let aggregator = FinancialAggregator::new(AggregatorConfig {
            year_match: YearMatch::Exact,
            ..AggregatorConfig::default()
        });
        let parcel = Property::new_parcel(1, "P1")
            .with_financial(FinancialRecord::new(FinancialKind::Estimated, 2018, Decimal::from(7)));

        assert_eq!(aggregator.compute_rollup(&[parcel.clone()], 2019).estimated, Decimal::ZERO);
        assert_eq!(aggregator.compute_rollup(&[parcel], 2018).estimated, Decimal::from(7));
    }

    #[test]
    fn test_duplicate_kind_and_year_latest_created_wins() {
        let aggregator = FinancialAggregator::default();
        let parcel = Property::new_parcel(1, "P1")
            .with_financial(FinancialRecord::new(FinancialKind::Assessed, 2019, Decimal::from(1)))
            .with_financial(FinancialRecord::new(FinancialKind::Assessed, 2019, Decimal::from(2)))
            .with_financial(FinancialRecord::new(FinancialKind::Assessed, 2018, Decimal::from(9)));

        let selected = aggregator
            .select_record(parcel.financials(), FinancialKind::Assessed, 2019)
            .unwrap();
        assert_eq!(selected.value, Decimal::from(2));
        assert_eq!(aggregator.compute_rollup(&[parcel], 2019).assessed, Decimal::from(2));
    }

    #[test]
    fn test_rollup_is_exact_decimal() {
        let aggregator = FinancialAggregator::default();
        let properties: Vec<Property> = (1..=3)
            .map(|id| {
                Property::new_parcel(id, format!("P{}", id)).with_financial(FinancialRecord::new(
                    FinancialKind::Estimated,
                    2019,
                    Decimal::new(10, 2), // 0.10
                ))
            })
            .collect();

        let rollup = aggregator.compute_rollup(&properties, 2019);
        assert_eq!(rollup.estimated, Decimal::new(30, 2));
    }

    #[test]
    fn test_appraised_and_market_do_not_roll_up() {
        let aggregator = FinancialAggregator::default();
        let parcel = Property::new_parcel(1, "P1")
            .with_financial(FinancialRecord::new(FinancialKind::Appraised, 2019, Decimal::from(50)))
            .with_financial(FinancialRecord::new(FinancialKind::Market, 2019, Decimal::from(60)));

        assert!(aggregator.compute_rollup(&[parcel], 2019).is_zero());
    }

    #[test]
    fn test_terminal_project_is_not_recomputed() {
        let aggregator = FinancialAggregator::default();
        let parcel = Property::new_parcel(1, "P1")
            .with_financial(FinancialRecord::new(FinancialKind::Estimated, 2019, Decimal::from(5)));
        let mut project = create_test_project(2019, vec![parcel]);
        project.set_status(ProjectStatus::Completed);

        assert_eq!(aggregator.update_project_financials(&mut project), Recompute::Frozen);
        assert_eq!(project.estimated(), Decimal::ZERO);
    }
}
