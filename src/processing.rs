//! Proportion tables behind the two dashboard charts.
//!
//! Both aggregators take any iterator over records so callers can pass a
//! filtered view of the dataset without collecting it first. An empty input
//! produces an all-zero table with `total == 0`; nothing here divides by zero.

use crate::types::{Borough, HeatTable, Health, ProportionRow, ProportionTable, TreeRecord};

/// Share of each (borough, condition) pair in `subset`, rounded to 2 places.
///
/// The denominator is the size of the whole subset, so all 15 proportions
/// together sum to 1 rather than each borough's three.
pub fn aggregate_condition_proportions<'a, I>(subset: I) -> ProportionTable
where
    I: IntoIterator<Item = &'a TreeRecord>,
{
    let mut counts = [[0usize; 3]; 5];
    let mut total = 0usize;

    for record in subset {
        total += 1;
        if let Some(health) = record.health {
            counts[record.borough.index()][health.index()] += 1;
        }
    }

    let mut rows = Vec::with_capacity(Borough::ALL.len() * Health::ALL.len());
    for borough in Borough::ALL {
        for condition in Health::ALL {
            let count = counts[borough.index()][condition.index()];
            rows.push(ProportionRow {
                borough,
                condition,
                proportion: round2(proportion(count, total)),
            });
        }
    }

    ProportionTable { total, rows }
}

/// Share of each (health, steward) pair among records that have both a
/// steward and a species. Unrounded.
pub fn aggregate_steward_health<'a, I>(subset: I) -> HeatTable
where
    I: IntoIterator<Item = &'a TreeRecord>,
{
    let mut counts = [[0usize; 4]; 3];
    let mut total = 0usize;

    for record in subset {
        let steward = match record.steward {
            Some(s) if record.species.is_some() => s,
            _ => continue,
        };
        total += 1;
        if let Some(health) = record.health {
            counts[health.index()][steward.heatmap_column()] += 1;
        }
    }

    let mut values = [[0.0; 4]; 3];
    for (row, row_counts) in values.iter_mut().zip(counts.iter()) {
        for (cell, &count) in row.iter_mut().zip(row_counts.iter()) {
            *cell = proportion(count, total);
        }
    }

    HeatTable { total, values }
}

fn proportion(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Round to 2 places from the exact decimal expansion, ties to even.
fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Steward;
    use approx::assert_abs_diff_eq;

    fn tree(borough: Borough, health: Health, steward: Option<Steward>) -> TreeRecord {
        TreeRecord::new("pin oak", borough, health, steward)
    }

    fn repeat(n: usize, record: TreeRecord) -> Vec<TreeRecord> {
        vec![record; n]
    }

    #[test]
    fn test_brooklyn_good_and_fair() {
        let mut subset = repeat(4, tree(Borough::Brooklyn, Health::Good, None));
        subset.extend(repeat(6, tree(Borough::Brooklyn, Health::Fair, None)));

        let table = aggregate_condition_proportions(&subset);

        assert_eq!(table.total, 10);
        assert_eq!(table.rows.len(), 15);
        assert_abs_diff_eq!(table.get(Borough::Brooklyn, Health::Good), 0.40);
        assert_abs_diff_eq!(table.get(Borough::Brooklyn, Health::Fair), 0.60);
        assert_abs_diff_eq!(table.get(Borough::Brooklyn, Health::Poor), 0.00);
        for borough in &Borough::ALL[1..] {
            for condition in Health::ALL {
                assert_eq!(table.get(*borough, condition), 0.0);
            }
        }
    }

    #[test]
    fn test_row_order_is_borough_then_condition() {
        let table = aggregate_condition_proportions(&[tree(Borough::Queens, Health::Poor, None)]);
        let order: Vec<(Borough, Health)> =
            table.rows.iter().map(|r| (r.borough, r.condition)).collect();
        assert_eq!(order[0], (Borough::Brooklyn, Health::Good));
        assert_eq!(order[2], (Borough::Brooklyn, Health::Poor));
        assert_eq!(order[3], (Borough::Bronx, Health::Good));
        assert_eq!(order[14], (Borough::StatenIsland, Health::Poor));
        assert_eq!(table.get(Borough::Queens, Health::Poor), 1.0);
    }

    #[test]
    fn test_proportions_sum_to_one_across_boroughs() {
        let subset = vec![
            tree(Borough::Brooklyn, Health::Good, None),
            tree(Borough::Bronx, Health::Fair, None),
            tree(Borough::Manhattan, Health::Poor, None),
            tree(Borough::Queens, Health::Good, None),
        ];
        let table = aggregate_condition_proportions(&subset);
        let sum: f64 = table.rows.iter().map(|r| r.proportion).sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rounding_to_two_places() {
        let mut subset = repeat(1, tree(Borough::Bronx, Health::Good, None));
        subset.extend(repeat(2, tree(Borough::Bronx, Health::Fair, None)));
        let table = aggregate_condition_proportions(&subset);
        assert_eq!(table.get(Borough::Bronx, Health::Good), 0.33);
        assert_eq!(table.get(Borough::Bronx, Health::Fair), 0.67);
    }

    #[test]
    fn test_rounding_uses_exact_value_and_ties_to_even() {
        // 1/8 = 0.125 exactly: the tie goes to the even digit
        let mut subset = repeat(1, tree(Borough::Bronx, Health::Good, None));
        subset.extend(repeat(7, tree(Borough::Bronx, Health::Fair, None)));
        let table = aggregate_condition_proportions(&subset);
        assert_eq!(table.get(Borough::Bronx, Health::Good), 0.12);

        let mut subset = repeat(5, tree(Borough::Bronx, Health::Good, None));
        subset.extend(repeat(3, tree(Borough::Bronx, Health::Fair, None)));
        let table = aggregate_condition_proportions(&subset);
        assert_eq!(table.get(Borough::Bronx, Health::Good), 0.62);

        // 3/40 is stored just below 0.075
        let mut subset = repeat(3, tree(Borough::Bronx, Health::Poor, None));
        subset.extend(repeat(37, tree(Borough::Bronx, Health::Fair, None)));
        let table = aggregate_condition_proportions(&subset);
        assert_eq!(table.get(Borough::Bronx, Health::Poor), 0.07);
    }

    #[test]
    fn test_missing_health_counts_in_denominator_only() {
        let mut dead = tree(Borough::Queens, Health::Good, None);
        dead.health = None;
        let subset = vec![dead, tree(Borough::Queens, Health::Good, None)];
        let table = aggregate_condition_proportions(&subset);
        assert_eq!(table.get(Borough::Queens, Health::Good), 0.5);
    }

    #[test]
    fn test_heat_scenario() {
        let subset = vec![
            tree(Borough::Bronx, Health::Good, Some(Steward::NoSteward)),
            tree(Borough::Bronx, Health::Good, Some(Steward::NoSteward)),
            tree(Borough::Bronx, Health::Fair, Some(Steward::OneOrTwo)),
            tree(Borough::Bronx, Health::Poor, Some(Steward::FourOrMore)),
        ];
        let table = aggregate_steward_health(&subset);

        assert_eq!(table.total, 4);
        assert_eq!(table.get(Health::Good, Steward::NoSteward), 0.5);
        assert_eq!(table.get(Health::Fair, Steward::OneOrTwo), 0.25);
        assert_eq!(table.get(Health::Poor, Steward::FourOrMore), 0.25);
        assert_eq!(table.values[0], [0.0, 0.0, 0.0, 0.5]);
        let sum: f64 = table.values.iter().flatten().sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_heat_drops_missing_steward_and_species() {
        let mut no_species = tree(Borough::Bronx, Health::Fair, Some(Steward::OneOrTwo));
        no_species.species = None;
        let subset = vec![
            tree(Borough::Bronx, Health::Good, Some(Steward::ThreeOrFour)),
            tree(Borough::Bronx, Health::Good, None),
            no_species,
        ];
        let table = aggregate_steward_health(&subset);
        assert_eq!(table.total, 1);
        assert_eq!(table.get(Health::Good, Steward::ThreeOrFour), 1.0);
    }

    #[test]
    fn test_heat_missing_health_lowers_the_sum() {
        let mut dead = tree(Borough::Bronx, Health::Good, Some(Steward::ThreeOrFour));
        dead.health = None;
        let subset = vec![
            tree(Borough::Bronx, Health::Good, Some(Steward::NoSteward)),
            tree(Borough::Bronx, Health::Fair, Some(Steward::OneOrTwo)),
            dead,
        ];
        let table = aggregate_steward_health(&subset);

        assert_eq!(table.total, 3);
        assert!(table.values.iter().flatten().all(|v| (0.0..=1.0).contains(v)));
        let sum: f64 = table.values.iter().flatten().sum();
        assert_abs_diff_eq!(sum, 2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(
            Health::ALL.iter().map(|h| table.get(*h, Steward::ThreeOrFour)).sum::<f64>(),
            0.0
        );
    }

    #[test]
    fn test_heat_unrounded() {
        let subset = vec![
            tree(Borough::Bronx, Health::Good, Some(Steward::OneOrTwo)),
            tree(Borough::Bronx, Health::Fair, Some(Steward::OneOrTwo)),
            tree(Borough::Bronx, Health::Poor, Some(Steward::OneOrTwo)),
        ];
        let table = aggregate_steward_health(&subset);
        assert_abs_diff_eq!(table.get(Health::Good, Steward::OneOrTwo), 1.0 / 3.0);
    }

    #[test]
    fn test_empty_subset_yields_zero_tables() {
        let none: Vec<TreeRecord> = Vec::new();

        let bars = aggregate_condition_proportions(&none);
        assert!(bars.is_empty());
        assert_eq!(bars.rows.len(), 15);
        assert!(bars.rows.iter().all(|r| r.proportion == 0.0));

        let heat = aggregate_steward_health(&none);
        assert!(heat.is_empty());
        assert_eq!(heat.values, [[0.0; 4]; 3]);
    }

    #[test]
    fn test_aggregators_are_idempotent() {
        let subset = vec![
            tree(Borough::Manhattan, Health::Fair, Some(Steward::NoSteward)),
            tree(Borough::Bronx, Health::Poor, Some(Steward::ThreeOrFour)),
        ];
        assert_eq!(
            aggregate_condition_proportions(&subset),
            aggregate_condition_proportions(&subset)
        );
        assert_eq!(aggregate_steward_health(&subset), aggregate_steward_health(&subset));
    }
}
