//! Assembles the labeled training table from raw observations.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::features::CalendarFeatures;
use crate::labeling::{label_series, LabelPolicy};
use crate::models::{DatasetSummary, GameCatalogEntry, LabeledRow, PriceObservation};

/// Build the labeled dataset with the default labeling policy
pub fn build_labeled_dataset(
    catalog: &[GameCatalogEntry],
    observations: &[PriceObservation],
) -> (Vec<LabeledRow>, DatasetSummary) {
    build_labeled_dataset_with(catalog, observations, &LabelPolicy::default())
}

/// Build the labeled dataset.
///
/// Rows come out ordered by appid, then date. Right-censored anchors are
/// dropped and counted, as are repeated (appid, date) observations (the
/// first one wins).
pub fn build_labeled_dataset_with(
    catalog: &[GameCatalogEntry],
    observations: &[PriceObservation],
    policy: &LabelPolicy,
) -> (Vec<LabeledRow>, DatasetSummary) {
    let names: HashMap<u32, &str> = catalog
        .iter()
        .map(|game| (game.appid, game.name.as_str()))
        .collect();

    let mut by_game: BTreeMap<u32, Vec<PriceObservation>> = BTreeMap::new();
    for observation in observations {
        by_game
            .entry(observation.appid)
            .or_default()
            .push(observation.clone());
    }

    let mut summary = DatasetSummary {
        rows_in: observations.len(),
        games: by_game.len(),
        ..Default::default()
    };
    let mut rows = Vec::new();

    for (appid, mut series) in by_game {
        // Stable sort keeps input order among equal dates, so dedup keeps the first
        series.sort_by_key(|o| o.date);
        let before = series.len();
        series.dedup_by_key(|o| o.date);
        summary.duplicates_dropped += before - series.len();

        let name = names.get(&appid).copied();

        for (observation, label) in series.iter().zip(label_series(&series, policy)) {
            let Ok(will_have_discount) = label else {
                summary.discarded_insufficient_history += 1;
                continue;
            };

            if name.is_none() {
                summary.rows_without_catalog += 1;
            }
            if will_have_discount {
                summary.positives += 1;
            } else {
                summary.negatives += 1;
            }

            rows.push(LabeledRow {
                observation: observation.clone(),
                name: name.unwrap_or_default().to_string(),
                will_have_discount,
                calendar: CalendarFeatures::from_date(observation.date),
            });
        }
    }

    summary.final_rows = rows.len();

    info!(
        "Dataset assembled: {} rows in, {} games, {} duplicates, {} discarded (insufficient history), {} final rows",
        summary.rows_in,
        summary.games,
        summary.duplicates_dropped,
        summary.discarded_insufficient_history,
        summary.final_rows,
    );
    info!(
        "Class balance: {} positive / {} negative ({:.1}% positive), {} rows without catalog entry",
        summary.positives,
        summary.negatives,
        summary.positive_rate() * 100.0,
        summary.rows_without_catalog,
    );

    (rows, summary)
}

/// Column names of the persisted dataset, in order
pub const DATASET_COLUMNS: [&str; 12] = [
    "date",
    "appid",
    "name",
    "final_price",
    "discount_percent",
    "will_have_discount",
    "month",
    "day_of_week",
    "is_weekend",
    "is_summer_sale",
    "is_winter_sale",
    "quarter",
];

/// Persisted column layout, field order matches [`DATASET_COLUMNS`]
#[derive(Serialize)]
struct DatasetRecord<'a> {
    date: String,
    appid: u32,
    name: &'a str,
    final_price: f64,
    discount_percent: u8,
    will_have_discount: u8,
    month: u32,
    day_of_week: u32,
    is_weekend: u8,
    is_summer_sale: u8,
    is_winter_sale: u8,
    quarter: u32,
}

impl<'a> From<&'a LabeledRow> for DatasetRecord<'a> {
    fn from(row: &'a LabeledRow) -> Self {
        DatasetRecord {
            date: row.observation.date.format("%Y-%m-%d").to_string(),
            appid: row.observation.appid,
            name: &row.name,
            final_price: row.observation.final_price,
            discount_percent: row.observation.discount_percent,
            will_have_discount: u8::from(row.will_have_discount),
            month: row.calendar.month,
            day_of_week: row.calendar.day_of_week,
            is_weekend: u8::from(row.calendar.is_weekend),
            is_summer_sale: u8::from(row.calendar.is_summer_sale),
            is_winter_sale: u8::from(row.calendar.is_winter_sale),
            quarter: row.calendar.quarter,
        }
    }
}

/// Write rows as CSV with a header line, even when there are no rows
pub fn write_dataset<W: Write>(writer: W, rows: &[LabeledRow]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer
        .write_record(DATASET_COLUMNS)
        .context("Failed to write dataset header")?;
    for row in rows {
        csv_writer
            .serialize(DatasetRecord::from(row))
            .context("Failed to write dataset row")?;
    }
    csv_writer.flush().context("Failed to flush dataset")?;
    Ok(())
}

/// Write rows to a CSV file, creating parent directories as needed
pub fn write_dataset_file(path: &Path, rows: &[LabeledRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_dataset(std::io::BufWriter::new(file), rows)?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, 1).unwrap() + Duration::days(offset)
    }

    fn obs(appid: u32, offset: i64, discount: u8) -> PriceObservation {
        PriceObservation::new(appid, day(offset), 29.99, discount)
    }

    /// 40 consecutive days of one game, discounts on days 15 (25%) and 38 (20%)
    fn forty_day_fixture() -> Vec<PriceObservation> {
        (0..40)
            .map(|d| match d {
                15 => obs(440, d, 25),
                38 => obs(440, d, 20),
                _ => obs(440, d, 0),
            })
            .collect()
    }

    #[test]
    fn test_forty_day_fixture() {
        let catalog = vec![GameCatalogEntry::new(440, "Team Fortress 2", false)];
        let (rows, summary) = build_labeled_dataset(&catalog, &forty_day_fixture());

        // Days 0..=9 have a full 30-day window, the rest are right-censored
        assert_eq!(rows.len(), 10);
        assert_eq!(summary.rows_in, 40);
        assert_eq!(summary.discarded_insufficient_history, 30);
        assert_eq!(summary.final_rows, 10);

        // Day 15 is inside every window; day 38 (20%) never qualifies
        let labels: Vec<bool> = rows.iter().map(|r| r.will_have_discount).collect();
        assert_eq!(labels, vec![true; 10]);
        assert_eq!(summary.positives, 10);
        assert_eq!(summary.negatives, 0);
        assert!(rows.iter().all(|r| r.name == "Team Fortress 2"));
        assert_eq!(rows[0].observation.date, day(0));
        assert_eq!(rows[9].observation.date, day(9));
    }

    #[test]
    fn test_label_sequence_with_late_discount() {
        // 45 days, single 30% discount on day 35
        let series: Vec<PriceObservation> = (0..45)
            .map(|d| obs(7, d, if d == 35 { 30 } else { 0 }))
            .collect();
        let (rows, summary) = build_labeled_dataset(&[], &series);

        // Anchors 0..=14 are labeled; day 35 is in the window of anchors 5..=14
        let labels: Vec<bool> = rows.iter().map(|r| r.will_have_discount).collect();
        let mut expected = vec![false; 5];
        expected.extend(vec![true; 10]);
        assert_eq!(labels, expected);
        assert_eq!(summary.rows_without_catalog, 15);
        assert!(rows.iter().all(|r| r.name.is_empty()));
        assert!((summary.positive_rate() - 10.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_groups_sorts_and_dedups() {
        let mut observations = Vec::new();
        // Game 2 first and shuffled, with a duplicate date
        for d in (0..31).rev() {
            observations.push(obs(2, d, 0));
        }
        observations.push(obs(2, 10, 90));
        for d in 0..31 {
            observations.push(obs(1, d, 0));
        }

        let catalog = vec![
            GameCatalogEntry::new(1, "One", false),
            GameCatalogEntry::new(2, "Two", false),
        ];
        let (rows, summary) = build_labeled_dataset(&catalog, &observations);

        assert_eq!(summary.games, 2);
        assert_eq!(summary.duplicates_dropped, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].observation.appid, 1);
        assert_eq!(rows[1].observation.appid, 2);
        // The duplicate 90% row came second and was dropped
        assert!(!rows[1].will_have_discount);
    }

    #[test]
    fn test_games_do_not_leak_into_each_other() {
        let mut observations: Vec<PriceObservation> = (0..31).map(|d| obs(1, d, 0)).collect();
        observations.extend((0..31).map(|d| obs(2, d, 80)));

        let (rows, _) = build_labeled_dataset(&[], &observations);
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].will_have_discount);
        assert!(rows[1].will_have_discount);
    }

    #[test]
    fn test_write_dataset_columns() {
        let catalog = vec![GameCatalogEntry::new(440, "Team Fortress 2", false)];
        let (rows, _) = build_labeled_dataset(&catalog, &forty_day_fixture());

        let mut out = Vec::new();
        write_dataset(&mut out, &rows[..1]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next(),
            Some("date,appid,name,final_price,discount_percent,will_have_discount,month,day_of_week,is_weekend,is_summer_sale,is_winter_sale,quarter")
        );
        // 2023-05-01 was a Monday
        assert_eq!(
            lines.next(),
            Some("2023-05-01,440,Team Fortress 2,29.99,0,1,5,0,0,0,0,2")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_write_empty_dataset_has_header() {
        let mut out = Vec::new();
        write_dataset(&mut out, &[]).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, format!("{}\n", DATASET_COLUMNS.join(",")));
        assert!(text.starts_with("date,appid,name,"));
    }

    #[test]
    fn test_write_dataset_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("dataset.csv");
        let (rows, _) = build_labeled_dataset(&[], &forty_day_fixture());

        write_dataset_file(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 11);
    }
}
