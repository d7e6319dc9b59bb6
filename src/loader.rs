//! Reads the game catalog and per-game price history CSV files.
//!
//! Malformed rows are skipped and counted in [`LoadReport`]; only failures to
//! read the catalog itself abort a load.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::StringRecord;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::DataFormatError;
use crate::models::{GameCatalogEntry, PriceObservation};

/// Date format of the price history files
const PRICE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date format of the catalog release dates (e.g. 21-Dec-17)
const RELEASE_DATE_FORMAT: &str = "%d-%b-%y";

/// How many row errors to keep verbatim in a report
const MAX_REPORTED_ERRORS: usize = 20;

const PROGRESS_INTERVAL: usize = 500;

/// How raw file bytes are turned into text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Reject files that are not valid UTF-8
    Utf8,
    /// Try UTF-8, fall back to Latin-1 (every byte is a valid code point)
    #[default]
    Utf8WithLatin1Fallback,
}

impl DecodeStrategy {
    pub fn decode(&self, bytes: Vec<u8>, path: &Path) -> Result<String> {
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(err) => match self {
                DecodeStrategy::Utf8 => {
                    Err(anyhow!("{} is not valid UTF-8: {}", path.display(), err))
                }
                DecodeStrategy::Utf8WithLatin1Fallback => {
                    debug!("{} is not UTF-8, decoding as Latin-1", path.display());
                    Ok(err.into_bytes().into_iter().map(char::from).collect())
                }
            },
        }
    }
}

/// Counts collected while loading
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub games_loaded: usize,
    /// Catalog rows without an appid or type
    pub games_incomplete: usize,
    /// Catalog rows that could not be parsed
    pub games_invalid: usize,
    pub files_read: usize,
    /// Unreadable files or files not named `<appid>.csv`
    pub files_skipped: usize,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
    /// First few row errors, for diagnostics
    pub errors: Vec<DataFormatError>,
}

impl LoadReport {
    /// Skip a malformed price row
    fn record_error(&mut self, error: DataFormatError) {
        self.rows_skipped += 1;
        self.keep_error(error);
    }

    /// Skip a malformed catalog row
    fn record_game_error(&mut self, error: DataFormatError) {
        self.games_invalid += 1;
        self.keep_error(error);
    }

    fn keep_error(&mut self, error: DataFormatError) {
        debug!("Skipping row: {}", error);
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(error);
        }
    }
}

/// Everything read from the raw sources
#[derive(Debug, Clone, Default)]
pub struct RawData {
    pub catalog: Vec<GameCatalogEntry>,
    pub observations: Vec<PriceObservation>,
    pub report: LoadReport,
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(default)]
    appid: Option<String>,
    #[serde(default, rename = "type")]
    game_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    releasedate: Option<String>,
    #[serde(default)]
    freetoplay: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(default)]
    date: Option<String>,
    #[serde(default, alias = "final_price")]
    finalprice: Option<String>,
    #[serde(default, alias = "discount_percent")]
    discount: Option<String>,
}

/// CSV loader for the catalog and price history sources
#[derive(Debug, Clone, Default)]
pub struct Loader {
    decode: DecodeStrategy,
}

impl Loader {
    pub fn new(decode: DecodeStrategy) -> Self {
        Self { decode }
    }

    /// Load the catalog and every price file in `price_dir`
    pub fn load(&self, catalog_path: &Path, price_dir: &Path) -> Result<RawData> {
        let mut report = LoadReport::default();
        let catalog = self.load_catalog(catalog_path, &mut report)?;
        let observations = self.load_price_dir(price_dir, &mut report)?;

        info!(
            "Loaded {} games ({} incomplete, {} invalid) and {} price rows from {} files ({} rows skipped, {} files skipped)",
            report.games_loaded,
            report.games_incomplete,
            report.games_invalid,
            report.rows_loaded,
            report.files_read,
            report.rows_skipped,
            report.files_skipped,
        );

        Ok(RawData {
            catalog,
            observations,
            report,
        })
    }

    /// Load the game catalog (appid, type, name, releasedate, freetoplay)
    pub fn load_catalog(
        &self,
        path: &Path,
        report: &mut LoadReport,
    ) -> Result<Vec<GameCatalogEntry>> {
        let mut reader = self.open_csv(path)?;
        let headers = reader.headers()?.clone();
        let mut games = Vec::new();

        for record in reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    report.record_game_error(csv_error(path, &e));
                    continue;
                }
            };
            let line = record_line(&record);

            let row: CatalogRow = match record.deserialize(Some(&headers)) {
                Ok(r) => r,
                Err(e) => {
                    report.record_game_error(DataFormatError::new(path, line, e.to_string()));
                    continue;
                }
            };

            let appid = non_empty(&row.appid);
            let game_type = non_empty(&row.game_type);
            let (Some(appid), Some(game_type)) = (appid, game_type) else {
                report.games_incomplete += 1;
                continue;
            };

            let appid: u32 = match appid.parse() {
                Ok(id) => id,
                Err(_) => {
                    report.record_game_error(DataFormatError::new(
                        path,
                        line,
                        format!("invalid appid '{}'", appid),
                    ));
                    continue;
                }
            };

            let release_date = non_empty(&row.releasedate)
                .and_then(|s| NaiveDate::parse_from_str(s, RELEASE_DATE_FORMAT).ok());

            games.push(GameCatalogEntry {
                appid,
                name: non_empty(&row.name).unwrap_or_default().to_string(),
                is_free_to_play: parse_flag(non_empty(&row.freetoplay)),
                game_type: Some(game_type.to_string()),
                release_date,
            });
        }

        report.games_loaded += games.len();
        Ok(games)
    }

    /// Load every `<appid>.csv` file in a directory, in file name order
    pub fn load_price_dir(
        &self,
        dir: &Path,
        report: &mut LoadReport,
    ) -> Result<Vec<PriceObservation>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read price history directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
            .collect();
        paths.sort();

        info!("Found {} price history files", paths.len());

        let mut observations = Vec::new();
        for path in &paths {
            let Some(appid) = appid_from_path(path) else {
                warn!("Invalid price history file name: {}", path.display());
                report.files_skipped += 1;
                continue;
            };

            match self.load_price_file(path, appid, report) {
                Ok(rows) => {
                    observations.extend(rows);
                    report.files_read += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {:#}", path.display(), e);
                    report.files_skipped += 1;
                }
            }

            if report.files_read > 0 && report.files_read % PROGRESS_INTERVAL == 0 {
                info!(
                    "Progress: {}/{} files ({} rows)",
                    report.files_read,
                    paths.len(),
                    observations.len()
                );
            }
        }

        Ok(observations)
    }

    /// Load one game's price history (Date, Finalprice, Discount)
    pub fn load_price_file(
        &self,
        path: &Path,
        appid: u32,
        report: &mut LoadReport,
    ) -> Result<Vec<PriceObservation>> {
        let mut reader = self.open_csv(path)?;
        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();

        for record in reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    report.record_error(csv_error(path, &e));
                    continue;
                }
            };
            let line = record_line(&record);

            let parsed = record
                .deserialize::<PriceRow>(Some(&headers))
                .map_err(|e| e.to_string())
                .and_then(|row| parse_price_row(&row, appid));

            match parsed {
                Ok(observation) => rows.push(observation),
                Err(reason) => report.record_error(DataFormatError::new(path, line, reason)),
            }
        }

        report.rows_loaded += rows.len();
        Ok(rows)
    }

    /// Open a CSV with trimmed cells and lowercase headers
    fn open_csv(&self, path: &Path) -> Result<csv::Reader<std::io::Cursor<Vec<u8>>>> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let text = self.decode.decode(bytes, path)?;

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(std::io::Cursor::new(text.into_bytes()));

        let lowered: StringRecord = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_lowercase())
            .collect();
        reader.set_headers(lowered);

        Ok(reader)
    }
}

fn parse_price_row(row: &PriceRow, appid: u32) -> std::result::Result<PriceObservation, String> {
    let date = non_empty(&row.date).ok_or("missing date")?;
    let date = NaiveDate::parse_from_str(date, PRICE_DATE_FORMAT)
        .map_err(|e| format!("invalid date '{}': {}", date, e))?;

    let price = non_empty(&row.finalprice).ok_or("missing final price")?;
    let final_price: f64 = price
        .parse()
        .map_err(|_| format!("invalid final price '{}'", price))?;
    if !final_price.is_finite() || final_price < 0.0 {
        return Err(format!("final price out of range: {}", final_price));
    }

    let discount = non_empty(&row.discount).ok_or("missing discount")?;
    let discount_percent = parse_discount(discount)?;

    Ok(PriceObservation::new(appid, date, final_price, discount_percent))
}

/// Integer percent in 0..=100; "35.0" is accepted, "35.5" is not
fn parse_discount(value: &str) -> std::result::Result<u8, String> {
    let pct: f64 = value
        .parse()
        .map_err(|_| format!("invalid discount '{}'", value))?;
    if pct.fract() != 0.0 || !(0.0..=100.0).contains(&pct) {
        return Err(format!("discount out of range: {}", value));
    }
    Ok(pct as u8)
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(value, Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn appid_from_path(path: &Path) -> Option<u32> {
    path.file_stem()?.to_str()?.parse().ok()
}

fn record_line(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn csv_error(path: &Path, err: &csv::Error) -> DataFormatError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    DataFormatError::new(path, line, err.to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "applicationInformation.csv",
            b"appid,type,name,releasedate,freetoplay\n\
              10,game,Counter-Strike,1-Nov-00,0\n\
              570,game,Dota 2,9-Jul-13,1\n\
              ,game,No Id,,0\n\
              20,,No Type,,0\n\
              abc,game,Bad Id,,0\n",
        );

        let mut report = LoadReport::default();
        let games = Loader::default().load_catalog(&path, &mut report).unwrap();

        assert_eq!(games.len(), 2);
        assert_eq!(games[0].appid, 10);
        assert_eq!(games[0].name, "Counter-Strike");
        assert!(!games[0].is_free_to_play);
        assert_eq!(games[0].release_date, NaiveDate::from_ymd_opt(2000, 11, 1));
        assert!(games[1].is_free_to_play);
        assert_eq!(games[1].game_type.as_deref(), Some("game"));
        assert_eq!(report.games_incomplete, 2);
        assert_eq!(report.games_invalid, 1);
        assert_eq!(report.rows_skipped, 0);
        assert_eq!(report.errors[0].line, 6);
    }

    #[test]
    fn test_latin1_fallback() {
        let dir = tempfile::tempdir().unwrap();
        // "Pokémon" with é as the single Latin-1 byte 0xE9
        let path = write(
            dir.path(),
            "catalog.csv",
            b"appid,type,name,releasedate,freetoplay\n99,game,Pok\xe9mon,,0\n",
        );

        let mut report = LoadReport::default();
        let games = Loader::default().load_catalog(&path, &mut report).unwrap();
        assert_eq!(games[0].name, "Pokémon");

        let strict = Loader::new(DecodeStrategy::Utf8);
        assert!(strict.load_catalog(&path, &mut report).is_err());
    }

    #[test]
    fn test_price_rows_skip_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "10.csv",
            b"Date,Initialprice,Finalprice,Discount\n\
              2019-04-07,9.99,9.99,0\n\
              2019-04-08,9.99,4.99,50.0\n\
              2019-13-01,9.99,9.99,0\n\
              2019-04-10,9.99,,0\n\
              2019-04-11,9.99,-1,0\n\
              2019-04-12,9.99,9.99,120\n\
              2019-04-13,9.99,9.99,12.5\n",
        );

        let mut report = LoadReport::default();
        let rows = Loader::default()
            .load_price_file(&path, 10, &mut report)
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].discount_percent, 50);
        assert_eq!(rows[1].final_price, 4.99);
        assert_eq!(report.rows_loaded, 2);
        assert_eq!(report.rows_skipped, 5);
        assert_eq!(report.errors[0].line, 4);
    }

    #[test]
    fn test_price_headers_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "7.csv",
            b"date,final_price,discount_percent\n2020-01-01,5.0,10\n",
        );

        let mut report = LoadReport::default();
        let rows = Loader::default()
            .load_price_file(&path, 7, &mut report)
            .unwrap();
        assert_eq!(rows, vec![PriceObservation::new(
            7,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            5.0,
            10
        )]);
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = write(
            dir.path(),
            "catalog.csv",
            b"appid,type,name,releasedate,freetoplay\n10,game,A,,0\n20,game,B,,0\nx,game,C,,0\n",
        );
        let prices = dir.path().join("PriceHistory");
        fs::create_dir(&prices).unwrap();
        write(&prices, "20.csv", b"Date,Finalprice,Discount\n2020-01-01,1.0,0\n");
        write(&prices, "10.csv", b"Date,Finalprice,Discount\n2020-01-01,2.0,0\nbad,2.0,0\n");
        write(&prices, "notes.csv", b"Date,Finalprice,Discount\n");
        write(&prices, "readme.txt", b"ignored");

        let data = Loader::default().load(&catalog, &prices).unwrap();

        assert_eq!(data.catalog.len(), 2);
        assert_eq!(data.observations.len(), 2);
        assert_eq!(data.observations[0].appid, 10);
        assert_eq!(data.observations[1].appid, 20);
        assert_eq!(data.report.files_read, 2);
        assert_eq!(data.report.files_skipped, 1);
        // Catalog and price failures are counted apart
        assert_eq!(data.report.games_invalid, 1);
        assert_eq!(data.report.rows_skipped, 1);
    }
}
