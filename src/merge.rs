use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use log::{error, info, warn};
use serde_json::{Map, Value};

use crate::discover::DatasetFiles;

// One plant entry, taken from the source file as-is. Objects are the norm but
// array elements of any shape are kept.
pub type PlantRecord = Value;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("bad CSV in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

// A source file format the merger knows how to flatten.
pub trait RecordFormat {
    fn name(&self) -> &'static str;

    // Files of this format among the discovered ones, in discovery order.
    fn candidates<'a>(&self, files: &'a DatasetFiles) -> &'a [PathBuf];

    // All records of one file, or an error if the file can't be used at all.
    fn read_records(&self, path: &Path) -> Result<Vec<PlantRecord>, ReadError>;
}

pub struct JsonFormat;

impl RecordFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn candidates<'a>(&self, files: &'a DatasetFiles) -> &'a [PathBuf] {
        &files.json
    }

    fn read_records(&self, path: &Path) -> Result<Vec<PlantRecord>, ReadError> {
        let file = File::open(path).map_err(|source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data: Value =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ReadError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(match data {
            Value::Array(items) => items,
            obj @ Value::Object(_) => vec![obj],
            other => {
                // parsed fine, so it still counts as a JSON hit
                warn!(
                    "{}: top-level {} is neither a list nor an object, ignored",
                    path.display(),
                    kind(&other)
                );
                Vec::new()
            }
        })
    }
}

pub struct CsvFormat;

impl RecordFormat for CsvFormat {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn candidates<'a>(&self, files: &'a DatasetFiles) -> &'a [PathBuf] {
        &files.csv
    }

    fn read_records(&self, path: &Path) -> Result<Vec<PlantRecord>, ReadError> {
        let csv_err = |source| ReadError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;
        let headers = rdr.headers().map_err(csv_err)?.clone();

        // all-or-nothing: a bad row drops the whole file
        let mut rows = Vec::new();
        let mut overlong = 0usize;
        for row in rdr.records() {
            let row = row.map_err(csv_err)?;
            if row.len() > headers.len() {
                overlong += 1;
            }
            let mut rec = Map::with_capacity(headers.len());
            for (i, col) in headers.iter().enumerate() {
                let cell = row
                    .get(i)
                    .map_or(Value::Null, |c| Value::String(c.to_owned()));
                rec.insert(col.to_owned(), cell);
            }
            rows.push(Value::Object(rec));
        }
        if overlong > 0 {
            warn!(
                "{}: {overlong} row(s) had more cells than headers, extras dropped",
                path.display()
            );
        }
        Ok(rows)
    }
}

// JSON first, CSV only when JSON gave nothing usable.
pub fn default_formats() -> Vec<Box<dyn RecordFormat>> {
    vec![Box::new(JsonFormat), Box::new(CsvFormat)]
}

// Outcome of one merge run.
#[derive(Debug, Default)]
pub struct MergeReport {
    pub records: Vec<PlantRecord>,
    // format that supplied the records, None when nothing parsed
    pub format: Option<&'static str>,
    pub parsed_files: usize,
    pub skipped: Vec<(PathBuf, String)>,
}

// Walk `formats` in order. The first format with at least one file that
// parses wins, even if that file holds zero records. Unreadable files are
// logged and skipped.
pub fn merge_records(
    formats: &[Box<dyn RecordFormat>],
    files: &DatasetFiles,
    bar: &ProgressBar,
) -> MergeReport {
    let mut report = MergeReport::default();

    for format in formats {
        let candidates = format.candidates(files);
        if candidates.is_empty() {
            continue;
        }
        info!("Reading {} {} file(s)", candidates.len(), format.name());
        bar.set_length(candidates.len() as u64);
        bar.set_position(0);
        bar.set_message(format.name());

        let mut parsed = 0usize;
        for path in candidates {
            match format.read_records(path) {
                Ok(records) => {
                    info!("{}: {} record(s)", path.display(), records.len());
                    report.records.extend(records);
                    parsed += 1;
                }
                Err(e) => {
                    error!("Error reading {}: {e}", path.display());
                    report.skipped.push((path.clone(), e.to_string()));
                }
            }
            bar.inc(1);
        }

        if parsed > 0 {
            report.format = Some(format.name());
            report.parsed_files = parsed;
            break;
        }
        warn!("No {} file could be parsed, trying next format", format.name());
    }

    bar.finish_and_clear();
    report
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
