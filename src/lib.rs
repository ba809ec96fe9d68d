// Fetch a plant dataset and flatten its JSON/CSV files into one document.

use std::path::Path;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::info;

pub mod archive;
pub mod discover;
pub mod fetch;
pub mod merge;
pub mod writer;

pub use discover::{DatasetFiles, Discovery};
pub use fetch::{fetch_dataset, DatasetSource, FetchError, FetchOptions};
pub use merge::{default_formats, merge_records, MergeReport, PlantRecord, RecordFormat};
pub use writer::{read_document, write_document, OutputDocument};

// Kaggle dataset the tool was built for
pub const DEFAULT_DATASET: &str = "ammarmoustafa/mediterranean-plants";

// Relative to the working directory; run from the project root
pub const DEFAULT_OUTPUT: &str = "lib/mediterranean_plants_data.json";

// Merge the dataset at `dataset_path` and write the document to `out_file`.
// The returned report has its records moved into the document.
pub fn process_dataset(
    dataset_path: &Path,
    out_file: &Path,
    discovery: Discovery,
    bar: &ProgressBar,
) -> Result<(OutputDocument, MergeReport)> {
    let files = discovery
        .partition(dataset_path)
        .with_context(|| format!("listing {}", dataset_path.display()))?;
    info!(
        "Found {} json, {} csv, {} txt file(s) under {:?}",
        files.json.len(),
        files.csv.len(),
        files.text.len(),
        dataset_path
    );

    let mut report = merge_records(&default_formats(), &files, bar);
    let doc = OutputDocument::new(dataset_path, std::mem::take(&mut report.records));
    write_document(&doc, out_file)?;
    info!("Wrote {} plants → {:?}", doc.total_plants, out_file);

    Ok((doc, report))
}
