use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::merge::PlantRecord;

// The single file handed to the app. Field order is the on-disk key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub dataset_path: String,
    pub plants: Vec<PlantRecord>,
    pub total_plants: usize,
}

impl OutputDocument {
    pub fn new(dataset_path: &Path, plants: Vec<PlantRecord>) -> Self {
        Self {
            dataset_path: dataset_path.display().to_string(),
            total_plants: plants.len(),
            plants,
        }
    }
}

// Pretty-print (2-space indent, non-ASCII kept as-is) over whatever is at `path`.
pub fn write_document(doc: &OutputDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, doc)
        .with_context(|| format!("writing {}", path.display()))?;
    out.flush()
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn read_document(path: &Path) -> Result<OutputDocument> {
    let file = File::open(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}
