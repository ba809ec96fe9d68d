use std::path::{Path, PathBuf};

use walkdir::WalkDir;

// Candidate files of one dataset directory, partitioned by extension.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DatasetFiles {
    pub json: Vec<PathBuf>,
    pub csv: Vec<PathBuf>,
    // found but never read
    pub text: Vec<PathBuf>,
}

impl DatasetFiles {
    pub fn is_empty(&self) -> bool {
        self.json.is_empty() && self.csv.is_empty() && self.text.is_empty()
    }
}

// Recursive file enumeration. Without `sorted` the order is whatever the
// filesystem hands back, which differs between platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discovery {
    pub sorted: bool,
}

impl Discovery {
    pub fn new(sorted: bool) -> Self {
        Self { sorted }
    }

    fn walk(&self, root: &Path) -> WalkDir {
        let walk = WalkDir::new(root).follow_links(false);
        if self.sorted {
            walk.sort_by_file_name()
        } else {
            walk
        }
    }

    // Every regular file under `root`, including symlinks to one.
    // Directory links are not descended into.
    pub fn all_files(&self, root: &Path) -> walkdir::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in self.walk(root) {
            let entry = entry?;
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if is_file {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    pub fn partition(&self, root: &Path) -> walkdir::Result<DatasetFiles> {
        let mut found = DatasetFiles::default();
        for path in self.all_files(root)? {
            // exact match: "PLANTS.JSON" is not picked up
            match path.extension().and_then(|e| e.to_str()) {
                Some("json") => found.json.push(path),
                Some("csv") => found.csv.push(path),
                Some("txt") => found.text.push(path),
                _ => {}
            }
        }
        Ok(found)
    }
}
