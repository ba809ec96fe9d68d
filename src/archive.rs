use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use log::debug;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("zip slip: {0}")]
    ZipSlip(String),
    #[error("unsafe zip entry (symlink): {0}")]
    UnsafeEntry(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

// Turn a zip entry name into a safe relative path ("" for the root entry).
fn safe_relpath(name: &str) -> Result<String, ArchiveError> {
    // some tools write backslashes
    let p = name.replace('\\', "/");

    if p.starts_with('/') {
        return Err(ArchiveError::ZipSlip(format!("absolute path in entry {name:?}")));
    }
    if p.split('/').next().is_some_and(|first| first.contains(':')) {
        return Err(ArchiveError::ZipSlip(format!("drive path in entry {name:?}")));
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in p.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(ArchiveError::ZipSlip(format!(
                    "parent traversal in entry {name:?}"
                )))
            }
            _ => parts.push(part),
        }
    }
    Ok(parts.join("/"))
}

// Extract every entry of `reader` under `dest`, returning the number of files written.
// All entry names are validated before anything touches the disk.
pub fn extract_zip<R: Read + Seek>(reader: R, dest: &Path) -> Result<usize, ArchiveError> {
    let mut archive = zip::ZipArchive::new(reader)?;

    let mut entries: Vec<(String, usize)> = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let rel = safe_relpath(entry.name())?;
        if rel.is_empty() {
            continue;
        }
        if let Some(mode) = entry.unix_mode() {
            if mode & 0o170000 == 0o120000 {
                return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
            }
        }
        entries.push((rel, i));
    }

    fs::create_dir_all(dest)?;
    let mut written = 0usize;
    for (rel, idx) in entries {
        let mut entry = archive.by_index(idx)?;
        let out_path: PathBuf = dest.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        debug!("extracted {rel}");
        written += 1;
    }
    Ok(written)
}

pub fn extract_zip_file(zip_path: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    extract_zip(File::open(zip_path)?, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut z = zip::ZipWriter::new(&mut buf);
            let opts = SimpleFileOptions::default();
            for (name, data) in entries {
                z.start_file(*name, opts).unwrap();
                z.write_all(data).unwrap();
            }
            z.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn extracts_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = make_zip(&[
            ("plants.json", b"[]".as_slice()),
            ("data/regions/crete.csv", b"name\nLaurel\n".as_slice()),
        ]);

        let n = extract_zip(Cursor::new(bytes), dir.path()).unwrap();

        assert_eq!(n, 2);
        assert_eq!(fs::read_to_string(dir.path().join("plants.json")).unwrap(), "[]");
        assert!(dir.path().join("data/regions/crete.csv").is_file());
    }

    #[test]
    fn rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = make_zip(&[("ok.txt", b"x".as_slice()), ("../evil.txt", b"x".as_slice())]);

        let err = extract_zip(Cursor::new(bytes), &dir.path().join("out")).unwrap_err();

        assert!(matches!(err, ArchiveError::ZipSlip(_)));
        // validation happens before the first write
        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn relpath_normalisation() {
        assert_eq!(safe_relpath("./a/./b.json").unwrap(), "a/b.json");
        assert_eq!(safe_relpath("a\\b.csv").unwrap(), "a/b.csv");
        assert_eq!(safe_relpath("dir/").unwrap(), "dir");
        assert!(safe_relpath("/etc/passwd").is_err());
        assert!(safe_relpath("C:/x").is_err());
    }
}
