use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use hf_hub::api::sync::{ApiBuilder, ApiError};
use hf_hub::{Repo, RepoType};
use log::{info, warn};
use serde::Deserialize;

use crate::archive::{extract_zip_file, ArchiveError};

const KAGGLE_API: &str = "https://www.kaggle.com/api/v1";

// Marks a cache entry whose extraction ran to the end.
const COMPLETE_MARKER: &str = ".complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DatasetSource {
    // Kaggle dataset "<owner>/<slug>"
    #[default]
    Kaggle,
    // Hugging Face Hub dataset repo
    HuggingFace,
    // Directory already on disk
    Local,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid dataset id {0:?}")]
    BadIdentifier(String),
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("no cache directory available, pass --cache-dir")]
    NoCacheDir,
    #[error("GET {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("bad Kaggle credentials file {path}: {source}")]
    Credentials {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Hub(#[from] ApiError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub cache_dir: Option<PathBuf>,
    pub force_download: bool,
    pub kaggle_username: Option<String>,
    pub kaggle_key: Option<String>,
    pub hf_token: Option<String>,
}

impl FetchOptions {
    fn cache_root(&self) -> Result<PathBuf, FetchError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::cache_dir()
                .map(|d| d.join("kagglehub"))
                .ok_or(FetchError::NoCacheDir),
        }
    }

    // Explicit username/key win, then kaggle.json.
    fn kaggle_credentials(&self) -> Result<Option<KaggleCredentials>, FetchError> {
        if let (Some(username), Some(key)) = (&self.kaggle_username, &self.kaggle_key) {
            return Ok(Some(KaggleCredentials {
                username: username.clone(),
                key: key.clone(),
            }));
        }
        let config_dir = std::env::var_os("KAGGLE_CONFIG_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".kaggle")));
        match config_dir {
            Some(dir) => read_kaggle_json(&dir.join("kaggle.json")),
            None => Ok(None),
        }
    }
}

// None when the file does not exist.
pub fn read_kaggle_json(path: &Path) -> Result<Option<KaggleCredentials>, FetchError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| FetchError::Credentials {
            path: path.to_path_buf(),
            source,
        })
}

pub fn parse_kaggle_id(id: &str) -> Result<(&str, &str), FetchError> {
    match id.split_once('/') {
        Some((owner, slug)) if !owner.is_empty() && !slug.is_empty() && !slug.contains('/') => {
            Ok((owner, slug))
        }
        _ => Err(FetchError::BadIdentifier(id.to_string())),
    }
}

// Resolve `id` to a local directory holding every file of the dataset.
pub fn fetch_dataset(
    source: DatasetSource,
    id: &str,
    opts: &FetchOptions,
) -> Result<PathBuf, FetchError> {
    match source {
        DatasetSource::Kaggle => fetch_kaggle(id, opts),
        DatasetSource::HuggingFace => fetch_hf(id, opts),
        DatasetSource::Local => {
            let dir = PathBuf::from(id);
            if dir.is_dir() {
                Ok(dir)
            } else {
                Err(FetchError::NotADirectory(dir))
            }
        }
    }
}

fn kaggle_cache_entry(root: &Path, owner: &str, slug: &str) -> PathBuf {
    root.join("datasets").join(owner).join(slug)
}

fn fetch_kaggle(id: &str, opts: &FetchOptions) -> Result<PathBuf, FetchError> {
    let (owner, slug) = parse_kaggle_id(id)?;
    let entry = kaggle_cache_entry(&opts.cache_root()?, owner, slug);
    let files = entry.join("files");
    let marker = entry.join(COMPLETE_MARKER);

    if marker.is_file() && !opts.force_download {
        info!("Using cached dataset at {:?}", files);
        return Ok(files);
    }

    // stale or partial extraction
    if files.exists() {
        fs::remove_dir_all(&files)?;
    }
    if marker.exists() {
        fs::remove_file(&marker)?;
    }
    fs::create_dir_all(&entry)?;

    let url = format!("{KAGGLE_API}/datasets/download/{owner}/{slug}");
    info!("Downloading {url}");

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let mut req = client.get(&url);
    match opts.kaggle_credentials()? {
        Some(creds) => req = req.basic_auth(creds.username, Some(creds.key)),
        None => warn!("No Kaggle credentials found, trying anonymous download"),
    }
    let mut resp = req.send()?;
    if !resp.status().is_success() {
        return Err(FetchError::Status {
            url,
            status: resp.status(),
        });
    }

    let archive = entry.join("archive.zip");
    {
        let mut out = BufWriter::new(File::create(&archive)?);
        let bytes = resp.copy_to(&mut out)?;
        out.flush()?;
        info!("Downloaded {bytes} bytes → {:?}", archive);
    }

    let n = extract_zip_file(&archive, &files)?;
    fs::remove_file(&archive)?;
    File::create(&marker)?;
    info!("Extracted {n} file(s) → {:?}", files);

    Ok(files)
}

// Hub repo ids become cache paths, so every segment must be a plain name.
pub fn check_hub_path(id: &str) -> Result<&str, FetchError> {
    let bad = id.is_empty()
        || id.contains('\\')
        || id.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        Err(FetchError::BadIdentifier(id.to_string()))
    } else {
        Ok(id)
    }
}

// Place a cached file at `local` as a regular file. hf-hub hands back a
// snapshot symlink pointing at a relative blob path, so resolve it first.
fn link_cached(cached: &Path, local: &Path) -> Result<(), FetchError> {
    let blob = fs::canonicalize(cached)?;
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)?;
    }
    // symlink_metadata also sees a dangling link left by an older run
    if fs::symlink_metadata(local).is_ok() {
        fs::remove_file(local)?;
    }
    if fs::hard_link(&blob, local).is_err() {
        fs::copy(&blob, local)?;
    }
    Ok(())
}

// Pull every file of a Hub dataset repo, then link it into the cache tree.
fn fetch_hf(id: &str, opts: &FetchOptions) -> Result<PathBuf, FetchError> {
    let id = check_hub_path(id)?;
    let dst = opts.cache_root()?.join("hf").join(id);
    fs::create_dir_all(&dst)?;

    let api = ApiBuilder::new().with_token(opts.hf_token.clone()).build()?;
    let handle = api.repo(Repo::new(id.to_string(), RepoType::Dataset));

    info!("Pulling {id} → {:?}", dst);
    for sib in handle.info()?.siblings {
        let remote = sib.rfilename;
        let local = dst.join(check_hub_path(&remote)?);
        if local.is_file() && !opts.force_download {
            continue;
        }

        // hf-hub keeps its own cache; re-used when present
        let cached = handle.get(&remote)?;
        link_cached(&cached, &local)?;
    }
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kaggle_ids() {
        assert_eq!(
            parse_kaggle_id("ammarmoustafa/mediterranean-plants").unwrap(),
            ("ammarmoustafa", "mediterranean-plants")
        );
        for bad in ["", "plants", "/plants", "owner/", "a/b/c"] {
            assert!(matches!(parse_kaggle_id(bad), Err(FetchError::BadIdentifier(_))), "{bad}");
        }
    }

    #[test]
    fn local_source_needs_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let opts = FetchOptions::default();
        let id = dir.path().to_str().unwrap();

        assert_eq!(fetch_dataset(DatasetSource::Local, id, &opts).unwrap(), dir.path());

        let missing = dir.path().join("missing");
        let err = fetch_dataset(DatasetSource::Local, missing.to_str().unwrap(), &opts).unwrap_err();
        assert!(matches!(err, FetchError::NotADirectory(_)));
    }

    #[test]
    fn completed_kaggle_cache_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let entry = kaggle_cache_entry(dir.path(), "owner", "plants");
        fs::create_dir_all(entry.join("files")).unwrap();
        fs::write(entry.join("files/plants.json"), "[]").unwrap();
        File::create(entry.join(COMPLETE_MARKER)).unwrap();

        let opts = FetchOptions {
            cache_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let path = fetch_dataset(DatasetSource::Kaggle, "owner/plants", &opts).unwrap();

        assert_eq!(path, entry.join("files"));
    }

    #[test]
    fn bad_kaggle_id_fails_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let opts = FetchOptions {
            cache_dir: Some(dir.path().join("cache")),
            ..Default::default()
        };
        assert!(fetch_dataset(DatasetSource::Kaggle, "no-slash", &opts).is_err());
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn kaggle_json_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kaggle.json");

        assert_eq!(read_kaggle_json(&path).unwrap(), None);

        fs::write(&path, r#"{"username":"olive","key":"abc123"}"#).unwrap();
        assert_eq!(
            read_kaggle_json(&path).unwrap(),
            Some(KaggleCredentials {
                username: "olive".into(),
                key: "abc123".into()
            })
        );

        fs::write(&path, "{").unwrap();
        assert!(matches!(read_kaggle_json(&path), Err(FetchError::Credentials { .. })));
    }

    #[test]
    fn explicit_credentials_win() {
        let opts = FetchOptions {
            kaggle_username: Some("u".into()),
            kaggle_key: Some("k".into()),
            ..Default::default()
        };
        assert_eq!(
            opts.kaggle_credentials().unwrap(),
            Some(KaggleCredentials {
                username: "u".into(),
                key: "k".into()
            })
        );
    }

    #[test]
    fn hub_ids_stay_inside_the_cache() {
        assert_eq!(check_hub_path("org/plants").unwrap(), "org/plants");
        assert_eq!(check_hub_path("data/train/plants.json").unwrap(), "data/train/plants.json");
        for bad in ["", "/etc", "org/../../x", "./plants", "org//x", "org/", "a\\b"] {
            assert!(matches!(check_hub_path(bad), Err(FetchError::BadIdentifier(_))), "{bad}");
        }
    }

    #[test]
    fn bad_hub_id_fails_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let opts = FetchOptions {
            cache_dir: Some(dir.path().join("cache")),
            ..Default::default()
        };
        let err = fetch_dataset(DatasetSource::HuggingFace, "../outside", &opts).unwrap_err();
        assert!(matches!(err, FetchError::BadIdentifier(_)));
        assert!(!dir.path().join("cache").exists());
    }

    #[cfg(unix)]
    #[test]
    fn hub_snapshot_symlink_becomes_a_regular_file() {
        let hub = tempfile::tempdir().unwrap();
        fs::create_dir_all(hub.path().join("blobs")).unwrap();
        fs::create_dir_all(hub.path().join("snapshots/main")).unwrap();
        fs::write(hub.path().join("blobs/abc"), r#"[{"name":"Fig"}]"#).unwrap();
        let pointer = hub.path().join("snapshots/main/plants.json");
        std::os::unix::fs::symlink("../../blobs/abc", &pointer).unwrap();

        let out = tempfile::tempdir().unwrap();
        let local = out.path().join("hf/org/plants/plants.json");
        link_cached(&pointer, &local).unwrap();

        assert!(local.is_file());
        assert!(!fs::symlink_metadata(&local).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&local).unwrap(), r#"[{"name":"Fig"}]"#);

        // a second pass replaces the existing file in place
        link_cached(&pointer, &local).unwrap();
        assert_eq!(fs::read_to_string(&local).unwrap(), r#"[{"name":"Fig"}]"#);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_link_from_older_run_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("blob.json");
        fs::write(&blob, "[]").unwrap();
        let local = dir.path().join("out/plants.json");
        fs::create_dir_all(dir.path().join("out")).unwrap();
        std::os::unix::fs::symlink("../../blobs/gone", &local).unwrap();

        link_cached(&blob, &local).unwrap();

        assert_eq!(fs::read_to_string(&local).unwrap(), "[]");
    }
}
