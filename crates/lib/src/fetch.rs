//! GitHub release retrieval with tag-based cache reuse.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("invalid release metadata: {0}")]
  Json(#[from] serde_json::Error),

  #[error("release {owner}/{repo} has no resolvable tag")]
  NoTag { owner: String, repo: String },

  #[error("archive error: {0}")]
  Archive(String),
}

/// A GitHub release to fetch. Without a tag the latest release is used.
#[derive(Debug, Clone)]
pub struct ReleaseSpec {
  pub owner: String,
  pub repo: String,
  pub tag: Option<String>,
}

impl ReleaseSpec {
  /// Parse an `owner/repo` slug.
  pub fn parse(slug: &str, tag: Option<String>) -> Option<Self> {
    let (owner, repo) = slug.split_once('/')?;
    if owner.is_empty() || repo.is_empty() {
      return None;
    }
    Some(Self {
      owner: owner.to_string(),
      repo: repo.to_string(),
      tag,
    })
  }

  fn key(&self) -> String {
    format!("{}/{}", self.owner, self.repo)
  }
}

/// Last extracted tag per repository, persisted under the cache root.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TagCache(HashMap<String, String>);

/// Download and extract a release into `cache_root`, reusing the cached
/// extraction when the recorded tag still matches. Returns the extraction
/// directory.
pub fn fetch_release(spec: &ReleaseSpec, cache_root: &Path) -> FetchResult<PathBuf> {
  fs::create_dir_all(cache_root)?;

  let tag = match &spec.tag {
    Some(tag) => tag.clone(),
    None => latest_tag(spec)?,
  };

  let dest = cache_root.join(release_dir_name(spec, &tag));
  let cache_path = cache_root.join("release-tags.json");
  let mut cache = load_tag_cache(&cache_path);

  if dest.is_dir() && cache.0.get(&spec.key()) == Some(&tag) {
    debug!(release = %spec.key(), %tag, "release already cached");
    return Ok(dest);
  }

  let url = format!(
    "https://api.github.com/repos/{}/{}/zipball/{}",
    spec.owner, spec.repo, tag
  );
  info!(release = %spec.key(), %tag, "downloading release");

  let response = client()?.get(&url).send()?.error_for_status()?;
  let bytes = response.bytes()?;

  if dest.exists() {
    fs::remove_dir_all(&dest)?;
  }
  unpack_zip(&bytes, &dest)?;

  cache.0.insert(spec.key(), tag);
  save_tag_cache(&cache_path, &cache)?;

  info!(dest = %dest.display(), "release extracted");
  Ok(dest)
}

fn client() -> FetchResult<reqwest::blocking::Client> {
  // GitHub rejects requests without a user agent.
  Ok(
    reqwest::blocking::Client::builder()
      .user_agent(concat!("lattice/", env!("CARGO_PKG_VERSION")))
      .build()?,
  )
}

fn latest_tag(spec: &ReleaseSpec) -> FetchResult<String> {
  let url = format!(
    "https://api.github.com/repos/{}/{}/releases/latest",
    spec.owner, spec.repo
  );
  let release: serde_json::Value = client()?.get(&url).send()?.error_for_status()?.json()?;
  release
    .get("tag_name")
    .and_then(|tag| tag.as_str())
    .map(str::to_string)
    .ok_or_else(|| FetchError::NoTag {
      owner: spec.owner.clone(),
      repo: spec.repo.clone(),
    })
}

fn release_dir_name(spec: &ReleaseSpec, tag: &str) -> String {
  let safe: String = tag
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
        c
      } else {
        '-'
      }
    })
    .collect();
  format!("{}-{}-{}", spec.owner, spec.repo, safe)
}

fn load_tag_cache(path: &Path) -> TagCache {
  fs::read_to_string(path)
    .ok()
    .and_then(|text| serde_json::from_str(&text).ok())
    .unwrap_or_default()
}

fn save_tag_cache(path: &Path, cache: &TagCache) -> FetchResult<()> {
  fs::write(path, serde_json::to_string_pretty(cache)?)?;
  Ok(())
}

fn unpack_zip(bytes: &[u8], dest: &Path) -> FetchResult<()> {
  let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
    .map_err(|e| FetchError::Archive(format!("failed to open zip: {e}")))?;

  fs::create_dir_all(dest)?;

  for i in 0..archive.len() {
    let mut file = archive
      .by_index(i)
      .map_err(|e| FetchError::Archive(format!("failed to read zip entry: {e}")))?;

    let Some(path) = file.enclosed_name() else {
      return Err(FetchError::Archive("invalid zip entry name".to_string()));
    };

    // GitHub zipballs nest everything under a single top-level directory.
    let stripped: PathBuf = path.components().skip(1).collect();
    if stripped.as_os_str().is_empty() {
      continue;
    }

    let dest_path = dest.join(&stripped);
    if file.is_dir() {
      fs::create_dir_all(&dest_path)?;
    } else {
      if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)?;
      }
      let mut outfile = File::create(&dest_path)?;
      std::io::copy(&mut file, &mut outfile)?;
    }
  }

  Ok(())
}
