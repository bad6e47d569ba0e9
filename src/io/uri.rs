use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use url::Url;

/// Local file name for a download: the URL's final path segment
///
/// Query strings and fragments are not part of the name.
pub fn file_name_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;

    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| anyhow!("URL has no file name in its path: {}", url))?;

    if name == "." || name == ".." {
        return Err(anyhow!("URL has no file name in its path: {}", url));
    }

    Ok(name.to_string())
}

/// Where the download for `url` lands inside `work_dir`
pub fn local_path_for(work_dir: &Path, url: &str) -> Result<PathBuf> {
    Ok(work_dir.join(file_name_from_url(url)?))
}
