use std::path::{Path, PathBuf};
use url::Url;

/// Timestamp format used for cache file names and result entries
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Current local time formatted as `YYYYmmdd_HHMMSS`
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Resolve a possibly-relative reference against the page's base URL.
///
/// Resolution order:
/// - already absolute (`http://`, `https://`): returned as-is
/// - protocol-relative (`//host/path`): prefixed with `https:`
/// - root-relative (`/path`): prefixed with the base's scheme and host
/// - anything else: joined against the base URL
///
/// Returns `None` for an empty reference or when the base cannot be parsed.
pub fn to_absolute_url(base: &str, reference: &str) -> Option<String> {
    if reference.is_empty() {
        return None;
    }
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Some(reference.to_string());
    }
    if reference.starts_with("//") {
        return Some(format!("https:{}", reference));
    }

    let base_url = Url::parse(base).ok()?;
    if reference.starts_with('/') {
        let host = base_url.host_str()?;
        let authority = match base_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        return Some(format!("{}://{}{}", base_url.scheme(), authority, reference));
    }

    base_url.join(reference).ok().map(|u| u.to_string())
}

/// Pick `<dir>/<stem>.json`, adding `_1`, `_2`, ... if the name is taken
pub fn unique_json_path(dir: &Path, stem: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.json", stem));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{}_{}.json", stem, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
