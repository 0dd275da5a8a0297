//! ESA orbit file source: directory-listing based discovery and download of
//! POEORB/RESORB state-vector files from the step.esa.int archive.

use crate::core::orbit::{OrbitSearch, OrbitSource};
use crate::types::{InsarError, InsarResult};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::io::Read;
use std::path::{Path, PathBuf};

const BASE_URL: &str = "https://step.esa.int/auxdata/orbits/Sentinel-1";

/// Fetches orbit files from the public ESA archive.
///
/// Discovery works off the archive's HTML directory listings rather than
/// guessed filenames: listings for the acquisition month (and neighbours)
/// are scanned for entries whose validity window covers the acquisition
/// time, and the best-centred candidate is downloaded.
pub struct EsaOrbitSource {
    client: reqwest::blocking::Client,
}

impl EsaOrbitSource {
    pub fn new() -> InsarResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| {
                InsarError::ExternalTool(format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }

    fn archive_dir(search: OrbitSearch) -> &'static str {
        match search {
            OrbitSearch::Precise => "AUX_POEORB",
            OrbitSearch::Restituted => "AUX_RESORB",
        }
    }

    /// A previously downloaded file whose validity window covers the
    /// acquisition satisfies the request without touching the network.
    fn find_cached(
        timestamp: DateTime<Utc>,
        mission: &str,
        save_dir: &Path,
        search: OrbitSearch,
    ) -> Option<PathBuf> {
        let marker = Self::archive_dir(search);
        let entries = std::fs::read_dir(save_dir).ok()?;
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(mission) || !name.contains(marker) || !name.ends_with(".EOF") {
                continue;
            }
            if covers(&name, timestamp) {
                return Some(entry.path());
            }
        }
        None
    }

    fn list_candidates(
        &self,
        timestamp: DateTime<Utc>,
        mission: &str,
        search: OrbitSearch,
    ) -> InsarResult<Vec<String>> {
        let mut candidates = Vec::new();

        // Orbit files land in the directory of their validity start, which
        // can precede the acquisition month; check the neighbours too.
        for date in [
            timestamp - Duration::days(31),
            timestamp - Duration::days(1),
            timestamp,
            timestamp + Duration::days(1),
        ] {
            let dir_url = format!(
                "{}/{}/{}/{}/{}/",
                BASE_URL,
                Self::archive_dir(search),
                mission,
                date.format("%Y"),
                date.format("%m")
            );
            log::debug!("Checking orbit directory: {}", dir_url);

            let response = match self.client.get(&dir_url).send() {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    log::debug!("Directory listing {} returned {}", dir_url, r.status());
                    continue;
                }
                Err(e) => {
                    return Err(InsarError::ExternalTool(format!(
                        "orbit directory listing failed: {}",
                        e
                    )));
                }
            };

            let html = response.text().map_err(|e| {
                InsarError::ExternalTool(format!("failed to read directory listing: {}", e))
            })?;

            for line in html.lines() {
                if let Some(filename) = extract_href(line) {
                    if filename.starts_with(mission) && covers(&filename, timestamp) {
                        candidates.push(format!("{}{}", dir_url, filename));
                    }
                }
            }
        }

        candidates.sort_by(|a, b| {
            let score_a = centre_distance(a, timestamp);
            let score_b = centre_distance(b, timestamp);
            score_a.cmp(&score_b)
        });
        candidates.dedup();
        Ok(candidates)
    }

    /// Download one archive entry, unzipping the `.EOF` payload if needed,
    /// and store it under `save_dir`.
    fn download(&self, url: &str, save_dir: &Path) -> InsarResult<PathBuf> {
        log::info!("Downloading orbit file: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| InsarError::ExternalTool(format!("orbit download failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(InsarError::ExternalTool(format!(
                "orbit download failed with status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| InsarError::ExternalTool(format!("failed to read orbit file: {}", e)))?;

        let remote_name = url.rsplit('/').next().unwrap_or("orbit.EOF");
        let (content, filename) = if remote_name.ends_with(".zip") || is_zip(&bytes) {
            let (content, inner_name) = extract_eof_from_zip(&bytes)?;
            (content, inner_name)
        } else {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| InsarError::InvalidFormat(format!("orbit file not UTF-8: {}", e)))?;
            (text, remote_name.to_string())
        };

        std::fs::create_dir_all(save_dir)?;
        let path = save_dir.join(filename);
        std::fs::write(&path, content)?;
        log::info!("Orbit file saved to {}", path.display());
        Ok(path)
    }
}

impl OrbitSource for EsaOrbitSource {
    fn fetch_orbit(
        &self,
        timestamp: DateTime<Utc>,
        mission: &str,
        save_dir: &Path,
        search: OrbitSearch,
    ) -> InsarResult<Option<PathBuf>> {
        if let Some(cached) = Self::find_cached(timestamp, mission, save_dir, search) {
            log::info!("Using cached orbit file: {}", cached.display());
            return Ok(Some(cached));
        }

        let candidates = self.list_candidates(timestamp, mission, search)?;
        if candidates.is_empty() {
            log::debug!(
                "No {} orbit candidates for {} at {}",
                Self::archive_dir(search),
                mission,
                timestamp.format("%Y-%m-%d %H:%M:%S")
            );
            return Ok(None);
        }

        // Candidates are sorted best-first; tolerate individual failures.
        let mut last_err = None;
        for url in &candidates {
            match self.download(url, save_dir) {
                Ok(path) => return Ok(Some(path)),
                Err(e) => {
                    log::warn!("Failed to fetch {}: {}", url, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            InsarError::ExternalTool("all orbit download attempts failed".to_string())
        }))
    }
}

/// Pull a quoted href filename out of a directory-listing line
fn extract_href(html_line: &str) -> Option<String> {
    let start = html_line.find("href=\"")? + 6;
    let end = html_line[start..].find('"')?;
    let filename = &html_line[start..start + end];
    if (filename.ends_with(".EOF.zip") || filename.ends_with(".EOF")) && !filename.contains('/') {
        Some(filename.to_string())
    } else {
        None
    }
}

/// Parse the `V<start>_<end>` validity window from an orbit filename and
/// check that it covers the acquisition time.
fn covers(filename: &str, timestamp: DateTime<Utc>) -> bool {
    match validity_window(filename) {
        Some((start, end)) => timestamp >= start && timestamp <= end,
        None => false,
    }
}

fn validity_window(filename: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let stem = filename.trim_end_matches(".zip").trim_end_matches(".EOF");
    let v_pos = stem.find("_V")?;
    let window = &stem[v_pos + 2..];
    let (start_str, end_str) = window.split_once('_')?;
    let start = parse_compact_time(start_str)?;
    let end = parse_compact_time(end_str)?;
    Some((start, end))
}

fn parse_compact_time(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

/// Distance in seconds from the acquisition to the validity window centre;
/// unparsable names sort last.
fn centre_distance(url: &str, timestamp: DateTime<Utc>) -> i64 {
    let filename = url.rsplit('/').next().unwrap_or("");
    match validity_window(filename) {
        Some((start, end)) => {
            let mid = start + (end - start) / 2;
            (timestamp - mid).num_seconds().abs()
        }
        None => i64::MAX,
    }
}

fn is_zip(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0..4] == [0x50, 0x4B, 0x03, 0x04]
}

/// Extract the `.EOF` payload from a downloaded archive, returning its
/// content and entry name.
fn extract_eof_from_zip(zip_bytes: &[u8]) -> InsarResult<(String, String)> {
    let cursor = std::io::Cursor::new(zip_bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| InsarError::InvalidFormat(format!("failed to read ZIP archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| InsarError::InvalidFormat(format!("failed to read ZIP entry: {}", e)))?;
        if file.name().ends_with(".EOF") {
            let name = file
                .name()
                .rsplit('/')
                .next()
                .unwrap_or("orbit.EOF")
                .to_string();
            let mut contents = String::new();
            file.read_to_string(&mut contents).map_err(|e| {
                InsarError::InvalidFormat(format!("failed to read EOF entry: {}", e))
            })?;
            return Ok((contents, name));
        }
    }

    Err(InsarError::InvalidFormat(
        "no .EOF file found in ZIP archive".to_string(),
    ))
}
