//! Fetch metadata from the npm registry and downloads API

use super::get_json;
use crate::config::NetworkConfig;
use crate::error::Result;
use crate::types::{Ecosystem, RegistryMetadata};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Keys of the packument `time` map that are not release timestamps
const NON_RELEASE_TIME_KEYS: &[&str] = &["created", "modified"];

/// Package document ("packument") served by the npm registry
#[derive(Debug, Deserialize)]
struct NpmPackument {
    #[serde(default)]
    time: HashMap<String, Value>,
    #[serde(default)]
    maintainers: Vec<Value>,
    #[serde(rename = "dist-tags", default)]
    dist_tags: HashMap<String, String>,
    #[serde(default)]
    versions: HashMap<String, NpmVersion>,
}

#[derive(Debug, Deserialize)]
struct NpmVersion {
    homepage: Option<Value>,
    repository: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NpmDownloads {
    downloads: u64,
}

/// Fetch metadata for a package from the npm registry
pub async fn fetch_npm_metadata(
    client: &Client,
    name: &str,
    config: &NetworkConfig,
) -> Result<RegistryMetadata> {
    debug!("Fetching npm metadata for {}", name);

    // Scoped names keep their '@' but need the '/' escaped
    let encoded = urlencoding::encode(name).replace("%40", "@");
    let url = format!("{}/{}", config.npm_registry_url, encoded);
    let data: NpmPackument = get_json(client, &url, config, Ecosystem::Npm, name).await?;

    let releases: Vec<DateTime<Utc>> = data
        .time
        .iter()
        .filter(|(key, _)| !NON_RELEASE_TIME_KEYS.contains(&key.as_str()))
        .filter_map(|(_, value)| value.as_str())
        .filter_map(parse_datetime)
        .collect();

    let latest_version = data.dist_tags.get("latest").cloned();
    let latest = latest_version.as_ref().and_then(|v| data.versions.get(v));

    Ok(RegistryMetadata {
        found: true,
        maintainers_count: count_maintainers(&data.maintainers),
        weekly_downloads: fetch_weekly_downloads(client, name, config).await,
        first_release_at: releases.iter().min().copied(),
        latest_release_at: releases.iter().max().copied(),
        latest_version,
        homepage: latest
            .and_then(|v| v.homepage.as_ref())
            .and_then(Value::as_str)
            .map(String::from),
        repository_url: latest.and_then(|v| v.repository.as_ref()).and_then(repository_url),
    })
}

/// Weekly downloads from api.npmjs.org; `None` when unavailable
async fn fetch_weekly_downloads(client: &Client, name: &str, config: &NetworkConfig) -> Option<u64> {
    let url = format!(
        "{}/downloads/point/last-week/{}",
        config.npm_downloads_url, name
    );
    match get_json::<NpmDownloads>(client, &url, config, Ecosystem::Npm, name).await {
        Ok(stats) => Some(stats.downloads),
        Err(e) => {
            debug!("Download statistics unavailable for {}: {}", name, e);
            None
        }
    }
}

/// Maintainers are `{"name": ..}` objects in current packuments, plain
/// strings in some old ones
fn count_maintainers(maintainers: &[Value]) -> u32 {
    maintainers
        .iter()
        .filter_map(|m| match m {
            Value::Object(obj) => obj.get("name").and_then(Value::as_str),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        })
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .len() as u32
}

fn repository_url(repository: &Value) -> Option<String> {
    match repository {
        Value::String(url) => Some(url.clone()),
        Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
