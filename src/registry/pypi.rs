//! Fetch metadata from PyPI and pypistats.org

use super::get_json;
use crate::config::NetworkConfig;
use crate::error::Result;
use crate::types::{Ecosystem, RegistryMetadata};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Response from the PyPI JSON API for a project
#[derive(Debug, Deserialize)]
struct PypiResponse {
    info: PypiInfo,
    #[serde(default)]
    releases: HashMap<String, Vec<PypiFile>>,
}

#[derive(Debug, Deserialize)]
struct PypiInfo {
    version: Option<String>,
    author: Option<String>,
    author_email: Option<String>,
    maintainer: Option<String>,
    maintainer_email: Option<String>,
    home_page: Option<String>,
    project_urls: Option<HashMap<String, Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct PypiFile {
    upload_time_iso_8601: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PypistatsResponse {
    data: PypistatsData,
}

#[derive(Debug, Deserialize)]
struct PypistatsData {
    last_week: Option<u64>,
}

/// Fetch metadata for a project from PyPI
pub async fn fetch_pypi_metadata(
    client: &Client,
    name: &str,
    config: &NetworkConfig,
) -> Result<RegistryMetadata> {
    debug!("Fetching PyPI metadata for {}", name);

    let url = format!("{}/pypi/{}/json", config.pypi_url, name);
    let data: PypiResponse = get_json(client, &url, config, Ecosystem::Pypi, name).await?;

    let uploads: Vec<DateTime<Utc>> = data
        .releases
        .values()
        .flatten()
        .filter_map(|file| file.upload_time_iso_8601.as_deref())
        .filter_map(parse_datetime)
        .collect();

    let project_urls = data.info.project_urls.clone().unwrap_or_default();

    Ok(RegistryMetadata {
        found: true,
        maintainers_count: count_maintainers(&data.info),
        weekly_downloads: fetch_weekly_downloads(client, name, config).await,
        first_release_at: uploads.iter().min().copied(),
        latest_release_at: uploads.iter().max().copied(),
        latest_version: data.info.version.filter(|v| !v.is_empty()),
        homepage: non_empty(data.info.home_page)
            .or_else(|| project_url(&project_urls, &["homepage", "home"])),
        repository_url: project_url(&project_urls, &["source", "repository", "code", "github"]),
    })
}

/// Weekly downloads from pypistats.org; `None` when unavailable
async fn fetch_weekly_downloads(client: &Client, name: &str, config: &NetworkConfig) -> Option<u64> {
    let url = format!("{}/api/packages/{}/recent", config.pypistats_url, name);
    match get_json::<PypistatsResponse>(client, &url, config, Ecosystem::Pypi, name).await {
        Ok(stats) => stats.data.last_week,
        Err(e) => {
            debug!("Download statistics unavailable for {}: {}", name, e);
            None
        }
    }
}

/// Count distinct people named in the author and maintainer fields.
///
/// Names are preferred; emails are only used when no name is published.
fn count_maintainers(info: &PypiInfo) -> u32 {
    let collect = |fields: [&Option<String>; 2]| -> BTreeSet<String> {
        fields
            .into_iter()
            .flatten()
            .flat_map(|value| value.split(','))
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty() && part != "unknown")
            .collect()
    };

    let names = collect([&info.author, &info.maintainer]);
    if !names.is_empty() {
        return names.len() as u32;
    }
    collect([&info.author_email, &info.maintainer_email]).len() as u32
}

fn project_url(urls: &HashMap<String, Option<String>>, labels: &[&str]) -> Option<String> {
    let mut keys: Vec<&String> = urls.keys().collect();
    keys.sort();
    labels.iter().find_map(|label| {
        keys.iter()
            .filter(|key| key.to_lowercase().contains(label))
            .find_map(|key| non_empty(urls[*key].clone()))
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(author: Option<&str>, maintainer: Option<&str>, author_email: Option<&str>) -> PypiInfo {
        PypiInfo {
            version: None,
            author: author.map(String::from),
            author_email: author_email.map(String::from),
            maintainer: maintainer.map(String::from),
            maintainer_email: None,
            home_page: None,
            project_urls: None,
        }
    }

    #[test]
    fn test_count_maintainers() {
        assert_eq!(count_maintainers(&info(Some("Kenneth Reitz"), Some(""), None)), 1);
        assert_eq!(count_maintainers(&info(Some("Ann"), Some("Bob, Cy"), None)), 3);
        assert_eq!(count_maintainers(&info(Some("Ann"), Some("ann"), None)), 1);
        assert_eq!(count_maintainers(&info(None, None, Some("dev@example.com"))), 1);
        assert_eq!(count_maintainers(&info(None, Some("UNKNOWN"), None)), 0);
    }

    #[test]
    fn test_parse_datetime_with_fraction() {
        let parsed = parse_datetime("2023-05-22T15:12:44.175012Z").unwrap();
        assert_eq!(parsed.date_naive(), Utc.with_ymd_and_hms(2023, 5, 22, 0, 0, 0).unwrap().date_naive());
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[tokio::test]
    async fn test_fetch_pypi_metadata() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pypi/requests/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "info": {"version": "2.31.0", "author": "Kenneth Reitz", "maintainer": "",
                             "home_page": "", "project_urls": {"Source": "https://github.com/psf/requests",
                             "Homepage": "https://requests.readthedocs.io", "Broken": null}},
                    "releases": {
                        "0.2.0": [{"upload_time_iso_8601": "2011-02-14T18:12:11.000000Z"}],
                        "2.31.0": [{"upload_time_iso_8601": "2023-05-22T15:12:44.175012Z"},
                                   {"upload_time_iso_8601": "2023-05-22T15:12:46.543210Z"}],
                        "3.0.0a": []
                    }
                }"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/packages/requests/recent")
            .with_status(200)
            .with_body(r#"{"data": {"last_day": 1, "last_week": 120000, "last_month": 500000}}"#)
            .create_async()
            .await;

        let config = NetworkConfig::default().with_base_url(&server.url());
        let metadata = fetch_pypi_metadata(&Client::new(), "requests", &config).await.unwrap();

        assert!(metadata.found);
        assert_eq!(metadata.maintainers_count, 1);
        assert_eq!(metadata.weekly_downloads, Some(120_000));
        assert_eq!(metadata.latest_version.as_deref(), Some("2.31.0"));
        assert_eq!(
            metadata.first_release_at,
            parse_datetime("2011-02-14T18:12:11.000000Z")
        );
        assert_eq!(
            metadata.latest_release_at,
            parse_datetime("2023-05-22T15:12:46.543210Z")
        );
        assert_eq!(metadata.homepage.as_deref(), Some("https://requests.readthedocs.io"));
        assert_eq!(
            metadata.repository_url.as_deref(),
            Some("https://github.com/psf/requests")
        );
    }

    #[tokio::test]
    async fn test_missing_download_stats_keep_package_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pypi/tiny/json")
            .with_status(200)
            .with_body(r#"{"info": {"author": "me"}, "releases": {}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/packages/tiny/recent")
            .with_status(404)
            .create_async()
            .await;

        let config = NetworkConfig::default().with_base_url(&server.url());
        let metadata = fetch_pypi_metadata(&Client::new(), "tiny", &config).await.unwrap();

        assert!(metadata.found);
        assert_eq!(metadata.weekly_downloads, None);
        assert_eq!(metadata.first_release_at, None);
    }
}
