//! HTTP implementation of the content API
//!
//! This module handles all HTTP requests made while bundling:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Action API queries (site info, file repos, site matrix, parse,
//!   contributors, image info, revisions)
//! - Parsoid/RESTBase HTML fetches
//! - Media downloads streamed to disk
//! - Retry with fixed or exponential backoff for transient failures
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 404 | Immediate → `NotFound` |
//! | HTTP 429 | Retry with backoff |
//! | HTTP 5xx | Retry with backoff |
//! | Timeout / connection error | Retry with backoff |
//! | Any other status | Immediate → `HttpStatus` |

use crate::api::{
    ContentApi, ImageInfo, MediaRef, ParsedPage, RevisionRecord, Site, SiteInfo,
    SiteMatrixEntry,
};
use crate::config::{Backoff, Config, HttpConfig};
use crate::metabook::{FileRepo, WikiConf};
use crate::url::{action_api_url, parsoid_endpoint};
use crate::{BundlerError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Extended metadata fields copied into media records
const EXTMETADATA_FIELDS: [&str; 3] = ["Artist", "Credit", "LicenseShortName"];

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The bundler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> std::result::Result<Client, reqwest::Error> {
    // Format: Name/Version (+ContactURL)
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .connect_timeout(Duration::from_secs(config.http.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Content API client speaking to live wikis
pub struct HttpApi {
    client: Client,
    http: HttpConfig,
    config: Config,
}

impl HttpApi {
    /// Creates a client from the configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = build_http_client(config).map_err(|source| BundlerError::Http {
            url: String::new(),
            source,
        })?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a client around an existing `reqwest::Client`
    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            http: config.http.clone(),
            config: config.clone(),
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.http.retry_delay_ms;
        let ms = match self.http.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => base.saturating_mul(1u64 << attempt.min(16)),
        };
        Duration::from_millis(ms)
    }

    /// Sends a request, retrying transient failures
    async fn send<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Err(BundlerError::NotFound(url.to_string()));
                    }
                    if !is_transient(status) || attempt >= self.http.max_retries {
                        return Err(BundlerError::HttpStatus {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    tracing::debug!(url, status = status.as_u16(), attempt, "Retrying request");
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    if !retryable || attempt >= self.http.max_retries {
                        return Err(BundlerError::Http {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    tracing::debug!(url, error = %e, attempt, "Retrying request");
                }
            }
            tokio::time::sleep(self.retry_delay(attempt)).await;
            attempt += 1;
        }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(url, || self.client.get(url)).await?;
        response.text().await.map_err(|source| BundlerError::Http {
            url: url.to_string(),
            source,
        })
    }

    /// Issues an action API query and returns the decoded JSON
    async fn action(&self, wiki: &WikiConf, params: &[(&str, String)]) -> Result<Value> {
        let url = action_api_url(wiki)?;
        let mut query: Vec<(&str, String)> = vec![("format", "json".to_string())];
        query.extend(params.iter().cloned());

        let response = self
            .send(&url, || self.client.get(&url).query(&query))
            .await?;
        let value: Value = response.json().await.map_err(|source| BundlerError::Http {
            url: url.clone(),
            source,
        })?;

        if let Some(error) = value.get("error") {
            let code = error["code"].as_str().unwrap_or_default();
            let info = error["info"].as_str().unwrap_or(code);
            return Err(match code {
                "missingtitle" | "nosuchrevid" | "nosuchpageid" => {
                    BundlerError::NotFound(info.to_string())
                }
                _ => BundlerError::BadResponse {
                    url,
                    message: info.to_string(),
                },
            });
        }
        Ok(value)
    }
}

/// Statuses worth retrying
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// First page object of a `query` response (object or array form)
fn first_page(value: &Value) -> Option<&Value> {
    match &value["query"]["pages"] {
        Value::Object(pages) => pages.values().next(),
        Value::Array(pages) => pages.first(),
        _ => None,
    }
}

fn missing_field(url: &str, field: &str) -> BundlerError {
    BundlerError::BadResponse {
        url: url.to_string(),
        message: format!("response has no '{}'", field),
    }
}

/// Keeps only the module fields a reader needs
fn trim_modules(parse: &Value) -> Value {
    let mut out = Map::new();
    for key in ["modules", "modulescripts", "modulestyles", "jsconfigvars"] {
        if let Some(v) = parse.get(key) {
            out.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(out)
}

/// Site matrix entries from an `action=sitematrix` response
fn parse_site_matrix(value: &Value) -> Vec<SiteMatrixEntry> {
    let mut entries = Vec::new();
    let Some(matrix) = value["sitematrix"].as_object() else {
        return entries;
    };
    for (key, group) in matrix {
        let sites = match key.as_str() {
            "count" => continue,
            "specials" => group.as_array(),
            _ => group["site"].as_array(),
        };
        for site in sites.into_iter().flatten() {
            if let (Some(url), Some(dbname)) = (site["url"].as_str(), site["dbname"].as_str()) {
                entries.push(SiteMatrixEntry {
                    url: url.to_string(),
                    dbname: dbname.to_string(),
                });
            }
        }
    }
    entries
}

/// Builds a media record from an `imageinfo` page object
fn image_info_from_page(page: &Value, media: &MediaRef) -> ImageInfo {
    let Some(info) = page["imageinfo"].as_array().and_then(|a| a.first()) else {
        return ImageInfo::missing(media);
    };
    let text = |v: &Value| v.as_str().map(|s| s.to_string());
    let extmeta = |field: &str| {
        info["extmetadata"][field]["value"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };

    ImageInfo {
        height: info["thumbheight"].as_u64().or_else(|| info["height"].as_u64()),
        width: info["thumbwidth"].as_u64().or_else(|| info["width"].as_u64()),
        thumburl: text(&info["thumburl"]).or_else(|| Some(media.src.clone())),
        url: text(&info["url"]),
        descriptionurl: text(&info["descriptionurl"]),
        sha1: text(&info["sha1"]),
        resource: media.resource.clone(),
        short: media.short.clone(),
        mime: text(&info["mime"]),
        mediatype: text(&info["mediatype"]),
        filename: None,
        size: info["size"].as_u64(),
        missing: None,
        repository: text(&page["imagerepository"]).filter(|r| !r.is_empty()),
        artist: extmeta(EXTMETADATA_FIELDS[0]),
        credit: extmeta(EXTMETADATA_FIELDS[1]),
        licenseshortname: extmeta(EXTMETADATA_FIELDS[2]),
    }
}

#[async_trait]
impl ContentApi for HttpApi {
    async fn site_info(&self, wiki: &WikiConf) -> Result<SiteInfo> {
        let value = self
            .action(
                wiki,
                &[
                    ("action", "query".to_string()),
                    ("meta", "siteinfo".to_string()),
                    ("siprop", "general".to_string()),
                ],
            )
            .await?;
        let general = value["query"]["general"].clone();
        if general.is_null() {
            return Err(missing_field(&action_api_url(wiki)?, "query.general"));
        }
        Ok(serde_json::from_value(general)?)
    }

    async fn file_repos(&self, wiki: &WikiConf) -> Result<Vec<FileRepo>> {
        let value = self
            .action(
                wiki,
                &[
                    ("action", "query".to_string()),
                    ("meta", "filerepoinfo".to_string()),
                ],
            )
            .await?;
        let repos = value["query"]["repos"].clone();
        if repos.is_null() {
            return Err(missing_field(&action_api_url(wiki)?, "query.repos"));
        }
        Ok(serde_json::from_value(repos)?)
    }

    async fn site_matrix(&self) -> Result<Vec<SiteMatrixEntry>> {
        let wiki = WikiConf::new(self.config.api.sitematrix_api.clone());
        let value = self
            .action(&wiki, &[("action", "sitematrix".to_string())])
            .await?;
        Ok(parse_site_matrix(&value))
    }

    async fn fetch_parsed(
        &self,
        site: &Site,
        title: &str,
        revision: Option<u64>,
    ) -> Result<ParsedPage> {
        let endpoint = parsoid_endpoint(self.config.api.api_version, &site.conf, title, revision)?;
        tracing::debug!(url = %endpoint.url, api = ?endpoint.api, "Fetching parsed article");
        let text = self.get_text(&endpoint.url).await?;
        ParsedPage::parse(site, title, text)
    }

    async fn fetch_rendered_html(&self, site: &Site, title: &str, revision: u64) -> Result<Value> {
        let mut params = vec![
            ("action", "parse".to_string()),
            ("redirects", String::new()),
        ];
        if revision != 0 {
            params.push(("oldid", revision.to_string()));
        } else {
            params.push(("page", title.to_string()));
        }
        let value = self.action(&site.conf, &params).await?;
        match value.get("parse") {
            Some(parse) => Ok(parse.clone()),
            None => Err(missing_field(&action_api_url(&site.conf)?, "parse")),
        }
    }

    async fn fetch_module_data(&self, site: &Site, title: &str, revision: u64) -> Result<Value> {
        let mut params = vec![
            ("action", "parse".to_string()),
            ("prop", "modules|jsconfigvars".to_string()),
        ];
        if revision != 0 {
            params.push(("oldid", revision.to_string()));
        } else {
            params.push(("page", title.to_string()));
        }
        let value = self.action(&site.conf, &params).await?;
        match value.get("parse") {
            Some(parse) => Ok(trim_modules(parse)),
            None => Err(missing_field(&action_api_url(&site.conf)?, "parse")),
        }
    }

    async fn fetch_authorship(&self, site: &Site, title: &str, _revision: u64) -> Result<Value> {
        let mut authors = Vec::new();
        let mut anons = 0;
        let mut cont: Option<String> = None;
        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("prop", "contributors".to_string()),
                ("titles", title.to_string()),
                ("pclimit", "max".to_string()),
            ];
            if let Some(c) = &cont {
                params.push(("pccontinue", c.clone()));
            }
            let value = self.action(&site.conf, &params).await?;
            if let Some(page) = first_page(&value) {
                for c in page["contributors"].as_array().into_iter().flatten() {
                    if let Some(name) = c["name"].as_str() {
                        authors.push(Value::String(name.to_string()));
                    }
                }
                anons = page["anoncontributors"].as_u64().unwrap_or(anons);
            }
            cont = value["continue"]["pccontinue"].as_str().map(|s| s.to_string());
            if cont.is_none() {
                break;
            }
        }
        Ok(json!({ "authors": authors, "anons": anons }))
    }

    async fn fetch_media_metadata(&self, site: &Site, media: &MediaRef) -> Result<ImageInfo> {
        let value = self
            .action(
                &site.conf,
                &[
                    ("action", "query".to_string()),
                    ("prop", "imageinfo".to_string()),
                    ("titles", media.short.clone()),
                    (
                        "iiprop",
                        "url|size|mediatype|mime|sha1|extmetadata".to_string(),
                    ),
                    ("iiurlwidth", media.imagesize.to_string()),
                    ("iiextmetadatafilter", EXTMETADATA_FIELDS.join("|")),
                ],
            )
            .await?;
        Ok(match first_page(&value) {
            Some(page) => image_info_from_page(page, media),
            None => ImageInfo::missing(media),
        })
    }

    async fn fetch_media_bytes(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.send(url, || self.client.get(url)).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        let result: Result<()> = async {
            while let Some(chunk) = response.chunk().await.map_err(|source| BundlerError::Http {
                url: url.to_string(),
                source,
            })? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(e);
        }
        Ok(written)
    }

    async fn fetch_raw_revision(
        &self,
        site: &Site,
        title: &str,
        revision: Option<u64>,
    ) -> Result<Option<RevisionRecord>> {
        let mut params = vec![
            ("action", "query".to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content|ids".to_string()),
            ("rvslots", "main".to_string()),
        ];
        match revision {
            Some(rev) => params.push(("revids", rev.to_string())),
            None => {
                params.push(("titles", title.to_string()));
                params.push(("redirects", String::new()));
            }
        }

        let value = match self.action(&site.conf, &params).await {
            Ok(value) => value,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        if value["query"].get("badrevids").is_some() {
            return Ok(None);
        }
        let Some(page) = first_page(&value) else {
            return Ok(None);
        };
        if page.get("missing").is_some() || page.get("invalid").is_some() {
            return Ok(None);
        }
        let Some(rev) = page["revisions"].as_array().and_then(|r| r.first()) else {
            return Ok(None);
        };

        let text = rev["slots"]["main"]["*"]
            .as_str()
            .or_else(|| rev["*"].as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Some(RevisionRecord {
            pageid: page["pageid"].as_u64(),
            ns: page["ns"].as_i64().unwrap_or_default(),
            title: page["title"].as_str().unwrap_or(title).to_string(),
            revid: rev["revid"].as_u64().unwrap_or_default(),
            wiki: site.index,
            text,
        }))
    }
}
