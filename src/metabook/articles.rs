//! Metabook construction from a list of articles
//!
//! Each article names its wiki either by database prefix (`enwiki`) or by
//! host (`en.wikipedia.org`). Wikis are looked up in the site matrix and
//! get one `wikiconf` entry each, shared by every article on that wiki.

use crate::api::{ContentApi, SiteMatrix, SiteMatrixCache, SiteMatrixEntry};
use crate::config::Config;
use crate::metabook::{Article, Item, Metabook, WikiConf};
use crate::url::extract_domain;
use crate::{BundlerError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// One requested article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleSpec {
    pub prefix: Option<String>,
    pub host: Option<String>,
    pub title: String,
}

impl ArticleSpec {
    /// `site` is a host if it contains a dot, otherwise a database prefix
    pub fn new(site: &str, title: &str) -> Self {
        let (prefix, host) = if site.contains('.') {
            (None, Some(site.to_lowercase()))
        } else {
            (Some(site.to_string()), None)
        };
        Self {
            prefix,
            host,
            title: title.to_string(),
        }
    }
}

impl FromStr for ArticleSpec {
    type Err = String;

    /// Parses `SITE|TITLE`, e.g. `enwiki|Laozi` or `en.wikipedia.org|Laozi`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('|') {
            Some((site, title)) if !site.is_empty() && !title.is_empty() => {
                Ok(Self::new(site, title))
            }
            _ => Err(format!("expected SITE|TITLE, got '{}'", s)),
        }
    }
}

/// Builds a metabook holding `specs` in order
pub async fn from_articles(
    specs: &[ArticleSpec],
    api: &dyn ContentApi,
    matrix: &SiteMatrixCache,
    config: &Config,
) -> Result<Metabook> {
    let mut metabook = Metabook::default();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut loaded: Option<Arc<SiteMatrix>> = None;

    for spec in specs {
        let cached = spec
            .host
            .as_ref()
            .and_then(|h| seen.get(&format!("H{}", h)))
            .or_else(|| spec.prefix.as_ref().and_then(|p| seen.get(&format!("P{}", p))))
            .copied();

        let wiki = match cached {
            Some(index) => index,
            None => {
                if loaded.is_none() {
                    loaded = Some(load_matrix(api, matrix, config).await?);
                }
                let entry = loaded
                    .as_deref()
                    .and_then(|m| lookup(m, spec))
                    .cloned();
                let conf = wiki_conf(spec, entry.as_ref(), config)?;
                let index = metabook.wikis.len();
                if let Some(host) = &conf.domain {
                    seen.insert(format!("H{}", host), index);
                }
                if let Some(prefix) = &conf.prefix {
                    seen.insert(format!("P{}", prefix), index);
                }
                metabook.wikis.push(conf);
                index
            }
        };

        let root = article_root(&metabook.wikis[wiki]);
        let title = spec.title.replace('_', " ");
        let mut extra = Map::new();
        extra.insert(
            "content_type".to_string(),
            Value::String("text/x-wiki".to_string()),
        );
        extra.insert(
            "url".to_string(),
            Value::String(format!("{}/wiki/{}", root, title.replace(' ', "_"))),
        );
        metabook.items.push(Item::Article(Article {
            title,
            wiki,
            revision: None,
            about: None,
            is_version_of: None,
            extra,
        }));
    }

    Ok(metabook)
}

async fn load_matrix(
    api: &dyn ContentApi,
    matrix: &SiteMatrixCache,
    config: &Config,
) -> Result<Arc<SiteMatrix>> {
    match matrix.get(api).await {
        Ok(m) => Ok(m),
        Err(e) if config.api.php_api.is_some() => {
            tracing::warn!("Site matrix unavailable, using php-api: {}", e);
            Ok(Arc::new(SiteMatrix::default()))
        }
        Err(e) => Err(e),
    }
}

fn lookup<'a>(matrix: &'a SiteMatrix, spec: &ArticleSpec) -> Option<&'a SiteMatrixEntry> {
    spec.host
        .as_deref()
        .and_then(|h| matrix.by_host(h))
        .or_else(|| spec.prefix.as_deref().and_then(|p| matrix.by_prefix(p)))
}

fn wiki_conf(
    spec: &ArticleSpec,
    entry: Option<&SiteMatrixEntry>,
    config: &Config,
) -> Result<WikiConf> {
    let (baseurl, restbase) = match (entry, &config.api.php_api) {
        (Some(entry), _) => {
            let root = entry.url.trim_end_matches('/');
            (
                config
                    .api
                    .php_api
                    .clone()
                    .unwrap_or_else(|| format!("{}/w", root)),
                Some(format!("{}/api/rest_v1/", root)),
            )
        }
        (None, Some(php_api)) => (php_api.clone(), None),
        (None, None) => {
            let site = spec
                .prefix
                .as_deref()
                .or(spec.host.as_deref())
                .unwrap_or_default();
            return Err(BundlerError::Metabook(format!(
                "Prefix not found: {}",
                site
            )));
        }
    };

    let mut wiki = WikiConf::new(baseurl.clone());
    if let Some(size) = config.bundle.image_size {
        wiki.imagesize = size;
    }
    wiki.restbase1 = config.api.restbase_api.clone().or(restbase);
    wiki.parsoid = config.api.parsoid_api.clone();
    wiki.prefix = spec
        .prefix
        .clone()
        .or_else(|| entry.map(|e| e.dbname.clone()));
    wiki.domain = spec
        .host
        .clone()
        .or_else(|| entry.and_then(|e| extract_domain(&e.url)))
        .or_else(|| extract_domain(&baseurl));
    Ok(wiki)
}

/// Scheme and host the article URL is built on
fn article_root(wiki: &WikiConf) -> String {
    match &wiki.domain {
        Some(domain) => format!("https://{}", domain),
        None => wiki.baseurl.clone().unwrap_or_default(),
    }
}
