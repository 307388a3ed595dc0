//! Site Resolver
//!
//! Fills in whatever a caller-supplied metabook leaves out before the
//! pipeline starts: endpoints, wiki prefixes, file repositories (linking
//! each to the wiki that serves it), image size, table of contents and
//! language.

use crate::api::{absolute, ContentApi, SiteInfoCache};
use crate::bundler::StatusReporter;
use crate::config::{Config, TocSetting};
use crate::metabook::{FileRepo, Metabook, WikiConf};
use crate::Result;

/// Action API base of Wikimedia Commons
pub const COMMONS_BASEURL: &str = "https://commons.wikimedia.org/w";

/// Database prefix of Wikimedia Commons
pub const COMMONS_PREFIX: &str = "commonswiki";

const COMMONS_RESTBASE: &str = "https://commons.wikimedia.org/api/rest_v1/";

/// Repairs `metabook` in place
///
/// Reports one unit per wiki, plus one for the Commons step.
pub async fn repair(
    metabook: &mut Metabook,
    api: &dyn ContentApi,
    siteinfo: &SiteInfoCache,
    config: &Config,
    status: &StatusReporter,
) -> Result<()> {
    match config.bundle.toc {
        TocSetting::Auto => {}
        TocSetting::Yes => metabook.toc = Some(true),
        TocSetting::No => metabook.toc = Some(false),
    }

    let mut needs_commons = false;
    for index in 0..metabook.wikis.len() {
        fill_endpoints(&mut metabook.wikis[index], config);

        if metabook.wikis[index].prefix.is_none() {
            let info = siteinfo.get(api, &metabook.wikis[index]).await?;
            metabook.wikis[index].prefix = info.wikiid;
        }

        if metabook.wikis[index].filerepos.is_none() {
            let repos = api.file_repos(&metabook.wikis[index]).await?;
            let linked = link_repos(repos, index, &metabook.wikis, &mut needs_commons);
            metabook.wikis[index].filerepos = Some(linked);
        }

        let label = metabook.wikis[index].baseurl.clone().unwrap_or_default();
        status.report(&label);
    }

    if needs_commons {
        tracing::info!("Adding {} for shared media", COMMONS_BASEURL);
        let index = metabook.wikis.len();
        metabook.wikis.push(commons_conf(config));

        let repos = api.file_repos(&metabook.wikis[index]).await?;
        let mut ignored = false;
        let linked = link_repos(repos, index, &metabook.wikis, &mut ignored);
        metabook.wikis[index].filerepos = Some(linked);
        status.report(COMMONS_BASEURL);
    } else {
        status.report("");
    }

    if let Some(size) = config.bundle.image_size {
        for wiki in &mut metabook.wikis {
            wiki.imagesize = size;
        }
    }

    if let Some(lang) = &config.bundle.lang {
        metabook.lang = Some(lang.clone());
    } else if metabook.lang.is_none() {
        let first = metabook.articles().first().map(|a| a.wiki).unwrap_or(0);
        let lang = match metabook.wikis.get(first) {
            Some(wiki) => siteinfo.get(api, wiki).await?.lang,
            None => None,
        };
        metabook.lang = Some(lang.unwrap_or_else(|| "en".to_string()));
    }

    Ok(())
}

/// Applies configured endpoint defaults to a wiki that lacks them
fn fill_endpoints(wiki: &mut WikiConf, config: &Config) {
    if wiki.restbase1.is_none() {
        wiki.restbase1 = config.api.restbase_api.clone();
    }
    if wiki.parsoid.is_none() {
        wiki.parsoid = config.api.parsoid_api.clone();
    }
}

/// Points each repository at the wiki serving it
///
/// A foreign repository not served by any wiki in the collection is
/// pointed at the index Commons will take once appended.
fn link_repos(
    repos: Vec<FileRepo>,
    index: usize,
    wikis: &[WikiConf],
    needs_commons: &mut bool,
) -> Vec<FileRepo> {
    repos
        .into_iter()
        .map(|mut repo| {
            if repo.is_local() {
                repo.wiki = Some(index);
                return repo;
            }
            let script_dir = repo
                .script_dir_url
                .as_deref()
                .map(absolute)
                .unwrap_or_else(|| COMMONS_BASEURL.to_string());
            let served_by = wikis.iter().position(|w| {
                w.baseurl
                    .as_deref()
                    .map(|b| same_base(b, &script_dir))
                    .unwrap_or(false)
            });
            repo.wiki = match served_by {
                Some(i) => Some(i),
                None => {
                    *needs_commons = true;
                    Some(wikis.len())
                }
            };
            repo
        })
        .collect()
}

fn same_base(a: &str, b: &str) -> bool {
    absolute(a).trim_end_matches('/') == absolute(b).trim_end_matches('/')
}

fn commons_conf(config: &Config) -> WikiConf {
    let mut wiki = WikiConf::new(COMMONS_BASEURL);
    wiki.restbase1 = Some(COMMONS_RESTBASE.to_string());
    wiki.parsoid = config.api.parsoid_api.clone();
    wiki.prefix = Some(COMMONS_PREFIX.to_string());
    wiki.domain = Some("commons.wikimedia.org".to_string());
    if let Some(size) = config.bundle.image_size {
        wiki.imagesize = size;
    }
    wiki
}
