use crate::config::ApiVersion;
use crate::metabook::WikiConf;
use crate::url::{encode_title, wiki_domain};
use crate::{BundlerError, Result};
use url::Url;

/// A concrete parsed-content request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// The API flavor actually selected
    pub api: ApiVersion,
    pub url: String,
}

/// Picks the API flavor for `auto`
///
/// RESTBase v1 if the wiki declares one, then Parsoid v3 (domain plus
/// Parsoid URL), then Parsoid v1 (prefix plus Parsoid URL), else a
/// RESTBase URL derived from `baseurl`.
pub fn select_api(requested: ApiVersion, wiki: &WikiConf) -> ApiVersion {
    if requested != ApiVersion::Auto {
        return requested;
    }
    if wiki.restbase1.is_some() {
        ApiVersion::Restbase1
    } else if wiki.parsoid.is_some() && wiki_domain(wiki).is_some() {
        ApiVersion::Parsoid3
    } else if wiki.parsoid.is_some() && wiki.prefix.is_some() {
        ApiVersion::Parsoid1
    } else {
        ApiVersion::Restbase1
    }
}

/// Builds the URL fetching Parsoid HTML for `title`
///
/// # Errors
///
/// `Metabook` if the wiki lacks the fields the selected flavor needs.
pub fn parsoid_endpoint(
    requested: ApiVersion,
    wiki: &WikiConf,
    title: &str,
    revision: Option<u64>,
) -> Result<Endpoint> {
    let api = select_api(requested, wiki);
    let encoded = encode_title(title);
    let url = match api {
        ApiVersion::Restbase1 | ApiVersion::Auto => {
            let root = match (&wiki.restbase1, &wiki.baseurl) {
                (Some(restbase), _) => Url::parse(&with_slash(restbase))?,
                (None, Some(baseurl)) => Url::parse(baseurl)?.join("/api/rest_v1/")?,
                (None, None) => return Err(misconfigured("restbase1")),
            };
            let mut url = format!("{}{}", root.join("page/html/")?, encoded);
            if let Some(rev) = revision {
                url.push_str(&format!("/{}", rev));
            }
            url.push_str("?redirect=false");
            url
        }
        ApiVersion::Parsoid3 => {
            let (parsoid, domain) = parsoid_and_domain(wiki, "parsoid3")?;
            let root = parsoid.join(&format!("/{}/v3/", domain))?;
            let mut url = format!("{}{}", root.join("page/html/")?, encoded);
            if let Some(rev) = revision {
                url.push_str(&format!("/{}", rev));
            }
            url
        }
        ApiVersion::Parsoid2 => {
            let (parsoid, domain) = parsoid_and_domain(wiki, "parsoid2")?;
            let mut url = format!("{}{}", parsoid.join(&format!("/v2/{}/html/", domain))?, encoded);
            if let Some(rev) = revision {
                url.push_str(&format!("/{}", rev));
            }
            url
        }
        ApiVersion::Parsoid1 => {
            let parsoid = wiki
                .parsoid
                .as_deref()
                .ok_or_else(|| misconfigured("parsoid1"))?;
            let prefix = wiki.prefix.as_deref().ok_or_else(|| misconfigured("parsoid1"))?;
            let mut url = Url::parse(&with_slash(parsoid))?
                .join(&format!("{}/{}", prefix, encoded))?
                .to_string();
            if let Some(rev) = revision {
                url.push_str(&format!("?oldid={}", rev));
            }
            url
        }
    };
    Ok(Endpoint { api, url })
}

/// Action API entry point, e.g. `https://en.wikipedia.org/w/api.php`
pub fn action_api_url(wiki: &WikiConf) -> Result<String> {
    let baseurl = wiki
        .baseurl
        .as_deref()
        .ok_or_else(|| misconfigured("action API"))?;
    Ok(format!(
        "{}/api{}",
        baseurl.trim_end_matches('/'),
        wiki.script_extension
    ))
}

fn parsoid_and_domain(wiki: &WikiConf, api: &str) -> Result<(Url, String)> {
    let parsoid = wiki.parsoid.as_deref().ok_or_else(|| misconfigured(api))?;
    let domain = wiki_domain(wiki).ok_or_else(|| misconfigured(api))?;
    Ok((Url::parse(parsoid)?, domain))
}

fn with_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

fn misconfigured(api: &str) -> BundlerError {
    BundlerError::Metabook(format!("Bad {} configuration", api))
}
