//! Metabook content tree
//!
//! A metabook is the JSON descriptor of a collection: a rooted tree of
//! chapters (containers) and articles (fetchable leaves), plus one
//! `wikiconf` entry per participating source wiki. Articles refer to their
//! wiki by index into `wikis`.
//!
//! Unknown fields are preserved through `extra` so a metabook written back
//! into the bundle keeps everything the caller supplied.

mod articles;
mod repair;

pub use articles::{from_articles, ArticleSpec};
pub use repair::{repair, COMMONS_BASEURL, COMMONS_PREFIX};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default image width in pixels (300dpi * 4" wide image)
pub const DEFAULT_IMAGESIZE: u32 = 1200;

/// Root of the content tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metabook {
    #[serde(rename = "type", default = "default_collection_type")]
    pub kind: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub items: Vec<Item>,

    #[serde(default)]
    pub wikis: Vec<WikiConf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toc: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A node of the content tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Item {
    #[serde(rename = "article")]
    Article(Article),

    #[serde(rename = "chapter", alias = "collection")]
    Chapter(Chapter),
}

/// A fetchable leaf
///
/// `title` and `revision` are rewritten in place once the article has
/// been fetched (and after any redirect is followed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,

    #[serde(default)]
    pub wiki: usize,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "revision_id"
    )]
    pub revision: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,

    #[serde(
        rename = "isVersionOf",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_version_of: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A container node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub items: Vec<Item>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Endpoint configuration for one source wiki
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConf {
    #[serde(rename = "type", default = "default_wikiconf_type")]
    pub kind: String,

    /// Action API base, e.g. `https://en.wikipedia.org/w`
    #[serde(default)]
    pub baseurl: Option<String>,

    #[serde(default = "default_imagesize")]
    pub imagesize: u32,

    #[serde(default = "default_script_extension")]
    pub script_extension: String,

    #[serde(
        default,
        alias = "restbase",
        skip_serializing_if = "Option::is_none"
    )]
    pub restbase1: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsoid: Option<String>,

    /// Database name of the wiki (e.g. `enwiki`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, alias = "host", skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filerepos: Option<Vec<FileRepo>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A file repository a wiki draws media from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRepo {
    #[serde(rename = "type", default = "default_filerepo_type")]
    pub kind: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,

    #[serde(rename = "rootUrl", default, skip_serializing_if = "Option::is_none")]
    pub root_url: Option<String>,

    /// Present (with any value) on the wiki's own repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<Value>,

    #[serde(
        rename = "scriptDirUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub script_dir_url: Option<String>,

    /// Index into `Metabook::wikis` of the wiki serving this repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiki: Option<usize>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_collection_type() -> String {
    "collection".to_string()
}

fn default_wikiconf_type() -> String {
    "wikiconf".to_string()
}

fn default_filerepo_type() -> String {
    "filerepo".to_string()
}

fn default_imagesize() -> u32 {
    DEFAULT_IMAGESIZE
}

fn default_script_extension() -> String {
    ".php".to_string()
}

/// Revision ids arrive as numbers or strings and are written back as strings
mod revision_id {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.serialize_str(&id.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Num(n)) => Ok(Some(n)),
            Some(Raw::Str(s)) if s.trim().is_empty() => Ok(None),
            Some(Raw::Str(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid revision id '{}'", s))),
        }
    }
}

impl Default for Metabook {
    fn default() -> Self {
        let mut extra = Map::new();
        extra.insert("subtitle".to_string(), Value::String(String::new()));
        extra.insert("summary".to_string(), Value::String(String::new()));
        extra.insert("version".to_string(), Value::from(1));
        extra.insert(
            "licenses".to_string(),
            serde_json::json!([{
                "mw_rights_icon": "",
                "mw_rights_page": "",
                "mw_rights_text": "",
                "mw_rights_url": "",
                "name": "License",
                "type": "license"
            }]),
        );
        Self {
            kind: default_collection_type(),
            title: String::new(),
            items: Vec::new(),
            wikis: Vec::new(),
            lang: None,
            toc: None,
            extra,
        }
    }
}

impl WikiConf {
    /// Creates a descriptor for the given action API base
    pub fn new(baseurl: impl Into<String>) -> Self {
        Self {
            kind: default_wikiconf_type(),
            baseurl: Some(baseurl.into()),
            imagesize: DEFAULT_IMAGESIZE,
            script_extension: default_script_extension(),
            restbase1: None,
            parsoid: None,
            prefix: None,
            domain: None,
            filerepos: None,
            extra: Map::new(),
        }
    }
}

impl FileRepo {
    /// Returns true for the wiki's own (non-shared) repository
    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }
}

impl Metabook {
    /// Parses a metabook from JSON text
    pub fn from_json(text: &str) -> crate::Result<Self> {
        let metabook: Metabook = serde_json::from_str(text)?;
        metabook.check()?;
        Ok(metabook)
    }

    /// Checks that every article refers to a declared wiki
    pub fn check(&self) -> crate::Result<()> {
        if self.wikis.is_empty() {
            return Err(crate::BundlerError::Metabook(
                "metabook declares no wikis".to_string(),
            ));
        }
        for article in self.articles() {
            if article.wiki >= self.wikis.len() {
                return Err(crate::BundlerError::Metabook(format!(
                    "article '{}' refers to wiki {} but only {} declared",
                    article.title,
                    article.wiki,
                    self.wikis.len()
                )));
            }
        }
        Ok(())
    }

    /// Counts every node in the tree, including the root
    pub fn count_items(&self) -> usize {
        1 + count_items(&self.items)
    }

    /// Returns all articles in depth-first order
    pub fn articles(&self) -> Vec<&Article> {
        let mut out = Vec::new();
        collect_articles(&self.items, &mut out);
        out
    }
}

fn count_items(items: &[Item]) -> usize {
    items
        .iter()
        .map(|item| match item {
            Item::Article(_) => 1,
            Item::Chapter(chapter) => 1 + count_items(&chapter.items),
        })
        .sum()
}

fn collect_articles<'a>(items: &'a [Item], out: &mut Vec<&'a Article>) {
    for item in items {
        match item {
            Item::Article(article) => out.push(article),
            Item::Chapter(chapter) => collect_articles(&chapter.items, out),
        }
    }
}

/// Walks the tree depth-first, in order, handing out mutable article
/// references and calling `on_chapter` for each container as it is entered.
pub fn walk_mut<'a>(
    items: &'a mut [Item],
    on_chapter: &mut dyn FnMut(&Chapter),
    out: &mut Vec<&'a mut Article>,
) {
    for item in items.iter_mut() {
        match item {
            Item::Article(article) => out.push(article),
            Item::Chapter(chapter) => {
                on_chapter(chapter);
                walk_mut(&mut chapter.items, on_chapter, out);
            }
        }
    }
}
