use crate::{BundlerError, Result};
use url::Url;

/// A wiki's article path pattern, e.g. `/wiki/$1`
///
/// Used to turn resolved link paths back into page titles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticlePath {
    prefix: String,
    suffix: String,
}

impl ArticlePath {
    /// Splits the pattern around its `$1` placeholder
    ///
    /// A pattern without a placeholder is treated as a pure prefix.
    pub fn new(pattern: &str) -> Self {
        match pattern.split_once("$1") {
            Some((prefix, suffix)) => Self {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            },
            None => Self {
                prefix: pattern.to_string(),
                suffix: String::new(),
            },
        }
    }

    /// Prefix preceding the title
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Extracts the percent-decoded title from a URL path
    pub fn title_of(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        let encoded = rest.strip_suffix(self.suffix.as_str())?;
        urlencoding::decode(encoded).ok().map(|t| t.into_owned())
    }
}

impl Default for ArticlePath {
    fn default() -> Self {
        Self::new("/wiki/$1")
    }
}

/// Resolves an href against `base` and maps it to a page title
///
/// # Errors
///
/// `BadResponse` when the href cannot be resolved or its path does not
/// match the article path.
pub fn resolve_title(base: &Url, href: &str, articlepath: &ArticlePath) -> Result<String> {
    let bad = || BundlerError::BadResponse {
        url: base.to_string(),
        message: format!("Bad article title: {}", href),
    };
    let resolved = base.join(href).map_err(|_| bad())?;
    articlepath.title_of(resolved.path()).ok_or_else(bad)
}

/// Canonical `File:` title for a media page title in any namespace alias
///
/// # Examples
///
/// ```
/// use wiki_bundler::url::canonical_file_title;
///
/// assert_eq!(canonical_file_title("Datei:Foo.jpg"), "File:Foo.jpg");
/// assert_eq!(canonical_file_title("Foo.jpg"), "File:Foo.jpg");
/// ```
pub fn canonical_file_title(short: &str) -> String {
    let name = short.split_once(':').map_or(short, |(_, rest)| rest);
    format!("File:{}", name)
}

/// Percent-encodes a title for use as a single path segment
pub fn encode_title(title: &str) -> String {
    urlencoding::encode(title).into_owned()
}
