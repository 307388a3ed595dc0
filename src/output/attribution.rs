//! Attribution document generation
//!
//! Lists every article with its source and contributors, and every media
//! file with its artist, credit and license. Read from the authors and
//! media stores after they are complete.

use crate::api::ImageInfo;
use crate::metabook::{Article, Metabook};
use crate::storage::KvStore;
use crate::url::encode_title;
use crate::Result;
use scraper::Html;
use serde_json::Value;

/// Rendered attribution documents
#[derive(Debug, Clone)]
pub struct Attribution {
    pub html: String,
    pub wikitext: String,
}

struct TextCredit {
    title: String,
    url: String,
    authors: Vec<String>,
    anons: u64,
}

struct MediaCredit {
    short: String,
    url: Option<String>,
    artist: Option<String>,
    credit: Option<String>,
    license: Option<String>,
}

/// Builds the attribution documents for a finished collection
pub fn generate(
    metabook: &Metabook,
    authors: &dyn KvStore,
    imageinfo: &dyn KvStore,
) -> Result<Attribution> {
    let mut texts = Vec::new();
    for article in metabook.articles() {
        let key = if article.wiki == 0 {
            article.title.clone()
        } else {
            format!("{}|{}", article.wiki, article.title)
        };
        let meta: Value = match authors.get(&key)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Value::Null,
        };
        texts.push(TextCredit {
            title: article.title.clone(),
            url: article_url(metabook, article),
            authors: meta["authors"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|a| a.as_str().map(|s| s.to_string()))
                .collect(),
            anons: meta["anons"].as_u64().unwrap_or(0),
        });
    }

    let mut media = Vec::new();
    for (_, raw) in imageinfo.entries()? {
        let info: ImageInfo = serde_json::from_str(&raw)?;
        if info.is_missing() {
            continue;
        }
        media.push(MediaCredit {
            short: info.short,
            url: info.descriptionurl,
            artist: info.artist,
            credit: info.credit,
            license: info.licenseshortname,
        });
    }

    Ok(Attribution {
        html: render_html(metabook, &texts, &media),
        wikitext: render_wikitext(&texts, &media),
    })
}

fn article_url(metabook: &Metabook, article: &Article) -> String {
    if let Some(url) = article.extra.get("url").and_then(|u| u.as_str()) {
        return url.to_string();
    }
    let base = metabook
        .wikis
        .get(article.wiki)
        .and_then(|w| w.baseurl.as_deref())
        .unwrap_or_default();
    let mut url = format!("{}/index.php?title={}", base, encode_title(&article.title));
    if let Some(rev) = article.revision {
        url.push_str(&format!("&oldid={}", rev));
    }
    url
}

fn contributors(text: &TextCredit) -> String {
    let mut names = text.authors.clone();
    if text.anons > 0 {
        names.push(format!("{} anonymous", text.anons));
    }
    names.join(", ")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Visible text of a wiki-rendered HTML fragment, escaped for output
fn plain_text(fragment: &str) -> String {
    let text: String = Html::parse_fragment(fragment)
        .root_element()
        .text()
        .collect();
    escape_html(&text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn render_html(metabook: &Metabook, texts: &[TextCredit], media: &[MediaCredit]) -> String {
    let lang = metabook.lang.as_deref().unwrap_or("en");
    let mut html = String::new();
    html.push_str(&format!(
        "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>Attribution</title>\n</head>\n<body>\n",
        escape_html(lang)
    ));
    html.push_str("<h1>Text and image sources, contributors, and licenses</h1>\n");

    html.push_str("<h2>Text</h2>\n<ul>\n");
    for text in texts {
        html.push_str(&format!(
            "<li><a href=\"{url}\">{title}</a> <i>Source:</i> {url} <i>Contributors:</i> {who}</li>\n",
            url = escape_html(&text.url),
            title = escape_html(&text.title),
            who = escape_html(&contributors(text)),
        ));
    }
    html.push_str("</ul>\n");

    html.push_str("<h2>Images</h2>\n<ul>\n");
    for m in media {
        html.push_str("<li>");
        match &m.url {
            Some(url) => html.push_str(&format!(
                "<a href=\"{}\">{}</a>",
                escape_html(url),
                escape_html(&m.short)
            )),
            None => html.push_str(&escape_html(&m.short)),
        }
        // Artist and credit arrive as wiki-rendered HTML
        if let Some(artist) = &m.artist {
            html.push_str(&format!(" <i>Artist:</i> {}", plain_text(artist)));
        }
        if let Some(credit) = &m.credit {
            html.push_str(&format!(" <i>Credit:</i> {}", plain_text(credit)));
        }
        if let Some(license) = &m.license {
            html.push_str(&format!(" <i>License:</i> {}", escape_html(license)));
        }
        html.push_str("</li>\n");
    }
    html.push_str("</ul>\n</body>\n</html>\n");
    html
}

fn render_wikitext(texts: &[TextCredit], media: &[MediaCredit]) -> String {
    let mut wt = String::from("== Text ==\n");
    for text in texts {
        wt.push_str(&format!(
            "* [{} {}] ''Contributors:'' {}\n",
            text.url,
            text.title,
            contributors(text)
        ));
    }
    wt.push_str("\n== Images ==\n");
    for m in media {
        wt.push_str(&format!("* [[:{}]]", m.short));
        if let Some(license) = &m.license {
            wt.push_str(&format!(" ''License:'' {}", license));
        }
        wt.push('\n');
    }
    wt
}
