//! End-to-end bundle tests against an in-process content API

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiki_bundler::api::{
    ContentApi, ImageInfo, MediaRef, ParsedPage, RevisionRecord, Site, SiteInfo, SiteMatrixEntry,
};
use wiki_bundler::bundler::{Bundler, StatusEvent};
use wiki_bundler::config::Config;
use wiki_bundler::metabook::{FileRepo, Metabook, WikiConf};
use wiki_bundler::state::MediaState;
use wiki_bundler::storage::{open_store, AUTHORS_DB, IMAGEINFO_DB, PARSOID_DB, REVISIONS_DB};
use wiki_bundler::{BundlerError, Result};

const IMAGE_RESOURCE: &str = "https://wiki.example.org/wiki/File:Foo.jpg";

#[derive(Clone)]
struct MockPage {
    revision: u64,
    text: String,
    redirect: Option<String>,
    media: Vec<MediaRef>,
}

/// Content API serving a fixed set of pages and one image
#[derive(Default)]
struct MockApi {
    pages: HashMap<String, MockPage>,
    images: HashMap<String, ImageInfo>,
    parsed_calls: AtomicUsize,
    download_calls: AtomicUsize,
    revision_calls: AtomicUsize,
    parsed_titles: Mutex<Vec<String>>,
    /// File description pages exist only on commonswiki
    files_on_commons: bool,
}

impl MockApi {
    fn new() -> Self {
        Self::default()
    }

    fn page(mut self, title: &str, revision: u64) -> Self {
        self.pages.insert(
            title.to_string(),
            MockPage {
                revision,
                text: format!("<html><body><p>{}</p></body></html>", title),
                redirect: None,
                media: Vec::new(),
            },
        );
        self
    }

    fn redirect(mut self, title: &str, revision: u64, target: &str) -> Self {
        self = self.page(title, revision);
        if let Some(page) = self.pages.get_mut(title) {
            page.redirect = Some(target.to_string());
        }
        self
    }

    fn text(mut self, title: &str, text: String) -> Self {
        if let Some(page) = self.pages.get_mut(title) {
            page.text = text;
        }
        self
    }

    fn with_image(mut self, title: &str, size: u64) -> Self {
        if let Some(page) = self.pages.get_mut(title) {
            page.media.push(MediaRef {
                wiki: 0,
                short: "File:Foo.jpg".to_string(),
                resource: IMAGE_RESOURCE.to_string(),
                src: "https://upload.example.org/thumb/Foo.jpg/1200px-Foo.jpg".to_string(),
                imagesize: 1200,
            });
        }
        self.images.insert(
            IMAGE_RESOURCE.to_string(),
            ImageInfo {
                height: Some(800),
                width: Some(1200),
                url: Some("https://upload.example.org/Foo.jpg".to_string()),
                thumburl: Some("https://upload.example.org/thumb/Foo.jpg/1200px-Foo.jpg".to_string()),
                resource: IMAGE_RESOURCE.to_string(),
                short: "File:Foo.jpg".to_string(),
                mime: Some("image/jpeg".to_string()),
                mediatype: Some("BITMAP".to_string()),
                size: Some(size),
                repository: Some("local".to_string()),
                artist: Some("Jane".to_string()),
                licenseshortname: Some("CC BY-SA 4.0".to_string()),
                ..ImageInfo::default()
            },
        );
        self
    }

    fn files_on_commons(mut self) -> Self {
        self.files_on_commons = true;
        self
    }

    fn parsed_calls(&self) -> usize {
        self.parsed_calls.load(Ordering::SeqCst)
    }

    fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentApi for MockApi {
    async fn site_info(&self, _wiki: &WikiConf) -> Result<SiteInfo> {
        Ok(SiteInfo {
            wikiid: Some("testwiki".to_string()),
            lang: Some("en".to_string()),
            server: Some("//wiki.example.org".to_string()),
            ..SiteInfo::default()
        })
    }

    async fn file_repos(&self, _wiki: &WikiConf) -> Result<Vec<FileRepo>> {
        Ok(serde_json::from_value(json!([{"name": "local", "local": ""}]))?)
    }

    async fn site_matrix(&self) -> Result<Vec<SiteMatrixEntry>> {
        Ok(Vec::new())
    }

    async fn fetch_parsed(
        &self,
        site: &Site,
        title: &str,
        _revision: Option<u64>,
    ) -> Result<ParsedPage> {
        self.parsed_calls.fetch_add(1, Ordering::SeqCst);
        self.parsed_titles.lock().unwrap().push(title.to_string());
        tokio::task::yield_now().await;

        let page = self
            .pages
            .get(title)
            .ok_or_else(|| BundlerError::NotFound(title.to_string()))?;
        Ok(ParsedPage {
            wiki: site.index,
            title: title.to_string(),
            text: page.text.clone(),
            about: Some(format!(
                "https://wiki.example.org/wiki/Special:Redirect/revision/{}",
                page.revision
            )),
            revision: Some(page.revision),
            is_version_of: None,
            redirect: page.redirect.clone(),
            media: page.media.clone(),
        })
    }

    async fn fetch_rendered_html(&self, _site: &Site, title: &str, revision: u64) -> Result<Value> {
        Ok(json!({"title": title, "revid": revision, "text": {"*": "<p>php</p>"}}))
    }

    async fn fetch_module_data(&self, _site: &Site, _title: &str, _revision: u64) -> Result<Value> {
        Ok(json!({"modules": ["ext.cite"], "modulescripts": [], "modulestyles": [], "jsconfigvars": {}}))
    }

    async fn fetch_authorship(&self, _site: &Site, _title: &str, _revision: u64) -> Result<Value> {
        Ok(json!({"authors": ["Alice", "Bob"], "anons": 2}))
    }

    async fn fetch_media_metadata(&self, _site: &Site, media: &MediaRef) -> Result<ImageInfo> {
        Ok(self
            .images
            .get(&media.resource)
            .cloned()
            .unwrap_or_else(|| ImageInfo::missing(media)))
    }

    async fn fetch_media_bytes(&self, _url: &str, dest: &Path) -> Result<u64> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = vec![b'x'; 1000];
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn fetch_raw_revision(
        &self,
        site: &Site,
        title: &str,
        revision: Option<u64>,
    ) -> Result<Option<RevisionRecord>> {
        self.revision_calls.fetch_add(1, Ordering::SeqCst);
        if self.files_on_commons && title.starts_with("File:") && site.prefix() != "commonswiki" {
            return Err(BundlerError::NotFound(title.to_string()));
        }
        let revid = match (self.pages.get(title), revision) {
            (_, Some(revid)) => revid,
            (Some(page), None) => page.revision,
            (None, None) if title.starts_with("File:") => 900,
            (None, None) => return Ok(None),
        };
        Ok(Some(RevisionRecord {
            pageid: Some(1),
            ns: if title.starts_with("File:") { 6 } else { 0 },
            title: title.to_string(),
            revid,
            wiki: 0,
            text: format!("'''{}''' wikitext", title),
        }))
    }
}

fn metabook(titles: &[&str]) -> Metabook {
    let items: Vec<Value> = titles
        .iter()
        .map(|title| json!({"type": "article", "title": title}))
        .collect();
    let value = json!({
        "type": "collection",
        "title": "Test collection",
        "items": items,
        "wikis": [{"type": "wikiconf", "baseurl": "https://wiki.example.org/w", "prefix": "testwiki"}]
    });
    Metabook::from_json(&value.to_string()).unwrap()
}

fn nozip_config() -> Config {
    let mut config = Config::default();
    config.bundle.nozip = true;
    config
}

fn stored(dir: &Path, db: &str, key: &str) -> Option<String> {
    let store = open_store(&dir.join(db)).unwrap();
    let value = store.get(key).unwrap();
    store.close().unwrap();
    value
}

fn written_metabook(dir: &Path) -> Value {
    let text = std::fs::read_to_string(dir.join("metabook.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_single_article_layout() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(MockApi::new().page("Taoism", 123));

    let summary = Bundler::new(nozip_config(), api.clone())
        .run(metabook(&["Taoism"]), &output)
        .await
        .unwrap();

    assert_eq!(summary.articles, 1);
    assert!(!summary.archived);
    assert_eq!(summary.output, output);

    for name in [
        "parsoid.db",
        "authors.db",
        "imageinfo.db",
        "metabook.json",
        "attribution.html",
    ] {
        assert!(output.join(name).is_file(), "missing {}", name);
    }
    assert!(output.join("images").is_dir());
    for name in ["html.db", "revisions.db", "revisions-1.txt", "nfo.json", "attribution.wt"] {
        assert!(!output.join(name).exists(), "unexpected {}", name);
    }

    assert_eq!(api.parsed_calls(), 1);
    let text = stored(&output, PARSOID_DB, "123").unwrap();
    assert!(text.contains("<p>Taoism</p>"));

    let authors: Value = serde_json::from_str(&stored(&output, AUTHORS_DB, "Taoism").unwrap()).unwrap();
    assert_eq!(authors["anons"], 2);

    let written = written_metabook(&output);
    assert_eq!(written["items"][0]["revision"], "123");
    assert_eq!(written["lang"], "en");
    assert_eq!(written["wikis"][0]["filerepos"][0]["name"], "local");

    let attribution = std::fs::read_to_string(output.join("attribution.html")).unwrap();
    assert!(attribution.contains("Taoism"));
    assert!(attribution.contains("Alice"));
}

#[tokio::test]
async fn test_one_fetch_per_article_without_redirects() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(
        MockApi::new()
            .page("A", 1)
            .page("B", 2)
            .redirect("C", 3, "A")
            .page("D", 4),
    );

    let value = json!({
        "type": "collection",
        "title": "Nested",
        "items": [
            {"type": "chapter", "title": "One", "items": [
                {"type": "article", "title": "A"},
                {"type": "article", "title": "B"}
            ]},
            {"type": "chapter", "title": "Two", "items": [
                {"type": "article", "title": "C"}
            ]},
            {"type": "article", "title": "D"}
        ],
        "wikis": [{"baseurl": "https://wiki.example.org/w"}]
    });
    let metabook = Metabook::from_json(&value.to_string()).unwrap();

    let summary = Bundler::new(nozip_config(), api.clone())
        .run(metabook, &output)
        .await
        .unwrap();

    assert_eq!(api.parsed_calls(), 4);
    assert_eq!(summary.articles, 4);

    // The redirect page itself is stored when redirects are not followed
    let written = written_metabook(&output);
    assert_eq!(written["items"][1]["items"][0]["title"], "C");
    assert_eq!(written["wikis"][0]["prefix"], "testwiki");
}

#[tokio::test]
async fn test_redirect_is_followed() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(MockApi::new().redirect("Old", 1, "X").page("X", 2));

    let mut config = nozip_config();
    config.bundle.follow_redirects = true;
    config.bundle.max_redirects = 5;

    Bundler::new(config, api.clone())
        .run(metabook(&["Old"]), &output)
        .await
        .unwrap();

    assert_eq!(api.parsed_calls(), 2);
    let written = written_metabook(&output);
    assert_eq!(written["items"][0]["title"], "X");
    assert_eq!(written["items"][0]["revision"], "2");
    assert!(stored(&output, PARSOID_DB, "2").is_some());
    assert!(stored(&output, PARSOID_DB, "1").is_none());
    assert!(stored(&output, AUTHORS_DB, "X").is_some());
}

#[tokio::test]
async fn test_redirect_chains_longer_than_guard_limit() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(
        MockApi::new()
            .redirect("A1", 1, "A2")
            .redirect("A2", 2, "A3")
            .redirect("A3", 3, "A4")
            .page("A4", 4)
            .redirect("B1", 5, "B2")
            .redirect("B2", 6, "B3")
            .redirect("B3", 7, "B4")
            .page("B4", 8),
    );

    let mut config = nozip_config();
    config.bundle.follow_redirects = true;
    config.bundle.max_redirects = 5;
    config.limits.parsoid = 1;

    let bundler = Bundler::new(config, api.clone());
    let run = bundler.run(metabook(&["A1", "B1"]), &output);
    tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("redirect chains deadlocked")
        .unwrap();

    assert_eq!(api.parsed_calls(), 8);
    let written = written_metabook(&output);
    assert_eq!(written["items"][0]["title"], "A4");
    assert_eq!(written["items"][1]["title"], "B4");
}

#[tokio::test]
async fn test_save_redirects_stores_both_pages() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(MockApi::new().redirect("Old", 1, "X").page("X", 2));

    let mut config = nozip_config();
    config.bundle.follow_redirects = true;
    config.bundle.save_redirects = true;

    Bundler::new(config, api.clone())
        .run(metabook(&["Old"]), &output)
        .await
        .unwrap();

    assert_eq!(api.parsed_calls(), 2);
    assert!(stored(&output, PARSOID_DB, "1").is_some());
    assert!(stored(&output, PARSOID_DB, "2").is_some());
    assert!(stored(&output, AUTHORS_DB, "Old").is_some());
    assert_eq!(written_metabook(&output)["items"][0]["title"], "X");
}

#[tokio::test]
async fn test_size_limit_aborts_and_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(MockApi::new().page("Big", 1).text("Big", "x".repeat(500)));

    let mut config = nozip_config();
    config.bundle.bundle_size_limit = 100;

    let err = Bundler::new(config, api)
        .run(metabook(&["Big"]), &output)
        .await
        .unwrap_err();

    assert!(matches!(err, BundlerError::SizeLimitExceeded { .. }));
    assert_eq!(err.exit_code(), 2);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_image_ceiling_skips_download() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(MockApi::new().page("Taoism", 1).with_image("Taoism", 1000));

    let summary = Bundler::new(nozip_config(), api.clone())
        .with_size_limits(None, Some(0))
        .run(metabook(&["Taoism"]), &output)
        .await
        .unwrap();

    assert_eq!(api.download_calls(), 0);
    assert_eq!(summary.media_in(MediaState::TooLarge), 1);

    let record: Value =
        serde_json::from_str(&stored(&output, IMAGEINFO_DB, IMAGE_RESOURCE).unwrap()).unwrap();
    assert_eq!(record["short"], "File:Foo.jpg");
    assert_eq!(record["mediatype"], "BITMAP");
    assert!(record.get("filename").is_none());

    let images: Vec<_> = std::fs::read_dir(output.join("images")).unwrap().collect();
    assert!(images.is_empty());
}

#[tokio::test]
async fn test_image_larger_than_declared_is_dropped() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    // Declares 500 bytes, downloads 1000
    let api = Arc::new(MockApi::new().page("Taoism", 1).with_image("Taoism", 500));

    let events: Arc<Mutex<Vec<StatusEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let summary = Bundler::new(nozip_config(), api.clone())
        .with_size_limits(None, Some(600))
        .with_status(Arc::new(move |event: &StatusEvent| {
            sink_events.lock().unwrap().push(event.clone());
        }))
        .run(metabook(&["Taoism"]), &output)
        .await
        .unwrap();

    assert_eq!(api.download_calls(), 1);
    assert_eq!(summary.media_in(MediaState::TooLarge), 1);
    let images: Vec<_> = std::fs::read_dir(output.join("images")).unwrap().collect();
    assert!(images.is_empty());

    // Two units per reference: metadata and download
    let items: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.message == "Fetching media")
        .filter_map(|e| e.item.clone())
        .filter(|item| item.starts_with("File:Foo.jpg"))
        .collect();
    assert_eq!(items, vec!["File:Foo.jpg [metadata]", "File:Foo.jpg [downloading]"]);
}

#[tokio::test]
async fn test_image_is_downloaded() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(MockApi::new().page("Taoism", 1).with_image("Taoism", 900));

    let summary = Bundler::new(nozip_config(), api.clone())
        .run(metabook(&["Taoism"]), &output)
        .await
        .unwrap();

    assert_eq!(api.download_calls(), 1);
    assert_eq!(summary.media_in(MediaState::Downloaded), 1);

    let record: Value =
        serde_json::from_str(&stored(&output, IMAGEINFO_DB, IMAGE_RESOURCE).unwrap()).unwrap();
    let filename = record["filename"].as_str().unwrap();
    assert!(filename.starts_with("images/"));
    assert!(filename.ends_with(".jpg"));
    assert_eq!(record["size"], 1000);
    assert_eq!(std::fs::metadata(output.join(filename)).unwrap().len(), 1000);

    let attribution = std::fs::read_to_string(output.join("attribution.html")).unwrap();
    assert!(attribution.contains("CC BY-SA 4.0"));
}

#[tokio::test]
async fn test_failed_article_fails_run() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(MockApi::new().page("Good", 1));

    let err = Bundler::new(nozip_config(), api.clone())
        .run(metabook(&["Good", "Missing"]), &output)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.exit_code(), 1);
    assert_eq!(api.parsed_calls(), 2);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_existing_output_is_left_alone() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    std::fs::create_dir(&output).unwrap();
    std::fs::write(output.join("keep.txt"), "mine").unwrap();
    let api = Arc::new(MockApi::new().page("Taoism", 1));

    let err = Bundler::new(nozip_config(), api.clone())
        .run(metabook(&["Taoism"]), &output)
        .await
        .unwrap_err();

    assert!(matches!(err, BundlerError::Io(_)));
    assert_eq!(api.parsed_calls(), 0);
    assert_eq!(std::fs::read_to_string(output.join("keep.txt")).unwrap(), "mine");
}

#[tokio::test]
async fn test_compat_archive() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle.zip");
    let api = Arc::new(MockApi::new().page("Taoism", 7).with_image("Taoism", 900));

    let mut config = Config::default();
    config.bundle.compat = true;
    config.bundle.fetch_modules = true;
    config.bundle.store_db_uncompressed = true;

    let summary = Bundler::new(config, api.clone())
        .run(metabook(&["Taoism"]), &output)
        .await
        .unwrap();

    assert!(summary.archived);
    assert_eq!(summary.revisions, 2);
    assert!(output.is_file());
    assert!(!tmp.path().join("bundle.zip.tmp").exists());
    assert_eq!(std::fs::metadata(&output).unwrap().len(), summary.output_bytes);

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&output).unwrap()).unwrap();
    let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
    for name in [
        "parsoid.db",
        "html.db",
        "modules.db",
        "revisions.db",
        "revisions-1.txt",
        "nfo.json",
        "attribution.html",
        "attribution.wt",
        "metabook.json",
    ] {
        assert!(names.iter().any(|n| n == name), "missing {}", name);
    }

    let db = archive.by_name("parsoid.db").unwrap();
    assert_eq!(db.compression(), zip::CompressionMethod::Stored);
    drop(db);

    let mut revisions = String::new();
    archive
        .by_name("revisions-1.txt")
        .unwrap()
        .read_to_string(&mut revisions)
        .unwrap();
    assert_eq!(revisions.matches("\n\u{c} --page-- ").count(), 2);
    assert!(revisions.contains("'''Taoism''' wikitext"));
    assert!(revisions.contains("\"title\":\"File:Foo.jpg\""));

    let mut nfo = String::new();
    archive
        .by_name("nfo.json")
        .unwrap()
        .read_to_string(&mut nfo)
        .unwrap();
    let nfo: Value = serde_json::from_str(&nfo).unwrap();
    assert_eq!(nfo["base_url"], "https://wiki.example.org/w");
}

#[tokio::test]
async fn test_file_page_falls_back_to_commons() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(
        MockApi::new()
            .page("Taoism", 7)
            .with_image("Taoism", 900)
            .files_on_commons(),
    );

    let value = json!({
        "type": "collection",
        "title": "Test collection",
        "items": [{"type": "article", "title": "Taoism"}],
        "wikis": [
            {"type": "wikiconf", "baseurl": "https://wiki.example.org/w", "prefix": "testwiki"},
            {"type": "wikiconf", "baseurl": "https://commons.wikimedia.org/w", "prefix": "commonswiki"}
        ]
    });
    let metabook = Metabook::from_json(&value.to_string()).unwrap();

    let mut config = nozip_config();
    config.bundle.compat = true;

    let summary = Bundler::new(config, api.clone())
        .run(metabook, &output)
        .await
        .unwrap();

    assert_eq!(summary.revisions, 2);
    // article on its own wiki, file page on the wiki, then on commons
    assert_eq!(api.revision_calls.load(Ordering::SeqCst), 3);
    assert!(stored(&output, REVISIONS_DB, "7").is_some());
    assert!(stored(&output, REVISIONS_DB, "900").is_none());

    let record: Value =
        serde_json::from_str(&stored(&output, REVISIONS_DB, "1|900").unwrap()).unwrap();
    assert_eq!(record["title"], "File:Foo.jpg");
    assert_eq!(record["wiki"], 1);

    let revisions = std::fs::read_to_string(output.join("revisions-1.txt")).unwrap();
    assert!(revisions.contains("'''File:Foo.jpg''' wikitext"));
}

#[tokio::test]
async fn test_status_progress_is_monotonic() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("bundle");
    let api = Arc::new(
        MockApi::new()
            .page("A", 1)
            .page("B", 2)
            .with_image("B", 500),
    );

    let events: Arc<Mutex<Vec<StatusEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    Bundler::new(nozip_config(), api)
        .with_status(Arc::new(move |event: &StatusEvent| {
            sink_events.lock().unwrap().push(event.clone());
        }))
        .run(metabook(&["A", "B"]), &output)
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(pair[1].fraction >= pair[0].fraction);
    }
    let last = events.last().unwrap();
    assert_eq!(last.fraction, 1.0);
    assert!(last.message.starts_with("Done"));
    assert!(events.iter().any(|e| e.message == "Fetching media"));
}
