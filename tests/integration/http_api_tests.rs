//! Integration tests for the HTTP content client
//!
//! These tests use wiremock to stand in for a wiki's action API and
//! RESTBase endpoints.

use wiki_bundler::api::{ContentApi, HttpApi, MediaRef, Site, SiteInfo};
use wiki_bundler::metabook::WikiConf;
use wiki_bundler::{BundlerError, Config};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a client with fast retries
fn create_test_api() -> HttpApi {
    let mut config = Config::default();
    config.http.max_retries = 2;
    config.http.retry_delay_ms = 1;
    HttpApi::new(&config).expect("Failed to build client")
}

/// Creates a site whose action API and RESTBase live on the mock server
fn create_test_site(server: &MockServer) -> Site {
    let mut conf = WikiConf::new(format!("{}/w", server.uri()));
    conf.restbase1 = Some(format!("{}/api/rest_v1", server.uri()));
    Site::new(0, conf, SiteInfo::default())
}

#[tokio::test]
async fn test_site_info_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("meta", "siteinfo"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": {
                "general": {
                    "articlepath": "/wiki/$1",
                    "wikiid": "testwiki",
                    "lang": "en",
                    "server": "//wiki.example.org",
                    "sitename": "Test Wiki"
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let info = create_test_api().site_info(&site.conf).await.unwrap();

    assert_eq!(info.wikiid.as_deref(), Some("testwiki"));
    assert_eq!(info.server.as_deref(), Some("//wiki.example.org"));
    assert_eq!(info.articlepath, "/wiki/$1");
}

#[tokio::test]
async fn test_file_repos_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("meta", "filerepoinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": {
                "repos": [
                    { "name": "local", "displayname": "Test Wiki", "local": "" },
                    { "name": "shared", "displayname": "Commons",
                      "scriptDirUrl": "https://commons.wikimedia.org/w" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let repos = create_test_api().file_repos(&site.conf).await.unwrap();

    assert_eq!(repos.len(), 2);
    assert!(repos[0].is_local());
    assert!(!repos[1].is_local());
    assert_eq!(
        repos[1].script_dir_url.as_deref(),
        Some("https://commons.wikimedia.org/w")
    );
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let server = MockServer::start().await;

    // First attempt fails, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": { "general": { "wikiid": "testwiki" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let info = create_test_api().site_info(&site.conf).await.unwrap();
    assert_eq!(info.wikiid.as_deref(), Some("testwiki"));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let err = create_test_api().site_info(&site.conf).await.unwrap_err();
    assert!(matches!(err, BundlerError::HttpStatus { status: 502, .. }));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let err = create_test_api().site_info(&site.conf).await.unwrap_err();
    assert!(matches!(err, BundlerError::HttpStatus { status: 403, .. }));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_parsed_page_from_restbase() {
    let server = MockServer::start().await;
    let html = r#"<!DOCTYPE html>
<html about="http://wiki.example.org/wiki/Special:Redirect/revision/42">
<head><link rel="dc:isVersionOf" href="//wiki.example.org/wiki/Laozi"/></head>
<body>
<figure typeof="mw:File/Thumb">
  <a href="./File:Laozi.jpg"><img resource="./File:Laozi.jpg" src="//upload.example.org/Laozi.jpg"/></a>
</figure>
</body>
</html>"#;
    Mock::given(method("GET"))
        .and(path("/api/rest_v1/page/html/Laozi/42"))
        .and(query_param("redirect", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(1)
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let page = create_test_api()
        .fetch_parsed(&site, "Laozi", Some(42))
        .await
        .unwrap();

    assert_eq!(page.title, "Laozi");
    assert_eq!(page.revision, Some(42));
    assert_eq!(page.redirect, None);
    assert_eq!(page.media.len(), 1);
    assert_eq!(page.media[0].short, "File:Laozi.jpg");
    assert!(page.text.contains("mw:File/Thumb"));
}

#[tokio::test]
async fn test_missing_page_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rest_v1/page/html/Nowhere"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let err = create_test_api()
        .fetch_parsed(&site, "Nowhere", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_action_api_error_codes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("action", "parse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": { "code": "nosuchrevid", "info": "There is no revision with ID 7." }
        })))
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let err = create_test_api()
        .fetch_rendered_html(&site, "Laozi", 7)
        .await
        .unwrap_err();
    assert!(matches!(err, BundlerError::NotFound(_)));
}

#[tokio::test]
async fn test_authorship_follows_continuation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("prop", "contributors"))
        .and(query_param("pccontinue", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": { "pages": { "1": {
                "contributors": [{ "name": "Bob" }],
                "anoncontributors": 3
            } } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("prop", "contributors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "continue": { "pccontinue": "next" },
            "query": { "pages": { "1": {
                "contributors": [{ "name": "Alice" }]
            } } }
        })))
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let authors = create_test_api()
        .fetch_authorship(&site, "Laozi", 42)
        .await
        .unwrap();

    assert_eq!(authors["authors"], serde_json::json!(["Alice", "Bob"]));
    assert_eq!(authors["anons"], 3);
}

#[tokio::test]
async fn test_media_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("prop", "imageinfo"))
        .and(query_param("titles", "File:Laozi.jpg"))
        .and(query_param("iiurlwidth", "800"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": { "pages": { "-1": {
                "imagerepository": "local",
                "imageinfo": [{
                    "size": 52000,
                    "width": 2000,
                    "height": 1000,
                    "thumbwidth": 800,
                    "thumbheight": 400,
                    "thumburl": "https://upload.example.org/800px-Laozi.jpg",
                    "url": "https://upload.example.org/Laozi.jpg",
                    "mime": "image/jpeg",
                    "mediatype": "BITMAP",
                    "extmetadata": {
                        "Artist": { "value": "Jane" },
                        "LicenseShortName": { "value": "CC BY-SA 4.0" }
                    }
                }]
            } } }
        })))
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let media = MediaRef {
        wiki: 0,
        short: "File:Laozi.jpg".to_string(),
        resource: "https://wiki.example.org/wiki/File:Laozi.jpg".to_string(),
        src: "https://upload.example.org/220px-Laozi.jpg".to_string(),
        imagesize: 800,
    };
    let info = create_test_api()
        .fetch_media_metadata(&site, &media)
        .await
        .unwrap();

    assert!(!info.is_missing());
    assert!(info.is_renderable());
    assert_eq!(info.width, Some(800));
    assert_eq!(info.height, Some(400));
    assert_eq!(info.size, Some(52000));
    assert_eq!(info.repository.as_deref(), Some("local"));
    assert_eq!(info.artist.as_deref(), Some("Jane"));
    assert_eq!(info.licenseshortname.as_deref(), Some("CC BY-SA 4.0"));
    assert_eq!(info.credit, None);
    assert_eq!(info.resource, media.resource);
}

#[tokio::test]
async fn test_media_bytes_streamed_to_disk() {
    let server = MockServer::start().await;
    let body = vec![7u8; 2048];
    Mock::given(method("GET"))
        .and(path("/Laozi.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("laozi.jpg");
    let url = format!("{}/Laozi.jpg", server.uri());

    let written = create_test_api()
        .fetch_media_bytes(&url, &dest)
        .await
        .unwrap();

    assert_eq!(written, 2048);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn test_failed_download_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("gone.jpg");
    let url = format!("{}/Gone.jpg", server.uri());

    let err = create_test_api()
        .fetch_media_bytes(&url, &dest)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_raw_revision() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("prop", "revisions"))
        .and(query_param("revids", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": { "pages": { "12": {
                "pageid": 12,
                "ns": 0,
                "title": "Laozi",
                "revisions": [{
                    "revid": 42,
                    "slots": { "main": { "*": "'''Laozi''' was a philosopher." } }
                }]
            } } }
        })))
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let record = create_test_api()
        .fetch_raw_revision(&site, "Laozi", Some(42))
        .await
        .unwrap()
        .expect("revision should exist");

    assert_eq!(record.pageid, Some(12));
    assert_eq!(record.revid, 42);
    assert_eq!(record.title, "Laozi");
    assert_eq!(record.wiki, 0);
    assert_eq!(record.text, "'''Laozi''' was a philosopher.");
}

#[tokio::test]
async fn test_raw_revision_by_title_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("prop", "revisions"))
        .and(query_param("titles", "File:Old name.jpg"))
        .and(query_param("redirects", ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": {
                "redirects": [{ "from": "File:Old name.jpg", "to": "File:New name.jpg" }],
                "pages": { "31": {
                    "pageid": 31,
                    "ns": 6,
                    "title": "File:New name.jpg",
                    "revisions": [{
                        "revid": 77,
                        "slots": { "main": { "*": "== Summary ==" } }
                    }]
                } }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let record = create_test_api()
        .fetch_raw_revision(&site, "File:Old name.jpg", None)
        .await
        .unwrap()
        .expect("redirect target should be returned");

    assert_eq!(record.title, "File:New name.jpg");
    assert_eq!(record.revid, 77);
    assert_eq!(record.ns, 6);
}

#[tokio::test]
async fn test_missing_raw_revision_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("revids", "99"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": { "badrevids": { "99": { "revid": 99 } } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("titles", "File:Nowhere.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": { "pages": { "-1": {
                "ns": 6, "title": "File:Nowhere.jpg", "missing": ""
            } } }
        })))
        .mount(&server)
        .await;

    let site = create_test_site(&server);
    let api = create_test_api();

    let by_id = api.fetch_raw_revision(&site, "Laozi", Some(99)).await.unwrap();
    assert!(by_id.is_none());

    let by_title = api
        .fetch_raw_revision(&site, "File:Nowhere.jpg", None)
        .await
        .unwrap();
    assert!(by_title.is_none());
}
