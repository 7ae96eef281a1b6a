//! Integration tests for the check pipeline.
//!
//! These tests drive CheckEngine against a mock HTTP server and persist
//! outcomes through Store, the same way the `check` command does.

use std::time::Duration;

use sitewatch_core::check::{CheckEngine, CheckInput, EngineOptions, Fetcher};
use sitewatch_core::model::HeaderMap;
use sitewatch_core::store::{NewSite, Store};
use sitewatch_core::{CheckReport, Database, MonitoredResource};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return socket_skip_return();
        };
        mock_server
    }};
}

// ==================== Helper Functions ====================

async fn setup_store() -> Result<Store, Box<dyn std::error::Error>> {
    Ok(Store::new(Database::new_in_memory().await?))
}

fn engine() -> Result<CheckEngine, Box<dyn std::error::Error>> {
    Ok(CheckEngine::new(
        EngineOptions {
            concurrency: 2,
            wait: Duration::ZERO,
            check_timeout: None,
        },
        Fetcher::new()?,
    )?)
}

async fn add_site(
    store: &Store,
    name: &str,
    url: String,
    selector: &str,
) -> Result<i64, Box<dyn std::error::Error>> {
    Ok(store
        .add_site(&NewSite {
            name: name.to_string(),
            url,
            css_selector: selector.to_string(),
            headers: HeaderMap::new(),
        })
        .await?)
}

/// Runs one check batch over every site and persists successful outcomes.
async fn check_all(
    store: &Store,
    engine: &CheckEngine,
) -> Result<Vec<CheckReport>, Box<dyn std::error::Error>> {
    let inputs = store.load_check_inputs(None).await?;
    let (mut reports, _) = engine.run_batch(inputs).await;
    for report in &reports {
        if let Ok(outcome) = &report.result {
            store.record_outcome(outcome).await?;
        }
    }
    reports.sort_by_key(|r| r.site_id);
    Ok(reports)
}

fn new_hrefs(report: &CheckReport) -> Vec<String> {
    report
        .result
        .as_ref()
        .map(|outcome| outcome.new_links.iter().map(|l| l.href.clone()).collect())
        .unwrap_or_default()
}

fn failure_message(report: &CheckReport) -> String {
    report
        .result
        .as_ref()
        .err()
        .map(|f| f.message().to_string())
        .unwrap_or_default()
}

// ==================== Change detection ====================

#[tokio::test]
async fn test_first_check_reports_all_then_rerun_reports_nothing()
-> Result<(), Box<dyn std::error::Error>> {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<ul class="news"><li><a href="/a">A</a></li><li><a href="/b">B</a></li></ul>"#,
        ))
        .mount(&server)
        .await;

    let store = setup_store().await?;
    let engine = engine()?;
    add_site(&store, "news", format!("{}/news", server.uri()), "ul.news a").await?;

    let first = check_all(&store, &engine).await?;
    assert_eq!(
        new_hrefs(&first[0]),
        vec![format!("{}/a", server.uri()), format!("{}/b", server.uri())]
    );

    let second = check_all(&store, &engine).await?;
    let outcome = second[0].result.as_ref().map_err(|f| f.message().to_string())?;
    assert!(outcome.is_unchanged());
    assert!(outcome.new_links.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_changed_page_reports_only_unseen_hrefs() -> Result<(), Box<dyn std::error::Error>> {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/a">A</a>"#))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<p>updated</p><a href="/a">A renamed</a><a href="/c">C</a>"#,
        ))
        .mount(&server)
        .await;

    let store = setup_store().await?;
    let engine = engine()?;
    let id = add_site(&store, "news", server.uri(), "a").await?;

    check_all(&store, &engine).await?;
    let second = check_all(&store, &engine).await?;

    assert_eq!(new_hrefs(&second[0]), vec![format!("{}/c", server.uri())]);
    assert_eq!(store.links(Some(id)).await?.len(), 2);
    assert_eq!(store.snapshot_count(id).await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_href_in_one_page_reported_twice()
-> Result<(), Box<dyn std::error::Error>> {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="/a">A</a><a href="/b">B</a><a href="/b">B again</a>"#,
        ))
        .mount(&server)
        .await;

    let store = setup_store().await?;
    let engine = engine()?;
    let site = MonitoredResource {
        id: add_site(&store, "dups", server.uri(), "a").await?,
        name: "dups".to_string(),
        url: server.uri(),
        selector: "a".to_string(),
        headers: HeaderMap::new(),
    };
    let input = CheckInput {
        known_hrefs: [format!("{}/a", server.uri())].into_iter().collect(),
        ..CheckInput::first_run(site)
    };

    let (reports, _) = engine.run_batch(vec![input]).await;
    let b = format!("{}/b", server.uri());
    assert_eq!(new_hrefs(&reports[0]), vec![b.clone(), b]);
    Ok(())
}

// ==================== Failures ====================

#[tokio::test]
async fn test_oversized_page_fails_while_sibling_succeeds()
-> Result<(), Box<dyn std::error::Error>> {
    let server = require_mock_server!();
    let oversized = vec![b'x'; 10 * 1024 * 1024 + 1];
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(oversized))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/small"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/x">X</a>"#))
        .mount(&server)
        .await;

    let store = setup_store().await?;
    let engine = engine()?;
    add_site(&store, "big", format!("{}/big", server.uri()), "a").await?;
    add_site(&store, "small", format!("{}/small", server.uri()), "a").await?;

    let reports = check_all(&store, &engine).await?;

    assert_eq!(failure_message(&reports[0]), "content-size too big");
    assert_eq!(new_hrefs(&reports[1]), vec![format!("{}/x", server.uri())]);
    Ok(())
}

#[tokio::test]
async fn test_selector_without_matches_reports_message()
-> Result<(), Box<dyn std::error::Error>> {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/x">X</a>"#))
        .mount(&server)
        .await;

    let store = setup_store().await?;
    let engine = engine()?;
    let id = add_site(&store, "news", server.uri(), "div.missing a").await?;

    let reports = check_all(&store, &engine).await?;

    assert_eq!(
        failure_message(&reports[0]),
        "no link found. check your css_selector."
    );
    assert_eq!(store.snapshot_count(id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_error_status_reports_http_error() -> Result<(), Box<dyn std::error::Error>> {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = setup_store().await?;
    let engine = engine()?;
    add_site(&store, "down", server.uri(), "a").await?;

    let reports = check_all(&store, &engine).await?;
    let message = failure_message(&reports[0]);
    assert!(message.starts_with("http error: "), "unexpected: {message}");
    assert!(message.contains("503"), "unexpected: {message}");
    Ok(())
}

// ==================== Extraction ====================

#[tokio::test]
async fn test_image_links_take_title_then_alt() -> Result<(), Box<dyn std::error::Error>> {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="/1"><img title="T" alt="A"></a>
               <a href="/2"><img alt="A"></a>"#,
        ))
        .mount(&server)
        .await;

    let store = setup_store().await?;
    let engine = engine()?;
    add_site(&store, "gallery", server.uri(), "a").await?;

    let reports = check_all(&store, &engine).await?;
    let outcome = reports[0].result.as_ref().map_err(|f| f.message().to_string())?;
    let titles: Vec<_> = outcome.new_links.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, vec!["T", "A"]);
    Ok(())
}

#[tokio::test]
async fn test_links_resolve_against_redirect_target() -> Result<(), Box<dyn std::error::Error>> {
    let server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", format!("{}/new/", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="item">Item</a>"#))
        .mount(&server)
        .await;

    let store = setup_store().await?;
    let engine = engine()?;
    let id = add_site(&store, "moved", format!("{}/old", server.uri()), "a").await?;

    let reports = check_all(&store, &engine).await?;

    assert_eq!(
        new_hrefs(&reports[0]),
        vec![format!("{}/new/item", server.uri())]
    );
    let snapshot = store.latest_snapshot(id).await?.ok_or("missing snapshot")?;
    assert_eq!(snapshot.url, format!("{}/new/", server.uri()));
    Ok(())
}
