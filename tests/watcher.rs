// tests/watcher.rs
mod common;

use std::path::Path;
use std::sync::Arc;

use common::{ScriptedFetcher, SharedSink};
use page_watcher::materialize::MarkdownMaterializer;
use page_watcher::watch::config::load_config_for;
use page_watcher::watch::snapshot::MemorySink;
use page_watcher::watch::types::ResourceKind;
use page_watcher::watch::STATE_FILE;
use page_watcher::{Collaborators, Watcher};
use serial_test::serial;

const CONFIG: &str = r#"
[options]
batch_size = 2
output_path = "archive"
pause_secs = [0, 0]

[[listers]]
url = "http://www.example.com/feed.xml"
tip = "example feed"
[listers.option]
weight = 0.9
"#;

const FEED: &str = "https://example.com/feed.xml";

fn write_config(dir: &Path, body: &str) {
    std::fs::write(dir.join(".config.toml"), body).unwrap();
}

fn scripted() -> ScriptedFetcher {
    ScriptedFetcher::default()
        .with_listing(
            FEED,
            &["https://example.com/p/1", "https://example.com/p/2", "https://example.com/p/3"],
        )
        .with_page("https://example.com/p/1", "first body")
        .with_page("https://example.com/p/2", "second body")
        .failing_on("https://example.com/p/3")
}

async fn open_scripted(dir: &Path, sink: Arc<MemorySink>) -> Watcher {
    let config = load_config_for(dir).unwrap();
    let out = dir.join(&config.options.output_path);
    let collaborators = Collaborators {
        fetcher: Box::new(scripted()),
        materializer: Box::new(MarkdownMaterializer::new(out)),
        sink: Box::new(SharedSink(sink)),
    };
    Watcher::open_with(dir, config, collaborators).await.unwrap()
}

#[tokio::test]
#[serial]
async fn open_creates_state_and_tracks_configured_listers() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), CONFIG);

    let watcher = Watcher::open(tmp.path()).await.unwrap();
    assert!(tmp.path().join(STATE_FILE).exists());
    assert_eq!(watcher.store().len(), 1);
    let feed = watcher.store().get(FEED).unwrap();
    assert_eq!(feed.kind, ResourceKind::Listing);
    assert_eq!(feed.option.weight, Some(0.9));
    assert_eq!(watcher.settings().batch_size, 2);

    // reopening keeps a single record for the lister
    drop(watcher);
    let again = Watcher::open(tmp.path()).await.unwrap();
    assert_eq!(again.store().len(), 1);
}

#[tokio::test]
#[serial]
async fn open_without_configuration_is_a_config_error() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    let err = match Watcher::open(tmp.path()).await {
        Ok(_) => panic!("watcher opened without configuration"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), "config");
    assert!(err.is_fatal());
    assert!(!tmp.path().join(STATE_FILE).exists());
}

#[tokio::test]
#[serial]
async fn invalid_configuration_is_rejected() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    write_config(
        tmp.path(),
        "[options]\nmin_content_cycle = \"90days\"\nmax_content_cycle = \"30days\"\n",
    );
    assert!(Watcher::open(tmp.path()).await.is_err());

    write_config(tmp.path(), "[options]\nmin_content_cycle = \"soon\"\n");
    assert!(Watcher::open(tmp.path()).await.is_err());
}

#[tokio::test]
#[serial]
async fn corrupt_state_is_a_store_error() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), CONFIG);
    std::fs::write(tmp.path().join(STATE_FILE), "{ not json").unwrap();
    let err = match Watcher::open(tmp.path()).await {
        Ok(_) => panic!("watcher opened on corrupt state"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), "store_io");
}

#[tokio::test]
#[serial]
async fn inspect_reports_without_touching_the_directory() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), CONFIG);
    let state = tmp.path().join(STATE_FILE);

    let report = Watcher::inspect(tmp.path()).await.unwrap();
    assert_eq!(report.tracked, 1);
    assert_eq!(report.due_listing, 1);
    assert!(!state.exists());

    drop(Watcher::open(tmp.path()).await.unwrap());
    let saved = std::fs::read(&state).unwrap();

    // a lister added to the configuration shows up, but is not saved
    let extra = format!("{CONFIG}\n[[listers]]\nurl = \"https://example.com/other.xml\"\n");
    write_config(tmp.path(), &extra);
    let report = Watcher::inspect(tmp.path()).await.unwrap();
    assert_eq!(report.tracked, 2);
    assert_eq!(report.listing, 2);
    assert_eq!(std::fs::read(&state).unwrap(), saved);
    assert!(!tmp.path().join(".tasks.json.tmp").exists());
}

#[tokio::test]
#[serial]
async fn watch_once_archives_pages_and_checkpoints_each_report() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), CONFIG);
    let sink = Arc::new(MemorySink::new());
    let mut watcher = open_scripted(tmp.path(), sink.clone()).await;

    let summary = watcher.watch_once().await.unwrap();
    assert_eq!(summary.listing_checked, 1);
    assert_eq!(summary.content_checked, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.new_resources, 3);

    // one lister report, then 3 pages in batches of 2
    let labels = sink.labels();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels[0], "check lister 1/1, example feed");
    assert!(labels[1].starts_with("save 2 pages, "));
    assert!(labels[2].starts_with("save 1 pages, "));

    let archive = tmp.path().join("archive");
    // "/" and ":" are stripped from the title-derived file name
    let first = std::fs::read_to_string(archive.join("Title of httpsexample.comp1.md")).unwrap();
    assert!(first.contains("version: 1\n"));
    assert!(first.contains("first body"));

    let report = watcher.report().await;
    assert_eq!(report.tracked, 4);
    assert_eq!(report.listing, 1);
    assert_eq!(report.content, 3);
    assert_eq!(report.markdown_files, 2);
    // only the failed page is still due
    assert_eq!(report.due_content, 1);
    assert_eq!(report.due_listing, 0);
    assert!(report.recent_commits.is_empty());
}

#[tokio::test]
#[serial]
async fn second_pass_only_retries_what_failed() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), CONFIG);
    let sink = Arc::new(MemorySink::new());
    let mut watcher = open_scripted(tmp.path(), sink.clone()).await;
    watcher.watch_once().await.unwrap();

    let summary = watcher.watch_once().await.unwrap();
    assert_eq!(summary.listing_checked, 0);
    assert_eq!(summary.content_checked, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 3);
}

#[tokio::test]
#[serial]
async fn snapshot_failures_do_not_fail_the_pass() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), CONFIG);
    let sink = Arc::new(MemorySink::failing());
    let mut watcher = open_scripted(tmp.path(), sink.clone()).await;

    let summary = watcher.watch_once().await.unwrap();
    assert_eq!(summary.succeeded, 3);
    assert_eq!(sink.labels().len(), 3);
}

#[tokio::test]
#[serial]
async fn state_survives_reopening() {
    std::env::remove_var("PAGE_WATCHER_CONFIG");
    let tmp = tempfile::tempdir().unwrap();
    write_config(tmp.path(), CONFIG);
    let sink = Arc::new(MemorySink::new());
    let mut watcher = open_scripted(tmp.path(), sink.clone()).await;
    watcher.watch_once().await.unwrap();
    let before = watcher.store().clone();
    drop(watcher);

    let reopened = open_scripted(tmp.path(), sink).await;
    assert_eq!(reopened.store(), &before);
}
