// tests/pipeline_runs.rs
// Multi-run scenarios through the driver with persisted state in a temp dir.
mod common;

use common::{entry, Feed, MemoryStore, ScriptedFeeds};
use news_dataset_pipeline::config::CategorySources;
use news_dataset_pipeline::ingest::{FetchOrchestrator, FetchSettings};
use news_dataset_pipeline::pipeline::Stage;
use news_dataset_pipeline::publish::SyncPublisher;
use news_dataset_pipeline::{Article, Category, Fingerprint, Pipeline, StateStore, StorageManager};
use std::path::Path;
use std::sync::Arc;

const TECH_FEED: &str = "https://tech.example.test/rss";
const FIN_FEED: &str = "https://finance.example.test/rss";

fn build(dir: &Path, feeds: Arc<ScriptedFeeds>, categories: Vec<CategorySources>) -> Pipeline {
    Pipeline::new(
        categories,
        FetchOrchestrator::new(feeds, FetchSettings::default()),
        StorageManager::new(dir.join("data"), 90 * 1024 * 1024),
        StateStore::new(dir.join("state")),
        3,
    )
}

fn cat(name: Category, urls: &[&str]) -> CategorySources {
    CategorySources {
        name,
        sources: urls.iter().map(|s| s.to_string()).collect(),
    }
}

fn read_log(dir: &Path, category: Category) -> Vec<Article> {
    let path = dir.join("data").join(format!("{}.jsonl", category.as_str()));
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn empty_feed_three_times_disables_it_on_fourth_run() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = Arc::new(ScriptedFeeds::new().with(TECH_FEED, Feed::Entries(vec![])));

    for _ in 0..3 {
        let p = build(dir.path(), feeds.clone(), vec![cat(Category::Tech, &[TECH_FEED])]);
        let report = p.run_once().await.unwrap();
        assert_eq!(report.categories[0].sources_failed, 1);
    }
    assert_eq!(feeds.calls(TECH_FEED), 3);

    // the feed comes back, but it stays disabled
    feeds.set(TECH_FEED, Feed::Entries(vec![entry("https://tech.example.test/1", "back")]));
    let p = build(dir.path(), feeds.clone(), vec![cat(Category::Tech, &[TECH_FEED])]);
    let report = p.run_once().await.unwrap();

    assert_eq!(feeds.calls(TECH_FEED), 3);
    assert_eq!(report.categories[0].sources_skipped, 1);
    assert_eq!(report.categories[0].accepted, 0);

    let health: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("state/feed_health.json")).unwrap())
            .unwrap();
    assert_eq!(health[TECH_FEED], 3);
}

#[tokio::test]
async fn identical_links_are_stored_once_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = Arc::new(ScriptedFeeds::new().with(
        TECH_FEED,
        Feed::Entries(vec![entry("https://tech.example.test/1", "one"), entry("https://tech.example.test/2", "two")]),
    ));

    let p = build(dir.path(), feeds.clone(), vec![cat(Category::Tech, &[TECH_FEED])]);
    assert_eq!(p.run_once().await.unwrap().total_accepted(), 2);

    // a fresh driver only shares the persisted state with the first one
    feeds.set(
        TECH_FEED,
        Feed::Entries(vec![entry("https://tech.example.test/3", "three"), entry("https://tech.example.test/1", "one again")]),
    );
    let p = build(dir.path(), feeds.clone(), vec![cat(Category::Tech, &[TECH_FEED])]);
    let report = p.run_once().await.unwrap();
    assert_eq!(report.categories[0].accepted, 1);
    assert_eq!(report.categories[0].duplicates, 1);

    let titles: Vec<String> = read_log(dir.path(), Category::Tech).into_iter().map(|a| a.title).collect();
    assert_eq!(titles, vec!["one", "two", "three"]);

    let state = StateStore::new(dir.path().join("state")).load(3).await.unwrap();
    for i in 1..=3 {
        assert!(state.seen.contains(&Fingerprint::of_link(&format!("https://tech.example.test/{i}"))));
    }
}

#[tokio::test]
async fn publish_failure_in_one_category_does_not_stop_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = Arc::new(
        ScriptedFeeds::new()
            .with(TECH_FEED, Feed::Entries(vec![entry("https://tech.example.test/a", "tech a")]))
            .with(FIN_FEED, Feed::Entries(vec![entry("https://finance.example.test/b", "fin b")])),
    );
    let store = Arc::new(MemoryStore::failing_for(&["tester/news-tech-dataset"]));
    let p = build(
        dir.path(),
        feeds,
        vec![cat(Category::Tech, &[TECH_FEED]), cat(Category::Finance, &[FIN_FEED])],
    )
    .with_publisher(SyncPublisher::new(store.clone(), "tester"));

    let report = p.run_once().await.unwrap();

    let tech = &report.categories[0];
    assert_eq!(tech.stored, 1);
    assert!(!tech.published);
    let failure = tech.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Publish);
    assert!(failure.reason.contains("connection reset"));

    let fin = &report.categories[1];
    assert!(fin.published);
    assert!(fin.failure.is_none());
    assert_eq!(store.uploaded_repos(), vec!["tester/news-finance-dataset".to_string()]);

    // both categories' items were persisted as seen at end of run
    let state = StateStore::new(dir.path().join("state")).load(3).await.unwrap();
    assert!(state.seen.contains(&Fingerprint::of_link("https://tech.example.test/a")));
    assert!(state.seen.contains(&Fingerprint::of_link("https://finance.example.test/b")));
}

#[tokio::test]
async fn storage_failure_aborts_only_that_category() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where the tech log should be makes the append fail
    std::fs::create_dir_all(dir.path().join("data/tech.jsonl")).unwrap();

    let feeds = Arc::new(
        ScriptedFeeds::new()
            .with(TECH_FEED, Feed::Entries(vec![entry("https://tech.example.test/a", "tech a")]))
            .with(FIN_FEED, Feed::Entries(vec![entry("https://finance.example.test/b", "fin b")])),
    );
    let store = Arc::new(MemoryStore::default());
    let p = build(
        dir.path(),
        feeds,
        vec![cat(Category::Tech, &[TECH_FEED]), cat(Category::Finance, &[FIN_FEED])],
    )
    .with_publisher(SyncPublisher::new(store.clone(), "tester"));

    let report = p.run_once().await.unwrap();

    assert_eq!(report.failed_categories(), vec![Category::Tech]);
    assert_eq!(report.categories[0].failure.as_ref().unwrap().stage, Stage::Store);
    assert!(report.categories[1].published);
    assert_eq!(store.uploaded_repos(), vec!["tester/news-finance-dataset".to_string()]);
    assert!(dir.path().join("state/seen_urls.json").exists());
}

#[tokio::test]
async fn category_without_new_articles_skips_store_and_publish() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = Arc::new(ScriptedFeeds::new().with(TECH_FEED, Feed::Error("boom".into())));
    let store = Arc::new(MemoryStore::default());
    let p = build(dir.path(), feeds, vec![cat(Category::Tech, &[TECH_FEED])])
        .with_publisher(SyncPublisher::new(store.clone(), "tester"));

    let report = p.run_once().await.unwrap();

    assert!(report.categories[0].failure.is_none());
    assert!(!report.categories[0].published);
    assert!(store.uploaded_repos().is_empty());
    assert!(!dir.path().join("data/tech.jsonl").exists());
}

#[tokio::test]
async fn remote_copy_mirrors_full_local_log() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = Arc::new(ScriptedFeeds::new().with(TECH_FEED, Feed::Entries(vec![entry("https://tech.example.test/1", "one")])));
    let store = Arc::new(MemoryStore::default());

    let p = build(dir.path(), feeds.clone(), vec![cat(Category::Tech, &[TECH_FEED])])
        .with_publisher(SyncPublisher::new(store.clone(), "tester"));
    p.run_once().await.unwrap();
    feeds.set(TECH_FEED, Feed::Entries(vec![entry("https://tech.example.test/2", "two")]));
    p.run_once().await.unwrap();

    let uploads = store.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2);
    let (repo, remote, bytes) = &uploads[1];
    assert_eq!(repo, "tester/news-tech-dataset");
    assert_eq!(remote, "tech.jsonl");
    assert_eq!(String::from_utf8_lossy(bytes).lines().count(), 2);
    assert_eq!(store.repos.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failed_store_leaves_items_for_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("data/tech.jsonl");
    std::fs::create_dir_all(&blocker).unwrap();

    let feeds = Arc::new(ScriptedFeeds::new().with(
        TECH_FEED,
        Feed::Entries(vec![entry("https://tech.example.test/a", "tech a")]),
    ));

    let p = build(dir.path(), feeds.clone(), vec![cat(Category::Tech, &[TECH_FEED])]);
    let report = p.run_once().await.unwrap();
    assert_eq!(report.categories[0].failure.as_ref().unwrap().stage, Stage::Store);
    assert_eq!(report.categories[0].stored, 0);

    let state = StateStore::new(dir.path().join("state")).load(3).await.unwrap();
    assert!(!state.seen.contains(&Fingerprint::of_link("https://tech.example.test/a")));

    std::fs::remove_dir(&blocker).unwrap();
    let p = build(dir.path(), feeds, vec![cat(Category::Tech, &[TECH_FEED])]);
    let report = p.run_once().await.unwrap();
    assert_eq!(report.categories[0].accepted, 1);
    assert_eq!(report.categories[0].stored, 1);

    let titles: Vec<String> = read_log(dir.path(), Category::Tech).into_iter().map(|a| a.title).collect();
    assert_eq!(titles, vec!["tech a"]);
}

#[tokio::test]
async fn panicking_feed_is_contained_to_its_category() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = Arc::new(
        ScriptedFeeds::new()
            .with(TECH_FEED, Feed::Panic)
            .with(FIN_FEED, Feed::Entries(vec![entry("https://finance.example.test/b", "fin b")])),
    );
    let p = build(
        dir.path(),
        feeds,
        vec![cat(Category::Tech, &[TECH_FEED]), cat(Category::Finance, &[FIN_FEED])],
    );

    let report = p.run_once().await.unwrap();

    let tech = report.categories[0].failure.as_ref().unwrap();
    assert_eq!(tech.stage, Stage::Internal);
    assert!(tech.reason.contains("feed parser bug"));
    assert_eq!(report.categories[1].stored, 1);
    assert_eq!(read_log(dir.path(), Category::Finance).len(), 1);

    let state = StateStore::new(dir.path().join("state")).load(3).await.unwrap();
    assert!(state.seen.contains(&Fingerprint::of_link("https://finance.example.test/b")));
}

#[tokio::test]
async fn unresolved_namespace_only_fails_publish() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = Arc::new(ScriptedFeeds::new().with(
        TECH_FEED,
        Feed::Entries(vec![entry("https://tech.example.test/a", "tech a")]),
    ));
    let store = Arc::new(MemoryStore::default());
    let p = build(dir.path(), feeds, vec![cat(Category::Tech, &[TECH_FEED])])
        .with_publisher(SyncPublisher::new(store.clone(), ""));

    let report = p.run_once().await.unwrap();

    let tech = &report.categories[0];
    assert_eq!(tech.stored, 1);
    let failure = tech.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Publish);
    assert!(failure.reason.contains("connection refused"));
    assert!(store.uploaded_repos().is_empty());
}

#[tokio::test]
async fn namespace_defaults_to_store_owner() {
    let dir = tempfile::tempdir().unwrap();
    let feeds = Arc::new(ScriptedFeeds::new().with(
        TECH_FEED,
        Feed::Entries(vec![entry("https://tech.example.test/a", "tech a")]),
    ));
    let store = Arc::new(MemoryStore {
        owner: Some("owner".into()),
        ..MemoryStore::default()
    });
    let p = build(dir.path(), feeds, vec![cat(Category::Tech, &[TECH_FEED])])
        .with_publisher(SyncPublisher::new(store.clone(), ""));

    let report = p.run_once().await.unwrap();
    assert!(report.categories[0].published);
    assert_eq!(store.uploaded_repos(), vec!["owner/news-tech-dataset".to_string()]);
}
