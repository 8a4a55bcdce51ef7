use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Notify;

use mensa::cache::{
    CacheError, MemoryStorage, PlanCache, Presence, StorageAdapter, StorageError, entry_name,
};
use mensa::domain::date::DateKey;
use mensa::domain::plans::{LineRecord, PlanRecord};
use mensa::infra::storage::DirectoryStorage;

fn date(input: &str) -> DateKey {
    input.parse().expect("valid date")
}

fn sample_plans(on: DateKey) -> Vec<PlanRecord> {
    vec![
        PlanRecord::new(on, "Mensa Am Adenauerring")
            .with_id("adenauerring")
            .with_lines(vec![
                LineRecord::new("Linie 1")
                    .with_id("l1")
                    .with_meals(vec![json!({ "name": "Linsen mit Spätzle", "price": 2.6 })]),
                LineRecord::new("Linie 2"),
            ]),
        PlanRecord::new(on, "Unbekannte Mensa"),
    ]
}

/// Wraps a storage adapter and counts reads that reach it.
struct CountingStorage<S> {
    inner: S,
    reads: AtomicUsize,
}

impl<S> CountingStorage<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: StorageAdapter> StorageAdapter for CountingStorage<S> {
    async fn read(&self, name: &str) -> Result<Bytes, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(name).await
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<(), StorageError> {
        self.inner.write(name, data).await
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list().await
    }
}

/// Storage whose reads report their result, then wait until released.
struct PausedReads {
    inner: MemoryStorage,
    read_done: Notify,
    release: Notify,
}

#[async_trait]
impl StorageAdapter for PausedReads {
    async fn read(&self, name: &str) -> Result<Bytes, StorageError> {
        let result = self.inner.read(name).await;
        self.read_done.notify_one();
        self.release.notified().await;
        result
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<(), StorageError> {
        self.inner.write(name, data).await
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn put_then_get_returns_equal_records() {
    let dir = TempDir::new().expect("tempdir");
    let storage = DirectoryStorage::new(dir.path()).expect("storage");
    let cache = PlanCache::new(Arc::new(storage));
    let day = date("2022-09-02");
    let plans = sample_plans(day);

    cache.put(&day, &plans).await.expect("put");

    assert_eq!(cache.get(&day).await.expect("get"), Some(plans));
    assert_eq!(cache.presence(&day), Presence::Present);
    assert!(dir.path().join("2022-09-02.json").is_file());
}

#[tokio::test]
async fn entries_survive_a_fresh_cache_instance() {
    let dir = TempDir::new().expect("tempdir");
    let day = date("2022-09-05");
    let plans = sample_plans(day);

    let first = PlanCache::new(Arc::new(DirectoryStorage::new(dir.path()).expect("storage")));
    first.put(&day, &plans).await.expect("put");

    let second = PlanCache::new(Arc::new(DirectoryStorage::new(dir.path()).expect("storage")));
    assert_eq!(second.presence(&day), Presence::Unknown);
    assert_eq!(second.get(&day).await.expect("get"), Some(plans));
}

#[tokio::test]
async fn stored_document_uses_zero_based_months() {
    let dir = TempDir::new().expect("tempdir");
    let cache = PlanCache::new(Arc::new(DirectoryStorage::new(dir.path()).expect("storage")));
    let day = date("2022-01-31");

    cache
        .put(&day, &[PlanRecord::new(day, "Mensa Moltkestraße").with_id("moltke")])
        .await
        .expect("put");

    let raw = std::fs::read(dir.path().join(entry_name(&day))).expect("entry file");
    let document: serde_json::Value = serde_json::from_slice(&raw).expect("json");
    assert_eq!(document[0]["date"], json!({ "year": 2022, "month": 0, "day": 31 }));
    assert_eq!(document[0]["id"], json!("moltke"));
}

#[tokio::test]
async fn missing_date_is_absent_and_short_circuits_afterwards() {
    let storage = Arc::new(CountingStorage::new(MemoryStorage::new()));
    let cache = PlanCache::new(storage.clone());
    let day = date("2022-09-03");

    assert_eq!(cache.get(&day).await.expect("first get"), None);
    assert_eq!(cache.presence(&day), Presence::Absent);
    assert_eq!(cache.get(&day).await.expect("second get"), None);

    assert_eq!(storage.reads(), 1);
}

#[tokio::test]
async fn miss_racing_a_put_does_not_hide_the_entry() {
    let storage = Arc::new(PausedReads {
        inner: MemoryStorage::new(),
        read_done: Notify::new(),
        release: Notify::new(),
    });
    let cache = Arc::new(PlanCache::new(storage.clone()));
    let day = date("2022-09-02");

    let reader = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(&day).await }
    });

    // the reader has seen the miss but not yet recorded it
    storage.read_done.notified().await;
    cache.put(&day, &sample_plans(day)).await.expect("put");
    storage.release.notify_one();

    let racing = reader.await.expect("reader task").expect("racing get");
    assert_eq!(racing, None);
    assert_eq!(cache.presence(&day), Presence::Present);

    let later = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(&day).await }
    });
    storage.read_done.notified().await;
    storage.release.notify_one();
    let later = later.await.expect("reader task").expect("later get");
    assert_eq!(later, Some(sample_plans(day)));
}

#[tokio::test]
async fn put_clears_an_absent_marker() {
    let cache = PlanCache::new(Arc::new(MemoryStorage::new()));
    let day = date("2022-09-03");

    assert_eq!(cache.get(&day).await.expect("get"), None);
    cache.put(&day, &sample_plans(day)).await.expect("put");

    assert_eq!(cache.presence(&day), Presence::Present);
    assert_eq!(cache.get(&day).await.expect("get"), Some(sample_plans(day)));
}

#[tokio::test]
async fn untracked_cache_always_reads_storage() {
    let storage = Arc::new(CountingStorage::new(MemoryStorage::new()));
    let cache = PlanCache::without_presence_tracking(storage.clone());
    let day = date("2022-09-03");

    for _ in 0..3 {
        assert_eq!(cache.get(&day).await.expect("get"), None);
    }
    assert_eq!(storage.reads(), 3);
    assert_eq!(cache.presence(&day), Presence::Unknown);
}

#[tokio::test]
async fn undecodable_entry_is_a_fault() {
    let day = date("2022-09-02");
    let storage = MemoryStorage::with_entries([(entry_name(&day), Bytes::from_static(b"{not json"))]);
    let cache = PlanCache::new(Arc::new(storage));

    let err = cache.get(&day).await.expect_err("decode failure");
    assert!(matches!(err, CacheError::Decode { .. }));
    assert_eq!(cache.presence(&day), Presence::Unknown);
}

#[tokio::test]
async fn list_reports_dates_in_order() {
    let dir = TempDir::new().expect("tempdir");
    let cache = PlanCache::new(Arc::new(DirectoryStorage::new(dir.path()).expect("storage")));

    assert!(cache.list().await.expect("list").is_empty());

    for day in ["2022-09-05", "2021-12-31", "2022-09-02"] {
        let day = date(day);
        cache.put(&day, &sample_plans(day)).await.expect("put");
    }

    assert_eq!(
        cache.list().await.expect("list"),
        vec![date("2021-12-31"), date("2022-09-02"), date("2022-09-05")]
    );
}

#[tokio::test]
async fn list_ignores_foreign_entries() {
    let dir = TempDir::new().expect("tempdir");
    for name in [
        "2022-09-02.json",
        "2022-9-2.json",
        "2022-02-30.json",
        "2022-09-02.json.bak",
        "notes.txt",
        ".2022-09-03.json.tmp",
    ] {
        std::fs::write(dir.path().join(name), b"[]").expect("seed entry");
    }
    let cache = PlanCache::new(Arc::new(DirectoryStorage::new(dir.path()).expect("storage")));

    assert_eq!(cache.list().await.expect("list"), vec![date("2022-09-02")]);
}

#[tokio::test]
async fn unknown_fields_are_written_back_unchanged() {
    let day = date("2022-09-02");
    let document = json!([{
        "id": null,
        "name": "Mensa Schloss Gottesaue",
        "date": { "year": 2022, "month": 8, "day": 2 },
        "lines": [{ "id": null, "name": "Wahlessen 1", "meals": [], "closed": true }],
        "source": "simplesite"
    }]);
    let storage = MemoryStorage::with_entries([(
        entry_name(&day),
        Bytes::from(serde_json::to_vec(&document).expect("encode")),
    )]);
    let cache = PlanCache::new(Arc::new(storage));

    let plans = cache.get(&day).await.expect("get").expect("present");
    assert_eq!(plans[0].extra["source"], json!("simplesite"));
    assert_eq!(plans[0].lines[0].extra["closed"], json!(true));

    cache.put(&day, &plans).await.expect("put");
    assert_eq!(cache.get(&day).await.expect("get"), Some(plans));
}
