use std::{
    path::Path,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::JoinHandle,
};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::{
    document::{Document, IndexConfig},
    error::{Error, Result},
    index::Index,
    memory_index::MemoryIndex,
    store::{Store, StoreStats},
};

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteBehindOptions {
    /// Jobs that may wait for the worker before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for WriteBehindOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// One pending durable write, applied by the worker as a single
/// transaction.
#[derive(Debug, Clone)]
enum Job {
    AddOne(Document),
    AddMany(Vec<Document>),
    UpdateOne { id: String, document: Document },
    UpdateMany(Vec<Document>),
    DeleteOne(String),
    DeleteMany(Vec<String>),
    Configure(IndexConfig),
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Self::AddOne(_) => "add-one",
            Self::AddMany(_) => "add-many",
            Self::UpdateOne { .. } => "update-one",
            Self::UpdateMany(_) => "update-many",
            Self::DeleteOne(_) => "delete-one",
            Self::DeleteMany(_) => "delete-many",
            Self::Configure(_) => "configure",
        }
    }

    fn apply(&self, store: &Store) -> Result<()> {
        match self {
            Self::AddOne(doc) => {
                store.put_documents([(doc.id.as_str(), doc)])?;
            }
            Self::AddMany(docs) | Self::UpdateMany(docs) => {
                store.put_documents(docs.iter().map(|d| (d.id.as_str(), d)))?;
            }
            Self::UpdateOne { id, document } => {
                store.put_documents([(id.as_str(), document)])?;
            }
            Self::DeleteOne(id) => {
                store.remove_documents([id.as_str()])?;
            }
            Self::DeleteMany(ids) => {
                store.remove_documents(ids.iter().map(String::as_str))?;
            }
            Self::Configure(config) => store.put_config(config)?,
        }
        Ok(())
    }
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// Holds the worker before its next job until dropped.
///
/// Obtained from [`WriteBehindIndex::pause_worker`]. Callers keep
/// succeeding while paused; once the queue fills, further durable writes
/// are dropped. [`close`](Index::close) fails with [`Error::Paused`] while
/// a pause is held, since the worker could never drain the queue.
#[must_use = "the worker resumes as soon as the pause is dropped"]
pub struct WorkerPause<'a> {
    paused: &'a AtomicBool,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for WorkerPause<'_> {
    fn drop(&mut self) {
        self.paused.store(false, Ordering::Release);
    }
}

/// An in-memory index mirrored to a redb file by a background worker.
///
/// Mutations apply to memory first and return once that succeeds; the
/// durable write is queued and applied later, in order. When the queue is
/// full the durable write is dropped with a warning and the call still
/// succeeds, so the store may miss updates under sustained load. Searches
/// never touch the store.
///
/// # Examples
///
/// ```
/// # let tmp = tempfile::tempdir().unwrap();
/// # let path = tmp.path().join("index.redb");
/// use bitscout::{Document, Index, WriteBehindIndex};
///
/// let index = WriteBehindIndex::open(&path, Default::default()).unwrap();
/// index.add_document(Document::new("1", "hello", "a.txt")).unwrap();
/// assert_eq!(index.search("hello").len(), 1);
/// index.close().unwrap();
///
/// let reopened = WriteBehindIndex::open(&path, Default::default()).unwrap();
/// assert_eq!(reopened.count(), 1);
/// ```
pub struct WriteBehindIndex {
    memory: MemoryIndex,
    store: RwLock<Option<Arc<Store>>>,
    jobs: Sender<Job>,
    worker: Mutex<Option<Worker>>,
    gate: Arc<Mutex<()>>,
    paused: AtomicBool,
    /// Held across a memory mutation and its enqueue so jobs reach the
    /// queue in the order their mutations hit memory.
    order: Mutex<()>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl WriteBehindIndex {
    /// Open or create the store at `path`, load whatever it holds into
    /// memory, and start the worker.
    ///
    /// A document that cannot be read makes this fail. A configuration that
    /// cannot be read is logged and the index starts unconfigured. A queue
    /// capacity of zero is rejected.
    pub fn open(path: &Path, options: WriteBehindOptions) -> Result<Self> {
        if options.queue_capacity == 0 {
            return Err(Error::Config(
                "queue capacity must be at least 1".into(),
            ));
        }

        let store = Arc::new(Store::open(path)?);
        let memory = MemoryIndex::new();
        rehydrate(&store, &memory)?;

        let (jobs, queue) = channel::bounded(options.queue_capacity);
        let (shutdown, shutdown_rx) = channel::bounded(0);
        let gate = Arc::new(Mutex::new(()));

        let handle = {
            let store = Arc::clone(&store);
            let gate = Arc::clone(&gate);
            std::thread::Builder::new()
                .name("bitscout-writer".into())
                .spawn(move || run_worker(&store, &queue, &shutdown_rx, &gate))?
        };
        tracing::info!(
            queue_capacity = options.queue_capacity,
            "started write-behind worker"
        );

        Ok(Self {
            memory,
            store: RwLock::new(Some(store)),
            jobs,
            worker: Mutex::new(Some(Worker { shutdown, handle })),
            gate,
            paused: AtomicBool::new(false),
            order: Mutex::new(()),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        })
    }

    /// The in-memory view, for reads the [`Index`] trait does not cover.
    pub fn memory(&self) -> &MemoryIndex {
        &self.memory
    }

    pub fn get_document(&self, id: &str) -> Option<Document> {
        self.memory.get_document(id)
    }

    /// Durable jobs discarded because the queue was full.
    pub fn dropped_jobs(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Durable jobs waiting for the worker, not counting one in flight.
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Stop the worker before its next job until the returned guard is
    /// dropped. A job already being applied finishes first.
    pub fn pause_worker(&self) -> WorkerPause<'_> {
        let guard = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.paused.store(true, Ordering::Release);
        WorkerPause {
            paused: &self.paused,
            _guard: guard,
        }
    }

    /// Counts read from the store, which may lag behind memory.
    pub fn store_stats(&self) -> Result<StoreStats> {
        self.with_store(Store::stats)
    }

    pub fn is_store_empty(&self) -> Result<bool> {
        self.with_store(Store::is_empty)
    }

    /// Read one document straight from the store.
    pub fn stored_document(&self, id: &str) -> Result<Option<Document>> {
        self.with_store(|store| store.get_document(id))
    }

    fn with_store<T>(&self, f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        let store = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match store {
            Some(store) => f(&store),
            None => Err(Error::Closed),
        }
    }

    /// Apply `mutate` to memory and, if it succeeds, queue `job`.
    fn mirror(
        &self,
        job: Job,
        mutate: impl FnOnce(&MemoryIndex) -> Result<()>,
    ) -> Result<()> {
        let _order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        mutate(&self.memory)?;
        self.enqueue(job);
        Ok(())
    }

    fn enqueue(&self, job: Job) {
        let kind = job.kind();
        match self.jobs.try_send(job) {
            Ok(()) => tracing::debug!(kind, "queued durable write"),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind, "durable write queue full, job dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!(kind, "index closed, durable write skipped");
            }
        }
    }
}

impl Index for WriteBehindIndex {
    fn configure(&self, config: IndexConfig) -> Result<()> {
        self.mirror(Job::Configure(config.clone()), |m| m.configure(config))
    }

    fn show_config(&self) -> IndexConfig {
        self.memory.show_config()
    }

    fn add_document(&self, document: Document) -> Result<()> {
        self.mirror(Job::AddOne(document.clone()), |m| {
            m.add_document(document)
        })
    }

    fn add_documents(&self, documents: Vec<Document>) -> Result<()> {
        self.mirror(Job::AddMany(documents.clone()), |m| {
            m.add_documents(documents)
        })
    }

    fn search(&self, query: &str) -> Vec<Document> {
        self.memory.search(query)
    }

    fn delete_document(&self, id: &str) -> Result<()> {
        self.mirror(Job::DeleteOne(id.to_string()), |m| m.delete_document(id))
    }

    fn delete_documents(&self, ids: &[String]) -> Result<()> {
        self.mirror(Job::DeleteMany(ids.to_vec()), |m| m.delete_documents(ids))
    }

    fn update_document(&self, id: &str, document: Document) -> Result<()> {
        let job = Job::UpdateOne {
            id: id.to_string(),
            document: document.clone(),
        };
        self.mirror(job, |m| m.update_document(id, document))
    }

    fn update_documents(&self, documents: Vec<Document>) -> Result<()> {
        self.mirror(Job::UpdateMany(documents.clone()), |m| {
            m.update_documents(documents)
        })
    }

    /// Stop the worker after it has applied every queued job, then release
    /// the store. Calls after the first return `Ok(())`. Fails with
    /// [`Error::Paused`] while a [`WorkerPause`] is held.
    fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!("write-behind index already closed");
            return Ok(());
        }
        if self.paused.load(Ordering::Acquire) {
            return Err(Error::Paused);
        }
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("write-behind index already closed");
            return Ok(());
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Worker { shutdown, handle }) = worker {
            drop(shutdown);
            handle.join().map_err(|_| Error::WorkerPanicked)?;
        }

        let store = self
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(store);
        tracing::info!("write-behind index closed");

        self.memory.close()
    }

    /// Sync the store to disk. Jobs still queued are not waited for.
    fn flush(&self) -> Result<()> {
        let store = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match store {
            Some(store) => store.sync(),
            None => self.memory.flush(),
        }
    }

    fn optimize(&self) -> Result<()> {
        self.memory.optimize()
    }

    fn count(&self) -> usize {
        self.memory.count()
    }

    fn size(&self) -> usize {
        self.memory.size()
    }
}

impl Drop for WriteBehindIndex {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "failed to close write-behind index");
        }
    }
}

impl std::fmt::Debug for WriteBehindIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBehindIndex")
            .field("count", &self.memory.count())
            .field("pending_jobs", &self.jobs.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn rehydrate(store: &Store, memory: &MemoryIndex) -> Result<()> {
    if store.is_empty()? {
        tracing::info!("store is empty, starting with a fresh index");
        return Ok(());
    }

    match store.load_config() {
        Ok(Some(config)) => memory.configure(config)?,
        Ok(None) => tracing::debug!("no stored configuration"),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "failed to load configuration, continuing without it"
            );
        }
    }

    let documents = store.load_documents()?;
    let count = documents.len();
    memory.replace_all(documents);
    tracing::info!(count, "loaded documents from store");
    Ok(())
}

fn run_worker(
    store: &Store,
    queue: &Receiver<Job>,
    shutdown: &Receiver<()>,
    gate: &Mutex<()>,
) {
    loop {
        crossbeam::select! {
            recv(queue) -> job => match job {
                Ok(job) => apply(store, gate, &job),
                Err(_) => break,
            },
            recv(shutdown) -> _ => {
                for job in queue.try_iter() {
                    apply(store, gate, &job);
                }
                break;
            }
        }
    }
    tracing::info!("write-behind worker shutting down");
}

fn apply(store: &Store, gate: &Mutex<()>, job: &Job) {
    let _running = gate.lock().unwrap_or_else(PoisonError::into_inner);
    match job.apply(store) {
        Ok(()) => tracing::debug!(kind = job.kind(), "applied durable write"),
        Err(e) => {
            tracing::error!(
                kind = job.kind(),
                error = %e,
                "durable write failed, job discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::tests::{put_raw_config, put_raw_document};

    fn open(path: &Path) -> WriteBehindIndex {
        WriteBehindIndex::open(path, WriteBehindOptions::default()).unwrap()
    }

    fn doc(id: &str) -> Document {
        Document::new(id, format!("text of {id}"), format!("/src/{id}"))
    }

    #[test]
    fn mutations_reach_the_store_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");

        let index = open(&path);
        index.add_documents(vec![doc("a"), doc("b"), doc("c")]).unwrap();
        index.update_document("a", doc("a").with_meta("v", "2")).unwrap();
        index.delete_document("b").unwrap();
        index
            .update_documents(vec![doc("c").with_meta("v", "3")])
            .unwrap();
        index.add_document(doc("d")).unwrap();
        index.delete_documents(&["d".to_string()]).unwrap();
        index.close().unwrap();

        let store = Store::open(&path).unwrap();
        let mut stored: Vec<Document> = store
            .load_documents()
            .unwrap()
            .into_iter()
            .map(|(_, d)| d)
            .collect();
        stored.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(
            stored,
            vec![doc("a").with_meta("v", "2"), doc("c").with_meta("v", "3")]
        );
    }

    #[test]
    fn update_one_stores_under_target_id() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");

        let index = open(&path);
        index.add_document(doc("target")).unwrap();
        index.update_document("target", doc("payload")).unwrap();
        index.close().unwrap();

        let reopened = open(&path);
        assert_eq!(reopened.count(), 1);
        assert_eq!(reopened.get_document("target").unwrap().id, "payload");
    }

    #[test]
    fn failed_memory_mutation_is_not_queued() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open(&tmp.path().join("index.redb"));

        let _pause = index.pause_worker();
        assert!(index.delete_document("ghost").is_err());
        assert!(index.update_document("ghost", doc("ghost")).is_err());
        assert_eq!(index.pending_jobs(), 0);
    }

    #[test]
    fn queue_full_drops_but_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");
        let index = WriteBehindIndex::open(
            &path,
            WriteBehindOptions { queue_capacity: 2 },
        )
        .unwrap();

        let pause = index.pause_worker();
        for i in 0..10 {
            index.add_document(doc(&i.to_string())).unwrap();
        }
        assert_eq!(index.count(), 10);
        // Two jobs fit in the queue and at most one is held by the paused
        // worker.
        assert!(index.dropped_jobs() >= 7);
        assert!(index.pending_jobs() <= 2);

        drop(pause);
        index.close().unwrap();

        let store = Store::open(&path).unwrap();
        let stored = store.stats().unwrap().document_count;
        assert!((2..=3).contains(&stored), "stored {stored}");
        assert_eq!(stored, 10 - index.dropped_jobs());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let result = WriteBehindIndex::open(
            &tmp.path().join("index.redb"),
            WriteBehindOptions { queue_capacity: 0 },
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn close_is_refused_while_paused() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");
        let index = open(&path);

        let pause = index.pause_worker();
        index.add_document(doc("a")).unwrap();
        assert!(matches!(index.close(), Err(Error::Paused)));

        drop(pause);
        index.close().unwrap();
        assert_eq!(Store::open(&path).unwrap().stats().unwrap().document_count, 1);
    }

    #[test]
    fn racing_writers_leave_store_matching_memory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");
        let index = Arc::new(
            WriteBehindIndex::open(&path, WriteBehindOptions {
                queue_capacity: 10_000,
            })
            .unwrap(),
        );

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let d = Document::new("k", format!("{t}-{i}"), "src");
                        index.add_document(d).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let in_memory = index.get_document("k").unwrap();
        index.close().unwrap();
        assert_eq!(index.dropped_jobs(), 0);
        drop(index);

        let reopened = open(&path);
        assert_eq!(reopened.get_document("k"), Some(in_memory));
    }

    #[test]
    fn non_finite_vectors_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");

        let index = open(&path);
        index
            .add_document(doc("odd").with_vector(vec![
                f64::NAN,
                f64::INFINITY,
                f64::NEG_INFINITY,
                1.5,
            ]))
            .unwrap();
        index.add_document(doc("plain")).unwrap();
        index.close().unwrap();
        drop(index);

        let reopened = open(&path);
        assert_eq!(reopened.count(), 2);
        let v = reopened.get_document("odd").unwrap().vector;
        assert!(v[0].is_nan());
        assert_eq!(&v[1..], &[f64::INFINITY, f64::NEG_INFINITY, 1.5]);
    }

    #[test]
    fn close_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open(&tmp.path().join("index.redb"));
        index.add_document(doc("a")).unwrap();

        index.close().unwrap();
        index.close().unwrap();
        index.flush().unwrap();
        assert!(matches!(index.store_stats(), Err(Error::Closed)));
    }

    #[test]
    fn mutations_after_close_stay_in_memory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");
        let index = open(&path);
        index.close().unwrap();

        index.add_document(doc("late")).unwrap();
        assert_eq!(index.count(), 1);
        assert_eq!(index.dropped_jobs(), 0);
        drop(index);

        assert!(Store::open(&path).unwrap().is_empty().unwrap());
    }

    #[test]
    fn config_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");

        let mut cfg = IndexConfig::new();
        cfg.insert("max_results".into(), json!(10));
        cfg.insert("dimensions".into(), json!(["fileSize", "fileExtension"]));

        let index = open(&path);
        index.configure(cfg.clone()).unwrap();
        index.add_document(doc("a")).unwrap();
        index.close().unwrap();

        let reopened = open(&path);
        assert_eq!(reopened.show_config(), cfg);
        assert!(reopened.store_stats().unwrap().has_config);
    }

    #[test]
    fn corrupt_config_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");

        let index = open(&path);
        index.add_document(doc("a")).unwrap();
        index.close().unwrap();
        drop(index);
        put_raw_config(&path, b"{not json");

        let reopened = open(&path);
        assert_eq!(reopened.count(), 1);
        assert!(reopened.show_config().is_empty());
    }

    #[test]
    fn corrupt_document_fails_open() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");
        drop(Store::open(&path).unwrap());
        put_raw_document(&path, "bad", b"\xff\x00");

        let err = WriteBehindIndex::open(&path, WriteBehindOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn flush_syncs_while_open() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open(&tmp.path().join("index.redb"));
        index.add_document(doc("a")).unwrap();
        index.flush().unwrap();
        index.optimize().unwrap();
    }

    #[test]
    fn search_is_served_from_memory() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open(&tmp.path().join("index.redb"));

        let _pause = index.pause_worker();
        index
            .add_document(doc("a").with_meta("fileExtension", "go"))
            .unwrap();
        let results = index.search("fileExtension=go");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }
}
