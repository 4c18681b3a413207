//! Graph Builder
//!
//! Breadth-first discovery of every module reachable from the entry. The
//! thread calling [`GraphBuilder::discover`] is the only owner of the work
//! queue and the visited set; worker threads receive identities over a
//! channel, build them and send the records back. At most `jobs` builds are
//! in flight, each with its own deadline.

use std::{
    collections::VecDeque,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, trace, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    errors::{BuildError, DiscoveryError},
    module_builder::ModuleBuilder,
    transform::Transform,
    types::{ModuleId, ModuleRecord, ModuleTable},
};

/// Per-build deadline used when the caller does not supply one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Work sent from the coordinator to a worker
struct BuildJob {
    id: ModuleId,
}

/// Result sent from a worker back to the coordinator
struct BuildOutcome {
    id: ModuleId,
    result: Result<ModuleRecord, BuildError>,
}

/// Where a queued identity was first discovered
#[derive(Debug, Clone)]
struct Origin {
    importer: ModuleId,
    specifier: String,
}

#[derive(Debug)]
pub struct GraphBuilder<T> {
    builder: Arc<ModuleBuilder<T>>,
    jobs: usize,
    timeout: Duration,
}

impl<T: Transform + 'static> GraphBuilder<T> {
    pub fn new(builder: ModuleBuilder<T>) -> Self {
        Self {
            builder: Arc::new(builder),
            jobs: num_cpus::get().max(1),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Number of worker threads; values below one are raised to one
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Build every module reachable from `entry`.
    ///
    /// The returned table is sorted by identity. Any build failure aborts the
    /// whole discovery.
    pub fn discover(&self, entry: &ModuleId) -> Result<ModuleTable, DiscoveryError> {
        debug!(
            "Starting discovery from {entry} with {} worker(s), timeout {:?}",
            self.jobs, self.timeout
        );
        let (job_tx, job_rx) = channel::unbounded::<BuildJob>();
        let (result_tx, result_rx) = channel::unbounded::<BuildOutcome>();

        let mut workers = Vec::with_capacity(self.jobs);
        for index in 0..self.jobs {
            match self.spawn_worker(index, job_rx.clone(), result_tx.clone()) {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!("Failed to start discovery worker {index}: {err}"),
            }
        }
        drop(job_rx);
        drop(result_tx);

        if workers.is_empty() {
            return Err(DiscoveryError {
                module: entry.clone(),
                importer: None,
                specifier: None,
                source: BuildError::Parse {
                    path: entry.to_path_buf(),
                    message: "no discovery worker could be started".to_owned(),
                },
            });
        }

        let mut discovery = Discovery::new(entry.clone(), workers.len(), self.timeout);
        let outcome = discovery.run(&job_tx, &result_rx);
        drop(job_tx);
        // On failure, workers still inside a build are left to exit on their own
        outcome?;

        for worker in workers {
            if worker.join().is_err() {
                warn!("A discovery worker panicked after finishing its builds");
            }
        }
        Ok(discovery.finish())
    }

    fn spawn_worker(
        &self,
        index: usize,
        jobs: Receiver<BuildJob>,
        results: Sender<BuildOutcome>,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        let builder = Arc::clone(&self.builder);
        thread::Builder::new()
            .name(format!("jspack-build-{index}"))
            .spawn(move || {
                for job in jobs {
                    trace!("Worker {index} building {}", job.id);
                    let result = builder.build(&job.id);
                    if results
                        .send(BuildOutcome {
                            id: job.id,
                            result,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            })
    }
}

/// State of one discovery run
struct Discovery {
    entry: ModuleId,
    queue: VecDeque<ModuleId>,
    visited: FxHashSet<ModuleId>,
    origins: FxHashMap<ModuleId, Origin>,
    in_flight: FxHashMap<ModuleId, Instant>,
    table: ModuleTable,
    capacity: usize,
    timeout: Duration,
}

impl Discovery {
    fn new(entry: ModuleId, capacity: usize, timeout: Duration) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(entry.clone());
        Self {
            entry,
            queue,
            visited: FxHashSet::default(),
            origins: FxHashMap::default(),
            in_flight: FxHashMap::default(),
            table: ModuleTable::new(),
            capacity,
            timeout,
        }
    }

    fn run(
        &mut self,
        jobs: &Sender<BuildJob>,
        results: &Receiver<BuildOutcome>,
    ) -> Result<(), DiscoveryError> {
        loop {
            self.dispatch(jobs)?;

            let Some((next_id, deadline)) = self.earliest_deadline() else {
                return Ok(());
            };

            match results.recv_deadline(deadline) {
                Ok(BuildOutcome { id, result }) => {
                    self.in_flight.remove(&id);
                    match result {
                        Ok(record) => self.accept(record),
                        Err(source) => return Err(self.fail(id, source)),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let source = BuildError::Parse {
                        path: next_id.to_path_buf(),
                        message: format!(
                            "build did not finish within {} ms",
                            self.timeout.as_millis()
                        ),
                    };
                    return Err(self.fail(next_id, source));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let source = BuildError::Parse {
                        path: next_id.to_path_buf(),
                        message: "discovery worker exited before reporting".to_owned(),
                    };
                    return Err(self.fail(next_id, source));
                }
            }
        }
    }

    /// Pop queued identities and hand them to workers while capacity allows
    fn dispatch(&mut self, jobs: &Sender<BuildJob>) -> Result<(), DiscoveryError> {
        while self.in_flight.len() < self.capacity {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            if !self.visited.insert(id.clone()) {
                continue;
            }
            trace!("Dispatching {id}");
            if jobs.send(BuildJob { id: id.clone() }).is_err() {
                let source = BuildError::Parse {
                    path: id.to_path_buf(),
                    message: "no discovery worker is accepting builds".to_owned(),
                };
                return Err(self.fail(id, source));
            }
            self.in_flight.insert(id, Instant::now() + self.timeout);
        }
        Ok(())
    }

    fn earliest_deadline(&self) -> Option<(ModuleId, Instant)> {
        self.in_flight
            .iter()
            .min_by_key(|(id, deadline)| (**deadline, (*id).clone()))
            .map(|(id, deadline)| (id.clone(), *deadline))
    }

    fn accept(&mut self, record: ModuleRecord) {
        debug!("Discovered {} ({} deps)", record.id, record.deps.len());
        for (specifier, dependency) in &record.deps {
            if self.visited.contains(dependency) {
                continue;
            }
            self.origins
                .entry(dependency.clone())
                .or_insert_with(|| Origin {
                    importer: record.id.clone(),
                    specifier: specifier.clone(),
                });
            self.queue.push_back(dependency.clone());
        }
        self.table.insert(record);
    }

    fn fail(&self, module: ModuleId, source: BuildError) -> DiscoveryError {
        let origin = self.origins.get(&module);
        debug!(
            "Discovery failed at {module} after {} module(s)",
            self.table.len()
        );
        DiscoveryError {
            importer: origin.map(|o| o.importer.clone()),
            specifier: origin.map(|o| o.specifier.clone()),
            module,
            source,
        }
    }

    fn finish(mut self) -> ModuleTable {
        self.table.sort();
        debug!(
            "Discovery from {} finished with {} module(s)",
            self.entry,
            self.table.len()
        );
        self.table
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        path::{Path, PathBuf},
        sync::Mutex,
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        storage::{MemoryStorage, Storage},
        transform::{EsmTransform, Target},
    };

    /// Counts reads per path so tests can assert exactly-once builds
    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        reads: Mutex<FxHashMap<PathBuf, usize>>,
        delay: Option<Duration>,
    }

    impl CountingStorage {
        fn new(files: &[(&str, &str)]) -> Self {
            let inner = MemoryStorage::new();
            for (path, contents) in files {
                inner.add_file(*path, *contents);
            }
            Self {
                inner,
                ..Self::default()
            }
        }

        fn reads(&self, path: &str) -> usize {
            self.reads
                .lock()
                .unwrap()
                .get(Path::new(path))
                .copied()
                .unwrap_or(0)
        }
    }

    impl Storage for CountingStorage {
        fn read_file(&self, path: &Path) -> io::Result<String> {
            *self
                .reads
                .lock()
                .unwrap()
                .entry(path.to_path_buf())
                .or_default() += 1;
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            self.inner.read_file(path)
        }

        fn write_file(&self, path: &Path, contents: &str) -> io::Result<()> {
            self.inner.write_file(path, contents)
        }
    }

    fn graph(storage: Arc<CountingStorage>, jobs: usize) -> GraphBuilder<EsmTransform> {
        let builder = ModuleBuilder::new(EsmTransform::new(), storage, Target::Es5);
        GraphBuilder::new(builder).with_jobs(jobs)
    }

    fn id(path: &str) -> ModuleId {
        ModuleId::from_path(Path::new(path)).unwrap()
    }

    fn ids(table: &ModuleTable) -> Vec<&str> {
        table.ids().map(ModuleId::as_str).collect()
    }

    #[test]
    fn test_entry_with_two_imports() {
        let storage = Arc::new(CountingStorage::new(&[
            ("/app/main.js", "import a from './a.js';\nimport b from './b.js';\n"),
            ("/app/a.js", "export default 'a';"),
            ("/app/b.js", "export default 'b';"),
        ]));
        let table = graph(storage, 2).discover(&id("/app/main.js")).unwrap();

        assert_eq!(ids(&table), vec!["/app/a.js", "/app/b.js", "/app/main.js"]);
        let main = table.get(&id("/app/main.js")).unwrap();
        assert_eq!(main.deps["./a.js"], id("/app/a.js"));
        assert_eq!(main.deps["./b.js"], id("/app/b.js"));
    }

    #[test]
    fn test_diamond_builds_shared_dependency_once() {
        let storage = Arc::new(CountingStorage::new(&[
            ("/app/a.js", "import './b.js';\nimport './c.js';"),
            ("/app/b.js", "import './d.js';"),
            ("/app/c.js", "import './d.js';"),
            ("/app/d.js", "export const d = 1;"),
        ]));
        let table = graph(Arc::clone(&storage), 4)
            .discover(&id("/app/a.js"))
            .unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(storage.reads("/app/d.js"), 1);
        assert!(table.missing_dependencies().is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let storage = Arc::new(CountingStorage::new(&[
            ("/app/a.js", "import './b.js';"),
            ("/app/b.js", "import './a.js';"),
        ]));
        let table = graph(Arc::clone(&storage), 1)
            .discover(&id("/app/a.js"))
            .unwrap();

        assert_eq!(ids(&table), vec!["/app/a.js", "/app/b.js"]);
        assert_eq!(storage.reads("/app/a.js"), 1);
        assert_eq!(storage.reads("/app/b.js"), 1);
    }

    #[test]
    fn test_self_import() {
        let storage = Arc::new(CountingStorage::new(&[(
            "/app/a.js",
            "import * as me from './a.js';",
        )]));
        let table = graph(storage, 2).discover(&id("/app/a.js")).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_different_spellings_of_one_file_build_once() {
        let storage = Arc::new(CountingStorage::new(&[
            ("/app/main.js", "import './lib/x.js';\nimport './lib/../lib/x.js';"),
            ("/app/lib/x.js", ""),
        ]));
        let table = graph(Arc::clone(&storage), 2)
            .discover(&id("/app/main.js"))
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(storage.reads("/app/lib/x.js"), 1);
        assert_eq!(table.get(&id("/app/main.js")).unwrap().deps.len(), 2);
    }

    #[test]
    fn test_missing_import_names_importer_and_specifier() {
        let storage = Arc::new(CountingStorage::new(&[
            ("/app/main.js", "import './ok.js';"),
            ("/app/ok.js", "import x from './missing.js';"),
        ]));
        let err = graph(storage, 2)
            .discover(&id("/app/main.js"))
            .unwrap_err();

        assert_eq!(err.module, id("/app/missing.js"));
        assert_eq!(err.importer, Some(id("/app/ok.js")));
        assert_eq!(err.specifier.as_deref(), Some("./missing.js"));
        assert_eq!(err.source.kind(), "ParseError");
    }

    #[test]
    fn test_missing_entry() {
        let storage = Arc::new(CountingStorage::new(&[]));
        let err = graph(storage, 1).discover(&id("/app/main.js")).unwrap_err();
        assert_eq!(err.module, id("/app/main.js"));
        assert_eq!(err.importer, None);
    }

    #[test]
    fn test_slow_build_times_out() {
        let storage = Arc::new(CountingStorage {
            delay: Some(Duration::from_millis(500)),
            ..CountingStorage::new(&[("/app/main.js", "")])
        });
        let err = graph(storage, 1)
            .with_timeout(Duration::from_millis(20))
            .discover(&id("/app/main.js"))
            .unwrap_err();

        assert_eq!(err.source.kind(), "ParseError");
        assert!(
            err.source.to_string().contains("did not finish within 20 ms"),
            "{err:?}"
        );
    }

    #[test]
    fn test_discovery_is_deterministic_across_worker_counts() {
        let files = [
            ("/app/main.js", "import './a.js';\nimport './b.js';\nimport './c.js';"),
            ("/app/a.js", "import './shared.js';"),
            ("/app/b.js", "import './shared.js';\nimport './c.js';"),
            ("/app/c.js", "import './a.js';"),
            ("/app/shared.js", "export const value = 1;"),
        ];
        let single = graph(Arc::new(CountingStorage::new(&files)), 1)
            .discover(&id("/app/main.js"))
            .unwrap();
        let parallel = graph(Arc::new(CountingStorage::new(&files)), 8)
            .discover(&id("/app/main.js"))
            .unwrap();

        assert_eq!(ids(&single), ids(&parallel));
        for (left, right) in single.iter().zip(parallel.iter()) {
            assert_eq!(left, right);
        }
    }
}
