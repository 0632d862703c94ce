//! Folio - entry kernel for a bibliographic archive
//!
//! Folio holds the pieces every archive service needs around its entries:
//! context-scoped id allocation with batched grants, staged edit commands
//! with nested reconciliation, asynchronous update notification and
//! reference resolution across entry types.
//!
//! # Quick Start
//!
//! ```ignore
//! use folio::{EditCommand, Folio};
//!
//! let folio = Folio::in_memory()?;
//!
//! let mut cmd = folio.works().create()?;
//! cmd.set_title("Frankenstein");
//! let id = cmd.execute().await?;
//!
//! let work = folio.works().load(&id)?;
//! ```
//!
//! # Architecture
//!
//! [`Folio`] is the bootstrap: it owns the allocator, the dispatch pool, the
//! repositories and the resolver registry, and passes them to each other
//! explicitly. Nothing in the kernel is a global.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

pub use folio_core::{
    EntryReference, FolioError, FolioResult, IdContext, Registration, UpdateAction, UpdateEvent,
};
pub use folio_engine::{
    CommitHandle, DispatchPool, EditCommand, EditPersonCommand, EditWorkCommand, Edition,
    EditionDto, EditionMutator, Entry, EntryObject, EntryResolver, EntryResolverRegistry,
    FolioConfig, NotifierConfig, Person, PersonDto, PersonRepository, PoolStats, Repository,
    RepositoryResolver, ResolverConfig, ShutdownReport, UpdateListener, UpdateNotifier, Volume,
    VolumeDto, VolumeMutator, Work, WorkDto, WorkRepository,
};
pub use folio_ids::{AllocatorConfig, ContextStats, IdAllocator, IdFactory};
pub use folio_storage::{
    CounterStore, DocumentStore, MemoryCounterStore, MemoryDocumentStore, WriteCondition,
};

/// A running kernel
pub struct Folio {
    config: FolioConfig,
    ids: Arc<IdAllocator>,
    pool: Arc<DispatchPool>,
    works: WorkRepository,
    people: PersonRepository,
    resolvers: EntryResolverRegistry,
    // Held so the bootstrap resolvers stay removable
    resolver_registrations: Vec<Registration>,
}

impl Folio {
    /// Wire a kernel over the given stores
    pub fn open(
        config: FolioConfig,
        counters: Arc<dyn CounterStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> FolioResult<Self> {
        config.validate()?;

        let ids = Arc::new(IdAllocator::new(counters, config.ids.clone())?);
        let pool = Arc::new(DispatchPool::new(
            config.notifier.workers,
            config.notifier.queue_capacity,
        ));

        let works = Repository::<Work>::new(
            Arc::clone(&documents),
            Arc::clone(&ids),
            UpdateNotifier::new(Work::ENTRY_TYPE, Arc::clone(&pool)),
        )?;
        let people = Repository::<Person>::new(
            documents,
            Arc::clone(&ids),
            UpdateNotifier::new(Person::ENTRY_TYPE, Arc::clone(&pool)),
        )?;

        let resolvers = EntryResolverRegistry::new(config.resolver.base_uri.clone());
        let resolver_registrations = vec![
            resolvers.register(Arc::new(RepositoryResolver::new(works.clone())))?,
            resolvers.register(Arc::new(RepositoryResolver::new(people.clone())))?,
        ];

        info!(
            target: "folio",
            grant_size = config.ids.grant_size,
            workers = config.notifier.workers,
            obfuscated = config.ids.obfuscation_key.is_some(),
            "kernel opened"
        );

        Ok(Folio {
            config,
            ids,
            pool,
            works: WorkRepository::new(works),
            people: PersonRepository::new(people),
            resolvers,
            resolver_registrations,
        })
    }

    /// Kernel over fresh in-memory stores with default settings
    pub fn in_memory() -> FolioResult<Self> {
        Self::open(
            FolioConfig::default(),
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryDocumentStore::new()),
        )
    }

    /// Kernel configured from a `folio.toml`, created with defaults if missing
    pub fn from_config_file(
        path: &Path,
        counters: Arc<dyn CounterStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> FolioResult<Self> {
        FolioConfig::write_default_if_missing(path)?;
        Self::open(FolioConfig::from_file(path)?, counters, documents)
    }

    /// Active configuration
    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    /// Id allocator
    pub fn ids(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    /// Work repository
    pub fn works(&self) -> &WorkRepository {
        &self.works
    }

    /// Person repository
    pub fn people(&self) -> &PersonRepository {
        &self.people
    }

    /// Resolver registry with both repositories registered
    pub fn resolvers(&self) -> &EntryResolverRegistry {
        &self.resolvers
    }

    /// Listener dispatch counters
    pub fn dispatch_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Close both notifiers and stop the dispatch pool
    ///
    /// Pending listener calls get the configured grace period. Repositories
    /// keep working afterwards; their writes are no longer announced.
    pub fn shutdown(&self) -> ShutdownReport {
        self.works.repository().notifier().close();
        self.people.repository().notifier().close();
        let report = self.pool.shutdown(self.config.notifier.shutdown_grace());
        info!(
            target: "folio",
            completed = report.completed,
            abandoned = report.abandoned,
            "kernel shut down"
        );
        report
    }

    /// Registrations of the bootstrap resolvers (work, person)
    pub fn resolver_registrations(&self) -> &[Registration] {
        &self.resolver_registrations
    }
}

impl std::fmt::Debug for Folio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Folio")
            .field("config", &self.config)
            .field("ids", &self.ids)
            .field("resolvers", &self.resolvers)
            .finish()
    }
}
