//! Context-scoped id allocation
//!
//! The allocator is an explicitly constructed, process-scoped object owned by
//! the application bootstrap. It keeps one [`IdGenerator`] per context;
//! calls for the same context serialize on that generator's lock, calls for
//! different contexts never contend.

use dashmap::DashMap;
use folio_core::{FolioError, FolioResult, IdContext};
use folio_storage::CounterStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::encoder::{IdEncoder, ObfuscatingEncoder, PlainEncoder};
use crate::generator::IdGenerator;

/// Allocation tuning, persisted in `folio.toml` under `[ids]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Ids reserved per grant
    #[serde(default = "default_grant_size")]
    pub grant_size: u64,
    /// Compare-and-set attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Enables reversible obfuscation of issued ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscation_key: Option<u64>,
}

fn default_grant_size() -> u64 {
    20
}

fn default_max_attempts() -> usize {
    8
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            grant_size: default_grant_size(),
            max_attempts: default_max_attempts(),
            obfuscation_key: None,
        }
    }
}

impl AllocatorConfig {
    /// Set the grant size
    pub fn with_grant_size(mut self, grant_size: u64) -> Self {
        self.grant_size = grant_size;
        self
    }

    /// Set the attempt budget
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Enable obfuscation with a key
    pub fn with_obfuscation_key(mut self, key: u64) -> Self {
        self.obfuscation_key = Some(key);
        self
    }

    /// Reject values the generator cannot work with
    pub fn validate(&self) -> FolioResult<()> {
        if self.grant_size == 0 {
            return Err(FolioError::configuration("ids.grant_size must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(FolioError::configuration("ids.max_attempts must be at least 1"));
        }
        Ok(())
    }

    fn encoder(&self) -> Arc<dyn IdEncoder> {
        match self.obfuscation_key {
            Some(key) => Arc::new(ObfuscatingEncoder::new(key)),
            None => Arc::new(PlainEncoder),
        }
    }
}

/// Counters for one context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStats {
    /// The context
    pub context: IdContext,
    /// Grants reserved by this process
    pub grants_acquired: u64,
    /// Ids handed out by this process
    pub ids_issued: u64,
}

/// Process-wide id allocator
pub struct IdAllocator {
    store: Arc<dyn CounterStore>,
    config: AllocatorConfig,
    encoder: Arc<dyn IdEncoder>,
    generators: DashMap<IdContext, Arc<IdGenerator>>,
}

impl IdAllocator {
    /// Create an allocator over a counter store
    pub fn new(store: Arc<dyn CounterStore>, config: AllocatorConfig) -> FolioResult<Self> {
        config.validate()?;
        Ok(IdAllocator {
            store,
            encoder: config.encoder(),
            config,
            generators: DashMap::new(),
        })
    }

    /// Factory for a context, creating its generator on first use
    pub fn id_factory(&self, context: &IdContext) -> IdFactory {
        let generator = self
            .generators
            .entry(context.clone())
            .or_insert_with(|| {
                Arc::new(IdGenerator::new(
                    context.clone(),
                    Arc::clone(&self.store),
                    self.config.grant_size,
                    self.config.max_attempts,
                ))
            })
            .clone();
        IdFactory {
            generator,
            encoder: Arc::clone(&self.encoder),
        }
    }

    /// Factory for a root context given by name
    pub fn id_factory_named(&self, name: &str) -> FolioResult<IdFactory> {
        Ok(self.id_factory(&IdContext::new(name)?))
    }

    /// Issue one id in a context
    pub fn next(&self, context: &IdContext) -> FolioResult<String> {
        self.id_factory(context).next()
    }

    /// The encoder applied to issued ids
    pub fn encoder(&self) -> &Arc<dyn IdEncoder> {
        &self.encoder
    }

    /// Active configuration
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Per-context counters, ordered by context
    pub fn stats(&self) -> Vec<ContextStats> {
        let mut stats: Vec<ContextStats> = self
            .generators
            .iter()
            .map(|entry| ContextStats {
                context: entry.key().clone(),
                grants_acquired: entry.value().grants_acquired(),
                ids_issued: entry.value().ids_issued(),
            })
            .collect();
        stats.sort_by(|a, b| a.context.cmp(&b.context));
        stats
    }

    /// Counters for one context, `None` if it was never used
    pub fn context_stats(&self, context: &IdContext) -> Option<ContextStats> {
        self.generators.get(context).map(|g| ContextStats {
            context: context.clone(),
            grants_acquired: g.grants_acquired(),
            ids_issued: g.ids_issued(),
        })
    }
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator")
            .field("config", &self.config)
            .field("contexts", &self.generators.len())
            .finish()
    }
}

/// Handle issuing ids for one context
#[derive(Clone)]
pub struct IdFactory {
    generator: Arc<IdGenerator>,
    encoder: Arc<dyn IdEncoder>,
}

impl IdFactory {
    /// Issue the next id, encoded
    pub fn next(&self) -> FolioResult<String> {
        Ok(self.encoder.encode(self.generator.next_value()?))
    }

    /// Issue the next id as its raw integer
    pub fn next_value(&self) -> FolioResult<u64> {
        self.generator.next_value()
    }

    /// Context this factory issues for
    pub fn context(&self) -> &IdContext {
        self.generator.context()
    }
}

impl std::fmt::Debug for IdFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdFactory")
            .field("context", self.generator.context())
            .finish()
    }
}
