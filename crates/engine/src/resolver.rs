//! Entry resolver registry
//!
//! Converts between opaque [`EntryReference`]s and live entries without the
//! caller knowing which repository owns a given entry type.
//!
//! ## Dispatch
//!
//! Each resolver declares the type tags it handles. Lookup is a direct map
//! access on the tag; resolvers that declare no tags are wildcards and are
//! asked through their `accepts_*` predicates. Exactly one resolver must
//! accept: none, or more than one, is an `InvalidReference`. Registering a
//! tag that is already taken is a `Configuration` error.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = EntryResolverRegistry::new("https://archive.example.org/entries");
//! let reg = registry.register(Arc::new(RepositoryResolver::new(works)))?;
//!
//! let entry = registry.resolve(&EntryReference::new("work", "7"))?;
//! let token = registry.tokenize(&registry.reference_of(entry.as_ref())?)?;
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use folio_core::{EntryReference, FolioError, FolioResult, Registration};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Separator between id and type inside a token
pub const TOKEN_SEPARATOR: &str = "::";

/// A live entry handed out by a resolver
pub trait EntryObject: Any + Send + Sync + Debug {
    /// Type tag ("work", "person")
    fn entry_type(&self) -> &str;

    /// Entry id
    fn entry_id(&self) -> &str;

    /// Downcast support
    fn as_any(&self) -> &dyn Any;
}

/// Per-entry-type adapter between references and entries
///
/// `accepts_*` must be fast and free of side effects; the registry may call
/// them on every lookup.
pub trait EntryResolver: Send + Sync {
    /// Name used in logs and ambiguity errors
    fn name(&self) -> &str;

    /// Type tags handled by this resolver; empty makes it a wildcard
    fn entry_types(&self) -> Vec<String>;

    /// Whether this resolver handles a reference
    fn accepts_reference(&self, reference: &EntryReference) -> bool {
        self.entry_types()
            .iter()
            .any(|t| t == reference.entry_type())
    }

    /// Whether this resolver handles an entry
    fn accepts_entry(&self, entry: &dyn EntryObject) -> bool {
        self.entry_types().iter().any(|t| t == entry.entry_type())
    }

    /// Load the entry a reference points at
    fn resolve(&self, reference: &EntryReference) -> FolioResult<Arc<dyn EntryObject>>;

    /// Reference pointing at an entry
    fn reference(&self, entry: &dyn EntryObject) -> EntryReference {
        EntryReference::new(entry.entry_type(), entry.entry_id())
    }

    /// Canonical URI of a referenced entry
    fn uri(&self, base_uri: &str, reference: &EntryReference) -> String {
        format!(
            "{}/{}/{}",
            base_uri.trim_end_matches('/'),
            reference.entry_type(),
            reference.id()
        )
    }
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    /// Resolvers by registration id (registration order)
    resolvers: BTreeMap<u64, Arc<dyn EntryResolver>>,
    /// Type tag -> registration id
    by_type: HashMap<String, u64>,
    /// Registration ids of resolvers without declared tags
    wildcards: Vec<u64>,
}

impl RegistryState {
    fn remove(&mut self, id: u64) -> bool {
        if self.resolvers.remove(&id).is_none() {
            return false;
        }
        self.by_type.retain(|_, owner| *owner != id);
        self.wildcards.retain(|w| *w != id);
        true
    }

    /// Every resolver accepting the candidate, typed match first
    fn acceptors(
        &self,
        tag: &str,
        accepts: impl Fn(&dyn EntryResolver) -> bool,
    ) -> Vec<Arc<dyn EntryResolver>> {
        let typed = self
            .by_type
            .get(tag)
            .and_then(|id| self.resolvers.get(id))
            .filter(|r| accepts(Arc::as_ref(r)));
        let wild = self
            .wildcards
            .iter()
            .filter_map(|id| self.resolvers.get(id))
            .filter(|r| accepts(Arc::as_ref(r)));
        typed.into_iter().chain(wild).cloned().collect()
    }
}

/// Registry of entry resolvers
///
/// Cheap to clone; clones share the same registrations. Lookups take a read
/// lock, so registration is safe against concurrent resolution.
#[derive(Clone)]
pub struct EntryResolverRegistry {
    state: Arc<RwLock<RegistryState>>,
    base_uri: Arc<str>,
}

impl EntryResolverRegistry {
    /// Create an empty registry producing URIs under `base_uri`
    pub fn new(base_uri: impl Into<String>) -> Self {
        let base: String = base_uri.into();
        EntryResolverRegistry {
            state: Arc::new(RwLock::new(RegistryState::default())),
            base_uri: Arc::from(base.trim_end_matches('/')),
        }
    }

    /// Add a resolver
    ///
    /// Fails with `Configuration` if one of its type tags is already handled.
    pub fn register(&self, resolver: Arc<dyn EntryResolver>) -> FolioResult<Registration> {
        let tags = resolver.entry_types();
        let name = resolver.name().to_string();

        let id = {
            let mut state = self.state.write();
            for tag in &tags {
                if let Some(owner) = state.by_type.get(tag).and_then(|id| state.resolvers.get(id)) {
                    return Err(FolioError::configuration(format!(
                        "resolver '{}' cannot register type '{}': already handled by '{}'",
                        name,
                        tag,
                        owner.name()
                    )));
                }
            }

            let id = state.next_id;
            state.next_id += 1;
            if tags.is_empty() {
                state.wildcards.push(id);
            }
            for tag in &tags {
                state.by_type.insert(tag.clone(), id);
            }
            state.resolvers.insert(id, resolver);
            id
        };

        debug!(target: "folio::resolver", resolver = %name, types = ?tags, "resolver registered");

        let weak: Weak<RwLock<RegistryState>> = Arc::downgrade(&self.state);
        let label = format!("resolver {}", name);
        Ok(Registration::new(label, move || {
            if let Some(state) = weak.upgrade() {
                if state.write().remove(id) {
                    debug!(target: "folio::resolver", resolver = %name, "resolver unregistered");
                }
            }
        }))
    }

    /// The single resolver accepting a reference
    pub fn resolver_for(&self, reference: &EntryReference) -> FolioResult<Arc<dyn EntryResolver>> {
        let found = self
            .state
            .read()
            .acceptors(reference.entry_type(), |r| r.accepts_reference(reference));
        single(found, || format!("reference {}", reference))
    }

    /// The single resolver accepting an entry
    pub fn resolver_for_entry(&self, entry: &dyn EntryObject) -> FolioResult<Arc<dyn EntryResolver>> {
        let found = self
            .state
            .read()
            .acceptors(entry.entry_type(), |r| r.accepts_entry(entry));
        single(found, || {
            format!("entry {}:{}", entry.entry_type(), entry.entry_id())
        })
    }

    /// Load the entry a reference points at
    pub fn resolve(&self, reference: &EntryReference) -> FolioResult<Arc<dyn EntryObject>> {
        // Resolve outside the registry lock; resolvers may hit storage
        self.resolver_for(reference)?.resolve(reference)
    }

    /// Reference pointing at an entry
    pub fn reference_of(&self, entry: &dyn EntryObject) -> FolioResult<EntryReference> {
        Ok(self.resolver_for_entry(entry)?.reference(entry))
    }

    /// Canonical URI of a referenced entry
    pub fn uri_of(&self, reference: &EntryReference) -> FolioResult<String> {
        Ok(self.resolver_for(reference)?.uri(&self.base_uri, reference))
    }

    /// Pack a reference into an opaque token
    ///
    /// The version is not carried. Ids containing [`TOKEN_SEPARATOR`] and
    /// type tags containing ':' cannot be tokenized; every other id, including
    /// one ending in ':', round-trips.
    pub fn tokenize(&self, reference: &EntryReference) -> FolioResult<String> {
        let id = reference.id();
        let entry_type = reference.entry_type();
        if id.is_empty() || entry_type.is_empty() {
            return Err(FolioError::invalid_reference(format!(
                "cannot tokenize {}: empty id or type",
                reference
            )));
        }
        if id.contains(TOKEN_SEPARATOR) {
            return Err(FolioError::invalid_reference(format!(
                "cannot tokenize {}: id contains '{}'",
                reference, TOKEN_SEPARATOR
            )));
        }
        if entry_type.contains(':') {
            return Err(FolioError::invalid_reference(format!(
                "cannot tokenize {}: type contains ':'",
                reference
            )));
        }
        let raw = format!("{}{}{}", id, TOKEN_SEPARATOR, entry_type);
        Ok(URL_SAFE_NO_PAD.encode(raw.as_bytes()))
    }

    /// Unpack a token produced by [`EntryResolverRegistry::tokenize`]
    pub fn decode_token(&self, token: &str) -> FolioResult<EntryReference> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| FolioError::invalid_reference(format!("malformed token: {}", e)))?;
        let raw = String::from_utf8(bytes)
            .map_err(|_| FolioError::invalid_reference("malformed token: not utf-8"))?;

        // The type tag has no ':', so the last separator is the join
        match raw.rsplit_once(TOKEN_SEPARATOR) {
            Some((id, entry_type))
                if !id.is_empty()
                    && !entry_type.is_empty()
                    && !entry_type.contains(':')
                    && !id.contains(TOKEN_SEPARATOR) =>
            {
                Ok(EntryReference::new(entry_type, id))
            }
            _ => Err(FolioError::invalid_reference(format!(
                "malformed token: expected '<id>{}<type>'",
                TOKEN_SEPARATOR
            ))),
        }
    }

    /// Decode a token and load its entry
    pub fn resolve_token(&self, token: &str) -> FolioResult<Arc<dyn EntryObject>> {
        self.resolve(&self.decode_token(token)?)
    }

    /// Base of canonical URIs
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Type tags with a dedicated resolver, sorted
    pub fn entry_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.state.read().by_type.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Number of registered resolvers
    pub fn len(&self) -> usize {
        self.state.read().resolvers.len()
    }

    /// Whether no resolver is registered
    pub fn is_empty(&self) -> bool {
        self.state.read().resolvers.is_empty()
    }
}

fn single(
    mut found: Vec<Arc<dyn EntryResolver>>,
    what: impl FnOnce() -> String,
) -> FolioResult<Arc<dyn EntryResolver>> {
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(FolioError::invalid_reference(format!(
            "no resolver accepts {}",
            what()
        ))),
        _ => {
            let names: Vec<&str> = found.iter().map(|r| r.name()).collect();
            Err(FolioError::invalid_reference(format!(
                "{} is accepted by several resolvers: {}",
                what(),
                names.join(", ")
            )))
        }
    }
}

impl std::fmt::Debug for EntryResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("EntryResolverRegistry")
            .field("base_uri", &self.base_uri)
            .field("resolvers", &state.resolvers.len())
            .field("wildcards", &state.wildcards.len())
            .finish()
    }
}
