//! End-to-end tests through the `Folio` bootstrap
//!
//! ```bash
//! cargo test --test end_to_end
//! ```

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Once};
use std::thread;
use std::time::Duration;

use folio::{
    EditCommand, EntryReference, Folio, FolioConfig, FolioError, MemoryCounterStore,
    MemoryDocumentStore, UpdateAction, UpdateEvent, Work, WorkDto,
};
use parking_lot::Mutex;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn folio() -> Folio {
    init_tracing();
    Folio::in_memory().unwrap()
}

// ============================================================================
// SECTION 1: Allocation
// ============================================================================

mod allocation {
    use super::*;

    #[test]
    fn works_context_issues_distinct_increasing_ids() {
        let folio = folio();
        let factory = folio.ids().id_factory_named("works").unwrap();
        let ids: Vec<u64> = (0..3)
            .map(|_| factory.next().unwrap().parse().unwrap())
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn repositories_draw_from_their_collection_context() {
        let folio = folio();
        let first_work = folio.works().create().unwrap();
        let first_person = folio.people().create().unwrap();
        assert_eq!(first_work.id(), "1");
        assert_eq!(first_person.id(), "1");

        let contexts: Vec<String> = folio
            .ids()
            .stats()
            .into_iter()
            .map(|s| s.context.to_string())
            .collect();
        assert_eq!(contexts, vec!["people", "works"]);
    }

    #[test]
    fn concurrent_creates_never_collide() {
        let folio = Arc::new(folio());
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let folio = Arc::clone(&folio);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (0..50)
                        .map(|_| folio.works().create().unwrap().id().to_string())
                        .collect::<Vec<String>>()
                })
            })
            .collect();

        let ids: HashSet<String> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 300);
    }
}

// ============================================================================
// SECTION 2: Edit lifecycle
// ============================================================================

mod edit_lifecycle {
    use super::*;

    #[tokio::test]
    async fn create_then_patch_summary_keeps_title() {
        let folio = folio();

        let mut cmd = folio.works().create().unwrap();
        cmd.set_title("Foo");
        let id = cmd.execute().await.unwrap();

        let mut cmd = folio.works().edit(&id).unwrap();
        cmd.set_all(&WorkDto {
            summary: Some("A short novel".into()),
            ..Default::default()
        });
        cmd.execute().await.unwrap();

        let work = folio.works().load(&id).unwrap();
        assert_eq!(work.title, "Foo");
        assert_eq!(work.summary.as_deref(), Some("A short novel"));
    }

    #[tokio::test]
    async fn listeners_observe_create_update_delete() {
        let folio = folio();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let registration = folio
            .works()
            .repository()
            .notifier()
            .register(move |e: &UpdateEvent<Work>| {
                tx.lock().send((e.action(), e.entity_id().to_string()))?;
                Ok(())
            })
            .unwrap();

        let mut cmd = folio.works().create().unwrap();
        cmd.set_title("Foo");
        let id = cmd.execute().await.unwrap();
        let mut cmd = folio.works().edit(&id).unwrap();
        cmd.set_title("Bar");
        cmd.execute().await.unwrap();
        folio.works().delete(&id).unwrap();

        let mut seen: Vec<UpdateAction> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().0)
            .collect();
        // Delivery order across events is not promised
        seen.sort_by_key(|a| a.to_string());
        assert_eq!(
            seen,
            vec![UpdateAction::Create, UpdateAction::Delete, UpdateAction::Update]
        );

        registration.unregister();
        assert_eq!(folio.works().repository().notifier().listener_count(), 0);
    }

    #[tokio::test]
    async fn authors_resolve_across_repositories() {
        let folio = folio();

        let mut cmd = folio.people().create().unwrap();
        cmd.set_display_name("Mary Shelley");
        let pid = cmd.execute().await.unwrap();

        let mut cmd = folio.works().create().unwrap();
        cmd.set_title("Frankenstein")
            .add_author(EntryReference::new("person", &pid));
        let wid = cmd.execute().await.unwrap();

        let work = folio.works().load(&wid).unwrap();
        let token = folio.resolvers().tokenize(&work.authors[0]).unwrap();
        let author = folio.resolvers().resolve_token(&token).unwrap();
        assert_eq!(author.entry_type(), "person");
        assert_eq!(author.entry_id(), pid);
        assert_eq!(
            folio.resolvers().uri_of(&work.authors[0]).unwrap(),
            format!("https://archive.example.org/entries/person/{}", pid)
        );
    }
}

// ============================================================================
// SECTION 3: Bootstrap
// ============================================================================

mod bootstrap {
    use super::*;

    #[test]
    fn config_file_drives_allocator_and_resolver() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(
            &path,
            "[ids]\nobfuscation_key = 4242\n\n[resolver]\nbase_uri = \"https://example.test/e/\"\n",
        )
        .unwrap();

        let folio = Folio::from_config_file(
            &path,
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryDocumentStore::new()),
        )
        .unwrap();

        let id = folio.works().create().unwrap().id().to_string();
        assert_ne!(id, "1");
        assert_eq!(folio.ids().encoder().decode(&id).unwrap(), 1);
        assert_eq!(
            folio
                .resolvers()
                .uri_of(&EntryReference::new("work", "x"))
                .unwrap(),
            "https://example.test/e/work/x"
        );
    }

    #[test]
    fn missing_config_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folio.toml");
        let folio = Folio::from_config_file(
            &path,
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryDocumentStore::new()),
        )
        .unwrap();
        assert!(path.exists());
        assert_eq!(folio.config(), &FolioConfig::default());
    }

    #[test]
    fn invalid_config_rejected() {
        let mut config = FolioConfig::default();
        config.ids.max_attempts = 0;
        let err = Folio::open(
            config,
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryDocumentStore::new()),
        )
        .unwrap_err();
        assert!(matches!(err, FolioError::Configuration(_)));
    }

    #[test]
    fn shutdown_closes_notifiers_but_not_repositories() {
        let folio = folio();
        let report = folio.shutdown();
        assert_eq!(report.abandoned, 0);
        assert!(folio.works().repository().notifier().is_closed());

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut cmd = folio.people().create().unwrap();
        cmd.set_display_name("after shutdown");
        let id = rt.block_on(cmd.execute()).unwrap();
        assert!(folio.people().get(&id).unwrap().is_some());
    }

    #[test]
    fn bootstrap_resolvers_can_be_removed() {
        let folio = folio();
        assert_eq!(folio.resolvers().len(), 2);
        for registration in folio.resolver_registrations() {
            assert!(registration.unregister());
        }
        assert!(folio.resolvers().is_empty());
        assert!(folio
            .resolvers()
            .resolve(&EntryReference::new("work", "1"))
            .unwrap_err()
            .is_invalid_reference());
    }
}
