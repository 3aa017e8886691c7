#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mockall::mock;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::tempdir;

    use crate::config::Config;
    use crate::error::{HarvestError, Result};
    use crate::harvest::testing::{card, test_config, RecordingNotifier, ScriptedNavigator};
    use crate::harvest::{Collaborators, SearchOrchestrator, SessionState};
    use crate::parser::ListingRecord;
    use crate::storage::{
        ArtifactStore, Exporter, FileSeenRegistry, ImageFetcher, InMemorySeenRegistry, SeenRegistry, SeenSet,
    };

    mock! {
        pub Exporter {}
        #[async_trait]
        impl Exporter for Exporter {
            async fn write_table(&self, records: &[ListingRecord], label: &str) -> Result<PathBuf>;
        }
    }

    mock! {
        pub ImageFetcher {}
        #[async_trait]
        impl ImageFetcher for ImageFetcher {
            async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
        }
    }

    struct UnreadableRegistry;

    #[async_trait]
    impl SeenRegistry for UnreadableRegistry {
        async fn load(&self) -> Result<SeenSet> {
            Err(HarvestError::StorageError("permission denied".to_string()).into())
        }

        async fn append(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn exporter_writing(times: usize, dir: &Path) -> MockExporter {
        let dir = dir.to_path_buf();
        let mut exporter = MockExporter::new();
        exporter
            .expect_write_table()
            .times(times)
            .returning(move |_, label| Ok(dir.join(format!("results_{}.csv", label))));
        exporter
    }

    fn orchestrator(
        config: Config,
        navigator: Arc<ScriptedNavigator>,
        registry: Arc<dyn SeenRegistry>,
        exporter: MockExporter,
        notifier: Arc<RecordingNotifier>,
        image_fetcher: MockImageFetcher,
    ) -> SearchOrchestrator {
        let artifacts = ArtifactStore::new(config.output.screenshots_dir.clone(), config.output.images_dir.clone());
        SearchOrchestrator::new(
            config,
            Collaborators {
                navigator,
                registry,
                exporter: Arc::new(exporter),
                notifier,
                image_fetcher: Arc::new(image_fetcher),
                artifacts,
            },
        )
    }

    fn files_starting_with(dir: &Path, prefix: &str) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
                    .count()
            })
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_failed_session_does_not_stop_the_run() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek", "orbea", "giant"]);
        let navigator = Arc::new(
            ScriptedNavigator::new()
                .with_cards("trek", vec![card("trek-1", "Trek Marlin", "450 €")])
                .with_cards("giant", vec![card("giant-1", "Giant Talon", "600 €")])
                .failing_for("orbea"),
        );
        let notifier = Arc::new(RecordingNotifier::new());

        let orchestrator = orchestrator(
            config.clone(),
            navigator.clone(),
            Arc::new(InMemorySeenRegistry::new()),
            exporter_writing(2, temp_dir.path()),
            notifier.clone(),
            MockImageFetcher::new(),
        );

        let summary = orchestrator.run().await.unwrap();

        let states: Vec<SessionState> = summary.sessions.iter().map(|s| s.state).collect();
        assert_eq!(states, vec![SessionState::Done, SessionState::Failed, SessionState::Done]);
        assert!(summary.sessions[1].error.as_deref().unwrap().contains("exceeded"));
        assert!(summary.sessions[1].records.is_empty());
        assert_eq!(summary.failed_sessions(), 1);
        assert_eq!(summary.total_unique(), 2);
        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(files_starting_with(&config.output.screenshots_dir, "error_orbea_"), 1);
        assert_eq!(files_starting_with(&config.output.screenshots_dir, "search_"), 2);
    }

    #[tokio::test]
    async fn test_cross_term_duplicates_counted_once() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek", "bike"]);
        let navigator = Arc::new(
            ScriptedNavigator::new()
                .with_cards("trek", vec![card("dup-1", "Trek Marlin", "450 €"), card("t-2", "Trek Roscoe", "700 €")])
                .with_cards("bike", vec![card("dup-1", "Trek Marlin", "450 €"), card("b-3", "BH Spike", "300 €")]),
        );
        let registry = Arc::new(InMemorySeenRegistry::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let orchestrator = orchestrator(
            config,
            navigator,
            registry.clone(),
            exporter_writing(2, temp_dir.path()),
            notifier.clone(),
            MockImageFetcher::new(),
        );

        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.sessions[0].records.len(), 2);
        assert_eq!(summary.sessions[1].records.len(), 1);
        assert_eq!(summary.sessions[1].records[0].id, "b-3");
        assert_eq!(summary.total_unique(), 3);
        assert_eq!(orchestrator.found_so_far(), 3);
        assert!(summary.unique.contains_key("dup-1"));
        assert_eq!(registry.appended(), vec!["dup-1", "t-2", "b-3"]);

        let batches: Vec<Vec<String>> = notifier.sent().into_iter().map(|(ids, _)| ids).collect();
        assert_eq!(batches, vec![vec!["dup-1".to_string(), "t-2".to_string()], vec!["b-3".to_string()]]);
    }

    #[tokio::test]
    async fn test_listing_seen_earlier_in_run_is_not_reported_again() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek", "marlin"]);
        let navigator = Arc::new(
            ScriptedNavigator::new()
                .with_cards("trek", vec![card("dup-1", "Trek Marlin", "450 €")])
                .with_cards("marlin", vec![card("dup-1", "Trek Marlin", "450 €")]),
        );
        let registry = Arc::new(InMemorySeenRegistry::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let orchestrator = orchestrator(
            config,
            navigator,
            registry.clone(),
            exporter_writing(1, temp_dir.path()),
            notifier.clone(),
            MockImageFetcher::new(),
        );

        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.sessions[1].state, SessionState::Done);
        assert!(summary.sessions[1].records.is_empty());
        assert!(summary.sessions[1].table.is_none());
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(registry.appended(), vec!["dup-1"]);
        assert_eq!(summary.total_unique(), 1);
    }

    #[tokio::test]
    async fn test_ids_recorded_before_export() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek"]);
        let navigator = Arc::new(ScriptedNavigator::new().with_cards(
            "trek",
            vec![card("a-1", "Trek", "450 €"), card("b-2", "Orbea", "300 €")],
        ));
        let registry = Arc::new(InMemorySeenRegistry::new());

        let recorded = registry.clone();
        let out_dir = temp_dir.path().to_path_buf();
        let mut exporter = MockExporter::new();
        exporter.expect_write_table().times(1).returning(move |_, label| {
            assert_eq!(recorded.appended(), vec!["a-1", "b-2"]);
            Ok(out_dir.join(format!("results_{}.csv", label)))
        });

        let orchestrator = orchestrator(
            config,
            navigator,
            registry.clone(),
            exporter,
            Arc::new(RecordingNotifier::new()),
            MockImageFetcher::new(),
        );

        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.sessions[0].state, SessionState::Done);
        assert!(summary.sessions[0].table.is_some());
    }

    #[tokio::test]
    async fn test_nothing_new_skips_export_and_notify() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek"]);
        let navigator = Arc::new(ScriptedNavigator::new().with_cards("trek", vec![card("a-1", "Trek", "450 €")]));
        let registry = Arc::new(InMemorySeenRegistry::with_ids(vec!["a-1".to_string()]));
        let notifier = Arc::new(RecordingNotifier::new());

        let mut exporter = MockExporter::new();
        exporter.expect_write_table().never();

        let orchestrator = orchestrator(
            config,
            navigator,
            registry.clone(),
            exporter,
            notifier.clone(),
            MockImageFetcher::new(),
        );

        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.sessions[0].state, SessionState::Done);
        assert!(summary.sessions[0].table.is_none());
        assert_eq!(summary.total_unique(), 0);
        assert!(notifier.sent().is_empty());
        assert_eq!(registry.appended(), vec!["a-1".to_string()]);
    }

    #[tokio::test]
    async fn test_second_run_finds_nothing_new() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek"]);
        let navigator = Arc::new(ScriptedNavigator::new().with_cards(
            "trek",
            vec![card("a-1", "Trek Marlin", "450 €"), card("b-2", "Trek Roscoe", "1.200,00 €")],
        ));
        let registry = Arc::new(FileSeenRegistry::new(config.output.seen_file.clone()));
        let notifier = Arc::new(RecordingNotifier::new());

        let orchestrator = orchestrator(
            config.clone(),
            navigator,
            registry,
            exporter_writing(1, temp_dir.path()),
            notifier.clone(),
            MockImageFetcher::new(),
        );

        let first = orchestrator.run().await.unwrap();
        let second = orchestrator.run().await.unwrap();

        assert_eq!(first.total_unique(), 2);
        assert_eq!(second.total_unique(), 0);
        assert_eq!(orchestrator.found_so_far(), 0);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(notifier.sent().len(), 1);

        let stored = std::fs::read_to_string(&config.output.seen_file).unwrap();
        assert_eq!(stored.lines().collect::<Vec<_>>(), vec!["a-1", "b-2"]);
    }

    #[tokio::test]
    async fn test_notifications_disabled() {
        let temp_dir = tempdir().unwrap();
        let mut config = test_config(temp_dir.path(), &["trek"]);
        config.notify.enabled = false;
        let navigator = Arc::new(ScriptedNavigator::new().with_cards("trek", vec![card("a-1", "Trek", "450 €")]));
        let registry = Arc::new(InMemorySeenRegistry::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let orchestrator = orchestrator(
            config,
            navigator,
            registry.clone(),
            exporter_writing(1, temp_dir.path()),
            notifier.clone(),
            MockImageFetcher::new(),
        );

        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.sessions[0].state, SessionState::Done);
        assert!(notifier.sent().is_empty());
        assert_eq!(registry.appended(), vec!["a-1".to_string()]);
    }

    #[tokio::test]
    async fn test_export_failure_still_notifies() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek"]);
        let navigator = Arc::new(ScriptedNavigator::new().with_cards("trek", vec![card("a-1", "Trek", "450 €")]));
        let notifier = Arc::new(RecordingNotifier::new());

        let mut exporter = MockExporter::new();
        exporter
            .expect_write_table()
            .times(1)
            .returning(|_, _| Err(HarvestError::ExportError("disk full".to_string()).into()));

        let orchestrator = orchestrator(
            config,
            navigator,
            Arc::new(InMemorySeenRegistry::new()),
            exporter,
            notifier.clone(),
            MockImageFetcher::new(),
        );

        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.sessions[0].state, SessionState::Done);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, vec!["a-1".to_string()]);
        assert!(sent[0].1.table.is_none());
        assert!(sent[0].1.capture.is_some());
    }

    #[tokio::test]
    async fn test_images_saved_when_enabled() {
        let temp_dir = tempdir().unwrap();
        let mut config = test_config(temp_dir.path(), &["trek"]);
        config.output.save_images = true;
        let navigator = Arc::new(ScriptedNavigator::new().with_cards(
            "trek",
            vec![card("a-1", "Trek Marlin 5", "450 €"), card("b-2", "Orbea", "300 €")],
        ));

        let mut image_fetcher = MockImageFetcher::new();
        image_fetcher.expect_fetch().times(2).returning(|url| {
            if url.contains("a-1") {
                Ok(vec![0xFF, 0xD8, 0xFF])
            } else {
                Err(HarvestError::NetworkError("404".to_string()).into())
            }
        });

        let orchestrator = orchestrator(
            config.clone(),
            navigator,
            Arc::new(InMemorySeenRegistry::new()),
            exporter_writing(1, temp_dir.path()),
            Arc::new(RecordingNotifier::new()),
            image_fetcher,
        );

        let summary = orchestrator.run().await.unwrap();

        let records = &summary.sessions[0].records;
        assert_eq!(records.len(), 2);
        let saved = records[0].image_path.as_deref().unwrap();
        assert!(saved.ends_with("a-1_Trek Marlin 5.jpg"));
        assert!(Path::new(saved).exists());
        assert!(records[1].image_path.is_none());
    }

    #[tokio::test]
    async fn test_results_limited_to_max_results() {
        let temp_dir = tempdir().unwrap();
        let mut config = test_config(temp_dir.path(), &["trek"]);
        config.search.max_results = 2;
        let cards = (1..=5).map(|i| card(&format!("id-{}", i), "Trek", "100 €")).collect();
        let navigator = Arc::new(ScriptedNavigator::new().with_cards("trek", cards));

        let orchestrator = orchestrator(
            config,
            navigator.clone(),
            Arc::new(InMemorySeenRegistry::new()),
            exporter_writing(1, temp_dir.path()),
            Arc::new(RecordingNotifier::new()),
            MockImageFetcher::new(),
        );

        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.total_unique(), 2);
        assert_eq!(navigator.calls_matching("scroll"), 1);
    }

    #[tokio::test]
    async fn test_consent_banner_checked_after_navigation() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek"]);
        let navigator = Arc::new(ScriptedNavigator::new().with_consent_banner());

        let orchestrator = orchestrator(
            config,
            navigator.clone(),
            Arc::new(InMemorySeenRegistry::new()),
            MockExporter::new(),
            Arc::new(RecordingNotifier::new()),
            MockImageFetcher::new(),
        );

        orchestrator.run().await.unwrap();

        let calls = navigator.calls();
        assert!(calls[0].starts_with("navigate:"));
        assert_eq!(calls[1], "consent:#onetrust-accept-btn-handler");
    }

    #[tokio::test]
    async fn test_unreadable_registry_aborts_run() {
        let temp_dir = tempdir().unwrap();
        let config = test_config(temp_dir.path(), &["trek"]);
        let navigator = Arc::new(ScriptedNavigator::new());

        let orchestrator = orchestrator(
            config,
            navigator.clone(),
            Arc::new(UnreadableRegistry),
            MockExporter::new(),
            Arc::new(RecordingNotifier::new()),
            MockImageFetcher::new(),
        );

        assert!(orchestrator.run().await.is_err());
        assert_eq!(navigator.calls_matching("navigate"), 0);
    }
}
