//! End-to-end runs through the orchestrator with scripted collaborators.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::{Clients, RunContext, RunId, RunOptions, RunScope, SearchTarget};
    use crate::core::{fields, FailurePolicy, RunState};
    use crate::events::CollectingEventSink;
    use crate::pipeline::{
        Orchestrator, PipelineDefinition, RestartPoint, RunOutcome, RunRequest, StepEntry,
    };
    use crate::registry::StepRegistry;
    use crate::settings::Settings;
    use crate::steps::fanout::CANCELLED;
    use crate::store::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};
    use crate::adapters::StructuredFields;
    use crate::testing::{product_page, registry_with, ScriptedModel, StaticFetcher, StaticSource};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://shop{i}.ch/aspirin")).collect()
    }

    fn fetcher(urls: &[String]) -> StaticFetcher {
        urls.iter().fold(StaticFetcher::new(), |fetcher, url| {
            fetcher.with_page(url.clone(), product_page("Aspirin 500mg", "CHF 12.90", 0.9))
        })
    }

    fn clients(urls: &[String], relevance: ScriptedModel) -> Clients {
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        Clients::new()
            .with_source(Arc::new(StaticSource::with_urls("serp", &refs)))
            .with_fetcher(Arc::new(fetcher(urls)))
            .with_model(
                "page_type",
                Arc::new(ScriptedModel::new("page_type", "zyte-1").label_all("ecommerce_product", 0.9)),
            )
            .with_model(
                "blocked_content",
                Arc::new(ScriptedModel::new("blocked_content", "bc-3").label_all("allowed", 0.1)),
            )
            .with_model("relevance", Arc::new(relevance))
            .with_model(
                "suspicion",
                Arc::new(ScriptedModel::new("suspicion", "s-7").label_all("suspicious", 0.5)),
            )
    }

    fn relevant() -> ScriptedModel {
        ScriptedModel::new("relevance", "r-2").label_all("relevant", 0.8)
    }

    fn context(run_id: &str, clients: Clients) -> (RunContext, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = RunContext::new(SearchTarget::infer("aspirin"), "tester")
            .with_run_id(RunId::new(run_id))
            .with_clients(clients)
            .with_event_sink(sink.clone());
        (ctx, sink)
    }

    fn orchestrator(registry: StepRegistry) -> (Orchestrator, Arc<InMemoryArtifactStore>) {
        let store = Arc::new(InMemoryArtifactStore::new());
        (Orchestrator::new(Arc::new(registry), store.clone()), store)
    }

    fn default_registry() -> StepRegistry {
        StepRegistry::with_builtin_steps(&Settings::defaults().unwrap())
    }

    fn assert_aborted(outcome: &RunOutcome, code: &str, step: &str) {
        assert_eq!(outcome.state, RunState::Aborted);
        assert_eq!(outcome.exit_code(), 1);
        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.code, code);
        assert_eq!(failure.step_id.as_deref(), Some(step));
    }

    #[tokio::test]
    async fn test_unscoped_run_caps_discovery_and_skips_country_steps() {
        let clients = Clients::new()
            .with_source(Arc::new(StaticSource::with_urls(
                "serp",
                &["https://a.ch/aspirin", "https://b.ch/aspirin"],
            )))
            .with_source(Arc::new(StaticSource::with_urls(
                "lens",
                &["https://c.de/aspirin", "https://d.de/aspirin"],
            )));
        let all: Vec<String> = ["a.ch", "b.ch", "c.de", "d.de"]
            .iter()
            .map(|h| format!("https://{h}/aspirin"))
            .collect();
        let clients = [
            ("page_type", "ecommerce_product"),
            ("blocked_content", "allowed"),
            ("relevance", "relevant"),
            ("suspicion", "suspicious"),
        ]
        .into_iter()
        .fold(clients.with_fetcher(Arc::new(fetcher(&all))), |c, (name, label)| {
            c.with_model(name, Arc::new(ScriptedModel::new(name, "1").label_all(label, 0.5)))
        });

        let (ctx, sink) = context("unscoped", clients);
        let ctx = ctx.with_options(RunOptions::default().with_max_results(1));
        let (orchestrator, store) = orchestrator(default_registry());

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);
        assert_eq!(outcome.exit_code(), 0);

        let discovery = store.load("unscoped", "discovery").await.unwrap();
        assert_eq!(discovery.ordinal, 1);
        let per_source = |name: &str| discovery.records.iter().filter(|r| r.source() == name).count();
        assert_eq!((per_source("serp"), per_source("lens")), (1, 1));

        assert!(outcome.entries.iter().all(|e| e.step_id != "country_filter"));
        assert!(store.load("unscoped", "country_filter").await.is_err());
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome
            .records
            .iter()
            .all(|r| r.derived(fields::COUNTRY_FILTER).is_none()));

        let skipped = sink.events_of_type("step.skipped");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].step_id.as_deref(), Some("country_filter"));
        assert_eq!(skipped[0].ordinal, Some(4));
    }

    #[tokio::test]
    async fn test_blacklisted_domain_is_excluded_and_absent_from_ranking() {
        let urls = vec![
            "https://www.bad-pharma.ch/aspirin".to_string(),
            "https://shop.ch/aspirin".to_string(),
            "https://apotheke.ch/aspirin".to_string(),
        ];
        let registry = registry_with(
            r#"
            [countries.ch.steps.country_filter]
            blacklist = ["bad-pharma.ch"]
            "#,
        )
        .unwrap();
        let (orchestrator, store) = orchestrator(registry);
        let (ctx, _) = context("swiss", clients(&urls, relevant()));
        let ctx = ctx.with_scope(RunScope::unscoped().with_country("CH"));

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);

        let filtered = store.load("swiss", "country_filter").await.unwrap();
        assert_eq!(filtered.ordinal, 4);
        assert_eq!(filtered.records.len(), 3);
        let bad = &filtered.records[0];
        assert!(bad.is_excluded());
        assert_eq!(
            bad.derived(fields::COUNTRY_FILTER),
            Some(&json!({"result": "negative", "rule": "blacklist"}))
        );
        assert!(filtered.records[1..].iter().all(|r| r.is_active()));

        let ranked: Vec<&str> = outcome.records.iter().map(|r| r.url()).collect();
        assert_eq!(ranked, vec!["https://shop.ch/aspirin", "https://apotheke.ch/aspirin"]);
        assert_eq!(outcome.records[0].derived(fields::RANK), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_one_transient_classifier_error_does_not_stop_the_run() {
        let urls = urls(10);
        let model = relevant().transient_for(urls[3].clone());
        let (orchestrator, store) = orchestrator(default_registry());
        let (ctx, _) = context("flaky", clients(&urls, model));

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);

        let relevance = store.load("flaky", "relevance").await.unwrap();
        assert!(relevance.complete);
        let labelled = relevance
            .records
            .iter()
            .filter(|r| r.derived(fields::RELEVANCE).is_some())
            .count();
        assert_eq!(labelled, 9);
        assert!(relevance.records[3].failed_by("relevance"));
        assert_eq!(relevance.summary.failed, 1);
        assert_eq!(outcome.records.len(), 9);
    }

    #[tokio::test]
    async fn test_restart_matches_full_run() {
        let urls = urls(4);
        let store = Arc::new(InMemoryArtifactStore::new());
        let orchestrator = Orchestrator::new(Arc::new(default_registry()), store.clone());

        let (first, _) = context("first", clients(&urls, relevant()));
        let full = orchestrator.run(&first, &RunRequest::full()).await.unwrap();
        assert!(full.is_completed());

        let (second, _) = context("second", clients(&urls, relevant()));
        let request =
            RunRequest::full().with_restart(RestartPoint::new("first", "structured_extraction"));
        let resumed = orchestrator.run(&second, &request).await.unwrap();
        assert!(resumed.is_completed(), "{:?}", resumed.failure);

        assert_eq!(resumed.records, full.records);
        assert_eq!(resumed.entries.first().map(|e| e.step_id.as_str()), Some("page_type"));
        let manifest = store.load_manifest("second").await.unwrap();
        assert_eq!(
            manifest.restart_from,
            Some(RestartPoint::new("first", "structured_extraction"))
        );
    }

    #[tokio::test]
    async fn test_restart_from_incompatible_artifact() {
        let urls = urls(2);
        let store = Arc::new(InMemoryArtifactStore::new());
        let orchestrator = Orchestrator::new(Arc::new(default_registry()), store.clone());

        let (first, _) = context("extract-only", clients(&urls, relevant()));
        let extracted = orchestrator.run(&first, &RunRequest::extraction()).await.unwrap();
        let steps: Vec<&str> = extracted.entries.iter().map(|e| e.step_id.as_str()).collect();
        assert_eq!(steps, vec!["discovery", "keyword_enrichment", "structured_extraction"]);

        let (second, _) = context("mismatch", clients(&urls, relevant()));
        let request = RunRequest::single("relevance_filter")
            .with_restart(RestartPoint::new("extract-only", "discovery"));
        let outcome = orchestrator.run(&second, &request).await.unwrap();
        assert_aborted(&outcome, "SHAPE_MISMATCH", "relevance_filter");
        assert!(outcome.entries.is_empty());

        let manifest = store.load_manifest("mismatch").await.unwrap();
        assert_eq!(manifest.state, RunState::Aborted);
        assert_eq!(manifest.failure.unwrap().code, "SHAPE_MISMATCH");
    }

    #[tokio::test]
    async fn test_continue_run_in_place() {
        let urls = urls(3);
        let (orchestrator, store) = orchestrator(default_registry());

        let (ctx, _) = context("in-place", clients(&urls, relevant()));
        orchestrator.run(&ctx, &RunRequest::extraction()).await.unwrap();

        let (ctx, _) = context("in-place", clients(&urls, relevant()));
        let request =
            RunRequest::full().with_restart(RestartPoint::new("in-place", "structured_extraction"));
        let outcome = orchestrator.run(&ctx, &request).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);

        let listed: Vec<String> = store
            .list("in-place")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.step_id)
            .collect();
        assert_eq!(listed.len(), 11);
        assert_eq!(listed.first().map(String::as_str), Some("discovery"));
        assert_eq!(outcome.entries.len(), 11);
    }

    #[tokio::test]
    async fn test_skip_and_continue_substitutes_empty_output() {
        let definition = PipelineDefinition::new([
            StepEntry::new("discovery"),
            StepEntry::new("structured_extraction").with_policy(FailurePolicy::SkipAndContinue),
            StepEntry::new("relevance"),
            StepEntry::new("ranker"),
        ]);
        let (orchestrator, store) = orchestrator(default_registry());
        let orchestrator = orchestrator.with_definition(definition);

        let urls = urls(2);
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let clients = Clients::new()
            .with_source(Arc::new(StaticSource::with_urls("serp", &refs)))
            .with_model("relevance", Arc::new(relevant()));
        let (ctx, sink) = context("skipping", clients);

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);
        assert!(outcome.records.is_empty());

        let skipped = store.load("skipping", "structured_extraction").await.unwrap();
        assert!(skipped.records.is_empty());
        assert_eq!(skipped.ordinal, 2);
        let events = sink.events_of_type("step.skipped");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["code"], json!("CONFIGURATION"));
    }

    #[tokio::test]
    async fn test_excessive_failures_abort_with_partial_artifact() {
        let urls = urls(10);
        let model = urls[..6]
            .iter()
            .fold(relevant(), |model, url| model.transient_for(url.clone()));
        let (orchestrator, store) = orchestrator(default_registry());
        let (ctx, sink) = context("failing", clients(&urls, model));

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert_aborted(&outcome, "EXCESSIVE_FAILURE", "relevance");

        let partial = store.load("failing", "relevance").await.unwrap();
        assert!(!partial.complete);
        assert_eq!(partial.summary.failed, 6);
        assert!(store.load("failing", "relevance_filter").await.is_err());

        let manifest = store.load_manifest("failing").await.unwrap();
        assert_eq!(manifest.state, RunState::Aborted);
        assert!(!manifest.entry("relevance").unwrap().complete);
        assert_eq!(sink.events_of_type("step.failed").len(), 1);
        assert_eq!(sink.events_of_type("run.aborted").len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_persists_partial_output() {
        let urls = urls(6);
        let token = Arc::new(CancellationToken::new());
        let model = relevant().cancels_on(urls[2].clone(), Arc::clone(&token));
        let (orchestrator, store) = orchestrator(default_registry());
        let (ctx, sink) = context("cancelled", clients(&urls, model));
        let ctx = ctx
            .with_token(token)
            .with_options(RunOptions::default().with_max_concurrency(1));

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert_aborted(&outcome, "CANCELLED", "relevance");

        let partial = store.load("cancelled", "relevance").await.unwrap();
        assert!(!partial.complete);
        assert!(partial.records[0].derived(fields::RELEVANCE).is_some());
        assert!(partial.records[1].derived(fields::RELEVANCE).is_some());
        for record in &partial.records[2..] {
            assert!(record.failed_by("relevance"));
            assert!(matches!(
                record.status(),
                crate::core::RecordStatus::Failed { error, .. } if error == CANCELLED
            ));
        }
        assert!(store.load("cancelled", "relevance_filter").await.is_err());

        let cancelling = sink.events_of_type("run.cancelling");
        assert_eq!(cancelling.len(), 1);
        assert_eq!(cancelling[0].data["reason"], json!("operator abort"));
        let types = sink.event_types();
        let at = |t: &str| types.iter().position(|e| e == t).unwrap();
        assert!(at("run.cancelling") < at("run.aborted"));
    }

    #[tokio::test]
    async fn test_country_step_alone_without_country() {
        let (orchestrator, store) = orchestrator(default_registry());
        let (ctx, sink) = context("no-country", clients(&urls(1), relevant()));

        let outcome = orchestrator
            .run(&ctx, &RunRequest::single("country_filter"))
            .await
            .unwrap();
        assert_aborted(&outcome, "UNSUPPORTED_SCOPE", "country_filter");
        assert!(store.list("no-country").await.unwrap().is_empty());
        assert!(sink.events_of_type("step.started").is_empty());
    }

    #[tokio::test]
    async fn test_existing_run_id_is_rejected() {
        let (orchestrator, _) = orchestrator(default_registry());
        let (first, _) = context("same", clients(&urls(1), relevant()));
        orchestrator.run(&first, &RunRequest::extraction()).await.unwrap();

        let (second, _) = context("same", clients(&urls(1), relevant()));
        let err = orchestrator
            .run(&second, &RunRequest::extraction())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION");
    }

    #[tokio::test]
    async fn test_file_store_layout_and_event_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileArtifactStore::new(dir.path()));
        let orchestrator = Orchestrator::new(Arc::new(default_registry()), store.clone())
            .with_definition(PipelineDefinition::of(&["discovery", "structured_extraction"]));
        let (ctx, sink) = context("on-disk", clients(&urls(2), relevant()));

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);

        let run_dir = store.run_dir("on-disk");
        for file in ["01_discovery.json", "02_structured_extraction.json", "run.json"] {
            assert!(run_dir.join(file).exists(), "{file}");
        }
        assert_eq!(
            sink.event_types(),
            vec![
                "run.started",
                "step.started",
                "step.completed",
                "step.started",
                "step.completed",
                "run.completed",
            ]
        );
        let extracted = store.load("on-disk", "structured_extraction").await.unwrap();
        assert_eq!(extracted.records[0].derived(fields::PRICE), Some(&json!(12.9)));
        assert_eq!(extracted.records[0].derived(fields::CURRENCY), Some(&json!("CHF")));
    }

    #[tokio::test]
    async fn test_missing_page_fails_only_its_record() {
        let urls = urls(10);
        let clients = clients(&urls, relevant())
            .with_fetcher(Arc::new(fetcher(&urls).missing(urls[4].clone())));
        let (orchestrator, store) = orchestrator(default_registry());
        let (ctx, _) = context("not-found", clients);
        let ctx = ctx.with_scope(RunScope::unscoped().with_country("CH"));

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);

        let extracted = store.load("not-found", "structured_extraction").await.unwrap();
        assert!(extracted.complete);
        assert_eq!(extracted.summary.failed, 1);
        assert!(extracted.records[4].failed_by("structured_extraction"));
        assert_eq!(outcome.records.len(), 9);
        assert!(outcome.records.iter().all(|r| r.url() != urls[4]));
    }

    fn suspicion_reads_extraction() -> PipelineDefinition {
        PipelineDefinition::new([
            StepEntry::new("discovery"),
            StepEntry::new("structured_extraction"),
            StepEntry::new("relevance"),
            StepEntry::new("relevance_filter"),
            StepEntry::new("suspicion").with_input_from("structured_extraction"),
        ])
    }

    #[tokio::test]
    async fn test_restart_reads_earlier_input_from_restarted_run() {
        let urls = urls(3);
        let (orchestrator, store) = orchestrator(default_registry());
        let orchestrator = orchestrator.with_definition(suspicion_reads_extraction());

        let (first, _) = context("first", clients(&urls, relevant()));
        let full = orchestrator.run(&first, &RunRequest::full()).await.unwrap();
        assert!(full.is_completed(), "{:?}", full.failure);

        let (second, _) = context("second", clients(&urls, relevant()));
        let request = RunRequest::full().with_restart(RestartPoint::new("first", "relevance"));
        let resumed = orchestrator.run(&second, &request).await.unwrap();
        assert!(resumed.is_completed(), "{:?}", resumed.failure);

        let steps: Vec<&str> = resumed.entries.iter().map(|e| e.step_id.as_str()).collect();
        assert_eq!(steps, vec!["relevance_filter", "suspicion"]);
        assert_eq!(resumed.records, full.records);
        assert!(store.load("second", "structured_extraction").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_earlier_input_is_blamed_on_consumer() {
        let urls = urls(2);
        let (orchestrator, store) = orchestrator(default_registry());
        let orchestrator = orchestrator.with_definition(suspicion_reads_extraction());

        let (first, _) = context("first", clients(&urls, relevant()));
        orchestrator.run(&first, &RunRequest::full()).await.unwrap();

        // A run holding the relevance artifact but nothing it was built from.
        let mut seeded = store.load("first", "relevance").await.unwrap();
        seeded.run_id = "seeded".to_string();
        store.create_run("seeded").await.unwrap();
        store.persist(&seeded).await.unwrap();

        let (second, _) = context("orphan", clients(&urls, relevant()));
        let request = RunRequest::full().with_restart(RestartPoint::new("seeded", "relevance"));
        let outcome = orchestrator.run(&second, &request).await.unwrap();
        assert_aborted(&outcome, "NOT_FOUND", "suspicion");
        let steps: Vec<&str> = outcome.entries.iter().map(|e| e.step_id.as_str()).collect();
        assert_eq!(steps, vec!["relevance_filter"]);
    }

    #[tokio::test]
    async fn test_default_models_keep_pages_without_probabilities() {
        let settings = Settings::defaults().unwrap();
        let urls = urls(3);
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        // Fields as the HTML fetcher reports them: no provider probabilities.
        let plain = |price: &str| {
            StructuredFields::from([
                ("title".to_string(), json!("Aspirin 500mg")),
                ("price".to_string(), json!(price)),
            ])
        };
        let fetcher = StaticFetcher::new()
            .with_page(urls[0].clone(), plain("CHF 12.90"))
            .with_page(urls[1].clone(), plain("CHF 9.50"))
            .with_page(urls[2].clone(), product_page("Aspirin", "CHF 4.00", 0.1));
        let clients = settings
            .build_clients()
            .await
            .unwrap()
            .with_source(Arc::new(StaticSource::with_urls("serp", &refs)))
            .with_fetcher(Arc::new(fetcher));
        let (orchestrator, store) = orchestrator(StepRegistry::with_builtin_steps(&settings));
        let (ctx, _) = context("defaults", clients);
        let ctx = ctx.with_scope(RunScope::unscoped().with_country("CH"));

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);

        let page_types = store.load("defaults", "page_type").await.unwrap();
        assert_eq!(page_types.records[0].derived(fields::PAGE_TYPE), Some(&json!("unknown")));
        assert_eq!(page_types.records[2].derived(fields::PAGE_TYPE), Some(&json!("other")));

        let ranked: Vec<&str> = outcome.records.iter().map(|r| r.url()).collect();
        assert_eq!(ranked.len(), 2);
        assert!(!ranked.contains(&urls[2].as_str()));
    }

    #[tokio::test]
    async fn test_delivery_policy_excludes_shops_not_shipping_to_country() {
        let urls = urls(2);
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let with_policy_link = |url: &str| {
            let mut page = product_page("Aspirin 500mg", "CHF 12.90", 0.9);
            page.insert("links".to_string(), json!([{"href": "/versand", "text": "Versand"}]));
            (url.to_string(), page)
        };
        let fetcher = urls
            .iter()
            .map(|url| with_policy_link(url))
            .fold(StaticFetcher::new(), |fetcher, (url, page)| fetcher.with_page(url, page));
        let policy_model = ScriptedModel::new("delivery_policy", "llm-1")
            .label_all("yes", 0.9)
            .label_for("https://shop1.ch/versand", "no", 0.9);
        let clients = Clients::new()
            .with_source(Arc::new(StaticSource::with_urls("serp", &refs)))
            .with_fetcher(Arc::new(fetcher))
            .with_model("delivery_policy", Arc::new(policy_model));

        let registry = registry_with(
            r#"
            [countries.ch.steps.delivery_policy]
            keywords = ["versand"]
            "#,
        )
        .unwrap();
        let (orchestrator, store) = orchestrator(registry);
        let orchestrator = orchestrator.with_definition(PipelineDefinition::of(&[
            "discovery",
            "structured_extraction",
            "country_filter",
            "delivery_policy",
        ]));
        let (ctx, _) = context("delivery", clients);
        let ctx = ctx.with_scope(RunScope::unscoped().with_country("CH"));

        let outcome = orchestrator.run(&ctx, &RunRequest::full()).await.unwrap();
        assert!(outcome.is_completed(), "{:?}", outcome.failure);

        let checked = store.load("delivery", "delivery_policy").await.unwrap();
        assert_eq!(checked.ordinal, 4);
        assert!(checked.records[0].is_active());
        assert!(checked.records[1].is_excluded());
        assert_eq!(
            checked.records[1].derived(fields::DELIVERY_POLICY).unwrap()["policy_url"],
            json!("https://shop1.ch/versand")
        );
        assert_eq!(checked.summary.details.get("negative"), Some(&1));
    }
}
