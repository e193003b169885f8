//! Property tests for core invariants

use proptest::prelude::*;
use std::collections::HashMap;

use switchboard_engine::config::Config;
use switchboard_engine::enrichment::domain::normalize_domain;
use switchboard_engine::enrichment::voice;
use switchboard_engine::memory::{ConversationStore, TurnRole};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

proptest! {
    // Context merging is last-write-wins per key: applying updates one at a
    // time must equal folding them into a single map.
    #[test]
    fn test_context_merge_last_write_wins(
        updates in proptest::collection::vec(
            proptest::collection::hash_map("[a-e]", 0..100i64, 0..4),
            1..6,
        ),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = ConversationStore::new(std::time::Duration::from_secs(3600));

            let mut expected: HashMap<String, serde_json::Value> = HashMap::new();
            for update in &updates {
                let as_json: HashMap<String, serde_json::Value> = update
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::json!(v)))
                    .collect();
                expected.extend(as_json.clone());
                store.update_context("c1", as_json).await;
            }

            let memory = store.get("c1").await.expect("memory exists");
            assert_eq!(memory.context, expected);
        });
    }

    // Summarize renders exactly one line per turn, in insertion order,
    // with the caller-facing role label.
    #[test]
    fn test_summarize_one_line_per_turn(
        turns in proptest::collection::vec(
            (any::<bool>(), "[a-zA-Z0-9 ]{1,20}"),
            1..20,
        ),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let store = ConversationStore::new(std::time::Duration::from_secs(3600));

            for (is_caller, content) in &turns {
                let role = if *is_caller { TurnRole::Caller } else { TurnRole::Agent };
                store.add_turn("c1", role, content.clone()).await;
            }

            let summary = store.summarize("c1").await;
            let lines: Vec<&str> = summary.split('\n').collect();
            assert_eq!(lines.len(), turns.len());

            for (line, (is_caller, content)) in lines.iter().zip(&turns) {
                let label = if *is_caller { "Caller" } else { "Agent" };
                assert_eq!(*line, format!("{}: {}", label, content));
            }
        });
    }

    // Normalization output carries no scheme, no leading www, no trailing
    // slash, and no uppercase — for any input.
    #[test]
    fn test_normalize_domain_shape(input in "[a-zA-Z0-9./:]{0,40}") {
        let normalized = normalize_domain(&input);
        prop_assert!(!normalized.starts_with("http://"));
        prop_assert!(!normalized.starts_with("https://"));
        prop_assert!(!normalized.starts_with("www."));
        prop_assert!(!normalized.ends_with('/'));
        prop_assert_eq!(normalized.clone(), normalized.to_lowercase());
    }

    // The quality score stays within 0..=100 whatever the inputs.
    #[test]
    fn test_quality_score_bounded(
        transcription in "[a-zA-Z ]{0,60}",
        confidence in 0.0..=1.0f64,
    ) {
        let mut analysis = voice::analyze(&transcription, None);
        analysis.confidence = confidence;
        let report = voice::quality_report(&analysis);
        prop_assert!(report.overall_score <= 100);
    }

    // Config round-trips through TOML for any valid level/provider combo.
    #[test]
    fn test_config_round_trip(
        log_level in "error|warn|info|debug|trace",
        provider in "google|serpapi",
        port in 1..=u16::MAX,
        ttl in 1..=86_400u64,
    ) {
        let mut config = Config::default();
        config.core.log_level = log_level;
        config.core.port = port;
        config.search.provider = provider;
        config.memory.ttl_secs = ttl;

        let toml_string = toml::to_string(&config).expect("serialize config");
        let parsed: Config = toml::from_str(&toml_string).expect("parse config");

        prop_assert_eq!(config.core.log_level, parsed.core.log_level);
        prop_assert_eq!(config.core.port, parsed.core.port);
        prop_assert_eq!(config.search.provider, parsed.search.provider);
        prop_assert_eq!(config.memory.ttl_secs, parsed.memory.ttl_secs);
    }
}
