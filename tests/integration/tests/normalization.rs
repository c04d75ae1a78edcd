//! Integration tests for the context lifecycle.
//!
//! Runs the full acquire / register / configure / load / normalize / release
//! sequence against the in-process fake engine.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use rsm_lognorm::{
    Library, LoadState, LognormError, LognormFactory, LognormOptions, NormalizerConfig,
    RuleSource, SessionPool,
};
use rsm_lognorm_sys::test_utils::{FAKE_API, FAKE_VERSION, live_contexts, live_results};
use rstest::rstest;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/rulebases")
}

fn fake() -> Library {
    Library::from_api(&FAKE_API)
}

fn text_factory(rules: &str) -> LognormFactory {
    LognormFactory::from_text(rules).with_library(fake())
}

fn file_factory(name: &str) -> LognormFactory {
    LognormFactory::from_file(fixtures_dir().join(name)).with_library(fake())
}

mod text_rules {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_with_default_options() {
        let mut session = text_factory("rule=:%all:rest%").build().unwrap();
        assert_eq!(session.normalize("offline").unwrap(), r#"{ "all": "offline" }"#);
        session.close().unwrap();
    }

    #[test]
    fn adds_original_message() {
        let mut session = text_factory("rule=:%all:rest%")
            .with_options(LognormOptions::new().with_original_msg(true))
            .build()
            .unwrap();
        assert_eq!(
            session.normalize("offline").unwrap(),
            r#"{ "all": "offline", "originalmsg": "offline" }"#
        );
    }

    #[rstest]
    #[case::one_invalid_line("invalidSample", 1)]
    #[case::two_invalid_lines("invalidSample\ninvalidSample2", 2)]
    #[case::invalid_after_valid("rule=:%all:rest%\ninvalidSample", 1)]
    fn aggregates_every_error(#[case] rules: &str, #[case] expected: usize) {
        match text_factory(rules).build() {
            Err(LognormError::AggregatedValidationFailed { count, messages }) => {
                assert_eq!(count, expected);
                assert!(
                    messages
                        .iter()
                        .all(|m| m.contains("invalid record type detected"))
                );
            }
            other => panic!("Expected AggregatedValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn error_message_names_count() {
        let err = text_factory("invalidSample\ninvalidSample2").build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "<2> liblognorm errors have occurred, see logs for details"
        );
    }
}

mod rulebase_files {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn loads_version_two() {
        let mut session = file_factory("sample_v2.rulebase").build().unwrap();
        assert_eq!(session.rulebase_version().unwrap(), 2);
        assert_eq!(session.load_state(), LoadState::Loaded);
        assert_eq!(session.normalize("offline").unwrap(), r#"{ "all": "offline" }"#);
    }

    #[test]
    fn rejects_version_one() {
        let err = file_factory("sample_v1.rulebase").build().unwrap_err();
        assert!(matches!(
            err,
            LognormError::UnsupportedRulebaseVersion { found: 1 }
        ));
    }

    #[test]
    fn reports_missing_file() {
        let err = file_factory("sample.rulebas").build().unwrap_err();
        assert!(matches!(err, LognormError::LoadFailed { code: 1 }));
        assert_eq!(err.native_code(), Some(1));
    }

    #[test]
    fn fails_on_invalid_line_in_file() {
        match file_factory("invalid_v2.rulebase").build() {
            Err(LognormError::AggregatedValidationFailed { count, messages }) => {
                assert_eq!(count, 1);
                let expected = "[2]: invalid record type detected: 'invalidSample'";
                assert!(messages[0].ends_with(expected));
            }
            other => panic!("Expected AggregatedValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn close_releases_file_loaded_context() {
        let before = live_contexts();
        let mut session = file_factory("sample_v2.rulebase").build().unwrap();
        assert_eq!(live_contexts(), before + 1);

        session.close().unwrap();
        assert!(matches!(session.close(), Err(LognormError::NotInitialized)));
        assert_eq!(live_contexts(), before);
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut session = file_factory("syslog.rulebase").build().unwrap();

        let login = session.normalize_value("user bob logged in from web01").unwrap();
        assert_eq!(login, serde_json::json!({ "user": "bob", "host": "web01" }));

        let other = session.normalize_value("disk full").unwrap();
        assert_eq!(other, serde_json::json!({ "all": "disk full" }));
    }
}

mod normalization_failures {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unmatched_line_carries_diagnostic() {
        let mut session = text_factory("rule=:ping").build().unwrap();
        match session.normalize("pong") {
            Err(LognormError::ExtractionFailed { code, diagnostic }) => {
                assert_eq!(code, rsm_lognorm_sys::LN_WRONGPARSER);
                let diagnostic: serde_json::Value =
                    serde_json::from_str(&diagnostic.unwrap()).unwrap();
                assert_eq!(diagnostic["unparsed-data"], "pong");
            }
            other => panic!("Expected ExtractionFailed, got {other:?}"),
        }

        // The session stays usable after a failed extraction.
        assert_eq!(session.normalize("ping").unwrap(), "{ }");
    }

    #[test]
    fn closed_session_rejects_work() {
        let mut session = text_factory("rule=:%all:rest%").build().unwrap();
        session.close().unwrap();

        assert!(matches!(session.normalize("x"), Err(LognormError::NotInitialized)));
        assert!(matches!(
            session.load(RuleSource::text("rule=:x")),
            Err(LognormError::NotInitialized)
        ));
        assert!(matches!(session.close(), Err(LognormError::NotInitialized)));
    }
}

mod resources {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nothing_outlives_its_owner() {
        let before = (live_contexts(), live_results());
        {
            let mut session = text_factory("rule=:ping").build().unwrap();
            for line in ["ping", "pong", "ping"] {
                let _ = session.normalize(line);
            }
            let _ = text_factory("invalidSample").build();
            let _ = file_factory("sample_v1.rulebase").build();
            let _ = file_factory("sample.rulebas").build();
        }
        assert_eq!((live_contexts(), live_results()), before);
    }

    #[test]
    fn library_metadata() {
        let library = fake();
        assert_eq!(library.version(), FAKE_VERSION);
        assert!(!library.has_advanced_stats());
    }
}

mod configuration {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn builds_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::copy(
            fixtures_dir().join("syslog.rulebase"),
            dir.path().join("syslog.rulebase"),
        )
        .unwrap();
        let config_path = dir.path().join(".rsm-lognorm.jsonc");
        fs::write(
            &config_path,
            r#"{
                // relative to this file
                "rulebase": "syslog.rulebase",
                "options": { "add_original_msg": true }
            }"#,
        )
        .unwrap();

        let factory = NormalizerConfig::from_file(&config_path)
            .unwrap()
            .into_factory()
            .unwrap()
            .with_library(fake());
        let mut session = factory.build().unwrap();
        assert_eq!(
            session.normalize_value("disk full").unwrap(),
            serde_json::json!({ "all": "disk full", "originalmsg": "disk full" })
        );
    }
}

mod pooling {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn sessions_serve_parallel_threads() {
        let pool = Arc::new(SessionPool::new(file_factory("syslog.rulebase")));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    let mut session = pool.acquire().unwrap();
                    let line = format!("user u{i} logged in from h{i}");
                    let value = session.normalize_value(&line).unwrap();
                    assert_eq!(value["user"], format!("u{i}"));
                    assert_eq!(value["host"], format!("h{i}"));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.available_count() >= 1);
    }
}

/// Runs against the installed shim. `cargo test -- --ignored` with
/// `RSM_LOGNORM_LIBRARY` pointing at the shared library.
mod native_library {
    use super::*;
    use pretty_assertions::assert_eq;

    fn system_factory(rules: &str) -> LognormFactory {
        LognormFactory::from_text(rules)
            .with_library(Library::system().expect("native library not found"))
    }

    #[test]
    #[ignore = "requires the native liblognorm shim"]
    fn normalizes_with_default_options() {
        let mut session = system_factory("rule=:%all:rest%").build().unwrap();
        assert_eq!(
            session.normalize_value("offline").unwrap(),
            serde_json::json!({ "all": "offline" })
        );
    }

    #[test]
    #[ignore = "requires the native liblognorm shim"]
    fn aggregates_errors() {
        let err = system_factory("invalidSample\ninvalidSample2").build().unwrap_err();
        assert!(matches!(
            err,
            LognormError::AggregatedValidationFailed { count: 2, .. }
        ));
    }

    #[test]
    #[ignore = "requires the native liblognorm shim"]
    fn loads_version_two_file() {
        let mut session = LognormFactory::from_file(fixtures_dir().join("sample_v2.rulebase"))
            .with_library(Library::system().expect("native library not found"))
            .build()
            .unwrap();
        assert_eq!(session.rulebase_version().unwrap(), 2);
    }
}
