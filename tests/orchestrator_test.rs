//! Orchestrator behaviour against in-process collaborators

mod common;

use chrono::Duration;
use proptest::prelude::*;

use common::{Harness, HarnessOptions};
use wikitimelines::orchestrator::{RunError, RunOutcome, RunState};
use wikitimelines::publisher::{PublishError, PublishStage};

#[tokio::test]
async fn test_end_to_end_posts_then_records() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA", "ArticleB"],
        with_image: vec!["ArticleB"],
        // draws ArticleA first, then reaches ArticleB within the default 5 attempts
        seed: Some(7),
        ..Default::default()
    });

    let outcome = harness.orchestrator.run().await.unwrap();
    assert_eq!(outcome.state(), RunState::Done);

    let RunOutcome::Posted(receipt) = outcome else {
        panic!("expected a post");
    };
    assert_eq!(receipt.title, "ArticleB");
    assert_eq!(receipt.content_type, "image/png");
    assert!(receipt.recorded);
    assert!(receipt.attempts >= 2 && receipt.attempts <= 5);

    let events = harness.log.events();
    let first_locate = events.iter().find(|e| e.starts_with("locate:"));
    assert_eq!(first_locate.map(String::as_str), Some("locate:ArticleA"));
    assert_eq!(harness.log.count("publish:"), 1);
    assert_eq!(harness.log.count("record:"), 1);

    let publish_at = events.iter().position(|e| e == "publish:ArticleB").unwrap();
    let record_at = events.iter().position(|e| e.starts_with("record:")).unwrap();
    assert!(publish_at < record_at);
    assert_eq!(record_at, events.len() - 1);
}

#[tokio::test]
async fn test_suppressed_run_touches_nothing() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA"],
        with_image: vec!["ArticleA"],
        ..Default::default()
    });
    harness.gate.record_post(harness.gate.now()).await.unwrap();
    let before = harness.log.events().len();

    let outcome = harness.orchestrator.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Suppressed));

    // Only the setup write is in the log
    assert_eq!(harness.log.events().len(), before);
    assert_eq!(harness.log.count("list"), 0);
    assert_eq!(harness.log.count("locate:"), 0);
    assert_eq!(harness.log.count("fetch:"), 0);
    assert_eq!(harness.log.count("session"), 0);
}

#[tokio::test]
async fn test_second_run_suppressed_until_window_elapses() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA"],
        with_image: vec!["ArticleA"],
        ..Default::default()
    });

    assert!(matches!(
        harness.orchestrator.run().await.unwrap(),
        RunOutcome::Posted(_)
    ));
    assert!(matches!(
        harness.orchestrator.run().await.unwrap(),
        RunOutcome::Suppressed
    ));

    harness.clock.advance(Duration::hours(24));
    assert!(matches!(
        harness.orchestrator.run().await.unwrap(),
        RunOutcome::Posted(_)
    ));
    assert_eq!(harness.log.count("publish:"), 2);
}

#[tokio::test]
async fn test_exhausted_after_exactly_five_attempts() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA", "ArticleB", "ArticleC"],
        with_image: vec![],
        ..Default::default()
    });

    let err = harness.orchestrator.run().await.unwrap_err();
    assert!(matches!(err, RunError::NotFound { attempts: 5 }));
    assert_eq!(err.terminal_state(), RunState::Exhausted);
    assert_eq!(harness.log.count("locate:"), 5);
    assert_eq!(harness.log.count("fetch:"), 0);
    assert_eq!(harness.log.count("record:"), 0);
}

#[tokio::test]
async fn test_empty_category_is_not_found() {
    let harness = Harness::build(HarnessOptions::default());

    let err = harness.orchestrator.run().await.unwrap_err();
    assert!(matches!(err, RunError::NotFound { attempts: 0 }));
    assert_eq!(harness.log.count("locate:"), 0);
}

#[tokio::test]
async fn test_publish_failure_does_not_record() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA"],
        with_image: vec!["ArticleA"],
        publish_fail_at: Some(PublishStage::Post),
        ..Default::default()
    });

    let err = harness.orchestrator.run().await.unwrap_err();
    assert!(matches!(
        err,
        RunError::Publish(PublishError::Rejected {
            stage: PublishStage::Post,
            ..
        })
    ));
    assert_eq!(err.terminal_state(), RunState::Failed);
    assert_eq!(harness.log.count("record:"), 0);

    // Nothing was recorded, so the next run is allowed again
    assert!(harness.gate.is_post_allowed().await.unwrap());
}

#[tokio::test]
async fn test_session_failure_skips_upload() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA"],
        with_image: vec!["ArticleA"],
        publish_fail_at: Some(PublishStage::Session),
        ..Default::default()
    });

    let err = harness.orchestrator.run().await.unwrap_err();
    assert!(matches!(err, RunError::Publish(PublishError::Authentication { .. })));
    assert_eq!(harness.log.count("publish:"), 0);
}

#[tokio::test]
async fn test_record_failure_still_reports_post() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA"],
        with_image: vec!["ArticleA"],
        store_fail_put: true,
        ..Default::default()
    });

    let RunOutcome::Posted(receipt) = harness.orchestrator.run().await.unwrap() else {
        panic!("expected a post");
    };
    assert!(!receipt.recorded);
    assert_eq!(harness.log.count("publish:"), 1);
}

#[tokio::test]
async fn test_gate_read_failure_fails_run() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA"],
        with_image: vec!["ArticleA"],
        store_fail_get: true,
        ..Default::default()
    });

    let err = harness.orchestrator.run().await.unwrap_err();
    assert!(matches!(err, RunError::Gate(_)));
    assert_eq!(harness.log.count("list"), 0);
}

#[tokio::test]
async fn test_preview_does_not_publish_or_record() {
    let harness = Harness::build(HarnessOptions {
        titles: vec!["ArticleA"],
        with_image: vec!["ArticleA"],
        ..Default::default()
    });

    let report = harness.orchestrator.preview().await.unwrap();
    assert_eq!(report.title, "ArticleA");
    assert_eq!(report.post_text, "ArticleA");
    assert_eq!(report.image_bytes, 4);
    assert_eq!(harness.log.count("session"), 0);
    assert_eq!(harness.log.count("record:"), 0);
}

#[tokio::test]
async fn test_same_seed_same_selection() {
    let titles = vec!["A", "B", "C", "D", "E", "F", "G", "H"];
    let pick = |seed| {
        let titles = titles.clone();
        async move {
            let harness = Harness::build(HarnessOptions {
                with_image: titles.clone(),
                titles,
                seed: Some(seed),
                ..Default::default()
            });
            harness.orchestrator.select().await.unwrap().image.title
        }
    };

    assert_eq!(pick(42).await, pick(42).await);
}

const TITLES: [&str; 8] = ["T0", "T1", "T2", "T3", "T4", "T5", "T6", "T7"];

proptest! {
    #[test]
    fn prop_selection_bounded_and_only_hits_image_titles(
        mask in proptest::collection::vec(any::<bool>(), TITLES.len()),
        seed in any::<u64>(),
    ) {
        let with_image: Vec<&'static str> = TITLES
            .iter()
            .zip(&mask)
            .filter(|(_, has)| **has)
            .map(|(t, _)| *t)
            .collect();
        let all_have_images = with_image.len() == TITLES.len();

        let harness = Harness::build(HarnessOptions {
            titles: TITLES.to_vec(),
            with_image: with_image.clone(),
            seed: Some(seed),
            ..Default::default()
        });

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(harness.orchestrator.select());
        let locates = harness.log.count("locate:");

        match result {
            Ok(selection) => {
                prop_assert!(selection.attempts >= 1 && selection.attempts <= 5);
                prop_assert!(with_image.iter().any(|t| *t == selection.image.title));
                prop_assert_eq!(locates, selection.attempts as usize);
                if all_have_images {
                    prop_assert_eq!(selection.attempts, 1);
                }
            }
            Err(RunError::NotFound { attempts }) => {
                prop_assert_eq!(attempts, 5);
                prop_assert_eq!(locates, 5);
                let events = harness.log.events();
                for title in events.iter().filter_map(|e| e.strip_prefix("locate:")) {
                    prop_assert!(!with_image.iter().any(|t| *t == title), "{} has an image", title);
                }
            }
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }
}
