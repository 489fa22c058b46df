use std::sync::Arc;

use batch_processing::batch::{
    handler_fn, BatchProcessor, ProcessingOutcome, ProcessorOptions, RecordError, RecordHandler,
    SqsFifoPartialProcessor,
};
use batch_processing::state::with_invocation;
use batch_processing::BatchError;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

/// Helper function to create a FIFO queue record
fn fifo_record(id: &str, group: Option<&str>, body: &str) -> Value {
    let mut record = json!({
        "messageId": id,
        "body": body,
        "attributes": { "ApproximateReceiveCount": "1" },
        "eventSource": "aws:sqs"
    });
    if let Some(group) = group {
        record["attributes"]["MessageGroupId"] = json!(group);
    }
    record
}

/// Handler recording every message id it sees, failing bodies equal to "fail"
fn recording_handler(seen: Arc<Mutex<Vec<String>>>) -> Arc<dyn RecordHandler> {
    handler_fn(move |record: Value| {
        let seen = seen.clone();
        async move {
            seen.lock()
                .push(record["messageId"].as_str().unwrap_or_default().to_string());
            if record["body"] == json!("fail") {
                anyhow::bail!("failed");
            }
            Ok(json!("processed"))
        }
    })
}

fn error_messages(outcomes: &[ProcessingOutcome]) -> Vec<Option<String>> {
    outcomes
        .iter()
        .map(|outcome| match outcome {
            ProcessingOutcome::Success { .. } => None,
            ProcessingOutcome::Failure { error_message, .. } => Some(error_message.clone()),
        })
        .collect()
}

#[tokio::test]
async fn test_global_short_circuit_stops_handling_after_first_failure() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));

    processor
        .register(
            vec![
                fifo_record("A", Some("group1"), "fail"),
                fifo_record("B", Some("group1"), "ok"),
                fifo_record("C", Some("group2"), "ok"),
            ],
            recording_handler(seen.clone()),
            ProcessorOptions::default(),
        )
        .unwrap();

    // Every record failed, so the default options escalate
    let err = processor.process().await.unwrap_err();
    let failure = match err {
        BatchError::FullBatchFailure(failure) => failure,
        other => panic!("expected full batch failure, got {:?}", other),
    };

    assert_eq!(*seen.lock(), vec!["A".to_string()]);
    assert!(matches!(failure.record_errors[0], RecordError::Handler(_)));
    assert_eq!(failure.record_errors[1], RecordError::SqsFifoShortCircuit);
    assert_eq!(failure.record_errors[2], RecordError::SqsFifoShortCircuit);
    assert_eq!(processor.response().unwrap().identifiers(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_global_short_circuit_keeps_earlier_successes() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));

    processor
        .register(
            vec![
                fifo_record("1", Some("g"), "ok"),
                fifo_record("2", Some("g"), "fail"),
                fifo_record("3", Some("h"), "ok"),
                fifo_record("4", None, "ok"),
            ],
            recording_handler(seen.clone()),
            ProcessorOptions::default(),
        )
        .unwrap();
    let outcomes = processor.process().await.unwrap();

    assert_eq!(*seen.lock(), vec!["1".to_string(), "2".to_string()]);
    assert_eq!(
        error_messages(&outcomes),
        vec![
            None,
            Some("failed".to_string()),
            Some("A previous record failed processing".to_string()),
            Some("A previous record failed processing".to_string()),
        ]
    );
    assert_eq!(processor.response().unwrap().identifiers(), vec!["2", "3", "4"]);
}

#[tokio::test]
async fn test_group_skip_lets_other_groups_progress() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));

    processor
        .register(
            vec![
                fifo_record("A", Some("group1"), "fail"),
                fifo_record("B", Some("group1"), "ok"),
                fifo_record("C", Some("group2"), "ok"),
            ],
            recording_handler(seen.clone()),
            ProcessorOptions::default().with_skip_group_on_error(true),
        )
        .unwrap();
    let outcomes = processor.process().await.unwrap();

    assert_eq!(*seen.lock(), vec!["A".to_string(), "C".to_string()]);
    assert_eq!(
        error_messages(&outcomes),
        vec![
            Some("failed".to_string()),
            Some("A previous record from message group group1 failed processing".to_string()),
            None,
        ]
    );
    assert_eq!(processor.response().unwrap().identifiers(), vec!["A", "B"]);
    assert_eq!(
        processor.store().errors().unwrap()[1],
        RecordError::SqsFifoMessageGroupShortCircuit {
            group_id: "group1".to_string()
        }
    );
}

#[tokio::test]
async fn test_group_skip_tracks_every_failed_group() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));

    processor
        .register(
            vec![
                fifo_record("1", Some("a"), "ok"),
                fifo_record("2", Some("b"), "fail"),
                fifo_record("3", Some("a"), "fail"),
                fifo_record("4", Some("b"), "ok"),
                fifo_record("5", Some("a"), "ok"),
                fifo_record("6", Some("c"), "ok"),
            ],
            recording_handler(seen.clone()),
            ProcessorOptions::default().with_skip_group_on_error(true),
        )
        .unwrap();
    processor.process().await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec!["1".to_string(), "2".to_string(), "3".to_string(), "6".to_string()]
    );
    assert_eq!(processor.response().unwrap().identifiers(), vec!["2", "3", "4", "5"]);
}

#[tokio::test]
async fn test_group_skip_never_skips_records_without_group() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));

    processor
        .register(
            vec![
                fifo_record("1", None, "fail"),
                fifo_record("2", None, "ok"),
            ],
            recording_handler(seen.clone()),
            ProcessorOptions::default().with_skip_group_on_error(true),
        )
        .unwrap();
    processor.process().await.unwrap();

    assert_eq!(*seen.lock(), vec!["1".to_string(), "2".to_string()]);
    assert_eq!(processor.response().unwrap().identifiers(), vec!["1"]);
}

#[tokio::test]
async fn test_failed_groups_do_not_carry_over_to_next_batch() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let options = ProcessorOptions::default()
        .with_skip_group_on_error(true)
        .with_throw_on_full_batch_failure(false);

    processor
        .register(
            vec![fifo_record("1", Some("g"), "fail")],
            recording_handler(seen.clone()),
            options.clone(),
        )
        .unwrap();
    processor.process().await.unwrap();
    assert!(processor.store().failed_groups().unwrap().is_empty());

    processor
        .register(
            vec![fifo_record("2", Some("g"), "ok")],
            recording_handler(seen.clone()),
            options,
        )
        .unwrap();
    let outcomes = processor.process().await.unwrap();

    assert!(outcomes[0].is_success());
    assert!(processor.response().unwrap().batch_item_failures.is_empty());
}

#[tokio::test]
async fn test_group_tracking_is_cleared_before_full_batch_failure() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));

    processor
        .register(
            vec![
                fifo_record("1", Some("g1"), "fail"),
                fifo_record("2", Some("g2"), "fail"),
                fifo_record("3", Some("g1"), "ok"),
            ],
            recording_handler(seen.clone()),
            ProcessorOptions::default().with_skip_group_on_error(true),
        )
        .unwrap();

    let err = processor.process().await.unwrap_err();
    assert!(matches!(err, BatchError::FullBatchFailure(_)));
    assert!(processor.store().failed_groups().unwrap().is_empty());
    assert_eq!(processor.store().current_group().unwrap(), None);
}

#[tokio::test]
async fn test_manual_failure_marks_the_records_group() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));
    processor
        .register(
            vec![],
            recording_handler(seen.clone()),
            ProcessorOptions::default().with_skip_group_on_error(true),
        )
        .unwrap();

    processor
        .failure_handler(
            &fifo_record("m", Some("g"), "ok"),
            RecordError::handler(anyhow::anyhow!("rejected upstream")),
        )
        .unwrap();

    assert!(processor.store().is_group_failed("g").unwrap());
    assert_eq!(processor.response().unwrap().identifiers(), vec!["m"]);
}

#[tokio::test]
async fn test_fifo_ignores_parallel_option() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    let seen = Arc::new(Mutex::new(Vec::new()));

    processor
        .register(
            vec![
                fifo_record("1", Some("g"), "fail"),
                fifo_record("2", Some("g"), "ok"),
            ],
            recording_handler(seen.clone()),
            ProcessorOptions::default().with_process_in_parallel(true),
        )
        .unwrap();
    let _ = processor.process().await;

    assert_eq!(*seen.lock(), vec!["1".to_string()]);
}

#[tokio::test]
async fn test_fifo_tracking_is_isolated_per_invocation() {
    let processor = Arc::new(BatchProcessor::sqs_fifo());
    let (failed_tx, failed_rx) = tokio::sync::oneshot::channel::<()>();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();

    // Invocation 1 fails a record and then waits while invocation 2 runs
    let first = {
        let processor = processor.clone();
        tokio::spawn(with_invocation("inv-1", async move {
            let handler = handler_fn(move |record: Value| async move {
                if record["body"] == json!("fail") {
                    anyhow::bail!("failed");
                }
                Ok(Value::Null)
            });
            processor
                .register(
                    vec![fifo_record("1-a", Some("g"), "fail")],
                    handler,
                    ProcessorOptions::default()
                        .with_skip_group_on_error(true)
                        .with_throw_on_full_batch_failure(false),
                )
                .unwrap();
            processor.process().await.unwrap();
            failed_tx.send(()).unwrap();
            done_rx.await.unwrap();
            processor.response().unwrap()
        }))
    };

    let second = {
        let processor = processor.clone();
        tokio::spawn(with_invocation("inv-2", async move {
            failed_rx.await.unwrap();
            let seen = Arc::new(Mutex::new(Vec::new()));
            processor
                .register(
                    vec![fifo_record("2-a", Some("g"), "ok")],
                    recording_handler(seen.clone()),
                    ProcessorOptions::default().with_skip_group_on_error(true),
                )
                .unwrap();
            let outcomes = processor.process().await.unwrap();
            done_tx.send(()).unwrap();
            let seen_ids = seen.lock().clone();
            (outcomes, seen_ids)
        }))
    };

    let (outcomes, seen) = second.await.unwrap();
    let first_response = first.await.unwrap();

    assert!(outcomes[0].is_success());
    assert_eq!(seen, vec!["2-a".to_string()]);
    assert_eq!(first_response.identifiers(), vec!["1-a"]);
}

#[tokio::test]
async fn test_zero_record_fifo_batch() {
    let processor = SqsFifoPartialProcessor::sqs_fifo();
    processor
        .register(
            vec![],
            recording_handler(Arc::new(Mutex::new(Vec::new()))),
            ProcessorOptions::default(),
        )
        .unwrap();

    assert!(processor.process().await.unwrap().is_empty());
    processor.clean().unwrap();
    assert!(processor.response().unwrap().batch_item_failures.is_empty());
}
