//! End-to-end tests running pipelines through an adapter.

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::core::{
        ExitState, Message, PipeForward, PipeLineExit, PipeLineSession, PipeRunResult,
        EXCEPTION_FORWARD, EXIT_CODE_KEY, EXIT_STATE_KEY, FAILURE_FORWARD, MESSAGE_ID_KEY,
        SUCCESS_FORWARD,
    };
    use crate::observability::MeterType;
    use crate::pipeline::{Adapter, PipeLine};
    use crate::pipes::{FnPipe, PipeSettings, PipeSpec};
    use crate::processors::pipe::PREVIOUS_PIPE_KEY;
    use crate::resources::{InMemoryCache, InMemoryLocker, LockTable, Propagation};
    use crate::testing::{
        assert_pipeline_state, assert_pipeline_succeeded, assert_pipeline_text, BlockingPipe,
        CountingPipe, EchoPipe, FailingLocker, FailingPipe, FixedPipe, PanickingPipe,
        SessionWritingPipe, TestFixture, TransactionEvent,
    };

    fn error_document(message: &Message) -> serde_json::Value {
        serde_json::from_str(&message.as_string().unwrap()).unwrap()
    }

    /// A validator that fails every time, numbering its attempts.
    fn always_failing_validator(attempts: Arc<AtomicUsize>) -> PipeSpec {
        PipeSpec::new(FnPipe::new("validator", move |_message, _session| {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(PipeRunResult::with_forward(format!("attempt {n}"), FAILURE_FORWARD))
        }))
        .with_forward(FAILURE_FORWARD, "fix")
    }

    #[tokio::test]
    async fn test_hello_reaches_success_exit() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("hello")
            .with_pipe(PipeSpec::new(CountingPipe::new("A")).with_forward(SUCCESS_FORWARD, "Exit1"))
            .with_first_pipe("A")
            .with_exit(PipeLineExit::success("Exit1").with_exit_code(0))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("hello").await;

        assert_pipeline_state(&result, ExitState::Success, 0);
        assert_pipeline_text(&result, "HELLO");
    }

    #[tokio::test]
    async fn test_exception_forward_reaches_error_exit() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("errors")
            .with_pipe(
                PipeSpec::new(FailingPipe::new("B", "cannot parse"))
                    .with_forward(SUCCESS_FORWARD, "Exit1")
                    .with_forward(EXCEPTION_FORWARD, "ErrorExit"),
            )
            .with_exit(PipeLineExit::success("Exit1"))
            .with_exit(PipeLineExit::error("ErrorExit").with_exit_code(500))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("<order/>").await;

        assert_pipeline_state(&result, ExitState::Error, 500);
        let doc = error_document(result.result());
        assert_eq!(doc["errorMessage"]["location"], "pipe [B]");
        assert_eq!(doc["errorMessage"]["originalMessage"]["message"], "<order/>");
        assert!(doc["errorMessage"]["message"].as_str().unwrap().contains("cannot parse"));
        assert_eq!(adapter.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_unknown_forward_at_run_time_is_fatal() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(FixedPipe::new("A", "x").with_forward("bogus")))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("in").await;

        assert_pipeline_state(&result, ExitState::Error, 0);
        let doc = error_document(result.result());
        assert_eq!(doc["errorMessage"]["kind"], "configuration");
        assert_eq!(doc["errorMessage"]["location"], "adapter [p]");
    }

    #[tokio::test]
    async fn test_unresolvable_forward_fails_build() {
        let err = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")).with_forward(EXCEPTION_FORWARD, "nowhere"))
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_output_validator_redirects_once() {
        let fixture = TestFixture::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let fix = CountingPipe::new("fix");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")).with_forward(SUCCESS_FORWARD, "READY"))
            .with_pipe(PipeSpec::new(fix.clone()))
            .with_exit(PipeLineExit::success("READY"))
            .with_output_validator(always_failing_validator(attempts.clone()))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("payload").await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(fix.call_count(), 1);
        assert_eq!(fix.inputs(), vec![Some("attempt 1".to_string())]);
        assert_pipeline_succeeded(&result);
        assert_pipeline_text(&result, "attempt 2");
    }

    #[tokio::test]
    async fn test_exit_can_skip_output_validation() {
        let fixture = TestFixture::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")).with_forward(SUCCESS_FORWARD, "RAW"))
            .with_pipe(PipeSpec::new(EchoPipe::new("fix")))
            .with_exit(PipeLineExit::success("READY"))
            .with_exit(PipeLineExit::success("RAW").with_skip_validation(true))
            .with_output_validator(always_failing_validator(attempts.clone()))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("payload").await;

        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert_pipeline_text(&result, "payload");
    }

    #[tokio::test]
    async fn test_input_validator_failure_skips_pipes() {
        let fixture = TestFixture::new();
        let pipe = CountingPipe::new("A");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(pipe.clone()))
            .with_exit(PipeLineExit::success("READY"))
            .with_exit(PipeLineExit::rejected("REJECTED").with_exit_code(400))
            .with_input_validator(
                PipeSpec::new(FixedPipe::new("validator", "not valid").with_forward(FAILURE_FORWARD))
                    .with_forward(FAILURE_FORWARD, "REJECTED"),
            )
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("payload").await;

        assert_pipeline_state(&result, ExitState::Rejected, 400);
        assert_pipeline_text(&result, "not valid");
        assert_eq!(pipe.call_count(), 0);
    }

    #[tokio::test]
    async fn test_wrappers_surround_the_walk() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")))
            .with_input_wrapper(PipeSpec::new(CountingPipe::new("unwrap")))
            .with_output_wrapper(PipeSpec::new(FnPipe::new("wrap", |message, _session| {
                let text = message.as_string().unwrap_or_default();
                Ok(PipeRunResult::new(format!("<env>{text}</env>")))
            })))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("hello").await;

        assert_pipeline_text(&result, "<env>HELLO</env>");
    }

    #[tokio::test]
    async fn test_exit_can_skip_output_wrapping() {
        let fixture = TestFixture::new();
        let wrapper = CountingPipe::new("wrap");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")))
            .with_exit(PipeLineExit::success("READY").with_skip_wrapping(true))
            .with_output_wrapper(PipeSpec::new(wrapper.clone()))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("hello").await;

        assert_pipeline_text(&result, "hello");
        assert_eq!(wrapper.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_bypasses_walk_for_same_key() {
        let fixture = TestFixture::new();
        let pipe = CountingPipe::new("A");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(pipe.clone()))
            .with_cache(Arc::new(InMemoryCache::new("p-cache")))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let first = adapter.process("same").await;
        let second = adapter.process("same").await;
        let third = adapter.process("other").await;

        assert_eq!(pipe.call_count(), 2);
        assert_pipeline_text(&first, "SAME");
        assert_pipeline_text(&second, "SAME");
        assert_eq!(second.state(), first.state());
        assert_pipeline_text(&third, "OTHER");
    }

    #[tokio::test]
    async fn test_pipe_concurrency_is_bounded() {
        let fixture = TestFixture::new();
        let pipe = BlockingPipe::new("slow");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(pipe.clone()).with_settings(PipeSettings::new().with_max_threads(2)))
            .build()
            .unwrap();
        let adapter = Arc::new(fixture.adapter(pipeline));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let adapter = Arc::clone(&adapter);
                tokio::spawn(async move { adapter.process(format!("message {i}")).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pipe.running(), 2);
        assert_eq!(fixture.services.limiters.available_permits("p/slow"), Some(0));

        pipe.release(1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pipe.completed(), 1);
        assert_eq!(pipe.running(), 2);

        pipe.release(2);
        for handle in handles {
            assert_pipeline_succeeded(&handle.await.unwrap());
        }
        assert_eq!(pipe.max_running(), 2);
        assert_eq!(fixture.statistics.count("p/slow", MeterType::PipeWaitTime), 3);
    }

    #[tokio::test]
    async fn test_pipeline_concurrency_is_bounded() {
        let fixture = TestFixture::new();
        let pipe = BlockingPipe::new("slow");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(pipe.clone()))
            .with_max_threads(1)
            .build()
            .unwrap();
        let adapter = Arc::new(fixture.adapter(pipeline));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let adapter = Arc::clone(&adapter);
                tokio::spawn(async move { adapter.process("x").await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pipe.running(), 1);

        pipe.release(2);
        for handle in handles {
            assert_pipeline_succeeded(&handle.await.unwrap());
        }
        assert_eq!(pipe.max_running(), 1);
        assert_eq!(fixture.statistics.count("p", MeterType::PipelineWaitTime), 2);
    }

    #[tokio::test]
    async fn test_failing_pipe_rolls_back_transaction() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("tx")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")))
            .with_pipe(PipeSpec::new(FailingPipe::new("B", "insert failed")))
            .with_transaction(Propagation::Required, None)
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("row").await;

        assert_pipeline_state(&result, ExitState::Error, 0);
        let records = fixture.transactions.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, TransactionEvent::Begin);
        assert_eq!(records[1].event, TransactionEvent::Rollback);
        assert!(records[1].rollback_only);
    }

    #[tokio::test]
    async fn test_successful_walk_commits_transaction() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("tx")
            .with_pipe(
                PipeSpec::new(EchoPipe::new("A"))
                    .with_settings(PipeSettings::new().with_transaction(Propagation::Mandatory, None)),
            )
            .with_transaction(Propagation::Required, None)
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("row").await;

        assert_pipeline_succeeded(&result);
        assert_eq!(fixture.transactions.records_of(TransactionEvent::Begin).len(), 1);
        assert_eq!(fixture.transactions.records_of(TransactionEvent::Commit).len(), 1);
    }

    #[tokio::test]
    async fn test_requires_new_pipe_runs_in_own_transaction() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("tx")
            .with_pipe(
                PipeSpec::new(EchoPipe::new("A"))
                    .with_settings(PipeSettings::new().with_transaction(Propagation::RequiresNew, None)),
            )
            .with_transaction(Propagation::Required, None)
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        adapter.process("row").await;

        let names: Vec<_> = fixture
            .transactions
            .records_of(TransactionEvent::Begin)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["tx".to_string(), "tx/A".to_string()]);
        assert_eq!(fixture.transactions.records_of(TransactionEvent::Commit).len(), 2);
    }

    #[tokio::test]
    async fn test_pipe_lock_is_released_when_transaction_times_out() {
        let fixture = TestFixture::new();
        let table = Arc::new(LockTable::new());
        let pipe = BlockingPipe::new("slow");
        let pipeline = PipeLine::builder("p")
            .with_pipe(
                PipeSpec::new(pipe.clone()).with_settings(
                    PipeSettings::new()
                        .with_locker(Arc::new(InMemoryLocker::new("job").with_table(table.clone())))
                        .with_transaction(Propagation::Required, Some(Duration::from_millis(50))),
                ),
            )
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let timed_out = adapter.process("first").await;

        assert_pipeline_state(&timed_out, ExitState::Error, 0);
        assert_eq!(error_document(timed_out.result())["errorMessage"]["kind"], "timeout");
        assert!(!table.is_locked("job"));

        pipe.release(1);
        let second = adapter.process("second").await;

        assert_pipeline_succeeded(&second);
        assert_pipeline_text(&second, "second");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_lock_is_released_when_transaction_times_out() {
        let fixture = TestFixture::new();
        let table = Arc::new(LockTable::new());
        let pipe = BlockingPipe::new("slow");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(pipe.clone()))
            .with_locker(Arc::new(InMemoryLocker::new("p-job").with_table(table.clone())))
            .with_transaction(Propagation::Required, Some(Duration::from_millis(50)))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let timed_out = adapter.process("first").await;

        assert_pipeline_state(&timed_out, ExitState::Error, 0);
        assert!(!table.is_locked("p-job"));

        pipe.release(1);
        let second = adapter.process("second").await;

        assert_pipeline_text(&second, "second");
        assert_eq!(pipe.completed(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_timeout_rolls_back_pipe_transaction() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("tx")
            .with_pipe(
                PipeSpec::new(BlockingPipe::new("A"))
                    .with_settings(PipeSettings::new().with_transaction(Propagation::RequiresNew, None)),
            )
            .with_transaction(Propagation::Required, Some(Duration::from_millis(50)))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("row").await;

        assert_pipeline_state(&result, ExitState::Error, 0);
        let begun = fixture.transactions.records_of(TransactionEvent::Begin).len();
        let rolled_back: Vec<_> = fixture
            .transactions
            .records_of(TransactionEvent::Rollback)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(begun, 2);
        assert_eq!(rolled_back, vec!["tx/A".to_string(), "tx".to_string()]);
        assert!(fixture.transactions.records_of(TransactionEvent::Commit).is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_locker_degrades_to_empty_success() {
        let fixture = TestFixture::new();
        let pipe = CountingPipe::new("A");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(pipe.clone()))
            .with_locker(Arc::new(FailingLocker::new("p-lock")))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("x").await;

        assert_pipeline_succeeded(&result);
        assert!(result.result().is_null());
        assert_eq!(pipe.call_count(), 0);
    }

    #[tokio::test]
    async fn test_pipe_locker_fails_fast() {
        let fixture = TestFixture::new();
        let pipe = CountingPipe::new("A");
        let pipeline = PipeLine::builder("p")
            .with_pipe(
                PipeSpec::new(pipe.clone()).with_settings(
                    PipeSettings::new().with_locker(Arc::new(FailingLocker::new("a-lock"))),
                ),
            )
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("x").await;

        assert_pipeline_state(&result, ExitState::Error, 0);
        assert_eq!(error_document(result.result())["errorMessage"]["kind"], "lock_not_acquired");
        assert_eq!(pipe.call_count(), 0);
        assert_eq!(adapter.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_global_forward_applies_to_every_pipe() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")))
            .with_pipe(PipeSpec::new(FailingPipe::new("B", "boom")))
            .with_exit(PipeLineExit::success("READY"))
            .with_exit(PipeLineExit::error("ERR").with_exit_code(2))
            .with_global_forward(PipeForward::exception("ERR"))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("x").await;

        assert_pipeline_state(&result, ExitState::Error, 2);
        assert_eq!(error_document(result.result())["errorMessage"]["location"], "pipe [B]");
    }

    #[tokio::test]
    async fn test_empty_result_exit() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")))
            .with_exit(PipeLineExit::success("DONE").with_empty_result(true))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("x").await;

        assert_pipeline_succeeded(&result);
        assert!(result.result().is_null());
    }

    #[tokio::test]
    async fn test_exit_is_recorded_in_session() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")))
            .with_exit(PipeLineExit::rejected("NOPE").with_exit_code(7))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);
        let mut session = PipeLineSession::new();

        adapter
            .process_message(Some("m-42".to_string()), Message::text("x"), &mut session)
            .await;

        assert_eq!(session.get_string(MESSAGE_ID_KEY).as_deref(), Some("m-42"));
        assert_eq!(session.get_string(EXIT_STATE_KEY).as_deref(), Some("REJECTED"));
        assert_eq!(session.get_string(EXIT_CODE_KEY).as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_null_message_is_transformed() {
        let fixture = TestFixture::new();
        let pipe = CountingPipe::new("A");
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(pipe.clone()))
            .with_transform_null_message("<empty/>")
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        adapter.process(Message::null()).await;

        assert_eq!(pipe.inputs(), vec![Some("<empty/>".to_string())]);
    }

    #[tokio::test]
    async fn test_result_carries_previous_pipe() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")))
            .with_pipe(PipeSpec::new(EchoPipe::new("B")))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("x").await;

        assert_eq!(result.result().context()[PREVIOUS_PIPE_KEY], "B");
    }

    #[tokio::test]
    async fn test_session_carries_values_between_pipes() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(PipeSpec::new(SessionWritingPipe::new("remember", "saved")))
            .with_pipe(PipeSpec::new(FixedPipe::new("replace", "replaced")))
            .with_pipe(
                PipeSpec::new(EchoPipe::new("recall"))
                    .with_settings(PipeSettings::new().with_input_from_session_key("saved")),
            )
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("first").await;

        assert_pipeline_text(&result, "first");
    }

    #[tokio::test]
    async fn test_moved_elements_are_restored_downstream() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(
                PipeSpec::new(FixedPipe::new("produce", "<doc><blob>large content</blob></doc>"))
                    .with_settings(PipeSettings::new().with_element_to_move("blob", None)),
            )
            .with_pipe(PipeSpec::new(FnPipe::new("inspect", |message, _session| {
                let text = message.as_string().unwrap_or_default();
                assert!(!text.contains("large content"));
                Ok(PipeRunResult::new(text))
            })))
            .with_pipe(
                PipeSpec::new(EchoPipe::new("restore"))
                    .with_settings(PipeSettings::new().with_restore_moved_elements(true)),
            )
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("x").await;

        assert_pipeline_text(&result, "<doc><blob>large content</blob></doc>");
    }

    #[tokio::test]
    async fn test_panicking_pipe_becomes_error_result() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("p")
            .with_pipe(
                PipeSpec::new(PanickingPipe::new("A")).with_forward(EXCEPTION_FORWARD, "READY"),
            )
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        let result = adapter.process("x").await;

        assert_pipeline_state(&result, ExitState::Error, 0);
        assert_eq!(error_document(result.result())["errorMessage"]["kind"], "panic");
    }

    #[tokio::test]
    async fn test_adapter_records_statistics() {
        let fixture = TestFixture::new();
        let pipeline = PipeLine::builder("stats")
            .with_pipe(PipeSpec::new(EchoPipe::new("A")))
            .build()
            .unwrap();
        let adapter = fixture.adapter(pipeline);

        adapter.process("abcd").await;
        adapter
            .process_message(Some("m-2".to_string()), Message::text("ef"), &mut PipeLineSession::new())
            .await;

        let stats = adapter.stats();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.last_message.map(|m| m.message_id).as_deref(), Some("m-2"));
        assert_eq!(fixture.statistics.count("stats", MeterType::PipelineDuration), 2);
        let sizes = fixture.statistics.summary("stats", MeterType::PipelineRequestSize).unwrap();
        assert_eq!(sizes.count, 2);
        assert!((sizes.mean() - 3.0).abs() < f64::EPSILON);
        assert_eq!(fixture.statistics.count("stats/A", MeterType::PipeDuration), 2);
    }

    #[tokio::test]
    async fn test_adapters_share_nothing_but_services() {
        let fixture = TestFixture::new();
        let first: Adapter = fixture.adapter(
            PipeLine::builder("one")
                .with_pipe(PipeSpec::new(EchoPipe::new("A")))
                .build()
                .unwrap(),
        );
        let second: Adapter = fixture.adapter(
            PipeLine::builder("two")
                .with_pipe(PipeSpec::new(FailingPipe::new("A", "boom")))
                .build()
                .unwrap(),
        );

        assert_pipeline_succeeded(&first.process("x").await);
        assert_pipeline_state(&second.process("x").await, ExitState::Error, 0);
        assert_eq!(first.stats().errors, 0);
        assert_eq!(second.stats().errors, 1);
        assert_eq!(fixture.statistics.count("one/A", MeterType::PipeDuration), 1);
        assert_eq!(fixture.statistics.count("two/A", MeterType::PipeDuration), 1);
    }
}
