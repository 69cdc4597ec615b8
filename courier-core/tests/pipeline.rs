use async_trait::async_trait;
use courier_core::exception::{ExceptionContext, ExceptionLogger};
use courier_core::filter::{Filter, LoggingFilter, Next, ValidationFilter, Validator};
use courier_core::request::HandlerRequest;
use courier_core::retry::{BackoffRetryPolicy, RetryPolicy, RetrySettings};
use courier_core::services::ServiceMap;
use courier_core::{
    CommandEnvelope, CommandHandler, CommandProcessor, CommandSender, CourierError,
    CourierResult, EventHandler, HandlerCatalog, HandlerContext, HandlerDescriptor,
    HandlerResponse, ProcessorConfiguration, ProcessorSettings, QueuePolicy,
};
use courier_macros::{command, event};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[command(output = u64)]
struct Add {
    a: u64,
    b: u64,
}

#[derive(Default)]
struct AddHandler;

#[async_trait]
impl CommandHandler<Add> for AddHandler {
    async fn handle(
        &self,
        cmd: &Add,
        _ctx: &HandlerContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<u64> {
        Ok(cmd.a + cmd.b)
    }
}

#[command]
struct Touch;

/// 计数调用次数，前 `failures` 次返回队列错误
struct TouchHandler {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

#[async_trait]
impl CommandHandler<Touch> for TouchHandler {
    async fn handle(
        &self,
        _cmd: &Touch,
        _ctx: &HandlerContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(CourierError::Queue {
                reason: format!("attempt {call} failed"),
            });
        }
        Ok(())
    }
}

fn touch(calls: &Arc<AtomicUsize>, failures: usize) -> HandlerDescriptor {
    let calls = calls.clone();
    HandlerDescriptor::command_with::<Touch, TouchHandler, _>(move || {
        Ok(TouchHandler {
            calls: calls.clone(),
            failures,
        })
    })
}

#[command]
struct Explode;

#[derive(Default)]
struct ExplodeHandler;

#[async_trait]
impl CommandHandler<Explode> for ExplodeHandler {
    async fn handle(
        &self,
        _cmd: &Explode,
        _ctx: &HandlerContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<()> {
        panic!("kaboom")
    }
}

#[command]
struct Legacy;

#[derive(Default)]
struct LegacyHandler;

fn call_legacy_backend() -> anyhow::Result<()> {
    anyhow::bail!("legacy backend unavailable")
}

#[async_trait]
impl CommandHandler<Legacy> for LegacyHandler {
    async fn handle(
        &self,
        _cmd: &Legacy,
        _ctx: &HandlerContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<()> {
        call_legacy_backend()?;
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, step: impl Into<String>) {
        self.0.lock().unwrap().push(step.into());
    }

    fn steps(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct Mark(&'static str, Journal);

#[async_trait]
impl Filter<HandlerContext> for Mark {
    async fn invoke(
        &self,
        ctx: &mut HandlerContext,
        next: Next<'_, HandlerContext>,
    ) -> CourierResult<()> {
        self.1.push(format!("{}:before", self.0));
        let result = next.run(ctx).await;
        self.1.push(format!("{}:after", self.0));
        result
    }
}

struct Fallback;

#[async_trait]
impl Filter<ExceptionContext> for Fallback {
    async fn invoke(
        &self,
        ctx: &mut ExceptionContext,
        next: Next<'_, ExceptionContext>,
    ) -> CourierResult<()> {
        ctx.set_response(HandlerResponse::completed(()));
        next.run(ctx).await
    }
}

#[derive(Clone, Default)]
struct CountingLogger(Arc<AtomicUsize>);

#[async_trait]
impl ExceptionLogger for CountingLogger {
    async fn log(&self, _ctx: &ExceptionContext, _cancel: &CancellationToken) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn processor(catalog: HandlerCatalog) -> CommandProcessor {
    CommandProcessor::new(ProcessorConfiguration::builder().handlers(catalog).build())
}

#[tokio::test]
async fn command_returns_typed_output() {
    let processor =
        processor(HandlerCatalog::new().register(HandlerDescriptor::command::<Add, AddHandler>()));
    let cancel = CancellationToken::new();
    let sum = processor.send(Add { a: 2, b: 3 }, &cancel).await.unwrap();
    assert_eq!(sum, 5);
}

#[tokio::test]
async fn unregistered_and_duplicate_handlers_fail_resolution() {
    let cancel = CancellationToken::new();

    let empty = processor(HandlerCatalog::new());
    match empty.process(Add { a: 1, b: 1 }, &cancel).await {
        Err(CourierError::HandlerNotFound { message_type }) => assert_eq!(message_type, "Add"),
        other => panic!("unexpected result: {other:?}"),
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let ambiguous = processor(
        HandlerCatalog::new()
            .register(touch(&calls, 0))
            .register(touch(&calls, 0)),
    );
    assert!(matches!(
        ambiguous.process(Touch, &cancel).await,
        Err(CourierError::AmbiguousHandler { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn global_filters_wrap_declared_filters() {
    let journal = Journal::default();
    let config = ProcessorConfiguration::builder()
        .handlers(HandlerCatalog::new().register(
            HandlerDescriptor::command::<Add, AddHandler>()
                .with_filter(Mark("declared", journal.clone())),
        ))
        .filters(vec![
            Arc::new(Mark("global", journal.clone())) as Arc<dyn Filter<HandlerContext>>,
            Arc::new(LoggingFilter),
        ])
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();

    assert_eq!(processor.send(Add { a: 1, b: 2 }, &cancel).await.unwrap(), 3);
    assert_eq!(
        journal.steps(),
        vec![
            "global:before",
            "declared:before",
            "declared:after",
            "global:after"
        ]
    );
}

struct RejectAll;

impl Validator for RejectAll {
    fn validate(&self, _request: &HandlerRequest) -> bool {
        false
    }
}

#[tokio::test]
async fn validation_failure_short_circuits_when_aborting() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = ProcessorConfiguration::builder()
        .handlers(HandlerCatalog::new().register(touch(&calls, 0)))
        .services(ServiceMap::new().with::<dyn Validator>(Arc::new(RejectAll)))
        .filters(vec![Arc::new(ValidationFilter) as Arc<dyn Filter<HandlerContext>>])
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();

    let response = processor.process(Touch, &cancel).await.unwrap();
    match response {
        HandlerResponse::Failed(fault) => {
            assert_eq!(fault.message_name, "Touch");
            assert_eq!(fault.reason, "validation failed");
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn validation_failure_only_warns_when_not_aborting() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = ProcessorConfiguration::builder()
        .settings(ProcessorSettings {
            abort_on_invalid_command: false,
            ..ProcessorSettings::default()
        })
        .handlers(HandlerCatalog::new().register(touch(&calls, 0)))
        .services(ServiceMap::new().with::<dyn Validator>(Arc::new(RejectAll)))
        .filters(vec![Arc::new(ValidationFilter) as Arc<dyn Filter<HandlerContext>>])
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();

    assert!(processor.process(Touch, &cancel).await.unwrap().is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_fault_propagates_unchanged() {
    let calls = Arc::new(AtomicUsize::new(0));
    let logger = CountingLogger::default();
    let config = ProcessorConfiguration::builder()
        .handlers(HandlerCatalog::new().register(touch(&calls, 1)))
        .exception_loggers(vec![Arc::new(logger.clone()) as Arc<dyn ExceptionLogger>])
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();

    match processor.process(Touch, &cancel).await {
        Err(CourierError::Queue { reason }) => assert_eq!(reason, "attempt 1 failed"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(logger.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn anyhow_errors_surface_as_unhandled() {
    let processor = processor(
        HandlerCatalog::new().register(HandlerDescriptor::command::<Legacy, LegacyHandler>()),
    );
    let cancel = CancellationToken::new();
    match processor.process(Legacy, &cancel).await {
        Err(CourierError::Unhandled(e)) => assert_eq!(e.to_string(), "legacy backend unavailable"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn exception_filter_response_swallows_fault() {
    let calls = Arc::new(AtomicUsize::new(0));
    let processor = processor(
        HandlerCatalog::new().register(touch(&calls, 5).with_exception_filter(Fallback)),
    );
    let cancel = CancellationToken::new();
    let response = processor.process(Touch, &cancel).await.unwrap();
    assert!(response.is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_panic_becomes_fault() {
    let processor = processor(
        HandlerCatalog::new().register(HandlerDescriptor::command::<Explode, ExplodeHandler>()),
    );
    let cancel = CancellationToken::new();
    match processor.process(Explode, &cancel).await {
        Err(CourierError::HandlerPanicked { handler, reason }) => {
            assert!(handler.ends_with("ExplodeHandler"));
            assert_eq!(reason, "kaboom");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_request_skips_handler_and_is_not_logged() {
    let calls = Arc::new(AtomicUsize::new(0));
    let logger = CountingLogger::default();
    let config = ProcessorConfiguration::builder()
        .handlers(HandlerCatalog::new().register(touch(&calls, 0)))
        .exception_loggers(vec![Arc::new(logger.clone()) as Arc<dyn ExceptionLogger>])
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        processor.process(Touch, &cancel).await,
        Err(CourierError::Cancelled)
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(logger.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exception_filter_may_swallow_cancellation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let logger = CountingLogger::default();
    let config = ProcessorConfiguration::builder()
        .handlers(HandlerCatalog::new().register(touch(&calls, 0).with_exception_filter(Fallback)))
        .exception_loggers(vec![Arc::new(logger.clone()) as Arc<dyn ExceptionLogger>])
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let response = processor.process(Touch, &cancel).await.unwrap();
    assert!(response.is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(logger.0.load(Ordering::SeqCst), 0);
}

/// 对指定的加数直接 panic
struct Tripwire(u64);

#[async_trait]
impl Filter<HandlerContext> for Tripwire {
    async fn invoke(
        &self,
        ctx: &mut HandlerContext,
        next: Next<'_, HandlerContext>,
    ) -> CourierResult<()> {
        if ctx.request().message_as::<Add>().is_some_and(|add| add.a == self.0) {
            panic!("tripwire {}", self.0);
        }
        next.run(ctx).await
    }
}

#[tokio::test]
async fn filter_panic_is_routed_through_exception_chain() {
    let logger = CountingLogger::default();
    let config = ProcessorConfiguration::builder()
        .handlers(HandlerCatalog::new().register(
            HandlerDescriptor::command::<Add, AddHandler>().with_filter(Tripwire(13)),
        ))
        .exception_loggers(vec![Arc::new(logger.clone()) as Arc<dyn ExceptionLogger>])
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();

    match processor.process(Add { a: 13, b: 1 }, &cancel).await {
        Err(CourierError::HandlerPanicked { handler, reason }) => {
            assert!(handler.ends_with("AddHandler"));
            assert_eq!(reason, "tripwire 13");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(logger.0.load(Ordering::SeqCst), 1);

    // 管线在 panic 后仍可继续使用
    assert_eq!(processor.send(Add { a: 1, b: 1 }, &cancel).await.unwrap(), 2);
}

#[tokio::test]
async fn filter_panic_can_be_recovered_by_exception_filter() {
    let processor = processor(HandlerCatalog::new().register(
        HandlerDescriptor::command::<Add, AddHandler>()
            .with_filter(Tripwire(13))
            .with_exception_filter(Fallback),
    ));
    let cancel = CancellationToken::new();
    let response = processor.process(Add { a: 13, b: 1 }, &cancel).await.unwrap();
    assert!(response.is_completed());
}

#[tokio::test]
async fn request_scoped_retry_policy_reinvokes_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let processor = processor(HandlerCatalog::new().register(touch(&calls, 2)));
    let cancel = CancellationToken::new();

    let request = processor.create_request(Touch);
    let policy = BackoffRetryPolicy::new(RetrySettings {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        multiplier: 1.0,
    })
    .unwrap();
    request.services().insert::<dyn RetryPolicy>(Arc::new(policy));

    let response = processor
        .process_request(Arc::new(request), &cancel)
        .await
        .unwrap();
    assert!(response.is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // 覆盖只作用于该请求
    assert!(processor.process(Touch, &cancel).await.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(!processor.configuration().services().contains::<dyn RetryPolicy>());
}

#[derive(Default)]
struct RecordingSender(Mutex<Vec<CommandEnvelope>>);

#[async_trait]
impl CommandSender for RecordingSender {
    async fn send(
        &self,
        envelope: CommandEnvelope,
        _cancel: &CancellationToken,
    ) -> CourierResult<()> {
        self.0.lock().unwrap().push(envelope);
        Ok(())
    }
}

#[tokio::test]
async fn queued_command_is_accepted_then_replayed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sender = Arc::new(RecordingSender::default());
    let config = ProcessorConfiguration::builder()
        .handlers(
            HandlerCatalog::new().register(touch(&calls, 0).with_queue_policy(QueuePolicy::Queue)),
        )
        .services(ServiceMap::new().with::<dyn CommandSender>(sender.clone()))
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();

    let request = Arc::new(processor.create_request(Touch));
    let response = processor
        .process_request(request.clone(), &cancel)
        .await
        .unwrap();
    match response {
        HandlerResponse::Accepted {
            request_id,
            message_name,
        } => {
            assert_eq!(request_id, request.id());
            assert_eq!(message_name, "Touch");
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let envelope = sender.0.lock().unwrap().pop().unwrap();
    assert_eq!(envelope.id(), request.id());
    assert!(envelope.downcast_ref::<Touch>().is_some());

    let replayed = processor.process_envelope(envelope, &cancel).await.unwrap();
    assert!(replayed.is_completed());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(sender.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn queue_policy_without_sender_is_invalid() {
    let calls = Arc::new(AtomicUsize::new(0));
    let processor = processor(
        HandlerCatalog::new().register(touch(&calls, 0).with_queue_policy(QueuePolicy::Queue)),
    );
    let cancel = CancellationToken::new();
    assert!(matches!(
        processor.process(Touch, &cancel).await,
        Err(CourierError::InvalidOperation { .. })
    ));
}

#[event(name = "orders.shipped")]
struct Shipped {
    order_id: u64,
}

struct ShippedHandler {
    seen: Arc<Mutex<Vec<u64>>>,
    fail: bool,
}

#[async_trait]
impl EventHandler<Shipped> for ShippedHandler {
    async fn handle(
        &self,
        event: &Shipped,
        _ctx: &HandlerContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<()> {
        if self.fail {
            return Err(CourierError::invalid_operation("projection offline"));
        }
        self.seen.lock().unwrap().push(event.order_id);
        Ok(())
    }
}

fn shipped(seen: &Arc<Mutex<Vec<u64>>>, fail: bool) -> HandlerDescriptor {
    let seen = seen.clone();
    HandlerDescriptor::event_with::<Shipped, ShippedHandler, _>(move || {
        Ok(ShippedHandler {
            seen: seen.clone(),
            fail,
        })
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_fan_out_and_report_each_handler() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let processor = processor(
        HandlerCatalog::new()
            .register(shipped(&seen, false))
            .register(shipped(&seen, true))
            .register(shipped(&seen, false)),
    );
    let cancel = CancellationToken::new();

    let report = processor
        .publish(Shipped { order_id: 9 }, &cancel)
        .await
        .unwrap();
    assert_eq!(report.event_name, "orders.shipped");
    assert_eq!(report.handled(), 3);
    assert_eq!(report.failures().count(), 1);
    assert!(report.outcomes[1].result.is_err());
    assert_eq!(*seen.lock().unwrap(), vec![9, 9]);
}

#[tokio::test]
async fn events_without_handlers_are_a_no_op() {
    let processor = processor(HandlerCatalog::new());
    let cancel = CancellationToken::new();
    let report = processor
        .publish(Shipped { order_id: 1 }, &cancel)
        .await
        .unwrap();
    assert_eq!(report.handled(), 0);
    assert!(report.into_result().is_ok());
}

#[tokio::test]
async fn event_requests_cannot_be_processed_as_commands() {
    let processor = processor(HandlerCatalog::new());
    let cancel = CancellationToken::new();
    let request = HandlerRequest::event(processor.configuration().clone(), Shipped { order_id: 1 });
    assert!(matches!(
        processor.process_request(Arc::new(request), &cancel).await,
        Err(CourierError::InvalidArgument { name: "request", .. })
    ));
}
