use async_trait::async_trait;
use courier_core::filter::{Filter, LoggingFilter, ValidationFilter, Validator};
use courier_core::request::HandlerRequest;
use courier_core::retry::{BackoffRetryPolicy, RetryPolicy, RetrySettings};
use courier_core::services::ServiceMap;
use courier_core::{
    CommandHandler, CommandProcessor, CourierError, CourierResult, EventHandler, HandlerCatalog,
    HandlerContext, HandlerDescriptor, HandlerLifetime, ProcessorConfiguration,
};
use courier_macros::{command, event};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[command(output = i64)]
struct Deposit {
    amount: i64,
}

#[event(name = "account.deposited")]
struct Deposited {
    amount: i64,
}

/// 单例账户：前两次调用模拟存储抖动
#[derive(Default)]
struct Account {
    balance: AtomicI64,
    calls: AtomicUsize,
}

#[async_trait]
impl CommandHandler<Deposit> for Account {
    async fn handle(
        &self,
        cmd: &Deposit,
        _ctx: &HandlerContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<i64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < 2 {
            return Err(CourierError::Queue {
                reason: "storage temporarily unavailable".into(),
            });
        }
        Ok(self.balance.fetch_add(cmd.amount, Ordering::SeqCst) + cmd.amount)
    }
}

#[derive(Default)]
struct AuditTrail;

#[async_trait]
impl EventHandler<Deposited> for AuditTrail {
    async fn handle(
        &self,
        event: &Deposited,
        ctx: &HandlerContext,
        _cancel: &CancellationToken,
    ) -> CourierResult<()> {
        println!("audit: request {} deposited {}", ctx.request().id(), event.amount);
        Ok(())
    }
}

struct PositiveAmount;

impl Validator for PositiveAmount {
    fn validate(&self, request: &HandlerRequest) -> bool {
        request
            .message_as::<Deposit>()
            .is_none_or(|deposit| deposit.amount > 0)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let retry = BackoffRetryPolicy::new(RetrySettings {
        initial_delay_ms: 20,
        ..RetrySettings::default()
    })?;

    let catalog = HandlerCatalog::new()
        .register(
            HandlerDescriptor::command::<Deposit, Account>()
                .with_lifetime(HandlerLifetime::Singleton)
                .with_filter(ValidationFilter),
        )
        .register(HandlerDescriptor::event::<Deposited, AuditTrail>());

    let config = ProcessorConfiguration::builder()
        .handlers(catalog)
        .filters(vec![Arc::new(LoggingFilter) as Arc<dyn Filter<HandlerContext>>])
        .services(
            ServiceMap::new()
                .with::<dyn Validator>(Arc::new(PositiveAmount))
                .with::<dyn RetryPolicy>(Arc::new(retry)),
        )
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();

    let balance = processor.send(Deposit { amount: 50 }, &cancel).await?;
    println!("balance after retries: {balance}");

    let balance = processor.send(Deposit { amount: 25 }, &cancel).await?;
    println!("balance: {balance}");

    match processor.process(Deposit { amount: -5 }, &cancel).await? {
        response if response.is_failed() => println!("rejected: {response:?}"),
        response => println!("unexpected: {response:?}"),
    }

    let report = processor.publish(Deposited { amount: 75 }, &cancel).await?;
    println!("{} handled by {} handler(s)", report.event_name, report.handled());
    report.into_result()?;

    Ok(())
}
