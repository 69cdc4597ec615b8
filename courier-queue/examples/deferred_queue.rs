use async_trait::async_trait;
use courier_core::services::ServiceMap;
use courier_core::{
    CommandHandler, CommandProcessor, CommandSender, CourierResult, HandlerCatalog,
    HandlerContext, HandlerDescriptor, HandlerResponse, ProcessorConfiguration, QueuePolicy,
};
use courier_macros::command;
use courier_queue::{BrokerConfig, CommandBroker, InMemoryCommandQueue, ResponseSink};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[command(name = "mail.send")]
struct SendMail {
    to: String,
}

#[derive(Default)]
struct Mailer;

#[async_trait]
impl CommandHandler<SendMail> for Mailer {
    async fn handle(
        &self,
        cmd: &SendMail,
        _ctx: &HandlerContext,
        cancel: &CancellationToken,
    ) -> CourierResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(20)) => println!("mail sent to {}", cmd.to),
        }
        Ok(())
    }
}

struct PrintSink;

#[async_trait]
impl ResponseSink for PrintSink {
    async fn record(
        &self,
        envelope_id: Uuid,
        message_name: &'static str,
        response: &HandlerResponse,
    ) {
        println!("{message_name} [{envelope_id}] -> failed = {}", response.is_failed());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let queue = Arc::new(InMemoryCommandQueue::bounded(16)?);
    let config = ProcessorConfiguration::builder()
        .handlers(HandlerCatalog::new().register(
            HandlerDescriptor::command::<SendMail, Mailer>().with_queue_policy(QueuePolicy::Queue),
        ))
        .services(ServiceMap::new().with::<dyn CommandSender>(queue.clone()))
        .build();
    let processor = CommandProcessor::new(config);
    let cancel = CancellationToken::new();

    for to in ["ada@example.com", "grace@example.com", "linus@example.com"] {
        let response = processor
            .process(SendMail { to: to.into() }, &cancel)
            .await?;
        println!("submitted: accepted = {}", response.is_accepted());
    }

    let broker = CommandBroker::builder()
        .receiver(queue)
        .processor(processor)
        .config(BrokerConfig {
            parallelism: 2,
            ..BrokerConfig::default()
        })
        .sink(Arc::new(PrintSink))
        .build()?;

    let handle = broker.start()?;
    broker.complete();
    for report in handle.join().await {
        println!("{report:?}");
    }

    Ok(())
}
