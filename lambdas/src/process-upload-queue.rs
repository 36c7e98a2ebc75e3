use aws_lambda_events::event::sqs::SqsEvent;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use shared::batch::{FinalizeBatch, QueueItem};
use shared::config::{get_s3_client, get_sqs_client, Config};
use shared::notify::SqsNotifier;
use shared::pipeline::Pipeline;
use shared::storage::S3Store;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::logging::init();

    let cfg = Config::from_env()?;
    let store = S3Store::new(get_s3_client().await);
    let notifier = SqsNotifier::new(get_sqs_client().await);

    run(service_fn(|event| process_queue(event, &store, &notifier, &cfg))).await
}

/// Failed messages are logged and dropped, never returned for redelivery.
async fn process_queue(
    event: LambdaEvent<SqsEvent>,
    store: &S3Store,
    notifier: &SqsNotifier,
    cfg: &Config,
) -> Result<(), Error> {
    let span = shared::logging::request_span("process-upload-queue", &event.context.request_id);
    let items = event
        .payload
        .records
        .into_iter()
        .map(|msg| QueueItem {
            message_id: msg.message_id,
            body: msg.body,
        })
        .collect::<Vec<_>>();

    let batch = FinalizeBatch {
        pipeline: Pipeline::new(store, cfg.constraint, &cfg.staging_dir),
        notifier,
        upload_bucket: cfg.upload_bucket()?,
        public_bucket: cfg.public_bucket()?,
        callback_queue: cfg.callback_queue()?,
    };
    batch.run(&items).instrument(span).await;

    Ok(())
}
