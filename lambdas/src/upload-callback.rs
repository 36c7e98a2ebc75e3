use aws_lambda_events::event::sqs::SqsEvent;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use shared::batch::{CallbackBatch, QueueItem};
use shared::config::Config;
use shared::notify::WebhookNotifier;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::logging::init();

    let cfg = Config::from_env()?;
    let notifier = WebhookNotifier::new(cfg.callback_auth.clone());

    run(service_fn(|event| upload_callback(event, &notifier, &cfg))).await
}

async fn upload_callback(
    event: LambdaEvent<SqsEvent>,
    notifier: &WebhookNotifier,
    cfg: &Config,
) -> Result<(), Error> {
    let span = shared::logging::request_span("upload-callback", &event.context.request_id);
    let items = event
        .payload
        .records
        .into_iter()
        .map(|msg| QueueItem {
            message_id: msg.message_id,
            body: msg.body,
        })
        .collect::<Vec<_>>();

    CallbackBatch {
        notifier,
        dry_run: cfg.is_test_environment(),
    }
    .run(&items)
    .instrument(span)
    .await;

    Ok(())
}
