use lambda_http::{http::StatusCode, run, service_fn, Body, Error, Request, Response};
use shared::config::{get_s3_client, Config};
use shared::error::PipelineError;
use shared::http::{error_response, json_response, parse_json, request_id};
use shared::keys::CompletionEvent;
use shared::pipeline::{FinalizeRequest, Pipeline};
use shared::storage::S3Store;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::logging::init();

    let cfg = Config::from_env()?;
    let store = S3Store::new(get_s3_client().await);

    run(service_fn(|req| process_upload(req, &store, &cfg))).await
}

pub async fn process_upload(
    req: Request,
    store: &S3Store,
    cfg: &Config,
) -> Result<Response<Body>, Error> {
    let span = shared::logging::request_span("process-upload", request_id(&req));

    async {
        match finalize(&req, store, cfg).await {
            Ok(event) => json_response(StatusCode::CREATED, &event),
            Err(err) => error_response(&err),
        }
    }
    .instrument(span)
    .await
}

async fn finalize(
    req: &Request,
    store: &S3Store,
    cfg: &Config,
) -> Result<CompletionEvent, PipelineError> {
    let body: FinalizeRequest = parse_json(req.body())?;
    let pipeline = Pipeline::new(store, cfg.constraint, &cfg.staging_dir);

    pipeline
        .finalize(cfg.upload_bucket()?, cfg.public_bucket()?, &body)
        .await
}
