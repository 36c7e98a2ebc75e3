use lambda_http::{http::StatusCode, run, service_fn, Body, Error, Request, RequestExt, Response};
use shared::config::{get_s3_client, Config};
use shared::error::PipelineError;
use shared::http::{error_response, json_response, request_id};
use shared::storage::S3Store;
use shared::upload::{issue_upload_url, UploadTicket};
use std::time::Duration;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::logging::init();

    let cfg = Config::from_env()?;
    let store = S3Store::new(get_s3_client().await);

    run(service_fn(|req| get_upload_url(req, &store, &cfg))).await
}

pub async fn get_upload_url(
    req: Request,
    store: &S3Store,
    cfg: &Config,
) -> Result<Response<Body>, Error> {
    let span = shared::logging::request_span("get-upload-url", request_id(&req));

    async {
        match issue(&req, store, cfg).await {
            Ok(ticket) => json_response(StatusCode::OK, &ticket),
            Err(err) => error_response(&err),
        }
    }
    .instrument(span)
    .await
}

async fn issue(req: &Request, store: &S3Store, cfg: &Config) -> Result<UploadTicket, PipelineError> {
    let params = req.query_string_parameters();
    let bucket = cfg.upload_bucket()?;

    issue_upload_url(
        store,
        bucket,
        params.first("directory").unwrap_or_default(),
        params.first("extension").unwrap_or_default(),
        Duration::from_secs(cfg.upload_ttl),
    )
    .await
}
