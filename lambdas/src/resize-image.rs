use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::config::{get_s3_client, Config};
use shared::error::PipelineError;
use shared::http::{error_response, redirect, request_id, route_path};
use shared::pipeline::{Pipeline, ServeRequest};
use shared::storage::S3Store;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::logging::init();

    let cfg = Config::from_env()?;
    let store = S3Store::new(get_s3_client().await);

    run(service_fn(|req| resize_image(req, &store, &cfg))).await
}

pub async fn resize_image(
    req: Request,
    store: &S3Store,
    cfg: &Config,
) -> Result<Response<Body>, Error> {
    let span = shared::logging::request_span("resize-image", request_id(&req));

    async {
        match serve(&req, store, cfg).await {
            Ok(location) => redirect(&location),
            Err(err) => error_response(&err),
        }
    }
    .instrument(span)
    .await
}

/// Stores the variant and returns its public url.
async fn serve(req: &Request, store: &S3Store, cfg: &Config) -> Result<String, PipelineError> {
    let serve_req = ServeRequest::from_path(route_path(req))?;
    let destination_bucket = cfg.destination_bucket()?;
    let pipeline = Pipeline::new(store, cfg.constraint, &cfg.staging_dir);

    let event = pipeline
        .serve(cfg.source_bucket()?, destination_bucket, &serve_req)
        .await?;

    Ok(cfg.public_url(destination_bucket, &event.destination.key))
}
