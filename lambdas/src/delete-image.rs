use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::config::{get_s3_client, Config};
use shared::error::PipelineError;
use shared::http::{error_response, no_content, request_id, route_path};
use shared::pipeline::{delete_key, Pipeline};
use shared::storage::S3Store;
use tracing::Instrument;

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::logging::init();

    let cfg = Config::from_env()?;
    let store = S3Store::new(get_s3_client().await);

    run(service_fn(|req| delete_image(req, &store, &cfg))).await
}

pub async fn delete_image(
    req: Request,
    store: &S3Store,
    cfg: &Config,
) -> Result<Response<Body>, Error> {
    let span = shared::logging::request_span("delete-image", request_id(&req));

    async {
        match delete(&req, store, cfg).await {
            Ok(()) => no_content(),
            Err(err) => error_response(&err),
        }
    }
    .instrument(span)
    .await
}

async fn delete(req: &Request, store: &S3Store, cfg: &Config) -> Result<(), PipelineError> {
    let key = delete_key(route_path(req))?;
    let pipeline = Pipeline::new(store, cfg.constraint, &cfg.staging_dir);

    pipeline.delete(cfg.public_bucket()?, key).await
}
