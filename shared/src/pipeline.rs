//! Download, validate, resize, and upload one image.
//!
//! Every run moves forward through [`Stage`] and stops at the first error.
//! Nothing is retried here; redelivery belongs to whatever triggered the run.

use crate::error::{ErrorClass, PipelineError};
use crate::geometry::{Constraint, ResizeMode, TargetGeometry};
use crate::image::{self as codec, ImageAsset, Transformed};
use crate::keys::{self, CompletionEvent, DestinationRef, SourceRef, VariantEvent};
use crate::staging::StagingBuffer;
use crate::storage::BlobStore;
use crate::validate::{self, ImageKind, SNIFF_LEN};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Validating,
    Downloading,
    Transforming,
    Uploading,
    Done,
}

/// Body of a finalize request, direct or queued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub file_extension: String,
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub width: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeRequest {
    pub mode: ResizeMode,
    pub size: String,
    pub key: String,
}

impl ServeRequest {
    /// Splits `/<crop|ratio>/<size>/<key...>`; the key keeps its slashes.
    pub fn from_path(path: &str) -> Result<Self, PipelineError> {
        let mut parts = path.trim_start_matches('/').splitn(3, '/');
        let tag = parts.next().unwrap_or_default();
        let mode = ResizeMode::from_tag(tag)
            .ok_or_else(|| PipelineError::InvalidInput(format!("Unknown transform: {}", tag)))?;

        Ok(ServeRequest {
            mode,
            size: parts.next().unwrap_or_default().to_string(),
            key: parts.next().unwrap_or_default().to_string(),
        })
    }
}

/// Object key addressed by `/image/delete/<key...>`.
pub fn delete_key(path: &str) -> Result<&str, PipelineError> {
    let route = path.trim_start_matches('/');

    if route == "image/delete" {
        return Ok("");
    }

    route
        .strip_prefix("image/delete/")
        .ok_or_else(|| PipelineError::InvalidInput(format!("Unknown route: {}", path)))
}

struct Relocated {
    width: u32,
    height: u32,
    size_bytes: u64,
}

pub struct Pipeline<'a> {
    store: &'a dyn BlobStore,
    constraint: Constraint,
    staging_dir: &'a Path,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn BlobStore, constraint: Constraint, staging_dir: &'a Path) -> Self {
        Pipeline {
            store,
            constraint,
            staging_dir,
        }
    }

    /// Moves `<directory>/<file_id>.<ext>` from `upload_bucket` to `public_bucket`,
    /// shrinking it to fit the requested (and configured) bounds.
    pub async fn finalize(
        &self,
        upload_bucket: &str,
        public_bucket: &str,
        req: &FinalizeRequest,
    ) -> Result<CompletionEvent, PipelineError> {
        let mut stage = Stage::Start;
        let result = self
            .finalize_steps(&mut stage, upload_bucket, public_bucket, req)
            .await;

        report(stage, &result);
        result
    }

    async fn finalize_steps(
        &self,
        stage: &mut Stage,
        upload_bucket: &str,
        public_bucket: &str,
        req: &FinalizeRequest,
    ) -> Result<CompletionEvent, PipelineError> {
        *stage = Stage::Validating;
        validate::require_present(&[
            ("file_id", req.file_id.as_str()),
            ("file_extension", req.file_extension.as_str()),
        ])?;
        let width = validate::requested_side("width", req.width)?;
        let height = validate::requested_side("height", req.height)?;

        let key = keys::upload_key(&req.directory, &req.file_id, &req.file_extension);
        let target = TargetGeometry::resolve(width, height, ResizeMode::FitWithin, &self.constraint);

        tracing::info!(
            directory = %req.directory,
            file_id = %req.file_id,
            file_extension = %req.file_extension,
            width = target.width,
            height = target.height,
            "finalizing upload"
        );

        let source = SourceRef {
            bucket: upload_bucket.to_string(),
            key: key.clone(),
        };
        let dest = DestinationRef {
            bucket: public_bucket.to_string(),
            key,
        };
        let out = self.relocate(stage, &source, &dest, target).await?;

        tracing::info!(bucket = %dest.bucket, file_key = %dest.key, "image upload complete");

        Ok(CompletionEvent {
            bucket: dest.bucket,
            directory: req.directory.clone(),
            file_extension: req.file_extension.clone(),
            file_id: req.file_id.clone(),
            height: out.height,
            size_bytes: out.size_bytes,
            width: out.width,
        })
    }

    /// Stores a crop or ratio variant of `req.key` under `<tag>/<size>/<key>`.
    pub async fn serve(
        &self,
        source_bucket: &str,
        destination_bucket: &str,
        req: &ServeRequest,
    ) -> Result<VariantEvent, PipelineError> {
        let mut stage = Stage::Start;
        let result = self
            .serve_steps(&mut stage, source_bucket, destination_bucket, req)
            .await;

        report(stage, &result);
        result
    }

    async fn serve_steps(
        &self,
        stage: &mut Stage,
        source_bucket: &str,
        destination_bucket: &str,
        req: &ServeRequest,
    ) -> Result<VariantEvent, PipelineError> {
        *stage = Stage::Validating;
        validate::require_present(&[
            ("size", req.size.as_str()),
            ("image_key", req.key.as_str()),
        ])?;
        let size = validate::parse_size_token(&req.size)?;
        let target = TargetGeometry::resolve(
            Some(size.width),
            Some(size.height),
            req.mode,
            &self.constraint,
        );

        tracing::info!(size = %req.size, image_key = %req.key, mode = req.mode.tag(), "serving variant");

        let source = SourceRef {
            bucket: source_bucket.to_string(),
            key: req.key.clone(),
        };
        let dest = DestinationRef {
            bucket: destination_bucket.to_string(),
            key: keys::variant_key(req.mode, &req.size, &req.key),
        };
        let out = self.relocate(stage, &source, &dest, target).await?;

        tracing::info!(
            bucket = %dest.bucket,
            file_key = %dest.key,
            width = out.width,
            height = out.height,
            "image resize complete"
        );

        Ok(VariantEvent {
            destination: dest,
            width: out.width,
            height: out.height,
            size_bytes: out.size_bytes,
        })
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), PipelineError> {
        validate::require_present(&[("image_key", key)])?;

        self.store.delete(bucket, key).await?;
        tracing::info!(bucket = %bucket, image_key = %key, "object deleted");

        Ok(())
    }

    async fn relocate(
        &self,
        stage: &mut Stage,
        source: &SourceRef,
        dest: &DestinationRef,
        target: TargetGeometry,
    ) -> Result<Relocated, PipelineError> {
        *stage = Stage::Downloading;
        let mut staging = StagingBuffer::create(self.staging_dir)?;
        self.download(source, &mut staging).await?;
        let kind: ImageKind = validate::check_type(&staging.head(SNIFF_LEN).await?, &source.key)?;

        *stage = Stage::Transforming;
        let original = staging.read_all().await?;
        let asset = ImageAsset::decode(&original, kind)?;
        let (width, height, out) = match codec::transform(asset, target)? {
            Transformed::PassThrough { width, height } => (width, height, original),
            Transformed::Encoded {
                width,
                height,
                bytes,
            } => (width, height, bytes),
        };

        *stage = Stage::Uploading;
        let size_bytes = out.len() as u64;
        self.store
            .put(&dest.bucket, &dest.key, out, kind.mime())
            .await?;

        *stage = Stage::Done;
        Ok(Relocated {
            width,
            height,
            size_bytes,
        })
    }

    /// Streams the source into `staging`. An oversized object is refused on its
    /// announced length, or else on the first chunk that crosses the limit.
    async fn download(
        &self,
        source: &SourceRef,
        staging: &mut StagingBuffer,
    ) -> Result<u64, PipelineError> {
        let max_bytes = self.constraint.max_bytes;
        let mut download = self.store.get(&source.bucket, &source.key).await?;

        if let Some(announced) = download.content_length {
            validate::check_size(announced, max_bytes, &source.key)?;
        }

        let mut writer = staging.writer().await?;
        while let Some(chunk) = download.next_chunk().await? {
            writer.write(&chunk).await?;
            validate::check_size(writer.written(), max_bytes, &source.key)?;
        }

        Ok(writer.finish().await?)
    }
}

fn report<T>(stage: Stage, result: &Result<T, PipelineError>) {
    let Err(err) = result else {
        return;
    };

    match err.class() {
        ErrorClass::User | ErrorClass::NotFound => {
            tracing::warn!(stage = ?stage, error = %err, "pipeline rejected request")
        }
        ErrorClass::Server => tracing::error!(stage = ?stage, error = ?err, "pipeline failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::tests::{jpeg_bytes, png_bytes};
    use crate::storage::memory::MemoryStore;

    const LIMITS: Constraint = Constraint {
        max_width: 100,
        max_height: 100,
        max_bytes: 1024 * 1024,
    };

    fn request(directory: &str, file_id: &str) -> FinalizeRequest {
        FinalizeRequest {
            directory: directory.to_string(),
            file_extension: "png".to_string(),
            file_id: file_id.to_string(),
            ..FinalizeRequest::default()
        }
    }

    fn staging_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn finalize_shrinks_and_publishes() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("uploads", "test/abc.png", png_bytes(400, 200))]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        let event = pipeline
            .finalize("uploads", "public", &request("test", "abc"))
            .await
            .unwrap();

        // width stays width: a wide source remains wide
        assert_eq!((event.width, event.height), (100, 50));
        assert_eq!(event.bucket, "public");
        assert_eq!(event.directory, "test");

        let stored = store.object("public", "test/abc.png").unwrap();
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(event.size_bytes, stored.bytes.len() as u64);
        assert_eq!(
            ImageAsset::decode(&stored.bytes, ImageKind::Png).unwrap().dimensions(),
            (100, 50)
        );
        assert!(staging_is_empty(staging.path()));
    }

    #[tokio::test]
    async fn finalize_honours_smaller_requested_bounds() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("uploads", "abc.png", png_bytes(90, 60))]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());
        let req = FinalizeRequest {
            width: Some(30),
            height: Some(0),
            ..request("", "abc")
        };

        let event = pipeline.finalize("uploads", "public", &req).await.unwrap();

        assert_eq!((event.width, event.height), (30, 20));
        assert!(store.object("public", "abc.png").is_some());
    }

    #[tokio::test]
    async fn small_upload_passes_through_untouched() {
        let staging = tempfile::tempdir().unwrap();
        let original = png_bytes(40, 20);
        let store = MemoryStore::with(&[("uploads", "abc.png", original.clone())]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        let event = pipeline
            .finalize("uploads", "public", &request("", "abc"))
            .await
            .unwrap();

        assert_eq!((event.width, event.height), (40, 20));
        assert_eq!(store.object("public", "abc.png").unwrap().bytes, original);
        assert_eq!(event.size_bytes, original.len() as u64);
    }

    #[tokio::test]
    async fn sniffed_type_wins_over_extension() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("uploads", "abc.png", jpeg_bytes(300, 300))]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        pipeline
            .finalize("uploads", "public", &request("", "abc"))
            .await
            .unwrap();

        assert_eq!(store.object("public", "abc.png").unwrap().content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn missing_fields_fail_before_download() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());
        let req = FinalizeRequest::default();

        let err = pipeline.finalize("uploads", "public", &req).await.unwrap_err();

        assert!(matches!(err, PipelineError::MissingFields(ref f) if f == &["file_id", "file_extension"]));
    }

    #[tokio::test]
    async fn negative_width_is_a_user_error() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());
        let req = FinalizeRequest {
            width: Some(-10),
            ..request("", "abc")
        };

        let err = pipeline.finalize("uploads", "public", &req).await.unwrap_err();

        // not NotFound: the object is never looked up
        assert_eq!(err.class(), ErrorClass::User);
    }

    #[tokio::test]
    async fn absent_source_is_not_found() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        let err = pipeline
            .finalize("uploads", "public", &request("", "ghost"))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::NotFound);
        assert!(staging_is_empty(staging.path()));
    }

    #[tokio::test]
    async fn oversized_is_reported_before_type() {
        let staging = tempfile::tempdir().unwrap();
        let gif = b"GIF89a".iter().copied().cycle().take(4096).collect::<Vec<_>>();
        let store = MemoryStore::with(&[("uploads", "abc.png", gif)]);
        let limits = Constraint {
            max_bytes: 1000,
            ..LIMITS
        };
        let pipeline = Pipeline::new(&store, limits, staging.path());

        let err = pipeline
            .finalize("uploads", "public", &request("", "abc"))
            .await
            .unwrap_err();

        assert_eq!(err.public_message(), "File is too large: 4096, abc.png");
        assert!(staging_is_empty(staging.path()));
    }

    #[tokio::test]
    async fn gif_is_rejected_even_when_small() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("uploads", "abc.png", b"GIF89a\x01\x00\x01\x00".to_vec())]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        let err = pipeline
            .finalize("uploads", "public", &request("", "abc"))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::User);
        assert!(err.public_message().contains("image/gif"));
        assert!(store.object("public", "abc.png").is_none());
    }

    #[tokio::test]
    async fn upload_failure_is_a_server_error() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("uploads", "abc.png", png_bytes(10, 10))]).failing_puts();
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        let err = pipeline
            .finalize("uploads", "public", &request("", "abc"))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Server);
        assert_eq!(err.public_message(), "Server error");
        assert!(staging_is_empty(staging.path()));
    }

    #[tokio::test]
    async fn corrupt_image_is_a_server_error() {
        let staging = tempfile::tempdir().unwrap();
        let mut truncated = png_bytes(50, 50);
        truncated.truncate(40);
        let store = MemoryStore::with(&[("uploads", "abc.png", truncated)]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        let err = pipeline
            .finalize("uploads", "public", &request("", "abc"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Codec(_)));
        assert_eq!(err.class(), ErrorClass::Server);
    }

    #[tokio::test]
    async fn serve_crop_writes_exact_variant() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("originals", "users/1/avatar.png", png_bytes(300, 120))]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());
        let req = ServeRequest::from_path("/crop/40x60/users/1/avatar.png").unwrap();

        let event = pipeline.serve("originals", "variants", &req).await.unwrap();

        assert_eq!(event.destination.key, "crop/40x60/users/1/avatar.png");
        assert_eq!((event.width, event.height), (40, 60));
        let stored = store.object("variants", "crop/40x60/users/1/avatar.png").unwrap();
        assert_eq!(
            ImageAsset::decode(&stored.bytes, ImageKind::Png).unwrap().dimensions(),
            (40, 60)
        );
    }

    #[tokio::test]
    async fn serve_crop_clamps_to_configured_max() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("originals", "a.png", png_bytes(50, 50))]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());
        let req = ServeRequest::from_path("/crop/400x30/a.png").unwrap();

        let event = pipeline.serve("originals", "variants", &req).await.unwrap();

        assert_eq!((event.width, event.height), (100, 30));
        // the key keeps the requested token
        assert_eq!(event.destination.key, "crop/400x30/a.png");
    }

    #[tokio::test]
    async fn serve_ratio_fits_within() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("originals", "a.jpg", jpeg_bytes(200, 100))]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());
        let req = ServeRequest::from_path("/ratio/50x50/a.jpg").unwrap();

        let event = pipeline.serve("originals", "variants", &req).await.unwrap();

        assert_eq!((event.width, event.height), (50, 25));
        assert_eq!(
            store.object("variants", "ratio/50x50/a.jpg").unwrap().content_type,
            "image/jpeg"
        );
    }

    #[tokio::test]
    async fn bad_size_token_fails_before_download() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        for path in ["/crop/abcx300/a.png", "/crop/400/a.png", "/ratio/400x/a.png"] {
            let req = ServeRequest::from_path(path).unwrap();
            let err = pipeline.serve("originals", "variants", &req).await.unwrap_err();

            // a download attempt would have produced NotFound
            assert_eq!(err.class(), ErrorClass::User, "{path}");
        }
    }

    #[tokio::test]
    async fn serve_missing_source_is_not_found() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::default();
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());
        let req = ServeRequest::from_path("/crop/10x10/nope.png").unwrap();

        let err = pipeline.serve("originals", "variants", &req).await.unwrap_err();

        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn serve_path_parsing() {
        let req = ServeRequest::from_path("/ratio/64x64/a/b/c.png").unwrap();
        assert_eq!(req.mode, ResizeMode::FitWithin);
        assert_eq!(req.size, "64x64");
        assert_eq!(req.key, "a/b/c.png");

        let req = ServeRequest::from_path("/crop/64x64").unwrap();
        assert_eq!(req.key, "");

        assert!(ServeRequest::from_path("/blur/1x1/a.png").is_err());
    }

    #[test]
    fn delete_key_keeps_nested_paths() {
        assert_eq!(delete_key("/image/delete/avatars/abc.png").unwrap(), "avatars/abc.png");
        assert_eq!(delete_key("/image/delete/").unwrap(), "");
        assert_eq!(delete_key("/image/delete").unwrap(), "");
    }

    #[test]
    fn delete_key_rejects_other_routes() {
        for path in ["/prod/image/delete/a.png", "/a.png", "/image/deleted/a.png"] {
            let err = delete_key(path).unwrap_err();
            assert_eq!(err.class(), ErrorClass::User, "{path}");
        }
    }

    #[tokio::test]
    async fn announced_oversize_is_refused_unread() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("uploads", "abc.png", png_bytes(10, 10))])
            .announcing_length(Some(10 * 1024 * 1024 * 1024));
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        let mut stage = Stage::Start;
        let err = pipeline
            .finalize_steps(&mut stage, "uploads", "public", &request("", "abc"))
            .await
            .unwrap_err();

        // the size comes from the announcement, the small body is never consumed
        assert_eq!(err.public_message(), "File is too large: 10737418240, abc.png");
        assert_eq!(stage, Stage::Downloading);
        assert!(staging_is_empty(staging.path()));
    }

    #[tokio::test]
    async fn unannounced_oversize_is_caught_while_streaming() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("uploads", "abc.png", vec![0; 4096])])
            .announcing_length(None);
        let limits = Constraint {
            max_bytes: 1000,
            ..LIMITS
        };
        let pipeline = Pipeline::new(&store, limits, staging.path());

        let err = pipeline
            .finalize("uploads", "public", &request("", "abc"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::TooLarge { .. }));
        assert!(staging_is_empty(staging.path()));
    }

    async fn failing_stage(store: &MemoryStore, req: &FinalizeRequest) -> Stage {
        let staging = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(store, LIMITS, staging.path());
        let mut stage = Stage::Start;

        let result = pipeline
            .finalize_steps(&mut stage, "uploads", "public", req)
            .await;

        assert!(result.is_err());
        stage
    }

    #[tokio::test]
    async fn failure_stage_follows_the_run() {
        let mut truncated = png_bytes(50, 50);
        truncated.truncate(40);

        let empty = MemoryStore::default();
        assert_eq!(failing_stage(&empty, &FinalizeRequest::default()).await, Stage::Validating);
        assert_eq!(failing_stage(&empty, &request("", "abc")).await, Stage::Downloading);

        let gif = MemoryStore::with(&[("uploads", "abc.png", b"GIF89a\x01\x00\x01\x00".to_vec())]);
        assert_eq!(failing_stage(&gif, &request("", "abc")).await, Stage::Downloading);

        let corrupt = MemoryStore::with(&[("uploads", "abc.png", truncated)]);
        assert_eq!(failing_stage(&corrupt, &request("", "abc")).await, Stage::Transforming);

        let readonly = MemoryStore::with(&[("uploads", "abc.png", png_bytes(10, 10))]).failing_puts();
        assert_eq!(failing_stage(&readonly, &request("", "abc")).await, Stage::Uploading);
    }

    #[tokio::test]
    async fn successful_run_ends_done() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("uploads", "abc.png", png_bytes(10, 10))]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());
        let mut stage = Stage::Start;

        pipeline
            .finalize_steps(&mut stage, "uploads", "public", &request("", "abc"))
            .await
            .unwrap();

        assert_eq!(stage, Stage::Done);
    }

    #[tokio::test]
    async fn delete_requires_a_key() {
        let staging = tempfile::tempdir().unwrap();
        let store = MemoryStore::with(&[("public", "a.png", vec![1])]);
        let pipeline = Pipeline::new(&store, LIMITS, staging.path());

        assert_eq!(
            pipeline.delete("public", "").await.unwrap_err().class(),
            ErrorClass::User
        );

        pipeline.delete("public", "a.png").await.unwrap();
        assert!(store.object("public", "a.png").is_none());
    }
}
