//! End-to-end pipeline tests against a temp-dir local backend.

use std::io::Cursor;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pixmill_core::config::{CompressionConfig, KindFolders};
use pixmill_core::traits::storage::StorageBackend;
use pixmill_entity::{FileKind, FileRecord, FileStatus};
use pixmill_storage::providers::local::LocalBackend;
use pixmill_worker::image::ImageProcessor;
use pixmill_worker::pipeline::Pipeline;

fn folders() -> KindFolders {
    KindFolders {
        attachment: "post_picture".into(),
        profile: "profile_picture".into(),
        thumbnail: "thumbnail".into(),
    }
}

fn compression_config(test_mode: bool) -> CompressionConfig {
    CompressionConfig {
        concurrent: true,
        test_mode,
        batch_size: 50,
        num_workers: 2,
        webp_quality: 75,
        max_width: 198,
        max_height: 198,
        max_retries: 3,
    }
}

fn task(id: i32, name: &str) -> FileRecord {
    FileRecord {
        id,
        created_at: 0,
        updated_at: 0,
        name: name.to_string(),
        kind: FileKind::Attachment,
        status: FileStatus::Processing,
        failed_attempts: 0,
        last_error: None,
        used_by_post_id: Some(1),
        used_by_user_id: None,
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn pipeline(backend: Arc<dyn StorageBackend>, test_mode: bool) -> Pipeline {
    let config = compression_config(test_mode);
    Pipeline::new(
        backend,
        Arc::new(ImageProcessor::new(&config)),
        folders(),
        config.io_workers(),
        config.cpu_workers(),
        config.test_mode,
    )
}

#[tokio::test]
async fn test_pipeline_compresses_batch_and_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    let source_dir = dir.path().join("post_picture");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::write(source_dir.join("big.png"), png_bytes(300, 200)).unwrap();
    std::fs::write(source_dir.join("corrupt.jpg"), b"not an image at all").unwrap();

    let backend: Arc<dyn StorageBackend> =
        Arc::new(LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap());

    let tasks = vec![task(1, "big.png"), task(2, "corrupt.jpg")];
    let mut results = pipeline(Arc::clone(&backend), false).run(tasks, CancellationToken::new());

    let mut outcomes = Vec::new();
    while let Some(outcome) = results.recv().await {
        outcomes.push(outcome);
    }
    assert_eq!(outcomes.len(), 2);

    let ok = outcomes.iter().find(|o| o.task.id == 1).unwrap();
    assert!(ok.result.is_ok());
    let failed = outcomes.iter().find(|o| o.task.id == 2).unwrap();
    assert!(failed.result.is_err());

    // Derivative written under the rewritten name, fits the bounds.
    let webp_path = source_dir.join("big.webp");
    let bytes = std::fs::read(&webp_path).unwrap();
    assert_eq!(&bytes[..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WEBP");
    let decoded = webp::Decoder::new(&bytes).decode().unwrap();
    assert!(decoded.width() <= 198);
    assert!(decoded.height() <= 198);

    // No derivative for the task that failed to decode.
    assert!(!source_dir.join("corrupt.webp").exists());
}

#[tokio::test]
async fn test_pipeline_test_mode_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source_dir = dir.path().join("post_picture");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::write(source_dir.join("photo.png"), png_bytes(64, 64)).unwrap();

    let backend: Arc<dyn StorageBackend> =
        Arc::new(LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap());

    let mut results =
        pipeline(backend, true).run(vec![task(1, "photo.png")], CancellationToken::new());

    let outcome = results.recv().await.unwrap();
    assert!(outcome.result.is_ok());
    assert!(results.recv().await.is_none());

    assert!(!source_dir.join("photo.webp").exists());
}

#[tokio::test]
async fn test_pipeline_cancelled_before_start_yields_no_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let source_dir = dir.path().join("post_picture");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::write(source_dir.join("photo.png"), png_bytes(32, 32)).unwrap();

    let backend: Arc<dyn StorageBackend> =
        Arc::new(LocalBackend::new(dir.path().to_str().unwrap()).await.unwrap());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut results = pipeline(backend, false).run(vec![task(1, "photo.png")], cancel);

    assert!(results.recv().await.is_none());
    assert!(!source_dir.join("photo.webp").exists());
}
