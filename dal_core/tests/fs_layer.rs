use std::io::Read as _;
use std::sync::Arc;

use dal_core::backend::Backend;
use dal_core::error::Error;
use dal_core::fs::FsBackend;
use dal_core::resolver::BackendResolver;
use dal_core::DataLayer;

fn fs_layer(root: &std::path::Path) -> DataLayer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();

    let fs = Arc::new(FsBackend::new(root.to_path_buf()));
    let mut resolver = BackendResolver::new(Arc::clone(&fs) as Arc<dyn Backend>);
    resolver.register("fs", fs);
    DataLayer::with_resolver(resolver).expect("layer should start")
}

#[test]
fn round_trip_through_real_files() {
    let dir = tempfile::tempdir().unwrap();
    let layer = fs_layer(dir.path());

    let mut writer = layer.open_writer("notes/today.txt").unwrap();
    writer.write(b"line one\n").unwrap();
    writer.write(b"line two\n").unwrap();
    writer.close().unwrap();

    let mut reader = layer.open_reader("fs://notes/today.txt").unwrap();
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert_eq!(out, "line one\nline two\n");
}

#[test]
fn file_appears_only_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let layer = fs_layer(dir.path());

    let mut writer = layer.open_writer("slow.bin").unwrap();
    writer.write(b"half").unwrap();
    assert!(
        !dir.path().join("slow.bin").exists(),
        "object must not be visible before finalize"
    );

    writer.close().unwrap();
    assert_eq!(std::fs::read(dir.path().join("slow.bin")).unwrap(), b"half");
}

#[test]
fn dropping_a_writer_finalizes_it() {
    let dir = tempfile::tempdir().unwrap();
    let layer = fs_layer(dir.path());

    {
        let mut writer = layer.open_writer("dropped.bin").unwrap();
        writer.write(b"still stored").unwrap();
    }
    assert_eq!(
        std::fs::read(dir.path().join("dropped.bin")).unwrap(),
        b"still stored"
    );
}

#[test]
fn escaping_paths_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let layer = fs_layer(dir.path());

    let err = layer.open_reader("../outside").expect_err("traversal");
    assert!(matches!(err, Error::InvalidPath(_)));

    let err = layer.open_writer("a/../../b").expect_err("traversal");
    assert!(matches!(err, Error::InvalidPath(_)));
}

#[test]
fn missing_file_maps_to_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let layer = fs_layer(dir.path());

    let err = layer.open_reader("no-such-file").expect_err("missing");
    assert!(matches!(err, Error::NotFound(_)));
}
