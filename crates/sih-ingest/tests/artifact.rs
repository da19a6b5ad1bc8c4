//! Integration tests for artifact persistence and the scratch area.

use polars::prelude::{DataFrame, IntoColumn, NamedFrom, Series};
use sih_ingest::{ArtifactWriter, ScratchArea, read_parquet, replace_artifact, retire_artifact};

fn frame(values: &[i64]) -> DataFrame {
    DataFrame::new(vec![Series::new("N_AIH".into(), values).into_column()]).unwrap()
}

#[test]
fn test_replace_artifact_backs_up_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sih_aggregated.parquet");

    assert_eq!(replace_artifact(&mut frame(&[1]), &path, true).unwrap(), None);
    let backup = replace_artifact(&mut frame(&[1, 2]), &path, true)
        .unwrap()
        .expect("backup created");

    let name = backup.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("sih_aggregated.backup_"), "{name}");
    assert!(name.ends_with(".parquet"));
    assert_eq!(read_parquet(&backup).unwrap().height(), 1);
    assert_eq!(read_parquet(&path).unwrap().height(), 2);
}

#[test]
fn test_replace_artifact_without_backup_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.parquet");
    replace_artifact(&mut frame(&[1]), &path, false).unwrap();
    replace_artifact(&mut frame(&[1, 2, 3]), &path, false).unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    assert_eq!(read_parquet(&path).unwrap().height(), 3);
}

#[test]
fn test_scratch_area_is_removed_on_drop() {
    let parent = tempfile::tempdir().unwrap();
    let scratch_path;
    {
        let scratch = ScratchArea::new(Some(parent.path())).unwrap();
        scratch_path = scratch.path().to_path_buf();
        let written = scratch.write("chunk_00000", &mut frame(&[7])).unwrap();
        assert!(written.exists());
        let back = scratch.take(&written).unwrap();
        assert_eq!(back.height(), 1);
        assert!(!written.exists());
        scratch.write("chunk_00001", &mut frame(&[8])).unwrap();
    }
    assert!(!scratch_path.exists());
}

#[test]
fn test_artifact_writer_streams_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interim").join("sih_normalized.parquet");
    replace_artifact(&mut frame(&[99]), &path, false).unwrap();

    let mut writer = ArtifactWriter::new(&path, true);
    writer.write_batch(&frame(&[1, 2])).unwrap();
    writer.write_batch(&frame(&[3])).unwrap();
    assert_eq!(writer.rows(), 3);
    assert_eq!(read_parquet(&path).unwrap().height(), 1);

    let backup = writer.finish().unwrap().expect("backup created");
    assert_eq!(read_parquet(&backup).unwrap().height(), 1);
    let written = read_parquet(&path).unwrap();
    let keys: Vec<Option<i64>> = written.column("N_AIH").unwrap().i64().unwrap().into_iter().collect();
    assert_eq!(keys, vec![Some(1), Some(2), Some(3)]);
}

#[test]
fn test_artifact_writer_without_batches_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.parquet");
    assert!(ArtifactWriter::new(&path, false).finish().is_err());
    assert!(!path.exists());
}

#[test]
fn test_retire_artifact_removes_or_backs_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vdrl.parquet");

    assert_eq!(retire_artifact(&path, false).unwrap(), None);

    replace_artifact(&mut frame(&[1]), &path, false).unwrap();
    assert_eq!(retire_artifact(&path, false).unwrap(), None);
    assert!(!path.exists());

    replace_artifact(&mut frame(&[1]), &path, false).unwrap();
    let backup = retire_artifact(&path, true).unwrap().expect("backup created");
    assert!(!path.exists());
    assert_eq!(read_parquet(&backup).unwrap().height(), 1);
}
