#![allow(missing_docs)]

use std::path::Path;

use zarr_benchmarks::backend::{BackendKind, create_backend};
use zarr_benchmarks::config::{BenchmarkConfig, ConfigSelection, load_configs};
use zarr_benchmarks::image::{Image, ImageDataType};
use zarr_benchmarks::results::{
    BenchmarkGroup, BenchmarkRecord, BenchmarkResults, load_results, result_file_id, save_results,
};
use zarr_benchmarks::runner::{RunOptions, Runner};

fn configs_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/configs"))
}

#[test]
fn bundled_configs_parse() -> Result<(), Box<dyn std::error::Error>> {
    let dev = load_configs(configs_dir(), &ConfigSelection::Named("dev".to_string()))?;
    assert_eq!(dev.len(), 1);
    let all = load_configs(configs_dir(), &"all".parse()?)?;
    assert_eq!(all.len(), 3);
    for config in &all {
        assert!(config.values("chunk_size").is_some());
    }
    Ok(())
}

fn run_options(dir: &Path) -> RunOptions {
    RunOptions {
        rounds: 2,
        warmup_rounds: 1,
        store_path: dir.join("temp-benchmarks.zarr"),
    }
}

#[test]
fn runner_records_and_skips() -> Result<(), Box<dyn std::error::Error>> {
    testing_logger::setup();
    let dir = tempfile::TempDir::new()?;
    let configs = vec![BenchmarkConfig::from_json_str(
        r#"{
            "chunk_size": [8],
            "blosc_clevel": [1],
            "blosc_shuffle": ["shuffle"],
            "blosc_cname": ["lz4"],
            "gzip_level": [1],
            "no_compressor": false,
            "zarr_spec": [2, 3]
        }"#,
    )?];
    let image = Image::zeros(ImageDataType::UInt8, &[16, 16, 16]);
    let backend = create_backend(BackendKind::ZarrV2);
    let outcome = Runner::new(backend.as_ref(), &image, run_options(dir.path())).run(&configs)?;

    // blosc and gzip, write and read, zarr v2 only
    assert_eq!(outcome.records.len(), 4);
    // zarr v3 blosc and gzip, zstd not configured, no_compressor false
    assert_eq!(outcome.skipped, 4 + 2 + 4);
    testing_logger::validate(|logs| {
        assert!(
            logs.iter()
                .any(|log| log.body.contains("does not support zarr v3"))
        );
        assert!(
            logs.iter()
                .any(|log| log.body.contains("skipping test_write_zstd"))
        );
    });

    let write = &outcome.records[0];
    assert_eq!(write.name, "test_write_blosc[8-1-shuffle-lz4-2]");
    assert_eq!(write.group, BenchmarkGroup::Write);
    assert_eq!(write.stats.rounds, 2);
    assert_eq!(write.params["blosc_cname"], "lz4");
    assert!(write.extra_info.is_empty());

    let read = outcome
        .records
        .iter()
        .find(|record| record.group == BenchmarkGroup::Read)
        .expect("read record");
    let ratio = read.extra_info["compression_ratio"].as_f64().expect("ratio");
    assert!(ratio > 1.0);
    Ok(())
}

#[test]
fn runner_no_compressor() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let configs = vec![BenchmarkConfig::from_json_str(
        r#"{"chunk_size": [4, 8], "no_compressor": true}"#,
    )?];
    let image = Image::zeros(ImageDataType::Float32, &[8, 8]);
    let backend = create_backend(BackendKind::JsonSpec);
    let outcome = Runner::new(backend.as_ref(), &image, run_options(dir.path())).run(&configs)?;
    let names: Vec<&str> = outcome.records.iter().map(|record| record.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "test_write_no_compressor[4-True]",
            "test_write_no_compressor[8-True]",
            "test_read_no_compressor[4-True]",
            "test_read_no_compressor[8-True]",
        ]
    );
    Ok(())
}

fn record_names(records: &[BenchmarkRecord]) -> Vec<&str> {
    records.iter().map(|record| record.name.as_str()).collect()
}

#[test]
fn runner_all_configs() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let configs = load_configs(configs_dir(), &ConfigSelection::All)?;
    let image = Image::zeros(ImageDataType::UInt8, &[4, 4, 4]);
    let backend = create_backend(BackendKind::Zarrs);
    let options = RunOptions {
        rounds: 1,
        warmup_rounds: 0,
        store_path: dir.path().join("temp-benchmarks.zarr"),
    };
    let outcome = Runner::new(backend.as_ref(), &image, options).run(&configs)?;
    assert_eq!(outcome.skipped, 0);

    let names = record_names(&outcome.records);
    for function in [
        "test_write_blosc",
        "test_write_gzip",
        "test_write_zstd",
        "test_write_no_compressor",
        "test_read_blosc",
        "test_read_gzip",
        "test_read_zstd",
        "test_read_no_compressor",
    ] {
        assert!(
            names
                .iter()
                .any(|name| name.starts_with(&format!("{function}["))),
            "{function} has no records"
        );
    }
    assert!(names.contains(&"test_write_gzip[64-9]"));
    assert!(names.contains(&"test_write_zstd[128-19]"));
    // from chunk_size.json and shuffle.json
    assert!(names.contains(&"test_write_blosc[256-3-shuffle-zstd]"));
    assert!(names.contains(&"test_write_blosc[128-3-bitshuffle-zstd]"));
    Ok(())
}

#[test]
fn runner_configs_with_different_keys() -> Result<(), Box<dyn std::error::Error>> {
    testing_logger::setup();
    let dir = tempfile::TempDir::new()?;
    let configs = vec![
        BenchmarkConfig::from_json_str(
            r#"{"chunk_size": [4], "blosc_clevel": [1], "blosc_shuffle": ["noshuffle"], "blosc_cname": ["lz4"]}"#,
        )?,
        BenchmarkConfig::from_json_str(r#"{"chunk_size": [2, 4], "gzip_level": [1]}"#)?,
        BenchmarkConfig::from_json_str(r#"{"chunk_size": [4], "zstd_level": [1], "zarr_spec": [2]}"#)?,
    ];
    let image = Image::zeros(ImageDataType::UInt16, &[4, 4]);
    let backend = create_backend(BackendKind::Zarrs);
    let outcome = Runner::new(backend.as_ref(), &image, run_options(dir.path())).run(&configs)?;

    assert_eq!(
        record_names(&outcome.records),
        [
            "test_write_blosc[4-1-noshuffle-lz4]",
            "test_write_gzip[2-1]",
            "test_write_gzip[4-1]",
            "test_write_zstd[4-1-2]",
            "test_read_blosc[4-1-noshuffle-lz4]",
            "test_read_gzip[2-1]",
            "test_read_gzip[4-1]",
            "test_read_zstd[4-1-2]",
        ]
    );
    // no_compressor, write and read
    assert_eq!(outcome.skipped, 2);
    testing_logger::validate(|logs| {
        assert!(
            logs.iter()
                .any(|log| log.body.contains("skipping test_read_no_compressor"))
        );
    });
    let zstd = &outcome.records[3];
    assert_eq!(zstd.params["zarr_spec"], 2);
    assert!(outcome.records[1].params.get("zarr_spec").is_none());
    Ok(())
}

#[test]
fn results_file_ids_increment() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let results = BenchmarkResults::new(Vec::new());
    let first = save_results(dir.path(), "zarr_v2", &results)?;
    let second = save_results(dir.path(), "zarrs", &results)?;
    let id = |path: &Path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(result_file_id)
    };
    assert_eq!(id(&first), Some(1));
    assert_eq!(id(&second), Some(2));
    assert!(second.ends_with("0002_zarrs.json"));
    assert_eq!(
        second.parent().and_then(Path::file_name),
        Some(results.machine_info.results_dir_name().as_ref())
    );
    assert_eq!(load_results(&second)?, results);
    Ok(())
}
