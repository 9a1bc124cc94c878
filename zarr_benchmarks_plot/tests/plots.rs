#![allow(missing_docs)]

use std::ffi::OsStr;
use std::path::Path;

use serde_json::Value;
use zarr_benchmarks::results::load_results;
use zarr_benchmarks_plot::plots::{PlotOptions, create_all_plots, example_results_dir, result_files};
use zarr_benchmarks_plot::plotting::PlotFormat;
use zarr_benchmarks_plot::table::{BenchmarkTable, Cell, Codec, Column, NO_COMPRESSOR_LEVEL};

fn example_options(plots_dir: &Path) -> PlotOptions {
    PlotOptions {
        example_results: true,
        plots_dir: plots_dir.to_path_buf(),
        ..PlotOptions::default()
    }
}

#[test]
fn example_results_are_results_documents() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let files = result_files(&example_options(dir.path()))?;
    assert_eq!(
        files.iter().map(|(package, _)| *package).collect::<Vec<_>>(),
        ["zarr_v2", "zarrs", "json_spec"]
    );
    for (_, path) in &files {
        let results = load_results(path)?;
        assert_eq!(results.machine_info.system, "Linux");
        assert!(!results.benchmarks.is_empty());
    }
    Ok(())
}

#[test]
fn example_table() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let files = result_files(&example_options(dir.path()))?;
    let table = BenchmarkTable::from_packages(&files)?;
    assert_eq!(
        table.unique(&Column::Package),
        [Cell::from("json_spec"), Cell::from("zarr_v2"), Cell::from("zarrs")]
    );
    assert_eq!(table.unique(&Column::Group), [Cell::from("read"), Cell::from("write")]);

    // every write row inherits the ratio of its read row
    for row in table.rows() {
        assert!(row.compression_ratio.is_some(), "{row:?}");
    }
    let none = table.filter(|row| row.codec == Codec::None);
    assert!(!none.is_empty());
    assert!(
        none.rows()
            .iter()
            .all(|row| row.compression_level() == Some(NO_COMPRESSOR_LEVEL))
    );
    assert!(
        table
            .unique(&Column::Compressor)
            .contains(&Cell::from("blosc-zstd"))
    );
    Ok(())
}

#[test]
fn create_example_plots() -> Result<(), Box<dyn std::error::Error>> {
    testing_logger::setup();
    let dir = tempfile::TempDir::new()?;
    let summary = create_all_plots(&example_options(dir.path()))?;
    assert!(!summary.saved.is_empty());
    for path in &summary.saved {
        assert!(path.exists(), "{}", path.display());
        assert_eq!(
            path.extension().and_then(|extension| extension.to_str()),
            Some(PlotFormat::Png.extension())
        );
    }
    for sub_dir in ["read", "write", "chunk_size", "shuffle"] {
        for zarr_spec in ["v2", "v3"] {
            assert!(dir.path().join(sub_dir).join(zarr_spec).is_dir(), "{sub_dir}/{zarr_spec}");
        }
    }
    // the zarr_v2 example results only hold zarr v2 arrays
    let in_spec_dir = |path: &Path, zarr_spec: &str| {
        path.parent().and_then(Path::file_name) == Some(OsStr::new(zarr_spec))
    };
    for path in &summary.saved {
        let file = path.file_name().and_then(|file| file.to_str()).unwrap_or_default();
        if file.starts_with("zarr_v2_") {
            assert!(in_spec_dir(path, "v2"), "{}", path.display());
        } else if file.starts_with("zarrs_") {
            assert!(in_spec_dir(path, "v3"), "{}", path.display());
        }
    }
    let saved = |name: &str| {
        summary.saved.iter().any(|path| {
            path.file_name()
                .and_then(|file| file.to_str())
                .is_some_and(|file| file.starts_with(name))
        })
    };
    assert!(saved("zarrs_chunk_size_all_subplots_"));
    assert!(saved("zarr_v2_chunk_size128_"));
    assert!(saved("all_packages_subplots_"));
    assert!(saved("compression_ratio_"));
    testing_logger::validate(|logs| {
        assert!(logs.iter().any(|log| log.body.starts_with("saved plot")));
    });
    Ok(())
}

/// Copy the example results to `results_dir`, adding a zarr v2 copy of every zarrs benchmark.
fn mixed_spec_results(results_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let machine = results_dir.join("Linux-x86_64");
    std::fs::create_dir_all(&machine)?;
    for entry in std::fs::read_dir(example_results_dir())? {
        let path = entry?.path();
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let mut results: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        if file_name == "0002_zarrs.json" {
            let benchmarks = results["benchmarks"].as_array_mut().ok_or("benchmarks")?;
            let v2: Vec<Value> = benchmarks
                .iter()
                .cloned()
                .map(|mut benchmark| {
                    benchmark["params"]["zarr_spec"] = Value::from(2);
                    benchmark
                })
                .collect();
            benchmarks.extend(v2);
        }
        std::fs::write(machine.join(file_name), serde_json::to_string_pretty(&results)?)?;
    }
    Ok(())
}

#[test]
fn plots_per_zarr_spec() -> Result<(), Box<dyn std::error::Error>> {
    let results = tempfile::TempDir::new()?;
    mixed_spec_results(results.path())?;
    let plots = tempfile::TempDir::new()?;
    let options = PlotOptions {
        results_dir: results.path().to_path_buf(),
        plots_dir: plots.path().to_path_buf(),
        format: PlotFormat::Svg,
        ..PlotOptions::default()
    };
    let files = result_files(&options)?;
    let table = BenchmarkTable::from_packages(&files)?;
    assert_eq!(
        table.filter_eq(&Column::Package, "zarrs").unique(&Column::ZarrSpec),
        [Cell::from(2_i64), Cell::from(3_i64)]
    );

    let summary = create_all_plots(&options)?;
    for zarr_spec in ["v2", "v3"] {
        let dir = plots.path().join("read").join(zarr_spec);
        let zarrs_plots = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("zarrs_chunk_size128_"))
            .count();
        assert!(zarrs_plots > 0, "{}", dir.display());
    }
    assert!(summary.saved.iter().all(|path| {
        path.extension() == Some(OsStr::new("svg"))
            && path
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|dir| dir == "v2" || dir == "v3")
    }));
    Ok(())
}
