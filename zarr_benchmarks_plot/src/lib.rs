//! Tables and comparison plots of [`zarr_benchmarks`] results.
//!
//! - [`table`]: flatten results documents into a [`BenchmarkTable`](table::BenchmarkTable) with one
//!   row per benchmark and derived compressor, compression level and compression ratio columns.
//! - [`plotting`]: scatter, error-bar and bar plots of a table, saved as PNG or SVG.
//! - [`plots`]: the plot suites of a benchmark run.
//!
//! ## Example
//! ```no_run
//! # use zarr_benchmarks_plot::plots::{PlotOptions, create_all_plots};
//! let options = PlotOptions {
//!     example_results: true,
//!     ..PlotOptions::default()
//! };
//! let summary = create_all_plots(&options)?;
//! println!("saved {} plots", summary.saved.len());
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

pub mod plots;
pub mod plotting;
pub mod table;
