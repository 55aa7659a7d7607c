//! Track stats for the whole breakscan run
//!

use std::collections::BTreeMap;
use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

pub const RUN_STATS_FILENAME: &str = "run.stats.json";

#[derive(Default, Deserialize, Serialize)]
pub struct PairPassStats {
    pub somatic_cluster_count: usize,
    pub germline_cluster_count: usize,
    pub normal_germline_cluster_count: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct ClipPassStatsReport {
    pub defined_breakpoint_count: usize,
    pub mate_resolved_count: usize,
    pub rescued_mate_count: usize,
    pub low_confidence_breakpoint_count: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct RunStats {
    pub sample_id: String,
    pub pair_stats: PairPassStats,
    pub clip_stats: ClipPassStatsReport,

    /// All merged records, including those filtered from the report
    pub record_count: usize,
    pub reported_record_count: usize,

    /// Reported record count per confidence tier
    pub confidence_counts: BTreeMap<String, usize>,
}

/// Write run_stats structure out in json format
pub fn write_run_stats(output_dir: &Utf8Path, run_stats: &RunStats) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{}'",
        filename
    );

    serde_json::to_writer_pretty(&f, &run_stats).unwrap();
}
