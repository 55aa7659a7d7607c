//! Tab-delimited result writers
//!
//! These sit in the external report-writer role: they read finalized
//! `QsvCluster`s and render them, without feeding anything back into the
//! clustering core.
//!

use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use log::info;
use unwrap::unwrap;

use crate::discordant_pair::mate::OrientationCategory;
use crate::sv_cluster::QsvCluster;

pub const SV_RECORDS_FILENAME: &str = "sv.records.txt";
pub const PRIMER_SITES_FILENAME: &str = "sv.primers.txt";
pub const LOW_CONFIDENCE_FILENAME: &str = "no_alignment.txt";

const SV_RECORDS_HEADER: &str = "sv_id\tsample_id\tmutation_type\tchr_from\tpos_from\tstrand_from\tchr_to\tpos_to\tstrand_to\tpair_count\tnormal_pair_count\tlow_conf_normal_pairs\ttumor_clips_pos1\ttumor_clips_pos2\tnormal_clips_pos1\tnormal_clips_pos2\tconfidence\tcategory\tconsensus\tflank_from\tflank_to";

const LOW_CONFIDENCE_HEADER: &str =
    "reference\tposition\tmutation_type\tclip_side\tstrand\tpos_clips\tneg_clips\tconsensus";

/// Strand label of the first reported breakpoint; category 4 events read the
/// left side on the reverse strand
fn strand_from(category: Option<OrientationCategory>) -> &'static str {
    if category == Some(OrientationCategory::Cat4) {
        "-"
    } else {
        "+"
    }
}

fn strand_to(category: Option<OrientationCategory>) -> &'static str {
    if category == Some(OrientationCategory::Cat3) {
        "-"
    } else {
        "+"
    }
}

fn record_line(record: &QsvCluster) -> String {
    let category = record.orientation_category();
    let category_swapped = category == Some(OrientationCategory::Cat2);
    let (chr_from, chr_to) = if category_swapped {
        (record.right_reference(), record.left_reference())
    } else {
        (record.left_reference(), record.right_reference())
    };

    let (pair_count, normal_pair_count, low_confidence) = match record.pair_record() {
        Some(pair) => (
            pair.pairs().len(),
            pair.matched_normal_pairs().len(),
            pair.low_confidence_normal_mate_pairs,
        ),
        None => (0, 0, 0),
    };

    let clip = record.primary_soft_clip_cluster();
    let clip_count = |is_tumour, left_pos| {
        clip.map(|c| c.clip_count(is_tumour, left_pos)).unwrap_or(0)
    };

    let (flank_from, flank_to) = {
        let (left_flank, right_flank) = record.reference_flanks();
        if category_swapped {
            (right_flank, left_flank)
        } else {
            (left_flank, right_flank)
        }
    };

    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        record.sv_id.as_deref().unwrap_or(""),
        record.sample_id,
        record.mutation_type(),
        chr_from,
        record.final_left_breakpoint(),
        strand_from(category),
        chr_to,
        record.final_right_breakpoint(),
        strand_to(category),
        pair_count,
        normal_pair_count,
        low_confidence,
        clip_count(true, true),
        clip_count(true, false),
        clip_count(false, true),
        clip_count(false, false),
        record.get_confidence_level(),
        category.map(|c| c.to_string()).unwrap_or_default(),
        clip.and_then(|c| c.contig_sequence()).unwrap_or_default(),
        flank_from,
        flank_to,
    )
}

/// Write the main SV record table; returns the number of reported records
///
pub fn write_sv_records(
    output_dir: &Utf8Path,
    records: &[QsvCluster],
    single_sided: bool,
    min_insert_size: i64,
) -> usize {
    let filename = output_dir.join(SV_RECORDS_FILENAME);
    info!("Writing SV records to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create SV record file: '{}'",
        filename
    );
    let mut f = BufWriter::new(f);
    writeln!(f, "{SV_RECORDS_HEADER}").unwrap();

    let mut reported = 0;
    for record in records {
        if !record.passes_min_insert_size(min_insert_size) || !record.print_record(single_sided) {
            continue;
        }
        writeln!(f, "{}", record_line(record)).unwrap();
        reported += 1;
    }
    reported
}

/// Write the primer/probe site table for records with pair evidence
///
pub fn write_primer_sites(output_dir: &Utf8Path, records: &[QsvCluster]) {
    let filename = output_dir.join(PRIMER_SITES_FILENAME);
    info!("Writing primer sites to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create primer site file: '{}'",
        filename
    );
    let mut f = BufWriter::new(f);
    for record in records {
        if let (Some(pair), Some(sv_id)) = (record.pair_record(), record.sv_id.as_deref()) {
            writeln!(f, "{}", pair.qprimer().to_report_string(sv_id)).unwrap();
        }
    }
}

/// Write breakpoints that could not be aligned to a mate location but carry
/// enough clip support to be worth recording
///
pub fn write_low_confidence_breakpoints(output_dir: &Utf8Path, lines: &[String]) {
    let filename = output_dir.join(LOW_CONFIDENCE_FILENAME);
    info!(
        "Writing {} low-confidence breakpoints to file: '{filename}'",
        lines.len()
    );

    let f = unwrap!(
        File::create(&filename),
        "Unable to create low-confidence breakpoint file: '{}'",
        filename
    );
    let mut f = BufWriter::new(f);
    writeln!(f, "{LOW_CONFIDENCE_HEADER}").unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discordant_pair::cluster::{DiscordantPairClusterBuilder, SvType};
    use crate::discordant_pair::mate::{MatePair, PairGroup, Platform};

    fn test_record() -> QsvCluster {
        let mut builder = DiscordantPairClusterBuilder::new();
        for i in 0..3 {
            let left = 1000 + i * 10;
            let right = 6000 + i * 10;
            let line = format!(
                "r{i}:rg,chr7,{left},{},AAC,129,false,r{i}:rg,chr7,{right},{},AAC,65,true,F1R2",
                left + 49,
                right + 49
            );
            builder.push(MatePair::from_line(&line).unwrap());
        }
        let cluster = builder.finish(
            1,
            PairGroup::Aac,
            SvType::Somatic,
            Platform::PairedEnd,
            1000,
            Vec::new(),
            0,
        );
        let mut record = QsvCluster::from_pair_cluster(cluster, "TD");
        record.sv_id = Some("sv_1".to_string());
        record
    }

    #[test]
    fn test_record_line_fields() {
        let line = record_line(&test_record());
        let fields = line.split('\t').collect::<Vec<_>>();
        assert_eq!(fields[0], "sv_1");
        assert_eq!(fields[2], "DEL/ITX");
        assert_eq!(fields[3], "chr7");
        assert_eq!(fields[9], "3");
        assert_eq!(fields[16], "3");
        assert_eq!(fields[17], "1");
    }

    #[test]
    fn test_write_sv_records() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let reported = write_sv_records(dir, &[test_record()], false, 50);
        assert_eq!(reported, 1);

        let contents = std::fs::read_to_string(dir.join(SV_RECORDS_FILENAME)).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("sv_id\t"));
    }
}
