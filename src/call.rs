//! Top-level orchestration of the breakpoint calling run
//!

use log::info;
use simple_error::SimpleResult;

use crate::aligner::{AlignerClient, CommandAligner, NullAligner};
use crate::cli;
use crate::discordant_pair::find_clusters::{
    DiscordantPassResults, DiscordantPassSettings, find_discordant_pair_clusters,
};
use crate::genome_ref::get_genome_ref_from_fasta;
use crate::report::{write_low_confidence_breakpoints, write_primer_sites, write_sv_records};
use crate::run_stats::{ClipPassStatsReport, PairPassStats, RunStats, write_run_stats};
use crate::softclip::find_clusters::{ClipPassSettings, find_clip_clusters};
use crate::sv_cluster::QsvCluster;
use crate::utils::compare_reference_names;

pub fn run_call(
    shared_settings: &cli::SharedSettings,
    settings: &cli::CallSettings,
) -> SimpleResult<()> {
    cli::write_call_settings(&settings.output_dir, settings);

    let genome_ref = get_genome_ref_from_fasta(&settings.ref_filename);
    let chrom_list = genome_ref.chrom_list();

    let aligner: Box<dyn AlignerClient> = match &settings.aligner {
        Some(command) => Box::new(CommandAligner::new(command, &settings.output_dir)),
        None => {
            info!("No aligner configured; candidate mate breakpoints will stay unresolved");
            Box::new(NullAligner)
        }
    };

    let pair_settings = DiscordantPassSettings {
        window_size: settings.upper_insert_size,
        normal_window_size: settings.normal_upper_insert_size,
        min_cluster_size: settings.cluster_size,
        compare_cluster_size: settings.compare_cluster_size,
        platform: settings.platform,
    };
    let DiscordantPassResults {
        clusters_by_key,
        normal_germline_clusters,
        counts_by_group: _,
    } = find_discordant_pair_clusters(
        shared_settings.thread_count,
        &settings.pairs_dir(),
        &settings.tumor_sample,
        settings.normal_sample(),
        &pair_settings,
    )?;

    let pair_stats = {
        let mut stats = PairPassStats::default();
        for clusters in clusters_by_key.values() {
            for cluster in clusters {
                match cluster.sv_type {
                    crate::discordant_pair::cluster::SvType::Somatic => {
                        stats.somatic_cluster_count += 1
                    }
                    crate::discordant_pair::cluster::SvType::Germline => {
                        stats.germline_cluster_count += 1
                    }
                    crate::discordant_pair::cluster::SvType::NormalGermline => {}
                }
            }
        }
        stats.normal_germline_cluster_count = normal_germline_clusters.len();
        stats
    };

    let clip_settings = ClipPassSettings {
        min_clip_count: settings.clip_size,
        min_consensus_length: settings.consensus_length,
        min_insert_size: settings.min_insert_size,
        upper_insert_size: settings.upper_insert_size,
        clip_window: settings.clip_window,
        load_split_reads: !settings.no_split_reads,
    };
    let clip_results = find_clip_clusters(
        shared_settings.thread_count,
        &settings.clips_dir(),
        &settings.tumor_sample,
        settings.normal_sample(),
        &chrom_list,
        aligner.as_ref(),
        clusters_by_key,
        &clip_settings,
    )?;

    let mut records = clip_results.records;
    for cluster in normal_germline_clusters {
        records.push(QsvCluster::from_pair_cluster(
            cluster,
            &settings.normal_sample,
        ));
    }

    // stable genomic output order; merge order across partitions never
    // affects the cluster set itself
    records.sort_by(|a, b| {
        compare_reference_names(a.left_reference(), b.left_reference())
            .then(a.left_breakpoint().cmp(&b.left_breakpoint()))
            .then(a.right_breakpoint().cmp(&b.right_breakpoint()))
    });

    let mut confidence_counts = std::collections::BTreeMap::new();
    for (index, record) in records.iter_mut().enumerate() {
        record.sv_id = Some(format!("sv_{}", index + 1));
        if record.passes_min_insert_size(settings.min_insert_size)
            && record.print_record(settings.single_sided)
        {
            record.check_reference_flank(&genome_ref, &chrom_list);
            *confidence_counts
                .entry(record.get_confidence_level().to_string())
                .or_insert(0) += 1;
        }
    }

    let reported = write_sv_records(
        &settings.output_dir,
        &records,
        settings.single_sided,
        settings.min_insert_size,
    );
    write_primer_sites(&settings.output_dir, &records);
    write_low_confidence_breakpoints(&settings.output_dir, &clip_results.low_confidence_lines);

    info!(
        "Reported {reported} of {} merged SV records",
        records.len()
    );

    write_run_stats(
        &settings.output_dir,
        &RunStats {
            sample_id: settings.tumor_sample.clone(),
            pair_stats,
            clip_stats: ClipPassStatsReport {
                defined_breakpoint_count: clip_results.stats.defined_breakpoint_count,
                mate_resolved_count: clip_results.stats.mate_resolved_count,
                rescued_mate_count: clip_results.stats.rescued_mate_count,
                low_confidence_breakpoint_count: clip_results.low_confidence_lines.len(),
            },
            record_count: records.len(),
            reported_record_count: reported,
            confidence_counts,
        },
    );

    Ok(())
}
