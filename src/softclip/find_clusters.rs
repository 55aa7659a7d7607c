//! Concurrent soft-clip clustering pass
//!
//! One unit of work per chromosome: load clip evidence, amalgamate breakpoint
//! candidates within a distance window, resolve mate locations through the
//! external aligner, pair breakpoints into soft-clip clusters, and reconcile
//! against the discordant-pair clusters found for the same reference-pair key.
//! Cross-chromosome keys are swept after all per-chromosome workers complete.
//!

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::channel;

use camino::Utf8Path;
use log::{info, warn};
use simple_error::{SimpleResult, bail};

use super::breakpoint::Breakpoint;
use super::cluster::SoftClipCluster;
use super::reader::{ClipEvidence, ClipLoadSettings, clip_file_path, load_clip_evidence};
use crate::aligner::{AlignerClient, AlignmentQuery};
use crate::discordant_pair::cluster::DiscordantPairCluster;
use crate::genome_ref::ChromList;
use crate::sv_cluster::QsvCluster;
use crate::utils::reference_key;

#[derive(Clone, Copy)]
pub struct ClipPassSettings {
    pub min_clip_count: usize,
    pub min_consensus_length: usize,
    pub min_insert_size: i64,

    /// Upper insert size of the library; split reads within this distance
    /// (plus slack) of a breakpoint are attached to it
    pub upper_insert_size: i64,

    /// Breakpoint candidates within this many bases amalgamate into one
    pub clip_window: i64,

    pub load_split_reads: bool,
}

impl ClipPassSettings {
    fn load_settings(&self) -> ClipLoadSettings {
        ClipLoadSettings {
            min_consensus_length: self.min_consensus_length,
            min_insert_size: self.min_insert_size,
            load_split_reads: self.load_split_reads,
        }
    }

    fn split_read_buffer(&self) -> i64 {
        self.upper_insert_size + 100
    }
}

#[derive(Default)]
pub struct ClipPassStats {
    pub defined_breakpoint_count: usize,
    pub mate_resolved_count: usize,
    pub rescued_mate_count: usize,
}

pub struct ClipPassResults {
    pub records: Vec<QsvCluster>,
    pub low_confidence_lines: Vec<String>,
    pub stats: ClipPassStats,
}

/// Merge breakpoint candidates whose positions fall within the window
///
/// The surviving breakpoint keeps the lowest position and carries the
/// combined clip evidence of everything merged into it.
///
pub fn amalgamate_breakpoints(
    window: i64,
    positions: BTreeMap<i64, Breakpoint>,
) -> Vec<Breakpoint> {
    let mut merged: Vec<Breakpoint> = Vec::new();
    for (position, breakpoint) in positions {
        match merged.last_mut() {
            Some(current) if position - current.position() <= window => {
                current.merge(breakpoint);
            }
            _ => merged.push(breakpoint),
        }
    }
    merged
}

/// Attach split-read observations near each breakpoint, then drop the
/// split-read sets subsumed by a clip-confirmed breakpoint
///
fn attach_and_subsume_split_reads(
    breakpoints: &mut [Breakpoint],
    evidence: &mut ClipEvidence,
    buffer: i64,
    window: i64,
) {
    for breakpoint in breakpoints.iter_mut() {
        let start = breakpoint.position() - buffer;
        let end = breakpoint.position() + buffer;
        breakpoint.attach_split_reads(
            evidence
                .split_reads
                .range(start..=end)
                .flat_map(|(_, reads)| reads.iter()),
        );
    }
    let subsumed = breakpoints
        .iter()
        .flat_map(|b| {
            let position = b.position();
            evidence
                .split_reads
                .range(position - window..=position + window)
                .map(|(&pos, _)| pos)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    for position in subsumed {
        evidence.split_reads.remove(&position);
    }
}

/// Pair mutually-corroborating single-sided clusters into two-sided SV
/// candidates; unmatched singles are retained as-is
///
pub fn get_proper_clip_svs(mut clips: Vec<SoftClipCluster>) -> Vec<SoftClipCluster> {
    clips.sort_by(|a, b| a.name().cmp(b.name()));
    let mut slots: Vec<Option<SoftClipCluster>> = clips.into_iter().map(Some).collect();
    let mut proper = Vec::new();

    for i in 0..slots.len() {
        let Some(first) = slots[i].take() else {
            continue;
        };
        let matched = (i + 1..slots.len()).find(|&j| {
            slots[j]
                .as_ref()
                .map(|second| first.matches_mate_of(second))
                .unwrap_or(false)
        });
        match matched {
            Some(j) => {
                let second = slots[j].take().unwrap();
                proper.push(first.pair_with(second));
            }
            None => proper.push(first),
        }
    }
    proper
}

/// Reconcile pair clusters and clip clusters for one reference-pair key
///
/// Every pair cluster becomes a record, absorbing each overlapping clip
/// cluster; remaining clip clusters seed their own records, grouping further
/// clip clusters that overlap them.
///
pub fn find_overlaps(
    pair_clusters: Vec<DiscordantPairCluster>,
    mut clips: Vec<SoftClipCluster>,
    sample_id: &str,
) -> Vec<QsvCluster> {
    clips.sort_by(|a, b| a.name().cmp(b.name()));
    let mut records = Vec::new();

    for cluster in pair_clusters {
        let mut record = QsvCluster::from_pair_cluster(cluster, sample_id);
        for clip in clips.iter_mut() {
            if record.find_cluster_overlap(clip) {
                clip.set_has_cluster_match(true);
            }
        }
        records.push(record);
    }

    for i in 0..clips.len() {
        if clips[i].has_cluster_match() || clips[i].has_clip_match() {
            continue;
        }
        let mut record = QsvCluster::from_clip_cluster(clips[i].clone(), sample_id);
        for j in i + 1..clips.len() {
            if clips[j].has_cluster_match() || clips[j].has_clip_match() {
                continue;
            }
            if record.find_clip_overlap(&mut clips[j]) {
                clips[j].set_has_clip_match(true);
            }
        }
        records.push(record);
    }
    records
}

struct ChromosomeOutput {
    records: Vec<QsvCluster>,
    cross_clips: HashMap<String, Vec<SoftClipCluster>>,
    low_confidence_lines: Vec<String>,
    stats: ClipPassStats,
}

/// Build, align and cluster the breakpoints of one chromosome
///
#[allow(clippy::too_many_arguments)]
fn process_chromosome(
    chromosome: &str,
    clips_dir: &Utf8Path,
    tumor_sample: &str,
    normal_sample: Option<&str>,
    aligner: &dyn AlignerClient,
    pair_clusters: Vec<DiscordantPairCluster>,
    settings: &ClipPassSettings,
) -> SimpleResult<ChromosomeOutput> {
    let mut evidence = ClipEvidence::default();
    load_clip_evidence(
        &clip_file_path(clips_dir, tumor_sample, chromosome),
        true,
        &mut evidence,
        &settings.load_settings(),
    )?;
    if !evidence.is_empty() {
        if let Some(normal_sample) = normal_sample {
            load_clip_evidence(
                &clip_file_path(clips_dir, normal_sample, chromosome),
                false,
                &mut evidence,
                &settings.load_settings(),
            )?;
        }
    }

    let mut stats = ClipPassStats::default();
    let mut low_confidence_lines = Vec::new();

    // amalgamate nearby candidates, then attach and subsume split reads
    let left = std::mem::take(&mut evidence.left);
    let right = std::mem::take(&mut evidence.right);
    let mut breakpoints = amalgamate_breakpoints(settings.clip_window, left);
    breakpoints.extend(amalgamate_breakpoints(settings.clip_window, right));
    attach_and_subsume_split_reads(
        &mut breakpoints,
        &mut evidence,
        settings.split_read_buffer(),
        settings.clip_window,
    );

    let mut defined = breakpoints
        .into_iter()
        .filter_map(|mut b| {
            if b.define_breakpoint(settings.min_clip_count, false) {
                Some(b)
            } else {
                None
            }
        })
        .collect::<Vec<_>>();
    stats.defined_breakpoint_count = defined.len();
    info!(
        "Defined {} breakpoints for {chromosome}",
        defined.len()
    );

    // one aligner batch per chromosome resolves the mate locations
    let queries = defined
        .iter()
        .filter_map(|b| {
            b.mate_consensus().map(|seq| AlignmentQuery {
                name: b.name(),
                sequence: seq.to_string(),
            })
        })
        .collect::<Vec<_>>();
    // an aligner failure is recoverable: the affected breakpoints surface as
    // lower-confidence evidence instead of failing the run
    let alignments = match aligner.align_sequences(&queries) {
        Ok(x) => x,
        Err(e) => {
            warn!("External aligner failed for {chromosome}: {e}; breakpoints stay unresolved");
            HashMap::new()
        }
    };

    let mut clusters_by_key: HashMap<String, Vec<SoftClipCluster>> = HashMap::new();
    for mut breakpoint in defined.drain(..) {
        let mut resolved = match alignments.get(&breakpoint.name()) {
            Some(record) => breakpoint.find_mate_breakpoint(record),
            None => false,
        };
        if !resolved {
            // one rescue retry from the in-memory consensus before the
            // breakpoint is accepted as unresolved
            resolved = match breakpoint.find_rescued_mate_breakpoint(aligner) {
                Ok(x) => x,
                Err(e) => {
                    warn!("Mate rescue alignment failed for {}: {e}", breakpoint.name());
                    false
                }
            };
            if resolved {
                stats.rescued_mate_count += 1;
            }
        }
        if resolved {
            stats.mate_resolved_count += 1;
            let key = breakpoint.get_reference_key().unwrap().to_string();
            clusters_by_key
                .entry(key)
                .or_default()
                .push(SoftClipCluster::from_single(breakpoint));
        } else if breakpoint.is_non_aligned_reportable() {
            low_confidence_lines.push(breakpoint.to_low_confidence_line());
        }
    }

    // reconcile the intra-chromosomal key now; other keys wait for the
    // cross-chromosome sweep
    let own_key = reference_key(chromosome, chromosome);
    let own_clips = clusters_by_key.remove(&own_key).unwrap_or_default();
    let proper = get_proper_clip_svs(own_clips);
    let records = find_overlaps(pair_clusters, proper, tumor_sample);

    Ok(ChromosomeOutput {
        records,
        cross_clips: clusters_by_key,
        low_confidence_lines,
        stats,
    })
}

/// Run the soft-clip clustering pass across all chromosomes and reconcile
/// with the discordant-pair results
///
#[allow(clippy::too_many_arguments)]
pub fn find_clip_clusters(
    thread_count: usize,
    clips_dir: &Utf8Path,
    tumor_sample: &str,
    normal_sample: Option<&str>,
    chrom_list: &ChromList,
    aligner: &dyn AlignerClient,
    mut pair_clusters_by_key: HashMap<String, Vec<DiscordantPairCluster>>,
    settings: &ClipPassSettings,
) -> SimpleResult<ClipPassResults> {
    assert!(thread_count > 0);

    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .unwrap();

    info!(
        "Clustering soft clips across {} chromosomes on {} threads",
        chrom_list.data.len(),
        thread_count
    );

    // each chromosome worker owns its intra-chromosomal pair clusters
    let mut worker_inputs = Vec::new();
    for chromosome in &chrom_list.data {
        let own_key = reference_key(&chromosome.name, &chromosome.name);
        let clusters = pair_clusters_by_key.remove(&own_key).unwrap_or_default();
        worker_inputs.push((chromosome.name.clone(), clusters));
    }

    let (tx, rx) = channel();
    worker_pool.scope(|scope| {
        for (chromosome, pair_clusters) in worker_inputs {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = process_chromosome(
                    &chromosome,
                    clips_dir,
                    tumor_sample,
                    normal_sample,
                    aligner,
                    pair_clusters,
                    settings,
                );
                tx.send((chromosome, result)).unwrap();
            });
        }
        drop(tx);
    });

    let mut records = Vec::new();
    let mut low_confidence_lines = Vec::new();
    let mut stats = ClipPassStats::default();
    let mut cross_clips: HashMap<String, Vec<SoftClipCluster>> = HashMap::new();
    for (chromosome, result) in rx {
        let output = match result {
            Ok(x) => x,
            Err(e) => bail!("soft clip clustering failed for {chromosome}: {e}"),
        };
        records.extend(output.records);
        low_confidence_lines.extend(output.low_confidence_lines);
        stats.defined_breakpoint_count += output.stats.defined_breakpoint_count;
        stats.mate_resolved_count += output.stats.mate_resolved_count;
        stats.rescued_mate_count += output.stats.rescued_mate_count;
        for (key, clips) in output.cross_clips {
            cross_clips.entry(key).or_default().extend(clips);
        }
    }

    // cross-chromosome sweep: merge by reference-pair key; merge order does
    // not affect the final cluster set
    info!("Finalising {} cross-chromosome keys", cross_clips.len());
    let mut final_keys = cross_clips.keys().cloned().collect::<Vec<_>>();
    for key in pair_clusters_by_key.keys() {
        if !cross_clips.contains_key(key) {
            final_keys.push(key.clone());
        }
    }
    final_keys.sort();

    for key in final_keys {
        let clips = cross_clips.remove(&key).unwrap_or_default();
        let pair_clusters = pair_clusters_by_key.remove(&key).unwrap_or_default();
        let proper = get_proper_clip_svs(clips);
        records.extend(find_overlaps(pair_clusters, proper, tumor_sample));
    }

    info!(
        "Soft clip pass complete: {} breakpoints defined, {} mates resolved ({} rescued)",
        stats.defined_breakpoint_count, stats.mate_resolved_count, stats.rescued_mate_count
    );

    Ok(ClipPassResults {
        records,
        low_confidence_lines,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::{AlignmentRecord, NullAligner};
    use crate::softclip::clip::{Clip, ClipSide};
    use crate::sv_cluster::ConfidenceLevel;
    use simple_error::SimpleResult;
    use std::collections::HashMap;

    /// Test aligner mapping query names to fixed alignment records
    struct FakeAligner {
        records: HashMap<String, AlignmentRecord>,
    }

    impl AlignerClient for FakeAligner {
        fn align_sequences(
            &self,
            queries: &[AlignmentQuery],
        ) -> SimpleResult<HashMap<String, AlignmentRecord>> {
            Ok(queries
                .iter()
                .filter_map(|q| self.records.get(&q.name).map(|r| (q.name.clone(), r.clone())))
                .collect())
        }
    }

    fn raw_breakpoint(position: i64, side: ClipSide, clip_count: usize) -> Breakpoint {
        let side_str = side.to_string();
        let mut bp = Breakpoint::new(position, "chr7", side, 4, 50);
        for i in 0..clip_count {
            let (full, anchor) = if side == ClipSide::Left {
                ("AGGTTACGTA", "ACGTA")
            } else {
                ("ACGTAAGGTT", "ACGTA")
            };
            bp.add_tumour_clip(
                Clip::from_line(&format!(
                    "r{position}_{i},chr7,{position},+,{side_str},{full},{anchor},AGGTT"
                ))
                .unwrap(),
            );
        }
        bp
    }

    #[test]
    fn test_amalgamate_breakpoints_window() {
        let mut positions = BTreeMap::new();
        positions.insert(100, raw_breakpoint(100, ClipSide::Left, 2));
        positions.insert(102, raw_breakpoint(102, ClipSide::Left, 2));
        positions.insert(200, raw_breakpoint(200, ClipSide::Left, 2));

        let merged = amalgamate_breakpoints(3, positions);
        assert_eq!(merged.len(), 2);
        // merged breakpoint carries the combined evidence
        assert_eq!(merged[0].tumour_clips().len(), 4);
        assert_eq!(merged[0].position(), 100);
        assert_eq!(merged[1].position(), 200);
    }

    #[test]
    fn test_proper_clip_svs_pairs_mutual_mates() {
        use crate::softclip::cluster::tests::mated_breakpoint;

        let first =
            SoftClipCluster::from_single(mated_breakpoint("chr7", 1000, ClipSide::Right, "+", "chr7", 5000, '+'));
        let second =
            SoftClipCluster::from_single(mated_breakpoint("chr7", 5000, ClipSide::Left, "+", "chr7", 1000, '+'));
        let orphan =
            SoftClipCluster::from_single(mated_breakpoint("chr7", 90000, ClipSide::Left, "+", "chr7", 80000, '+'));

        let proper = get_proper_clip_svs(vec![first, second, orphan]);
        assert_eq!(proper.len(), 2);
        assert_eq!(proper.iter().filter(|c| c.has_matching_breakpoints()).count(), 1);
    }

    #[test]
    fn test_find_overlaps_clip_only() {
        use crate::softclip::cluster::tests::mated_breakpoint;

        let clip =
            SoftClipCluster::from_single(mated_breakpoint("chr7", 1000, ClipSide::Right, "+", "chr7", 5000, '+'));
        let records = find_overlaps(Vec::new(), vec![clip], "TD");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get_confidence_level(),
            ConfidenceLevel::SingleClip
        );
    }

    #[test]
    fn test_process_chromosome_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();

        // three left clips at 5000 whose overhang aligns back to 1000
        let mut lines = Vec::new();
        for i in 0..3 {
            lines.push(format!(
                "t{i},chr7,5000,+,left,AGGTTACGTA,ACGTA,AGGTT"
            ));
        }
        std::fs::write(
            dir.join("TD.chr7.txt"),
            lines.join("\n") + "\n",
        )
        .unwrap();

        let name = "chr7_5000_left_+";
        let record = AlignmentRecord::from_line(
            "5\t0\t0\t0\t0\t0\t0\t0\t+\tq\t5\t0\t5\tchr7\t1000000\t995\t1000\t1\t5,\t0,\t995,",
        )
        .unwrap();
        let aligner = FakeAligner {
            records: HashMap::from([(name.to_string(), record)]),
        };

        let settings = ClipPassSettings {
            min_clip_count: 3,
            min_consensus_length: 4,
            min_insert_size: 50,
            upper_insert_size: 1000,
            clip_window: 3,
            load_split_reads: true,
        };
        let output = process_chromosome(
            "chr7",
            dir,
            "TD",
            None,
            &aligner,
            Vec::new(),
            &settings,
        )
        .unwrap();

        assert_eq!(output.stats.defined_breakpoint_count, 1);
        assert_eq!(output.stats.mate_resolved_count, 1);
        assert_eq!(output.records.len(), 1);
        // single-sided clip evidence only
        assert_eq!(
            output.records[0].get_confidence_level(),
            ConfidenceLevel::SingleClip
        );
    }

    #[test]
    fn test_unresolved_breakpoints_surface_as_low_confidence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();

        let mut lines = Vec::new();
        for i in 0..12 {
            lines.push(format!(
                "t{i},chr7,5000,+,left,AGGTTACGTA,ACGTA,AGGTT"
            ));
        }
        std::fs::write(dir.join("TD.chr7.txt"), lines.join("\n") + "\n").unwrap();

        let settings = ClipPassSettings {
            min_clip_count: 3,
            min_consensus_length: 4,
            min_insert_size: 50,
            upper_insert_size: 1000,
            clip_window: 3,
            load_split_reads: false,
        };
        let output = process_chromosome(
            "chr7",
            dir,
            "TD",
            None,
            &NullAligner,
            Vec::new(),
            &settings,
        )
        .unwrap();

        assert!(output.records.is_empty());
        assert_eq!(output.low_confidence_lines.len(), 1);
        assert!(output.low_confidence_lines[0].starts_with("chr7\t5000\tsomatic\tleft\t+\t12"));
    }
}
