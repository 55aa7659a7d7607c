//! Concurrent discordant-pair clustering pass
//!
//! One unit of work per (pair group, chromosome-pair) partition: cluster the
//! primary sample's partition, scan the matched sample's partition at the same
//! coordinates, and label each cluster somatic / germline / normal-germline.
//! Workers share no mutable state; results are merged after all workers join,
//! and a fatal error in any worker aborts the whole batch.
//!

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::channel;

use camino::Utf8Path;
use log::{info, warn};
use simple_error::{SimpleResult, bail};
use strum::IntoEnumIterator;

use super::cluster::{DiscordantPairCluster, DiscordantPairClusterBuilder, SvType};
use super::mate::{MatePair, PairGroup, Platform};
use super::reader::MatePairsReader;

/// Cluster-count levels above which a runaway partition is reported
const LARGE_SOMATIC_CLUSTER_WARNING: usize = 10_000;
const LARGE_GERMLINE_CLUSTER_WARNING: usize = 50_000;

#[derive(Clone, Copy, Debug)]
pub struct DiscordantPassSettings {
    /// Expected insert-size tolerance of the primary sample's library
    pub window_size: i64,

    /// Expected insert-size tolerance of the matched sample's library
    pub normal_window_size: i64,

    /// Minimum supporting pair count before a cluster is emitted
    pub min_cluster_size: usize,

    /// The matched normal's own minimum cluster size; overlapping normal
    /// pairs below this count become low-confidence germline-rescue evidence
    pub compare_cluster_size: usize,

    pub platform: Platform,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SvTypeCounts {
    pub somatic: usize,
    pub germline: usize,
    pub normal_germline: usize,
}

pub struct DiscordantPassResults {
    /// Tumor-primary clusters (somatic and germline), grouped by the
    /// canonical reference-pair key for reconciliation with clip evidence
    pub clusters_by_key: HashMap<String, Vec<DiscordantPairCluster>>,

    /// Normal-primary clusters cataloguing germline-only events
    pub normal_germline_clusters: Vec<DiscordantPairCluster>,

    pub counts_by_group: BTreeMap<String, SvTypeCounts>,
}

impl DiscordantPassResults {
    pub fn total_counts(&self) -> SvTypeCounts {
        let mut total = SvTypeCounts::default();
        for counts in self.counts_by_group.values() {
            total.somatic += counts.somatic;
            total.germline += counts.germline;
            total.normal_germline += counts.normal_germline;
        }
        total
    }
}

/// Scan one partition's sorted pairs into candidate cluster windows
///
/// A pair joins the open cluster when both its left-mate and right-mate starts
/// fall within the insert-size tolerance of the cluster's running extremes;
/// otherwise the cluster is closed (kept if large enough) and a new one opens.
///
fn scan_partition(
    pairs: Vec<MatePair>,
    window_size: i64,
    min_cluster_size: usize,
) -> Vec<DiscordantPairClusterBuilder> {
    let mut candidates = Vec::new();
    let mut builder = DiscordantPairClusterBuilder::new();

    for pair in pairs {
        if !builder.accepts(&pair, window_size) {
            let closed = std::mem::take(&mut builder);
            if closed.len() >= min_cluster_size {
                candidates.push(closed);
            }
        }
        builder.push(pair);
    }
    if builder.len() >= min_cluster_size {
        candidates.push(builder);
    }
    candidates
}

/// Classify one candidate against the matched sample's pairs and freeze it
///
fn classify_candidate(
    builder: DiscordantPairClusterBuilder,
    group: PairGroup,
    compare_pairs: &[MatePair],
    settings: &DiscordantPassSettings,
) -> DiscordantPairCluster {
    let extremes = builder.extremes();
    let left_middle = (extremes.left_end - extremes.left_start) / 2 + extremes.left_start;
    let right_middle = (extremes.right_end - extremes.right_start) / 2 + extremes.right_start;
    let left_start = left_middle - settings.normal_window_size;
    let left_end = left_middle + settings.normal_window_size;
    let right_start = right_middle - settings.normal_window_size;
    let right_end = right_middle + settings.normal_window_size;

    let mut matched = Vec::new();
    for pair in compare_pairs {
        if pair.left_mate().start > left_end {
            break;
        }
        if pair.overlaps_regions(left_start, left_end, right_start, right_end) {
            matched.push(pair.clone());
        }
    }

    let (sv_type, low_confidence) = if matched.len() >= settings.compare_cluster_size {
        (SvType::Germline, 0)
    } else {
        // normal support exists but falls below the normal sample's own
        // minimum cluster size: retain the count for germline rescue
        (SvType::Somatic, matched.len())
    };

    builder.finish(
        0,
        group,
        sv_type,
        settings.platform,
        settings.normal_window_size,
        matched,
        low_confidence,
    )
}

/// Cluster and classify one (pair group, chromosome-pair) partition
///
fn process_partition(
    group: PairGroup,
    key: &str,
    find_reader: &MatePairsReader,
    compare_reader: Option<&MatePairsReader>,
    primary_is_tumor: bool,
    settings: &DiscordantPassSettings,
) -> SimpleResult<Vec<DiscordantPairCluster>> {
    let files = match find_reader.files_for_key(key) {
        Some(x) => x,
        None => return Ok(Vec::new()),
    };
    let find_pairs = find_reader.read_mate_pairs(files, true)?;
    let candidates = scan_partition(find_pairs, settings.window_size, settings.min_cluster_size);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    if primary_is_tumor {
        let compare_pairs = match compare_reader {
            Some(reader) => match reader.files_for_key(key) {
                Some(compare_files) => reader.read_mate_pairs(compare_files, true)?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        Ok(candidates
            .into_iter()
            .map(|c| classify_candidate(c, group, &compare_pairs, settings))
            .collect())
    } else {
        // normal-as-primary invocation catalogues germline-only events
        Ok(candidates
            .into_iter()
            .map(|c| {
                c.finish(
                    0,
                    group,
                    SvType::NormalGermline,
                    settings.platform,
                    settings.normal_window_size,
                    Vec::new(),
                    0,
                )
            })
            .collect())
    }
}

/// Run the discordant-pair clustering pass over every partition of both
/// samples
///
pub fn find_discordant_pair_clusters(
    thread_count: usize,
    pairs_dir: &Utf8Path,
    tumor_sample: &str,
    normal_sample: Option<&str>,
    settings: &DiscordantPassSettings,
) -> SimpleResult<DiscordantPassResults> {
    assert!(thread_count > 0);

    struct Partition {
        group: PairGroup,
        key: String,
        primary_is_tumor: bool,
    }

    let mut tumor_readers = HashMap::new();
    let mut normal_readers = HashMap::new();
    let mut partitions = Vec::new();
    for group in PairGroup::iter() {
        let tumor_reader = MatePairsReader::new(pairs_dir, tumor_sample, group)?;
        for key in tumor_reader.keys() {
            partitions.push(Partition {
                group,
                key: key.clone(),
                primary_is_tumor: true,
            });
        }
        tumor_readers.insert(group, tumor_reader);

        if let Some(normal_sample) = normal_sample {
            let normal_reader = MatePairsReader::new(pairs_dir, normal_sample, group)?;
            for key in normal_reader.keys() {
                partitions.push(Partition {
                    group,
                    key: key.clone(),
                    primary_is_tumor: false,
                });
            }
            normal_readers.insert(group, normal_reader);
        }
    }

    info!(
        "Clustering discordant pairs across {} partitions on {} threads",
        partitions.len(),
        thread_count
    );

    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .unwrap();

    let (tx, rx) = channel();
    let tumor_readers = &tumor_readers;
    let normal_readers = &normal_readers;
    worker_pool.scope(move |scope| {
        for partition in partitions {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let (find_reader, compare_reader) = if partition.primary_is_tumor {
                    (
                        &tumor_readers[&partition.group],
                        normal_readers.get(&partition.group),
                    )
                } else {
                    (&normal_readers[&partition.group], None)
                };
                let result = process_partition(
                    partition.group,
                    &partition.key,
                    find_reader,
                    compare_reader,
                    partition.primary_is_tumor,
                    settings,
                );
                tx.send((partition.group, partition.key, result)).unwrap();
            });
        }
    });

    let mut results = DiscordantPassResults {
        clusters_by_key: HashMap::new(),
        normal_germline_clusters: Vec::new(),
        counts_by_group: BTreeMap::new(),
    };
    let mut counts = SvTypeCounts::default();

    for (group, key, result) in rx {
        let clusters = match result {
            Ok(x) => x,
            Err(e) => {
                bail!("discordant pair clustering failed in partition {group} {key}: {e}");
            }
        };

        let group_counts = results.counts_by_group.entry(group.to_string()).or_default();
        for mut cluster in clusters {
            match cluster.sv_type {
                SvType::Somatic => {
                    counts.somatic += 1;
                    group_counts.somatic += 1;
                    cluster.id = counts.somatic;
                }
                SvType::Germline => {
                    counts.germline += 1;
                    group_counts.germline += 1;
                    cluster.id = counts.germline;
                }
                SvType::NormalGermline => {
                    counts.normal_germline += 1;
                    group_counts.normal_germline += 1;
                    cluster.id = counts.normal_germline;
                }
            }
            if cluster.sv_type == SvType::NormalGermline {
                results.normal_germline_clusters.push(cluster);
            } else {
                results
                    .clusters_by_key
                    .entry(key.clone())
                    .or_default()
                    .push(cluster);
            }
        }
    }

    for (group, group_counts) in &results.counts_by_group {
        if group_counts.somatic > LARGE_SOMATIC_CLUSTER_WARNING {
            warn!(
                "More than {LARGE_SOMATIC_CLUSTER_WARNING} somatic clusters found for SV type {group}; check the insert size range supplied for the library"
            );
        } else if group_counts.germline > LARGE_GERMLINE_CLUSTER_WARNING {
            warn!(
                "More than {LARGE_GERMLINE_CLUSTER_WARNING} germline clusters found for SV type {group}; check the insert size range supplied for the library"
            );
        }
        info!(
            "Clusters for {group}: somatic = {} | germline = {} | normal-germline = {}",
            group_counts.somatic, group_counts.germline, group_counts.normal_germline
        );
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn pair_line(name: &str, left_start: i64, right_start: i64) -> String {
        format!(
            "{name}:rg,chr7,{left_start},{},AAC,129,false,{name}:rg,chr7,{right_start},{},AAC,65,true,F1R2",
            left_start + 49,
            right_start + 49
        )
    }

    fn settings() -> DiscordantPassSettings {
        DiscordantPassSettings {
            window_size: 1000,
            normal_window_size: 1000,
            min_cluster_size: 3,
            compare_cluster_size: 3,
            platform: Platform::PairedEnd,
        }
    }

    fn parse_pairs(lines: &[String]) -> Vec<MatePair> {
        lines.iter().map(|l| MatePair::from_line(l).unwrap()).collect()
    }

    #[test]
    fn test_scan_partition_emits_windows() {
        let lines = vec![
            pair_line("r1", 1000, 6000),
            pair_line("r2", 1100, 6100),
            pair_line("r3", 1200, 6200),
            // second cluster far downstream
            pair_line("r4", 20000, 26000),
            pair_line("r5", 20100, 26100),
            pair_line("r6", 20200, 26200),
        ];
        let candidates = scan_partition(parse_pairs(&lines), 1000, 3);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].len(), 3);
        assert_eq!(candidates[1].extremes().left_start, 20000);
    }

    #[test]
    fn test_scan_partition_minimum_size() {
        let lines = vec![pair_line("r1", 1000, 6000), pair_line("r2", 1100, 6100)];
        let candidates = scan_partition(parse_pairs(&lines), 1000, 3);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_classify_somatic_and_germline() {
        let tumor = parse_pairs(&[
            pair_line("t1", 1000, 6000),
            pair_line("t2", 1100, 6100),
            pair_line("t3", 1200, 6200),
        ]);
        let mut builder = DiscordantPairClusterBuilder::new();
        for p in tumor.clone() {
            builder.push(p);
        }

        // no normal support: somatic
        let cluster = classify_candidate(builder, PairGroup::Aac, &[], &settings());
        assert_eq!(cluster.sv_type, SvType::Somatic);
        assert_eq!(cluster.low_confidence_normal_mate_pairs, 0);

        // full normal support: germline
        let normal = parse_pairs(&[
            pair_line("n1", 1010, 6010),
            pair_line("n2", 1110, 6110),
            pair_line("n3", 1210, 6210),
        ]);
        let mut builder = DiscordantPairClusterBuilder::new();
        for p in tumor.clone() {
            builder.push(p);
        }
        let cluster = classify_candidate(builder, PairGroup::Aac, &normal, &settings());
        assert_eq!(cluster.sv_type, SvType::Germline);

        // below-threshold normal support: somatic with rescue evidence
        let sparse_normal = parse_pairs(&[pair_line("n1", 1010, 6010)]);
        let mut builder = DiscordantPairClusterBuilder::new();
        for p in tumor {
            builder.push(p);
        }
        let cluster = classify_candidate(builder, PairGroup::Aac, &sparse_normal, &settings());
        assert_eq!(cluster.sv_type, SvType::Somatic);
        assert_eq!(cluster.low_confidence_normal_mate_pairs, 1);
    }

    #[test]
    fn test_full_pass_over_evidence_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();

        let mut tumor = File::create(dir.join("TD.AAC.chr7-chr7.txt")).unwrap();
        for line in [
            pair_line("t1", 1000, 6000),
            pair_line("t2", 1100, 6100),
            pair_line("t3", 1200, 6200),
        ] {
            writeln!(tumor, "{line}").unwrap();
        }
        let mut normal = File::create(dir.join("ND.AAC.chr7-chr7.txt")).unwrap();
        for line in [
            pair_line("n1", 50000, 56000),
            pair_line("n2", 50100, 56100),
            pair_line("n3", 50200, 56200),
        ] {
            writeln!(normal, "{line}").unwrap();
        }

        let results =
            find_discordant_pair_clusters(2, dir, "TD", Some("ND"), &settings()).unwrap();

        let tumor_clusters = &results.clusters_by_key["chr7:chr7"];
        assert_eq!(tumor_clusters.len(), 1);
        assert_eq!(tumor_clusters[0].sv_type, SvType::Somatic);
        assert_eq!(results.normal_germline_clusters.len(), 1);
        assert_eq!(
            results.normal_germline_clusters[0].sv_type,
            SvType::NormalGermline
        );
        assert_eq!(results.total_counts().somatic, 1);
        assert_eq!(results.total_counts().normal_germline, 1);
    }

    #[test]
    fn test_unsorted_partition_aborts_pass() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();

        let mut tumor = File::create(dir.join("TD.AAC.chr7-chr7.txt")).unwrap();
        for line in [
            pair_line("t1", 2000, 6000),
            pair_line("t2", 1000, 6100),
            pair_line("t3", 1200, 6200),
        ] {
            writeln!(tumor, "{line}").unwrap();
        }

        assert!(find_discordant_pair_clusters(2, dir, "TD", None, &settings()).is_err());
    }
}
