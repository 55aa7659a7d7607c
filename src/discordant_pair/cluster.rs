//! Discordant pair cluster representation
//!
//! Evidence accumulates in a `DiscordantPairClusterBuilder` while the worker
//! scans its partition; `finish` freezes the result into an immutable
//! `DiscordantPairCluster` so no partially-built state is ever visible outside
//! the owning worker.
//!

use std::collections::BTreeMap;

use itertools::Itertools;
use strum::{Display, EnumString};

use super::mate::{MatePair, MutationType, OrientationCategory, PairGroup, Platform};
use super::qprimer::QPrimerCategory;
use crate::utils::reference_key;

/// Padding applied around cluster boundaries when testing clip breakpoint
/// overlap
const CLUSTER_OVERLAP_WINDOW: i64 = 100;

/// Cross-sample classification of a cluster
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq)]
pub enum SvType {
    #[strum(serialize = "somatic")]
    Somatic,
    #[strum(serialize = "germline")]
    Germline,
    #[strum(serialize = "normal-germline")]
    NormalGermline,
}

/// Coordinate extremes of a candidate cluster's contributing mates
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClusterExtremes {
    pub left_start: i64,
    pub left_end: i64,
    pub right_start: i64,
    pub right_end: i64,
}

/// Accumulates mate pairs for one cluster window during the partition scan
///
#[derive(Default)]
pub struct DiscordantPairClusterBuilder {
    pairs: Vec<MatePair>,
    left_anchor: i64,
    right_min: i64,
    right_max: i64,
}

impl DiscordantPairClusterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// A pair joins the open cluster when its left-mate start stays within the
    /// insert-size window of the cluster anchor and its right-mate start keeps
    /// the right-side span within the same window
    ///
    pub fn accepts(&self, pair: &MatePair, window_size: i64) -> bool {
        if self.pairs.is_empty() {
            return true;
        }
        if pair.left_mate().start > self.left_anchor + window_size {
            return false;
        }
        let right = pair.right_mate().start;
        let right_min = std::cmp::min(self.right_min, right);
        let right_max = std::cmp::max(self.right_max, right);
        right_max - right_min <= window_size
    }

    pub fn push(&mut self, pair: MatePair) {
        let right = pair.right_mate().start;
        if self.pairs.is_empty() {
            self.left_anchor = pair.left_mate().start;
            self.right_min = right;
            self.right_max = right;
        } else {
            self.right_min = std::cmp::min(self.right_min, right);
            self.right_max = std::cmp::max(self.right_max, right);
        }
        self.pairs.push(pair);
    }

    pub fn extremes(&self) -> ClusterExtremes {
        assert!(!self.pairs.is_empty());
        ClusterExtremes {
            left_start: self.pairs.iter().map(|p| p.left_mate().start).min().unwrap(),
            left_end: self.pairs.iter().map(|p| p.left_mate().end).max().unwrap(),
            right_start: self
                .pairs
                .iter()
                .map(|p| p.right_mate().start)
                .min()
                .unwrap(),
            right_end: self.pairs.iter().map(|p| p.right_mate().end).max().unwrap(),
        }
    }

    /// Freeze the accumulated evidence into an immutable cluster
    ///
    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        self,
        id: usize,
        group: PairGroup,
        sv_type: SvType,
        platform: Platform,
        normal_window_size: i64,
        matched_normal_pairs: Vec<MatePair>,
        low_confidence_normal_mate_pairs: usize,
    ) -> DiscordantPairCluster {
        assert!(!self.pairs.is_empty());
        let extremes = self.extremes();

        let left_reference = self.pairs[0].left_mate().reference_name.clone();
        let right_reference = self.pairs[0].right_mate().reference_name.clone();

        let (strand_orientation_tally, strand_orientation) =
            count_strand_orientations(&self.pairs);

        let qprimer = QPrimerCategory::from_pairs(
            &self.pairs,
            platform,
            &left_reference,
            &right_reference,
            extremes.left_start,
            extremes.left_end,
            extremes.right_start,
            extremes.right_end,
        );

        // symmetric padding around each range midpoint for fuzzy matching
        // against the normal sample and clip evidence
        let left_middle = (extremes.left_end - extremes.left_start) / 2 + extremes.left_start;
        let right_middle = (extremes.right_end - extremes.right_start) / 2 + extremes.right_start;

        DiscordantPairCluster {
            id,
            group,
            sv_type,
            left_reference,
            right_reference,
            left_start: extremes.left_start,
            left_end: extremes.left_end,
            right_start: extremes.right_start,
            right_end: extremes.right_end,
            compare_left_start: left_middle - normal_window_size,
            compare_left_end: left_middle + normal_window_size,
            compare_right_start: right_middle - normal_window_size,
            compare_right_end: right_middle + normal_window_size,
            strand_orientation,
            strand_orientation_tally,
            qprimer,
            pairs: self.pairs,
            matched_normal_pairs,
            low_confidence_normal_mate_pairs,
        }
    }
}

/// Discordant pair evidence for one SV candidate
///
/// Frozen by the worker that built it; reconciliation reads it only.
///
#[derive(Clone, Debug)]
pub struct DiscordantPairCluster {
    pub id: usize,
    pub group: PairGroup,
    pub sv_type: SvType,
    pub left_reference: String,
    pub right_reference: String,
    pub left_start: i64,
    pub left_end: i64,
    pub right_start: i64,
    pub right_end: i64,
    compare_left_start: i64,
    compare_left_end: i64,
    compare_right_start: i64,
    compare_right_end: i64,
    pub strand_orientation: String,
    pub strand_orientation_tally: BTreeMap<String, usize>,
    qprimer: QPrimerCategory,
    pairs: Vec<MatePair>,
    matched_normal_pairs: Vec<MatePair>,
    pub low_confidence_normal_mate_pairs: usize,
}

impl DiscordantPairCluster {
    pub fn pairs(&self) -> &[MatePair] {
        &self.pairs
    }

    pub fn matched_normal_pairs(&self) -> &[MatePair] {
        &self.matched_normal_pairs
    }

    pub fn qprimer(&self) -> &QPrimerCategory {
        &self.qprimer
    }

    pub fn orientation_category(&self) -> Option<OrientationCategory> {
        self.qprimer.primary_category()
    }

    pub fn mutation_type(&self) -> MutationType {
        self.group.mutation_type()
    }

    pub fn reference_key(&self) -> String {
        reference_key(&self.left_reference, &self.right_reference)
    }

    pub fn compare_ranges(&self) -> (i64, i64, i64, i64) {
        (
            self.compare_left_start,
            self.compare_left_end,
            self.compare_right_start,
            self.compare_right_end,
        )
    }

    /// The breakpoint-proximal boundary of the left mate range
    ///
    /// The resolved orientation category determines which side of the range
    /// faces the breakpoint.
    ///
    pub fn left_breakpoint(&self) -> i64 {
        use OrientationCategory::*;
        match self.orientation_category() {
            Some(Cat1) | Some(Cat3) => self.left_end,
            Some(Cat2) | Some(Cat4) | Some(Cat5) => self.left_start,
            None => 0,
        }
    }

    pub fn right_breakpoint(&self) -> i64 {
        use OrientationCategory::*;
        match self.orientation_category() {
            Some(Cat1) | Some(Cat4) => self.right_start,
            Some(Cat2) | Some(Cat3) | Some(Cat5) => self.right_end,
            None => 0,
        }
    }

    /// Test whether a coordinate falls inside the (padded) left or right
    /// breakpoint-proximal boundary of this cluster
    ///
    pub fn get_overlap(&self, is_left_side: bool, position: i64) -> bool {
        use OrientationCategory::*;
        let boundary = match self.orientation_category() {
            Some(Cat1) => {
                if is_left_side {
                    self.left_end
                } else {
                    self.right_start
                }
            }
            Some(Cat2) | Some(Cat5) => {
                if is_left_side {
                    self.left_start
                } else {
                    self.right_end
                }
            }
            Some(Cat3) => {
                if is_left_side {
                    self.left_end
                } else {
                    self.right_end
                }
            }
            Some(Cat4) => {
                if is_left_side {
                    self.left_start
                } else {
                    self.right_start
                }
            }
            None => return false,
        };
        let start = std::cmp::max(boundary - CLUSTER_OVERLAP_WINDOW, 0);
        let end = boundary + CLUSTER_OVERLAP_WINDOW;
        position >= start && position <= end
    }
}

/// Tally per-pair strand orientation tokens and derive the modal token
///
/// Ties are joined with ';' in ascending token order.
///
fn count_strand_orientations(pairs: &[MatePair]) -> (BTreeMap<String, usize>, String) {
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for pair in pairs {
        *tally.entry(pair.strand_orientation()).or_insert(0) += 1;
    }
    let max = tally.values().copied().max().unwrap_or(0);
    let mode = tally
        .iter()
        .filter(|&(_, &count)| count == max && max > 0)
        .map(|(key, _)| key.as_str())
        .join(";");
    (tally, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn pair(left_start: i64, left_end: i64, right_start: i64, right_end: i64) -> MatePair {
        let line = format!(
            "r{left_start}_{right_start}:rg,chr7,{left_start},{left_end},AAC,129,false,r{left_start}_{right_start}:rg,chr7,{right_start},{right_end},AAC,65,true,F1R2"
        );
        MatePair::from_line(&line).unwrap()
    }

    fn fixture_builder() -> DiscordantPairClusterBuilder {
        // six pairs spanning the fixture coordinate ranges
        let mut builder = DiscordantPairClusterBuilder::new();
        for p in [
            pair(140188227, 140188276, 140191179, 140191228),
            pair(140188379, 140188428, 140191044, 140191093),
            pair(140188449, 140188498, 140191238, 140191287),
            pair(140188962, 140189011, 140191372, 140191421),
            pair(140189005, 140189054, 140191629, 140191678),
            pair(140189059, 140189108, 140191509, 140191558),
        ] {
            builder.push(p);
        }
        builder
    }

    fn fixture_cluster() -> DiscordantPairCluster {
        fixture_builder().finish(
            1,
            PairGroup::Aac,
            SvType::Somatic,
            Platform::PairedEnd,
            1000,
            Vec::new(),
            0,
        )
    }

    #[test]
    fn test_cluster_extremes() {
        let cluster = fixture_cluster();
        assert_eq!(cluster.left_start, 140188227);
        assert_eq!(cluster.left_end, 140189108);
        assert_eq!(cluster.right_start, 140191044);
        assert_eq!(cluster.right_end, 140191678);
    }

    #[test]
    fn test_strand_orientation_mode() {
        let cluster = fixture_cluster();
        assert_eq!(cluster.strand_orientation, "+/-");
        assert_eq!(cluster.strand_orientation_tally["+/-"], 6);
    }

    #[test]
    fn test_cluster_breakpoints_by_category() {
        let cluster = fixture_cluster();
        // AAC F1R2 on pe is category 1: left end / right start
        assert_eq!(
            cluster.orientation_category(),
            Some(OrientationCategory::Cat1)
        );
        assert_eq!(cluster.left_breakpoint(), 140189108);
        assert_eq!(cluster.right_breakpoint(), 140191044);
    }

    #[test]
    fn test_get_overlap_window() {
        let cluster = fixture_cluster();
        assert!(cluster.get_overlap(true, 140189108));
        assert!(cluster.get_overlap(true, 140189208));
        assert!(!cluster.get_overlap(true, 140189209));
        assert!(cluster.get_overlap(false, 140190944));
        assert!(!cluster.get_overlap(false, 140190943));
    }

    #[test]
    fn test_builder_window_acceptance() {
        let mut builder = DiscordantPairClusterBuilder::new();
        builder.push(pair(1000, 1049, 5000, 5049));
        assert!(builder.accepts(&pair(1500, 1549, 5200, 5249), 1000));
        // left mate start outside the window
        assert!(!builder.accepts(&pair(2100, 2149, 5200, 5249), 1000));
        // right mate span would exceed the window
        assert!(!builder.accepts(&pair(1500, 1549, 6200, 6249), 1000));
    }

    #[test]
    fn test_compare_ranges() {
        let cluster = fixture_cluster();
        let left_middle = (140189108 - 140188227) / 2 + 140188227;
        let (cls, cle, _, _) = cluster.compare_ranges();
        assert_eq!(cls, left_middle - 1000);
        assert_eq!(cle, left_middle + 1000);
    }
}
