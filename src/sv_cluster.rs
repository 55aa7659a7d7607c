//! Unification of discordant-pair and soft-clip evidence for one SV locus
//!
//! A `QsvCluster` owns at most one discordant pair cluster and any number of
//! soft-clip clusters that overlap the same locus, and resolves the numeric
//! confidence tier from the combined evidence. Once the confidence level has
//! been read for reporting the cluster is no longer mutated.
//!

use strum::Display;

use crate::discordant_pair::cluster::{DiscordantPairCluster, SvType};
use crate::discordant_pair::mate::{MutationType, OrientationCategory};
use crate::genome_ref::{ChromList, GenomeRef, get_current_flank_seq};
use crate::softclip::cluster::SoftClipCluster;

/// Padding around existing clip breakpoints when testing clip-clip overlap
const CLIP_OVERLAP_WINDOW: i64 = 50;

/// Somatic pair clusters at or below this size are germline-rescued by any
/// low-confidence normal evidence
const GERMLINE_RESCUE_SMALL_CLUSTER: usize = 20;

/// Fraction of low-confidence normal pairs above which a larger cluster is
/// germline-rescued
const GERMLINE_RESCUE_FRACTION: f64 = 0.1;

/// Confidence tiers for a called SV
///
/// Tiers 1-3 are SV calls of decreasing evidence, 4 is potential germline,
/// 5 is a potential repeat region, 6 is a single-sided clip.
///
#[derive(Clone, Copy, Debug, Display, Eq, Ord, PartialEq, PartialOrd)]
pub enum ConfidenceLevel {
    #[strum(serialize = "1")]
    High,
    #[strum(serialize = "2")]
    Mid,
    #[strum(serialize = "3")]
    Low,
    #[strum(serialize = "4")]
    Germline,
    #[strum(serialize = "5")]
    Repeat,
    #[strum(serialize = "6")]
    SingleClip,
}

/// A structural variant candidate with merged evidence
///
#[derive(Debug)]
pub struct QsvCluster {
    pair_record: Option<DiscordantPairCluster>,
    clip_records: Vec<SoftClipCluster>,
    germline: bool,
    pub sample_id: String,
    pub sv_id: Option<String>,
    left_reference: String,
    right_reference: String,
    left_reference_flank: String,
    right_reference_flank: String,
}

impl QsvCluster {
    pub fn from_pair_cluster(cluster: DiscordantPairCluster, sample_id: &str) -> Self {
        let germline = match cluster.sv_type {
            SvType::Germline => true,
            SvType::Somatic | SvType::NormalGermline => false,
        };
        Self {
            germline,
            sample_id: sample_id.to_string(),
            sv_id: None,
            left_reference: cluster.left_reference.clone(),
            right_reference: cluster.right_reference.clone(),
            left_reference_flank: String::new(),
            right_reference_flank: String::new(),
            pair_record: Some(cluster),
            clip_records: Vec::new(),
        }
    }

    pub fn from_clip_cluster(mut clip: SoftClipCluster, sample_id: &str) -> Self {
        clip.check_order();
        Self {
            germline: clip.is_germline(),
            sample_id: sample_id.to_string(),
            sv_id: None,
            left_reference: clip.left_reference().to_string(),
            right_reference: clip.right_reference().to_string(),
            left_reference_flank: String::new(),
            right_reference_flank: String::new(),
            pair_record: None,
            clip_records: vec![clip],
        }
    }

    pub fn pair_record(&self) -> Option<&DiscordantPairCluster> {
        self.pair_record.as_ref()
    }

    pub fn clip_records(&self) -> &[SoftClipCluster] {
        &self.clip_records
    }

    pub fn has_soft_clip_evidence(&self) -> bool {
        !self.clip_records.is_empty()
    }

    pub fn is_germline(&self) -> bool {
        self.germline
    }

    pub fn left_reference(&self) -> &str {
        &self.left_reference
    }

    pub fn right_reference(&self) -> &str {
        &self.right_reference
    }

    /// Test coordinate overlap between this record's pair cluster boundaries
    /// and a candidate clip cluster's breakpoints, absorbing the clip cluster
    /// on success
    ///
    pub fn find_cluster_overlap(&mut self, clip: &mut SoftClipCluster) -> bool {
        let Some(pair) = &self.pair_record else {
            return false;
        };
        clip.check_order();

        let refs_match = (clip.left_reference() == pair.left_reference
            && clip.right_reference() == pair.right_reference)
            || (clip.left_reference() == pair.right_reference
                && clip.right_reference() == pair.left_reference);
        if !refs_match {
            return false;
        }
        if !(pair.get_overlap(true, clip.left_position())
            && pair.get_overlap(false, clip.right_position()))
        {
            return false;
        }

        // a double-sided clip must also agree on the predicted event shape
        if clip.has_matching_breakpoints()
            && clip.mutation_type() != pair.mutation_type()
            && clip.orientation_category() != pair.orientation_category()
        {
            return false;
        }

        if clip.is_germline() {
            self.germline = true;
        }
        self.clip_records.push(clip.clone());
        true
    }

    /// Test whether a clip cluster's breakpoints fall within the window
    /// around the clip records already attached, absorbing it on success
    ///
    pub fn find_clip_overlap(&mut self, clip: &mut SoftClipCluster) -> bool {
        let Some(first) = self.clip_records.first() else {
            return false;
        };

        let mut left_min = first.left_position();
        let mut left_max = first.left_position();
        let mut right_min = first.right_position();
        let mut right_max = first.right_position();
        for existing in self.clip_records.iter().skip(1) {
            if clip.mutation_type() != existing.mutation_type()
                && clip.orientation_category() != existing.orientation_category()
            {
                return false;
            }
            left_min = left_min.min(existing.left_position());
            left_max = left_max.max(existing.left_position());
            right_min = right_min.min(existing.right_position());
            right_max = right_max.max(existing.right_position());
        }

        let left_ok = clip.left_position() >= left_min - CLIP_OVERLAP_WINDOW
            && clip.left_position() <= left_max + CLIP_OVERLAP_WINDOW;
        let right_ok = clip.right_position() >= right_min - CLIP_OVERLAP_WINDOW
            && clip.right_position() <= right_max + CLIP_OVERLAP_WINDOW;
        if !(left_ok && right_ok) {
            return false;
        }

        if clip.is_germline() {
            self.germline = true;
        }
        self.clip_records.push(clip.clone());
        true
    }

    /// The most representative clip cluster: double-sided first, then highest
    /// clip count
    ///
    pub fn primary_soft_clip_cluster(&self) -> Option<&SoftClipCluster> {
        if self.clip_records.len() <= 1 {
            return self.clip_records.first();
        }
        let double_sided = self
            .clip_records
            .iter()
            .filter(|c| c.has_matching_breakpoints())
            .collect::<Vec<_>>();
        let pool: Vec<&SoftClipCluster> = if double_sided.is_empty() {
            self.clip_records.iter().collect()
        } else {
            double_sided
        };
        pool.into_iter()
            .max_by_key(|c| c.clip_count(true, true) + c.clip_count(true, false))
    }

    /// True when the representative clip cluster carries real clip evidence
    /// on both sides
    fn has_matching_breakpoints(&self) -> bool {
        self.primary_soft_clip_cluster()
            .map(|c| c.find_matching_breakpoints())
            .unwrap_or(false)
    }

    fn is_potential_split_read(&self) -> bool {
        self.primary_soft_clip_cluster()
            .map(|c| c.is_potential_split_read())
            .unwrap_or(false)
    }

    fn is_potential_repeat(&self) -> bool {
        self.clip_records.iter().any(|c| c.is_potential_repeat())
    }

    /// Germline rescue: a pair-count-starved somatic call with low-confidence
    /// normal support resolves as potential germline
    ///
    pub fn is_potential_germline(&self) -> bool {
        let Some(pair) = &self.pair_record else {
            return false;
        };
        let low_confidence = pair.low_confidence_normal_mate_pairs;
        let pair_count = pair.pairs().len();
        if low_confidence == 0 || pair_count == 0 {
            return false;
        }
        pair_count <= GERMLINE_RESCUE_SMALL_CLUSTER
            || (low_confidence as f64 / pair_count as f64) > GERMLINE_RESCUE_FRACTION
    }

    /// Resolve the confidence tier for this SV from the evidence on hand
    ///
    pub fn get_confidence_level(&self) -> ConfidenceLevel {
        if self.is_potential_germline() {
            return ConfidenceLevel::Germline;
        }
        if self.is_potential_repeat() {
            return ConfidenceLevel::Repeat;
        }

        let split_read = self.is_potential_split_read();
        match (self.pair_record.is_some(), !self.clip_records.is_empty()) {
            (true, true) => {
                if self.has_matching_breakpoints() {
                    if split_read {
                        ConfidenceLevel::High
                    } else {
                        ConfidenceLevel::Mid
                    }
                } else if split_read {
                    ConfidenceLevel::Mid
                } else {
                    ConfidenceLevel::Low
                }
            }
            (true, false) => ConfidenceLevel::Low,
            (false, _) => {
                if self.has_matching_breakpoints() {
                    if split_read {
                        ConfidenceLevel::Mid
                    } else {
                        ConfidenceLevel::Low
                    }
                } else if split_read {
                    ConfidenceLevel::Low
                } else {
                    ConfidenceLevel::SingleClip
                }
            }
        }
    }

    /// Whether only a single clip side supports this record
    pub fn single_sided_clip(&self) -> bool {
        if self.pair_record.is_some() {
            return false;
        }
        !self.has_matching_breakpoints()
    }

    pub fn orientation_category(&self) -> Option<OrientationCategory> {
        if let Some(pair) = &self.pair_record {
            if let Some(cat) = pair.orientation_category() {
                return Some(cat);
            }
        }
        self.primary_soft_clip_cluster()
            .filter(|c| c.has_matching_breakpoints())
            .and_then(|c| c.orientation_category())
    }

    pub fn mutation_type(&self) -> MutationType {
        match (&self.pair_record, self.primary_soft_clip_cluster()) {
            (Some(pair), _) => pair.mutation_type(),
            (None, Some(clip)) => clip.mutation_type(),
            (None, None) => MutationType::Itx,
        }
    }

    /// Left breakpoint of the merged record; clip evidence is preferred over
    /// the coarser pair-range estimate
    pub fn left_breakpoint(&self) -> i64 {
        match self.primary_soft_clip_cluster() {
            Some(clip) => clip.left_position(),
            None => self
                .pair_record
                .as_ref()
                .map(|p| p.left_breakpoint())
                .unwrap_or(0),
        }
    }

    pub fn right_breakpoint(&self) -> i64 {
        match self.primary_soft_clip_cluster() {
            Some(clip) => clip.right_position(),
            None => self
                .pair_record
                .as_ref()
                .map(|p| p.right_breakpoint())
                .unwrap_or(0),
        }
    }

    /// Final breakpoints for reporting; category-2 events swap sides
    pub fn final_left_breakpoint(&self) -> i64 {
        if self.orientation_category() == Some(OrientationCategory::Cat2) {
            self.right_breakpoint()
        } else {
            self.left_breakpoint()
        }
    }

    pub fn final_right_breakpoint(&self) -> i64 {
        if self.orientation_category() == Some(OrientationCategory::Cat2) {
            self.left_breakpoint()
        } else {
            self.right_breakpoint()
        }
    }

    pub fn passes_min_insert_size(&self, min_insert_size: i64) -> bool {
        if self.left_reference == self.right_reference {
            (self.right_breakpoint() - self.left_breakpoint()).abs() >= min_insert_size
        } else {
            true
        }
    }

    /// Retrieve the flanking reference sequence around each breakpoint for
    /// probe design, if not already present
    ///
    pub fn check_reference_flank(&mut self, genome_ref: &GenomeRef, chrom_list: &ChromList) {
        if self.germline {
            return;
        }
        if !self.left_reference_flank.is_empty() || !self.right_reference_flank.is_empty() {
            return;
        }
        if let Some(chromosome) = chrom_list.get(&self.left_reference) {
            self.left_reference_flank =
                get_current_flank_seq(genome_ref, chromosome, self.left_breakpoint());
        }
        if let Some(chromosome) = chrom_list.get(&self.right_reference) {
            self.right_reference_flank =
                get_current_flank_seq(genome_ref, chromosome, self.right_breakpoint());
        }
    }

    pub fn reference_flanks(&self) -> (&str, &str) {
        (&self.left_reference_flank, &self.right_reference_flank)
    }

    /// Whether this record appears in the results under the configured
    /// single-sided reporting policy
    ///
    pub fn print_record(&self, single_sided: bool) -> bool {
        if single_sided {
            return true;
        }
        match self.get_confidence_level() {
            ConfidenceLevel::SingleClip => false,
            ConfidenceLevel::High | ConfidenceLevel::Mid | ConfidenceLevel::Low => true,
            _ => !(self.single_sided_clip() && !self.is_potential_split_read()),
        }
    }
}
