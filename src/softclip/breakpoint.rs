//! Breakpoint consensus from soft-clip evidence
//!
//! Clips sharing an exact genomic position aggregate into a `Breakpoint`,
//! which builds a majority-vote consensus of the clipped overhang, votes on
//! the dominant strand, and may later resolve its unobserved mate location by
//! realigning the consensus with the external aligner.
//!

use log::debug;
use simple_error::SimpleResult;

use super::clip::{BASE_COLUMN_COUNT, BaseCountMatrix, Clip, ClipSide, SplitRead, Strand};
use crate::aligner::{AlignerClient, AlignmentQuery, AlignmentRecord, MateAlignment};
use crate::utils::{high_n_count, reference_key, rev_comp};

/// Maximum fraction of N calls tolerated in a clip consensus
const MAX_CONSENSUS_N_FRACTION: f64 = 0.1;

/// Same-strand clip count from which an unalignable breakpoint is still worth
/// reporting as low-confidence evidence
const LOW_CONFIDENCE_CLIP_COUNT: usize = 10;

/// Cap on split reads carried per breakpoint
const MAX_SPLIT_READS: usize = 1000;

/// A split-read position bucket larger than this marks the locus as a
/// potential repeat region
const POTENTIAL_REPEAT_SPLIT_READS: usize = 10_000;

/// Window around the mate location within which two breakpoints corroborate
/// each other
const MATE_MATCH_WINDOW: i64 = 10;

/// Consensus sequences derived from the clip base-count matrix
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsensusRead {
    /// Majority-vote consensus of the clipped overhang
    pub clip_sequence: String,

    /// Majority-vote consensus of the reference-matching anchor
    pub anchor_sequence: String,
}

impl ConsensusRead {
    /// Full junction-crossing sequence in reference orientation
    pub fn complete_sequence(&self, side: ClipSide) -> String {
        match side {
            ClipSide::Left => format!("{}{}", self.clip_sequence, self.anchor_sequence),
            ClipSide::Right => format!("{}{}", self.anchor_sequence, self.clip_sequence),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Breakpoint {
    position: i64,
    reference: String,
    side: ClipSide,
    min_consensus_length: usize,
    min_insert_size: i64,
    germline: bool,
    tumour_clips: Vec<Clip>,
    normal_clips: Vec<Clip>,
    tumour_split_reads: Vec<SplitRead>,
    normal_split_reads: Vec<SplitRead>,
    potential_repeat: bool,
    strand: Strand,
    pos_strand_count: usize,
    neg_strand_count: usize,
    consensus: Option<ConsensusRead>,
    mate: Option<MateAlignment>,
    reference_key: Option<String>,
}

impl Breakpoint {
    pub fn new(
        position: i64,
        reference: &str,
        side: ClipSide,
        min_consensus_length: usize,
        min_insert_size: i64,
    ) -> Self {
        Self {
            position,
            reference: reference.to_string(),
            side,
            min_consensus_length,
            min_insert_size,
            germline: false,
            tumour_clips: Vec::new(),
            normal_clips: Vec::new(),
            tumour_split_reads: Vec::new(),
            normal_split_reads: Vec::new(),
            potential_repeat: false,
            strand: Strand::Forward,
            pos_strand_count: 0,
            neg_strand_count: 0,
            consensus: None,
            mate: None,
            reference_key: None,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn side(&self) -> ClipSide {
        self.side
    }

    pub fn is_left(&self) -> bool {
        self.side == ClipSide::Left
    }

    pub fn is_germline(&self) -> bool {
        self.germline
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn mate(&self) -> Option<&MateAlignment> {
        self.mate.as_ref()
    }

    pub fn mate_strand(&self) -> Option<Strand> {
        self.mate.as_ref().map(|m| {
            if m.positive_strand {
                Strand::Forward
            } else {
                Strand::Reverse
            }
        })
    }

    pub fn matching_strands(&self) -> bool {
        match &self.mate {
            Some(m) => (self.strand == Strand::Forward) == m.positive_strand,
            None => false,
        }
    }

    pub fn get_reference_key(&self) -> Option<&str> {
        self.reference_key.as_deref()
    }

    pub fn name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.reference, self.position, self.side, self.strand
        )
    }

    pub fn type_label(&self) -> &'static str {
        if self.germline { "germline" } else { "somatic" }
    }

    pub fn tumour_clips(&self) -> &[Clip] {
        &self.tumour_clips
    }

    pub fn normal_clips(&self) -> &[Clip] {
        &self.normal_clips
    }

    /// Supporting clip count; normal clips only count for germline breakpoints
    pub fn clip_count(&self) -> usize {
        self.tumour_clips.len() + if self.germline { self.normal_clips.len() } else { 0 }
    }

    pub fn split_read_count(&self) -> usize {
        self.tumour_split_reads.len() + self.normal_split_reads.len()
    }

    pub fn is_potential_repeat(&self) -> bool {
        self.potential_repeat
    }

    pub fn add_tumour_clip(&mut self, clip: Clip) {
        if !self.tumour_clips.iter().any(|c| c.read_name == clip.read_name) {
            self.tumour_clips.push(clip);
        }
    }

    pub fn add_normal_clip(&mut self, clip: Clip) {
        if !self.normal_clips.iter().any(|c| c.read_name == clip.read_name) {
            self.normal_clips.push(clip);
        }
    }

    /// Attach the split reads observed near this breakpoint position
    ///
    /// The retained set is capped; an oversized bucket marks a potential
    /// repeat region instead of drowning the consensus step.
    ///
    pub fn attach_split_reads<'a>(&mut self, split_reads: impl Iterator<Item = &'a SplitRead>) {
        let mut offered = 0;
        for split in split_reads {
            offered += 1;
            if self.split_read_count() < MAX_SPLIT_READS {
                if split.is_tumour {
                    self.tumour_split_reads.push(split.clone());
                } else if self.germline || !self.normal_clips.is_empty() {
                    self.normal_split_reads.push(split.clone());
                }
            }
        }
        if offered > POTENTIAL_REPEAT_SPLIT_READS {
            debug!(
                "Large number ({offered}) of split reads for breakpoint {}",
                self.name()
            );
            self.potential_repeat = true;
        }
    }

    /// Absorb another breakpoint's evidence during window amalgamation
    ///
    pub fn merge(&mut self, other: Breakpoint) {
        for clip in other.tumour_clips {
            self.add_tumour_clip(clip);
        }
        for clip in other.normal_clips {
            self.add_normal_clip(clip);
        }
        self.tumour_split_reads.extend(other.tumour_split_reads);
        self.normal_split_reads.extend(other.normal_split_reads);
        self.tumour_split_reads.truncate(MAX_SPLIT_READS);
        self.normal_split_reads.truncate(MAX_SPLIT_READS);
        self.potential_repeat |= other.potential_repeat;
    }

    /// Majority vote across all contributing clips' strands
    ///
    /// An exact tie resolves to the forward strand.
    ///
    fn calculate_strand(&mut self) {
        let germline = self.germline;
        let mut pos_count = 0;
        let mut neg_count = 0;
        for clip in self
            .tumour_clips
            .iter()
            .chain(self.normal_clips.iter().filter(|_| germline))
        {
            match clip.strand {
                Strand::Forward => pos_count += 1,
                Strand::Reverse => neg_count += 1,
            }
        }
        self.pos_strand_count = pos_count;
        self.neg_strand_count = neg_count;
        self.strand = if pos_count >= neg_count {
            Strand::Forward
        } else {
            Strand::Reverse
        };
    }

    fn dominant_strand_count(&self) -> usize {
        match self.strand {
            Strand::Forward => self.pos_strand_count,
            Strand::Reverse => self.neg_strand_count,
        }
    }

    /// Fix this breakpoint as usable evidence if it passes the clip-count and
    /// consensus-quality filters
    ///
    /// Not an error when the filters fail: the breakpoint is simply not
    /// emitted.
    ///
    pub fn define_breakpoint(&mut self, min_clip_count: usize, is_rescue: bool) -> bool {
        if self.tumour_clips.len() < min_clip_count {
            return false;
        }
        self.germline = !self.normal_clips.is_empty();
        self.calculate_strand();
        if self.dominant_strand_count() < min_clip_count && !is_rescue {
            return false;
        }

        self.consensus = self.calculate_clip_consensus();
        match &self.consensus {
            None => false,
            Some(consensus) => {
                consensus.clip_sequence.len() >= self.min_consensus_length
                    && !high_n_count(&consensus.clip_sequence, MAX_CONSENSUS_N_FRACTION)
            }
        }
    }

    /// Build the overhang and anchor consensus from the dominant-strand clips
    ///
    fn calculate_clip_consensus(&self) -> Option<ConsensusRead> {
        let clips = || {
            self.tumour_clips
                .iter()
                .chain(self.normal_clips.iter().filter(|_| self.germline))
                .filter(|c| c.strand == self.strand)
        };

        let clip_len = clips().map(|c| c.clip_sequence.len()).max()?;
        let anchor_len = clips().map(|c| c.reference_sequence.len()).max()?;
        if clip_len == 0 {
            return None;
        }

        let mut clip_bases: BaseCountMatrix = vec![[0; BASE_COLUMN_COUNT]; clip_len];
        let mut anchor_bases: BaseCountMatrix = vec![[0; BASE_COLUMN_COUNT]; anchor_len];
        for clip in clips() {
            clip.add_clip_bases(&mut clip_bases);
            clip.add_reference_bases(&mut anchor_bases);
        }

        let mut clip_sequence = get_base_count_string(&clip_bases);
        let mut anchor_sequence = get_base_count_string(&anchor_bases);
        if self.strand == Strand::Reverse {
            clip_sequence = rev_comp(&clip_sequence);
            anchor_sequence = rev_comp(&anchor_sequence);
        }

        Some(ConsensusRead {
            clip_sequence,
            anchor_sequence,
        })
    }

    pub fn consensus(&self) -> Option<&ConsensusRead> {
        self.consensus.as_ref()
    }

    /// Consensus sequence used to search for the unobserved mate location
    pub fn mate_consensus(&self) -> Option<&str> {
        self.consensus.as_ref().map(|c| c.clip_sequence.as_str())
    }

    /// Whether the mate location on the same chromosome is too close to call
    /// a structural variant
    fn below_min_insert_size(&self, mate_reference: &str, mate_breakpoint: i64) -> bool {
        self.reference == mate_reference
            && (self.position - mate_breakpoint).abs() <= self.min_insert_size
    }

    /// Accept an external alignment of the consensus as the mate location
    ///
    /// The reference key is canonicalized so that symmetric grouping works
    /// regardless of which side was observed.
    ///
    pub fn find_mate_breakpoint(&mut self, record: &AlignmentRecord) -> bool {
        let Some(mate) = record.calculate_mate_breakpoint(self.is_left()) else {
            return false;
        };
        if self.below_min_insert_size(&mate.reference, mate.breakpoint) {
            return false;
        }
        self.reference_key = Some(reference_key(&self.reference, &mate.reference));
        self.mate = Some(mate);
        true
    }

    /// Germline-rescue path: re-invoke the aligner directly from the
    /// in-memory consensus when the primary pass found no mate
    ///
    /// Retried at most once per breakpoint; an aligner no-match leaves the
    /// breakpoint unresolved rather than failing the run.
    ///
    pub fn find_rescued_mate_breakpoint(
        &mut self,
        aligner: &dyn AlignerClient,
    ) -> SimpleResult<bool> {
        let Some(consensus) = self.mate_consensus() else {
            return Ok(false);
        };
        let query = AlignmentQuery {
            name: self.name(),
            sequence: consensus.to_string(),
        };
        let records = aligner.align_sequences(&[query])?;
        match records.get(&self.name()) {
            Some(record) => Ok(self.find_mate_breakpoint(record)),
            None => Ok(false),
        }
    }

    /// Whether a query location corroborates this breakpoint's mate location
    ///
    pub fn mate_matches(&self, query_reference: &str, query_breakpoint: i64) -> bool {
        match &self.mate {
            Some(mate) => {
                mate.reference == query_reference
                    && (query_breakpoint - mate.breakpoint).abs() <= MATE_MATCH_WINDOW
            }
            None => false,
        }
    }

    /// Unalignable breakpoints with this much clip support still surface in
    /// the low-confidence report
    pub fn is_non_aligned_reportable(&self) -> bool {
        self.pos_strand_count >= LOW_CONFIDENCE_CLIP_COUNT
            || self.neg_strand_count >= LOW_CONFIDENCE_CLIP_COUNT
    }

    pub fn to_low_confidence_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.reference,
            self.position,
            self.type_label(),
            self.side,
            self.strand,
            self.pos_strand_count,
            self.neg_strand_count,
            self.mate_consensus().unwrap_or("")
        )
    }
}

/// Column-wise majority vote over a base-count matrix
///
/// The base with the strictly highest count wins a column; equal top counts
/// across two or more bases yield 'N'; a column with no observations is
/// dropped.
///
pub fn get_base_count_string(bases: &BaseCountMatrix) -> String {
    const BASE_CHARS: [char; BASE_COLUMN_COUNT] = ['A', 'C', 'T', 'G', 'N'];
    let mut consensus = String::with_capacity(bases.len());
    for column in bases {
        let max = *column.iter().max().unwrap();
        if max == 0 {
            continue;
        }
        let winners = column.iter().filter(|&&count| count == max).count();
        if winners > 1 {
            consensus.push('N');
        } else {
            let winner = column.iter().position(|&count| count == max).unwrap();
            consensus.push(BASE_CHARS[winner]);
        }
    }
    consensus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left_clip(read_name: &str, strand: &str, clip_seq: &str) -> Clip {
        Clip::from_line(&format!(
            "{read_name},chr7,100,{strand},left,{clip_seq}ACGTA,ACGTA,{clip_seq}"
        ))
        .unwrap()
    }

    fn defined_breakpoint(clip_seqs: &[&str]) -> Breakpoint {
        let mut bp = Breakpoint::new(100, "chr7", ClipSide::Left, 4, 50);
        for (i, seq) in clip_seqs.iter().enumerate() {
            bp.add_tumour_clip(left_clip(&format!("r{i}"), "+", seq));
        }
        assert!(bp.define_breakpoint(3, false));
        bp
    }

    #[test]
    fn test_consensus_uniform_column() {
        let bp = defined_breakpoint(&["AGGTT", "AGGTT", "AGGTT"]);
        assert_eq!(bp.mate_consensus(), Some("AGGTT"));
    }

    #[test]
    fn test_consensus_tie_yields_n() {
        // column 0 splits 2/2 between A and C once right-aligned
        let bp = defined_breakpoint(&["AGGTT", "AGGTT", "CGGTT", "CGGTT"]);
        assert_eq!(bp.mate_consensus(), Some("NGGTT"));
    }

    #[test]
    fn test_strand_vote_tie_prefers_forward() {
        let mut bp = Breakpoint::new(100, "chr7", ClipSide::Left, 4, 50);
        bp.add_tumour_clip(left_clip("r1", "+", "AGGTT"));
        bp.add_tumour_clip(left_clip("r2", "-", "AGGTT"));
        bp.add_tumour_clip(left_clip("r3", "+", "AGGTT"));
        bp.add_tumour_clip(left_clip("r4", "-", "AGGTT"));
        assert!(bp.define_breakpoint(2, false));
        assert_eq!(bp.strand(), Strand::Forward);
    }

    #[test]
    fn test_insufficient_clip_count_rejected() {
        let mut bp = Breakpoint::new(100, "chr7", ClipSide::Left, 4, 50);
        bp.add_tumour_clip(left_clip("r1", "+", "AGGTT"));
        assert!(!bp.define_breakpoint(3, false));
    }

    #[test]
    fn test_short_consensus_rejected() {
        let mut bp = Breakpoint::new(100, "chr7", ClipSide::Left, 10, 50);
        for i in 0..3 {
            bp.add_tumour_clip(left_clip(&format!("r{i}"), "+", "AGGTT"));
        }
        assert!(!bp.define_breakpoint(3, false));
    }

    #[test]
    fn test_germline_flag_from_normal_clips() {
        let mut bp = Breakpoint::new(100, "chr7", ClipSide::Left, 4, 50);
        for i in 0..3 {
            bp.add_tumour_clip(left_clip(&format!("r{i}"), "+", "AGGTT"));
        }
        bp.add_normal_clip(left_clip("n1", "+", "AGGTT"));
        assert!(bp.define_breakpoint(3, false));
        assert!(bp.is_germline());
        assert_eq!(bp.clip_count(), 4);
    }

    #[test]
    fn test_mate_breakpoint_from_alignment() {
        let mut bp = defined_breakpoint(&["AGGTT", "AGGTT", "AGGTT"]);
        let record = AlignmentRecord::from_line(
            "5\t0\t0\t0\t0\t0\t0\t0\t+\tname\t5\t0\t5\tchr2\t1000000\t5000\t5005\t1\t5,\t0,\t5000,",
        )
        .unwrap();
        assert!(bp.find_mate_breakpoint(&record));
        assert_eq!(bp.mate().unwrap().reference, "chr2");
        // key is canonical: chr2 sorts before chr7
        assert_eq!(bp.get_reference_key(), Some("chr2:chr7"));
    }

    #[test]
    fn test_mate_below_min_insert_size_rejected() {
        let mut bp = defined_breakpoint(&["AGGTT", "AGGTT", "AGGTT"]);
        let record = AlignmentRecord::from_line(
            "5\t0\t0\t0\t0\t0\t0\t0\t+\tname\t5\t0\t5\tchr7\t1000000\t120\t125\t1\t5,\t0,\t120,",
        )
        .unwrap();
        assert!(!bp.find_mate_breakpoint(&record));
        assert!(bp.mate().is_none());
    }

    #[test]
    fn test_base_count_string_drops_empty_columns() {
        let mut bases: BaseCountMatrix = vec![[0; BASE_COLUMN_COUNT]; 3];
        bases[0][0] = 2;
        // column 1 left empty
        bases[2][3] = 1;
        assert_eq!(get_base_count_string(&bases), "AG");
    }
}
