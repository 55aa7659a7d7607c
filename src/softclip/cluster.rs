//! Two-sided soft-clip SV candidates
//!
//! A `SoftClipCluster` pairs two `Breakpoint`s into a double-sided candidate,
//! or holds a single orphan breakpoint whose far side is only inferred from
//! its resolved mate location. Mutation type is a pure function of the
//! left/right and strand flags of the owned breakpoints.
//!

use super::breakpoint::Breakpoint;
use super::clip::Strand;
use crate::discordant_pair::mate::{MutationType, OrientationCategory};
use crate::utils::reorder_by_chromosomes;

/// Soft-clip evidence for one SV candidate
///
/// Invariant: every owned breakpoint has a resolved mate location; breakpoints
/// that never aligned to a mate stay out of cluster building entirely.
///
#[derive(Clone, Debug)]
pub struct SoftClipCluster {
    name: String,
    left_breakpoint: Option<Breakpoint>,
    right_breakpoint: Option<Breakpoint>,

    left_reference: String,
    right_reference: String,
    left_position: i64,
    right_position: i64,
    left_strand: Strand,
    right_strand: Strand,

    one_side: bool,
    has_matching_breakpoints: bool,
    mutation_type: MutationType,
    orientation_category: Option<OrientationCategory>,

    has_cluster_match: bool,
    has_clip_match: bool,
}

impl SoftClipCluster {
    pub fn from_single(breakpoint: Breakpoint) -> Self {
        assert!(breakpoint.mate().is_some());
        let name = breakpoint.name();
        let mut cluster = Self {
            name,
            left_breakpoint: Some(breakpoint),
            right_breakpoint: None,
            left_reference: String::new(),
            right_reference: String::new(),
            left_position: 0,
            right_position: 0,
            left_strand: Strand::Forward,
            right_strand: Strand::Forward,
            one_side: true,
            has_matching_breakpoints: false,
            mutation_type: MutationType::Itx,
            orientation_category: None,
            has_cluster_match: false,
            has_clip_match: false,
        };
        cluster.set_start_and_end();
        cluster.mutation_type = cluster.define_mutation_type();
        cluster
    }

    pub fn from_pair(first: Breakpoint, second: Breakpoint) -> Self {
        assert!(first.mate().is_some() && second.mate().is_some());
        let name = if first.name() > second.name() {
            format!("{}:{}", second.name(), first.name())
        } else {
            format!("{}:{}", first.name(), second.name())
        };
        let mut cluster = Self {
            name,
            left_breakpoint: Some(first),
            right_breakpoint: Some(second),
            left_reference: String::new(),
            right_reference: String::new(),
            left_position: 0,
            right_position: 0,
            left_strand: Strand::Forward,
            right_strand: Strand::Forward,
            one_side: false,
            has_matching_breakpoints: true,
            mutation_type: MutationType::Itx,
            orientation_category: None,
            has_cluster_match: false,
            has_clip_match: false,
        };
        cluster.one_side = cluster
            .left_breakpoint
            .as_ref()
            .map(|b| b.clip_count() == 0)
            .unwrap_or(false)
            || cluster
                .right_breakpoint
                .as_ref()
                .map(|b| b.clip_count() == 0)
                .unwrap_or(false);
        cluster.set_start_and_end();
        cluster.mutation_type = cluster.define_mutation_type();
        cluster
    }

    /// Refresh the derived left/right fields, falling back to an orphan
    /// breakpoint's own mate fields when only one side is present
    ///
    fn set_start_and_end(&mut self) {
        match (&self.left_breakpoint, &self.right_breakpoint) {
            (None, Some(right)) => {
                let mate = right.mate().unwrap();
                self.left_position = mate.breakpoint;
                self.left_reference = mate.reference.clone();
                self.left_strand = right.mate_strand().unwrap();
                self.right_position = right.position();
                self.right_reference = right.reference().to_string();
                self.right_strand = right.strand();
            }
            (Some(left), None) => {
                let mate = left.mate().unwrap();
                self.left_position = left.position();
                self.left_reference = left.reference().to_string();
                self.left_strand = left.strand();
                self.right_position = mate.breakpoint;
                self.right_reference = mate.reference.clone();
                self.right_strand = left.mate_strand().unwrap();
            }
            (Some(left), Some(right)) => {
                self.left_position = left.position();
                self.left_reference = left.reference().to_string();
                self.left_strand = left.strand();
                self.right_position = right.position();
                self.right_reference = right.reference().to_string();
                self.right_strand = right.strand();
            }
            (None, None) => unreachable!("cluster with no breakpoints"),
        }
    }

    /// Canonicalize breakpoint order by chromosome, then position
    pub fn check_order(&mut self) {
        let swap = if self.left_reference == self.right_reference {
            self.left_position > self.right_position
        } else {
            reorder_by_chromosomes(&self.left_reference, &self.right_reference)
        };
        if swap {
            self.swap_breakpoints();
        }
    }

    fn swap_breakpoints(&mut self) {
        if self.right_breakpoint.is_some() {
            std::mem::swap(&mut self.left_breakpoint, &mut self.right_breakpoint);
        } else {
            self.right_breakpoint = self.left_breakpoint.take();
        }
        self.set_start_and_end();
    }

    /// Infer the mutation class from the left/right and strand flags
    ///
    pub fn define_mutation_type(&mut self) -> MutationType {
        self.check_order();
        if self.one_side {
            if self.left_reference != self.right_reference {
                return MutationType::Ctx;
            }
            if let Some(mutation_type) = self.single_side_mutation_type() {
                self.orientation_category = None;
                return mutation_type;
            }
        }
        self.two_sided_mutation_type()
    }

    fn single_side_mutation_type(&self) -> Option<MutationType> {
        let bp = self.single_breakpoint()?;
        if !bp.matching_strands() {
            return Some(MutationType::Itx);
        }
        let mate_position = bp.mate().unwrap().breakpoint;
        Some(if bp.is_left() == (bp.position() < mate_position) {
            MutationType::DupInsItx
        } else {
            MutationType::DelItx
        })
    }

    fn two_sided_mutation_type(&mut self) -> MutationType {
        let (left_is_left, left_strands_match) = match &self.left_breakpoint {
            Some(bp) => (bp.is_left(), bp.matching_strands()),
            None => return MutationType::Itx,
        };
        let (right_is_left, right_strands_match) = match &self.right_breakpoint {
            Some(bp) => (bp.is_left(), bp.matching_strands()),
            None => return MutationType::Itx,
        };
        let same_reference = self.left_reference == self.right_reference;
        let strands_consistent = left_strands_match && right_strands_match;
        let strands_inverted = !left_strands_match && !right_strands_match;

        if !left_is_left && right_is_left {
            if strands_consistent {
                self.orientation_category = Some(OrientationCategory::Cat1);
                return if same_reference {
                    MutationType::DelItx
                } else {
                    MutationType::Ctx
                };
            }
        } else if left_is_left && !right_is_left {
            if strands_consistent {
                self.orientation_category = Some(OrientationCategory::Cat2);
                return if same_reference {
                    MutationType::DupInsItx
                } else {
                    MutationType::Ctx
                };
            }
        } else if strands_inverted {
            self.orientation_category = if left_is_left {
                Some(OrientationCategory::Cat4)
            } else {
                Some(OrientationCategory::Cat3)
            };
            return if same_reference {
                MutationType::InvItx
            } else {
                MutationType::Ctx
            };
        }
        MutationType::Itx
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mutation_type(&self) -> MutationType {
        self.mutation_type
    }

    pub fn orientation_category(&self) -> Option<OrientationCategory> {
        self.orientation_category
    }

    pub fn is_one_side(&self) -> bool {
        self.one_side
    }

    pub fn has_matching_breakpoints(&self) -> bool {
        self.has_matching_breakpoints
    }

    /// True when both sides carry real clip evidence
    pub fn find_matching_breakpoints(&self) -> bool {
        matches!(
            (&self.left_breakpoint, &self.right_breakpoint),
            (Some(left), Some(right)) if left.clip_count() > 0 && right.clip_count() > 0
        )
    }

    pub fn left_reference(&self) -> &str {
        &self.left_reference
    }

    pub fn right_reference(&self) -> &str {
        &self.right_reference
    }

    pub fn left_position(&self) -> i64 {
        self.left_position
    }

    pub fn right_position(&self) -> i64 {
        self.right_position
    }

    pub fn is_germline(&self) -> bool {
        self.left_breakpoint
            .as_ref()
            .map(|b| b.is_germline())
            .unwrap_or(false)
            || self
                .right_breakpoint
                .as_ref()
                .map(|b| b.is_germline())
                .unwrap_or(false)
    }

    /// Split-read corroboration: any owned breakpoint carries split-read
    /// evidence subsumed during amalgamation
    pub fn is_potential_split_read(&self) -> bool {
        self.split_read_count() > 0
    }

    pub fn split_read_count(&self) -> usize {
        self.left_breakpoint
            .as_ref()
            .map(|b| b.split_read_count())
            .unwrap_or(0)
            + self
                .right_breakpoint
                .as_ref()
                .map(|b| b.split_read_count())
                .unwrap_or(0)
    }

    pub fn is_potential_repeat(&self) -> bool {
        self.left_breakpoint
            .as_ref()
            .map(|b| b.is_potential_repeat())
            .unwrap_or(false)
            || self
                .right_breakpoint
                .as_ref()
                .map(|b| b.is_potential_repeat())
                .unwrap_or(false)
    }

    /// The orphan breakpoint of a single-sided cluster
    pub fn single_breakpoint(&self) -> Option<&Breakpoint> {
        match (&self.left_breakpoint, &self.right_breakpoint) {
            (Some(_), Some(_)) => None,
            (Some(left), None) => Some(left),
            (None, Some(right)) => Some(right),
            (None, None) => None,
        }
    }

    fn take_single_breakpoint(self) -> Option<Breakpoint> {
        match (self.left_breakpoint, self.right_breakpoint) {
            (Some(left), None) => Some(left),
            (None, Some(right)) => Some(right),
            _ => None,
        }
    }

    /// Test whether two single-sided clusters corroborate each other's mate
    /// locations (within the mate-match window, on swapped chromosomes)
    ///
    pub fn matches_mate_of(&self, other: &SoftClipCluster) -> bool {
        let (Some(left), Some(right)) = (self.single_breakpoint(), other.single_breakpoint())
        else {
            return false;
        };
        left.mate_matches(right.reference(), right.position())
            && right.mate_matches(left.reference(), left.position())
    }

    /// Merge two mutually-corroborating single-sided clusters into one
    /// double-sided cluster
    ///
    pub fn pair_with(self, other: SoftClipCluster) -> SoftClipCluster {
        let first = self.take_single_breakpoint().unwrap();
        let second = other.take_single_breakpoint().unwrap();
        SoftClipCluster::from_pair(first, second)
    }

    /// Clip count on one side of the event for reporting; the side mapping
    /// swaps for category-2 events
    ///
    pub fn clip_count(&self, is_tumour: bool, left_pos: bool) -> usize {
        let swapped = self.orientation_category == Some(OrientationCategory::Cat2);
        let breakpoint = if left_pos != swapped {
            &self.left_breakpoint
        } else {
            &self.right_breakpoint
        };
        match breakpoint {
            Some(bp) => {
                if is_tumour {
                    bp.tumour_clips().len()
                } else {
                    bp.normal_clips().len()
                }
            }
            None => 0,
        }
    }

    pub fn has_cluster_match(&self) -> bool {
        self.has_cluster_match
    }

    pub fn set_has_cluster_match(&mut self, value: bool) {
        self.has_cluster_match = value;
    }

    pub fn has_clip_match(&self) -> bool {
        self.has_clip_match
    }

    pub fn set_has_clip_match(&mut self, value: bool) {
        self.has_clip_match = value;
    }

    /// Junction-crossing consensus sequence of the representative side, for
    /// reporting
    pub fn contig_sequence(&self) -> Option<String> {
        let breakpoint = match (&self.left_breakpoint, &self.right_breakpoint) {
            (Some(left), _) => left,
            (None, Some(right)) => right,
            (None, None) => return None,
        };
        breakpoint
            .consensus()
            .map(|c| c.complete_sequence(breakpoint.side()))
    }
}
