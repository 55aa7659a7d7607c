//! Single-end and paired alignment summaries with derived pairing classification
//!

use simple_error::{SimpleResult, bail, try_with};
use strum::{Display, EnumIter, EnumString};

use crate::utils::reorder_by_chromosomes;

/// SAM flag bits needed to reconstruct the pair order token
const FLAG_REVERSE: u16 = 0x10;
const FLAG_MATE_REVERSE: u16 = 0x20;
const FLAG_SECOND_OF_PAIR: u16 = 0x80;

/// Sequencing platform, which selects the pair-order to orientation-category
/// mapping used for discordant pair clusters
///
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, clap::ValueEnum, serde::Serialize)]
pub enum Platform {
    /// Paired-end libraries
    #[strum(serialize = "pe")]
    #[value(name = "pe")]
    #[serde(rename = "pe")]
    PairedEnd,

    /// SOLiD-style long mate pair libraries
    #[strum(serialize = "lmp")]
    #[value(name = "lmp")]
    #[serde(rename = "lmp")]
    LongMatePair,

    /// Illumina mate pair libraries
    #[strum(serialize = "imp")]
    #[value(name = "imp")]
    #[serde(rename = "imp")]
    IlluminaMatePair,
}

/// Pairing classification of a discordant read pair (ZP-style tag)
///
/// The code summarizes the relative strand/order pattern of the two reads of a
/// pair; `Cxx` marks a cross-chromosome pair.
///
#[derive(
    Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
pub enum PairClassification {
    #[strum(serialize = "AAB")]
    Aab,
    #[strum(serialize = "AAC")]
    Aac,
    #[strum(serialize = "ABA")]
    Aba,
    #[strum(serialize = "ABB")]
    Abb,
    #[strum(serialize = "ABC")]
    Abc,
    #[strum(serialize = "BAA")]
    Baa,
    #[strum(serialize = "BAB")]
    Bab,
    #[strum(serialize = "BAC")]
    Bac,
    #[strum(serialize = "BBA")]
    Bba,
    #[strum(serialize = "BBB")]
    Bbb,
    #[strum(serialize = "BBC")]
    Bbc,
    #[strum(serialize = "Cxx")]
    Cxx,
}

impl PairClassification {
    /// Parse the on-disk tag form, which writes cross-chromosome pairs as "C**"
    pub fn from_tag(tag: &str) -> SimpleResult<Self> {
        let tag = if tag == "C**" { "Cxx" } else { tag };
        match tag.parse::<PairClassification>() {
            Ok(x) => Ok(x),
            Err(_) => bail!("unknown pair classification tag: '{tag}'"),
        }
    }
}

/// Pair classifications merged into the groups used for evidence partitioning
///
/// Inversion-signature classifications are pooled since they cluster together.
///
#[derive(Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, PartialEq)]
pub enum PairGroup {
    #[strum(serialize = "AAB")]
    Aab,
    #[strum(serialize = "AAC")]
    Aac,
    #[strum(serialize = "ABA")]
    Aba,
    #[strum(serialize = "ABB")]
    Abb,
    #[strum(serialize = "ABC")]
    Abc,
    #[strum(serialize = "BAA_BBA")]
    BaaBba,
    #[strum(serialize = "BAB_BBB")]
    BabBbb,
    #[strum(serialize = "BAC_BBC")]
    BacBbc,
    #[strum(serialize = "Cxx")]
    Cxx,
}

impl From<PairClassification> for PairGroup {
    fn from(zp: PairClassification) -> Self {
        use PairClassification::*;
        match zp {
            Aab => PairGroup::Aab,
            Aac => PairGroup::Aac,
            Aba => PairGroup::Aba,
            Abb => PairGroup::Abb,
            Abc => PairGroup::Abc,
            Baa | Bba => PairGroup::BaaBba,
            Bab | Bbb => PairGroup::BabBbb,
            Bac | Bbc => PairGroup::BacBbc,
            Cxx => PairGroup::Cxx,
        }
    }
}

impl PairGroup {
    /// The classifications pooled into this group, used as the ZP filter when
    /// scanning a partition
    pub fn classifications(&self) -> Vec<PairClassification> {
        use PairClassification::*;
        match self {
            PairGroup::Aab => vec![Aab],
            PairGroup::Aac => vec![Aac],
            PairGroup::Aba => vec![Aba],
            PairGroup::Abb => vec![Abb],
            PairGroup::Abc => vec![Abc],
            PairGroup::BaaBba => vec![Baa, Bba],
            PairGroup::BabBbb => vec![Bab, Bbb],
            PairGroup::BacBbc => vec![Bac, Bbc],
            PairGroup::Cxx => vec![Cxx],
        }
    }

    pub fn mutation_type(&self) -> MutationType {
        match self {
            PairGroup::Cxx => MutationType::Ctx,
            PairGroup::Aac => MutationType::DelItx,
            PairGroup::BaaBba | PairGroup::BabBbb | PairGroup::BacBbc => MutationType::InvItx,
            PairGroup::Aab | PairGroup::Aba | PairGroup::Abb | PairGroup::Abc => {
                MutationType::DupInsItx
            }
        }
    }
}

/// Mutation classes inferable from breakpoint geometry alone
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum MutationType {
    #[strum(serialize = "DEL/ITX")]
    DelItx,
    #[strum(serialize = "DUP/INS/ITX")]
    DupInsItx,
    #[strum(serialize = "INV/ITX")]
    InvItx,
    #[strum(serialize = "CTX")]
    Ctx,
    #[strum(serialize = "ITX")]
    Itx,
}

/// Geometric orientation category of a discordant pair cluster
///
/// Categories 1-4 map to the four breakend direction patterns; category 5 is
/// the same-chromosome same-strand duplication-like pattern.
///
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum OrientationCategory {
    #[strum(serialize = "1")]
    Cat1,
    #[strum(serialize = "2")]
    Cat2,
    #[strum(serialize = "3")]
    Cat3,
    #[strum(serialize = "4")]
    Cat4,
    #[strum(serialize = "5")]
    Cat5,
}

/// One end of a discordant read pair
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mate {
    pub read_name: String,
    pub reference_name: String,
    pub start: i64,
    pub end: i64,
    pub zp: String,
    pub flags: u16,
    pub negative_strand: bool,
}

impl Mate {
    pub fn strand(&self) -> char {
        if self.negative_strand { '-' } else { '+' }
    }
}

/// A discordant read pair in canonical left/right order
///
/// The left mate always has the lower genomic coordinate (chromosome first,
/// then start), regardless of which read was sequenced first; `pair_order`
/// records the original read1/read2 role and orientation (e.g. "F1R2").
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MatePair {
    pub read_name: String,
    left: Mate,
    right: Mate,
    classification: PairClassification,
    pair_order: String,
}

impl MatePair {
    /// Construct from two mates, canonicalizing the left/right order
    ///
    /// The pair order token is derived from the flags of whichever mate ends
    /// up leftmost, matching the serialized form.
    ///
    pub fn from_mates(
        first: Mate,
        second: Mate,
        classification: PairClassification,
    ) -> SimpleResult<Self> {
        if first.read_name != second.read_name {
            bail!(
                "mates do not form a pair: '{}' vs '{}'",
                first.read_name,
                second.read_name
            );
        }
        let read_name = first.read_name.clone();
        let (left, right, _) = order_mates(first, second);
        // the order token describes whichever read ends up leftmost
        let pair_order = pair_order_from_flags(left.flags);
        Ok(Self {
            read_name,
            left,
            right,
            classification,
            pair_order,
        })
    }

    /// Parse the 15-field comma-separated evidence record
    ///
    /// This textual form is the interchange contract between pipeline stages
    /// and must round-trip through `to_line`.
    ///
    pub fn from_line(line: &str) -> SimpleResult<Self> {
        let fields = line.trim_end().split(',').collect::<Vec<_>>();
        if fields.len() != 15 {
            bail!(
                "malformed mate pair record, expected 15 fields, found {}: '{line}'",
                fields.len()
            );
        }

        let parse_mate = |offset: usize| -> SimpleResult<Mate> {
            Ok(Mate {
                read_name: fields[offset].to_string(),
                reference_name: fields[offset + 1].to_string(),
                start: try_with!(fields[offset + 2].parse(), "mate start"),
                end: try_with!(fields[offset + 3].parse(), "mate end"),
                zp: fields[offset + 4].to_string(),
                flags: try_with!(fields[offset + 5].parse(), "mate flags"),
                negative_strand: try_with!(fields[offset + 6].parse(), "mate strand"),
            })
        };

        let first = parse_mate(0)?;
        let second = parse_mate(7)?;
        let classification = PairClassification::from_tag(&first.zp)?;
        let read_name = first.read_name.clone();
        let (left, right, _) = order_mates(first, second);

        Ok(Self {
            read_name,
            left,
            right,
            classification,
            pair_order: fields[14].to_string(),
        })
    }

    /// Serialize to the 15-field comma-separated evidence record
    pub fn to_line(&self) -> String {
        let mate_fields = |m: &Mate| {
            format!(
                "{},{},{},{},{},{},{}",
                m.read_name, m.reference_name, m.start, m.end, m.zp, m.flags, m.negative_strand
            )
        };
        format!(
            "{},{},{}",
            mate_fields(&self.left),
            mate_fields(&self.right),
            self.pair_order
        )
    }

    pub fn left_mate(&self) -> &Mate {
        &self.left
    }

    pub fn right_mate(&self) -> &Mate {
        &self.right
    }

    pub fn classification(&self) -> PairClassification {
        self.classification
    }

    pub fn pair_order(&self) -> &str {
        &self.pair_order
    }

    /// Modal strand orientation token, e.g. "+/-"
    pub fn strand_orientation(&self) -> String {
        format!("{}/{}", self.left.strand(), self.right.strand())
    }

    /// Check whether this pair falls inside both windows of a cluster's
    /// left/right compare ranges
    ///
    pub fn overlaps_regions(
        &self,
        left_start: i64,
        left_end: i64,
        right_start: i64,
        right_end: i64,
    ) -> bool {
        let in_left = (self.left.start >= left_start && self.left.start <= left_end)
            || (self.left.end >= left_start && self.left.end <= left_end);
        if !in_left {
            return false;
        }
        (self.right.start >= right_start && self.right.start <= right_end)
            || (self.right.end >= right_start && self.right.end <= right_end)
    }

    /// Orientation category of this pair under the given platform's lookup
    /// table, if the (classification, pair order) combination maps to one
    ///
    pub fn sv_category(&self, platform: Platform) -> Option<OrientationCategory> {
        use OrientationCategory::*;
        use PairClassification::*;

        let zp = self.classification;
        let order = self.pair_order.as_str();
        let same_chromosome = self.left.reference_name == self.right.reference_name;

        // same-chromosome same-strand duplication-like patterns
        if same_chromosome
            && matches!(zp, Aab | Abb)
            && matches!(order, "F1F2" | "F2F1" | "R1R2" | "R2R1")
            && platform != Platform::LongMatePair
        {
            return Some(Cat5);
        }

        let inversion_like = matches!(zp, Baa | Bba | Bab | Bbb | Bac | Bbc);

        match platform {
            Platform::LongMatePair => {
                if matches!(zp, Cxx | Aac) && matches!(order, "F2F1" | "R1R2") {
                    Some(Cat1)
                } else if matches!(zp, Cxx | Aba | Abc | Abb) && matches!(order, "F1F2" | "R2R1") {
                    Some(Cat2)
                } else if zp == Cxx || inversion_like {
                    match order {
                        "F2R1" | "R1F2" => Some(Cat3),
                        "F1R2" | "R2F1" => Some(Cat4),
                        _ => None,
                    }
                } else if zp == Aab && matches!(order, "F2F1" | "R1R2") {
                    Some(Cat2)
                } else {
                    None
                }
            }
            Platform::PairedEnd => {
                if matches!(zp, Cxx | Aac) && matches!(order, "F2R1" | "F1R2") {
                    Some(Cat1)
                } else if matches!(zp, Cxx | Aba | Abc | Aab | Abb)
                    && matches!(order, "R1F2" | "R2F1")
                {
                    Some(Cat2)
                } else if zp == Cxx || inversion_like {
                    match order {
                        "F1F2" | "F2F1" => Some(Cat3),
                        "R2R1" | "R1R2" => Some(Cat4),
                        _ => None,
                    }
                } else {
                    None
                }
            }
            Platform::IlluminaMatePair => {
                if matches!(zp, Cxx | Aac) && matches!(order, "R2F1" | "R1F2") {
                    Some(Cat1)
                } else if matches!(zp, Cxx | Aba | Abc | Aab | Abb)
                    && matches!(order, "F1R2" | "F2R1")
                {
                    Some(Cat2)
                } else if zp == Cxx || inversion_like {
                    match order {
                        "F1F2" | "F2F1" => Some(Cat4),
                        "R2R1" | "R1R2" => Some(Cat3),
                        _ => None,
                    }
                } else {
                    None
                }
            }
        }
    }
}

/// Canonicalize mate order: by chromosome, then by start position
///
/// Returns the left mate, right mate, and whether a swap occurred.
///
fn order_mates(first: Mate, second: Mate) -> (Mate, Mate, bool) {
    let swap = if first.reference_name == second.reference_name {
        first.start > second.start
    } else {
        reorder_by_chromosomes(&first.reference_name, &second.reference_name)
    };
    if swap {
        (second, first, true)
    } else {
        (first, second, false)
    }
}

/// Reconstruct the "F1R2"-style pair order token from SAM flags
///
pub fn pair_order_from_flags(flags: u16) -> String {
    let first = if flags & FLAG_REVERSE != 0 { 'R' } else { 'F' };
    let second = if flags & FLAG_MATE_REVERSE != 0 {
        'R'
    } else {
        'F'
    };
    let (pair1, pair2) = if flags & FLAG_SECOND_OF_PAIR != 0 {
        (2, 1)
    } else {
        (1, 2)
    };
    format!("{first}{pair1}{second}{pair2}")
}
