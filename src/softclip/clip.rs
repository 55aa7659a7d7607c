//! Soft-clip and split-read evidence records
//!

use simple_error::{SimpleResult, bail, try_with};
use strum::{Display, EnumString};

/// Number of base columns tracked in a consensus count matrix: A,C,T,G,N
pub const BASE_COLUMN_COUNT: usize = 5;

pub type BaseCountMatrix = Vec<[u32; BASE_COLUMN_COUNT]>;

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq)]
pub enum Strand {
    #[strum(serialize = "+")]
    Forward,
    #[strum(serialize = "-")]
    Reverse,
}

/// Which side of the breakpoint the clipped tail extends from
///
/// A left clip's overhang lies to the left of the breakpoint position (the
/// read stops matching the reference walking leftward); a right clip's
/// overhang extends rightward.
///
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq)]
pub enum ClipSide {
    #[strum(serialize = "left")]
    Left,
    #[strum(serialize = "right")]
    Right,
}

/// A single soft-clip tail observation located to a 1bp breakpoint position
///
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Clip {
    pub read_name: String,
    pub reference: String,
    pub bp_pos: i64,
    pub strand: Strand,
    pub side: ClipSide,
    pub read_sequence: String,
    pub reference_sequence: String,
    pub clip_sequence: String,
}

impl Clip {
    /// Parse the 8-field comma-separated evidence record; part of the
    /// intermediate-persistence contract and must round-trip
    ///
    pub fn from_line(line: &str) -> SimpleResult<Self> {
        let fields = line.trim_end().split(',').collect::<Vec<_>>();
        if fields.len() != 8 {
            bail!(
                "malformed clip record, expected 8 fields, found {}: '{line}'",
                fields.len()
            );
        }
        let strand = match fields[3].parse::<Strand>() {
            Ok(x) => x,
            Err(_) => bail!("malformed clip strand: '{}'", fields[3]),
        };
        let side = match fields[4].parse::<ClipSide>() {
            Ok(x) => x,
            Err(_) => bail!("malformed clip side: '{}'", fields[4]),
        };
        Ok(Self {
            read_name: fields[0].to_string(),
            reference: fields[1].to_string(),
            bp_pos: try_with!(fields[2].parse(), "clip breakpoint position"),
            strand,
            side,
            read_sequence: fields[5].to_string(),
            reference_sequence: fields[6].to_string(),
            clip_sequence: fields[7].to_string(),
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.read_name,
            self.reference,
            self.bp_pos,
            self.strand,
            self.side,
            self.read_sequence,
            self.reference_sequence,
            self.clip_sequence
        )
    }

    pub fn len(&self) -> usize {
        self.clip_sequence.len()
    }

    pub fn is_left(&self) -> bool {
        self.side == ClipSide::Left
    }

    /// Accumulate this clip's overhang bases into a consensus count matrix
    ///
    /// Left-clip overhangs terminate at the breakpoint so they are aligned to
    /// the right edge of the matrix; right-clip overhangs start at the
    /// breakpoint and align to the left edge.
    ///
    pub fn add_clip_bases(&self, bases: &mut BaseCountMatrix) {
        add_aligned_bases(bases, &self.clip_sequence, self.side == ClipSide::Left);
    }

    /// Accumulate this clip's anchor (reference-matching) bases
    ///
    /// The anchor lies on the opposite side of the breakpoint from the
    /// overhang, so its alignment edge is mirrored.
    ///
    pub fn add_reference_bases(&self, bases: &mut BaseCountMatrix) {
        add_aligned_bases(bases, &self.reference_sequence, self.side == ClipSide::Right);
    }
}

fn base_column(base: char) -> usize {
    match base.to_ascii_uppercase() {
        'A' => 0,
        'C' => 1,
        'T' => 2,
        'G' => 3,
        _ => 4,
    }
}

fn add_aligned_bases(bases: &mut BaseCountMatrix, seq: &str, align_right: bool) {
    if seq.len() > bases.len() {
        return;
    }
    let offset = if align_right {
        bases.len() - seq.len()
    } else {
        0
    };
    for (i, base) in seq.chars().enumerate() {
        bases[offset + i][base_column(base)] += 1;
    }
}

/// A read whose unmapped portion may directly span a junction, keyed by the
/// putative breakpoint position inferred from its mapped mate
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SplitRead {
    pub read_name: String,
    pub reference: String,
    pub bp_pos: i64,
    pub sequence: String,
    pub is_tumour: bool,
}

impl SplitRead {
    /// Parse the "unmapped,..." evidence record form
    pub fn from_line(line: &str, is_tumour: bool) -> SimpleResult<Self> {
        let fields = line.trim_end().split(',').collect::<Vec<_>>();
        if fields.len() != 5 || fields[0] != "unmapped" {
            bail!("malformed split read record: '{line}'");
        }
        Ok(Self {
            read_name: fields[1].to_string(),
            reference: fields[2].to_string(),
            bp_pos: try_with!(fields[3].parse(), "split read position"),
            sequence: fields[4].to_string(),
            is_tumour,
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "unmapped,{},{},{},{}",
            self.read_name, self.reference, self.bp_pos, self.sequence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_round_trip() {
        let line = "read1:rg1,chr7,140188227,+,left,ACGTACGTAA,ACGTA,CGTAA";
        let clip = Clip::from_line(line).unwrap();
        assert_eq!(clip.to_line(), line);
        assert_eq!(clip.bp_pos, 140188227);
        assert_eq!(clip.strand, Strand::Forward);
        assert!(clip.is_left());
        assert_eq!(clip.len(), 5);
    }

    #[test]
    fn test_malformed_clip_record() {
        assert!(Clip::from_line("read1,chr7,100").is_err());
        assert!(Clip::from_line("r,chr7,100,*,left,AAAA,AA,AA").is_err());
        assert!(Clip::from_line("r,chr7,100,+,middle,AAAA,AA,AA").is_err());
    }

    #[test]
    fn test_clip_bases_alignment() {
        let left = Clip::from_line("r1,chr7,100,+,left,AAACC,CC,AAA").unwrap();
        let mut bases: BaseCountMatrix = vec![[0; BASE_COLUMN_COUNT]; 4];
        left.add_clip_bases(&mut bases);
        // right-aligned: columns 1..4 hold AAA
        assert_eq!(bases[0][0], 0);
        assert_eq!(bases[1][0], 1);
        assert_eq!(bases[3][0], 1);

        let right = Clip::from_line("r2,chr7,100,+,right,CCAAA,CC,AAA").unwrap();
        let mut bases: BaseCountMatrix = vec![[0; BASE_COLUMN_COUNT]; 4];
        right.add_clip_bases(&mut bases);
        // left-aligned: columns 0..3 hold AAA
        assert_eq!(bases[0][0], 1);
        assert_eq!(bases[2][0], 1);
        assert_eq!(bases[3][0], 0);
    }

    #[test]
    fn test_split_read_round_trip() {
        let line = "unmapped,read9:rg1,chr7,140191044,ACGTACGT";
        let split = SplitRead::from_line(line, true).unwrap();
        assert_eq!(split.to_line(), line);
        assert!(split.is_tumour);
        assert!(SplitRead::from_line("unmapped,read9", false).is_err());
    }
}
