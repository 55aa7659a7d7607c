//! External aligner client abstraction
//!
//! Consensus sequences built from soft-clip evidence are realigned against the
//! reference to recover the unobserved mate side of a breakpoint. The aligner
//! itself is an external collaborator; the clustering code only depends on the
//! `AlignerClient` trait, so it can be tested without spawning a real aligner
//! process.
//!

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::process::Command;

use camino::Utf8PathBuf;
use log::debug;
use simple_error::{SimpleResult, bail, try_with};
use unwrap::unwrap;

/// Minimum fraction of the query that must be covered by the alignment before
/// a mate breakpoint is accepted from it
const MIN_QUERY_COVERAGE: f64 = 0.9;

#[derive(Clone, Debug)]
pub struct AlignmentQuery {
    pub name: String,
    pub sequence: String,
}

/// One best alignment for a named query sequence
///
/// Field layout follows the standard tabular alignment-summary schema emitted
/// by BLAT-like aligners.
///
#[derive(Clone, Debug)]
pub struct AlignmentRecord {
    pub matches: u32,
    pub mismatches: u32,
    pub rep_matches: u32,
    pub n_count: u32,
    pub q_gap_count: u32,
    pub q_gap_bases: u32,
    pub t_gap_count: u32,
    pub t_gap_bases: u32,
    pub strand: char,
    pub q_name: String,
    pub q_size: u32,
    pub q_start: u32,
    pub q_end: u32,
    pub t_name: String,
    pub t_size: u32,
    pub t_start: i64,
    pub t_end: i64,
    pub block_count: u32,
    pub block_sizes: Vec<u32>,
    pub q_starts: Vec<u32>,
    pub t_starts: Vec<i64>,
}

/// Mate-side breakpoint location recovered from an alignment
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MateAlignment {
    pub reference: String,
    pub breakpoint: i64,
    pub positive_strand: bool,
}

fn parse_int_list(field: &str) -> SimpleResult<Vec<i64>> {
    field
        .trim_end_matches(',')
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|e| simple_error::SimpleError::new(format!("bad list value '{s}': {e}")))
        })
        .collect()
}

impl AlignmentRecord {
    pub fn from_line(line: &str) -> SimpleResult<Self> {
        let fields = line.trim_end().split('\t').collect::<Vec<_>>();
        if fields.len() < 21 {
            bail!(
                "malformed alignment record, expected 21 fields, found {}: '{line}'",
                fields.len()
            );
        }

        let parse_u32 = |i: usize| -> SimpleResult<u32> {
            Ok(try_with!(
                fields[i].parse::<u32>(),
                "alignment record field {}",
                i
            ))
        };
        let parse_i64 = |i: usize| -> SimpleResult<i64> {
            Ok(try_with!(
                fields[i].parse::<i64>(),
                "alignment record field {}",
                i
            ))
        };

        let strand = fields[8].chars().next().unwrap_or('+');
        if strand != '+' && strand != '-' {
            bail!("malformed alignment record strand: '{}'", fields[8]);
        }

        Ok(Self {
            matches: parse_u32(0)?,
            mismatches: parse_u32(1)?,
            rep_matches: parse_u32(2)?,
            n_count: parse_u32(3)?,
            q_gap_count: parse_u32(4)?,
            q_gap_bases: parse_u32(5)?,
            t_gap_count: parse_u32(6)?,
            t_gap_bases: parse_u32(7)?,
            strand,
            q_name: fields[9].to_string(),
            q_size: parse_u32(10)?,
            q_start: parse_u32(11)?,
            q_end: parse_u32(12)?,
            t_name: fields[13].to_string(),
            t_size: parse_u32(14)?,
            t_start: parse_i64(15)?,
            t_end: parse_i64(16)?,
            block_count: parse_u32(17)?,
            block_sizes: parse_int_list(fields[18])?
                .into_iter()
                .map(|x| x as u32)
                .collect(),
            q_starts: parse_int_list(fields[19])?
                .into_iter()
                .map(|x| x as u32)
                .collect(),
            t_starts: parse_int_list(fields[20])?,
        })
    }

    /// Alignment score used to pick the best record for a query
    pub fn score(&self) -> i64 {
        self.matches as i64 + self.rep_matches as i64
            - self.mismatches as i64
            - self.q_gap_count as i64
            - self.t_gap_count as i64
    }

    /// Derive the mate breakpoint location implied by this alignment of a
    /// breakpoint's overhang consensus
    ///
    /// For a left-side breakpoint the overhang terminates at the junction, so
    /// on the '+' strand the mate position is the target end of the alignment;
    /// the geometry mirrors for '-' strand and for right-side breakpoints.
    /// Alignments covering too little of the query are rejected.
    ///
    pub fn calculate_mate_breakpoint(&self, breakpoint_is_left: bool) -> Option<MateAlignment> {
        if self.q_size == 0 {
            return None;
        }
        let coverage = (self.q_end.saturating_sub(self.q_start)) as f64 / self.q_size as f64;
        if coverage < MIN_QUERY_COVERAGE {
            return None;
        }

        let positive_strand = self.strand == '+';
        let breakpoint = if breakpoint_is_left == positive_strand {
            self.t_end
        } else {
            self.t_start + 1
        };

        Some(MateAlignment {
            reference: self.t_name.clone(),
            breakpoint,
            positive_strand,
        })
    }
}

/// Read tabular alignment output, retaining the best-scoring record per query
///
pub fn read_best_alignments<R: BufRead>(
    reader: R,
) -> SimpleResult<HashMap<String, AlignmentRecord>> {
    let mut best: HashMap<String, AlignmentRecord> = HashMap::new();
    for line in reader.lines() {
        let line = try_with!(line, "reading alignment output");
        if line.is_empty() || !line.chars().next().unwrap().is_ascii_digit() {
            // skip header/separator lines
            continue;
        }
        let record = AlignmentRecord::from_line(&line)?;
        match best.get(&record.q_name) {
            Some(prev) if prev.score() >= record.score() => {}
            _ => {
                best.insert(record.q_name.clone(), record);
            }
        }
    }
    Ok(best)
}

/// Client interface to the external sequence aligner
///
/// Implementations return at most one best alignment per query name. A query
/// with no acceptable alignment is simply absent from the result map; the
/// caller treats this as an unresolved (lower-confidence) breakpoint rather
/// than an error.
///
pub trait AlignerClient: Sync {
    fn align_sequences(
        &self,
        queries: &[AlignmentQuery],
    ) -> SimpleResult<HashMap<String, AlignmentRecord>>;
}

/// Aligner client that never finds an alignment
///
/// Used when no aligner command is configured; all candidate mate breakpoints
/// remain unresolved and surface as lower-confidence evidence.
///
pub struct NullAligner;

impl AlignerClient for NullAligner {
    fn align_sequences(
        &self,
        _queries: &[AlignmentQuery],
    ) -> SimpleResult<HashMap<String, AlignmentRecord>> {
        Ok(HashMap::new())
    }
}

/// Aligner client backed by an external command
///
/// The command is invoked as `<program> <query.fa> <output.psl>` per batch;
/// the output file is parsed as tabular alignment records.
///
pub struct CommandAligner {
    program: String,
    work_dir: Utf8PathBuf,
    batch_id: std::sync::atomic::AtomicUsize,
}

impl CommandAligner {
    pub fn new(program: &str, work_dir: &camino::Utf8Path) -> Self {
        Self {
            program: program.to_string(),
            work_dir: work_dir.to_path_buf(),
            batch_id: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl AlignerClient for CommandAligner {
    fn align_sequences(
        &self,
        queries: &[AlignmentQuery],
    ) -> SimpleResult<HashMap<String, AlignmentRecord>> {
        if queries.is_empty() {
            return Ok(HashMap::new());
        }
        let batch = self
            .batch_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let fasta_path = self.work_dir.join(format!("aligner.batch{batch}.fa"));
        let output_path = self.work_dir.join(format!("aligner.batch{batch}.psl"));

        {
            let mut fasta = unwrap!(
                File::create(&fasta_path),
                "Unable to create aligner query file: '{}'",
                fasta_path
            );
            for query in queries {
                writeln!(fasta, ">{}", query.name).unwrap();
                writeln!(fasta, "{}", query.sequence).unwrap();
            }
        }

        debug!(
            "Aligning {} consensus sequences via '{}'",
            queries.len(),
            self.program
        );

        let status = try_with!(
            Command::new(&self.program)
                .arg(fasta_path.as_str())
                .arg(output_path.as_str())
                .status(),
            "failed to launch aligner command '{}'",
            self.program
        );
        if !status.success() {
            bail!("aligner command '{}' exited with {status}", self.program);
        }

        let output = try_with!(
            File::open(&output_path),
            "unable to open aligner output '{}'",
            output_path
        );
        read_best_alignments(BufReader::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psl_line(q_name: &str, strand: char, t_name: &str, t_start: i64, t_end: i64) -> String {
        let q_size = 40;
        format!(
            "38\t1\t0\t0\t0\t0\t0\t0\t{strand}\t{q_name}\t{q_size}\t0\t40\t{t_name}\t1000000\t{t_start}\t{t_end}\t1\t40,\t0,\t{t_start},"
        )
    }

    #[test]
    fn test_alignment_record_round_fields() {
        let line = psl_line("bp1", '+', "chr7", 140191044, 140191084);
        let record = AlignmentRecord::from_line(&line).unwrap();
        assert_eq!(record.matches, 38);
        assert_eq!(record.strand, '+');
        assert_eq!(record.q_name, "bp1");
        assert_eq!(record.t_name, "chr7");
        assert_eq!(record.t_start, 140191044);
        assert_eq!(record.block_sizes, vec![40]);
    }

    #[test]
    fn test_malformed_alignment_record() {
        assert!(AlignmentRecord::from_line("1\t2\t3").is_err());
    }

    #[test]
    fn test_calculate_mate_breakpoint_geometry() {
        let fwd = AlignmentRecord::from_line(&psl_line("bp1", '+', "chr7", 100, 140)).unwrap();
        // left breakpoint, forward strand: junction at target end
        assert_eq!(
            fwd.calculate_mate_breakpoint(true),
            Some(MateAlignment {
                reference: "chr7".to_string(),
                breakpoint: 140,
                positive_strand: true
            })
        );
        // right breakpoint, forward strand: junction at target start
        assert_eq!(fwd.calculate_mate_breakpoint(false).unwrap().breakpoint, 101);

        let rev = AlignmentRecord::from_line(&psl_line("bp1", '-', "chr7", 100, 140)).unwrap();
        assert_eq!(rev.calculate_mate_breakpoint(true).unwrap().breakpoint, 101);
        assert_eq!(rev.calculate_mate_breakpoint(false).unwrap().breakpoint, 140);
    }

    #[test]
    fn test_low_coverage_alignment_rejected() {
        let mut record =
            AlignmentRecord::from_line(&psl_line("bp1", '+', "chr7", 100, 140)).unwrap();
        record.q_end = 20;
        assert_eq!(record.calculate_mate_breakpoint(true), None);
    }

    #[test]
    fn test_read_best_alignments_keeps_highest_score() {
        let data = format!(
            "{}\n{}\n",
            psl_line("bp1", '+', "chr7", 100, 140),
            "39\t0\t0\t0\t0\t0\t0\t0\t+\tbp1\t40\t0\t40\tchr8\t1000000\t500\t540\t1\t40,\t0,\t500,"
        );
        let best = read_best_alignments(data.as_bytes()).unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best["bp1"].t_name, "chr8");
    }
}
