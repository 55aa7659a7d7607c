//! Per-chromosome clip evidence input
//!
//! The upstream clip extractor writes one position-sorted file per
//! (sample, chromosome) under `clips/` in the evidence directory, named
//! `<sample>.<chrom>.txt`. Lines are either 8-field clip records or
//! `unmapped,...` split-read records.
//!

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use simple_error::{SimpleResult, bail, try_with};

use super::breakpoint::Breakpoint;
use super::clip::{Clip, ClipSide, SplitRead};

/// Clip evidence for one chromosome, grouped by exact breakpoint position
///
#[derive(Default)]
pub struct ClipEvidence {
    pub left: BTreeMap<i64, Breakpoint>,
    pub right: BTreeMap<i64, Breakpoint>,
    pub split_reads: BTreeMap<i64, Vec<SplitRead>>,
}

impl ClipEvidence {
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}

#[derive(Clone, Copy)]
pub struct ClipLoadSettings {
    pub min_consensus_length: usize,
    pub min_insert_size: i64,
    pub load_split_reads: bool,
}

pub fn clip_file_path(clips_dir: &Utf8Path, sample: &str, chromosome: &str) -> Utf8PathBuf {
    clips_dir.join(format!("{sample}.{chromosome}.txt"))
}

/// Load one sample's clip file into the per-position breakpoint maps
///
/// Tumor clips seed new breakpoints; normal clips only attach to positions
/// the tumor already put in evidence. Records must arrive in ascending
/// position order or the partition fails.
///
pub fn load_clip_evidence(
    path: &Utf8Path,
    is_tumour: bool,
    evidence: &mut ClipEvidence,
    settings: &ClipLoadSettings,
) -> SimpleResult<()> {
    if !path.is_file() {
        warn!("No clip evidence file found at '{path}'");
        return Ok(());
    }

    let file = try_with!(File::open(path), "unable to open clip file '{}'", path);
    let mut last_pos = i64::MIN;
    for line in BufReader::new(file).lines() {
        let line = try_with!(line, "reading clip file '{}'", path);
        if line.is_empty() {
            continue;
        }

        if line.starts_with("unmapped") {
            if settings.load_split_reads {
                let split = SplitRead::from_line(&line, is_tumour)?;
                evidence
                    .split_reads
                    .entry(split.bp_pos)
                    .or_default()
                    .push(split);
            }
            continue;
        }

        let clip = Clip::from_line(&line)?;
        if clip.bp_pos < last_pos {
            bail!(
                "clip file '{}' is not sorted by breakpoint position at read '{}'",
                path,
                clip.read_name
            );
        }
        last_pos = clip.bp_pos;

        let positions = match clip.side {
            ClipSide::Left => &mut evidence.left,
            ClipSide::Right => &mut evidence.right,
        };
        if is_tumour {
            let breakpoint = positions.entry(clip.bp_pos).or_insert_with(|| {
                Breakpoint::new(
                    clip.bp_pos,
                    &clip.reference,
                    clip.side,
                    settings.min_consensus_length,
                    settings.min_insert_size,
                )
            });
            breakpoint.add_tumour_clip(clip);
        } else if let Some(breakpoint) = positions.get_mut(&clip.bp_pos) {
            breakpoint.add_normal_clip(clip);
        }
    }

    info!(
        "Loaded clip evidence from '{path}': {} left, {} right, {} split-read positions",
        evidence.left.len(),
        evidence.right.len(),
        evidence.split_reads.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings() -> ClipLoadSettings {
        ClipLoadSettings {
            min_consensus_length: 4,
            min_insert_size: 50,
            load_split_reads: true,
        }
    }

    fn write_lines(path: &Utf8Path, lines: &[&str]) {
        let mut f = File::create(path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
    }

    #[test]
    fn test_load_tumor_then_normal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let tumor_path = clip_file_path(dir, "TD", "chr7");
        let normal_path = clip_file_path(dir, "ND", "chr7");

        write_lines(
            &tumor_path,
            &[
                "t1,chr7,100,+,left,AGGTTACGTA,ACGTA,AGGTT",
                "t2,chr7,100,+,left,AGGTTACGTA,ACGTA,AGGTT",
                "unmapped,t9,chr7,105,ACGTACGTACGT",
                "t3,chr7,200,-,right,ACGTAAGGTT,ACGTA,AGGTT",
            ],
        );
        write_lines(
            &normal_path,
            &[
                "n1,chr7,100,+,left,AGGTTACGTA,ACGTA,AGGTT",
                // no tumor evidence at 300: ignored
                "n2,chr7,300,+,left,AGGTTACGTA,ACGTA,AGGTT",
            ],
        );

        let mut evidence = ClipEvidence::default();
        load_clip_evidence(&tumor_path, true, &mut evidence, &settings()).unwrap();
        load_clip_evidence(&normal_path, false, &mut evidence, &settings()).unwrap();

        assert_eq!(evidence.left.len(), 1);
        assert_eq!(evidence.right.len(), 1);
        assert_eq!(evidence.left[&100].tumour_clips().len(), 2);
        assert_eq!(evidence.left[&100].normal_clips().len(), 1);
        assert_eq!(evidence.split_reads[&105].len(), 1);
    }

    #[test]
    fn test_unsorted_clip_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let path = clip_file_path(dir, "TD", "chr7");
        write_lines(
            &path,
            &[
                "t1,chr7,200,+,left,AGGTTACGTA,ACGTA,AGGTT",
                "t2,chr7,100,+,left,AGGTTACGTA,ACGTA,AGGTT",
            ],
        );

        let mut evidence = ClipEvidence::default();
        assert!(load_clip_evidence(&path, true, &mut evidence, &settings()).is_err());
    }

    #[test]
    fn test_missing_clip_file_is_empty_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let mut evidence = ClipEvidence::default();
        load_clip_evidence(
            &clip_file_path(dir, "TD", "chrUn"),
            true,
            &mut evidence,
            &settings(),
        )
        .unwrap();
        assert!(evidence.is_empty());
    }
}
