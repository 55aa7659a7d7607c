//! Partitioned mate-pair evidence input
//!
//! The upstream extractor writes one position-sorted file per
//! (sample, pair group, chromosome pair) partition under `pairs/` in the
//! evidence directory, named `<sample>.<group>.<chrA>-<chrB>.txt`. This reader
//! only discovers and streams those files; it never re-sorts them.
//!

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use simple_error::{SimpleResult, bail, try_with};

use super::mate::{MatePair, PairGroup};

pub struct MatePairsReader {
    pub sample: String,
    pub group: PairGroup,
    files_by_key: BTreeMap<String, Vec<Utf8PathBuf>>,
}

impl MatePairsReader {
    /// Discover this sample/group's partition files in the evidence directory
    ///
    pub fn new(pairs_dir: &Utf8Path, sample: &str, group: PairGroup) -> SimpleResult<Self> {
        let mut files_by_key: BTreeMap<String, Vec<Utf8PathBuf>> = BTreeMap::new();
        let prefix = format!("{sample}.{group}.");

        if pairs_dir.is_dir() {
            let entries = try_with!(
                pairs_dir.read_dir_utf8(),
                "unable to scan evidence directory '{}'",
                pairs_dir
            );
            for entry in entries {
                let entry = try_with!(entry, "reading evidence directory entry");
                let name = entry.file_name();
                if let Some(partition) = name
                    .strip_prefix(&prefix)
                    .and_then(|x| x.strip_suffix(".txt"))
                {
                    let Some((chrom1, chrom2)) = partition.split_once('-') else {
                        bail!("unexpected evidence file name: '{name}'");
                    };
                    let key = format!("{chrom1}:{chrom2}");
                    files_by_key
                        .entry(key)
                        .or_default()
                        .push(entry.path().to_path_buf());
                }
            }
        }

        Ok(Self {
            sample: sample.to_string(),
            group,
            files_by_key,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.files_by_key.keys()
    }

    pub fn files_for_key(&self, key: &str) -> Option<&Vec<Utf8PathBuf>> {
        self.files_by_key.get(key)
    }

    /// Stream one partition's mate pairs
    ///
    /// Pairs whose classification falls outside this reader's group are
    /// rejected (the ZP filter). When `check_sorted` is set, any record
    /// arriving out of ascending left-mate order is an ordering violation and
    /// fails the partition: clustering is not correct on unsorted input.
    ///
    pub fn read_mate_pairs(
        &self,
        files: &[Utf8PathBuf],
        check_sorted: bool,
    ) -> SimpleResult<Vec<MatePair>> {
        let accepted = self.group.classifications();
        let mut pairs = Vec::new();

        for path in files {
            let file = try_with!(File::open(path), "unable to open evidence file '{}'", path);
            let mut last_start = i64::MIN;
            for line in BufReader::new(file).lines() {
                let line = try_with!(line, "reading evidence file '{}'", path);
                if line.is_empty() {
                    continue;
                }
                let pair = MatePair::from_line(&line)?;
                if !accepted.contains(&pair.classification()) {
                    continue;
                }
                let start = pair.left_mate().start;
                if check_sorted && start < last_start {
                    bail!(
                        "evidence file '{}' is not sorted by left mate start at read '{}'",
                        path,
                        pair.read_name
                    );
                }
                last_start = start;
                pairs.push(pair);
            }
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_partition(dir: &Utf8Path, name: &str, lines: &[&str]) {
        let mut f = File::create(dir.join(name)).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
    }

    #[test]
    fn test_partition_discovery_and_read() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        write_partition(
            dir,
            "TD.AAC.chr7-chr7.txt",
            &[
                "r1:rg,chr7,100,149,AAC,129,false,r1:rg,chr7,5000,5049,AAC,65,true,F1R2",
                "r2:rg,chr7,200,249,AAC,129,false,r2:rg,chr7,5100,5149,AAC,65,true,F1R2",
            ],
        );

        let reader = MatePairsReader::new(dir, "TD", PairGroup::Aac).unwrap();
        assert_eq!(reader.keys().collect::<Vec<_>>(), vec!["chr7:chr7"]);

        let files = reader.files_for_key("chr7:chr7").unwrap();
        let pairs = reader.read_mate_pairs(files, true).unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_unsorted_partition_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        write_partition(
            dir,
            "TD.AAC.chr7-chr7.txt",
            &[
                "r1:rg,chr7,200,249,AAC,129,false,r1:rg,chr7,5000,5049,AAC,65,true,F1R2",
                "r2:rg,chr7,100,149,AAC,129,false,r2:rg,chr7,5100,5149,AAC,65,true,F1R2",
            ],
        );

        let reader = MatePairsReader::new(dir, "TD", PairGroup::Aac).unwrap();
        let files = reader.files_for_key("chr7:chr7").unwrap();
        assert!(reader.read_mate_pairs(files, true).is_err());
    }

    #[test]
    fn test_zp_filter_rejects_foreign_classifications() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        write_partition(
            dir,
            "TD.BAA_BBA.chr7-chr7.txt",
            &[
                "r1:rg,chr7,100,149,BAA,129,false,r1:rg,chr7,5000,5049,BAA,65,false,F1F2",
                "r2:rg,chr7,200,249,AAC,129,false,r2:rg,chr7,5100,5149,AAC,65,true,F1R2",
                "r3:rg,chr7,300,349,BBA,129,false,r3:rg,chr7,5200,5249,BBA,65,false,F1F2",
            ],
        );

        let reader = MatePairsReader::new(dir, "TD", PairGroup::BaaBba).unwrap();
        let files = reader.files_for_key("chr7:chr7").unwrap();
        let pairs = reader.read_mate_pairs(files, true).unwrap();
        assert_eq!(pairs.len(), 2);
    }
}
