//! Reference genome storage and flank sequence lookup
//!
//! The reference is read once at startup and shared read-only across all
//! worker threads.
//!

use std::collections::HashMap;
use std::fs::File;

use log::{info, warn};
use unwrap::unwrap;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chromosome {
    pub name: String,
    pub length: usize,
}

/// Ordered list of chromosomes with a name lookup
///
#[derive(Default)]
pub struct ChromList {
    pub data: Vec<Chromosome>,
    pub label_to_index: HashMap<String, usize>,
}

impl ChromList {
    pub fn add(&mut self, name: &str, length: usize) {
        self.label_to_index
            .insert(name.to_string(), self.data.len());
        self.data.push(Chromosome {
            name: name.to_string(),
            length,
        });
    }

    pub fn get(&self, name: &str) -> Option<&Chromosome> {
        self.label_to_index.get(name).map(|&i| &self.data[i])
    }
}

#[derive(Default)]
pub struct GenomeRef {
    /// A map from chrom name to chrom sequence
    pub chroms: HashMap<String, Vec<u8>>,
}

impl GenomeRef {
    pub fn chrom_list(&self) -> ChromList {
        let mut names = self.chroms.keys().cloned().collect::<Vec<_>>();
        names.sort_by(|a, b| crate::utils::compare_reference_names(a, b));
        let mut chrom_list = ChromList::default();
        for name in names {
            let length = self.chroms[&name].len();
            chrom_list.add(&name, length);
        }
        chrom_list
    }
}

/// Read fasta file pointer into GenomeRef data structure
///
/// This method converts all input characters to upper-case
///
pub fn get_genome_ref_from_fasta_fp(file: File) -> GenomeRef {
    let reader = bio::io::fasta::Reader::new(file);

    let mut genome_ref = GenomeRef::default();
    for result in reader.records() {
        let record = result.expect("Error during fasta record parsing");
        genome_ref
            .chroms
            .insert(record.id().to_string(), record.seq().to_ascii_uppercase());
    }
    genome_ref
}

/// Read fasta file into GenomeRef data structure
///
pub fn get_genome_ref_from_fasta(filename: &str) -> GenomeRef {
    info!("Reading reference genome from file '{filename}'");

    let file = unwrap!(
        File::open(filename),
        "Unable to open reference fasta file: '{}'",
        filename,
    );

    get_genome_ref_from_fasta_fp(file)
}

/// Retrieve the reference bases flanking a breakpoint, for probe design
///
/// The window is 200 bases on each side of the breakpoint (1-indexed), trimmed
/// at the contig boundaries rather than erroring.
///
pub fn get_current_flank_seq(
    genome_ref: &GenomeRef,
    chromosome: &Chromosome,
    breakpoint: i64,
) -> String {
    let start = std::cmp::max(breakpoint - 200, 1);
    let end = std::cmp::min(breakpoint + 200, chromosome.length as i64);
    if end < start {
        return String::new();
    }

    match genome_ref.chroms.get(&chromosome.name) {
        Some(bases) => {
            // bases is 0-indexed, breakpoint coordinates are 1-indexed
            let slice = &bases[(start - 1) as usize..end as usize];
            String::from_utf8_lossy(slice).into_owned()
        }
        None => {
            warn!(
                "Could not find reference '{}' in reference file. Is this the same reference used to map the reads?",
                chromosome.name
            );
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};

    fn test_genome(len: usize) -> (GenomeRef, Chromosome) {
        let mut genome_ref = GenomeRef::default();
        let seq = b"ACGT".iter().cycle().take(len).copied().collect::<Vec<_>>();
        genome_ref.chroms.insert("chr1".to_string(), seq);
        let chromosome = Chromosome {
            name: "chr1".to_string(),
            length: len,
        };
        (genome_ref, chromosome)
    }

    #[test]
    fn test_get_genome_ref_from_fasta_fp() {
        let mut file = tempfile::tempfile().unwrap();
        writeln!(file, ">chrT").unwrap();
        writeln!(file, "acgtACGT").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let result = get_genome_ref_from_fasta_fp(file);
        assert_eq!(result.chroms.len(), 1);
        assert_eq!(result.chroms["chrT"], b"ACGTACGT".to_vec());
    }

    #[test]
    fn test_flank_seq_trimmed_at_contig_start() {
        let (genome_ref, chromosome) = test_genome(500);

        // breakpoint 200 reaches the contig start on the left side
        assert_eq!(get_current_flank_seq(&genome_ref, &chromosome, 200).len(), 400);
        assert_eq!(get_current_flank_seq(&genome_ref, &chromosome, 201).len(), 401);
        assert_eq!(get_current_flank_seq(&genome_ref, &chromosome, 199).len(), 399);
    }

    #[test]
    fn test_flank_seq_trimmed_at_contig_end() {
        let (genome_ref, chromosome) = test_genome(500);
        assert_eq!(get_current_flank_seq(&genome_ref, &chromosome, 450).len(), 251);
    }
}
