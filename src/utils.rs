//! Small sequence and chromosome-name helpers shared across the clustering passes
//!

use std::cmp::Ordering;

/// Reverse complement a DNA sequence
///
/// Characters outside of ACGT (case-insensitive) are mapped to 'N', since clip
/// consensus sequences can legitimately contain ambiguous calls.
///
pub fn rev_comp(dna: &str) -> String {
    dna.chars()
        .rev()
        .map(|c| match c.to_ascii_uppercase() {
            'A' => 'T',
            'T' => 'A',
            'C' => 'G',
            'G' => 'C',
            _ => 'N',
        })
        .collect()
}

/// Return true if the fraction of 'N' characters in seq reaches limit
///
/// An empty sequence counts as all-N.
///
pub fn high_n_count(seq: &str, limit: f64) -> bool {
    assert!((0.0..=1.0).contains(&limit));
    if seq.is_empty() {
        return true;
    }
    let count = seq.chars().filter(|&c| c == 'N' || c == 'n').count();
    (count as f64 / seq.len() as f64) >= limit
}

/// Compare two reference sequence names in the conventional karyotype order
///
/// Numeric chromosome names sort numerically, then X, then Y, then M/MT, then
/// anything else lexicographically. A "chr" prefix is ignored. This replaces
/// the process-wide comparator singleton of older designs: callers pass the
/// comparison explicitly wherever cluster ordering matters.
///
pub fn compare_reference_names(a: &str, b: &str) -> Ordering {
    fn rank(name: &str) -> (u8, u32, &str) {
        let stripped = name.strip_prefix("chr").unwrap_or(name);
        if let Ok(num) = stripped.parse::<u32>() {
            (0, num, stripped)
        } else {
            match stripped {
                "X" => (1, 0, stripped),
                "Y" => (2, 0, stripped),
                "M" | "MT" => (3, 0, stripped),
                _ => (4, 0, stripped),
            }
        }
    }
    let (arank, anum, aname) = rank(a);
    let (brank, bnum, bname) = rank(b);
    arank
        .cmp(&brank)
        .then(anum.cmp(&bnum))
        .then(aname.cmp(bname))
}

/// Return true if the left/right reference names are out of canonical order
/// and should be swapped
///
pub fn reorder_by_chromosomes(left_reference: &str, right_reference: &str) -> bool {
    compare_reference_names(left_reference, right_reference) == Ordering::Greater
}

/// Build the canonical `min(chrA,chrB):max(chrA,chrB)` key used to group
/// breakpoint evidence symmetrically across both clustering passes
///
pub fn reference_key(chrom1: &str, chrom2: &str) -> String {
    if reorder_by_chromosomes(chrom1, chrom2) {
        format!("{chrom2}:{chrom1}")
    } else {
        format!("{chrom1}:{chrom2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rev_comp() {
        assert_eq!(rev_comp("AACGT"), "ACGTT");
        assert_eq!(rev_comp("NNATG"), "CATNN");
        assert_eq!(rev_comp("AXGT"), "ACNT");
    }

    #[test]
    fn test_high_n_count() {
        assert!(!high_n_count("ACGTACGTAN", 0.2));
        assert!(high_n_count("ACGTACGNNN", 0.2));
        assert!(high_n_count("", 0.2));
    }

    #[test]
    fn test_compare_reference_names() {
        assert_eq!(compare_reference_names("chr2", "chr10"), Ordering::Less);
        assert_eq!(compare_reference_names("chr10", "chrX"), Ordering::Less);
        assert_eq!(compare_reference_names("chrX", "chrY"), Ordering::Less);
        assert_eq!(compare_reference_names("chrY", "chrMT"), Ordering::Less);
        assert_eq!(compare_reference_names("chr7", "chr7"), Ordering::Equal);
    }

    #[test]
    fn test_reference_key() {
        assert_eq!(reference_key("chr10", "chr2"), "chr2:chr10");
        assert_eq!(reference_key("chr2", "chr10"), "chr2:chr10");
        assert_eq!(reference_key("chr7", "chr7"), "chr7:chr7");
    }
}
