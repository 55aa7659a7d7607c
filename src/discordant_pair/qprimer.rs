//! Primer/probe site derivation for discordant pair clusters
//!

use std::collections::BTreeMap;

use super::mate::{MatePair, OrientationCategory, Platform};

/// Orientation of the derived primer pair relative to the reference
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PrimerOrientation {
    Forward,
    Reverse,
    LeftReverse,
}

/// Dominant strand-orientation pattern of a cluster and the primer/probe
/// windows derived from it
///
/// This is a pure function of the mate pairs handed to it; it has no identity
/// beyond the cluster that owns it.
///
#[derive(Clone, Debug)]
pub struct QPrimerCategory {
    category_tally: BTreeMap<OrientationCategory, usize>,
    primary: Option<OrientationCategory>,
    mixed_categories: String,
    left_chr: String,
    right_chr: String,
    start_left: i64,
    end_left: i64,
    start_right: i64,
    end_right: i64,
    orientation: PrimerOrientation,
}

impl QPrimerCategory {
    /// Bucket every contributing pair into its orientation category and derive
    /// the primer windows from the cluster extremes
    ///
    pub fn from_pairs(
        pairs: &[MatePair],
        platform: Platform,
        left_chr: &str,
        right_chr: &str,
        left_start: i64,
        left_end: i64,
        right_start: i64,
        right_end: i64,
    ) -> Self {
        let mut category_tally: BTreeMap<OrientationCategory, usize> = BTreeMap::new();
        for pair in pairs {
            if let Some(cat) = pair.sv_category(platform) {
                *category_tally.entry(cat).or_insert(0) += 1;
            }
        }

        let primary = find_primary_category(&category_tally);
        let mixed_categories = if category_tally.len() > 1 {
            // render descending by category number
            category_tally
                .iter()
                .rev()
                .map(|(cat, count)| format!("Cat{cat}({count}),"))
                .collect()
        } else {
            String::new()
        };

        let mut category = Self {
            category_tally,
            primary,
            mixed_categories,
            left_chr: left_chr.to_string(),
            right_chr: right_chr.to_string(),
            start_left: 0,
            end_left: 0,
            start_right: 0,
            end_right: 0,
            orientation: PrimerOrientation::Forward,
        };
        if category.primary.is_some() {
            category.find_qprimer_sites(left_start, left_end, right_start, right_end);
        }
        category
    }

    pub fn primary_category(&self) -> Option<OrientationCategory> {
        self.primary
    }

    /// Category label for reporting; clusters whose pairs map to no category
    /// are labeled "unknown"
    pub fn primary_category_label(&self) -> String {
        match self.primary {
            Some(cat) => cat.to_string(),
            None => "unknown".to_string(),
        }
    }

    /// Left probe window as (chromosome, start, end)
    pub fn left_site(&self) -> (&str, i64, i64) {
        (&self.left_chr, self.start_left, self.end_left)
    }

    /// Right probe window as (chromosome, start, end)
    pub fn right_site(&self) -> (&str, i64, i64) {
        (&self.right_chr, self.start_right, self.end_right)
    }

    /// Derive two non-overlapping probe windows from the cluster extremes
    ///
    /// The windows are offset 50bp inward from the breakpoint-proximal cluster
    /// extreme; category 2/3/5 swap the left/right chromosome labels so the
    /// windows are reported in event order.
    ///
    fn find_qprimer_sites(&mut self, left_start: i64, left_end: i64, right_start: i64, right_end: i64) {
        use OrientationCategory::*;
        match self.primary.unwrap() {
            Cat1 => {
                self.start_left = left_start;
                self.end_left = left_end - 50;
                self.start_right = right_start + 50;
                self.end_right = right_end;
                self.orientation = PrimerOrientation::Forward;
            }
            Cat2 => {
                self.start_left = right_start;
                self.end_left = right_end - 50;
                self.start_right = left_start + 50;
                self.end_right = left_end;
                self.swap_chromosomes();
                self.orientation = PrimerOrientation::Forward;
            }
            Cat3 => {
                self.start_left = left_start;
                self.end_left = left_end - 50;
                self.start_right = right_start;
                self.end_right = right_end - 50;
                self.swap_chromosomes();
                self.orientation = PrimerOrientation::Reverse;
            }
            Cat4 => {
                self.start_left = left_start + 50;
                self.end_left = left_end;
                self.start_right = right_start + 50;
                self.end_right = right_end;
                self.orientation = PrimerOrientation::LeftReverse;
            }
            Cat5 => {
                let midpoint_sum = left_start + right_end;
                let midpoint = midpoint_sum / 2 + (midpoint_sum % 2 > 0) as i64;
                self.start_left = midpoint;
                self.end_left = right_end - 50;
                self.start_right = left_start + 50;
                self.end_right = midpoint;
                self.swap_chromosomes();
                self.orientation = PrimerOrientation::Forward;
            }
        }
    }

    fn swap_chromosomes(&mut self) {
        std::mem::swap(&mut self.left_chr, &mut self.right_chr);
    }

    /// Render the primer windows as a tab-delimited report fragment
    pub fn to_report_string(&self, sv_id: &str) -> String {
        format!(
            "{sv_id}\t{}:{}-{}\t{}:{}-{}\t{:?}\t{}\t{}",
            self.left_chr,
            self.start_left,
            self.end_left,
            self.right_chr,
            self.start_right,
            self.end_right,
            self.orientation,
            self.primary_category_label(),
            self.mixed_categories
        )
    }
}

/// Modal category; ties resolve to the lowest category number
///
fn find_primary_category(
    tally: &BTreeMap<OrientationCategory, usize>,
) -> Option<OrientationCategory> {
    let max = tally.values().copied().max()?;
    tally
        .iter()
        .find(|&(_, &count)| count == max)
        .map(|(&cat, _)| cat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat1_pair(left_start: i64, right_start: i64) -> MatePair {
        let line = format!(
            "r{left_start}:rg,chr1,{left_start},{},AAC,129,false,r{left_start}:rg,chr1,{right_start},{},AAC,65,true,F1R2",
            left_start + 49,
            right_start + 49
        );
        MatePair::from_line(&line).unwrap()
    }

    #[test]
    fn test_category1_primer_sites() {
        let pairs = vec![cat1_pair(1000, 5000), cat1_pair(1200, 5200)];

        let category = QPrimerCategory::from_pairs(
            &pairs,
            Platform::PairedEnd,
            "chr1",
            "chr1",
            1000,
            3000,
            5000,
            7000,
        );
        assert_eq!(category.primary_category(), Some(OrientationCategory::Cat1));
        assert_eq!(category.left_site(), ("chr1", 1000, 2950));
        assert_eq!(category.right_site(), ("chr1", 5050, 7000));
    }

    #[test]
    fn test_category1_sites_platform_invariant() {
        // each platform tags category 1 with its own pair order token, but the
        // derived probe windows are identical
        let cases = [
            (Platform::LongMatePair, "F2F1"),
            (Platform::IlluminaMatePair, "R1F2"),
        ];
        for (platform, order) in cases {
            let line = format!(
                "r:rg,chr1,1000,1049,AAC,193,false,r:rg,chr1,5000,5049,AAC,129,false,{order}"
            );
            let pairs = vec![MatePair::from_line(&line).unwrap()];
            let category = QPrimerCategory::from_pairs(
                &pairs, platform, "chr1", "chr1", 1000, 3000, 5000, 7000,
            );
            assert_eq!(category.primary_category(), Some(OrientationCategory::Cat1));
            assert_eq!(category.left_site(), ("chr1", 1000, 2950));
            assert_eq!(category.right_site(), ("chr1", 5050, 7000));
        }
    }

    #[test]
    fn test_unassignable_pairs_yield_unknown() {
        // AAC with an inversion-style pair order maps to no category on pe
        let line = "r:rg,chr1,1000,1049,AAC,129,false,r:rg,chr1,5000,5049,AAC,65,false,F1F2";
        let pairs = vec![MatePair::from_line(line).unwrap()];
        let category = QPrimerCategory::from_pairs(
            &pairs,
            Platform::PairedEnd,
            "chr1",
            "chr1",
            1000,
            3000,
            5000,
            7000,
        );
        assert_eq!(category.primary_category(), None);
        assert_eq!(category.primary_category_label(), "unknown");
    }

    #[test]
    fn test_mixed_categories_description() {
        let mut tally = BTreeMap::new();
        tally.insert(OrientationCategory::Cat1, 5usize);
        tally.insert(OrientationCategory::Cat3, 2usize);
        assert_eq!(
            find_primary_category(&tally),
            Some(OrientationCategory::Cat1)
        );

        // tie resolves to the lowest category number
        tally.insert(OrientationCategory::Cat3, 5usize);
        assert_eq!(
            find_primary_category(&tally),
            Some(OrientationCategory::Cat1)
        );
    }
}
