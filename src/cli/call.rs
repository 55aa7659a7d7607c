use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use log::info;
use serde::Serialize;
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use crate::discordant_pair::mate::Platform;

pub const SETTINGS_FILENAME: &str = "call.settings.json";

#[derive(Args, Serialize)]
pub struct CallSettings {
    /// Directory holding the pre-extracted evidence streams
    /// (`pairs/` and `clips/` subdirectories)
    #[arg(long = "evidence-dir", value_name = "DIR")]
    pub evidence_dir: Utf8PathBuf,

    /// Reference genome fasta file
    #[arg(long = "ref", value_name = "FILE")]
    pub ref_filename: String,

    /// Directory for all output files
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Utf8PathBuf,

    /// Label of the tumor sample in evidence file names
    #[arg(long, default_value = "TD")]
    pub tumor_sample: String,

    /// Label of the matched normal sample in evidence file names
    #[arg(long, default_value = "ND")]
    pub normal_sample: String,

    /// Run without a matched normal; all pair clusters stay unclassified
    /// against a normal and no germline catalogue is produced
    #[arg(long)]
    pub tumor_only: bool,

    /// Sequencing platform of the library, selecting the orientation
    /// category tables
    #[arg(long, value_enum, default_value_t = Platform::PairedEnd)]
    pub platform: Platform,

    /// Upper bound of the expected insert size in the tumor library
    #[arg(long, default_value_t = 1000)]
    pub upper_insert_size: i64,

    /// Upper bound of the expected insert size in the normal library
    #[arg(long, default_value_t = 1000)]
    pub normal_upper_insert_size: i64,

    /// Minimum discordant pair support before a cluster is emitted
    #[arg(long, default_value_t = 3)]
    pub cluster_size: usize,

    /// The normal sample's own minimum cluster size; overlapping normal
    /// pairs below it count as low-confidence germline-rescue evidence
    #[arg(long, default_value_t = 3)]
    pub compare_cluster_size: usize,

    /// Minimum soft-clip support before a breakpoint is defined
    #[arg(long, default_value_t = 3)]
    pub clip_size: usize,

    /// Minimum length of the clip consensus sequence
    #[arg(long, default_value_t = 20)]
    pub consensus_length: usize,

    /// Minimum same-chromosome distance between an observed breakpoint and
    /// its mate
    #[arg(long, default_value_t = 50)]
    pub min_insert_size: i64,

    /// Breakpoint candidates within this many bases amalgamate into one
    #[arg(long, default_value_t = 3)]
    pub clip_window: i64,

    /// External aligner command used to resolve mate breakpoints; when
    /// absent all candidate mates stay unresolved
    #[arg(long, value_name = "COMMAND")]
    pub aligner: Option<String>,

    /// Skip loading split-read (unmapped mate) evidence
    #[arg(long)]
    pub no_split_reads: bool,

    /// Also report single-sided clip evidence
    #[arg(long)]
    pub single_sided: bool,
}

impl CallSettings {
    pub fn pairs_dir(&self) -> Utf8PathBuf {
        self.evidence_dir.join("pairs")
    }

    pub fn clips_dir(&self) -> Utf8PathBuf {
        self.evidence_dir.join("clips")
    }

    pub fn normal_sample(&self) -> Option<&str> {
        if self.tumor_only {
            None
        } else {
            Some(self.normal_sample.as_str())
        }
    }
}

pub fn validate_and_fix_call_settings(settings: CallSettings) -> SimpleResult<CallSettings> {
    if !settings.evidence_dir.is_dir() {
        bail!(
            "evidence directory does not exist: \"{}\"",
            settings.evidence_dir
        );
    }
    if !Utf8Path::new(&settings.ref_filename).is_file() {
        bail!(
            "reference fasta file does not exist: \"{}\"",
            settings.ref_filename
        );
    }
    if settings.cluster_size == 0 || settings.clip_size == 0 {
        bail!("cluster and clip sizes must be greater than 0");
    }
    if settings.upper_insert_size <= 0 || settings.normal_upper_insert_size <= 0 {
        bail!("insert sizes must be greater than 0");
    }
    Ok(settings)
}

/// Write the resolved settings snapshot into the output directory
///
pub fn write_call_settings(output_dir: &Utf8Path, settings: &CallSettings) {
    let filename = output_dir.join(SETTINGS_FILENAME);
    info!("Writing settings to file: '{filename}'");
    let f = unwrap!(
        File::create(&filename),
        "Unable to create settings json file: '{}'",
        filename
    );
    serde_json::to_writer_pretty(&f, settings).unwrap();
}
