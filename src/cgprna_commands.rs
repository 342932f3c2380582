pub mod map;
pub use self::map::map_seq_files;

pub mod stats;
pub use self::stats::generate_stats;

pub mod bigwig;
pub use self::bigwig::generate_bigwig;

pub mod count;
pub use self::count::count_genes;

pub mod fusion;
pub use self::fusion::{run_fusion, FusionTool};

pub mod inspect;
pub use self::inspect::inspect_tools;

use anyhow::Context;
use clap::{Args, Subcommand};
use cmd_lib::run_fun;
use std::path::{Path, PathBuf};

use crate::defaults::{DefaultParams, DefaultPipelineParams};
use crate::utils::prog_utils;
use crate::utils::reference_utils::ReferenceFields;

/// Descriptive fields locating files inside a reference root. None of them
/// are needed when the reference is a bundle.
#[derive(Args, Clone, Debug, Default)]
pub struct ReferenceFieldOpts {
    /// species name, used to locate reference files in a reference directory
    #[arg(long, help_heading = "Reference Options")]
    pub species: Option<String>,

    /// reference build name, used to locate reference files in a reference directory
    #[arg(long = "reference-build", help_heading = "Reference Options")]
    pub ref_build: Option<String>,

    /// gene build name, used to locate the gene build folder in a reference directory
    #[arg(long, help_heading = "Reference Options")]
    pub gene_build: Option<String>,
}

impl ReferenceFieldOpts {
    fn into_fields(self, gene_build_gtf_name: Option<String>) -> ReferenceFields {
        ReferenceFields {
            species: self.species,
            ref_build: self.ref_build,
            gene_build: self.gene_build,
            gene_build_gtf_name,
        }
    }
}

#[derive(Args, Clone, Debug)]
#[command(arg_required_else_help = true)]
pub struct MapOpts {
    /// an input raw BAM file, or pairs of (optionally gzipped) FastQ files
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// a reference bundle tar.gz file or the path to a reference root directory
    #[arg(short, long)]
    pub reference: PathBuf,

    /// sample name, prefixes output file names and sets the SM tag of the BAM header
    #[arg(short, long)]
    pub sample_name: String,

    #[command(flatten)]
    pub reference_fields: ReferenceFieldOpts,

    /// file name of the gene build GTF, used with a reference directory
    #[arg(long, help_heading = "Reference Options")]
    pub gene_build_gtf_name: Option<String>,

    /// output directory (will be created if it doesn't exist)
    #[arg(short, long = "output-directory", default_value = DefaultParams::OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// number of threads to use
    #[arg(short, long, default_value_t = DefaultParams::THREADS)]
    pub threads: u32,

    /// read group ID tag value of the output BAM
    #[arg(long, help_heading = "Read Group Options")]
    pub rg_id_tag: Option<String>,

    /// sequencing library tag value of the output BAM header
    #[arg(long, help_heading = "Read Group Options")]
    pub lb_tag: Option<String>,

    /// description tag value of the output BAM header
    #[arg(long, help_heading = "Read Group Options")]
    pub ds_tag: Option<String>,

    /// platform tag value of the output BAM header
    #[arg(long, help_heading = "Read Group Options")]
    pub pl_tag: Option<String>,

    /// platform unit tag value of the output BAM header
    #[arg(long, help_heading = "Read Group Options")]
    pub pu_tag: Option<String>,
}

#[derive(Args, Clone, Debug)]
#[command(arg_required_else_help = true)]
pub struct StatsOpts {
    /// input BAM file with reads mapped to the genome (NOT the transcriptome)
    #[arg(short, long)]
    pub input: PathBuf,

    /// a reference bundle tar.gz file or the path to a reference root directory
    #[arg(short, long)]
    pub reference: PathBuf,

    /// BAM file with reads mapped to the transcriptome (NOT the genome)
    #[arg(short = 'b', long)]
    pub transcriptome_bam: Option<PathBuf>,

    /// output directory (will be created if it doesn't exist)
    #[arg(short, long = "output-directory", default_value = DefaultParams::OUTPUT_DIR)]
    pub output_dir: PathBuf,
}

#[derive(Args, Clone, Debug)]
#[command(arg_required_else_help = true)]
pub struct BigwigOpts {
    /// input BAM file with reads mapped to the genome, must be indexed
    #[arg(short, long)]
    pub input: PathBuf,

    /// FASTA file of the reference the input BAM was mapped to
    #[arg(short, long)]
    pub reference: PathBuf,

    /// output directory (will be created if it doesn't exist)
    #[arg(short, long = "output-directory", default_value = DefaultParams::OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// number of threads to use
    #[arg(short, long, default_value_t = DefaultParams::THREADS)]
    pub threads: u32,
}

#[derive(Args, Clone, Debug)]
#[command(arg_required_else_help = true)]
pub struct CountOpts {
    /// input BAM file with reads mapped to the genome (NOT the transcriptome)
    #[arg(short, long)]
    pub input: PathBuf,

    /// a reference GTF file
    #[arg(short, long)]
    pub reference: PathBuf,

    /// output directory (will be created if it doesn't exist)
    #[arg(short, long = "output-directory", default_value = DefaultParams::OUTPUT_DIR)]
    pub output_dir: PathBuf,
}

#[derive(Args, Clone, Debug)]
#[command(arg_required_else_help = true)]
pub struct FusionOpts {
    /// raw BAM files and/or pairs of (optionally gzipped) FastQ files
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// a reference bundle tar.gz file or the path to a reference root directory
    #[arg(short, long)]
    pub reference: PathBuf,

    /// sample name, prefixes output file names
    #[arg(short, long)]
    pub sample_name: String,

    #[command(flatten)]
    pub reference_fields: ReferenceFieldOpts,

    /// output directory (will be created if it doesn't exist)
    #[arg(short, long = "output-directory", default_value = DefaultParams::OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// number of threads to use
    #[arg(short, long, default_value_t = DefaultParams::THREADS)]
    pub threads: u32,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// use STAR to map RNA-Seq reads to a reference genome
    Map(MapOpts),
    /// generate mapping stats from a BAM file, optionally with its transcriptome BAM
    Stats(StatsOpts),
    /// generate a bigwig coverage file from an indexed BAM file
    Bigwig(BigwigOpts),
    /// generate gene counts from a BAM file
    Count(CountOpts),
    /// detect fusions with TopHat-Fusion
    TophatFusion(FusionOpts),
    /// detect fusions with STAR-Fusion
    StarFusion(FusionOpts),
    /// detect fusions with deFuse
    Defuse(FusionOpts),
    /// report which of the external pipeline tools can be found
    Inspect {},
}

/// Resolves the output directory to an absolute path and creates it.
fn prepare_out_dir(out_dir: &Path) -> anyhow::Result<PathBuf> {
    let out_dir = prog_utils::absolute_path(out_dir)?;
    run_fun!(mkdir -p $out_dir)
        .with_context(|| format!("failed to create the directory {}", out_dir.display()))?;
    Ok(out_dir)
}
