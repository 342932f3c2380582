use crate::defaults::ReferenceDefaults;
use crate::utils::constants::{
    FAI_FILE, HOUSE_KEEPING_GENE_BED, QC_REFERENCE_FILES, REFERENCE_BED, RIBOSOMAL_RNA_BED,
    STATS_TEMP_PREFIX,
};
use crate::utils::pipeline_utils::{CommandExecutor, CommandTemplate, Params, PipelineRun};
use crate::utils::prog_utils;
use crate::utils::reference_utils::{
    ReferenceFields, ReferenceRequest, ReferenceResolver, ReferenceSpec, TarGzExtractor,
};
use crate::utils::workspace::TempWorkspace;

use anyhow::bail;
use tracing::info;

use super::{prepare_out_dir, StatsOpts};

const BAMSTAT_GENOME: CommandTemplate = CommandTemplate::new(
    "bam_stats_genome",
    "bam_stats -r $fai_file -i $input -o $out_dir/$sample_name.bam.bas",
);
const RSEQC_RRNA: CommandTemplate = CommandTemplate::new(
    "rseqc_rrna",
    "split_bam.py -i $input -r $ribosomal_rna_bed -o $out_dir/$sample_name.rRNA > $out_dir/$sample_name.rrna.txt",
);
const RSEQC_GENE_COVERAGE: CommandTemplate = CommandTemplate::new(
    "rseqc_gene_coverage",
    "geneBody_coverage.py -i $input -r $house_keeping_gene_bed -f png -o $out_dir/$sample_name",
);
const RSEQC_READ_DISTRIBUTION: CommandTemplate = CommandTemplate::new(
    "rseqc_read_distribution",
    "read_distribution.py -i $input -r $reference_bed > $out_dir/$sample_name.read_dist.txt",
);
const BAMSTAT_TRANSCRIPTOME: CommandTemplate = CommandTemplate::new(
    "bam_stats_transcriptome",
    "bam_stats -i $trans_bam -o $out_dir/$sample_name.transcriptome.bas",
);
const PROCESS_RNA_LANE_STATS: CommandTemplate = CommandTemplate::new(
    "process_qcstats",
    "process_qcstats.pl -s $sample_name -i $out_dir -o $out_dir",
);
const COLLATE_RNA_LANE_STATS: CommandTemplate = CommandTemplate::new(
    "collate_qcstats",
    "paste $out_dir/$sample_name.bam.bas $out_dir/$sample_name.insert.bas $out_dir/$sample_name.read.dist.bas $out_dir/$sample_name.rrna.bas $out_dir/$sample_name.gene.cov.bas > $out_dir/$sample_name.RNA.bas",
);

/// ### Program Name
/// run-cgprna stats
///
/// Collects genome mapping QC metrics for a BAM. When a transcriptome BAM is
/// given, its stats are added and everything is collated into
/// `<sample>.RNA.bas`. The sample name is the file stem of the input BAM.
pub fn generate_stats<E: CommandExecutor>(opts: StatsOpts, executor: E) -> anyhow::Result<()> {
    if !opts.input.is_file() {
        bail!("Input: {} should be an existing file", opts.input.display());
    }
    let sample_name = match opts.input.extension().and_then(|e| e.to_str()) {
        Some("bam") => opts
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        _ => bail!("Input: {} should be a BAM file", opts.input.display()),
    };
    if let Some(trans_bam) = &opts.transcriptome_bam {
        prog_utils::check_files_exist(&[trans_bam.clone()])?;
    }

    let out_dir = prepare_out_dir(&opts.output_dir)?;
    let spec = ReferenceSpec::from_path(&opts.reference, ReferenceFields::default())?;

    let workspace = TempWorkspace::new(&out_dir, STATS_TEMP_PREFIX);
    let mut run = PipelineRun::new("stats", &out_dir, workspace, executor);

    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), TarGzExtractor);
    let reference = resolver.resolve(&spec, &ReferenceRequest::flat(), run.workspace())?;
    reference.require_files(&QC_REFERENCE_FILES)?;

    let mut params = Params::new();
    params
        .set_path("input", &prog_utils::absolute_path(&opts.input)?)
        .set_path("out_dir", &out_dir)
        .set("sample_name", sample_name)
        .set_path("fai_file", &reference.root.join(FAI_FILE))
        .set_path("ribosomal_rna_bed", &reference.root.join(RIBOSOMAL_RNA_BED))
        .set_path(
            "house_keeping_gene_bed",
            &reference.root.join(HOUSE_KEEPING_GENE_BED),
        )
        .set_path("reference_bed", &reference.root.join(REFERENCE_BED));

    let mut templates = vec![
        BAMSTAT_GENOME,
        RSEQC_RRNA,
        RSEQC_GENE_COVERAGE,
        RSEQC_READ_DISTRIBUTION,
    ];
    if let Some(trans_bam) = &opts.transcriptome_bam {
        params.set_path("trans_bam", &prog_utils::absolute_path(trans_bam)?);
        templates.extend([
            BAMSTAT_TRANSCRIPTOME,
            PROCESS_RNA_LANE_STATS,
            COLLATE_RNA_LANE_STATS,
        ]);
    }

    run.run_templates(&templates, &params)?;
    let log_file = run.finish()?;
    info!("stats finished, run log written to {}", log_file.display());
    Ok(())
}
