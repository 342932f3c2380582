use crate::defaults::ReferenceDefaults;
use crate::utils::constants::{GTF_PATTERN, MAP_TEMP_PREFIX, STAR_TOOL_FAMILY};
use crate::utils::input_utils::{BinaryFormat, InputClassifier, InputKind};
use crate::utils::pipeline_utils::{CommandExecutor, CommandTemplate, Params, PipelineRun};
use crate::utils::reference_utils::{
    ReferenceRequest, ReferenceResolver, ReferenceSpec, TarGzExtractor,
};
use crate::utils::workspace::TempWorkspace;

use anyhow::bail;
use tracing::info;

use super::{prepare_out_dir, MapOpts};

const STAR_MAP: CommandTemplate = CommandTemplate::new(
    "star_mapping",
    "star_mapping.pl -s $sample_name -o $out_dir -t $threads -r $reference_data_root -sp $species -rb $ref_build -gb $gene_build -g $gene_build_gtf_name $other_options $raw_reads_string",
);
const MARK_DUPS: CommandTemplate = CommandTemplate::new(
    "mark_duplicates",
    "bammarkduplicates2 I=$out_dir/$sample_name.star.Aligned.out.bam O=$out_dir/$sample_name.bam md5=1 index=1 markthreads=$threads md5filename=$out_dir/$sample_name.bam.md5 indexfilename=$out_dir/$sample_name.bam.bai M=$out_dir/$sample_name.bam.met tmpfile=$out_dir/biormdup",
);
const BAM_INDEX: CommandTemplate = CommandTemplate::new(
    "transcriptome_bam_index",
    "bamindex < $out_dir/$sample_name.star.AlignedtoTranscriptome.out.bam > $out_dir/$sample_name.star.AlignedtoTranscriptome.out.bam.bai",
);

/// Read group tags passed through to `star_mapping.pl`.
fn read_group_options(opts: &MapOpts) -> String {
    [
        ("-lane-id", &opts.rg_id_tag),
        ("-library", &opts.lb_tag),
        ("-ds-tag", &opts.ds_tag),
        ("-machine-type", &opts.pl_tag),
        ("-npg-run", &opts.pu_tag),
    ]
    .into_iter()
    .filter_map(|(flag, v)| v.as_deref().map(|v| format!("{} {}", flag, v)))
    .collect::<Vec<String>>()
    .join(" ")
}

/// ### Program Name
/// run-cgprna map
///
/// Maps a raw BAM, or pairs of FastQ files, with STAR, then marks
/// duplicates and indexes the transcriptome BAM.
pub fn map_seq_files<E: CommandExecutor>(opts: MapOpts, executor: E) -> anyhow::Result<()> {
    let inputs = InputClassifier::default().validate(&opts.input)?;
    let n_binaries = inputs.binaries().count();
    if let Some(f) = inputs
        .binaries()
        .find(|f| f.kind == InputKind::PreAlignedBinary(BinaryFormat::Cram))
    {
        bail!(
            "CRAM input is not supported, please remove {} from the input and retry.",
            f.path.display()
        );
    }
    if n_binaries > 0 && n_binaries != inputs.files.len() {
        bail!("The input can be raw BAM files or pairs of FastQ files, but not a mixture of both.");
    }

    let out_dir = prepare_out_dir(&opts.output_dir)?;
    let other_options = read_group_options(&opts);
    let spec = ReferenceSpec::from_path(
        &opts.reference,
        opts.reference_fields.into_fields(opts.gene_build_gtf_name),
    )?;

    let workspace = TempWorkspace::new(&out_dir, MAP_TEMP_PREFIX);
    let mut run = PipelineRun::new("map", &out_dir, workspace, executor);

    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), TarGzExtractor);
    let reference = resolver.resolve(
        &spec,
        &ReferenceRequest::with_annotation(STAR_TOOL_FAMILY, GTF_PATTERN),
        run.workspace(),
    )?;
    if let Some(gtf) = &reference.annotation_file {
        info!("using annotation file {}", gtf.display());
    }

    let mut params = Params::new();
    params
        .set("sample_name", opts.sample_name.as_str())
        .set_path("out_dir", &out_dir)
        .set("threads", opts.threads.to_string())
        .set("other_options", other_options)
        .set_paths("raw_reads_string", &inputs.paths());
    reference.add_to_params(&mut params);

    run.run_templates(&[STAR_MAP, MARK_DUPS, BAM_INDEX], &params)?;
    let log_file = run.finish()?;
    info!("mapping finished, run log written to {}", log_file.display());
    Ok(())
}
