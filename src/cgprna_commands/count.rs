use crate::utils::constants::COUNT_TEMP_PREFIX;
use crate::utils::pipeline_utils::{CommandExecutor, CommandTemplate, Params, PipelineRun};
use crate::utils::prog_utils;
use crate::utils::workspace::TempWorkspace;

use tracing::info;

use super::{prepare_out_dir, CountOpts};

const BAMCOLLATE: CommandTemplate = CommandTemplate::new(
    "bamcollate",
    "bamcollate2 collate=1 filename=$input inputformat=bam outputformat=bam level=1 exclude=SECONDARY,SUPPLEMENTARY O=$temp_dir/tmpCollated.bam",
);
const HTSEQ_COUNT: CommandTemplate = CommandTemplate::new(
    "htseq_count",
    "htseq-count --format=bam --order=name --stranded=\"no\" --type=\"exon\" --idattr=\"gene_id\" --mode=\"union\" --quiet $temp_dir/tmpCollated.bam $ref | bgzip -c > $out_dir/rna_htseqcount.gz",
);

/// ### Program Name
/// run-cgprna count
///
/// Collates a BAM by read name in scratch space and counts reads per gene
/// with htseq-count, writing `rna_htseqcount.gz`.
pub fn count_genes<E: CommandExecutor>(opts: CountOpts, executor: E) -> anyhow::Result<()> {
    prog_utils::check_files_exist(&[opts.input.clone(), opts.reference.clone()])?;

    let out_dir = prepare_out_dir(&opts.output_dir)?;
    let workspace = TempWorkspace::new(&out_dir, COUNT_TEMP_PREFIX);
    let mut run = PipelineRun::new("count", &out_dir, workspace, executor);
    let temp_dir = run.workspace().path()?.to_path_buf();

    let mut params = Params::new();
    params
        .set_path("input", &prog_utils::absolute_path(&opts.input)?)
        .set_path("out_dir", &out_dir)
        .set_path("ref", &prog_utils::absolute_path(&opts.reference)?)
        .set_path("temp_dir", &temp_dir);

    run.run_templates(&[BAMCOLLATE, HTSEQ_COUNT], &params)?;
    let log_file = run.finish()?;
    info!("counting finished, run log written to {}", log_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::pipeline_utils::tests::RecordingExecutor;
    use std::fs;

    #[test]
    fn test_count() {
        let td = tempfile::tempdir().unwrap();
        let bam = td.path().join("PD1234a.bam");
        let gtf = td.path().join("genes.gtf");
        fs::write(&bam, "").unwrap();
        fs::write(&gtf, "").unwrap();
        let out_dir = td.path().join("out");
        let mut rec = RecordingExecutor::default();

        count_genes(
            CountOpts {
                input: bam.clone(),
                reference: gtf.clone(),
                output_dir: out_dir.clone(),
            },
            &mut rec,
        )
        .unwrap();

        assert_eq!(rec.invoked.len(), 2);
        let collated = rec.invoked[0]
            .rsplit_once(" O=")
            .map(|(_, o)| o.to_string())
            .unwrap();
        assert!(collated.starts_with(&out_dir.join(COUNT_TEMP_PREFIX).display().to_string()));
        assert!(collated.ends_with("/tmpCollated.bam"));
        assert!(rec.invoked[0].contains(&format!("filename={} ", bam.display())));
        assert!(rec.invoked[1].contains(&format!(
            "--quiet {} {} | bgzip -c",
            collated,
            gtf.display()
        )));
        assert!(rec.invoked[1].ends_with(&format!("> {}/rna_htseqcount.gz", out_dir.display())));

        // the collated BAM went away with the workspace
        assert!(!std::path::Path::new(&collated).parent().unwrap().exists());
    }

    #[test]
    fn test_count_missing_inputs() {
        let td = tempfile::tempdir().unwrap();
        let mut rec = RecordingExecutor::default();
        let e = count_genes(
            CountOpts {
                input: td.path().join("ghost.bam"),
                reference: td.path().join("ghost.gtf"),
                output_dir: td.path().join("out"),
            },
            &mut rec,
        )
        .unwrap_err();
        assert!(e.to_string().contains("ghost.bam"));
        assert!(e.to_string().contains("ghost.gtf"));
        assert!(rec.invoked.is_empty());
        assert!(!td.path().join("out").exists());
    }
}
