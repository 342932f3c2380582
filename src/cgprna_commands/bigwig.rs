use crate::utils::constants::BIGWIG_TEMP_PREFIX;
use crate::utils::pipeline_utils::{CommandExecutor, CommandTemplate, Params, PipelineRun};
use crate::utils::prog_utils;
use crate::utils::workspace::TempWorkspace;

use anyhow::bail;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{prepare_out_dir, BigwigOpts};

const BIGWIG: CommandTemplate = CommandTemplate::new(
    "bam_to_bigwig",
    "bamToBw.pl -o $out_dir -t $threads -r $ref -b $input",
);

/// `bamToBw.pl` needs the BAM index next to the BAM, named either
/// `<name>.bam.bai` or `<name>.bai`.
fn find_bam_index(bam: &Path) -> Option<PathBuf> {
    let mut with_bai = bam.as_os_str().to_owned();
    with_bai.push(".bai");
    [PathBuf::from(with_bai), bam.with_extension("bai")]
        .into_iter()
        .find(|p| p.is_file())
}

/// ### Program Name
/// run-cgprna bigwig
///
/// Generates a bigwig coverage file from an indexed BAM.
pub fn generate_bigwig<E: CommandExecutor>(opts: BigwigOpts, executor: E) -> anyhow::Result<()> {
    prog_utils::check_files_exist(&[opts.input.clone(), opts.reference.clone()])?;
    let input = prog_utils::absolute_path(&opts.input)?;
    match find_bam_index(&input) {
        Some(bai) => info!("using BAM index {}", bai.display()),
        None => bail!(
            "Could not find the index of {}, please index the BAM file first.",
            input.display()
        ),
    }

    let out_dir = prepare_out_dir(&opts.output_dir)?;
    let workspace = TempWorkspace::new(&out_dir, BIGWIG_TEMP_PREFIX);
    let mut run = PipelineRun::new("bigwig", &out_dir, workspace, executor);

    let mut params = Params::new();
    params
        .set("threads", opts.threads.to_string())
        .set_path("input", &input)
        .set_path("out_dir", &out_dir)
        .set_path("ref", &prog_utils::absolute_path(&opts.reference)?);

    run.run_templates(&[BIGWIG], &params)?;
    run.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::pipeline_utils::tests::RecordingExecutor;
    use std::fs;

    #[test]
    fn test_find_bam_index() {
        let td = tempfile::tempdir().unwrap();
        let bam = td.path().join("PD1234a.bam");
        fs::write(&bam, "").unwrap();
        assert_eq!(find_bam_index(&bam), None);

        fs::write(td.path().join("PD1234a.bai"), "").unwrap();
        assert_eq!(find_bam_index(&bam), Some(td.path().join("PD1234a.bai")));

        // `<name>.bam.bai` is preferred when both exist
        fs::write(td.path().join("PD1234a.bam.bai"), "").unwrap();
        assert_eq!(
            find_bam_index(&bam),
            Some(td.path().join("PD1234a.bam.bai"))
        );
    }

    #[test]
    fn test_bigwig() {
        let td = tempfile::tempdir().unwrap();
        let bam = td.path().join("PD1234a.bam");
        let fasta = td.path().join("genome.fa");
        let out_dir = td.path().join("out");
        fs::write(&bam, "").unwrap();
        fs::write(&fasta, "").unwrap();
        let o = BigwigOpts {
            input: bam.clone(),
            reference: fasta.clone(),
            output_dir: out_dir.clone(),
            threads: 2,
        };
        let mut rec = RecordingExecutor::default();

        // not indexed yet
        assert!(generate_bigwig(o.clone(), &mut rec).is_err());
        assert!(rec.invoked.is_empty());

        fs::write(td.path().join("PD1234a.bam.bai"), "").unwrap();
        generate_bigwig(o, &mut rec).unwrap();
        assert_eq!(
            rec.invoked,
            vec![format!(
                "bamToBw.pl -o {} -t 2 -r {} -b {}",
                out_dir.display(),
                fasta.display(),
                bam.display()
            )]
        );
        // no scratch space is ever made
        let entries = fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<String>>();
        assert_eq!(entries, vec![String::from("cgprna_bigwig_log.json")]);
    }
}
