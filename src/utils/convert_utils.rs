use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::utils::constants::GUNZIP_BUFFER_SIZE;
use crate::utils::input_utils::{BinaryFormat, ClassifiedInputs, InputKind};
use crate::utils::pipeline_utils::{
    CommandExecutor, CommandTemplate, Params, PipelineError, PipelineRun,
};
use crate::utils::workspace::WorkspaceError;

const BAM_TO_FASTQ: CommandTemplate = CommandTemplate::new(
    "bamtofastq",
    "bamtofastq exclude=SECONDARY,SUPPLEMENTARY T=$bam2fq_tmp S=$bam2fq_tmp_single_end O=$bam2fq_tmp_unmatched O2=$bam2fq_tmp_unmatched2 gz=1 level=1 F=$bam2fq_tmp_matched F2=$bam2fq_tmp_matched_2 filename=$in_bam",
);

// deFuse and its wrapper cannot read gzipped FASTQ
const BAM_TO_FASTQ_UNCOMPRESSED: CommandTemplate = CommandTemplate::new(
    "bamtofastq",
    "bamtofastq exclude=SECONDARY,SUPPLEMENTARY T=$bam2fq_tmp S=$bam2fq_tmp_single_end O=$bam2fq_tmp_unmatched O2=$bam2fq_tmp_unmatched2 F=$bam2fq_tmp_matched F2=$bam2fq_tmp_matched_2 filename=$in_bam",
);

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{0} is in a format that is not supported, please remove it from the input and retry")]
    UnsupportedFormat(PathBuf),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("could not decompress {path}: {source}")]
    Decompress { path: PathBuf, source: io::Error },
}

/// Whether staged raw reads should be gzip compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GzipMode {
    Compressed,
    Uncompressed,
}

impl GzipMode {
    fn fq_suffix(self) -> &'static str {
        match self {
            GzipMode::Compressed => "fq.gz",
            GzipMode::Uncompressed => "fq",
        }
    }

    fn template(self) -> CommandTemplate {
        match self {
            GzipMode::Compressed => BAM_TO_FASTQ,
            GzipMode::Uncompressed => BAM_TO_FASTQ_UNCOMPRESSED,
        }
    }
}

/// Turns validated inputs into the list of raw-read files the fusion
/// wrappers take.
///
/// Every BAM is split into a read pair inside the run's workspace, named
/// `<sample_name>.<N>_1.<suffix>` / `<sample_name>.<N>_2.<suffix>` where `N`
/// counts BAMs from 1. Raw reads are passed through, except that in
/// [`GzipMode::Uncompressed`] gzipped ones are decompressed into the
/// workspace first. The returned paths keep the input order.
///
/// CRAM anywhere in the list fails the call before anything is converted.
pub fn stage_raw_reads<E: CommandExecutor>(
    inputs: &ClassifiedInputs,
    sample_name: &str,
    mode: GzipMode,
    run: &mut PipelineRun<E>,
) -> Result<Vec<PathBuf>, ConvertError> {
    if let Some(cram) = inputs
        .binaries()
        .find(|f| f.kind == InputKind::PreAlignedBinary(BinaryFormat::Cram))
    {
        return Err(ConvertError::UnsupportedFormat(cram.path.clone()));
    }

    let mut raw_reads = Vec::with_capacity(inputs.files.len());
    let mut bam_count = 1;

    for f in &inputs.files {
        match &f.kind {
            InputKind::PreAlignedBinary(_) => {
                let ws = run.workspace().path()?.to_path_buf();
                let lane = format!("{}.{}", sample_name, bam_count);
                let suffix = mode.fq_suffix();
                let matched = ws.join(format!("{}_1.{}", lane, suffix));
                let matched_2 = ws.join(format!("{}_2.{}", lane, suffix));

                let mut params = Params::new();
                params
                    .set_path("bam2fq_tmp", &ws.join(&lane))
                    .set_path("bam2fq_tmp_single_end", &ws.join(format!("{}.s", lane)))
                    .set_path("bam2fq_tmp_unmatched", &ws.join(format!("{}.o1", lane)))
                    .set_path("bam2fq_tmp_unmatched2", &ws.join(format!("{}.o2", lane)))
                    .set_path("bam2fq_tmp_matched", &matched)
                    .set_path("bam2fq_tmp_matched_2", &matched_2)
                    .set_path("in_bam", &f.path);
                run.run_templates(&[mode.template()], &params)?;

                raw_reads.push(matched);
                raw_reads.push(matched_2);
                bam_count += 1;
            }
            _ => {
                let gz_name = f
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_suffix(".gz"));
                match (mode, gz_name) {
                    (GzipMode::Uncompressed, Some(name)) => {
                        let dest = run.workspace().path()?.join(name);
                        gunzip(&f.path, &dest).map_err(|source| ConvertError::Decompress {
                            path: f.path.clone(),
                            source,
                        })?;
                        raw_reads.push(dest);
                    }
                    _ => raw_reads.push(f.path.clone()),
                }
            }
        }
    }
    Ok(raw_reads)
}

/// Decompresses `source` into `dest`, overwriting it.
pub fn gunzip(source: &Path, dest: &Path) -> io::Result<()> {
    info!("unzipping {} ...", source.display());
    let (mut reader, _format) = niffler::from_path(source).map_err(io::Error::other)?;
    let mut writer = BufWriter::with_capacity(GUNZIP_BUFFER_SIZE, File::create(dest)?);
    io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    info!("done.");
    Ok(())
}
