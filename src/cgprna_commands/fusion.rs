use crate::defaults::ReferenceDefaults;
use crate::utils::constants::{
    DEFUSE_TEMP_PREFIX, STAR_FUSION_TEMP_PREFIX, TOPHAT_FUSION_TEMP_PREFIX,
};
use crate::utils::convert_utils::{self, GzipMode};
use crate::utils::input_utils::{BinaryFormat, InputClassifier, InputKind};
use crate::utils::pipeline_utils::{CommandExecutor, CommandTemplate, Params, PipelineRun};
use crate::utils::reference_utils::{
    ReferenceRequest, ReferenceResolver, ReferenceSpec, TarGzExtractor,
};
use crate::utils::workspace::TempWorkspace;

use anyhow::bail;
use tracing::info;

use super::{prepare_out_dir, FusionOpts};

const TOPHAT_FUSION: CommandTemplate = CommandTemplate::new(
    "tophat_fusion",
    "tophat_fusion.pl -s $sample_name -o $out_dir -t $threads -r $reference_data_root -sp $species -rb $ref_build -gb $gene_build $input",
);
const STAR_FUSION: CommandTemplate = CommandTemplate::new(
    "star_fusion",
    "star_fusion.pl -s $sample_name -o $out_dir -t $threads -r $reference_data_root -sp $species -rb $ref_build -gb $gene_build $input",
);
const DEFUSE_FUSION: CommandTemplate = CommandTemplate::new(
    "defuse_fusion",
    "defuse_fusion.pl -s $sample_name -o $out_dir -t $threads -r $reference_data_root -sp $species -rb $ref_build -gb $gene_build $input",
);
const DEFUSE_FILTER: CommandTemplate = CommandTemplate::new(
    "defuse_filter",
    "defuse_filters.pl -s $sample_name -o $out_dir -i $out_dir/${sample_name}.defuse-fusion.normals.filtered.txt",
);

/// The fusion callers wrapped by `run-cgprna`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionTool {
    TophatFusion,
    StarFusion,
    Defuse,
}

impl FusionTool {
    pub fn operation(self) -> &'static str {
        match self {
            FusionTool::TophatFusion => "tophat-fusion",
            FusionTool::StarFusion => "star-fusion",
            FusionTool::Defuse => "defuse",
        }
    }

    fn temp_prefix(self) -> &'static str {
        match self {
            FusionTool::TophatFusion => TOPHAT_FUSION_TEMP_PREFIX,
            FusionTool::StarFusion => STAR_FUSION_TEMP_PREFIX,
            FusionTool::Defuse => DEFUSE_TEMP_PREFIX,
        }
    }

    fn templates(self) -> &'static [CommandTemplate] {
        match self {
            FusionTool::TophatFusion => &[TOPHAT_FUSION],
            FusionTool::StarFusion => &[STAR_FUSION],
            FusionTool::Defuse => &[DEFUSE_FUSION, DEFUSE_FILTER],
        }
    }

    // the deFuse wrapper can not read gzipped FastQ
    fn gzip_mode(self) -> GzipMode {
        match self {
            FusionTool::Defuse => GzipMode::Uncompressed,
            _ => GzipMode::Compressed,
        }
    }
}

/// ### Program Name
/// run-cgprna tophat-fusion / star-fusion / defuse
///
/// All inputs are validated before anything is converted, so a badly
/// named FastQ is reported before a BAM is split. BAM inputs are then
/// converted to FastQ pairs in scratch space and every read file is handed
/// to the fusion wrapper in one call.
pub fn run_fusion<E: CommandExecutor>(
    tool: FusionTool,
    opts: FusionOpts,
    executor: E,
) -> anyhow::Result<()> {
    let inputs = InputClassifier::default().validate(&opts.input)?;
    // rejected before the output directory is made or a bundle unpacked
    if let Some(f) = inputs
        .binaries()
        .find(|f| f.kind == InputKind::PreAlignedBinary(BinaryFormat::Cram))
    {
        bail!(
            "CRAM input is not supported, please remove {} from the input and retry.",
            f.path.display()
        );
    }

    let out_dir = prepare_out_dir(&opts.output_dir)?;
    let spec = ReferenceSpec::from_path(&opts.reference, opts.reference_fields.into_fields(None))?;

    let workspace = TempWorkspace::new(&out_dir, tool.temp_prefix());
    let mut run = PipelineRun::new(tool.operation(), &out_dir, workspace, executor);

    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), TarGzExtractor);
    let reference = resolver.resolve(&spec, &ReferenceRequest::species_build(), run.workspace())?;

    let raw_reads =
        convert_utils::stage_raw_reads(&inputs, &opts.sample_name, tool.gzip_mode(), &mut run)?;

    let mut params = Params::new();
    params
        .set("sample_name", opts.sample_name.as_str())
        .set_paths("input", &raw_reads)
        .set_path("out_dir", &out_dir)
        .set("threads", opts.threads.to_string());
    reference.add_to_params(&mut params);

    run.run_templates(tool.templates(), &params)?;
    let log_file = run.finish()?;
    info!(
        "{} finished, run log written to {}",
        tool.operation(),
        log_file.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgprna_commands::ReferenceFieldOpts;
    use crate::utils::pipeline_utils::tests::RecordingExecutor;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn opts(input: Vec<PathBuf>, reference: &Path, out_dir: &Path) -> FusionOpts {
        FusionOpts {
            input,
            reference: reference.to_path_buf(),
            sample_name: String::from("PD1234a"),
            reference_fields: ReferenceFieldOpts::default(),
            output_dir: out_dir.to_path_buf(),
            threads: 8,
        }
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, "").unwrap();
        p
    }

    fn write_bundle(path: &Path, entries: &[&str]) {
        let writer = niffler::to_path(
            path,
            niffler::compression::Format::Gzip,
            niffler::Level::One,
        )
        .unwrap();
        let mut builder = tar::Builder::new(writer);
        for name in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, &b""[..]).unwrap();
        }
        drop(builder.into_inner().unwrap());
    }

    #[test]
    fn test_star_fusion_with_bundle_defaults() {
        let td = tempfile::tempdir().unwrap();
        let bundle = td.path().join("ref_bundle.tar.gz");
        write_bundle(&bundle, &["star-fusion/ensembl/ref_annot.gtf"]);
        let reads = vec![touch(td.path(), "s_1.fq.gz"), touch(td.path(), "s_2.fq.gz")];
        let out_dir = td.path().join("out");
        let mut rec = RecordingExecutor::default();

        run_fusion(
            FusionTool::StarFusion,
            opts(reads.clone(), &bundle, &out_dir),
            &mut rec,
        )
        .unwrap();

        assert_eq!(rec.invoked.len(), 1);
        let cmd = &rec.invoked[0];
        assert!(cmd.starts_with(&format!(
            "star_fusion.pl -s PD1234a -o {} -t 8 -r {}.",
            out_dir.display(),
            out_dir.join(STAR_FUSION_TEMP_PREFIX).display()
        )));
        assert!(cmd.contains(
            "/ref_bundle -sp unspecified_species -rb unspecified_ref_build -gb ensembl "
        ));
        assert!(cmd.ends_with(&format!("{} {}", reads[0].display(), reads[1].display())));
        assert!(out_dir.join("cgprna_star-fusion_log.json").is_file());
    }

    #[test]
    fn test_defuse_converts_bams_uncompressed() {
        let td = tempfile::tempdir().unwrap();
        let reference = td.path().join("ref");
        fs::create_dir_all(&reference).unwrap();
        let bam = touch(td.path(), "lane1.bam");
        let out_dir = td.path().join("out");
        let mut rec = RecordingExecutor::default();

        let mut o = opts(vec![bam.clone()], &reference, &out_dir);
        o.reference_fields = ReferenceFieldOpts {
            species: Some(String::from("human")),
            ref_build: Some(String::from("GRCh37d5")),
            gene_build: Some(String::from("e75")),
        };
        run_fusion(FusionTool::Defuse, o, &mut rec).unwrap();

        assert_eq!(rec.invoked.len(), 3);
        assert!(rec.invoked[0].starts_with("bamtofastq "));
        assert!(!rec.invoked[0].contains("gz=1"));
        assert!(rec.invoked[1].starts_with("defuse_fusion.pl "));
        assert!(rec.invoked[1].contains(&format!(
            "-r {} -sp human -rb GRCh37d5 -gb e75 ",
            reference.display()
        )));
        assert!(rec.invoked[1].contains("/PD1234a.1_1.fq "));
        assert!(rec.invoked[1].ends_with("/PD1234a.1_2.fq"));
        assert_eq!(
            rec.invoked[2],
            format!(
                "defuse_filters.pl -s PD1234a -o {o} -i {o}/PD1234a.defuse-fusion.normals.filtered.txt",
                o = out_dir.display()
            )
        );
        let log = out_dir.join("cgprna_defuse_log.json");
        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(log).unwrap()).unwrap();
        assert_eq!(v["cmd_info"][0]["stage"], "bamtofastq");
        assert_eq!(v["cmd_info"][2]["stage"], "defuse_filter");

        // scratch space with the converted reads is gone
        let leftovers = fs::read_dir(&out_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(DEFUSE_TEMP_PREFIX))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_fusion_validation_runs_first() {
        let td = tempfile::tempdir().unwrap();
        let reference = td.path().join("ref");
        fs::create_dir_all(&reference).unwrap();
        let out_dir = td.path().join("out");
        let mut rec = RecordingExecutor::default();

        // a BAM that could be converted, next to a FastQ whose mate is missing
        let o = opts(
            vec![touch(td.path(), "lane1.bam"), touch(td.path(), "s_2.fq.gz")],
            &reference,
            &out_dir,
        );
        let e = run_fusion(FusionTool::TophatFusion, o, &mut rec).unwrap_err();
        assert!(e.to_string().contains("first mate"));

        // a directory reference needs species, build and gene build
        let o = opts(vec![touch(td.path(), "lane1.bam")], &reference, &out_dir);
        let e = run_fusion(FusionTool::TophatFusion, o, &mut rec).unwrap_err();
        assert!(e.to_string().contains("--species"));
        assert!(e.to_string().contains("--reference-build"));
        assert!(e.to_string().contains("--gene-build"));

        assert!(rec.invoked.is_empty());
    }

    #[test]
    fn test_cram_rejected_before_conversion() {
        let td = tempfile::tempdir().unwrap();
        let bundle = td.path().join("ref_bundle.tar.gz");
        write_bundle(&bundle, &["tophat/ensembl/genes.gtf"]);
        let out_dir = td.path().join("out");
        let mut rec = RecordingExecutor::default();

        let o = opts(
            vec![touch(td.path(), "lane1.bam"), touch(td.path(), "lane2.cram")],
            &bundle,
            &out_dir,
        );
        let e = run_fusion(FusionTool::TophatFusion, o, &mut rec).unwrap_err();
        assert!(e.to_string().contains("lane2.cram"));
        assert!(rec.invoked.is_empty());
        // rejected before the output directory is made or the bundle unpacked
        assert!(!out_dir.exists());
    }
}
