use crate::utils::prog_utils;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use tabled::{settings::Style, Table, Tabled};
use tracing::warn;

/// External programs the pipelines invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum ExternalTool {
    StarMapping,
    BamMarkDuplicates,
    BamIndex,
    BamStats,
    SplitBam,
    GeneBodyCoverage,
    ReadDistribution,
    ProcessQcStats,
    BamToBw,
    BamCollate,
    HtseqCount,
    Bgzip,
    BamToFastq,
    TophatFusion,
    StarFusion,
    DefuseFusion,
    DefuseFilters,
}

impl ExternalTool {
    pub fn executable(self) -> &'static str {
        match self {
            ExternalTool::StarMapping => "star_mapping.pl",
            ExternalTool::BamMarkDuplicates => "bammarkduplicates2",
            ExternalTool::BamIndex => "bamindex",
            ExternalTool::BamStats => "bam_stats",
            ExternalTool::SplitBam => "split_bam.py",
            ExternalTool::GeneBodyCoverage => "geneBody_coverage.py",
            ExternalTool::ReadDistribution => "read_distribution.py",
            ExternalTool::ProcessQcStats => "process_qcstats.pl",
            ExternalTool::BamToBw => "bamToBw.pl",
            ExternalTool::BamCollate => "bamcollate2",
            ExternalTool::HtseqCount => "htseq-count",
            ExternalTool::Bgzip => "bgzip",
            ExternalTool::BamToFastq => "bamtofastq",
            ExternalTool::TophatFusion => "tophat_fusion.pl",
            ExternalTool::StarFusion => "star_fusion.pl",
            ExternalTool::DefuseFusion => "defuse_fusion.pl",
            ExternalTool::DefuseFilters => "defuse_filters.pl",
        }
    }

    pub fn used_by(self) -> &'static str {
        match self {
            ExternalTool::StarMapping
            | ExternalTool::BamMarkDuplicates
            | ExternalTool::BamIndex => "map",
            ExternalTool::BamStats
            | ExternalTool::SplitBam
            | ExternalTool::GeneBodyCoverage
            | ExternalTool::ReadDistribution
            | ExternalTool::ProcessQcStats => "stats",
            ExternalTool::BamToBw => "bigwig",
            ExternalTool::BamCollate | ExternalTool::HtseqCount | ExternalTool::Bgzip => "count",
            ExternalTool::BamToFastq => "tophat-fusion, star-fusion, defuse",
            ExternalTool::TophatFusion => "tophat-fusion",
            ExternalTool::StarFusion => "star-fusion",
            ExternalTool::DefuseFusion | ExternalTool::DefuseFilters => "defuse",
        }
    }
}

#[derive(Tabled)]
struct ToolEntry {
    program: &'static str,
    used_by: &'static str,
    path: String,
}

fn tool_entries() -> Vec<ToolEntry> {
    ExternalTool::iter()
        .map(|t| ToolEntry {
            program: t.executable(),
            used_by: t.used_by(),
            path: match prog_utils::get_which_executable(t.executable()) {
                Ok(p) => p.display().to_string(),
                Err(_) => String::from("N/A*"),
            },
        })
        .collect()
}

/// ### Program Name
/// run-cgprna inspect
///
/// Prints where each external program is found on the `PATH`.
pub fn inspect_tools(version: &str) -> anyhow::Result<()> {
    let entries = tool_entries();
    let n_missing = entries.iter().filter(|e| e.path == "N/A*").count();
    println!("run-cgprna {}", version);
    println!("{}", Table::new(entries).with(Style::rounded()));
    if n_missing > 0 {
        println!("* : not found on the PATH");
        warn!(
            "{} external program(s) could not be found, the pipelines using them will fail",
            n_missing
        );
    }
    Ok(())
}
