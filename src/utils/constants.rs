/// Extension a packaged reference bundle must carry.
pub(crate) static BUNDLE_EXTENSION: &str = ".tar.gz";

/// Fixed resource files the QC stage expects at the reference root.
pub(crate) static FAI_FILE: &str = "genome.fa.fai";
pub(crate) static RIBOSOMAL_RNA_BED: &str = "rRNA.bed";
pub(crate) static HOUSE_KEEPING_GENE_BED: &str = "HouseKeepingGenes.bed";
pub(crate) static REFERENCE_BED: &str = "RefSeq.bed";

pub(crate) static QC_REFERENCE_FILES: [&str; 4] = [
    FAI_FILE,
    RIBOSOMAL_RNA_BED,
    HOUSE_KEEPING_GENE_BED,
    REFERENCE_BED,
];

/// Tool family directory used by STAR inside `<species>/<ref_build>`.
pub(crate) static STAR_TOOL_FAMILY: &str = "star";
pub(crate) static GTF_PATTERN: &str = "*.gtf";

/// Workspace prefixes, one per operation that may need scratch space.
pub(crate) static MAP_TEMP_PREFIX: &str = "cgpRna_map_temp";
pub(crate) static STATS_TEMP_PREFIX: &str = "cgpRna_mappingStats_temp";
pub(crate) static COUNT_TEMP_PREFIX: &str = "cgpRna_count_temp";
pub(crate) static TOPHAT_FUSION_TEMP_PREFIX: &str = "cgpRna_tophat-fusion_temp";
pub(crate) static STAR_FUSION_TEMP_PREFIX: &str = "cgpRna_star-fusion_temp";
pub(crate) static DEFUSE_TEMP_PREFIX: &str = "cgpRna_defuse_temp";
// never created, `bigwig` needs no scratch space
pub(crate) static BIGWIG_TEMP_PREFIX: &str = "cgpRna_bigwig_temp";

/// Copy buffer used when staging gzipped reads.
pub(crate) static GUNZIP_BUFFER_SIZE: usize = 65536;
