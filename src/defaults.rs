/// default parameters shared by the pipeline commands
pub trait DefaultPipelineParams {
    const THREADS: u32;
    const OUTPUT_DIR: &'static str;
}

pub struct DefaultParams;

impl DefaultPipelineParams for DefaultParams {
    const THREADS: u32 = 1;
    const OUTPUT_DIR: &'static str = ".";
}

/// The values used to fill in descriptive reference fields that were not
/// given on the command line when the reference is a packaged bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDefaults {
    pub species: String,
    pub ref_build: String,
    pub gene_build: String,
    pub gene_build_gtf_name: String,
}

impl Default for ReferenceDefaults {
    fn default() -> Self {
        Self {
            species: String::from("unspecified_species"),
            ref_build: String::from("unspecified_ref_build"),
            gene_build: String::from("ensembl"),
            gene_build_gtf_name: String::from("ensembl.gtf"),
        }
    }
}
