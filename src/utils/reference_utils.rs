use globset::Glob;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::defaults::ReferenceDefaults;
use crate::utils::constants::BUNDLE_EXTENSION;
use crate::utils::pipeline_utils::Params;
use crate::utils::workspace::{TempWorkspace, WorkspaceError};

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("could not locate reference: {0}")]
    NotFound(PathBuf),
    #[error("wrong input format. \"--reference\" can only be a tar.gz file or a folder: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("missing required input. When \"--reference\" is not a reference bundle tar file, you have to provide: {}", join_flags(.0))]
    MissingFields(Vec<RefField>),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("could not create reference directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("unexpected error when extracting {archive} to {destination}: {source}")]
    Extraction {
        archive: PathBuf,
        destination: PathBuf,
        source: io::Error,
    },
    #[error("invalid annotation file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
    #[error("could not search {dir} for annotation files: {source}")]
    Search {
        dir: PathBuf,
        source: walkdir::Error,
    },
    #[error("ambiguous or missing annotation file: expected exactly one file matching {pattern} under {}, found {}", .dir.display(), describe_matches(.matches))]
    Annotation {
        dir: PathBuf,
        pattern: String,
        matches: Vec<PathBuf>,
    },
    #[error("the reference at {} is missing required file(s): {}", .root.display(), .files.join(", "))]
    MissingFiles { root: PathBuf, files: Vec<String> },
}

fn join_flags(fields: &[RefField]) -> String {
    fields
        .iter()
        .map(|f| f.flag_name())
        .collect::<Vec<&str>>()
        .join(", ")
}

fn describe_matches(matches: &[PathBuf]) -> String {
    if matches.is_empty() {
        String::from("none")
    } else {
        matches
            .iter()
            .map(|m| m.display().to_string())
            .collect::<Vec<String>>()
            .join(", ")
    }
}

/// The descriptive fields that locate files inside a reference root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum RefField {
    Species,
    RefBuild,
    GeneBuild,
    GeneBuildGtfName,
}

impl RefField {
    /// The command-line flag a user sets this field with.
    pub fn flag_name(&self) -> &'static str {
        match self {
            RefField::Species => "--species",
            RefField::RefBuild => "--reference-build",
            RefField::GeneBuild => "--gene-build",
            RefField::GeneBuildGtfName => "--gene-build-gtf-name",
        }
    }

    /// The placeholder name used for this field in command templates.
    pub fn param_name(&self) -> &'static str {
        match self {
            RefField::Species => "species",
            RefField::RefBuild => "ref_build",
            RefField::GeneBuild => "gene_build",
            RefField::GeneBuildGtfName => "gene_build_gtf_name",
        }
    }
}

impl fmt::Display for RefField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flag_name())
    }
}

impl ReferenceDefaults {
    pub fn value(&self, field: RefField) -> &str {
        match field {
            RefField::Species => &self.species,
            RefField::RefBuild => &self.ref_build,
            RefField::GeneBuild => &self.gene_build,
            RefField::GeneBuildGtfName => &self.gene_build_gtf_name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceFields {
    pub species: Option<String>,
    pub ref_build: Option<String>,
    pub gene_build: Option<String>,
    pub gene_build_gtf_name: Option<String>,
}

impl ReferenceFields {
    pub fn get(&self, field: RefField) -> Option<&str> {
        match field {
            RefField::Species => self.species.as_deref(),
            RefField::RefBuild => self.ref_build.as_deref(),
            RefField::GeneBuild => self.gene_build.as_deref(),
            RefField::GeneBuildGtfName => self.gene_build_gtf_name.as_deref(),
        }
    }

    pub fn set(&mut self, field: RefField, value: String) {
        let slot = match field {
            RefField::Species => &mut self.species,
            RefField::RefBuild => &mut self.ref_build,
            RefField::GeneBuild => &mut self.gene_build,
            RefField::GeneBuildGtfName => &mut self.gene_build_gtf_name,
        };
        *slot = Some(value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSource {
    /// a packaged `.tar.gz` bundle
    Archive(PathBuf),
    /// an already expanded reference root
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub source: ReferenceSource,
    pub fields: ReferenceFields,
}

impl ReferenceSpec {
    /// Decides whether `path` is a bundle or a reference root directory.
    /// Any existing file that is not a bundle is rejected.
    pub fn from_path(path: &Path, fields: ReferenceFields) -> Result<Self, ReferenceError> {
        let abs_path =
            std::path::absolute(path).map_err(|_| ReferenceError::NotFound(path.to_path_buf()))?;
        let source = if abs_path.is_dir() {
            ReferenceSource::Directory(abs_path)
        } else if !abs_path.is_file() {
            return Err(ReferenceError::NotFound(abs_path));
        } else if bundle_stem(&abs_path).is_none() {
            return Err(ReferenceError::UnsupportedFormat(abs_path));
        } else {
            ReferenceSource::Archive(abs_path)
        };
        Ok(Self { source, fields })
    }
}

/// Name of the bundle without its extension, if the path is a bundle.
fn bundle_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    name.strip_suffix(BUNDLE_EXTENSION)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// A single annotation file to locate inside
/// `<species>/<ref_build>/<tool_family>/<gene_build>` after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationSearch {
    pub tool_family: &'static str,
    pub pattern: &'static str,
}

/// What an operation needs from its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRequest {
    pub required: Vec<RefField>,
    pub annotation: Option<AnnotationSearch>,
}

impl ReferenceRequest {
    /// QC resources live at the root, so nothing needs to be known about the
    /// layout.
    pub fn flat() -> Self {
        Self {
            required: Vec::new(),
            annotation: None,
        }
    }

    /// Tools that locate their files from species, build and gene build.
    pub fn species_build() -> Self {
        Self {
            required: vec![RefField::Species, RefField::RefBuild, RefField::GeneBuild],
            annotation: None,
        }
    }

    /// Tools that additionally need the name of the annotation file found in
    /// the gene build directory of `tool_family`.
    pub fn with_annotation(tool_family: &'static str, pattern: &'static str) -> Self {
        Self {
            required: vec![
                RefField::Species,
                RefField::RefBuild,
                RefField::GeneBuild,
                RefField::GeneBuildGtfName,
            ],
            annotation: Some(AnnotationSearch {
                tool_family,
                pattern,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    /// absolute reference root handed to the downstream tools
    pub root: PathBuf,
    pub fields: ReferenceFields,
    pub annotation_file: Option<PathBuf>,
}

impl ResolvedReference {
    /// Sets `reference_data_root` and every known descriptive field.
    pub fn add_to_params(&self, params: &mut Params) {
        params.set_path("reference_data_root", &self.root);
        for field in RefField::iter() {
            if let Some(v) = self.fields.get(field) {
                params.set(field.param_name(), v);
            }
        }
    }

    /// Checks that each of `names` exists directly under the root, reporting
    /// all missing ones together.
    pub fn require_files(&self, names: &[&str]) -> Result<(), ReferenceError> {
        let missing = names
            .iter()
            .filter(|n| !self.root.join(n).is_file())
            .map(|n| n.to_string())
            .collect::<Vec<String>>();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReferenceError::MissingFiles {
                root: self.root.clone(),
                files: missing,
            })
        }
    }
}

/// Unpacks a reference bundle into a directory.
pub trait ArchiveExtractor {
    /// Extracts `archive` into `destination`, creating it if needed.
    fn extract(&self, archive: &Path, destination: &Path) -> io::Result<()>;
}

/// Extracts gzip (or otherwise niffler-readable) compressed tar files.
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> io::Result<()> {
        info!("untar files to {} ...", destination.display());
        fs::create_dir_all(destination)?;
        let (reader, format) = niffler::from_path(archive).map_err(io::Error::other)?;
        tracing::debug!("reading {} as {:?}", archive.display(), format);
        let mut tar = tar::Archive::new(reader);
        tar.unpack(destination)?;
        info!("done.");
        Ok(())
    }
}

pub struct ReferenceResolver<X: ArchiveExtractor = TarGzExtractor> {
    defaults: ReferenceDefaults,
    extractor: X,
}

impl<X: ArchiveExtractor> ReferenceResolver<X> {
    pub fn new(defaults: ReferenceDefaults, extractor: X) -> Self {
        Self {
            defaults,
            extractor,
        }
    }

    /// Turns `spec` into a reference root plus finalized field values.
    ///
    /// A directory is used as is and must come with every field `request`
    /// requires. A bundle has its missing fields defaulted and is extracted
    /// into `<workspace>/<bundle>/<species>/<ref_build>` (or directly into
    /// `<workspace>/<bundle>` when no fields are required). All checks that
    /// can fail without touching the disk run before the workspace is
    /// created.
    pub fn resolve(
        &self,
        spec: &ReferenceSpec,
        request: &ReferenceRequest,
        workspace: &mut TempWorkspace,
    ) -> Result<ResolvedReference, ReferenceError> {
        match &spec.source {
            ReferenceSource::Directory(dir) => self.resolve_directory(dir, &spec.fields, request),
            ReferenceSource::Archive(archive) => {
                self.resolve_archive(archive, &spec.fields, request, workspace)
            }
        }
    }

    fn resolve_directory(
        &self,
        dir: &Path,
        fields: &ReferenceFields,
        request: &ReferenceRequest,
    ) -> Result<ResolvedReference, ReferenceError> {
        if !dir.is_dir() {
            return Err(ReferenceError::NotFound(dir.to_path_buf()));
        }
        let missing = request
            .required
            .iter()
            .filter(|f| fields.get(**f).is_none())
            .copied()
            .collect::<Vec<RefField>>();
        if !missing.is_empty() {
            return Err(ReferenceError::MissingFields(missing));
        }

        let root =
            std::path::absolute(dir).map_err(|_| ReferenceError::NotFound(dir.to_path_buf()))?;
        Ok(ResolvedReference {
            root,
            fields: fields.clone(),
            annotation_file: None,
        })
    }

    fn resolve_archive(
        &self,
        archive: &Path,
        given: &ReferenceFields,
        request: &ReferenceRequest,
        workspace: &mut TempWorkspace,
    ) -> Result<ResolvedReference, ReferenceError> {
        let stem = bundle_stem(archive)
            .ok_or_else(|| ReferenceError::UnsupportedFormat(archive.to_path_buf()))?;
        if !archive.is_file() {
            return Err(ReferenceError::NotFound(archive.to_path_buf()));
        }

        let mut fields = given.clone();
        for field in &request.required {
            if fields.get(*field).is_none() {
                let v = self.defaults.value(*field).to_string();
                info!("Set \"{}\" to default: {}", field.flag_name(), v);
                fields.set(*field, v);
            }
            if *field == RefField::GeneBuild {
                info!(
                    "Make sure a folder named \"{}\" exists in the ref bundle.",
                    fields.gene_build.as_deref().unwrap_or_default()
                );
            }
        }

        let root = workspace.path()?.join(stem);
        let destination = match (fields.species.as_deref(), fields.ref_build.as_deref()) {
            (Some(species), Some(ref_build)) if !request.required.is_empty() => {
                root.join(species).join(ref_build)
            }
            _ => root.clone(),
        };
        fs::create_dir_all(&destination).map_err(|source| ReferenceError::CreateDir {
            path: destination.clone(),
            source,
        })?;

        self.extractor
            .extract(archive, &destination)
            .map_err(|source| ReferenceError::Extraction {
                archive: archive.to_path_buf(),
                destination: destination.clone(),
                source,
            })?;

        let mut annotation_file = None;
        if let Some(search) = request.annotation {
            let gene_build = fields
                .get(RefField::GeneBuild)
                .unwrap_or(self.defaults.value(RefField::GeneBuild));
            let dir = destination.join(search.tool_family).join(gene_build);
            let found = find_single_file(&dir, search.pattern)?;
            let found_name = found
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if let Some(explicit) = given.get(RefField::GeneBuildGtfName) {
                if explicit != found_name {
                    warn!(
                        "{} was set to \"{}\", but the reference bundle provides \"{}\", which will be used instead.",
                        RefField::GeneBuildGtfName.flag_name(),
                        explicit,
                        found_name
                    );
                }
            }
            fields.set(RefField::GeneBuildGtfName, found_name);
            annotation_file = Some(found);
        }

        Ok(ResolvedReference {
            root,
            fields,
            annotation_file,
        })
    }
}

/// Recursively searches `dir` for files whose name matches `pattern`.
/// Exactly one match is required.
pub fn find_single_file(dir: &Path, pattern: &str) -> Result<PathBuf, ReferenceError> {
    let matcher = Glob::new(pattern)
        .map_err(|source| ReferenceError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?
        .compile_matcher();

    let mut matches = Vec::new();
    if dir.is_dir() {
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|source| ReferenceError::Search {
                dir: dir.to_path_buf(),
                source,
            })?;
            if entry.file_type().is_file() && matcher.is_match(entry.file_name()) {
                matches.push(entry.into_path());
            }
        }
    }

    if matches.len() == 1 {
        Ok(matches.remove(0))
    } else {
        Err(ReferenceError::Annotation {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
            matches,
        })
    }
}

#[cfg(test)]
mod tests;
