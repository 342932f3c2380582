use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("no input files were given")]
    NoInputs,
    #[error("can not find input file: {0}")]
    NotFound(PathBuf),
    #[error("could not resolve the absolute path of input file: {0}")]
    Unresolvable(PathBuf),
    #[error("file name does not follow the expected `<prefix>_<1|2>.f(ast)q[.gz]` convention: {0}")]
    UnrecognizedName(PathBuf),
    #[error("too many '_{mate}' mate files for prefix: {pair_key}. Possibly redundant file: {path}")]
    DuplicateMate {
        pair_key: String,
        mate: u8,
        path: PathBuf,
    },
    #[error("can not find the second mate file of: {0}")]
    MissingSecondMate(String),
    #[error("can not find the first mate file of: {0}")]
    MissingFirstMate(String),
}

/// Which end of a read pair a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MateIndex {
    First = 1,
    Second = 2,
}

impl MateIndex {
    pub fn value(self) -> u8 {
        self as u8
    }

    fn from_digit(s: &str) -> Option<MateIndex> {
        match s {
            "1" => Some(MateIndex::First),
            "2" => Some(MateIndex::Second),
            _ => None,
        }
    }
}

impl fmt::Display for MateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Bam,
    Cram,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    PreAlignedBinary(BinaryFormat),
    PairedReadMate { pair_key: String, mate: MateIndex },
    UnpairedRead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInputFile {
    /// always absolute
    pub path: PathBuf,
    pub kind: InputKind,
}

impl RawInputFile {
    pub fn is_binary(&self) -> bool {
        matches!(self.kind, InputKind::PreAlignedBinary(_))
    }
}

/// Recognizes the naming convention that ties the two mate files of a read
/// pair together.
pub trait MateRecognizer {
    /// Returns the pair key and mate index encoded in `file_name`, or `None`
    /// if the name does not follow the convention.
    fn recognize(&self, file_name: &str) -> Option<(String, MateIndex)>;
}

/// `<pair_key>_1.fq.gz` / `<pair_key>_2.fastq` and friends.
pub struct FastqMateRecognizer {
    re: Regex,
}

impl Default for FastqMateRecognizer {
    fn default() -> Self {
        Self {
            re: Regex::new(r"^(.*)_([12])\.f(?:ast)?q(?:\.gz)?$")
                .expect("mate naming pattern is a valid regex"),
        }
    }
}

impl MateRecognizer for FastqMateRecognizer {
    fn recognize(&self, file_name: &str) -> Option<(String, MateIndex)> {
        let caps = self.re.captures(file_name)?;
        let mate = MateIndex::from_digit(caps.get(2)?.as_str())?;
        Some((caps.get(1)?.as_str().to_string(), mate))
    }
}

/// The validated input list, in the order it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedInputs {
    pub files: Vec<RawInputFile>,
    pub pair_keys: Vec<String>,
}

impl ClassifiedInputs {
    pub fn binaries(&self) -> impl Iterator<Item = &RawInputFile> {
        self.files.iter().filter(|f| f.is_binary())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

pub struct InputClassifier<R: MateRecognizer = FastqMateRecognizer> {
    recognizer: R,
}

impl Default for InputClassifier<FastqMateRecognizer> {
    fn default() -> Self {
        Self::new(FastqMateRecognizer::default())
    }
}

impl<R: MateRecognizer> InputClassifier<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    /// Infers the kind of a single file. The file must exist.
    pub fn classify(&self, path: &Path) -> Result<RawInputFile, InputError> {
        if !path.exists() {
            return Err(InputError::NotFound(path.to_path_buf()));
        }
        let abs_path =
            std::path::absolute(path).map_err(|_| InputError::Unresolvable(path.to_path_buf()))?;
        let file_name = abs_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let kind = if file_name.ends_with(".bam") {
            InputKind::PreAlignedBinary(BinaryFormat::Bam)
        } else if file_name.ends_with(".cram") {
            InputKind::PreAlignedBinary(BinaryFormat::Cram)
        } else {
            match self.recognizer.recognize(&file_name) {
                Some((pair_key, mate)) => InputKind::PairedReadMate { pair_key, mate },
                None => InputKind::UnpairedRead,
            }
        };
        debug!("classified {} as {:?}", abs_path.display(), kind);
        Ok(RawInputFile {
            path: abs_path,
            kind,
        })
    }

    /// Classifies every path and checks that raw-read files come in complete
    /// pairs. Nothing is touched on disk, so this can run before any
    /// expensive work is started.
    pub fn validate(&self, paths: &[PathBuf]) -> Result<ClassifiedInputs, InputError> {
        if paths.is_empty() {
            return Err(InputError::NoInputs);
        }

        // mate 1 adds 1 and mate 2 adds 2, so a complete pair sums to 3
        let mut pairs: BTreeMap<String, u8> = BTreeMap::new();
        let mut pair_keys = Vec::new();
        let mut files = Vec::with_capacity(paths.len());

        for p in paths {
            let f = self.classify(p)?;
            match &f.kind {
                InputKind::PreAlignedBinary(_) => {}
                InputKind::UnpairedRead => {
                    return Err(InputError::UnrecognizedName(f.path));
                }
                InputKind::PairedReadMate { pair_key, mate } => {
                    let seen = pairs.entry(pair_key.clone()).or_insert_with(|| {
                        pair_keys.push(pair_key.clone());
                        0
                    });
                    if *seen == mate.value() || *seen == 3 {
                        return Err(InputError::DuplicateMate {
                            pair_key: pair_key.clone(),
                            mate: mate.value(),
                            path: f.path.clone(),
                        });
                    }
                    *seen += mate.value();
                }
            }
            files.push(f);
        }

        for key in &pair_keys {
            match pairs.get(key) {
                Some(3) => {}
                Some(1) => return Err(InputError::MissingSecondMate(key.clone())),
                _ => return Err(InputError::MissingFirstMate(key.clone())),
            }
        }

        Ok(ClassifiedInputs { files, pair_keys })
    }
}
