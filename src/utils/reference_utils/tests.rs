use super::*;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

type Calls = Rc<RefCell<Vec<(PathBuf, PathBuf)>>>;

/// Pretends to unpack a bundle by writing empty files at the given relative
/// paths, and remembers where it was asked to extract to.
struct StubExtractor {
    files: Vec<&'static str>,
    calls: Calls,
}

impl StubExtractor {
    fn new(files: Vec<&'static str>) -> (Self, Calls) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                files,
                calls: Rc::clone(&calls),
            },
            calls,
        )
    }
}

impl ArchiveExtractor for StubExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> io::Result<()> {
        assert!(
            destination.is_dir(),
            "destination should exist before extraction"
        );
        self.calls
            .borrow_mut()
            .push((archive.to_path_buf(), destination.to_path_buf()));
        for f in &self.files {
            let p = destination.join(f);
            if let Some(parent) = p.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(p, "")?;
        }
        Ok(())
    }
}

fn bundle(dir: &Path, name: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, "not really a tarball").unwrap();
    p
}

fn all_fields() -> ReferenceFields {
    ReferenceFields {
        species: Some(String::from("human")),
        ref_build: Some(String::from("GRCh38")),
        gene_build: Some(String::from("e103")),
        gene_build_gtf_name: Some(String::from("genes.gtf")),
    }
}

#[test]
fn test_spec_from_path() {
    let td = tempfile::tempdir().unwrap();
    let b = bundle(td.path(), "ref_bundle.tar.gz");
    let spec = ReferenceSpec::from_path(&b, ReferenceFields::default()).unwrap();
    assert_eq!(spec.source, ReferenceSource::Archive(b));

    let spec = ReferenceSpec::from_path(td.path(), ReferenceFields::default()).unwrap();
    assert_eq!(
        spec.source,
        ReferenceSource::Directory(td.path().to_path_buf())
    );

    let zip = bundle(td.path(), "ref_bundle.zip");
    assert!(matches!(
        ReferenceSpec::from_path(&zip, ReferenceFields::default()),
        Err(ReferenceError::UnsupportedFormat(_))
    ));

    // the bare extension is not a bundle name
    let bare = bundle(td.path(), ".tar.gz");
    assert!(matches!(
        ReferenceSpec::from_path(&bare, ReferenceFields::default()),
        Err(ReferenceError::UnsupportedFormat(_))
    ));

    let ghost = td.path().join("ghost.tar.gz");
    assert!(matches!(
        ReferenceSpec::from_path(&ghost, ReferenceFields::default()),
        Err(ReferenceError::NotFound(_))
    ));
}

#[test]
fn test_directory_requires_every_field() {
    let td = tempfile::tempdir().unwrap();
    let (stub, calls) = StubExtractor::new(vec![]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let request = ReferenceRequest::with_annotation("star", "*.gtf");
    let mut ws = TempWorkspace::new(td.path().join("out"), "cgpRna_test_temp");

    for omitted in RefField::iter() {
        let mut fields = all_fields();
        match omitted {
            RefField::Species => fields.species = None,
            RefField::RefBuild => fields.ref_build = None,
            RefField::GeneBuild => fields.gene_build = None,
            RefField::GeneBuildGtfName => fields.gene_build_gtf_name = None,
        }
        let spec = ReferenceSpec {
            source: ReferenceSource::Directory(td.path().to_path_buf()),
            fields,
        };
        match resolver.resolve(&spec, &request, &mut ws) {
            Err(ReferenceError::MissingFields(missing)) => {
                assert_eq!(missing, vec![omitted]);
            }
            other => panic!("expected missing {}, got {:?}", omitted, other),
        }
    }

    let spec = ReferenceSpec {
        source: ReferenceSource::Directory(td.path().to_path_buf()),
        fields: ReferenceFields {
            species: None,
            ref_build: Some(String::from("GRCh38")),
            gene_build: None,
            gene_build_gtf_name: None,
        },
    };
    let e = resolver.resolve(&spec, &request, &mut ws).unwrap_err();
    let msg = e.to_string();
    match e {
        ReferenceError::MissingFields(missing) => {
            let got = missing.into_iter().collect::<HashSet<RefField>>();
            let expected = [
                RefField::Species,
                RefField::GeneBuild,
                RefField::GeneBuildGtfName,
            ]
            .into_iter()
            .collect::<HashSet<RefField>>();
            assert_eq!(got, expected);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(msg.contains("--species"));
    assert!(msg.contains("--gene-build-gtf-name"));
    assert!(!msg.contains("--reference-build"));

    // nothing was extracted and no scratch space was made
    assert!(calls.borrow().is_empty());
    assert!(!ws.is_created());
}

#[test]
fn test_directory_with_all_fields() {
    let td = tempfile::tempdir().unwrap();
    let (stub, calls) = StubExtractor::new(vec![]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let mut ws = TempWorkspace::new(td.path(), "cgpRna_test_temp");
    let spec = ReferenceSpec {
        source: ReferenceSource::Directory(td.path().to_path_buf()),
        fields: all_fields(),
    };

    let r = resolver
        .resolve(&spec, &ReferenceRequest::species_build(), &mut ws)
        .unwrap();
    assert_eq!(r.root, td.path());
    assert!(r.root.is_absolute());
    assert_eq!(r.fields, all_fields());
    assert!(calls.borrow().is_empty());
    assert!(!ws.is_created());

    let mut params = Params::new();
    r.add_to_params(&mut params);
    assert_eq!(
        params.get("reference_data_root"),
        Some(td.path().to_str().unwrap())
    );
    assert_eq!(params.get("species"), Some("human"));
    assert_eq!(params.get("ref_build"), Some("GRCh38"));
    assert_eq!(params.get("gene_build"), Some("e103"));
    assert_eq!(params.get("gene_build_gtf_name"), Some("genes.gtf"));
}

#[test]
fn test_archive_defaults_layout() {
    let td = tempfile::tempdir().unwrap();
    let b = bundle(td.path(), "ref_bundle.tar.gz");
    let (stub, calls) = StubExtractor::new(vec!["tophat/ensembl/genes.gtf"]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let mut ws = TempWorkspace::new(td.path().join("out"), "cgpRna_test_temp");
    let spec = ReferenceSpec::from_path(&b, ReferenceFields::default()).unwrap();

    let r = resolver
        .resolve(&spec, &ReferenceRequest::species_build(), &mut ws)
        .unwrap();

    let ws_path = ws.path().unwrap().to_path_buf();
    assert_eq!(r.root, ws_path.join("ref_bundle"));
    let expected_dest = ws_path
        .join("ref_bundle")
        .join("unspecified_species")
        .join("unspecified_ref_build");
    assert_eq!(*calls.borrow(), vec![(b.clone(), expected_dest.clone())]);
    assert!(expected_dest
        .join("tophat")
        .join("ensembl")
        .join("genes.gtf")
        .is_file());

    assert_eq!(r.fields.species.as_deref(), Some("unspecified_species"));
    assert_eq!(r.fields.ref_build.as_deref(), Some("unspecified_ref_build"));
    assert_eq!(r.fields.gene_build.as_deref(), Some("ensembl"));
    // not required by this request, so left alone
    assert_eq!(r.fields.gene_build_gtf_name, None);
    assert_eq!(r.annotation_file, None);
    // the bundle itself is untouched
    assert_eq!(fs::read_to_string(&b).unwrap(), "not really a tarball");
}

#[test]
fn test_archive_keeps_explicit_fields() {
    let td = tempfile::tempdir().unwrap();
    let b = bundle(td.path(), "GRCh38_e103.tar.gz");
    let (stub, calls) = StubExtractor::new(vec![]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let mut ws = TempWorkspace::new(td.path(), "cgpRna_test_temp");
    let fields = ReferenceFields {
        species: Some(String::from("human")),
        ref_build: None,
        gene_build: Some(String::from("e103")),
        gene_build_gtf_name: None,
    };
    let spec = ReferenceSpec::from_path(&b, fields).unwrap();

    let r = resolver
        .resolve(&spec, &ReferenceRequest::species_build(), &mut ws)
        .unwrap();
    let dest = calls.borrow()[0].1.clone();
    assert!(dest.ends_with("GRCh38_e103/human/unspecified_ref_build"));
    assert_eq!(r.fields.gene_build.as_deref(), Some("e103"));
}

#[test]
fn test_custom_defaults_table() {
    let td = tempfile::tempdir().unwrap();
    let b = bundle(td.path(), "mouse.tar.gz");
    let (stub, calls) = StubExtractor::new(vec![]);
    let defaults = ReferenceDefaults {
        species: String::from("mouse"),
        ref_build: String::from("GRCm39"),
        ..ReferenceDefaults::default()
    };
    let resolver = ReferenceResolver::new(defaults, stub);
    let mut ws = TempWorkspace::new(td.path(), "cgpRna_test_temp");
    let spec = ReferenceSpec::from_path(&b, ReferenceFields::default()).unwrap();

    resolver
        .resolve(&spec, &ReferenceRequest::species_build(), &mut ws)
        .unwrap();
    assert!(calls.borrow()[0].1.ends_with("mouse/mouse/GRCm39"));
}

#[test]
fn test_archive_with_wrong_extension_fails_before_workspace() {
    let td = tempfile::tempdir().unwrap();
    let zip = bundle(td.path(), "ref_bundle.zip");
    let (stub, calls) = StubExtractor::new(vec![]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let mut ws = TempWorkspace::new(td.path(), "cgpRna_test_temp");
    let spec = ReferenceSpec {
        source: ReferenceSource::Archive(zip),
        fields: ReferenceFields::default(),
    };
    assert!(matches!(
        resolver.resolve(&spec, &ReferenceRequest::species_build(), &mut ws),
        Err(ReferenceError::UnsupportedFormat(_))
    ));
    assert!(!ws.is_created());
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_archive_annotation_search() {
    let td = tempfile::tempdir().unwrap();
    let b = bundle(td.path(), "ref_bundle.tar.gz");
    let (stub, _calls) = StubExtractor::new(vec![
        "star/ensembl/nested/Homo_sapiens.GRCh38.103.gtf",
        "star/ensembl/README.txt",
        "star/other_build/unrelated.gtf",
    ]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let mut ws = TempWorkspace::new(td.path(), "cgpRna_test_temp");

    // an explicit name that disagrees with the bundle is overridden
    let fields = ReferenceFields {
        gene_build_gtf_name: Some(String::from("mine.gtf")),
        ..ReferenceFields::default()
    };
    let spec = ReferenceSpec::from_path(&b, fields).unwrap();
    let r = resolver
        .resolve(
            &spec,
            &ReferenceRequest::with_annotation("star", "*.gtf"),
            &mut ws,
        )
        .unwrap();

    assert_eq!(
        r.fields.gene_build_gtf_name.as_deref(),
        Some("Homo_sapiens.GRCh38.103.gtf")
    );
    let found = r.annotation_file.unwrap();
    assert!(found.is_absolute());
    assert!(found.ends_with(
        "unspecified_species/unspecified_ref_build/star/ensembl/nested/Homo_sapiens.GRCh38.103.gtf"
    ));
}

#[test]
fn test_archive_annotation_must_be_unique() {
    let td = tempfile::tempdir().unwrap();
    let b = bundle(td.path(), "ref_bundle.tar.gz");
    let request = ReferenceRequest::with_annotation("star", "*.gtf");

    let (stub, _) = StubExtractor::new(vec!["star/ensembl/a.gtf", "star/ensembl/b/b.gtf"]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let mut ws = TempWorkspace::new(td.path(), "cgpRna_test_temp");
    let spec = ReferenceSpec::from_path(&b, ReferenceFields::default()).unwrap();
    match resolver.resolve(&spec, &request, &mut ws) {
        Err(ReferenceError::Annotation { matches, .. }) => assert_eq!(matches.len(), 2),
        other => panic!("expected an ambiguous annotation error, got {:?}", other),
    }

    let (stub, _) = StubExtractor::new(vec!["star/ensembl/genes.gff3"]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let mut ws = TempWorkspace::new(td.path(), "cgpRna_test_temp");
    let e = resolver.resolve(&spec, &request, &mut ws).unwrap_err();
    assert!(matches!(e, ReferenceError::Annotation { ref matches, .. } if matches.is_empty()));
    assert!(e.to_string().contains("ambiguous or missing annotation file"));
}

#[test]
fn test_flat_archive_and_required_files() {
    let td = tempfile::tempdir().unwrap();
    let b = bundle(td.path(), "qc_ref.tar.gz");
    let (stub, calls) = StubExtractor::new(vec!["genome.fa.fai", "rRNA.bed", "RefSeq.bed"]);
    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), stub);
    let mut ws = TempWorkspace::new(td.path(), "cgpRna_test_temp");
    let spec = ReferenceSpec::from_path(&b, ReferenceFields::default()).unwrap();

    let r = resolver
        .resolve(&spec, &ReferenceRequest::flat(), &mut ws)
        .unwrap();
    assert_eq!(calls.borrow()[0].1, r.root);
    assert!(r.root.ends_with("qc_ref"));
    assert_eq!(r.fields, ReferenceFields::default());

    let e = r
        .require_files(&[
            "genome.fa.fai",
            "rRNA.bed",
            "HouseKeepingGenes.bed",
            "RefSeq.bed",
        ])
        .unwrap_err();
    match e {
        ReferenceError::MissingFiles { files, .. } => {
            assert_eq!(files, vec![String::from("HouseKeepingGenes.bed")])
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(r.require_files(&["genome.fa.fai", "rRNA.bed"]).is_ok());
}

#[test]
fn test_tar_gz_extractor() {
    let td = tempfile::tempdir().unwrap();
    let archive = td.path().join("ref_bundle.tar.gz");
    {
        let writer = niffler::to_path(
            &archive,
            niffler::compression::Format::Gzip,
            niffler::Level::One,
        )
        .unwrap();
        let mut builder = tar::Builder::new(writer);
        let data = b"chr1\t248956422\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "star/ensembl/genes.gtf", &data[..])
            .unwrap();
        // finishing the tar stream, then dropping the writer flushes the gzip trailer
        let writer = builder.into_inner().unwrap();
        drop(writer);
    }

    let resolver = ReferenceResolver::new(ReferenceDefaults::default(), TarGzExtractor);
    let mut ws = TempWorkspace::new(td.path().join("out"), "cgpRna_test_temp");
    let spec = ReferenceSpec::from_path(&archive, ReferenceFields::default()).unwrap();
    let r = resolver
        .resolve(
            &spec,
            &ReferenceRequest::with_annotation("star", "*.gtf"),
            &mut ws,
        )
        .unwrap();

    let gtf = r.annotation_file.unwrap();
    assert_eq!(
        gtf,
        r.root
            .join("unspecified_species")
            .join("unspecified_ref_build")
            .join("star")
            .join("ensembl")
            .join("genes.gtf")
    );
    assert_eq!(fs::read_to_string(gtf).unwrap(), "chr1\t248956422\n");
    assert!(archive.is_file());
}
