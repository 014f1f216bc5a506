//! Integration tests for indexed region queries over BGZF-compressed files.

use hapfile::formats::index::HapIndex;
use hapfile::formats::record::FieldValue;
use hapfile::{HapError, HapFile, HapWriter, IndexedHapReader, Region};
use std::path::PathBuf;
use tempfile::TempDir;

const SORTED: &str = "\
#\tversion\t0.2.0
#H\tbeta\t.2f\tEffect size
H\tchr1\t100\t200\thap1\t0.10
H\tchr1\t150\t300\thap2\t0.20
H\tchr1\t400\t500\thap3\t0.30
H\tchr2\t100\t200\thap4\t0.40
V\thap1\t100\t150\trs1\tA
V\thap1\t180\t181\trs2\tT
V\thap2\t200\t250\trs3\tC
V\thap3\t450\t460\trs4\tG
V\thap4\t120\t130\trs5\tA
";

/// Writes a .hap file as BGZF under `dir` and returns its path.
fn write_bgzf(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    let file = HapFile::read_from(text.as_bytes()).unwrap();
    let mut writer = HapWriter::create(&path, file.schema().clone()).unwrap();
    if let Some(version) = &file.header.version {
        writer.set_version(version).unwrap();
    }
    for record in &file.records {
        writer.write_record(record).unwrap();
    }
    writer.close().unwrap();
    path
}

fn query_ids(reader: &mut IndexedHapReader, region: &str) -> Vec<String> {
    let region: Region = region.parse().unwrap();
    reader
        .query(&region)
        .unwrap()
        .map(|r| r.unwrap().id().to_string())
        .collect()
}

#[test]
fn test_region_query_returns_exact_intersections_in_order() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);
    let mut reader = IndexedHapReader::open(&path).unwrap();

    // hap1 and hap2 intersect; hap3 starts past the query end.
    assert_eq!(query_ids(&mut reader, "chr1:120-160"), vec!["hap1", "hap2"]);

    // Inclusive endpoints: touching at a boundary counts.
    assert_eq!(
        query_ids(&mut reader, "chr1:200-399"),
        vec!["hap1", "hap2"]
    );
    assert_eq!(
        query_ids(&mut reader, "chr1:300-400"),
        vec!["hap2", "hap3"]
    );

    // A gap between records yields nothing.
    assert!(query_ids(&mut reader, "chr1:301-399").is_empty());

    // Whole-contig queries.
    assert_eq!(
        query_ids(&mut reader, "chr1"),
        vec!["hap1", "hap2", "hap3"]
    );
    assert_eq!(query_ids(&mut reader, "chr2"), vec!["hap4"]);
}

#[test]
fn test_variant_queries_address_haplotype_ids() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);
    let mut reader = IndexedHapReader::open(&path).unwrap();

    assert_eq!(query_ids(&mut reader, "hap1"), vec!["rs1", "rs2"]);
    assert_eq!(query_ids(&mut reader, "hap1:160-300"), vec!["rs2"]);
    assert_eq!(query_ids(&mut reader, "hap4"), vec!["rs5"]);
}

#[test]
fn test_unknown_contig_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);
    let mut reader = IndexedHapReader::open(&path).unwrap();
    assert!(query_ids(&mut reader, "chrX").is_empty());
    assert!(query_ids(&mut reader, "hap9:0-100").is_empty());
}

#[test]
fn test_queried_records_carry_extras() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);
    let mut reader = IndexedHapReader::open(&path).unwrap();

    let region: Region = "chr2".parse().unwrap();
    let records: Vec<_> = reader
        .query(&region)
        .unwrap()
        .collect::<hapfile::Result<_>>()
        .unwrap();
    assert_eq!(records.len(), 1);
    let hap = records[0].as_haplotype().unwrap();
    assert_eq!(hap.extra("beta"), Some(&FieldValue::Float(0.40)));
}

#[test]
fn test_fetch_region_groups_variants_under_haplotypes() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);
    let mut reader = IndexedHapReader::open(&path).unwrap();

    let region: Region = "chr1:120-160".parse().unwrap();
    let groups = reader.fetch_region(&region).unwrap();
    assert_eq!(groups.len(), 2);

    let (hap1, vars1) = &groups[0];
    assert_eq!(hap1.id, "hap1");
    let ids: Vec<&str> = vars1.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["rs1", "rs2"]);

    let (hap2, vars2) = &groups[1];
    assert_eq!(hap2.id, "hap2");
    assert_eq!(vars2.len(), 1);
    assert_eq!(vars2[0].id, "rs3");
}

#[test]
fn test_fetch_haplotypes_by_id() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);
    let mut reader = IndexedHapReader::open(&path).unwrap();

    // File order, not request order; unknown IDs are skipped.
    let groups = reader
        .fetch_haplotypes(["hap3", "hap1", "nope"])
        .unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].0.id, "hap1");
    assert_eq!(groups[1].0.id, "hap3");
    assert_eq!(groups[1].1.len(), 1);
    assert_eq!(groups[1].1[0].allele, "G");
}

#[test]
fn test_unsorted_file_refuses_index() {
    let unsorted = "\
H\tchr2\t100\t200\thap4
H\tchr1\t100\t200\thap1
";
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "unsorted.hap.gz", unsorted);
    let err = IndexedHapReader::open(&path).unwrap_err();
    assert!(matches!(err, HapError::UnsortedFile { line: 2, .. }));

    let err = HapIndex::build_from_path(&path).unwrap_err();
    assert!(matches!(err, HapError::UnsortedFile { .. }));
}

#[test]
fn test_colliding_namespaces_refuse_index() {
    // "weird" is both a chromosome and a haplotype ID.
    let colliding = "\
H\tweird\t100\t200\thapA
V\tweird\t100\t150\trs1\tA
";
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "colliding.hap.gz", colliding);
    let err = IndexedHapReader::open(&path).unwrap_err();
    assert!(matches!(err, HapError::ContigCollision { name } if name == "weird"));
}

#[test]
fn test_sidecar_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);

    let index = HapIndex::build_from_path(&path).unwrap();
    let sidecar = HapIndex::sidecar_path(&path);
    index.save(&sidecar).unwrap();
    assert!(sidecar.exists());

    // open() now picks up the sidecar instead of rebuilding.
    let mut reader = IndexedHapReader::open(&path).unwrap();
    assert_eq!(query_ids(&mut reader, "chr1:120-160"), vec!["hap1", "hap2"]);

    let loaded = HapIndex::load(&sidecar).unwrap();
    assert_eq!(loaded, index);
}

#[test]
fn test_queries_seek_into_large_files() {
    // Enough records to span many BGZF blocks, so a late query must land
    // mid-file rather than at the start.
    let mut text = String::from("#\tversion\t0.2.0\n");
    for i in 0..5000 {
        let start = i as u64 * 1000;
        text.push_str(&format!(
            "H\tchr1\t{}\t{}\thap{:05}\n",
            start,
            start + 500,
            i
        ));
    }
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "big.hap.gz", &text);

    let mut reader = IndexedHapReader::open(&path).unwrap();
    assert_eq!(
        query_ids(&mut reader, "chr1:3000000-3001000"),
        vec!["hap03000", "hap03001"]
    );

    // First and last records are still reachable.
    assert_eq!(query_ids(&mut reader, "chr1:0-0"), vec!["hap00000"]);
    assert_eq!(
        query_ids(&mut reader, "chr1:4999400-4999600"),
        vec!["hap04999"]
    );
}

#[test]
fn test_discarded_query_leaves_reader_usable() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);
    let mut reader = IndexedHapReader::open(&path).unwrap();

    {
        let region: Region = "chr1".parse().unwrap();
        let mut query = reader.query(&region).unwrap();
        let first = query.next().unwrap().unwrap();
        assert_eq!(first.id(), "hap1");
        // Dropped here with results remaining.
    }

    assert_eq!(query_ids(&mut reader, "chr2"), vec!["hap4"]);
}

#[test]
fn test_concurrent_readers_share_nothing_but_the_file() {
    let dir = TempDir::new().unwrap();
    let path = write_bgzf(&dir, "cohort.hap.gz", SORTED);

    let handles: Vec<_> = ["chr1", "chr2", "hap1", "hap4"]
        .into_iter()
        .map(|contig| {
            let path = path.clone();
            let contig = contig.to_string();
            std::thread::spawn(move || {
                let mut reader = IndexedHapReader::open(&path).unwrap();
                query_ids(&mut reader, &contig).len()
            })
        })
        .collect();
    let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counts, vec![3, 1, 2, 1]);
}
