use findthatpostcode::adapters::LocalBlobStore;
use findthatpostcode::domain::ports::{BlobStore, DocumentStore};
use findthatpostcode::query::Shape;
use findthatpostcode::{
    job_for, AreaNameCache, Dataset, EtlError, FieldSet, ImportContext, ImportEngine, IndexNames,
    InMemoryStore, JobOptions, QueryService,
};
use serde_json::json;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::{FileOptions, ZipWriter};

const NSPL_HEADER: &str = "pcd,pcd2,pcds,dointr,doterm,usertype,oseast1m,osnrth1m,osgrdind,laua,ward,ctry,rgn,imd,lat,long";

fn write_zip(dir: &TempDir, file_name: &str, members: &[(&str, &str)]) -> PathBuf {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in members {
        zip.start_file::<_, ()>(*name, FileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    let path = dir.path().join(file_name);
    std::fs::write(&path, zip.finish().unwrap().into_inner()).unwrap();
    path
}

fn nspl_release(dir: &TempDir) -> PathBuf {
    let london = format!(
        "{}\nSW1A1AA,SW1A 1AA,SW1A 1AA,198001,,1,529090,179645,1,E09000033,E05013806,E92000001,E12000007,18258,51.501009,-0.141588\n\
SW1A2AA,SW1A 2AA,SW1A 2AA,198001,,1,530047,179951,1,E09000033,E05013806,E92000001,E12000007,17583,51.503540,-0.127695\n\
BADROW,,,,,,,,,,,,,,,\n",
        NSPL_HEADER
    );
    let aberdeen = format!(
        "{}\nAB1 0AA,AB1  0AA,AB1 0AA,198001,199606,1,385386,801193,1,S12000033,S13002843,S92000003,S99999999,,57.101474,-2.242851\n",
        NSPL_HEADER
    );
    write_zip(
        dir,
        "NSPL_NOV_2024_UK.zip",
        &[
            ("Data/multi_csv/NSPL_NOV_2024_UK_AB.csv", &aberdeen),
            ("Data/multi_csv/NSPL_NOV_2024_UK_SW.csv", &london),
            ("User Guide/NSPL User Guide.pdf", "not a csv"),
        ],
    )
}

fn context(store: &InMemoryStore) -> ImportContext {
    ImportContext::new(Arc::new(store.clone()), IndexNames::from_prefix("geo")).with_batch_size(2)
}

#[tokio::test]
async fn test_nspl_release_end_to_end() {
    let dir = TempDir::new().unwrap();
    let options = JobOptions {
        files: vec![nspl_release(&dir)],
        ..Default::default()
    };
    let store = InMemoryStore::new();
    let job = job_for(Dataset::Nspl, &options).unwrap();

    let summary = ImportEngine::new()
        .run(job.as_ref(), &context(&store))
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.saved, 3);
    assert_eq!(summary.skipped_rows, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(store.count("geo_postcode").await, 3);

    let terminated = store.get("geo_postcode", "AB1 0AA").await.unwrap().unwrap();
    assert_eq!(terminated["doterm"], "1996-06-01");
    assert_eq!(terminated["postcode_sector"], "AB1 0");

    store
        .insert(
            "geo_area",
            "E09000033",
            json!({"code": "E09000033", "name": "Westminster", "type": "laua"}),
        )
        .await;
    let service = QueryService::new(
        Arc::new(store.clone()),
        IndexNames::from_prefix("geo"),
        AreaNameCache::shared(64, Duration::from_secs(60)),
    );

    let result = service
        .get_postcode("sw1a 1aa", &FieldSet::all(Shape::Postcode))
        .await
        .unwrap();
    assert_eq!(result.postcode.codes["laua"], "E09000033");
    assert_eq!(result.names["laua_name"], Some("Westminster".to_string()));

    let nearest = service
        .nearest_postcode(51.5035, -0.1277, &FieldSet::all(Shape::NearestPoint))
        .await
        .unwrap();
    assert_eq!(nearest.postcode.postcode.id(), "SW1A 2AA");
    assert!(nearest.distance_from_postcode < 50.0);
}

#[tokio::test]
async fn test_rerunning_an_import_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let options = JobOptions {
        files: vec![nspl_release(&dir)],
        ..Default::default()
    };
    let store = InMemoryStore::new();
    let engine = ImportEngine::new();
    for _ in 0..2 {
        let job = job_for(Dataset::Nspl, &options).unwrap();
        engine.run(job.as_ref(), &context(&store)).await.unwrap();
    }
    assert_eq!(store.count("geo_postcode").await, 3);
}

#[tokio::test]
async fn test_wrong_release_fails_with_source_error() {
    let dir = TempDir::new().unwrap();
    let options = JobOptions {
        files: vec![nspl_release(&dir)],
        ..Default::default()
    };
    let store = InMemoryStore::new();
    let job = job_for(Dataset::Onspd, &options).unwrap();
    let err = ImportEngine::new()
        .run(job.as_ref(), &context(&store))
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::SourceDataFormat { .. }));
    assert_eq!(store.count("geo_postcode").await, 0);
}

#[tokio::test]
async fn test_boundaries_are_stored_and_flagged() {
    let dir = TempDir::new().unwrap();
    let geojson = json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"LAD23CD": "E09000033", "LAD23NM": "Westminster"},
                "geometry": {"type": "Polygon", "coordinates": [[[-0.2, 51.5], [-0.1, 51.5], [-0.1, 51.6], [-0.2, 51.5]]]}
            },
            {
                "type": "Feature",
                "properties": {"LAD23CD": "", "LAD23NM": "Nowhere"},
                "geometry": null
            }
        ]
    });
    let path = dir.path().join("lad.geojson");
    std::fs::write(&path, serde_json::to_vec(&geojson).unwrap()).unwrap();

    let store = InMemoryStore::new();
    store
        .insert("geo_area", "E09000033", json!({"code": "E09000033", "name": "Westminster"}))
        .await;
    let blob_dir = TempDir::new().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(blob_dir.path()));

    let options = JobOptions {
        files: vec![path],
        ..Default::default()
    };
    let job = job_for(Dataset::Boundaries, &options).unwrap();
    let summary = ImportEngine::new()
        .run(job.as_ref(), &context(&store).with_blobs(blobs.clone()))
        .await
        .unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.skipped_rows, 1);

    let area = store.get("geo_area", "E09000033").await.unwrap().unwrap();
    assert_eq!(area["has_boundary"], true);
    assert_eq!(area["name"], "Westminster");

    let service = QueryService::new(
        Arc::new(store.clone()),
        IndexNames::from_prefix("geo"),
        AreaNameCache::shared(64, Duration::from_secs(60)),
    )
    .with_blobs(blobs);
    let stored: serde_json::Value =
        serde_json::from_slice(&service.area_boundary("e09000033").await.unwrap()).unwrap();
    assert_eq!(stored["properties"]["LAD23NM"], "Westminster");
}
