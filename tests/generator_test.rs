mod common;

use reconcile_engine::domain::event::SourceSystem;
use reconcile_engine::interfaces::csv::event_reader::EventReader;

#[test]
fn test_generated_files_are_readable() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let (a, b) = common::generate_source_files(dir.path(), 40, 10).expect("Failed to generate CSV");

    let read = |path, source| {
        EventReader::from_path(path, source)
            .expect("Failed to open CSV")
            .events()
            .map(|r| r.expect("Failed to read record"))
            .collect::<Vec<_>>()
    };
    let a = read(a.as_path(), SourceSystem::SourceA);
    let b = read(b.as_path(), SourceSystem::SourceB);

    assert_eq!(a.len(), 40);
    // Every 10th row has no counterpart
    assert_eq!(b.len(), 36);
    assert!(b.iter().all(|r| r.source_system == Some(SourceSystem::SourceB)));
}

#[test]
fn test_random_stream_is_seeded() {
    assert_eq!(common::random_stream(3, 50), common::random_stream(3, 50));
    assert_ne!(common::random_stream(3, 50), common::random_stream(4, 50));
}
