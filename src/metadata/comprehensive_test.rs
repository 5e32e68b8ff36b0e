//! Comprehensive test to verify the metadata storage abstraction

#[cfg(test)]
mod integration_tests {
    use crate::config::MetadataConfig;
    use crate::error::FileError;
    use crate::metadata::config::{create_store, MetadataBackend};
    use crate::metadata::test_support::sample_record;
    use crate::metadata::MetadataStorage;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use std::thread;

    fn stores(dir: &tempfile::TempDir) -> Vec<(MetadataBackend, Arc<dyn MetadataStorage>)> {
        [MetadataBackend::SQLite, MetadataBackend::Mock]
            .into_iter()
            .map(|backend| {
                let config = MetadataConfig {
                    backend,
                    db_path: dir.path().join("files.db").to_string_lossy().into_owned(),
                    ..MetadataConfig::default()
                };
                (backend, create_store(&config).expect("Failed to create store"))
            })
            .collect()
    }

    #[test]
    fn test_list_expired_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        for (backend, store) in stores(&dir) {
            store.insert(&sample_record("past01", now - Duration::hours(2), Duration::hours(1))).unwrap();
            store.insert(&sample_record("edge01", now - Duration::hours(1), Duration::hours(1))).unwrap();
            store.insert(&sample_record("live01", now, Duration::hours(1))).unwrap();

            let expired: Vec<String> = store.list_expired(now).unwrap().into_iter().map(|r| r.id).collect();
            assert_eq!(expired, vec!["past01".to_string(), "edge01".to_string()], "{:?}", backend);

            let later: Vec<String> = store
                .list_expired(now + Duration::hours(1))
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect();
            assert_eq!(later.len(), 3, "{:?}", backend);

            for id in ["past01", "edge01", "live01"] {
                store.delete(id).unwrap();
            }
        }
    }

    #[test]
    fn test_list_all_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        for (backend, store) in stores(&dir) {
            store.insert(&sample_record("old001", now - Duration::minutes(10), Duration::hours(1))).unwrap();
            store.insert(&sample_record("new001", now, Duration::hours(1))).unwrap();
            store.insert(&sample_record("mid001", now - Duration::minutes(5), Duration::hours(1))).unwrap();

            let ids: Vec<String> = store.list_all().unwrap().into_iter().map(|r| r.id).collect();
            assert_eq!(ids, vec!["new001", "mid001", "old001"], "{:?}", backend);

            for id in ids {
                store.delete(&id).unwrap();
            }
        }
    }

    #[test]
    fn test_concurrent_inserts_on_same_key_single_winner() {
        let dir = tempfile::tempdir().unwrap();

        for (backend, store) in stores(&dir) {
            let now = Utc::now();
            let handles: Vec<_> = (0..8)
                .map(|n| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        let mut record = sample_record("race01", now, Duration::hours(1));
                        record.stored_handle = format!("handle-race-{}", n);
                        store.insert(&record)
                    })
                })
                .collect();

            let results: Vec<Result<(), FileError>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let winners = results.iter().filter(|r| r.is_ok()).count();
            let duplicates = results
                .iter()
                .filter(|r| matches!(r, Err(FileError::DuplicateKey(_))))
                .count();
            assert_eq!(winners, 1, "{:?}", backend);
            assert_eq!(duplicates, 7, "{:?}", backend);

            store.delete("race01").unwrap();
        }
    }

    #[test]
    fn test_concurrent_reads_of_distinct_keys() {
        let dir = tempfile::tempdir().unwrap();

        for (backend, store) in stores(&dir) {
            let now = Utc::now();
            for n in 0..16 {
                store.insert(&sample_record(&format!("read{:02}", n), now, Duration::hours(1))).unwrap();
            }

            let readers: Vec<_> = (0..16)
                .map(|n| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || store.get(&format!("read{:02}", n)).map(|r| r.id))
                })
                .collect();
            for (n, reader) in readers.into_iter().enumerate() {
                assert_eq!(reader.join().unwrap().unwrap(), format!("read{:02}", n), "{:?}", backend);
            }

            for n in 0..16 {
                store.delete(&format!("read{:02}", n)).unwrap();
            }
        }
    }
}
