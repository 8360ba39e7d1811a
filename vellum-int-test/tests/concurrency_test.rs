use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use vellum::client::DocumentClient;
use vellum_int_test::test_util::{cleanup, create_test_context, run_test};

#[ctor::ctor]
fn init() {
    colog::init();
}

const LOCKS: &str = "locks";

#[test]
fn test_compare_and_swap_has_one_winner() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database().to_string();
            let client = ctx.client();
            client.insert(&db, LOCKS, r#"{"_id":"x","lock":"A","payload":"p"}"#);

            let num_threads = 8;
            let barrier = Arc::new(Barrier::new(num_threads));
            let mut handles = vec![];
            for _ in 0..num_threads {
                let client = ctx.second_client()?;
                let barrier = Arc::clone(&barrier);
                let db = db.clone();
                handles.push(thread::spawn(move || {
                    barrier.wait();
                    client.update(&db, LOCKS, r#"{"_id":"x","lock":"A"}"#, r#"{"_id":"x","payload":"p"}"#)
                }));
            }

            let winners = handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);

            let stored = client.find(&db, LOCKS, r#"{"_id":"x"}"#);
            assert_eq!(stored, vec![r#"{"_id":"x","payload":"p"}"#.to_string()]);
            assert!(!client.exists(&db, LOCKS, r#"{"lock":{"$exists":true}}"#));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_two_callers_release_the_same_lock() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database().to_string();
            let first = ctx.client();
            let second = ctx.second_client()?;
            first.insert(&db, LOCKS, r#"{"_id":"x","lock":"A"}"#);

            let barrier = Arc::new(Barrier::new(2));
            let spawn = |client: DocumentClient| {
                let barrier = Arc::clone(&barrier);
                let db = db.clone();
                thread::spawn(move || {
                    barrier.wait();
                    client.update(&db, LOCKS, r#"{"_id":"x","lock":"A"}"#, r#"{"_id":"x"}"#)
                })
            };
            let a = spawn(first.clone());
            let b = spawn(second);
            let results = [a.join().unwrap(), b.join().unwrap()];

            assert_eq!(results.iter().filter(|won| **won).count(), 1);
            assert_eq!(first.find_all(&db, LOCKS), vec![r#"{"_id":"x"}"#.to_string()]);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_concurrent_ensure_collection_never_fails() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database().to_string();
            let num_threads = 10;
            let barrier = Arc::new(Barrier::new(num_threads));
            let mut handles = vec![];
            for _ in 0..num_threads {
                let client = ctx.second_client()?;
                let barrier = Arc::clone(&barrier);
                let db = db.clone();
                handles.push(thread::spawn(move || {
                    barrier.wait();
                    client.ensure_collection(&db, "event_object_map").map(|_| ())
                }));
            }

            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
            assert!(ctx.client().health_check(&db));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_find_and_modify_claims_each_record_once() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database().to_string();
            let client = ctx.client();
            let records = 20;
            for i in 0..records {
                client.insert(&db, "waitlist", &format!(r#"{{"_id":"e{}","claimed":false}}"#, i));
            }

            let claimed = Arc::new(AtomicUsize::new(0));
            let num_threads = 4;
            let barrier = Arc::new(Barrier::new(num_threads));
            let mut handles = vec![];
            for worker in 0..num_threads {
                let client = ctx.second_client()?;
                let barrier = Arc::clone(&barrier);
                let claimed = Arc::clone(&claimed);
                let db = db.clone();
                handles.push(thread::spawn(move || {
                    barrier.wait();
                    let update = format!(r#"{{"$set":{{"claimed":true,"worker":{}}}}}"#, worker);
                    while let Ok(Some(before)) =
                        client.find_and_modify(&db, "waitlist", r#"{"claimed":false}"#, &update)
                    {
                        assert_eq!(before.get("claimed").and_then(|v| v.as_bool()), Some(false));
                        claimed.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            }
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(claimed.load(Ordering::SeqCst), records);
            assert!(client.find(&db, "waitlist", r#"{"claimed":false}"#).is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_concurrent_add_to_set_keeps_unique_values() {
    run_test(
        create_test_context,
        |ctx| {
            let db = ctx.database().to_string();
            let client = ctx.client();
            client.insert(&db, "event_object_map", r#"{"_id":"agg-1","objects":[]}"#);

            let num_threads = 6;
            let barrier = Arc::new(Barrier::new(num_threads));
            let mut handles = vec![];
            for i in 0..num_threads {
                let client = client.clone();
                let barrier = Arc::clone(&barrier);
                let db = db.clone();
                handles.push(thread::spawn(move || {
                    barrier.wait();
                    let event = format!("e{}", i % 3);
                    client.add_to_set(&db, "event_object_map", r#"{"_id":"agg-1"}"#, "objects", event)
                }));
            }
            for handle in handles {
                assert!(handle.join().unwrap());
            }

            let stored = client.find_all_documents(&db, "event_object_map");
            let objects = stored[0].get("objects").and_then(|v| v.as_array()).unwrap();
            assert_eq!(objects.len(), 3);
            Ok(())
        },
        cleanup,
    )
}
