//! Flows that suspend, interleave and hop between tasks and threads

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flow_context::{ContextError, ContextStore};
use futures::future::join_all;

#[derive(Debug)]
struct RequestContext {
    request_id: usize,
}

async fn handler(store: ContextStore, delay_ms: u64) -> (usize, usize) {
    let before = store.retrieve::<RequestContext>("request").unwrap().request_id;
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    tokio::task::yield_now().await;
    let after = store.retrieve::<RequestContext>("request").unwrap().request_id;
    (before, after)
}

#[tokio::test]
async fn test_concurrent_flows_are_isolated() {
    let store = ContextStore::builder().name("requests").build();

    let flows: Vec<_> = (0..16)
        .map(|request_id| {
            let worker = {
                let store = store.clone();
                // Earlier requests finish last
                move || handler(store.clone(), (16 - request_id as u64) * 2)
            };
            store
                .inject("request", worker, RequestContext { request_id })
                .unwrap()
                .call_async()
        })
        .collect();

    let results = join_all(flows).await;
    for (request_id, (before, after)) in results.into_iter().enumerate() {
        assert_eq!(before, request_id);
        assert_eq!(after, request_id);
    }
    assert!(store.current().is_none());
}

#[tokio::test]
async fn test_one_wrapper_many_invocations() {
    let store = ContextStore::new();

    let per_call = {
        let store = store.clone();
        move |label: &'static str| {
            let store = store.clone();
            async move {
                tokio::task::yield_now().await;
                let shared = store.retrieve::<String>("tenant").unwrap();
                format!("{}:{}", shared, label)
            }
        }
    };
    let wrapped = store.inject("tenant", per_call, "acme".to_string()).unwrap();

    let (a, b) = tokio::join!(wrapped.call_async_with("a"), wrapped.call_async_with("b"));
    assert_eq!(a, "acme:a");
    assert_eq!(b, "acme:b");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_flows_survive_worker_migration() {
    let store = ContextStore::new();

    let handles: Vec<_> = (0..32)
        .map(|request_id| {
            let worker = {
                let store = store.clone();
                move || handler(store.clone(), (request_id % 4) as u64)
            };
            let flow = store
                .inject("request", worker, RequestContext { request_id })
                .unwrap()
                .call_async();
            tokio::spawn(flow)
        })
        .collect();

    for (request_id, handle) in handles.into_iter().enumerate() {
        let (before, after) = handle.await.unwrap();
        assert_eq!((before, after), (request_id, request_id));
    }
}

#[tokio::test]
async fn test_nested_async_injection() {
    let store = ContextStore::new();

    let outer = {
        let store = store.clone();
        move || {
            let store = store.clone();
            async move {
                tokio::task::yield_now().await;
                let inner = {
                    let store = store.clone();
                    move || {
                        let store = store.clone();
                        async move {
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            let parent = store.retrieve::<&'static str>("parent").unwrap();
                            let child = store.retrieve::<&'static str>("child").unwrap();
                            (*parent, *child)
                        }
                    }
                };
                let pair = store.inject("child", inner, "childFoo").unwrap().call_async().await;

                // The child binding ends with the inner flow
                assert!(!store.contains("child"));
                pair
            }
        }
    };

    let pair = store.inject("parent", outer, "bar").unwrap().call_async().await;
    assert_eq!(pair, ("bar", "childFoo"));
}

#[tokio::test]
async fn test_duplicate_binding_after_suspension() {
    let store = ContextStore::new();

    let outer = {
        let store = store.clone();
        move || {
            let store = store.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                store.inject("id", || (), 2u32).map(|_| ())
            }
        }
    };

    let result = store.inject("id", outer, 1u32).unwrap().call_async().await;
    assert_eq!(
        result,
        Err(ContextError::DuplicateBinding {
            id: "id".to_string()
        })
    );
}

#[tokio::test]
async fn test_mutations_visible_within_flow() {
    type Cache = Mutex<HashMap<String, usize>>;
    let store = ContextStore::new();
    let cache = Arc::new(Cache::default());

    let flow = {
        let store = store.clone();
        move || {
            let store = store.clone();
            async move {
                let writer = store.retrieve::<Cache>("cache").unwrap();
                writer.lock().unwrap().insert("hits".into(), 1);
                tokio::task::yield_now().await;

                let reader = store.retrieve::<Cache>("cache").unwrap();
                assert!(Arc::ptr_eq(&writer, &reader));
                let hits = reader.lock().unwrap().get("hits").copied();
                hits
            }
        }
    };

    let hits = store
        .inject_arc("cache", flow, Arc::clone(&cache))
        .unwrap()
        .call_async()
        .await;
    assert_eq!(hits, Some(1));
    assert_eq!(cache.lock().unwrap().get("hits"), Some(&1));
}

#[tokio::test]
async fn test_spawned_task_inherits_snapshot() {
    let store = ContextStore::new();

    let flow = {
        let store = store.clone();
        move || {
            let store = store.clone();
            async move {
                let child_store = store.clone();
                let handle = store.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    child_store.retrieve::<u32>("job").map(|v| *v)
                });
                handle.await.unwrap()
            }
        }
    };

    let result = store.inject("job", flow, 42u32).unwrap().call_async().await;
    assert_eq!(result, Ok(42));
}

#[tokio::test]
async fn test_plain_spawn_is_a_separate_flow() {
    let store = ContextStore::new();

    let flow = {
        let store = store.clone();
        move || {
            let store = store.clone();
            async move {
                let child_store = store.clone();
                tokio::spawn(async move { child_store.retrieve::<u32>("job").map(|v| *v) })
                    .await
                    .unwrap()
            }
        }
    };

    let result = store.inject("job", flow, 42u32).unwrap().call_async().await;
    assert_eq!(
        result,
        Err(ContextError::NoActiveFlow {
            id: "job".to_string()
        })
    );
}

#[tokio::test]
async fn test_blocking_work_bound_to_flow() {
    let store = ContextStore::new();

    let flow = {
        let store = store.clone();
        move || {
            let store = store.clone();
            async move {
                let reader = store.clone();
                let work = store.bind_fn(move || reader.retrieve::<String>("user").map(|u| u.len()));
                tokio::task::spawn_blocking(work).await.unwrap()
            }
        }
    };

    let result = store
        .inject("user", flow, "grace".to_string())
        .unwrap()
        .call_async()
        .await;
    assert_eq!(result, Ok(5));
}
