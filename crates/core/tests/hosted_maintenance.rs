mod common;

use autoroute_api::{ItemAction, ItemEvent, RepositoryEvent, RepositoryKind};
use common::{Fixture, put};
use std::time::Duration;

fn item(repository_id: &str, path: &str, action: ItemAction) -> RepositoryEvent {
    RepositoryEvent::Item(ItemEvent {
        repository_id: repository_id.to_string(),
        path: path.to_string(),
        action,
        routing_internal: false,
    })
}

#[tokio::test]
async fn test_stored_items_extend_published_list() {
    let fx = Fixture::new();
    let hosted = fx.add("releases", RepositoryKind::Hosted);
    put(hosted.storage.as_ref(), "/org/apache/a/1/a.jar", "a").await;
    fx.manager.update_prefix_file(&hosted).unwrap();
    fx.settle().await;

    fx.manager
        .handle_repository_event(item("releases", "/com/example/lib/1.0/lib.jar", ItemAction::Stored))
        .await
        .unwrap();
    // Already covered by /org/apache.
    let changed = fx
        .manager
        .offer_entry(&hosted, "/org/apache/b/2/b.jar")
        .await
        .unwrap();
    assert!(!changed);

    assert_eq!(
        fx.published_entries(&hosted).await.unwrap(),
        vec!["/org/apache", "/com/example"]
    );
}

#[tokio::test]
async fn test_deleted_items_revoke_entries() {
    let fx = Fixture::new();
    let hosted = fx.add("releases", RepositoryKind::Hosted);
    put(hosted.storage.as_ref(), "/org/apache/a/1/a.jar", "a").await;
    put(hosted.storage.as_ref(), "/com/example/b/1/b.jar", "b").await;
    fx.manager.update_prefix_file(&hosted).unwrap();
    fx.settle().await;

    fx.manager
        .handle_repository_event(item("releases", "/org", ItemAction::Deleted))
        .await
        .unwrap();
    assert_eq!(fx.published_entries(&hosted).await.unwrap(), vec!["/com/example"]);

    let changed = fx.manager.revoke_entry(&hosted, "/net").await.unwrap();
    assert!(!changed);
}

#[tokio::test]
async fn test_self_generated_events_are_ignored() {
    let fx = Fixture::new();
    let hosted = fx.add("releases", RepositoryKind::Hosted);
    put(hosted.storage.as_ref(), "/org/apache/a/1/a.jar", "a").await;
    fx.manager.update_prefix_file(&hosted).unwrap();
    fx.settle().await;

    let mut internal = ItemEvent {
        repository_id: "releases".to_string(),
        path: "/com/example/x/1/x.jar".to_string(),
        action: ItemAction::Stored,
        routing_internal: true,
    };
    fx.manager
        .handle_repository_event(RepositoryEvent::Item(internal.clone()))
        .await
        .unwrap();
    internal.routing_internal = false;
    internal.path = "/.meta/prefixes.txt".to_string();
    fx.manager
        .handle_repository_event(RepositoryEvent::Item(internal))
        .await
        .unwrap();

    assert_eq!(fx.published_entries(&hosted).await.unwrap(), vec!["/org/apache"]);
}

#[tokio::test]
async fn test_unpublished_hosted_is_not_patched() {
    let fx = Fixture::new();
    let hosted = fx.add("releases", RepositoryKind::Hosted);
    fx.manager.unpublish(&hosted).await.unwrap();

    let changed = fx
        .manager
        .offer_entry(&hosted, "/org/apache/a/1/a.jar")
        .await
        .unwrap();
    assert!(!changed);
    assert!(fx.published_entries(&hosted).await.is_none());
}

#[tokio::test]
async fn test_dispatcher_follows_storage_after_startup() {
    let fx = Fixture::new();
    let hosted = fx.add("releases", RepositoryKind::Hosted);

    fx.manager.startup().await.unwrap();
    // The first tick finds no prefix file and creates one.
    fx.settle().await;
    assert_eq!(fx.published_entries(&hosted).await, Some(Vec::new()));

    put(hosted.storage.as_ref(), "/org/apache/a/1/a.jar", "a").await;
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if fx.published_entries(&hosted).await.is_some_and(|e| !e.is_empty()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(fx.published_entries(&hosted).await.unwrap(), vec!["/org/apache"]);

    fx.manager.shutdown().await;
}

#[tokio::test]
async fn test_added_repository_gets_initialized() {
    let fx = Fixture::new();
    let hosted = fx.add("releases", RepositoryKind::Hosted);
    put(hosted.storage.as_ref(), "/org/apache/a/1/a.jar", "a").await;

    fx.manager
        .handle_repository_event(RepositoryEvent::Added {
            repository_id: "releases".to_string(),
        })
        .await
        .unwrap();
    fx.settle().await;

    assert_eq!(fx.published_entries(&hosted).await.unwrap(), vec!["/org/apache"]);
}
