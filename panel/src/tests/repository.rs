use super::support::{MemoryStore, allocation, app_state, egg, node, server};
use crate::daemon::MockDaemonClient;
use crate::models::{Relation, RelationData};
use crate::repository::{MockServerStore, PowerActionScope, ServerRepository};
use crate::error::PanelError;
use crate::services::NewDatabase;
use std::sync::Arc;

#[tokio::test]
async fn loading_twice_without_refresh_fetches_once() {
    let mut store = MockServerStore::new();
    store
        .expect_fetch_relation()
        .withf(|_, relation| *relation == Relation::Node)
        .times(1)
        .returning(|_, _| Ok(RelationData::Node(node(1))));

    let repository = ServerRepository::new(Arc::new(store));
    let mut server = server(1);

    repository.load_node(&mut server, false).await.unwrap();
    repository.load_node(&mut server, false).await.unwrap();

    assert_eq!(server.relations.node, Some(node(1)));
}

#[tokio::test]
async fn refresh_fetches_every_time() {
    let mut store = MockServerStore::new();
    store
        .expect_fetch_relation()
        .times(2)
        .returning(|_, _| Ok(RelationData::Node(node(1))));

    let repository = ServerRepository::new(Arc::new(store));
    let mut server = server(1);

    repository.load_node(&mut server, false).await.unwrap();
    repository.load_node(&mut server, true).await.unwrap();
}

#[tokio::test]
async fn rebuild_data_loads_only_what_is_missing() {
    let mut store = MockServerStore::new();
    store
        .expect_fetch_relation()
        .withf(|_, relation| *relation != Relation::Node)
        .times(3)
        .returning(|server, relation| {
            Ok(match relation {
                Relation::Allocation => RelationData::Allocation(allocation(
                    server.allocation_id,
                    1,
                    Some(server.id),
                )),
                Relation::Allocations => RelationData::Allocations(Vec::new()),
                _ => RelationData::Egg(egg(server.egg_id)),
            })
        });

    let repository = ServerRepository::new(Arc::new(store));
    let mut server = server(1);
    server.relations.node = Some(node(1));

    repository.load_rebuild_data(&mut server, false).await.unwrap();

    assert!(server.relations.allocation.is_some());
    assert!(server.relations.egg.is_some());
}

#[tokio::test]
async fn daemon_service_data_names_the_egg() {
    let store = MemoryStore::seeded();
    let egg_uuid = store.data().eggs[&1].uuid;
    let repository = ServerRepository::new(store.clone());

    let mut server = repository.find(1).await.unwrap();
    let data = repository.daemon_service_data(&mut server, false).await.unwrap();

    assert_eq!(data, serde_json::json!({ "egg": egg_uuid }));
}

#[tokio::test]
async fn get_by_uuid_matches_either_identifier_and_loads_node_and_nest() {
    let store = MemoryStore::seeded();
    let record = store.server(1).unwrap();
    let repository = ServerRepository::new(store.clone());

    let by_short = repository.get_by_uuid(&record.uuid_short).await.unwrap();
    let by_full = repository.get_by_uuid(&record.uuid.to_string()).await.unwrap();

    assert_eq!(by_short.id, 1);
    assert_eq!(by_full.id, 1);
    assert!(by_short.relations.node.is_some());
    assert!(by_short.relations.nest.is_some());
    assert!(repository.get_by_uuid("missing").await.is_err());
}

#[test]
fn power_action_scope_uses_or_semantics() {
    let mut on_node_two = server(2);
    on_node_two.node_id = 2;
    let on_node_one = server(3);

    let both = PowerActionScope {
        servers: vec![3],
        nodes: vec![2],
    };
    assert!(both.matches(&on_node_two));
    assert!(both.matches(&on_node_one));

    let servers_only = PowerActionScope {
        servers: vec![3],
        nodes: vec![],
    };
    assert!(!servers_only.matches(&on_node_two));
    assert!(servers_only.matches(&on_node_one));

    let nodes_only = PowerActionScope {
        servers: vec![],
        nodes: vec![2],
    };
    assert!(nodes_only.matches(&on_node_two));
    assert!(!nodes_only.matches(&on_node_one));

    assert!(PowerActionScope::default().matches(&on_node_one));
}

#[tokio::test]
async fn power_action_results_carry_their_node() {
    let store = MemoryStore::seeded();
    let mut other = server(2);
    other.node_id = 2;
    store.insert_server(other);
    let repository = ServerRepository::new(store.clone());

    let scope = PowerActionScope {
        servers: vec![],
        nodes: vec![2],
    };
    let servers = repository.servers_for_power_action(&scope).await.unwrap();

    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].relations.node.as_ref().map(|n| n.id), Some(2));
    assert_eq!(repository.power_action_count(&scope).await.unwrap(), 1);
    assert_eq!(
        repository
            .power_action_count(&PowerActionScope::default())
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn node_pages_start_at_one() {
    let store = MemoryStore::seeded();
    for id in 2..=5 {
        store.insert_server(server(id));
    }
    let repository = ServerRepository::new(store.clone());

    let first = repository.servers_for_node(1, 1, 2).await.unwrap();
    let third = repository.servers_for_node(1, 3, 2).await.unwrap();
    let clamped = repository.servers_for_node(1, 0, 2).await.unwrap();

    assert_eq!(first.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(third.iter().map(|s| s.id).collect::<Vec<_>>(), vec![5]);
    assert_eq!(clamped, first);
}

#[tokio::test]
async fn suspended_count_counts_flags() {
    let store = MemoryStore::seeded();
    let mut suspended = server(2);
    suspended.suspended = true;
    store.insert_server(suspended);
    let repository = ServerRepository::new(store.clone());

    assert_eq!(repository.suspended_count().await.unwrap(), 1);
}

#[tokio::test]
async fn far_pages_are_empty() {
    let store = MemoryStore::seeded();
    let repository = ServerRepository::new(store.clone());

    let page = repository.servers_for_node(1, i64::MAX, 100).await.unwrap();

    assert!(page.is_empty());
}

#[tokio::test]
async fn find_with_variables_loads_the_egg_and_its_variables() {
    let repository = ServerRepository::new(MemoryStore::seeded());

    let server = repository.find_with_variables(1).await.unwrap();

    assert_eq!(server.relations.egg, Some(egg(1)));
    assert_eq!(server.relations.variables.as_ref().map(Vec::len), Some(2));
    assert!(server.relations.node.is_none());
}

#[tokio::test]
async fn primary_allocation_is_cached_unless_refreshed() {
    let mut store = MockServerStore::new();
    store
        .expect_fetch_relation()
        .withf(|_, relation| *relation == Relation::Allocation)
        .times(2)
        .returning(|server, _| {
            Ok(RelationData::Allocation(allocation(
                server.allocation_id,
                1,
                Some(server.id),
            )))
        });

    let repository = ServerRepository::new(Arc::new(store));
    let mut server = server(1);

    repository.load_primary_allocation(&mut server, false).await.unwrap();
    repository.load_primary_allocation(&mut server, false).await.unwrap();
    repository.load_primary_allocation(&mut server, true).await.unwrap();

    assert_eq!(server.relations.allocation.map(|a| a.id), Some(1));
}

#[tokio::test]
async fn creation_data_skips_the_node() {
    let mut store = MockServerStore::new();
    store
        .expect_fetch_relation()
        .withf(|_, relation| *relation != Relation::Node)
        .times(3)
        .returning(|server, relation| {
            Ok(match relation {
                Relation::Allocation => {
                    RelationData::Allocation(allocation(server.allocation_id, 1, Some(server.id)))
                }
                Relation::Allocations => RelationData::Allocations(Vec::new()),
                _ => RelationData::Egg(egg(server.egg_id)),
            })
        });

    let repository = ServerRepository::new(Arc::new(store));
    let mut server = server(1);

    repository.load_creation_data(&mut server, false).await.unwrap();

    assert!(server.relations.allocation.is_some());
    assert_eq!(server.relations.allocations, Some(Vec::new()));
    assert_eq!(server.relations.egg, Some(egg(1)));
    assert!(server.relations.node.is_none());
}

#[tokio::test]
async fn database_passwords_decrypt_and_rotate() {
    let store = MemoryStore::seeded();
    let databases = app_state(&store, MockDaemonClient::new()).databases;
    let request = NewDatabase {
        database: "world".to_string(),
        remote: "%".to_string(),
        database_host_id: 1,
        max_connections: None,
    };

    let record = databases.create(1, request).await.unwrap();
    let first = databases.password(1, record.id).await.unwrap();
    databases.reset_password(1, record.id).await.unwrap();
    let second = databases.password(1, record.id).await.unwrap();

    assert_eq!(first.len(), 24);
    assert_ne!(first, record.password);
    assert_ne!(first, second);
    assert!(matches!(
        databases.password(2, record.id).await,
        Err(PanelError::NotFound { .. })
    ));
}
