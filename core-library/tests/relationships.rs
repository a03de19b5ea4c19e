//! Integration tests for likes, follows and catalog queries

use bridge_traits::store::{RecordId, StoreGateway};
use core_library::memory::{Fault, InMemoryStore, StoreOp};
use core_library::models::{ARTIST_FOLLOWS, SONG_LIKES};
use core_library::services::{ArtistService, SongService};
use core_library::{KeyedLocks, Reconciliation, RelationshipToggle};
use core_runtime::config::{ConsistencyConfig, QueryLimits};
use serde_json::json;
use std::sync::Arc;

fn gateway(store: &Arc<InMemoryStore>) -> Arc<dyn StoreGateway> {
    store.clone()
}

fn artists(store: &Arc<InMemoryStore>) -> ArtistService {
    ArtistService::new(
        gateway(store),
        KeyedLocks::new(),
        ConsistencyConfig::default(),
        QueryLimits::default(),
    )
}

fn songs(store: &Arc<InMemoryStore>) -> SongService {
    SongService::new(gateway(store), KeyedLocks::new(), QueryLimits::default())
}

fn follower_count(store: &InMemoryStore, artist: RecordId) -> serde_json::Value {
    store.record("artist_c", artist).unwrap()["follower_count_c"].clone()
}

fn pair_rows(store: &InMemoryStore, collection: &str, left: &str, id: RecordId) -> usize {
    store
        .records(collection)
        .iter()
        .filter(|row| row[left] == json!(id))
        .count()
}

#[tokio::test]
async fn test_follow_toggle_is_an_involution() {
    let store = Arc::new(InMemoryStore::new());
    let artist = store.insert("artist_c", json!({ "name_c": "Nina", "follower_count_c": 0 }));
    let service = artists(&store);

    let first = service.toggle_follow(artist, "user-1").await.unwrap();
    assert!(first.linked);
    assert_eq!(first.follower_count, Reconciliation::Converged(1));
    assert!(service.is_following(artist, "user-1").await);

    let second = service.toggle_follow(artist, "user-1").await.unwrap();
    assert!(!second.linked);
    assert_eq!(second.follower_count, Reconciliation::Converged(0));
    assert!(!service.is_following(artist, "user-1").await);

    assert_eq!(pair_rows(&store, ARTIST_FOLLOWS.collection, "artist_id_c", artist), 0);
    assert_eq!(follower_count(&store, artist), json!(0));
}

#[tokio::test]
async fn test_follower_reconciliation_can_be_disabled() {
    let store = Arc::new(InMemoryStore::new());
    let artist = store.insert("artist_c", json!({ "name_c": "Quiet", "follower_count_c": 7 }));
    let consistency = ConsistencyConfig {
        reconcile_follower_counts: false,
        ..ConsistencyConfig::default()
    };
    let service = ArtistService::new(
        gateway(&store),
        KeyedLocks::new(),
        consistency,
        QueryLimits::default(),
    );

    let update = service.toggle_follow(artist, "user-1").await.unwrap();
    assert!(update.linked);
    assert_eq!(update.follower_count, Reconciliation::Skipped);
    assert_eq!(follower_count(&store, artist), json!(7));
}

#[tokio::test]
async fn test_unfollow_heals_duplicate_rows() {
    let store = Arc::new(InMemoryStore::new());
    let artist = store.insert("artist_c", json!({ "name_c": "Dup", "follower_count_c": 2 }));
    for _ in 0..2 {
        store.insert(
            ARTIST_FOLLOWS.collection,
            json!({ "artist_id_c": artist, "user_id_c": "user-1" }),
        );
    }

    let update = artists(&store).toggle_follow(artist, "user-1").await.unwrap();

    assert!(!update.linked);
    assert_eq!(update.follower_count, Reconciliation::Converged(0));
    assert_eq!(pair_rows(&store, ARTIST_FOLLOWS.collection, "artist_id_c", artist), 0);
}

#[tokio::test]
async fn test_follow_of_missing_artist_writes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let err = artists(&store).toggle_follow(404, "user-1").await.unwrap_err();

    assert!(matches!(err, core_library::LibraryError::NotFound { .. }));
    assert_eq!(store.mutation_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_alternate() {
    let store = Arc::new(InMemoryStore::new());
    let song = store.insert("song_c", json!({ "Name": "Hot" }));
    let service = songs(&store);

    let toggles = (0..5).map(|_| service.toggle_like(song, "user-1"));
    let outcomes: Vec<bool> = futures::future::join_all(toggles)
        .await
        .into_iter()
        .map(|r| r.unwrap().linked)
        .collect();

    assert_eq!(outcomes.iter().filter(|linked| **linked).count(), 3);
    assert_eq!(pair_rows(&store, SONG_LIKES.collection, "song_id_c", song), 1);
    assert!(service.is_liked(song, "user-1").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_processes_converge_on_unique_store() {
    let store = Arc::new(
        InMemoryStore::new().with_unique_constraint(SONG_LIKES.collection, &["song_id_c", "user_id_c"]),
    );
    // Separate lock tables stand in for two processes sharing the store
    let a = RelationshipToggle::new(gateway(&store), KeyedLocks::new());
    let b = RelationshipToggle::new(gateway(&store), KeyedLocks::new());

    let (left, right) = futures::join!(
        a.link(&SONG_LIKES, 1, "user-1"),
        b.link(&SONG_LIKES, 1, "user-1"),
    );
    let created = [left.unwrap(), right.unwrap()];

    assert_eq!(created.iter().filter(|c| **c).count(), 1);
    assert_eq!(store.records(SONG_LIKES.collection).len(), 1);
    assert!(a.is_linked(&SONG_LIKES, 1, "user-1").await.unwrap());
}

#[tokio::test]
async fn test_failed_unlike_leaves_pair_readable() {
    let store = Arc::new(InMemoryStore::new());
    let song = store.insert("song_c", json!({ "Name": "Sticky" }));
    let service = songs(&store);
    service.toggle_like(song, "user-1").await.unwrap();

    store.fail_next(StoreOp::Delete, Some(SONG_LIKES.collection), Fault::Unavailable);
    assert!(service.toggle_like(song, "user-1").await.is_err());
    assert!(service.is_liked(song, "user-1").await);

    // Retrying re-checks the pair and completes the unlike
    let outcome = service.toggle_like(song, "user-1").await.unwrap();
    assert!(!outcome.linked);
    assert!(!service.is_liked(song, "user-1").await);
}

#[tokio::test]
async fn test_liked_songs_resolve_once_each() {
    let store = Arc::new(InMemoryStore::new());
    let a = store.insert("song_c", json!({ "Name": "A" }));
    let b = store.insert("song_c", json!({ "Name": "B" }));
    store.insert("song_c", json!({ "Name": "Unliked" }));
    for song in [a, b, a] {
        store.insert(SONG_LIKES.collection, json!({ "song_id_c": song, "user_id_c": "user-1" }));
    }
    store.insert(SONG_LIKES.collection, json!({ "song_id_c": b, "user_id_c": "user-2" }));

    let liked = songs(&store).liked_songs("user-1").await.unwrap();
    let mut ids: Vec<RecordId> = liked.iter().map(|s| s.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![a, b]);

    assert!(songs(&store).liked_songs("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_followed_artists() {
    let store = Arc::new(InMemoryStore::new());
    let service = artists(&store);
    let x = store.insert("artist_c", json!({ "name_c": "X" }));
    let y = store.insert("artist_c", json!({ "name_c": "Y" }));
    service.toggle_follow(x, "user-9").await.unwrap();
    service.toggle_follow(y, "user-9").await.unwrap();
    service.toggle_follow(x, "user-9").await.unwrap();

    let followed = service.followed_artists("user-9").await.unwrap();
    assert_eq!(followed.len(), 1);
    assert_eq!(followed[0].id, y);
    assert_eq!(followed[0].follower_count, 1);
}

#[tokio::test]
async fn test_blank_search_skips_store() {
    let store = Arc::new(InMemoryStore::new());
    store.insert("song_c", json!({ "Name": "Anything" }));
    let service = songs(&store);

    for term in ["", "   ", "\t"] {
        assert!(service.search(term).await.unwrap().is_empty());
    }
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_search_is_case_insensitive_across_fields() {
    let store = Arc::new(InMemoryStore::new());
    let by_title = store.insert("song_c", json!({ "Name": "Blue Monday", "artist_c": "New Order" }));
    let by_album = store.insert("song_c", json!({ "Name": "Ceremony", "album_c": "Substance" }));
    store.insert("song_c", json!({ "Name": "Other", "artist_c": "Someone" }));
    let service = songs(&store);

    let hits: Vec<RecordId> = service.search("ORDER").await.unwrap().iter().map(|s| s.id).collect();
    assert_eq!(hits, vec![by_title]);

    let hits: Vec<RecordId> = service.search("subst").await.unwrap().iter().map(|s| s.id).collect();
    assert_eq!(hits, vec![by_album]);
}

#[tokio::test]
async fn test_top_charts_and_featured_limits() {
    let store = Arc::new(InMemoryStore::new());
    for plays in [5, 50, 20, 1] {
        store.insert("song_c", json!({ "Name": format!("p{}", plays), "play_count_c": plays }));
    }
    for followers in 0..8 {
        store.insert("artist_c", json!({ "name_c": format!("a{}", followers), "follower_count_c": followers }));
    }

    let charts = songs(&store).top_charts(Some(3)).await.unwrap();
    let ranked: Vec<(u32, &str)> = charts.iter().map(|e| (e.rank, e.song.title.as_str())).collect();
    assert_eq!(ranked, vec![(1, "p50"), (2, "p20"), (3, "p5")]);

    assert!(songs(&store).top_charts(Some(0)).await.unwrap().is_empty());

    let featured = artists(&store).featured(None).await.unwrap();
    assert_eq!(featured.len(), 6);
    assert_eq!(featured[0].follower_count, 7);
}
