//! Integration tests for per-viewer post visibility

mod common;

use common::mock::{engine_uncached, MockBackend};
use driftwood::error::Error;
use driftwood::orm::posts::Visibility;

#[tokio::test]
async fn friends_post_becomes_visible_after_follow() {
    let backend = MockBackend::new();
    let author = backend.seed_user("author");
    let viewer = backend.seed_user("viewer");
    let post_id = backend.seed_post(author, "for friends only", Visibility::Friends, 1);

    let engine = engine_uncached(&backend);

    let before = engine.get_post_by_id(post_id, Some(viewer)).await;
    assert!(matches!(before, Err(Error::NotFound)));

    backend.seed_follow(viewer, author);

    let after = engine.get_post_by_id(post_id, Some(viewer)).await.unwrap();
    assert_eq!(after.id, post_id);
    assert_eq!(after.author_username, "author");
}

#[tokio::test]
async fn blocked_pair_hides_public_posts_in_both_directions() {
    let backend = MockBackend::new();
    let author = backend.seed_user("author");
    let viewer = backend.seed_user("viewer");
    let post_id = backend.seed_post(author, "hello", Visibility::Public, 1);

    let engine = engine_uncached(&backend);
    assert!(engine.get_post_by_id(post_id, Some(viewer)).await.is_ok());

    // The direction of the block edge does not matter.
    backend.seed_block(viewer, author);
    assert!(matches!(
        engine.get_post_by_id(post_id, Some(viewer)).await,
        Err(Error::NotFound)
    ));
}

#[tokio::test]
async fn block_by_author_also_hides_the_post() {
    let backend = MockBackend::new();
    let author = backend.seed_user("author");
    let viewer = backend.seed_user("viewer");
    let post_id = backend.seed_post(author, "hello", Visibility::Public, 1);
    backend.seed_block(author, viewer);

    let engine = engine_uncached(&backend);
    assert!(matches!(
        engine.get_post_by_id(post_id, Some(viewer)).await,
        Err(Error::NotFound)
    ));
}

#[tokio::test]
async fn anonymous_viewers_only_see_public_posts() {
    let backend = MockBackend::new();
    let author = backend.seed_user("author");
    let public_id = backend.seed_post(author, "public", Visibility::Public, 1);
    let friends_id = backend.seed_post(author, "friends", Visibility::Friends, 1);
    let private_id = backend.seed_post(author, "private", Visibility::Private, 1);

    let engine = engine_uncached(&backend);

    assert!(engine.get_post_by_id(public_id, None).await.is_ok());
    assert!(matches!(
        engine.get_post_by_id(friends_id, None).await,
        Err(Error::NotFound)
    ));
    assert!(matches!(
        engine.get_post_by_id(private_id, None).await,
        Err(Error::NotFound)
    ));
}

#[tokio::test]
async fn private_posts_are_visible_to_the_author_only() {
    let backend = MockBackend::new();
    let author = backend.seed_user("author");
    let follower = backend.seed_user("follower");
    backend.seed_follow(follower, author);
    let post_id = backend.seed_post(author, "my notes", Visibility::Private, 1);

    let engine = engine_uncached(&backend);

    assert!(engine.get_post_by_id(post_id, Some(author)).await.is_ok());
    // Following does not grant access to private content.
    assert!(matches!(
        engine.get_post_by_id(post_id, Some(follower)).await,
        Err(Error::NotFound)
    ));
}

#[tokio::test]
async fn deleted_posts_report_not_found_even_to_their_author() {
    let backend = MockBackend::new();
    let author = backend.seed_user("author");
    let post_id = backend.seed_post(author, "soon gone", Visibility::Public, 1);

    let engine = engine_uncached(&backend);
    engine.delete_post(author, post_id).await.unwrap();

    assert!(matches!(
        engine.get_post_by_id(post_id, Some(author)).await,
        Err(Error::NotFound)
    ));
    // A second delete finds nothing to act on.
    assert!(matches!(
        engine.delete_post(author, post_id).await,
        Err(Error::NotFound)
    ));
}

#[tokio::test]
async fn only_the_author_may_update_or_delete() {
    let backend = MockBackend::new();
    let author = backend.seed_user("author");
    let other = backend.seed_user("other");
    let post_id = backend.seed_post(author, "mine", Visibility::Public, 1);

    let engine = engine_uncached(&backend);

    assert!(matches!(
        engine.delete_post(other, post_id).await,
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        engine
            .update_post(other, post_id, Default::default())
            .await,
        Err(Error::Forbidden)
    ));
}
