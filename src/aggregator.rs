use crate::parser::Post;

/// Concatenates per-feed posts and orders them newest first.
///
/// The sort is stable: posts with equal dates keep feed order, then document
/// order. Posts without a valid date go last, also in insertion order.
/// Nothing is deduplicated.
pub fn merge(per_feed_posts: Vec<Vec<Post>>) -> Vec<Post> {
    let mut posts: Vec<Post> = per_feed_posts.into_iter().flatten().collect();
    // None < Some, so comparing b to a puts undated posts at the end
    posts.sort_by(|a, b| b.date.cmp(&a.date));
    posts
}
