//! Concurrent fan-out over independent per-station fetches.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Drives every future concurrently and returns their outputs in input order.
///
/// `limit` caps how many run at once; `None` (or `Some(0)`) runs them all
/// together. The cap is a provider rate-limit knob and never changes results.
pub async fn collect_concurrently<I, F, T>(futures: I, limit: Option<usize>) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T>,
{
    match limit {
        Some(n) if n > 0 => stream::iter(futures).buffered(n).collect().await,
        _ => futures::future::join_all(futures).await,
    }
}
