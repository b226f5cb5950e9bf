//! Bounded worker pool for batch operations.

use rayon::prelude::*;
use tracing::warn;

/// Apply `f` to every item on a pool of at most `cap` threads, never more
/// threads than items. Results are aligned with `items`.
///
/// Falls back to sequential execution when a pool cannot be built.
pub fn map_bounded<T, R, F>(items: &[T], cap: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    let threads = items.len().min(cap.max(1));
    if threads <= 1 {
        return items.iter().map(f).collect();
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|idx| format!("qt-batch-{idx}"))
        .build()
    {
        Ok(pool) => pool.install(|| items.par_iter().map(&f).collect()),
        Err(err) => {
            warn!(threads, error = %err, "worker pool unavailable, running batch sequentially");
            items.iter().map(f).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_are_positional() {
        let items: Vec<u64> = (0..100).collect();
        let out = map_bounded(&items, 8, |n| {
            std::thread::sleep(std::time::Duration::from_micros(100 - n));
            n * 2
        });
        assert_eq!(out, items.iter().map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn empty_and_single_batches() {
        let none: Vec<u8> = Vec::new();
        assert!(map_bounded(&none, 4, |x| *x).is_empty());
        assert_eq!(map_bounded(&[7u8], 4, |x| *x + 1), vec![8]);
    }

    #[test]
    fn zero_cap_runs_sequentially() {
        assert_eq!(map_bounded(&[1, 2, 3], 0, |x| x * 10), vec![10, 20, 30]);
    }

    #[test]
    fn failures_stay_per_item() {
        let out: Vec<Result<u8, String>> =
            map_bounded(&[1u8, 0, 2], 3, |x| if *x == 0 { Err("zero".into()) } else { Ok(*x) });
        assert_eq!(out, vec![Ok(1), Err("zero".to_string()), Ok(2)]);
    }
}
