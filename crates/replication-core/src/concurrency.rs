//! Structured-concurrency primitives shared by the planner and the
//! filesystem plan.
//!
//! The two concurrent list calls used during per-filesystem planning and
//! during cross-endpoint filesystem enumeration share one cancellation
//! scope: if either side fails, the other is aborted rather than left to
//! run to completion for no purpose.

use std::future::Future;

use tokio::task::JoinSet;

enum Lane<A, B> {
    Left(A),
    Right(B),
}

/// Runs two fallible, `'static` futures concurrently in one [`JoinSet`]
/// scope. If either fails, the other is aborted and the error is returned
/// immediately; otherwise both results are returned once both complete.
pub async fn concurrent_pair<A, B, E>(
    left: impl Future<Output = Result<A, E>> + Send + 'static,
    right: impl Future<Output = Result<B, E>> + Send + 'static,
) -> Result<(A, B), E>
where
    A: Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
{
    let mut set = JoinSet::new();
    set.spawn(async move { Lane::Left(left.await) });
    set.spawn(async move { Lane::Right(right.await) });

    let mut left_result = None;
    let mut right_result = None;
    while let Some(joined) = set.join_next().await {
        match joined.expect("listing task panicked") {
            Lane::Left(Err(error)) => {
                set.abort_all();
                return Err(error);
            }
            Lane::Right(Err(error)) => {
                set.abort_all();
                return Err(error);
            }
            Lane::Left(Ok(value)) => left_result = Some(value),
            Lane::Right(Ok(value)) => right_result = Some(value),
        }
    }

    Ok((
        left_result.expect("joinset completed both lanes without error"),
        right_result.expect("joinset completed both lanes without error"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_both_results_when_both_succeed() {
        let result = concurrent_pair::<_, _, &'static str>(async { Ok(1) }, async { Ok("two") }).await;
        assert_eq!(result, Ok((1, "two")));
    }

    #[tokio::test]
    async fn returns_the_first_error() {
        let result: Result<((), ()), &'static str> =
            concurrent_pair(async { Err("left failed") }, async { Ok(()) }).await;
        assert_eq!(result, Err("left failed"));
    }
}
