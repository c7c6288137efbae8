//! Task-scoped carrier for the current [`ExecutionContext`]
//!
//! The binding lives in tokio task-local storage and exists only for the
//! duration of a [`scope`]. When the scoped future finishes (by returning,
//! erroring, panicking or being dropped) the binding is gone, so a later
//! unit of work on the same worker thread can never observe it.
//!
//! Handoffs ([`spawn`], [`spawn_blocking`], [`spawn_thread`], [`inherit`])
//! clone the current binding into the new execution before it starts. The
//! child owns its copy; changes on either side are invisible to the other.

use lifeline_core::RequestId;
use std::cell::RefCell;
use std::future::Future;
use thiserror::Error;
use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;

use crate::context::ExecutionContext;

tokio::task_local! {
    static CURRENT: RefCell<Option<ExecutionContext>>;
}

/// Errors from mutating the binding
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierError {
    /// Called outside any unit-of-work scope
    #[error("no unit-of-work scope is active")]
    NoScope,

    /// The scope exists but holds no binding
    #[error("no execution context is bound")]
    NotBound,
}

/// Run `fut` as a unit of work with `ctx` bound.
///
/// This is the unit-of-work boundary: the binding is removed on every exit
/// path of `fut`.
pub fn scope<F: Future>(
    ctx: ExecutionContext,
    fut: F,
) -> TaskLocalFuture<RefCell<Option<ExecutionContext>>, F> {
    CURRENT.scope(RefCell::new(Some(ctx)), fut)
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<R>(ctx: ExecutionContext, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(RefCell::new(Some(ctx)), f)
}

/// A copy of the current binding, or `None` when absent.
pub fn current() -> Option<ExecutionContext> {
    CURRENT
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

/// The bound request identifier, if any.
pub fn current_id() -> Option<RequestId> {
    CURRENT
        .try_with(|cell| cell.borrow().as_ref().map(|ctx| ctx.request_id))
        .ok()
        .flatten()
}

/// Replace the binding for the rest of the current scope.
pub fn bind(ctx: ExecutionContext) -> Result<(), CarrierError> {
    CURRENT
        .try_with(|cell| {
            cell.replace(Some(ctx));
        })
        .map_err(|_| CarrierError::NoScope)
}

/// Remove the binding before the scope ends.
pub fn clear() {
    let _ = CURRENT.try_with(|cell| cell.take());
}

/// Set one metadata entry on the bound context.
pub fn set_metadata(key: impl Into<String>, value: serde_json::Value) -> Result<(), CarrierError> {
    CURRENT
        .try_with(|cell| match cell.borrow_mut().as_mut() {
            Some(ctx) => {
                ctx.metadata.insert(key.into(), value);
                Ok(())
            }
            None => Err(CarrierError::NotBound),
        })
        .map_err(|_| CarrierError::NoScope)?
}

/// Wrap `fut` so that it runs with a copy of the current binding.
///
/// Use this to hand work to executors other than [`spawn`], such as a
/// `JoinSet`. The copy is taken now, not when `fut` is first polled.
pub fn inherit<F: Future>(fut: F) -> TaskLocalFuture<RefCell<Option<ExecutionContext>>, F> {
    CURRENT.scope(RefCell::new(current()), fut)
}

/// Spawn a task that inherits a copy of the current binding.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(inherit(fut))
}

/// Run blocking work on the blocking pool with a copy of the binding.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let inherited = current();
    tokio::task::spawn_blocking(move || CURRENT.sync_scope(RefCell::new(inherited), f))
}

/// Start an OS thread with a copy of the binding.
pub fn spawn_thread<F, R>(f: F) -> std::thread::JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let inherited = current();
    std::thread::spawn(move || CURRENT.sync_scope(RefCell::new(inherited), f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_absent_outside_scope() {
        assert!(current().is_none());
        assert!(current_id().is_none());
        assert_eq!(
            bind(ExecutionContext::minted()),
            Err(CarrierError::NoScope)
        );
        assert_eq!(set_metadata("k", json!(1)), Err(CarrierError::NoScope));
    }

    #[tokio::test]
    async fn test_scope_binds_and_releases() {
        let ctx = ExecutionContext::minted();
        let id = ctx.request_id;

        let seen = scope(ctx, async { current_id() }).await;
        assert_eq!(seen, Some(id));
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn test_bind_and_clear_inside_scope() {
        let first = ExecutionContext::minted();
        let second = ExecutionContext::minted();
        let second_id = second.request_id;

        scope(first, async move {
            bind(second).unwrap();
            assert_eq!(current_id(), Some(second_id));

            clear();
            assert!(current().is_none());
            assert_eq!(set_metadata("k", json!(1)), Err(CarrierError::NotBound));
        })
        .await;
    }

    #[tokio::test]
    async fn test_spawned_copy_is_independent() {
        let ctx = ExecutionContext::minted().with_metadata("tenant", json!("acme"));
        let id = ctx.request_id;

        scope(ctx, async move {
            let child = spawn(async move {
                let inherited = current().unwrap();
                set_metadata("tenant", json!("globex")).unwrap();
                set_metadata("child_only", json!(true)).unwrap();
                (inherited, current().unwrap())
            })
            .await
            .unwrap();

            let (inherited, mutated) = child;
            assert_eq!(inherited.request_id, id);
            assert_eq!(inherited.metadata["tenant"], json!("acme"));
            assert_eq!(mutated.metadata["tenant"], json!("globex"));

            let parent = current().unwrap();
            assert_eq!(parent.metadata["tenant"], json!("acme"));
            assert!(!parent.metadata.contains_key("child_only"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_parent_changes_after_spawn_not_seen_by_child() {
        let ctx = ExecutionContext::minted();

        scope(ctx, async {
            let (tx, rx) = tokio::sync::oneshot::channel::<()>();
            let child = spawn(async move {
                rx.await.unwrap();
                current().unwrap().metadata.get("late").cloned()
            });

            set_metadata("late", json!("parent")).unwrap();
            tx.send(()).unwrap();
            assert_eq!(child.await.unwrap(), None);
        })
        .await;
    }

    #[tokio::test]
    async fn test_spawn_without_binding_stays_absent() {
        let seen = spawn(async { current() }).await.unwrap();
        assert!(seen.is_none());
    }

    #[tokio::test]
    async fn test_spawn_blocking_inherits() {
        let ctx = ExecutionContext::minted();
        let id = ctx.request_id;

        let seen = scope(ctx, async { spawn_blocking(current_id).await.unwrap() }).await;
        assert_eq!(seen, Some(id));
    }

    #[test]
    fn test_spawn_thread_inherits() {
        let ctx = ExecutionContext::minted();
        let id = ctx.request_id;

        let seen = sync_scope(ctx, || spawn_thread(current_id).join().unwrap());
        assert_eq!(seen, Some(id));
        assert!(current().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_sequential_units_on_one_worker_do_not_leak() {
        let first = ExecutionContext::minted();
        scope(first, async {
            assert!(current().is_some());
        })
        .await;

        let second_unit = tokio::spawn(async { current() });
        assert!(second_unit.await.unwrap().is_none());
        assert!(current().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_panicking_unit_releases_binding() {
        let failed = tokio::spawn(scope(ExecutionContext::minted(), async {
            panic!("unit of work failed");
        }))
        .await;
        assert!(failed.unwrap_err().is_panic());

        let next = tokio::spawn(async { current() }).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_inherit_for_join_set() {
        let ctx = ExecutionContext::minted();
        let id = ctx.request_id;

        let ids = scope(ctx, async {
            let mut set = tokio::task::JoinSet::new();
            for _ in 0..4 {
                set.spawn(inherit(async { current_id() }));
            }
            let mut ids = Vec::new();
            while let Some(res) = set.join_next().await {
                ids.push(res.unwrap());
            }
            ids
        })
        .await;

        assert_eq!(ids, vec![Some(id); 4]);
    }
}
