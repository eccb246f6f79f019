//! Fault isolation for spawned tasks.
//!
//! Every connection task and relay direction runs under [`run_guarded`]: a
//! panic inside it is caught at the task boundary, logged with the task label
//! and the current span, and turned into a normal (empty) completion.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Run `fut`, converting a panic into `None`.
pub async fn run_guarded<F>(label: &'static str, fut: F) -> Option<F::Output>
where
    F: Future,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(output) => Some(output),
        Err(payload) => {
            crate::observability::metrics::record_task_panic(label);
            tracing::error!(
                task = label,
                panic = %panic_message(payload.as_ref()),
                "Task panicked; terminating it"
            );
            None
        }
    }
}

/// Spawn `fut` on the runtime under [`run_guarded`], inheriting the current span.
pub fn spawn_supervised<F>(label: &'static str, fut: F) -> JoinHandle<Option<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(run_guarded(label, fut).in_current_span())
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_output_when_no_panic() {
        assert_eq!(run_guarded("ok", async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn panic_becomes_none() {
        let out: Option<()> = run_guarded("boom", async { panic!("dummy") }).await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn sibling_survives_panicking_task() {
        let bad = spawn_supervised("bad", async {
            if true {
                panic!("dummy");
            }
            1
        });
        let good = spawn_supervised("good", async { 2 });

        assert_eq!(bad.await.unwrap(), None);
        assert_eq!(good.await.unwrap(), Some(2));
    }

    #[test]
    fn extracts_string_payloads() {
        let p: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(p.as_ref()), "static");
        let p: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(p.as_ref()), "owned");
        let p: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(p.as_ref()), "non-string panic payload");
    }
}
