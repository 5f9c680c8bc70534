use std::future::Future;

use futures_util::future::{join_all, BoxFuture, FutureExt};

/// Independent best-effort tasks that follow a primary state change.
///
/// Every task runs to completion; a failure is captured and logged against
/// the task's name and never propagates to the caller.
#[derive(Default)]
pub struct SideEffects<'a> {
    tasks: Vec<(&'static str, BoxFuture<'a, anyhow::Result<()>>)>,
}

#[derive(Debug, Default)]
pub struct SideEffectReport {
    pub completed: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

impl SideEffectReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<'a> SideEffects<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'a,
    {
        self.tasks.push((name, task.boxed()));
    }

    pub async fn run(self, context: &str) -> SideEffectReport {
        let (names, futures): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = join_all(futures).await;

        let mut report = SideEffectReport::default();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(()) => report.completed.push(name),
                Err(e) => {
                    tracing::warn!(side_effect = name, context, "side effect failed: {e:#}");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        report
    }
}
