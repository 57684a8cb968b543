//! Sync engine that ties planning and execution together

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::executor::Executor;
use crate::planner::{Planner, SyncAction, SyncOptions, SyncPlan};
use crate::report::ExecutionReport;

/// Result of one sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub plan: SyncPlan,
    /// `None` in preview mode
    pub report: Option<ExecutionReport>,
}

/// Plans a sync and, unless in preview mode, applies it
pub struct SyncEngine {
    options: SyncOptions,
    executor: Executor,
}

impl SyncEngine {
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            executor: Executor::new(),
        }
    }

    /// Build the plan without touching the filesystem, whatever `preview_only` says
    pub fn preview(&self) -> Result<SyncPlan> {
        Planner::new(&self.options).build()
    }

    /// Plan, then apply every action
    pub fn run(&self) -> Result<SyncRun> {
        self.run_with_confirm(|_| true)
    }

    /// Plan, then apply each action `confirm` accepts
    pub fn run_with_confirm<F>(&self, confirm: F) -> Result<SyncRun>
    where
        F: FnMut(&SyncAction) -> bool,
    {
        let plan = self.preview()?;

        if self.options.preview_only {
            info!(actions = plan.actions.len(), "preview only, nothing applied");
            return Ok(SyncRun { plan, report: None });
        }

        let report = self.executor.apply_plan(&plan, confirm)?;
        Ok(SyncRun {
            plan,
            report: Some(report),
        })
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }
}
