//! Extension hooks.
//!
//! A hook runs after the built-in generators on every `add_paths_to_joinrel` call
//! and may contribute extra paths (a custom join operator, a remote join). It
//! sees the call context read-only; the only way to change the join relation is
//! `HookCall::add_path`, which goes through the regular admission rules.

use crate::extra::JoinPathExtraData;
use crate::planner::JoinSearch;
use pathx_core::context::PlannerContext;
use pathx_core::error::PlanError;
use pathx_core::expr::JoinType;
use pathx_core::path::Path;
use pathx_core::relation::Relation;
use std::sync::Arc;
use tracing::debug;

pub trait JoinPathHook: Send + Sync {
    fn name(&self) -> &str;

    fn add_paths(&self, call: &mut HookCall<'_>) -> Result<(), PlanError>;
}

/// One hook invocation.
pub struct HookCall<'a> {
    ctx: &'a PlannerContext,
    joinrel: &'a mut Relation,
    outerrel: &'a Relation,
    innerrel: &'a Relation,
    jointype: JoinType,
    extra: &'a JoinPathExtraData<'a>,
    admitted: usize,
}

impl HookCall<'_> {
    pub fn ctx(&self) -> &PlannerContext {
        self.ctx
    }

    pub fn joinrel(&self) -> &Relation {
        &*self.joinrel
    }

    pub fn outerrel(&self) -> &Relation {
        self.outerrel
    }

    pub fn innerrel(&self) -> &Relation {
        self.innerrel
    }

    pub fn jointype(&self) -> JoinType {
        self.jointype
    }

    pub fn extra(&self) -> &JoinPathExtraData<'_> {
        self.extra
    }

    /// Offer `path` to the join relation. Returns whether it was kept.
    pub fn add_path(&mut self, path: Path) -> bool {
        let admitted = self.joinrel.add_path(Arc::new(path));
        if admitted {
            self.admitted += 1;
        }
        admitted
    }
}

impl JoinSearch<'_> {
    pub(crate) fn run_hooks(&mut self) -> Result<(), PlanError> {
        let planner = self.planner;
        for hook in &planner.hooks {
            let mut call = HookCall {
                ctx: self.ctx,
                joinrel: &mut *self.joinrel,
                outerrel: self.outerrel,
                innerrel: self.innerrel,
                jointype: self.jointype,
                extra: &self.extra,
                admitted: 0,
            };
            hook.add_paths(&mut call)?;
            let admitted = call.admitted;
            debug!("hook {} on {}: {} paths admitted", hook.name(), self.joinrel.relids, admitted);
            self.stats.hook_paths_admitted += admitted;
        }
        Ok(())
    }
}
