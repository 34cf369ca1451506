// src/engine/status.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    engine::timer,
    models::{
        assignment::Assignment,
        group::{Group, GroupMember},
        progress::ModuleProgress,
    },
};

/// Where an exam taker stands on one module of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModuleStatus {
    Locked,
    WaitForModuleDurationToElapse,
    Scheduled,
    TimeElapsed,
    Completed,
    InProgress,
    NotStarted,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Locked => "Locked",
            ModuleStatus::WaitForModuleDurationToElapse => "WaitForModuleDurationToElapse",
            ModuleStatus::Scheduled => "Scheduled",
            ModuleStatus::TimeElapsed => "TimeElapsed",
            ModuleStatus::Completed => "Completed",
            ModuleStatus::InProgress => "InProgress",
            ModuleStatus::NotStarted => "NotStarted",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the resolver looks at for one module of one attempt.
#[derive(Debug, Clone, Copy)]
pub struct StatusContext<'a> {
    pub assignment: &'a Assignment,
    pub group: &'a Group,
    /// All members of the group, any order.
    pub members: &'a [GroupMember],
    pub member: &'a GroupMember,
    /// Progress records of this attempt (any member).
    pub progress: &'a [ModuleProgress],
    pub now: DateTime<Utc>,
}

impl<'a> StatusContext<'a> {
    fn progress_of(&self, member: &GroupMember) -> Option<&'a ModuleProgress> {
        self.progress.iter().find(|p| p.group_member_id == member.id)
    }

    fn own_progress(&self) -> Option<&'a ModuleProgress> {
        self.progress_of(self.member)
    }

    fn previous_member(&self) -> Option<&'a GroupMember> {
        self.members
            .iter()
            .filter(|m| m.order_number < self.member.order_number)
            .max_by_key(|m| m.order_number)
    }

    fn is_member_completed(&self, member: &GroupMember) -> bool {
        self.progress_of(member)
            .is_some_and(|p| p.completed_at_utc.is_some())
    }
}

struct Rule {
    status: ModuleStatus,
    applies: fn(&StatusContext<'_>) -> bool,
}

/// Evaluated top to bottom, first match wins. Anything left over is `NotStarted`.
const RULES: [Rule; 6] = [
    Rule {
        status: ModuleStatus::Locked,
        applies: is_locked,
    },
    Rule {
        status: ModuleStatus::WaitForModuleDurationToElapse,
        applies: is_cooling_down,
    },
    Rule {
        status: ModuleStatus::Scheduled,
        applies: is_scheduled,
    },
    Rule {
        status: ModuleStatus::TimeElapsed,
        applies: is_time_elapsed,
    },
    Rule {
        status: ModuleStatus::Completed,
        applies: is_completed,
    },
    Rule {
        status: ModuleStatus::InProgress,
        applies: is_in_progress,
    },
];

pub fn resolve(ctx: &StatusContext<'_>) -> ModuleStatus {
    RULES
        .iter()
        .find(|rule| (rule.applies)(ctx))
        .map(|rule| rule.status)
        .unwrap_or(ModuleStatus::NotStarted)
}

fn is_locked(ctx: &StatusContext<'_>) -> bool {
    ctx.group.is_member_order_locked
        && ctx
            .members
            .iter()
            .filter(|m| m.order_number < ctx.member.order_number)
            .any(|m| !ctx.is_member_completed(m))
}

/// The previous module is done but its own duration window, measured from
/// its start, is still running.
fn is_cooling_down(ctx: &StatusContext<'_>) -> bool {
    if !ctx.group.wait_module_completion {
        return false;
    }
    let Some(previous) = ctx.previous_member().and_then(|m| ctx.progress_of(m)) else {
        return false;
    };
    previous.completed_at_utc.is_some()
        && timer::deadline(previous).is_some_and(|window_end| ctx.now < window_end)
}

fn is_scheduled(ctx: &StatusContext<'_>) -> bool {
    ctx.now < ctx.assignment.start_date_utc
}

fn is_time_elapsed(ctx: &StatusContext<'_>) -> bool {
    ctx.own_progress()
        .is_some_and(|p| timer::is_expired(p, ctx.now))
}

fn is_completed(ctx: &StatusContext<'_>) -> bool {
    ctx.own_progress()
        .is_some_and(|p| p.completed_at_utc.is_some())
}

fn is_in_progress(ctx: &StatusContext<'_>) -> bool {
    ctx.own_progress()
        .is_some_and(|p| p.started_at_utc.is_some() && p.completed_at_utc.is_none())
}
