// src/engine/ordering.rs

use crate::engine::{
    EngineError,
    status::{self, ModuleStatus, StatusContext},
};

/// Only `Locked` and `Scheduled` hide a module from navigation.
pub fn can_access(ctx: &StatusContext<'_>) -> bool {
    !is_blocking(status::resolve(ctx))
}

/// Resolves the status, turning a blocked module into `NotAccessible`.
pub fn ensure_accessible(ctx: &StatusContext<'_>) -> Result<ModuleStatus, EngineError> {
    let status = status::resolve(ctx);
    if is_blocking(status) {
        return Err(EngineError::NotAccessible(status));
    }
    Ok(status)
}

fn is_blocking(status: ModuleStatus) -> bool {
    matches!(status, ModuleStatus::Locked | ModuleStatus::Scheduled)
}
