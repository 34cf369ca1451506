// src/models/group.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'groups' table: an ordered bundle of modules.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    /// Members must be completed in `order_number` order.
    pub is_member_order_locked: bool,
    /// After a member completes, the next one waits for the previous duration to run out.
    pub wait_module_completion: bool,
}

/// Represents the 'group_members' table: which module sits in which slot.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: i64,
    pub group_id: i64,
    pub order_number: i32,
    pub module_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub is_member_order_locked: bool,
    pub wait_module_completion: bool,
    pub module_ids: Vec<i64>,
}

/// DTO for creating a group. `module_ids` order becomes `order_number` 1..n.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub is_member_order_locked: bool,
    #[serde(default)]
    pub wait_module_completion: bool,
    #[validate(length(min = 1, max = 100))]
    pub module_ids: Vec<i64>,
}

impl From<CreateGroupRequest> for NewGroup {
    fn from(req: CreateGroupRequest) -> Self {
        Self {
            name: req.name,
            is_member_order_locked: req.is_member_order_locked,
            wait_module_completion: req.wait_module_completion,
            module_ids: req.module_ids,
        }
    }
}
