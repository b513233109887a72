//! Shared domain enumerations.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Register,
    Login,
    Create,
    Get,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Register => "register",
            AuditAction::Login => "login",
            AuditAction::Create => "create",
            AuditAction::Get => "get",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "register" => Ok(AuditAction::Register),
            "login" => Ok(AuditAction::Login),
            "create" => Ok(AuditAction::Create),
            "get" => Ok(AuditAction::Get),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            other => Err(format!("unknown audit action `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntity {
    User,
    Post,
    File,
}

impl AuditEntity {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEntity::User => "user",
            AuditEntity::Post => "post",
            AuditEntity::File => "file",
        }
    }
}

impl FromStr for AuditEntity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(AuditEntity::User),
            "post" => Ok(AuditEntity::Post),
            "file" => Ok(AuditEntity::File),
            other => Err(format!("unknown audit entity `{other}`")),
        }
    }
}
