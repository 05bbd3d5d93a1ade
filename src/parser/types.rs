//! Artifact / Action 数据模型
//!
//! Artifact 由根标签（id / title）打开，包含有序的 Action；Action 为按 kind 区分的 tagged union，
//! content 随流式 chunk 累积。kind 专属字段缺失的 Action 不会被构造（见 ActionKind::from_attributes）。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Supabase 操作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupabaseOperation {
    Migration,
    Query,
}

impl SupabaseOperation {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "migration" => Some(Self::Migration),
            "query" => Some(Self::Query),
            _ => None,
        }
    }
}

/// 任务状态（task-update Action）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl TaskStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "not-started" => Some(Self::NotStarted),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Action 种类及其专属字段
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActionKind {
    File {
        file_path: String,
    },
    Shell,
    Start,
    Build,
    Supabase {
        operation: SupabaseOperation,
        project_id: Option<String>,
        file_path: Option<String>,
    },
    Plan {
        plan_title: String,
    },
    TaskUpdate {
        task_id: String,
        task_status: TaskStatus,
    },
    /// 未识别的 type：按非 file 生命周期处理（关闭时一次性交付），不执行
    Unknown {
        #[serde(rename = "type")]
        raw_type: String,
    },
}

/// 标签已完整但缺少必需属性的 Action
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedAction {
    pub kind: String,
    pub reason: String,
}

impl fmt::Display for MalformedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed '{}' action: {}", self.kind, self.reason)
    }
}

fn required<'a>(
    attrs: &'a HashMap<String, String>,
    kind: &str,
    names: &[&str],
) -> Result<&'a str, MalformedAction> {
    names
        .iter()
        .find_map(|n| attrs.get(*n))
        .map(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MalformedAction {
            kind: kind.to_string(),
            reason: format!("missing attribute '{}'", names[0]),
        })
}

impl ActionKind {
    /// 由 action 开始标签的属性构造 kind；必需属性缺失或取值非法时返回 MalformedAction
    pub fn from_attributes(attrs: &HashMap<String, String>) -> Result<Self, MalformedAction> {
        let kind = attrs.get("type").map(|s| s.trim()).unwrap_or("");
        match kind {
            "file" => Ok(Self::File {
                file_path: required(attrs, kind, &["filePath"])?.trim().to_string(),
            }),
            "shell" => Ok(Self::Shell),
            "start" => Ok(Self::Start),
            "build" => Ok(Self::Build),
            "supabase" => {
                let raw = required(attrs, kind, &["operation"])?;
                let operation = SupabaseOperation::parse(raw).ok_or_else(|| MalformedAction {
                    kind: kind.to_string(),
                    reason: format!("unknown operation '{raw}'"),
                })?;
                Ok(Self::Supabase {
                    operation,
                    project_id: attrs.get("projectId").cloned(),
                    file_path: attrs.get("filePath").cloned(),
                })
            }
            "plan" => Ok(Self::Plan {
                plan_title: attrs
                    .get("planTitle")
                    .or_else(|| attrs.get("title"))
                    .cloned()
                    .unwrap_or_default(),
            }),
            "task-update" => {
                let task_id = required(attrs, kind, &["taskId"])?.to_string();
                let raw = required(attrs, kind, &["taskStatus", "status"])?;
                let task_status = TaskStatus::parse(raw).ok_or_else(|| MalformedAction {
                    kind: kind.to_string(),
                    reason: format!("unknown task status '{raw}'"),
                })?;
                Ok(Self::TaskUpdate {
                    task_id,
                    task_status,
                })
            }
            other => Ok(Self::Unknown {
                raw_type: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::File { .. } => "file",
            Self::Shell => "shell",
            Self::Start => "start",
            Self::Build => "build",
            Self::Supabase { .. } => "supabase",
            Self::Plan { .. } => "plan",
            Self::TaskUpdate { .. } => "task-update",
            Self::Unknown { raw_type } => raw_type,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    /// content 是否为要交给沙箱 shell 的命令串
    pub fn is_command(&self) -> bool {
        matches!(self, Self::Shell | Self::Start)
    }
}

/// 单个 Action：kind + 累积的 content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    pub content: String,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            content: String::new(),
        }
    }
}

/// Artifact 开始标签解析出的头部信息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub id: String,
    pub title: String,
    pub message_id: String,
}

/// 一个完整（或进行中）的 Artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub message_id: String,
    pub actions: Vec<Action>,
    pub closed: bool,
}

impl Artifact {
    pub fn open(header: ArtifactHeader) -> Self {
        Self {
            id: header.id,
            title: header.title,
            message_id: header.message_id,
            actions: Vec::new(),
            closed: false,
        }
    }

    pub fn header(&self) -> ArtifactHeader {
        ArtifactHeader {
            id: self.id.clone(),
            title: self.title.clone(),
            message_id: self.message_id.clone(),
        }
    }
}
