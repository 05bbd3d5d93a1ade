//! 本地目录执行沙箱
//!
//! 所有文件写入限制在 root 下（拒绝 `..` 与绝对路径逃逸）；命令经 sh -c 在 root 中执行，带超时与危险子串拦截。
//! start 类 Action 是长驻进程（dev server）：短暂等待后仍在运行则视为启动成功，进程随 LocalWorkspace 一起回收。

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::core::ExecutorError;
use crate::dispatch::{
    insert_with_parents, ActionExecutor, ExecutableAction, ExecutionOutput, FileEntry, FileMap,
    FileTreeSource, FileType,
};
use crate::parser::ActionKind;

/// 禁止的子串（模型生成的命令不允许带这些）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "curl | sh",
    "wget -O- | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

/// 快照时跳过的目录
const SKIP_DIRS: &[&str] = &["node_modules", ".git", "dist", ".cache"];

/// start 进程的启动观察期
const START_GRACE: Duration = Duration::from_millis(1500);

/// 本地目录沙箱
pub struct LocalWorkspace {
    root_dir: PathBuf,
    timeout_secs: u64,
    running: Mutex<Vec<Child>>,
}

impl LocalWorkspace {
    pub fn new(root_dir: impl AsRef<Path>, timeout_secs: u64) -> Result<Self, ExecutorError> {
        let root = root_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let root_dir = root.canonicalize().unwrap_or(root);
        Ok(Self {
            root_dir,
            timeout_secs,
            running: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析相对路径；任何 `..` 或绝对路径组件视为逃逸
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ExecutorError> {
        let rel = path.trim_start_matches("./").trim_start_matches('/');
        if rel.is_empty() {
            return Err(ExecutorError::PathEscape(path.to_string()));
        }
        for component in Path::new(rel).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(ExecutorError::PathEscape(path.to_string())),
            }
        }
        Ok(self.root_dir.join(rel))
    }

    fn check_command(command: &str) -> Result<(), ExecutorError> {
        let lower = command.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if lower.contains(forbidden) {
                return Err(ExecutorError::Forbidden(forbidden.to_string()));
            }
        }
        if lower.trim().is_empty() {
            return Err(ExecutorError::EmptyCommand);
        }
        Ok(())
    }

    fn shell(&self, command: &str) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&self.root_dir);
        cmd
    }

    async fn run(&self, command: &str) -> Result<ExecutionOutput, ExecutorError> {
        Self::check_command(command)?;
        tracing::info!(command = %command, "local workspace execute");
        let mut cmd = self.shell(command);
        cmd.kill_on_drop(true);
        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| ExecutorError::Timeout(self.timeout_secs))??;
        Ok(ExecutionOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn start(&self, command: &str) -> Result<ExecutionOutput, ExecutorError> {
        Self::check_command(command)?;
        tracing::info!(command = %command, "local workspace start");
        let mut cmd = self.shell(command);
        cmd.kill_on_drop(true)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = cmd.spawn()?;
        match tokio::time::timeout(START_GRACE, child.wait()).await {
            Ok(status) => {
                let status = status?;
                Ok(ExecutionOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: String::new(),
                    stderr: if status.success() {
                        String::new()
                    } else {
                        format!("process exited early: {status}")
                    },
                })
            }
            Err(_) => {
                self.running.lock().await.push(child);
                Ok(ExecutionOutput::ok("started"))
            }
        }
    }

    /// 终止所有 start 启动的长驻进程
    pub async fn stop_all(&self) -> usize {
        let mut running = self.running.lock().await;
        let n = running.len();
        for child in running.iter_mut() {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to stop process");
            }
        }
        running.clear();
        n
    }
}

#[async_trait]
impl ActionExecutor for LocalWorkspace {
    async fn write_file(&self, path: &str, content: &str, complete: bool) -> Result<(), ExecutorError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        if complete {
            tracing::debug!(path = %full.display(), "file finalized");
        }
        Ok(())
    }

    async fn execute(&self, action: &ExecutableAction) -> Result<ExecutionOutput, ExecutorError> {
        match &action.kind {
            ActionKind::Shell | ActionKind::Build => self.run(&action.content).await,
            ActionKind::Start => self.start(&action.content).await,
            // supabase / plan / task-update 由宿主消费，本地沙箱不执行也不算失败
            other => {
                tracing::debug!(kind = other.name(), "no local execution for action kind");
                Ok(ExecutionOutput::ok(""))
            }
        }
    }
}

#[async_trait]
impl FileTreeSource for LocalWorkspace {
    async fn snapshot_files(&self) -> Result<FileMap, ExecutorError> {
        let root = self.root_dir.clone();
        tokio::task::spawn_blocking(move || walk_tree(&root))
            .await
            .map_err(|e| ExecutorError::Failed(e.to_string()))?
    }

    /// 覆盖写入版本中的文件（不删除多余文件）
    async fn restore_files(&self, files: &FileMap) -> Result<(), ExecutorError> {
        for (path, entry) in files {
            let full = self.resolve(path)?;
            match entry.file_type {
                FileType::Folder => tokio::fs::create_dir_all(&full).await?,
                FileType::File => {
                    if let Some(parent) = full.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&full, &entry.content).await?;
                }
            }
        }
        Ok(())
    }
}

fn walk_tree(root: &Path) -> Result<FileMap, ExecutorError> {
    let mut files = FileMap::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
        });
    for entry in walker {
        let entry = entry.map_err(|e| ExecutorError::Failed(e.to_string()))?;
        let rel = match entry.path().strip_prefix(root) {
            Ok(p) => p.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if entry.file_type().is_dir() {
            insert_with_parents(&mut files, &rel, FileEntry::folder());
        } else if entry.file_type().is_file() {
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => insert_with_parents(&mut files, &rel, FileEntry::file(content)),
                Err(e) => tracing::debug!(path = %rel, error = %e, "skipping unreadable file"),
            }
        }
    }
    Ok(files)
}
