//! 命令改写：沙箱只有 Node，调用 Python / Ruby / PHP / Perl 的命令改写为 Node 等价命令或诊断 no-op
//!
//! 规则按顺序尝试、首个命中即生效；对命令链逐段处理（`cd site && python -m http.server` 只改第二段）。

use regex::Regex;
use serde::Serialize;

use crate::command::segments::{join_segments, split_segments, Segment};

/// 未指定端口时的默认端口
pub const DEFAULT_SERVE_PORT: u16 = 8000;

/// 按脚本名判断为「静态服务器」的 Python 脚本
const SERVER_SCRIPT_NAMES: &[&str] = &[
    "serve.py",
    "server.py",
    "http_server.py",
    "httpserver.py",
    "web.py",
    "webserver.py",
];

/// 改写结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRewriteResult {
    pub command: String,
    pub was_rewritten: bool,
    pub original_command: Option<String>,
    pub reason: Option<String>,
}

impl CommandRewriteResult {
    fn unchanged(command: &str) -> Self {
        Self {
            command: command.to_string(),
            was_rewritten: false,
            original_command: None,
            reason: None,
        }
    }
}

/// 单段改写结果
struct Rewrite {
    command: String,
    reason: String,
}

fn serve(port: u16) -> String {
    format!("npx --yes serve -l {port}")
}

/// 在 sh 双引号内安全展示原命令
fn quote_for_echo(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`")
}

fn runtime_display_name(runtime: &str) -> &'static str {
    match runtime {
        "python" | "python3" => "Python",
        "ruby" => "Ruby",
        "perl" => "Perl",
        "php" => "PHP",
        _ => "This runtime",
    }
}

fn first_numeric(args: &str) -> Option<u16> {
    args.split_whitespace().find_map(|t| t.parse::<u16>().ok())
}

/// 从脚本参数中提取端口：`--port N` / `--port=N` / `-p N` / 裸数字
fn extract_port(args: &str) -> Option<u16> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    for (i, t) in tokens.iter().enumerate() {
        if let Some(v) = t.strip_prefix("--port=") {
            if let Ok(p) = v.parse() {
                return Some(p);
            }
        }
        if (*t == "--port" || *t == "-p") && i + 1 < tokens.len() {
            if let Ok(p) = tokens[i + 1].parse() {
                return Some(p);
            }
        }
    }
    first_numeric(args)
}

/// 命令改写器：预编译规则正则
pub struct CommandRewriter {
    http_server: Regex,
    simple_http_server: Regex,
    php_server: Regex,
    ruby_httpd: Regex,
    python_script: Regex,
}

impl CommandRewriter {
    pub fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("static rewrite pattern");
        Self {
            http_server: re(r"^python3?\s+-m\s+http\.server(?:\s+(.*))?$"),
            simple_http_server: re(r"^python3?\s+-m\s+SimpleHTTPServer(?:\s+(.*))?$"),
            php_server: re(r"^php\s+-S\s+(?:localhost|0\.0\.0\.0|127\.0\.0\.1):(\d+)"),
            ruby_httpd: re(r"^ruby\s+-run\s+-e\s+httpd\s+\S+\s+-p\s*(\d+)"),
            python_script: re(r"^python3?\s+(\S+\.py)(?:\s+(.*))?$"),
        }
    }

    /// 改写整条命令（逐段）；没有任何段命中时原样返回
    pub fn rewrite(&self, command: &str) -> CommandRewriteResult {
        let mut segments = split_segments(command);
        let mut reasons = Vec::new();

        for seg in segments.iter_mut() {
            if let Segment::Command(cmd) = seg {
                if let Some(rw) = self.rewrite_segment(cmd) {
                    tracing::warn!(original = %cmd, rewritten = %rw.command, reason = %rw.reason, "command rewritten");
                    *cmd = rw.command;
                    reasons.push(rw.reason);
                }
            }
        }

        if reasons.is_empty() {
            return CommandRewriteResult::unchanged(command);
        }
        CommandRewriteResult {
            command: join_segments(&segments),
            was_rewritten: true,
            original_command: Some(command.to_string()),
            reason: Some(reasons.join("; ")),
        }
    }

    fn rewrite_segment(&self, segment: &str) -> Option<Rewrite> {
        if let Some(caps) = self.http_server.captures(segment) {
            let port = caps
                .get(1)
                .and_then(|m| first_numeric(m.as_str()))
                .unwrap_or(DEFAULT_SERVE_PORT);
            return Some(Rewrite {
                command: serve(port),
                reason: "python http.server replaced with serve".to_string(),
            });
        }
        if let Some(caps) = self.simple_http_server.captures(segment) {
            let port = caps
                .get(1)
                .and_then(|m| first_numeric(m.as_str()))
                .unwrap_or(DEFAULT_SERVE_PORT);
            return Some(Rewrite {
                command: serve(port),
                reason: "python SimpleHTTPServer replaced with serve".to_string(),
            });
        }
        if let Some(caps) = self.php_server.captures(segment) {
            let port = caps[1].parse().unwrap_or(DEFAULT_SERVE_PORT);
            return Some(Rewrite {
                command: serve(port),
                reason: "php built-in server replaced with serve".to_string(),
            });
        }
        if let Some(caps) = self.ruby_httpd.captures(segment) {
            let port = caps[1].parse().unwrap_or(DEFAULT_SERVE_PORT);
            return Some(Rewrite {
                command: serve(port),
                reason: "ruby httpd replaced with serve".to_string(),
            });
        }
        if let Some(caps) = self.python_script.captures(segment) {
            let script = &caps[1];
            let base = script.rsplit('/').next().unwrap_or(script);
            if SERVER_SCRIPT_NAMES.contains(&base) {
                let port = caps
                    .get(2)
                    .and_then(|m| extract_port(m.as_str()))
                    .unwrap_or(DEFAULT_SERVE_PORT);
                return Some(Rewrite {
                    command: serve(port),
                    reason: format!("python server script '{base}' replaced with serve"),
                });
            }
            return Some(Rewrite {
                command: format!(
                    "echo \"Error: Python is not available in this environment (only Node.js is supported), cannot run: {}\"",
                    quote_for_echo(segment)
                ),
                reason: format!("python script '{base}' cannot run in the sandbox"),
            });
        }

        let first = segment.split_whitespace().next()?;
        if matches!(first, "python" | "python3" | "ruby" | "perl" | "php") {
            let runtime = runtime_display_name(first);
            return Some(Rewrite {
                command: format!(
                    "echo \"Error: {runtime} is not available in this environment (only Node.js is supported), cannot run: {}\"",
                    quote_for_echo(segment)
                ),
                reason: format!("{runtime} runtime is not available"),
            });
        }
        None
    }
}

impl Default for CommandRewriter {
    fn default() -> Self {
        Self::new()
    }
}

/// 使用默认规则改写命令
pub fn rewrite(command: &str) -> CommandRewriteResult {
    CommandRewriter::new().rewrite(command)
}
