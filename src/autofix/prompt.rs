//! 修复提示词：把错误与历史尝试拼成发给模型的下一条用户消息

use crate::autofix::{AutoFixController, ErrorContext};

/// 错误内容最多带入的字符数
const MAX_ERROR_CONTENT_CHARS: usize = 4000;

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}\n... (truncated)", s.chars().take(max).collect::<String>())
    }
}

/// 构建修复提示
pub fn build_fix_prompt(controller: &AutoFixController, error: &ErrorContext) -> String {
    let mut s = format!(
        "The {} reported an error (auto-fix attempt {}/{}).\n\n",
        error.source.as_str(),
        controller.current_retries(),
        controller.settings().max_retries
    );
    s.push_str(&format!("## Error\n[{}] {}\n\n", error.error_type, error.message));
    if !error.content.trim().is_empty() {
        s.push_str("## Output\n```\n");
        s.push_str(&truncate_chars(error.content.trim(), MAX_ERROR_CONTENT_CHARS));
        s.push_str("\n```\n\n");
    }
    let history = controller.get_fix_history_context();
    if !history.is_empty() {
        s.push_str("## History\n");
        s.push_str(&history);
        s.push_str("Do not repeat approaches that already failed.\n\n");
    }
    s.push_str("Fix the root cause and respond with the corrected files and commands.");
    s
}
