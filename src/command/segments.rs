//! 命令链切分：按 `&&` / `||` / `;` 拆成命令段与分隔符，引号内不切分

/// 命令链中的一段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Command(String),
    Separator(String),
}

/// 切分命令链；命令段已 trim，分隔符原样保留
pub fn split_segments(command: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' && q == '"' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '&' | '|' if chars.peek() == Some(&c) => {
                chars.next();
                out.push(Segment::Command(current.trim().to_string()));
                current.clear();
                out.push(Segment::Separator(format!("{c}{c}")));
            }
            ';' => {
                out.push(Segment::Command(current.trim().to_string()));
                current.clear();
                out.push(Segment::Separator(";".to_string()));
            }
            _ => current.push(c),
        }
    }
    out.push(Segment::Command(current.trim().to_string()));
    out
}

/// 重新拼接：丢弃空命令段，折叠连续分隔符（保留第一个），去掉首尾分隔符
pub fn join_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut pending_sep: Option<&str> = None;
    let mut has_command = false;

    for seg in segments {
        match seg {
            Segment::Command(cmd) if cmd.is_empty() => {}
            Segment::Command(cmd) => {
                if has_command {
                    match pending_sep.take() {
                        Some(";") => out.push_str("; "),
                        Some(sep) => {
                            out.push(' ');
                            out.push_str(sep);
                            out.push(' ');
                        }
                        None => out.push_str(" && "),
                    }
                }
                pending_sep = None;
                out.push_str(cmd);
                has_command = true;
            }
            Segment::Separator(sep) => {
                if has_command && pending_sep.is_none() {
                    pending_sep = Some(sep);
                }
            }
        }
    }
    out
}

/// 简单的空白分词
pub fn tokenize(segment: &str) -> Vec<&str> {
    segment.split_whitespace().collect()
}
