//! 标签扫描辅助：开始标签识别、属性解析、结束标签前缀回看、内容定稿
//!
//! 所有函数只看传入的切片，不持有状态；增量扫描器（streaming.rs）负责游标与缓冲。

use std::collections::HashMap;

/// 在缓冲区当前位置尝试匹配某个开始标签的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    /// 已确认是该标签（`<name` 后紧跟空白、`>` 或 `/`）
    Open,
    /// 数据不足以判断，需要等待下一个 chunk
    Partial,
    /// 不是该标签
    NoMatch,
}

/// rest 以 '<' 开头，判断是否为 `<name ...` 开始标签
pub fn match_open_tag(rest: &str, name: &str) -> TagMatch {
    let head_len = 1 + name.len();
    let bytes = rest.as_bytes();
    if bytes.len() <= head_len {
        let candidate = &bytes[1.min(bytes.len())..];
        return if name.as_bytes().starts_with(candidate) {
            TagMatch::Partial
        } else {
            TagMatch::NoMatch
        };
    }
    if &bytes[1..head_len] != name.as_bytes() {
        return TagMatch::NoMatch;
    }
    match bytes[head_len] {
        b'>' | b'/' => TagMatch::Open,
        b if b.is_ascii_whitespace() => TagMatch::Open,
        _ => TagMatch::NoMatch,
    }
}

/// 开始标签最多向前看这么多字节；超出仍没有 '>' 就当作普通文本
pub const MAX_OPEN_TAG_BYTES: usize = 1024;

/// 开始标签结尾的查找结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEnd {
    /// '>' 的字节下标
    Found(usize),
    /// 还没看到结尾，等下一个 chunk
    Incomplete,
    /// 不是标签：遇到空行或超出回看上限
    Abandoned,
}

/// 找到开始标签结尾 '>'（忽略引号内的 '>'）
///
/// 结果只取决于前 MAX_OPEN_TAG_BYTES 字节，与 chunk 切分无关。空行无论是否在引号内都终止查找。
pub fn find_tag_end(tag: &str) -> TagEnd {
    let bytes = tag.as_bytes();
    let limit = bytes.len().min(MAX_OPEN_TAG_BYTES);
    let mut quote: Option<u8> = None;
    for i in 0..limit {
        let b = bytes[i];
        if b == b'\n' && bytes.get(i + 1) == Some(&b'\n') {
            return TagEnd::Abandoned;
        }
        match (quote, b) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (None, b'>') => return TagEnd::Found(i),
            _ => {}
        }
    }
    if bytes.len() >= MAX_OPEN_TAG_BYTES {
        TagEnd::Abandoned
    } else {
        TagEnd::Incomplete
    }
}

/// 解析标签体（标签名之后、'>' 之前）中的属性；值支持双引号、单引号与裸值
pub fn parse_attributes(body: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'/'
        {
            i += 1;
        }
        if key_start == i {
            i += 1;
            continue;
        }
        let key = &body[key_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            attrs.insert(key.to_string(), String::new());
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let value = if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
            let q = bytes[i];
            let start = i + 1;
            let end = body[start..]
                .bytes()
                .position(|b| b == q)
                .map(|p| start + p)
                .unwrap_or(bytes.len());
            i = (end + 1).min(bytes.len());
            &body[start..end]
        } else {
            let start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            &body[start..i]
        };
        attrs.insert(key.to_string(), decode_entities(value));
    }
    attrs
}

/// 解码属性值中的 XML 实体
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// buf 末尾与 needle 某个真前缀相同的最长长度（这部分需要留到下一个 chunk 再判断）
pub fn partial_suffix_len(buf: &str, needle: &str) -> usize {
    let b = buf.as_bytes();
    let n = needle.as_bytes();
    let max = (n.len() - 1).min(b.len());
    (1..=max)
        .rev()
        .find(|&k| b[b.len() - k..] == n[..k])
        .unwrap_or(0)
}

/// file Action 内容定稿：非 markdown 文件去掉包裹的代码围栏，去首尾空白，保证单个结尾换行
pub fn finalize_file_content(file_path: &str, content: &str) -> String {
    let is_markdown = file_path.ends_with(".md") || file_path.ends_with(".mdx");
    let mut body = content.trim();
    if !is_markdown && body.starts_with("```") {
        body = match body.find('\n') {
            Some(nl) => &body[nl + 1..],
            None => "",
        };
        body = body.trim_end();
        if let Some(stripped) = body.strip_suffix("```") {
            body = stripped;
        }
        body = body.trim();
    }
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_open_tag() {
        assert_eq!(match_open_tag("<artifact id=\"x\">", "artifact"), TagMatch::Open);
        assert_eq!(match_open_tag("<artifact>", "artifact"), TagMatch::Open);
        assert_eq!(match_open_tag("<arti", "artifact"), TagMatch::Partial);
        assert_eq!(match_open_tag("<artifact", "artifact"), TagMatch::Partial);
        assert_eq!(match_open_tag("<", "artifact"), TagMatch::Partial);
        assert_eq!(match_open_tag("<artifacts>", "artifact"), TagMatch::NoMatch);
        assert_eq!(match_open_tag("<div>", "artifact"), TagMatch::NoMatch);
    }

    #[test]
    fn test_find_tag_end_skips_quotes() {
        let tag = r#"<action type="shell" note="a > b">"#;
        assert_eq!(find_tag_end(tag), TagEnd::Found(tag.len() - 1));
        assert_eq!(find_tag_end(r#"<action type="sh"#), TagEnd::Incomplete);
    }

    #[test]
    fn test_find_tag_end_gives_up() {
        assert_eq!(find_tag_end("<artifact tag, it's\n"), TagEnd::Incomplete);
        assert_eq!(find_tag_end("<artifact tag, it's\n\nnext > para"), TagEnd::Abandoned);
        let long = format!("<artifact {}", "x".repeat(MAX_OPEN_TAG_BYTES));
        assert_eq!(find_tag_end(&long), TagEnd::Abandoned);
        let multiline = "<artifact\n  id=\"a\"\n  title=\"t\">";
        assert_eq!(find_tag_end(multiline), TagEnd::Found(multiline.len() - 1));
    }

    #[test]
    fn test_parse_attributes() {
        let attrs = parse_attributes(r#" type="file" filePath='src/App.tsx' flag data=1 "#);
        assert_eq!(attrs["type"], "file");
        assert_eq!(attrs["filePath"], "src/App.tsx");
        assert_eq!(attrs["flag"], "");
        assert_eq!(attrs["data"], "1");

        let attrs = parse_attributes(r#" title="Tom &amp; Jerry &lt;3" /"#);
        assert_eq!(attrs["title"], "Tom & Jerry <3");
    }

    #[test]
    fn test_partial_suffix_len() {
        assert_eq!(partial_suffix_len("abc</act", "</action>"), 5);
        assert_eq!(partial_suffix_len("abc<", "</action>"), 1);
        assert_eq!(partial_suffix_len("abc", "</action>"), 0);
        assert_eq!(partial_suffix_len("", "</action>"), 0);
    }

    #[test]
    fn test_finalize_file_content() {
        let raw = "\n```tsx\nexport const a = 1;\n```\n";
        assert_eq!(finalize_file_content("src/a.tsx", raw), "export const a = 1;\n");
        let md = "```bash\nnpm i\n```";
        assert_eq!(finalize_file_content("README.md", md), "```bash\nnpm i\n```\n");
        assert_eq!(finalize_file_content("empty.txt", "  \n"), "");
    }
}
