//! 从聊天历史回溯重建版本
//!
//! 每条带 Artifact 的助手消息成为一个版本，其文件树是截至该消息为止所有 file Action 的累积结果。

use tokio::sync::mpsc;

use crate::dispatch::{insert_with_parents, FileEntry, FileMap};
use crate::memory::{ChatMessage, Role};
use crate::parser::{ActionKind, ParserEvent, ParserOptions, StreamingParser};
use crate::version::{push_latest, ProjectVersion};

/// 一条消息解析出的 Artifact 标题与 file 写入
struct MessageArtifacts {
    titles: Vec<String>,
    writes: Vec<(String, String)>,
}

fn collect_artifacts(options: &ParserOptions, message: &ChatMessage) -> MessageArtifacts {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut parser = StreamingParser::new(options.clone()).with_event_tx(tx);
    parser.push(&message.id, &message.content);
    parser.finish(&message.id);

    let mut out = MessageArtifacts {
        titles: Vec::new(),
        writes: Vec::new(),
    };
    while let Ok(event) = rx.try_recv() {
        if let ParserEvent::ArtifactClose { artifact } = event {
            out.titles.push(artifact.title.clone());
            for action in artifact.actions {
                if let ActionKind::File { file_path } = action.kind {
                    out.writes.push((file_path, action.content));
                }
            }
        }
    }
    out
}

/// 按消息顺序重建版本；只有最后一个为 latest
pub fn derive_versions_from_history(
    messages: &[ChatMessage],
    options: &ParserOptions,
) -> Vec<ProjectVersion> {
    let mut files = FileMap::new();
    let mut versions = Vec::new();
    for message in messages.iter().filter(|m| m.role == Role::Assistant) {
        let parsed = collect_artifacts(options, message);
        if parsed.titles.is_empty() {
            continue;
        }
        for (path, content) in parsed.writes {
            insert_with_parents(&mut files, &path, FileEntry::file(content));
        }
        let title = parsed.titles[0].clone();
        let description = describe(&parsed.titles);
        push_latest(
            &mut versions,
            ProjectVersion::new(message.id.clone(), title, description, files.clone()),
        );
    }
    tracing::info!(messages = messages.len(), versions = versions.len(), "versions derived from history");
    versions
}

/// 版本描述：一个 Artifact 时为其标题，多个时列出全部
pub fn describe(titles: &[String]) -> String {
    match titles {
        [] => String::new(),
        [one] => one.clone(),
        many => format!("{} artifacts: {}", many.len(), many.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_files_and_single_latest() {
        let messages = vec![
            ChatMessage::user("make a page").with_id("u1"),
            ChatMessage::assistant(
                r#"<artifact id="p" title="Page"><action type="file" filePath="index.html"><h1>v1</h1></action></artifact>"#,
            )
            .with_id("a1"),
            ChatMessage::assistant("No changes needed.").with_id("a2"),
            ChatMessage::assistant(
                r#"<artifact id="s" title="Styles"><action type="file" filePath="css/site.css">body{}</action><action type="shell">npm run build</action></artifact>"#,
            )
            .with_id("a3"),
        ];
        let versions = derive_versions_from_history(&messages, &ParserOptions::default());
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].message_id, "a1");
        assert!(!versions[0].is_latest);
        assert!(versions[1].is_latest);
        assert_eq!(versions[1].title, "Styles");
        assert_eq!(versions[1].files["index.html"].content, "<h1>v1</h1>\n");
        assert!(versions[1].files.contains_key("css"));
        assert!(!versions[0].files.contains_key("css/site.css"));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&["A".into()]), "A");
        assert_eq!(describe(&["A".into(), "B".into()]), "2 artifacts: A, B");
    }
}
