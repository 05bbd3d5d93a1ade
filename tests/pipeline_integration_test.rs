//! 管线集成测试：解析 → 分发 → 版本快照 → 自动修复

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kiln::autofix::{ErrorContext, ErrorSource};
    use kiln::config::AppConfig;
    use kiln::core::{FixOutcome, WorkbenchBuilder};
    use kiln::dispatch::{ExecutionOutput, MemoryWorkspace};
    use kiln::llm::{chunk_text, ScriptedModel};
    use kiln::version::{JsonVersionStore, MemoryVersionStore, VersionStore};
    use kiln::ParserEvent;

    const THREE_ARTIFACTS: &str = r#"Let me scaffold the app.
<artifact id="setup" title="Project Setup">
<action type="file" filePath="package.json">{"name": "todo", "scripts": {"dev": "vite"}}</action>
<action type="shell">install -D vite</action>
</artifact>
Now the component.
<artifact id="component" title="Todo Component">
<action type="file" filePath="src/App.tsx">
```tsx
export default function App() { return <ul></ul>; }
```
</action>
</artifact>
<artifact id="run" title="Start Dev Server">
<action type="start">dev</action>
</artifact>
All set."#;

    fn fast_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.versions.debounce_ms = 40;
        cfg.versions.thumbnail_timeout_ms = 100;
        cfg.auto_fix.delay_between_attempts_ms = 1;
        cfg
    }

    #[tokio::test]
    async fn test_three_sibling_artifacts_make_one_version() {
        let ws = Arc::new(MemoryWorkspace::new());
        let store = Arc::new(MemoryVersionStore::new());
        let mut wb = WorkbenchBuilder::new(fast_config(), "chat-1")
            .with_workspace(ws.clone())
            .with_version_store(store.clone())
            .build()
            .await
            .unwrap();

        let mut events = Vec::new();
        for chunk in chunk_text(THREE_ARTIFACTS, 7) {
            events.extend(wb.push_chunk("m1", &chunk).await.events);
        }
        events.extend(wb.finish_message("m1").await.events);

        let closes = events
            .iter()
            .filter(|e| matches!(e, ParserEvent::ArtifactClose { .. }))
            .count();
        assert_eq!(closes, 3);

        let executed: Vec<String> = ws.executed().into_iter().map(|a| a.content).collect();
        assert_eq!(executed, vec!["npm install -D vite", "npm run dev"]);
        assert_eq!(
            ws.file("src/App.tsx").as_deref(),
            Some("export default function App() { return <ul></ul>; }\n")
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        let versions = wb.versions().list().await;
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].message_id, "m1");
        assert_eq!(versions[0].title, "Project Setup");
        assert!(versions[0].files.contains_key("src/App.tsx"));
        assert_eq!(store.load("chat-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_single_latest_across_messages() {
        let ws = Arc::new(MemoryWorkspace::new());
        let mut wb = WorkbenchBuilder::new(fast_config(), "chat-2")
            .with_workspace(ws)
            .with_version_store(Arc::new(MemoryVersionStore::new()))
            .build()
            .await
            .unwrap();
        for (i, msg) in ["m1", "m2", "m3"].iter().enumerate() {
            let reply = format!(
                r#"<artifact id="a{i}" title="Step {i}"><action type="file" filePath="f{i}.txt">{i}</action></artifact>"#
            );
            wb.process_chunk(msg, &reply).await;
            wb.finish_message(msg).await;
            tokio::time::sleep(Duration::from_millis(120)).await;
            let versions = wb.versions().list().await;
            assert_eq!(versions.len(), i + 1);
            assert_eq!(versions.iter().filter(|v| v.is_latest).count(), 1);
            assert_eq!(versions.last().unwrap().message_id, *msg);
        }
    }

    #[tokio::test]
    async fn test_versions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(MemoryWorkspace::new());
        {
            let mut wb = WorkbenchBuilder::new(fast_config(), "chat-3")
                .with_workspace(ws.clone())
                .with_version_store(Arc::new(JsonVersionStore::new(dir.path())))
                .build()
                .await
                .unwrap();
            wb.process_chunk(
                "m1",
                r#"<artifact id="a" title="A"><action type="file" filePath="a.txt">a</action></artifact>"#,
            )
            .await;
            tokio::time::sleep(Duration::from_millis(150)).await;
            assert_eq!(wb.versions().list().await.len(), 1);
        }
        let wb = WorkbenchBuilder::new(fast_config(), "chat-3")
            .with_workspace(ws)
            .with_version_store(Arc::new(JsonVersionStore::new(dir.path())))
            .build()
            .await
            .unwrap();
        assert_eq!(wb.versions().list().await.len(), 1);
        assert!(!wb.versions().schedule_snapshot("m1", Some("again")).await);
    }

    #[tokio::test]
    async fn test_runtime_error_round_trip() {
        let ws = Arc::new(MemoryWorkspace::new().with_output(
            "npm run build",
            ExecutionOutput {
                exit_code: 2,
                stdout: "vite v5".into(),
                stderr: "Could not resolve \"./Missing\"".into(),
            },
        ));
        let model = Arc::new(
            ScriptedModel::new([
                r#"I'll fix the import.
<artifact id="fix-1" title="Fix import"><action type="file" filePath="src/Missing.tsx">export const Missing = () => null;</action></artifact>"#,
            ])
            .with_chunk_chars(5),
        );
        let mut wb = WorkbenchBuilder::new(fast_config(), "chat-4")
            .with_workspace(ws.clone())
            .with_model(model.clone())
            .build()
            .await
            .unwrap();

        let report = wb
            .process_chunk(
                "m1",
                r#"<artifact id="b" title="Build"><action type="build">npm run build</action></artifact>"#,
            )
            .await;
        let error = report.errors().into_iter().next().expect("build should fail");
        assert_eq!(error.source, ErrorSource::Build);
        assert!(error.content.contains("Could not resolve"));

        let outcome = wb.handle_runtime_error(error).await;
        assert!(matches!(outcome, FixOutcome::Fixed { .. }));
        assert!(ws.file("src/Missing.tsx").is_some());
        assert!(model.prompts()[0].contains("The build reported an error (auto-fix attempt 1/3)"));
        assert_eq!(wb.history().len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_auto_fix_surfaces_error() {
        let mut cfg = fast_config();
        cfg.auto_fix.enabled = false;
        let model = Arc::new(ScriptedModel::new(["unused"]));
        let mut wb = WorkbenchBuilder::new(cfg, "chat-5")
            .with_workspace(Arc::new(MemoryWorkspace::new()))
            .with_model(model.clone())
            .build()
            .await
            .unwrap();
        let e = ErrorContext::new(ErrorSource::Preview, "runtime", "ReferenceError: x is not defined", "");
        assert_eq!(wb.handle_runtime_error(e.clone()).await, FixOutcome::Surfaced(e));
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn test_reset_cancels_pending_snapshot() {
        let ws = Arc::new(MemoryWorkspace::new());
        let mut wb = WorkbenchBuilder::new(fast_config(), "chat-6")
            .with_workspace(ws)
            .build()
            .await
            .unwrap();
        wb.process_chunk(
            "m1",
            r#"<artifact id="a" title="A"><action type="file" filePath="a.txt">a</action></artifact>"#,
        )
        .await;
        assert!(wb.versions().is_pending("m1"));
        wb.reset().await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(wb.versions().list().await.is_empty());
    }
}
