//! 版本缩略图
//!
//! 实时截图由外部预览提供（ThumbnailCapture）；失败或超时（默认 5s）时改用确定性的合成 SVG：
//! 背景色由 message id 的哈希决定，同一消息总是得到同一张图。

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

use crate::dispatch::FileMap;

/// 实时缩略图来源（返回 data URL）
#[async_trait]
pub trait ThumbnailCapture: Send + Sync {
    async fn capture(&self, files: &FileMap) -> Result<String, String>;
}

/// FNV-1a，跨平台/跨版本稳定
fn stable_hash(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.as_bytes() {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 合成缩略图：仅取决于 message id 与标题
pub fn fallback_thumbnail(message_id: &str, title: &str) -> String {
    let hash = stable_hash(message_id);
    let hue = hash % 360;
    let accent = (hue + 180) % 360;
    let label: String = title.chars().take(32).collect();
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="320" height="180" viewBox="0 0 320 180">"#,
            r#"<rect width="320" height="180" fill="hsl({hue},55%,42%)"/>"#,
            r#"<rect x="16" y="16" width="288" height="20" rx="4" fill="hsl({accent},60%,85%)" opacity="0.8"/>"#,
            r#"<text x="160" y="110" font-family="sans-serif" font-size="16" fill="white" text-anchor="middle">{label}</text>"#,
            r#"</svg>"#
        ),
        hue = hue,
        accent = accent,
        label = escape_xml(&label),
    );
    format!("data:image/svg+xml;base64,{}", BASE64_STANDARD.encode(svg))
}

/// 带超时的截图；任何失败都退回合成图，从不报错
pub async fn capture_or_fallback(
    capture: Option<&dyn ThumbnailCapture>,
    files: &FileMap,
    message_id: &str,
    title: &str,
    timeout: Duration,
) -> String {
    let Some(capture) = capture else {
        return fallback_thumbnail(message_id, title);
    };
    match tokio::time::timeout(timeout, capture.capture(files)).await {
        Ok(Ok(url)) => url,
        Ok(Err(e)) => {
            tracing::warn!(message_id = %message_id, error = %e, "thumbnail capture failed, using fallback");
            fallback_thumbnail(message_id, title)
        }
        Err(_) => {
            tracing::warn!(message_id = %message_id, timeout_ms = timeout.as_millis() as u64, "thumbnail capture timed out, using fallback");
            fallback_thumbnail(message_id, title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[async_trait]
    impl ThumbnailCapture for Slow {
        async fn capture(&self, _files: &FileMap) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("data:image/png;base64,AAAA".into())
        }
    }

    struct Broken;

    #[async_trait]
    impl ThumbnailCapture for Broken {
        async fn capture(&self, _files: &FileMap) -> Result<String, String> {
            Err("preview not mounted".into())
        }
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let a = fallback_thumbnail("msg-1", "Todo <app>");
        assert_eq!(a, fallback_thumbnail("msg-1", "Todo <app>"));
        assert_ne!(a, fallback_thumbnail("msg-2", "Todo <app>"));
        assert!(a.starts_with("data:image/svg+xml;base64,"));
        let svg = BASE64_STANDARD
            .decode(a.trim_start_matches("data:image/svg+xml;base64,"))
            .unwrap();
        let svg = String::from_utf8(svg).unwrap();
        assert!(svg.contains("Todo &lt;app&gt;"));
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let url = capture_or_fallback(
            Some(&Slow),
            &FileMap::new(),
            "m",
            "t",
            Duration::from_millis(20),
        )
        .await;
        assert_eq!(url, fallback_thumbnail("m", "t"));
    }

    #[tokio::test]
    async fn test_error_falls_back() {
        let url = capture_or_fallback(Some(&Broken), &FileMap::new(), "m", "t", Duration::from_secs(1)).await;
        assert_eq!(url, fallback_thumbnail("m", "t"));
    }
}
