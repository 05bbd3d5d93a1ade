//! 增量 Artifact/Action 解析器
//!
//! 按消息维护状态机：Outside → ArtifactOpenPending → InsideArtifact → ActionOpenPending → InsideAction
//! → (循环) → ArtifactClosePending → Outside。每次调用只扫描新到达的文本加上有界的未决后缀，
//! 不完整的标签留在缓冲区等下一个 chunk；因此总开销与输入长度线性相关。
//!
//! 事件通过可选的 mpsc 通道推送，调用方在 parse 返回后用 try_recv 取走（事件在返回前已全部发送）。

use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc::UnboundedSender;

use crate::parser::tags::{
    finalize_file_content, find_tag_end, match_open_tag, parse_attributes, partial_suffix_len,
    TagEnd,
    TagMatch,
};
use crate::parser::{Action, ActionKind, Artifact, ArtifactHeader, ParserEvent};

/// 记住最近结束的消息数；更早的 id 被淘汰
const FINISHED_WINDOW: usize = 64;

/// 标签名配置
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub artifact_tag: String,
    pub action_tag: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            artifact_tag: "artifact".to_string(),
            action_tag: "action".to_string(),
        }
    }
}

/// 单条消息的扫描状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    OutsideArtifact,
    ArtifactOpenPending,
    InsideArtifact,
    ActionOpenPending,
    InsideAction,
    ArtifactClosePending,
}

/// 标签名派生出的固定串
#[derive(Debug, Clone)]
struct Tags {
    artifact: String,
    action: String,
    artifact_close: String,
    action_close: String,
}

impl From<&ParserOptions> for Tags {
    fn from(opts: &ParserOptions) -> Self {
        Self {
            artifact: opts.artifact_tag.clone(),
            action: opts.action_tag.clone(),
            artifact_close: format!("</{}>", opts.artifact_tag),
            action_close: format!("</{}>", opts.action_tag),
        }
    }
}

#[derive(Debug)]
struct OpenAction {
    id: usize,
    action: Action,
    /// 缺少必需属性：吞掉内容直到结束标签，不发任何事件
    suppressed: bool,
}

#[derive(Debug)]
struct MessageState {
    message_id: String,
    scan: ScanState,
    /// 未消费的文本（只包含未决的标签前缀或尚未扫描的新文本）
    buffer: String,
    /// 已接收的总字节数（用于 cumulative 输入取增量）
    received: usize,
    artifact: Option<Artifact>,
    action: Option<OpenAction>,
    artifact_count: usize,
    action_count: usize,
}

impl MessageState {
    fn new(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            scan: ScanState::OutsideArtifact,
            buffer: String::new(),
            received: 0,
            artifact: None,
            action: None,
            artifact_count: 0,
            action_count: 0,
        }
    }

    /// 扫描缓冲区直到无法再推进；返回新产生的纯文本
    fn advance(&mut self, tags: &Tags, events: &mut Vec<ParserEvent>) -> String {
        let buffer = std::mem::take(&mut self.buffer);
        let mut text = String::new();
        let mut pos = 0;

        while pos < buffer.len() {
            let rest = &buffer[pos..];
            let progressed = match self.scan {
                ScanState::OutsideArtifact => self.scan_outside(rest, tags, &mut text),
                ScanState::ArtifactOpenPending => {
                    self.scan_artifact_open(rest, tags, events, &mut text)
                }
                ScanState::InsideArtifact | ScanState::ArtifactClosePending => {
                    self.scan_inside_artifact(rest, tags, events)
                }
                ScanState::ActionOpenPending => self.scan_action_open(rest, tags, events),
                ScanState::InsideAction => self.scan_inside_action(rest, tags, events),
            };
            match progressed {
                Step::Consumed(n) => pos += n,
                Step::Transition => {}
                Step::Wait => break,
            }
        }

        self.buffer = buffer[pos..].to_string();
        text
    }

    fn scan_outside(&mut self, rest: &str, tags: &Tags, text: &mut String) -> Step {
        let Some(lt) = rest.find('<') else {
            text.push_str(rest);
            return Step::Consumed(rest.len());
        };
        if lt > 0 {
            text.push_str(&rest[..lt]);
            return Step::Consumed(lt);
        }
        match match_open_tag(rest, &tags.artifact) {
            TagMatch::Open => {
                self.scan = ScanState::ArtifactOpenPending;
                Step::Transition
            }
            TagMatch::Partial => Step::Wait,
            TagMatch::NoMatch => {
                text.push('<');
                Step::Consumed(1)
            }
        }
    }

    fn scan_artifact_open(
        &mut self,
        rest: &str,
        tags: &Tags,
        events: &mut Vec<ParserEvent>,
        text: &mut String,
    ) -> Step {
        let end = match find_tag_end(rest) {
            TagEnd::Found(end) => end,
            TagEnd::Incomplete => return Step::Wait,
            TagEnd::Abandoned => {
                tracing::debug!(message_id = %self.message_id, "unterminated artifact tag, emitting as text");
                self.scan = ScanState::OutsideArtifact;
                text.push('<');
                return Step::Consumed(1);
            }
        };
        let attrs = parse_attributes(&rest[1 + tags.artifact.len()..end]);
        self.artifact_count += 1;
        let id = match attrs.get("id").filter(|s| !s.trim().is_empty()) {
            Some(id) => id.clone(),
            None => {
                let id = format!("{}-artifact-{}", self.message_id, self.artifact_count);
                tracing::warn!(message_id = %self.message_id, artifact_id = %id, "artifact tag without id, synthesized one");
                id
            }
        };
        let header = ArtifactHeader {
            id,
            title: attrs.get("title").cloned().unwrap_or_default(),
            message_id: self.message_id.clone(),
        };
        tracing::info!(message_id = %header.message_id, artifact_id = %header.id, title = %header.title, "artifact open");
        self.artifact = Some(Artifact::open(header.clone()));
        events.push(ParserEvent::ArtifactOpen { artifact: header });
        self.scan = ScanState::InsideArtifact;
        Step::Consumed(end + 1)
    }

    fn scan_inside_artifact(
        &mut self,
        rest: &str,
        tags: &Tags,
        events: &mut Vec<ParserEvent>,
    ) -> Step {
        // artifact 内、action 外的文字不输出
        let Some(lt) = rest.find('<') else {
            self.scan = ScanState::InsideArtifact;
            return Step::Consumed(rest.len());
        };
        if lt > 0 {
            self.scan = ScanState::InsideArtifact;
            return Step::Consumed(lt);
        }
        if rest.starts_with(&tags.artifact_close) {
            self.close_artifact(events);
            return Step::Consumed(tags.artifact_close.len());
        }
        if tags.artifact_close.starts_with(rest) {
            self.scan = ScanState::ArtifactClosePending;
            return Step::Wait;
        }
        match match_open_tag(rest, &tags.action) {
            TagMatch::Open => {
                self.scan = ScanState::ActionOpenPending;
                Step::Transition
            }
            TagMatch::Partial => Step::Wait,
            TagMatch::NoMatch => {
                self.scan = ScanState::InsideArtifact;
                Step::Consumed(1)
            }
        }
    }

    fn scan_action_open(&mut self, rest: &str, tags: &Tags, events: &mut Vec<ParserEvent>) -> Step {
        let end = match find_tag_end(rest) {
            TagEnd::Found(end) => end,
            TagEnd::Incomplete => return Step::Wait,
            TagEnd::Abandoned => {
                tracing::debug!(message_id = %self.message_id, "unterminated action tag, skipping");
                self.scan = ScanState::InsideArtifact;
                return Step::Consumed(1);
            }
        };
        let body = &rest[1 + tags.action.len()..end];
        let self_closing = body.trim_end().ends_with('/');
        let attrs = parse_attributes(body);
        self.action_count += 1;
        let id = self.action_count;

        let open = match ActionKind::from_attributes(&attrs) {
            Ok(kind) => {
                if let ActionKind::Unknown { raw_type } = &kind {
                    tracing::warn!(message_id = %self.message_id, kind = %raw_type, "unrecognized action type, treating as opaque content");
                }
                let action = Action::new(kind);
                events.push(ParserEvent::ActionOpen {
                    message_id: self.message_id.clone(),
                    artifact_id: self.artifact_id(),
                    action_id: id,
                    action: action.clone(),
                });
                OpenAction {
                    id,
                    action,
                    suppressed: false,
                }
            }
            Err(malformed) => {
                tracing::warn!(message_id = %self.message_id, error = %malformed, "suppressing action");
                OpenAction {
                    id,
                    action: Action::new(ActionKind::Unknown {
                        raw_type: malformed.kind,
                    }),
                    suppressed: true,
                }
            }
        };
        self.action = Some(open);
        if self_closing {
            self.close_action(events);
            self.scan = ScanState::InsideArtifact;
        } else {
            self.scan = ScanState::InsideAction;
        }
        Step::Consumed(end + 1)
    }

    fn scan_inside_action(
        &mut self,
        rest: &str,
        tags: &Tags,
        events: &mut Vec<ParserEvent>,
    ) -> Step {
        let action_end = rest.find(&tags.action_close);
        let artifact_end = rest.find(&tags.artifact_close);
        let closing = match (action_end, artifact_end) {
            (Some(a), Some(b)) if b < a => Some((b, true)),
            (Some(a), _) => Some((a, false)),
            (None, Some(b)) => Some((b, true)),
            (None, None) => None,
        };

        if let Some((at, closes_artifact)) = closing {
            self.append_content(&rest[..at]);
            self.close_action(events);
            if closes_artifact {
                tracing::warn!(message_id = %self.message_id, "action closed implicitly by artifact end");
                self.close_artifact(events);
                return Step::Consumed(at + tags.artifact_close.len());
            }
            self.scan = ScanState::InsideArtifact;
            return Step::Consumed(at + tags.action_close.len());
        }

        let hold = partial_suffix_len(rest, &tags.action_close)
            .max(partial_suffix_len(rest, &tags.artifact_close));
        let safe = rest.len() - hold;
        if safe > 0 {
            self.append_content(&rest[..safe]);
            self.emit_stream(events);
        }
        if safe == 0 {
            Step::Wait
        } else {
            Step::Consumed(safe)
        }
    }

    fn artifact_id(&self) -> String {
        self.artifact
            .as_ref()
            .map(|a| a.id.clone())
            .unwrap_or_default()
    }

    fn append_content(&mut self, chunk: &str) {
        if let Some(open) = self.action.as_mut() {
            if !open.suppressed {
                open.action.content.push_str(chunk);
            }
        }
    }

    fn emit_stream(&self, events: &mut Vec<ParserEvent>) {
        let Some(open) = self.action.as_ref() else {
            return;
        };
        if open.suppressed || !open.action.kind.is_file() {
            return;
        }
        events.push(ParserEvent::ActionStream {
            message_id: self.message_id.clone(),
            artifact_id: self.artifact_id(),
            action_id: open.id,
            action: open.action.clone(),
        });
    }

    fn close_action(&mut self, events: &mut Vec<ParserEvent>) {
        let Some(mut open) = self.action.take() else {
            return;
        };
        if open.suppressed {
            return;
        }
        open.action.content = match &open.action.kind {
            ActionKind::File { file_path } => finalize_file_content(file_path, &open.action.content),
            _ => open.action.content.trim().to_string(),
        };
        tracing::debug!(message_id = %self.message_id, action_id = open.id, kind = %open.action.kind.name(), "action close");
        events.push(ParserEvent::ActionClose {
            message_id: self.message_id.clone(),
            artifact_id: self.artifact_id(),
            action_id: open.id,
            action: open.action.clone(),
        });
        if let Some(artifact) = self.artifact.as_mut() {
            artifact.actions.push(open.action);
        }
    }

    fn close_artifact(&mut self, events: &mut Vec<ParserEvent>) {
        self.close_action(events);
        self.scan = ScanState::OutsideArtifact;
        let Some(mut artifact) = self.artifact.take() else {
            return;
        };
        artifact.closed = true;
        tracing::info!(message_id = %self.message_id, artifact_id = %artifact.id, actions = artifact.actions.len(), "artifact close");
        events.push(ParserEvent::ArtifactClose { artifact });
    }
}

/// 扫描一步的结果
enum Step {
    /// 消费了 n 字节
    Consumed(usize),
    /// 状态变化但未消费（下一轮由新状态处理同一位置）
    Transition,
    /// 数据不足，等待下一个 chunk
    Wait,
}

/// 流式消息解析器：按 message_id 隔离状态，可对同一消息反复调用
pub struct StreamingParser {
    tags: Tags,
    messages: HashMap<String, MessageState>,
    /// 最近结束的消息（有界）
    finished: VecDeque<String>,
    event_tx: Option<UnboundedSender<ParserEvent>>,
}

impl StreamingParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            tags: Tags::from(&options),
            messages: HashMap::new(),
            finished: VecDeque::new(),
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: UnboundedSender<ParserEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 传入该消息截至目前的完整文本（只处理超出已接收部分的后缀）；返回新产生的纯文本
    pub fn parse(&mut self, message_id: &str, cumulative: &str) -> String {
        let received = self
            .messages
            .get(message_id)
            .map(|s| s.received)
            .unwrap_or(0);
        match cumulative.get(received..) {
            Some(delta) => self.push(message_id, delta),
            None => {
                tracing::warn!(message_id = %message_id, received, len = cumulative.len(), "input does not extend received text, ignoring");
                String::new()
            }
        }
    }

    /// 传入该消息的新增文本；返回新产生的纯文本
    pub fn push(&mut self, message_id: &str, delta: &str) -> String {
        if self.finished.iter().any(|id| id == message_id) {
            tracing::warn!(message_id = %message_id, "message already finished, ignoring input");
            return String::new();
        }
        if delta.is_empty() {
            return String::new();
        }
        let state = self
            .messages
            .entry(message_id.to_string())
            .or_insert_with(|| MessageState::new(message_id));
        state.received += delta.len();
        state.buffer.push_str(delta);

        let mut events = Vec::new();
        let text = state.advance(&self.tags, &mut events);
        tracing::debug!(message_id = %message_id, delta = delta.len(), events = events.len(), pending = state.buffer.len(), "parse chunk");
        self.publish(events);
        text
    }

    /// 消息流结束：输出仍缓冲但已确定不是标签的文本，丢弃该消息的状态
    pub fn finish(&mut self, message_id: &str) -> String {
        self.mark_finished(message_id);
        let Some(state) = self.messages.remove(message_id) else {
            return String::new();
        };
        match state.scan {
            ScanState::OutsideArtifact | ScanState::ArtifactOpenPending => state.buffer,
            _ => {
                tracing::warn!(
                    message_id = %message_id,
                    artifact_id = %state.artifact_id(),
                    "message ended inside an artifact, pending actions were not closed"
                );
                String::new()
            }
        }
    }

    fn mark_finished(&mut self, message_id: &str) {
        if self.finished.iter().any(|id| id == message_id) {
            return;
        }
        if self.finished.len() == FINISHED_WINDOW {
            self.finished.pop_front();
        }
        self.finished.push_back(message_id.to_string());
    }

    /// 丢弃全部消息状态（开始新的会话或调试重放）
    pub fn reset(&mut self) {
        self.messages.clear();
        self.finished.clear();
    }

    /// 某条消息当前的扫描状态（未见过则为 None）
    pub fn state(&self, message_id: &str) -> Option<ScanState> {
        self.messages.get(message_id).map(|s| s.scan)
    }

    fn publish(&self, events: Vec<ParserEvent>) {
        if let Some(tx) = &self.event_tx {
            for ev in events {
                let _ = tx.send(ev);
            }
        }
    }
}

impl Default for StreamingParser {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}
