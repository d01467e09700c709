// ==========================================
// 孵化场批量导入 - 进度事件流
// ==========================================
// 职责: 导入器 → 调用方 的进度通道（tokio 无界 mpsc）
// 说明: 发送端同步调用, 不阻塞导入; 接收端实现 futures::Stream
// ==========================================

use crate::domain::import::ProgressEvent;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

/// 进度发送端（随 ImportConfig 传入导入器）
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// 发送进度事件（接收端已关闭时静默丢弃）
    pub fn send(&self, event: ProgressEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!(event = ?e.0, "进度接收端已关闭");
        }
    }
}

/// 进度事件流
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressStream {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// 取出当前已缓冲的全部事件（不等待）
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// 创建进度通道
pub fn progress_channel() -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressStream { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_events_arrive_in_order_and_stream_ends() {
        let (tx, mut stream) = progress_channel();
        tx.send(ProgressEvent::SheetStarted {
            sheet_name: "A".to_string(),
            total: 2,
        });
        tx.send(ProgressEvent::RowProcessed {
            sheet_name: "A".to_string(),
            current: 1,
            total: 2,
        });
        drop(tx);

        let events: Vec<ProgressEvent> = stream.by_ref().collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ProgressEvent::SheetStarted { total: 2, .. }));
        assert!(stream.drain().is_empty());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (tx, stream) = progress_channel();
        drop(stream);
        tx.send(ProgressEvent::SheetFinished {
            sheet_name: "A".to_string(),
            outcome: crate::domain::SheetOutcome::Completed,
        });
    }
}
