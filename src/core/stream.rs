//! 流式会话控制器
//!
//! 后台任务按序从事件流拉取 StreamEvent 并转发到有界通道；消费者按接收顺序读取。
//! 取消（显式 cancel、会话被丢弃或接收端关闭）后立即停止拉取并释放上游资源，之后不再产出任何事件。

use futures_util::{stream, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::llm::{EventStream, StreamEvent};

/// 拉取任务的结局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

pub struct StreamSession {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<StreamOutcome>>,
    finished: bool,
}

impl StreamSession {
    /// 启动拉取任务；buffer 为拉取方最多领先消费者的事件数
    pub fn spawn(source: EventStream, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(source, tx, cancel.clone()));
        Self {
            rx,
            cancel,
            task: Some(task),
            finished: false,
        }
    }

    /// 下一个事件；终止事件之后或取消之后返回 None
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.finished || self.cancel.is_cancelled() {
            return None;
        }
        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            ev = self.rx.recv() => ev,
        };
        match &event {
            Some(ev) if ev.is_terminal() => self.finished = true,
            None => self.finished = true,
            _ => {}
        }
        event
    }

    /// 客户端断开：停止拉取，不视为错误
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 丢弃未读事件并等待拉取任务结束
    pub async fn finish(mut self) -> StreamOutcome {
        if !self.cancel.is_cancelled() {
            while self.rx.recv().await.is_some() {}
        }
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "stream pump task aborted");
                StreamOutcome::Failed(e.to_string())
            }),
            None => StreamOutcome::Cancelled,
        }
    }

    /// 转为普通 Stream；Stream 被丢弃时自动取消
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        stream::unfold(self, |mut session| async move {
            session.next_event().await.map(|ev| (ev, session))
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn pump(mut source: EventStream, tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) -> StreamOutcome {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("stream cancelled by client");
                return StreamOutcome::Cancelled;
            }
            _ = tx.closed() => {
                tracing::debug!("stream receiver dropped");
                return StreamOutcome::Cancelled;
            }
            ev = source.next() => ev,
        };
        let event = next.unwrap_or_else(|| StreamEvent::Failed("stream ended without a terminal event".to_string()));
        let outcome = match &event {
            StreamEvent::Fragment(_) => None,
            StreamEvent::Completed => Some(StreamOutcome::Completed),
            StreamEvent::Failed(reason) => Some(StreamOutcome::Failed(reason.clone())),
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("stream cancelled by client");
                return StreamOutcome::Cancelled;
            }
            sent = tx.send(event) => {
                if sent.is_err() {
                    tracing::debug!("stream receiver dropped");
                    return StreamOutcome::Cancelled;
                }
            }
        }
        if let Some(outcome) = outcome {
            return outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn fragments(n: usize, pulled: Arc<AtomicUsize>, delay: Duration) -> EventStream {
        let events: Vec<StreamEvent> = (0..n)
            .map(|i| StreamEvent::Fragment(format!("f{}", i)))
            .chain(std::iter::once(StreamEvent::Completed))
            .collect();
        Box::pin(stream::iter(events).then(move |ev| {
            let pulled = pulled.clone();
            async move {
                tokio::time::sleep(delay).await;
                pulled.fetch_add(1, Ordering::SeqCst);
                ev
            }
        }))
    }

    #[tokio::test]
    async fn test_forwards_in_order_then_completes() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let mut session = StreamSession::spawn(fragments(3, pulled, Duration::ZERO), 4);
        let mut got = Vec::new();
        while let Some(ev) = session.next_event().await {
            got.push(ev);
        }
        assert_eq!(
            got,
            vec![
                StreamEvent::Fragment("f0".to_string()),
                StreamEvent::Fragment("f1".to_string()),
                StreamEvent::Fragment("f2".to_string()),
                StreamEvent::Completed,
            ]
        );
        assert_eq!(session.finish().await, StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn test_cancel_stops_pulling() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let mut session = StreamSession::spawn(fragments(5, pulled.clone(), Duration::from_millis(20)), 1);
        assert!(matches!(session.next_event().await, Some(StreamEvent::Fragment(_))));
        assert!(matches!(session.next_event().await, Some(StreamEvent::Fragment(_))));
        session.cancel();
        assert_eq!(session.next_event().await, None);
        assert_eq!(session.finish().await, StreamOutcome::Cancelled);
        let at_cancel = pulled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), at_cancel);
        assert!(at_cancel < 6);
    }

    #[tokio::test]
    async fn test_missing_terminal_becomes_failed() {
        let source: EventStream = Box::pin(stream::iter(vec![StreamEvent::Fragment("x".to_string())]));
        let session = StreamSession::spawn(source, 2);
        let events: Vec<_> = session.into_stream().collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Failed(_)));
    }

    #[tokio::test]
    async fn test_dropping_session_cancels() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let session = StreamSession::spawn(fragments(5, pulled.clone(), Duration::from_millis(20)), 1);
        let token = session.cancel_token();
        drop(session);
        assert!(token.is_cancelled());
    }
}
