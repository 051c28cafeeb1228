//! 单次对话交换的状态机
//!
//! Validating -> (Rejected) | Retrieving -> Assembling -> Invoking -> [ToolLoop -> Invoking]* -> Responding -> Recording -> Done
//! 任一非终止状态都可以进入 Failed。终止状态：Done、Rejected、Failed。

use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ExchangePhase {
    Validating,
    Retrieving,
    Assembling,
    Invoking,
    ToolLoop,
    Responding,
    Recording,
    Done,
    Rejected,
    Failed,
}

impl ExchangePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Rejected | Self::Failed)
    }

    pub fn can_transition_to(self, next: ExchangePhase) -> bool {
        use ExchangePhase::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Validating, Retrieving)
                | (Validating, Rejected)
                | (Retrieving, Assembling)
                | (Assembling, Invoking)
                | (Invoking, ToolLoop)
                | (Invoking, Responding)
                | (ToolLoop, Invoking)
                | (Responding, Recording)
                | (Recording, Done)
        )
    }
}

/// 一次交换的运行记录；未到达终止状态就被丢弃时视为客户端取消
#[derive(Debug)]
pub struct Exchange {
    id: Uuid,
    session_id: String,
    phase: ExchangePhase,
    started: Instant,
    trail: Vec<ExchangePhase>,
}

impl Exchange {
    pub fn new(session_id: &str) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(exchange = %id, session = %session_id, "exchange started");
        Self {
            id,
            session_id: session_id.to_string(),
            phase: ExchangePhase::Validating,
            started: Instant::now(),
            trail: vec![ExchangePhase::Validating],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// 经过的全部状态（含初始状态）
    pub fn trail(&self) -> &[ExchangePhase] {
        &self.trail
    }

    /// 状态迁移；非法迁移只记录告警并忽略
    pub fn advance(&mut self, next: ExchangePhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(
                exchange = %self.id,
                from = ?self.phase,
                to = ?next,
                "invalid exchange transition ignored"
            );
            return;
        }
        tracing::debug!(exchange = %self.id, from = ?self.phase, to = ?next, "exchange transition");
        self.phase = next;
        self.trail.push(next);
        if next.is_terminal() {
            tracing::info!(
                exchange = %self.id,
                session = %self.session_id,
                outcome = ?next,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "exchange finished"
            );
        }
    }

    pub fn fail(&mut self, reason: &str) {
        tracing::error!(exchange = %self.id, session = %self.session_id, phase = ?self.phase, error = %reason, "exchange failed");
        self.advance(ExchangePhase::Failed);
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if !self.phase.is_terminal() {
            tracing::debug!(exchange = %self.id, phase = ?self.phase, "exchange cancelled");
        }
    }
}
