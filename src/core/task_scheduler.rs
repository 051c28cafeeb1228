//! 工具并发池：单次交换中模型同时请求多个工具时，用信号量限制并发数。
//! 每批调用各建一个池，不跨会话共享。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct TaskScheduler {
    tool_semaphore: Arc<Semaphore>,
}

impl TaskScheduler {
    pub fn new(max_concurrent_tools: usize) -> Self {
        Self {
            tool_semaphore: Arc::new(Semaphore::new(max_concurrent_tools.max(1))),
        }
    }

    /// 获取工具执行许可；信号量已关闭时返回 None，调用方据此给出错误结果而不执行工具
    pub async fn acquire_tool(&self) -> Option<OwnedSemaphorePermit> {
        self.tool_semaphore.clone().acquire_owned().await.ok()
    }

    /// 关闭池：等待中与之后的 acquire 都返回 None
    pub fn close(&self) {
        self.tool_semaphore.close();
    }

    pub fn available_tool_slots(&self) -> usize {
        self.tool_semaphore.available_permits()
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}
