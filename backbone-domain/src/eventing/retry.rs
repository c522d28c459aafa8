use bon::Builder;
use std::time::Duration;

/// 处理器重试策略：单次尝试超时 + 指数退避（base × 2^attempt，封顶 max_delay）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次）
    #[builder(default = 3)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_millis(100))]
    pub base_delay: Duration,
    #[builder(default = Duration::from_secs(5))]
    pub max_delay: Duration,
    #[builder(default = Duration::from_secs(30))]
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 至少一次尝试
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// 第 `attempt` 次失败（从 0 计）后的等待时长
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
