//! 重试策略：有上限的指数退避 + 抖动

use crate::config::Config;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 每个步骤因网络错误最多尝试的次数（含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// 不等待的策略（测试用）
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// 第 `failures` 次失败后的等待上限：base * 2^(failures-1)，不超过 max
    pub fn ceiling_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// 实际等待时间：在 [上限/2, 上限] 之间随机
    pub fn delay_for(&self, failures: u32) -> Duration {
        let ceiling = self.ceiling_for(failures);
        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(ceiling_ms / 2..=ceiling_ms);
        Duration::from_millis(jittered)
    }

    /// 是否还有网络重试预算
    pub fn allows_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}
