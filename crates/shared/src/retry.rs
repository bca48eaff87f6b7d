//! 退避策略
//!
//! 队列轮询遇到连接或协议错误时不退出进程，而是按指数退避等待后继续。
//! 投递本身不重试（单次尝试），这里只服务于轮询循环。

use std::time::Duration;

use crate::config::QueueConfig;

// ---------------------------------------------------------------------------
// BackoffPolicy — 退避策略配置
// ---------------------------------------------------------------------------

/// 指数退避配置
///
/// 首次失败等 initial_delay，之后每次乘以 multiplier，直到 max_delay。
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// 首次退避的等待时间
    pub initial_delay: Duration,
    /// 退避时间上限
    pub max_delay: Duration,
    /// 每次退避的倍数
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    pub fn from_queue_config(config: &QueueConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.error_backoff_initial_ms),
            max_delay: Duration::from_millis(config.error_backoff_max_ms),
            multiplier: config.error_backoff_multiplier,
        }
    }

    /// 计算第 N 次连续失败后的等待时间（attempt 从 0 开始）
    ///
    /// 公式: initial_delay * multiplier^attempt，结果不超过 max_delay。
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }
}

// ---------------------------------------------------------------------------
// Backoff — 连续失败计数器
// ---------------------------------------------------------------------------

/// 连续失败计数
///
/// 每次失败返回下一次应等待的时间；一次成功即清零。
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    /// 记录一次失败，返回本次应等待的时间
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.policy.delay_for_attempt(self.consecutive_failures);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        delay
    }

    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delay_for_attempt_exponential_backoff() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(1),
            ..BackoffPolicy::default()
        };

        // attempt 0: 1s * 2^0 = 1s
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        // attempt 1: 1s * 2^1 = 2s
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        // attempt 3: 1s * 2^3 = 8s
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        // 8s -> 受限于 max_delay -> 5s
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_resets_on_success() {
        let mut backoff = Backoff::new(BackoffPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(1000),
            multiplier: 2.0,
        });

        assert_eq!(backoff.on_failure(), Duration::from_millis(10));
        assert_eq!(backoff.on_failure(), Duration::from_millis(20));
        assert_eq!(backoff.on_failure(), Duration::from_millis(40));
        assert_eq!(backoff.consecutive_failures(), 3);

        backoff.on_success();
        assert_eq!(backoff.consecutive_failures(), 0);
        assert_eq!(backoff.on_failure(), Duration::from_millis(10));
    }

    #[test]
    fn test_from_queue_config() {
        let config = QueueConfig {
            error_backoff_initial_ms: 250,
            error_backoff_max_ms: 1000,
            error_backoff_multiplier: 3.0,
            ..QueueConfig::default()
        };
        let policy = BackoffPolicy::from_queue_config(&config);

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(750));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
    }
}
