//! 存储层瞬时故障的有界重试
//!
//! 仓储边界对可重试错误做指数退避重试，重试耗尽后把错误原样抛出。
//! 核心业务逻辑自身从不重试。

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    fn delay_at(&self, attempt: u32) -> Duration {
        let exp = std::cmp::min(attempt.saturating_sub(1), 10);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

pub async fn retry_async<F, Fut, T, E>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }
                sleep(policy.delay_at(attempt)).await;
            }
        }
    }
}
