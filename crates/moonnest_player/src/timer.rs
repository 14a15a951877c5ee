//! 定时订阅
//!
//! 睡眠定时器的一次性停止、每秒倒计时、每秒一致性检查和中断恢复延迟
//! 都是可取消的后台订阅，回调以 [`TimerMsg`] 的形式送回控制线程。

use std::thread;
use std::time::Duration;

use crossbeam_channel::{after, bounded, select, tick, Receiver, Sender, TryRecvError};

/// 定时回调消息
///
/// 代号用于丢弃与取消竞争的过期回调。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMsg {
    /// 睡眠定时器到期
    StopDue(u64),
    /// 倒计时减一秒
    CountdownTick(u64),
    /// 设备状态一致性检查
    HealthCheck(u64),
    /// 中断结束后的延迟恢复
    Resume(u64),
}

/// 时间参数（调优值，不是硬性约定）
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    pub countdown_period: Duration,
    pub health_check_period: Duration,
    pub resume_grace: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            countdown_period: Duration::from_secs(1),
            health_check_period: Duration::from_secs(1),
            resume_grace: Duration::from_secs(1),
        }
    }
}

/// 订阅句柄，drop 即取消
#[derive(Debug)]
pub struct Subscription {
    _cancel: Sender<()>,
}

impl Subscription {
    /// 返回订阅及其取消信号接收端
    pub fn pair() -> (Self, Receiver<()>) {
        let (cancel_tx, cancel_rx) = bounded(0);
        (Self { _cancel: cancel_tx }, cancel_rx)
    }

    pub fn cancel(self) {}
}

/// 定时订阅来源
pub trait TimerSource {
    /// `after` 之后触发一次
    fn once(&self, after: Duration, msg: TimerMsg) -> Subscription;

    /// 每隔 `period` 触发一次，直到取消
    fn every(&self, period: Duration, msg: TimerMsg) -> Subscription;
}

/// 基于后台线程的定时器，回调发送到控制线程的定时通道
#[derive(Debug, Clone)]
pub struct ThreadTimers {
    tx: Sender<TimerMsg>,
}

impl ThreadTimers {
    pub fn new(tx: Sender<TimerMsg>) -> Self {
        Self { tx }
    }
}

impl TimerSource for ThreadTimers {
    fn once(&self, delay: Duration, msg: TimerMsg) -> Subscription {
        let (subscription, cancel_rx) = Subscription::pair();
        let tx = self.tx.clone();
        let fire = after(delay);

        thread::spawn(move || {
            select! {
                recv(fire) -> _ => {
                    if !is_cancelled(&cancel_rx) {
                        let _ = tx.send(msg);
                    }
                }
                recv(cancel_rx) -> _ => {}
            }
        });

        subscription
    }

    fn every(&self, period: Duration, msg: TimerMsg) -> Subscription {
        let (subscription, cancel_rx) = Subscription::pair();
        let tx = self.tx.clone();
        let ticker = tick(period);

        thread::spawn(move || loop {
            select! {
                recv(ticker) -> _ => {
                    if is_cancelled(&cancel_rx) || tx.send(msg).is_err() {
                        break;
                    }
                }
                recv(cancel_rx) -> _ => break,
            }
        });

        subscription
    }
}

pub(crate) fn is_cancelled(cancel_rx: &Receiver<()>) -> bool {
    matches!(cancel_rx.try_recv(), Err(TryRecvError::Disconnected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_fires() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let timers = ThreadTimers::new(tx);

        let _sub = timers.once(Duration::from_millis(10), TimerMsg::StopDue(7));
        let msg = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg, TimerMsg::StopDue(7));
    }

    #[test]
    fn test_cancelled_once_never_fires() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let timers = ThreadTimers::new(tx);

        let sub = timers.once(Duration::from_millis(50), TimerMsg::StopDue(1));
        sub.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_every_stops_after_drop() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let timers = ThreadTimers::new(tx);

        let sub = timers.every(Duration::from_millis(10), TimerMsg::CountdownTick(3));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            TimerMsg::CountdownTick(3)
        );
        drop(sub);

        // 取消前可能还有一个已在途的回调
        thread::sleep(Duration::from_millis(30));
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
