//! 系统状态机模块
//!
//! Lifecycle of the player: network join, remote session setup, the tag
//! cycle and recovery after network loss. The machine only decides *where*
//! to go for a given event. The player owns the entry actions.

use log::{info, warn};

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    // 启动
    Boot,

    // 网络
    NetworkConnecting,
    NetworkConnected,

    // 远程服务
    RemoteInitializing,

    // 运行
    Idle,
    TagDetected,
    TagReading,
    TagProcessing,
    CommandSucceeded,
    CommandFailed,

    // 错误与恢复
    ErrorRecovery,
    NetworkReconnecting,
}

impl LifecycleState {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleState::Boot => "Boot",
            LifecycleState::NetworkConnecting => "NetworkConnecting",
            LifecycleState::NetworkConnected => "NetworkConnected",
            LifecycleState::RemoteInitializing => "RemoteInitializing",
            LifecycleState::Idle => "Idle",
            LifecycleState::TagDetected => "TagDetected",
            LifecycleState::TagReading => "TagReading",
            LifecycleState::TagProcessing => "TagProcessing",
            LifecycleState::CommandSucceeded => "CommandSucceeded",
            LifecycleState::CommandFailed => "CommandFailed",
            LifecycleState::ErrorRecovery => "ErrorRecovery",
            LifecycleState::NetworkReconnecting => "NetworkReconnecting",
        }
    }

    /// States in which the periodic network health check runs
    pub fn monitors_network(self) -> bool {
        !matches!(
            self,
            LifecycleState::Boot
                | LifecycleState::NetworkConnecting
                | LifecycleState::NetworkReconnecting
                | LifecycleState::ErrorRecovery
        )
    }
}

/// 系统事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    // 启动
    BootAnimationDone,

    // 网络
    NetworkJoined,
    NetworkJoinTimedOut,
    NetworkLost,
    NetworkRestored,
    ReconnectTimedOut,

    // 服务
    ServicesStarted,
    RemoteReady,
    RemoteNotConfigured,
    RemoteInitTimedOut,

    // 标签
    TagPresent,
    ReadStarted,
    TagDecoded,
    TagRejected,

    // 播放
    PlaybackStarted,
    PlaybackFailed,
    FeedbackElapsed,
}

/// 状态转换结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// 保持当前状态
    Stay,
    /// 转换到新状态
    Transition(LifecycleState),
}

/// 系统状态机
#[derive(Debug)]
pub struct StateMachine {
    current: LifecycleState,
    previous: Option<LifecycleState>,
    entered_at_ms: u64,
    transitions: u32,
}

impl StateMachine {
    pub fn new(now_ms: u64) -> Self {
        Self {
            current: LifecycleState::Boot,
            previous: None,
            entered_at_ms: now_ms,
            transitions: 0,
        }
    }

    /// 获取当前状态
    pub fn current(&self) -> LifecycleState {
        self.current
    }

    /// 获取上一个状态
    pub fn previous(&self) -> Option<LifecycleState> {
        self.previous
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Time spent in the current state
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.entered_at_ms)
    }

    /// 处理系统事件
    pub fn handle_event(&mut self, event: AppEvent, now_ms: u64) -> StateTransition {
        let transition = Self::transition_for(self.current, event);
        match transition {
            StateTransition::Transition(next) => self.transition_to(next, now_ms),
            StateTransition::Stay => {
                warn!("[STATE] {:?} ignored in {}", event, self.current.name());
            }
        }
        transition
    }

    fn transition_to(&mut self, next: LifecycleState, now_ms: u64) {
        info!("[STATE] {} -> {}", self.current.name(), next.name());
        self.previous = Some(self.current);
        self.current = next;
        self.entered_at_ms = now_ms;
        self.transitions = self.transitions.wrapping_add(1);
    }

    /// 状态转换规则
    fn transition_for(current: LifecycleState, event: AppEvent) -> StateTransition {
        use AppEvent as E;
        use LifecycleState as S;

        let next = match (current, event) {
            // 启动流程
            (S::Boot, E::BootAnimationDone) => S::NetworkConnecting,

            // 网络连接
            (S::NetworkConnecting, E::NetworkJoined) => S::NetworkConnected,
            (S::NetworkConnecting, E::NetworkJoinTimedOut) => S::ErrorRecovery,
            (S::NetworkConnected, E::ServicesStarted) => S::RemoteInitializing,

            // 远程会话初始化，未配置或超时都进入空闲
            (S::RemoteInitializing, E::RemoteReady)
            | (S::RemoteInitializing, E::RemoteNotConfigured)
            | (S::RemoteInitializing, E::RemoteInitTimedOut) => S::Idle,

            // 标签流程
            (S::Idle, E::TagPresent) => S::TagDetected,
            (S::TagDetected, E::ReadStarted) => S::TagReading,
            (S::TagReading, E::TagDecoded) => S::TagProcessing,
            (S::TagReading, E::TagRejected) => S::CommandFailed,
            (S::TagProcessing, E::PlaybackStarted) => S::CommandSucceeded,
            (S::TagProcessing, E::PlaybackFailed) => S::CommandFailed,
            (S::CommandSucceeded, E::FeedbackElapsed) | (S::CommandFailed, E::FeedbackElapsed) => {
                S::Idle
            }

            // 断网处理
            (S::NetworkReconnecting, E::NetworkRestored) => S::Idle,
            (S::NetworkReconnecting, E::ReconnectTimedOut) => S::ErrorRecovery,
            (state, E::NetworkLost) if state.monitors_network() => S::NetworkReconnecting,

            _ => return StateTransition::Stay,
        };
        StateTransition::Transition(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppEvent as E;
    use LifecycleState as S;

    fn drive(events: &[AppEvent]) -> StateMachine {
        let mut sm = StateMachine::new(0);
        for (i, event) in events.iter().enumerate() {
            sm.handle_event(*event, i as u64 * 10);
        }
        sm
    }

    #[test]
    fn boot_to_idle() {
        let sm = drive(&[
            E::BootAnimationDone,
            E::NetworkJoined,
            E::ServicesStarted,
            E::RemoteReady,
        ]);
        assert_eq!(sm.current(), S::Idle);
        assert_eq!(sm.previous(), Some(S::RemoteInitializing));
        assert_eq!(sm.transitions(), 4);
    }

    #[test]
    fn unconfigured_or_slow_remote_still_reaches_idle() {
        let prefix = [E::BootAnimationDone, E::NetworkJoined, E::ServicesStarted];
        for last in [E::RemoteNotConfigured, E::RemoteInitTimedOut] {
            let mut events = prefix.to_vec();
            events.push(last);
            assert_eq!(drive(&events).current(), S::Idle);
        }
    }

    #[test]
    fn tag_cycle() {
        let mut sm = drive(&[
            E::BootAnimationDone,
            E::NetworkJoined,
            E::ServicesStarted,
            E::RemoteReady,
        ]);
        for (event, expected) in [
            (E::TagPresent, S::TagDetected),
            (E::ReadStarted, S::TagReading),
            (E::TagDecoded, S::TagProcessing),
            (E::PlaybackStarted, S::CommandSucceeded),
            (E::FeedbackElapsed, S::Idle),
            (E::TagPresent, S::TagDetected),
            (E::ReadStarted, S::TagReading),
            (E::TagRejected, S::CommandFailed),
            (E::FeedbackElapsed, S::Idle),
        ] {
            assert_eq!(
                sm.handle_event(event, 100),
                StateTransition::Transition(expected)
            );
        }
    }

    #[test]
    fn join_timeout_goes_to_recovery() {
        let sm = drive(&[E::BootAnimationDone, E::NetworkJoinTimedOut]);
        assert_eq!(sm.current(), S::ErrorRecovery);
    }

    #[test]
    fn network_loss_only_after_connection() {
        let mut sm = drive(&[E::BootAnimationDone]);
        assert_eq!(sm.handle_event(E::NetworkLost, 5), StateTransition::Stay);

        let mut sm2 = drive(&[E::BootAnimationDone, E::NetworkJoined, E::ServicesStarted]);
        assert_eq!(
            sm2.handle_event(E::NetworkLost, 50),
            StateTransition::Transition(S::NetworkReconnecting)
        );
        assert_eq!(sm2.handle_event(E::NetworkLost, 60), StateTransition::Stay);
        assert_eq!(
            sm2.handle_event(E::ReconnectTimedOut, 70),
            StateTransition::Transition(S::ErrorRecovery)
        );
        assert_eq!(sm2.handle_event(E::NetworkLost, 80), StateTransition::Stay);

        sm.handle_event(E::NetworkJoined, 90);
        assert_eq!(sm.current(), S::NetworkConnected);
    }

    #[test]
    fn restored_network_returns_to_idle() {
        let mut sm = drive(&[
            E::BootAnimationDone,
            E::NetworkJoined,
            E::ServicesStarted,
            E::RemoteReady,
            E::TagPresent,
        ]);
        sm.handle_event(E::NetworkLost, 100);
        sm.handle_event(E::NetworkRestored, 200);
        assert_eq!(sm.current(), S::Idle);
    }

    #[test]
    fn unrelated_events_do_not_move() {
        let mut sm = StateMachine::new(0);
        assert_eq!(sm.handle_event(E::TagPresent, 1), StateTransition::Stay);
        assert_eq!(sm.handle_event(E::FeedbackElapsed, 2), StateTransition::Stay);
        assert_eq!(sm.current(), S::Boot);
        assert_eq!(sm.transitions(), 0);
    }

    #[test]
    fn entry_time_tracks_last_transition() {
        let mut sm = StateMachine::new(1_000);
        assert_eq!(sm.elapsed_ms(1_500), 500);
        sm.handle_event(E::BootAnimationDone, 2_500);
        assert_eq!(sm.elapsed_ms(2_600), 100);
        assert_eq!(sm.elapsed_ms(2_000), 0);
    }
}
