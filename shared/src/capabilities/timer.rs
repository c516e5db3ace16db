use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The two timer slots the core uses. Starting a timer replaces whatever is
/// pending in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    Debounce,
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerOperation {
    /// Answer `Elapsed` once `millis` have passed. A timer already pending in
    /// the slot is answered `Cancelled`.
    Start { kind: TimerKind, millis: u64 },
    /// Answer the pending timer in the slot `Cancelled`, if there is one.
    Cancel { kind: TimerKind },
}

impl TimerOperation {
    pub fn kind(&self) -> TimerKind {
        match self {
            Self::Start { kind, .. } | Self::Cancel { kind } => *kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerOutput {
    Elapsed,
    Cancelled,
}

impl Operation for TimerOperation {
    type Output = TimerOutput;
}

pub struct Timer<E> {
    context: CapabilityContext<TimerOperation, E>,
}

impl<Ev> Capability<Ev> for Timer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = Timer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Timer::new(self.context.map_event(f))
    }
}

impl<E> Timer<E>
where
    E: Send + 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, E>) -> Self {
        Self { context }
    }

    /// Sends `event` back after `delay` unless the slot is cancelled or
    /// restarted first.
    pub fn start(&self, kind: TimerKind, delay: Duration, event: E) {
        let context = self.context.clone();
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.context.spawn(async move {
            let output = context
                .request_from_shell(TimerOperation::Start { kind, millis })
                .await;
            if output == TimerOutput::Elapsed {
                context.update_app(event);
            }
        });
    }

    pub fn cancel(&self, kind: TimerKind) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context
                .notify_shell(TimerOperation::Cancel { kind })
                .await;
        });
    }
}
