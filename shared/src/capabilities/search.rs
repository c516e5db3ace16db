//! Hands completed search box interactions to the host. Fire and forget.

use crux_core::capability::{Capability, CapabilityContext, Operation};

use crate::suggest::SearchOutcome;

impl Operation for SearchOutcome {
    type Output = ();
}

pub struct Search<E> {
    context: CapabilityContext<SearchOutcome, E>,
}

impl<Ev> Capability<Ev> for Search<Ev> {
    type Operation = SearchOutcome;
    type MappedSelf<MappedEv> = Search<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Search::new(self.context.map_event(f))
    }
}

impl<E> Search<E>
where
    E: Send + 'static,
{
    pub fn new(context: CapabilityContext<SearchOutcome, E>) -> Self {
        Self { context }
    }

    pub fn completed(&self, outcome: SearchOutcome) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context.notify_shell(outcome).await;
        });
    }
}
