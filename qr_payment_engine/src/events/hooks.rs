use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, IntentSatisfiedEvent, OrderFinalizedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub intent_satisfied_producer: Vec<EventProducer<IntentSatisfiedEvent>>,
    pub order_finalized_producer: Vec<EventProducer<OrderFinalizedEvent>>,
}

pub struct EventHandlers {
    pub on_intent_satisfied: Option<EventHandler<IntentSatisfiedEvent>>,
    pub on_order_finalized: Option<EventHandler<OrderFinalizedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_intent_satisfied = hooks.on_intent_satisfied.map(|f| EventHandler::new(buffer_size, f));
        let on_order_finalized = hooks.on_order_finalized.map(|f| EventHandler::new(buffer_size, f));
        Self { on_intent_satisfied, on_order_finalized }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_intent_satisfied {
            result.intent_satisfied_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_finalized {
            result.order_finalized_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_intent_satisfied {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_finalized {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_intent_satisfied: Option<Handler<IntentSatisfiedEvent>>,
    pub on_order_finalized: Option<Handler<OrderFinalizedEvent>>,
}

impl EventHooks {
    pub fn on_intent_satisfied<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(IntentSatisfiedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_intent_satisfied = Some(Arc::new(f));
        self
    }

    pub fn on_order_finalized<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderFinalizedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_finalized = Some(Arc::new(f));
        self
    }
}
