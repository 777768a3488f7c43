use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::{
    events::{
        AdminEscalationEvent,
        DomainEvent,
        EventHandler,
        EventProducer,
        Handler,
        HookResult,
        OrderEvent,
        ReservationChangedEvent,
    },
    helpers::RetryConfig,
};

/// The publishing side of the hooks. This is the engine's side-effect dispatcher: the ledgers never call it, the
/// coordinating APIs hand it the events the ledgers emit.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_event_producer: Vec<EventProducer<OrderEvent>>,
    pub reservation_changed_producer: Vec<EventProducer<ReservationChangedEvent>>,
    pub admin_escalation_producer: Vec<EventProducer<AdminEscalationEvent>>,
}

impl EventProducers {
    /// Routes the event to every subscriber of its kind. Only the hand-off to the handler queues is awaited, not
    /// the handlers themselves.
    pub async fn dispatch(&self, event: DomainEvent) {
        trace!("📬️ Dispatching {}", event.name());
        match event {
            DomainEvent::Order(ev) => {
                for producer in &self.order_event_producer {
                    producer.publish_event(ev.clone()).await;
                }
            },
            DomainEvent::ProductReservationChanged(ev) => {
                for producer in &self.reservation_changed_producer {
                    producer.publish_event(ev.clone()).await;
                }
            },
            DomainEvent::AdminEscalation(ev) => {
                warn!("📬️ Admin escalation raised for order {}: {}", ev.order_id, ev.reason);
                for producer in &self.admin_escalation_producer {
                    producer.publish_event(ev.clone()).await;
                }
            },
        }
    }

    pub async fn dispatch_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.dispatch(event).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_event: Option<EventHandler<OrderEvent>>,
    pub on_reservation_changed: Option<EventHandler<ReservationChangedEvent>>,
    pub on_admin_escalation: Option<EventHandler<AdminEscalationEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let retry = hooks.retry.clone();
        let on_order_event = hooks.on_order_event.map(|f| EventHandler::with_retry(buffer_size, f, retry.clone()));
        let on_reservation_changed =
            hooks.on_reservation_changed.map(|f| EventHandler::with_retry(buffer_size, f, retry.clone()));
        let on_admin_escalation =
            hooks.on_admin_escalation.map(|f| EventHandler::with_retry(buffer_size, f, retry.clone()));
        Self { on_order_event, on_reservation_changed, on_admin_escalation }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_event {
            result.order_event_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_reservation_changed {
            result.reservation_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_admin_escalation {
            result.admin_escalation_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_event {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_reservation_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_admin_escalation {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_event: Option<Handler<OrderEvent>>,
    pub on_reservation_changed: Option<Handler<ReservationChangedEvent>>,
    pub on_admin_escalation: Option<Handler<AdminEscalationEvent>>,
    /// How failing hooks are retried
    pub retry: RetryConfig,
}

impl EventHooks {
    pub fn on_order_event<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderEvent) -> Pin<Box<dyn Future<Output = HookResult> + Send>>) + Send + Sync + 'static {
        self.on_order_event = Some(Arc::new(f));
        self
    }

    pub fn on_reservation_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReservationChangedEvent) -> Pin<Box<dyn Future<Output = HookResult> + Send>>) + Send + Sync + 'static
    {
        self.on_reservation_changed = Some(Arc::new(f));
        self
    }

    pub fn on_admin_escalation<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AdminEscalationEvent) -> Pin<Box<dyn Future<Output = HookResult> + Send>>) + Send + Sync + 'static {
        self.on_admin_escalation = Some(Arc::new(f));
        self
    }

    pub fn with_retry(&mut self, retry: RetryConfig) -> &mut Self {
        self.retry = retry;
        self
    }
}
