use log::*;
use qpe_common::Cents;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    db_types::{PaymentEvent, ReconciliationStatus, Reference},
    events::{EventProducers, IntentSatisfiedEvent, OrderFinalizedEvent},
    finalizer::OrderFinalizer,
    intent::PaymentIntent,
    listener::{ListenerMessage, NotificationListener, NotificationSource},
    reconciliation::{ReconciliationApi, ReconciliationError},
    traits::{LedgerError, NewCheckoutOrder, OrderSubmitter, ReconciliationLedger},
};

const COMMAND_BUFFER: usize = 8;
const MESSAGE_BUFFER: usize = 32;

/// Actions the checkout screen can ask of a running controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    /// Accept the satisfied intent and submit the order. Ignored in any state other than `Satisfied` (or `Failed`,
    /// which is only reachable once satisfied).
    ConfirmPayment,
    /// Abandon the whole checkout: the ledger entry is cleared and the intent stops being resumable.
    CancelCheckout,
    /// Tear down without clearing anything; the intent remains resumable indefinitely.
    LeaveScreen,
}

/// `ReconciliationController` owns the state machine for one payment intent.
///
/// | From \ To      | Awaiting | Satisfied | Finalizing | Finalized | Failed | ChannelError |
/// |----------------|----------|-----------|------------|-----------|--------|--------------|
/// | Awaiting       | event    | event     |            |           |        | channel down |
/// | Satisfied      |          | event     | confirm    |           |        | channel down |
/// | Finalizing     |          |           |            | submit ok | submit err |          |
/// | Failed         |          |           | confirm    |           | event  | channel down |
/// | ChannelError   | event    | event     |            |           |        |              |
///
/// `Finalized` is terminal; the controller tears down and further events are discarded. `Failed` keeps the ledger
/// entry intact, so confirming again is safe. Events that arrive while `Failed` are still folded into the ledger
/// (no error may lose an already-received amount), but the failure stays on screen until the user retries.
///
/// Listener messages and UI commands are consumed on a single task, and each `accumulate` is awaited before the next
/// message is taken, so applies for a reference are strictly serialized.
pub struct ReconciliationController<B, S> {
    intent: PaymentIntent,
    api: ReconciliationApi<B>,
    finalizer: OrderFinalizer<B, S>,
    producers: EventProducers,
    discount: Option<Cents>,
    note: Option<String>,
    announced_satisfied: bool,
    status_tx: watch::Sender<ReconciliationStatus>,
    commands: mpsc::Receiver<UiCommand>,
    messages: mpsc::Receiver<ListenerMessage>,
}

impl<B, S> ReconciliationController<B, S>
where
    B: ReconciliationLedger,
    S: OrderSubmitter,
{
    pub fn new(intent: PaymentIntent, ledger: B, submitter: S, producers: EventProducers) -> (Self, ControllerHandle) {
        let initial = ReconciliationStatus::Awaiting {
            received: Cents::from(0),
            remaining: intent.target_amount,
        };
        let (status_tx, status_rx) = watch::channel(initial);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_BUFFER);
        let handle = ControllerHandle {
            reference: intent.reference.clone(),
            status: status_rx,
            commands: command_tx,
            messages: message_tx,
        };
        let controller = Self {
            api: ReconciliationApi::new(ledger.clone()),
            finalizer: OrderFinalizer::new(ledger, submitter),
            intent,
            producers,
            discount: None,
            note: None,
            announced_satisfied: false,
            status_tx,
            commands: command_rx,
            messages: message_rx,
        };
        (controller, handle)
    }

    /// Apply a discount to the order submitted on confirmation.
    pub fn with_discount(mut self, discount: Cents) -> Self {
        self.discount = Some(discount);
        self
    }

    /// Attach a note to the order submitted on confirmation.
    pub fn with_note<N: Into<String>>(mut self, note: N) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Run the state machine until the order is finalized, the checkout is cancelled or left, or storage stays down
    /// past the retry budget.
    ///
    /// The first thing `run` does is resume from the ledger, so a completion that happened while the app was not
    /// running is recovered without a new event.
    pub async fn run(mut self) -> Result<(), ReconciliationError> {
        let status = match self.api.resume(&self.intent).await {
            Ok(status) => status,
            Err(e) => {
                error!("🔄 Could not resume [{}]: {e}", self.intent.reference);
                self.status_tx
                    .send_replace(ReconciliationStatus::Failed { received: Cents::from(0), reason: e.to_string() });
                return Err(e);
            },
        };
        if let ReconciliationStatus::Satisfied { received, overpaid } = &status {
            info!("🔄 [{}] resumed into a satisfied state with {received} received", self.intent.reference);
            self.publish_satisfied(*received, *overpaid).await;
        }
        self.status_tx.send_replace(status);

        loop {
            tokio::select! {
                Some(command) = self.commands.recv() => match command {
                    UiCommand::ConfirmPayment => {
                        if self.handle_confirm().await {
                            break;
                        }
                    },
                    UiCommand::CancelCheckout => {
                        self.handle_cancel().await?;
                        break;
                    },
                    UiCommand::LeaveScreen => {
                        debug!("🔄 Leaving [{}]; the intent remains resumable", self.intent.reference);
                        break;
                    },
                },
                Some(message) = self.messages.recv() => match message {
                    ListenerMessage::Event(event) => self.handle_event(event).await?,
                    ListenerMessage::ChannelError(e) => self.handle_channel_interruption(e.to_string()),
                    ListenerMessage::Closed => {
                        self.handle_channel_interruption("The push channel closed unexpectedly".to_string())
                    },
                },
                else => break,
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: PaymentEvent) -> Result<(), ReconciliationError> {
        let current = self.status_tx.borrow().clone();
        if matches!(current, ReconciliationStatus::Finalizing { .. } | ReconciliationStatus::Finalized { .. }) {
            debug!("🔄 Discarding an event of {} for [{}]: finalization has started", event.amount, self.intent.reference);
            return Ok(());
        }
        let status = match self.api.apply_event(&self.intent, &event).await {
            Ok(status) => status,
            Err(ReconciliationError::Ledger(LedgerError::NonPositiveAmount(amount))) => {
                warn!("🔄 Dropping an event with a non-positive amount ({amount}) for [{}]", self.intent.reference);
                return Ok(());
            },
            Err(e) => {
                error!(
                    "🔄 Could not record an event of {} for [{}]: {e}. The intent remains resumable.",
                    event.amount, self.intent.reference
                );
                self.status_tx
                    .send_replace(ReconciliationStatus::Failed { received: current.received(), reason: e.to_string() });
                return Err(e);
            },
        };
        // A failed finalization stands until the user retries; the event's amount is recorded regardless.
        let next = match (current, status) {
            (ReconciliationStatus::Failed { reason, .. }, ReconciliationStatus::Satisfied { received, .. }) => {
                ReconciliationStatus::Failed { received, reason }
            },
            (_, status) => status,
        };
        if let ReconciliationStatus::Satisfied { received, overpaid } = &next {
            self.publish_satisfied(*received, *overpaid).await;
        }
        self.status_tx.send_replace(next);
        Ok(())
    }

    /// Returns true when the controller is done and should tear down.
    async fn handle_confirm(&mut self) -> bool {
        let current = self.status_tx.borrow().clone();
        let received = match current {
            ReconciliationStatus::Satisfied { received, .. } | ReconciliationStatus::Failed { received, .. } => {
                received
            },
            other => {
                warn!("🔄 Ignoring a confirm request for [{}] in state {other}", self.intent.reference);
                return false;
            },
        };
        self.status_tx.send_replace(ReconciliationStatus::Finalizing { received });
        let mut order = NewCheckoutOrder::new(self.intent.reference.clone(), self.intent.items.clone());
        order.discount = self.discount;
        order.note = self.note.clone();
        match self.finalizer.finalize(order).await {
            Ok(confirmation) => {
                self.publish_finalized(confirmation.order_id.clone()).await;
                self.status_tx.send_replace(ReconciliationStatus::Finalized { order_id: confirmation.order_id });
                true
            },
            Err(e) => {
                warn!(
                    "🔄 Finalization of [{}] failed: {e}. The accumulated amount is untouched; confirming again is \
                     safe.",
                    self.intent.reference
                );
                self.status_tx.send_replace(ReconciliationStatus::Failed { received, reason: e.to_string() });
                false
            },
        }
    }

    async fn handle_cancel(&mut self) -> Result<(), ReconciliationError> {
        match self.api.abandon(&self.intent.reference).await {
            Ok(()) => {
                info!("🔄 Checkout [{}] cancelled by the user", self.intent.reference);
                Ok(())
            },
            Err(e) => {
                error!("🔄 Could not cancel [{}]: {e}", self.intent.reference);
                let received = self.status_tx.borrow().received();
                self.status_tx.send_replace(ReconciliationStatus::Failed { received, reason: e.to_string() });
                Err(e)
            },
        }
    }

    fn handle_channel_interruption(&mut self, reason: String) {
        let received = self.status_tx.borrow().received();
        warn!("🔄 Push channel for [{}] went down: {reason}", self.intent.reference);
        self.status_tx.send_replace(ReconciliationStatus::ChannelError { received, reason });
    }

    async fn publish_satisfied(&mut self, received: Cents, overpaid: Cents) {
        if self.announced_satisfied {
            return;
        }
        self.announced_satisfied = true;
        let event = IntentSatisfiedEvent { reference: self.intent.reference.clone(), received, overpaid };
        for producer in &self.producers.intent_satisfied_producer {
            debug!("🔄 Notifying intent satisfied hook subscribers");
            producer.publish_event(event.clone()).await;
        }
    }

    async fn publish_finalized(&self, order_id: String) {
        let event = OrderFinalizedEvent { reference: self.intent.reference.clone(), order_id };
        for producer in &self.producers.order_finalized_producer {
            debug!("🔄 Notifying order finalized hook subscribers");
            producer.publish_event(event.clone()).await;
        }
    }
}

//--------------------------------------   ControllerHandle   --------------------------------------------------------
/// The screen-facing side of a running controller. Cheap to clone.
#[derive(Clone)]
pub struct ControllerHandle {
    reference: Reference,
    status: watch::Receiver<ReconciliationStatus>,
    commands: mpsc::Sender<UiCommand>,
    messages: mpsc::Sender<ListenerMessage>,
}

impl ControllerHandle {
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// A live view of the status projection. `changed()` wakes the screen on every transition.
    pub fn status(&self) -> watch::Receiver<ReconciliationStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> ReconciliationStatus {
        self.status.borrow().clone()
    }

    pub async fn confirm_payment(&self) {
        self.send(UiCommand::ConfirmPayment).await;
    }

    pub async fn cancel_checkout(&self) {
        self.send(UiCommand::CancelCheckout).await;
    }

    pub async fn leave_screen(&self) {
        self.send(UiCommand::LeaveScreen).await;
    }

    async fn send(&self, command: UiCommand) {
        if self.commands.send(command).await.is_err() {
            warn!("🔄 The controller for [{}] is no longer running", self.reference);
        }
    }

    /// The sender half of the controller's message queue, for wiring up listeners by hand.
    pub fn message_sender(&self) -> mpsc::Sender<ListenerMessage> {
        self.messages.clone()
    }

    /// Spawn a listener that pumps `source` into this controller. Called once on screen mount, and again with a
    /// fresh source when the user retries after a channel error.
    pub fn attach_listener<S>(&self, source: S) -> JoinHandle<()>
    where S: NotificationSource + Send + 'static {
        let listener = NotificationListener::new(source, self.reference.clone(), self.messages.clone());
        tokio::spawn(listener.run())
    }
}
