//! End-to-end checkout flows: listener frames in, status projections and an exactly-once order submission out.
use std::{future::Future, pin::Pin};

use futures_util::stream;
use qpe_common::Cents;
use qr_payment_engine::{
    db_types::{ReconciliationStatus, Reference},
    events::{EventHandlers, EventHooks, EventProducers},
    intent::{IntentBuilder, ItemLine, PaymentIntent},
    listener::{queue_source, ChannelError, StreamSource},
    ReconciliationController,
    ReconciliationLedger,
};

mod support;
use support::{new_test_ledger, wait_for_status, TestSubmitter};

fn intent(reference: &str, target: i64) -> PaymentIntent {
    IntentBuilder::new(Cents::from(target))
        .reference(Reference::from(reference))
        .merchant("Corner Cafe", "ACC-881")
        .item(ItemLine::new("Iced coffee", 2, Cents::from(20_000)))
        .build()
        .unwrap()
}

fn frame(amount: i64) -> String {
    format!(r#"{{"amount": {amount}}}"#)
}

#[tokio::test]
async fn accumulates_fragmented_payments_and_finalizes_once() {
    let ledger = new_test_ledger().await;
    let submitter = TestSubmitter::new();
    let reference = Reference::from("QR-flow-1");
    let (controller, handle) =
        ReconciliationController::new(intent("QR-flow-1", 50_000), ledger.clone(), submitter.clone(), EventProducers::default());
    let controller = controller.with_discount(Cents::from(2_000)).with_note("table 5");
    let run = tokio::spawn(controller.run());

    let (tx, source) = queue_source(8);
    handle.attach_listener(source);
    let mut status = handle.status();

    tx.send(frame(30_000)).await.unwrap();
    let partial = wait_for_status(&mut status, |s| s.received() == Cents::from(30_000)).await;
    assert_eq!(partial, ReconciliationStatus::Awaiting {
        received: Cents::from(30_000),
        remaining: Cents::from(20_000),
    });

    // a second fragment overshoots the target; it is fully credited, never split or refused
    tx.send(frame(25_000)).await.unwrap();
    let satisfied = wait_for_status(&mut status, |s| s.is_satisfied()).await;
    assert_eq!(satisfied, ReconciliationStatus::Satisfied {
        received: Cents::from(55_000),
        overpaid: Cents::from(5_000),
    });

    handle.confirm_payment().await;
    let done = wait_for_status(&mut status, |s| matches!(s, ReconciliationStatus::Finalized { .. })).await;
    assert!(matches!(done, ReconciliationStatus::Finalized { .. }));
    run.await.unwrap().unwrap();

    assert_eq!(submitter.submissions(), 1);
    assert!(ledger.fetch_entry(&reference).await.unwrap().is_none());

    // the submitted order carries the checkout's items, discount and note
    let order = submitter.last_order().unwrap();
    assert_eq!(order.reference, reference);
    assert!(!order.items.is_empty());
    assert_eq!(order.discount, Some(Cents::from(2_000)));
    assert_eq!(order.note.as_deref(), Some("table 5"));
}

#[tokio::test]
async fn resumes_into_satisfied_without_a_new_event() {
    let ledger = new_test_ledger().await;
    let reference = Reference::from("QR-resume");
    // the completion happened while the app was not running
    ledger.accumulate(&reference, Cents::from(50_000)).await.unwrap();

    let submitter = TestSubmitter::new();
    let (controller, handle) =
        ReconciliationController::new(intent("QR-resume", 40_000), ledger.clone(), submitter.clone(), EventProducers::default());
    let run = tokio::spawn(controller.run());

    let mut status = handle.status();
    let resumed = wait_for_status(&mut status, |s| s.is_satisfied()).await;
    assert_eq!(resumed, ReconciliationStatus::Satisfied {
        received: Cents::from(50_000),
        overpaid: Cents::from(10_000),
    });

    handle.confirm_payment().await;
    wait_for_status(&mut status, |s| matches!(s, ReconciliationStatus::Finalized { .. })).await;
    run.await.unwrap().unwrap();
    assert_eq!(submitter.submissions(), 1);
}

#[tokio::test]
async fn malformed_frames_leave_the_state_untouched() {
    let ledger = new_test_ledger().await;
    let reference = Reference::from("QR-malformed");
    let (controller, handle) = ReconciliationController::new(
        intent("QR-malformed", 50_000),
        ledger.clone(),
        TestSubmitter::new(),
        EventProducers::default(),
    );
    let run = tokio::spawn(controller.run());

    let (tx, source) = queue_source(8);
    handle.attach_listener(source);
    let mut status = handle.status();

    tx.send("not even json".to_string()).await.unwrap();
    tx.send(frame(0)).await.unwrap();
    tx.send(frame(-4_000)).await.unwrap();
    tx.send(r#"{"amount": 1000, "reference": "QR-some-other-checkout"}"#.to_string()).await.unwrap();
    // a valid frame behind the garbage; when it lands, none of the earlier ones may have counted
    tx.send(frame(1_000)).await.unwrap();

    let after = wait_for_status(&mut status, |s| s.received() == Cents::from(1_000)).await;
    assert_eq!(after, ReconciliationStatus::Awaiting {
        received: Cents::from(1_000),
        remaining: Cents::from(49_000),
    });

    handle.leave_screen().await;
    run.await.unwrap().unwrap();
    assert_eq!(ledger.fetch_entry(&reference).await.unwrap().unwrap().accumulated, Cents::from(1_000));
}

#[tokio::test]
async fn explicit_cancel_clears_the_entry_but_leaving_does_not() {
    let ledger = new_test_ledger().await;

    // leaving the screen keeps the intent resumable
    let reference = Reference::from("QR-leave");
    let (controller, handle) =
        ReconciliationController::new(intent("QR-leave", 50_000), ledger.clone(), TestSubmitter::new(), EventProducers::default());
    let run = tokio::spawn(controller.run());
    let (tx, source) = queue_source(8);
    handle.attach_listener(source);
    let mut status = handle.status();
    tx.send(frame(20_000)).await.unwrap();
    wait_for_status(&mut status, |s| s.received() == Cents::from(20_000)).await;
    handle.leave_screen().await;
    run.await.unwrap().unwrap();
    assert_eq!(ledger.fetch_entry(&reference).await.unwrap().unwrap().accumulated, Cents::from(20_000));

    // an explicit cancel does clear
    let reference = Reference::from("QR-cancel");
    let (controller, handle) =
        ReconciliationController::new(intent("QR-cancel", 50_000), ledger.clone(), TestSubmitter::new(), EventProducers::default());
    let run = tokio::spawn(controller.run());
    let (tx, source) = queue_source(8);
    handle.attach_listener(source);
    let mut status = handle.status();
    tx.send(frame(20_000)).await.unwrap();
    wait_for_status(&mut status, |s| s.received() == Cents::from(20_000)).await;
    handle.cancel_checkout().await;
    run.await.unwrap().unwrap();
    assert!(ledger.fetch_entry(&reference).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_finalization_keeps_funds_and_can_be_retried() {
    let ledger = new_test_ledger().await;
    let reference = Reference::from("QR-fail-retry");
    let submitter = TestSubmitter::failing_first(1);
    let (controller, handle) =
        ReconciliationController::new(intent("QR-fail-retry", 40_000), ledger.clone(), submitter.clone(), EventProducers::default());
    let run = tokio::spawn(controller.run());

    let (tx, source) = queue_source(8);
    handle.attach_listener(source);
    let mut status = handle.status();

    tx.send(frame(40_000)).await.unwrap();
    wait_for_status(&mut status, |s| s.is_satisfied()).await;

    handle.confirm_payment().await;
    wait_for_status(&mut status, |s| matches!(s, ReconciliationStatus::Failed { .. })).await;
    // the customer is not asked to pay again
    assert_eq!(ledger.fetch_entry(&reference).await.unwrap().unwrap().accumulated, Cents::from(40_000));
    assert_eq!(submitter.submissions(), 0);

    handle.confirm_payment().await;
    wait_for_status(&mut status, |s| matches!(s, ReconciliationStatus::Finalized { .. })).await;
    run.await.unwrap().unwrap();
    assert_eq!(submitter.submissions(), 1);
    assert!(ledger.fetch_entry(&reference).await.unwrap().is_none());
}

#[tokio::test]
async fn channel_errors_are_non_terminal_and_preserve_totals() {
    let ledger = new_test_ledger().await;
    let (controller, handle) = ReconciliationController::new(
        intent("QR-channel", 50_000),
        ledger.clone(),
        TestSubmitter::new(),
        EventProducers::default(),
    );
    let run = tokio::spawn(controller.run());
    let mut status = handle.status();

    // a connection that delivers one event and then dies
    let frames = vec![Ok(frame(10_000)), Err(ChannelError::Transport("connection reset".to_string()))];
    handle.attach_listener(StreamSource::new(stream::iter(frames)));
    let down = wait_for_status(&mut status, |s| matches!(s, ReconciliationStatus::ChannelError { .. })).await;
    assert_eq!(down.received(), Cents::from(10_000));

    // the screen retries with a fresh connection and the flow picks up where it left off
    let (tx, source) = queue_source(8);
    handle.attach_listener(source);
    tx.send(frame(40_000)).await.unwrap();
    let satisfied = wait_for_status(&mut status, |s| s.is_satisfied()).await;
    assert_eq!(satisfied, ReconciliationStatus::Satisfied {
        received: Cents::from(50_000),
        overpaid: Cents::from(0),
    });

    handle.confirm_payment().await;
    wait_for_status(&mut status, |s| matches!(s, ReconciliationStatus::Finalized { .. })).await;
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn satisfied_hook_fires_once() {
    let ledger = new_test_ledger().await;
    let (notify, mut notified) = tokio::sync::mpsc::channel(4);
    let mut hooks = EventHooks::default();
    hooks.on_intent_satisfied(move |event| {
        let notify = notify.clone();
        Box::pin(async move {
            let _ = notify.send(event).await;
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(4, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let (controller, handle) =
        ReconciliationController::new(intent("QR-hook", 50_000), ledger.clone(), TestSubmitter::new(), producers);
    let run = tokio::spawn(controller.run());

    let (tx, source) = queue_source(8);
    handle.attach_listener(source);
    let mut status = handle.status();

    tx.send(frame(50_000)).await.unwrap();
    wait_for_status(&mut status, |s| s.is_satisfied()).await;
    let event = notified.recv().await.unwrap();
    assert_eq!(event.reference, Reference::from("QR-hook"));
    assert_eq!(event.received, Cents::from(50_000));
    assert_eq!(event.overpaid, Cents::from(0));

    // a further overpayment keeps accumulating but does not re-announce
    tx.send(frame(5_000)).await.unwrap();
    wait_for_status(&mut status, |s| s.received() == Cents::from(55_000)).await;
    handle.confirm_payment().await;
    wait_for_status(&mut status, |s| matches!(s, ReconciliationStatus::Finalized { .. })).await;
    run.await.unwrap().unwrap();
    assert!(notified.try_recv().is_err());
}
