use shopbook::domain::access::Actor;
use shopbook::domain::payment::PaymentStatus;
use shopbook::interfaces::webhook::{WebhookAck, WebhookHandler};

mod common;

fn notification(gateway_ref: &str) -> Vec<u8> {
    format!(r#"{{"action":"payment.updated","type":"payment","data":{{"id":"{gateway_ref}"}}}}"#)
        .into_bytes()
}

#[tokio::test]
async fn test_redelivered_approval_dispatches_once() {
    let services = common::services();
    let owner = Actor::client(7);
    let appointment = services
        .booking
        .create(7, common::haircut(10, 11, 0))
        .await
        .unwrap();
    let payment = services
        .reconciler
        .create_checkout(appointment.id, &owner)
        .await
        .unwrap();
    let handler = WebhookHandler::new(services.reconciler.clone());

    // Before the gateway settles, deliveries change nothing.
    assert_eq!(
        handler.handle(&notification(&payment.gateway_ref)).await,
        WebhookAck::Accepted
    );
    assert_eq!(services.dispatcher.count(), 0);

    services.sandbox.settle(&payment.gateway_ref, "approved").await;
    for _ in 0..3 {
        assert_eq!(
            handler.handle(&notification(&payment.gateway_ref)).await,
            WebhookAck::Accepted
        );
    }

    assert_eq!(services.dispatcher.count(), 1);
    let stored = services
        .reconciler
        .get_by_appointment(appointment.id, &owner)
        .await
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_deliveries_dispatch_once() {
    let services = common::services();
    let owner = Actor::client(8);
    let appointment = services
        .booking
        .create(8, common::haircut(11, 17, 0))
        .await
        .unwrap();
    let payment = services
        .reconciler
        .create_checkout(appointment.id, &owner)
        .await
        .unwrap();
    services.sandbox.settle(&payment.gateway_ref, "approved").await;
    let handler = WebhookHandler::new(services.reconciler.clone());

    let deliveries: Vec<_> = (0..16)
        .map(|_| {
            let handler = handler.clone();
            let body = notification(&payment.gateway_ref);
            tokio::spawn(async move { handler.handle(&body).await })
        })
        .collect();
    for delivery in deliveries {
        assert_eq!(delivery.await.unwrap(), WebhookAck::Accepted);
    }

    assert_eq!(services.dispatcher.count(), 1);
}

#[tokio::test]
async fn test_rejected_then_new_checkout() {
    let services = common::services();
    let owner = Actor::client(7);
    let appointment = services
        .booking
        .create(7, common::haircut(10, 9, 0))
        .await
        .unwrap();
    let first = services
        .reconciler
        .create_checkout(appointment.id, &owner)
        .await
        .unwrap();
    let handler = WebhookHandler::new(services.reconciler.clone());

    services.sandbox.settle(&first.gateway_ref, "rejected").await;
    handler.handle(&notification(&first.gateway_ref)).await;

    let second = services
        .reconciler
        .create_checkout(appointment.id, &owner)
        .await
        .unwrap();
    services.sandbox.settle(&second.gateway_ref, "approved").await;
    handler.handle(&notification(&second.gateway_ref)).await;

    // A late approval for the rejected attempt is absorbed.
    services.sandbox.settle(&first.gateway_ref, "approved").await;
    handler.handle(&notification(&first.gateway_ref)).await;

    assert_eq!(services.dispatcher.count(), 1);
    assert_eq!(
        services
            .reconciler
            .get_by_appointment(appointment.id, &owner)
            .await
            .unwrap()
            .gateway_ref,
        second.gateway_ref
    );
}

#[tokio::test]
async fn test_malformed_payloads_are_ignored() {
    let services = common::services();
    let handler = WebhookHandler::new(services.reconciler.clone());

    let bodies: [&[u8]; 6] = [
        b"",
        b"{",
        b"[]",
        br#"{"type":"payment"}"#,
        br#"{"type":"payment","data":{"id":null}}"#,
        br#"{"type":"plan","data":{"id":"1"}}"#,
    ];
    for body in bodies {
        assert_eq!(handler.handle(body).await, WebhookAck::Ignored);
    }
}
