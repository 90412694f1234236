mod common;

use common::{gateway_status, notification, Platform, SERVER_KEY};
use futures::future::join_all;
use quiz_platform_core::domain::{AuditFilter, PurchaseTarget, Role, TransactionStatus};
use quiz_platform_core::CoreError;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn concurrent_duplicate_intents_create_one_pending_transaction() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let avatar = platform.avatar("Fox", dec!(15000.00)).await;

    let attempts = (0..8).map(|_| {
        platform
            .payments
            .create_purchase_intent(&student, PurchaseTarget::Item(avatar.clone()))
    });
    let results = join_all(attempts).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::Conflict(_))))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(platform.gateway.checkouts.load(Ordering::SeqCst), 1);

    let txs = platform.payments.list_transactions(&student).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, TransactionStatus::Pending);
    assert_eq!(txs[0].id, "TR000001");
}

#[tokio::test]
async fn intent_returns_checkout_for_the_persisted_transaction() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;

    let intent = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap();

    assert_eq!(intent.transaction.amount, dec!(49000.00));
    assert_eq!(intent.transaction.status, TransactionStatus::Pending);
    assert_eq!(intent.checkout.token, format!("snap-{}", intent.transaction.id));
}

#[tokio::test]
async fn reconcile_is_idempotent_and_grants_once() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let avatar = platform.avatar("Fox", dec!(15000.00)).await;

    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Item(avatar.clone()))
        .await
        .unwrap()
        .transaction;

    let report = gateway_status(&tx.id, "settlement", "15000.00");
    let first = platform.payments.reconcile_payment(&tx.id, &report).await.unwrap();
    let second = platform.payments.reconcile_payment(&tx.id, &report).await.unwrap();
    let late_failure = gateway_status(&tx.id, "expire", "15000.00");
    let third = platform
        .payments
        .reconcile_payment(&tx.id, &late_failure)
        .await
        .unwrap();

    assert_eq!(first, TransactionStatus::Success);
    assert_eq!(second, TransactionStatus::Success);
    assert_eq!(third, TransactionStatus::Success);

    let owned = platform.shop.list_owned_avatars(&student).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].avatar_id, avatar);

    let settled = platform
        .audit
        .search(
            &platform.admin("Root").await,
            AuditFilter {
                action: Some("transaction.settle".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(settled.len(), 1);
}

#[tokio::test]
async fn concurrent_reconciles_grant_subscription_once() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    let report = gateway_status(&tx.id, "capture", "49000.00");
    let results = join_all((0..5).map(|_| platform.payments.reconcile_payment(&tx.id, &report))).await;
    assert!(results
        .iter()
        .all(|r| matches!(r, Ok(TransactionStatus::Success))));

    let user = platform.users.current_user(&student.id).await.unwrap();
    assert_eq!(user.subscription_id, "SB002");
    let stored = platform.store_transaction(&tx.id).await;
    assert_eq!(stored.payment_method.as_deref(), Some("bank_transfer"));
}

#[tokio::test]
async fn failed_report_settles_without_entitlement() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    let status = platform
        .payments
        .reconcile_payment(&tx.id, &gateway_status(&tx.id, "deny", "49000.00"))
        .await
        .unwrap();
    assert_eq!(status, TransactionStatus::Failed);

    let user = platform.users.current_user(&student.id).await.unwrap();
    assert_eq!(user.subscription_id, "SB001");

    // A failed purchase does not block a new attempt.
    assert!(platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .is_ok());
}

#[tokio::test]
async fn pending_report_changes_nothing() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    let status = platform
        .payments
        .reconcile_payment(&tx.id, &gateway_status(&tx.id, "pending", "49000.00"))
        .await
        .unwrap();
    assert_eq!(status, TransactionStatus::Pending);
    assert_eq!(platform.store_transaction(&tx.id).await.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected_without_effect() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    let forged = notification(gateway_status(&tx.id, "settlement", "49000.00"), "wrong-key");
    let result = platform.payments.handle_payment_webhook(&forged).await;
    assert!(matches!(result, Err(CoreError::SignatureInvalid)));

    assert_eq!(platform.store_transaction(&tx.id).await.status, TransactionStatus::Pending);
    let user = platform.users.current_user(&student.id).await.unwrap();
    assert_eq!(user.subscription_id, "SB001");
}

#[tokio::test]
async fn webhook_with_valid_signature_settles_and_grants() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    let signed = notification(gateway_status(&tx.id, "settlement", "49000.00"), SERVER_KEY);
    let status = platform.payments.handle_payment_webhook(&signed).await.unwrap();
    assert_eq!(status, TransactionStatus::Success);

    // Gateways redeliver; the second delivery is a no-op.
    let again = platform.payments.handle_payment_webhook(&signed).await.unwrap();
    assert_eq!(again, TransactionStatus::Success);

    let user = platform.users.current_user(&student.id).await.unwrap();
    assert_eq!(user.subscription_id, "SB002");
}

#[tokio::test]
async fn webhook_with_mismatched_amount_is_rejected() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    let signed = notification(gateway_status(&tx.id, "settlement", "1000.00"), SERVER_KEY);
    let result = platform.payments.handle_payment_webhook(&signed).await;
    assert!(matches!(result, Err(CoreError::Validation(_))));
    assert_eq!(platform.store_transaction(&tx.id).await.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn webhook_for_unknown_order_is_not_found() {
    let platform = Platform::new();
    let signed = notification(gateway_status("TR999999", "settlement", "10.00"), SERVER_KEY);
    let result = platform.payments.handle_payment_webhook(&signed).await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn gateway_failure_on_create_marks_transaction_failed() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    platform.gateway.fail_checkout.store(true, Ordering::SeqCst);

    let result = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await;
    assert!(matches!(result, Err(CoreError::UpstreamUnavailable(_))));

    let txs = platform.payments.list_transactions(&student).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, TransactionStatus::Failed);

    platform.gateway.fail_checkout.store(false, Ordering::SeqCst);
    let retry = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap();
    assert_eq!(retry.transaction.id, "TR000002");
}

#[tokio::test]
async fn force_poll_survives_gateway_outage() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    platform.gateway.fail_status.store(true, Ordering::SeqCst);
    let status = platform.payments.force_poll_payment(&student, &tx.id).await.unwrap();
    assert_eq!(status, TransactionStatus::Pending);

    platform.gateway.fail_status.store(false, Ordering::SeqCst);
    platform
        .gateway
        .report(gateway_status(&tx.id, "settlement", "49000.00"));
    let status = platform.payments.force_poll_payment(&student, &tx.id).await.unwrap();
    assert_eq!(status, TransactionStatus::Success);

    // Terminal transactions are not polled again.
    let polls = platform.gateway.polls.load(Ordering::SeqCst);
    platform.payments.force_poll_payment(&student, &tx.id).await.unwrap();
    assert_eq!(platform.gateway.polls.load(Ordering::SeqCst), polls);
}

#[tokio::test]
async fn check_payment_reconciles_on_read() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let avatar = platform.avatar("Owl", dec!(25000.00)).await;
    let tx = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Item(avatar.clone()))
        .await
        .unwrap()
        .transaction;

    let unchanged = platform.payments.check_payment(&student, &tx.id).await.unwrap();
    assert_eq!(unchanged.status, TransactionStatus::Pending);

    platform
        .gateway
        .report(gateway_status(&tx.id, "capture", "25000.00"));
    let settled = platform.payments.check_payment(&student, &tx.id).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Success);
    assert_eq!(settled.payment_method.as_deref(), Some("bank_transfer"));

    let owned = platform.shop.list_owned_avatars(&student).await.unwrap();
    assert_eq!(owned.len(), 1);
}

#[tokio::test]
async fn only_the_buyer_or_an_admin_can_read_a_transaction() {
    let platform = Platform::new();
    let buyer = platform.register("Budi", Role::Student).await;
    let other = platform.register("Sari", Role::Student).await;
    let admin = platform.admin("Root").await;
    let tx = platform
        .payments
        .create_purchase_intent(&buyer, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    let denied = platform.payments.check_payment(&other, &tx.id).await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));
    assert!(platform.payments.check_payment(&admin, &tx.id).await.is_ok());
}

#[tokio::test]
async fn cancel_purchase_is_owner_only_and_pending_only() {
    let platform = Platform::new();
    let buyer = platform.register("Budi", Role::Student).await;
    let other = platform.register("Sari", Role::Student).await;
    let tx = platform
        .payments
        .create_purchase_intent(&buyer, PurchaseTarget::Subscription("SB002".to_string()))
        .await
        .unwrap()
        .transaction;

    let denied = platform.payments.cancel_purchase(&other, &tx.id).await;
    assert!(matches!(denied, Err(CoreError::Forbidden(_))));

    platform.gateway.fail_cancel.store(true, Ordering::SeqCst);
    let cancelled = platform.payments.cancel_purchase(&buyer, &tx.id).await.unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Failed);
    assert_eq!(platform.gateway.cancels.load(Ordering::SeqCst), 1);

    let again = platform.payments.cancel_purchase(&buyer, &tx.id).await;
    assert!(matches!(again, Err(CoreError::Conflict(_))));

    // A settlement arriving after the cancellation is ignored.
    let late = platform
        .payments
        .reconcile_payment(&tx.id, &gateway_status(&tx.id, "settlement", "49000.00"))
        .await
        .unwrap();
    assert_eq!(late, TransactionStatus::Failed);
    let user = platform.users.current_user(&buyer.id).await.unwrap();
    assert_eq!(user.subscription_id, "SB001");
}

#[tokio::test]
async fn owned_or_current_targets_are_rejected_before_any_write() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;

    let current = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Subscription("SB001".to_string()))
        .await;
    assert!(matches!(current, Err(CoreError::Conflict(_))));

    let missing = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Item("AV404".to_string()))
        .await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));

    let free = platform.avatar("Pebble", dec!(0.00)).await;
    let free = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Item(free))
        .await;
    assert!(matches!(free, Err(CoreError::Validation(_))));

    assert!(platform.payments.list_transactions(&student).await.unwrap().is_empty());
    assert_eq!(platform.gateway.checkouts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fractional_prices_are_never_charged() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let owl = platform.avatar("Owl", dec!(15000.50)).await;

    let result = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Item(owl))
        .await;
    assert!(matches!(result, Err(CoreError::Validation(_))));
    assert!(platform.payments.list_transactions(&student).await.unwrap().is_empty());
    assert_eq!(platform.gateway.checkouts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn whole_price_avatar_settles_through_the_webhook() {
    let platform = Platform::new();
    let student = platform.register("Budi", Role::Student).await;
    let owl = platform.avatar("Owl", dec!(15000)).await;

    let intent = platform
        .payments
        .create_purchase_intent(&student, PurchaseTarget::Item(owl.clone()))
        .await
        .unwrap();
    let delivered = notification(
        gateway_status(&intent.transaction.id, "settlement", "15000.00"),
        SERVER_KEY,
    );
    let status = platform
        .payments
        .handle_payment_webhook(&delivered)
        .await
        .unwrap();
    assert_eq!(status, TransactionStatus::Success);
    let owned = platform.shop.list_owned_avatars(&student).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].avatar_id, owl);
}
