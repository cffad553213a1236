//! Bill creation, classification and the terminal transitions.

mod common;

use common::*;

use salon_billing::{BillingError, RefundRequest};
use salon_core::{
    AuditAction, AuditOutcome, BillState, BillStatus, DiscountTerms, SalesType, UsageType,
    MAX_LINE_QUANTITY, MAX_UNIT_PRICE_CENTS,
};
use salon_db::BillFilter;

#[tokio::test]
async fn test_sales_type_follows_lines() {
    let core = core().await;

    let service = core
        .create_bill(bill_input(None, vec![service_line("svc-cut", 50_000, 1)]), &cashier())
        .await
        .unwrap();
    let product = core
        .create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 1)]), &cashier())
        .await
        .unwrap();
    let mixed = core
        .create_bill(
            bill_input(
                None,
                vec![service_line("svc-cut", 50_000, 1), product_line("prod-wax", 20_000, 1)],
            ),
            &cashier(),
        )
        .await
        .unwrap();

    assert_eq!(service.sales_type, SalesType::Service);
    assert_eq!(product.sales_type, SalesType::Product);
    assert_eq!(mixed.sales_type, SalesType::Mixed);
}

#[tokio::test]
async fn test_bill_is_persisted_paid_with_totals_and_number() {
    let core = core().await;

    let mut input = bill_input(Some("client-ana"), vec![product_line("prod-serum", 25_000, 2)]);
    input.discount = DiscountTerms::Percentage { bps: 1_000 };
    input.tax_rate_bps = 1_200;

    let receipt = core.create_bill(input, &cashier()).await.unwrap();
    let bill = core.get_bill_by_id(&receipt.bill_id).await.unwrap();

    assert_eq!(bill.status(), BillStatus::Paid);
    assert_eq!(bill.subtotal_cents, 50_000);
    assert_eq!(bill.discount_cents, 5_000);
    assert_eq!(bill.tax_cents, 5_400);
    assert_eq!(bill.total_cents, 50_400);
    assert_eq!(receipt.total_cents, 50_400);
    assert_eq!(bill.items.len(), 1);
    assert_eq!(bill.items[0].line_total_cents, 50_000);
    assert_eq!(bill.created_by, "staff-cashier");

    assert!(bill.bill_number.ends_with("-BRAN-0001"));
    assert_eq!(bill.bill_number, receipt.bill_number);

    let second = core
        .create_bill(bill_input(None, vec![product_line("prod-serum", 25_000, 1)]), &cashier())
        .await
        .unwrap();
    assert!(second.bill_number.ends_with("-BRAN-0002"));
}

#[tokio::test]
async fn test_invalid_input_writes_nothing() {
    let core = core().await;

    let empty = core.create_bill(bill_input(None, vec![]), &cashier()).await;
    assert!(matches!(empty, Err(BillingError::Validation(_))));

    let mut no_staff = service_line("svc-cut", 50_000, 1);
    no_staff.staff_id = None;
    let missing_staff = core
        .create_bill(bill_input(None, vec![no_staff]), &cashier())
        .await;
    assert!(matches!(missing_staff, Err(BillingError::Validation(_))));

    let mut guest_redeem = bill_input(None, vec![product_line("prod-wax", 20_000, 1)]);
    guest_redeem.loyalty_points_to_redeem = 5;
    let result = core.create_bill(guest_redeem, &cashier()).await;
    assert!(matches!(result, Err(BillingError::Validation(_))));

    let bills = core
        .get_bills_by_branch(BRANCH, &BillFilter::default())
        .await
        .unwrap();
    assert!(bills.is_empty());
}

#[tokio::test]
async fn test_amounts_that_would_overflow_are_rejected() {
    let core = core().await;

    let huge = core
        .create_bill(
            bill_input(
                None,
                vec![product_line("prod-gold", i64::MAX, 1), product_line("prod-wax", 1, 1)],
            ),
            &cashier(),
        )
        .await;
    assert!(matches!(huge, Err(BillingError::Validation(_))));

    let over_cap = core
        .create_bill(
            bill_input(None, vec![product_line("prod-gold", MAX_UNIT_PRICE_CENTS + 1, 1)]),
            &cashier(),
        )
        .await;
    assert!(matches!(over_cap, Err(BillingError::Validation(_))));

    let mut redeem_all = bill_input(Some("client-ana"), vec![product_line("prod-wax", 20_000, 1)]);
    redeem_all.loyalty_points_to_redeem = i64::MAX / 50;
    let result = core.create_bill(redeem_all, &cashier()).await;
    assert!(matches!(result, Err(BillingError::Validation(_))));

    assert!(core
        .get_bills_by_branch(BRANCH, &BillFilter::default())
        .await
        .unwrap()
        .is_empty());

    // The largest line that passes validation still totals exactly
    let receipt = core
        .create_bill(
            bill_input(
                None,
                vec![product_line("prod-gold", MAX_UNIT_PRICE_CENTS, MAX_LINE_QUANTITY)],
            ),
            &cashier(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.total_cents, MAX_UNIT_PRICE_CENTS * MAX_LINE_QUANTITY);
}

#[tokio::test]
async fn test_branches_sharing_a_code_keep_their_own_numbers() {
    let core = core().await;
    let sale_at = |branch: &str| {
        let mut input = bill_input(None, vec![service_line("svc-cut", 50_000, 1)]);
        input.branch_id = branch.to_string();
        input
    };

    let a = core.create_bill(sale_at("salon-a"), &cashier()).await.unwrap();
    let b = core.create_bill(sale_at("salon-b"), &cashier()).await.unwrap();
    let a2 = core.create_bill(sale_at("salon-a"), &cashier()).await.unwrap();

    assert!(a.bill_number.ends_with("-SALO-0001"));
    assert!(b.bill_number.ends_with("-SALO-0001"));
    assert_eq!(a.bill_number, b.bill_number);
    assert!(a2.bill_number.ends_with("-SALO-0002"));

    let at_b = core
        .get_bills_by_branch("salon-b", &BillFilter::default())
        .await
        .unwrap();
    assert_eq!(at_b.len(), 1);
    assert_eq!(at_b[0].id, b.bill_id);
}

#[tokio::test]
async fn test_unknown_bill_is_not_found() {
    let core = core().await;
    let err = core.get_bill_by_id("no-such-bill").await.unwrap_err();
    assert!(matches!(err, BillingError::BillNotFound(_)));
}

#[tokio::test]
async fn test_refund_defaults_to_full_total() {
    let core = core().await;
    let receipt = core
        .create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 2)]), &cashier())
        .await
        .unwrap();

    let bill = core
        .refund_bill(
            &receipt.bill_id,
            RefundRequest {
                amount_cents: None,
                reason: "Allergic reaction".to_string(),
            },
            &manager(),
        )
        .await
        .unwrap();

    assert_eq!(bill.status(), BillStatus::Refunded);
    match bill.state {
        BillState::Refunded(details) => {
            assert_eq!(details.amount_cents, 40_000);
            assert_eq!(details.approved_by, "staff-manager");
        }
        other => panic!("expected refunded, got {other:?}"),
    }

    let stored = core.get_bill_by_id(&receipt.bill_id).await.unwrap();
    assert_eq!(stored.status(), BillStatus::Refunded);
}

#[tokio::test]
async fn test_complimentary_bill_refunds_zero() {
    let core = core().await;
    let receipt = core
        .create_bill(bill_input(None, vec![product_line("prod-comp", 0, 1)]), &cashier())
        .await
        .unwrap();
    assert_eq!(receipt.total_cents, 0);

    let overpaid = core
        .refund_bill(
            &receipt.bill_id,
            RefundRequest {
                amount_cents: Some(1),
                reason: "Goodwill".to_string(),
            },
            &manager(),
        )
        .await
        .unwrap_err();
    assert!(matches!(overpaid, BillingError::Validation(_)));

    let bill = core
        .refund_bill(
            &receipt.bill_id,
            RefundRequest {
                amount_cents: None,
                reason: "Goodwill".to_string(),
            },
            &manager(),
        )
        .await
        .unwrap();

    assert_eq!(bill.status(), BillStatus::Refunded);
    match bill.state {
        BillState::Refunded(details) => assert_eq!(details.amount_cents, 0),
        other => panic!("expected refunded, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refund_above_total_is_rejected() {
    let core = core().await;
    let receipt = core
        .create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 1)]), &cashier())
        .await
        .unwrap();

    let err = core
        .refund_bill(
            &receipt.bill_id,
            RefundRequest {
                amount_cents: Some(20_001),
                reason: "Overcharge".to_string(),
            },
            &manager(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));

    let stored = core.get_bill_by_id(&receipt.bill_id).await.unwrap();
    assert_eq!(stored.status(), BillStatus::Paid);
}

#[tokio::test]
async fn test_second_terminal_transition_is_already_finalized() {
    let core = core().await;
    let receipt = core
        .create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 1)]), &cashier())
        .await
        .unwrap();
    let refund = || RefundRequest {
        amount_cents: None,
        reason: "Customer request".to_string(),
    };

    core.refund_bill(&receipt.bill_id, refund(), &manager())
        .await
        .unwrap();

    let again = core
        .refund_bill(&receipt.bill_id, refund(), &manager())
        .await
        .unwrap_err();
    assert!(matches!(
        again,
        BillingError::AlreadyFinalized {
            status: BillStatus::Refunded,
            ..
        }
    ));

    // No Refunded -> Voided edge either
    let void = core
        .void_bill(&receipt.bill_id, "Keyed twice", &manager(), Some(witness()))
        .await
        .unwrap_err();
    assert!(matches!(void, BillingError::AlreadyFinalized { .. }));

    let stored = core.get_bill_by_id(&receipt.bill_id).await.unwrap();
    assert_eq!(stored.status(), BillStatus::Refunded);
}

#[tokio::test]
async fn test_void_requires_witness() {
    let core = core().await;
    let receipt = core
        .create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 1)]), &cashier())
        .await
        .unwrap();

    let err = core
        .void_bill(&receipt.bill_id, "Keyed twice", &manager(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::WitnessRequired { .. }));

    // The approver cannot witness their own void
    let mut self_witness = witness();
    self_witness.id = manager().id;
    let err = core
        .void_bill(&receipt.bill_id, "Keyed twice", &manager(), Some(self_witness))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::WitnessRequired { .. }));

    // Witness is checked before the bill is even looked up
    let err = core
        .void_bill("no-such-bill", "Keyed twice", &manager(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::WitnessRequired { .. }));

    let stored = core.get_bill_by_id(&receipt.bill_id).await.unwrap();
    assert_eq!(stored.status(), BillStatus::Paid);
}

#[tokio::test]
async fn test_void_with_witness_succeeds_once() {
    let core = core().await;
    let receipt = core
        .create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 1)]), &cashier())
        .await
        .unwrap();

    let bill = core
        .void_bill(&receipt.bill_id, "Keyed twice", &manager(), Some(witness()))
        .await
        .unwrap();

    match &bill.state {
        BillState::Voided(details) => {
            assert_eq!(details.witness, witness());
            assert_eq!(details.reason, "Keyed twice");
            assert_eq!(details.approved_by, "staff-manager");
        }
        other => panic!("expected voided, got {other:?}"),
    }

    let again = core
        .void_bill(&receipt.bill_id, "Keyed twice", &manager(), Some(witness()))
        .await
        .unwrap_err();
    assert!(matches!(
        again,
        BillingError::AlreadyFinalized {
            status: BillStatus::Voided,
            ..
        }
    ));
}

#[tokio::test]
async fn test_refund_does_not_reverse_stock_or_points() {
    let core = core().await;
    let batch = receive(&core, "prod-wax", UsageType::Otc, 1, 10).await;

    let receipt = core
        .create_bill(
            bill_input(Some("client-ana"), vec![product_line("prod-wax", 1_000_000, 3)]),
            &cashier(),
        )
        .await
        .unwrap();
    let points = core.get_loyalty_points("client-ana", BRANCH).await.unwrap();
    assert_eq!(points, 300);

    core.refund_bill(
        &receipt.bill_id,
        RefundRequest {
            amount_cents: None,
            reason: "Damaged".to_string(),
        },
        &manager(),
    )
    .await
    .unwrap();

    assert_eq!(remaining(&core, &batch.id).await, 7);
    assert_eq!(core.get_loyalty_points("client-ana", BRANCH).await.unwrap(), 300);
}

#[tokio::test]
async fn test_list_by_branch_filters_on_status() {
    let core = core().await;
    let first = core
        .create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 1)]), &cashier())
        .await
        .unwrap();
    core.create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 1)]), &cashier())
        .await
        .unwrap();
    core.void_bill(&first.bill_id, "Test sale", &manager(), Some(witness()))
        .await
        .unwrap();

    let all = core
        .get_bills_by_branch(BRANCH, &BillFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let voided = core
        .get_bills_by_branch(
            BRANCH,
            &BillFilter {
                status: Some(BillStatus::Voided),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(voided.len(), 1);
    assert_eq!(voided[0].id, first.bill_id);

    let elsewhere = core
        .get_bills_by_branch(OTHER_BRANCH, &BillFilter::default())
        .await
        .unwrap();
    assert!(elsewhere.is_empty());
}

#[tokio::test]
async fn test_lifecycle_is_audited() {
    let core = core().await;
    let receipt = core
        .create_bill(bill_input(None, vec![product_line("prod-wax", 20_000, 1)]), &cashier())
        .await
        .unwrap();
    core.void_bill(&receipt.bill_id, "Keyed twice", &manager(), Some(witness()))
        .await
        .unwrap();
    let _ = core
        .void_bill(&receipt.bill_id, "Keyed twice", &manager(), Some(witness()))
        .await;

    let entries = core.audit_for_bill(&receipt.bill_id).await.unwrap();
    let actions: Vec<AuditAction> = entries.iter().map(|e| e.action).collect();

    assert_eq!(actions.first(), Some(&AuditAction::BillCreated));
    assert!(actions.contains(&AuditAction::StockDeducted));

    let voids: Vec<_> = entries
        .iter()
        .filter(|e| e.action == AuditAction::BillVoided)
        .collect();
    assert_eq!(voids.len(), 2);
    assert_eq!(voids[0].outcome, AuditOutcome::Success);
    assert_eq!(voids[0].performed_by, "staff-manager");
    assert_eq!(voids[1].outcome, AuditOutcome::Failed);
}
