mod common;

use common::*;
use drive_share_backend::api::error::AppError;
use drive_share_backend::entities::{file_entry_models, prelude::*, transactions};
use drive_share_backend::services::payments::PaymentProcessor;
use sea_orm::{EntityTrait, PaginatorTrait};
use std::sync::atomic::Ordering;

struct Purchase {
    ctx: TestContext,
    owner_id: String,
    buyer_id: String,
    entry_id: String,
    association_id: String,
}

impl Purchase {
    fn reference(&self) -> (&str, &str) {
        (&self.entry_id, &self.buyer_id)
    }
}

async fn premium_purchase(price: i64) -> Purchase {
    let ctx = setup_context(test_config()).await;
    let owner = create_user(&ctx.db, "seller@example.com").await;
    let buyer = create_user(&ctx.db, "buyer@example.com").await;
    let entry = create_file(&ctx.db, &owner, None, "masterclass.mp4").await;
    let association = grant_premium(&ctx.db, &entry, &buyer, price).await;

    Purchase {
        owner_id: owner.id,
        buyer_id: buyer.id,
        entry_id: entry.id,
        association_id: association.id,
        ctx,
    }
}

async fn owner_balance(p: &Purchase) -> i64 {
    Users::find_by_id(p.owner_id.clone())
        .one(&p.ctx.db)
        .await
        .unwrap()
        .unwrap()
        .balance
}

async fn is_paid(p: &Purchase) -> bool {
    FileEntryModels::find_by_id(p.association_id.clone())
        .one(&p.ctx.db)
        .await
        .unwrap()
        .map(|m: file_entry_models::Model| m.paid)
        .unwrap()
}

#[tokio::test]
async fn test_stripe_settlement_credits_net_of_fee() {
    let p = premium_purchase(1000).await;
    p.ctx.stripe.add_payment("pi_paid", "succeeded", 1000, "usd", p.reference());

    let settlement = p
        .ctx
        .state
        .settlement
        .settle(PaymentProcessor::Stripe, "pi_paid", &p.entry_id, &p.buyer_id)
        .await
        .unwrap();

    // 10% platform fee
    assert_eq!(settlement.amount, 900);
    assert!(!settlement.already_settled);
    assert_eq!(owner_balance(&p).await, 900);
    assert!(is_paid(&p).await);

    let txn = Transactions::find().one(&p.ctx.db).await.unwrap().unwrap();
    assert_eq!(txn.user_id, p.owner_id);
    assert_eq!(txn.model_id.as_deref(), Some(p.buyer_id.as_str()));
    assert_eq!(txn.kind, transactions::TYPE_ADD);
    assert_eq!(txn.payment_processor, "stripe");
    assert_eq!(txn.transaction_id, "pi_paid");
    assert_eq!(txn.amount, 900);
}

#[tokio::test]
async fn test_fee_rounds_half_away_from_zero() {
    // 10% of 1005 is 100.5, rounded to 101
    let p = premium_purchase(1005).await;
    p.ctx.paypal.add_payment("ORDER1", "COMPLETED", 1005, "USD", p.reference());

    let settlement = p
        .ctx
        .state
        .settlement
        .settle(PaymentProcessor::Paypal, "ORDER1", &p.entry_id, &p.buyer_id)
        .await
        .unwrap();

    assert_eq!(settlement.amount, 904);
    assert_eq!(owner_balance(&p).await, 904);
}

#[tokio::test]
async fn test_incomplete_payment_mutates_nothing() {
    let p = premium_purchase(1000).await;
    p.ctx.stripe.add_payment(
        "pi_pending",
        "requires_payment_method",
        1000,
        "usd",
        p.reference(),
    );
    p.ctx.paypal.add_payment("ORDER2", "APPROVED", 1000, "USD", p.reference());

    let stripe = p
        .ctx
        .state
        .settlement
        .settle(PaymentProcessor::Stripe, "pi_pending", &p.entry_id, &p.buyer_id)
        .await;
    assert!(matches!(stripe, Err(AppError::PaymentRequired(_))));

    let paypal = p
        .ctx
        .state
        .settlement
        .settle(PaymentProcessor::Paypal, "ORDER2", &p.entry_id, &p.buyer_id)
        .await;
    assert!(matches!(paypal, Err(AppError::PaymentRequired(_))));

    assert_eq!(owner_balance(&p).await, 0);
    assert!(!is_paid(&p).await);
    assert_eq!(Transactions::find().count(&p.ctx.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_underpaid_or_wrong_currency_is_rejected() {
    let p = premium_purchase(1000).await;
    p.ctx.stripe.add_payment("pi_cheap", "succeeded", 500, "usd", p.reference());
    p.ctx.stripe.add_payment("pi_euro", "succeeded", 1000, "eur", p.reference());

    for id in ["pi_cheap", "pi_euro"] {
        let result = p
            .ctx
            .state
            .settlement
            .settle(PaymentProcessor::Stripe, id, &p.entry_id, &p.buyer_id)
            .await;
        assert!(matches!(result, Err(AppError::PaymentRequired(_))));
    }

    assert_eq!(owner_balance(&p).await, 0);
    assert_eq!(Transactions::find().count(&p.ctx.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_replayed_settlement_credits_once() {
    let p = premium_purchase(2000).await;
    p.ctx.stripe.add_payment("pi_once", "succeeded", 2000, "usd", p.reference());

    let service = &p.ctx.state.settlement;
    let first = service
        .settle(PaymentProcessor::Stripe, "pi_once", &p.entry_id, &p.buyer_id)
        .await
        .unwrap();
    let second = service
        .settle(PaymentProcessor::Stripe, "pi_once", &p.entry_id, &p.buyer_id)
        .await
        .unwrap();

    assert!(!first.already_settled);
    assert!(second.already_settled);
    assert_eq!(first.amount, second.amount);
    assert_eq!(owner_balance(&p).await, 1800);
    assert_eq!(Transactions::find().count(&p.ctx.db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_confirmations_credit_once() {
    let p = premium_purchase(2000).await;
    p.ctx.stripe.add_payment("pi_race", "succeeded", 2000, "usd", p.reference());

    let service = p.ctx.state.settlement.clone();
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let entry_id = p.entry_id.clone();
            let buyer_id = p.buyer_id.clone();
            tokio::spawn(async move {
                service
                    .settle(PaymentProcessor::Stripe, "pi_race", &entry_id, &buyer_id)
                    .await
            })
        })
        .collect();

    let mut fresh = 0;
    for task in tasks {
        let settlement = task.await.unwrap().unwrap();
        if !settlement.already_settled {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1);
    assert_eq!(owner_balance(&p).await, 1800);
    assert_eq!(Transactions::find().count(&p.ctx.db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_non_premium_entry_cannot_be_settled() {
    let ctx = setup_context(test_config()).await;
    let owner = create_user(&ctx.db, "seller@example.com").await;
    let stranger = create_user(&ctx.db, "stranger@example.com").await;
    let entry = create_file(&ctx.db, &owner, None, "free.txt").await;
    ctx.stripe
        .add_payment("pi_free", "succeeded", 1000, "usd", (&entry.id, &stranger.id));

    let result = ctx
        .state
        .settlement
        .settle(PaymentProcessor::Stripe, "pi_free", &entry.id, &stranger.id)
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(Transactions::find().count(&ctx.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_payment_intent_amount_comes_from_price() {
    let p = premium_purchase(2500).await;

    let intent = p
        .ctx
        .state
        .settlement
        .create_payment_intent(&p.buyer_id, &p.entry_id)
        .await
        .unwrap();

    assert_eq!(intent.amount, 2500);
    assert_eq!(intent.currency, "usd");
    assert_eq!(
        p.ctx.stripe.intents.lock().unwrap().as_slice(),
        &[(2500, "usd".to_string())]
    );
}

#[tokio::test]
async fn test_payment_intent_below_minimum_is_refused() {
    let p = premium_purchase(30).await;

    let result = p
        .ctx
        .state
        .settlement
        .create_payment_intent(&p.buyer_id, &p.entry_id)
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert!(p.ctx.stripe.intents.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_payment_is_a_gateway_error() {
    let p = premium_purchase(1000).await;

    let result = p
        .ctx
        .state
        .settlement
        .settle(PaymentProcessor::Stripe, "pi_missing", &p.entry_id, &p.buyer_id)
        .await;

    assert!(matches!(result, Err(AppError::Gateway(_))));
    assert_eq!(p.ctx.stripe.retrieve_calls.load(Ordering::SeqCst), 1);
    assert_eq!(owner_balance(&p).await, 0);
}

#[tokio::test]
async fn test_payment_for_another_purchase_is_rejected() {
    let p = premium_purchase(1000).await;
    let other_owner = create_user(&p.ctx.db, "other-seller@example.com").await;
    let other_entry = create_file(&p.ctx.db, &other_owner, None, "cheap.pdf").await;
    let other_buyer = create_user(&p.ctx.db, "other-buyer@example.com").await;
    grant_premium(&p.ctx.db, &other_entry, &other_buyer, 2000).await;

    // A large intent made for a different entry and buyer
    p.ctx.stripe.add_payment(
        "pi_elsewhere",
        "succeeded",
        5000,
        "usd",
        (&other_entry.id, &other_buyer.id),
    );

    let result = p
        .ctx
        .state
        .settlement
        .settle(PaymentProcessor::Stripe, "pi_elsewhere", &p.entry_id, &p.buyer_id)
        .await;
    assert!(matches!(result, Err(AppError::PaymentRequired(_))));
    assert_eq!(owner_balance(&p).await, 0);
    assert!(!is_paid(&p).await);

    // The rightful purchase still settles afterwards
    let settlement = p
        .ctx
        .state
        .settlement
        .settle(
            PaymentProcessor::Stripe,
            "pi_elsewhere",
            &other_entry.id,
            &other_buyer.id,
        )
        .await
        .unwrap();
    assert!(!settlement.already_settled);
    assert_eq!(settlement.amount, 1800);
}

#[tokio::test]
async fn test_recorded_payment_is_not_disclosed_to_other_users() {
    let p = premium_purchase(1000).await;
    p.ctx
        .stripe
        .add_payment("pi_private", "succeeded", 1000, "usd", p.reference());
    p.ctx
        .state
        .settlement
        .settle(PaymentProcessor::Stripe, "pi_private", &p.entry_id, &p.buyer_id)
        .await
        .unwrap();

    // No association on the entry
    let outsider = create_user(&p.ctx.db, "outsider@example.com").await;
    let result = p
        .ctx
        .state
        .settlement
        .settle(PaymentProcessor::Stripe, "pi_private", &p.entry_id, &outsider.id)
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    // A buyer of another entry replaying someone else's payment id
    let other_entry = create_file(&p.ctx.db, &outsider, None, "own.mp4").await;
    let other_buyer = create_user(&p.ctx.db, "curious@example.com").await;
    grant_premium(&p.ctx.db, &other_entry, &other_buyer, 1000).await;
    let result = p
        .ctx
        .state
        .settlement
        .settle(PaymentProcessor::Stripe, "pi_private", &other_entry.id, &other_buyer.id)
        .await;
    assert!(matches!(result, Err(AppError::PaymentRequired(_))));

    assert_eq!(owner_balance(&p).await, 900);
    assert_eq!(Transactions::find().count(&p.ctx.db).await.unwrap(), 1);
}
