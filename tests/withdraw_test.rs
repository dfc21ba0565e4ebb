mod common;

use common::*;
use drive_share_backend::api::error::AppError;
use drive_share_backend::entities::{prelude::*, transactions};
use drive_share_backend::services::withdraw::STATUS_WITHDRAWN;
use sea_orm::{EntityTrait, PaginatorTrait};
use std::sync::atomic::Ordering;

async fn balance_of(ctx: &TestContext, user_id: &str) -> i64 {
    Users::find_by_id(user_id.to_string())
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap()
        .balance
}

#[tokio::test]
async fn test_successful_withdraw_debits_once() {
    let ctx = setup_context(test_config()).await;
    let seller = create_user(&ctx.db, "seller@example.com").await;
    set_balance(&ctx.db, &seller, 4200, Some("acct_123")).await;

    let withdrawal = ctx.state.withdraw.withdraw(&seller.id).await.unwrap();

    assert_eq!(withdrawal.amount, 4200);
    assert_eq!(withdrawal.balance, 0);
    assert_eq!(balance_of(&ctx, &seller.id).await, 0);
    assert_eq!(
        ctx.payouts.transfers.lock().unwrap().as_slice(),
        &[(4200, "usd".to_string(), "acct_123".to_string())]
    );

    let records = Transactions::find().all(&ctx.db).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, transactions::TYPE_SUBTRACT);
    assert_eq!(records[0].status, STATUS_WITHDRAWN);
    assert_eq!(records[0].amount, 4200);
    assert_eq!(records[0].user_id, seller.id);
}

#[tokio::test]
async fn test_failed_transfer_leaves_balance_untouched() {
    let ctx = setup_context(test_config()).await;
    let seller = create_user(&ctx.db, "seller@example.com").await;
    set_balance(&ctx.db, &seller, 4200, Some("acct_123")).await;
    ctx.payouts.fail.store(true, Ordering::SeqCst);

    let result = ctx.state.withdraw.withdraw(&seller.id).await;

    assert!(matches!(result, Err(AppError::Gateway(_))));
    assert_eq!(balance_of(&ctx, &seller.id).await, 4200);
    assert_eq!(Transactions::find().count(&ctx.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_withdraw_guards() {
    let ctx = setup_context(test_config()).await;
    let empty = create_user(&ctx.db, "empty@example.com").await;
    set_balance(&ctx.db, &empty, 0, Some("acct_1")).await;
    let unconnected = create_user(&ctx.db, "unconnected@example.com").await;
    set_balance(&ctx.db, &unconnected, 500, None).await;

    assert!(matches!(
        ctx.state.withdraw.withdraw(&empty.id).await,
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        ctx.state.withdraw.withdraw(&unconnected.id).await,
        Err(AppError::BadRequest(_))
    ));
    assert!(ctx.payouts.transfers.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_withdrawals_transfer_once() {
    let ctx = setup_context(test_config()).await;
    let seller = create_user(&ctx.db, "seller@example.com").await;
    set_balance(&ctx.db, &seller, 1000, Some("acct_9")).await;

    let a = {
        let service = ctx.state.withdraw.clone();
        let id = seller.id.clone();
        tokio::spawn(async move { service.withdraw(&id).await })
    };
    let b = {
        let service = ctx.state.withdraw.clone();
        let id = seller.id.clone();
        tokio::spawn(async move { service.withdraw(&id).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(balance_of(&ctx, &seller.id).await, 0);
    assert_eq!(ctx.payouts.transfers.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_connect_creates_account_once_and_reset_clears_it() {
    let ctx = setup_context(test_config()).await;
    let seller = create_user(&ctx.db, "seller@example.com").await;

    let url = ctx.state.withdraw.connect_account(&seller.id).await.unwrap();
    assert_eq!(url, "https://connect.example.test/setup/acct_mock_1");

    // Second call reuses the stored account
    let again = ctx.state.withdraw.connect_account(&seller.id).await.unwrap();
    assert_eq!(again, url);
    assert_eq!(ctx.payouts.accounts_created.load(Ordering::SeqCst), 1);

    ctx.state.withdraw.reset_account(&seller.id).await.unwrap();
    let stored = Users::find_by_id(seller.id.clone())
        .one(&ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.stripe_account_id.is_none());
}
