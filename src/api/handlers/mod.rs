pub mod billing;
pub mod health;
pub mod ledger;
pub mod shares;
