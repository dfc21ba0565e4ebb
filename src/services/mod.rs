pub mod audit;
pub mod ledger;
pub mod notifications;
pub mod payments;
pub mod settlement;
pub mod share_service;
pub mod withdraw;
pub mod worker;
