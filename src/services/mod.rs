pub mod assembler;
pub mod cart;
pub mod checkout;
pub mod export;
pub mod gateway;
pub mod ledger;
pub mod pricing;
pub mod signature;
pub mod status;
