mod account;
pub mod money;
mod statement;
mod store;
mod transaction;
pub mod validation;

pub use self::{
    account::AccountNo,
    statement::write_statement,
    store::{Registry, SeedPolicy, StoreError},
    transaction::Transaction,
};
