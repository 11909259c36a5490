//! Identity data: users, linked accounts, sessions, verification tokens and
//! authenticators, stored in Postgres.

pub mod adapter;
pub mod models;
pub mod schema;

pub use adapter::{AdapterError, AdapterResult};
pub use models::{
    Account, AccountType, Authenticator, NewAccount, NewUser, Session, User, UserUpdate,
    VerificationToken,
};
