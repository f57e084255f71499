//! ClientRepository — typed operations over the `clients` table.
//!
//! `debit`/`credit` are the only mutators; both are atomic conditional
//! updates (`UPDATE ... WHERE balance >= :delta`), never read-modify-write
//! in application memory (spec.md §3, §5).

use async_trait::async_trait;

use crate::domain::Client;
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Client>>;

    /// `UPDATE clients SET balance = balance - :amount WHERE id = :id AND balance >= :amount`.
    /// Returns the post-debit balance, or `None` if the conditional update
    /// affected zero rows (insufficient funds).
    async fn debit(&self, id: &str, amount: i64) -> DomainResult<Option<i64>>;

    /// `UPDATE clients SET balance = balance + :amount WHERE id = :id`.
    /// Used for refunds and top-up credits; always succeeds if the client exists.
    async fn credit(&self, id: &str, amount: i64) -> DomainResult<i64>;
}
