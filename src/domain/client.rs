//! Client entity — the prepaid wallet holder.

/// A mobile/PWA client with a prepaid, non-negative balance.
///
/// `balance` is a minor-unit integer (cents, tiyin, ...); all mutations go
/// through atomic conditional SQL updates in
/// `infrastructure::db::repositories::client_repository` — no component
/// holds long-lived in-memory balance state (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub balance: i64,
    pub currency: String,
}
