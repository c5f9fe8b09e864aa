use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletReceipt {
    pub reference: String,
    pub user_id: Uuid,
    pub amount: u64,
    /// Set when the idempotency reference had already been credited.
    pub duplicate: bool,
}

#[async_trait]
pub trait Wallet: Send + Sync {
    async fn credit(
        &self,
        user_id: Uuid,
        amount: u64,
        memo: &str,
        idempotency_ref: &str,
    ) -> Result<WalletReceipt, AppError>;
}

#[derive(Debug, Default)]
pub struct InMemoryWallet {
    balances: DashMap<Uuid, u64>,
    credits: DashMap<String, WalletReceipt>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, user_id: Uuid) -> u64 {
        self.balances.get(&user_id).map(|b| *b).unwrap_or(0)
    }
}

#[async_trait]
impl Wallet for InMemoryWallet {
    async fn credit(
        &self,
        user_id: Uuid,
        amount: u64,
        memo: &str,
        idempotency_ref: &str,
    ) -> Result<WalletReceipt, AppError> {
        match self.credits.entry(idempotency_ref.to_string()) {
            Entry::Occupied(existing) => Ok(WalletReceipt {
                duplicate: true,
                ..existing.get().clone()
            }),
            Entry::Vacant(slot) => {
                *self.balances.entry(user_id).or_insert(0) += amount;
                let receipt = WalletReceipt {
                    reference: format!("wal_{}", Uuid::new_v4().simple()),
                    user_id,
                    amount,
                    duplicate: false,
                };
                slot.insert(receipt.clone());
                tracing::debug!(user_id = %user_id, amount, memo, "wallet credited");
                Ok(receipt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{InMemoryWallet, Wallet};

    #[tokio::test]
    async fn repeated_reference_credits_once() {
        let wallet = InMemoryWallet::new();
        let user = Uuid::new_v4();

        let first = wallet.credit(user, 1_200, "payout", "delivery-1").await.unwrap();
        let second = wallet.credit(user, 1_200, "payout", "delivery-1").await.unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.reference, second.reference);
        assert_eq!(wallet.balance(user), 1_200);
    }
}
