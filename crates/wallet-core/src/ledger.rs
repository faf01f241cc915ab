//! Local ledger: the balance and the transaction log
//!
//! Both values live in the secure store under their own keys. Every
//! operation that touches both goes through `set_items` so the balance and
//! the log are committed together, and mutating operations are serialised
//! so two transfers can never spend the same balance snapshot.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{TransferError, TransferResult, WalletError, WalletResult};
use crate::models::{sort_newest_first, Transaction, WalletConfig};
use crate::storage::{SecureStore, BALANCE_KEY, TRANSACTIONS_KEY};

/// Counterparty of the seed record
const SEED_FROM: &str = "Payday";

/// Note attached to the seed record
const SEED_NOTE: &str = "Demo deposit";

/// Number of records the wallet overview shows
pub const RECENT_LIMIT: usize = 3;

/// Ledger service over an injected secure store
pub struct Ledger {
    store: Arc<dyn SecureStore>,
    config: WalletConfig,
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(store: Arc<dyn SecureStore>, config: WalletConfig) -> Self {
        Self {
            store,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Stored balance, `None` if missing or unreadable
    async fn stored_balance(&self) -> WalletResult<Option<Decimal>> {
        let raw = match self.store.get_item(BALANCE_KEY).await? {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(None),
        };

        match parse_decimal(&raw) {
            Some(balance) => Ok(Some(balance)),
            None => {
                warn!(value = %raw, "Stored balance is not a number, using fallback");
                Ok(None)
            }
        }
    }

    /// Current balance, or the configured fallback if none is stored
    pub async fn load_balance(&self) -> WalletResult<Decimal> {
        Ok(self
            .stored_balance()
            .await?
            .unwrap_or(self.config.fallback_balance))
    }

    pub async fn save_balance(&self, balance: Decimal) -> WalletResult<()> {
        self.store.set_item(BALANCE_KEY, balance.to_string()).await
    }

    /// Transactions in storage order; unreadable content reads as empty
    pub async fn load_transactions(&self) -> WalletResult<Vec<Transaction>> {
        let raw = match self.store.get_item(TRANSACTIONS_KEY).await? {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(Vec::new()),
        };

        let items = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Array(items)) => items,
            Ok(_) => {
                warn!("Stored transactions are not a list, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!(error = %e, "Stored transactions are not valid JSON, treating as empty");
                return Ok(Vec::new());
            }
        };

        let mut transactions = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<Transaction>(item) {
                Ok(tx) => transactions.push(tx),
                Err(e) => warn!(error = %e, "Skipping unreadable transaction record"),
            }
        }
        Ok(transactions)
    }

    /// Replace the whole transaction log
    pub async fn save_transactions(&self, transactions: &[Transaction]) -> WalletResult<()> {
        let json = serde_json::to_string(transactions)?;
        self.store.set_item(TRANSACTIONS_KEY, json).await
    }

    /// Seed a demo deposit and starting balance on first login
    pub async fn seed_if_empty(&self) -> WalletResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut writes = Vec::new();

        if self.load_transactions().await?.is_empty() {
            let seed = Transaction::receive(
                SEED_FROM,
                self.config.seed_balance,
                Some(SEED_NOTE.to_string()),
                Utc::now() - Duration::days(1),
            );
            writes.push((TRANSACTIONS_KEY.to_string(), serde_json::to_string(&[seed])?));
        }

        if self.stored_balance().await?.is_none() {
            writes.push((BALANCE_KEY.to_string(), self.config.seed_balance.to_string()));
        }

        if writes.is_empty() {
            return Ok(());
        }

        debug!(keys = writes.len(), "Seeding ledger");
        self.store.set_items(writes).await
    }

    /// Record an outgoing transfer and debit the balance
    pub async fn apply_transfer(
        &self,
        recipient: &str,
        amount: Decimal,
        note: Option<&str>,
    ) -> TransferResult<Transaction> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(TransferError::InvalidInput("recipient is required".to_string()));
        }
        check_amount(amount)?;

        let _guard = self.write_lock.lock().await;

        let balance = self.load_balance().await?;
        if amount > balance {
            return Err(TransferError::InsufficientFunds {
                requested: amount,
                available: balance,
            });
        }

        let next_balance = balance
            .checked_sub(amount)
            // A rounded difference comes back at a smaller scale
            .filter(|next| next.scale() >= balance.scale().max(amount.scale()))
            .ok_or_else(|| {
                TransferError::InvalidInput(format!(
                    "{} cannot be debited exactly from {}",
                    amount, balance
                ))
            })?;

        let note = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let tx = Transaction::send(recipient, amount, note);

        let mut transactions = self.load_transactions().await?;
        transactions.insert(0, tx.clone());

        self.store
            .set_items(vec![
                (BALANCE_KEY.to_string(), next_balance.to_string()),
                (
                    TRANSACTIONS_KEY.to_string(),
                    serde_json::to_string(&transactions).map_err(WalletError::from)?,
                ),
            ])
            .await?;

        info!(id = %tx.id, amount = %amount, balance = %next_balance, "Transfer recorded");
        Ok(tx)
    }

    /// Empty the log and zero the balance
    pub async fn clear_all(&self) -> WalletResult<()> {
        let _guard = self.write_lock.lock().await;

        self.store
            .set_items(vec![
                (TRANSACTIONS_KEY.to_string(), "[]".to_string()),
                (BALANCE_KEY.to_string(), Decimal::ZERO.to_string()),
            ])
            .await?;

        info!("Ledger cleared");
        Ok(())
    }

    /// Transactions for display, newest first
    pub async fn history(&self) -> WalletResult<Vec<Transaction>> {
        let mut transactions = self.load_transactions().await?;
        sort_newest_first(&mut transactions);
        Ok(transactions)
    }

    /// The newest `limit` transactions
    pub async fn recent(&self, limit: usize) -> WalletResult<Vec<Transaction>> {
        let mut transactions = self.history().await?;
        transactions.truncate(limit);
        Ok(transactions)
    }
}

/// Parse an amount typed by the user
pub fn parse_amount(text: &str) -> TransferResult<Decimal> {
    let amount = parse_decimal(text)
        .ok_or_else(|| TransferError::InvalidInput(format!("'{}' is not a valid amount", text.trim())))?;

    check_amount(amount)?;
    Ok(amount)
}

/// Amounts are positive and carry at most whole cents
fn check_amount(amount: Decimal) -> TransferResult<()> {
    if amount <= Decimal::ZERO {
        return Err(TransferError::InvalidInput(format!(
            "amount must be greater than zero, got {}",
            amount
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(TransferError::InvalidInput(format!(
            "amount {} has more than two decimal places",
            amount
        )));
    }
    Ok(())
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    // rust_decimal also takes digit separators like "1_000"
    if text.is_empty()
        || !text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'))
    {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use rust_decimal_macros::dec;

    fn ledger() -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store.clone(), WalletConfig::default());
        (store, ledger)
    }

    #[tokio::test]
    async fn test_transfer_debits_and_prepends() {
        let (_store, ledger) = ledger();
        ledger.save_balance(dec!(250.00)).await.unwrap();
        ledger.seed_if_empty().await.unwrap();

        let tx = ledger
            .apply_transfer("Mom", dec!(25.00), Some("Groceries"))
            .await
            .unwrap();

        assert_eq!(ledger.load_balance().await.unwrap(), dec!(225.00));

        let transactions = ledger.load_transactions().await.unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0], tx);
        assert!(tx.is_send());
        assert_eq!(tx.counterparty(), Some("Mom"));
        assert_eq!(tx.amount, dec!(25.00));
        assert_eq!(tx.note.as_deref(), Some("Groceries"));
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_state() {
        let (store, ledger) = ledger();
        ledger.save_balance(dec!(225.00)).await.unwrap();
        let before = store.get_item(TRANSACTIONS_KEY).await.unwrap();

        let result = ledger.apply_transfer("Mom", dec!(300.00), None).await;

        match result {
            Err(TransferError::InsufficientFunds { requested, available }) => {
                assert_eq!(requested, dec!(300.00));
                assert_eq!(available, dec!(225.00));
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
        assert_eq!(ledger.load_balance().await.unwrap(), dec!(225.00));
        assert_eq!(store.get_item(TRANSACTIONS_KEY).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_transfer_of_whole_balance() {
        let (_store, ledger) = ledger();
        ledger.save_balance(dec!(40)).await.unwrap();

        ledger.apply_transfer("Landlord", dec!(40), None).await.unwrap();
        assert_eq!(ledger.load_balance().await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let (store, ledger) = ledger();
        ledger.save_balance(dec!(100)).await.unwrap();

        for (recipient, amount) in [("   ", dec!(10)), ("Mom", dec!(0)), ("Mom", dec!(-5))] {
            let result = ledger.apply_transfer(recipient, amount, None).await;
            assert!(matches!(result, Err(TransferError::InvalidInput(_))));
        }

        assert_eq!(ledger.load_balance().await.unwrap(), dec!(100));
        assert_eq!(store.get_item(TRANSACTIONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_note_and_recipient_are_trimmed() {
        let (_store, ledger) = ledger();
        ledger.save_balance(dec!(100)).await.unwrap();

        let tx = ledger.apply_transfer("  Mom ", dec!(1), Some("   ")).await.unwrap();
        assert_eq!(tx.counterparty(), Some("Mom"));
        assert_eq!(tx.note, None);
    }

    #[tokio::test]
    async fn test_parse_amount() {
        assert_eq!(parse_amount(" 25 ").unwrap(), dec!(25));
        assert_eq!(parse_amount("12.50").unwrap(), dec!(12.50));
        assert_eq!(parse_amount("1e2").unwrap(), dec!(100));
        assert!(matches!(parse_amount("abc"), Err(TransferError::InvalidInput(_))));
        assert!(matches!(parse_amount(""), Err(TransferError::InvalidInput(_))));
        assert!(matches!(parse_amount("0"), Err(TransferError::InvalidInput(_))));
        assert!(matches!(parse_amount("-3"), Err(TransferError::InvalidInput(_))));
        assert!(matches!(parse_amount("1_000"), Err(TransferError::InvalidInput(_))));
        assert!(matches!(parse_amount("0.001"), Err(TransferError::InvalidInput(_))));
        assert_eq!(parse_amount("5.000").unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn test_sub_cent_amount_is_rejected() {
        let (store, ledger) = ledger();
        ledger.save_balance(dec!(250.00)).await.unwrap();

        assert!(matches!(
            parse_amount("0.0000000000000000000000000001"),
            Err(TransferError::InvalidInput(_))
        ));
        let result = ledger
            .apply_transfer("Mom", dec!(0.0000000000000000000000000001), None)
            .await;
        assert!(matches!(result, Err(TransferError::InvalidInput(_))));

        assert_eq!(ledger.load_balance().await.unwrap(), dec!(250.00));
        assert_eq!(store.get_item(TRANSACTIONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_inexact_debit_is_rejected() {
        let (store, ledger) = ledger();
        // No room left for cents, so the difference would be rounded
        let balance = Decimal::MAX;
        ledger.save_balance(balance).await.unwrap();

        let result = ledger.apply_transfer("Mom", dec!(0.01), None).await;
        assert!(matches!(result, Err(TransferError::InvalidInput(_))));

        assert_eq!(ledger.load_balance().await.unwrap(), balance);
        assert_eq!(store.get_item(TRANSACTIONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (_store, ledger) = ledger();
        ledger.seed_if_empty().await.unwrap();
        ledger.apply_transfer("Mom", dec!(5), None).await.unwrap();

        ledger.clear_all().await.unwrap();

        assert_eq!(ledger.load_balance().await.unwrap(), Decimal::ZERO);
        assert!(ledger.load_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (_store, ledger) = ledger();

        ledger.seed_if_empty().await.unwrap();
        ledger.seed_if_empty().await.unwrap();

        let transactions = ledger.load_transactions().await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert!(!transactions[0].is_send());
        assert_eq!(transactions[0].counterparty(), Some("Payday"));
        assert_eq!(transactions[0].amount, dec!(250));
        assert_eq!(ledger.load_balance().await.unwrap(), dec!(250));
    }

    #[tokio::test]
    async fn test_seed_keeps_existing_balance() {
        let (_store, ledger) = ledger();
        ledger.save_balance(Decimal::ZERO).await.unwrap();

        ledger.seed_if_empty().await.unwrap();

        assert_eq!(ledger.load_balance().await.unwrap(), Decimal::ZERO);
        assert_eq!(ledger.load_transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_repairs_corrupt_balance() {
        let (store, ledger) = ledger();
        store.set_item(BALANCE_KEY, "NaN".to_string()).await.unwrap();

        ledger.seed_if_empty().await.unwrap();
        assert_eq!(store.get_item(BALANCE_KEY).await.unwrap().as_deref(), Some("250.00"));
    }

    #[tokio::test]
    async fn test_balance_fallback() {
        let (store, ledger) = ledger();
        assert_eq!(ledger.load_balance().await.unwrap(), dec!(250));

        store.set_item(BALANCE_KEY, "not-a-number".to_string()).await.unwrap();
        assert_eq!(ledger.load_balance().await.unwrap(), dec!(250));

        store.set_item(BALANCE_KEY, "12.34".to_string()).await.unwrap();
        assert_eq!(ledger.load_balance().await.unwrap(), dec!(12.34));
    }

    #[tokio::test]
    async fn test_transactions_roundtrip_preserves_order() {
        let (_store, ledger) = ledger();
        let older = Transaction::receive("Payday", dec!(250), None, Utc::now() - Duration::days(2));
        let newer = Transaction::send("Mom", dec!(25), Some("Groceries".to_string()));
        // Deliberately oldest first
        let transactions = vec![older, newer];

        ledger.save_transactions(&transactions).await.unwrap();
        assert_eq!(ledger.load_transactions().await.unwrap(), transactions);
    }

    #[tokio::test]
    async fn test_corrupt_transactions_read_as_empty() {
        let (store, ledger) = ledger();

        for raw in [r#"{"not":"a list"}"#, "42", "{broken", ""] {
            store.set_item(TRANSACTIONS_KEY, raw.to_string()).await.unwrap();
            assert!(ledger.load_transactions().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_unreadable_records_are_skipped() {
        let (store, ledger) = ledger();
        let raw = r#"[{"id":"tx_1","type":"send","to":"Mom","amount":"5","createdAt":1},{"id":"bad"}]"#;
        store.set_item(TRANSACTIONS_KEY, raw.to_string()).await.unwrap();

        let transactions = ledger.load_transactions().await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].id, "tx_1");
    }

    #[tokio::test]
    async fn test_history_sorted_newest_first() {
        let (_store, ledger) = ledger();
        let base = Utc::now();
        let transactions: Vec<Transaction> = (0..5)
            .map(|i| Transaction::receive("Payday", dec!(1), None, base - Duration::hours(5 - i)))
            .collect();
        // Stored oldest first
        ledger.save_transactions(&transactions).await.unwrap();

        let history = ledger.history().await.unwrap();
        assert_eq!(history.first().unwrap().id, transactions[4].id);
        assert_eq!(history.last().unwrap().id, transactions[0].id);

        let recent = ledger.recent(RECENT_LIMIT).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, transactions[4].id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transfers_cannot_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(Ledger::new(store, WalletConfig::default()));
        ledger.save_balance(dec!(250)).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger.apply_transfer(&format!("Friend {}", i), dec!(100), None).await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(TransferError::InsufficientFunds { .. }) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(succeeded, 2);
        assert_eq!(ledger.load_balance().await.unwrap(), dec!(50));
        assert_eq!(ledger.load_transactions().await.unwrap().len(), 2);
    }
}
