use super::Applied;
use crate::domain::account::{Amount, Balance, UserAccount, UserId};
use crate::domain::ports::{SnapshotStore, SnapshotStoreRef};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<UserId, UserAccount>,
    transactions: Vec<Transaction>,
    /// Positions in `transactions` per user, oldest first.
    by_user: HashMap<UserId, Vec<usize>>,
    next_tx_id: u64,
    /// Users whose last checkpoint failed.
    dirty: HashSet<UserId>,
}

impl LedgerState {
    fn account_mut(&mut self, user_id: UserId) -> (&mut UserAccount, bool) {
        let mut created = false;
        let account = self.accounts.entry(user_id).or_insert_with(|| {
            created = true;
            UserAccount::new(user_id, Utc::now())
        });
        (account, created)
    }

    fn append(
        &mut self,
        user_id: UserId,
        kind: TransactionKind,
        amount: Decimal,
        description: String,
        screenshot: Option<String>,
    ) -> Transaction {
        self.next_tx_id += 1;
        let tx = Transaction {
            id: self.next_tx_id,
            user_id,
            kind,
            amount,
            description,
            screenshot,
            timestamp: Utc::now(),
        };
        self.by_user
            .entry(user_id)
            .or_default()
            .push(self.transactions.len());
        self.transactions.push(tx.clone());
        tx
    }

    fn transactions_of(&self, user_id: UserId) -> Vec<Transaction> {
        self.by_user
            .get(&user_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&i| self.transactions[i].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Aggregate figures over every account.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerStats {
    pub users: usize,
    pub transactions: usize,
    pub total_balance: Decimal,
    pub total_spent: Decimal,
    pub total_orders: u64,
}

/// Owns user balances and the append-only transaction log.
pub struct Ledger {
    state: Mutex<LedgerState>,
    store: SnapshotStoreRef,
}

impl Ledger {
    pub fn new(store: SnapshotStoreRef) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            store,
        }
    }

    /// Replaces the in-memory state with a loaded snapshot.
    pub async fn restore(&self, accounts: Vec<UserAccount>, mut transactions: Vec<Transaction>) {
        let mut state = self.state.lock().await;
        transactions.sort_by_key(|tx| tx.id);

        *state = LedgerState {
            next_tx_id: transactions.last().map_or(0, |tx| tx.id),
            accounts: accounts.into_iter().map(|a| (a.user_id, a)).collect(),
            ..LedgerState::default()
        };
        for tx in transactions {
            let position = state.transactions.len();
            state.by_user.entry(tx.user_id).or_default().push(position);
            state.transactions.push(tx);
        }
        tracing::info!(
            accounts = state.accounts.len(),
            transactions = state.transactions.len(),
            "Ledger restored"
        );
    }

    /// Returns the user's balance, opening the account on first use.
    pub async fn balance(&self, user_id: UserId) -> Balance {
        self.account(user_id).await.balance
    }

    /// Returns the user's account, opening it on first use.
    ///
    /// A failed checkpoint of a freshly opened account is retried with the
    /// next write for that user rather than reported here.
    pub async fn account(&self, user_id: UserId) -> UserAccount {
        let mut state = self.state.lock().await;
        let (account, created) = state.account_mut(user_id);
        let account = account.clone();
        if created
            && let Err(e) = checkpoint_user(self.store.as_ref(), &mut state, user_id, &[]).await
        {
            tracing::debug!(user_id, error = %e, "New account queued for the next checkpoint");
        }
        account
    }

    /// Records activity for the user, opening the account on first use.
    pub async fn touch(&self, user_id: UserId) -> Applied<()> {
        let mut state = self.state.lock().await;
        state.account_mut(user_id).0.touch(Utc::now());
        let checkpoint = checkpoint_user(self.store.as_ref(), &mut state, user_id, &[]).await;
        Applied::new((), checkpoint)
    }

    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        description: impl Into<String>,
    ) -> Applied<Transaction> {
        self.credit_with_proof(user_id, amount, description, None)
            .await
    }

    /// Credits the balance and appends a deposit transaction that keeps the
    /// payment screenshot for auditing.
    pub async fn credit_with_proof(
        &self,
        user_id: UserId,
        amount: Amount,
        description: impl Into<String>,
        screenshot: Option<String>,
    ) -> Applied<Transaction> {
        let mut state = self.state.lock().await;
        state.account_mut(user_id).0.credit(amount);
        let tx = state.append(
            user_id,
            TransactionKind::Deposit,
            amount.value(),
            description.into(),
            screenshot,
        );
        tracing::info!(user_id, tx_id = tx.id, amount = %amount, "Balance credited");

        let checkpoint =
            checkpoint_user(self.store.as_ref(), &mut state, user_id, std::slice::from_ref(&tx))
                .await;
        Applied::new(tx, checkpoint)
    }

    /// Debits the balance, counting the purchase as an order.
    ///
    /// Fails with `InsufficientFunds` without touching any state.
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        description: impl Into<String>,
    ) -> Result<Applied<Transaction>> {
        let mut state = self.state.lock().await;
        if let Err(e) = state.account_mut(user_id).0.debit(amount) {
            tracing::debug!(user_id, amount = %amount, "Debit refused");
            return Err(e);
        }
        let tx = state.append(
            user_id,
            TransactionKind::Purchase,
            -amount.value(),
            description.into(),
            None,
        );
        tracing::info!(user_id, tx_id = tx.id, amount = %amount, "Balance debited");

        let checkpoint =
            checkpoint_user(self.store.as_ref(), &mut state, user_id, std::slice::from_ref(&tx))
                .await;
        Ok(Applied::new(tx, checkpoint))
    }

    /// Returns a debit whose order could not be placed. The reversal is
    /// appended as a deposit so the log still folds to the balance, and the
    /// order counters are rolled back.
    pub async fn reverse_debit(
        &self,
        user_id: UserId,
        amount: Amount,
        description: impl Into<String>,
    ) -> Applied<Transaction> {
        let mut state = self.state.lock().await;
        state.account_mut(user_id).0.reverse_debit(amount);
        let tx = state.append(
            user_id,
            TransactionKind::Deposit,
            amount.value(),
            description.into(),
            None,
        );
        tracing::info!(user_id, tx_id = tx.id, amount = %amount, "Debit reversed");

        let checkpoint =
            checkpoint_user(self.store.as_ref(), &mut state, user_id, std::slice::from_ref(&tx))
                .await;
        Applied::new(tx, checkpoint)
    }

    /// Counts an order paid outside the bot. The balance is unchanged, so no
    /// transaction is appended.
    pub async fn record_order(&self, user_id: UserId, amount: Amount) -> Applied<()> {
        let mut state = self.state.lock().await;
        state.account_mut(user_id).0.record_order(amount.into());
        let checkpoint = checkpoint_user(self.store.as_ref(), &mut state, user_id, &[]).await;
        Applied::new((), checkpoint)
    }

    /// The user's most recent transactions, oldest first.
    pub async fn history(&self, user_id: UserId, limit: usize) -> Vec<Transaction> {
        let state = self.state.lock().await;
        let mut transactions = state.transactions_of(user_id);
        let skip = transactions.len().saturating_sub(limit);
        transactions.drain(..skip);
        transactions
    }

    pub async fn accounts(&self) -> Vec<UserAccount> {
        let state = self.state.lock().await;
        let mut accounts: Vec<UserAccount> = state.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.user_id);
        accounts
    }

    pub async fn stats(&self) -> LedgerStats {
        let state = self.state.lock().await;
        LedgerStats {
            users: state.accounts.len(),
            transactions: state.transactions.len(),
            total_balance: state.accounts.values().map(|a| a.balance.value()).sum(),
            total_spent: state.accounts.values().map(|a| a.total_spent.value()).sum(),
            total_orders: state
                .accounts
                .values()
                .map(|a| u64::from(a.total_orders))
                .sum(),
        }
    }

    /// Number of users whose state is not yet durably checkpointed.
    pub async fn unsaved_users(&self) -> usize {
        self.state.lock().await.dirty.len()
    }

    /// Writes every user aggregate whose last checkpoint failed.
    pub async fn retry_checkpoints(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut dirty: Vec<UserId> = state.dirty.iter().copied().collect();
        dirty.sort_unstable();

        let mut first_error = None;
        for user_id in dirty {
            if let Err(e) = checkpoint_user(self.store.as_ref(), &mut state, user_id, &[]).await
                && first_error.is_none()
            {
                first_error = Some(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Saves the user's account and `appended` transactions. When an earlier
/// checkpoint for the user failed, the whole transaction history is written
/// instead so nothing stays behind.
async fn checkpoint_user(
    store: &dyn SnapshotStore,
    state: &mut LedgerState,
    user_id: UserId,
    appended: &[Transaction],
) -> Result<()> {
    let Some(account) = state.accounts.get(&user_id) else {
        return Ok(());
    };

    let result = if state.dirty.contains(&user_id) {
        let history = state.transactions_of(user_id);
        store.save_user(account, &history).await
    } else {
        store.save_user(account, appended).await
    };

    match result {
        Ok(()) => {
            state.dirty.remove(&user_id);
            Ok(())
        }
        Err(e) => {
            tracing::error!(user_id, error = %e, "Failed to checkpoint user account");
            state.dirty.insert(user_id);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::fold_balance;
    use crate::error::StorefrontError;
    use crate::infrastructure::in_memory::InMemorySnapshotStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn ledger() -> (Ledger, InMemorySnapshotStore) {
        let store = InMemorySnapshotStore::new();
        (Ledger::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_balance_opens_account() {
        let (ledger, store) = ledger();
        assert_eq!(ledger.balance(7).await, Balance::ZERO);
        assert_eq!(ledger.accounts().await.len(), 1);
        assert_eq!(store.load().await.unwrap().accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_credit_then_debit_conserves_balance() {
        let (ledger, _) = ledger();
        ledger.credit(1, amount(dec!(250)), "top up").await.into_result().unwrap();
        let before = ledger.balance(1).await;

        ledger.credit(1, amount(dec!(100)), "deposit").await.into_result().unwrap();
        ledger
            .debit(1, amount(dec!(100)), "purchase")
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(ledger.balance(1).await, before);
        let history = ledger.history(1, 10).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].amount + history[2].amount, Decimal::ZERO);
        assert_eq!(fold_balance(&history), before.value());
    }

    #[tokio::test]
    async fn test_debit_rejection_leaves_state_untouched() {
        let (ledger, _) = ledger();
        ledger.credit(1, amount(dec!(50)), "top up").await.into_result().unwrap();
        let before = ledger.account(1).await;

        let result = ledger.debit(1, amount(dec!(51)), "too much").await;
        assert!(matches!(
            result,
            Err(StorefrontError::InsufficientFunds { .. })
        ));

        let after = ledger.account(1).await;
        assert_eq!(after.balance, before.balance);
        assert_eq!(after.total_spent, before.total_spent);
        assert_eq!(after.total_orders, before.total_orders);
        assert_eq!(ledger.history(1, 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_debit_counts_order() {
        let (ledger, _) = ledger();
        ledger.credit(1, amount(dec!(500)), "top up").await.into_result().unwrap();
        let tx = ledger
            .debit(1, amount(dec!(120)), "order")
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(tx.kind, TransactionKind::Purchase);
        assert_eq!(tx.amount, dec!(-120));
        let account = ledger.account(1).await;
        assert_eq!(account.total_orders, 1);
        assert_eq!(account.total_spent, Balance::new(dec!(120)));
    }

    #[tokio::test]
    async fn test_record_order_keeps_balance() {
        let (ledger, _) = ledger();
        ledger.record_order(1, amount(dec!(300))).await.into_result().unwrap();
        let account = ledger.account(1).await;
        assert_eq!(account.balance, Balance::ZERO);
        assert_eq!(account.total_orders, 1);
        assert!(ledger.history(1, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_history_keeps_most_recent() {
        let (ledger, _) = ledger();
        for i in 1..=12 {
            ledger
                .credit(1, amount(Decimal::from(i)), format!("deposit {i}"))
                .await
                .into_result()
                .unwrap();
        }
        let history = ledger.history(1, 10).await;
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].description, "deposit 3");
        assert_eq!(history[9].description, "deposit 12");
    }

    #[tokio::test]
    async fn test_transaction_ids_continue_after_restore() {
        let (ledger, store) = ledger();
        ledger.credit(1, amount(dec!(10)), "a").await.into_result().unwrap();
        ledger.credit(2, amount(dec!(20)), "b").await.into_result().unwrap();

        let snapshot = store.load().await.unwrap();
        let restored = Ledger::new(Arc::new(store.clone()));
        restored
            .restore(snapshot.accounts, snapshot.transactions)
            .await;

        let tx = restored
            .credit(1, amount(dec!(5)), "c")
            .await
            .into_result()
            .unwrap();
        assert_eq!(tx.id, 3);
        assert_eq!(restored.balance(1).await, Balance::new(dec!(15)));
        assert_eq!(restored.stats().await.total_balance, dec!(35));
    }

    #[tokio::test]
    async fn test_reverse_debit_rolls_back_order() {
        let (ledger, store) = ledger();
        ledger.credit(1, amount(dec!(200)), "top up").await.into_result().unwrap();
        ledger
            .debit(1, amount(dec!(150)), "Order ORD_1_1")
            .await
            .unwrap()
            .into_result()
            .unwrap();
        ledger
            .reverse_debit(1, amount(dec!(150)), "Order ORD_1_1 not placed")
            .await
            .into_result()
            .unwrap();

        let account = ledger.account(1).await;
        assert_eq!(account.balance, Balance::new(dec!(200)));
        assert_eq!(account.total_orders, 0);
        assert_eq!(account.total_spent, Balance::ZERO);
        let history = ledger.history(1, 10).await;
        assert_eq!(fold_balance(&history), dec!(200));
        assert_eq!(store.load().await.unwrap().transactions.len(), 3);
    }
}
