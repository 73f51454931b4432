use crate::domain::account::UserAccount;
use crate::domain::payment::PendingPayment;
use crate::domain::ports::{Snapshot, SnapshotStore};
use crate::domain::transaction::Transaction;
use crate::error::{Result, StorefrontError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for user accounts, keyed by user id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for the transaction log, keyed by transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for live pending payments, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent snapshot store using RocksDB.
///
/// Values are JSON documents. Big-endian keys keep the transaction log in
/// id order when iterated.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating the
    /// column families on first use.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ACCOUNTS, CF_TRANSACTIONS, CF_PAYMENTS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            StorefrontError::persistence(format!("{name} column family not found"))
        })
    }

    fn read_all<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value).map_err(StorefrontError::persistence)?);
        }
        Ok(values)
    }
}

#[async_trait]
impl SnapshotStore for RocksDBStore {
    async fn load(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            accounts: self.read_all(CF_ACCOUNTS)?,
            transactions: self.read_all(CF_TRANSACTIONS)?,
            pending_payments: self.read_all(CF_PAYMENTS)?,
        })
    }

    async fn save_user(&self, account: &UserAccount, transactions: &[Transaction]) -> Result<()> {
        let log = self.cf(CF_TRANSACTIONS)?;
        for tx in transactions {
            let value = serde_json::to_vec(tx).map_err(StorefrontError::persistence)?;
            self.db.put_cf(log, tx.id.to_be_bytes(), value)?;
        }

        // Written last: an account never refers to activity missing from the log.
        let accounts = self.cf(CF_ACCOUNTS)?;
        let value = serde_json::to_vec(account).map_err(StorefrontError::persistence)?;
        self.db.put_cf(accounts, account.user_id.to_be_bytes(), value)?;
        Ok(())
    }

    async fn save_payment(&self, payment: &PendingPayment) -> Result<()> {
        let cf = self.cf(CF_PAYMENTS)?;
        let value = serde_json::to_vec(payment).map_err(StorefrontError::persistence)?;
        self.db.put_cf(cf, payment.id.as_bytes(), value)?;
        Ok(())
    }

    async fn remove_payment(&self, payment_id: &str) -> Result<()> {
        let cf = self.cf(CF_PAYMENTS)?;
        self.db.delete_cf(cf, payment_id.as_bytes())?;
        Ok(())
    }
}
