use super::in_memory::InMemorySnapshotStore;
use crate::domain::account::UserAccount;
use crate::domain::payment::PendingPayment;
use crate::domain::ports::{Snapshot, SnapshotStore};
use crate::domain::transaction::Transaction;
use crate::error::{Result, StorefrontError};
use async_trait::async_trait;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

/// Snapshot store writing the whole state to one JSON document.
///
/// Every save rewrites the file through a temporary file in the same
/// directory, so a crash leaves either the old or the new document.
pub struct JsonFileSnapshotStore {
    path: PathBuf,
    mirror: InMemorySnapshotStore,
    /// Serializes file replacement.
    write_lock: Mutex<()>,
}

impl JsonFileSnapshotStore {
    /// Opens the store, reading the existing document if there is one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot: Snapshot = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes).map_err(StorefrontError::persistence)?
        } else {
            Snapshot::default()
        };
        tracing::info!(path = %path.display(), "Opened JSON snapshot store");

        Ok(Self {
            path,
            mirror: InMemorySnapshotStore::from_snapshot(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.mirror.load().await?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &snapshot)
                .map_err(StorefrontError::persistence)?;
            writer.flush()?;
        }
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .map_err(|e| StorefrontError::persistence(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> Result<Snapshot> {
        self.mirror.load().await
    }

    async fn save_user(&self, account: &UserAccount, transactions: &[Transaction]) -> Result<()> {
        self.mirror.save_user(account, transactions).await?;
        self.persist().await
    }

    async fn save_payment(&self, payment: &PendingPayment) -> Result<()> {
        self.mirror.save_payment(payment).await?;
        self.persist().await
    }

    async fn remove_payment(&self, payment_id: &str) -> Result<()> {
        self.mirror.remove_payment(payment_id).await?;
        self.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::PaymentMethod;
    use crate::domain::transaction::TransactionKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let account = UserAccount::new(1, Utc::now());
        let tx = Transaction {
            id: 1,
            user_id: 1,
            kind: TransactionKind::Deposit,
            amount: dec!(500),
            description: "Deposit DEP_1_1".to_string(),
            screenshot: Some("photo-1".to_string()),
            timestamp: Utc::now(),
        };
        let payment = PendingPayment::deposit(
            "DEP_2_1".to_string(),
            2,
            dec!(300),
            PaymentMethod::External {
                key: "sbp".to_string(),
                name: "SBP".to_string(),
            },
            Utc::now(),
        );

        {
            let store = JsonFileSnapshotStore::open(&path).unwrap();
            store.save_user(&account, &[tx.clone()]).await.unwrap();
            store.save_payment(&payment).await.unwrap();
        }

        let reopened = JsonFileSnapshotStore::open(&path).unwrap();
        let snapshot = reopened.load().await.unwrap();
        assert_eq!(snapshot.accounts, vec![account]);
        assert_eq!(snapshot.transactions, vec![tx]);
        assert_eq!(snapshot.pending_payments, vec![payment]);

        reopened.remove_payment("DEP_2_1").await.unwrap();
        let snapshot = JsonFileSnapshotStore::open(&path).unwrap().load().await.unwrap();
        assert!(snapshot.pending_payments.is_empty());
    }

    #[test]
    fn test_corrupt_document_is_a_persistence_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            JsonFileSnapshotStore::open(&path),
            Err(StorefrontError::PersistenceFailure(_))
        ));
    }
}
