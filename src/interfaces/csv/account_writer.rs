use crate::domain::account::{UserAccount, UserId};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow {
    user: UserId,
    balance: String,
    total_spent: String,
    total_orders: u32,
}

impl From<&UserAccount> for AccountRow {
    fn from(account: &UserAccount) -> Self {
        Self {
            user: account.user_id,
            balance: account.balance.to_string(),
            total_spent: account.total_spent.to_string(),
            total_orders: account.total_orders,
        }
    }
}

/// Writes the final account table as CSV.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts<'a>(
        &mut self,
        accounts: impl IntoIterator<Item = &'a UserAccount>,
    ) -> Result<()> {
        for account in accounts {
            self.writer.serialize(AccountRow::from(account))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
