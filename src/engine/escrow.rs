//! Escrow settlement: wallets, holds, and the transaction ledger.
//!
//! A task's budget is escrowed at acceptance (`hold`), then resolved
//! exactly once: `release` pays the doer, `reverse` returns the funds to
//! the poster. Re-invoking the same resolution is a no-op; invoking the
//! opposite one fails with `SettlementConflict`: first to complete wins,
//! the loser is never partially applied.
//!
//! The poster's debit is booked `Pending` at hold time, flipped to
//! `Completed` on release or `Failed` on reversal; the doer's credit is
//! booked at release. Entries referencing a task are unique per
//! `(task, kind)`, so a replayed settlement produces no new entry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::Amount;
use crate::model::{TaskId, Transaction, TxId, TxKind, TxStatus, UserId};

use super::error::EscrowError;

/// A user's funds: spendable `balance` plus task-earmarked `held`.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub user: UserId,
    pub balance: Amount,
    pub held: Amount,
}

impl Wallet {
    fn new(user: UserId) -> Self {
        Self {
            user,
            balance: Amount::ZERO,
            held: Amount::ZERO,
        }
    }

    pub fn total(&self) -> Amount {
        self.balance + self.held
    }
}

/// Resolution state of a task's escrowed funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldState {
    Held,
    Released(UserId),
    Reversed,
}

#[derive(Debug, Clone)]
struct HoldRecord {
    poster: UserId,
    amount: Amount,
    state: HoldState,
}

#[derive(Default)]
struct TxLedger {
    next_id: TxId,
    entries: Vec<Transaction>,
    /// Dedup index for task-linked entries.
    by_task: HashMap<(TaskId, TxKind), usize>,
}

impl TxLedger {
    /// Append an entry; a task-linked entry whose `(task, kind)` slot is
    /// already taken is rejected structurally (returns `None`).
    fn record(
        &mut self,
        wallet: UserId,
        kind: TxKind,
        status: TxStatus,
        amount: Amount,
        task: Option<TaskId>,
        now: DateTime<Utc>,
    ) -> Option<TxId> {
        if let Some(task) = task {
            if self.by_task.contains_key(&(task, kind)) {
                return None;
            }
        }
        self.next_id += 1;
        let id = self.next_id;
        let index = self.entries.len();
        self.entries.push(Transaction {
            id,
            wallet,
            kind,
            status,
            amount,
            task,
            timestamp: now,
        });
        if let Some(task) = task {
            self.by_task.insert((task, kind), index);
        }
        Some(id)
    }

    fn set_status(&mut self, task: TaskId, kind: TxKind, status: TxStatus) {
        if let Some(&index) = self.by_task.get(&(task, kind)) {
            self.entries[index].status = status;
        }
    }
}

/// Wallet registry, per-task hold records, and the transaction ledger.
///
/// Lock order: holds, then one wallet at a time, then the ledger. Wallet
/// mutations for the two sides of a release are sequential, never nested.
pub struct EscrowSettlement {
    wallets: RwLock<HashMap<UserId, Arc<Mutex<Wallet>>>>,
    holds: Mutex<HashMap<TaskId, HoldRecord>>,
    ledger: Mutex<TxLedger>,
}

impl EscrowSettlement {
    pub fn new() -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
            holds: Mutex::new(HashMap::new()),
            ledger: Mutex::new(TxLedger::default()),
        }
    }

    /// Wallets are created on first touch with a zero balance.
    fn wallet_entry(&self, user: UserId) -> Arc<Mutex<Wallet>> {
        if let Some(entry) = self.wallets.read().get(&user) {
            return entry.clone();
        }
        self.wallets
            .write()
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(Wallet::new(user))))
            .clone()
    }

    /// Credit spendable funds.
    pub fn deposit(
        &self,
        user: UserId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<(), EscrowError> {
        if amount.is_zero() {
            return Err(EscrowError::ZeroAmount);
        }
        let entry = self.wallet_entry(user);
        entry.lock().balance += amount;
        self.ledger
            .lock()
            .record(user, TxKind::Credit, TxStatus::Completed, amount, None, now);
        Ok(())
    }

    /// Debit spendable funds. Held funds are not withdrawable.
    pub fn withdraw(
        &self,
        user: UserId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<(), EscrowError> {
        if amount.is_zero() {
            return Err(EscrowError::ZeroAmount);
        }
        let entry = self.wallet_entry(user);
        {
            let mut wallet = entry.lock();
            let remaining =
                wallet
                    .balance
                    .checked_sub(amount)
                    .ok_or(EscrowError::InsufficientFunds {
                        user,
                        available: wallet.balance,
                        requested: amount,
                    })?;
            wallet.balance = remaining;
        }
        self.ledger
            .lock()
            .record(user, TxKind::Debit, TxStatus::Completed, amount, None, now);
        Ok(())
    }

    /// Earmark `amount` of `from`'s balance against a task.
    ///
    /// Idempotent while the task is held; a hold against an already
    /// resolved task is a conflict.
    pub fn hold(
        &self,
        task: TaskId,
        amount: Amount,
        from: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), EscrowError> {
        if amount.is_zero() {
            return Err(EscrowError::ZeroAmount);
        }

        let mut holds = self.holds.lock();
        match holds.get(&task).map(|r| r.state) {
            Some(HoldState::Held) => return Ok(()),
            Some(_) => return Err(EscrowError::SettlementConflict(task)),
            None => {}
        }

        let entry = self.wallet_entry(from);
        {
            let mut wallet = entry.lock();
            let remaining =
                wallet
                    .balance
                    .checked_sub(amount)
                    .ok_or(EscrowError::InsufficientFunds {
                        user: from,
                        available: wallet.balance,
                        requested: amount,
                    })?;
            wallet.balance = remaining;
            wallet.held += amount;
        }

        holds.insert(
            task,
            HoldRecord {
                poster: from,
                amount,
                state: HoldState::Held,
            },
        );
        self.ledger.lock().record(
            from,
            TxKind::Debit,
            TxStatus::Pending,
            amount,
            Some(task),
            now,
        );
        Ok(())
    }

    /// Resolve a hold in the doer's favor: the poster's held funds become
    /// the doer's balance. Returns the settled amount.
    pub fn release(
        &self,
        task: TaskId,
        to: UserId,
        now: DateTime<Utc>,
    ) -> Result<Amount, EscrowError> {
        let mut holds = self.holds.lock();
        let record = holds
            .get_mut(&task)
            .ok_or(EscrowError::HoldNotFound(task))?;

        match record.state {
            HoldState::Released(prev) if prev == to => return Ok(record.amount),
            HoldState::Released(_) | HoldState::Reversed => {
                return Err(EscrowError::SettlementConflict(task));
            }
            HoldState::Held => {}
        }

        let amount = record.amount;
        let poster = record.poster;

        {
            let entry = self.wallet_entry(poster);
            entry.lock().held -= amount;
        }
        {
            let entry = self.wallet_entry(to);
            entry.lock().balance += amount;
        }

        record.state = HoldState::Released(to);
        let mut ledger = self.ledger.lock();
        ledger.set_status(task, TxKind::Debit, TxStatus::Completed);
        ledger.record(to, TxKind::Credit, TxStatus::Completed, amount, Some(task), now);
        Ok(amount)
    }

    /// Resolve a hold in the poster's favor: held funds return to their
    /// balance and the pending debit is marked failed.
    pub fn reverse(&self, task: TaskId) -> Result<Amount, EscrowError> {
        let mut holds = self.holds.lock();
        let record = holds
            .get_mut(&task)
            .ok_or(EscrowError::HoldNotFound(task))?;

        match record.state {
            HoldState::Reversed => return Ok(record.amount),
            HoldState::Released(_) => return Err(EscrowError::SettlementConflict(task)),
            HoldState::Held => {}
        }

        let amount = record.amount;
        {
            let entry = self.wallet_entry(record.poster);
            let mut wallet = entry.lock();
            wallet.held -= amount;
            wallet.balance += amount;
        }

        record.state = HoldState::Reversed;
        self.ledger
            .lock()
            .set_status(task, TxKind::Debit, TxStatus::Failed);
        Ok(amount)
    }

    /// Point-in-time copy of a wallet.
    pub fn wallet(&self, user: UserId) -> Option<Wallet> {
        self.wallets.read().get(&user).map(|w| w.lock().clone())
    }

    /// All wallets, for reporting.
    pub fn wallets(&self) -> Vec<Wallet> {
        self.wallets
            .read()
            .values()
            .map(|w| w.lock().clone())
            .collect()
    }

    /// Ledger entries for one wallet, oldest first.
    pub fn transactions(&self, user: UserId) -> Vec<Transaction> {
        self.ledger
            .lock()
            .entries
            .iter()
            .filter(|tx| tx.wallet == user)
            .cloned()
            .collect()
    }

    #[cfg(test)]
    fn task_entries(&self, task: TaskId) -> Vec<Transaction> {
        self.ledger
            .lock()
            .entries
            .iter()
            .filter(|tx| tx.task == Some(task))
            .cloned()
            .collect()
    }
}

impl Default for EscrowSettlement {
    fn default() -> Self {
        Self::new()
    }
}
