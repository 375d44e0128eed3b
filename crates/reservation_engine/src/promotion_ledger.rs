use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

/// A successful redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Redeemed {
    /// Redemptions after this one
    pub used_count: u32,
    /// Redemption limit in force
    pub max_uses: u32,
}

/// Ledger failures
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    /// No redemption slot left
    #[error("Promotion code is no longer available")]
    RedemptionLimitReached,

    /// The promotion was never registered, or has been deleted
    #[error("Promotion {0} is not tracked by the ledger")]
    UnknownPromotion(String),

    /// An admin edit would put the limit below redemptions already made
    #[error("Usage limit {requested} is below the {used} redemptions already made")]
    LimitBelowUsage {
        /// Limit asked for
        requested: u32,
        /// Redemptions already made
        used: u32,
    },

    /// Usage limits must be positive
    #[error("Usage limit must be positive")]
    InvalidLimit,

    /// The in-memory ledger lock was poisoned by a panicking writer
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Authoritative redemption counter for promotions.
///
/// `try_redeem` is linearizable per promotion: reading the count, comparing it
/// with the limit and incrementing it happen as one step, so the count never
/// exceeds `max_uses` whatever the number of concurrent callers.
#[async_trait::async_trait]
pub trait PromotionLedger: Send + Sync {
    /// Starts tracking a promotion, or refreshes its limit from the catalog.
    /// A count already held by the ledger is never lowered, and a retired
    /// promotion stays retired.
    async fn register(
        &self,
        promotion_id: &str,
        max_uses: u32,
        used_count: u32,
    ) -> Result<(), LedgerError>;

    /// Atomically takes one redemption slot
    async fn try_redeem(&self, promotion_id: &str) -> Result<Redeemed, LedgerError>;

    /// Gives back one slot after a booking that redeemed it failed. Best effort.
    async fn release(&self, promotion_id: &str) -> Result<(), LedgerError>;

    /// Current count, `None` for untracked promotions
    async fn redemption_count(&self, promotion_id: &str) -> Result<Option<u32>, LedgerError>;

    /// Changes the limit after an admin edit
    async fn reconfigure(&self, promotion_id: &str, max_uses: u32) -> Result<(), LedgerError>;

    /// Stops redeeming a promotion that is being deleted, after any in-flight
    /// redemption. The promotion is treated as untracked from then on and
    /// `register` ignores it, so a catalog that still lists it cannot revive it.
    async fn retire(&self, promotion_id: &str) -> Result<(), LedgerError>;

    /// Undoes `retire` after the delete failed, then registers the promotion
    /// with the given catalog values. The count held before retirement is kept
    /// when it is higher.
    async fn reinstate(
        &self,
        promotion_id: &str,
        max_uses: u32,
        used_count: u32,
    ) -> Result<(), LedgerError>;
}

struct LedgerEntry {
    max_uses: u32,
    used: AtomicU32,
    retired: bool,
}

impl LedgerEntry {
    fn new(max_uses: u32, used_count: u32) -> Self {
        Self {
            max_uses,
            used: AtomicU32::new(used_count.min(max_uses)),
            retired: false,
        }
    }

    /// Raises the limit and the count from a catalog snapshot, never below what is held
    fn merge(&mut self, max_uses: u32, used_count: u32) {
        let held = *self.used.get_mut();
        let max_uses = max_uses.max(held);
        self.max_uses = max_uses;
        *self.used.get_mut() = held.max(used_count.min(max_uses));
    }
}

/// Process-local ledger.
///
/// Redemptions hold the map's read lock and advance the counter with a
/// compare-and-swap; limit changes and deletes take the write lock, so they wait
/// for every in-flight redemption to finish.
#[derive(Default)]
pub struct InMemoryPromotionLedger {
    entries: RwLock<HashMap<String, LedgerEntry>>,
}

impl InMemoryPromotionLedger {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned<T>(_: T) -> LedgerError {
        LedgerError::Unavailable("ledger lock poisoned".to_string())
    }

    fn active<'a>(
        entries: &'a HashMap<String, LedgerEntry>,
        promotion_id: &str,
    ) -> Result<&'a LedgerEntry, LedgerError> {
        entries
            .get(promotion_id)
            .filter(|entry| !entry.retired)
            .ok_or_else(|| LedgerError::UnknownPromotion(promotion_id.to_string()))
    }
}

#[async_trait::async_trait]
impl PromotionLedger for InMemoryPromotionLedger {
    async fn register(
        &self,
        promotion_id: &str,
        max_uses: u32,
        used_count: u32,
    ) -> Result<(), LedgerError> {
        if max_uses == 0 {
            return Err(LedgerError::InvalidLimit);
        }
        if used_count > max_uses {
            warn!(
                "Promotion {} reports {} redemptions over a limit of {}",
                promotion_id, used_count, max_uses
            );
        }

        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        match entries.get_mut(promotion_id) {
            Some(entry) if entry.retired => {
                debug!("Promotion {} is retired; not registering it", promotion_id);
            }
            Some(entry) => entry.merge(max_uses, used_count),
            None => {
                entries.insert(promotion_id.to_string(), LedgerEntry::new(max_uses, used_count));
            }
        }

        Ok(())
    }

    async fn try_redeem(&self, promotion_id: &str) -> Result<Redeemed, LedgerError> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        let entry = Self::active(&entries, promotion_id)?;

        let max_uses = entry.max_uses;
        let previous = entry
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < max_uses).then_some(used + 1)
            })
            .map_err(|_| LedgerError::RedemptionLimitReached)?;

        debug!(
            "Redeemed promotion {} ({}/{})",
            promotion_id,
            previous + 1,
            max_uses
        );

        Ok(Redeemed {
            used_count: previous + 1,
            max_uses,
        })
    }

    async fn release(&self, promotion_id: &str) -> Result<(), LedgerError> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        let entry = Self::active(&entries, promotion_id)?;

        if entry
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_sub(1)
            })
            .is_err()
        {
            warn!("Release requested for promotion {} with no redemptions", promotion_id);
        }

        Ok(())
    }

    async fn redemption_count(&self, promotion_id: &str) -> Result<Option<u32>, LedgerError> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        Ok(Self::active(&entries, promotion_id)
            .ok()
            .map(|entry| entry.used.load(Ordering::Acquire)))
    }

    async fn reconfigure(&self, promotion_id: &str, max_uses: u32) -> Result<(), LedgerError> {
        if max_uses == 0 {
            return Err(LedgerError::InvalidLimit);
        }

        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        let entry = entries
            .get_mut(promotion_id)
            .filter(|entry| !entry.retired)
            .ok_or_else(|| LedgerError::UnknownPromotion(promotion_id.to_string()))?;

        let used = *entry.used.get_mut();
        if max_uses < used {
            return Err(LedgerError::LimitBelowUsage {
                requested: max_uses,
                used,
            });
        }
        entry.max_uses = max_uses;

        Ok(())
    }

    async fn retire(&self, promotion_id: &str) -> Result<(), LedgerError> {
        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        let entry = entries
            .entry(promotion_id.to_string())
            .or_insert_with(|| LedgerEntry::new(0, 0));
        if !entry.retired {
            entry.retired = true;
            info!("Retired promotion {} from the ledger", promotion_id);
        }
        Ok(())
    }

    async fn reinstate(
        &self,
        promotion_id: &str,
        max_uses: u32,
        used_count: u32,
    ) -> Result<(), LedgerError> {
        if max_uses == 0 {
            return Err(LedgerError::InvalidLimit);
        }

        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        let entry = entries
            .entry(promotion_id.to_string())
            .or_insert_with(|| LedgerEntry::new(max_uses, used_count));
        entry.retired = false;
        entry.merge(max_uses, used_count);

        info!("Reinstated promotion {} in the ledger", promotion_id);
        Ok(())
    }
}

/// Ledger backed by the `promotion_ledger` table.
///
/// Every increment is a conditional `UPDATE`, so Postgres row locking provides
/// the atomicity across processes. Retired promotions keep their row with
/// `retired_at` set.
pub struct PgPromotionLedger {
    pool: PgPool,
}

impl PgPromotionLedger {
    /// Creates a ledger over an existing pool; the schema must already exist
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn held_count(&self, promotion_id: &str) -> Result<Option<u32>, LedgerError> {
        let row = sqlx::query(
            "SELECT used_count FROM promotion_ledger WHERE promotion_id = $1 AND retired_at IS NULL",
        )
        .bind(promotion_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<i32, _>("used_count") as u32))
    }
}

#[async_trait::async_trait]
impl PromotionLedger for PgPromotionLedger {
    async fn register(
        &self,
        promotion_id: &str,
        max_uses: u32,
        used_count: u32,
    ) -> Result<(), LedgerError> {
        if max_uses == 0 {
            return Err(LedgerError::InvalidLimit);
        }

        sqlx::query(
            r#"
            INSERT INTO promotion_ledger (promotion_id, max_uses, used_count)
            VALUES ($1, $2, LEAST($3, $2))
            ON CONFLICT (promotion_id) DO UPDATE
            SET max_uses = GREATEST(EXCLUDED.max_uses, promotion_ledger.used_count),
                used_count = GREATEST(promotion_ledger.used_count, EXCLUDED.used_count),
                updated_at = NOW()
            WHERE promotion_ledger.retired_at IS NULL
            "#,
        )
        .bind(promotion_id)
        .bind(max_uses as i32)
        .bind(used_count as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_redeem(&self, promotion_id: &str) -> Result<Redeemed, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE promotion_ledger
            SET used_count = used_count + 1, updated_at = NOW()
            WHERE promotion_id = $1 AND used_count < max_uses AND retired_at IS NULL
            RETURNING used_count, max_uses
            "#,
        )
        .bind(promotion_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Redeemed {
                used_count: row.get::<i32, _>("used_count") as u32,
                max_uses: row.get::<i32, _>("max_uses") as u32,
            }),
            None => match self.held_count(promotion_id).await? {
                Some(_) => Err(LedgerError::RedemptionLimitReached),
                None => Err(LedgerError::UnknownPromotion(promotion_id.to_string())),
            },
        }
    }

    async fn release(&self, promotion_id: &str) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE promotion_ledger
            SET used_count = used_count - 1, updated_at = NOW()
            WHERE promotion_id = $1 AND used_count > 0 AND retired_at IS NULL
            "#,
        )
        .bind(promotion_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Release requested for promotion {} with no redemptions", promotion_id);
        }

        Ok(())
    }

    async fn redemption_count(&self, promotion_id: &str) -> Result<Option<u32>, LedgerError> {
        self.held_count(promotion_id).await
    }

    async fn reconfigure(&self, promotion_id: &str, max_uses: u32) -> Result<(), LedgerError> {
        if max_uses == 0 {
            return Err(LedgerError::InvalidLimit);
        }

        let result = sqlx::query(
            r#"
            UPDATE promotion_ledger
            SET max_uses = $2, updated_at = NOW()
            WHERE promotion_id = $1 AND used_count <= $2 AND retired_at IS NULL
            "#,
        )
        .bind(promotion_id)
        .bind(max_uses as i32)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.held_count(promotion_id).await? {
            Some(used) => Err(LedgerError::LimitBelowUsage {
                requested: max_uses,
                used,
            }),
            None => Err(LedgerError::UnknownPromotion(promotion_id.to_string())),
        }
    }

    async fn retire(&self, promotion_id: &str) -> Result<(), LedgerError> {
        // The upsert waits on the row lock of any redemption still in flight
        sqlx::query(
            r#"
            INSERT INTO promotion_ledger (promotion_id, max_uses, used_count, retired_at)
            VALUES ($1, 1, 0, NOW())
            ON CONFLICT (promotion_id) DO UPDATE
            SET retired_at = COALESCE(promotion_ledger.retired_at, NOW()),
                updated_at = NOW()
            "#,
        )
        .bind(promotion_id)
        .execute(&self.pool)
        .await?;

        info!("Retired promotion {} from the ledger", promotion_id);
        Ok(())
    }

    async fn reinstate(
        &self,
        promotion_id: &str,
        max_uses: u32,
        used_count: u32,
    ) -> Result<(), LedgerError> {
        if max_uses == 0 {
            return Err(LedgerError::InvalidLimit);
        }

        sqlx::query(
            r#"
            INSERT INTO promotion_ledger (promotion_id, max_uses, used_count)
            VALUES ($1, $2, LEAST($3, $2))
            ON CONFLICT (promotion_id) DO UPDATE
            SET max_uses = GREATEST(EXCLUDED.max_uses, promotion_ledger.used_count),
                used_count = GREATEST(promotion_ledger.used_count, EXCLUDED.used_count),
                retired_at = NULL,
                updated_at = NOW()
            "#,
        )
        .bind(promotion_id)
        .bind(max_uses as i32)
        .bind(used_count as i32)
        .execute(&self.pool)
        .await?;

        info!("Reinstated promotion {} in the ledger", promotion_id);
        Ok(())
    }
}
