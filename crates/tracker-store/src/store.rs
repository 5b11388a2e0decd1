//! Main store implementation.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use tracker_types::{Coordinate, DayTag, TrackRow};

use crate::dsn::Dsn;
use crate::error::{Error, Result};
use crate::locks::{LockBackend, LockGuard, NamedLocks};
use crate::models::{StageMileage, StoredPosition, TrackSummary};
use crate::queries::PositionQuery;
use crate::schema;

/// How long ordinary statements wait on a busy database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a named lock survives a holder that stops renewing it.
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(30);

/// SQLite-backed store for position tracks.
///
/// A `Store` is one connection handle. It is opened once at startup and
/// borrowed by every component that needs persistence. Named locks taken
/// through the handle are owned by it and released when it is dropped; a
/// handle that disappears without dropping loses them when their lease
/// runs out.
pub struct Store {
    conn: Connection,
    owner: String,
    lock_lease: Duration,
    locks: NamedLocks,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::from_connection(conn)
    }

    /// Open the store a DSN points at.
    pub fn connect(dsn: &Dsn) -> Result<Self> {
        info!(
            "Connecting to store {} on {} as {}",
            dsn.database, dsn.host, dsn.user
        );
        if dsn.is_in_memory() {
            Self::open_in_memory()
        } else {
            Self::open(dsn.database_path())
        }
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        schema::initialize(&conn)?;

        Ok(Self {
            conn,
            owner: uuid::Uuid::new_v4().to_string(),
            lock_lease: DEFAULT_LOCK_LEASE,
            locks: NamedLocks::new(),
        })
    }

    /// Set how long locks taken through this handle stay valid without renewal.
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    /// Lease applied to locks taken through this handle.
    pub fn lock_lease(&self) -> Duration {
        self.lock_lease
    }
}

// Track operations
impl Store {
    /// Persist track rows in one transaction.
    ///
    /// Rows whose (device, timestamp) pair is already stored are skipped, so
    /// overlapping batches are harmless. Returns the number of new rows.
    pub fn insert_samples(&self, rows: &[TrackRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO positions (device_key, timestamp, prev_latitude,
                 prev_longitude, latitude, longitude, altitude, speed, heading,
                 distance_km, track_tag)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;

            for row in rows {
                inserted += stmt.execute(params![
                    row.device_key,
                    row.timestamp,
                    row.previous.map(|c| c.latitude),
                    row.previous.map(|c| c.longitude),
                    row.coordinate.latitude,
                    row.coordinate.longitude,
                    row.altitude,
                    row.speed,
                    row.heading,
                    row.distance_km,
                    row.tag.to_string(),
                ])?;
            }
        }
        tx.commit()?;

        info!("Inserted {} new of {} track rows", inserted, rows.len());
        Ok(inserted)
    }

    /// Newest stored timestamp, or `start` when nothing is stored yet.
    pub fn last_ingested_timestamp(&self, start: i64) -> Result<i64> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(timestamp) FROM positions", [], |row| row.get(0))?;

        debug!("Last ingested timestamp: {:?}", max);
        Ok(max.unwrap_or(start))
    }

    /// Most recent point of a daily track.
    pub fn last_point_of_track(&self, tag: &DayTag) -> Result<Option<Coordinate>> {
        let point = self
            .conn
            .query_row(
                "SELECT latitude, longitude FROM positions
                 WHERE track_tag = ?1
                 ORDER BY timestamp DESC
                 LIMIT 1",
                [tag.to_string()],
                |row| Ok(Coordinate::new(row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(point)
    }

    /// Accumulated distance of a daily track in kilometres.
    pub fn sum_distance(&self, tag: &DayTag) -> Result<f64> {
        let km = self.conn.query_row(
            "SELECT COALESCE(SUM(distance_km), 0.0) FROM positions WHERE track_tag = ?1",
            [tag.to_string()],
            |row| row.get(0),
        )?;
        Ok(km)
    }

    /// Coordinates of a daily track in the order they were recorded.
    pub fn track_points(&self, tag: &DayTag) -> Result<Vec<Coordinate>> {
        let mut stmt = self.conn.prepare(
            "SELECT latitude, longitude FROM positions
             WHERE track_tag = ?1 ORDER BY timestamp ASC",
        )?;

        let points = stmt
            .query_map([tag.to_string()], |row| {
                Ok(Coordinate::new(row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(points)
    }

    /// Every tag with at least one stored fix, oldest first.
    pub fn track_tags(&self) -> Result<Vec<DayTag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT track_tag FROM positions ORDER BY track_tag")?;

        let tags = stmt
            .query_map([], |row| tag_from_row(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tags)
    }

    /// Point count, distance and time span of every track.
    pub fn track_summaries(&self) -> Result<Vec<TrackSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_tag, COUNT(*), COALESCE(SUM(distance_km), 0.0),
                    MIN(timestamp), MAX(timestamp)
             FROM positions GROUP BY track_tag ORDER BY track_tag",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(TrackSummary {
                    tag: tag_from_row(row, 0)?,
                    points: row.get::<_, i64>(1)? as u64,
                    distance_km: row.get(2)?,
                    first_at: datetime_from_row(row, 3)?,
                    last_at: datetime_from_row(row, 4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// Query stored positions with filters.
    pub fn query_positions(&self, query: &PositionQuery) -> Result<Vec<StoredPosition>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let positions = stmt
            .query_map(params_ref.as_slice(), position_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(positions)
    }

    /// Most recent fix at or after `since`.
    pub fn latest_position(&self, since: i64) -> Result<Option<StoredPosition>> {
        let query = PositionQuery::new().since(since).limit(1);
        let mut positions = self.query_positions(&query)?;
        Ok(positions.pop())
    }

    /// Count stored fixes, optionally for one track.
    pub fn count_positions(&self, tag: Option<&DayTag>) -> Result<u64> {
        let count: i64 = match tag {
            Some(tag) => self.conn.query_row(
                "SELECT COUNT(*) FROM positions WHERE track_tag = ?",
                [tag.to_string()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM positions", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

// Stage mileage operations
impl Store {
    /// Record the settled mileage of a completed day.
    ///
    /// Settled mileage is written once; returns `false` if the tag was
    /// already settled, leaving the existing value untouched.
    pub fn settle_stage(&self, tag: &DayTag, mileage: f64) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO stage_mileage (track_tag, mileage, settled_at)
             VALUES (?1, ?2, ?3)",
            params![tag.to_string(), mileage, now_unix()],
        )?;

        if inserted == 0 {
            warn!("Stage {} is already settled", tag);
        }
        Ok(inserted == 1)
    }

    /// Sum of settled mileage for every tag strictly before `tag`.
    pub fn settled_mileage_before(&self, tag: &DayTag) -> Result<f64> {
        let miles = self.conn.query_row(
            "SELECT COALESCE(SUM(mileage), 0.0) FROM stage_mileage WHERE track_tag < ?1",
            [tag.to_string()],
            |row| row.get(0),
        )?;
        Ok(miles)
    }

    /// All settled stages, oldest first.
    pub fn stage_mileage(&self) -> Result<Vec<StageMileage>> {
        let mut stmt = self.conn.prepare(
            "SELECT track_tag, mileage, settled_at FROM stage_mileage ORDER BY track_tag",
        )?;

        let stages = stmt
            .query_map([], |row| {
                Ok(StageMileage {
                    tag: tag_from_row(row, 0)?,
                    mileage: row.get(1)?,
                    settled_at: datetime_from_row(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stages)
    }
}

// Named lock operations
impl Store {
    /// Acquire a named lock, returning whether this handle now holds it.
    ///
    /// `timeout` bounds how long the database may block while granting a
    /// free lock; a lock held by another handle fails immediately.
    pub fn acquire_lock(&self, name: &str, timeout: Duration) -> Result<bool> {
        self.locks.acquire(&self.lock_backend(), name, timeout)
    }

    /// Start a fresh lease on a lock this handle holds.
    ///
    /// Returns `false` when the handle does not hold `name` or has lost it
    /// to another handle after its lease ran out.
    pub fn renew_lock(&self, name: &str) -> Result<bool> {
        self.locks.renew(&self.lock_backend(), name)
    }

    /// Release a named lock held by this handle.
    pub fn release_lock(&self, name: &str) -> Result<()> {
        self.locks.release(&self.lock_backend(), name)
    }

    /// Acquire a named lock for the lifetime of the returned guard.
    ///
    /// Returns `None` when the lock is held elsewhere.
    pub fn try_lock(&self, name: &str, timeout: Duration) -> Result<Option<LockGuard<'_>>> {
        if self.acquire_lock(name, timeout)? {
            Ok(Some(LockGuard::new(self, name)))
        } else {
            Ok(None)
        }
    }

    /// Names of the locks this handle holds.
    pub fn held_locks(&self) -> Vec<String> {
        self.locks.held()
    }

    fn lock_backend(&self) -> SqliteLocks<'_> {
        SqliteLocks {
            conn: &self.conn,
            owner: &self.owner,
            lease: self.lock_lease,
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.locks.release_all(&self.lock_backend()) {
            warn!("Failed to release locks on close: {}", e);
        }
    }
}

/// Lock rows in the `named_locks` table.
///
/// SQLite has no session-scoped locks, so each row carries an expiry in unix
/// milliseconds; a row past its expiry counts as free.
struct SqliteLocks<'a> {
    conn: &'a Connection,
    owner: &'a str,
    lease: Duration,
}

impl SqliteLocks<'_> {
    fn expires_at(&self, now: i64) -> i64 {
        now.saturating_add(i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX))
    }

    fn insert_lock(&self, name: &str) -> rusqlite::Result<bool> {
        let now = now_millis();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let reclaimed = tx.execute(
            "DELETE FROM named_locks WHERE name = ?1 AND (expires_at <= ?2 OR owner = ?3)",
            params![name, now, self.owner],
        )?;
        if reclaimed > 0 {
            warn!("Reclaimed expired lock '{}'", name);
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO named_locks (name, owner, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, self.owner, now, self.expires_at(now)],
        )?;
        tx.commit()?;

        Ok(inserted == 1)
    }
}

impl LockBackend for SqliteLocks<'_> {
    fn lease(&self) -> Duration {
        self.lease
    }

    fn lock_is_free(&self, name: &str) -> rusqlite::Result<bool> {
        self.conn.query_row(
            "SELECT NOT EXISTS (
                SELECT 1 FROM named_locks
                WHERE name = ?1 AND expires_at > ?2 AND owner <> ?3
             )",
            params![name, now_millis(), self.owner],
            |row| row.get(0),
        )
    }

    fn obtain_lock(&self, name: &str, timeout: Duration) -> rusqlite::Result<bool> {
        self.conn.busy_timeout(timeout)?;
        let result = self.insert_lock(name);
        self.conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;

        match result {
            Err(e) if is_busy(&e) => {
                debug!("Timed out after {:?} waiting to obtain lock '{}'", timeout, name);
                Ok(false)
            }
            other => other,
        }
    }

    fn renew_lock(&self, name: &str) -> rusqlite::Result<bool> {
        let now = now_millis();
        let renewed = self.conn.execute(
            "UPDATE named_locks SET expires_at = ?3 WHERE name = ?1 AND owner = ?2",
            params![name, self.owner, self.expires_at(now)],
        )?;
        Ok(renewed == 1)
    }

    fn free_lock(&self, name: &str) -> rusqlite::Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM named_locks WHERE name = ?1 AND owner = ?2",
            params![name, self.owner],
        )?;
        Ok(deleted == 1)
    }
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn now_millis() -> i64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn position_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredPosition> {
    let prev_latitude: Option<f64> = row.get(3)?;
    let prev_longitude: Option<f64> = row.get(4)?;

    Ok(StoredPosition {
        id: row.get(0)?,
        device_key: row.get(1)?,
        recorded_at: datetime_from_row(row, 2)?,
        previous: prev_latitude
            .zip(prev_longitude)
            .map(|(lat, lon)| Coordinate::new(lat, lon)),
        coordinate: Coordinate::new(row.get(5)?, row.get(6)?),
        altitude: row.get(7)?,
        speed: row.get(8)?,
        heading: row.get(9)?,
        distance_km: row.get(10)?,
        tag: tag_from_row(row, 11)?,
    })
}

fn tag_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DayTag> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn datetime_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let ts: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}
