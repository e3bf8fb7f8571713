//! SQLite 存储实现
//!
//! 使用 SQLite 作为后端，多个服务实例可以共享同一个数据库文件

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};

use crate::core::store::{InviteStore, StoreError, StoreResult};
use crate::domain::invitation_code::{InviteCode, InviteUsage, Reservation, ReservationState, ServerType};
use crate::domain::user::ProvisionedUser;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

const INVITE_COLUMNS: &str =
    "code, server_type, max_uses, uses_remaining, expires_at, created_at, libraries, duration_days";

const USER_COLUMNS: &str =
    "id, username, email, external_user_id, server_type, invite_code, created_at, expires_at";

/// SQLite 存储
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 创建新的 SQLite 存储
    ///
    /// 如果数据库文件不存在，会自动创建
    pub fn new<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        // 其他实例持有写锁时等待而不是立即失败
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// 创建内存数据库（用于测试）
    pub fn new_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 初始化数据库表结构
    fn init_schema(&self) -> StoreResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(format!("Failed to acquire database lock: {}", e)))?;

        conn.execute_batch(
            "
            -- 邀请码表（max_uses 为 NULL 表示不限次数）
            CREATE TABLE IF NOT EXISTS invites (
                code TEXT PRIMARY KEY,
                server_type TEXT NOT NULL,
                max_uses INTEGER,
                uses_remaining INTEGER NOT NULL CHECK (uses_remaining >= 0),
                expires_at INTEGER,
                created_at INTEGER NOT NULL,
                libraries TEXT NOT NULL DEFAULT '[]',
                duration_days INTEGER
            );

            -- 预留表
            CREATE TABLE IF NOT EXISTS invite_reservations (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                state TEXT NOT NULL,
                user_id TEXT,
                created_at INTEGER NOT NULL
            );

            -- 已开通用户表
            CREATE TABLE IF NOT EXISTS provisioned_users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT NOT NULL,
                external_user_id TEXT NOT NULL,
                server_type TEXT NOT NULL,
                invite_code TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_reservations_code ON invite_reservations(code);
            CREATE INDEX IF NOT EXISTS idx_users_username ON provisioned_users(username COLLATE NOCASE);
            CREATE INDEX IF NOT EXISTS idx_users_email ON provisioned_users(email COLLATE NOCASE);
            ",
        )?;

        Ok(())
    }

    /// 在阻塞线程池中执行数据库操作
    async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Database(format!("Failed to acquire database lock: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("Task failed: {}", e)))?
    }
}

fn parse_server_type(row: &Row<'_>, idx: usize) -> rusqlite::Result<ServerType> {
    let raw: String = row.get(idx)?;
    raw.parse::<ServerType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn invite_from_row(row: &Row<'_>) -> rusqlite::Result<InviteCode> {
    let max_uses: Option<u32> = row.get(2)?;
    let libraries: String = row.get(6)?;

    Ok(InviteCode {
        code: row.get(0)?,
        server_type: parse_server_type(row, 1)?,
        max_uses: max_uses.map_or(InviteUsage::Unlimited, InviteUsage::Limited),
        uses_remaining: row.get(3)?,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
        libraries: serde_json::from_str(&libraries).unwrap_or_default(),
        duration_days: row.get(7)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<ProvisionedUser> {
    Ok(ProvisionedUser {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        external_user_id: row.get(3)?,
        server_type: parse_server_type(row, 4)?,
        invite_code: row.get(5)?,
        created_at: row.get(6)?,
        expires_at: row.get(7)?,
    })
}

fn select_invite(conn: &Connection, code: &str) -> StoreResult<Option<InviteCode>> {
    let sql = format!("SELECT {} FROM invites WHERE code = ?1", INVITE_COLUMNS);
    Ok(conn.query_row(&sql, [code], invite_from_row).optional()?)
}

#[async_trait]
impl InviteStore for SqliteStore {
    async fn lookup(&self, code: &str) -> StoreResult<InviteCode> {
        let code = code.to_string();
        self.execute(move |conn| select_invite(conn, &code)?.ok_or(StoreError::NotFound))
            .await
    }

    async fn reserve_and_decrement(&self, code: &str) -> StoreResult<Reservation> {
        let code = code.to_string();
        self.execute(move |conn| {
            let now = chrono::Utc::now().timestamp();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            // 条件更新：只有仍有剩余且未过期时才减一
            let changed = tx.execute(
                "UPDATE invites SET uses_remaining = uses_remaining - 1
                 WHERE code = ?1
                   AND max_uses IS NOT NULL
                   AND uses_remaining > 0
                   AND (expires_at IS NULL OR expires_at > ?2)",
                rusqlite::params![&code, now],
            )?;

            if changed == 0 {
                let invite = select_invite(&tx, &code)?.ok_or(StoreError::NotFound)?;
                if invite.is_expired_at(now) {
                    return Err(StoreError::Expired);
                }
                if !invite.is_unlimited() {
                    return Err(StoreError::Exhausted);
                }
            }

            let reservation = Reservation::new(code);
            tx.execute(
                "INSERT INTO invite_reservations (id, code, state, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    &reservation.id,
                    &reservation.code,
                    ReservationState::Pending.as_str(),
                    reservation.created_at,
                ],
            )?;
            tx.commit()?;

            Ok(reservation)
        })
        .await
    }

    async fn release(&self, reservation: &Reservation) -> StoreResult<bool> {
        let reservation = reservation.clone();
        self.execute(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let transitioned = tx.execute(
                "UPDATE invite_reservations SET state = ?2 WHERE id = ?1 AND state = ?3",
                rusqlite::params![
                    &reservation.id,
                    ReservationState::Released.as_str(),
                    ReservationState::Pending.as_str(),
                ],
            )?;

            if transitioned == 1 {
                tx.execute(
                    "UPDATE invites SET uses_remaining = MIN(uses_remaining + 1, max_uses)
                     WHERE code = ?1 AND max_uses IS NOT NULL",
                    [&reservation.code],
                )?;
            }
            tx.commit()?;

            Ok(transitioned == 1)
        })
        .await
    }

    async fn confirm(&self, reservation: &Reservation, user_id: &str) -> StoreResult<()> {
        let reservation_id = reservation.id.clone();
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE invite_reservations SET state = ?2, user_id = ?3 WHERE id = ?1 AND state = ?4",
                rusqlite::params![
                    &reservation_id,
                    ReservationState::Confirmed.as_str(),
                    &user_id,
                    ReservationState::Pending.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn save_invite(&self, invite: &InviteCode) -> StoreResult<()> {
        let invite = invite.clone();
        self.execute(move |conn| {
            let max_uses = match invite.max_uses {
                InviteUsage::Limited(n) => Some(n),
                InviteUsage::Unlimited => None,
            };
            let libraries = serde_json::to_string(&invite.libraries).unwrap_or_else(|_| "[]".to_string());

            conn.execute(
                "INSERT OR REPLACE INTO invites (
                    code, server_type, max_uses, uses_remaining, expires_at, created_at, libraries, duration_days
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    &invite.code,
                    invite.server_type.as_str(),
                    max_uses,
                    invite.uses_remaining,
                    invite.expires_at,
                    invite.created_at,
                    libraries,
                    invite.duration_days,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn save_user(&self, user: &ProvisionedUser) -> StoreResult<()> {
        let user = user.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO provisioned_users (
                    id, username, email, external_user_id, server_type, invite_code, created_at, expires_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    &user.id,
                    &user.username,
                    &user.email,
                    &user.external_user_id,
                    user.server_type.as_str(),
                    &user.invite_code,
                    user.created_at,
                    user.expires_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_user(&self, username: &str, email: &str) -> StoreResult<Option<ProvisionedUser>> {
        let username = username.to_string();
        let email = email.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {} FROM provisioned_users
                 WHERE username = ?1 COLLATE NOCASE OR email = ?2 COLLATE NOCASE
                 LIMIT 1",
                USER_COLUMNS
            );
            Ok(conn
                .query_row(&sql, [&username, &email], user_from_row)
                .optional()?)
        })
        .await
    }

    async fn load_users(&self) -> StoreResult<Vec<ProvisionedUser>> {
        self.execute(|conn| {
            let sql = format!("SELECT {} FROM provisioned_users", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let user_iter = stmt.query_map([], user_from_row)?;

            let mut users = Vec::new();
            for user in user_iter {
                users.push(user?);
            }

            Ok(users)
        })
        .await
    }
}
