use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row, postgres::{PgPoolOptions, PgRow}};

use crate::policy::GroupPolicy;
use crate::store::{BanRecord, NewBanRecord, Store};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str, max: Option<u32>) -> Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(max.unwrap_or(10))
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;
    Ok(pool)
}

/// Schemat `tgk` (polityki gildii + historia banów).
pub async fn migrate(pool: &Db) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/* ==============================
   Store na Postgresie
   ============================== */

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

const POLICY_COLUMNS: &str = "group_id, admin_id, restrict_premium, restrict_emoji_name, \
     restrict_random_username, restrict_bio_link, use_reputation, notify_admin, \
     language, empowered, title, link";

const BAN_COLUMNS: &str =
    "id, group_id, user_id, reason, unbanned, unbanned_by, created_at, updated_at";

fn policy_from_row(r: &PgRow) -> Result<GroupPolicy> {
    let gid: i64 = r.try_get("group_id")?;
    let admin: Option<i64> = r.try_get("admin_id")?;
    Ok(GroupPolicy {
        group_id: gid as u64,
        admin_id: admin.map(|a| a as u64),
        restrict_premium: r.try_get("restrict_premium")?,
        restrict_emoji_name: r.try_get("restrict_emoji_name")?,
        restrict_random_username: r.try_get("restrict_random_username")?,
        restrict_bio_link: r.try_get("restrict_bio_link")?,
        use_reputation: r.try_get("use_reputation")?,
        notify_admin: r.try_get("notify_admin")?,
        language: r.try_get("language")?,
        empowered: r.try_get("empowered")?,
        title: r.try_get("title")?,
        link: r.try_get("link")?,
    })
}

fn ban_from_row(r: &PgRow) -> Result<BanRecord> {
    let gid: i64 = r.try_get("group_id")?;
    let uid: i64 = r.try_get("user_id")?;
    let by: Option<i64> = r.try_get("unbanned_by")?;
    let created_at: DateTime<Utc> = r.try_get("created_at")?;
    let updated_at: DateTime<Utc> = r.try_get("updated_at")?;
    Ok(BanRecord {
        id: r.try_get("id")?,
        group_id: gid as u64,
        user_id: uid as u64,
        reason: r.try_get("reason")?,
        unbanned: r.try_get("unbanned")?,
        unbanned_by: by.map(|b| b as u64),
        created_at,
        updated_at,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn load_policy(&self, group_id: u64) -> Result<Option<GroupPolicy>> {
        let q = format!("SELECT {POLICY_COLUMNS} FROM tgk.group_policies WHERE group_id = $1");
        let row = sqlx::query(&q)
            .bind(group_id as i64)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(policy_from_row).transpose()
    }

    async fn save_policy(&self, p: &GroupPolicy) -> Result<()> {
        let q = r#"INSERT INTO tgk.group_policies
                     (group_id, admin_id, restrict_premium, restrict_emoji_name,
                      restrict_random_username, restrict_bio_link, use_reputation, notify_admin,
                      language, empowered, title, link, updated_at)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
                   ON CONFLICT (group_id) DO UPDATE SET
                      admin_id = EXCLUDED.admin_id,
                      restrict_premium = EXCLUDED.restrict_premium,
                      restrict_emoji_name = EXCLUDED.restrict_emoji_name,
                      restrict_random_username = EXCLUDED.restrict_random_username,
                      restrict_bio_link = EXCLUDED.restrict_bio_link,
                      use_reputation = EXCLUDED.use_reputation,
                      notify_admin = EXCLUDED.notify_admin,
                      language = EXCLUDED.language,
                      empowered = EXCLUDED.empowered,
                      title = EXCLUDED.title,
                      link = EXCLUDED.link,
                      updated_at = now()"#;
        sqlx::query(q)
            .bind(p.group_id as i64)
            .bind(p.admin_id.map(|a| a as i64))
            .bind(p.restrict_premium)
            .bind(p.restrict_emoji_name)
            .bind(p.restrict_random_username)
            .bind(p.restrict_bio_link)
            .bind(p.use_reputation)
            .bind(p.notify_admin)
            .bind(&p.language)
            .bind(p.empowered)
            .bind(&p.title)
            .bind(p.link.as_deref())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn create_ban_record(&self, rec: &NewBanRecord) -> Result<bool> {
        // indeks częściowy ux_ban_records_active pilnuje jednego aktywnego wpisu
        let q = r#"INSERT INTO tgk.ban_records (group_id, user_id, reason)
                   VALUES ($1, $2, $3)
                   ON CONFLICT (group_id, user_id) WHERE NOT unbanned DO NOTHING"#;
        let res = sqlx::query(q)
            .bind(rec.group_id as i64)
            .bind(rec.user_id as i64)
            .bind(&rec.reason)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn find_active_ban_record(&self, group_id: u64, user_id: u64) -> Result<Option<BanRecord>> {
        let q = format!(
            "SELECT {BAN_COLUMNS} FROM tgk.ban_records \
             WHERE group_id = $1 AND user_id = $2 AND NOT unbanned"
        );
        let row = sqlx::query(&q)
            .bind(group_id as i64)
            .bind(user_id as i64)
            .fetch_optional(&self.db)
            .await?;
        row.as_ref().map(ban_from_row).transpose()
    }

    async fn deactivate_ban_record(&self, group_id: u64, user_id: u64, actor: u64) -> Result<bool> {
        let q = r#"UPDATE tgk.ban_records
                   SET unbanned = TRUE, unbanned_by = $3, updated_at = now()
                   WHERE group_id = $1 AND user_id = $2 AND NOT unbanned"#;
        let res = sqlx::query(q)
            .bind(group_id as i64)
            .bind(user_id as i64)
            .bind(actor as i64)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_policies_by_admin(&self, admin_id: u64) -> Result<Vec<GroupPolicy>> {
        let q = format!(
            "SELECT {POLICY_COLUMNS} FROM tgk.group_policies WHERE admin_id = $1 ORDER BY group_id"
        );
        let rows = sqlx::query(&q)
            .bind(admin_id as i64)
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(policy_from_row).collect()
    }
}
