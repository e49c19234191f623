//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Repository`] trait is the persistence boundary of the ingestion
//! pipeline; [`Storage`] implements it over a local libSQL database holding
//! companies, sources, company-source links, people, and funding rounds.
//!
//! **Access rules:**
//! - `neolabs ingest` / `neolabs refresh`: read-write via [`Storage::open`]
//! - `neolabs list` and dashboards: read-only via [`Storage::open_readonly`]

mod migrations;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, params};
use neolabs_shared::{
    Candidate, CompanyStatus, FundingRound, KnownCompany, NeoLabsError, Person, RefreshUpdate,
    Result, Source, SourceKind, max_time, merge_aliases, normalize_name, normalize_url,
};
use uuid::Uuid;

/// Outcome of an upsert keyed by a natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: String,
    pub created: bool,
}

/// Canonical source URL -> stored source id, used to resolve `source_url`
/// references on people and funding rounds.
pub type SourceIds = HashMap<String, String>;

/// Persistence operations the pipeline needs. Every write is idempotent by
/// natural key so re-running an ingest leaves row counts unchanged.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Known companies, least recently verified first (never-verified first of all).
    async fn list_companies(&self) -> Result<Vec<KnownCompany>>;

    /// Match by canonical domain, then by alias; fill empty fields on match.
    async fn upsert_company(&self, candidate: &Candidate) -> Result<UpsertOutcome>;

    /// Keyed by canonical URL; existing fields win.
    async fn upsert_source(&self, source: &Source) -> Result<UpsertOutcome>;

    async fn link_company_source(
        &self,
        company_id: &str,
        source_id: &str,
        kind: SourceKind,
    ) -> Result<bool>;

    /// Returns the number of input people processed.
    async fn upsert_people(
        &self,
        company_id: &str,
        people: &[Person],
        source_ids: &SourceIds,
    ) -> Result<usize>;

    /// Returns the number of input rounds processed.
    async fn upsert_funding_rounds(
        &self,
        company_id: &str,
        rounds: &[FundingRound],
        source_ids: &SourceIds,
    ) -> Result<usize>;

    /// Apply the present fields of `update`; absent fields are left alone.
    async fn update_company_from_refresh(&self, company_id: &str, update: &RefreshUpdate)
    -> Result<()>;
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub companies: u64,
    pub sources: u64,
    pub company_sources: u64,
    pub people: u64,
    pub funding_rounds: u64,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NeoLabsError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        NeoLabsError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NeoLabsError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Row counts for every pipeline table.
    pub async fn counts(&self) -> Result<TableCounts> {
        Ok(TableCounts {
            companies: self.count("companies").await?,
            sources: self.count("sources").await?,
            company_sources: self.count("company_sources").await?,
            people: self.count("people").await?,
            funding_rounds: self.count("funding_rounds").await?,
        })
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {table}"), params![])
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map(|n| n as u64).unwrap_or(0)),
            Ok(None) => Ok(0),
            Err(e) => Err(NeoLabsError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Company lookups
    // -----------------------------------------------------------------------

    async fn find_company_id(&self, domain: Option<&str>, normalized: &str) -> Result<Option<String>> {
        if let Some(domain) = domain {
            let mut rows = self
                .conn
                .query(
                    "SELECT id FROM companies WHERE canonical_domain = ?1 LIMIT 1",
                    params![domain],
                )
                .await
                .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
            if let Ok(Some(row)) = rows.next().await {
                return Ok(row.get::<String>(0).ok());
            }
        }

        if normalized.is_empty() {
            return Ok(None);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM companies
                 WHERE EXISTS (SELECT 1 FROM json_each(companies.aliases) WHERE value = ?1)
                 ORDER BY created_at LIMIT 1",
                params![normalized],
            )
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(NeoLabsError::Storage(e.to_string())),
        }
    }

    async fn company_merge_state(
        &self,
        id: &str,
    ) -> Result<(Vec<String>, Option<DateTime<Utc>>)> {
        let mut rows = self
            .conn
            .query(
                "SELECT aliases, last_verified_at FROM companies WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => Ok((
                parse_json_list(row.get::<String>(0).ok()),
                parse_time(row.get::<String>(1).ok()),
            )),
            Ok(None) => Err(NeoLabsError::Storage(format!("company {id} vanished"))),
            Err(e) => Err(NeoLabsError::Storage(e.to_string())),
        }
    }

    async fn find_source(&self, url: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT id FROM sources WHERE url = ?1", params![url])
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(NeoLabsError::Storage(e.to_string())),
        }
    }

    async fn company_rounds(&self, company_id: &str) -> Result<Vec<(String, FundingRound)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, round_type, amount_usd, valuation_usd, announced_at, investors
                 FROM funding_rounds WHERE company_id = ?1",
                params![company_id],
            )
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id = row
                .get::<String>(0)
                .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
            results.push((
                id,
                FundingRound {
                    round_type: row.get::<String>(1).ok(),
                    amount_usd: row.get::<i64>(2).ok().map(|v| v as u64),
                    valuation_usd: row.get::<i64>(3).ok().map(|v| v as u64),
                    announced_at: row
                        .get::<String>(4)
                        .ok()
                        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                    investors: parse_json_list(row.get::<String>(5).ok()),
                    source_url: None,
                },
            ));
        }
        Ok(results)
    }
}

#[async_trait]
impl Repository for Storage {
    async fn list_companies(&self) -> Result<Vec<KnownCompany>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, canonical_domain, website_url, aliases, last_verified_at, status,
                        employee_count, known_revenue, focus, hq_location, founded_year, description
                 FROM companies ORDER BY last_verified_at ASC, created_at ASC",
                params![],
            )
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_known_company(&row)?);
        }
        Ok(results)
    }

    async fn upsert_company(&self, candidate: &Candidate) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let normalized = normalize_name(&candidate.name);
        let mut incoming: Vec<String> = candidate.aliases.iter().cloned().collect();
        if !normalized.is_empty() {
            incoming.push(normalized.clone());
        }
        let now = Utc::now().to_rfc3339();

        let existing = self
            .find_company_id(candidate.canonical_domain.as_deref(), &normalized)
            .await?;

        if let Some(id) = existing {
            let (stored_aliases, stored_verified) = self.company_merge_state(&id).await?;
            let aliases = merge_aliases(&stored_aliases, &incoming);
            let verified = max_time(stored_verified, candidate.last_verified_at);
            self.conn
                .execute(
                    "UPDATE companies SET
                       website_url = COALESCE(website_url, ?2),
                       canonical_domain = COALESCE(canonical_domain, ?3),
                       aliases = ?4,
                       last_verified_at = ?5,
                       updated_at = ?6
                     WHERE id = ?1",
                    params![
                        id.as_str(),
                        candidate.website_url.as_deref(),
                        candidate.canonical_domain.as_deref(),
                        to_json_list(&aliases)?,
                        verified.map(|t| t.to_rfc3339()),
                        now.as_str(),
                    ],
                )
                .await
                .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
            return Ok(UpsertOutcome { id, created: false });
        }

        let id = Uuid::now_v7().to_string();
        let aliases = merge_aliases(&incoming, std::iter::empty());
        self.conn
            .execute(
                "INSERT INTO companies (id, name, canonical_domain, website_url, status, aliases,
                                        last_verified_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.as_str(),
                    candidate.name.as_str(),
                    candidate.canonical_domain.as_deref(),
                    candidate.website_url.as_deref(),
                    CompanyStatus::Active.as_str(),
                    to_json_list(&aliases)?,
                    candidate.last_verified_at.map(|t| t.to_rfc3339()),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
        Ok(UpsertOutcome { id, created: true })
    }

    async fn upsert_source(&self, source: &Source) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let url = normalize_url(&source.url).unwrap_or_else(|| source.url.clone());
        let now = Utc::now().to_rfc3339();
        let published = source.published_at.map(|t| t.to_rfc3339());

        if let Some(id) = self.find_source(&url).await? {
            self.conn
                .execute(
                    "UPDATE sources SET
                       title = COALESCE(title, ?2),
                       publisher = COALESCE(publisher, ?3),
                       published_at = COALESCE(published_at, ?4),
                       updated_at = ?5
                     WHERE id = ?1",
                    params![
                        id.as_str(),
                        source.title.as_deref(),
                        source.publisher.as_deref(),
                        published,
                        now.as_str(),
                    ],
                )
                .await
                .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
            return Ok(UpsertOutcome { id, created: false });
        }

        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO sources (id, url, title, publisher, published_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    url.as_str(),
                    source.title.as_deref(),
                    source.publisher.as_deref(),
                    published,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
        Ok(UpsertOutcome { id, created: true })
    }

    async fn link_company_source(
        &self,
        company_id: &str,
        source_id: &str,
        kind: SourceKind,
    ) -> Result<bool> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO company_sources (company_id, source_id, source_kind, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(company_id, source_id, source_kind) DO UPDATE SET
                   updated_at = excluded.updated_at",
                params![company_id, source_id, kind.as_str(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
        Ok(true)
    }

    async fn upsert_people(
        &self,
        company_id: &str,
        people: &[Person],
        source_ids: &SourceIds,
    ) -> Result<usize> {
        self.check_writable()?;
        let mut upserted = 0;

        for person in people {
            let normalized = normalize_name(&person.name);
            if normalized.is_empty() {
                continue;
            }
            let primary_source_id = person
                .primary_source_url
                .as_deref()
                .and_then(|url| lookup_source(source_ids, url));

            self.conn
                .execute(
                    "INSERT INTO people (id, company_id, name, normalized_name, role, is_founder,
                                         profile_url, primary_source_id, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(company_id, normalized_name) DO UPDATE SET
                       role = COALESCE(people.role, excluded.role),
                       profile_url = COALESCE(people.profile_url, excluded.profile_url),
                       primary_source_id = COALESCE(people.primary_source_id, excluded.primary_source_id),
                       updated_at = excluded.updated_at",
                    params![
                        Uuid::now_v7().to_string(),
                        company_id,
                        person.name.as_str(),
                        normalized.as_str(),
                        person.role.as_deref(),
                        i64::from(person.is_founder),
                        person.profile_url.as_deref(),
                        primary_source_id,
                        Utc::now().to_rfc3339(),
                    ],
                )
                .await
                .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
            upserted += 1;
        }

        Ok(upserted)
    }

    async fn upsert_funding_rounds(
        &self,
        company_id: &str,
        rounds: &[FundingRound],
        source_ids: &SourceIds,
    ) -> Result<usize> {
        self.check_writable()?;
        let mut stored = self.company_rounds(company_id).await?;
        let mut upserted = 0;

        for round in rounds {
            let source_id = round
                .source_url
                .as_deref()
                .and_then(|url| lookup_source(source_ids, url));
            let now = Utc::now().to_rfc3339();

            match stored.iter().find(|(_, existing)| existing.same_identity(round)) {
                Some((id, existing)) => {
                    let investors = if existing.investors.is_empty() {
                        &round.investors
                    } else {
                        &existing.investors
                    };
                    self.conn
                        .execute(
                            "UPDATE funding_rounds SET
                               amount_usd = COALESCE(amount_usd, ?2),
                               valuation_usd = COALESCE(valuation_usd, ?3),
                               investors = ?4,
                               source_id = COALESCE(source_id, ?5),
                               updated_at = ?6
                             WHERE id = ?1",
                            params![
                                id.as_str(),
                                round.amount_usd.map(|v| v as i64),
                                round.valuation_usd.map(|v| v as i64),
                                to_json_list(investors)?,
                                source_id,
                                now.as_str(),
                            ],
                        )
                        .await
                        .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
                }
                None => {
                    let id = Uuid::now_v7().to_string();
                    self.conn
                        .execute(
                            "INSERT INTO funding_rounds (id, company_id, round_type, amount_usd,
                                                         valuation_usd, announced_at, investors,
                                                         source_id, updated_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                            params![
                                id.as_str(),
                                company_id,
                                round.round_type.as_deref(),
                                round.amount_usd.map(|v| v as i64),
                                round.valuation_usd.map(|v| v as i64),
                                round.announced_at.map(|d| d.format("%Y-%m-%d").to_string()),
                                to_json_list(&round.investors)?,
                                source_id,
                                now.as_str(),
                            ],
                        )
                        .await
                        .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
                    stored.push((id, round.clone()));
                }
            }
            upserted += 1;
        }

        Ok(upserted)
    }

    async fn update_company_from_refresh(
        &self,
        company_id: &str,
        update: &RefreshUpdate,
    ) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE companies SET
                   website_url = COALESCE(?2, website_url),
                   canonical_domain = COALESCE(?3, canonical_domain),
                   employee_count = COALESCE(?4, employee_count),
                   known_revenue = COALESCE(?5, known_revenue),
                   status = COALESCE(?6, status),
                   description = COALESCE(?7, description),
                   focus = COALESCE(?8, focus),
                   hq_location = COALESCE(?9, hq_location),
                   founded_year = COALESCE(?10, founded_year),
                   last_verified_at = ?11,
                   updated_at = ?12
                 WHERE id = ?1",
                params![
                    company_id,
                    update.website_url.as_deref(),
                    update.canonical_domain.as_deref(),
                    update.employee_count.map(i64::from),
                    update.known_revenue.as_deref(),
                    update.status.map(|s| s.as_str()),
                    update.description.as_deref(),
                    update.focus.as_deref(),
                    update.hq_location.as_deref(),
                    update.founded_year.map(i64::from),
                    update.last_verified_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?;
        Ok(())
    }
}

fn lookup_source(source_ids: &SourceIds, url: &str) -> Option<String> {
    let key = normalize_url(url).unwrap_or_else(|| url.to_string());
    source_ids.get(&key).cloned()
}

fn parse_json_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn to_json_list(items: &[String]) -> Result<String> {
    serde_json::to_string(items).map_err(|e| NeoLabsError::Storage(e.to_string()))
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Convert a database row to a [`KnownCompany`].
fn row_to_known_company(row: &libsql::Row) -> Result<KnownCompany> {
    Ok(KnownCompany {
        id: row
            .get::<String>(0)
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?,
        name: row
            .get::<String>(1)
            .map_err(|e| NeoLabsError::Storage(e.to_string()))?,
        canonical_domain: row.get::<String>(2).ok(),
        website_url: row.get::<String>(3).ok(),
        aliases: parse_json_list(row.get::<String>(4).ok()),
        last_verified_at: parse_time(row.get::<String>(5).ok()),
        status: row
            .get::<String>(6)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        employee_count: row.get::<i64>(7).ok().map(|v| v as u32),
        known_revenue: row.get::<String>(8).ok(),
        focus: row.get::<String>(9).ok(),
        hq_location: row.get::<String>(10).ok(),
        founded_year: row.get::<i64>(11).ok().map(|v| v as i32),
        description: row.get::<String>(12).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("neolabs_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn candidate(name: &str) -> Candidate {
        Candidate::new(name)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
        assert_eq!(storage.counts().await.unwrap(), TableCounts::default());
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("neolabs_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn company_matches_by_alias_and_merges() {
        let storage = test_storage().await;
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        let mut first = candidate("Periodic Labs");
        first.last_verified_at = Some(late);
        let created = storage.upsert_company(&first).await.unwrap();
        assert!(created.created);

        let mut second = candidate("Periodic Labs");
        second.add_alias("Periodic");
        second.website_url = Some("https://periodic.com".into());
        second.last_verified_at = Some(early);
        let merged = storage.upsert_company(&second).await.unwrap();
        assert!(!merged.created);
        assert_eq!(merged.id, created.id);

        let companies = storage.list_companies().await.unwrap();
        assert_eq!(companies.len(), 1);
        let company = &companies[0];
        assert_eq!(company.aliases, vec!["periodic", "periodic labs"]);
        assert_eq!(company.website_url.as_deref(), Some("https://periodic.com"));
        assert_eq!(company.last_verified_at, Some(late));
        assert_eq!(company.status, CompanyStatus::Active);
    }

    #[tokio::test]
    async fn company_matches_by_domain_first() {
        let storage = test_storage().await;
        let mut a = candidate("Thinking Machines Lab");
        a.canonical_domain = Some("thinkingmachines.ai".into());
        let first = storage.upsert_company(&a).await.unwrap();

        let mut b = candidate("Thinking Machines");
        b.canonical_domain = Some("thinkingmachines.ai".into());
        let second = storage.upsert_company(&b).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(!second.created);
        assert_eq!(storage.counts().await.unwrap().companies, 1);
    }

    #[tokio::test]
    async fn list_orders_unverified_first() {
        let storage = test_storage().await;
        let mut old = candidate("Old Lab");
        old.last_verified_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut new = candidate("New Lab");
        new.last_verified_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        storage.upsert_company(&new).await.unwrap();
        storage.upsert_company(&old).await.unwrap();
        storage.upsert_company(&candidate("Never Lab")).await.unwrap();

        let names: Vec<String> = storage
            .list_companies()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Never Lab", "Old Lab", "New Lab"]);
    }

    #[tokio::test]
    async fn source_upsert_is_first_wins() {
        let storage = test_storage().await;
        let mut first = Source::new("https://www.techcrunch.com/a/?utm_source=x");
        first.title = Some("First".into());
        let created = storage.upsert_source(&first).await.unwrap();
        assert!(created.created);

        let mut second = Source::new("https://techcrunch.com/a");
        second.title = Some("Second".into());
        second.publisher = Some("TechCrunch".into());
        let again = storage.upsert_source(&second).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.id, created.id);

        let mut rows = storage
            .conn
            .query("SELECT url, title, publisher FROM sources", params![])
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "https://techcrunch.com/a");
        assert_eq!(row.get::<String>(1).unwrap(), "First");
        assert_eq!(row.get::<String>(2).unwrap(), "TechCrunch");
    }

    #[tokio::test]
    async fn links_and_people_are_idempotent() {
        let storage = test_storage().await;
        let company = storage.upsert_company(&candidate("AlphaLab")).await.unwrap();
        let source = storage
            .upsert_source(&Source::new("https://techcrunch.com/alpha"))
            .await
            .unwrap();
        let mut ids = SourceIds::new();
        ids.insert("https://techcrunch.com/alpha".into(), source.id.clone());

        let people = vec![Person {
            name: "Jane Doe".into(),
            role: Some("CEO".into()),
            is_founder: true,
            profile_url: None,
            primary_source_url: Some("https://techcrunch.com/alpha".into()),
        }];

        for _ in 0..2 {
            assert!(
                storage
                    .link_company_source(&company.id, &source.id, SourceKind::Overview)
                    .await
                    .unwrap()
            );
            assert_eq!(storage.upsert_people(&company.id, &people, &ids).await.unwrap(), 1);
        }

        let counts = storage.counts().await.unwrap();
        assert_eq!(counts.company_sources, 1);
        assert_eq!(counts.people, 1);
    }

    #[tokio::test]
    async fn funding_rounds_follow_identity_rule() {
        let storage = test_storage().await;
        let company = storage.upsert_company(&candidate("AlphaLab")).await.unwrap();
        let ids = SourceIds::new();

        let dated = FundingRound {
            round_type: Some("seed".into()),
            amount_usd: Some(10_000_000),
            announced_at: NaiveDate::from_ymd_opt(2025, 1, 15),
            ..Default::default()
        };
        let same_day_more_detail = FundingRound {
            valuation_usd: Some(50_000_000),
            investors: vec!["Index Ventures".into()],
            ..dated.clone()
        };
        let undated_valuation = FundingRound {
            round_type: Some("valuation".into()),
            valuation_usd: Some(1_200_000_000),
            ..Default::default()
        };

        let n = storage
            .upsert_funding_rounds(&company.id, &[dated, undated_valuation.clone()], &ids)
            .await
            .unwrap();
        assert_eq!(n, 2);
        storage
            .upsert_funding_rounds(&company.id, &[same_day_more_detail, undated_valuation], &ids)
            .await
            .unwrap();

        let rounds = storage.company_rounds(&company.id).await.unwrap();
        assert_eq!(rounds.len(), 2);
        let seed = rounds
            .iter()
            .map(|(_, r)| r)
            .find(|r| r.round_type.as_deref() == Some("seed"))
            .unwrap();
        assert_eq!(seed.amount_usd, Some(10_000_000));
        assert_eq!(seed.valuation_usd, Some(50_000_000));
        assert_eq!(seed.investors, vec!["Index Ventures"]);
    }

    #[tokio::test]
    async fn refresh_update_applies_present_fields() {
        let storage = test_storage().await;
        let company = storage.upsert_company(&candidate("Acme Labs")).await.unwrap();
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let mut update = RefreshUpdate::stamped(at);
        update.employee_count = Some(25);
        update.focus = Some("Robotics".into());
        storage
            .update_company_from_refresh(&company.id, &update)
            .await
            .unwrap();

        let stamped_only = RefreshUpdate::stamped(at);
        storage
            .update_company_from_refresh(&company.id, &stamped_only)
            .await
            .unwrap();

        let stored = &storage.list_companies().await.unwrap()[0];
        assert_eq!(stored.employee_count, Some(25));
        assert_eq!(stored.focus.as_deref(), Some("Robotics"));
        assert_eq!(stored.last_verified_at, Some(at));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("neolabs_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.upsert_company(&candidate("Alpha")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_companies().await.unwrap().len(), 1);
        let result = ro.upsert_company(&candidate("Beta")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
