//! SQL migration definitions for the NeoLabs database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: companies, sources, company_sources, people, funding_rounds",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Companies (aliases is a JSON array of normalized names)
CREATE TABLE IF NOT EXISTS companies (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    canonical_domain TEXT,
    website_url      TEXT,
    description      TEXT,
    focus            TEXT,
    employee_count   INTEGER,
    known_revenue    TEXT,
    status           TEXT NOT NULL DEFAULT 'active',
    founded_year     INTEGER,
    hq_location      TEXT,
    aliases          TEXT NOT NULL DEFAULT '[]',
    last_verified_at TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_companies_domain ON companies(canonical_domain);
CREATE INDEX IF NOT EXISTS idx_companies_verified ON companies(last_verified_at);

-- Source documents keyed by canonical URL
CREATE TABLE IF NOT EXISTS sources (
    id           TEXT PRIMARY KEY,
    url          TEXT NOT NULL UNIQUE,
    title        TEXT,
    publisher    TEXT,
    published_at TEXT,
    updated_at   TEXT NOT NULL
);

-- Company <-> source links
CREATE TABLE IF NOT EXISTS company_sources (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id  TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    source_id   TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    source_kind TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(company_id, source_id, source_kind)
);

CREATE INDEX IF NOT EXISTS idx_company_sources_company ON company_sources(company_id);

-- People
CREATE TABLE IF NOT EXISTS people (
    id                TEXT PRIMARY KEY,
    company_id        TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    name              TEXT NOT NULL,
    normalized_name   TEXT NOT NULL,
    role              TEXT,
    is_founder        INTEGER NOT NULL DEFAULT 0,
    profile_url       TEXT,
    primary_source_id TEXT REFERENCES sources(id),
    updated_at        TEXT NOT NULL,
    UNIQUE(company_id, normalized_name)
);

-- Funding rounds (investors is a JSON array)
CREATE TABLE IF NOT EXISTS funding_rounds (
    id            TEXT PRIMARY KEY,
    company_id    TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    round_type    TEXT,
    amount_usd    INTEGER,
    valuation_usd INTEGER,
    announced_at  TEXT,
    investors     TEXT NOT NULL DEFAULT '[]',
    source_id     TEXT REFERENCES sources(id),
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_funding_rounds_company ON funding_rounds(company_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
