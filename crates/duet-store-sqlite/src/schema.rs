//! SQL schema for the Duet primary store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organizations (
    id                 TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    available_features TEXT NOT NULL DEFAULT '[]',   -- JSON array
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid                    TEXT NOT NULL UNIQUE,
    email                   TEXT NOT NULL UNIQUE,
    password_hash           TEXT NOT NULL,
    current_organization_id TEXT REFERENCES organizations(id) ON DELETE SET NULL,
    current_team_id         INTEGER REFERENCES teams(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS organization_memberships (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    level           INTEGER NOT NULL,   -- 1 member | 8 admin | 15 owner
    UNIQUE (organization_id, user_id)
);

CREATE TABLE IF NOT EXISTS teams (
    id                           INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid                         TEXT NOT NULL UNIQUE,
    organization_id              TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    api_token                    TEXT NOT NULL UNIQUE,
    name                         TEXT NOT NULL,
    app_urls                     TEXT NOT NULL DEFAULT '[]',
    slack_incoming_webhook       TEXT,
    anonymize_ips                INTEGER NOT NULL DEFAULT 0,
    completed_snippet_onboarding INTEGER NOT NULL DEFAULT 0,
    ingested_event               INTEGER NOT NULL DEFAULT 0,
    test_account_filters         TEXT NOT NULL DEFAULT '[]',
    is_demo                      INTEGER NOT NULL DEFAULT 0,
    timezone                     TEXT NOT NULL DEFAULT 'UTC',
    data_attributes              TEXT NOT NULL DEFAULT '[]',
    session_recording_opt_in     INTEGER NOT NULL DEFAULT 0,
    session_recording_retention_period_days INTEGER,
    created_at                   TEXT NOT NULL,
    updated_at                   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS explicit_team_memberships (
    team_id              INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    parent_membership_id INTEGER NOT NULL
                         REFERENCES organization_memberships(id) ON DELETE CASCADE,
    level                INTEGER NOT NULL,
    PRIMARY KEY (team_id, parent_membership_id)
);

-- No uniqueness across properties: concurrent creations never conflict.
CREATE TABLE IF NOT EXISTS persons (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid          TEXT NOT NULL UNIQUE,
    team_id       INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    created_at    TEXT NOT NULL,
    properties    TEXT NOT NULL DEFAULT '{}',
    is_identified INTEGER NOT NULL DEFAULT 0
);

-- Events are strictly append-only; the UUID is chosen at ingestion.
CREATE TABLE IF NOT EXISTS events (
    uuid        TEXT PRIMARY KEY,
    team_id     INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    event       TEXT NOT NULL,
    distinct_id TEXT NOT NULL,
    properties  TEXT NOT NULL DEFAULT '{}',
    timestamp   TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS persons_team_idx ON persons(team_id);
CREATE INDEX IF NOT EXISTS events_team_idx  ON events(team_id, timestamp);
CREATE INDEX IF NOT EXISTS teams_org_idx    ON teams(organization_id);

PRAGMA user_version = 1;
";
