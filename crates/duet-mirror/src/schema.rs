//! SQL schema for the analytical mirror.

/// Mirror tables carry no foreign keys: rows arrive independently of each
/// other and of the primary, and may be written more than once.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS person (
    id            TEXT PRIMARY KEY,   -- canonical UUID
    created_at    TEXT NOT NULL,      -- YYYY-MM-DD HH:MM:SS
    team_id       INTEGER NOT NULL,
    properties    TEXT NOT NULL,      -- JSON string
    is_identified INTEGER NOT NULL    -- 0 | 1
);

CREATE TABLE IF NOT EXISTS events (
    uuid        TEXT PRIMARY KEY,
    event       TEXT NOT NULL,
    properties  TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    team_id     INTEGER NOT NULL,
    distinct_id TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS person_team_idx ON person(team_id);
CREATE INDEX IF NOT EXISTS events_team_idx ON events(team_id, timestamp);

PRAGMA user_version = 1;
";
