//! SQL schema for the member database.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS persons (
    id              INTEGER PRIMARY KEY,
    name            TEXT    NOT NULL,
    email           TEXT    NOT NULL UNIQUE,
    member          INTEGER NOT NULL DEFAULT 0,
    member_approved INTEGER NOT NULL DEFAULT 0,
    date_of_birth   TEXT,              -- YYYY-MM-DD
    joining_date    TEXT               -- YYYY-MM-DD
);

-- At most one user per person.
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY,
    username      TEXT    NOT NULL UNIQUE,
    password_hash TEXT,                -- argon2 PHC string
    person_id     INTEGER NOT NULL UNIQUE REFERENCES persons(id)
);

CREATE TABLE IF NOT EXISTS access_levels (
    id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS roles (
    id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS role_access_levels (
    role_id         TEXT NOT NULL REFERENCES roles(id),
    access_level_id TEXT NOT NULL REFERENCES access_levels(id),
    PRIMARY KEY (role_id, access_level_id)
);

CREATE TABLE IF NOT EXISTS user_roles (
    user_id INTEGER NOT NULL REFERENCES users(id),
    role_id TEXT    NOT NULL REFERENCES roles(id),
    PRIMARY KEY (user_id, role_id)
);

CREATE TABLE IF NOT EXISTS events (
    id                  INTEGER PRIMARY KEY,
    name                TEXT    NOT NULL,
    description         TEXT    NOT NULL DEFAULT '',
    notify_email        TEXT,
    force_tu_mail       INTEGER NOT NULL DEFAULT 0,
    max_participants    INTEGER,
    registration_open   INTEGER NOT NULL DEFAULT 0,
    registration_schema TEXT    NOT NULL   -- Draft-07 JSON-Schema document
);

CREATE TABLE IF NOT EXISTS registration_statuses (
    name TEXT PRIMARY KEY
);

INSERT OR IGNORE INTO registration_statuses (name) VALUES ('pending'), ('confirmed');

-- A person registers for a given event at most once.
CREATE TABLE IF NOT EXISTS event_registrations (
    id          INTEGER PRIMARY KEY,
    event_id    INTEGER NOT NULL REFERENCES events(id),
    person_id   INTEGER NOT NULL REFERENCES persons(id),
    status_name TEXT    NOT NULL REFERENCES registration_statuses(name),
    data        TEXT    NOT NULL DEFAULT '{}',
    timestamp   TEXT    NOT NULL,      -- ISO 8601 UTC; server-assigned
    CONSTRAINT unique_person_event UNIQUE (event_id, person_id)
);

CREATE INDEX IF NOT EXISTS registrations_event_idx ON event_registrations(event_id);

PRAGMA user_version = 1;
";
