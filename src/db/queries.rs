pub const CREATE_WARNINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS nautical_warnings (
    id            BIGINT PRIMARY KEY,
    raw_payload   TEXT NOT NULL,
    document      TEXT NOT NULL,
    created_time  TIMESTAMPTZ NOT NULL,
    updated_time  TIMESTAMPTZ NULL,
    expired_time  TIMESTAMPTZ NULL,
    delivery_time TIMESTAMPTZ NULL
);
"#;

pub const CREATE_EXPIRED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS nautical_warnings_expired_time_idx ON nautical_warnings (expired_time);
"#;

// created_time is only written on insert; expired_time is never cleared once set.
pub const UPSERT_WARNING: &str = r#"
INSERT INTO nautical_warnings (id, raw_payload, document, created_time, expired_time, delivery_time)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (id) DO UPDATE
SET raw_payload = EXCLUDED.raw_payload,
    document = EXCLUDED.document,
    updated_time = $7,
    expired_time = COALESCE(nautical_warnings.expired_time, EXCLUDED.expired_time),
    delivery_time = EXCLUDED.delivery_time;
"#;

pub const SELECT_ACTIVE: &str = r#"
SELECT id, raw_payload, document, created_time, updated_time, expired_time, delivery_time
FROM nautical_warnings WHERE expired_time IS NULL ORDER BY id;
"#;

pub const SELECT_EXPIRED: &str = r#"
SELECT id, raw_payload, document, created_time, updated_time, expired_time, delivery_time
FROM nautical_warnings WHERE expired_time IS NOT NULL ORDER BY id;
"#;

pub const SELECT_EXPIRED_IDS: &str = r#"
SELECT id FROM nautical_warnings WHERE expired_time IS NOT NULL;
"#;

pub const SELECT_UNDELIVERED: &str = r#"
SELECT id, raw_payload, document, created_time, updated_time, expired_time, delivery_time
FROM nautical_warnings WHERE delivery_time IS NULL ORDER BY id;
"#;

pub const DELETE_EXPIRED_BEFORE: &str = r#"
DELETE FROM nautical_warnings WHERE expired_time < $1;
"#;
