//! Database schema, mirrored by `migrations/0001_create_availability_tables.sql`.

/// SQL to create the resource document table.
pub const CREATE_RESOURCE_DOCUMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS resource_documents (
    id          UUID PRIMARY KEY,
    version     BIGINT NOT NULL,
    body        JSONB NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

/// SQL to create the outbox table.
pub const CREATE_OUTBOX_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS outbox_messages (
    message_id      UUID PRIMARY KEY,
    aggregate_id    UUID NOT NULL,
    event_type      VARCHAR(255) NOT NULL,
    payload         JSONB NOT NULL,
    correlation_id  UUID,
    span_context    TEXT,
    state           VARCHAR(16) NOT NULL DEFAULT 'pending',
    attempts        INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    claimed_by      VARCHAR(255),
    claimed_until   TIMESTAMPTZ,
    created_at      TIMESTAMPTZ NOT NULL,
    dispatched_at   TIMESTAMPTZ,
    CHECK (state IN ('pending', 'dispatched'))
);

CREATE INDEX IF NOT EXISTS idx_outbox_messages_pending
    ON outbox_messages (created_at)
    WHERE state = 'pending';

CREATE INDEX IF NOT EXISTS idx_outbox_messages_dispatched_at
    ON outbox_messages (dispatched_at)
    WHERE state = 'dispatched';
";
