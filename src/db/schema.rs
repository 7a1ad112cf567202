use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Leads (prospective and paying customers)
        -- tags is a JSON array of normalized labels, kept for CRM compatibility.
        -- shipping_status is the authoritative shipping state.
        CREATE TABLE IF NOT EXISTS leads (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            country_code TEXT,
            country_name TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            funnel_step TEXT,
            intent_plan TEXT,
            payment_provider TEXT,
            payment_id TEXT,
            paid_at INTEGER,
            shipping_to TEXT,
            shipping_label_url TEXT,
            shipping_tracking_number TEXT,
            shipping_carrier TEXT,
            shipping_servicelevel TEXT,
            shipping_status TEXT NOT NULL DEFAULT 'none'
                CHECK (shipping_status IN ('none', 'label_created', 'not_allowed', 'needs_attention')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_leads_email ON leads(email);
        CREATE INDEX IF NOT EXISTS idx_leads_payment ON leads(payment_provider, payment_id);

        -- Webhook event ledger (append-only)
        -- UNIQUE(provider, event_id) is the replay-prevention boundary.
        -- Rows are inserted as 'received' and must end at a terminal status.
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            event_type TEXT,
            order_id TEXT,
            lead_id TEXT,
            payload TEXT NOT NULL,
            headers TEXT,
            status TEXT NOT NULL DEFAULT 'received'
                CHECK (status IN ('received', 'processed', 'ignored', 'failed')),
            processing_error TEXT,
            created_at INTEGER NOT NULL,
            processed_at INTEGER,

            UNIQUE(provider, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_order ON webhook_events(order_id);
        CREATE INDEX IF NOT EXISTS idx_webhook_events_lead ON webhook_events(lead_id);
        "#,
    )
}
