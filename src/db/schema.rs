use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- One row per applicant. Nested sections are stored as JSON documents;
        -- final_fee_payment is read by the admin dashboard as-is.
        CREATE TABLE IF NOT EXISTS applications (
            id TEXT PRIMARY KEY,
            auth_uid TEXT,
            basic TEXT NOT NULL DEFAULT '{}',
            contact TEXT NOT NULL DEFAULT '{}',
            account TEXT NOT NULL DEFAULT '{}',
            application_details TEXT NOT NULL DEFAULT '{}',
            final_fee_payment TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_applications_auth_uid ON applications(auth_uid);

        -- Gateway order id -> application. Written together with the
        -- sub-document at order creation; used to resolve webhooks.
        CREATE TABLE IF NOT EXISTS payment_orders (
            order_id TEXT PRIMARY KEY,
            application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
            amount_minor INTEGER NOT NULL,
            currency TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payment_orders_application ON payment_orders(application_id);

        -- Applied payment events. The primary key makes each
        -- (application, payment, event) apply at most once.
        CREATE TABLE IF NOT EXISTS payment_events (
            application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
            payment_id TEXT NOT NULL,
            event TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (application_id, payment_id, event)
        );
        CREATE INDEX IF NOT EXISTS idx_payment_events_payment ON payment_events(payment_id);
        "#,
    )?;

    Ok(())
}
