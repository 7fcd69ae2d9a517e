//! Initial database migration.
//!
//! Creates the users, balance, ledger, KYC, messaging and chat tables with
//! their constraints and `updated_at` triggers.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: USERS & HIERARCHY
        // ============================================================
        db.execute_unprepared(USERS_SQL).await?;
        db.execute_unprepared(USER_ASSIGNMENTS_SQL).await?;

        // ============================================================
        // PART 2: BALANCES (one table per currency)
        // ============================================================
        for table in BALANCE_TABLES {
            db.execute_unprepared(&balance_table_sql(table)).await?;
        }

        // ============================================================
        // PART 3: MONEY MOVEMENT
        // ============================================================
        db.execute_unprepared(TRANSFERS_SQL).await?;
        db.execute_unprepared(TRANSACTION_HISTORY_SQL).await?;
        db.execute_unprepared(TAXES_SQL).await?;

        // ============================================================
        // PART 4: KYC
        // ============================================================
        db.execute_unprepared(KYC_SQL).await?;

        // ============================================================
        // PART 5: MESSAGING, PRESENCE & CHAT
        // ============================================================
        db.execute_unprepared(MESSAGING_SQL).await?;
        db.execute_unprepared(CHAT_SQL).await?;

        // ============================================================
        // PART 6: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

/// Per-currency balance tables, in `Currency::ALL` order.
const BALANCE_TABLES: [&str; 4] = [
    "usd_balances",
    "euro_balances",
    "cad_balances",
    "newcrypto_balances",
];

fn balance_table_sql(table: &str) -> String {
    format!(
        r"
CREATE TABLE {table} (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    balance NUMERIC(20, 8) NOT NULL DEFAULT 0 CHECK (balance >= 0),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"
    )
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const USERS_SQL: &str = r"
CREATE TABLE users (
    id UUID PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    full_name VARCHAR(255),
    is_admin BOOLEAN NOT NULL DEFAULT FALSE,
    is_manager BOOLEAN NOT NULL DEFAULT FALSE,
    is_superiormanager BOOLEAN NOT NULL DEFAULT FALSE,
    kyc_status TEXT NOT NULL DEFAULT 'not_submitted'
        CHECK (kyc_status IN ('not_submitted', 'pending', 'approved', 'rejected')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_users_email_lower ON users (LOWER(email));
CREATE INDEX idx_users_roles ON users (is_admin, is_manager, is_superiormanager);
";

const USER_ASSIGNMENTS_SQL: &str = r"
CREATE TABLE user_assignments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    manager_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    assigned_user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT uq_user_assignments_pair UNIQUE (manager_id, assigned_user_id),
    CONSTRAINT chk_user_assignments_not_self CHECK (manager_id <> assigned_user_id)
);

CREATE INDEX idx_user_assignments_manager ON user_assignments (manager_id);
";

const TRANSFERS_SQL: &str = r"
CREATE TABLE transfers (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    currency TEXT NOT NULL CHECK (currency IN ('USD', 'EUR', 'CAD', 'NEWCRYPTO')),
    amount NUMERIC(20, 8) NOT NULL CHECK (amount > 0),
    destination VARCHAR(255) NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'completed', 'rejected')),
    reviewed_by UUID REFERENCES users(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_transfers_user ON transfers (user_id, created_at DESC);
CREATE INDEX idx_transfers_pending ON transfers (created_at) WHERE status = 'pending';
";

const TRANSACTION_HISTORY_SQL: &str = r#"
CREATE TABLE "TransactionHistory" (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    th_type TEXT NOT NULL
        CHECK (th_type IN ('deposit', 'withdrawal', 'adjustment', 'tax_payment')),
    currency TEXT NOT NULL CHECK (currency IN ('USD', 'EUR', 'CAD', 'NEWCRYPTO')),
    amount NUMERIC(20, 8) NOT NULL,
    description TEXT,
    reference TEXT UNIQUE,
    status TEXT NOT NULL DEFAULT 'completed',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_transaction_history_user ON "TransactionHistory" (user_id, created_at DESC);
"#;

const TAXES_SQL: &str = r"
CREATE TABLE taxes (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    tax_year INTEGER NOT NULL CHECK (tax_year BETWEEN 1900 AND 9999),
    kind TEXT NOT NULL CHECK (kind IN ('due', 'paid')),
    amount NUMERIC(20, 8) NOT NULL CHECK (amount >= 0),
    status TEXT NOT NULL CHECK (status IN ('outstanding', 'settled')),
    payment_reference TEXT UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_taxes_user ON taxes (user_id, tax_year DESC);
";

const KYC_SQL: &str = r"
CREATE TABLE kyc_verifications (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    document_type TEXT NOT NULL
        CHECK (document_type IN ('passport', 'national_id', 'drivers_license', 'proof_of_address')),
    front_key TEXT NOT NULL,
    back_key TEXT,
    selfie_key TEXT,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'approved', 'rejected')),
    rejection_reason TEXT,
    reviewed_by UUID REFERENCES users(id),
    submitted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    reviewed_at TIMESTAMPTZ,
    CONSTRAINT chk_kyc_rejection_reason CHECK (
        status <> 'rejected' OR rejection_reason IS NOT NULL
    )
);

CREATE INDEX idx_kyc_user ON kyc_verifications (user_id, submitted_at DESC);
CREATE INDEX idx_kyc_pending ON kyc_verifications (submitted_at) WHERE status = 'pending';
";

const MESSAGING_SQL: &str = r"
CREATE TABLE user_messages (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    sender_id UUID NOT NULL REFERENCES users(id),
    subject VARCHAR(200) NOT NULL,
    body TEXT NOT NULL CHECK (char_length(body) <= 5000),
    is_read BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_user_messages_user ON user_messages (user_id, created_at DESC);

CREATE TABLE user_presence (
    user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    is_online BOOLEAN NOT NULL DEFAULT FALSE,
    last_seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

const CHAT_SQL: &str = r"
CREATE TABLE chat_sessions (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    admin_id UUID REFERENCES users(id),
    status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- At most one open session per user
CREATE UNIQUE INDEX uq_chat_sessions_open ON chat_sessions (user_id) WHERE status = 'open';

CREATE TABLE chat_messages (
    id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
    sender_id UUID NOT NULL REFERENCES users(id),
    from_admin BOOLEAN NOT NULL DEFAULT FALSE,
    body TEXT NOT NULL CHECK (char_length(body) <= 2000),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX idx_chat_messages_session ON chat_messages (session_id, created_at);
";

const TRIGGERS_SQL: &str = r"
CREATE OR REPLACE FUNCTION set_updated_at()
RETURNS TRIGGER AS $$
BEGIN
    NEW.updated_at = NOW();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_users_updated_at BEFORE UPDATE ON users
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
CREATE TRIGGER trg_usd_balances_updated_at BEFORE UPDATE ON usd_balances
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
CREATE TRIGGER trg_euro_balances_updated_at BEFORE UPDATE ON euro_balances
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
CREATE TRIGGER trg_cad_balances_updated_at BEFORE UPDATE ON cad_balances
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
CREATE TRIGGER trg_newcrypto_balances_updated_at BEFORE UPDATE ON newcrypto_balances
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
CREATE TRIGGER trg_transfers_updated_at BEFORE UPDATE ON transfers
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
CREATE TRIGGER trg_taxes_updated_at BEFORE UPDATE ON taxes
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
CREATE TRIGGER trg_chat_sessions_updated_at BEFORE UPDATE ON chat_sessions
    FOR EACH ROW EXECUTE FUNCTION set_updated_at();
";

const DROP_ALL_SQL: &str = r#"
DROP TABLE IF EXISTS chat_messages CASCADE;
DROP TABLE IF EXISTS chat_sessions CASCADE;
DROP TABLE IF EXISTS user_presence CASCADE;
DROP TABLE IF EXISTS user_messages CASCADE;
DROP TABLE IF EXISTS kyc_verifications CASCADE;
DROP TABLE IF EXISTS taxes CASCADE;
DROP TABLE IF EXISTS "TransactionHistory" CASCADE;
DROP TABLE IF EXISTS transfers CASCADE;
DROP TABLE IF EXISTS newcrypto_balances CASCADE;
DROP TABLE IF EXISTS cad_balances CASCADE;
DROP TABLE IF EXISTS euro_balances CASCADE;
DROP TABLE IF EXISTS usd_balances CASCADE;
DROP TABLE IF EXISTS user_assignments CASCADE;
DROP TABLE IF EXISTS users CASCADE;
DROP FUNCTION IF EXISTS set_updated_at() CASCADE;
"#;
