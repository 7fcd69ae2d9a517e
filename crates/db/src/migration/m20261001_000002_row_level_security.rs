//! Row-level security for client-facing access.
//!
//! Policies apply to the `authenticated` role that hosted clients and
//! `RlsConnection` run as. The caller is read from the JWT claims placed in
//! `request.jwt.claims`. `app.can_access` mirrors the hierarchy the
//! application resolver applies, so a bug in the resolver cannot widen what
//! a caller sees through this role.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(ROLE_SQL).await?;
        db.execute_unprepared(FUNCTIONS_SQL).await?;
        db.execute_unprepared(POLICIES_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

const ROLE_SQL: &str = r"
DO $$
BEGIN
    IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = 'authenticated') THEN
        CREATE ROLE authenticated NOLOGIN;
    END IF;
END
$$;

CREATE SCHEMA IF NOT EXISTS app;
GRANT USAGE ON SCHEMA app TO authenticated;
";

const FUNCTIONS_SQL: &str = r"
-- Subject of the JWT the current transaction runs under, NULL when absent
CREATE OR REPLACE FUNCTION app.current_user_id()
RETURNS UUID
LANGUAGE sql STABLE
AS $$
    SELECT NULLIF(
        COALESCE(
            current_setting('request.jwt.claim.sub', true),
            NULLIF(current_setting('request.jwt.claims', true), '')::jsonb ->> 'sub'
        ),
        ''
    )::uuid
$$;

-- Whether the caller may see rows owned by `target`.
-- Full admin: everyone. Superior manager: assigned subordinate managers and
-- their plain users. Manager: assigned plain users. Everyone: themselves.
CREATE OR REPLACE FUNCTION app.can_access(target UUID)
RETURNS BOOLEAN
LANGUAGE plpgsql STABLE SECURITY DEFINER
SET search_path = public
AS $$
DECLARE
    caller UUID := app.current_user_id();
    r users%ROWTYPE;
BEGIN
    IF caller IS NULL OR target IS NULL THEN
        RETURN FALSE;
    END IF;
    IF caller = target THEN
        RETURN TRUE;
    END IF;

    SELECT * INTO r FROM users WHERE id = caller;
    IF NOT FOUND THEN
        RETURN FALSE;
    END IF;

    IF r.is_admin AND NOT r.is_superiormanager AND NOT r.is_manager THEN
        RETURN TRUE;
    END IF;

    IF r.is_admin AND r.is_superiormanager THEN
        RETURN EXISTS (
            SELECT 1
            FROM user_assignments a
            JOIN users m ON m.id = a.assigned_user_id
                AND m.is_manager AND NOT m.is_superiormanager
            WHERE a.manager_id = caller AND a.assigned_user_id = target
        ) OR EXISTS (
            SELECT 1
            FROM user_assignments a
            JOIN users m ON m.id = a.assigned_user_id
                AND m.is_manager AND NOT m.is_superiormanager
            JOIN user_assignments b ON b.manager_id = m.id
            JOIN users u ON u.id = b.assigned_user_id
                AND NOT u.is_admin AND NOT u.is_manager AND NOT u.is_superiormanager
            WHERE a.manager_id = caller AND b.assigned_user_id = target
        );
    END IF;

    IF r.is_manager THEN
        RETURN EXISTS (
            SELECT 1
            FROM user_assignments a
            JOIN users u ON u.id = a.assigned_user_id
                AND NOT u.is_admin AND NOT u.is_manager AND NOT u.is_superiormanager
            WHERE a.manager_id = caller AND a.assigned_user_id = target
        );
    END IF;

    RETURN FALSE;
END;
$$;

GRANT EXECUTE ON FUNCTION app.current_user_id() TO authenticated;
GRANT EXECUTE ON FUNCTION app.can_access(UUID) TO authenticated;
";

const POLICIES_SQL: &str = r#"
ALTER TABLE users ENABLE ROW LEVEL SECURITY;
ALTER TABLE user_assignments ENABLE ROW LEVEL SECURITY;
ALTER TABLE usd_balances ENABLE ROW LEVEL SECURITY;
ALTER TABLE euro_balances ENABLE ROW LEVEL SECURITY;
ALTER TABLE cad_balances ENABLE ROW LEVEL SECURITY;
ALTER TABLE newcrypto_balances ENABLE ROW LEVEL SECURITY;
ALTER TABLE transfers ENABLE ROW LEVEL SECURITY;
ALTER TABLE "TransactionHistory" ENABLE ROW LEVEL SECURITY;
ALTER TABLE taxes ENABLE ROW LEVEL SECURITY;
ALTER TABLE kyc_verifications ENABLE ROW LEVEL SECURITY;
ALTER TABLE user_messages ENABLE ROW LEVEL SECURITY;
ALTER TABLE user_presence ENABLE ROW LEVEL SECURITY;
ALTER TABLE chat_sessions ENABLE ROW LEVEL SECURITY;
ALTER TABLE chat_messages ENABLE ROW LEVEL SECURITY;

GRANT SELECT ON users, user_assignments, usd_balances, euro_balances, cad_balances,
    newcrypto_balances, transfers, "TransactionHistory", taxes, kyc_verifications,
    user_messages, user_presence, chat_sessions, chat_messages TO authenticated;
GRANT INSERT ON transfers, kyc_verifications, chat_sessions, chat_messages TO authenticated;
GRANT INSERT, UPDATE ON user_presence TO authenticated;
GRANT UPDATE (is_read) ON user_messages TO authenticated;

CREATE POLICY scoped_read ON users FOR SELECT TO authenticated
    USING (app.can_access(id));
CREATE POLICY scoped_read ON user_assignments FOR SELECT TO authenticated
    USING (manager_id = app.current_user_id());
CREATE POLICY scoped_read ON usd_balances FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON euro_balances FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON cad_balances FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON newcrypto_balances FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON transfers FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON "TransactionHistory" FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON taxes FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON kyc_verifications FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON user_messages FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON user_presence FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON chat_sessions FOR SELECT TO authenticated
    USING (app.can_access(user_id));
CREATE POLICY scoped_read ON chat_messages FOR SELECT TO authenticated
    USING (EXISTS (
        SELECT 1 FROM chat_sessions s
        WHERE s.id = session_id AND app.can_access(s.user_id)
    ));

-- Clients only write their own rows
CREATE POLICY own_insert ON transfers FOR INSERT TO authenticated
    WITH CHECK (user_id = app.current_user_id() AND status = 'pending');
CREATE POLICY own_insert ON kyc_verifications FOR INSERT TO authenticated
    WITH CHECK (user_id = app.current_user_id() AND status = 'pending');
CREATE POLICY own_insert ON chat_sessions FOR INSERT TO authenticated
    WITH CHECK (user_id = app.current_user_id());
CREATE POLICY own_insert ON chat_messages FOR INSERT TO authenticated
    WITH CHECK (sender_id = app.current_user_id());
CREATE POLICY own_write ON user_presence FOR INSERT TO authenticated
    WITH CHECK (user_id = app.current_user_id());
CREATE POLICY own_update ON user_presence FOR UPDATE TO authenticated
    USING (user_id = app.current_user_id());
CREATE POLICY own_update ON user_messages FOR UPDATE TO authenticated
    USING (user_id = app.current_user_id());
"#;

const DROP_SQL: &str = r#"
DROP POLICY IF EXISTS scoped_read ON users;
DROP POLICY IF EXISTS scoped_read ON user_assignments;
DROP POLICY IF EXISTS scoped_read ON usd_balances;
DROP POLICY IF EXISTS scoped_read ON euro_balances;
DROP POLICY IF EXISTS scoped_read ON cad_balances;
DROP POLICY IF EXISTS scoped_read ON newcrypto_balances;
DROP POLICY IF EXISTS scoped_read ON transfers;
DROP POLICY IF EXISTS scoped_read ON "TransactionHistory";
DROP POLICY IF EXISTS scoped_read ON taxes;
DROP POLICY IF EXISTS scoped_read ON kyc_verifications;
DROP POLICY IF EXISTS scoped_read ON user_messages;
DROP POLICY IF EXISTS scoped_read ON user_presence;
DROP POLICY IF EXISTS scoped_read ON chat_sessions;
DROP POLICY IF EXISTS scoped_read ON chat_messages;
DROP POLICY IF EXISTS own_insert ON transfers;
DROP POLICY IF EXISTS own_insert ON kyc_verifications;
DROP POLICY IF EXISTS own_insert ON chat_sessions;
DROP POLICY IF EXISTS own_insert ON chat_messages;
DROP POLICY IF EXISTS own_write ON user_presence;
DROP POLICY IF EXISTS own_update ON user_presence;
DROP POLICY IF EXISTS own_update ON user_messages;

ALTER TABLE users DISABLE ROW LEVEL SECURITY;
ALTER TABLE user_assignments DISABLE ROW LEVEL SECURITY;
ALTER TABLE usd_balances DISABLE ROW LEVEL SECURITY;
ALTER TABLE euro_balances DISABLE ROW LEVEL SECURITY;
ALTER TABLE cad_balances DISABLE ROW LEVEL SECURITY;
ALTER TABLE newcrypto_balances DISABLE ROW LEVEL SECURITY;
ALTER TABLE transfers DISABLE ROW LEVEL SECURITY;
ALTER TABLE "TransactionHistory" DISABLE ROW LEVEL SECURITY;
ALTER TABLE taxes DISABLE ROW LEVEL SECURITY;
ALTER TABLE kyc_verifications DISABLE ROW LEVEL SECURITY;
ALTER TABLE user_messages DISABLE ROW LEVEL SECURITY;
ALTER TABLE user_presence DISABLE ROW LEVEL SECURITY;
ALTER TABLE chat_sessions DISABLE ROW LEVEL SECURITY;
ALTER TABLE chat_messages DISABLE ROW LEVEL SECURITY;

DROP FUNCTION IF EXISTS app.can_access(UUID);
DROP FUNCTION IF EXISTS app.current_user_id();
DROP SCHEMA IF EXISTS app;
"#;
