use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

/// DB-backed; skipped if SUBSYNC_DATABASE_URL is not set.
#[test]
fn db_migrate_then_status_reports_table() -> anyhow::Result<()> {
    if std::env::var("SUBSYNC_DATABASE_URL").is_err() {
        eprintln!("SKIP: SUBSYNC_DATABASE_URL not set");
        return Ok(());
    }

    Command::cargo_bin("subsync-cli")?
        .args(["db", "migrate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("migrations_applied=true"));

    Command::cargo_bin("subsync-cli")?
        .args(["db", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("db_ok=true has_subscriptions_table=true"));
    Ok(())
}

#[test]
fn db_commands_without_url_fail_cleanly() -> anyhow::Result<()> {
    Command::cargo_bin("subsync-cli")?
        .env_remove("SUBSYNC_DATABASE_URL")
        .current_dir(std::env::temp_dir())
        .args(["db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SUBSYNC_DATABASE_URL"));
    Ok(())
}
