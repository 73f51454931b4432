use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn deposit_script() -> tempfile::NamedTempFile {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "action,user,target,amount,note").unwrap();
    writeln!(csv, "deposit,1,sbp,1000,").unwrap();
    writeln!(csv, "screenshot,1,photo_1,,").unwrap();
    writeln!(csv, "approve,900,1,,").unwrap();
    csv
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let csv = deposit_script();

    let mut cmd = Command::new(cargo_bin!("storefront"));
    cmd.arg(csv.path())
        .arg("--db-path")
        .arg("some_db")
        .env("STOREFRONT__ADMIN_IDS", "900");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,1000.00,0.00,0"))
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let csv = deposit_script();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("storefront"));
    cmd.arg(csv.path())
        .arg("--db-path")
        .arg(&db_path)
        .env("STOREFRONT__ADMIN_IDS", "900");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}
