//! Tests for the hot-reloading configuration store

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use strider_utils::config::{ConfigError, ConfigOverrides, ConfigStore};

fn write(path: &std::path::Path, text: &str)
{
    fs::write(path, text).unwrap();
}

#[test]
fn test_missing_file_uses_defaults()
{
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::open(dir.path().join("config.yaml")).unwrap();
    assert_eq!(store.snapshot().max_steps, 100);
    assert!(!store.reload().unwrap());
}

#[test]
fn test_malformed_file_at_startup_is_fatal()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write(&path, "skip_modules: [unterminated");
    assert!(matches!(ConfigStore::open(&path), Err(ConfigError::Parse { .. })));
}

#[test]
fn test_reload_keeps_last_good_config()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write(&path, "max_steps: 7\n");
    let store = ConfigStore::open(&path).unwrap();
    assert_eq!(store.snapshot().max_steps, 7);

    write(&path, "max_steps: {broken\n");
    assert!(store.reload().is_err());
    assert_eq!(store.snapshot().max_steps, 7);

    write(&path, "max_steps: 9\n");
    assert!(store.reload().unwrap());
    assert_eq!(store.snapshot().max_steps, 9);
}

#[test]
fn test_snapshot_outlives_reload()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write(&path, "enable_jit: false\n");
    let store = ConfigStore::open(&path).unwrap();
    let before = store.snapshot();

    write(&path, "enable_jit: true\n");
    store.reload().unwrap();

    assert!(!before.enable_jit);
    assert!(store.snapshot().enable_jit);
}

#[test]
fn test_overrides_survive_reload()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write(&path, "dump_modules_for_skip: false\n");
    let overrides = ConfigOverrides {
        dump_modules_for_skip: true,
    };
    let store = ConfigStore::open_with_overrides(&path, overrides).unwrap();
    assert!(store.snapshot().dump_modules_for_skip);

    write(&path, "max_steps: 3\n");
    store.reload().unwrap();
    assert!(store.snapshot().dump_modules_for_skip);
}

#[test]
fn test_save_skip_modules_merges_by_union()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write(&path, "max_steps: 42\nskip_modules:\n  - libz.so\n  - libc.so.6\n");
    let store = ConfigStore::open(&path).unwrap();

    let merged = store
        .save_skip_modules(&["libm.so.6".to_string(), "libc.so.6".to_string()])
        .unwrap();
    assert_eq!(merged, vec!["libc.so.6", "libm.so.6", "libz.so"]);
    assert_eq!(store.snapshot().skip_modules, merged);

    // Other keys survive the rewrite.
    let reopened = ConfigStore::open(&path).unwrap();
    assert_eq!(reopened.snapshot().max_steps, 42);
    assert_eq!(reopened.snapshot().skip_modules, merged);
}

#[test]
fn test_save_skip_modules_creates_file()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let store = ConfigStore::open(&path).unwrap();
    store.save_skip_modules(&["libdyld.dylib".to_string()]).unwrap();

    let reopened = ConfigStore::open(&path).unwrap();
    assert_eq!(reopened.snapshot().skip_modules, vec!["libdyld.dylib"]);
}

#[test]
fn test_watcher_picks_up_changes()
{
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write(&path, "max_steps: 1\n");
    let store = Arc::new(ConfigStore::open(&path).unwrap());
    let watcher = store.spawn_watcher(Duration::from_millis(20)).unwrap();

    // Coarse filesystem timestamps need the mtime to actually move.
    thread::sleep(Duration::from_millis(1100));
    write(&path, "max_steps: 2\n");

    let deadline = Instant::now() + Duration::from_secs(5);
    while store.snapshot().max_steps != 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    drop(watcher);
    assert_eq!(store.snapshot().max_steps, 2);
}
