//! Tests for Engine
//!
//! These tests verify:
//! - Engine lifecycle (open/close/reopen)
//! - Append and read by every column
//! - The two-user salary scenario, before and after restart
//! - Recovery idempotence across restarts
//! - Request validation and output sizing

use std::fs;

use platedb::engine::{Context, Engine, Phase};
use platedb::manifest::MANIFEST_FILENAME;
use platedb::record::{Column, Record};
use platedb::tier::buffer_file_name;
use platedb::{Config, PlateError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(temp_dir.path())
        .shards(2)
        .buffers_per_shard(3)
        .buffer_capacity(4)
        .index_shards(4)
        .flush_poll_interval_ms(5)
        .durable_grow_bytes(4096)
        .fence_interval_ms(0)
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(&temp_dir)).unwrap();
    (temp_dir, engine)
}

fn user(id: i64, salary: i64) -> Vec<u8> {
    Record::new(id, format!("user{}", id), format!("name{}", id), salary)
        .encode()
        .to_vec()
}

fn read_ids(engine: &Engine, where_column: Column, key: &[u8]) -> Vec<i64> {
    let mut out = Vec::new();
    let count = engine.read(Column::Id, where_column, key, &mut out).unwrap();
    assert_eq!(out.len(), count * 8);
    let mut ids: Vec<i64> = out
        .chunks(8)
        .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    ids.sort();
    ids
}

fn read_user_id(engine: &Engine, id: i64) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    match engine
        .read(Column::Userid, Column::Id, &id.to_le_bytes(), &mut out)
        .unwrap()
    {
        0 => None,
        _ => Some(out),
    }
}

fn padded(value: &str) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.resize(128, 0);
    bytes
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_tiers() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    let engine = Engine::open(config.clone()).unwrap();

    assert!(config.buffer_dir.join(MANIFEST_FILENAME).exists());
    assert!(config.buffer_dir.join("BUFFER_00000000").exists());
    assert!(config.buffer_dir.join("BUFFER_00000001").exists());
    assert!(config.durable_dir.join("DATA_00000001").exists());
    assert_eq!(engine.shard_count(), 2);
    assert_eq!(engine.phase(), Phase::WriteOnly);
    engine.close().unwrap();
}

#[test]
fn test_engine_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .buffer_capacity(0)
        .build();

    assert!(matches!(Engine::open(config), Err(PlateError::Config(_))));
}

#[test]
fn test_engine_rejects_changed_geometry() {
    let temp_dir = TempDir::new().unwrap();
    Engine::open(test_config(&temp_dir)).unwrap().close().unwrap();

    let mut config = test_config(&temp_dir);
    config.buffer_capacity = 8;

    assert!(matches!(Engine::open(config), Err(PlateError::Config(_))));
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_round_trip_by_id() {
    let (_temp, engine) = setup_temp_engine();
    let ctx = Context::new();

    engine.append(&ctx, &user(7, 100)).unwrap();

    assert_eq!(read_user_id(&engine, 7), Some(padded("user7")));
    assert_eq!(read_ids(&engine, Column::Id, &7i64.to_le_bytes()), vec![7]);
}

#[test]
fn test_read_every_select_column() {
    let (_temp, engine) = setup_temp_engine();
    engine.append(&Context::new(), &user(3, 900)).unwrap();
    let key = 3i64.to_le_bytes();

    for column in Column::ALL {
        let mut out = Vec::new();
        let count = engine.read(column, Column::Id, &key, &mut out).unwrap();
        assert_eq!(count, 1);
        assert_eq!(out.len(), column.width());
    }

    let mut out = Vec::new();
    engine.read(Column::Salary, Column::Id, &key, &mut out).unwrap();
    assert_eq!(out, 900i64.to_le_bytes());
}

#[test]
fn test_lookup_miss_returns_zero() {
    let (_temp, engine) = setup_temp_engine();
    engine.append(&Context::new(), &user(1, 1)).unwrap();

    let mut out = Vec::new();
    for (column, key) in [
        (Column::Id, 2i64.to_le_bytes().to_vec()),
        (Column::Userid, b"nobody".to_vec()),
        (Column::Name, b"nobody".to_vec()),
        (Column::Salary, 5i64.to_le_bytes().to_vec()),
    ] {
        assert_eq!(engine.read(Column::Id, column, &key, &mut out).unwrap(), 0);
    }
    assert!(out.is_empty());
}

#[test]
fn test_read_by_name_scans() {
    let (_temp, engine) = setup_temp_engine();
    let ctx = Context::new();
    engine
        .append(&ctx, &Record::new(1, "a", "alice", 1).encode())
        .unwrap();
    engine
        .append(&ctx, &Record::new(2, "b", "bob", 1).encode())
        .unwrap();
    engine
        .append(&ctx, &Record::new(3, "c", "alice", 2).encode())
        .unwrap();

    assert_eq!(read_ids(&engine, Column::Name, b"alice"), vec![1, 3]);
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[test]
fn test_two_users_same_salary_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let check = |engine: &Engine| {
        assert_eq!(read_ids(engine, Column::Salary, &2i64.to_le_bytes()), vec![1, 2]);
        assert_eq!(read_user_id(engine, 1), Some(padded("user1")));
        assert_eq!(read_ids(engine, Column::Userid, b"user2"), vec![2]);
    };

    {
        let engine = Engine::open(test_config(&temp_dir)).unwrap();
        let ctx = Context::new();
        engine.append(&ctx, &user(1, 2)).unwrap();
        engine.append(&ctx, &user(2, 2)).unwrap();
        check(&engine);
        engine.close().unwrap();
    }

    let engine = Engine::open(test_config(&temp_dir)).unwrap();
    assert_eq!(engine.phase(), Phase::ReadOnly);
    check(&engine);
}

#[test]
fn test_recovery_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(test_config(&temp_dir)).unwrap();
        let ctx = Context::new();
        for id in 0..30 {
            engine.append(&ctx, &user(id, id % 4)).unwrap();
        }
        engine.close().unwrap();
    }

    for _ in 0..2 {
        let engine = Engine::open(test_config(&temp_dir)).unwrap();
        assert_eq!(engine.stats().indexed_records, 30);
        for id in 0..30 {
            assert_eq!(read_user_id(&engine, id), Some(padded(&format!("user{}", id))));
        }
        assert_eq!(read_ids(&engine, Column::Salary, &3i64.to_le_bytes()).len(), 7);
        engine.close().unwrap();
    }
}

#[test]
fn test_recovery_without_close() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(test_config(&temp_dir)).unwrap();
        let ctx = Context::new();
        for id in 0..11 {
            engine.append(&ctx, &user(id, 0)).unwrap();
        }
        // dropped without close
    }

    let engine = Engine::open(test_config(&temp_dir)).unwrap();
    assert_eq!(read_ids(&engine, Column::Salary, &0i64.to_le_bytes()), (0..11).collect::<Vec<_>>());
}

#[test]
fn test_zeroed_buffer_tier_opens_empty() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);
    Engine::open(config.clone()).unwrap().close().unwrap();

    // Same length, header never written
    let path = config.buffer_dir.join(buffer_file_name(0));
    let len = fs::metadata(&path).unwrap().len() as usize;
    fs::write(&path, vec![0u8; len]).unwrap();

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.phase(), Phase::WriteOnly);
    assert!(read_ids(&engine, Column::Id, &0i64.to_le_bytes()).is_empty());
    assert!(read_ids(&engine, Column::Salary, &0i64.to_le_bytes()).is_empty());
    assert_eq!(engine.stats().indexed_records, 0);
}

#[test]
fn test_sync_flushes_full_buffers() {
    let (_temp, engine) = setup_temp_engine();
    let ctx = Context::new();
    for id in 0..9 {
        engine.append(&ctx, &user(id, 0)).unwrap();
    }

    engine.sync().unwrap();

    let flushed: u32 = engine.stats().flushed_per_shard.iter().sum();
    assert_eq!(flushed, 8);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_append_rejects_wrong_length() {
    let (_temp, engine) = setup_temp_engine();

    let err = engine.append(&Context::new(), &[0u8; 271]).unwrap_err();
    assert!(matches!(err, PlateError::InvalidRecordLength { actual: 271, .. }));
}

#[test]
fn test_read_rejects_bad_key() {
    let (_temp, engine) = setup_temp_engine();
    let mut out = Vec::new();

    let err = engine.read(Column::Id, Column::Id, &[1, 2], &mut out).unwrap_err();
    assert!(matches!(err, PlateError::InvalidKeyLength { .. }));
}

#[test]
fn test_output_too_small_writes_nothing() {
    let (_temp, engine) = setup_temp_engine();
    let ctx = Context::new();
    engine.append(&ctx, &user(1, 5)).unwrap();
    engine.append(&ctx, &user(2, 5)).unwrap();

    let mut storage = [0xAAu8; 200];
    let mut out = &mut storage[..];
    let err = engine
        .read(Column::Userid, Column::Salary, &5i64.to_le_bytes(), &mut out)
        .unwrap_err();

    assert!(matches!(
        err,
        PlateError::OutputTooSmall {
            needed: 256,
            available: 200
        }
    ));
    assert!(storage.iter().all(|&b| b == 0xAA));
}

#[test]
fn test_identity_is_sticky() {
    let (_temp, engine) = setup_temp_engine();
    let first = Context::new();
    let second = Context::new();

    let a = engine.must_assign_identity(&first);
    let b = engine.must_assign_identity(&second);

    assert_ne!(a, b);
    assert_eq!(engine.must_assign_identity(&first), a);
    assert_eq!(first.identity(), Some(0));
}
