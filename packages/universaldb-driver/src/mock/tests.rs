use crate::api::{NativeDatabase, NativeMutationType, NativeTransaction};

use super::MockDatabase;

#[tokio::test]
async fn write_then_read_back() {
	let db = MockDatabase::new();
	let tx = db.create_transaction().unwrap();
	tx.set(b"hello", b"world");
	tx.call_commit().await.unwrap();

	let tx2 = db.create_transaction().unwrap();
	let value = tx2.call_get(b"hello", false).await.unwrap();
	assert_eq!(value, Some(b"world".to_vec()));
}

#[tokio::test]
async fn conflicting_writes_one_fails() {
	let db = MockDatabase::new();
	let tx_a = db.create_transaction().unwrap();
	let tx_b = db.create_transaction().unwrap();

	tx_a.call_get(b"k", false).await.unwrap();
	tx_b.call_get(b"k", false).await.unwrap();

	tx_a.set(b"k", b"from-a");
	tx_a.call_commit().await.unwrap();

	tx_b.set(b"k", b"from-b");
	let result = tx_b.call_commit().await;
	assert!(result.is_err());
	assert!(result.unwrap_err().is_retryable());
}

#[tokio::test]
async fn snapshot_read_does_not_conflict() {
	let db = MockDatabase::new();
	let tx_a = db.create_transaction().unwrap();
	let tx_b = db.create_transaction().unwrap();

	// snapshot=true: no read conflict range recorded.
	tx_a.call_get(b"k", true).await.unwrap();

	tx_b.set(b"k", b"from-b");
	tx_b.call_commit().await.unwrap();

	tx_a.set(b"k", b"from-a");
	assert!(tx_a.call_commit().await.is_ok());
}

#[tokio::test]
async fn atomic_add_wraps_and_extends_missing_key() {
	let db = MockDatabase::new();
	let tx = db.create_transaction().unwrap();
	tx.atomic_op(b"counter", &1u64.to_le_bytes(), NativeMutationType::Add);
	tx.call_commit().await.unwrap();

	let tx2 = db.create_transaction().unwrap();
	let value = tx2.call_get(b"counter", false).await.unwrap().unwrap();
	assert_eq!(u64::from_le_bytes(value.try_into().unwrap()), 1);

	let tx3 = db.create_transaction().unwrap();
	tx3.atomic_op(b"counter", &u64::MAX.to_le_bytes(), NativeMutationType::Add);
	tx3.call_commit().await.unwrap();

	let tx4 = db.create_transaction().unwrap();
	let value = tx4.call_get(b"counter", false).await.unwrap().unwrap();
	assert_eq!(u64::from_le_bytes(value.try_into().unwrap()), 0);
}

#[tokio::test]
async fn versionstamped_key_is_resolved_at_commit() {
	let db = MockDatabase::new();
	let tx = db.create_transaction().unwrap();

	let mut key = b"prefix-".to_vec();
	let placeholder_pos = key.len() as u32;
	key.extend_from_slice(&[0u8; 10]);
	key.extend_from_slice(&placeholder_pos.to_le_bytes());

	tx.atomic_op(&key, b"value", NativeMutationType::SetVersionstampedKey);
	tx.call_commit().await.unwrap();
	let stamp = tx.call_get_versionstamp().await.unwrap();

	let tx2 = db.create_transaction().unwrap();
	let mut expected_key = b"prefix-".to_vec();
	expected_key.extend_from_slice(&stamp);
	let value = tx2.call_get(&expected_key, false).await.unwrap();
	assert_eq!(value, Some(b"value".to_vec()));
}

#[tokio::test]
async fn versionstamped_key_fixed_variant_uses_two_byte_position_suffix() {
	let db = MockDatabase::new();
	let tx = db.create_transaction().unwrap();

	let mut key = b"prefix-".to_vec();
	let placeholder_pos = key.len() as u16;
	key.extend_from_slice(&[0u8; 10]);
	key.extend_from_slice(&placeholder_pos.to_le_bytes());

	tx.atomic_op(
		&key,
		b"value",
		NativeMutationType::SetVersionstampedKeyFixedVariant,
	);
	tx.call_commit().await.unwrap();
	let stamp = tx.call_get_versionstamp().await.unwrap();

	let tx2 = db.create_transaction().unwrap();
	let mut expected_key = b"prefix-".to_vec();
	expected_key.extend_from_slice(&stamp);
	let value = tx2.call_get(&expected_key, false).await.unwrap();
	assert_eq!(value, Some(b"value".to_vec()));
}

#[tokio::test]
async fn watch_fires_only_on_value_change() {
	let db = MockDatabase::new();
	let tx = db.create_transaction().unwrap();
	tx.set(b"watched", b"v1");
	tx.call_commit().await.unwrap();

	let tx2 = db.create_transaction().unwrap();
	let watch = tx2.watch(b"watched");

	let db2 = db.clone();
	let same_value = tokio::spawn(async move {
		let tx = db2.create_transaction().unwrap();
		tx.set(b"watched", b"v1");
		tx.call_commit().await.unwrap();
	});
	same_value.await.unwrap();

	let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), watch.wait()).await;
	assert!(timed_out.is_err(), "watch should not fire for a same-value write");

	let db3 = db.clone();
	let different_value = tokio::spawn(async move {
		let tx = db3.create_transaction().unwrap();
		tx.set(b"watched", b"v2");
		tx.call_commit().await.unwrap();
	});
	different_value.await.unwrap();

	tokio::time::timeout(std::time::Duration::from_millis(500), watch.wait())
		.await
		.expect("watch should fire once the value changes")
		.unwrap();
}
