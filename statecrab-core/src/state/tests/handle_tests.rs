use super::*;
use crate::state::{
    ByteStreamStateHandle, ChannelStateHandle, FileStateHandle, PlaceholderStreamStateHandle,
    StateObject, StateObjectCollection, StreamStateHandle,
};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "statecrab-{prefix}-{}-{nanos}",
        std::process::id()
    ))
}

#[test]
fn test_key_group_range_bounds() {
    let range = KeyGroupRange::of(4, 7);
    assert_eq!(range.len(), 4);
    assert!(range.contains(4));
    assert!(range.contains(7));
    assert!(!range.contains(8));

    let single = KeyGroupRange::of(0, 0);
    assert_eq!(single.len(), 1);
    assert!(single.contains(0));

    assert_eq!(KeyGroupRange::of(5, 4), KeyGroupRange::EMPTY);
    assert!(KeyGroupRange::EMPTY.is_empty());
    assert!(!KeyGroupRange::EMPTY.contains(0));
    assert!(!KeyGroupRange::EMPTY.contains(1));
}

#[test]
fn test_file_handle_discard_removes_file_and_tolerates_missing() {
    let dir = unique_temp_dir("file-handle");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("blob");
    std::fs::write(&path, [0u8; 16]).unwrap();

    let handle = FileStateHandle::new(&path, 16);
    assert_eq!(handle.state_size(), 16);
    handle.discard_state().unwrap();
    assert!(!path.exists());
    handle.discard_state().unwrap();

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_placeholder_counts_towards_state_size_only() {
    let handle: StreamStateHandle = PlaceholderStreamStateHandle::new("sst-9", 128).into();
    assert!(handle.is_placeholder());
    assert_eq!(handle.physical_id(), "sst-9");
    assert_eq!(handle.state_size(), 128);
    assert_eq!(handle.checkpointed_size(), 0);
    handle.discard_state().unwrap();
}

#[test]
fn test_incremental_handle_discards_private_state_only() {
    let dir = unique_temp_dir("incremental-discard");
    std::fs::create_dir_all(&dir).unwrap();
    let shared_path = dir.join("shared.sst");
    let private_path = dir.join("MANIFEST");
    std::fs::write(&shared_path, [0u8; 8]).unwrap();
    std::fs::write(&private_path, [0u8; 2]).unwrap();

    let handle = IncrementalKeyedStateHandle::new(
        1,
        KeyGroupRange::of(0, 9),
        vec![SharedStateSlot::new(
            "000001.sst",
            FileStateHandle::new(&shared_path, 8).into(),
        )],
        vec![FileStateHandle::new(&private_path, 2).into()],
        ByteStreamStateHandle::new("meta", vec![0; 3]).into(),
    );
    assert_eq!(handle.state_size(), 13);
    assert_eq!(handle.checkpointed_size(), 13);

    let registry = SharedStateRegistry::new();
    let handle = KeyedStateHandle::from(handle);
    handle.register_shared_states(&registry, 1).unwrap();
    handle.discard_state().unwrap();
    assert!(shared_path.exists());
    assert!(!private_path.exists());

    registry.unregister_checkpoint(1).unwrap();
    assert!(!shared_path.exists());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_unregistered_incremental_handle_discards_its_shared_files() {
    let dir = unique_temp_dir("incremental-aborted");
    std::fs::create_dir_all(&dir).unwrap();
    let shared_path = dir.join("000007.sst");
    std::fs::write(&shared_path, [0u8; 8]).unwrap();

    let handle = IncrementalKeyedStateHandle::new(
        5,
        KeyGroupRange::of(0, 9),
        vec![
            SharedStateSlot::new("000007.sst", FileStateHandle::new(&shared_path, 8).into()),
            SharedStateSlot::new(
                "000003.sst",
                PlaceholderStreamStateHandle::new(dir.join("000003.sst").display().to_string(), 4)
                    .into(),
            ),
        ],
        vec![],
        ByteStreamStateHandle::new("meta", vec![0; 3]).into(),
    );
    assert!(!handle.is_registered());

    // Checkpoint 5 is aborted before it ever reaches the registry.
    let registry = SharedStateRegistry::new();
    assert_eq!(registry.unregister_checkpoint(5).unwrap(), 0);
    handle.discard_state().unwrap();
    assert!(!shared_path.exists());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_decoded_checkpointed_size_is_bounded_by_state_size() {
    let handle = IncrementalKeyedStateHandle::new(
        1,
        KeyGroupRange::of(0, 0),
        vec![SharedStateSlot::new(
            "000001.sst",
            ByteStreamStateHandle::new("sst-1", vec![0; 10]).into(),
        )],
        vec![],
        ByteStreamStateHandle::new("meta", vec![0; 2]).into(),
    );
    let tampered = IncrementalKeyedStateHandle {
        checkpointed_size: 1_000,
        ..handle
    };

    let decoded: IncrementalKeyedStateHandle =
        bincode::deserialize(&bincode::serialize(&tampered).unwrap()).unwrap();
    assert_eq!(decoded.state_size(), 12);
    assert_eq!(decoded.checkpointed_size(), 12);
    assert!(!decoded.is_registered());
}

#[test]
fn test_key_groups_handle_registers_nothing() {
    let registry = SharedStateRegistry::new();
    let handle = KeyedStateHandle::from(KeyGroupsStateHandle::new(
        KeyGroupRange::of(0, 1),
        vec![0, 4],
        ByteStreamStateHandle::new("full", vec![0; 8]).into(),
    ));
    handle.register_shared_states(&registry, 1).unwrap();
    assert!(registry.is_empty().unwrap());
}

#[test]
fn test_collection_clone_shares_handles() {
    let collection: StateObjectCollection<ChannelStateHandle> = vec![ChannelStateHandle::new(
        3,
        vec![0, 10],
        ByteStreamStateHandle::new("buffers", vec![0; 20]).into(),
    )]
    .into();
    let clone = collection.clone();

    assert!(clone.ptr_eq(&collection));
    assert!(!StateObjectCollection::<ChannelStateHandle>::empty().ptr_eq(&collection));
    assert_eq!(collection.state_size(), 20);
    assert!(collection.has_state());
    assert!(!StateObjectCollection::<ChannelStateHandle>::empty().has_state());
}
