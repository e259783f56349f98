mod common;

use common::{fabric_instance, offline_service, write_fabric_jar};
use molten_lib::core::error::LauncherError;

#[tokio::test]
async fn local_install_copies_and_tracks_the_jar() {
    let (_guard, instance) = fabric_instance();
    let service = offline_service();

    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("sodium.jar");
    write_fabric_jar(&source, "sodium", "Sodium", "0.5.8");

    let record = service.install_mod_local(&instance, &source).await.unwrap();
    assert!(record.enabled);
    assert_eq!(record.file_name, "sodium.jar");
    assert_eq!(record.name.as_deref(), Some("Sodium"));
    assert!(instance.mods_dir().join("sodium.jar").is_file());

    let again = service.install_mod_local(&instance, &source).await;
    assert!(matches!(again, Err(LauncherError::ModAlreadyInstalled(_))));
}

#[tokio::test]
async fn local_install_rejects_non_jar_paths() {
    let (_guard, instance) = fabric_instance();
    let service = offline_service();

    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("notes.txt");
    std::fs::write(&source, "not a mod").unwrap();

    assert!(service.install_mod_local(&instance, &source).await.is_err());
}

#[tokio::test]
async fn toggling_renames_the_file_on_disk() {
    let (_guard, instance) = fabric_instance();
    let service = offline_service();
    let mods_dir = instance.mods_dir();

    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("sodium.jar");
    write_fabric_jar(&source, "sodium", "Sodium", "0.5.8");
    let record = service.install_mod_local(&instance, &source).await.unwrap();

    let toggled = service
        .toggle_mod(&instance, &record.id, false)
        .await
        .unwrap();
    assert!(!toggled.enabled);
    assert!(!mods_dir.join("sodium.jar").exists());
    assert!(mods_dir.join("sodium.jar.disabled").is_file());

    service
        .toggle_mod(&instance, &record.id, true)
        .await
        .unwrap();
    assert!(mods_dir.join("sodium.jar").is_file());
    assert!(!mods_dir.join("sodium.jar.disabled").exists());
}

#[tokio::test]
async fn toggling_an_unknown_id_is_an_error() {
    let (_guard, instance) = fabric_instance();
    let service = offline_service();

    let result = service.toggle_mod(&instance, "missing", true).await;
    assert!(matches!(result, Err(LauncherError::ModNotFound(_))));
}

#[tokio::test]
async fn removal_deletes_the_file_and_the_record() {
    let (_guard, instance) = fabric_instance();
    let service = offline_service();
    let mods_dir = instance.mods_dir();

    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("sodium.jar");
    write_fabric_jar(&source, "sodium", "Sodium", "0.5.8");
    let record = service.install_mod_local(&instance, &source).await.unwrap();

    service.remove_mod(&instance, &record.id).await.unwrap();
    assert!(!mods_dir.join("sodium.jar").exists());
    assert!(!mods_dir.join("sodium.jar.disabled").exists());
    assert!(service.list_mods(&instance).await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_toggle_reports_only_the_ids_that_changed() {
    let (_guard, instance) = fabric_instance();
    let service = offline_service();
    let mods_dir = instance.mods_dir();

    let source_dir = tempfile::tempdir().unwrap();
    let first_jar = source_dir.path().join("a.jar");
    let second_jar = source_dir.path().join("b.jar");
    write_fabric_jar(&first_jar, "a", "Mod A", "1.0.0");
    write_fabric_jar(&second_jar, "b", "Mod B", "1.0.0");
    let a = service.install_mod_local(&instance, &first_jar).await.unwrap();
    let b = service
        .install_mod_local(&instance, &second_jar)
        .await
        .unwrap();

    // b is already disabled; only a should report as changed.
    service.toggle_mod(&instance, &b.id, false).await.unwrap();
    let changed = service
        .bulk_toggle_mods(&instance, &[a.id.clone(), b.id.clone()], false)
        .await
        .unwrap();
    assert_eq!(changed, vec![a.id.clone()]);
    assert!(mods_dir.join("a.jar.disabled").is_file());
    assert!(mods_dir.join("b.jar.disabled").is_file());

    let untouched = service
        .bulk_toggle_mods(&instance, &[], true)
        .await
        .unwrap();
    assert!(untouched.is_empty());
}

#[tokio::test]
async fn bulk_remove_counts_deletions_and_skips_unknown_ids() {
    let (_guard, instance) = fabric_instance();
    let service = offline_service();

    let source_dir = tempfile::tempdir().unwrap();
    let first_jar = source_dir.path().join("a.jar");
    let second_jar = source_dir.path().join("b.jar");
    write_fabric_jar(&first_jar, "a", "Mod A", "1.0.0");
    write_fabric_jar(&second_jar, "b", "Mod B", "1.0.0");
    let a = service.install_mod_local(&instance, &first_jar).await.unwrap();
    service
        .install_mod_local(&instance, &second_jar)
        .await
        .unwrap();

    let removed = service
        .bulk_remove_mods(&instance, &[a.id.clone(), "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let mods = service.list_mods(&instance).await.unwrap();
    assert_eq!(mods.len(), 1);
    assert_eq!(mods[0].file_name, "b.jar");
}

#[tokio::test]
async fn auto_update_preference_flips_without_touching_disk() {
    let (_guard, instance) = fabric_instance();
    let service = offline_service();

    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("sodium.jar");
    write_fabric_jar(&source, "sodium", "Sodium", "0.5.8");
    let record = service.install_mod_local(&instance, &source).await.unwrap();
    assert!(!record.auto_update);

    let flipped = service
        .toggle_mod_auto_update(&instance, &record.id)
        .await
        .unwrap();
    assert!(flipped.auto_update);
    // still the enabled name form on disk
    assert!(instance.mods_dir().join("sodium.jar").is_file());
}
