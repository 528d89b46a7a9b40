use risum_mod::archive::{ArchiveBuilder, ArchiveSink, ArchiveSource, ZipSource};
use risum_mod::codec::{get_codec, CodecId, RPackCodec};
use risum_mod::container;
use risum_mod::ingest::{ingest_paths, original_fragments};
use risum_mod::package::{assemble, load_base_file, PackageOptions};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut builder = ArchiveBuilder::new();
    for (name, data) in entries {
        builder.write_entry(name, data.clone()).unwrap();
    }
    fs::write(path, builder.finish().unwrap()).unwrap();
}

fn json_bytes(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

fn card() -> Value {
    json!({
        "spec": "chara_card_v3",
        "data": {
            "name": "Mira",
            "description": "Mira lives by <<place>>.",
            "character_book": {"entries": [
                {"keys": ["old"], "content": "Old entry", "comment": "Old"},
                {"keys": ["keep"], "content": "Kept entry", "comment": "Keep"}
            ]},
            "assets": [{"type": "icon", "uri": "embeded://assets/icon/main.png", "name": "main", "ext": "png"}]
        }
    })
}

fn mod_package(dir: &Path) -> PathBuf {
    let path = dir.join("seaside.zip");
    write_zip(
        &path,
        &[
            ("metadata.json", json_bytes(json!({"mod_name": "Seaside", "order": 1}))),
            (
                "lorebook.json",
                json_bytes(json!({"section": "lorebook", "name": "Harbor", "keys": ["harbor"], "content": "Boats."})),
            ),
            (
                "slots.json",
                json_bytes(json!({"section": "slot", "name": "place", "slotname": "[[place]]", "content": ["the sea"], "toggleable": false})),
            ),
            ("assets/gull.png", vec![0x89, b'P', b'N', b'G']),
        ],
    );
    path
}

fn entry_paths(zip: &ZipSource<fs::File>) -> Vec<String> {
    zip.list_entries().iter().map(|e| e.path.clone()).collect()
}

#[test]
fn test_card_merge_end_to_end() {
    let dir = TempDir::new().unwrap();
    let base_path = dir.path().join("mira.charx");
    write_zip(&base_path, &[("card.json", json_bytes(card())), ("assets/icon/main.png", vec![1, 2, 3])]);
    let mod_path = mod_package(dir.path());

    let options = PackageOptions::default();
    let base = load_base_file(&base_path, &options).unwrap();
    let report = ingest_paths(&[mod_path]);
    assert!(report.is_clean(), "{:?}", report.errors);

    let mut fragments = original_fragments(&base.document);
    fragments[0].selected = false;
    fragments.extend(report.fragments);

    let out = assemble(&base, &fragments, &options).unwrap();
    assert_eq!(out.outcome.counts.removed_originals, 1);
    let out_path = dir.path().join("merged.charx");
    fs::write(&out_path, &out.archive).unwrap();

    let mut zip = ZipSource::open(&out_path).unwrap();
    assert_eq!(
        entry_paths(&zip),
        ["card.json", "module.risum", "assets/icon/main.png", "assets/mod/gull.png"]
    );

    let merged: Value = serde_json::from_slice(&zip.read_entry("card.json").unwrap()).unwrap();
    let data = &merged["data"];
    assert_eq!(data["description"], "Mira lives by the sea.");
    let entries = data["character_book"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["comment"], "Keep");
    assert_eq!(entries[1]["content"], "Boats.");
    assert_eq!(data["assets"][1]["uri"], "embeded://assets/mod/gull.png");

    let accessory = container::decode(&zip.read_entry("module.risum").unwrap(), &RPackCodec).unwrap();
    let toggle = accessory.module["customModuleToggle"].as_str().unwrap();
    assert!(toggle.starts_with("=Mira=divider\n"));
    assert!(toggle.contains("Seaside=Seaside\n"));
}

#[test]
fn test_module_merge_end_to_end() {
    let dir = TempDir::new().unwrap();
    let codec = get_codec(CodecId::RPack);
    let module = json!({
        "name": "Lore pack",
        "lorebook": [{"key": "a", "content": "Alpha", "mode": "normal", "comment": "A"}],
        "regex": [],
        "trigger": []
    });
    let risum = container::encode(&module, &[b"image-0".to_vec()], codec.as_ref()).unwrap();

    let base_path = dir.path().join("pack.charx");
    write_zip(
        &base_path,
        &[("card.json", json_bytes(card())), ("module.risum", risum), ("x_meta/0.json", b"{}".to_vec())],
    );
    let mod_path = mod_package(dir.path());

    let options = PackageOptions::default();
    let base = load_base_file(&base_path, &options).unwrap();
    assert!(base.document.is_module());

    let mut fragments = original_fragments(&base.document);
    fragments.extend(ingest_paths(&[mod_path]).fragments);
    let out = assemble(&base, &fragments, &options).unwrap();

    let out_path = dir.path().join("merged.charx");
    fs::write(&out_path, &out.archive).unwrap();
    let mut zip = ZipSource::open(&out_path).unwrap();
    assert_eq!(entry_paths(&zip), ["x_meta/0.json", "card.json", "module.risum", "assets/mod/gull.png"]);

    let merged = container::decode(&zip.read_entry("module.risum").unwrap(), codec.as_ref()).unwrap();
    assert_eq!(merged.assets, vec![b"image-0".to_vec()]);
    let lorebook = merged.module["lorebook"].as_array().unwrap();
    // original entry, then the Seaside folder and its entry
    assert_eq!(lorebook.len(), 3);
    assert_eq!(lorebook[1]["mode"], "folder");
    assert_eq!(lorebook[2]["folder"], lorebook[1]["key"]);
    assert!(merged.module["customModuleToggle"].as_str().unwrap().starts_with("=Mira=divider\n"));

    let companion: Value = serde_json::from_slice(&zip.read_entry("card.json").unwrap()).unwrap();
    assert_eq!(companion["data"]["description"], "Mira lives by the sea.");
    assert_eq!(companion["data"]["assets"][1]["name"], "gull");

    let stripped = container::decode(&out.toggle_module.unwrap(), codec.as_ref()).unwrap();
    assert!(stripped.assets.is_empty());
    assert!(stripped.module["lorebook"].as_array().unwrap().iter().all(|e| e["content"] == ""));
}

#[test]
fn test_output_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let base_path = dir.path().join("mira.charx");
    write_zip(&base_path, &[("card.json", json_bytes(card()))]);
    let mod_path = mod_package(dir.path());

    let options = PackageOptions::default();
    let base = load_base_file(&base_path, &options).unwrap();
    let fragments = ingest_paths(&[mod_path]).fragments;

    let first = assemble(&base, &fragments, &options).unwrap();
    let second = assemble(&base, &fragments, &options).unwrap();
    assert_eq!(first.archive, second.archive);
}

#[test]
fn test_missing_card_is_an_error() {
    let dir = TempDir::new().unwrap();
    let base_path = dir.path().join("empty.charx");
    write_zip(&base_path, &[("readme.txt", b"nothing".to_vec())]);
    let err = load_base_file(&base_path, &PackageOptions::default()).unwrap_err();
    assert!(err.to_string().contains("card.json"));
}
