use serde_json::{json, Value};

use super::*;
use crate::model::{AssetData, AssetItem, FragmentMetadata, RegexData};

fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

fn lore(name: &str, keys: &[&str], content: &str) -> Fragment {
    Fragment::new(
        name,
        name,
        FragmentData::Lorebook(LorebookData {
            keys: keys.iter().map(|s| s.to_string()).collect(),
            content: content.into(),
            ..Default::default()
        }),
    )
}

fn slot(name: &str, slotname: &str, content: &[&str], toggleable: Option<bool>) -> Fragment {
    Fragment::new(
        name,
        name,
        FragmentData::Slot(SlotData {
            slotname: slotname.into(),
            separator: Some(String::new()),
            content: content.iter().map(|s| s.to_string()).collect(),
            toggleable,
        }),
    )
}

fn ordered(f: Fragment, order: f64) -> Fragment {
    f.with_metadata(FragmentMetadata { order: Some(order), ..Default::default() })
}

fn vetoing(f: Fragment, names: &[&str]) -> Fragment {
    f.with_metadata(FragmentMetadata {
        remove_object: names.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    })
}

fn run(base: &Document, fragments: &[Fragment]) -> MergeOutcome {
    merge(base, fragments, &MergeOptions::default()).unwrap()
}

fn entries(outcome: &MergeOutcome) -> Vec<Value> {
    outcome.document.target()["character_book"]["entries"].as_array().unwrap().clone()
}

#[test]
fn flat_lorebook_scenario() {
    let base = doc(json!({"name": "Ann", "character_book": {"entries": []}}));
    let out = run(&base, &[lore("Greet", &["hi"], "hello")]);
    let entries = entries(&out);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["keys"], json!(["hi"]));
    assert_eq!(entries[0]["content"], "hello");
    assert_eq!(entries[0]["enabled"], true);
    assert_eq!(entries[0]["constant"], true);
    assert_eq!(entries[0]["insertion_order"], 10);
    assert_eq!(out.counts.lorebook, 1);
}

#[test]
fn asset_scenario() {
    let base = doc(json!({"name": "Ann", "assets": []}));
    let asset = Fragment::new(
        "a",
        "pack/asset",
        FragmentData::Asset(AssetData {
            content: vec![AssetItem { filename: "a.png".into(), assetname: "Portrait".into() }],
        }),
    );
    let out = run(&base, &[asset]);
    assert_eq!(
        out.document.target()["assets"],
        json!([{"type": "x-risu-asset", "uri": "embeded://assets/mod/a.png", "name": "Portrait", "ext": "png"}])
    );
}

#[test]
fn null_lists_are_treated_as_missing() {
    let asset = Fragment::new(
        "a",
        "pack/asset",
        FragmentData::Asset(AssetData {
            content: vec![AssetItem { filename: "a.png".into(), assetname: "A".into() }],
        }),
    );
    let base = doc(json!({"name": "Ann", "assets": null, "character_book": {"entries": null}}));
    let out = run(&base, &[asset.clone(), lore("pack/l", &["k"], "text")]);
    assert_eq!(out.document.target()["assets"][0]["name"], "A");
    assert_eq!(entries(&out).len(), 1);

    let card = doc(json!({"name": "Ann", "assets": null}));
    let merged = merge_companion(&card, &[asset]).unwrap();
    assert_eq!(merged.target()["assets"][0]["uri"], "embeded://assets/mod/a.png");
}

#[test]
fn card_defaults_are_created() {
    let base = doc(json!({"spec": "chara_card_v3", "data": {"name": "Ann"}}));
    let out = run(&base, &[]);
    let data = out.document.target();
    assert_eq!(data["character_book"]["scan_depth"], 7);
    assert_eq!(data["character_book"]["token_budget"], 99999);
    assert_eq!(data["character_book"]["entries"], json!([]));
    assert_eq!(data["assets"], json!([]));
}

#[test]
fn merge_is_deterministic() {
    let base = doc(json!({"spec": "risu_module", "module": {"name": "m", "lorebook": []}}));
    let frags = vec![lore("a/1", &["k"], "x"), lore("b/1", &["k"], "y"), slot("a/s", "<<toggle>>", &["t=1"], None)];
    let first = run(&base, &frags).document.to_pretty_json().unwrap();
    let second = run(&base, &frags).document.to_pretty_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn higher_order_applies_first() {
    let base = doc(json!({"name": "Ann"}));
    let frags = vec![ordered(lore("low", &[], "1"), 1.0), ordered(lore("high", &[], "5"), 5.0), lore("none", &[], "0")];
    let contents: Vec<Value> = entries(&run(&base, &frags)).iter().map(|e| e["content"].clone()).collect();
    assert_eq!(contents, vec![json!("5"), json!("1"), json!("0")]);
}

#[test]
fn vetoed_fragment_never_appears() {
    let base = doc(json!({"name": "Ann"}));
    let frags = vec![
        lore("pack/target", &[], "gone"),
        vetoing(lore("other/veto", &[], "kept"), &["pack/target"]),
    ];
    let out = run(&base, &frags);
    let contents: Vec<Value> = entries(&out).iter().map(|e| e["content"].clone()).collect();
    assert_eq!(contents, vec![json!("kept")]);
    assert_eq!(out.vetoed, vec!["pack/target".to_owned()]);
}

#[test]
fn self_veto_is_ignored() {
    let base = doc(json!({"name": "Ann"}));
    let out = run(&base, &[vetoing(lore("pack/x", &[], "x"), &["pack/x"])]);
    assert_eq!(entries(&out).len(), 1);
}

#[test]
fn vetoed_original_is_removed_even_when_selected() {
    let base = doc(json!({"name": "Ann", "character_book": {"entries": [{"content": "a"}, {"content": "b"}]}}));
    let original = Fragment::original("o1", "original/b", FragmentData::Lorebook(LorebookData::default()), 1);
    let veto = vetoing(lore("pack/v", &[], "new"), &["original/b"]);
    let out = run(&base, &[original, veto]);
    let contents: Vec<Value> = entries(&out).iter().map(|e| e["content"].clone()).collect();
    assert_eq!(contents, vec![json!("a"), json!("new")]);
    assert_eq!(out.counts.removed_originals, 1);
}

#[test]
fn deselected_originals_removed_in_descending_order() {
    let base = doc(json!({"name": "Ann", "character_book": {"entries": [{"content": "0"}, {"content": "1"}, {"content": "2"}]}}));
    let drop = |i: usize| {
        Fragment::original(format!("o{i}"), format!("original/{i}"), FragmentData::Lorebook(LorebookData::default()), i)
            .with_selected(false)
    };
    let out = run(&base, &[drop(0), drop(2), drop(2)]);
    assert_eq!(entries(&out), vec![json!({"content": "1"})]);
}

#[test]
fn original_index_past_end_is_fatal() {
    let base = doc(json!({"name": "Ann", "character_book": {"entries": []}}));
    let bad = Fragment::original("o", "original/x", FragmentData::Lorebook(LorebookData::default()), 3).with_selected(false);
    let err = merge(&base, &[bad], &MergeOptions::default()).unwrap_err();
    assert!(matches!(err, MergeError::OriginalIndexOutOfRange { index: 3, len: 0, .. }));
}

#[test]
fn unselected_mods_are_skipped() {
    let base = doc(json!({"name": "Ann"}));
    let out = run(&base, &[lore("pack/a", &[], "a").with_selected(false)]);
    assert!(entries(&out).is_empty());
}

#[test]
fn slot_substitution() {
    let base = doc(json!({"name": "Ann", "description": "Hello <<name>> !"}));
    let out = run(&base, &[slot("pack/n", "<<name>>", &["World"], Some(false))]);
    assert_eq!(out.document.target()["description"], "Hello World !");
    assert_eq!(out.counts.slot, 1);
}

#[test]
fn toggleable_slot_is_wrapped() {
    let base = doc(json!({"name": "Ann", "description": "<<name>>"}));
    let out = run(&base, &[slot("pack/n", "<<name>>", &["World"], None)]);
    assert_eq!(out.document.target()["description"], toggle_wrap("pack", "World"));
}

#[test]
fn separator_conflict_aborts() {
    let base = doc(json!({"name": "Ann", "description": "<<s>>"}));
    let mut a = slot("a/1", "<<s>>", &["x"], None);
    let mut b = slot("b/1", "<<s>>", &["y"], None);
    if let FragmentData::Slot(d) = &mut a.data {
        d.separator = Some(",".into());
    }
    if let FragmentData::Slot(d) = &mut b.data {
        d.separator = Some(";".into());
    }
    let err = merge(&base, &[a, b], &MergeOptions::default()).unwrap_err();
    match err {
        MergeError::SeparatorConflict(conflicts) => {
            assert_eq!(conflicts[0].slotname, "<<s>>");
            assert_eq!(conflicts[0].sources, vec!["a", "b"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(base.target()["description"], "<<s>>");
}

#[test]
fn unused_slots_stripped_but_brackets_kept() {
    let base = doc(json!({"name": "Ann", "description": "a<<unused>>b", "list": ["[[kept]]", {"x": "<<gone>>"}]}));
    let out = run(&base, &[]);
    let target = out.document.target();
    assert_eq!(target["description"], "ab");
    assert_eq!(target["list"], json!(["[[kept]]", {"x": ""}]));
}

#[test]
fn card_reserved_slots_become_accessory() {
    let base = doc(json!({"spec": "chara_card_v3", "data": {"name": "Ann", "description": "<<who>>"}}));
    let frags = vec![
        slot("pack/w", "<<who>>", &["Bob"], Some(false)),
        slot("pack/l", "<<lua>>", &["print('<<who>>')"], None),
        slot("pack/t", "<<toggle>>", &["extra=1"], None),
        slot("pack/e", "<<embedding>>", &[".a{}"], None),
        Fragment::new(
            "r",
            "pack/regex",
            FragmentData::Regex(RegexData {
                rules: vec![serde_json::from_value(json!({
                    "comment": "c", "in": "a", "out": "b", "type": "editoutput", "ableFlag": false
                }))
                .unwrap()],
            }),
        ),
    ];
    let out = run(&base, &frags);
    assert_eq!(out.accessory.lua, "print('Bob')");
    assert_eq!(
        out.accessory.toggle_menu,
        format!("=Ann=divider\n={DEFAULT_TOGGLE_GROUP_TITLE}=group\npack=pack\n==groupEnd\nextra=1\n=Ann=divider\n")
    );
    assert_eq!(out.accessory.embedding, "\n<style>\n.a{}\n</style>");
    assert_eq!(
        out.document.target()["extensions"]["risuai"]["backgroundHTML"],
        "\n<style>\n.a{}\n</style>"
    );
    assert_eq!(out.regex.len(), 1);
    assert_eq!(out.regex[0]["in"], "a");

    let module = out.accessory_module().unwrap();
    assert_eq!(module.trigger[0]["effect"][0]["code"], "print('Bob')");
    assert_eq!(module.custom_module_toggle, out.accessory.toggle_menu);
}

#[test]
fn module_base_gets_folders_regex_and_lua() {
    let base = doc(json!({
        "spec": "risu_module",
        "module": {
            "name": "mod",
            "lorebook": [],
            "regex": [{"comment": "old"}],
            "trigger": [{"type": "start", "effect": [{"type": "triggerlua", "code": "old()"}]}],
            "backgroundEmbedding": "<style>x{}</style>"
        }
    }));
    let frags = vec![
        lore("pack/a", &["k1", "k2"], "body"),
        slot("pack/l", "<<lua>>", &["new()"], None),
        slot("pack/e", "<<embedding>>", &["y{}"], None),
        Fragment::new(
            "r",
            "pack/regex",
            FragmentData::Regex(RegexData {
                rules: vec![serde_json::from_value(json!({
                    "comment": "new", "in": "a", "out": "b", "type": "editoutput", "ableFlag": false
                }))
                .unwrap()],
            }),
        ),
    ];
    let options = MergeOptions { character_name: Some("Ann".into()), ..Default::default() };
    let out = merge(&base, &frags, &options).unwrap();
    let module = out.document.target();

    let lorebook = module["lorebook"].as_array().unwrap();
    assert_eq!(lorebook.len(), 2);
    assert_eq!(lorebook[0]["mode"], "folder");
    assert_eq!(lorebook[0]["comment"], "pack");
    assert_eq!(lorebook[1]["key"], "k1, k2");
    assert_eq!(lorebook[1]["folder"], lorebook[0]["key"]);
    assert_eq!(lorebook[1]["content"], toggle_wrap("pack", "body"));

    assert_eq!(module["regex"].as_array().unwrap().len(), 2);
    assert_eq!(module["trigger"][0]["effect"][0]["code"], "old()\nnew()");
    assert_eq!(module["backgroundEmbedding"], "<style>x{}\ny{}\n</style>");
    assert!(module["customModuleToggle"].as_str().unwrap().starts_with("=Ann=divider\n"));
    assert!(out.regex.is_empty());
}

#[test]
fn companion_gets_assets_and_slots_only() {
    let card = doc(json!({"spec": "chara_card_v3", "data": {"name": "Ann", "first_mes": "<<greet>><<nope>>"}}));
    let frags = vec![
        lore("pack/l", &[], "ignored"),
        slot("pack/g", "<<greet>>", &["Hi"], Some(false)),
        Fragment::new(
            "a",
            "pack/asset",
            FragmentData::Asset(AssetData {
                content: vec![AssetItem { filename: "b.webp".into(), assetname: "B".into() }],
            }),
        ),
    ];
    let merged = merge_companion(&card, &frags).unwrap();
    let data = merged.target();
    assert_eq!(data["first_mes"], "Hi");
    assert_eq!(data["assets"][0]["ext"], "webp");
    assert!(data.get("character_book").is_none());
}

#[test]
fn annotation_marks_vetoed() {
    let mut frags = vec![lore("a/x", &[], ""), vetoing(lore("b/y", &[], ""), &["a/x"])];
    annotate_vetoes(&mut frags);
    assert!(frags[0].is_removed);
    assert!(!frags[1].is_removed);
}

#[test]
fn validation_reports_missing_name() {
    let mut merged = doc(json!({"name": "Ann"}));
    assert!(validate_result(&merged).is_empty());
    merged.target_mut().insert("name".into(), json!(""));
    assert_eq!(validate_result(&merged), vec!["Character name is missing".to_owned()]);
}
