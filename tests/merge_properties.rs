//! Property-based tests for the container codec and the merge engine.
//!
//! - Container encode/decode is lossless for every codec
//! - Merging is deterministic
//! - No `<<slot>>` token survives a merge
//! - Vetoed fragments never reach the output

use proptest::prelude::*;
use risum_mod::codec::{get_codec, CodecId};
use risum_mod::container;
use risum_mod::merge::{merge, MergeOptions};
use risum_mod::model::{Document, Fragment, FragmentData, FragmentMetadata, LorebookData, SlotData};
use serde_json::{json, Value};

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn codec_strategy() -> impl Strategy<Value = CodecId> {
    prop_oneof![Just(CodecId::None), Just(CodecId::RPack), Just(CodecId::Zstd)]
}

fn assets_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 0..6)
}

fn slot_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}").unwrap()
}

fn card(description: &str) -> Document {
    Document::from_value(json!({"name": "Ann", "description": description})).unwrap()
}

fn lore(name: &str, order: f64, vetoes: Vec<String>) -> Fragment {
    Fragment::new(
        name,
        name,
        FragmentData::Lorebook(LorebookData { keys: vec![name.to_owned()], content: name.to_owned(), ..Default::default() }),
    )
    .with_metadata(FragmentMetadata { order: Some(order), remove_object: vetoes, disable_toggle: false })
}

fn slot(name: &str, slotname: &str, content: &str) -> Fragment {
    Fragment::new(
        name,
        name,
        FragmentData::Slot(SlotData {
            slotname:   format!("<<{slotname}>>"),
            content:    vec![content.to_owned()],
            toggleable: Some(false),
            ..Default::default()
        }),
    )
}

// =============================================================================
// CONTAINER PROPERTIES
// =============================================================================

mod container_properties {
    use super::*;

    proptest! {
        /// Decoding an encoded container returns the same module and assets
        #[test]
        fn roundtrip_preserves_module_and_assets(
            id in codec_strategy(),
            name in "[ -~]{0,40}",
            assets in assets_strategy(),
        ) {
            let codec = get_codec(id);
            let module = json!({"name": name, "lorebook": [], "regex": []});

            let bytes = container::encode(&module, &assets, codec.as_ref()).unwrap();
            let decoded = container::decode(&bytes, codec.as_ref()).unwrap();

            prop_assert_eq!(decoded.module, module);
            prop_assert_eq!(decoded.assets, assets);
        }

        /// Framing always reports one asset frame per asset, terminated
        #[test]
        fn framing_counts_assets(assets in assets_strategy()) {
            let codec = get_codec(CodecId::None);
            let bytes = container::encode(&json!({}), &assets, codec.as_ref()).unwrap();
            let framing = container::split_frames(&bytes).unwrap();

            prop_assert_eq!(framing.assets.len(), assets.len());
            prop_assert!(framing.terminated);
        }
    }
}

// =============================================================================
// MERGE PROPERTIES
// =============================================================================

mod merge_properties {
    use super::*;

    proptest! {
        /// Same inputs, same output
        #[test]
        fn merge_is_deterministic(orders in prop::collection::vec(-5.0f64..5.0, 0..8)) {
            let fragments: Vec<Fragment> =
                orders.iter().enumerate().map(|(i, o)| lore(&format!("m/l{i}"), *o, Vec::new())).collect();
            let base = card("");

            let first = merge(&base, &fragments, &MergeOptions::default()).unwrap();
            let second = merge(&base, &fragments, &MergeOptions::default()).unwrap();

            prop_assert_eq!(first.document.to_value(), second.document.to_value());
            prop_assert_eq!(first.accessory, second.accessory);
        }

        /// Entries come out in descending order
        #[test]
        fn entries_follow_descending_order(orders in prop::collection::vec(-5i32..5, 1..8)) {
            let fragments: Vec<Fragment> =
                orders.iter().enumerate().map(|(i, o)| lore(&format!("m/l{i}"), f64::from(*o), Vec::new())).collect();

            let out = merge(&card(""), &fragments, &MergeOptions::default()).unwrap();
            let value = out.document.to_value();
            let names: Vec<&str> = value["character_book"]["entries"]
                .as_array()
                .unwrap()
                .iter()
                .map(|e| e["name"].as_str().unwrap())
                .collect();

            let mut expected: Vec<(i32, usize)> = orders.iter().enumerate().map(|(i, o)| (*o, i)).collect();
            expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            let expected: Vec<String> = expected.iter().map(|(_, i)| format!("m/l{i}")).collect();
            prop_assert_eq!(names, expected);
        }

        /// Filled or not, no slot token is left behind
        #[test]
        fn no_slot_token_survives(
            names in prop::collection::vec(slot_name_strategy(), 1..6),
            filled in prop::collection::vec(any::<bool>(), 6),
        ) {
            let description = names.iter().map(|n| format!("<<{n}>>")).collect::<Vec<_>>().join(" ");
            let fragments: Vec<Fragment> = names
                .iter()
                .zip(&filled)
                .filter(|(_, f)| **f)
                .enumerate()
                .map(|(i, (n, _))| slot(&format!("m/s{i}"), n, "x"))
                .collect();

            let out = merge(&card(&description), &fragments, &MergeOptions::default()).unwrap();
            let value = out.document.to_value();
            let text = value["description"].as_str().unwrap();
            prop_assert!(!text.contains("<<"), "left over: {}", text);
        }

        /// A vetoed fragment never reaches the output
        #[test]
        fn vetoed_fragments_are_not_applied(count in 2usize..8, target in 0usize..8) {
            let target = target % count;
            let mut fragments: Vec<Fragment> =
                (0..count).map(|i| lore(&format!("m/l{i}"), 0.0, Vec::new())).collect();
            let veto = format!("m/l{target}");
            fragments.push(lore("v/vetoer", 0.0, vec![veto.clone()]));

            let out = merge(&card(""), &fragments, &MergeOptions::default()).unwrap();
            let value = out.document.to_value();
            let entries = value["character_book"]["entries"].as_array().unwrap();

            prop_assert_eq!(entries.len(), count);
            prop_assert!(entries.iter().all(|e| e["name"] != Value::String(veto.clone())));
            prop_assert_eq!(out.vetoed, vec![veto]);
        }
    }
}
