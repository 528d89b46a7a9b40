use serde_json::Value;

const REGEX_FIELDS: [&str; 5] = ["comment", "in", "out", "type", "ableFlag"];

fn non_empty_str(value: Option<&Value>) -> bool {
    value.and_then(Value::as_str).is_some_and(|s| !s.is_empty())
}

fn string_array(value: Option<&Value>) -> bool {
    value.and_then(Value::as_array).is_some_and(|items| items.iter().all(Value::is_string))
}

/// Problems with one mod item.  Empty when the item is usable.
pub fn validate_item(item: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(obj) = item.as_object() else {
        errors.push("not a JSON object".to_owned());
        return errors;
    };

    if obj.get("type").and_then(Value::as_str) == Some("regex") {
        match obj.get("data").and_then(Value::as_array) {
            None => errors.push("regex items need a `data` array".to_owned()),
            Some(rules) => {
                for (i, rule) in rules.iter().enumerate() {
                    let complete = rule.as_object().is_some_and(|r| REGEX_FIELDS.iter().all(|f| r.contains_key(*f)));
                    if !complete {
                        errors.push(format!("data[{i}] needs comment, in, out, type and ableFlag"));
                    }
                }
            }
        }
        return errors;
    }

    let section = obj.get("section").and_then(Value::as_str);
    match section {
        None => errors.push("missing `section`".to_owned()),
        Some("lorebook" | "asset" | "slot") => {}
        Some(other) => errors.push(format!("unknown section `{other}`")),
    }
    if !non_empty_str(obj.get("name")) {
        errors.push("missing `name`".to_owned());
    }

    match section {
        Some("asset") => match obj.get("content").and_then(Value::as_array) {
            None => errors.push("asset items need a `content` array".to_owned()),
            Some(items) => {
                for (i, entry) in items.iter().enumerate() {
                    if !non_empty_str(entry.get("filename")) || !non_empty_str(entry.get("assetname")) {
                        errors.push(format!("content[{i}] needs filename and assetname"));
                    }
                }
            }
        },
        Some("slot") => {
            if !non_empty_str(obj.get("slotname")) {
                errors.push("slot items need a `slotname`".to_owned());
            }
            if !string_array(obj.get("content")) {
                errors.push("slot items need a `content` array of strings".to_owned());
            }
        }
        Some("lorebook") => {
            if obj.get("keys").is_some_and(|k| !string_array(Some(k))) {
                errors.push("`keys` must be an array of strings".to_owned());
            }
            if obj.get("content").is_some_and(|c| !c.is_string()) {
                errors.push("`content` must be a string".to_owned());
            }
        }
        _ => {}
    }
    errors
}
