//! Declared parameter shapes.
//!
//! Mods written for older loader releases never carried a shape tag, so the
//! shape is recognized from which fields are present. Classification runs
//! once, in a fixed matcher order, and produces an [`AddonParams`] value that
//! the rest of the crate dispatches on.
//!
//! Accepted shapes:
//! - `{type?: string}`: converted mod, images come from the mod's own list
//! - `{type: string, imgFileList: string[]}`: flat list
//! - `{types: [{type, imgFileListFile} | {type, imgDir}]}`: multi-type

use serde_json::{Map, Value};

/// One item of a multi-type declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeItem {
    /// Image list stored as a JSON file inside the archive
    FileListFile { type_name: String, file: String },
    /// Every image under a folder of the archive
    ImageDir { type_name: String, dir: String },
}

impl TypeItem {
    pub fn type_name(&self) -> &str {
        match self {
            TypeItem::FileListFile { type_name, .. } | TypeItem::ImageDir { type_name, .. } => {
                type_name
            }
        }
    }
}

/// Classified add-on parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonParams {
    /// Converted from the mod's own image list; `None` means "converted-<mod>"
    Converted { type_name: Option<String> },
    FlatList { type_name: String, files: Vec<String> },
    MultiType { items: Vec<TypeItem> },
}

impl AddonParams {
    /// Classify raw params; `None` when no shape matches
    pub fn classify(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        MATCHERS.iter().find_map(|matcher| matcher(obj))
    }

    /// Type name a converted mod registers under
    pub fn converted_type_name(type_name: Option<&str>, mod_name: &str) -> String {
        match type_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("converted-{}", mod_name),
        }
    }
}

type Matcher = fn(&Map<String, Value>) -> Option<AddonParams>;

const MATCHERS: &[Matcher] = &[match_converted, match_flat_list, match_multi_type];

fn is_nil(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).map(Value::is_null).unwrap_or(true)
}

fn opt_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn match_converted(obj: &Map<String, Value>) -> Option<AddonParams> {
    let type_ok = is_nil(obj, "type") || obj.get("type").is_some_and(Value::is_string);
    if !(type_ok && is_nil(obj, "imgFileList") && is_nil(obj, "types")) {
        return None;
    }
    Some(AddonParams::Converted {
        type_name: opt_string(obj, "type"),
    })
}

fn match_flat_list(obj: &Map<String, Value>) -> Option<AddonParams> {
    let type_name = opt_string(obj, "type")?;
    if !is_nil(obj, "types") {
        return None;
    }
    let files = string_array(obj.get("imgFileList")?)?;
    Some(AddonParams::FlatList { type_name, files })
}

fn match_type_item(value: &Value) -> Option<TypeItem> {
    let obj = value.as_object()?;
    let type_name = opt_string(obj, "type")?;

    if let Some(file) = opt_string(obj, "imgFileListFile") {
        if is_nil(obj, "imgDir") {
            return Some(TypeItem::FileListFile { type_name, file });
        }
    } else if let Some(dir) = opt_string(obj, "imgDir") {
        if is_nil(obj, "imgFileListFile") {
            return Some(TypeItem::ImageDir { type_name, dir });
        }
    }
    None
}

fn match_multi_type(obj: &Map<String, Value>) -> Option<AddonParams> {
    if !(is_nil(obj, "type") && is_nil(obj, "imgFileList")) {
        return None;
    }
    let items = obj
        .get("types")?
        .as_array()?
        .iter()
        .map(match_type_item)
        .collect::<Option<Vec<_>>>()?;
    Some(AddonParams::MultiType { items })
}
