//! Label vocabulary: `<Category><Item>` names such as `FreshApple`.

use serde::{Deserialize, Serialize};

/// Produce the model was trained on, in output-index order within each category.
pub const ITEMS: [&str; 10] = [
    "Apple",
    "Banana",
    "Mango",
    "Orange",
    "Strawberry",
    "Carrot",
    "Potato",
    "Tomato",
    "Cucumber",
    "Bellpepper",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelCategory {
    Fresh,
    Rotten,
    Unknown,
}

/// A label split into its category and the bare item type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelInfo {
    pub category: LabelCategory,
    pub item_type: String,
}

impl LabelInfo {
    pub fn is_fresh(&self) -> bool {
        self.category == LabelCategory::Fresh
    }

    pub fn is_rotten(&self) -> bool {
        self.category == LabelCategory::Rotten
    }
}

/// Output order of the bundled on-device model: five fruits fresh, five
/// fruits rotten, then the same for vegetables.
pub fn default_catalog() -> Vec<String> {
    let (fruits, vegetables) = ITEMS.split_at(5);
    let mut labels = Vec::with_capacity(ITEMS.len() * 2);
    for group in [fruits, vegetables] {
        labels.extend(group.iter().map(|item| format!("Fresh{item}")));
        labels.extend(group.iter().map(|item| format!("Rotten{item}")));
    }
    labels
}

/// Split `label` into category and item type.
///
/// A `fresh`/`rotten` prefix wins; otherwise the first case-insensitive
/// occurrence anywhere in the text is used, which covers free-form server
/// predictions like `"The banana is ROTTEN"`.
pub fn parse_label(label: &str) -> LabelInfo {
    let lowered = label.to_ascii_lowercase();

    for (needle, category) in [("fresh", LabelCategory::Fresh), ("rotten", LabelCategory::Rotten)] {
        if lowered.starts_with(needle) {
            return LabelInfo {
                category,
                item_type: trim_item(&label[needle.len()..]),
            };
        }
    }

    for (needle, category) in [("fresh", LabelCategory::Fresh), ("rotten", LabelCategory::Rotten)] {
        if let Some(start) = lowered.find(needle) {
            let end = start + needle.len();
            let remainder = format!("{} {}", &label[..start], &label[end..]);
            return LabelInfo {
                category,
                item_type: trim_item(&remainder),
            };
        }
    }

    LabelInfo {
        category: LabelCategory::Unknown,
        item_type: trim_item(label),
    }
}

fn trim_item(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
