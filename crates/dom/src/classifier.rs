//! Element classifier
//!
//! Decides whether a node is interactive and what kind of interaction it
//! offers. Pure: looks only at the node itself (tag, attributes, and the
//! `isClickable` flag from the layout snapshot when present).

use crate::record::ElementType;
use crate::types::DomNode;

/// ARIA roles that make an otherwise inert element interactive
pub const INTERACTIVE_ROLES: &[&str] = &[
    "tab",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "checkbox",
    "radio",
    "switch",
    "link",
    "slider",
    "option",
    "combobox",
    "textbox",
    "searchbox",
    "spinbutton",
    "treeitem",
    "listbox",
    "scrollbar",
];

#[derive(Debug, Clone, Default)]
pub struct ClassifierConfig {
    /// Report `<textarea>` as `textarea` instead of `input-text`
    pub distinguish_textarea: bool,
}

/// Classify with the default configuration
pub fn classify(node: &DomNode) -> Option<ElementType> {
    classify_with(node, &ClassifierConfig::default())
}

/// Rules apply in priority order; the first match wins
pub fn classify_with(node: &DomNode, config: &ClassifierConfig) -> Option<ElementType> {
    let tag = node.tag_name()?;

    if tag == "a" && node.attr("href").is_some_and(|href| !href.trim().is_empty()) {
        return Some(ElementType::Link);
    }

    if tag == "button" || has_role(node, "button") {
        return Some(ElementType::Button);
    }

    if tag == "input" {
        return match input_type(node).as_str() {
            "hidden" => None,
            "button" | "submit" | "reset" | "image" => Some(ElementType::Button),
            "checkbox" => Some(ElementType::InputCheckbox),
            "radio" => Some(ElementType::InputRadio),
            _ => Some(ElementType::InputText),
        };
    }

    if tag == "textarea" {
        return Some(if config.distinguish_textarea {
            ElementType::Textarea
        } else {
            ElementType::InputText
        });
    }

    if tag == "select" {
        return Some(ElementType::Select);
    }

    if INTERACTIVE_ROLES.iter().any(|role| has_role(node, role))
        || has_focusable_tabindex(node)
        || node.has_attr("onclick")
        || node.is_clickable()
        || is_content_editable(node)
    {
        return Some(ElementType::Interactive);
    }

    None
}

/// Lowercased `type` of an `<input>`, `text` when absent
pub fn input_type(node: &DomNode) -> String {
    node.attr("type")
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "text".to_string())
}

/// `role` may hold a space-separated fallback list
fn has_role(node: &DomNode, role: &str) -> bool {
    node.attr("role")
        .is_some_and(|roles| roles.split_ascii_whitespace().any(|r| r.eq_ignore_ascii_case(role)))
}

fn has_focusable_tabindex(node: &DomNode) -> bool {
    node.attr("tabindex")
        .and_then(|t| t.trim().parse::<i32>().ok())
        .is_some_and(|t| t >= 0)
}

fn is_content_editable(node: &DomNode) -> bool {
    node.attr("contenteditable").is_some_and(|v| {
        let v = v.trim().to_ascii_lowercase();
        v.is_empty() || v == "true" || v == "plaintext-only"
    })
}

/// `disabled` attribute or `aria-disabled="true"`
pub fn is_disabled(node: &DomNode) -> bool {
    node.has_attr("disabled")
        || node
            .attr("aria-disabled")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}
