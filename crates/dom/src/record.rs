//! Scan output records
//!
//! These are the JSON-facing types handed to the driver and persisted as
//! `interactive_elements.json`. Field names follow the camelCase wire format.

use crate::metadata::PageMetadata;
use crate::types::{BackendNodeId, DomRect, NodeId, INTERACTIVE_ID_ATTR};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Semantic kind of an interactive element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementType {
    Link,
    Button,
    InputText,
    InputCheckbox,
    InputRadio,
    Select,
    Textarea,
    Interactive,
}

impl ElementType {
    /// Form controls carry a value and may belong to a form
    pub fn is_control(self) -> bool {
        matches!(
            self,
            ElementType::InputText
                | ElementType::InputCheckbox
                | ElementType::InputRadio
                | ElementType::Select
                | ElementType::Textarea
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Link => "link",
            ElementType::Button => "button",
            ElementType::InputText => "input-text",
            ElementType::InputCheckbox => "input-checkbox",
            ElementType::InputRadio => "input-radio",
            ElementType::Select => "select",
            ElementType::Textarea => "textarea",
            ElementType::Interactive => "interactive",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the element says (text) or holds (form controls)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ElementContent {
    Text {
        text: String,
    },
    Control {
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

/// One accepted interactive element
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    pub id: u32,
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub tag_name: String,
    pub content: ElementContent,
    pub attributes: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<DomRect>,
    pub selector: String,

    /// Arena node the record was built from
    #[serde(skip)]
    pub node_id: NodeId,
    /// Live DOM identity, absent for offline scans
    #[serde(skip)]
    pub backend_node_id: Option<BackendNodeId>,
}

impl ElementRecord {
    pub fn is_disabled(&self) -> bool {
        self.attributes.contains_key("disabled")
    }
}

/// CSS selector addressing an interactive id
pub fn selector_for(id: u32) -> String {
    format!("[{}=\"{}\"]", INTERACTIVE_ID_ATTR, id)
}

/// Parse `[data-interactive-id="N"]` (quotes optional) or a bare `N`
pub fn parse_selector(selector: &str) -> Option<u32> {
    let selector = selector.trim();
    if let Ok(id) = selector.parse::<u32>() {
        return Some(id);
    }
    let inner = selector.strip_prefix('[')?.strip_suffix(']')?;
    let (name, value) = inner.split_once('=')?;
    if name.trim() != INTERACTIVE_ID_ATTR {
        return None;
    }
    value
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .parse()
        .ok()
}

/// One discovered iframe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IframeInfo {
    pub id: String,
    pub src: String,
    #[serde(rename = "outerHTML")]
    pub outer_html: String,
    pub content: String,
    pub accessible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<crate::serializer::StructureNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_iframe_id: Option<String>,
}

/// Everything one scan produces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub main_content: String,
    pub interactive_elements: Vec<ElementRecord>,
    pub iframe_infos: Vec<IframeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_wire_names() {
        assert_eq!(
            serde_json::to_value(ElementType::InputCheckbox).unwrap(),
            serde_json::json!("input-checkbox")
        );
        assert_eq!(ElementType::Interactive.to_string(), "interactive");
        assert!(ElementType::Select.is_control());
        assert!(!ElementType::Button.is_control());
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(selector_for(7), r#"[data-interactive-id="7"]"#);
        assert_eq!(parse_selector(&selector_for(7)), Some(7));
        assert_eq!(parse_selector("[data-interactive-id='12']"), Some(12));
        assert_eq!(parse_selector(" 3 "), Some(3));
        assert_eq!(parse_selector("#login"), None);
        assert_eq!(parse_selector("[data-other=\"1\"]"), None);
    }

    #[test]
    fn test_record_json_shape() {
        let record = ElementRecord {
            id: 0,
            element_type: ElementType::InputText,
            tag_name: "input".into(),
            content: ElementContent::Control {
                value: None,
                placeholder: Some("Email".into()),
                label: None,
            },
            attributes: IndexMap::new(),
            html_id: Some("email".into()),
            form_id: None,
            iframe_id: None,
            bounding_box: None,
            selector: selector_for(0),
            node_id: 4,
            backend_node_id: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "input-text");
        assert_eq!(json["tagName"], "input");
        assert_eq!(json["htmlId"], "email");
        assert_eq!(json["content"]["kind"], "control");
        assert_eq!(json["content"]["placeholder"], "Email");
        assert!(json.get("formId").is_none());
        assert!(json.get("nodeId").is_none());
    }
}
