//! Visual highlighter
//!
//! Builds a self-contained JavaScript expression that draws one labelled
//! box per record. Boxes live in a single absolutely positioned container
//! with `pointer-events: none`, so document flow and hit-testing are
//! unaffected. Running the script again replaces the previous overlay.

use crate::record::ElementRecord;
use crate::types::HIGHLIGHT_CONTAINER_ID;
use serde_json::json;

const PALETTE: &[&str] = &[
    "#FF0000", "#00A000", "#0000FF", "#FFA500", "#800080", "#008080", "#FF69B4", "#4B0082",
    "#FF4500", "#2E8B57", "#DC143C", "#4682B4",
];

/// Script drawing the overlay; evaluates to the number of boxes drawn
pub fn highlight_script(records: &[ElementRecord]) -> String {
    let boxes: Vec<_> = records
        .iter()
        .filter_map(|record| {
            let rect = record.bounding_box?;
            Some(json!({
                "id": record.id,
                "x": rect.x,
                "y": rect.y,
                "w": rect.width,
                "h": rect.height,
                "color": PALETTE[record.id as usize % PALETTE.len()],
            }))
        })
        .collect();

    let data = serde_json::Value::Array(boxes).to_string();
    format!(
        r#"(() => {{
  const previous = document.getElementById({id});
  if (previous) previous.remove();
  const container = document.createElement('div');
  container.id = {id};
  container.style.cssText = 'position:absolute;top:0;left:0;width:0;height:0;pointer-events:none;z-index:2147483647;';
  for (const b of {data}) {{
    const box = document.createElement('div');
    box.style.cssText = `position:absolute;pointer-events:none;box-sizing:border-box;left:${{b.x}}px;top:${{b.y}}px;width:${{b.w}}px;height:${{b.h}}px;border:2px solid ${{b.color}};background:${{b.color}}1A;`;
    const label = document.createElement('div');
    label.textContent = String(b.id);
    label.style.cssText = `position:absolute;top:-18px;right:0;padding:1px 4px;font:bold 12px monospace;color:#fff;background:${{b.color}};border-radius:3px;`;
    box.appendChild(label);
    container.appendChild(box);
  }}
  (document.body || document.documentElement).appendChild(container);
  return container.childElementCount;
}})()"#,
        id = json!(HIGHLIGHT_CONTAINER_ID),
        data = data,
    )
}

/// Script removing the overlay; evaluates to whether one existed
pub fn clear_highlight_script() -> String {
    format!(
        "(() => {{ const el = document.getElementById({}); if (el) {{ el.remove(); return true; }} return false; }})()",
        json!(HIGHLIGHT_CONTAINER_ID)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{selector_for, ElementContent, ElementType};
    use crate::types::DomRect;
    use indexmap::IndexMap;

    fn record(id: u32, rect: Option<DomRect>) -> ElementRecord {
        ElementRecord {
            id,
            element_type: ElementType::Button,
            tag_name: "button".into(),
            content: ElementContent::Text { text: "</script>".into() },
            attributes: IndexMap::new(),
            html_id: None,
            form_id: None,
            iframe_id: None,
            bounding_box: rect,
            selector: selector_for(id),
            node_id: 0,
            backend_node_id: None,
        }
    }

    #[test]
    fn test_script_replaces_previous_overlay() {
        let script = highlight_script(&[record(0, Some(DomRect::new(1.0, 2.0, 30.0, 40.0)))]);
        assert!(script.contains(r#"document.getElementById("__jsonfy_highlight_container")"#));
        assert!(script.contains("previous.remove()"));
        assert!(script.contains("pointer-events:none"));
        assert!(script.contains(r#""x":1.0"#));
    }

    #[test]
    fn test_records_without_box_skipped() {
        let script = highlight_script(&[record(0, None), record(1, Some(DomRect::new(0.0, 0.0, 5.0, 5.0)))]);
        assert!(script.contains(r#""id":1"#));
        assert!(!script.contains(r#""id":0"#));
    }

    #[test]
    fn test_clear_script() {
        assert!(clear_highlight_script().contains("__jsonfy_highlight_container"));
    }
}
