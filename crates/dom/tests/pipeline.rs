//! End-to-end extraction on fixtures: offline HTML and a synthetic CDP capture

use jsonfy_dom::html::parse_document;
use jsonfy_dom::{
    composite, composite_arena, serializer, DomRect, DomService, ElementType, Scanner, StructureNode,
    INTERACTIVE_ID_ATTR,
};
use serde_json::{json, Value};

const SHOP: &str = r##"<!DOCTYPE html>
<html>
<head><title>Shop</title><style>.x{}</style></head>
<body>
  <nav><a href="/">Home</a> <a>not a link</a></nav>
  <form id="search">
    <input type="hidden" name="csrf" value="secret">
    <input type="search" name="q" placeholder="Search products">
    <button type="submit" onclick="track()">Search</button>
  </form>
  <div class="empty"></div>
  <div><img src="logo.png"></div>
  <div role="slider" aria-valuenow="3">3</div>
  <div>Hello</div>
  <iframe src="https://ads.example.net/banner"></iframe>
  <script>window.secret = 1;</script>
</body>
</html>"##;

#[test]
fn offline_page_end_to_end() {
    let mut arena = parse_document(SHOP, Some("https://shop.example.com/"));
    let result = Scanner::new().scan_page(&mut arena).unwrap();

    let types: Vec<ElementType> = result.interactive_elements.iter().map(|r| r.element_type).collect();
    assert_eq!(
        types,
        vec![
            ElementType::Link,
            ElementType::InputText,
            ElementType::Button,
            ElementType::Interactive,
        ]
    );
    let ids: Vec<u32> = result.interactive_elements.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert!(result.interactive_elements[1..3]
        .iter()
        .all(|r| r.form_id.as_deref() == Some("search")));

    let elements = serde_json::to_string(&result.interactive_elements).unwrap();
    assert!(!elements.contains("secret"));
    assert!(!elements.contains("track()"));

    assert_eq!(result.iframe_infos.len(), 1);
    assert!(!result.iframe_infos[0].accessible);
    assert!(result.main_content.contains(r#"data-iframe-id="iframe-0""#));

    // Structure of the annotated document
    let doc = arena.root_id().unwrap();
    let structure = serializer::html_structure(&arena, doc, Some("https://shop.example.com/")).unwrap();
    let value = serde_json::to_value(&structure).unwrap();
    assert_eq!(value["document"]["title"], "Shop");
    let body = structure.document.body.unwrap();
    let text = serde_json::to_string(&body).unwrap();
    assert!(!text.contains("secret"));
    assert!(!text.contains("track()"));
    assert!(!text.contains("empty"));

    let tags: Vec<&str> = body
        .walk()
        .into_iter()
        .filter_map(StructureNode::as_element)
        .map(|e| e.tag.as_str())
        .collect();
    assert!(tags.contains(&"img"));
    assert!(!tags.contains(&"script"));

    let annotated: Vec<&str> = body
        .walk()
        .into_iter()
        .filter_map(StructureNode::as_element)
        .filter_map(|e| e.interactive_id.as_deref())
        .collect();
    assert_eq!(annotated, vec!["0", "1", "2", "3"]);

    // Consolidated HTML keeps every iframe accounted for
    let consolidated = composite(&result.main_content, &result.iframe_infos);
    assert!(consolidated.is_complete());
    assert!(consolidated.html.contains("<!-- IFRAME START: iframe-0 (src: https://ads.example.net/banner) -->"));
    assert!(consolidated.html.contains("<!-- IFRAME END: iframe-0 -->"));
}

#[test]
fn rescan_of_unchanged_page_is_identical() {
    let mut arena = parse_document(SHOP, None);
    let scanner = Scanner::new();
    let first = scanner.scan_page(&mut arena).unwrap();
    let second = scanner.scan_page(&mut arena).unwrap();

    assert_eq!(
        serde_json::to_value(&first.interactive_elements).unwrap(),
        serde_json::to_value(&second.interactive_elements).unwrap()
    );
    assert_eq!(first.main_content, second.main_content);
}

fn element(node_id: u32, name: &str, attributes: Value, children: Value) -> Value {
    json!({
        "nodeId": node_id,
        "backendNodeId": node_id + 100,
        "nodeType": 1,
        "nodeName": name,
        "attributes": attributes,
        "children": children,
    })
}

fn text(node_id: u32, value: &str) -> Value {
    json!({ "nodeId": node_id, "backendNodeId": node_id + 100, "nodeType": 3, "nodeName": "#text", "nodeValue": value })
}

/// Top document with a same-origin iframe and a cross-origin iframe
fn capture() -> (Value, Value, Value) {
    let inner_document = json!({
        "nodeId": 20,
        "backendNodeId": 120,
        "nodeType": 9,
        "nodeName": "#document",
        "documentURL": "https://example.com/frame.html",
        "children": [element(21, "HTML", json!([]), json!([
            element(22, "BODY", json!([]), json!([
                element(23, "BUTTON", json!(["id", "inner"]), json!([text(24, "Inner")]))
            ]))
        ]))]
    });

    let mut same_origin = element(10, "IFRAME", json!(["src", "frame.html"]), json!([]));
    same_origin["contentDocument"] = inner_document;

    let dom = json!({
        "root": {
            "nodeId": 1,
            "backendNodeId": 101,
            "nodeType": 9,
            "nodeName": "#document",
            "documentURL": "https://example.com/",
            "children": [element(2, "HTML", json!([]), json!([
                element(3, "HEAD", json!([]), json!([])),
                element(4, "BODY", json!([]), json!([
                    element(5, "A", json!(["href", "/next"]), json!([text(6, "Next")])),
                    element(7, "BUTTON", json!([]), json!([text(8, "Hidden")])),
                    same_origin,
                    element(11, "IFRAME", json!(["src", "https://other.example.org/"]), json!([])),
                ]))
            ]))]
        }
    });

    // strings: 0 block, 1 visible, 2 "1", 3 none
    let snapshot = json!({
        "strings": ["block", "visible", "1", "none"],
        "documents": [
            {
                "scrollOffsetX": 0, "scrollOffsetY": 0,
                "contentWidth": 1000, "contentHeight": 2000,
                "nodes": { "backendNodeId": [101, 102, 103, 104, 105, 107, 110, 111] },
                "layout": {
                    "nodeIndex": [1, 3, 4, 5, 6, 7],
                    "bounds": [
                        [0, 0, 1000, 2000], [0, 0, 1000, 2000], [10, 10, 80, 20],
                        [10, 40, 80, 20], [100, 300, 400, 200], [100, 600, 400, 200]
                    ],
                    "styles": [[0, 1, 2], [0, 1, 2], [0, 1, 2], [3, 1, 2], [0, 1, 2], [0, 1, 2]]
                }
            },
            {
                "scrollOffsetX": 0, "scrollOffsetY": 20,
                "contentWidth": 400, "contentHeight": 600,
                "nodes": { "backendNodeId": [120, 121, 122, 123] },
                "layout": {
                    "nodeIndex": [1, 2, 3],
                    "bounds": [[0, 0, 400, 600], [0, 0, 400, 600], [5, 30, 60, 20]],
                    "styles": [[0, 1, 2], [0, 1, 2], [0, 1, 2]]
                }
            }
        ]
    });

    let metrics = json!({
        "cssLayoutViewport": { "clientWidth": 1000, "clientHeight": 700, "pageX": 0, "pageY": 0 },
        "cssContentSize": { "width": 1000, "height": 2000 }
    });

    (dom, snapshot, metrics)
}

#[test]
fn cdp_capture_end_to_end() {
    let (dom, snapshot, metrics) = capture();
    let mut service = DomService::new();
    service.parse_cdp_dom_tree(&dom).unwrap();
    service.merge_snapshot(&snapshot, 1.0).unwrap();
    service.apply_layout_metrics(&metrics).unwrap();
    let mut arena = service.into_arena();

    let outcome = Scanner::new().scan(&mut arena).unwrap();

    // The display:none button is filtered out
    let summary: Vec<(u32, ElementType, Option<&str>)> = outcome
        .records
        .iter()
        .map(|r| (r.id, r.element_type, r.iframe_id.as_deref()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, ElementType::Link, None),
            (1, ElementType::Button, Some("iframe-0")),
        ]
    );

    // Inner bounds are shifted by the frame position minus its scroll
    assert_eq!(outcome.records[1].bounding_box, Some(DomRect::new(105.0, 310.0, 60.0, 20.0)));
    assert_eq!(outcome.records[1].backend_node_id, Some(123));

    // Annotations address the live nodes by backend id
    let link_annotation = outcome
        .annotations
        .iter()
        .find(|a| a.attribute == INTERACTIVE_ID_ATTR && a.value.as_deref() == Some("0"))
        .unwrap();
    assert_eq!(link_annotation.backend_node_id, Some(105));

    assert_eq!(outcome.iframes.len(), 2);
    assert!(outcome.iframes[0].accessible);
    assert_eq!(outcome.iframes[0].src, "https://example.com/frame.html");
    assert!(outcome.iframes[0].content.contains(r#"<button id="inner" data-interactive-id="1">Inner</button>"#));
    assert!(!outcome.iframes[1].accessible);

    let root = arena.root_id().unwrap();
    let consolidated = composite_arena(&arena, root, &outcome.iframes);
    assert!(consolidated.is_complete());
    assert!(consolidated.html.contains("<!-- IFRAME START: iframe-0 (src: https://example.com/frame.html) -->"));
    assert!(consolidated.html.contains(r#"data-interactive-id="1">Inner</button>"#));
}
