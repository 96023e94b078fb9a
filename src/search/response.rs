//! SRU response parsing
//!
//! Handles `searchRetrieveResponse` documents in SRU 1.2 and 2.0 flavors.
//! Records are the `record` children in the response's own namespace; the
//! reference and title come from Dublin Core terms inside `recordData`.

use crate::search::{Record, SearchPage};
use roxmltree::{Document, Node};

const DCTERMS_NS: &str = "http://purl.org/dc/terms/";

/// SRU diagnostic "first record position out of range"
const DIAG_OUT_OF_RANGE: &str = "diagnostic/1/61";

/// Parses an SRU response into a page whose first record sits at `offset`
///
/// Returns `Err` with a description for malformed documents and for
/// diagnostics other than "position out of range", which reads as an empty
/// page.
///
/// # Example
///
/// ```
/// use lex_harvest::search::parse_search_response;
///
/// let xml = r#"<sru:searchRetrieveResponse xmlns:sru="http://docs.oasis-open.org/ns/search-ws/sruResponse">
///   <sru:numberOfRecords>0</sru:numberOfRecords>
/// </sru:searchRetrieveResponse>"#;
/// let page = parse_search_response(xml, 0).unwrap();
/// assert!(page.records.is_empty());
/// assert_eq!(page.total_available, Some(0));
/// ```
pub fn parse_search_response(xml: &str, offset: u64) -> Result<SearchPage, String> {
    let document = Document::parse(xml).map_err(|e| format!("invalid XML: {}", e))?;
    let root = document.root_element();

    if root.tag_name().name() != "searchRetrieveResponse" {
        return Err(format!(
            "unexpected root element <{}>",
            root.tag_name().name()
        ));
    }

    let sru_ns = root.tag_name().namespace();

    if let Some(diagnostic) = first_diagnostic(&root) {
        if diagnostic.ends_with(DIAG_OUT_OF_RANGE) {
            return Ok(SearchPage::default());
        }
        return Err(format!("SRU diagnostic: {}", diagnostic));
    }

    let total_available = match find_child(&root, "numberOfRecords", sru_ns) {
        Some(node) => {
            let text = node.text().unwrap_or("").trim();
            Some(
                text.parse::<u64>()
                    .map_err(|_| format!("invalid numberOfRecords '{}'", text))?,
            )
        }
        None => None,
    };

    let records = match find_child(&root, "records", sru_ns) {
        Some(container) => container
            .children()
            .filter(|n| is_element(n, "record", sru_ns))
            .enumerate()
            .map(|(index, node)| parse_record(&node, offset + index as u64))
            .collect(),
        None => Vec::new(),
    };

    Ok(SearchPage {
        records,
        total_available,
    })
}

fn parse_record(node: &Node<'_, '_>, position: u64) -> Record {
    Record {
        position,
        reference: dcterms_text(node, "identifier"),
        title: dcterms_text(node, "title"),
    }
}

/// First non-empty text of a Dublin Core term anywhere below `node`
fn dcterms_text(node: &Node<'_, '_>, local_name: &str) -> Option<String> {
    node.descendants()
        .filter(|n| is_element(n, local_name, Some(DCTERMS_NS)))
        .filter_map(|n| n.text())
        .map(|text| text.trim())
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn first_diagnostic(root: &Node<'_, '_>) -> Option<String> {
    let diagnostics = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "diagnostics")?;

    diagnostics
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "uri")
        .and_then(|n| n.text())
        .map(|text| text.trim().to_string())
        .or_else(|| Some("unknown diagnostic".to_string()))
}

fn find_child<'a, 'input>(
    node: &Node<'a, 'input>,
    local_name: &str,
    namespace: Option<&str>,
) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_element(n, local_name, namespace))
}

fn is_element(node: &Node<'_, '_>, local_name: &str, namespace: Option<&str>) -> bool {
    node.is_element()
        && node.tag_name().name() == local_name
        && node.tag_name().namespace() == namespace
}
