//! Integration tests for the requisition merge pipeline.
//!
//! These tests validate:
//! - The item table has one row per item plus header and total
//! - Every placeholder is resolved
//! - Signature compositing at its anchor
//! - Concurrent submissions never share a working copy
//! - Ledger buckets, catalog lookups and the published PDF

use std::sync::Arc;
use std::thread;

use chrono::{FixedOffset, TimeZone};
use serde_json::{json, Value};

use requisition_forge::catalog::Catalog;
use requisition_forge::dom::{find_text, parse_html, to_html, DomNode, ElementNode, Tag};
use requisition_forge::export::PDF_MIME;
use requisition_forge::ledger::{FileLedger, MemoryLedger, LEDGER_HEADER, SPECIAL_REQUEST};
use requisition_forge::merge::{apply_stages, Stage, StageStatus};
use requisition_forge::pipeline::PipelineConfig;
use requisition_forge::record::normalize;
use requisition_forge::signature::SPACER_PNG;
use requisition_forge::store::{FileStore, MemoryFileStore};
use requisition_forge::template::{TemplateRegistry, WorkingDocument, HTML_MIME, REQUISITION_TEMPLATE};
use requisition_forge::{MergePipeline, RequisitionService};

// =====================================================================
// Helpers
// =====================================================================

const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

fn special_request() -> Value {
    json!({
        "branch": "MAIN",
        "date": "2024-01-01",
        "to": "Store",
        "purpose": "Special Request",
        "items": [
            { "description": "BOLT M6", "qty": 10, "unit": "PCS", "uprice": 2, "amount": 20 }
        ],
        "total": 20,
        "requested_by": "J. Doe"
    })
}

fn record_with_items(n: usize) -> Value {
    let items: Vec<Value> = (0..n)
        .map(|i| json!({ "description": format!("ITEM {i}"), "qty": i + 1, "unit": "PCS" }))
        .collect();
    json!({ "branch": "north", "purpose": "Restock", "items": items, "total": n })
}

fn working_doc() -> WorkingDocument {
    WorkingDocument {
        id: "doc".into(),
        name: "doc".into(),
        nodes: parse_html(REQUISITION_TEMPLATE),
        corrupt: None,
    }
}

fn collect<'a>(nodes: &'a [DomNode], tag: &Tag, out: &mut Vec<&'a ElementNode>) {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if &e.tag == tag {
                out.push(e);
            }
            collect(&e.children, tag, out);
        }
    }
}

fn elements<'a>(nodes: &'a [DomNode], tag: Tag) -> Vec<&'a ElementNode> {
    let mut out = Vec::new();
    collect(nodes, &tag, &mut out);
    out
}

fn rows_of(table: &ElementNode) -> Vec<&ElementNode> {
    table
        .children
        .iter()
        .filter_map(DomNode::as_element)
        .filter(|e| e.tag == Tag::Tr)
        .collect()
}

fn cells_of(row: &ElementNode) -> Vec<&ElementNode> {
    row.children.iter().filter_map(DomNode::as_element).collect()
}

fn service(store: Arc<MemoryFileStore>, ledger: Arc<MemoryLedger>, catalog: Catalog) -> RequisitionService {
    let registry = TemplateRegistry::builtin(store).unwrap();
    let pipeline = MergePipeline::new(registry, PipelineConfig::default());
    RequisitionService::new(
        pipeline,
        ledger,
        Arc::new(catalog),
        FixedOffset::east_opt(8 * 3600).unwrap(),
    )
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

// =====================================================================
// Merge stages
// =====================================================================

#[test]
fn table_has_item_rows_plus_header_and_total() {
    for n in [0, 1, 3, 12] {
        let record = normalize(&record_with_items(n)).unwrap();
        let mut doc = working_doc();
        let report = apply_stages(&mut doc, &record);
        assert!(report.is_clean(), "{n} items: {report}");

        let tables = elements(&doc.nodes, Tag::Table);
        assert_eq!(tables.len(), 1);
        let rows = rows_of(tables[0]);
        assert_eq!(rows.len(), n + 2, "{n} items");

        let header: Vec<String> = cells_of(rows[0]).iter().map(|c| c.text_content()).collect();
        assert_eq!(header, ["Qty", "Unit", "Description", "UPrice", "Amount"]);
        let footer: Vec<String> = cells_of(rows[n + 1]).iter().map(|c| c.text_content()).collect();
        assert_eq!(footer[3], "Total");
        assert_eq!(footer[4], n.to_string());
    }
}

#[test]
fn items_keep_input_order() {
    let record = normalize(&record_with_items(3)).unwrap();
    let mut doc = working_doc();
    apply_stages(&mut doc, &record);
    let tables = elements(&doc.nodes, Tag::Table);
    let rows = rows_of(tables[0]);
    let descriptions: Vec<String> = rows[1..4]
        .iter()
        .map(|r| cells_of(r)[2].text_content())
        .collect();
    assert_eq!(descriptions, ["ITEM 0", "ITEM 1", "ITEM 2"]);
}

#[test]
fn no_tokens_survive_the_merge() {
    let record = normalize(&special_request()).unwrap();
    let mut doc = working_doc();
    apply_stages(&mut doc, &record);

    let html = to_html(&doc.nodes);
    assert!(!html.contains("{{"), "leftover token in {html}");
    for value in ["MAIN", "2024-01-01", "Store", "Special Request", "J. Doe"] {
        assert!(find_text(&doc.nodes, value).is_some(), "{value} missing");
    }
}

#[test]
fn typed_tokens_are_kept_as_text() {
    let mut raw = special_request();
    raw["to"] = json!("{{ITEMS}}");
    let record = normalize(&raw).unwrap();
    let mut doc = working_doc();
    let report = apply_stages(&mut doc, &record);
    assert!(report.is_clean(), "{report}");

    let tables = elements(&doc.nodes, Tag::Table);
    assert_eq!(tables.len(), 1);
    assert_eq!(rows_of(tables[0]).len(), 3);
    let html = to_html(&doc.nodes);
    assert_eq!(html.matches("{{ITEMS}}").count(), 1, "{html}");
    assert!(find_text(&doc.nodes, "{{ITEMS}}").is_some());
}

#[test]
fn columns_are_sized_and_aligned() {
    let record = normalize(&special_request()).unwrap();
    let mut doc = working_doc();
    apply_stages(&mut doc, &record);

    let tables = elements(&doc.nodes, Tag::Table);
    let rows = rows_of(tables[0]);
    let widths = ["40px", "60px", "240px", "80px", "80px"];
    let aligns = ["center", "center", "left", "center", "center"];
    for row in &rows {
        for (c, cell) in cells_of(row).iter().enumerate() {
            assert_eq!(cell.style_value("width"), Some(widths[c]));
            assert_eq!(cell.style_value("text-align"), Some(aligns[c]));
        }
    }
    for cell in cells_of(rows[0]) {
        assert_eq!(cell.tag, Tag::Th);
        assert_eq!(cell.style_value("background-color"), Some("#f0f0f0"));
    }
    for cell in cells_of(rows[1]) {
        assert_eq!(cell.style_value("background-color"), None);
    }
}

#[test]
fn signature_inserts_spacer_then_image() {
    let mut raw = special_request();
    raw["signatureImage"] = json!(format!("data:image/png;base64,{PIXEL}"));
    let record = normalize(&raw).unwrap();
    let mut doc = working_doc();
    let report = apply_stages(&mut doc, &record);
    assert_eq!(report.status(Stage::InsertSignature), Some(&StageStatus::Applied));

    let images = elements(&doc.nodes, Tag::Img);
    assert_eq!(images.len(), 2);
    assert!(images[0].src().unwrap().ends_with(SPACER_PNG));
    assert_eq!(images[1].style_value("width"), Some("150px"));
    assert_eq!(images[1].style_value("height"), Some("55px"));
    assert!(find_text(&doc.nodes, "{{REQUESTED_BY_SIGNATURE}}").is_none());
}

#[test]
fn absent_signature_clears_the_anchor_only() {
    let record = normalize(&special_request()).unwrap();
    let mut doc = working_doc();
    let report = apply_stages(&mut doc, &record);
    assert_eq!(report.status(Stage::InsertSignature), Some(&StageStatus::Skipped));
    assert!(elements(&doc.nodes, Tag::Img).is_empty());
    assert!(find_text(&doc.nodes, "{{REQUESTED_BY_SIGNATURE}}").is_none());
}

#[test]
fn invalid_signature_is_reported_and_export_still_runs() {
    let store = Arc::new(MemoryFileStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let svc = service(store.clone(), ledger, Catalog::default());

    let mut raw = special_request();
    raw["signatureImage"] = json!("data:image/png;base64,bm90IGFuIGltYWdl");
    let submission = svc.submit(&raw).unwrap();

    assert!(matches!(
        submission.report.status(Stage::InsertSignature),
        Some(StageStatus::Failed(_))
    ));
    assert!(!submission.url.is_empty());
}

// =====================================================================
// Submission
// =====================================================================

#[test]
fn special_request_example() {
    let store = Arc::new(MemoryFileStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let catalog = Catalog::from_json_str(r#"[{"id": "IT-001", "description": "BOLT M6"}]"#).unwrap();
    let svc = service(store.clone(), ledger.clone(), catalog);

    let url = svc.save_and_create_pdf(&special_request()).unwrap();
    assert!(!url.is_empty());

    assert_eq!(ledger.buckets(), [SPECIAL_REQUEST]);
    let rows = ledger.rows(SPECIAL_REQUEST);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("ITEM_ID"), Some("IT-001"));
    assert_eq!(rows[0].get("Branch"), Some("MAIN"));
    assert_eq!(rows[0].get("PDF URL"), Some(url.as_str()));
    assert_eq!(rows[0].get("Status"), Some("Pending"));
}

#[test]
fn published_pdf_is_public_and_valid() {
    let store = Arc::new(MemoryFileStore::new());
    let svc = service(store.clone(), Arc::new(MemoryLedger::new()), Catalog::default());

    let ts = FixedOffset::east_opt(8 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 1, 9, 30, 0)
        .unwrap();
    svc.submit_at(&special_request(), ts).unwrap();

    let pdfs: Vec<_> = store.list().into_iter().filter(|f| f.mime_type == PDF_MIME).collect();
    assert_eq!(pdfs.len(), 1);
    assert_eq!(pdfs[0].name, "Requisition 2024-01-01 09:30:00.pdf");
    assert!(pdfs[0].public);
    assert_valid_pdf(&store.read(&pdfs[0].id).unwrap());
}

#[test]
fn concurrent_submissions_are_isolated() {
    let store = Arc::new(MemoryFileStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let svc = service(store.clone(), ledger.clone(), Catalog::default());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let svc = svc.clone();
            thread::spawn(move || {
                let mut raw = record_with_items(2);
                raw["requested_by"] = json!(format!("user {i}"));
                svc.submit(&raw).unwrap()
            })
        })
        .collect();
    let mut urls: Vec<String> = handles.into_iter().map(|h| h.join().unwrap().url).collect();

    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 6);

    // the template plus one PDF per submission; every working copy is gone
    let files = store.list();
    assert_eq!(files.iter().filter(|f| f.mime_type == HTML_MIME).count(), 1);
    assert_eq!(files.iter().filter(|f| f.mime_type == PDF_MIME).count(), 6);

    let rows = ledger.rows("NORTH");
    assert_eq!(rows.len(), 12);
    let mut requesters: Vec<&str> = rows.iter().filter_map(|r| r.get("Requested By")).collect();
    requesters.sort_unstable();
    requesters.dedup();
    assert_eq!(requesters.len(), 6);
}

#[test]
fn failed_clone_aborts_before_the_ledger() {
    let store = Arc::new(MemoryFileStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let svc = service(store.clone(), ledger.clone(), Catalog::default());

    store.fail_on("copy");
    assert!(svc.submit(&special_request()).is_err());
    assert!(ledger.buckets().is_empty());
}

#[test]
fn non_object_record_is_rejected() {
    let svc = service(
        Arc::new(MemoryFileStore::new()),
        Arc::new(MemoryLedger::new()),
        Catalog::default(),
    );
    assert!(svc.submit(&json!(["not", "a", "record"])).is_err());
}

#[test]
fn empty_submission_creates_bucket_with_header() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(FileLedger::open(dir.path()).unwrap());
    let registry = TemplateRegistry::builtin(Arc::new(MemoryFileStore::new())).unwrap();
    let svc = RequisitionService::new(
        MergePipeline::new(registry, PipelineConfig::default()),
        ledger.clone(),
        Arc::new(Catalog::default()),
        FixedOffset::east_opt(0).unwrap(),
    );

    let submission = svc.submit(&json!({ "branch": "east", "items": [] })).unwrap();
    assert_eq!(submission.rows, 0);
    assert_eq!(ledger.buckets().unwrap(), ["EAST"]);
    assert!(ledger.rows("EAST").unwrap().is_empty());

    let raw = std::fs::read_to_string(dir.path().join("EAST.jsonl")).unwrap();
    let header: Vec<String> = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(header, LEDGER_HEADER);
}

// =====================================================================
// Catalog
// =====================================================================

#[test]
fn find_id_matches_trimmed_case_insensitive() {
    let catalog = Catalog::from_json_str(r#"[{"id": "IT-001", "description": "BOLT M6"}]"#).unwrap();
    assert_eq!(catalog.find_id("  bolt m6 "), "IT-001");
    assert_eq!(catalog.find_id("BOLT M8"), "");
}
